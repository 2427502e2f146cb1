//! Versionstamps
//!
//! Every committed write batch is assigned a strictly increasing commit
//! version. A [`Versionstamp`] is the 10-byte externally visible form of that
//! version: 8 bytes of big-endian commit version followed by a 2-byte
//! big-endian index within the commit (always 0 here, one versionstamp per
//! commit). Its string form is 20 lowercase hex characters, so string order
//! and commit order agree.

use crate::error::{KvError, KvResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a versionstamp in bytes
pub const VERSIONSTAMP_LEN: usize = 10;

/// Opaque, totally ordered identifier of a committed write
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Versionstamp {
    version: u64,
    index: u16,
}

impl Versionstamp {
    /// Versionstamp of the given commit version
    pub const fn from_version(version: u64) -> Self {
        Versionstamp { version, index: 0 }
    }

    /// Commit version this versionstamp was derived from
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Index within the commit
    pub const fn index(&self) -> u16 {
        self.index
    }

    /// The 10 raw bytes
    pub fn to_bytes(&self) -> [u8; VERSIONSTAMP_LEN] {
        let mut out = [0u8; VERSIONSTAMP_LEN];
        out[..8].copy_from_slice(&self.version.to_be_bytes());
        out[8..].copy_from_slice(&self.index.to_be_bytes());
        out
    }

    /// Parse from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> KvResult<Self> {
        if bytes.len() != VERSIONSTAMP_LEN {
            return Err(KvError::type_error(format!(
                "Versionstamp must be {} bytes, got {}",
                VERSIONSTAMP_LEN,
                bytes.len()
            )));
        }
        let mut version = [0u8; 8];
        version.copy_from_slice(&bytes[..8]);
        Ok(Versionstamp {
            version: u64::from_be_bytes(version),
            index: u16::from_be_bytes([bytes[8], bytes[9]]),
        })
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:04x}", self.version, self.index)
    }
}

impl FromStr for Versionstamp {
    type Err = KvError;

    fn from_str(s: &str) -> KvResult<Self> {
        if s.len() != VERSIONSTAMP_LEN * 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(KvError::type_error(format!("Invalid versionstamp: {:?}", s)));
        }
        let version = u64::from_str_radix(&s[..16], 16)
            .map_err(|_| KvError::type_error(format!("Invalid versionstamp: {:?}", s)))?;
        let index = u16::from_str_radix(&s[16..], 16)
            .map_err(|_| KvError::type_error(format!("Invalid versionstamp: {:?}", s)))?;
        Ok(Versionstamp { version, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_commit_rendering() {
        let vs = Versionstamp::from_version(1);
        assert_eq!(vs.to_string(), "00000000000000010000");
        assert_eq!(vs.to_string().len(), 20);
    }

    #[test]
    fn test_string_order_matches_version_order() {
        let a = Versionstamp::from_version(9);
        let b = Versionstamp::from_version(10);
        let c = Versionstamp::from_version(0x1_0000_0000);
        assert!(a < b && b < c);
        assert!(a.to_string() < b.to_string());
        assert!(b.to_string() < c.to_string());
    }

    #[test]
    fn test_parse() {
        let vs: Versionstamp = "000000000000002a0000".parse().unwrap();
        assert_eq!(vs.version(), 42);
        assert_eq!(vs.index(), 0);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "0001", "zz000000000000000000", "000000000000000100000", "+0000000000000010000"] {
            let err = bad.parse::<Versionstamp>().unwrap_err();
            assert!(err.is_type_error(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_bytes() {
        let vs = Versionstamp::from_version(0x0102);
        let bytes = vs.to_bytes();
        assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 1, 2, 0, 0]);
        assert_eq!(Versionstamp::from_bytes(&bytes).unwrap(), vs);
        assert!(Versionstamp::from_bytes(&bytes[..9]).is_err());
    }
}
