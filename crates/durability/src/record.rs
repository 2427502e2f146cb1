//! Commit record format
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────────┐
//! │ Length (4, LE)  │ CRC32 (4, LE)   │ Payload (Length bytes)       │
//! └─────────────────┴─────────────────┴──────────────────────────────┘
//! ```
//!
//! The payload is a MessagePack-encoded [`CommitRecord`]: the commit version
//! and the resolved writes of that commit. The checksum covers the payload
//! only. Records are self-delimiting, so a log is a plain concatenation.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use stratakv_core::KvError;
use stratakv_storage::WriteOp;
use thiserror::Error;

/// Size of the length + checksum prefix
pub const RECORD_HEADER_SIZE: usize = 8;

/// One write as persisted in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedWrite {
    /// Encoded key
    pub key: Vec<u8>,
    /// Serialized value, `None` for a delete
    pub value: Option<Vec<u8>>,
    /// Expiry deadline (ms since epoch)
    pub expires_at: Option<u64>,
}

impl From<&WriteOp> for LoggedWrite {
    fn from(op: &WriteOp) -> Self {
        match op {
            WriteOp::Put {
                key,
                value,
                expires_at,
            } => LoggedWrite {
                key: key.clone(),
                value: Some(value.clone()),
                expires_at: *expires_at,
            },
            WriteOp::Delete { key } => LoggedWrite {
                key: key.clone(),
                value: None,
                expires_at: None,
            },
        }
    }
}

impl From<LoggedWrite> for WriteOp {
    fn from(write: LoggedWrite) -> Self {
        match write.value {
            Some(value) => WriteOp::Put {
                key: write.key,
                value,
                expires_at: write.expires_at,
            },
            None => WriteOp::Delete { key: write.key },
        }
    }
}

/// The durable form of one committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit version
    pub version: u64,
    /// Writes in application order
    pub writes: Vec<LoggedWrite>,
}

impl CommitRecord {
    /// Build a record from a resolved write set
    pub fn new(version: u64, ops: &[WriteOp]) -> Self {
        CommitRecord {
            version,
            writes: ops.iter().map(LoggedWrite::from).collect(),
        }
    }

    /// The writes as store operations
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.writes.into_iter().map(WriteOp::from).collect()
    }

    /// Serialize to the framed on-disk form
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        let payload =
            rmp_serde::to_vec(self).map_err(|e| RecordError::Encode(e.to_string()))?;
        let crc = compute_crc(&payload);

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&crc.to_le_bytes());
        record.extend_from_slice(&payload);
        Ok(record)
    }

    /// Parse one framed record from the front of `bytes`
    ///
    /// Returns (record, bytes_consumed) on success.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), RecordError> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(RecordError::InsufficientData);
        }
        let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let stored_crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        let end = RECORD_HEADER_SIZE + length;
        if bytes.len() < end {
            return Err(RecordError::InsufficientData);
        }
        let payload = &bytes[RECORD_HEADER_SIZE..end];

        let computed_crc = compute_crc(payload);
        if computed_crc != stored_crc {
            return Err(RecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let record: CommitRecord =
            rmp_serde::from_slice(payload).map_err(|e| RecordError::Decode(e.to_string()))?;
        Ok((record, end))
    }
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Record parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Not enough data to parse a record
    #[error("Insufficient data to parse record")]
    InsufficientData,

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the record
        expected: u32,
        /// Checksum of the payload as read
        computed: u32,
    },

    /// Payload could not be decoded
    #[error("Record decode failed: {0}")]
    Decode(String),

    /// Payload could not be encoded
    #[error("Record encode failed: {0}")]
    Encode(String),
}

impl From<RecordError> for KvError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Encode(msg) => KvError::Serialization(msg),
            other => KvError::Corruption(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CommitRecord {
        CommitRecord::new(
            7,
            &[
                WriteOp::Put {
                    key: vec![0x02, b'a', 0x00],
                    value: vec![0xFF, 0x01, 0x03],
                    expires_at: Some(99),
                },
                WriteOp::Delete {
                    key: vec![0x02, b'b', 0x00],
                },
            ],
        )
    }

    #[test]
    fn test_record_round_trip() {
        let record = sample();
        let bytes = record.to_bytes().unwrap();
        let (parsed, consumed) = CommitRecord::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample().to_bytes().unwrap();
        let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(len + RECORD_HEADER_SIZE, bytes.len());
    }

    #[test]
    fn test_into_ops_preserves_order_and_kind() {
        let ops = sample().into_ops();
        assert!(matches!(ops[0], WriteOp::Put { expires_at: Some(99), .. }));
        assert!(matches!(ops[1], WriteOp::Delete { .. }));
    }

    #[test]
    fn test_truncated_record() {
        let bytes = sample().to_bytes().unwrap();
        for cut in [0, 3, RECORD_HEADER_SIZE, bytes.len() - 1] {
            assert_eq!(
                CommitRecord::from_bytes(&bytes[..cut]),
                Err(RecordError::InsufficientData)
            );
        }
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = sample().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            CommitRecord::from_bytes(&bytes),
            Err(RecordError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_consecutive_records() {
        let a = CommitRecord::new(1, &[]);
        let b = sample();
        let mut bytes = a.to_bytes().unwrap();
        bytes.extend(b.to_bytes().unwrap());

        let (first, used) = CommitRecord::from_bytes(&bytes).unwrap();
        let (second, _) = CommitRecord::from_bytes(&bytes[used..]).unwrap();
        assert_eq!(first, a);
        assert_eq!(second, b);
    }

    #[test]
    fn test_error_maps_to_corruption() {
        let err: KvError = RecordError::InsufficientData.into();
        assert!(matches!(err, KvError::Corruption(_)));
    }
}
