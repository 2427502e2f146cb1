//! Composite keys and their order-preserving byte encoding
//!
//! A [`Key`] is a sequence of typed [`KeyPart`]s. Keys are stored under their
//! encoded form, and the encoding is designed so that plain unsigned
//! lexicographic comparison of encoded bytes gives the same answer as
//! comparing the keys component by component:
//!
//! ```text
//! bytes < string < int < double < false < true
//! ```
//!
//! ## Component Encoding
//!
//! | Kind | Tag | Payload |
//! |------|-----|---------|
//! | bytes | `0x01` | raw bytes, `0x00` escaped as `0x00 0xFF`, then `0x00` |
//! | string | `0x02` | UTF-8 bytes, escaped like bytes, then `0x00` |
//! | int, 0 | `0x14` | none |
//! | int, n <= 8 bytes | `0x14 + n` / `0x14 - n` | big-endian magnitude, one's complement if negative |
//! | int, 9..=16 bytes | `0x1d` / `0x0b` | length byte (inverted if negative), then as above |
//! | double | `0x21` | big-endian IEEE-754 bits, sign bit flipped; all bits inverted if negative |
//! | false | `0x26` | none |
//! | true | `0x27` | none |
//!
//! The layout matches the FoundationDB tuple layer for the supported kinds.
//! Every component is self-delimiting, so the encoding of a key is a strict
//! byte prefix of the encoding of any longer key that extends it.

use crate::error::{KvError, KvResult};
use crate::value::Node;
use std::cmp::Ordering;
use std::fmt;

const BYTES: u8 = 0x01;
const STRING: u8 = 0x02;
const NEG_INT_BIG: u8 = 0x0b;
const INT_ZERO: u8 = 0x14;
const POS_INT_BIG: u8 = 0x1d;
const DOUBLE: u8 = 0x21;
const FALSE: u8 = 0x26;
const TRUE: u8 = 0x27;

const ESCAPE: u8 = 0xFF;
const SIGN_BIT: u64 = 1 << 63;

/// One typed component of a [`Key`]
///
/// Ordering follows the encoded form: kinds are ranked
/// bytes < string < int < double < false < true, and values compare
/// naturally within a kind. Doubles use IEEE-754 total order, so `-0.0`
/// sorts before `0.0` and the two are distinct parts.
#[derive(Debug, Clone)]
pub enum KeyPart {
    /// Byte string
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Signed integer
    Int(i128),
    /// IEEE-754 double (NaN is rejected on encode)
    Double(f64),
    /// Boolean
    Bool(bool),
}

impl KeyPart {
    fn rank(&self) -> u8 {
        match self {
            KeyPart::Bytes(_) => 0,
            KeyPart::String(_) => 1,
            KeyPart::Int(_) => 2,
            KeyPart::Double(_) => 3,
            KeyPart::Bool(false) => 4,
            KeyPart::Bool(true) => 5,
        }
    }

    /// Human-readable kind name
    pub fn kind_name(&self) -> &'static str {
        match self {
            KeyPart::Bytes(_) => "bytes",
            KeyPart::String(_) => "string",
            KeyPart::Int(_) => "int",
            KeyPart::Double(_) => "double",
            KeyPart::Bool(_) => "bool",
        }
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Bytes(a), KeyPart::Bytes(b)) => a.cmp(b),
            (KeyPart::String(a), KeyPart::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (KeyPart::Int(a), KeyPart::Int(b)) => a.cmp(b),
            (KeyPart::Double(a), KeyPart::Double(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bytes(b) => {
                write!(f, "b\"")?;
                for byte in b {
                    write!(f, "\\x{:02x}", byte)?;
                }
                write!(f, "\"")
            }
            KeyPart::String(s) => write!(f, "{:?}", s),
            KeyPart::Int(i) => write!(f, "{}n", i),
            KeyPart::Double(d) => write!(f, "{:?}", d),
            KeyPart::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::String(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::String(s)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(b: Vec<u8>) -> Self {
        KeyPart::Bytes(b)
    }
}

impl From<&[u8]> for KeyPart {
    fn from(b: &[u8]) -> Self {
        KeyPart::Bytes(b.to_vec())
    }
}

impl From<i128> for KeyPart {
    fn from(i: i128) -> Self {
        KeyPart::Int(i)
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i as i128)
    }
}

impl From<i32> for KeyPart {
    fn from(i: i32) -> Self {
        KeyPart::Int(i as i128)
    }
}

impl From<u64> for KeyPart {
    fn from(i: u64) -> Self {
        KeyPart::Int(i as i128)
    }
}

impl From<f64> for KeyPart {
    fn from(d: f64) -> Self {
        KeyPart::Double(d)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

/// Converts a dynamically typed value node into a key part
///
/// Only bytes, strings, bigints, numbers and booleans are valid key parts.
impl TryFrom<&Node> for KeyPart {
    type Error = KvError;

    fn try_from(node: &Node) -> KvResult<Self> {
        match node {
            Node::Bytes(b) => Ok(KeyPart::Bytes(b.clone())),
            Node::String(s) => Ok(KeyPart::String(s.clone())),
            Node::BigInt(i) => Ok(KeyPart::Int(*i)),
            Node::Number(n) => Ok(KeyPart::Double(*n)),
            Node::Bool(b) => Ok(KeyPart::Bool(*b)),
            other => Err(KvError::type_error(format!(
                "Invalid key part: {} is not a valid key part type",
                other.type_name()
            ))),
        }
    }
}

/// A composite key: an ordered sequence of [`KeyPart`]s
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key(Vec<KeyPart>);

impl Key {
    /// Create a key from its parts
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Key(parts)
    }

    /// Create an empty key (valid only as a list prefix)
    pub fn empty() -> Self {
        Key(Vec::new())
    }

    /// Build a key from dynamically typed nodes, rejecting invalid kinds
    pub fn try_from_nodes(nodes: &[Node]) -> KvResult<Self> {
        nodes
            .iter()
            .map(KeyPart::try_from)
            .collect::<KvResult<Vec<_>>>()
            .map(Key)
    }

    /// Append a part, returning the extended key
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    /// The key's parts
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the key has no parts
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `prefix` is a leading run of this key's parts
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Consume the key, returning its parts
    pub fn into_parts(self) -> Vec<KeyPart> {
        self.0
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Key(parts)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, "]")
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a key for storage
///
/// Fails with a type error if the key is empty or contains a NaN double.
pub fn encode_key(key: &Key) -> KvResult<Vec<u8>> {
    if key.is_empty() {
        return Err(KvError::type_error("Key cannot be empty"));
    }
    encode_prefix(key)
}

/// Encode a key used as a scan prefix
///
/// Identical to [`encode_key`] except that the empty key is allowed and
/// encodes to no bytes, selecting the whole keyspace.
pub fn encode_prefix(key: &Key) -> KvResult<Vec<u8>> {
    let mut out = Vec::with_capacity(key.len() * 9);
    for part in key.parts() {
        encode_part(&mut out, part)?;
    }
    Ok(out)
}

fn encode_part(out: &mut Vec<u8>, part: &KeyPart) -> KvResult<()> {
    match part {
        KeyPart::Bytes(b) => {
            out.push(BYTES);
            encode_escaped(out, b);
        }
        KeyPart::String(s) => {
            out.push(STRING);
            encode_escaped(out, s.as_bytes());
        }
        KeyPart::Int(i) => encode_int(out, *i),
        KeyPart::Double(d) => {
            if d.is_nan() {
                return Err(KvError::type_error("NaN is not a valid key part"));
            }
            out.push(DOUBLE);
            out.extend_from_slice(&encode_double_bits(*d).to_be_bytes());
        }
        KeyPart::Bool(false) => out.push(FALSE),
        KeyPart::Bool(true) => out.push(TRUE),
    }
    Ok(())
}

fn encode_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        out.push(b);
        if b == 0x00 {
            out.push(ESCAPE);
        }
    }
    out.push(0x00);
}

fn encode_int(out: &mut Vec<u8>, value: i128) {
    if value == 0 {
        out.push(INT_ZERO);
        return;
    }

    let magnitude = value.unsigned_abs();
    let len = magnitude_len(magnitude);
    let payload = if value > 0 { magnitude } else { !magnitude };
    let bytes = payload.to_be_bytes();

    match (value > 0, len <= 8) {
        (true, true) => out.push(INT_ZERO + len as u8),
        (false, true) => out.push(INT_ZERO - len as u8),
        (true, false) => {
            out.push(POS_INT_BIG);
            out.push(len as u8);
        }
        (false, false) => {
            out.push(NEG_INT_BIG);
            out.push(len as u8 ^ 0xFF);
        }
    }
    out.extend_from_slice(&bytes[16 - len..]);
}

fn magnitude_len(magnitude: u128) -> usize {
    16 - (magnitude.leading_zeros() / 8) as usize
}

fn encode_double_bits(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits ^ SIGN_BIT
    }
}

fn decode_double_bits(bits: u64) -> f64 {
    if bits & SIGN_BIT != 0 {
        f64::from_bits(bits ^ SIGN_BIT)
    } else {
        f64::from_bits(!bits)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a stored key
///
/// The inverse of [`encode_key`]. Truncated or malformed input fails with
/// [`KvError::Decode`].
pub fn decode_key(bytes: &[u8]) -> KvResult<Key> {
    let mut reader = KeyReader { bytes, pos: 0 };
    let mut parts = Vec::new();
    while !reader.at_end() {
        parts.push(reader.read_part()?);
    }
    Ok(Key(parts))
}

struct KeyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> KeyReader<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn next_byte(&mut self) -> KvResult<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| KvError::decode("unexpected end of key"))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> KvResult<&'a [u8]> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(KvError::decode("unexpected end of key"));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_part(&mut self) -> KvResult<KeyPart> {
        let tag = self.next_byte()?;
        match tag {
            BYTES => Ok(KeyPart::Bytes(self.read_escaped()?)),
            STRING => {
                let raw = self.read_escaped()?;
                String::from_utf8(raw)
                    .map(KeyPart::String)
                    .map_err(|_| KvError::decode("invalid UTF-8 in string key part"))
            }
            NEG_INT_BIG => {
                let len = (self.next_byte()? ^ 0xFF) as usize;
                self.read_int(len, false, true)
            }
            POS_INT_BIG => {
                let len = self.next_byte()? as usize;
                self.read_int(len, true, true)
            }
            t if (INT_ZERO - 8..=INT_ZERO + 8).contains(&t) => {
                if t == INT_ZERO {
                    return Ok(KeyPart::Int(0));
                }
                let positive = t > INT_ZERO;
                let len = if positive { t - INT_ZERO } else { INT_ZERO - t };
                self.read_int(len as usize, positive, false)
            }
            DOUBLE => {
                let raw = self.take(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                let value = decode_double_bits(u64::from_be_bytes(buf));
                if value.is_nan() {
                    return Err(KvError::decode("NaN double in key"));
                }
                Ok(KeyPart::Double(value))
            }
            FALSE => Ok(KeyPart::Bool(false)),
            TRUE => Ok(KeyPart::Bool(true)),
            other => Err(KvError::decode(format!("unknown key part tag 0x{:02x}", other))),
        }
    }

    fn read_escaped(&mut self) -> KvResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let b = self.next_byte()?;
            if b != 0x00 {
                out.push(b);
                continue;
            }
            if self.bytes.get(self.pos) == Some(&ESCAPE) {
                self.pos += 1;
                out.push(0x00);
            } else {
                return Ok(out);
            }
        }
    }

    fn read_int(&mut self, len: usize, positive: bool, big: bool) -> KvResult<KeyPart> {
        if big && !(9..=16).contains(&len) {
            return Err(KvError::decode(format!("invalid integer length {}", len)));
        }
        let raw = self.take(len)?;
        let mut buf = [0u8; 16];
        buf[16 - len..].copy_from_slice(raw);
        let payload = u128::from_be_bytes(buf);

        let mask = if len == 16 {
            u128::MAX
        } else {
            (1u128 << (8 * len)) - 1
        };
        let magnitude = if positive { payload } else { mask - payload };
        if magnitude_len(magnitude) != len {
            return Err(KvError::decode("non-canonical integer encoding"));
        }

        let value = if positive {
            i128::try_from(magnitude)
                .map_err(|_| KvError::decode("integer key part out of range"))?
        } else if magnitude == i128::MIN.unsigned_abs() {
            i128::MIN
        } else {
            -i128::try_from(magnitude)
                .map_err(|_| KvError::decode("integer key part out of range"))?
        };
        Ok(KeyPart::Int(value))
    }
}
