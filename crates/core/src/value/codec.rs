//! Binary encoding of value graphs
//!
//! ## Layout
//!
//! ```text
//! 0xFF 0x01 <node>
//!
//! node := 0x00                          undefined
//!       | 0x01                          null
//!       | 0x02 | 0x03                   false | true
//!       | 0x04 f64be                    number
//!       | 0x05 i128be                   bigint
//!       | 0x06 varint(len) utf8         string
//!       | 0x07 f64be                    date (ms since epoch)
//!       | 0x08 varint(len) bytes        byte array
//!       | 0x09 u64be                    KvU64
//!       | 0x0A varint(n) node*n         array
//!       | 0x0B varint(n) (varint(len) utf8 node)*n   object
//!       | 0x0C varint(serial)           back-reference
//! ```
//!
//! Composites are numbered in the order they are first written. A composite
//! reached a second time (shared or cyclic) is written as a back-reference to
//! that serial. The decoder mirrors this: it allocates the arena slot when a
//! composite opens, so back-references inside its own children already
//! resolve, and fills the slot as children are read.

use super::{Composite, Node, ObjectId, Value};
use crate::error::{KvError, KvResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};

const HEADER: [u8; 2] = [0xFF, 0x01];

const TAG_UNDEFINED: u8 = 0x00;
const TAG_NULL: u8 = 0x01;
const TAG_FALSE: u8 = 0x02;
const TAG_TRUE: u8 = 0x03;
const TAG_NUMBER: u8 = 0x04;
const TAG_BIGINT: u8 = 0x05;
const TAG_STRING: u8 = 0x06;
const TAG_DATE: u8 = 0x07;
const TAG_BYTES: u8 = 0x08;
const TAG_U64: u8 = 0x09;
const TAG_ARRAY: u8 = 0x0A;
const TAG_OBJECT: u8 = 0x0B;
const TAG_BACKREF: u8 = 0x0C;

/// Maximum composite nesting depth accepted in either direction
pub const MAX_NESTING_DEPTH: usize = 1000;

/// Serialize a value graph
///
/// Fails with a type error if any reachable node is [`Node::Opaque`], if a
/// reference points outside the arena, or if nesting exceeds
/// [`MAX_NESTING_DEPTH`].
pub fn serialize_value(value: &Value) -> KvResult<Vec<u8>> {
    let mut ser = Serializer {
        value,
        out: Vec::with_capacity(64),
        serials: HashMap::new(),
    };
    ser.out.extend_from_slice(&HEADER);
    ser.write_node(&value.root, 0)?;
    Ok(ser.out)
}

/// Deserialize a value graph produced by [`serialize_value`]
pub fn deserialize_value(bytes: &[u8]) -> KvResult<Value> {
    if bytes.len() < HEADER.len() || bytes[..HEADER.len()] != HEADER {
        return Err(KvError::decode("invalid value header"));
    }
    let mut de = Deserializer {
        input: Cursor::new(&bytes[HEADER.len()..]),
        heap: Vec::new(),
        serials: Vec::new(),
    };
    let root = de.read_node(0)?;
    if (de.input.position() as usize) != de.input.get_ref().len() {
        return Err(KvError::decode("trailing bytes after value"));
    }
    Ok(Value {
        root,
        heap: de.heap,
    })
}

struct Serializer<'a> {
    value: &'a Value,
    out: Vec<u8>,
    serials: HashMap<ObjectId, u64>,
}

impl<'a> Serializer<'a> {
    fn write_node(&mut self, node: &Node, depth: usize) -> KvResult<()> {
        match node {
            Node::Undefined => self.out.push(TAG_UNDEFINED),
            Node::Null => self.out.push(TAG_NULL),
            Node::Bool(false) => self.out.push(TAG_FALSE),
            Node::Bool(true) => self.out.push(TAG_TRUE),
            Node::Number(n) => {
                self.out.push(TAG_NUMBER);
                self.out.write_f64::<BigEndian>(*n)?;
            }
            Node::BigInt(i) => {
                self.out.push(TAG_BIGINT);
                self.out.write_i128::<BigEndian>(*i)?;
            }
            Node::String(s) => {
                self.out.push(TAG_STRING);
                self.write_bytes(s.as_bytes());
            }
            Node::Date(ms) => {
                self.out.push(TAG_DATE);
                self.out.write_f64::<BigEndian>(*ms)?;
            }
            Node::Bytes(b) => {
                self.out.push(TAG_BYTES);
                self.write_bytes(b);
            }
            Node::U64(u) => {
                self.out.push(TAG_U64);
                self.out.write_u64::<BigEndian>(u.value())?;
            }
            Node::Ref(id) => self.write_ref(*id, depth)?,
            Node::Opaque(kind) => {
                return Err(KvError::type_error(format!(
                    "{} can not be serialized",
                    kind.name()
                )));
            }
        }
        Ok(())
    }

    fn write_ref(&mut self, id: ObjectId, depth: usize) -> KvResult<()> {
        if let Some(serial) = self.serials.get(&id) {
            self.out.push(TAG_BACKREF);
            write_varint(&mut self.out, *serial);
            return Ok(());
        }
        if depth >= MAX_NESTING_DEPTH {
            return Err(KvError::type_error("Value is nested too deeply"));
        }

        let serial = self.serials.len() as u64;
        self.serials.insert(id, serial);

        let value = self.value;
        match value.composite(id) {
            Some(Composite::Array(items)) => {
                self.out.push(TAG_ARRAY);
                write_varint(&mut self.out, items.len() as u64);
                for item in items {
                    self.write_node(item, depth + 1)?;
                }
            }
            Some(Composite::Object(fields)) => {
                self.out.push(TAG_OBJECT);
                write_varint(&mut self.out, fields.len() as u64);
                for (key, item) in fields {
                    self.write_bytes(key.as_bytes());
                    self.write_node(item, depth + 1)?;
                }
            }
            None => {
                return Err(KvError::type_error(format!(
                    "Dangling object reference #{}",
                    id.0
                )));
            }
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        write_varint(&mut self.out, bytes.len() as u64);
        self.out.extend_from_slice(bytes);
    }
}

struct Deserializer<'a> {
    input: Cursor<&'a [u8]>,
    heap: Vec<Composite>,
    serials: Vec<ObjectId>,
}

impl<'a> Deserializer<'a> {
    fn remaining(&self) -> usize {
        self.input.get_ref().len() - self.input.position() as usize
    }

    fn read_node(&mut self, depth: usize) -> KvResult<Node> {
        let tag = self.input.read_u8().map_err(eof)?;
        let node = match tag {
            TAG_UNDEFINED => Node::Undefined,
            TAG_NULL => Node::Null,
            TAG_FALSE => Node::Bool(false),
            TAG_TRUE => Node::Bool(true),
            TAG_NUMBER => Node::Number(self.input.read_f64::<BigEndian>().map_err(eof)?),
            TAG_BIGINT => Node::BigInt(self.input.read_i128::<BigEndian>().map_err(eof)?),
            TAG_STRING => Node::String(self.read_string()?),
            TAG_DATE => Node::Date(self.input.read_f64::<BigEndian>().map_err(eof)?),
            TAG_BYTES => Node::Bytes(self.read_bytes()?),
            TAG_U64 => Node::U64(self.input.read_u64::<BigEndian>().map_err(eof)?.into()),
            TAG_ARRAY | TAG_OBJECT => self.read_composite(tag, depth)?,
            TAG_BACKREF => {
                let serial = self.read_varint()?;
                let id = usize::try_from(serial)
                    .ok()
                    .and_then(|s| self.serials.get(s))
                    .ok_or_else(|| KvError::decode(format!("invalid back-reference {}", serial)))?;
                Node::Ref(*id)
            }
            other => {
                return Err(KvError::decode(format!("unknown value tag 0x{:02x}", other)));
            }
        };
        Ok(node)
    }

    fn read_composite(&mut self, tag: u8, depth: usize) -> KvResult<Node> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(KvError::decode("value nested too deeply"));
        }
        let len = self.read_len()?;
        // Each element takes at least one byte, which bounds the preallocation.
        let capacity = len.min(self.remaining());

        let id = ObjectId(self.heap.len());
        self.heap.push(if tag == TAG_ARRAY {
            Composite::Array(Vec::with_capacity(capacity))
        } else {
            Composite::Object(Vec::with_capacity(capacity))
        });
        self.serials.push(id);

        for _ in 0..len {
            if tag == TAG_ARRAY {
                let item = self.read_node(depth + 1)?;
                if let Composite::Array(items) = &mut self.heap[id.0] {
                    items.push(item);
                }
            } else {
                let key = self.read_string()?;
                let item = self.read_node(depth + 1)?;
                if let Composite::Object(fields) = &mut self.heap[id.0] {
                    fields.push((key, item));
                }
            }
        }
        Ok(Node::Ref(id))
    }

    fn read_len(&mut self) -> KvResult<usize> {
        let len = self.read_varint()?;
        usize::try_from(len).map_err(|_| KvError::decode("length out of range"))
    }

    fn read_bytes(&mut self) -> KvResult<Vec<u8>> {
        let len = self.read_len()?;
        if len > self.remaining() {
            return Err(KvError::decode("unexpected end of value"));
        }
        let mut buf = vec![0u8; len];
        self.input.read_exact(&mut buf).map_err(eof)?;
        Ok(buf)
    }

    fn read_string(&mut self) -> KvResult<String> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|_| KvError::decode("invalid UTF-8 in string value"))
    }

    fn read_varint(&mut self) -> KvResult<u64> {
        let mut result = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.input.read_u8().map_err(eof)?;
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(KvError::decode("varint too long"))
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn eof(_: std::io::Error) -> KvError {
    KvError::decode("unexpected end of value")
}
