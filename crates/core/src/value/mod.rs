//! Stored value model
//!
//! A [`Value`] is a graph, not a tree: composites (arrays and plain objects)
//! live in an arena owned by the value and are referenced by [`ObjectId`].
//! The same composite may be referenced from several places, and a composite
//! may reference itself directly or through its children.
//!
//! ```text
//! Value { root: Ref(#0), heap: [ Object{ "self": Ref(#0), "n": Number(1) } ] }
//! ```
//!
//! Primitive nodes are stored inline. [`Node::Opaque`] stands for a payload
//! the caller cannot persist (a function, a symbol, ...); it can be built
//! but [`codec::serialize_value`] rejects it.
//!
//! Equality is structural over the reachable graph: two values are equal if
//! their graphs are isomorphic, including the sharing and cycle structure.

pub mod codec;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use codec::{deserialize_value, serialize_value};

/// Unsigned 64-bit integer wrapper
///
/// Distinct from [`Node::Number`] so that `sum`, `min` and `max` mutations
/// can tell counters from ordinary numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KvU64(u64);

impl KvU64 {
    /// Wrap a raw value
    pub const fn new(value: u64) -> Self {
        KvU64(value)
    }

    /// The raw value
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for KvU64 {
    fn from(value: u64) -> Self {
        KvU64(value)
    }
}

impl fmt::Display for KvU64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}n", self.0)
    }
}

/// Index of a composite in a value's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) usize);

impl ObjectId {
    /// Arena slot index
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Kinds of caller payload that cannot be persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueKind {
    /// A callable
    Function,
    /// A unique symbol
    Symbol,
    /// A weakly keyed map
    WeakMap,
    /// A weakly held set
    WeakSet,
    /// Memory shared between threads
    SharedArrayBuffer,
    /// A native module handle
    Module,
}

impl OpaqueKind {
    /// Display name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            OpaqueKind::Function => "function",
            OpaqueKind::Symbol => "symbol",
            OpaqueKind::WeakMap => "WeakMap",
            OpaqueKind::WeakSet => "WeakSet",
            OpaqueKind::SharedArrayBuffer => "SharedArrayBuffer",
            OpaqueKind::Module => "module",
        }
    }
}

/// A single node in a value graph
#[derive(Debug, Clone)]
pub enum Node {
    /// Undefined
    Undefined,
    /// Null
    Null,
    /// Boolean
    Bool(bool),
    /// Double-precision number
    Number(f64),
    /// Arbitrary-width integer, bounded to 128 bits
    BigInt(i128),
    /// UTF-8 string
    String(String),
    /// Date as milliseconds since the Unix epoch
    Date(f64),
    /// Byte array
    Bytes(Vec<u8>),
    /// Unsigned 64-bit wrapper
    U64(KvU64),
    /// Reference to a composite in the owning value's arena
    Ref(ObjectId),
    /// Non-serializable payload
    Opaque(OpaqueKind),
}

impl Node {
    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Undefined => "undefined",
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Number(_) => "number",
            Node::BigInt(_) => "bigint",
            Node::String(_) => "string",
            Node::Date(_) => "Date",
            Node::Bytes(_) => "Uint8Array",
            Node::U64(_) => "KvU64",
            Node::Ref(_) => "object",
            Node::Opaque(kind) => kind.name(),
        }
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Node::Number(n)
    }
}

impl From<i128> for Node {
    fn from(i: i128) -> Self {
        Node::BigInt(i)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

impl From<Vec<u8>> for Node {
    fn from(b: Vec<u8>) -> Self {
        Node::Bytes(b)
    }
}

impl From<KvU64> for Node {
    fn from(u: KvU64) -> Self {
        Node::U64(u)
    }
}

/// A composite held in a value's arena
#[derive(Debug, Clone)]
pub enum Composite {
    /// Ordered list of nodes
    Array(Vec<Node>),
    /// Plain object with insertion-ordered string keys
    Object(Vec<(String, Node)>),
}

/// A storable value graph
#[derive(Debug, Clone)]
pub struct Value {
    root: Node,
    heap: Vec<Composite>,
}

impl Value {
    /// A value whose root is the given node and whose arena is empty
    pub fn new(root: Node) -> Self {
        Value {
            root,
            heap: Vec::new(),
        }
    }

    /// An array of inline nodes
    pub fn array(items: Vec<Node>) -> Self {
        let mut value = Value::new(Node::Undefined);
        let id = value.alloc(Composite::Array(items));
        value.root = Node::Ref(id);
        value
    }

    /// A plain object of inline nodes
    pub fn object<K: Into<String>>(fields: Vec<(K, Node)>) -> Self {
        let mut value = Value::new(Node::Undefined);
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let id = value.alloc(Composite::Object(fields));
        value.root = Node::Ref(id);
        value
    }

    /// The root node
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Replace the root node
    pub fn set_root(&mut self, root: Node) {
        self.root = root;
    }

    /// Place a composite in the arena
    pub fn alloc(&mut self, composite: Composite) -> ObjectId {
        self.heap.push(composite);
        ObjectId(self.heap.len() - 1)
    }

    /// Look up a composite
    pub fn composite(&self, id: ObjectId) -> Option<&Composite> {
        self.heap.get(id.0)
    }

    /// Look up a composite for modification
    pub fn composite_mut(&mut self, id: ObjectId) -> Option<&mut Composite> {
        self.heap.get_mut(id.0)
    }

    /// Resolve a reference node to its composite
    pub fn resolve(&self, node: &Node) -> Option<&Composite> {
        match node {
            Node::Ref(id) => self.composite(*id),
            _ => None,
        }
    }

    /// Number of arena slots
    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }

    /// The wrapped counter if the root is a [`KvU64`]
    pub fn as_u64(&self) -> Option<KvU64> {
        match self.root {
            Node::U64(u) => Some(u),
            _ => None,
        }
    }

    /// Type name of the root node
    pub fn type_name(&self) -> &'static str {
        self.root.type_name()
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::new(Node::Undefined)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::new(node)
    }
}

impl From<KvU64> for Value {
    fn from(u: KvU64) -> Self {
        Value::new(Node::U64(u))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::new(Node::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::new(Node::String(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::new(Node::Number(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::new(Node::Bool(b))
    }
}

impl From<i128> for Value {
    fn from(i: i128) -> Self {
        Value::new(Node::BigInt(i))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::new(Node::Bytes(b))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut matcher = GraphMatcher {
            left: self,
            right: other,
            forward: HashMap::new(),
            backward: HashMap::new(),
        };
        matcher.nodes_eq(&self.root, &other.root)
    }
}

/// Walks two graphs in lockstep, pairing composites as they are first seen
struct GraphMatcher<'a> {
    left: &'a Value,
    right: &'a Value,
    forward: HashMap<usize, usize>,
    backward: HashMap<usize, usize>,
}

impl<'a> GraphMatcher<'a> {
    fn nodes_eq(&mut self, a: &Node, b: &Node) -> bool {
        match (a, b) {
            (Node::Undefined, Node::Undefined) | (Node::Null, Node::Null) => true,
            (Node::Bool(x), Node::Bool(y)) => x == y,
            (Node::Number(x), Node::Number(y)) | (Node::Date(x), Node::Date(y)) => {
                x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan())
            }
            (Node::BigInt(x), Node::BigInt(y)) => x == y,
            (Node::String(x), Node::String(y)) => x == y,
            (Node::Bytes(x), Node::Bytes(y)) => x == y,
            (Node::U64(x), Node::U64(y)) => x == y,
            (Node::Opaque(x), Node::Opaque(y)) => x == y,
            (Node::Ref(x), Node::Ref(y)) => self.refs_eq(*x, *y),
            _ => false,
        }
    }

    fn refs_eq(&mut self, x: ObjectId, y: ObjectId) -> bool {
        match (self.forward.get(&x.0), self.backward.get(&y.0)) {
            (Some(mx), Some(my)) => return *mx == y.0 && *my == x.0,
            (None, None) => {}
            _ => return false,
        }
        self.forward.insert(x.0, y.0);
        self.backward.insert(y.0, x.0);

        let (left, right) = (self.left, self.right);
        match (left.composite(x), right.composite(y)) {
            (Some(Composite::Array(xs)), Some(Composite::Array(ys))) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(a, b)| self.nodes_eq(a, b))
            }
            (Some(Composite::Object(xs)), Some(Composite::Object(ys))) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|((ka, va), (kb, vb))| ka == kb && self.nodes_eq(va, vb))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_referencing() -> Value {
        let mut value = Value::new(Node::Undefined);
        let id = value.alloc(Composite::Object(vec![("n".into(), Node::Number(1.0))]));
        if let Some(Composite::Object(fields)) = value.composite_mut(id) {
            fields.push(("self".into(), Node::Ref(id)));
        }
        value.set_root(Node::Ref(id));
        value
    }

    #[test]
    fn test_primitive_equality() {
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from("a"), Value::from(Node::Bytes(b"a".to_vec())));
        assert_ne!(Value::from(1.0), Value::from(KvU64::new(1)));
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
    }

    #[test]
    fn test_cyclic_equality() {
        assert_eq!(self_referencing(), self_referencing());
    }

    #[test]
    fn test_sharing_is_part_of_identity() {
        // [x, x] with one shared array versus two distinct but equal arrays
        let mut shared = Value::new(Node::Undefined);
        let inner = shared.alloc(Composite::Array(vec![Node::Null]));
        let outer = shared.alloc(Composite::Array(vec![Node::Ref(inner), Node::Ref(inner)]));
        shared.set_root(Node::Ref(outer));

        let mut distinct = Value::new(Node::Undefined);
        let a = distinct.alloc(Composite::Array(vec![Node::Null]));
        let b = distinct.alloc(Composite::Array(vec![Node::Null]));
        let outer = distinct.alloc(Composite::Array(vec![Node::Ref(a), Node::Ref(b)]));
        distinct.set_root(Node::Ref(outer));

        assert_ne!(shared, distinct);
    }

    #[test]
    fn test_object_field_order_matters() {
        let a = Value::object(vec![("x", Node::Null), ("y", Node::Null)]);
        let b = Value::object(vec![("y", Node::Null), ("x", Node::Null)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_as_u64() {
        assert_eq!(Value::from(KvU64::new(7)).as_u64(), Some(KvU64::new(7)));
        assert_eq!(Value::from(7.0).as_u64(), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::array(vec![]).type_name(), "object");
        assert_eq!(Node::Opaque(OpaqueKind::Symbol).type_name(), "symbol");
        assert_eq!(Node::U64(KvU64::new(0)).type_name(), "KvU64");
    }
}
