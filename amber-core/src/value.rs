use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use crate::func::FuncRef;
use crate::ident::NodeId;
use crate::response::Response;

/// Kind names of the built-in composite kinds, as used in node ids and as
/// type-registry keys. Plain structures are `Object`; user record types
/// carry their own registered name instead.
pub const KIND_OBJECT: &str = "Object";
pub const KIND_LIST: &str = "List";
pub const KIND_MAP: &str = "Map";
pub const KIND_SET: &str = "Set";
pub const KIND_TIMESTAMP: &str = "Timestamp";
pub const KIND_FUNC: &str = "Func";
pub const KIND_RESPONSE: &str = "Response";

/// A field value inside a composite node.
///
/// `Ref` is the unresolved form of a reference: it appears in freshly
/// decoded bodies and in encode output, where composite children have been
/// replaced by their ids. A fully loaded graph holds `Node` values instead.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Unresolved reference to a stored node.
    Ref(NodeId),
    /// Live reference to a composite node.
    Node(Node),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<&NodeId> {
        match self {
            Value::Ref(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Primitives compare by value, references by id, nodes by pointer identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Value::Ref(v)
    }
}

impl From<Node> for Value {
    fn from(v: Node) -> Self {
        Value::Node(v)
    }
}

/// The body of a composite node.
#[derive(Debug, Clone)]
pub enum Composite {
    /// Plain structure or user-typed record; field order is preserved.
    Record {
        kind: String,
        fields: IndexMap<String, Value>,
    },
    /// Ordered sequence.
    List(Vec<Value>),
    /// Associative mapping as ordered entries; keys may be any value.
    Map(Vec<(Value, Value)>),
    /// Unique-element set as ordered entries.
    Set(Vec<Value>),
    /// An instant; wire form is epoch milliseconds.
    Timestamp(DateTime<Utc>),
    /// A named invocable resolved from the function registry.
    Func(FuncRef),
    /// HTTP-response-like value; opaque to the graph walker.
    Response(Response),
}

impl Composite {
    /// The kind name used as the id prefix and registry key.
    pub fn kind_name(&self) -> &str {
        match self {
            Composite::Record { kind, .. } => kind,
            Composite::List(_) => KIND_LIST,
            Composite::Map(_) => KIND_MAP,
            Composite::Set(_) => KIND_SET,
            Composite::Timestamp(_) => KIND_TIMESTAMP,
            Composite::Func(_) => KIND_FUNC,
            Composite::Response(_) => KIND_RESPONSE,
        }
    }

    fn values(&self) -> Vec<&Value> {
        match self {
            Composite::Record { fields, .. } => fields.values().collect(),
            Composite::List(items) | Composite::Set(items) => items.iter().collect(),
            Composite::Map(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
            Composite::Timestamp(_) | Composite::Func(_) | Composite::Response(_) => Vec::new(),
        }
    }

    /// Direct live children, in encounter order. Leaf kinds (timestamp,
    /// func, response) have none; the walker never descends into them.
    pub(crate) fn child_nodes(&self) -> Vec<Node> {
        self.values()
            .into_iter()
            .filter_map(|v| v.as_node().cloned())
            .collect()
    }

    /// Direct unresolved references, in encounter order.
    pub(crate) fn child_refs(&self) -> Vec<NodeId> {
        self.values()
            .into_iter()
            .filter_map(|v| v.as_ref_id().cloned())
            .collect()
    }

    /// Rebuilds the body with every directly contained value mapped
    /// through `f`. Leaf kinds are returned unchanged.
    pub(crate) fn map_values(&self, f: &mut impl FnMut(&Value) -> Value) -> Composite {
        match self {
            Composite::Record { kind, fields } => Composite::Record {
                kind: kind.clone(),
                fields: fields.iter().map(|(k, v)| (k.clone(), f(v))).collect(),
            },
            Composite::List(items) => Composite::List(items.iter().map(|v| f(v)).collect()),
            Composite::Set(items) => Composite::Set(items.iter().map(|v| f(v)).collect()),
            Composite::Map(entries) => {
                Composite::Map(entries.iter().map(|(k, v)| (f(k), f(v))).collect())
            }
            leaf => leaf.clone(),
        }
    }
}

/// A shared handle to a composite node.
///
/// Clones share the same body; pointer identity is the unit of
/// deduplication for the save walker and the load relinker. Two fields
/// holding clones of one `Node` are the same object, and stay so across a
/// save/load round trip.
#[derive(Clone)]
pub struct Node(Arc<RwLock<Composite>>);

impl Node {
    pub fn new(body: Composite) -> Self {
        Node(Arc::new(RwLock::new(body)))
    }

    /// An empty plain structure.
    pub fn object() -> Self {
        Node::record(KIND_OBJECT)
    }

    /// An empty record with the given kind name.
    pub fn record(kind: impl Into<String>) -> Self {
        Node::new(Composite::Record {
            kind: kind.into(),
            fields: IndexMap::new(),
        })
    }

    /// An ordered sequence.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Node::new(Composite::List(items.into_iter().collect()))
    }

    /// An associative mapping from ordered entries.
    pub fn map_of(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Node::new(Composite::Map(entries.into_iter().collect()))
    }

    /// A unique-element set; later duplicates are dropped.
    pub fn set_of(items: impl IntoIterator<Item = Value>) -> Self {
        let mut members: Vec<Value> = Vec::new();
        for item in items {
            if !members.contains(&item) {
                members.push(item);
            }
        }
        Node::new(Composite::Set(members))
    }

    pub fn timestamp(instant: DateTime<Utc>) -> Self {
        Node::new(Composite::Timestamp(instant))
    }

    pub fn response(response: Response) -> Self {
        Node::new(Composite::Response(response))
    }

    /// Clones the current body.
    pub fn snapshot(&self) -> Composite {
        self.0.read().unwrap().clone()
    }

    /// The kind name used when minting this node's id.
    pub fn kind_name(&self) -> String {
        self.0.read().unwrap().kind_name().to_owned()
    }

    /// Reads a record field.
    pub fn get(&self, name: &str) -> Option<Value> {
        match &*self.0.read().unwrap() {
            Composite::Record { fields, .. } => fields.get(name).cloned(),
            _ => None,
        }
    }

    /// Inserts or replaces a record field.
    ///
    /// # Panics
    /// Panics if the node is not a record.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> &Self {
        match &mut *self.0.write().unwrap() {
            Composite::Record { fields, .. } => {
                fields.insert(name.into(), value.into());
            }
            other => panic!("set() on a {} node", other.kind_name()),
        }
        self
    }

    /// Appends to a sequence.
    ///
    /// # Panics
    /// Panics if the node is not a list.
    pub fn push(&self, value: impl Into<Value>) -> &Self {
        match &mut *self.0.write().unwrap() {
            Composite::List(items) => items.push(value.into()),
            other => panic!("push() on a {} node", other.kind_name()),
        }
        self
    }

    /// Reads a sequence element.
    pub fn at(&self, index: usize) -> Option<Value> {
        match &*self.0.read().unwrap() {
            Composite::List(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// Number of fields, elements, entries, or members; zero for leaf kinds.
    pub fn len(&self) -> usize {
        match &*self.0.read().unwrap() {
            Composite::Record { fields, .. } => fields.len(),
            Composite::List(items) | Composite::Set(items) => items.len(),
            Composite::Map(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared body, the identity key for breadcrumbs.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> WeakNode {
        WeakNode(Arc::downgrade(&self.0))
    }

    /// Replaces every directly contained `Ref` that `resolved` knows about
    /// with the corresponding live node.
    pub(crate) fn relink(&self, resolved: &std::collections::HashMap<NodeId, Node>) {
        let mut body = self.0.write().unwrap();
        let relinked = body.map_values(&mut |v| match v {
            Value::Ref(id) => match resolved.get(id) {
                Some(node) => Value::Node(node.clone()),
                None => v.clone(),
            },
            other => other.clone(),
        });
        *body = relinked;
    }
}

/// Shallow by design: a node may sit on a cycle, so printing contents
/// could never terminate.
impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(body) => write!(f, "Node({} @{:#x})", body.kind_name(), self.addr()),
            Err(_) => write!(f, "Node(<locked> @{:#x})", self.addr()),
        }
    }
}

/// A non-owning node handle used by the breadcrumb table to detect
/// address reuse after a node is dropped.
#[derive(Debug, Clone)]
pub(crate) struct WeakNode(Weak<RwLock<Composite>>);

impl WeakNode {
    /// True when this handle still points at the same live allocation.
    pub(crate) fn matches(&self, node: &Node) -> bool {
        self.0.upgrade().is_some_and(|arc| Arc::ptr_eq(&arc, &node.0))
    }
}
