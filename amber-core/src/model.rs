//! Typed convenience layer over the dynamic engine.
//!
//! A `Model` is a user struct that knows how to snapshot itself into a
//! record node and rebuild itself from one. The store helpers register the
//! type's rebuild recipe on first save and forward to the engine. Pure
//! delegation, no persistence logic of its own.

use indexmap::IndexMap;

use crate::async_shelf::AsyncShelf;
use crate::ident::NodeId;
use crate::store::{LoadError, SaveError, Store};
use crate::value::{Composite, Node, Value};
use crate::wire::DecodeError;

/// Ordered field map of a record node.
pub type FieldMap = IndexMap<String, Value>;

/// Error converting between a model struct and a record node.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("field {0} has an unexpected shape")]
    FieldShape(&'static str),
    #[error("expected a {expected} record, found a {found} node")]
    KindMismatch {
        expected: &'static str,
        found: String,
    },
}

/// A struct persistable through the engine as a record node.
///
/// Usually derived (`#[derive(Model)]` from `amber-derive`); the manual
/// surface is three items. `TYPE_NAME` is the registry key and id kind.
pub trait Model: Sized {
    const TYPE_NAME: &'static str;

    /// Snapshots the struct into record fields.
    fn to_fields(&self) -> FieldMap;

    /// Rebuilds the struct from record fields.
    fn from_fields(fields: &FieldMap) -> Result<Self, ModelError>;

    /// The blank-instance factory: fields a decoded record is overlaid
    /// onto. Empty by default.
    fn default_fields() -> FieldMap {
        FieldMap::new()
    }

    /// Wraps a snapshot of this struct in a fresh record node.
    ///
    /// Each call creates a new node; hold on to the returned handle when
    /// the same instance is referenced from several places in a graph.
    fn to_node(&self) -> Node {
        Node::new(Composite::Record {
            kind: Self::TYPE_NAME.into(),
            fields: self.to_fields(),
        })
    }

    /// Rebuilds the struct from a loaded record node.
    fn from_node(node: &Node) -> Result<Self, ModelError> {
        match node.snapshot() {
            Composite::Record { kind, fields } if kind == Self::TYPE_NAME => {
                Self::from_fields(&fields)
            }
            other => Err(ModelError::KindMismatch {
                expected: Self::TYPE_NAME,
                found: other.kind_name().to_owned(),
            }),
        }
    }
}

impl<S> Store<S> {
    /// Registers a model type's rebuild recipe. Insert-once: later calls
    /// for the same type name are no-ops.
    pub fn register_model<T: Model + 'static>(&self) {
        self.registry()
            .register_record(T::TYPE_NAME, T::default_fields);
    }
}

impl<S: AsyncShelf> Store<S> {
    /// Snapshots a model into a record node, registers its type, and saves.
    pub async fn save_model<T: Model + 'static>(&self, model: &T) -> Result<NodeId, SaveError<S::Error>> {
        self.register_model::<T>();
        self.save(&model.to_node()).await
    }

    /// Loads a record node and rebuilds the typed model from it.
    pub async fn load_model<T: Model + 'static>(&self, id: &NodeId) -> Result<T, LoadError<S::Error>> {
        self.register_model::<T>();
        let node = self.load(id).await?;
        T::from_node(&node).map_err(|e| LoadError::Decode(DecodeError::Model(e.to_string())))
    }
}

/// Conversion of a field into a dynamic value.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Conversion of a dynamic value back into a field.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;

    /// Stand-in for an absent field; `None` marks the field required.
    fn absent() -> Option<Self> {
        None
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

macro_rules! impl_value_conv {
    ($t:ty, $variant:ident) => {
        impl IntoValue for $t {
            fn into_value(self) -> Value {
                Value::$variant(self.into())
            }
        }

        impl FromValue for $t {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => Some(inner.clone().try_into().ok()?),
                    _ => None,
                }
            }
        }
    };
}

impl_value_conv!(bool, Bool);
impl_value_conv!(i64, Int);
impl_value_conv!(i32, Int);
impl_value_conv!(f64, Float);
impl_value_conv!(String, Text);

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl IntoValue for Node {
    fn into_value(self) -> Value {
        Value::Node(self)
    }
}

impl FromValue for Node {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_node().cloned()
    }
}

impl IntoValue for NodeId {
    fn into_value(self) -> Value {
        Value::Ref(self)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(inner) => inner.into_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn absent() -> Option<Self> {
        Some(None)
    }
}

/// Sequences become list nodes, so a `Vec` field is itself a composite
/// child with its own record.
impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::Node(Node::list(self.into_iter().map(IntoValue::into_value)))
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Option<Self> {
        let node = value.as_node()?;
        match node.snapshot() {
            Composite::List(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}
