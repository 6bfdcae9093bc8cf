//! Amber is an identity-preserving object-graph persistence engine.
//!
//! Core concepts:
//! - **Node**: a shared handle to a composite value (record, list, map,
//!   set, timestamp, func, response); pointer identity is object identity
//! - **NodeId**: the `<kind>+<uuid>` identifier minted for a node at first
//!   save; the kind half selects the decoder at load time
//! - **Shelf**: a pluggable key-value backend holding one serialized
//!   record per node (in-memory by default, RocksDB via `amber-rocks`)
//! - **Store**: the engine, a cycle-safe graph walker for `save` and a
//!   registry-driven rebuilder for `load`
//!
//! Saving walks the graph depth-first, tags every composite node with a
//! fresh id in an engine-owned side table, and writes one record per node
//! with child nodes replaced by references. Loading reverses this with a
//! per-call identity cache, so shared and circular references come back as
//! one instance instead of copies.
//!
//! # Example
//!
//! ```
//! use amber_core::{Node, Store};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Store::in_memory();
//!
//! let jim = Node::record("Person");
//! let bob = Node::record("Person");
//! jim.set("name", "Jim").set("friend", bob.clone());
//! bob.set("name", "Bob").set("friend", jim.clone());
//!
//! store.register_kind("Person");
//! let id = store.save(&jim).await.unwrap();
//! assert_eq!(id.kind(), "Person");
//!
//! let fresh = store.load(&id).await.unwrap();
//! let friend = fresh.get("friend").unwrap();
//! let back = friend.as_node().unwrap().get("friend").unwrap();
//! // The cycle closes on the same reconstructed instance.
//! assert!(back.as_node().unwrap().ptr_eq(&fresh));
//! # }
//! ```

mod async_shelf;
mod func;
mod ident;
mod model;
mod registry;
mod response;
mod shelf;
mod store;
mod value;
mod wire;

pub use async_shelf::AsyncShelf;
pub use func::{FuncBody, FuncRef, FuncRegistry};
pub use ident::{NodeId, ParseIdError};
pub use model::{FieldMap, FromValue, IntoValue, Model, ModelError};
pub use registry::{Decoder, Registry};
pub use response::Response;
pub use shelf::{MemoryShelf, Shelf};
pub use store::{LoadError, SaveError, Store};
pub use value::{
    Composite, KIND_FUNC, KIND_LIST, KIND_MAP, KIND_OBJECT, KIND_RESPONSE, KIND_SET,
    KIND_TIMESTAMP, Node, Value,
};
pub use wire::{DecodeError, EncodeError, REF_TAG};

#[cfg(feature = "derive")]
pub use amber_derive::Model;
