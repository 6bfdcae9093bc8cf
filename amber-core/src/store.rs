use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

use crate::async_shelf::AsyncShelf;
use crate::func::FuncRegistry;
use crate::ident::NodeId;
use crate::registry::Registry;
use crate::shelf::MemoryShelf;
use crate::value::{Composite, Node, Value, WeakNode};
use crate::wire::{self, DecodeError, EncodeError};

/// Error saving a graph.
#[derive(Debug, thiserror::Error)]
pub enum SaveError<E> {
    #[error("shelf write failed: {0}")]
    Shelf(E),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Error loading a graph.
#[derive(Debug, thiserror::Error)]
pub enum LoadError<E> {
    /// No decoder registered for the id's kind: a missing registration on
    /// the caller's side, never retried.
    #[error("no decoder registered for kind {0}")]
    UnknownType(String),
    /// The shelf holds no record under this id. Indicates a dangling or
    /// foreign id, or a corrupted store.
    #[error("no record on the shelf for {0}")]
    MissingRecord(NodeId),
    #[error("shelf read failed: {0}")]
    Shelf(E),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Side table of breadcrumbs: body address → (liveness guard, id).
///
/// Tagging through a side table instead of mutating nodes keeps caller
/// data untouched. Entries outlive individual save calls so a re-save of
/// the same live instance returns the same id; the weak handle detects
/// address reuse after the original node is dropped, in which case the
/// stale entry is simply overwritten.
#[derive(Default)]
struct TagTable {
    entries: RwLock<HashMap<usize, (WeakNode, NodeId)>>,
}

impl TagTable {
    fn find(&self, node: &Node) -> Option<NodeId> {
        let entries = self.entries.read().unwrap();
        match entries.get(&node.addr()) {
            Some((weak, id)) if weak.matches(node) => Some(id.clone()),
            _ => None,
        }
    }

    fn tag(&self, node: &Node, id: NodeId) {
        self.entries
            .write()
            .unwrap()
            .insert(node.addr(), (node.downgrade(), id));
    }
}

/// The persistence engine: a graph walker over a pluggable shelf.
///
/// `save` depth-first walks a node graph, mints an id per composite node,
/// and writes one record per node with composite children replaced by
/// references. `load` reconstructs a graph from its root id, relinking
/// shared and cyclic references to single instances through a call-scoped
/// identity cache.
///
/// The engine issues no locks around shelf operations and adds no
/// concurrency of its own; a shelf shared between stores must serialize
/// its own writes.
pub struct Store<S = MemoryShelf> {
    shelf: S,
    registry: Registry,
    funcs: Arc<FuncRegistry>,
    tags: TagTable,
}

impl Store<MemoryShelf> {
    /// A store over a fresh in-memory shelf.
    pub fn in_memory() -> Self {
        Store::new(MemoryShelf::new())
    }
}

impl<S> Store<S> {
    /// Builds a store over the given shelf, with the type registry seeded
    /// for every built-in kind.
    pub fn new(shelf: S) -> Self {
        let funcs = Arc::new(FuncRegistry::new());
        Store {
            shelf,
            registry: Registry::with_builtins(Arc::clone(&funcs)),
            funcs,
            tags: TagTable::default(),
        }
    }

    pub fn shelf(&self) -> &S {
        &self.shelf
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn funcs(&self) -> &FuncRegistry {
        &self.funcs
    }

    /// Registers a decoder for a user kind. This is the engine's only
    /// inbound registration surface; the model layer builds on it.
    pub fn register_type(
        &self,
        name: impl Into<String>,
        decoder: impl Fn(&[u8]) -> Result<Composite, DecodeError> + Send + Sync + 'static,
    ) {
        self.registry.register(name, decoder);
    }

    /// Registers a record kind with no default fields; handy for plain
    /// record nodes built without a typed model.
    pub fn register_kind(&self, name: impl Into<String>) {
        self.registry.register_record(name, indexmap::IndexMap::new);
    }

    /// Registers a named function for `Func` nodes.
    pub fn register_func(
        &self,
        name: impl Into<String>,
        body: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) {
        self.funcs.register(name, body);
    }

    /// Builds a `Func` node from a registered name.
    pub fn func(&self, name: &str) -> Option<Node> {
        self.funcs
            .resolve(name)
            .map(|func| Node::new(Composite::Func(func)))
    }
}

impl<S: AsyncShelf> Store<S> {
    /// Persists the graph reachable from `node` and returns its id.
    ///
    /// Each composite node gets exactly one record; a node already tagged
    /// from an earlier visit (a cycle, a shared reference, or a previous
    /// save of the same live instance) contributes its id without a second
    /// write. Children are durably written before their parent, so a
    /// reader holding a parent record can assume every referenced record
    /// exists (cycle back-edges excepted, where the referenced record
    /// lands when the walk unwinds).
    ///
    /// The live graph is never mutated; substitution of children by ids
    /// happens on a snapshot of each body.
    pub async fn save(&self, node: &Node) -> Result<NodeId, SaveError<S::Error>> {
        self.save_node(node).await
    }

    async fn save_node(&self, node: &Node) -> Result<NodeId, SaveError<S::Error>> {
        // Cycle / shared-reference short-circuit.
        if let Some(id) = self.tags.find(node) {
            trace!(%id, "node already tagged, skipping write");
            return Ok(id);
        }

        // Tag before recursing: a field pointing back here must observe
        // the breadcrumb.
        let id = NodeId::mint(node.kind_name());
        self.tags.tag(node, id.clone());

        let body = node.snapshot();
        let mut child_ids: HashMap<usize, NodeId> = HashMap::new();
        for child in body.child_nodes() {
            let child_id = Box::pin(self.save_node(&child)).await?;
            child_ids.insert(child.addr(), child_id);
        }

        let portable = body.map_values(&mut |value| match value {
            Value::Node(child) => Value::Ref(child_ids[&child.addr()].clone()),
            other => other.clone(),
        });
        let record = wire::encode_body(&portable)?;
        self.shelf
            .async_put(&id, &record)
            .await
            .map_err(SaveError::Shelf)?;

        debug!(%id, bytes = record.len(), "saved node");
        Ok(id)
    }

    /// Reconstructs the graph stored under `id`.
    ///
    /// Every load call owns a private identity cache mapping ids to
    /// already-reconstructed nodes; a node enters the cache before its own
    /// references are resolved, which is what makes cycles terminate and
    /// shared references collapse to a single instance.
    pub async fn load(&self, id: &NodeId) -> Result<Node, LoadError<S::Error>> {
        let mut cache = HashMap::new();
        self.load_node(id, &mut cache).await
    }

    async fn load_node(
        &self,
        id: &NodeId,
        cache: &mut HashMap<NodeId, Node>,
    ) -> Result<Node, LoadError<S::Error>> {
        if !self.registry.contains(id.kind()) {
            return Err(LoadError::UnknownType(id.kind().to_owned()));
        }

        let record = self
            .shelf
            .async_get(id)
            .await
            .map_err(LoadError::Shelf)?
            .ok_or_else(|| LoadError::MissingRecord(id.clone()))?;

        let body = self
            .registry
            .decode(id.kind(), &record)
            .ok_or_else(|| LoadError::UnknownType(id.kind().to_owned()))??;

        let refs = body.child_refs();
        let node = Node::new(body);
        // Into the cache before resolving references, so a reference back
        // to `id` lands on this same in-progress instance.
        cache.insert(id.clone(), node.clone());

        let mut resolved: HashMap<NodeId, Node> = HashMap::new();
        for child_id in refs {
            if resolved.contains_key(&child_id) {
                continue;
            }
            let child = match cache.get(&child_id) {
                Some(seen) => seen.clone(),
                None => Box::pin(self.load_node(&child_id, cache)).await?,
            };
            resolved.insert(child_id, child);
        }
        node.relink(&resolved);

        debug!(%id, "loaded node");
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::KIND_OBJECT;

    #[tokio::test]
    async fn roundtrip_plain_object() {
        let store = Store::in_memory();
        let node = Node::object();
        node.set("name", "Ada").set("age", 36);

        let id = store.save(&node).await.unwrap();
        assert_eq!(id.kind(), KIND_OBJECT);

        let back = store.load(&id).await.unwrap();
        assert_eq!(back.get("name"), Some(Value::Text("Ada".into())));
        assert_eq!(back.get("age"), Some(Value::Int(36)));
        assert!(!back.ptr_eq(&node));
    }

    #[tokio::test]
    async fn resave_is_idempotent() {
        let store = Store::in_memory();
        let node = Node::object();
        node.set("n", 1);

        let first = store.save(&node).await.unwrap();
        let second = store.save(&node).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.shelf().len(), 1);
    }

    #[tokio::test]
    async fn one_record_per_node_in_a_cycle() {
        let store = Store::in_memory();
        let a = Node::object();
        let b = Node::object();
        a.set("other", b.clone());
        b.set("other", a.clone());

        store.save(&a).await.unwrap();

        assert_eq!(store.shelf().len(), 2);
    }

    #[tokio::test]
    async fn mutation_after_save_is_not_written_through() {
        let store = Store::in_memory();
        let node = Node::object();
        node.set("n", 1);

        let id = store.save(&node).await.unwrap();
        node.set("n", 2);

        let back = store.load(&id).await.unwrap();
        assert_eq!(back.get("n"), Some(Value::Int(1)));
    }

    #[tokio::test]
    async fn saving_does_not_mutate_the_live_graph() {
        let store = Store::in_memory();
        let child = Node::object();
        let parent = Node::object();
        parent.set("child", child.clone());

        store.save(&parent).await.unwrap();

        // The live field still holds the node, not a reference.
        assert!(parent.get("child").unwrap().as_node().unwrap().ptr_eq(&child));
    }

    #[tokio::test]
    async fn load_unknown_kind_fails() {
        let store = Store::in_memory();
        let id = NodeId::mint("Bogus");
        assert!(matches!(
            store.load(&id).await,
            Err(LoadError::UnknownType(kind)) if kind == "Bogus"
        ));
    }

    #[tokio::test]
    async fn load_missing_record_fails() {
        let store = Store::in_memory();
        let id = NodeId::mint(KIND_OBJECT);
        assert!(matches!(
            store.load(&id).await,
            Err(LoadError::MissingRecord(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn manual_ref_to_existing_record_is_kept() {
        let store = Store::in_memory();
        let target = Node::object();
        target.set("name", "target");
        let target_id = store.save(&target).await.unwrap();

        // A field may hold a reference to previously stored data; the
        // walker keeps it as-is instead of descending.
        let pointer = Node::object();
        pointer.set("to", target_id.clone());
        let pointer_id = store.save(&pointer).await.unwrap();

        let back = store.load(&pointer_id).await.unwrap();
        let linked = back.get("to").unwrap();
        assert_eq!(
            linked.as_node().unwrap().get("name"),
            Some(Value::Text("target".into()))
        );
    }
}
