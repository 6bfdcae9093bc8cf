use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::RwLock;

use crate::ident::NodeId;

/// A key-value shelf for serialized records.
///
/// Shelves operate on raw bytes — encoding/decoding is handled by higher
/// layers (the store engine). Shelves have no knowledge of kinds, the
/// registry, or graph shape; ids are never reused, so a shelf may treat
/// itself as append-only.
///
/// All methods take `&self` to support shelves with internal locking
/// (e.g., RocksDB).
pub trait Shelf {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Retrieves the record stored under an id, or None if not present.
    fn get(&self, id: &NodeId) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Stores a record under the given id.
    fn put(&self, id: &NodeId, record: &[u8]) -> Result<(), Self::Error>;

    /// Checks whether an id exists on the shelf.
    fn has(&self, id: &NodeId) -> Result<bool, Self::Error>;
}

/// An in-memory shelf backed by a HashMap.
///
/// The default backend; useful for testing and as a reference
/// implementation.
#[derive(Debug, Default)]
pub struct MemoryShelf {
    data: RwLock<HashMap<NodeId, Vec<u8>>>,
}

impl MemoryShelf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }
}

impl Shelf for MemoryShelf {
    type Error = Infallible;

    fn get(&self, id: &NodeId) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.data.read().unwrap().get(id).cloned())
    }

    fn put(&self, id: &NodeId, record: &[u8]) -> Result<(), Self::Error> {
        self.data
            .write()
            .unwrap()
            .insert(id.clone(), record.to_vec());
        Ok(())
    }

    fn has(&self, id: &NodeId) -> Result<bool, Self::Error> {
        Ok(self.data.read().unwrap().contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::KIND_OBJECT;

    #[test]
    fn memory_shelf_put_get() {
        let shelf = MemoryShelf::new();
        let id = NodeId::mint(KIND_OBJECT);
        let record = b"hello world";

        shelf.put(&id, record).unwrap();
        let retrieved = shelf.get(&id).unwrap();

        assert_eq!(retrieved, Some(record.to_vec()));
        assert_eq!(shelf.len(), 1);
    }

    #[test]
    fn memory_shelf_get_missing() {
        let shelf = MemoryShelf::new();
        let id = NodeId::mint(KIND_OBJECT);

        let retrieved = shelf.get(&id).unwrap();

        assert_eq!(retrieved, None);
    }

    #[test]
    fn memory_shelf_has() {
        let shelf = MemoryShelf::new();
        let id = NodeId::mint(KIND_OBJECT);

        assert!(!shelf.has(&id).unwrap());

        shelf.put(&id, b"record").unwrap();

        assert!(shelf.has(&id).unwrap());
    }
}
