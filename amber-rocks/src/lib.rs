//! RocksDB-backed shelf for Amber.

use std::path::Path;

use amber_core::{NodeId, Shelf};
use rocksdb::{DB, Options};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("RocksDB error: {0}")]
pub struct RocksError(#[from] rocksdb::Error);

/// A persistent shelf backed by RocksDB.
///
/// Records are keyed by the rendered `<kind>+<uuid>` form of their id.
pub struct RocksShelf {
    db: DB,
}

impl RocksShelf {
    /// Opens a RocksDB shelf at the given path.
    ///
    /// Creates the database if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RocksError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }
}

impl Shelf for RocksShelf {
    type Error = RocksError;

    fn get(&self, id: &NodeId) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.db.get(id.to_string())?)
    }

    fn put(&self, id: &NodeId, record: &[u8]) -> Result<(), Self::Error> {
        self.db.put(id.to_string(), record)?;
        Ok(())
    }

    fn has(&self, id: &NodeId) -> Result<bool, Self::Error> {
        Ok(self.db.get_pinned(id.to_string())?.is_some())
    }
}
