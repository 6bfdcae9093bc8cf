use std::future::Future;

use crate::ident::NodeId;
use crate::shelf::Shelf;

/// Async key-value shelf for serialized records.
///
/// Mirrors the `Shelf` trait but with suspending methods, enabling
/// network-capable backends. Methods are prefixed with `async_` to avoid
/// name collisions when a type implements both `Shelf` and `AsyncShelf`.
/// The save/load engine is written against this trait, so blocking and
/// suspending media share one algorithm.
pub trait AsyncShelf: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn async_get(
        &self,
        id: &NodeId,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    fn async_put(
        &self,
        id: &NodeId,
        record: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn async_has(&self, id: &NodeId) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}

/// Blanket impl: any sync `Shelf` is also an `AsyncShelf`.
impl<S: Shelf + Send + Sync> AsyncShelf for S {
    type Error = S::Error;

    async fn async_get(&self, id: &NodeId) -> Result<Option<Vec<u8>>, Self::Error> {
        self.get(id)
    }

    async fn async_put(&self, id: &NodeId, record: &[u8]) -> Result<(), Self::Error> {
        self.put(id, record)
    }

    async fn async_has(&self, id: &NodeId) -> Result<bool, Self::Error> {
        self.has(id)
    }
}
