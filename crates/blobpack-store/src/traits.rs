use blobpack_types::BlobId;

use crate::error::StoreResult;
use crate::store::SegmentStore;

/// Content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - The same bytes always produce the same id, and storing them twice is a
///   no-op.
/// - `get` of an id never returned by `put` fails with `NotFound`.
/// - Safe to share across threads.
pub trait BlobStore: Send + Sync {
    /// Store a payload and return its content-addressed id.
    fn put(&self, data: &[u8]) -> StoreResult<BlobId>;

    /// Read a payload by id.
    fn get(&self, id: &BlobId) -> StoreResult<Vec<u8>>;

    /// Check whether a blob is stored.
    fn contains(&self, id: &BlobId) -> StoreResult<bool>;

    /// Store several payloads; ids are returned in input order.
    fn put_batch(&self, payloads: &[&[u8]]) -> StoreResult<Vec<BlobId>> {
        payloads.iter().map(|p| self.put(p)).collect()
    }

    /// Read several blobs; fails on the first missing id.
    fn get_batch(&self, ids: &[BlobId]) -> StoreResult<Vec<Vec<u8>>> {
        ids.iter().map(|id| self.get(id)).collect()
    }
}

impl BlobStore for SegmentStore {
    fn put(&self, data: &[u8]) -> StoreResult<BlobId> {
        SegmentStore::put(self, data)
    }

    fn get(&self, id: &BlobId) -> StoreResult<Vec<u8>> {
        SegmentStore::get(self, id)
    }

    fn contains(&self, id: &BlobId) -> StoreResult<bool> {
        SegmentStore::contains(self, id)
    }
}
