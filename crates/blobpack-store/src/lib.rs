//! Segmented, content-addressed blob storage.
//!
//! Blobs are identified by a 20-byte digest of their bytes and packed
//! back-to-back into a few large append-only segment files instead of one
//! file per blob. A text index log maps each digest to its segment, offset and
//! size, and is replayed into memory every time the store is opened.
//!
//! ```no_run
//! use blobpack_store::SegmentStore;
//!
//! let store = SegmentStore::open("data/blobs", 10 * 1024 * 1024)?;
//! let id = store.put(b"my piece of content")?;
//! assert_eq!(store.get(&id)?, b"my piece of content");
//! store.close();
//! # Ok::<(), blobpack_store::StoreError>(())
//! ```
//!
//! # Design Rules
//!
//! 1. Segments and the index are append-only; nothing is rewritten or deleted.
//! 2. Payload before record: segment bytes are synced before the index line
//!    that points at them is written.
//! 3. Storing the same content twice is a no-op.
//! 4. One mutex serializes every operation, including its file I/O.
//! 5. At most two segment file handles are open at once.
//! 6. All I/O errors are propagated, never retried.

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod memory;
pub mod recovery;
pub mod segment;
pub mod store;
pub mod traits;

pub use blobpack_types::{BlobId, BlobLocation, BlobRecord};
pub use config::{IndexSync, StoreConfig, DEFAULT_MAX_SEGMENT_SIZE};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBlobStore;
pub use recovery::RecoveryReport;
pub use store::{SegmentStore, StoreStats, VerifyReport};
pub use traits::BlobStore;
