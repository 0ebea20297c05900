use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use blobpack_crypto::ContentHasher;
use blobpack_types::{BlobId, BlobLocation, BlobRecord};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::SegmentCache;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::index::IndexWriter;
use crate::recovery::{recover, RecoveryReport};
use crate::segment::index_path;

/// Point-in-time counters for a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub blob_count: usize,
    /// Segment files in use, `current_segment + 1`.
    pub segment_count: u32,
    pub current_segment: u32,
    pub current_segment_size: u64,
    /// Sum of all stored payload sizes.
    pub total_bytes: u64,
}

/// Outcome of [`SegmentStore::verify`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    /// Blobs whose bytes no longer hash to their id.
    pub mismatched: Vec<BlobId>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.mismatched.is_empty()
    }
}

/// Everything a live store owns. Only reachable through the store's mutex.
struct OpenStore {
    blobs: HashMap<BlobId, BlobLocation>,
    segments: SegmentCache,
    index: IndexWriter,
    total_bytes: u64,
}

enum StoreState {
    Open(OpenStore),
    Closed,
}

impl StoreState {
    fn open_mut(&mut self) -> StoreResult<&mut OpenStore> {
        match self {
            Self::Open(store) => Ok(store),
            Self::Closed => Err(StoreError::Closed),
        }
    }
}

/// Content-addressed blob store backed by append-only segment files.
///
/// Blob bytes are appended to the current segment file; a line per blob in
/// the index log records where they went. Opening the store replays that log.
///
/// A single mutex serializes `put`, `get` and every other operation,
/// including their file I/O, which makes the dedup check, the segment append,
/// the index append and the rotation decision one atomic step.
///
/// # Files
///
/// For a base path `P`: `P_idx.txt` is the index log and `P_0.txt`,
/// `P_1.txt`, ... are the segments.
pub struct SegmentStore {
    base_path: PathBuf,
    config: StoreConfig,
    recovery: RecoveryReport,
    state: Mutex<StoreState>,
}

impl SegmentStore {
    /// Open (or create) a store with the given segment size limit.
    pub fn open(base_path: impl AsRef<Path>, max_segment_size: u64) -> StoreResult<Self> {
        Self::open_with_config(base_path, StoreConfig::with_max_segment_size(max_segment_size))
    }

    /// Open (or create) a store with the default 10 MiB segment limit.
    pub fn open_default(base_path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(base_path, StoreConfig::default())
    }

    /// Open (or create) a store.
    ///
    /// Replays the index log, then opens the index for appending and the
    /// current segment at its on-disk end. Fails without a usable store if
    /// recovery or any open fails.
    pub fn open_with_config(base_path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let base_path = base_path.as_ref().to_path_buf();

        let recovered = recover(&base_path)?;
        let index = IndexWriter::open(&index_path(&base_path), config.index_sync)?;
        let mut segments = SegmentCache::open(&base_path, recovered.current_segment)?;
        if segments.current().size() >= config.max_segment_size {
            segments.rotate()?;
        }
        let total_bytes = recovered.blobs.values().map(|loc| loc.size).sum();

        info!(
            path = %base_path.display(),
            blobs = recovered.blobs.len(),
            current_segment = segments.current().number(),
            "store opened"
        );
        Ok(Self {
            base_path,
            config,
            recovery: recovered.report,
            state: Mutex::new(StoreState::Open(OpenStore {
                blobs: recovered.blobs,
                segments,
                index,
                total_bytes,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store mutex poisoned")
    }

    /// Store `data` and return its id.
    ///
    /// Content already present returns its id without touching disk.
    /// Otherwise the bytes are appended and synced to the current segment,
    /// then the index record is appended, then the in-memory index updated.
    /// If the rotation that follows fails, the error is returned although the
    /// blob is stored; a retried `put` dedups.
    pub fn put(&self, data: &[u8]) -> StoreResult<BlobId> {
        let id = ContentHasher::BLOB.hash(data);

        let mut state = self.lock();
        let store = state.open_mut()?;
        if store.blobs.contains_key(&id) {
            return Ok(id);
        }

        let segment = store.segments.current().number();
        let offset = store.segments.current_mut().append(data)?;
        let location = BlobLocation::new(segment, offset, data.len() as u64);
        store.index.append(&BlobRecord::new(id, location))?;
        store.blobs.insert(id, location);
        store.total_bytes += location.size;
        debug!(%id, segment, offset, size = location.size, "put");

        if store.segments.current().size() >= self.config.max_segment_size {
            store.segments.rotate()?;
        }
        Ok(id)
    }

    /// Read back the bytes stored under `id`.
    pub fn get(&self, id: &BlobId) -> StoreResult<Vec<u8>> {
        let mut state = self.lock();
        let store = state.open_mut()?;
        let location = *store.blobs.get(id).ok_or(StoreError::NotFound(*id))?;
        Ok(store.segments.read(&location)?)
    }

    pub fn contains(&self, id: &BlobId) -> StoreResult<bool> {
        let mut state = self.lock();
        Ok(state.open_mut()?.blobs.contains_key(id))
    }

    /// Number of stored blobs.
    pub fn len(&self) -> StoreResult<usize> {
        let mut state = self.lock();
        Ok(state.open_mut()?.blobs.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Sorted list of every stored blob id.
    pub fn all_ids(&self) -> StoreResult<Vec<BlobId>> {
        let mut state = self.lock();
        let mut ids: Vec<BlobId> = state.open_mut()?.blobs.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let mut state = self.lock();
        let store = state.open_mut()?;
        let current = store.segments.current();
        Ok(StoreStats {
            blob_count: store.blobs.len(),
            segment_count: current.number().saturating_add(1),
            current_segment: current.number(),
            current_segment_size: current.size(),
            total_bytes: store.total_bytes,
        })
    }

    /// Re-read every blob and check that it still hashes to its id.
    ///
    /// Blobs are visited in segment order to keep the read cache warm. A
    /// mismatch is reported, not returned as an error; I/O errors are.
    pub fn verify(&self) -> StoreResult<VerifyReport> {
        let mut state = self.lock();
        let store = state.open_mut()?;

        let mut entries: Vec<(BlobId, BlobLocation)> =
            store.blobs.iter().map(|(id, loc)| (*id, *loc)).collect();
        entries.sort_by_key(|(_, loc)| (loc.segment, loc.offset));

        let mut report = VerifyReport::default();
        for (id, location) in entries {
            let data = store.segments.read(&location)?;
            if !ContentHasher::BLOB.verify(&data, &id) {
                warn!(%id, segment = location.segment, offset = location.offset, "blob hash mismatch");
                report.mismatched.push(id);
            }
            report.checked += 1;
        }
        Ok(report)
    }

    /// Release every file handle. Closing twice is a no-op.
    ///
    /// Never fails: a failed final index sync is logged. Later calls on the
    /// store return [`StoreError::Closed`].
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let StoreState::Open(store) = std::mem::replace(&mut *state, StoreState::Closed) {
            if let Err(e) = store.index.sync() {
                warn!(error = %e, "index sync on close failed");
            }
            info!(path = %self.base_path.display(), blobs = store.blobs.len(), "store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock(), StoreState::Closed)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// What recovery found when this store was opened.
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    #[cfg(test)]
    fn cached_segment(&self) -> Option<u32> {
        match &*self.lock() {
            StoreState::Open(store) => store.segments.cached_segment(),
            StoreState::Closed => None,
        }
    }
}

impl std::fmt::Debug for SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStore")
            .field("base_path", &self.base_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
