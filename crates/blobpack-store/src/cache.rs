use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use blobpack_types::BlobLocation;
use tracing::debug;

use crate::segment::{read_exact_at, segment_path, SegmentWriter};

/// Read-only handle for one non-current segment.
struct CachedSegment {
    number: u32,
    file: File,
}

/// Two-slot file handle cache for the read path.
///
/// Slot one is the current segment's writer, which also serves reads of that
/// segment. Slot two holds the most recently read non-current segment. A read
/// of any other segment closes slot two and reopens it on the requested file,
/// so at most two segment descriptors are ever open.
pub struct SegmentCache {
    base_path: PathBuf,
    current: SegmentWriter,
    cached: Option<CachedSegment>,
}

impl SegmentCache {
    /// Open with segment `current` as the writable segment.
    pub fn open(base_path: &Path, current: u32) -> io::Result<Self> {
        Ok(Self {
            base_path: base_path.to_path_buf(),
            current: SegmentWriter::open(base_path, current)?,
            cached: None,
        })
    }

    pub fn current(&self) -> &SegmentWriter {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut SegmentWriter {
        &mut self.current
    }

    /// Segment held in the non-current slot, if any.
    pub fn cached_segment(&self) -> Option<u32> {
        self.cached.as_ref().map(|c| c.number)
    }

    /// Read the bytes at `location`.
    pub fn read(&mut self, location: &BlobLocation) -> io::Result<Vec<u8>> {
        if location.segment == self.current.number() {
            return read_exact_at(self.current.file(), location.offset, location.size);
        }

        let slot = match self.cached.take() {
            Some(c) if c.number == location.segment => c,
            evicted => {
                if let Some(old) = &evicted {
                    debug!(evicted = old.number, opened = location.segment, "read cache swap");
                }
                drop(evicted);
                CachedSegment {
                    number: location.segment,
                    file: File::open(segment_path(&self.base_path, location.segment))?,
                }
            }
        };
        let result = read_exact_at(&slot.file, location.offset, location.size);
        self.cached = Some(slot);
        result
    }

    /// Close the current segment and open the next one as current.
    ///
    /// Returns the new current segment number.
    pub fn rotate(&mut self) -> io::Result<u32> {
        let next = self
            .current
            .number()
            .checked_add(1)
            .ok_or_else(|| io::Error::other("segment numbers exhausted"))?;
        let writer = SegmentWriter::open(&self.base_path, next)?;
        let previous = std::mem::replace(&mut self.current, writer);
        debug!(
            closed = previous.number(),
            closed_size = previous.size(),
            opened = next,
            "segment rotation"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_segment(base: &Path, number: u32, data: &[u8]) {
        let mut seg = SegmentWriter::open(base, number).unwrap();
        seg.append(data).unwrap();
    }

    #[test]
    fn current_segment_reads_do_not_fill_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        let mut cache = SegmentCache::open(&base, 0).unwrap();
        let offset = cache.current_mut().append(b"payload").unwrap();

        let data = cache.read(&BlobLocation::new(0, offset, 7)).unwrap();
        assert_eq!(data, b"payload");
        assert_eq!(cache.cached_segment(), None);
    }

    #[test]
    fn non_current_read_fills_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        write_segment(&base, 0, b"zero");
        write_segment(&base, 1, b"one");
        let mut cache = SegmentCache::open(&base, 2).unwrap();

        assert_eq!(cache.read(&BlobLocation::new(0, 0, 4)).unwrap(), b"zero");
        assert_eq!(cache.cached_segment(), Some(0));

        // Same segment again reuses the slot.
        assert_eq!(cache.read(&BlobLocation::new(0, 1, 3)).unwrap(), b"ero");
        assert_eq!(cache.cached_segment(), Some(0));

        // A different segment evicts it.
        assert_eq!(cache.read(&BlobLocation::new(1, 0, 3)).unwrap(), b"one");
        assert_eq!(cache.cached_segment(), Some(1));
    }

    #[test]
    fn missing_segment_read_empties_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        write_segment(&base, 0, b"zero");
        let mut cache = SegmentCache::open(&base, 5).unwrap();
        cache.read(&BlobLocation::new(0, 0, 4)).unwrap();

        let err = cache.read(&BlobLocation::new(3, 0, 1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(cache.cached_segment(), None);
    }

    #[test]
    fn rotate_opens_next_segment() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        let mut cache = SegmentCache::open(&base, 0).unwrap();
        cache.current_mut().append(b"first").unwrap();

        assert_eq!(cache.rotate().unwrap(), 1);
        assert_eq!(cache.current().number(), 1);
        assert_eq!(cache.current().size(), 0);
        assert!(segment_path(&base, 1).exists());

        // The rotated-away segment is now served through the slot.
        assert_eq!(cache.read(&BlobLocation::new(0, 0, 5)).unwrap(), b"first");
        assert_eq!(cache.cached_segment(), Some(0));
    }

    #[test]
    fn rotate_past_last_segment_number_fails() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("s");
        let mut cache = SegmentCache::open(&base, u32::MAX).unwrap();

        assert!(cache.rotate().is_err());
        assert_eq!(cache.current().number(), u32::MAX);
    }
}
