use serde::{Deserialize, Serialize};

use crate::id::BlobId;

/// Physical location of a blob's bytes inside a segment file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobLocation {
    /// Number of the segment file holding the bytes.
    pub segment: u32,
    /// Byte offset within the segment where the payload begins.
    pub offset: u64,
    /// Payload length in bytes.
    pub size: u64,
}

impl BlobLocation {
    pub fn new(segment: u32, offset: u64, size: u64) -> Self {
        Self {
            segment,
            offset,
            size,
        }
    }

    /// One past the last byte of the payload.
    ///
    /// Saturates rather than wrapping so a corrupt record can never look
    /// like it fits inside a short segment.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    /// Returns `true` if the two locations share at least one byte.
    pub fn overlaps(&self, other: &BlobLocation) -> bool {
        self.segment == other.segment
            && self.size > 0
            && other.size > 0
            && self.offset < other.end()
            && other.offset < self.end()
    }
}

/// A digest together with the location of its bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub id: BlobId,
    pub location: BlobLocation,
}

impl BlobRecord {
    pub fn new(id: BlobId, location: BlobLocation) -> Self {
        Self { id, location }
    }
}
