use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Default segment size limit: 10 MiB.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Flush strategy for index records.
///
/// Segment payloads are always synced before their index record is written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSync {
    /// `sync_data` the index after every appended record.
    EveryWrite,
    /// Hand each record to the OS and rely on its buffering.
    #[default]
    OsDefault,
}

/// Configuration for a [`SegmentStore`](crate::SegmentStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Size in bytes at which the current segment is rotated.
    pub max_segment_size: u64,
    /// Sync strategy for the index log.
    pub index_sync: IndexSync,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            index_sync: IndexSync::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration with a custom segment size limit.
    pub fn with_max_segment_size(max_segment_size: u64) -> Self {
        Self {
            max_segment_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.max_segment_size == 0 {
            return Err(StoreError::InvalidConfig(
                "max_segment_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
