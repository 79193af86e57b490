use serde_derive::{Deserialize, Serialize};

pub const DEFAULT_MAX_STORE_BYTES: u64 = 1024;
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 1024;

/// Commit log settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segment: SegmentConfig,
}

/// Rollover limits for a single segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    // A segment is maxed once its store reaches this many bytes
    pub max_store_bytes: u64,
    // Capacity pre-allocated for each index file
    pub max_index_bytes: u64,
    // Base offset of the first segment of a brand-new log
    pub initial_offset: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            max_store_bytes: DEFAULT_MAX_STORE_BYTES,
            max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
            initial_offset: 0,
        }
    }
}

impl Config {
    /// Replaces zeroed limits with the defaults.
    pub(crate) fn with_defaults(mut self) -> Self {
        if self.segment.max_store_bytes == 0 {
            self.segment.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }
        if self.segment.max_index_bytes == 0 {
            self.segment.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }
        self
    }
}
