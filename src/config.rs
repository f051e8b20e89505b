use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::version::MmvVersion;

/// Header flag: metric names are exported without a process-name prefix.
pub const FLAG_NO_PREFIX: u32 = 0x1;
/// Header flag: the header's pid field identifies a live writer process.
pub const FLAG_PROCESS: u32 = 0x2;

/// Default cap on the string section (2048 cells of 256 bytes).
const DEFAULT_STRING_BLOCK_CAPACITY: usize = 512 * 1024;

/// Default depth of the bounded update-notification queue.
const DEFAULT_UPDATE_QUEUE_DEPTH: usize = 1024;

/// Configuration for an MMV writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmvWriterConfig {
    /// File backing the shared region.
    pub path: PathBuf,
    /// On-disk format variant.
    pub version: MmvVersion,
    /// Cluster identifier stamped into the region header.
    pub cluster_id: u32,
    /// Process identifier stamped into the region header.
    pub process_id: u32,
    /// Header flag bits.
    pub flags: u32,
    /// Upper bound on the string section, in bytes.
    pub string_block_capacity: usize,
    /// Depth of the bounded update queue used by `UpdateBridge`.
    pub update_queue_depth: usize,
}

impl MmvWriterConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: MmvVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_cluster_id(mut self, cluster_id: u32) -> Self {
        self.cluster_id = cluster_id;
        self
    }

    pub fn with_process_id(mut self, process_id: u32) -> Self {
        self.process_id = process_id;
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_string_block_capacity(mut self, capacity: usize) -> Self {
        self.string_block_capacity = capacity;
        self
    }

    pub fn with_update_queue_depth(mut self, depth: usize) -> Self {
        self.update_queue_depth = depth;
        self
    }
}

impl Default for MmvWriterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("metrics.mmv"),
            version: MmvVersion::V2,
            cluster_id: 0,
            process_id: std::process::id(),
            flags: FLAG_NO_PREFIX | FLAG_PROCESS,
            string_block_capacity: DEFAULT_STRING_BLOCK_CAPACITY,
            update_queue_depth: DEFAULT_UPDATE_QUEUE_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_flag_a_live_prefix_free_writer() {
        let config = MmvWriterConfig::new("test.mmv");
        assert_eq!(config.version, MmvVersion::V2);
        assert_eq!(config.flags, FLAG_NO_PREFIX | FLAG_PROCESS);
        assert_eq!(config.process_id, std::process::id());
    }

    #[test]
    fn builders_override_defaults() {
        let config = MmvWriterConfig::new("test.mmv")
            .with_version(MmvVersion::V1)
            .with_cluster_id(12)
            .with_update_queue_depth(4);
        assert_eq!(config.version, MmvVersion::V1);
        assert_eq!(config.cluster_id, 12);
        assert_eq!(config.update_queue_depth, 4);
    }
}
