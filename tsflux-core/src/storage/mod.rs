//! Storage layer - owns series by name and routes writes between them

mod engine;
mod index;
mod keyspace;

pub use engine::{EngineStats, StorageEngine};
pub use index::{LabelIndex, MemoryIndex};
pub use keyspace::{Keyspace, PendingRename};

use crate::chunk::ChunkEncoding;
use crate::compaction::AggregationType;
use crate::DuplicatePolicy;
use serde::{Deserialize, Serialize};

/// Default compaction rule applied to every newly created series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionRuleTemplate {
    pub aggregation: AggregationType,
    pub time_bucket: u64,
    /// Retention of the auto-created destination series
    #[serde(default)]
    pub retention_time: u64,
}

/// Storage engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chunk byte budget for new series
    pub chunk_size_bytes: usize,
    /// Retention for new series, 0 = unlimited
    pub retention_time: u64,
    /// Fallback when neither the write nor the series sets a policy
    pub duplicate_policy: DuplicatePolicy,
    /// Chunk encoding for new series
    pub encoding: ChunkEncoding,
    /// Rules auto-created alongside every new series
    pub compaction_rules: Vec<CompactionRuleTemplate>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: crate::config::DEFAULT_CHUNK_SIZE_BYTES,
            retention_time: crate::config::DEFAULT_RETENTION_TIME,
            duplicate_policy: crate::config::DEFAULT_DUPLICATE_POLICY,
            encoding: ChunkEncoding::default(),
            compaction_rules: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "retention_time": 86400000,
                "duplicate_policy": "last",
                "encoding": "uncompressed",
                "compaction_rules": [
                    {"aggregation": "avg", "time_bucket": 60000},
                    {"aggregation": "std.p", "time_bucket": 3600000, "retention_time": 5}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.chunk_size_bytes, crate::config::DEFAULT_CHUNK_SIZE_BYTES);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Last);
        assert_eq!(config.encoding, ChunkEncoding::Uncompressed);
        assert_eq!(config.compaction_rules.len(), 2);
        assert_eq!(config.compaction_rules[1].aggregation, AggregationType::StdP);
        assert_eq!(config.compaction_rules[0].retention_time, 0);

        let json = serde_json::to_string(&EngineConfig::default()).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EngineConfig::default());
        assert_eq!(back.duplicate_policy, DuplicatePolicy::Block);
    }
}
