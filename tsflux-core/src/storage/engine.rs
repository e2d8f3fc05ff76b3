//! Storage engine - thread-safe facade over a keyspace

use super::{EngineConfig, Keyspace, LabelIndex, MemoryIndex};
use crate::compaction::AggregationType;
use crate::series::{CreateOptions, SeriesInfo};
use crate::{DuplicatePolicy, Result, Sample, Timestamp, TsError};
use parking_lot::RwLock;
use serde::Serialize;

/// TSFlux storage engine
///
/// Every write, including its compaction fan-out, runs under one write lock.
/// Reads share the lock and return owned results.
pub struct StorageEngine<I: LabelIndex = MemoryIndex> {
    keyspace: RwLock<Keyspace<I>>,
}

impl StorageEngine {
    /// Create a new storage engine
    pub fn new(config: EngineConfig) -> Self {
        Self::with_keyspace(Keyspace::new(config))
    }
}

impl<I: LabelIndex> StorageEngine<I> {
    pub fn with_keyspace(keyspace: Keyspace<I>) -> Self {
        Self {
            keyspace: RwLock::new(keyspace),
        }
    }

    /// Create a series with the engine defaults plus `labels`
    pub fn create_series(&self, key: &str, labels: &[(&str, &str)]) -> Result<()> {
        let mut keyspace = self.keyspace.write();
        let mut options = CreateOptions::from_config(keyspace.config());
        for (name, value) in labels {
            options = options.with_label(*name, *value);
        }
        keyspace.create_series(key, options)
    }

    /// Create a series with explicit options
    pub fn create_series_with(&self, key: &str, options: CreateOptions) -> Result<()> {
        self.keyspace.write().create_series(key, options)
    }

    pub fn add(&self, key: &str, timestamp: Timestamp, value: f64) -> Result<Timestamp> {
        self.keyspace.write().add(key, timestamp, value, DuplicatePolicy::None)
    }

    pub fn add_with_policy(
        &self,
        key: &str,
        timestamp: Timestamp,
        value: f64,
        policy: DuplicatePolicy,
    ) -> Result<Timestamp> {
        self.keyspace.write().add(key, timestamp, value, policy)
    }

    /// Add several samples to one series under a single lock
    pub fn add_batch(&self, key: &str, samples: &[Sample]) -> Result<usize> {
        let mut keyspace = self.keyspace.write();
        for sample in samples {
            keyspace.add(key, sample.timestamp, sample.value, DuplicatePolicy::None)?;
        }
        Ok(samples.len())
    }

    pub fn create_rule(
        &self,
        src: &str,
        dest: &str,
        aggregation: AggregationType,
        time_bucket: u64,
    ) -> Result<()> {
        self.keyspace
            .write()
            .create_rule(src, dest, aggregation, time_bucket)
    }

    pub fn delete_rule(&self, src: &str, dest: &str) -> Result<()> {
        self.keyspace.write().delete_rule(src, dest)
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.keyspace.write().delete(key)
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.keyspace.write().rename(from, to)
    }

    pub fn range(&self, key: &str, start: Timestamp, end: Timestamp) -> Result<Vec<Sample>> {
        self.keyspace.read().range(key, start, end, false)
    }

    pub fn rev_range(&self, key: &str, start: Timestamp, end: Timestamp) -> Result<Vec<Sample>> {
        self.keyspace.read().range(key, start, end, true)
    }

    /// Most recent sample of a series
    pub fn get_latest(&self, key: &str) -> Result<Option<Sample>> {
        let keyspace = self.keyspace.read();
        let series = keyspace
            .get(key)
            .ok_or_else(|| TsError::NotFound(format!("series {}", key)))?;
        if series.is_empty() {
            return Ok(None);
        }
        Ok(Some(Sample::new(series.last_timestamp(), series.last_value())))
    }

    pub fn info(&self, key: &str) -> Result<SeriesInfo> {
        self.keyspace
            .read()
            .get(key)
            .map(|s| s.info())
            .ok_or_else(|| TsError::NotFound(format!("series {}", key)))
    }

    pub fn num_samples(&self, key: &str) -> Result<usize> {
        self.keyspace
            .read()
            .get(key)
            .map(|s| s.num_samples())
            .ok_or_else(|| TsError::NotFound(format!("series {}", key)))
    }

    /// List all series keys
    pub fn list_series(&self) -> Vec<String> {
        self.keyspace.read().keys()
    }

    /// Run `f` with shared access to the keyspace
    pub fn read<R>(&self, f: impl FnOnce(&Keyspace<I>) -> R) -> R {
        f(&self.keyspace.read())
    }

    /// Get engine statistics
    pub fn stats(&self) -> EngineStats {
        let keyspace = self.keyspace.read();
        EngineStats {
            series_count: keyspace.len(),
            total_samples: keyspace.iter().map(|s| s.num_samples()).sum(),
            total_chunks: keyspace.iter().map(|s| s.chunk_count()).sum(),
            memory_bytes: keyspace.iter().map(|s| s.mem_usage()).sum(),
        }
    }
}

/// Storage engine statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub series_count: usize,
    pub total_samples: usize,
    pub total_chunks: usize,
    pub memory_bytes: usize,
}
