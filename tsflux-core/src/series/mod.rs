//! Series: a named, chunked sample store with retention and compaction rules
//!
//! A series owns an ordered [`ChunkDirectory`] of chunks keyed by their first
//! timestamp. The directory always holds at least one chunk; a fresh series
//! is seeded with an empty chunk under key 0.

mod directory;
mod insert;
mod iterator;

pub use directory::{ChunkDirectory, ChunkKey, Seek};
pub use iterator::SeriesIterator;

use crate::chunk::{Chunk, ChunkEncoding};
use crate::compaction::{AggregationType, CompactionRule};
use crate::storage::EngineConfig;
use crate::{DuplicatePolicy, Label, Result, Sample, Timestamp, TsError};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Per-series creation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    /// Target byte budget per chunk
    pub chunk_size_bytes: usize,
    /// Retention window, 0 = unlimited
    pub retention_time: u64,
    /// Series-level duplicate policy (`None` defers to the engine default)
    pub duplicate_policy: DuplicatePolicy,
    /// Chunk encoding, fixed for the lifetime of the series
    pub encoding: ChunkEncoding,
    /// Labels, fixed at creation
    pub labels: Vec<Label>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            chunk_size_bytes: crate::config::DEFAULT_CHUNK_SIZE_BYTES,
            retention_time: crate::config::DEFAULT_RETENTION_TIME,
            duplicate_policy: DuplicatePolicy::None,
            encoding: ChunkEncoding::default(),
            labels: Vec::new(),
        }
    }
}

impl CreateOptions {
    /// Options inheriting the engine-wide defaults
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            chunk_size_bytes: config.chunk_size_bytes,
            retention_time: config.retention_time,
            duplicate_policy: DuplicatePolicy::None,
            encoding: config.encoding,
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(Label::new(name, value));
        self
    }

    pub fn with_retention(mut self, retention_time: u64) -> Self {
        self.retention_time = retention_time;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size_bytes: usize) -> Self {
        self.chunk_size_bytes = chunk_size_bytes;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn uncompressed(mut self) -> Self {
        self.encoding = ChunkEncoding::Uncompressed;
        self
    }
}

/// A time series
#[derive(Debug)]
pub struct Series {
    key: String,
    pub(crate) chunks: ChunkDirectory<Box<dyn Chunk>>,
    encoding: ChunkEncoding,
    chunk_size_bytes: usize,
    retention_time: u64,
    duplicate_policy: DuplicatePolicy,
    labels: Vec<Label>,
    src_key: Option<String>,
    pub(crate) rules: Vec<CompactionRule>,
    pub(crate) last_timestamp: Timestamp,
    pub(crate) last_value: f64,
    pub(crate) total_samples: usize,
}

impl Series {
    /// Create a series seeded with one empty chunk
    pub fn new(key: impl Into<String>, options: CreateOptions) -> Self {
        let key = key.into();
        let chunk_size_bytes = options.chunk_size_bytes.max(crate::SAMPLE_SIZE);

        let mut chunks = ChunkDirectory::new();
        chunks.set(
            ChunkKey::encode(0),
            options.encoding.new_chunk(chunk_size_bytes),
        );
        trace!("New {} series {}", options.encoding, key);

        Self {
            key,
            chunks,
            encoding: options.encoding,
            chunk_size_bytes,
            retention_time: options.retention_time,
            duplicate_policy: options.duplicate_policy,
            labels: options.labels,
            src_key: None,
            rules: Vec::new(),
            last_timestamp: 0,
            last_value: 0.0,
            total_samples: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn encoding(&self) -> ChunkEncoding {
        self.encoding
    }

    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size_bytes
    }

    pub fn retention_time(&self) -> u64 {
        self.retention_time
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    /// Total number of samples across all chunks
    pub fn num_samples(&self) -> usize {
        self.total_samples
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    /// The chunk directory
    pub fn chunks(&self) -> &ChunkDirectory<Box<dyn Chunk>> {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// First sample timestamp, if any
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        if self.is_empty() {
            return None;
        }
        self.chunks
            .values()
            .find(|c| c.num_samples() > 0)
            .map(|c| c.first_timestamp())
    }

    // =========================================================================
    // Compaction rule links
    // =========================================================================

    /// Series feeding this one through a compaction rule
    pub fn src_key(&self) -> Option<&str> {
        self.src_key.as_deref()
    }

    /// Compaction rules in evaluation order
    pub fn rules(&self) -> &[CompactionRule] {
        &self.rules
    }

    /// Append a compaction rule; fails if `time_bucket` is 0
    pub fn add_rule(
        &mut self,
        dest_key: impl Into<String>,
        aggregation: AggregationType,
        time_bucket: u64,
    ) -> Result<&CompactionRule> {
        let rule = CompactionRule::new(dest_key, aggregation, time_bucket)?;
        self.rules.push(rule);
        let idx = self.rules.len() - 1;
        Ok(&self.rules[idx])
    }

    /// Remove the rule writing into `dest_key`
    pub fn delete_rule(&mut self, dest_key: &str) -> bool {
        match self.rules.iter().position(|r| r.dest_key() == dest_key) {
            Some(idx) => {
                self.rules.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Record the upstream series; fails if one is already set
    pub fn set_src_rule(&mut self, src_key: impl Into<String>) -> bool {
        if self.src_key.is_some() {
            return false;
        }
        self.src_key = Some(src_key.into());
        true
    }

    /// Clear the upstream series if it matches `src_key`
    pub fn delete_src_rule(&mut self, src_key: &str) -> bool {
        if self.src_key.as_deref() == Some(src_key) {
            self.src_key = None;
            return true;
        }
        false
    }

    /// Point the upstream reference at a renamed source
    pub(crate) fn repoint_src(&mut self, src_key: impl Into<String>) {
        self.src_key = Some(src_key.into());
    }

    /// Point the single rule writing into `from` at `to`
    pub(crate) fn repoint_rule_dest(&mut self, from: &str, to: &str) -> bool {
        match self.rules.iter_mut().find(|r| r.dest_key() == from) {
            Some(rule) => {
                rule.set_dest_key(to);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Sizing and summaries
    // =========================================================================

    /// Bytes held by all chunks, including per-chunk overhead
    pub fn chunks_size(&self) -> usize {
        self.chunks.values().map(|c| c.size_bytes(true)).sum()
    }

    /// Approximate memory usage of the series
    pub fn mem_usage(&self) -> usize {
        let labels_len: usize = self.labels.iter().map(Label::size).sum();
        let rules_size = self.rules.len() * std::mem::size_of::<CompactionRule>();

        std::mem::size_of::<Self>()
            + rules_size
            + labels_len
            + std::mem::size_of::<Label>() * self.labels.len()
            + self.chunks_size()
    }

    /// First sample inside the retention window, and how many samples precede it
    pub fn first_valid_timestamp(&self) -> Result<(Timestamp, usize)> {
        if self.is_empty() {
            return Ok((0, 0));
        }

        let min_timestamp = if self.retention_time > 0 && self.retention_time < self.last_timestamp {
            self.last_timestamp - self.retention_time
        } else {
            0
        };

        let mut iter = self.query(0, self.last_timestamp, false)?;
        let mut skipped = 0;
        let mut timestamp = 0;
        for sample in iter.by_ref() {
            timestamp = sample?.timestamp;
            if timestamp >= min_timestamp {
                break;
            }
            skipped += 1;
        }
        iter.close();

        Ok((timestamp, skipped))
    }

    /// Collect a range into memory
    pub fn range(&self, start: Timestamp, end: Timestamp, reverse: bool) -> Result<Vec<Sample>> {
        let iter = self.query(start, end, reverse)?;
        iter.collect()
    }

    /// Serializable summary of the series
    pub fn info(&self) -> SeriesInfo {
        SeriesInfo {
            key: self.key.clone(),
            total_samples: self.total_samples,
            memory_usage: self.mem_usage(),
            first_timestamp: self.first_timestamp().unwrap_or(0),
            last_timestamp: self.last_timestamp,
            last_value: self.last_value,
            retention_time: self.retention_time,
            chunk_count: self.chunks.len(),
            chunk_size_bytes: self.chunk_size_bytes,
            encoding: self.encoding,
            duplicate_policy: self.duplicate_policy,
            labels: self.labels.clone(),
            src_key: self.src_key.clone(),
            rules: self
                .rules
                .iter()
                .map(|r| RuleInfo {
                    dest_key: r.dest_key().to_string(),
                    aggregation: r.aggregation(),
                    time_bucket: r.time_bucket(),
                })
                .collect(),
        }
    }

    /// Release the chunks and hand back what the host must clean up
    pub fn free(mut self) -> DeletedSeries {
        let freed = self.chunks.clear();
        trace!("Freed {} chunks of series {}", freed, self.key);

        DeletedSeries {
            rule_dests: self.rules.iter().map(|r| r.dest_key().to_string()).collect(),
            key: self.key,
            labels: self.labels,
            src_key: self.src_key,
        }
    }
}

fn empty_directory(key: &str) -> TsError {
    TsError::Malformed(format!("series {} has no chunks", key))
}

/// Pending cleanup left by a deleted series
///
/// Compaction partners still reference the deleted key; the host consumes
/// this value to unlink them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedSeries {
    pub key: String,
    pub labels: Vec<Label>,
    pub src_key: Option<String>,
    pub rule_dests: Vec<String>,
}

/// Summary of one compaction rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub dest_key: String,
    pub aggregation: AggregationType,
    pub time_bucket: u64,
}

/// Series summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub key: String,
    pub total_samples: usize,
    pub memory_usage: usize,
    pub first_timestamp: Timestamp,
    pub last_timestamp: Timestamp,
    pub last_value: f64,
    pub retention_time: u64,
    pub chunk_count: usize,
    pub chunk_size_bytes: usize,
    pub encoding: ChunkEncoding,
    pub duplicate_policy: DuplicatePolicy,
    pub labels: Vec<Label>,
    pub src_key: Option<String>,
    pub rules: Vec<RuleInfo>,
}
