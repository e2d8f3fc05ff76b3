//! TSFlux Core - In-Memory Time-Series Storage Engine
//!
//! Stores named series of `(timestamp, value)` samples in bounded chunks and
//! keeps downsampled companion series up to date.
//!
//! # Architecture
//!
//! - **Chunks**: bounded sample containers, Gorilla-compressed or plain arrays
//! - **Series**: an ordered chunk directory with retention and duplicate handling
//! - **Compaction**: rules that aggregate a series into fixed time buckets
//! - **Storage**: a keyspace that owns series by name and routes writes
//!
//! # Example
//!
//! ```
//! use tsflux_core::storage::{EngineConfig, StorageEngine};
//! use tsflux_core::compaction::AggregationType;
//!
//! let engine = StorageEngine::new(EngineConfig::default());
//! engine.create_series("temp", &[("room", "kitchen")]).unwrap();
//! engine.create_series("temp_avg", &[("room", "kitchen")]).unwrap();
//! engine.create_rule("temp", "temp_avg", AggregationType::Avg, 60_000).unwrap();
//!
//! engine.add("temp", 1_000, 21.5).unwrap();
//! engine.add("temp", 61_000, 22.0).unwrap();
//!
//! let buckets = engine.range("temp_avg", 0, u64::MAX).unwrap();
//! assert_eq!(buckets[0].value, 21.5);
//! ```

pub mod chunk;
pub mod compaction;
pub mod compression;
pub mod series;
pub mod storage;

mod error;
mod types;

pub use error::{Result, TsError};
pub use types::*;

/// TSFlux version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    use crate::DuplicatePolicy;

    /// Chunk byte budget (4KB)
    pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 4 * 1024;

    /// A chunk is split before an upsert once it exceeds this multiple of its budget
    pub const SPLIT_FACTOR: f64 = 1.2;

    /// Unlimited retention
    pub const DEFAULT_RETENTION_TIME: u64 = 0;

    /// Engine-wide fallback duplicate policy
    pub const DEFAULT_DUPLICATE_POLICY: DuplicatePolicy = DuplicatePolicy::Block;

    /// Compaction writes never cascade past the first destination
    pub const MAX_COMPACTION_DEPTH: usize = 1;
}
