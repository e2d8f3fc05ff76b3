//! Chunks: bounded, time-ordered sample containers
//!
//! A series stores its samples in chunks. Every chunk encoding implements the
//! [`Chunk`] trait; the encoding is picked once per series through
//! [`ChunkEncoding`] and never changes for the lifetime of the series.

mod compressed;
mod uncompressed;

pub use compressed::CompressedChunk;
pub use uncompressed::UncompressedChunk;

use crate::{DuplicatePolicy, Result, Sample, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of appending to a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// Sample stored
    Added,
    /// Chunk is full; the caller must open a new chunk
    Full,
}

/// Outcome of a successful upsert
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpsertResult {
    /// Change in the chunk's sample count
    pub delta: isize,
    /// Value stored at the timestamp after duplicate resolution
    pub value: f64,
}

/// Cursor over the samples of one chunk
pub type ChunkIter<'a> = Box<dyn Iterator<Item = Result<Sample>> + 'a>;

/// Capability contract every chunk encoding satisfies
pub trait Chunk: fmt::Debug + Send + Sync {
    /// Timestamp of the first sample (0 when empty)
    fn first_timestamp(&self) -> Timestamp;

    /// Timestamp of the last sample (0 when empty)
    fn last_timestamp(&self) -> Timestamp;

    /// Number of samples held
    fn num_samples(&self) -> usize;

    /// Data size in bytes, optionally including the struct itself
    fn size_bytes(&self, with_overhead: bool) -> usize;

    /// Append a sample at the end of the chunk
    fn add_sample(&mut self, sample: Sample) -> AddResult;

    /// Insert a sample in order, resolving an existing timestamp with `policy`
    fn upsert_sample(&mut self, sample: Sample, policy: DuplicatePolicy) -> Result<UpsertResult>;

    /// Move the tail half of the samples into a new chunk of the same encoding
    ///
    /// Returns `None` if the chunk holds fewer than two samples.
    fn split(&mut self) -> Option<Box<dyn Chunk>>;

    /// Open a cursor over the chunk, oldest-first or newest-first
    fn iter(&self, reverse: bool) -> Result<ChunkIter<'_>>;
}

/// Chunk encoding of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkEncoding {
    /// Gorilla-compressed samples
    #[default]
    Compressed,
    /// Plain sample array
    Uncompressed,
}

impl ChunkEncoding {
    /// Create an empty chunk with the given byte budget
    pub fn new_chunk(&self, budget_bytes: usize) -> Box<dyn Chunk> {
        match self {
            ChunkEncoding::Compressed => Box::new(CompressedChunk::new(budget_bytes)),
            ChunkEncoding::Uncompressed => Box::new(UncompressedChunk::new(budget_bytes)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkEncoding::Compressed => "compressed",
            ChunkEncoding::Uncompressed => "uncompressed",
        }
    }
}

impl fmt::Display for ChunkEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered insert into a sorted sample run, shared by both encodings
pub(crate) fn upsert_sorted(
    samples: &mut Vec<Sample>,
    sample: Sample,
    policy: DuplicatePolicy,
) -> Result<UpsertResult> {
    let idx = samples.partition_point(|s| s.timestamp < sample.timestamp);

    if let Some(existing) = samples.get_mut(idx) {
        if existing.timestamp == sample.timestamp {
            let value = policy.merge(*existing, sample)?;
            existing.value = value;
            return Ok(UpsertResult { delta: 0, value });
        }
    }

    samples.insert(idx, sample);
    Ok(UpsertResult {
        delta: 1,
        value: sample.value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(samples: &[(u64, f64)]) -> Vec<Sample> {
        samples.iter().map(|(t, v)| Sample::new(*t, *v)).collect()
    }

    #[test]
    fn test_upsert_sorted_positions() {
        let mut samples = run(&[(10, 1.0), (20, 2.0), (30, 3.0)]);

        let res = upsert_sorted(&mut samples, Sample::new(5, 0.5), DuplicatePolicy::Block).unwrap();
        assert_eq!(res.delta, 1);
        let res = upsert_sorted(&mut samples, Sample::new(25, 2.5), DuplicatePolicy::Block).unwrap();
        assert_eq!(res.delta, 1);
        let res = upsert_sorted(&mut samples, Sample::new(40, 4.0), DuplicatePolicy::Block).unwrap();
        assert_eq!(res.delta, 1);

        let ts: Vec<u64> = samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![5, 10, 20, 25, 30, 40]);
    }

    #[test]
    fn test_upsert_sorted_duplicate() {
        let mut samples = run(&[(10, 1.0), (20, 2.0)]);

        let res = upsert_sorted(&mut samples, Sample::new(20, 5.0), DuplicatePolicy::Sum).unwrap();
        assert_eq!(res, UpsertResult { delta: 0, value: 7.0 });
        assert_eq!(samples[1].value, 7.0);

        let err = upsert_sorted(&mut samples, Sample::new(10, 9.0), DuplicatePolicy::Block);
        assert!(err.unwrap_err().is_blocked());
        assert_eq!(samples, run(&[(10, 1.0), (20, 7.0)]));
    }

    #[test]
    fn test_encoding_factory() {
        let chunk = ChunkEncoding::Uncompressed.new_chunk(64);
        assert_eq!(chunk.num_samples(), 0);
        assert!(chunk.iter(true).is_ok());

        let chunk = ChunkEncoding::default().new_chunk(64);
        assert_eq!(chunk.first_timestamp(), 0);
        assert!(chunk.iter(true).is_err());
    }
}
