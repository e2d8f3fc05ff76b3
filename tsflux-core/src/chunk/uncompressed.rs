//! Plain array chunk

use super::{upsert_sorted, AddResult, Chunk, ChunkIter, UpsertResult};
use crate::{DuplicatePolicy, Result, Sample, Timestamp, SAMPLE_SIZE};

/// Chunk storing samples as a plain array
#[derive(Debug, Clone, Default)]
pub struct UncompressedChunk {
    samples: Vec<Sample>,
    /// Samples accepted by `add_sample` before reporting full
    capacity: usize,
}

impl UncompressedChunk {
    /// Create an empty chunk holding up to `budget_bytes / 16` appended samples
    pub fn new(budget_bytes: usize) -> Self {
        let capacity = (budget_bytes / SAMPLE_SIZE).max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn from_samples(samples: Vec<Sample>) -> Self {
        let capacity = samples.len().max(1);
        Self { samples, capacity }
    }

    /// Samples in timestamp order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Chunk for UncompressedChunk {
    fn first_timestamp(&self) -> Timestamp {
        self.samples.first().map_or(0, |s| s.timestamp)
    }

    fn last_timestamp(&self) -> Timestamp {
        self.samples.last().map_or(0, |s| s.timestamp)
    }

    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn size_bytes(&self, with_overhead: bool) -> usize {
        let data = self.samples.len() * SAMPLE_SIZE;
        if with_overhead {
            data + std::mem::size_of::<Self>()
        } else {
            data
        }
    }

    fn add_sample(&mut self, sample: Sample) -> AddResult {
        if self.samples.len() >= self.capacity {
            return AddResult::Full;
        }
        self.samples.push(sample);
        AddResult::Added
    }

    fn upsert_sample(&mut self, sample: Sample, policy: DuplicatePolicy) -> Result<UpsertResult> {
        upsert_sorted(&mut self.samples, sample, policy)
    }

    fn split(&mut self) -> Option<Box<dyn Chunk>> {
        if self.samples.len() < 2 {
            return None;
        }
        let keep = self.samples.len() - self.samples.len() / 2;
        let tail = self.samples.split_off(keep);

        self.samples.shrink_to_fit();
        self.capacity = self.samples.len();

        Some(Box::new(Self::from_samples(tail)))
    }

    fn iter(&self, reverse: bool) -> Result<ChunkIter<'_>> {
        if reverse {
            Ok(Box::new(self.samples.iter().rev().copied().map(Ok)))
        } else {
            Ok(Box::new(self.samples.iter().copied().map(Ok)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunk: &dyn Chunk, reverse: bool) -> Vec<u64> {
        chunk
            .iter(reverse)
            .unwrap()
            .map(|s| s.unwrap().timestamp)
            .collect()
    }

    #[test]
    fn test_add_until_full() {
        let mut chunk = UncompressedChunk::new(4 * SAMPLE_SIZE);

        for i in 0..4 {
            assert_eq!(chunk.add_sample(Sample::new(i, i as f64)), AddResult::Added);
        }
        assert_eq!(chunk.add_sample(Sample::new(4, 4.0)), AddResult::Full);
        assert_eq!(chunk.num_samples(), 4);
        assert_eq!(chunk.first_timestamp(), 0);
        assert_eq!(chunk.last_timestamp(), 3);
        assert_eq!(chunk.size_bytes(false), 64);
        assert!(chunk.size_bytes(true) > 64);
    }

    #[test]
    fn test_upsert_grows_past_capacity() {
        let mut chunk = UncompressedChunk::new(2 * SAMPLE_SIZE);
        chunk.add_sample(Sample::new(10, 1.0));
        chunk.add_sample(Sample::new(30, 3.0));

        let res = chunk
            .upsert_sample(Sample::new(20, 2.0), DuplicatePolicy::Block)
            .unwrap();
        assert_eq!(res.delta, 1);
        assert_eq!(collect(&chunk, false), vec![10, 20, 30]);
        assert_eq!(collect(&chunk, true), vec![30, 20, 10]);
    }

    #[test]
    fn test_split_moves_tail_half() {
        let mut chunk = UncompressedChunk::new(8 * SAMPLE_SIZE);
        for i in 0..5 {
            chunk.add_sample(Sample::new(i * 10, i as f64));
        }

        let tail = chunk.split().unwrap();
        assert_eq!(collect(&chunk, false), vec![0, 10, 20]);
        assert_eq!(collect(tail.as_ref(), false), vec![30, 40]);

        // Both halves are sized to their contents
        assert_eq!(chunk.add_sample(Sample::new(25, 0.0)), AddResult::Full);

        let mut single = UncompressedChunk::new(64);
        single.add_sample(Sample::new(1, 1.0));
        assert!(single.split().is_none());
    }
}
