//! Gorilla-compressed chunk

use super::{upsert_sorted, AddResult, Chunk, ChunkIter, UpsertResult};
use crate::compression::{decode_samples, encode_samples, GorillaDecoder, GorillaEncoder, MAX_SAMPLE_BITS};
use crate::{DuplicatePolicy, Result, Sample, Timestamp, TsError};
use tracing::error;

/// Chunk storing samples with Gorilla compression
///
/// Appends encode in place. Upserts and splits decode the chunk, edit the
/// sample run and re-encode it. Only forward iteration is supported.
#[derive(Debug, Clone)]
pub struct CompressedChunk {
    encoder: GorillaEncoder,
    budget_bytes: usize,
}

impl CompressedChunk {
    /// Create an empty chunk with the given byte budget
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            encoder: GorillaEncoder::with_capacity(budget_bytes),
            budget_bytes,
        }
    }

    fn from_samples(samples: &[Sample], budget_bytes: usize) -> Self {
        Self {
            encoder: encode_samples(samples, budget_bytes),
            budget_bytes,
        }
    }

    /// Decode all samples
    pub fn decompress(&self) -> Result<Vec<Sample>> {
        decode_samples(&self.encoder)
    }

    /// Room for one more worst-case sample within the budget
    fn has_room(&self) -> bool {
        let bits = self.encoder.bit_len() + MAX_SAMPLE_BITS;
        bits.div_ceil(8) <= self.budget_bytes
    }
}

impl Chunk for CompressedChunk {
    fn first_timestamp(&self) -> Timestamp {
        if self.encoder.count() == 0 {
            0
        } else {
            self.encoder.first_timestamp()
        }
    }

    fn last_timestamp(&self) -> Timestamp {
        if self.encoder.count() == 0 {
            0
        } else {
            self.encoder.last_timestamp()
        }
    }

    fn num_samples(&self) -> usize {
        self.encoder.count()
    }

    fn size_bytes(&self, with_overhead: bool) -> usize {
        if with_overhead {
            self.encoder.capacity().max(self.encoder.size_bytes()) + std::mem::size_of::<Self>()
        } else {
            self.encoder.size_bytes()
        }
    }

    fn add_sample(&mut self, sample: Sample) -> AddResult {
        if self.encoder.count() > 0 && !self.has_room() {
            return AddResult::Full;
        }
        self.encoder.encode(sample);
        AddResult::Added
    }

    fn upsert_sample(&mut self, sample: Sample, policy: DuplicatePolicy) -> Result<UpsertResult> {
        let mut samples = self.decompress()?;
        let result = upsert_sorted(&mut samples, sample, policy)?;
        self.encoder = encode_samples(&samples, self.budget_bytes);
        Ok(result)
    }

    fn split(&mut self) -> Option<Box<dyn Chunk>> {
        if self.encoder.count() < 2 {
            return None;
        }
        let mut samples = match self.decompress() {
            Ok(samples) => samples,
            Err(e) => {
                error!("Refusing to split undecodable chunk: {}", e);
                return None;
            }
        };
        let keep = samples.len() - samples.len() / 2;
        let tail = samples.split_off(keep);

        self.encoder = encode_samples(&samples, self.budget_bytes);
        Some(Box::new(Self::from_samples(&tail, self.budget_bytes)))
    }

    fn iter(&self, reverse: bool) -> Result<ChunkIter<'_>> {
        if reverse {
            return Err(TsError::Unsupported(
                "reverse iteration over compressed chunks".into(),
            ));
        }
        Ok(Box::new(GorillaDecoder::new(
            self.encoder.as_bytes(),
            self.encoder.count(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamps(chunk: &dyn Chunk) -> Vec<u64> {
        chunk
            .iter(false)
            .unwrap()
            .map(|s| s.unwrap().timestamp)
            .collect()
    }

    #[test]
    fn test_fills_to_budget() {
        let mut chunk = CompressedChunk::new(128);
        let mut added = 0u64;
        while chunk.add_sample(Sample::new(1000 + added * 10, added as f64)) == AddResult::Added {
            added += 1;
        }

        assert!(added > 8, "Gorilla should beat 16 bytes/sample, got {}", added);
        assert!(chunk.size_bytes(false) <= 128);
        assert_eq!(chunk.num_samples() as u64, added);
        assert_eq!(chunk.first_timestamp(), 1000);
        assert_eq!(chunk.last_timestamp(), 1000 + (added - 1) * 10);
    }

    #[test]
    fn test_upsert_reencodes() {
        let mut chunk = CompressedChunk::new(4096);
        for ts in [10u64, 20, 40] {
            chunk.add_sample(Sample::new(ts, ts as f64));
        }

        let res = chunk
            .upsert_sample(Sample::new(5, 0.5), DuplicatePolicy::Block)
            .unwrap();
        assert_eq!(res.delta, 1);
        let res = chunk
            .upsert_sample(Sample::new(20, 1.0), DuplicatePolicy::Max)
            .unwrap();
        assert_eq!(res, UpsertResult { delta: 0, value: 20.0 });

        assert_eq!(timestamps(&chunk), vec![5, 10, 20, 40]);
        assert_eq!(chunk.first_timestamp(), 5);
        assert_eq!(chunk.last_timestamp(), 40);
    }

    #[test]
    fn test_split_and_reverse_refused() {
        let mut chunk = CompressedChunk::new(4096);
        for ts in 0..7u64 {
            chunk.add_sample(Sample::new(ts, -(ts as f64)));
        }

        let tail = chunk.split().unwrap();
        assert_eq!(timestamps(&chunk), vec![0, 1, 2, 3]);
        assert_eq!(timestamps(tail.as_ref()), vec![4, 5, 6]);
        assert_eq!(tail.first_timestamp(), 4);

        assert!(matches!(chunk.iter(true), Err(TsError::Unsupported(_))));
    }
}
