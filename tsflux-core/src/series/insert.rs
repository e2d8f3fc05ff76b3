//! Write path: append, upsert and retention trimming

use super::{empty_directory, ChunkKey, Seek, Series};
use crate::chunk::{AddResult, Chunk};
use crate::compaction::{self, DownsampleWrite};
use crate::config::SPLIT_FACTOR;
use crate::{DuplicatePolicy, Result, Sample, Timestamp, TsError};
use tracing::{debug, trace};

impl Series {
    /// Append a sample newer than the last timestamp
    ///
    /// When the last chunk is full, expired chunks are trimmed and a new chunk
    /// keyed by `timestamp` becomes the last chunk. Compaction rules are not
    /// evaluated here.
    pub fn add_sample(&mut self, timestamp: Timestamp, value: f64) -> Result<()> {
        let sample = Sample::new(timestamp, value);

        let status = self
            .chunks
            .last_mut()
            .ok_or_else(|| empty_directory(&self.key))?
            .1
            .add_sample(sample);

        if status == AddResult::Full {
            self.trim();

            let key = ChunkKey::encode(timestamp);
            if self.chunks.contains(&key) {
                return Err(TsError::Malformed(format!(
                    "chunk key {} already present in {}",
                    timestamp, self.key
                )));
            }

            let mut chunk = self.encoding.new_chunk(self.chunk_size_bytes);
            if chunk.add_sample(sample) == AddResult::Full {
                return Err(TsError::Malformed(format!(
                    "new chunk rejected its first sample in {}",
                    self.key
                )));
            }
            self.chunks.set(key, chunk);
            trace!("Opened chunk {} in {}", timestamp, self.key);
        }

        self.last_timestamp = timestamp;
        self.last_value = value;
        self.total_samples += 1;
        Ok(())
    }

    /// Insert or overwrite a sample at any timestamp
    ///
    /// `dp_override` takes precedence over the series policy, which takes
    /// precedence over `default_policy`. Oversized target chunks are split
    /// first. Returns the downsample writes owed to rule destinations.
    pub fn upsert_sample(
        &mut self,
        timestamp: Timestamp,
        value: f64,
        dp_override: DuplicatePolicy,
        default_policy: DuplicatePolicy,
    ) -> Result<Vec<DownsampleWrite>> {
        let (last_key, last_first) = {
            let (key, chunk) = self.chunks.last().ok_or_else(|| empty_directory(&self.key))?;
            (key, chunk.first_timestamp())
        };

        let mut chunk_key = last_key;
        if timestamp < last_first && self.chunks.len() > 1 {
            chunk_key = self
                .chunks
                .seek(Seek::LessOrEqual(ChunkKey::encode(timestamp)))
                .or_else(|| self.chunks.seek(Seek::First))
                .ok_or_else(|| empty_directory(&self.key))?;
        }

        let split_threshold = (self.chunk_size_bytes as f64 * SPLIT_FACTOR) as usize;
        let chunk = self
            .chunks
            .get_mut(&chunk_key)
            .ok_or_else(|| TsError::NotFound(format!("chunk for {} in {}", timestamp, self.key)))?;

        let policy = DuplicatePolicy::resolve(dp_override, self.duplicate_policy, default_policy);

        if chunk.size_bytes(false) > split_threshold {
            if policy.blocks() && contains_timestamp(chunk.as_ref(), timestamp)? {
                return Err(TsError::Blocked { timestamp });
            }
            let tail = chunk.split().ok_or_else(|| {
                TsError::Malformed(format!("oversized chunk refused to split in {}", self.key))
            })?;
            let tail_first = tail.first_timestamp();
            let tail_key = ChunkKey::encode(tail_first);
            if self.chunks.set(tail_key, tail).is_some() {
                return Err(TsError::Malformed(format!(
                    "split chunk collides at {} in {}",
                    tail_first, self.key
                )));
            }
            trace!("Split chunk at {} in {}", tail_first, self.key);

            if timestamp >= tail_first {
                chunk_key = tail_key;
            }
        }

        let chunk = self
            .chunks
            .get_mut(&chunk_key)
            .ok_or_else(|| TsError::NotFound(format!("chunk for {} in {}", timestamp, self.key)))?;

        let first_before = chunk.first_timestamp();
        let result = chunk.upsert_sample(Sample::new(timestamp, value), policy)?;
        let first_after = chunk.first_timestamp();

        if first_after != first_before {
            self.rekey(chunk_key, first_before, first_after)?;
        }

        let advances = self.total_samples == 0 || timestamp > self.last_timestamp;
        self.total_samples = self.total_samples.saturating_add_signed(result.delta);

        // A sample past the last one moves the open buckets like an append
        if advances {
            self.last_timestamp = timestamp;
            self.last_value = result.value;
            return Ok(compaction::append_compaction(
                self,
                Sample::new(timestamp, result.value),
            ));
        }
        if timestamp == self.last_timestamp {
            self.last_value = result.value;
        }

        Ok(compaction::upsert_compaction(self, timestamp))
    }

    /// Move a chunk whose first timestamp changed under its new key
    ///
    /// A chunk is keyed by its old first timestamp, or by 0 if it is the
    /// seed chunk. Anything else means the directory has drifted.
    fn rekey(&mut self, stored_under: ChunkKey, old_first: Timestamp, new_first: Timestamp) -> Result<()> {
        let seed = ChunkKey::encode(0);
        if stored_under != ChunkKey::encode(old_first) {
            if stored_under != seed {
                return Err(TsError::Malformed(format!(
                    "chunk starting at {} is keyed at {} in {}",
                    old_first,
                    stored_under.timestamp(),
                    self.key
                )));
            }
            debug!("Re-keying seed chunk of {} to {}", self.key, new_first);
        }

        let chunk = self
            .chunks
            .delete(&stored_under)
            .ok_or_else(|| empty_directory(&self.key))?;
        if self.chunks.set(ChunkKey::encode(new_first), chunk).is_some() {
            return Err(TsError::Malformed(format!(
                "re-keyed chunk collides at {} in {}",
                new_first, self.key
            )));
        }
        Ok(())
    }

    /// Drop whole chunks that fell out of the retention window
    ///
    /// Returns the number of samples removed.
    pub fn trim(&mut self) -> usize {
        if self.retention_time == 0 {
            return 0;
        }
        let min_timestamp = self.last_timestamp.saturating_sub(self.retention_time);

        let mut removed = 0;
        let mut cursor = self.chunks.seek(Seek::First);
        while let Some(key) = cursor {
            let expired = self
                .chunks
                .get(&key)
                .map_or(false, |c| c.last_timestamp() < min_timestamp);
            if !expired {
                break;
            }
            if let Some(chunk) = self.chunks.delete(&key) {
                removed += chunk.num_samples();
            }
            cursor = self.chunks.seek(Seek::Greater(key));
        }

        if removed > 0 {
            debug!("Trimmed {} samples from {}", removed, self.key);
        }
        self.total_samples = self.total_samples.saturating_sub(removed);
        removed
    }
}

fn contains_timestamp(chunk: &dyn Chunk, timestamp: Timestamp) -> Result<bool> {
    for sample in chunk.iter(false)? {
        let sample = sample?;
        if sample.timestamp >= timestamp {
            return Ok(sample.timestamp == timestamp);
        }
    }
    Ok(false)
}
