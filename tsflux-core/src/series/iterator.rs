//! Range iteration across chunks

use super::{empty_directory, ChunkDirectory, ChunkKey, Seek, Series};
use crate::chunk::{Chunk, ChunkIter};
use crate::{Result, Sample, Timestamp, TsError};
use std::iter::FusedIterator;

impl Series {
    /// Iterate samples with `start <= timestamp <= end`
    ///
    /// Fails on a compressed series when `reverse` is set. Dropping the
    /// iterator closes it.
    pub fn query(&self, start: Timestamp, end: Timestamp, reverse: bool) -> Result<SeriesIterator<'_>> {
        SeriesIterator::new(self, start, end, reverse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Done,
}

/// Ordered range cursor over a series
///
/// Walks the chunk directory starting from the chunk containing the range
/// boundary, skipping samples before the range and stopping at the first
/// sample past it.
pub struct SeriesIterator<'a> {
    chunks: &'a ChunkDirectory<Box<dyn Chunk>>,
    min_timestamp: Timestamp,
    max_timestamp: Timestamp,
    reverse: bool,
    current_key: ChunkKey,
    cursor: Option<ChunkIter<'a>>,
    pending: Option<TsError>,
    state: State,
}

impl<'a> SeriesIterator<'a> {
    fn new(series: &'a Series, start: Timestamp, end: Timestamp, reverse: bool) -> Result<Self> {
        let chunks = &series.chunks;
        let boundary = if reverse { end } else { start };

        let current_key = chunks
            .seek(Seek::LessOrEqual(ChunkKey::encode(boundary)))
            .or_else(|| chunks.seek(Seek::First))
            .ok_or_else(|| empty_directory(series.key()))?;
        let chunk = chunks
            .get(&current_key)
            .ok_or_else(|| empty_directory(series.key()))?;

        // Open errors surface on the first `next`
        let (cursor, pending) = match chunk.iter(reverse) {
            Ok(cursor) => (Some(cursor), None),
            Err(e) => (None, Some(e)),
        };

        Ok(Self {
            chunks,
            min_timestamp: start,
            max_timestamp: end,
            reverse,
            current_key,
            cursor,
            pending,
            state: State::Active,
        })
    }

    /// Release the iterator
    pub fn close(self) {}

    /// Step to the neighbouring chunk; false once the range is exhausted
    fn open_next_chunk(&mut self) -> Result<bool> {
        let chunks = self.chunks;
        let next = if self.reverse {
            chunks.prev_before(&self.current_key)
        } else {
            chunks.next_after(&self.current_key)
        };
        let Some((key, chunk)) = next else {
            return Ok(false);
        };
        // Empty chunks carry no span and are stepped over
        let outside = chunk.first_timestamp() > self.max_timestamp || chunk.last_timestamp() < self.min_timestamp;
        if chunk.num_samples() > 0 && outside {
            return Ok(false);
        }

        self.cursor = None;
        self.cursor = Some(chunk.iter(self.reverse)?);
        self.current_key = key;
        Ok(true)
    }

    fn pull(&mut self) -> Option<Result<Sample>> {
        loop {
            let Some(cursor) = self.cursor.as_mut() else {
                return self.pending.take().map(Err);
            };
            if let Some(item) = cursor.next() {
                return Some(item);
            }
            match self.open_next_chunk() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl Iterator for SeriesIterator<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.state == State::Active {
            let sample = match self.pull() {
                Some(Ok(sample)) => sample,
                Some(Err(e)) => {
                    self.state = State::Done;
                    return Some(Err(e));
                }
                None => break,
            };

            let (before, past) = if self.reverse {
                (sample.timestamp > self.max_timestamp, sample.timestamp < self.min_timestamp)
            } else {
                (sample.timestamp < self.min_timestamp, sample.timestamp > self.max_timestamp)
            };
            if past {
                break;
            }
            if !before {
                return Some(Ok(sample));
            }
        }

        self.state = State::Done;
        None
    }
}

impl FusedIterator for SeriesIterator<'_> {}

#[cfg(test)]
mod tests {
    use super::super::CreateOptions;
    use super::*;
    use crate::SAMPLE_SIZE;

    fn series(uncompressed: bool) -> Series {
        let mut opts = CreateOptions::default().with_chunk_size(4 * SAMPLE_SIZE);
        if uncompressed {
            opts = opts.uncompressed();
        }
        let mut s = Series::new("it", opts);
        for ts in 1..=20 {
            s.add_sample(ts * 10, ts as f64).unwrap();
        }
        s
    }

    fn stamps(iter: SeriesIterator<'_>) -> Vec<u64> {
        iter.map(|s| s.unwrap().timestamp).collect()
    }

    #[test]
    fn test_forward_range_spans_chunks() {
        for uncompressed in [true, false] {
            let s = series(uncompressed);
            assert_eq!(stamps(s.query(35, 95, false).unwrap()), vec![40, 50, 60, 70, 80, 90]);
            assert_eq!(stamps(s.query(0, 25, false).unwrap()), vec![10, 20]);
            assert_eq!(stamps(s.query(190, 1000, false).unwrap()), vec![190, 200]);
            assert!(stamps(s.query(500, 600, false).unwrap()).is_empty());
            assert_eq!(s.query(0, Timestamp::MAX, false).unwrap().count(), 20);
        }
    }

    #[test]
    fn test_reverse_range() {
        let s = series(true);
        assert_eq!(stamps(s.query(35, 95, true).unwrap()), vec![90, 80, 70, 60, 50, 40]);
        assert_eq!(stamps(s.query(0, 30, true).unwrap()), vec![30, 20, 10]);
        assert_eq!(s.query(0, Timestamp::MAX, true).unwrap().count(), 20);
    }

    #[test]
    fn test_reverse_mirrors_forward() {
        let s = series(true);
        for (start, end) in [(0, 200), (15, 185), (40, 40), (55, 130), (201, 300)] {
            let mut forward = stamps(s.query(start, end, false).unwrap());
            forward.reverse();
            assert_eq!(stamps(s.query(start, end, true).unwrap()), forward);
        }
    }

    #[test]
    fn test_reverse_on_compressed_fails() {
        let s = series(false);
        let mut iter = s.query(0, 100, true).unwrap();
        assert!(matches!(iter.next(), Some(Err(TsError::Unsupported(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_empty_series() {
        let s = Series::new("empty", CreateOptions::default());
        let mut iter = s.query(0, 100, false).unwrap();
        assert!(iter.next().is_none());
        iter.close();
    }

    #[test]
    fn test_steps_over_empty_chunk() {
        let mut s = series(true);
        let empty = s.encoding().new_chunk(4 * SAMPLE_SIZE);
        s.chunks.set(ChunkKey::encode(85), empty);

        let expected: Vec<u64> = (4..=15).map(|ts| ts * 10).collect();
        assert_eq!(stamps(s.query(35, 150, false).unwrap()), expected);

        let mut backward = expected;
        backward.reverse();
        assert_eq!(stamps(s.query(35, 150, true).unwrap()), backward);
    }

    #[test]
    fn test_fused_after_end() {
        let s = series(true);
        let mut iter = s.query(10, 10, false).unwrap();
        assert_eq!(iter.next().map(|r| r.unwrap().timestamp), Some(10));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }
}
