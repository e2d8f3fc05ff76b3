//! Downsampling compaction rules
//!
//! A rule aggregates a source series into fixed time buckets and writes one
//! sample per bucket into a destination series. Rule evaluation runs against
//! the source only: it produces [`DownsampleWrite`]s which the keyspace then
//! delivers to the destinations.

mod aggregates;

pub use aggregates::{
    Accumulator, AggregationType, CountAccumulator, FirstAccumulator, LastAccumulator,
    MaxAccumulator, MeanAccumulator, MinAccumulator, RangeAccumulator, StddevAccumulator,
    SumAccumulator, VarianceAccumulator,
};

use crate::series::Series;
use crate::{DuplicatePolicy, Result, Sample, Timestamp, TsError};
use tracing::debug;

/// A downsampling rule owned by its source series
#[derive(Debug)]
pub struct CompactionRule {
    dest_key: String,
    aggregation: AggregationType,
    time_bucket: u64,
    context: Box<dyn Accumulator>,
    /// Start of the open bucket; `None` until the first sample is seen
    bucket_start: Option<Timestamp>,
}

impl CompactionRule {
    pub fn new(dest_key: impl Into<String>, aggregation: AggregationType, time_bucket: u64) -> Result<Self> {
        if time_bucket == 0 {
            return Err(TsError::InvalidArgument(
                "compaction time bucket must be positive".into(),
            ));
        }
        Ok(Self {
            dest_key: dest_key.into(),
            aggregation,
            time_bucket,
            context: aggregation.accumulator(),
            bucket_start: None,
        })
    }

    pub fn dest_key(&self) -> &str {
        &self.dest_key
    }

    pub(crate) fn set_dest_key(&mut self, dest_key: impl Into<String>) {
        self.dest_key = dest_key.into();
    }

    pub fn aggregation(&self) -> AggregationType {
        self.aggregation
    }

    pub fn time_bucket(&self) -> u64 {
        self.time_bucket
    }

    pub fn bucket_start(&self) -> Option<Timestamp> {
        self.bucket_start
    }

    /// Aggregate of the open bucket so far
    pub fn current_value(&self) -> Option<f64> {
        self.context.result()
    }
}

/// A finalized bucket owed to a destination series
#[derive(Debug, Clone, PartialEq)]
pub struct DownsampleWrite {
    pub dest_key: String,
    pub sample: Sample,
}

impl DownsampleWrite {
    fn new(dest_key: &str, timestamp: Timestamp, value: f64) -> Self {
        Self {
            dest_key: dest_key.to_string(),
            sample: Sample::new(timestamp, value),
        }
    }

    /// Store the bucket in `dest`
    ///
    /// Newer buckets are appended; a bucket at or before the destination's
    /// last timestamp overwrites it. Returns any writes the destination's own
    /// rules produce.
    pub fn apply(&self, dest: &mut Series) -> Result<Vec<DownsampleWrite>> {
        let Sample { timestamp, value } = self.sample;
        if dest.is_empty() || timestamp > dest.last_timestamp() {
            dest.add_sample(timestamp, value)?;
            Ok(append_compaction(dest, self.sample))
        } else {
            dest.upsert_sample(timestamp, value, DuplicatePolicy::Last, DuplicatePolicy::Last)
        }
    }
}

/// Start of the bucket containing `timestamp`
pub fn calc_window_start(timestamp: Timestamp, window: u64) -> Timestamp {
    timestamp - timestamp % window
}

/// Aggregate every sample of `series` in `[start, end]`
pub fn calc_range(
    series: &Series,
    start: Timestamp,
    end: Timestamp,
    aggregation: AggregationType,
) -> Result<Box<dyn Accumulator>> {
    let mut context = aggregation.accumulator();
    let mut iter = series.query(start, end, false)?;
    for sample in iter.by_ref() {
        context.add(sample?.value);
    }
    iter.close();
    Ok(context)
}

/// Advance every rule of `series` with a freshly appended sample
///
/// A sample past the open bucket closes it: the bucket's aggregate becomes a
/// write at the bucket start and the rule moves on.
pub fn append_compaction(series: &mut Series, sample: Sample) -> Vec<DownsampleWrite> {
    let mut writes = Vec::new();
    for rule in series.rules.iter_mut() {
        let bucket = calc_window_start(sample.timestamp, rule.time_bucket);
        let current = *rule.bucket_start.get_or_insert(bucket);

        if bucket > current {
            match rule.context.result() {
                Some(value) => writes.push(DownsampleWrite::new(&rule.dest_key, current, value)),
                None => debug!("Empty bucket {} for {}", current, rule.dest_key),
            }
            rule.context.reset();
            rule.bucket_start = Some(bucket);
        }
        rule.context.add(sample.value);
    }
    writes
}

/// Re-evaluate the rules of `series` after an upsert at `timestamp`
///
/// An upsert inside the open bucket recomputes the running aggregate. An
/// upsert into a closed bucket recomputes that bucket and returns it as a
/// write. Rules whose recomputation fails are skipped.
pub fn upsert_compaction(series: &mut Series, timestamp: Timestamp) -> Vec<DownsampleWrite> {
    let last_timestamp = series.last_timestamp;
    let mut writes = Vec::new();

    for idx in 0..series.rules.len() {
        let (aggregation, bucket) = {
            let rule = &series.rules[idx];
            (rule.aggregation, rule.time_bucket)
        };
        let window_start = calc_window_start(last_timestamp, bucket);

        if timestamp >= window_start {
            match calc_range(series, window_start, Timestamp::MAX, aggregation) {
                Ok(context) => {
                    let rule = &mut series.rules[idx];
                    // An open bucket left behind by the last sample is closed first
                    if let Some(stale) = rule.bucket_start.filter(|start| *start < window_start) {
                        if let Some(value) = rule.context.result() {
                            writes.push(DownsampleWrite::new(&rule.dest_key, stale, value));
                        }
                    }
                    rule.context = context;
                    rule.bucket_start = Some(window_start);
                }
                Err(e) => debug!(
                    "Failed to recompute open bucket of {}: {}",
                    series.rules[idx].dest_key, e
                ),
            }
        } else {
            let start = calc_window_start(timestamp, bucket);
            let end = start.saturating_add(bucket - 1);
            match calc_range(series, start, end, aggregation) {
                Ok(context) => match context.result() {
                    Some(value) => {
                        writes.push(DownsampleWrite::new(&series.rules[idx].dest_key, start, value))
                    }
                    None => debug!("Empty bucket {} for {}", start, series.rules[idx].dest_key),
                },
                Err(e) => debug!(
                    "Failed to recompute bucket {} of {}: {}",
                    start, series.rules[idx].dest_key, e
                ),
            }
        }
    }
    writes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::CreateOptions;

    fn source(rules: &[(AggregationType, u64)]) -> Series {
        let mut s = Series::new("src", CreateOptions::default());
        for (agg, bucket) in rules {
            s.add_rule(format!("src_{}_{}", agg, bucket), *agg, *bucket).unwrap();
        }
        s
    }

    fn append(series: &mut Series, timestamp: Timestamp, value: f64) -> Vec<DownsampleWrite> {
        series.add_sample(timestamp, value).unwrap();
        append_compaction(series, Sample::new(timestamp, value))
    }

    #[test]
    fn test_window_start() {
        assert_eq!(calc_window_start(0, 60), 0);
        assert_eq!(calc_window_start(59, 60), 0);
        assert_eq!(calc_window_start(60, 60), 60);
        assert_eq!(calc_window_start(125, 60), 120);
        assert!(CompactionRule::new("d", AggregationType::Avg, 0).is_err());
    }

    #[test]
    fn test_append_closes_buckets() {
        let mut s = source(&[(AggregationType::Sum, 60)]);

        assert!(append(&mut s, 10, 1.0).is_empty());
        assert!(append(&mut s, 30, 2.0).is_empty());
        assert_eq!(s.rules()[0].bucket_start(), Some(0));

        let writes = append(&mut s, 70, 3.0);
        assert_eq!(
            writes,
            vec![DownsampleWrite::new("src_SUM_60", 0, 3.0)]
        );
        assert_eq!(s.rules()[0].bucket_start(), Some(60));
        assert_eq!(s.rules()[0].current_value(), Some(3.0));

        // Skipping buckets emits only the open one
        let writes = append(&mut s, 300, 4.0);
        assert_eq!(writes, vec![DownsampleWrite::new("src_SUM_60", 60, 3.0)]);
        assert_eq!(s.rules()[0].bucket_start(), Some(300));
    }

    #[test]
    fn test_upsert_into_open_bucket_recomputes_context() {
        let mut s = source(&[(AggregationType::Max, 100)]);
        append(&mut s, 110, 1.0);
        append(&mut s, 150, 2.0);

        s.upsert_sample(120, 9.0, DuplicatePolicy::Last, DuplicatePolicy::Block).unwrap();
        let rule = &s.rules()[0];
        assert_eq!(rule.current_value(), Some(9.0));
        assert_eq!(rule.bucket_start(), Some(100));
    }

    #[test]
    fn test_upsert_into_closed_bucket_emits_write() {
        let mut s = source(&[(AggregationType::Avg, 100), (AggregationType::Count, 100)]);
        for (ts, v) in [(10, 2.0), (20, 4.0), (150, 1.0)] {
            append(&mut s, ts, v);
        }

        let writes = s
            .upsert_sample(30, 6.0, DuplicatePolicy::Last, DuplicatePolicy::Block)
            .unwrap();
        assert_eq!(
            writes,
            vec![
                DownsampleWrite::new("src_AVG_100", 0, 4.0),
                DownsampleWrite::new("src_COUNT_100", 0, 3.0),
            ]
        );
    }

    #[test]
    fn test_upsert_past_last_advances_buckets() {
        let mut s = source(&[(AggregationType::Sum, 60)]);
        append(&mut s, 10, 1.0);
        append(&mut s, 30, 2.0);

        let writes = s
            .upsert_sample(130, 5.0, DuplicatePolicy::None, DuplicatePolicy::Block)
            .unwrap();
        assert_eq!(writes, vec![DownsampleWrite::new("src_SUM_60", 0, 3.0)]);
        assert_eq!(s.rules()[0].bucket_start(), Some(120));
        assert_eq!(s.rules()[0].current_value(), Some(5.0));

        // At the last timestamp the open bucket is recomputed in place
        let writes = s
            .upsert_sample(130, 1.0, DuplicatePolicy::Sum, DuplicatePolicy::Block)
            .unwrap();
        assert!(writes.is_empty());
        assert_eq!(s.rules()[0].bucket_start(), Some(120));
        assert_eq!(s.rules()[0].current_value(), Some(6.0));
    }

    #[test]
    fn test_upsert_closes_stale_open_bucket() {
        let mut s = source(&[(AggregationType::Sum, 60)]);
        append(&mut s, 10, 1.0);
        // Appended without running the rules: bucket 0 is still open
        s.add_sample(130, 5.0).unwrap();

        let writes = s
            .upsert_sample(130, 1.0, DuplicatePolicy::Sum, DuplicatePolicy::Block)
            .unwrap();
        assert_eq!(writes, vec![DownsampleWrite::new("src_SUM_60", 0, 1.0)]);
        assert_eq!(s.rules()[0].bucket_start(), Some(120));
        assert_eq!(s.rules()[0].current_value(), Some(6.0));
    }

    #[test]
    fn test_apply_appends_or_overwrites() {
        let mut dest = Series::new("dest", CreateOptions::default());

        DownsampleWrite::new("dest", 0, 1.0).apply(&mut dest).unwrap();
        DownsampleWrite::new("dest", 60, 2.0).apply(&mut dest).unwrap();
        DownsampleWrite::new("dest", 0, 5.0).apply(&mut dest).unwrap();

        let samples = dest.range(0, Timestamp::MAX, false).unwrap();
        assert_eq!(samples, vec![Sample::new(0, 5.0), Sample::new(60, 2.0)]);
        assert_eq!(dest.num_samples(), 2);
    }
}
