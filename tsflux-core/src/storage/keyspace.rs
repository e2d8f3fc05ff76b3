//! Keyspace: series ownership, write routing and rule bookkeeping

use super::{EngineConfig, LabelIndex, MemoryIndex};
use crate::compaction::{self, AggregationType, DownsampleWrite};
use crate::config::MAX_COMPACTION_DEPTH;
use crate::series::{CreateOptions, DeletedSeries, Series};
use crate::{DuplicatePolicy, Label, Result, Sample, Timestamp, TsError};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Token carrying the old name of a series between the two rename phases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRename {
    from: String,
}

impl PendingRename {
    pub fn from_key(&self) -> &str {
        &self.from
    }
}

/// Named series plus the label index that tracks them
pub struct Keyspace<I: LabelIndex = MemoryIndex> {
    config: EngineConfig,
    series: HashMap<String, Series>,
    index: I,
}

impl Keyspace {
    /// Create an empty keyspace with an in-memory label index
    pub fn new(config: EngineConfig) -> Self {
        Self::with_index(config, MemoryIndex::new())
    }
}

impl<I: LabelIndex> Keyspace<I> {
    pub fn with_index(config: EngineConfig, index: I) -> Self {
        Self {
            config,
            series: HashMap::new(),
            index,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn get(&self, key: &str) -> Option<&Series> {
        self.series.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Series> {
        self.series.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.series.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Series keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.series.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.series.values()
    }

    fn series_ref(&self, key: &str) -> Result<&Series> {
        self.series
            .get(key)
            .ok_or_else(|| TsError::NotFound(format!("series {}", key)))
    }

    fn series_mut(&mut self, key: &str) -> Result<&mut Series> {
        self.series
            .get_mut(key)
            .ok_or_else(|| TsError::NotFound(format!("series {}", key)))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a series, plus one destination per configured default rule
    pub fn create_series(&mut self, key: &str, options: CreateOptions) -> Result<()> {
        self.insert_series(key, options)?;

        let templates = self.config.compaction_rules.clone();
        if templates.is_empty() {
            return Ok(());
        }

        let labels = self.series_ref(key)?.labels().to_vec();
        for template in templates {
            let dest_key = format!("{}_{}_{}", key, template.aggregation, template.time_bucket);
            if self.contains(&dest_key) {
                warn!("Cannot create compaction series {}: key already exists", dest_key);
                continue;
            }

            let mut options = CreateOptions::from_config(&self.config).with_retention(template.retention_time);
            options.labels = labels.clone();
            options.labels.push(Label::new("aggregation", template.aggregation.as_str()));
            options.labels.push(Label::new("time_bucket", template.time_bucket.to_string()));

            self.series_mut(key)?
                .add_rule(dest_key.clone(), template.aggregation, template.time_bucket)?;
            self.insert_series(&dest_key, options)?;
            self.series_mut(&dest_key)?.set_src_rule(key);
            info!("Created compaction series {} for {}", dest_key, key);
        }
        Ok(())
    }

    fn insert_series(&mut self, key: &str, options: CreateOptions) -> Result<()> {
        if self.contains(key) {
            return Err(TsError::SeriesExists(key.to_string()));
        }
        let series = Series::new(key, options);
        self.index.index_metric(key, series.labels());
        self.series.insert(key.to_string(), series);
        info!("Created series {}", key);
        Ok(())
    }

    /// Delete a series and unlink its compaction partners
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let series = self
            .series
            .remove(key)
            .ok_or_else(|| TsError::NotFound(format!("series {}", key)))?;
        let deleted = series.free();
        self.index.remove_indexed_metric(&deleted.key, &deleted.labels);
        info!("Deleted series {}", key);
        self.clean_deleted_series(deleted);
        Ok(())
    }

    /// Drop every reference to a freed series
    pub fn clean_deleted_series(&mut self, deleted: DeletedSeries) {
        for dest in &deleted.rule_dests {
            if let Some(series) = self.series.get_mut(dest) {
                series.delete_src_rule(&deleted.key);
            }
        }
        if let Some(src) = &deleted.src_key {
            if let Some(series) = self.series.get_mut(src) {
                series.delete_rule(&deleted.key);
            }
        }
    }

    /// Rename a series, replacing any series already named `to`
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return self.series_ref(from).map(|_| ());
        }
        self.series_ref(from)?;
        if self.contains(to) {
            self.delete(to)?;
        }

        let pending = self.rename_series_from(from);
        let mut series = self
            .series
            .remove(from)
            .ok_or_else(|| TsError::NotFound(format!("series {}", from)))?;
        series.set_key(to);
        self.series.insert(to.to_string(), series);
        self.rename_series_to(pending, to);

        info!("Renamed series {} to {}", from, to);
        Ok(())
    }

    /// First rename phase: remember the old name
    pub fn rename_series_from(&self, key: &str) -> PendingRename {
        PendingRename {
            from: key.to_string(),
        }
    }

    /// Second rename phase: fix the index and rule links of the series now at `to`
    pub fn rename_series_to(&mut self, pending: PendingRename, to: &str) {
        let Some(series) = self.series.get(to) else {
            return;
        };
        let labels = series.labels().to_vec();
        let src_key = series.src_key().map(str::to_string);
        let dests: Vec<String> = series.rules().iter().map(|r| r.dest_key().to_string()).collect();

        self.index.remove_indexed_metric(&pending.from, &labels);
        self.index.index_metric(to, &labels);

        if let Some(src) = src_key {
            match self.series.get_mut(&src) {
                Some(source) => {
                    source.repoint_rule_dest(&pending.from, to);
                }
                None => warn!("couldn't open key or key is not a series. key={}", src),
            }
        }

        for dest in dests {
            match self.series.get_mut(&dest) {
                Some(destination) => destination.repoint_src(to),
                None => warn!("couldn't open key or key is not a series. key={}", dest),
            }
        }
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Link `src` to `dest` through a downsampling rule
    pub fn create_rule(
        &mut self,
        src: &str,
        dest: &str,
        aggregation: AggregationType,
        time_bucket: u64,
    ) -> Result<()> {
        if src == dest {
            return Err(TsError::InvalidArgument(
                "source and destination key cannot be equal".into(),
            ));
        }
        if time_bucket == 0 {
            return Err(TsError::InvalidArgument(
                "compaction time bucket must be positive".into(),
            ));
        }

        let source = self.series_ref(src)?;
        if source.src_key().is_some() {
            return Err(TsError::InvalidArgument(format!(
                "{} is already a compaction destination",
                src
            )));
        }
        let destination = self.series_ref(dest)?;
        if destination.src_key().is_some() || !destination.rules().is_empty() {
            return Err(TsError::InvalidArgument(format!(
                "{} already has a source or owns rules",
                dest
            )));
        }

        self.series_mut(src)?.add_rule(dest, aggregation, time_bucket)?;
        self.series_mut(dest)?.set_src_rule(src);
        debug!("Created rule {} -> {} ({} {})", src, dest, aggregation, time_bucket);
        Ok(())
    }

    /// Remove the rule from `src` into `dest`
    pub fn delete_rule(&mut self, src: &str, dest: &str) -> Result<()> {
        if !self.series_mut(src)?.delete_rule(dest) {
            return Err(TsError::NotFound(format!("compaction rule {} -> {}", src, dest)));
        }
        if let Some(destination) = self.series.get_mut(dest) {
            destination.delete_src_rule(src);
        }
        Ok(())
    }

    // =========================================================================
    // Writes and reads
    // =========================================================================

    /// Add a sample, appending or upserting as its timestamp requires
    ///
    /// Returns the stored timestamp.
    pub fn add(
        &mut self,
        key: &str,
        timestamp: Timestamp,
        value: f64,
        dp_override: DuplicatePolicy,
    ) -> Result<Timestamp> {
        let default_policy = self.config.duplicate_policy;

        let (is_upsert, stale) = {
            let series = self.series_ref(key)?;
            let last = series.last_timestamp();
            let retention = series.retention_time();
            if retention > 0 && timestamp < last && last - timestamp > retention {
                return Err(TsError::TooOld {
                    timestamp,
                    min_timestamp: last - retention,
                });
            }

            let stale: Vec<String> = series
                .rules()
                .iter()
                .map(|r| r.dest_key())
                .filter(|dest| !self.series.contains_key(*dest))
                .map(str::to_string)
                .collect();
            (!series.is_empty() && timestamp <= last, stale)
        };

        let series = self.series_mut(key)?;
        let writes = if is_upsert {
            series.upsert_sample(timestamp, value, dp_override, default_policy)?
        } else {
            series.add_sample(timestamp, value)?;
            for dest in &stale {
                debug!("Dropping rule {} -> {}: destination is gone", key, dest);
                series.delete_rule(dest);
            }
            compaction::append_compaction(series, Sample::new(timestamp, value))
        };

        self.deliver(writes, 1);
        Ok(timestamp)
    }

    /// Upsert a sample directly, bypassing append routing
    pub fn upsert(
        &mut self,
        key: &str,
        timestamp: Timestamp,
        value: f64,
        dp_override: DuplicatePolicy,
    ) -> Result<()> {
        let default_policy = self.config.duplicate_policy;
        let writes = self
            .series_mut(key)?
            .upsert_sample(timestamp, value, dp_override, default_policy)?;
        self.deliver(writes, 1);
        Ok(())
    }

    /// Apply downsample writes to their destinations
    fn deliver(&mut self, writes: Vec<DownsampleWrite>, depth: usize) {
        for write in writes {
            if depth > MAX_COMPACTION_DEPTH {
                warn!(
                    "Dropping downsample write to {} at depth {}",
                    write.dest_key, depth
                );
                continue;
            }
            let Some(dest) = self.series.get_mut(&write.dest_key) else {
                debug!("Failed to retrieve downsample series {}", write.dest_key);
                continue;
            };
            match write.apply(dest) {
                Ok(more) if !more.is_empty() => self.deliver(more, depth + 1),
                Ok(_) => {}
                Err(e) => debug!("Failed to write downsample to {}: {}", write.dest_key, e),
            }
        }
    }

    /// Collect `[start, end]` of a series
    pub fn range(&self, key: &str, start: Timestamp, end: Timestamp, reverse: bool) -> Result<Vec<Sample>> {
        self.series_ref(key)?.range(start, end, reverse)
    }
}
