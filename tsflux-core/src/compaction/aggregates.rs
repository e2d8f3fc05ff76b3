//! Aggregation functions used by compaction rules

use crate::{Result, TsError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accumulator for computing aggregates incrementally
///
/// `result` is `None` until at least one value has been added.
pub trait Accumulator: fmt::Debug + Send + Sync {
    /// Add a value to the accumulator
    fn add(&mut self, value: f64);

    /// Get the current result
    fn result(&self) -> Option<f64>;

    /// Reset the accumulator
    fn reset(&mut self);
}

/// Aggregation applied by a compaction rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "sum")]
    Sum,
    #[serde(rename = "avg")]
    Avg,
    #[serde(rename = "count")]
    Count,
    #[serde(rename = "first")]
    First,
    #[serde(rename = "last")]
    Last,
    #[serde(rename = "range")]
    Range,
    #[serde(rename = "var.p")]
    VarP,
    #[serde(rename = "var.s")]
    VarS,
    #[serde(rename = "std.p")]
    StdP,
    #[serde(rename = "std.s")]
    StdS,
}

impl AggregationType {
    /// Fresh accumulator for this aggregation
    pub fn accumulator(&self) -> Box<dyn Accumulator> {
        match self {
            AggregationType::Min => Box::<MinAccumulator>::default(),
            AggregationType::Max => Box::<MaxAccumulator>::default(),
            AggregationType::Sum => Box::<SumAccumulator>::default(),
            AggregationType::Avg => Box::<MeanAccumulator>::default(),
            AggregationType::Count => Box::<CountAccumulator>::default(),
            AggregationType::First => Box::<FirstAccumulator>::default(),
            AggregationType::Last => Box::<LastAccumulator>::default(),
            AggregationType::Range => Box::<RangeAccumulator>::default(),
            AggregationType::VarP => Box::new(VarianceAccumulator::population()),
            AggregationType::VarS => Box::new(VarianceAccumulator::sample()),
            AggregationType::StdP => Box::new(StddevAccumulator(VarianceAccumulator::population())),
            AggregationType::StdS => Box::new(StddevAccumulator(VarianceAccumulator::sample())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Min => "MIN",
            AggregationType::Max => "MAX",
            AggregationType::Sum => "SUM",
            AggregationType::Avg => "AVG",
            AggregationType::Count => "COUNT",
            AggregationType::First => "FIRST",
            AggregationType::Last => "LAST",
            AggregationType::Range => "RANGE",
            AggregationType::VarP => "VAR.P",
            AggregationType::VarS => "VAR.S",
            AggregationType::StdP => "STD.P",
            AggregationType::StdS => "STD.S",
        }
    }
}

impl FromStr for AggregationType {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "min" => Ok(AggregationType::Min),
            "max" => Ok(AggregationType::Max),
            "sum" => Ok(AggregationType::Sum),
            "avg" => Ok(AggregationType::Avg),
            "count" => Ok(AggregationType::Count),
            "first" => Ok(AggregationType::First),
            "last" => Ok(AggregationType::Last),
            "range" => Ok(AggregationType::Range),
            "var.p" => Ok(AggregationType::VarP),
            "var.s" => Ok(AggregationType::VarS),
            "std.p" => Ok(AggregationType::StdP),
            "std.s" => Ok(AggregationType::StdS),
            _ => Err(TsError::InvalidArgument(format!(
                "Unknown aggregation: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count accumulator
#[derive(Debug, Default)]
pub struct CountAccumulator {
    count: u64,
}

impl Accumulator for CountAccumulator {
    fn add(&mut self, _value: f64) {
        self.count += 1;
    }

    fn result(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.count as f64)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Sum accumulator
#[derive(Debug, Default)]
pub struct SumAccumulator {
    sum: f64,
    count: u64,
}

impl Accumulator for SumAccumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn result(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.sum)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

/// Mean accumulator
#[derive(Debug, Default)]
pub struct MeanAccumulator {
    sum: f64,
    count: u64,
}

impl Accumulator for MeanAccumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn result(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.sum / self.count as f64)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

/// Min accumulator
#[derive(Debug, Default)]
pub struct MinAccumulator {
    min: Option<f64>,
}

impl Accumulator for MinAccumulator {
    fn add(&mut self, value: f64) {
        self.min = Some(match self.min {
            Some(current) => current.min(value),
            None => value,
        });
    }

    fn result(&self) -> Option<f64> {
        self.min
    }

    fn reset(&mut self) {
        self.min = None;
    }
}

/// Max accumulator
#[derive(Debug, Default)]
pub struct MaxAccumulator {
    max: Option<f64>,
}

impl Accumulator for MaxAccumulator {
    fn add(&mut self, value: f64) {
        self.max = Some(match self.max {
            Some(current) => current.max(value),
            None => value,
        });
    }

    fn result(&self) -> Option<f64> {
        self.max
    }

    fn reset(&mut self) {
        self.max = None;
    }
}

/// Range accumulator (max - min)
#[derive(Debug, Default)]
pub struct RangeAccumulator {
    min: MinAccumulator,
    max: MaxAccumulator,
}

impl Accumulator for RangeAccumulator {
    fn add(&mut self, value: f64) {
        self.min.add(value);
        self.max.add(value);
    }

    fn result(&self) -> Option<f64> {
        Some(self.max.result()? - self.min.result()?)
    }

    fn reset(&mut self) {
        self.min.reset();
        self.max.reset();
    }
}

/// First value accumulator (values arrive in timestamp order)
#[derive(Debug, Default)]
pub struct FirstAccumulator {
    value: Option<f64>,
}

impl Accumulator for FirstAccumulator {
    fn add(&mut self, value: f64) {
        if self.value.is_none() {
            self.value = Some(value);
        }
    }

    fn result(&self) -> Option<f64> {
        self.value
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

/// Last value accumulator
#[derive(Debug, Default)]
pub struct LastAccumulator {
    value: Option<f64>,
}

impl Accumulator for LastAccumulator {
    fn add(&mut self, value: f64) {
        self.value = Some(value);
    }

    fn result(&self) -> Option<f64> {
        self.value
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

/// Variance accumulator (Welford's algorithm)
#[derive(Debug, Default)]
pub struct VarianceAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
    /// Divide by n - 1 instead of n
    sample: bool,
}

impl VarianceAccumulator {
    pub fn population() -> Self {
        Self::default()
    }

    pub fn sample() -> Self {
        Self {
            sample: true,
            ..Self::default()
        }
    }
}

impl Accumulator for VarianceAccumulator {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    fn result(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            n if self.sample => Some(self.m2 / (n - 1) as f64),
            n => Some(self.m2 / n as f64),
        }
    }

    fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
    }
}

/// Standard deviation accumulator
#[derive(Debug)]
pub struct StddevAccumulator(VarianceAccumulator);

impl Accumulator for StddevAccumulator {
    fn add(&mut self, value: f64) {
        self.0.add(value);
    }

    fn result(&self) -> Option<f64> {
        self.0.result().map(f64::sqrt)
    }

    fn reset(&mut self) {
        self.0.reset();
    }
}
