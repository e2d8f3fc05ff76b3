//! Core types for TSFlux

use crate::{Result, TsError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp, unsigned, in the unit chosen by the host (usually milliseconds)
pub type Timestamp = u64;

/// A single sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Size of one uncompressed sample in bytes
pub const SAMPLE_SIZE: usize = std::mem::size_of::<Sample>();

/// A series label (name/value pair)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    /// Create a new label
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Get the size in bytes (approximate)
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + 2
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// How an insert at an already-present timestamp is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Not set; defer to the next level (series, then engine default)
    #[default]
    None,
    /// Reject the insert
    Block,
    /// Keep the new value
    Last,
    /// Keep the existing value
    First,
    /// Keep the smaller value
    Min,
    /// Keep the larger value
    Max,
    /// Store the sum of both values
    Sum,
}

impl DuplicatePolicy {
    /// Pick the first policy that is set: override, series, engine default
    pub fn resolve(
        dp_override: DuplicatePolicy,
        series: DuplicatePolicy,
        default: DuplicatePolicy,
    ) -> DuplicatePolicy {
        if dp_override != DuplicatePolicy::None {
            dp_override
        } else if series != DuplicatePolicy::None {
            series
        } else {
            default
        }
    }

    /// Whether a duplicate timestamp is rejected under this policy
    pub fn blocks(self) -> bool {
        matches!(self, DuplicatePolicy::None | DuplicatePolicy::Block)
    }

    /// Merge an incoming sample with the existing one at the same timestamp
    pub fn merge(self, existing: Sample, incoming: Sample) -> Result<f64> {
        match self {
            DuplicatePolicy::None | DuplicatePolicy::Block => Err(TsError::Blocked {
                timestamp: incoming.timestamp,
            }),
            DuplicatePolicy::Last => Ok(incoming.value),
            DuplicatePolicy::First => Ok(existing.value),
            DuplicatePolicy::Min => Ok(existing.value.min(incoming.value)),
            DuplicatePolicy::Max => Ok(existing.value.max(incoming.value)),
            DuplicatePolicy::Sum => Ok(existing.value + incoming.value),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePolicy::None => "none",
            DuplicatePolicy::Block => "block",
            DuplicatePolicy::Last => "last",
            DuplicatePolicy::First => "first",
            DuplicatePolicy::Min => "min",
            DuplicatePolicy::Max => "max",
            DuplicatePolicy::Sum => "sum",
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(DuplicatePolicy::None),
            "block" => Ok(DuplicatePolicy::Block),
            "last" => Ok(DuplicatePolicy::Last),
            "first" => Ok(DuplicatePolicy::First),
            "min" => Ok(DuplicatePolicy::Min),
            "max" => Ok(DuplicatePolicy::Max),
            "sum" => Ok(DuplicatePolicy::Sum),
            _ => Err(TsError::InvalidArgument(format!(
                "Unknown duplicate policy: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
