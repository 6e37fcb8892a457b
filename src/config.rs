//! Tunables for index construction and querying.

use crate::{GenobinError, Result, ResolutionThresholds};

/// Controls how the coordinate space of a reference is subdivided into bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BuildConfig {
    /// Number of equal-width children a bin is split into.
    pub branching: u32,
    /// A bin holding at most this many intervals is not split further.
    pub max_records_per_bin: u32,
    /// Bins narrower than `branching * min_bin_width` are not split further.
    pub min_bin_width: i64,
    /// Maximum depth below the root.
    pub max_depth: u32,
}
impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            branching: 4,
            max_records_per_bin: 512,
            min_bin_width: 1024,
            max_depth: 10,
        }
    }
}
impl BuildConfig {
    pub fn branching(mut self, branching: u32) -> Self {
        self.branching = branching;
        self
    }
    pub fn max_records_per_bin(mut self, max_records_per_bin: u32) -> Self {
        self.max_records_per_bin = max_records_per_bin;
        self
    }
    pub fn min_bin_width(mut self, min_bin_width: i64) -> Self {
        self.min_bin_width = min_bin_width;
        self
    }
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }
    pub fn validate(&self) -> Result<()> {
        if self.branching < 2 {
            return Err(GenobinError::InvalidConfig(format!(
                "branching must be at least 2, found {}",
                self.branching
            )));
        }
        if self.min_bin_width < 1 {
            return Err(GenobinError::InvalidConfig(format!(
                "min_bin_width must be positive, found {}",
                self.min_bin_width
            )));
        }
        Ok(())
    }
}

/// Query-side settings shared by every query issued through an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct QueryConfig {
    pub thresholds: ResolutionThresholds,
}
impl QueryConfig {
    pub fn thresholds(mut self, thresholds: ResolutionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()
    }
}
