use crate::{GenobinError, Interval, Result};

/// Discrete zoom level, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Resolution {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}
impl Resolution {
    pub const ALL: [Resolution; 5] = [
        Resolution::VeryHigh,
        Resolution::High,
        Resolution::Medium,
        Resolution::Low,
        Resolution::VeryLow,
    ];

    /// Picks a resolution for `range` using the default thresholds.
    pub fn for_range(range: &Interval) -> Self {
        ResolutionThresholds::default().select(range.width())
    }

    /// True if `self` is at least as coarse as `other`.
    pub fn is_coarser_or_equal(self, other: Resolution) -> bool {
        self >= other
    }
}

/// Upper range-width bounds (inclusive) for the four finest resolutions;
/// anything wider maps to [`Resolution::VeryLow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolutionThresholds {
    pub very_high: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}
impl Default for ResolutionThresholds {
    fn default() -> Self {
        Self {
            very_high: 10_000,
            high: 100_000,
            medium: 1_000_000,
            low: 10_000_000,
        }
    }
}
impl ResolutionThresholds {
    pub fn validate(&self) -> Result<()> {
        let bounds = [self.very_high, self.high, self.medium, self.low];
        if bounds[0] < 0 || bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GenobinError::InvalidConfig(format!(
                "resolution thresholds must be non-negative and strictly increasing, found {:?}",
                bounds
            )));
        }
        Ok(())
    }

    /// Maps a range width to a resolution; wider ranges never map finer.
    pub fn select(&self, width: i64) -> Resolution {
        if width <= self.very_high {
            Resolution::VeryHigh
        } else if width <= self.high {
            Resolution::High
        } else if width <= self.medium {
            Resolution::Medium
        } else if width <= self.low {
            Resolution::Low
        } else {
            Resolution::VeryLow
        }
    }
}
