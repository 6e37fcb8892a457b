use crate::{GenobinError, Result};

/// Half-open genomic interval `[start, end)`.
///
/// Intervals are immutable once constructed and always satisfy `start <= end`.
/// Zero-width intervals are allowed; they overlap any range that strictly
/// contains their position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "(i64, i64)", into = "(i64, i64)"))]
pub struct Interval {
    start: i64,
    end: i64,
}
impl Interval {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(GenobinError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Single-base interval `[position, position + 1)` used by point records.
    pub fn point(position: i64) -> Self {
        Self {
            start: position,
            end: position.saturating_add(1),
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Number of bases covered, saturating at `i64::MAX`.
    pub fn width(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Half-open overlap test: `a.start < b.end && b.start < a.end`.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if `other` lies entirely within `self`.
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection of two intervals, `None` if they do not overlap.
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Interval {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }
}

impl TryFrom<(i64, i64)> for Interval {
    type Error = GenobinError;

    fn try_from((start, end): (i64, i64)) -> Result<Self> {
        Self::new(start, end)
    }
}

impl From<Interval> for (i64, i64) {
    fn from(interval: Interval) -> Self {
        (interval.start, interval.end)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_validation() {
        assert!(Interval::new(5, 5).is_ok());
        assert!(Interval::new(0, 10).is_ok());
        assert!(matches!(
            Interval::new(10, 5),
            Err(GenobinError::InvalidInterval { start: 10, end: 5 })
        ));
    }

    #[test]
    fn test_half_open_overlap() {
        let a = Interval::new(0, 10).unwrap();
        let b = Interval::new(10, 20).unwrap();
        let c = Interval::new(9, 11).unwrap();
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_zero_width_overlap() {
        let point = Interval::new(5, 5).unwrap();
        assert!(point.overlaps(&Interval::new(0, 10).unwrap()));
        assert!(!point.overlaps(&Interval::new(5, 10).unwrap()));
        assert!(!point.overlaps(&Interval::new(0, 5).unwrap()));
    }

    #[test]
    fn test_contains_and_intersection() {
        let outer = Interval::new(0, 100).unwrap();
        let inner = Interval::new(10, 20).unwrap();
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert_eq!(outer.intersection(&inner), Some(inner));
        assert_eq!(
            inner.intersection(&Interval::new(15, 40).unwrap()),
            Some(Interval::new(15, 20).unwrap())
        );
        assert_eq!(inner.intersection(&Interval::new(20, 40).unwrap()), None);
    }

    #[test]
    fn test_point_interval() {
        let p = Interval::point(42);
        assert_eq!(p.start(), 42);
        assert_eq!(p.end(), 43);
        assert_eq!(p.width(), 1);
        assert_eq!(p.to_string(), "[42, 43)");
    }

    #[test]
    fn test_width_saturates() {
        let everything = Interval::new(i64::MIN, i64::MAX).unwrap();
        assert_eq!(everything.width(), i64::MAX);
        assert_eq!(Interval::new(-5, 5).unwrap().width(), 10);
    }
}
