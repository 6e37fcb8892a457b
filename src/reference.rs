use std::collections::HashMap;

use crate::{GenobinError, Interval, ReferenceEntry, Result};

/// Names and lengths of the references a store covers.
///
/// Used to validate query ranges and clamp them to `[0, length)`. Built from a
/// store's reference table by default, or supplied by the caller's genome
/// registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceRegistry {
    names: Vec<String>,
    lengths: HashMap<String, i64>,
}
impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[ReferenceEntry]) -> Result<Self> {
        let mut registry = Self::new();
        for entry in entries {
            registry.insert(&entry.name, entry.length)?;
        }
        Ok(registry)
    }

    /// Registers `name` with the given length. Re-registering replaces the length.
    pub fn insert(&mut self, name: &str, length: i64) -> Result<()> {
        if length < 0 {
            return Err(GenobinError::InvalidConfig(format!(
                "reference {name} has negative length {length}"
            )));
        }
        if self.lengths.insert(name.to_string(), length).is_none() {
            self.names.push(name.to_string());
        }
        Ok(())
    }

    pub fn length(&self, name: &str) -> Option<i64> {
        self.lengths.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lengths.contains_key(name)
    }

    /// Reference names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Clamps `range` to `[0, length)` of `name`.
    ///
    /// Returns `Ok(None)` when nothing of `range` lies on the reference.
    pub fn clamp(&self, name: &str, range: Interval) -> Result<Option<Interval>> {
        let length = self
            .length(name)
            .ok_or_else(|| GenobinError::UnknownReference(name.to_string()))?;
        let start = range.start().max(0);
        let end = range.end().min(length);
        if start >= end {
            return Ok(None);
        }
        Interval::new(start, end).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: i64, end: i64) -> Interval {
        Interval::new(start, end).unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = ReferenceRegistry::new();
        registry.insert("chr1", 1_000).unwrap();
        registry.insert("chr2", 500).unwrap();
        registry.insert("chr1", 2_000).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.length("chr1"), Some(2_000));
        assert!(registry.contains("chr2"));
        assert!(!registry.contains("chrM"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["chr1", "chr2"]);
        assert!(registry.insert("chr3", -5).is_err());
    }

    #[test]
    fn test_clamp() {
        let mut registry = ReferenceRegistry::new();
        registry.insert("chr1", 100).unwrap();

        assert_eq!(registry.clamp("chr1", iv(-50, 20)).unwrap(), Some(iv(0, 20)));
        assert_eq!(registry.clamp("chr1", iv(90, 500)).unwrap(), Some(iv(90, 100)));
        assert_eq!(registry.clamp("chr1", iv(10, 20)).unwrap(), Some(iv(10, 20)));
        assert_eq!(registry.clamp("chr1", iv(100, 200)).unwrap(), None);
        assert_eq!(registry.clamp("chr1", iv(5, 5)).unwrap(), None);
        assert!(matches!(
            registry.clamp("chrX", iv(0, 1)),
            Err(GenobinError::UnknownReference(_))
        ));
    }
}
