use crate::{Interval, Value};

/// One decoded unit of genomic data.
///
/// Records are created by the codec when decoding bytes and are owned by the
/// caller once returned; they hold no reference back to the file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    pub reference: String,
    pub interval: Interval,
    /// Values of the fields following the coordinate fields, in layout order.
    pub payload: Vec<Value>,
}
impl Record {
    pub fn new(reference: impl Into<String>, interval: Interval, payload: Vec<Value>) -> Self {
        Self {
            reference: reference.into(),
            interval,
            payload,
        }
    }

    pub fn start(&self) -> i64 {
        self.interval.start()
    }

    pub fn end(&self) -> i64 {
        self.interval.end()
    }

    /// Sort key used for coordinate order: `(start, end)`.
    pub fn coordinate_key(&self) -> (i64, i64) {
        (self.interval.start(), self.interval.end())
    }
}
