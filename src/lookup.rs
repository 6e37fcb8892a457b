//! Binary search over a run of records sorted by position.

use std::io::{Read, Seek};

use tracing::trace;

use crate::{BinaryRecordFile, GenobinError, Interval, QueryError, Record, ReferenceEntry, Result};

/// Point lookup over one reference's records when they are stored sorted by
/// their leading position field rather than grouped into bins.
///
/// Each search step reads only the position field of each candidate record. Duplicate
/// positions resolve to the first occurrence.
///
/// # Examples
///
/// ```rust
/// use genobin::{BinaryRecordFile, Interval, Layout, Record, SortedPointLookup, StoreWriter, WriterOptions};
/// use std::io::Cursor;
///
/// # fn main() -> genobin::Result<()> {
/// let layout = Layout::point(vec![])?;
/// let mut writer = StoreWriter::new(Vec::new(), layout, WriterOptions::unindexed())?;
/// let points: Vec<Record> = [10, 20, 20, 30]
///     .into_iter()
///     .map(|p| Record::new("chr1", Interval::point(p), vec![]))
///     .collect();
/// writer.add_reference("chr1", 100, &points)?;
///
/// let mut file = BinaryRecordFile::new(Cursor::new(writer.into_inner()?))?;
/// let chr1 = file.read_references()?.remove(0);
/// let mut lookup = SortedPointLookup::new(&mut file, &chr1);
/// assert_eq!(lookup.seek_to_start(20)?, 1);
/// assert_eq!(lookup.seek_to_start(25)?, 3);
/// # Ok(())
/// # }
/// ```
pub struct SortedPointLookup<'a, R: Read + Seek> {
    file: &'a mut BinaryRecordFile<R>,
    reference: String,
    data_start: u64,
    num_records: u64,
    width: u64,
}
impl<'a, R: Read + Seek> SortedPointLookup<'a, R> {
    pub fn new(file: &'a mut BinaryRecordFile<R>, entry: &ReferenceEntry) -> Self {
        let width = file.layout().record_byte_width() as u64;
        Self {
            file,
            reference: entry.name.clone(),
            data_start: entry.data_start,
            num_records: entry.record_count,
            width,
        }
    }

    pub fn len(&self) -> u64 {
        self.num_records
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    // saturates on corrupt counts; the read past the end then reports truncation
    fn offset(&self, idx: u64) -> u64 {
        self.data_start.saturating_add(idx.saturating_mul(self.width))
    }

    /// Index of the first record whose position is `>= target`, or
    /// `len()` when every record lies before `target`.
    pub fn seek_to_start(&mut self, target: i64) -> Result<u64> {
        let (mut low, mut high) = (0, self.num_records);
        while low < high {
            let mid = low + (high - low) / 2;
            let position = self.file.read_position_at(self.offset(mid))?;
            if position < target {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        trace!(reference = %self.reference, target, index = low, "point lookup");
        Ok(low)
    }

    /// Decodes the record at `idx`.
    pub fn record_at(&mut self, idx: u64) -> Result<Record> {
        if idx >= self.num_records {
            return Err(GenobinError::InvalidIndex {
                idx: idx as usize,
                max: self.num_records as usize,
            });
        }
        self.file.seek(self.offset(idx))?;
        let pos = self.file.position();
        self.file
            .read_record(&self.reference)?
            .ok_or(GenobinError::TruncatedRecord {
                pos,
                needed: self.width as usize,
                found: 0,
            })
    }

    /// Returns the records overlapping `range`, in stored order.
    ///
    /// Locates the first record at or after `range.start()` and then reads
    /// forward until a record starts at or past `range.end()`. Records are
    /// assumed not to overlap each other, which holds for point data.
    pub fn scan(&mut self, range: Interval) -> std::result::Result<Vec<Record>, QueryError> {
        let mut collected = Vec::new();
        let first = self
            .seek_to_start(range.start())
            .map_err(|e| QueryError::new(&self.reference, e))?;
        if first >= self.num_records {
            return Ok(collected);
        }
        if let Err(e) = self.file.seek(self.offset(first)) {
            return Err(QueryError::new(&self.reference, e));
        }

        for idx in first..self.num_records {
            let pos = self.offset(idx);
            let record = match self.file.read_record(&self.reference) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    let e = GenobinError::TruncatedRecord {
                        pos,
                        needed: self.width as usize,
                        found: 0,
                    };
                    return Err(QueryError::new(&self.reference, e).with_collected(collected));
                }
                Err(e) => return Err(QueryError::new(&self.reference, e).with_collected(collected)),
            };
            if record.start() >= range.end() {
                break;
            }
            if record.interval.overlaps(&range) {
                collected.push(record);
            }
        }
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDescriptor, Layout, StoreWriter, Value, WriterOptions};
    use std::io::Cursor;

    fn point_store(positions: &[i64]) -> BinaryRecordFile<Cursor<Vec<u8>>> {
        let layout = Layout::point(vec![FieldDescriptor::float64("value")]).unwrap();
        let mut writer = StoreWriter::new(Vec::new(), layout, WriterOptions::unindexed()).unwrap();
        let records: Vec<Record> = positions
            .iter()
            .map(|&p| Record::new("chr1", Interval::point(p), vec![Value::Float64(p as f64)]))
            .collect();
        writer.add_reference("chr1", 1_000, &records).unwrap();
        BinaryRecordFile::new(Cursor::new(writer.into_inner().unwrap())).unwrap()
    }

    #[test]
    fn test_seek_to_start_exact_and_between() {
        let mut file = point_store(&[2, 4, 8, 16, 32]);
        let entry = file.read_references().unwrap().remove(0);
        let mut lookup = SortedPointLookup::new(&mut file, &entry);

        assert_eq!(lookup.seek_to_start(8).unwrap(), 2);
        assert_eq!(lookup.seek_to_start(9).unwrap(), 3);
        assert_eq!(lookup.seek_to_start(0).unwrap(), 0);
        assert_eq!(lookup.seek_to_start(33).unwrap(), 5);
        assert_eq!(lookup.record_at(3).unwrap().start(), 16);
        assert!(lookup.record_at(5).is_err());
    }

    #[test]
    fn test_duplicates_resolve_to_first() {
        let mut file = point_store(&[1, 5, 5, 5, 5, 5, 5, 9]);
        let entry = file.read_references().unwrap().remove(0);
        let mut lookup = SortedPointLookup::new(&mut file, &entry);
        assert_eq!(lookup.seek_to_start(5).unwrap(), 1);
        assert_eq!(lookup.seek_to_start(6).unwrap(), 7);
    }

    #[test]
    fn test_scan_stops_past_range() {
        let mut file = point_store(&[1, 3, 5, 7, 9, 11]);
        let entry = file.read_references().unwrap().remove(0);
        let mut lookup = SortedPointLookup::new(&mut file, &entry);

        let hits: Vec<i64> = lookup
            .scan(Interval::new(3, 9).unwrap())
            .unwrap()
            .iter()
            .map(Record::start)
            .collect();
        assert_eq!(hits, vec![3, 5, 7]);
        assert!(lookup.scan(Interval::new(20, 30).unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_empty_reference() {
        let mut file = point_store(&[]);
        let entry = file.read_references().unwrap().remove(0);
        let mut lookup = SortedPointLookup::new(&mut file, &entry);
        assert!(lookup.is_empty());
        assert_eq!(lookup.seek_to_start(10).unwrap(), 0);
        assert!(lookup.scan(Interval::new(0, 100).unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_scan_reports_truncation_with_partial_results() {
        let layout = Layout::point(vec![FieldDescriptor::float64("value")]).unwrap();
        let mut writer = StoreWriter::new(Vec::new(), layout, WriterOptions::unindexed()).unwrap();
        let records: Vec<Record> = (0..4)
            .map(|p| Record::new("chr1", Interval::point(p), vec![Value::Float64(0.0)]))
            .collect();
        writer.add_reference("chr1", 100, &records).unwrap();
        let mut bytes = writer.into_inner().unwrap();
        bytes.truncate(bytes.len() - 4);

        let mut file = BinaryRecordFile::new(Cursor::new(bytes)).unwrap();
        let entry = file.read_references().unwrap().remove(0);
        let mut lookup = SortedPointLookup::new(&mut file, &entry);
        let err = lookup.scan(Interval::new(0, 100).unwrap()).unwrap_err();
        assert_eq!(err.collected.len(), 3);
        assert!(matches!(err.source, GenobinError::TruncatedRecord { .. }));
    }
}
