//! Downsampled record streams for coarse resolutions.
//!
//! [`summarize`] folds full-resolution records into fixed windows holding the
//! number of records touching the window and the number of bases they cover
//! inside it. [`PrecomputedProvider`] serves such a stream from memory and is
//! meant to be registered with
//! [`RangeQueryEngine::with_coarse_provider`](crate::RangeQueryEngine::with_coarse_provider).

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use tracing::debug;

use crate::{
    FieldDescriptor, GenobinError, Interval, Layout, MmapRecordFile, ParallelProcessor,
    ParallelReader, QueryError, Record, RecordProvider, Result, Value,
};

/// Per-window totals: `(count, covered)`.
type Windows = BTreeMap<i64, (i64, i64)>;

/// Payload fields of a summary record.
pub fn summary_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::int64("count"),
        FieldDescriptor::int64("covered"),
    ]
}

/// Interval layout for storing summaries in their own store.
pub fn summary_layout() -> Result<Layout> {
    Layout::interval(summary_fields())
}

fn check_window(window: i64) -> Result<()> {
    if window <= 0 {
        return Err(GenobinError::InvalidConfig(format!(
            "summary window must be positive, found {window}"
        )));
    }
    Ok(())
}

fn accumulate(windows: &mut Windows, interval: Interval, window: i64) {
    let first = interval.start().div_euclid(window);
    if interval.is_empty() {
        windows.entry(first).or_default().0 += 1;
        return;
    }
    let last = (interval.end() - 1).div_euclid(window);
    for w in first..=last {
        let bin = Interval::new(w * window, (w + 1) * window).unwrap_or(interval);
        let covered = interval.intersection(&bin).map_or(0, |i| i.width());
        let slot = windows.entry(w).or_default();
        slot.0 += 1;
        slot.1 += covered;
    }
}

fn emit(reference: &str, windows: &Windows, window: i64, out: &mut Vec<Record>) -> Result<()> {
    for (&w, &(count, covered)) in windows {
        out.push(Record::new(
            reference,
            Interval::new(w * window, (w + 1) * window)?,
            vec![Value::Int64(count), Value::Int64(covered)],
        ));
    }
    Ok(())
}

/// Folds `records` into windows of `window` bases.
///
/// Output is grouped by reference in order of first appearance, windows
/// ascending; windows no record touches are omitted.
pub fn summarize(records: &[Record], window: i64) -> Result<Vec<Record>> {
    check_window(window)?;
    let mut order: Vec<&str> = Vec::new();
    let mut per_reference: HashMap<&str, Windows> = HashMap::new();
    for record in records {
        let windows = per_reference.entry(&record.reference).or_insert_with(|| {
            order.push(&record.reference);
            Windows::new()
        });
        accumulate(windows, record.interval, window);
    }

    let mut out = Vec::new();
    for reference in order {
        emit(reference, &per_reference[reference], window, &mut out)?;
    }
    Ok(out)
}

#[derive(Clone)]
struct SummaryProcessor {
    window: i64,
    local: HashMap<String, Windows>,
    global: Arc<Mutex<HashMap<String, Windows>>>,
}
impl ParallelProcessor for SummaryProcessor {
    fn process_record(&mut self, record: Record) -> Result<()> {
        let windows = self.local.entry(record.reference).or_default();
        accumulate(windows, record.interval, self.window);
        Ok(())
    }

    fn on_batch_complete(&mut self) -> Result<()> {
        let mut global = self
            .global
            .lock()
            .map_err(|_| GenobinError::Process("summary accumulator poisoned".into()))?;
        for (reference, windows) in self.local.drain() {
            let target = global.entry(reference).or_default();
            for (w, (count, covered)) in windows {
                let slot = target.entry(w).or_default();
                slot.0 += count;
                slot.1 += covered;
            }
        }
        Ok(())
    }
}

/// Summarises every record of a mapped store on `threads` worker threads
/// (0 means one per core). Output follows the store's reference order.
pub fn summarize_parallel(file: &MmapRecordFile, window: i64, threads: usize) -> Result<Vec<Record>> {
    check_window(window)?;
    let global = Arc::new(Mutex::new(HashMap::new()));
    let processor = SummaryProcessor {
        window,
        local: HashMap::new(),
        global: Arc::clone(&global),
    };
    file.process_parallel(processor, threads)?;

    let totals = global
        .lock()
        .map_err(|_| GenobinError::Process("summary accumulator poisoned".into()))?;
    let mut out = Vec::new();
    for entry in file.references() {
        if let Some(windows) = totals.get(&entry.name) {
            emit(&entry.name, windows, window, &mut out)?;
        }
    }
    debug!(records = file.len(), windows = out.len(), window, "summarized store");
    Ok(out)
}

/// In-memory [`RecordProvider`] over a precomputed record stream.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedProvider {
    records: HashMap<String, Vec<Record>>,
}
impl PrecomputedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a provider holding `window`-sized summaries of `records`.
    pub fn from_records(records: &[Record], window: i64) -> Result<Self> {
        let mut provider = Self::new();
        provider.insert(summarize(records, window)?);
        Ok(provider)
    }

    /// Adds records, keeping each reference's stream in coordinate order.
    pub fn insert(&mut self, records: Vec<Record>) {
        for record in records {
            self.records
                .entry(record.reference.clone())
                .or_default()
                .push(record);
        }
        for stream in self.records.values_mut() {
            stream.sort_by_key(Record::coordinate_key);
        }
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
impl RecordProvider for PrecomputedProvider {
    fn fetch(&mut self, reference: &str, range: Interval) -> std::result::Result<Vec<Record>, QueryError> {
        let Some(stream) = self.records.get(reference) else {
            return Ok(Vec::new());
        };
        let end = stream.partition_point(|r| r.start() < range.end());
        Ok(stream[..end]
            .iter()
            .filter(|r| r.interval.overlaps(&range))
            .cloned()
            .collect())
    }
}
