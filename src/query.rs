//! Range queries over a binned store.
//!
//! A query runs through four stages: `select_bins` resolves the reference's
//! tree and collects the bins overlapping the range, `stream_records` seeks to
//! each bin's first record and reads its run, `filter` drops records that do
//! not intersect the range, and `done` merges the per-bin runs into one
//! coordinate-ordered list.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    fs::File,
    io::{Read, Seek},
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, trace, warn};

use crate::codec::{Layout, Shape};
use crate::{
    BinNode, BinaryRecordFile, GenobinError, Interval, IntervalBinTree, PayloadExtent,
    QueryConfig, QueryError, Record, ReferenceEntry, ReferenceRegistry, Resolution,
    SortedPointLookup,
};

/// Source of records for one resolution.
///
/// The engine owns one full-resolution provider and any number of coarse
/// providers; formats without precomputed aggregates simply register none.
pub trait RecordProvider {
    /// Returns every record of `reference` intersecting `range`, in ascending
    /// coordinate order.
    fn fetch(&mut self, reference: &str, range: Interval) -> Result<Vec<Record>, QueryError>;
}

/// Load state of one reference's index.
#[derive(Debug, Clone)]
enum TreeState {
    Ready(Arc<IntervalBinTree>),
    Corrupt { bin: u32, reason: String },
    Unindexed,
}

/// An opened genobin store: a file handle plus the bin tree of every
/// reference, loaded and validated once at open.
///
/// The trees are immutable and shared between handles created with
/// [`BinnedStore::try_clone`]; the file handle is exclusive to one store.
pub struct BinnedStore<R: Read + Seek = File> {
    file: BinaryRecordFile<R>,
    path: Option<PathBuf>,
    references: Arc<Vec<ReferenceEntry>>,
    trees: Arc<HashMap<String, TreeState>>,
}

impl<R: Read + Seek> BinnedStore<R> {
    /// Wraps a seekable source, reading the reference table and index block.
    ///
    /// A reference whose index fails validation stays queryable for the
    /// others; queries against it fail with [`GenobinError::CorruptIndex`].
    pub fn new(inner: R) -> crate::Result<Self> {
        Self::from_file(BinaryRecordFile::new(inner)?)
    }

    pub fn from_file(mut file: BinaryRecordFile<R>) -> crate::Result<Self> {
        let references = file.read_references()?;
        let width = file.layout().record_byte_width() as u64;

        let mut trees = HashMap::with_capacity(references.len());
        if file.header().indexed() {
            let block = file.read_index_block(&references)?;
            for (entry, raw) in references.iter().zip(block) {
                let extent = PayloadExtent {
                    data_start: entry.data_start,
                    record_count: entry.record_count,
                    record_width: width,
                };
                let tree = raw.and_then(|raw| IntervalBinTree::from_raw(&entry.name, &raw, extent));
                let state = match tree {
                    Ok(tree) => TreeState::Ready(Arc::new(tree)),
                    Err(GenobinError::CorruptIndex { bin, reason, .. }) => {
                        TreeState::Corrupt { bin, reason }
                    }
                    Err(e) => return Err(e),
                };
                trees.insert(entry.name.clone(), state);
            }
        } else {
            for entry in &references {
                trees.insert(entry.name.clone(), TreeState::Unindexed);
            }
        }

        debug!(
            references = references.len(),
            indexed = file.header().indexed(),
            "loaded store"
        );
        Ok(Self {
            file,
            path: None,
            references: Arc::new(references),
            trees: Arc::new(trees),
        })
    }

    pub fn layout(&self) -> &Layout {
        self.file.layout()
    }

    pub fn references(&self) -> &[ReferenceEntry] {
        &self.references
    }

    fn entry(&self, reference: &str) -> crate::Result<&ReferenceEntry> {
        self.references
            .iter()
            .find(|entry| entry.name == reference)
            .ok_or_else(|| GenobinError::UnknownReference(reference.to_string()))
    }

    /// Registry of the store's own reference names and lengths.
    pub fn registry(&self) -> crate::Result<ReferenceRegistry> {
        ReferenceRegistry::from_entries(&self.references)
    }

    /// The bin tree of `reference`.
    pub fn tree(&self, reference: &str) -> crate::Result<Arc<IntervalBinTree>> {
        match self.trees.get(reference) {
            None => Err(GenobinError::UnknownReference(reference.to_string())),
            Some(TreeState::Ready(tree)) => Ok(Arc::clone(tree)),
            Some(TreeState::Corrupt { bin, reason }) => Err(GenobinError::CorruptIndex {
                reference: reference.to_string(),
                bin: *bin,
                reason: reason.clone(),
            }),
            Some(TreeState::Unindexed) => Err(GenobinError::NotIndexed {
                reference: reference.to_string(),
            }),
        }
    }

    /// Point lookup over `reference`'s stored records.
    pub fn lookup(&mut self, reference: &str) -> crate::Result<SortedPointLookup<'_, R>> {
        let entry = self.entry(reference)?.clone();
        Ok(SortedPointLookup::new(&mut self.file, &entry))
    }

    /// Returns the records of `reference` intersecting `range` in ascending
    /// `(start, end)` order.
    ///
    /// Unindexed point stores are served by a sorted point lookup; an
    /// unindexed interval store fails with [`GenobinError::NotIndexed`].
    pub fn query(&mut self, reference: &str, range: Interval) -> Result<Vec<Record>, QueryError> {
        let state = self.trees.get(reference).cloned();
        match state {
            Some(TreeState::Unindexed) if self.layout().shape() == Shape::Point => {
                self.lookup(reference)
                    .map_err(|e| QueryError::new(reference, e))?
                    .scan(range)
            }
            _ => {
                let tree = self.tree(reference).map_err(|e| {
                    warn!(reference, error = %e, "query rejected");
                    QueryError::new(reference, e)
                })?;
                self.query_tree(reference, &tree, range)
            }
        }
    }

    fn query_tree(
        &mut self,
        reference: &str,
        tree: &IntervalBinTree,
        range: Interval,
    ) -> Result<Vec<Record>, QueryError> {
        let bins = tree.find_overlapping(&range);
        debug!(reference, %range, bins = bins.len(), "select_bins");

        let mut runs: Vec<Vec<Record>> = Vec::with_capacity(bins.len());
        let mut read = 0usize;
        for bin in bins {
            let mut run = Vec::new();
            let result = self.read_bin(reference, bin, range, &mut run);
            read += run.len();
            runs.push(run);
            if let Err(e) = result {
                let collected = merge_runs(runs);
                warn!(
                    reference,
                    bin = bin.index(),
                    collected = collected.len(),
                    error = %e,
                    "query aborted mid-stream"
                );
                return Err(QueryError::new(reference, e).with_collected(collected));
            }
        }
        debug!(reference, kept = read, "filter");

        let records = merge_runs(runs);
        debug!(reference, records = records.len(), "done");
        Ok(records)
    }

    /// Streams one bin's run, keeping the records that intersect `range`.
    fn read_bin(
        &mut self,
        reference: &str,
        bin: &BinNode,
        range: Interval,
        run: &mut Vec<Record>,
    ) -> crate::Result<()> {
        let corrupt = |reason: String| GenobinError::CorruptIndex {
            reference: reference.to_string(),
            bin: bin.index(),
            reason,
        };
        let start_byte = bin
            .start_byte()
            .ok_or_else(|| corrupt("records without a start byte".to_string()))?;
        trace!(
            reference,
            bin = bin.index(),
            start_byte,
            count = bin.direct_count(),
            "stream_records"
        );

        self.file.seek(start_byte)?;
        let width = self.layout().record_byte_width();
        let mut previous = i64::MIN;
        for _ in 0..bin.direct_count() {
            let pos = self.file.position();
            let record = self
                .file
                .read_record(reference)?
                .ok_or(GenobinError::TruncatedRecord {
                    pos,
                    needed: width,
                    found: 0,
                })?;
            if !bin.range().contains(&record.interval) {
                return Err(corrupt(format!(
                    "record {} at byte {pos} escapes bin range {}",
                    record.interval,
                    bin.range()
                )));
            }
            if record.start() < previous {
                return Err(corrupt(format!("records out of order at byte {pos}")));
            }
            previous = record.start();

            // runs are sorted by start: nothing further in this bin can overlap
            if record.start() >= range.end() {
                break;
            }
            if record.interval.overlaps(&range) {
                run.push(record);
            }
        }
        Ok(())
    }

    /// Releases the file handle.
    pub fn close(self) {
        self.file.close();
    }
}

impl BinnedStore<File> {
    /// Opens the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let mut store = Self::from_file(BinaryRecordFile::open(path)?)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Opens an independent handle on the same path, sharing the loaded trees.
    pub fn try_clone(&self) -> crate::Result<Self> {
        let path = self.path.as_ref().ok_or_else(|| {
            GenobinError::InvalidConfig("store was not opened from a path".to_string())
        })?;
        let file = BinaryRecordFile::open(path)?;
        if file.header() != self.file.header() {
            return Err(GenobinError::InvalidConfig(format!(
                "{} changed since it was opened",
                path.display()
            )));
        }
        Ok(Self {
            file,
            path: Some(path.clone()),
            references: Arc::clone(&self.references),
            trees: Arc::clone(&self.trees),
        })
    }
}

impl<R: Read + Seek> RecordProvider for BinnedStore<R> {
    fn fetch(&mut self, reference: &str, range: Interval) -> Result<Vec<Record>, QueryError> {
        self.query(reference, range)
    }
}

/// K-way merge of coordinate-sorted runs; ties keep run order.
fn merge_runs(runs: Vec<Vec<Record>>) -> Vec<Record> {
    if runs.len() <= 1 {
        return runs.into_iter().next().unwrap_or_default();
    }
    let total = runs.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = runs.into_iter().map(Vec::into_iter).collect();
    let mut heads: Vec<Option<Record>> = iters.iter_mut().map(Iterator::next).collect();
    let mut heap: BinaryHeap<Reverse<((i64, i64), usize)>> = heads
        .iter()
        .enumerate()
        .filter_map(|(i, head)| head.as_ref().map(|r| Reverse((r.coordinate_key(), i))))
        .collect();

    let mut merged = Vec::with_capacity(total);
    while let Some(Reverse((_, i))) = heap.pop() {
        if let Some(record) = heads[i].take() {
            merged.push(record);
        }
        heads[i] = iters[i].next();
        if let Some(next) = &heads[i] {
            heap.push(Reverse((next.coordinate_key(), i)));
        }
    }
    merged
}

/// Resolution-aware query front end.
///
/// Ranges are clamped to the reference before any I/O. Requests at a
/// resolution for which a coarse provider is registered go to that provider
/// (the coarsest one not coarser than requested); everything else goes to the
/// full-resolution provider.
///
/// # Examples
///
/// ```rust
/// use genobin::{BinnedStore, FieldDescriptor, Interval, Layout, RangeQueryEngine, Record, Resolution, StoreWriter, Value, WriterOptions};
/// use std::io::Cursor;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let layout = Layout::interval(vec![FieldDescriptor::int32("score")])?;
/// let mut writer = StoreWriter::new(Vec::new(), layout, WriterOptions::default())?;
/// let records: Vec<Record> = [(0, 10), (5, 15), (20, 30)]
///     .into_iter()
///     .map(|(s, e)| Ok(Record::new("chr1", Interval::new(s, e)?, vec![Value::Int32(1)])))
///     .collect::<genobin::Result<_>>()?;
/// writer.add_reference("chr1", 32, &records)?;
///
/// let store = BinnedStore::new(Cursor::new(writer.into_inner()?))?;
/// let registry = store.registry()?;
/// let mut engine = RangeQueryEngine::new(store, registry);
/// let hits = engine.query("chr1", Interval::new(8, 22)?, Resolution::VeryHigh)?;
/// assert_eq!(hits.len(), 3);
/// assert!(engine.query("chr1", Interval::new(40, 50)?, Resolution::VeryHigh)?.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct RangeQueryEngine<P: RecordProvider = BinnedStore> {
    full: P,
    coarse: Vec<(Resolution, Box<dyn RecordProvider + Send>)>,
    registry: ReferenceRegistry,
    config: QueryConfig,
}

impl<P: RecordProvider> RangeQueryEngine<P> {
    pub fn new(full: P, registry: ReferenceRegistry) -> Self {
        Self {
            full,
            coarse: Vec::new(),
            registry,
            config: QueryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: QueryConfig) -> crate::Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Serves queries at `level` (and coarser, unless a coarser provider is
    /// registered) from `provider`. Replaces any provider already at `level`.
    pub fn with_coarse_provider<C>(mut self, level: Resolution, provider: C) -> Self
    where
        C: RecordProvider + Send + 'static,
    {
        self.coarse.retain(|(existing, _)| *existing != level);
        self.coarse.push((level, Box::new(provider)));
        self
    }

    pub fn registry(&self) -> &ReferenceRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &P {
        &self.full
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.full
    }

    /// Resolution the configured thresholds pick for `range`.
    pub fn resolution_for(&self, range: &Interval) -> Resolution {
        self.config.thresholds.select(range.width())
    }

    /// Returns the records of `reference` intersecting `range` at `resolution`.
    ///
    /// An empty result means there is no data in range; every failure is
    /// reported as a [`QueryError`].
    pub fn query(
        &mut self,
        reference: &str,
        range: Interval,
        resolution: Resolution,
    ) -> Result<Vec<Record>, QueryError> {
        let Some(clamped) = self.clamp(reference, range)? else {
            return Ok(Vec::new());
        };

        let coarse = self
            .coarse
            .iter_mut()
            .filter(|(level, _)| resolution.is_coarser_or_equal(*level))
            .max_by_key(|(level, _)| *level);
        match coarse {
            Some((level, provider)) => {
                debug!(reference, ?resolution, provider = ?level, "coarse provider");
                provider.fetch(reference, clamped)
            }
            None => self.full.fetch(reference, clamped),
        }
    }

    /// Queries at the resolution picked for the width of `range` once clamped
    /// to the reference.
    pub fn query_auto(&mut self, reference: &str, range: Interval) -> Result<Vec<Record>, QueryError> {
        let Some(clamped) = self.clamp(reference, range)? else {
            return Ok(Vec::new());
        };
        let resolution = self.resolution_for(&clamped);
        self.query(reference, clamped, resolution)
    }

    fn clamp(&self, reference: &str, range: Interval) -> Result<Option<Interval>, QueryError> {
        self.registry
            .clamp(reference, range)
            .map_err(|e| QueryError::new(reference, e))
    }

    /// Releases the engine, returning the full-resolution provider.
    pub fn into_inner(self) -> P {
        self.full
    }
}

impl RangeQueryEngine<BinnedStore<File>> {
    /// Opens the store at `path` with its own reference table as registry.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let store = BinnedStore::open(path)?;
        let registry = store.registry()?;
        Ok(Self::new(store, registry))
    }

    /// Releases every file handle.
    pub fn close(self) {
        self.full.close();
    }
}
