//! Store writer.
//!
//! [`StoreWriter`] buffers the encoded records of each reference, builds the
//! bin tree for every reference from its sorted interval stream and, on
//! [`StoreWriter::finish`], writes header, field descriptors, reference table,
//! index block and payload in one pass.

use std::{fs::File, io::Write, path::Path};

use tracing::{debug, info};

use crate::codec::{Layout, Shape};
use crate::{
    BuildConfig, GenobinError, Header, Interval, IntervalBinTree, RawField, Record,
    ReferenceEntry, NODE_ENTRY_SIZE, MAX_REFERENCE_NAME,
};

pub type BoxedWriter = Box<dyn Write + Send>;

/// How the writer lays out the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriterOptions {
    pub build: BuildConfig,
    /// Write a bin tree per reference. Without it records are stored in
    /// input order and only the sorted point lookup applies.
    pub indexed: bool,
}
impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            build: BuildConfig::default(),
            indexed: true,
        }
    }
}
impl WriterOptions {
    pub fn unindexed() -> Self {
        Self {
            indexed: false,
            ..Self::default()
        }
    }
    pub fn build(mut self, build: BuildConfig) -> Self {
        self.build = build;
        self
    }
}

struct PendingReference {
    name: String,
    length: i64,
    intervals: Vec<Interval>,
    payload: Vec<u8>,
}

/// Writer for genobin stores.
///
/// # Examples
///
/// ```rust
/// use genobin::{FieldDescriptor, Interval, Layout, Record, StoreWriter, Value, WriterOptions};
///
/// # fn main() -> genobin::Result<()> {
/// let layout = Layout::interval(vec![FieldDescriptor::fixed_string("name", 8)])?;
/// let mut writer = StoreWriter::new(Vec::new(), layout, WriterOptions::default())?;
///
/// let genes = vec![
///     Record::new("chr1", Interval::new(100, 500)?, vec![Value::Text("geneA".into())]),
///     Record::new("chr1", Interval::new(300, 900)?, vec![Value::Text("geneB".into())]),
/// ];
/// writer.add_reference("chr1", 10_000, &genes)?;
/// assert_eq!(writer.records_written(), 2);
///
/// let bytes = writer.into_inner()?;
/// assert!(!bytes.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct StoreWriter<W: Write> {
    /// Inner writer providing the data sink
    inner: Option<W>,

    /// Layout every record is encoded with
    layout: Layout,

    options: WriterOptions,

    /// References in the order they were added
    references: Vec<PendingReference>,

    /// Number of records accepted so far
    records_written: u64,

    /// Whether the store has been written out
    finished: bool,
}

impl<W: Write> StoreWriter<W> {
    pub fn new(inner: W, layout: Layout, options: WriterOptions) -> crate::Result<Self> {
        options.build.validate()?;
        Ok(Self {
            inner: Some(inner),
            layout,
            options,
            references: Vec::new(),
            records_written: 0,
            finished: false,
        })
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Adds all records of one reference.
    ///
    /// Records must belong to `name`, be sorted by start and lie on the
    /// reference: within `[0, length)`, with zero-width records strictly
    /// inside it. `length` is also the coordinate space of the bin tree.
    pub fn add_reference(&mut self, name: &str, length: i64, records: &[Record]) -> crate::Result<()> {
        if self.finished {
            return Err(GenobinError::InvalidConfig(
                "cannot add references to a finished store".to_string(),
            ));
        }
        if name.is_empty() || name.len() > MAX_REFERENCE_NAME || name.as_bytes().contains(&0) {
            return Err(GenobinError::InvalidField {
                name: name.to_string(),
                reason: format!("reference names must be 1-{MAX_REFERENCE_NAME} bytes without NUL"),
            });
        }
        if self.references.iter().any(|r| r.name == name) {
            return Err(GenobinError::InvalidConfig(format!(
                "reference {name} was already added"
            )));
        }
        if length < 0 {
            return Err(GenobinError::InvalidConfig(format!(
                "reference {name} has negative length {length}"
            )));
        }

        let width = self.layout.record_byte_width();
        let bounds = Interval::new(0, length)?;
        let mut payload = Vec::with_capacity(records.len() * width);
        let mut intervals = Vec::with_capacity(records.len());
        let mut previous = i64::MIN;
        for record in records {
            if record.reference != name {
                return Err(GenobinError::UnknownReference(record.reference.clone()));
            }
            if record.start() < previous {
                return Err(GenobinError::UnsortedInput {
                    reference: name.to_string(),
                    previous,
                    start: record.start(),
                });
            }
            previous = record.start();
            if self.layout.shape() == Shape::Point && record.interval != Interval::point(record.start()) {
                return Err(GenobinError::InvalidInterval {
                    start: record.start(),
                    end: record.end(),
                });
            }
            // queries are clamped to [0, length), so a record must overlap it to be reachable
            if !bounds.contains(&record.interval) || !record.interval.overlaps(&bounds) {
                return Err(GenobinError::OutOfBounds {
                    interval: record.interval,
                    bounds,
                });
            }
            self.layout.encode_record(record, &mut payload)?;
            intervals.push(record.interval);
        }

        debug!(reference = name, records = records.len(), "buffered reference");
        self.records_written += records.len() as u64;
        self.references.push(PendingReference {
            name: name.to_string(),
            length,
            intervals,
            payload,
        });
        Ok(())
    }

    /// Builds the indexes and writes the whole store to the inner writer.
    ///
    /// Calling `finish` more than once is a no-op.
    pub fn finish(&mut self) -> crate::Result<()> {
        if self.finished {
            return Ok(());
        }
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        let width = self.layout.record_byte_width();

        let mut header = Header::new(
            self.layout.fields().len() as u32,
            self.references.len() as u32,
            width as u32,
        );
        if self.options.indexed {
            header.set_indexed();
        }
        if self.layout.shape() == Shape::Point {
            header.set_point();
        }

        // build trees and reorder payloads
        let mut trees = Vec::with_capacity(self.references.len());
        let mut payloads = Vec::with_capacity(self.references.len());
        for reference in &self.references {
            if self.options.indexed {
                let space = Interval::new(0, reference.length)?;
                let (tree, order) =
                    IntervalBinTree::build(&reference.intervals, space, &self.options.build)?;
                let mut payload = Vec::with_capacity(reference.payload.len());
                for i in order {
                    payload.extend_from_slice(&reference.payload[i * width..(i + 1) * width]);
                }
                trees.push(Some(tree));
                payloads.push(payload);
            } else {
                trees.push(None);
                payloads.push(reference.payload.clone());
            }
        }

        let node_count: usize = trees.iter().flatten().map(IntervalBinTree::len).sum();
        header.data_offset = header.index_offset() + (node_count * NODE_ENTRY_SIZE) as u64;

        let mut entries = Vec::with_capacity(self.references.len());
        let mut data_start = header.data_offset;
        for (reference, tree) in self.references.iter().zip(trees.iter_mut()) {
            if let Some(tree) = tree.as_mut() {
                tree.assign_start_bytes(data_start, width as u64);
            }
            let record_count = reference.intervals.len() as u64;
            entries.push(ReferenceEntry {
                name: reference.name.clone(),
                length: reference.length,
                data_start,
                record_count,
                node_count: tree.as_ref().map_or(0, |t| t.len() as u32),
            });
            data_start += record_count * width as u64;
        }

        inner.write_all(header.as_bytes())?;
        for field in self.layout.fields() {
            inner.write_all(bytemuck::bytes_of(&RawField::from_descriptor(field)?))?;
        }
        for entry in &entries {
            inner.write_all(bytemuck::bytes_of(&entry.to_raw()?))?;
        }
        for tree in trees.iter().flatten() {
            let nodes = tree.to_raw();
            inner.write_all(bytemuck::cast_slice(&nodes))?;
        }
        for payload in &payloads {
            inner.write_all(payload)?;
        }
        inner.flush()?;

        info!(
            references = entries.len(),
            records = self.records_written,
            bins = node_count,
            bytes = data_start,
            "finished store"
        );
        self.references.clear();
        self.finished = true;
        Ok(())
    }

    /// Finishes the store and returns the inner writer.
    pub fn into_inner(mut self) -> crate::Result<W> {
        self.finish()?;
        self.inner
            .take()
            .ok_or_else(|| GenobinError::InvalidConfig("writer already released".to_string()))
    }
}

impl<W: Write> Drop for StoreWriter<W> {
    fn drop(&mut self) {
        self.finish().ok();
    }
}

impl StoreWriter<BoxedWriter> {
    /// Creates a writer that writes the store to `path`.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        layout: Layout,
        options: WriterOptions,
    ) -> crate::Result<Self> {
        let file = File::create(path)?;
        Self::new(Box::new(std::io::BufWriter::new(file)), layout, options)
    }
}
