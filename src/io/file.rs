//! Random-access reader over a genobin store.
//!
//! [`BinaryRecordFile`] owns the file handle and its seek position, parses the
//! header and field descriptor block once at open, and then reads single
//! fixed-width records at arbitrary byte offsets.

use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use tracing::debug;

use crate::codec::{Layout, Shape};
use crate::{
    GenobinError, Header, RawField, RawNode, RawReference, Record, ReferenceEntry, Value,
    FIELD_ENTRY_SIZE, HEADER_SIZE, NODE_ENTRY_SIZE, REFERENCE_ENTRY_SIZE,
};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Seekable record reader with a parsed header and record layout.
///
/// A handle is not meant to be shared between concurrent queries: the seek
/// position is part of its state. Open a second handle on the same path
/// instead.
///
/// # Examples
///
/// ```rust
/// use genobin::{BinaryRecordFile, FieldDescriptor, Interval, Layout, Record, StoreWriter, Value, WriterOptions};
/// use std::io::Cursor;
///
/// # fn main() -> genobin::Result<()> {
/// let layout = Layout::interval(vec![FieldDescriptor::float64("score")])?;
/// let mut writer = StoreWriter::new(Vec::new(), layout, WriterOptions::default())?;
/// let record = Record::new("chr1", Interval::new(10, 20)?, vec![Value::Float64(0.5)]);
/// writer.add_reference("chr1", 1_000, &[record.clone()])?;
/// let bytes = writer.into_inner()?;
///
/// let mut file = BinaryRecordFile::new(Cursor::new(bytes))?;
/// let chr1 = file.read_references()?.remove(0);
/// file.seek(chr1.data_start)?;
/// assert_eq!(file.read_record("chr1")?, Some(record));
/// assert_eq!(file.read_record("chr1")?, None);
/// # Ok(())
/// # }
/// ```
pub struct BinaryRecordFile<R: Read + Seek> {
    /// Buffered handle to the store
    inner: BufReader<R>,

    /// Parsed store header
    header: Header,

    /// Record layout built from the field descriptor block
    layout: Layout,

    /// Scratch buffer holding one record
    buffer: Vec<u8>,

    /// Current byte position
    pos: u64,

    /// Total length of the store in bytes
    len: u64,
}
impl<R: Read + Seek> BinaryRecordFile<R> {
    /// Wraps a seekable source, reading and validating the header and the
    /// field descriptor block.
    pub fn new(inner: R) -> crate::Result<Self> {
        let mut inner = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, inner);
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        // load header
        let header = {
            let mut header_bytes = [0u8; HEADER_SIZE];
            let read = read_full(&mut inner, &mut header_bytes)?;
            let header = Header::from_bytes(&header_bytes);
            if read < HEADER_SIZE && header.magic == crate::MAGIC {
                return Err(GenobinError::TruncatedRecord {
                    pos: 0,
                    needed: HEADER_SIZE,
                    found: read,
                });
            }
            header.validate()?;
            header
        };
        // the tables precede the payload, which bounds every table read by the file length
        if header.data_offset > len || header.index_offset() > header.data_offset {
            return Err(GenobinError::InvalidMapSize);
        }

        // load field descriptors
        let mut field_bytes = vec![0u8; header.field_count as usize * FIELD_ENTRY_SIZE];
        inner.read_exact(&mut field_bytes)?;
        let fields = field_bytes
            .chunks_exact(FIELD_ENTRY_SIZE)
            .map(|chunk| bytemuck::pod_read_unaligned::<RawField>(chunk).to_descriptor())
            .collect::<crate::Result<Vec<_>>>()?;
        let shape = if header.point() {
            Shape::Point
        } else {
            Shape::Interval
        };
        let layout = Layout::new(fields, shape)?;
        if layout.record_byte_width() != header.record_width as usize {
            return Err(GenobinError::InvalidField {
                name: String::new(),
                reason: format!(
                    "field widths sum to {}, header declares {}",
                    layout.record_byte_width(),
                    header.record_width
                ),
            });
        }

        debug!(
            fields = header.field_count,
            references = header.reference_count,
            record_width = header.record_width,
            indexed = header.indexed(),
            "opened record file"
        );
        let pos = inner.stream_position()?;
        Ok(Self {
            inner,
            header,
            buffer: vec![0u8; layout.record_byte_width()],
            layout,
            pos,
            len,
        })
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Length of the store in bytes.
    pub fn length(&self) -> u64 {
        self.len
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Moves the read position to `offset`.
    pub fn seek(&mut self, offset: u64) -> crate::Result<()> {
        if offset != self.pos {
            self.inner.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
        }
        Ok(())
    }

    /// Reads the raw bytes of the record at the current position.
    ///
    /// Returns `Ok(None)` when the position is exactly at end of file. A
    /// partial record yields [`GenobinError::TruncatedRecord`]; the position
    /// is then unspecified and the caller must seek before reading again.
    pub fn read_bytes(&mut self) -> crate::Result<Option<&[u8]>> {
        if self.fill_record()? {
            Ok(Some(&self.buffer))
        } else {
            Ok(None)
        }
    }

    fn fill_record(&mut self) -> crate::Result<bool> {
        let start = self.pos;
        let width = self.buffer.len();
        let read = read_full(&mut self.inner, &mut self.buffer)?;
        self.pos += read as u64;
        match read {
            0 => Ok(false),
            n if n < width => Err(GenobinError::TruncatedRecord {
                pos: start,
                needed: width,
                found: n,
            }),
            _ => Ok(true),
        }
    }

    /// Reads and decodes every field of the record at the current position.
    pub fn read_values(&mut self) -> crate::Result<Option<Vec<Value>>> {
        let start = self.pos;
        if !self.fill_record()? {
            return Ok(None);
        }
        self.layout
            .decode(&self.buffer)
            .map(Some)
            .map_err(|e| with_position(e, start))
    }

    /// Reads the record at the current position and attributes it to `reference`.
    pub fn read_record(&mut self, reference: &str) -> crate::Result<Option<Record>> {
        let start = self.pos;
        if !self.fill_record()? {
            return Ok(None);
        }
        self.layout
            .decode_record(reference, &self.buffer)
            .map(Some)
            .map_err(|e| with_position(e, start))
    }

    /// Reads only the leading position field of the record at `offset`.
    pub fn read_position_at(&mut self, offset: u64) -> crate::Result<i64> {
        let width = self.layout.fields()[0].byte_width();
        self.seek(offset)?;
        let read = read_full(&mut self.inner, &mut self.buffer[..width])?;
        self.pos += read as u64;
        if read < width {
            return Err(GenobinError::TruncatedRecord {
                pos: offset,
                needed: width,
                found: read,
            });
        }
        self.layout.decode_position(&self.buffer[..width])
    }

    /// Reads the reference table.
    pub fn read_references(&mut self) -> crate::Result<Vec<ReferenceEntry>> {
        self.seek(self.header.reference_table_offset())?;
        let mut bytes = vec![0u8; self.header.reference_count as usize * REFERENCE_ENTRY_SIZE];
        self.read_exact(&mut bytes)?;
        bytes
            .chunks_exact(REFERENCE_ENTRY_SIZE)
            .map(|chunk| ReferenceEntry::from_raw(&bytemuck::pod_read_unaligned::<RawReference>(chunk)))
            .collect()
    }

    /// Reads the persisted bin nodes of every reference, in table order.
    ///
    /// A reference whose nodes run past the index block, or past the end of a
    /// truncated file, yields [`GenobinError::CorruptIndex`] in its slot while
    /// the other references are still read.
    pub fn read_index_block(
        &mut self,
        references: &[ReferenceEntry],
    ) -> crate::Result<Vec<crate::Result<Vec<RawNode>>>> {
        let block_end = self.header.data_offset;
        let mut offset = Some(self.header.index_offset());
        let mut block = Vec::with_capacity(references.len());
        for entry in references {
            let start = offset;
            let size = u64::from(entry.node_count) * NODE_ENTRY_SIZE as u64;
            offset = start.and_then(|start| start.checked_add(size));
            let nodes = match (start, offset) {
                (Some(start), Some(end)) if end <= block_end => self.read_nodes(entry, start)?,
                _ => Err(GenobinError::CorruptIndex {
                    reference: entry.name.clone(),
                    bin: 0,
                    reason: format!(
                        "{} bins run past the index block ending at byte {block_end}",
                        entry.node_count
                    ),
                }),
            };
            block.push(nodes);
        }
        Ok(block)
    }

    /// Reads the nodes of one reference starting at `offset`. The outer error
    /// is an I/O failure, the inner one a short read.
    fn read_nodes(
        &mut self,
        entry: &ReferenceEntry,
        offset: u64,
    ) -> crate::Result<crate::Result<Vec<RawNode>>> {
        self.seek(offset)?;
        let mut bytes = vec![0u8; entry.node_count as usize * NODE_ENTRY_SIZE];
        match self.read_exact(&mut bytes) {
            Ok(()) => Ok(Ok(bytes
                .chunks_exact(NODE_ENTRY_SIZE)
                .map(bytemuck::pod_read_unaligned::<RawNode>)
                .collect())),
            Err(GenobinError::TruncatedRecord { needed, found, .. }) => {
                Ok(Err(GenobinError::CorruptIndex {
                    reference: entry.name.clone(),
                    bin: (found / NODE_ENTRY_SIZE) as u32,
                    reason: format!("index truncated: needed {needed} bytes, found {found}"),
                }))
            }
            Err(e) => Err(e),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> crate::Result<()> {
        let start = self.pos;
        let read = read_full(&mut self.inner, buf)?;
        self.pos += read as u64;
        if read < buf.len() {
            return Err(GenobinError::TruncatedRecord {
                pos: start,
                needed: buf.len(),
                found: read,
            });
        }
        Ok(())
    }

    /// Releases the handle, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    pub fn close(self) {}
}

impl BinaryRecordFile<File> {
    /// Opens the store at `path`.
    ///
    /// A missing file yields [`GenobinError::FileNotFound`].
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| GenobinError::from_open(e, path))?;
        Self::new(file)
    }
}

/// Fills `buf` as far as the source allows, returning the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

fn with_position(err: GenobinError, pos: u64) -> GenobinError {
    match err {
        GenobinError::TruncatedRecord { needed, found, .. } => GenobinError::TruncatedRecord {
            pos,
            needed,
            found,
        },
        other => other,
    }
}
