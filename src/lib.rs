//! # genobin - Binned Interval Index and Binary Record Store for Genomic Tracks
//!
//! `genobin` stores genomic features as fixed-width binary records grouped by a
//! per-reference hierarchical bin index, so that "every feature overlapping
//! `[start, end)` on reference R" can be answered with a handful of seeks,
//! without loading the file into memory.
//!
//! ## Format Specification
//!
//! All integers are little-endian. A store is laid out as:
//!
//! ### Header (32 bytes)
//! - Magic number: `0x4E494247` ("GBIN")
//! - Version: Format version (currently 1)
//! - Flags: Bit flags (bit 0 = tree index present, bit 1 = point layout)
//! - Field count, reference count, record width in bytes
//! - Data offset: `u64` byte offset of the payload
//!
//! ### Field descriptors (32 bytes each)
//! - Name: 24 bytes, NUL padded
//! - Kind: `u32` (1 = Int32, 2 = Int64, 3 = Float64, 4 = FixedString)
//! - Width: `u32` byte width
//!
//! ### Reference table (64 bytes each)
//! - Name: 32 bytes, NUL padded
//! - Length, first record byte, record count, bin count
//!
//! ### Index block (40 bytes per bin)
//! Bins of each reference in pre-order: range, first record byte (-1 when
//! the bin holds no records), ordinal, parent ordinal (-1 for the root),
//! direct record count and subtree record count.
//!
//! ### Payload
//! Fixed-width records, per reference, grouped by bin in pre-order and sorted
//! by `(start, end)` within a bin. The first two fields of an interval layout
//! are `start` and `end`; a point layout has a single leading `position`.
//!
//! ## Basic Usage
//!
//! ### Writing and Querying a Store
//!
//! ```rust
//! use genobin::{
//!     BinnedStore, FieldDescriptor, Interval, Layout, RangeQueryEngine, Record, Resolution,
//!     StoreWriter, Value, WriterOptions,
//! };
//! use std::io::Cursor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Intervals carry a gene name and a score
//! let layout = Layout::interval(vec![
//!     FieldDescriptor::fixed_string("name", 16),
//!     FieldDescriptor::float64("score"),
//! ])?;
//!
//! let records = vec![
//!     Record::new("chr1", Interval::new(1_000, 5_000)?, vec![Value::Text("BRCA".into()), Value::Float64(0.9)]),
//!     Record::new("chr1", Interval::new(4_000, 4_500)?, vec![Value::Text("TP53".into()), Value::Float64(0.2)]),
//!     Record::new("chr1", Interval::new(9_000, 9_100)?, vec![Value::Text("EGFR".into()), Value::Float64(0.4)]),
//! ];
//!
//! // Records must be sorted by start within a reference
//! let mut writer = StoreWriter::new(Vec::new(), layout, WriterOptions::default())?;
//! writer.add_reference("chr1", 10_000, &records)?;
//! let buffer = writer.into_inner()?;
//!
//! // Open the store and query it
//! let store = BinnedStore::new(Cursor::new(buffer))?;
//! let registry = store.registry()?;
//! let mut engine = RangeQueryEngine::new(store, registry);
//!
//! let hits = engine.query("chr1", Interval::new(4_200, 9_050)?, Resolution::VeryHigh)?;
//! assert_eq!(hits, records);
//! # Ok(())
//! # }
//! ```
//!
//! ### File I/O
//!
//! ```rust,no_run
//! use genobin::{Interval, Layout, RangeQueryEngine, StoreWriter, WriterOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = StoreWriter::from_path("features.gbin", Layout::interval(vec![])?, WriterOptions::default())?;
//! writer.add_reference("chr1", 248_956_422, &[])?;
//! writer.finish()?;
//!
//! let mut engine = RangeQueryEngine::open("features.gbin")?;
//! let records = engine.query_auto("chr1", Interval::new(0, 50_000)?)?;
//! println!("{} records", records.len());
//! engine.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Coarse Resolutions
//!
//! Wide ranges can be served from a precomputed downsampled stream instead of
//! the full-resolution tree:
//!
//! ```rust,no_run
//! use genobin::{MmapRecordFile, PrecomputedProvider, RangeQueryEngine, Resolution, summarize_parallel};
//!
//! # fn main() -> genobin::Result<()> {
//! let mapped = MmapRecordFile::new("features.gbin")?;
//! let mut coarse = PrecomputedProvider::new();
//! coarse.insert(summarize_parallel(&mapped, 100_000, 0)?);
//!
//! let engine = RangeQueryEngine::open("features.gbin")?
//!     .with_coarse_provider(Resolution::Low, coarse);
//! # drop(engine);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A [`BinaryRecordFile`] handle owns its seek position and serves one query
//! at a time. [`BinnedStore::try_clone`] opens another handle on the same path
//! that shares the immutable, already validated bin trees.
//!
//! ## Error Handling
//!
//! Opening fails with [`GenobinError`]; queries fail with [`QueryError`], which
//! carries the records collected before the failure:
//!
//! ```rust
//! use genobin::{BinaryRecordFile, GenobinError};
//! use std::io::Cursor;
//!
//! # fn main() {
//! match BinaryRecordFile::new(Cursor::new(vec![0u8; 32])) {
//!     Err(GenobinError::InvalidMagicNumber { expected, actual }) => {
//!         println!("Not a genobin store: expected {:#x}, got {:#x}", expected, actual);
//!     }
//!     Err(e) => println!("Other error: {}", e),
//!     Ok(_) => unreachable!(),
//! }
//! # }
//! ```

mod codec;
mod config;
mod constructs;
mod error;
mod index;
mod io;
mod lookup;
mod parallel;
mod query;
mod reference;
mod summary;

pub use codec::{record_byte_width, Layout, Shape};
pub use config::{BuildConfig, QueryConfig};
pub use constructs::{
    FieldDescriptor, FieldKind, Header, Interval, RawField, RawNode, RawReference, Record,
    ReferenceEntry, Resolution, ResolutionThresholds, Value, FIELD_ENTRY_SIZE, HEADER_SIZE, MAGIC,
    MAX_FIELD_NAME, MAX_REFERENCE_NAME, NODE_ENTRY_SIZE, REFERENCE_ENTRY_SIZE, VERSION,
};
pub use error::{GenobinError, IntoGenobinError, QueryError, Result};
pub use index::{BinNode, IntervalBinTree, NodeId, PayloadExtent};
pub use io::{BinaryRecordFile, BoxedWriter, MmapRecordFile, StoreWriter, WriterOptions};
pub use lookup::SortedPointLookup;
pub use parallel::{ParallelProcessor, ParallelReader};
pub use query::{BinnedStore, RangeQueryEngine, RecordProvider};
pub use reference::ReferenceRegistry;
pub use summary::{summarize, summarize_parallel, summary_fields, summary_layout, PrecomputedProvider};
