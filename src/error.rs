//! Error handling for the genobin library.
//!
//! This module defines the error types raised while opening, indexing,
//! decoding and querying genobin stores. Structural errors (missing file,
//! wrong magic, corrupt index) are fatal for the file or reference they name;
//! I/O failures during a query are reported through [`QueryError`] together
//! with the records that were collected before the failure.

use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

use crate::{Interval, Record};

/// A specialized `Result` type for genobin operations.
///
/// # Examples
///
/// ```rust
/// use genobin::{Interval, Result};
///
/// fn window() -> Result<Interval> {
///     Interval::new(100, 200)
/// }
/// assert_eq!(window().unwrap().width(), 100);
/// ```
pub type Result<T> = std::result::Result<T, GenobinError>;

/// Error types for genobin operations.
///
/// # Examples
///
/// ```rust
/// use genobin::{BinaryRecordFile, GenobinError};
/// use std::io::Cursor;
///
/// let invalid_data = vec![0u8; 32];
/// match BinaryRecordFile::new(Cursor::new(invalid_data)) {
///     Err(GenobinError::InvalidMagicNumber { expected, actual }) => {
///         println!("Not a genobin store: expected {:#x}, got {:#x}", expected, actual);
///     }
///     Err(e) => println!("Other error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum GenobinError {
    /// I/O error from the underlying reader or writer.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The store could not be found at the given path.
    #[error("File not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    /// The file does not start with the genobin magic number.
    ///
    /// Together with [`GenobinError::InvalidVersion`] this is the "not formatted"
    /// class of errors: the file is structurally not a store this library reads.
    #[error("Invalid magic number, expected ({expected:#x}), found ({actual:#x})")]
    InvalidMagicNumber { expected: u32, actual: u32 },

    /// Unsupported store format version.
    #[error("Invalid version found, expected ({expected}), found ({actual})")]
    InvalidVersion { expected: u32, actual: u32 },

    /// A range query was issued against a reference without a tree index.
    #[error("Reference {reference} has no interval index")]
    NotIndexed { reference: String },

    /// Record data ended before a full record could be decoded.
    ///
    /// `pos` is the byte position of the record (relative to the buffer for
    /// pure decodes, absolute within the file for file reads).
    #[error("Truncated record at position {pos}: needed {needed} bytes, found {found}")]
    TruncatedRecord { pos: u64, needed: usize, found: usize },

    /// A persisted bin index violates one of the tree invariants.
    #[error("Corrupt index for reference {reference} at bin {bin}: {reason}")]
    CorruptIndex {
        reference: String,
        bin: u32,
        reason: String,
    },

    /// An interval was constructed with `start > end`.
    #[error("Invalid interval: start ({start}) is greater than end ({end})")]
    InvalidInterval { start: i64, end: i64 },

    /// An interval does not lie within the coordinate space it is stored in.
    #[error("Interval {interval} lies outside {bounds}")]
    OutOfBounds { interval: Interval, bounds: Interval },

    /// A field descriptor is malformed (bad width, bad name, unknown kind).
    #[error("Invalid field descriptor {name:?}: {reason}")]
    InvalidField { name: String, reason: String },

    /// A value does not match the kind of the field it is encoded into.
    #[error("Field {field:?} expects a {expected} value")]
    FieldTypeMismatch {
        field: String,
        expected: &'static str,
    },

    /// The number of values does not match the number of fields in the layout.
    #[error("Expected {expected} field values, found {actual}")]
    FieldCountMismatch { expected: usize, actual: usize },

    /// A string does not fit the fixed width of its field.
    #[error("String of {len} bytes does not fit field {field:?} of width {width}")]
    StringTooLong {
        field: String,
        len: usize,
        width: usize,
    },

    /// A fixed-width string field does not hold valid UTF-8.
    #[error("Field {field:?} does not contain valid UTF-8")]
    InvalidUtf8 { field: String },

    /// The reference is not known to the store or registry.
    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    /// Records handed to the writer were not sorted by start.
    #[error("Unsorted input for reference {reference}: start {start} follows {previous}")]
    UnsortedInput {
        reference: String,
        previous: i64,
        start: i64,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Payload size does not match the layout declared by the header and reference table.
    #[error("Invalid map size - payload does not match the declared layout")]
    InvalidMapSize,

    /// Record index is out of bounds.
    #[error("Invalid index ({idx}) - Must be less than {max}")]
    InvalidIndex { idx: usize, max: usize },

    /// Error raised by a user-defined parallel processor.
    #[error("Processing error: {0}")]
    Process(Box<dyn StdError + Send + Sync>),
}

impl GenobinError {
    /// Maps `NotFound` I/O errors on open to [`GenobinError::FileNotFound`].
    pub(crate) fn from_open(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            GenobinError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            GenobinError::Io(err)
        }
    }

    /// Returns true for errors that mean the file is not a usable store at all.
    pub fn is_not_formatted(&self) -> bool {
        matches!(
            self,
            GenobinError::InvalidMagicNumber { .. } | GenobinError::InvalidVersion { .. }
        )
    }
}

/// A range query that was aborted.
///
/// `collected` holds the records that had already been read and filtered when
/// the failure occurred, so the caller can decide between showing a partial
/// result and retrying the whole query.
#[derive(Error, Debug)]
#[error("Query on {reference} failed after {} records", .collected.len())]
pub struct QueryError {
    pub reference: String,
    pub collected: Vec<Record>,
    #[source]
    pub source: GenobinError,
}

impl QueryError {
    pub fn new(reference: impl Into<String>, source: GenobinError) -> Self {
        Self {
            reference: reference.into(),
            collected: Vec::new(),
            source,
        }
    }

    pub fn with_collected(mut self, collected: Vec<Record>) -> Self {
        self.collected = collected;
        self
    }
}

/// Trait for converting errors into `GenobinError::Process` variants.
///
/// # Examples
///
/// ```rust
/// use genobin::{GenobinError, IntoGenobinError};
///
/// let err = std::fmt::Error.into_genobin_error();
/// assert!(matches!(err, GenobinError::Process(_)));
/// ```
pub trait IntoGenobinError {
    /// Converts the error into a `GenobinError`.
    fn into_genobin_error(self) -> GenobinError;
}

impl<E> IntoGenobinError for E
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_genobin_error(self) -> GenobinError {
        GenobinError::Process(self.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct CustomError(String);

    impl fmt::Display for CustomError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Custom error: {}", self.0)
        }
    }

    impl std::error::Error for CustomError {}

    #[test]
    fn test_error_display_messages() {
        let err = GenobinError::InvalidMagicNumber {
            expected: 0x4E494247,
            actual: 0x12345678,
        };
        let display = format!("{}", err);
        assert!(display.contains("0x4e494247"));
        assert!(display.contains("0x12345678"));

        let err = GenobinError::TruncatedRecord {
            pos: 1024,
            needed: 12,
            found: 11,
        };
        let display = format!("{}", err);
        assert!(display.contains("1024"));
        assert!(display.contains("needed 12"));

        let err = GenobinError::CorruptIndex {
            reference: "chr2".to_string(),
            bin: 7,
            reason: "subtree size mismatch".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("chr2"));
        assert!(display.contains("bin 7"));

        let err = GenobinError::InvalidInterval { start: 10, end: 5 };
        assert!(format!("{}", err).contains("start (10)"));

        let err = GenobinError::FileNotFound {
            path: PathBuf::from("/no/such/store.gbin"),
        };
        assert!(format!("{}", err).contains("/no/such/store.gbin"));
    }

    #[test]
    fn test_from_open_maps_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = GenobinError::from_open(io_err, std::path::Path::new("x.gbin"));
        assert!(matches!(err, GenobinError::FileNotFound { .. }));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = GenobinError::from_open(io_err, std::path::Path::new("x.gbin"));
        assert!(matches!(err, GenobinError::Io(_)));
    }

    #[test]
    fn test_not_formatted_class() {
        let err = GenobinError::InvalidVersion {
            expected: 1,
            actual: 9,
        };
        assert!(err.is_not_formatted());
        assert!(!GenobinError::InvalidMapSize.is_not_formatted());
    }

    #[test]
    fn test_query_error_keeps_collected_records() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let records = vec![Record::new("chr1", crate::Interval::new(1, 2).unwrap(), vec![])];
        let err = QueryError::new("chr1", io_err.into()).with_collected(records);
        assert_eq!(err.collected.len(), 1);
        assert!(format!("{}", err).contains("after 1 records"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_into_genobin_error_trait() {
        let custom_err = CustomError("test".to_string());
        match custom_err.into_genobin_error() {
            GenobinError::Process(boxed) => {
                assert!(format!("{}", boxed).contains("Custom error: test"));
            }
            _ => panic!("Expected Process variant"),
        }
    }

    #[test]
    fn test_error_send_sync() {
        fn is_send<T: Send>() {}
        fn is_sync<T: Sync>() {}

        is_send::<GenobinError>();
        is_sync::<GenobinError>();
        is_send::<QueryError>();
    }
}
