mod field;
mod header;
mod interval;
mod record;
mod resolution;

pub use field::{FieldDescriptor, FieldKind, Value, MAX_FIELD_NAME};
pub use header::{
    Header, RawField, RawNode, RawReference, ReferenceEntry, FIELD_ENTRY_SIZE, HEADER_SIZE, MAGIC,
    MAX_REFERENCE_NAME, NODE_ENTRY_SIZE, REFERENCE_ENTRY_SIZE, VERSION,
};
pub use interval::Interval;
pub use record::Record;
pub use resolution::{Resolution, ResolutionThresholds};
