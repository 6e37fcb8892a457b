mod file;
mod mmap;
mod writer;

pub use file::BinaryRecordFile;
pub use mmap::MmapRecordFile;
pub use writer::{BoxedWriter, StoreWriter, WriterOptions};
