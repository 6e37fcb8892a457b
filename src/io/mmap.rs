use std::{fs::File, io::Cursor, path::Path, sync::Arc, thread};

use memmap2::Mmap;
use tracing::debug;

use crate::codec::Layout;
use crate::{
    parallel::{ParallelProcessor, ParallelReader},
    BinaryRecordFile, GenobinError, Header, Record, ReferenceEntry,
};

/// Memory-mapped view over the payload of a genobin store.
///
/// Records are addressed by a global ordinal running over every reference in
/// table order. Cloning is cheap; clones share the same map.
#[derive(Clone)]
pub struct MmapRecordFile {
    map: Arc<Mmap>,
    /// Header
    header: Header,
    layout: Layout,
    references: Arc<Vec<ReferenceEntry>>,
    /// First global ordinal of each reference
    firsts: Arc<Vec<usize>>,
    /// Number of records in the map
    len: usize,
}
#[allow(clippy::len_without_is_empty)]
impl MmapRecordFile {
    pub fn new<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| GenobinError::from_open(e, path))?;
        let map = unsafe { Arc::new(Mmap::map(&file)?) };

        // parse header, fields and reference table
        let (header, layout, references) = {
            let mut reader = BinaryRecordFile::new(Cursor::new(&map[..]))?;
            let references = reader.read_references()?;
            (reader.header(), reader.layout().clone(), references)
        };

        let width = layout.record_byte_width() as u64;
        let mut firsts = Vec::with_capacity(references.len());
        let mut expected = header.data_offset;
        let mut len = 0usize;
        for entry in &references {
            if entry.data_start != expected {
                return Err(GenobinError::InvalidMapSize);
            }
            firsts.push(len);
            len = usize::try_from(entry.record_count)
                .ok()
                .and_then(|count| len.checked_add(count))
                .ok_or(GenobinError::InvalidMapSize)?;
            expected = entry
                .record_count
                .checked_mul(width)
                .and_then(|bytes| expected.checked_add(bytes))
                .ok_or(GenobinError::InvalidMapSize)?;
        }
        if expected != map.len() as u64 {
            return Err(GenobinError::InvalidMapSize);
        }

        debug!(path = %path.display(), records = len, "mapped record file");
        Ok(Self {
            map,
            header,
            layout,
            references: Arc::new(references),
            firsts: Arc::new(firsts),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn references(&self) -> &[ReferenceEntry] {
        &self.references
    }

    /// Raw bytes of records `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> crate::Result<&[u8]> {
        if start >= self.len || end > self.len {
            return Err(GenobinError::InvalidIndex {
                idx: end,
                max: self.len,
            });
        }
        if end <= start {
            return Err(GenobinError::InvalidIndex {
                idx: end,
                max: self.len,
            });
        }
        let width = self.layout.record_byte_width();
        let base = self.header.data_offset as usize;
        Ok(&self.map[base + start * width..base + end * width])
    }

    /// Position in the reference table of the reference holding record `idx`.
    fn reference_of(&self, idx: usize) -> usize {
        self.firsts.partition_point(|&first| first <= idx).saturating_sub(1)
    }

    /// Decodes the record with global ordinal `idx`.
    pub fn get(&self, idx: usize) -> crate::Result<Record> {
        let bytes = self.slice(idx, idx + 1)?;
        let reference = &self.references[self.reference_of(idx)];
        self.layout.decode_record(&reference.name, bytes)
    }

    /// Decodes every record of `reference`, in stored order.
    pub fn records(&self, reference: &str) -> crate::Result<Vec<Record>> {
        let (pos, entry) = self
            .references
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.name == reference)
            .ok_or_else(|| GenobinError::UnknownReference(reference.to_string()))?;
        if entry.record_count == 0 {
            return Ok(Vec::new());
        }
        let first = self.firsts[pos];
        let bytes = self.slice(first, first + entry.record_count as usize)?;
        bytes
            .chunks_exact(self.layout.record_byte_width())
            .map(|chunk| self.layout.decode_record(reference, chunk))
            .collect()
    }
}

pub const BATCH_SIZE: usize = 64 * 1024;

impl ParallelReader for MmapRecordFile {
    fn process_parallel<P: ParallelProcessor + 'static>(
        &self,
        processor: P,
        num_threads: usize,
    ) -> crate::Result<()> {
        let num_threads = if num_threads == 0 {
            num_cpus::get()
        } else {
            num_threads.min(num_cpus::get())
        };
        let records_per_thread = self.len / num_threads;
        let remainder = self.len % num_threads; // for last thread

        let mut handles = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let start = i * records_per_thread;
            let end = if i == num_threads - 1 {
                start + records_per_thread + remainder
            } else {
                start + records_per_thread
            };
            let thread_reader = self.clone();
            let mut thread_processor = processor.clone();
            let thread_handle = thread::spawn(move || -> crate::Result<()> {
                let width = thread_reader.layout.record_byte_width();
                let mut batch_start = start;
                while batch_start < end {
                    let batch_end = (batch_start + BATCH_SIZE).min(end);
                    let slice = thread_reader.slice(batch_start, batch_end)?;
                    for (offset, bytes) in slice.chunks_exact(width).enumerate() {
                        let idx = batch_start + offset;
                        let reference = &thread_reader.references[thread_reader.reference_of(idx)];
                        let record = thread_reader.layout.decode_record(&reference.name, bytes)?;
                        thread_processor.process_record(record)?;
                    }
                    thread_processor.on_batch_complete()?;
                    batch_start = batch_end;
                }
                Ok(())
            });
            handles.push(thread_handle);
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| GenobinError::Process("parallel worker panicked".into()))??;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDescriptor, Interval, StoreWriter, Value, WriterOptions};
    use std::sync::{Arc, Mutex};

    fn write_store(path: &Path) -> Vec<Record> {
        let layout = Layout::interval(vec![FieldDescriptor::int32("score")]).unwrap();
        let mut writer = StoreWriter::from_path(path, layout, WriterOptions::unindexed()).unwrap();
        let mut all = Vec::new();
        for (name, n) in [("chr1", 50), ("chr2", 0), ("chr3", 30)] {
            let records: Vec<Record> = (0..n)
                .map(|i| {
                    Record::new(
                        name,
                        Interval::new(i * 10, i * 10 + 5).unwrap(),
                        vec![Value::Int32(i as i32)],
                    )
                })
                .collect();
            writer.add_reference(name, 10_000, &records).unwrap();
            all.extend(records);
        }
        writer.finish().unwrap();
        all
    }

    #[derive(Clone, Default)]
    struct Collector {
        records: Arc<Mutex<Vec<Record>>>,
        local: Vec<Record>,
    }
    impl ParallelProcessor for Collector {
        fn process_record(&mut self, record: Record) -> crate::Result<()> {
            self.local.push(record);
            Ok(())
        }
        fn on_batch_complete(&mut self) -> crate::Result<()> {
            self.records.lock().unwrap().append(&mut self.local);
            Ok(())
        }
    }

    #[test]
    fn test_mmap_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.gbin");
        let written = write_store(&path);

        let reader = MmapRecordFile::new(&path).unwrap();
        assert_eq!(reader.len(), 80);
        assert_eq!(reader.references().len(), 3);
        assert_eq!(reader.get(0).unwrap(), written[0]);
        assert_eq!(reader.get(50).unwrap().reference, "chr3");
        assert_eq!(reader.records("chr2").unwrap(), vec![]);
        assert_eq!(reader.records("chr3").unwrap(), written[50..].to_vec());
        assert!(matches!(
            reader.records("chrX"),
            Err(GenobinError::UnknownReference(_))
        ));
        assert!(reader.slice(10, 10).is_err());
        assert!(reader.slice(0, 81).is_err());
    }

    #[test]
    fn test_parallel_scan_sees_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.gbin");
        let mut written = write_store(&path);

        let reader = MmapRecordFile::new(&path).unwrap();
        let collector = Collector::default();
        reader.process_parallel(collector.clone(), 3).unwrap();

        let mut seen = collector.records.lock().unwrap().clone();
        let key = |r: &Record| (r.reference.clone(), r.start());
        seen.sort_by_key(key);
        written.sort_by_key(key);
        assert_eq!(seen, written);
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.gbin");
        write_store(&path);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(
            MmapRecordFile::new(&path),
            Err(GenobinError::InvalidMapSize)
        ));
    }
}
