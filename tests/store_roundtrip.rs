//! End-to-end tests against stores written to disk.

use std::{path::Path, thread};

use genobin::{
    BinnedStore, BuildConfig, FieldDescriptor, GenobinError, Interval, Layout, MmapRecordFile,
    PrecomputedProvider, RangeQueryEngine, Record, Resolution, StoreWriter, Value, WriterOptions,
    summarize_parallel, HEADER_SIZE, NODE_ENTRY_SIZE, REFERENCE_ENTRY_SIZE,
};

fn gene(reference: &str, start: i64, end: i64, name: &str) -> Record {
    Record::new(
        reference,
        Interval::new(start, end).unwrap(),
        vec![Value::Text(name.to_string()), Value::Float64((end - start) as f64)],
    )
}

fn layout() -> Layout {
    Layout::interval(vec![
        FieldDescriptor::fixed_string("name", 12),
        FieldDescriptor::float64("length"),
    ])
    .unwrap()
}

/// Two references of tiled features, enough to split into several levels.
fn write_genes(path: &Path) -> (Vec<Record>, Vec<Record>) {
    let chr1: Vec<Record> = (0..2_000)
        .map(|i| gene("chr1", i * 50, i * 50 + 20 + (i % 7) * 40, &format!("g{i}")))
        .collect();
    let chr2: Vec<Record> = (0..300)
        .map(|i| gene("chr2", i * 100, i * 100 + 5_000, &format!("h{i}")))
        .collect();

    let options = WriterOptions::default().build(
        BuildConfig::default()
            .max_records_per_bin(32)
            .min_bin_width(16),
    );
    let mut writer = StoreWriter::from_path(path, layout(), options).unwrap();
    writer.add_reference("chr1", 101_000, &chr1).unwrap();
    writer.add_reference("chr2", 50_000, &chr2).unwrap();
    writer.finish().unwrap();
    (chr1, chr2)
}

fn brute_force(records: &[Record], range: Interval) -> Vec<Record> {
    let mut hits: Vec<Record> = records
        .iter()
        .filter(|r| r.interval.overlaps(&range))
        .cloned()
        .collect();
    hits.sort_by_key(Record::coordinate_key);
    hits
}

fn names(records: &[Record]) -> Vec<&str> {
    records.iter().filter_map(|r| r.payload[0].as_str()).collect()
}

#[test]
fn test_queries_match_brute_force() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("genes.gbin");
    let (chr1, chr2) = write_genes(&path);

    let mut engine = RangeQueryEngine::open(&path).unwrap();
    assert!(engine.provider().tree("chr1").unwrap().len() > 1);

    for (start, end) in [(0, 100), (1_234, 5_678), (50_000, 50_001), (99_000, 120_000)] {
        let range = Interval::new(start, end).unwrap();
        let hits = engine.query("chr1", range, Resolution::VeryHigh).unwrap();
        let expected = brute_force(&chr1, range);
        // ties on (start, end) cannot occur in this data set
        assert_eq!(names(&hits), names(&expected), "range {range}");
    }

    let range = Interval::new(10_000, 12_000).unwrap();
    let hits = engine.query("chr2", range, Resolution::VeryHigh).unwrap();
    assert_eq!(hits, brute_force(&chr2, range));
    engine.close();
}

#[test]
fn test_open_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("missing.gbin");
    assert!(matches!(
        BinnedStore::open(&missing),
        Err(GenobinError::FileNotFound { .. })
    ));

    let garbage = dir.path().join("garbage.gbin");
    std::fs::write(&garbage, b"chr1\t100\t200\tgeneA\n".repeat(4)).unwrap();
    let err = BinnedStore::open(&garbage).err().unwrap();
    assert!(err.is_not_formatted());
}

/// Two small references, each indexed by a single root bin.
fn write_pair(path: &Path) -> (Vec<Record>, Vec<Record>) {
    let chr1 = vec![gene("chr1", 10, 20, "a"), gene("chr1", 30, 40, "b")];
    let chr2 = vec![gene("chr2", 10, 20, "c")];
    let mut writer = StoreWriter::from_path(path, layout(), WriterOptions::default()).unwrap();
    writer.add_reference("chr1", 1_000, &chr1).unwrap();
    writer.add_reference("chr2", 1_000, &chr2).unwrap();
    writer.finish().unwrap();
    (chr1, chr2)
}

/// Byte offset of a field inside the `n`th reference table entry.
fn reference_field(n: usize, field: usize) -> usize {
    HEADER_SIZE + 4 * 32 + n * REFERENCE_ENTRY_SIZE + field
}

const RECORD_COUNT: usize = 48;
const NODE_COUNT: usize = 56;

#[test]
fn test_corrupt_index_only_affects_its_reference() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.gbin");
    let (_, chr2) = write_pair(&path);

    // break chr1's direct count
    let mut bytes = std::fs::read(&path).unwrap();
    let index_offset = HEADER_SIZE + 4 * 32 + 2 * REFERENCE_ENTRY_SIZE;
    let direct_count = index_offset + 32;
    bytes[direct_count..direct_count + 4].copy_from_slice(&5i32.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let mut engine = RangeQueryEngine::open(&path).unwrap();
    let range = Interval::new(0, 1_000).unwrap();
    let err = engine.query("chr1", range, Resolution::VeryHigh).unwrap_err();
    assert_eq!(err.reference, "chr1");
    assert!(matches!(
        err.source,
        GenobinError::CorruptIndex { bin: 0, .. }
    ));
    assert!(err.collected.is_empty());

    let hits = engine.query("chr2", range, Resolution::VeryHigh).unwrap();
    assert_eq!(hits, chr2);
    assert_eq!(index_offset + 2 * NODE_ENTRY_SIZE, (bytes.len() - 3 * 36));
}

#[test]
fn test_overflowing_record_count_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.gbin");
    let (_, chr2) = write_pair(&path);

    let mut bytes = std::fs::read(&path).unwrap();
    let offset = reference_field(0, RECORD_COUNT);
    bytes[offset..offset + 8].copy_from_slice(&u64::MAX.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let store = BinnedStore::open(&path).unwrap();
    assert!(matches!(
        store.tree("chr1"),
        Err(GenobinError::CorruptIndex { bin: 0, .. })
    ));
    let mut engine = RangeQueryEngine::open(&path).unwrap();
    let range = Interval::new(0, 1_000).unwrap();
    let err = engine.query("chr1", range, Resolution::VeryHigh).unwrap_err();
    assert!(matches!(err.source, GenobinError::CorruptIndex { .. }));
    assert_eq!(engine.query("chr2", range, Resolution::VeryHigh).unwrap(), chr2);

    assert!(matches!(
        MmapRecordFile::new(&path),
        Err(GenobinError::InvalidMapSize)
    ));
}

#[test]
fn test_oversized_node_count_is_confined_to_its_reference() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.gbin");
    let (chr1, _) = write_pair(&path);
    let range = Interval::new(0, 1_000).unwrap();

    for count in [2u32, u32::MAX] {
        let mut bytes = std::fs::read(&path).unwrap();
        let offset = reference_field(1, NODE_COUNT);
        bytes[offset..offset + 4].copy_from_slice(&count.to_le_bytes());
        let corrupted = dir.path().join(format!("nodes-{count}.gbin"));
        std::fs::write(&corrupted, &bytes).unwrap();

        let mut engine = RangeQueryEngine::open(&corrupted).unwrap();
        assert_eq!(engine.query("chr1", range, Resolution::VeryHigh).unwrap(), chr1);
        let err = engine.query("chr2", range, Resolution::VeryHigh).unwrap_err();
        assert!(matches!(
            err.source,
            GenobinError::CorruptIndex { bin: 0, .. }
        ));
    }
}

#[test]
fn test_truncated_file_reports_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.gbin");
    let records: Vec<Record> = (0..10).map(|i| gene("chr1", i * 10, i * 10 + 5, "x")).collect();
    let mut writer = StoreWriter::from_path(&path, layout(), WriterOptions::default()).unwrap();
    writer.add_reference("chr1", 1_000, &records).unwrap();
    writer.finish().unwrap();
    drop(writer);

    // drop the last two and a half records
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 90]).unwrap();

    let mut engine = RangeQueryEngine::open(&path).unwrap();
    let err = engine
        .query("chr1", Interval::new(0, 1_000).unwrap(), Resolution::VeryHigh)
        .unwrap_err();
    assert_eq!(err.collected, records[..7].to_vec());
    assert!(matches!(err.source, GenobinError::TruncatedRecord { .. }));
}

#[test]
fn test_cloned_handles_query_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("genes.gbin");
    let (chr1, _) = write_genes(&path);

    let store = BinnedStore::open(&path).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mut handle = store.try_clone().unwrap();
            let chr1 = chr1.clone();
            thread::spawn(move || {
                let range = Interval::new(i * 20_000, i * 20_000 + 7_500).unwrap();
                let hits = handle.query("chr1", range).unwrap();
                assert_eq!(names(&hits), names(&brute_force(&chr1, range)));
                hits.len()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap() > 0);
    }
    assert!(std::sync::Arc::ptr_eq(
        &store.tree("chr1").unwrap(),
        &store.try_clone().unwrap().tree("chr1").unwrap()
    ));
}

#[test]
fn test_coarse_resolution_from_parallel_summary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("genes.gbin");
    let (chr1, _) = write_genes(&path);

    let mapped = MmapRecordFile::new(&path).unwrap();
    assert_eq!(mapped.len(), 2_300);
    let mut coarse = PrecomputedProvider::new();
    coarse.insert(summarize_parallel(&mapped, 10_000, 2).unwrap());

    let mut engine = RangeQueryEngine::open(&path)
        .unwrap()
        .with_coarse_provider(Resolution::Medium, coarse);

    let wide = Interval::new(0, 100_000).unwrap();
    assert_eq!(engine.resolution_for(&wide), Resolution::High);
    let windows = engine.query("chr1", wide, Resolution::Low).unwrap();
    assert_eq!(windows.len(), 10);
    let total: i64 = windows.iter().filter_map(|w| w.payload[0].as_i64()).sum();
    // features straddling a window edge are counted once per window
    assert!(total >= chr1.len() as i64);

    let detail = engine.query("chr1", wide, Resolution::High).unwrap();
    assert_eq!(detail.len(), chr1.len());
}
