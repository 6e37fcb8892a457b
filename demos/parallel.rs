use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use genobin::{MmapRecordFile, ParallelProcessor, ParallelReader, Record};

#[derive(Parser)]
struct Args {
    /// Store to scan
    #[clap(required = true)]
    path: String,
    /// Number of threads (0 = all cores)
    #[clap(short, long, default_value_t = 0)]
    threads: usize,
}

/// Record count and summed feature length per reference.
#[derive(Clone, Default)]
pub struct Processor {
    local: HashMap<String, (u64, i64)>,
    global: Arc<Mutex<HashMap<String, (u64, i64)>>>,
}
impl Processor {
    pub fn final_counts(&self) -> HashMap<String, (u64, i64)> {
        self.global.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}
impl ParallelProcessor for Processor {
    fn process_record(&mut self, record: Record) -> genobin::Result<()> {
        let slot = self.local.entry(record.reference).or_default();
        slot.0 += 1;
        slot.1 += record.interval.width();
        Ok(())
    }
    fn on_batch_complete(&mut self) -> genobin::Result<()> {
        let mut guard = self
            .global
            .lock()
            .map_err(|_| genobin::GenobinError::Process("counter poisoned".into()))?;
        for (reference, (count, bases)) in self.local.drain() {
            let slot = guard.entry(reference).or_default();
            slot.0 += count;
            slot.1 += bases;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let reader = MmapRecordFile::new(&args.path)?;
    println!("Records: {}", reader.len());

    let proc = Processor::default();
    let start = Instant::now();
    reader.process_parallel(proc.clone(), args.threads)?;
    let proc_elapsed = start.elapsed();

    let counts = proc.final_counts();
    for entry in reader.references() {
        let (count, bases) = counts.get(&entry.name).copied().unwrap_or_default();
        println!("{}\t{}\t{}", entry.name, count, bases);
    }
    println!(
        "Processing duration: {:.5}s",
        proc_elapsed.as_millis() as f64 / 1000.0
    );
    Ok(())
}
