//! Fan-out of decoded records to worker threads.
//!
//! A [`ParallelReader`] splits its records into one contiguous range per
//! worker and drives a clone of the [`ParallelProcessor`] over each range in
//! batches. Processors accumulate into local state and publish it from
//! [`ParallelProcessor::on_batch_complete`], so shared state is locked once
//! per batch rather than once per record.

use crate::{Record, Result};

/// Per-worker record consumer; every worker owns its own clone.
pub trait ParallelProcessor: Send + Clone {
    fn process_record(&mut self, record: Record) -> Result<()>;

    /// Publishes whatever was accumulated since the previous batch.
    fn on_batch_complete(&mut self) -> Result<()>;
}

/// Stores that can drive [`ParallelProcessor`]s over all of their records.
pub trait ParallelReader {
    /// Runs clones of `processor` over every record on `num_threads` workers
    /// (0 means one per core), returning the first worker error.
    fn process_parallel<P: ParallelProcessor + 'static>(
        &self,
        processor: P,
        num_threads: usize,
    ) -> Result<()>;
}
