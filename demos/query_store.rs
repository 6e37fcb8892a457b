use anyhow::Result;
use clap::{Parser, ValueEnum};
use genobin::{Interval, MmapRecordFile, PrecomputedProvider, RangeQueryEngine, Resolution};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}
impl From<Level> for Resolution {
    fn from(level: Level) -> Self {
        match level {
            Level::VeryHigh => Resolution::VeryHigh,
            Level::High => Resolution::High,
            Level::Medium => Resolution::Medium,
            Level::Low => Resolution::Low,
            Level::VeryLow => Resolution::VeryLow,
        }
    }
}

#[derive(Parser)]
struct Args {
    /// Store to query
    #[clap(required = true)]
    path: String,
    /// Reference name
    #[clap(required = true)]
    reference: String,
    #[clap(required = true)]
    start: i64,
    #[clap(required = true)]
    end: i64,
    /// Resolution; picked from the range width when omitted
    #[clap(long, value_enum)]
    resolution: Option<Level>,
    /// Serve Low and coarser resolutions from windows of this many bases
    #[clap(long)]
    summary_window: Option<i64>,
    /// Maximum number of records to print
    #[clap(long, default_value_t = 20)]
    limit: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut engine = RangeQueryEngine::open(&args.path)?;
    if let Some(window) = args.summary_window {
        let mapped = MmapRecordFile::new(&args.path)?;
        let mut coarse = PrecomputedProvider::new();
        coarse.insert(genobin::summarize_parallel(&mapped, window, 0)?);
        engine = engine.with_coarse_provider(Resolution::Low, coarse);
    }

    let range = Interval::new(args.start, args.end)?;
    let resolution = args
        .resolution
        .map(Resolution::from)
        .unwrap_or_else(|| engine.resolution_for(&range));

    match engine.query(&args.reference, range, resolution) {
        Ok(records) => {
            println!("{} records at {:?}", records.len(), resolution);
            for record in records.iter().take(args.limit) {
                println!("{}\t{}\t{}\t{:?}", record.reference, record.start(), record.end(), record.payload);
            }
        }
        Err(err) => {
            eprintln!(
                "{err}: {} ({} records read before the failure)",
                err.source,
                err.collected.len()
            );
            std::process::exit(1);
        }
    }
    engine.close();
    Ok(())
}
