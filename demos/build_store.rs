use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use genobin::{
    BuildConfig, FieldDescriptor, Interval, Layout, Record, StoreWriter, Value, WriterOptions,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    /// Output file path
    #[clap(required = true)]
    path: String,
    /// Number of references to generate
    #[clap(long, default_value_t = 3)]
    references: usize,
    /// Number of records per reference (in thousands)
    #[clap(long, default_value_t = 100.0)]
    records: f64,
    /// Length of every reference
    #[clap(long, default_value_t = 10_000_000)]
    length: i64,
    /// Longest generated feature
    #[clap(long, default_value_t = 50_000)]
    max_feature: i64,
    #[clap(long, default_value_t = 4)]
    branching: u32,
    #[clap(long, default_value_t = 512)]
    max_records_per_bin: u32,
    /// Write points sorted by position instead of indexed intervals
    #[clap(long)]
    points: bool,
    #[clap(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let build = BuildConfig::default()
        .branching(args.branching)
        .max_records_per_bin(args.max_records_per_bin);
    let (layout, options) = if args.points {
        (
            Layout::point(vec![FieldDescriptor::float64("value")])?,
            WriterOptions::unindexed().build(build),
        )
    } else {
        (
            Layout::interval(vec![
                FieldDescriptor::fixed_string("name", 16),
                FieldDescriptor::float64("score"),
            ])?,
            WriterOptions::default().build(build),
        )
    };

    let mut rng = if let Some(seed) = args.seed {
        SmallRng::seed_from_u64(seed)
    } else {
        SmallRng::from_os_rng()
    };

    let start = Instant::now();
    let mut writer = StoreWriter::from_path(&args.path, layout, options)?;
    let per_reference = (args.records * 1_000.0) as usize;
    for r in 0..args.references {
        let name = format!("chr{}", r + 1);
        let mut starts: Vec<i64> = (0..per_reference)
            .map(|_| rng.random_range(0..args.length))
            .collect();
        starts.sort_unstable();

        let records = starts
            .into_iter()
            .enumerate()
            .map(|(i, pos)| -> Result<Record> {
                let record = if args.points {
                    Record::new(&name, Interval::point(pos), vec![Value::Float64(rng.random())])
                } else {
                    let len = rng.random_range(1..=args.max_feature);
                    Record::new(
                        &name,
                        Interval::new(pos, (pos + len).min(args.length))?,
                        vec![
                            Value::Text(format!("{name}_{i}")),
                            Value::Float64(rng.random()),
                        ],
                    )
                };
                Ok(record)
            })
            .collect::<Result<Vec<_>>>()?;
        writer.add_reference(&name, args.length, &records)?;
    }
    writer.finish()?;
    let elapsed = start.elapsed();

    eprintln!(
        "Finished writing {} records to {}",
        writer.records_written(),
        args.path
    );
    eprintln!("Elapsed time: {:?}", elapsed);

    Ok(())
}
