//! Tracedex CLI
//!
//! Command-line front end of the event index:
//! - `demo`: index a synthetic trace, then filter it
//! - `config`: print the default configuration

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracedex::config::{generate_default_config, Config, LoggingConfig};
use tracedex::index::Indexes;
use tracedex::query::{parse_condition, QueryExecutor};
use tracedex::storage::Role;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "tracedex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Event index and query engine for execution traces")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index a synthetic trace and run a condition against it
    Demo {
        /// Number of events to generate
        #[arg(short, long, default_value = "100000")]
        events: u64,
        /// Seed of the trace generator
        #[arg(long, default_value = "7")]
        seed: u64,
        /// Condition to evaluate
        #[arg(long, default_value = "thread = 1 AND (depth = 2 OR depth = 3)")]
        condition: String,
        /// Matching events to print
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Histogram slots
        #[arg(long, default_value = "16")]
        slots: usize,
    },

    /// Print the default configuration file
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    match cli.command {
        Commands::Config => {
            print!("{}", generate_default_config());
        }
        Commands::Demo {
            events,
            seed,
            condition,
            limit,
            slots,
        } => {
            init_logging(&config.logging);
            run_demo(&config, &cli.format, events, seed, &condition, limit, slots)?;
        }
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tracedex={}", config.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_demo(
    config: &Config,
    format: &str,
    events: u64,
    seed: u64,
    condition: &str,
    limit: usize,
    slots: usize,
) -> anyhow::Result<()> {
    tracing::info!("Tracedex v{}", env!("CARGO_PKG_VERSION"));

    let condition = parse_condition(condition).context("invalid condition")?;
    let data_dir = PathBuf::from(&config.storage.data_dir).join(format!("demo-{}", std::process::id()));
    tracing::info!("Data directory: {:?}", data_dir);

    let indexes = Arc::new(Indexes::open(&data_dir, config.index_config())?);

    let started = Instant::now();
    let (first, last) = generate_trace(&indexes, events, seed)?;
    indexes.flush_tasks()?;
    tracing::info!("Indexed {} events in {:?}", events, started.elapsed());

    let executor = QueryExecutor::new(Arc::clone(&indexes));
    let started = Instant::now();
    let matches = executor.events(&condition, first, limit)?;
    let counts = executor.counts(&condition, first, last + 1, slots)?;
    tracing::info!("Evaluated {} in {:?}", condition, started.elapsed());

    if format == "json" {
        let body = serde_json::json!({
            "condition": condition.to_string(),
            "events": matches,
            "histogram": { "t1": first, "t2": last + 1, "counts": counts },
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("Condition: {}", condition);
        println!();
        println!("{:<12} {:<14} {}", "Event", "Timestamp", "Role");
        println!("{}", "-".repeat(34));
        for m in &matches {
            println!("{:<12} {:<14} {}", m.event_id, m.timestamp, Role(m.role));
        }

        println!();
        print_histogram(&counts, first, last + 1);
        print_stats(&indexes);
    }

    indexes.dispose()?;
    if let Err(e) = std::fs::remove_dir(&data_dir) {
        tracing::debug!("Could not remove {:?}: {}", data_dir, e);
    }
    Ok(())
}

/// Index `events` synthetic trace events, returning the first and last timestamp
fn generate_trace(indexes: &Indexes, events: u64, seed: u64) -> anyhow::Result<(u64, u64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut timestamp = 1_000u64;
    let mut depth = 0u32;
    let first = timestamp;

    for _ in 0..events {
        timestamp += rng.gen_range(1..50);
        let event_id = indexes.register_timestamp(timestamp)?;

        depth = match rng.gen_range(0..3) {
            0 => depth.saturating_sub(1),
            1 => depth,
            _ => (depth + 1).min(31),
        };
        indexes.index_type(rng.gen_range(0..8), event_id)?;
        indexes.index_thread(rng.gen_range(0..4), event_id)?;
        indexes.index_depth(depth, event_id)?;
        indexes.index_location(rng.gen_range(0..2_000), event_id)?;

        let behavior = rng.gen_range(0..500);
        indexes.index_behavior(behavior, event_id, Role::BEHAVIOR_CALLED)?;
        if rng.gen_bool(0.8) {
            indexes.index_behavior(behavior, event_id, Role::BEHAVIOR_EXECUTED)?;
        }
        indexes.event_at_behavior(behavior)?;

        indexes.index_object(rng.gen_range(0..10_000), event_id, Role::TARGET)?;
        if rng.gen_bool(0.5) {
            indexes.index_object(rng.gen_range(0..10_000), event_id, Role(1))?;
        }
        if rng.gen_bool(0.1) {
            indexes.index_field(rng.gen_range(0..64), event_id, Role::VALUE)?;
            indexes.index_array_index(rng.gen_range(0..1_024), event_id)?;
        }
    }

    Ok((first, timestamp))
}

fn print_histogram(counts: &[u64], t1: u64, t2: u64) {
    let max = counts.iter().copied().max().unwrap_or(0).max(1);
    let width = (t2 - t1) as f64 / counts.len().max(1) as f64;

    println!("Histogram [{}, {})", t1, t2);
    for (i, count) in counts.iter().enumerate() {
        let start = t1 + (i as f64 * width) as u64;
        let bar = "#".repeat((count * 40 / max) as usize);
        println!("{:>12} {:>8} {}", start, count, bar);
    }
}

fn print_stats(indexes: &Indexes) {
    let stats = indexes.stats();
    println!();
    println!("Events:        {}", stats.events);
    println!("Max object id: {}", stats.max_object_id);
    println!(
        "Indexes:       {} created, {} discarded, {} reloaded",
        stats.created(),
        stats.discarded(),
        stats.reloaded()
    );
    println!(
        "Residency:     {}/{} resident, {} evictions",
        stats.residency.resident, stats.residency.capacity, stats.residency.evictions
    );
    println!(
        "Pages:         {} pages, {} cache hits, {} misses",
        stats.pages.page_count, stats.pages.cache_hits, stats.pages.cache_misses
    );
    println!(
        "Workers:       {} threads, {} batches",
        stats.executor.workers, stats.executor.completed
    );
}
