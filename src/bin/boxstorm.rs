//! boxstorm CLI
//!
//! Runs the box collision simulation headless and reports tick timings.

use anyhow::{Context, Result};
use boxstorm::simulation::config::{DEFAULT_BOX_COUNT, MAX_BOXES};
use boxstorm::simulation::{
    ColliderManager, ComputeBridge, DetectionStrategy, SimulationConfig, SoftwareBridge, WgpuBridge,
};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of boxes to simulate
    #[arg(long, default_value_t = DEFAULT_BOX_COUNT)]
    boxes: usize,

    /// Number of ticks to run
    #[arg(long, default_value_t = 300)]
    ticks: u32,

    /// Seconds per tick
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Detection strategy: serial, parallel or device
    #[arg(long, default_value_t = DetectionStrategy::Serial)]
    strategy: DetectionStrategy,

    /// Worker threads for the parallel strategy (defaults to hardware concurrency)
    #[arg(long)]
    threads: Option<usize>,

    /// Seed for box spawning; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Vertical acceleration in units per second squared
    #[arg(long, allow_negative_numbers = true)]
    gravity: Option<f32>,

    /// Compute backend used by the device strategy
    #[arg(long, value_enum, default_value_t = DeviceKind::Gpu)]
    device: DeviceKind,

    /// Run every strategy from the same seed and compare results
    #[arg(long)]
    compare: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DeviceKind {
    /// wgpu compute on the best available adapter
    Gpu,
    /// Host emulation of the device kernel
    Software,
}

fn make_bridge(kind: DeviceKind) -> Result<Box<dyn ComputeBridge>> {
    Ok(match kind {
        DeviceKind::Gpu => Box::new(WgpuBridge::new_headless().context("GPU compute unavailable")?),
        DeviceKind::Software => Box::new(SoftwareBridge::new()),
    })
}

fn make_manager(args: &Args, seed: u64, strategy: DetectionStrategy) -> Result<ColliderManager> {
    let threads = args.threads.unwrap_or_else(num_cpus::get);
    let mut manager = ColliderManager::with_seed(threads, seed)?;
    if strategy == DetectionStrategy::Device {
        manager.attach_device(make_bridge(args.device)?)?;
    }
    Ok(manager)
}

struct RunSummary {
    elapsed: Duration,
    pairs: usize,
    manager: ColliderManager,
}

fn run(args: &Args, seed: u64, strategy: DetectionStrategy) -> Result<RunSummary> {
    let mut manager = make_manager(args, seed, strategy)?;
    let mut config = SimulationConfig::new()
        .with_target_count(args.boxes)
        .with_strategy(strategy);
    if let Some(gravity) = args.gravity {
        config = config.with_gravity(gravity);
    }

    info!(
        "Running {} ticks of {} boxes with the {} strategy",
        args.ticks, args.boxes, strategy
    );

    let start = Instant::now();
    let mut pairs = 0;
    for _ in 0..args.ticks {
        let report = manager
            .tick(&config, args.dt)
            .with_context(|| format!("{strategy} tick failed"))?;
        pairs += report.stats.pairs;
    }

    Ok(RunSummary {
        elapsed: start.elapsed(),
        pairs,
        manager,
    })
}

fn compare(args: &Args, seed: u64) -> Result<()> {
    let reference = run(args, seed, DetectionStrategy::Serial)?;
    println!(
        "{:<10} {:>10.2} ms {:>10} pairs  reference",
        DetectionStrategy::Serial,
        reference.elapsed.as_secs_f64() * 1000.0,
        reference.pairs
    );

    for strategy in DetectionStrategy::ALL
        .into_iter()
        .filter(|strategy| *strategy != DetectionStrategy::Serial)
    {
        let summary = match run(args, seed, strategy) {
            Ok(summary) => summary,
            Err(err) => {
                warn!("Skipping {} strategy: {:#}", strategy, err);
                continue;
            }
        };

        let agrees = summary.manager.boxes() == reference.manager.boxes();
        println!(
            "{:<10} {:>10.2} ms {:>10} pairs  {}",
            strategy,
            summary.elapsed.as_secs_f64() * 1000.0,
            summary.pairs,
            if agrees { "matches" } else { "DIVERGED" }
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    anyhow::ensure!(
        args.boxes <= MAX_BOXES,
        "--boxes must be at most {MAX_BOXES}"
    );
    let seed = args.seed.unwrap_or_else(rand::random);
    info!("Seed {}", seed);

    if args.compare {
        return compare(&args, seed);
    }

    let summary = run(&args, seed, args.strategy)?;
    if let Some(name) = summary.manager.device_name() {
        info!("Device backend: {}", name);
    }
    println!("{}", summary.manager.metrics());
    println!(
        "{} ticks in {:.2} ms, {} pairs resolved",
        args.ticks,
        summary.elapsed.as_secs_f64() * 1000.0,
        summary.pairs
    );
    Ok(())
}
