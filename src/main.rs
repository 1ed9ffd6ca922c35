// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::time::Instant;

use anyhow::{bail, Result};
use beatgrid::config::{HandlerKind, QuantizeFile};
use beatgrid::jobs::ParallelJobHandler;
use beatgrid::{Beat, Duration, NotatedUnit, QuantizedVoice, Quantizer, SearchTree, Tempo};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_SEED: u64 = 7;
const DEMO_BEATS: i64 = 32;
/// Largest timing error in the demo performance, in milliseconds
const DEMO_JITTER_MS: i64 = 25;

fn print_usage() {
    println!("beatgrid - Rhythmic quantizer");
    println!();
    println!("Usage: beatgrid <CONFIG> [--serial | --parallel]");
    println!("       beatgrid --demo [SEED]");
    println!();
    println!("Options:");
    println!("  <CONFIG>        Quantize the beats in a YAML or TOML file");
    println!("  --serial        Run the search on the calling thread");
    println!("  --parallel      Run the search on a worker pool");
    println!("  --demo [SEED]   Quantize a jittered performance both ways and compare");
    println!("  --help          Show this help message");
    println!();
    println!("Set RUST_LOG (e.g. RUST_LOG=debug) for more output.");
}

fn describe_unit(unit: &NotatedUnit) -> String {
    let mut text = format!("{:>7} +{:<6}", unit.offset.to_string(), unit.duration.to_string());
    if unit.is_rest() {
        text.push_str(" rest");
    } else {
        let pitches: Vec<String> = unit.pitches.iter().map(|p| p.to_string()).collect();
        text.push_str(&format!(" [{}]", pitches.join(" ")));
    }
    if unit.tied {
        text.push_str(" ~");
    }
    if let Some(grace) = &unit.grace {
        text.push_str(&format!(" grace x{} ({})", grace.len(), grace.duration));
    }
    if let Some(tempo) = &unit.tempo {
        text.push_str(&format!(" tempo {}", tempo));
    }
    text
}

fn print_voice(voice: &QuantizedVoice) {
    for (i, grid) in voice.grids.iter().enumerate() {
        println!("Beat {:>3}: {} (distance {:.6})", i, grid, grid.distance());
    }
    println!();
    for unit in &voice.units {
        println!("{}", describe_unit(unit));
    }
}

fn run_file(path: &str, handler: Option<HandlerKind>) -> Result<()> {
    let mut file = QuantizeFile::load(path)?;
    if let Some(handler) = handler {
        file.jobs.handler = handler;
    }
    let beats = file.beats()?;
    let quantizer = file.build_quantizer()?;
    info!(
        "Quantizing {} beats from {} with the {} handler",
        beats.len(),
        path,
        quantizer.job_handler_name()
    );

    let voice = quantizer.quantize(&beats)?;
    print_voice(&voice);
    Ok(())
}

/// A performance of random straight and tuplet rhythms with timing error
fn jittered_performance(seed: u64) -> Result<Vec<Beat>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let tempo = Tempo::default();
    let span = Duration::new(1, 4);
    let beat_ms = tempo.duration_to_milliseconds(span);

    (0..DEMO_BEATS)
        .map(|i| -> Result<Beat> {
            let start = beat_ms * i;
            let divisions: i64 = rng.gen_range(1..=6);
            let mut events = Vec::new();
            for k in 0..divisions {
                if k > 0 && rng.gen_bool(0.25) {
                    continue;
                }
                let jitter_ms = rng.gen_range(-DEMO_JITTER_MS..=DEMO_JITTER_MS);
                let jitter = Duration::from_integer(jitter_ms);
                let time = start + beat_ms * k / divisions + jitter;
                events.push((time, vec![rng.gen_range(60u8..=72)]));
            }
            Ok(Beat::from_milliseconds(span, Some(tempo), start, events)?)
        })
        .collect()
}

fn run_demo(seed: u64) -> Result<()> {
    let beats = jittered_performance(seed)?;
    info!("Demo performance: {} beats, seed {}", beats.len(), seed);

    let started = Instant::now();
    let serial = Quantizer::new(SearchTree::default()).quantize(&beats)?;
    let serial_time = started.elapsed();

    let started = Instant::now();
    let parallel = Quantizer::new(SearchTree::default())
        .with_job_handler(Box::new(ParallelJobHandler::new()))
        .quantize(&beats)?;
    let parallel_time = started.elapsed();

    print_voice(&parallel);
    println!();
    println!("Serial:   {:?}", serial_time);
    println!("Parallel: {:?}", parallel_time);

    if serial.grids != parallel.grids || serial.units != parallel.units {
        bail!("Serial and parallel results differ");
    }
    println!("Serial and parallel results agree");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("beatgrid - Rhythmic quantizer");
        println!("Run with --help for usage information");
        return Ok(());
    }

    match args[1].as_str() {
        "--demo" => {
            let seed: u64 = match args.get(2) {
                Some(arg) => arg
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid seed: {}", arg))?,
                None => DEFAULT_SEED,
            };
            run_demo(seed)?;
        }
        "--help" | "-h" => {
            print_usage();
        }
        path if !path.starts_with('-') => {
            let handler = match args.get(2).map(String::as_str) {
                None => None,
                Some("--serial") => Some(HandlerKind::Serial),
                Some("--parallel") => Some(HandlerKind::Parallel),
                Some(other) => {
                    eprintln!("Unknown option: {}", other);
                    print_usage();
                    std::process::exit(1);
                }
            };
            run_file(path, handler)?;
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
