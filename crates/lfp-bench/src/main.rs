//! lfp-bench: CLI for longest flow path extraction and diagnostics.
//!
//! Reads a drainage-direction grid, extracts the longest flow path to the
//! given outlet, prints per-stage diagnostics, and optionally writes the
//! path, the intermediate distance grids, and a PNG preview. Useful for:
//!
//! - Tuning the corridor tolerance on grids with tied flow paths
//! - Checking whether thinning converges within the iteration cap
//! - Measuring per-stage durations on large basins
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin lfp-bench -- [OPTIONS] --outlet <E,N> <INPUT>
//! ```
//!
//! Set `RUST_LOG=lfp_pipeline=debug` for stage-level log events.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use lfp_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use lfp_pipeline::{Coordinate, DirectionGrid, NeverCancel, PipelineConfig, StagedResult};
use lfp_raster::{DirectionEncoding, RasterError};

/// Longest flow path extraction with per-stage diagnostics.
#[derive(Parser)]
#[command(name = "lfp-bench", version)]
struct Cli {
    /// Drainage-direction grid (ESRI or GRASS ASCII).
    input: PathBuf,

    /// Outlet coordinate as `easting,northing`.
    #[arg(long, allow_hyphen_values = true)]
    outlet: Coordinate,

    /// Direction code convention of the input grid.
    #[arg(long, value_enum, default_value_t = Encoding::Grass)]
    encoding: Encoding,

    /// Corridor tolerance below the longest flow length, in map units.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_EPSILON)]
    epsilon: f64,

    /// Cap on thinning iterations.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MAX_THIN_ITERATIONS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_thin_iterations: usize,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, `--epsilon` and `--max-thin-iterations` are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the path grid (1 on the path, NODATA elsewhere).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the downstream flow length grid.
    #[arg(long)]
    downstream: Option<PathBuf>,

    /// Write the upstream flow length grid.
    #[arg(long)]
    upstream: Option<PathBuf>,

    /// Rewrite the input drainage grid, for converting between encodings.
    #[arg(long)]
    direction_out: Option<PathBuf>,

    /// Direction code convention for `--direction-out` [default: the input
    /// encoding].
    #[arg(long, value_enum)]
    direction_out_encoding: Option<Encoding>,

    /// Write a PNG preview of the path over the drainage grid.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Pixels per cell in the PNG preview.
    #[arg(long, default_value_t = 4, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..=64))]
    png_scale: u32,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,
}

/// Direction encoding selection.
#[derive(Clone, Copy, ValueEnum)]
enum Encoding {
    /// GRASS codes 1-8, counter-clockwise from north-east.
    Grass,
    /// ESRI power-of-two codes, clockwise from east.
    Esri,
}

impl From<Encoding> for DirectionEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Grass => Self::Grass,
            Encoding::Esri => Self::Esri,
        }
    }
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        epsilon: cli.epsilon,
        max_thin_iterations: cli.max_thin_iterations,
    })
}

/// Write every output file requested on the command line.
fn write_outputs(
    cli: &Cli,
    direction: &DirectionGrid,
    staged: &StagedResult,
) -> Result<(), RasterError> {
    if let Some(ref path) = cli.output {
        lfp_raster::write_path_grid(path, staged.path())?;
        eprintln!("Path grid written to {}", path.display());
    }
    if let Some(ref path) = cli.downstream {
        lfp_raster::write_distance_grid(path, &staged.downstream)?;
        eprintln!("Downstream grid written to {}", path.display());
    }
    if let Some(ref path) = cli.upstream {
        lfp_raster::write_distance_grid(path, &staged.upstream)?;
        eprintln!("Upstream grid written to {}", path.display());
    }
    if let Some(ref path) = cli.direction_out {
        let encoding = cli.direction_out_encoding.unwrap_or(cli.encoding);
        lfp_raster::write_direction_grid(path, direction, encoding.into())?;
        eprintln!("Direction grid written to {}", path.display());
    }
    if let Some(ref path) = cli.png {
        lfp_raster::write_preview(path, direction, staged.path(), cli.png_scale)?;
        eprintln!("Preview written to {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let direction = match lfp_raster::read_direction_grid(&cli.input, cli.encoding.into()) {
        Ok(grid) => grid,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Grid: {} ({}x{})",
        cli.input.display(),
        direction.rows(),
        direction.cols(),
    );
    eprintln!("Outlet: {}", cli.outlet);
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match lfp_pipeline::diagnostics::process_staged_with_diagnostics(
            &direction,
            cli.outlet,
            &config,
            &NeverCancel,
            &StdClock,
        ) {
            Ok((staged, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write outputs on the first run only.
                if run == 0
                    && let Err(e) = write_outputs(&cli, &direction, &staged)
                {
                    eprintln!("Error writing output: {e}");
                    return ExitCode::FAILURE;
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Seed", |d| d.seed.duration),
        ("Downstream", |d| d.downstream.duration),
        ("Upstream", |d| d.upstream.duration),
        ("Corridor", |d| d.corridor.duration),
        ("Thin", |d| d.thin.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
