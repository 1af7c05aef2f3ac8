//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation for tuning the corridor
//! tolerance and thinning cap against real drainage grids.
//! [`process_staged_with_diagnostics`] runs the staged pipeline and
//! collects them alongside the results.
//!
//! Timestamps come from a caller-supplied [`Clock`] so the pipeline crate
//! stays free of platform timing. Durations are serialized as fractional
//! seconds (`f64`) for JSON compatibility, since `std::time::Duration`
//! does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelCheck;
use crate::distance::FlowMode;
use crate::grid::{DirectionGrid, DistanceGrid};
use crate::pipeline::Pipeline;
use crate::types::{Coordinate, PipelineConfig, PipelineError, StagedResult};

/// Monotonic time source used to measure stage durations.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: configuration check and outlet snapping.
    pub seed: StageDiagnostics,
    /// Stage 2: downstream flow length.
    pub downstream: StageDiagnostics,
    /// Stage 3: upstream flow length.
    pub upstream: StageDiagnostics,
    /// Stage 4: corridor extraction.
    pub corridor: StageDiagnostics,
    /// Stage 5: thinning.
    pub thin: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Outlet snapping.
    Seed {
        /// Row of the outlet cell.
        row: usize,
        /// Column of the outlet cell.
        col: usize,
        /// Number of seed cells.
        seed_count: usize,
    },
    /// Flow length propagation, either direction.
    Distance {
        /// Which flow length was computed.
        mode: FlowMode,
        /// Cells that drain into the outlet.
        reached_cells: usize,
        /// Largest flow length found, if any cell was reached.
        max_distance: Option<f64>,
    },
    /// Corridor extraction.
    Corridor {
        /// Tolerance below the maximum.
        epsilon: f64,
        /// Longest flow path length.
        max_combined: f64,
        /// Cells with a combined flow length.
        combined_cells: usize,
        /// Cells kept in the corridor.
        corridor_cells: usize,
    },
    /// Thinning.
    Thin {
        /// Corridor cells before thinning.
        cells_before: usize,
        /// Path cells after thinning.
        cells_after: usize,
        /// Iterations run.
        iterations: usize,
        /// Whether thinning finished before the iteration cap.
        converged: bool,
        /// Path cells with three or more path neighbors.
        branch_cells: usize,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Grid rows.
    pub rows: usize,
    /// Grid columns.
    pub cols: usize,
    /// Total cell count.
    pub cell_count: usize,
    /// Length of the longest flow path in map units.
    pub longest_length: f64,
    /// Cells in the final path.
    pub path_cells: usize,
    /// 8-connected components in the final path. `None` if the grid is too
    /// large to label.
    pub path_components: Option<usize>,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Grid: {}x{} ({} cells)",
            self.summary.rows, self.summary.cols, self.summary.cell_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Seed", &self.seed),
            ("Downstream", &self.downstream),
            ("Upstream", &self.upstream),
            ("Corridor", &self.corridor),
            ("Thin", &self.thin),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        let components = self
            .summary
            .path_components
            .map_or_else(|| "n/a".to_string(), |n| n.to_string());
        lines.push(format!(
            "Longest flow path: {:.3}  |  Path cells: {}  |  Components: {components}",
            self.summary.longest_length, self.summary.path_cells,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Seed {
            row,
            col,
            seed_count,
        } => format!("outlet=({row}, {col}) seeds={seed_count}"),
        StageMetrics::Distance {
            mode,
            reached_cells,
            max_distance,
        } => {
            let max = max_distance.map_or_else(|| "none".to_string(), |m| format!("{m:.3}"));
            format!("{mode:?} reached={reached_cells} max={max}")
        }
        StageMetrics::Corridor {
            epsilon,
            max_combined,
            combined_cells,
            corridor_cells,
        } => format!(
            "max={max_combined:.3} eps={epsilon} cells={combined_cells}->{corridor_cells}"
        ),
        StageMetrics::Thin {
            cells_before,
            cells_after,
            iterations,
            converged,
            branch_cells,
        } => {
            let state = if *converged { "converged" } else { "capped" };
            format!(
                "{cells_before}->{cells_after} cells, {iterations} iters ({state}), branches={branch_cells}"
            )
        }
    }
}

fn distance_metrics(mode: FlowMode, grid: &DistanceGrid) -> StageMetrics {
    StageMetrics::Distance {
        mode,
        reached_cells: grid.valid_count(),
        max_distance: grid.max_value(),
    }
}

/// Run the staged pipeline, timing each stage with `clock`.
///
/// # Errors
///
/// Any [`PipelineError`] the stages raise, including cancellation.
pub fn process_staged_with_diagnostics<C: Clock>(
    direction: &DirectionGrid,
    outlet: Coordinate,
    config: &PipelineConfig,
    cancel: &dyn CancelCheck,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let epsilon = config.epsilon;
    let total_start = clock.now();

    // ───────────── Stage 1: Seed ─────────────
    let start = clock.now();
    let seeded = Pipeline::with_cancel(direction, outlet, config.clone(), cancel).seed()?;
    let seed = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Seed {
            row: seeded.outlet().row,
            col: seeded.outlet().col,
            seed_count: seeded.seeds().len(),
        },
    };

    // ───────────── Stage 2: Downstream ─────────────
    let start = clock.now();
    let measured = seeded.measure_downstream()?;
    let downstream = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: distance_metrics(FlowMode::Downstream, measured.downstream()),
    };

    // ───────────── Stage 3: Upstream ─────────────
    let start = clock.now();
    let measured = measured.measure_upstream()?;
    let upstream = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: distance_metrics(FlowMode::Upstream, measured.upstream()),
    };

    // ───────────── Stage 4: Corridor ─────────────
    let start = clock.now();
    let extracted = measured.extract_corridor()?;
    let corridor_cells = extracted.corridor().mask.count();
    let corridor = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Corridor {
            epsilon,
            max_combined: extracted.corridor().max_combined,
            combined_cells: extracted.corridor().combined.valid_count(),
            corridor_cells,
        },
    };

    // ───────────── Stage 5: Thin ─────────────
    let start = clock.now();
    let thinned = extracted.thin()?;
    let thin = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Thin {
            cells_before: corridor_cells,
            cells_after: thinned.path().count(),
            iterations: thinned.skeleton().iterations,
            converged: thinned.skeleton().converged,
            branch_cells: thinned.path().branch_cells(),
        },
    };

    let staged = thinned.into_result();
    let total_duration = clock.elapsed(&total_start);
    let geometry = direction.geometry();
    let summary = PipelineSummary {
        rows: geometry.rows,
        cols: geometry.cols,
        cell_count: geometry.cell_count(),
        longest_length: staged.longest_length(),
        path_cells: staged.path().count(),
        path_components: staged.path().component_count(),
    };

    Ok((
        staged,
        PipelineDiagnostics {
            seed,
            downstream,
            upstream,
            corridor,
            thin,
            total_duration,
            summary,
        },
    ))
}
