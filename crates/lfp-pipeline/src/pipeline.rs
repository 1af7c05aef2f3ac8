//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate grid before continuing.
//!
//! ```rust
//! # use lfp_pipeline::{Coordinate, DirectionGrid, Pipeline, PipelineConfig, PipelineError};
//! # fn run(direction: &DirectionGrid) -> Result<(), PipelineError> {
//! let outlet = Coordinate::new(637_500.0, 221_750.0);
//! let staged = Pipeline::new(direction, outlet, PipelineConfig::default())
//!     .seed()?
//!     .measure_downstream()?
//!     .measure_upstream()?
//!     .extract_corridor()?
//!     .thin()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state, carrying
//! every grid computed so far. Every stage polls the cancellation check
//! before starting and tags any failure with its [`Stage`].
//!
//! # Memory
//!
//! [`DownstreamMeasured`] holds the basin traversal until the upstream
//! stage consumes it. From [`UpstreamMeasured`] onward the state holds
//! several full-size `f64` grids. Callers that only need the path should use
//! [`crate::process`], which keeps nothing but the result.

use crate::cancel::{CancelCheck, NeverCancel, checkpoint};
use crate::corridor::{self, Corridor};
use crate::distance::{FlowMode, FlowTraversal};
use crate::grid::{Cell, DirectionGrid, DistanceGrid, PathGrid};
use crate::seed::{SeedMask, snap_to_cell};
use crate::thin::{self, Skeleton};
use crate::types::{Coordinate, PipelineConfig, PipelineError, Stage, StagedResult};

/// Entry point for the staged pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline that cannot be cancelled.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(direction: &DirectionGrid, outlet: Coordinate, config: PipelineConfig) -> Pending<'_> {
        Self::with_cancel(direction, outlet, config, &NeverCancel)
    }

    /// Start a pipeline that polls `cancel` before every stage.
    pub fn with_cancel<'a>(
        direction: &'a DirectionGrid,
        outlet: Coordinate,
        config: PipelineConfig,
        cancel: &'a dyn CancelCheck,
    ) -> Pending<'a> {
        Pending {
            ctx: Context {
                direction,
                config,
                cancel,
            },
            outlet,
        }
    }
}

/// Inputs shared by every stage.
struct Context<'a> {
    direction: &'a DirectionGrid,
    config: PipelineConfig,
    cancel: &'a dyn CancelCheck,
}

impl Context<'_> {
    fn enter(&self, stage: Stage) -> Result<(), PipelineError> {
        checkpoint(self.cancel, stage)
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Nothing computed yet. Call [`seed`](Self::seed) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .seed() to continue"]
pub struct Pending<'a> {
    ctx: Context<'a>,
    outlet: Coordinate,
}

impl<'a> Pending<'a> {
    /// The outlet coordinate as given.
    #[must_use]
    pub const fn outlet(&self) -> Coordinate {
        self.outlet
    }

    /// Validate the configuration and snap the outlet to a seed cell.
    ///
    /// # Errors
    ///
    /// [`Stage::Configure`] with `InvalidConfig` for unusable settings,
    /// [`Stage::Seed`] with `OutOfBounds` if the outlet is outside the grid.
    pub fn seed(self) -> Result<Seeded<'a>, PipelineError> {
        self.ctx.enter(Stage::Configure)?;
        self.ctx
            .config
            .validate()
            .map_err(|e| PipelineError::new(Stage::Configure, e))?;

        self.ctx.enter(Stage::Seed)?;
        let outlet = snap_to_cell(self.ctx.direction.geometry(), self.outlet)
            .map_err(|e| PipelineError::new(Stage::Seed, e))?;
        let seeds = SeedMask::new([outlet]);
        tracing::debug!(row = outlet.row, col = outlet.col, "outlet snapped");
        Ok(Seeded {
            ctx: self.ctx,
            outlet,
            seeds,
        })
    }
}

// ───────────────────────── Stage 1: Seeded ───────────────────────────

/// Outlet snapped to a cell. Call
/// [`measure_downstream`](Self::measure_downstream) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .measure_downstream() to continue"]
pub struct Seeded<'a> {
    ctx: Context<'a>,
    outlet: Cell,
    seeds: SeedMask,
}

impl<'a> Seeded<'a> {
    /// The cell the outlet snapped to.
    #[must_use]
    pub const fn outlet(&self) -> Cell {
        self.outlet
    }

    /// The seed mask.
    #[must_use]
    pub const fn seeds(&self) -> &SeedMask {
        &self.seeds
    }

    /// Trace the basin draining to the outlet and compute the downstream
    /// flow length of every cell in it.
    ///
    /// # Errors
    ///
    /// [`Stage::Downstream`] with `CyclicDirection` or `InvalidSeed`.
    pub fn measure_downstream(self) -> Result<DownstreamMeasured<'a>, PipelineError> {
        self.ctx.enter(Stage::Downstream)?;
        let traversal = FlowTraversal::trace(self.ctx.direction, &self.seeds)
            .map_err(|e| PipelineError::new(Stage::Downstream, e))?;
        let downstream = traversal.distances(FlowMode::Downstream);
        Ok(DownstreamMeasured {
            ctx: self.ctx,
            outlet: self.outlet,
            seeds: self.seeds,
            traversal,
            downstream,
        })
    }
}

// ───────────────────────── Stage 2: DownstreamMeasured ───────────────

/// Downstream lengths known. Call
/// [`measure_upstream`](Self::measure_upstream) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .measure_upstream() to continue"]
pub struct DownstreamMeasured<'a> {
    ctx: Context<'a>,
    outlet: Cell,
    seeds: SeedMask,
    traversal: FlowTraversal,
    downstream: DistanceGrid,
}

impl<'a> DownstreamMeasured<'a> {
    /// Flow length from each cell down to the outlet.
    #[must_use]
    pub const fn downstream(&self) -> &DistanceGrid {
        &self.downstream
    }

    /// The traced basin, shared with the upstream stage.
    #[must_use]
    pub const fn traversal(&self) -> &FlowTraversal {
        &self.traversal
    }

    /// Compute the upstream flow length of every cell draining to the
    /// outlet, reusing the downstream traversal.
    ///
    /// # Errors
    ///
    /// [`Stage::Upstream`] with `Cancelled` only.
    pub fn measure_upstream(self) -> Result<UpstreamMeasured<'a>, PipelineError> {
        self.ctx.enter(Stage::Upstream)?;
        let upstream = self.traversal.distances(FlowMode::Upstream);
        Ok(UpstreamMeasured {
            ctx: self.ctx,
            outlet: self.outlet,
            seeds: self.seeds,
            downstream: self.downstream,
            upstream,
        })
    }
}

// ───────────────────────── Stage 3: UpstreamMeasured ─────────────────

/// Both flow lengths known. Call
/// [`extract_corridor`](Self::extract_corridor) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .extract_corridor() to continue"]
pub struct UpstreamMeasured<'a> {
    ctx: Context<'a>,
    outlet: Cell,
    seeds: SeedMask,
    downstream: DistanceGrid,
    upstream: DistanceGrid,
}

impl<'a> UpstreamMeasured<'a> {
    /// Flow length from each cell up to its farthest source.
    #[must_use]
    pub const fn upstream(&self) -> &DistanceGrid {
        &self.upstream
    }

    /// Select the cells within tolerance of the longest flow length.
    ///
    /// # Errors
    ///
    /// [`Stage::Corridor`] with `NoReachablePath` if nothing drains into
    /// the outlet.
    pub fn extract_corridor(self) -> Result<CorridorExtracted<'a>, PipelineError> {
        self.ctx.enter(Stage::Corridor)?;
        let corridor =
            corridor::extract_corridor(&self.downstream, &self.upstream, self.ctx.config.epsilon)
                .map_err(|e| PipelineError::new(Stage::Corridor, e))?;
        Ok(CorridorExtracted {
            ctx: self.ctx,
            outlet: self.outlet,
            seeds: self.seeds,
            downstream: self.downstream,
            upstream: self.upstream,
            corridor,
        })
    }
}

// ───────────────────────── Stage 4: CorridorExtracted ────────────────

/// Corridor selected. Call [`thin`](Self::thin) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .thin() to continue"]
pub struct CorridorExtracted<'a> {
    ctx: Context<'a>,
    outlet: Cell,
    seeds: SeedMask,
    downstream: DistanceGrid,
    upstream: DistanceGrid,
    corridor: Corridor,
}

impl CorridorExtracted<'_> {
    /// The corridor and the combined flow-length grid.
    #[must_use]
    pub const fn corridor(&self) -> &Corridor {
        &self.corridor
    }

    /// Cells the thinning must keep: seeds and sources inside the corridor.
    fn anchors(&self) -> Vec<Cell> {
        self.corridor
            .mask
            .set_cells()
            .filter(|&cell| {
                self.seeds.contains(cell)
                    || self
                        .upstream
                        .get(cell)
                        .copied()
                        .flatten()
                        .is_some_and(|u| u <= 0.0)
            })
            .collect()
    }

    /// Thin the corridor to a one-cell-wide path from the farthest source
    /// to the outlet.
    ///
    /// # Errors
    ///
    /// [`Stage::Thin`] with `EmptyCorridor` if the corridor has no cells.
    pub fn thin(self) -> Result<Thinned, PipelineError> {
        self.ctx.enter(Stage::Thin)?;
        let anchors = self.anchors();
        let skeleton = thin::thin_anchored(
            &self.corridor.mask,
            &anchors,
            self.ctx.config.max_thin_iterations,
        )
        .map_err(|e| PipelineError::new(Stage::Thin, e))?;

        let branches = skeleton.path.branch_cells();
        if branches > 0 {
            tracing::warn!(branches, "tied flow paths left branches in the skeleton");
        }
        tracing::info!(
            longest_length = self.corridor.max_combined,
            path_cells = skeleton.path.count(),
            "longest flow path extracted"
        );

        Ok(Thinned {
            outlet: self.outlet,
            seeds: self.seeds,
            downstream: self.downstream,
            upstream: self.upstream,
            corridor: self.corridor,
            skeleton,
        })
    }
}

// ───────────────────────── Stage 5: Thinned ──────────────────────────

/// Final state. Call [`into_result`](Self::into_result) to collect the
/// grids.
#[must_use = "call .into_result() to obtain the staged result"]
pub struct Thinned {
    outlet: Cell,
    seeds: SeedMask,
    downstream: DistanceGrid,
    upstream: DistanceGrid,
    corridor: Corridor,
    skeleton: Skeleton,
}

impl Thinned {
    /// The thinned longest flow path.
    #[must_use]
    pub const fn path(&self) -> &PathGrid {
        &self.skeleton.path
    }

    /// Thinning output with iteration statistics.
    #[must_use]
    pub const fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// Collect every intermediate into a [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            outlet: self.outlet,
            seeds: self.seeds,
            downstream: self.downstream,
            upstream: self.upstream,
            corridor: self.corridor,
            skeleton: self.skeleton,
        }
    }
}
