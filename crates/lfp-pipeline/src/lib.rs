//! lfp-pipeline: Longest flow path extraction (sans-IO).
//!
//! Given a D8 drainage-direction grid and an outlet coordinate, finds the
//! longest flow path draining to the outlet through:
//! seed -> downstream length -> upstream length -> corridor -> thinning.
//!
//! The longest path is the set of cells whose downstream length plus
//! upstream length equals the overall maximum. That set may be several
//! cells wide where tied paths run side by side, so it is thinned to a
//! single-cell-wide line.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory grids.
//! Reading and writing raster files lives in `lfp-raster`.

pub mod cancel;
pub mod corridor;
pub mod diagnostics;
pub mod distance;
pub mod grid;
pub mod pipeline;
pub mod seed;
pub mod thin;
pub mod types;

pub use cancel::{CancelCheck, CancelFlag, NeverCancel};
pub use corridor::{Corridor, combine, extract_corridor};
pub use distance::{FlowMode, FlowTraversal, compute_distance};
pub use grid::{
    Cell, CorridorMask, Direction, DirectionGrid, DistanceGrid, Grid, GridGeometry, Mask,
    PathGrid,
};
pub use pipeline::Pipeline;
pub use seed::{SeedMask, snap_to_cell};
pub use thin::{Skeleton, thin, thin_anchored};
pub use types::{
    Coordinate, FlowPathError, ParseCoordinateError, PipelineConfig, PipelineError,
    ProcessResult, Stage, StagedResult,
};

/// Compute the longest flow path draining to `outlet`.
///
/// # Pipeline steps
///
/// 1. Validate `config` and snap `outlet` to a seed cell
/// 2. Downstream flow length of every cell draining to the seed
/// 3. Upstream flow length of the same cells
/// 4. Corridor of cells whose combined length is within
///    `config.epsilon` of the maximum
/// 5. Thinning of the corridor to a one-cell-wide path
///
/// # Errors
///
/// Returns a [`PipelineError`] naming the failing stage; see
/// [`FlowPathError`] for the possible causes.
pub fn compute_longest_flow_path(
    direction: &DirectionGrid,
    outlet: Coordinate,
    config: &PipelineConfig,
) -> Result<PathGrid, PipelineError> {
    process(direction, outlet, config, &NeverCancel).map(|result| result.path)
}

/// Run the pipeline and return the path with its length and outlet cell.
///
/// `cancel` is polled before every stage.
///
/// # Errors
///
/// As [`compute_longest_flow_path`], plus [`FlowPathError::Cancelled`]
/// when `cancel` fires.
pub fn process(
    direction: &DirectionGrid,
    outlet: Coordinate,
    config: &PipelineConfig,
    cancel: &dyn CancelCheck,
) -> Result<ProcessResult, PipelineError> {
    process_staged(direction, outlet, config, cancel).map(StagedResult::into_process_result)
}

/// Run the pipeline keeping every intermediate grid.
///
/// # Errors
///
/// As [`process`].
pub fn process_staged(
    direction: &DirectionGrid,
    outlet: Coordinate,
    config: &PipelineConfig,
    cancel: &dyn CancelCheck,
) -> Result<StagedResult, PipelineError> {
    Ok(
        Pipeline::with_cancel(direction, outlet, config.clone(), cancel)
            .seed()?
            .measure_downstream()?
            .measure_upstream()?
            .extract_corridor()?
            .thin()?
            .into_result(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Y-shaped basin on a 4x5 grid: a long arm from the north-west
    /// corner and a short arm from the north-east, meeting at (3,2).
    fn y_basin() -> DirectionGrid {
        let codes = [
            [7, 0, 0, 0, 5],
            [0, 7, 0, 5, 0],
            [0, 0, 6, 0, 0],
            [0, 0, 0, 0, 0],
        ];
        DirectionGrid::from_fn(GridGeometry::square(4, 5, 1.0), |c| {
            Direction::from_code(codes[c.row][c.col])
        })
    }

    fn outlet(grid: &DirectionGrid) -> Coordinate {
        grid.geometry().cell_center(Cell::new(3, 2))
    }

    #[test]
    fn both_arms_tie_and_are_kept() {
        let grid = y_basin();
        let path = compute_longest_flow_path(&grid, outlet(&grid), &PipelineConfig::default())
            .unwrap();
        // Arms are symmetric: 2 diagonal steps plus one south step each.
        for (r, c) in [(0, 0), (1, 1), (2, 2), (3, 2), (1, 3), (0, 4)] {
            assert!(path.is_set(Cell::new(r, c)), "({r}, {c}) missing");
        }
        assert_eq!(path.count(), 6);
    }

    #[test]
    fn longer_arm_wins() {
        let mut grid = y_basin();
        // Cut the north-east arm short.
        *grid.get_mut(Cell::new(0, 4)).unwrap() = None;
        let result =
            process(&grid, outlet(&grid), &PipelineConfig::default(), &NeverCancel).unwrap();
        assert_eq!(result.outlet, Cell::new(3, 2));
        assert!((result.longest_length - (1.0 + 2.0 * std::f64::consts::SQRT_2)).abs() < 1e-9);
        assert!(!result.path.is_set(Cell::new(1, 3)));
        assert_eq!(result.path.count(), 4);
    }

    #[test]
    fn staged_result_matches_process() {
        let grid = y_basin();
        let config = PipelineConfig::default();
        let staged = process_staged(&grid, outlet(&grid), &config, &NeverCancel).unwrap();
        let direct = process(&grid, outlet(&grid), &config, &NeverCancel).unwrap();
        assert_eq!(staged.into_process_result(), direct);
    }

    #[test]
    fn cancelled_before_start() {
        let grid = y_basin();
        let flag = CancelFlag::new();
        flag.cancel();
        let err = process(&grid, outlet(&grid), &PipelineConfig::default(), &flag).unwrap_err();
        assert_eq!(err.stage, Stage::Configure);
        assert_eq!(err.source, FlowPathError::Cancelled);
    }
}
