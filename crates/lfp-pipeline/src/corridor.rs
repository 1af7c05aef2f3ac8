//! Longest-path corridor extraction.
//!
//! `downstream + upstream` at a cell is the length of the longest flow path
//! through that cell, so every cell on the overall longest path attains the
//! global maximum and no other cell does. Selecting the longest path then
//! reduces to a per-cell threshold against that maximum.

use crate::grid::{CorridorMask, DistanceGrid};
use crate::types::FlowPathError;

/// The combined flow-length grid and the cells within tolerance of its
/// maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct Corridor {
    /// Cells whose combined length is at least `max_combined - epsilon`.
    pub mask: CorridorMask,
    /// Per-cell `downstream + upstream`, no-data where either is missing.
    pub combined: DistanceGrid,
    /// Length of the longest flow path.
    pub max_combined: f64,
}

/// Add two distance grids cell by cell.
///
/// # Errors
///
/// Returns [`FlowPathError::GridMismatch`] if the grids differ in shape.
pub fn combine(
    downstream: &DistanceGrid,
    upstream: &DistanceGrid,
) -> Result<DistanceGrid, FlowPathError> {
    if !downstream.geometry().same_shape(upstream.geometry()) {
        return Err(FlowPathError::GridMismatch {
            expected: downstream.geometry().cell_count(),
            actual: upstream.geometry().cell_count(),
        });
    }
    let cells = downstream
        .cells()
        .iter()
        .zip(upstream.cells())
        .map(|(d, u)| Some((*d)? + (*u)?))
        .collect();
    DistanceGrid::from_vec(*downstream.geometry(), cells)
}

/// Select the cells lying on the longest flow path.
///
/// # Errors
///
/// Returns [`FlowPathError::GridMismatch`] if the grids differ in shape and
/// [`FlowPathError::NoReachablePath`] if no cell has a combined length or
/// the longest path has zero length (nothing drains into the seeds).
pub fn extract_corridor(
    downstream: &DistanceGrid,
    upstream: &DistanceGrid,
    epsilon: f64,
) -> Result<Corridor, FlowPathError> {
    let combined = combine(downstream, upstream)?;
    let max_combined = combined
        .max_value()
        .filter(|&m| m > 0.0)
        .ok_or(FlowPathError::NoReachablePath)?;
    let threshold = max_combined - epsilon;
    let mask = combined.map(|v| v.is_some_and(|d| d >= threshold));

    tracing::debug!(
        max_combined,
        epsilon,
        combined_cells = combined.valid_count(),
        corridor_cells = mask.count(),
        "corridor extracted"
    );

    Ok(Corridor {
        mask,
        combined,
        max_combined,
    })
}
