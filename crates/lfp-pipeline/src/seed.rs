//! Outlet snapping and seed masks.
//!
//! The outlet arrives as a map coordinate and is snapped to the grid cell
//! that contains it. No interpolation is done.

use serde::{Deserialize, Serialize};

use crate::grid::{Cell, GridGeometry};
use crate::types::{Coordinate, FlowPathError};

/// Sorted, deduplicated set of seed cells.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeedMask {
    cells: Vec<Cell>,
}

impl SeedMask {
    /// Build a seed mask from arbitrary cells.
    ///
    /// Cells are not bounds-checked here; see [`validate`](Self::validate).
    #[must_use]
    pub fn new(cells: impl IntoIterator<Item = Cell>) -> Self {
        let mut cells: Vec<Cell> = cells.into_iter().collect();
        cells.sort_unstable();
        cells.dedup();
        Self { cells }
    }

    /// Seed cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Number of seeds.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the mask holds no seeds.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether `cell` is a seed.
    #[must_use]
    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.binary_search(&cell).is_ok()
    }

    /// Check that the mask is usable on a grid of `geometry`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowPathError::InvalidSeed`] if the mask is empty or any
    /// seed lies outside the grid.
    pub fn validate(&self, geometry: &GridGeometry) -> Result<(), FlowPathError> {
        if self.cells.is_empty() {
            return Err(FlowPathError::InvalidSeed {
                reason: "seed mask is empty".to_string(),
            });
        }
        if let Some(cell) = self.cells.iter().find(|&&c| !geometry.contains(c)) {
            return Err(FlowPathError::InvalidSeed {
                reason: format!(
                    "cell ({}, {}) is outside the {}x{} grid",
                    cell.row, cell.col, geometry.rows, geometry.cols
                ),
            });
        }
        Ok(())
    }
}

/// Snap a map coordinate to the grid cell containing it.
///
/// Coordinates exactly on the eastern or southern edge belong to the last
/// column or row.
///
/// # Errors
///
/// Returns [`FlowPathError::OutOfBounds`] if the coordinate is not finite
/// or lies outside the extent, or the grid has no cells.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn snap_to_cell(geometry: &GridGeometry, outlet: Coordinate) -> Result<Cell, FlowPathError> {
    let out_of_bounds = || FlowPathError::OutOfBounds {
        easting: outlet.easting,
        northing: outlet.northing,
    };
    let Coordinate { easting, northing } = outlet;
    if geometry.cell_count() == 0 || !easting.is_finite() || !northing.is_finite() {
        return Err(out_of_bounds());
    }
    if easting < geometry.west
        || easting > geometry.east()
        || northing > geometry.north
        || northing < geometry.south()
    {
        return Err(out_of_bounds());
    }

    // Both quotients are non-negative and bounded by the extent checks.
    let col = ((easting - geometry.west) / geometry.ew_res).floor() as usize;
    let row = ((geometry.north - northing) / geometry.ns_res).floor() as usize;
    Ok(Cell::new(
        row.min(geometry.rows - 1),
        col.min(geometry.cols - 1),
    ))
}
