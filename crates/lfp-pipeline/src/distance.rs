//! Flow-path distance propagation over a drainage-direction grid.
//!
//! Both modes share one traversal: a breadth-first wavefront that starts
//! at the seeds and walks the direction graph in reverse, visiting every
//! cell that drains into a seed exactly once. Propagation stops at seeds,
//! so each seed owns its own basin.
//!
//! - [`FlowMode::Downstream`] accumulates step lengths outward along the
//!   wavefront: the flow length from a cell down to its seed.
//! - [`FlowMode::Upstream`] replays the wavefront backwards, sources first,
//!   keeping the longest contribution: the flow length from a cell up to
//!   the most distant source draining through it.
//!
//! For any cell the sum of the two is the length of the longest flow path
//! passing through it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::grid::{DirectionGrid, DistanceGrid, Grid, GridGeometry};
use crate::seed::SeedMask;
use crate::types::FlowPathError;

/// Which flow length to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowMode {
    /// Length from each cell down to the seed it drains into.
    Downstream,
    /// Length from each cell up to its farthest contributing source.
    Upstream,
}

/// Compute per-cell flow lengths relative to `seeds`.
///
/// Cells that do not drain into any seed are no-data in both modes. To
/// get both modes from one traversal, use [`FlowTraversal`] directly.
///
/// # Errors
///
/// Returns [`FlowPathError::InvalidSeed`] if `seeds` is empty or outside
/// the grid, and [`FlowPathError::CyclicDirection`] if the direction field
/// contains a loop.
pub fn compute_distance(
    direction: &DirectionGrid,
    seeds: &SeedMask,
    mode: FlowMode,
) -> Result<DistanceGrid, FlowPathError> {
    Ok(FlowTraversal::trace(direction, seeds)?.distances(mode))
}

/// Visit order and links of one reverse traversal from a seed mask.
///
/// Tracing checks the seeds and the whole direction field for loops once;
/// both [`FlowMode`]s are then derived without touching the direction grid
/// again.
#[derive(Debug, Clone)]
pub struct FlowTraversal {
    geometry: GridGeometry,
    /// Cell indices in visit order; every cell appears after the cell it
    /// drains into.
    order: Vec<usize>,
    /// For each visited non-seed cell: the index it drains into and the
    /// step length to get there.
    link: Vec<Option<(usize, f64)>>,
}

impl FlowTraversal {
    /// Walk the direction graph in reverse from `seeds`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowPathError::InvalidSeed`] if `seeds` is empty or outside
    /// the grid, and [`FlowPathError::CyclicDirection`] if the direction
    /// field contains a loop.
    pub fn trace(direction: &DirectionGrid, seeds: &SeedMask) -> Result<Self, FlowPathError> {
        let geometry = *direction.geometry();
        seeds.validate(&geometry)?;
        if let Some(cell) = direction.find_cycle() {
            return Err(FlowPathError::cyclic_at(cell));
        }

        let mut visited = vec![false; geometry.cell_count()];
        let mut link = vec![None; geometry.cell_count()];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        for &seed in seeds.cells() {
            let index = geometry.index(seed);
            visited[index] = true;
            order.push(index);
            queue.push_back(seed);
        }

        while let Some(cell) = queue.pop_front() {
            let target = geometry.index(cell);
            for (upslope, flow) in direction.contributors(cell) {
                if seeds.contains(upslope) {
                    continue;
                }
                let index = geometry.index(upslope);
                // Each cell has one outflow, so a second arrival means the
                // pointers loop.
                if visited[index] {
                    return Err(FlowPathError::cyclic_at(upslope));
                }
                visited[index] = true;
                link[index] = Some((target, geometry.step_length(flow)));
                order.push(index);
                queue.push_back(upslope);
            }
        }

        tracing::debug!(
            seeds = seeds.len(),
            basin_cells = order.len(),
            "flow traversal traced"
        );
        Ok(Self {
            geometry,
            order,
            link,
        })
    }

    /// Number of cells draining into the seeds, seeds included.
    #[must_use]
    pub const fn basin_cells(&self) -> usize {
        self.order.len()
    }

    /// Flow lengths in `mode`.
    #[must_use]
    pub fn distances(&self, mode: FlowMode) -> DistanceGrid {
        let distances = match mode {
            FlowMode::Downstream => self.downstream(),
            FlowMode::Upstream => self.upstream(),
        };
        tracing::debug!(
            ?mode,
            basin_cells = self.order.len(),
            max_distance = distances.max_value(),
            "flow distance computed"
        );
        distances
    }

    fn downstream(&self) -> DistanceGrid {
        let mut cells = vec![None; self.link.len()];
        for &index in &self.order {
            cells[index] = Some(match self.link[index] {
                Some((target, step)) => cells[target].unwrap_or(0.0) + step,
                None => 0.0,
            });
        }
        self.to_grid(&cells)
    }

    fn upstream(&self) -> DistanceGrid {
        let mut cells: Vec<Option<f64>> = vec![None; self.link.len()];
        for &index in &self.order {
            cells[index] = Some(0.0);
        }
        for &index in self.order.iter().rev() {
            if let Some((target, step)) = self.link[index] {
                let through = cells[index].unwrap_or(0.0) + step;
                if let Some(best) = cells[target].as_mut()
                    && through > *best
                {
                    *best = through;
                }
            }
        }
        self.to_grid(&cells)
    }

    fn to_grid(&self, cells: &[Option<f64>]) -> DistanceGrid {
        let geometry = self.geometry;
        Grid::from_fn(geometry, |cell| cells[geometry.index(cell)])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::f64::consts::SQRT_2;

    use super::*;
    use crate::grid::{Cell, Direction};

    const TOL: f64 = 1e-9;

    fn value(grid: &DistanceGrid, row: usize, col: usize) -> Option<f64> {
        *grid.get(Cell::new(row, col)).unwrap()
    }

    /// 1x5 row draining east into the last cell.
    fn east_row() -> DirectionGrid {
        DirectionGrid::from_fn(GridGeometry::square(1, 5, 2.0), |c| {
            (c.col < 4).then_some(Direction::East)
        })
    }

    #[test]
    fn downstream_accumulates_to_seed() {
        let grid = east_row();
        let seeds = SeedMask::new([Cell::new(0, 4)]);
        let down = compute_distance(&grid, &seeds, FlowMode::Downstream).unwrap();
        for col in 0..5 {
            let expected = 2.0 * (4 - col) as f64;
            assert!((value(&down, 0, col).unwrap() - expected).abs() < TOL);
        }
    }

    #[test]
    fn upstream_measures_to_farthest_source() {
        let grid = east_row();
        let seeds = SeedMask::new([Cell::new(0, 4)]);
        let up = compute_distance(&grid, &seeds, FlowMode::Upstream).unwrap();
        for col in 0..5 {
            let expected = 2.0 * col as f64;
            assert!((value(&up, 0, col).unwrap() - expected).abs() < TOL);
        }
    }

    #[test]
    fn cells_below_the_seed_are_unreached() {
        let grid = east_row();
        let seeds = SeedMask::new([Cell::new(0, 2)]);
        let down = compute_distance(&grid, &seeds, FlowMode::Downstream).unwrap();
        assert_eq!(value(&down, 0, 2), Some(0.0));
        assert_eq!(value(&down, 0, 3), None);
        assert_eq!(value(&down, 0, 4), None);
    }

    #[test]
    fn upstream_takes_longest_branch() {
        // Outlet at (2,2). A diagonal arm from (0,0) and a short arm from
        // (2,1) both join at the outlet.
        let g = GridGeometry::square(3, 3, 1.0);
        let mut grid = DirectionGrid::filled(g, None);
        *grid.get_mut(Cell::new(0, 0)).unwrap() = Some(Direction::SouthEast);
        *grid.get_mut(Cell::new(1, 1)).unwrap() = Some(Direction::SouthEast);
        *grid.get_mut(Cell::new(2, 1)).unwrap() = Some(Direction::East);
        let seeds = SeedMask::new([Cell::new(2, 2)]);

        let up = compute_distance(&grid, &seeds, FlowMode::Upstream).unwrap();
        assert!((value(&up, 2, 2).unwrap() - 2.0 * SQRT_2).abs() < TOL);
        assert!((value(&up, 1, 1).unwrap() - SQRT_2).abs() < TOL);
        assert_eq!(value(&up, 2, 1), Some(0.0));
        assert_eq!(value(&up, 0, 1), None);
    }

    #[test]
    fn propagation_stops_at_other_seeds() {
        let grid = east_row();
        let seeds = SeedMask::new([Cell::new(0, 2), Cell::new(0, 4)]);
        let down = compute_distance(&grid, &seeds, FlowMode::Downstream).unwrap();
        assert_eq!(value(&down, 0, 2), Some(0.0));
        assert!((value(&down, 0, 0).unwrap() - 4.0).abs() < TOL);
        assert!((value(&down, 0, 3).unwrap() - 2.0).abs() < TOL);

        let up = compute_distance(&grid, &seeds, FlowMode::Upstream).unwrap();
        assert!((value(&up, 0, 2).unwrap() - 4.0).abs() < TOL);
        assert!((value(&up, 0, 4).unwrap() - 2.0).abs() < TOL);
    }

    #[test]
    fn empty_seeds_are_invalid() {
        let err = compute_distance(&east_row(), &SeedMask::default(), FlowMode::Downstream)
            .unwrap_err();
        assert!(matches!(err, FlowPathError::InvalidSeed { .. }));
    }

    #[test]
    fn seeds_outside_grid_are_invalid() {
        let seeds = SeedMask::new([Cell::new(0, 9)]);
        let err = compute_distance(&east_row(), &seeds, FlowMode::Upstream).unwrap_err();
        assert!(matches!(err, FlowPathError::InvalidSeed { .. }));
    }

    #[test]
    fn mutual_pointers_are_cyclic() {
        let mut grid = east_row();
        *grid.get_mut(Cell::new(0, 1)).unwrap() = Some(Direction::West);
        let seeds = SeedMask::new([Cell::new(0, 4)]);
        let err = compute_distance(&grid, &seeds, FlowMode::Downstream).unwrap_err();
        assert!(matches!(err, FlowPathError::CyclicDirection { .. }));
    }

    #[test]
    fn one_trace_serves_both_modes() {
        let grid = east_row();
        let seeds = SeedMask::new([Cell::new(0, 4)]);
        let traversal = FlowTraversal::trace(&grid, &seeds).unwrap();
        assert_eq!(traversal.basin_cells(), 5);
        assert_eq!(
            traversal.distances(FlowMode::Downstream),
            compute_distance(&grid, &seeds, FlowMode::Downstream).unwrap()
        );
        assert_eq!(
            traversal.distances(FlowMode::Upstream),
            compute_distance(&grid, &seeds, FlowMode::Upstream).unwrap()
        );
    }
}
