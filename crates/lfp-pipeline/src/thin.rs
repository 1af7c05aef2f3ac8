//! Connectivity-preserving thinning of a corridor mask to a one-cell-wide
//! path.
//!
//! Each iteration makes four directional sub-passes, peeling cells whose
//! north, south, east, or west neighbor is unset. A sub-pass picks its
//! candidates from the mask as it stood when the sub-pass began, then
//! re-tests each candidate against the live mask before removing it, so
//! one sub-pass strips at most one layer.
//!
//! A cell is removable when it is 8-simple (its Yokoi 8-connectivity
//! number is 1) and is not an end of the path. Removing simple cells never
//! splits a region or opens a hole. Ends are cells with a single neighbor,
//! or with two neighbors that touch each other, plus any caller-supplied
//! anchors.

use crate::grid::{Cell, CorridorMask, Direction, GridGeometry, PathGrid};
use crate::types::FlowPathError;

/// Output of [`thin`].
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    /// The thinned mask.
    pub path: PathGrid,
    /// Iterations run, including the final one that removed nothing.
    pub iterations: usize,
    /// `false` if the iteration cap was hit while cells were still being
    /// removed.
    pub converged: bool,
}

/// Ring order used by the connectivity number: E, NE, N, NW, W, SW, S, SE.
const RING: [Direction; 8] = [
    Direction::East,
    Direction::NorthEast,
    Direction::North,
    Direction::NorthWest,
    Direction::West,
    Direction::SouthWest,
    Direction::South,
    Direction::SouthEast,
];

/// Sub-pass order, as positions in [`RING`]: north, south, east, west.
const BORDERS: [usize; 4] = [2, 6, 0, 4];

/// Thin `mask` until no removable cell remains or `max_iterations` is hit.
///
/// # Errors
///
/// Returns [`FlowPathError::EmptyCorridor`] if `mask` has no set cells.
pub fn thin(mask: &CorridorMask, max_iterations: usize) -> Result<Skeleton, FlowPathError> {
    thin_anchored(mask, &[], max_iterations)
}

/// Like [`thin`], but never removes any of `anchors`.
///
/// The pipeline anchors the outlet and the source cells so the path keeps
/// its true ends even where the corridor is wider than one cell.
///
/// # Errors
///
/// Returns [`FlowPathError::EmptyCorridor`] if `mask` has no set cells.
pub fn thin_anchored(
    mask: &CorridorMask,
    anchors: &[Cell],
    max_iterations: usize,
) -> Result<Skeleton, FlowPathError> {
    let before = mask.count();
    if before == 0 {
        return Err(FlowPathError::EmptyCorridor);
    }

    let geometry = *mask.geometry();
    let mut anchored = vec![false; geometry.cell_count()];
    for &cell in anchors.iter().filter(|&&c| geometry.contains(c)) {
        anchored[geometry.index(cell)] = true;
    }

    let mut path = mask.clone();
    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        iterations += 1;
        let removed: usize = BORDERS
            .iter()
            .map(|&border| strip_border(&mut path, &anchored, border))
            .sum();
        if removed == 0 {
            converged = true;
            break;
        }
    }

    if converged {
        tracing::debug!(iterations, before, after = path.count(), "corridor thinned");
    } else {
        tracing::warn!(
            iterations,
            before,
            after = path.count(),
            "thinning stopped at iteration cap before converging"
        );
    }

    Ok(Skeleton {
        path,
        iterations,
        converged,
    })
}

/// One sub-pass: remove removable cells whose `border` neighbor is unset.
fn strip_border(path: &mut PathGrid, anchored: &[bool], border: usize) -> usize {
    let geometry = *path.geometry();
    let candidates: Vec<Cell> = path
        .set_cells()
        .filter(|&cell| !anchored[geometry.index(cell)])
        .filter(|&cell| !neighborhood(path, &geometry, cell)[border])
        .collect();

    let mut removed = 0;
    for cell in candidates {
        if is_removable(&neighborhood(path, &geometry, cell))
            && let Some(v) = path.get_mut(cell)
        {
            *v = false;
            removed += 1;
        }
    }
    removed
}

fn neighborhood(path: &PathGrid, geometry: &GridGeometry, cell: Cell) -> [bool; 8] {
    RING.map(|d| geometry.neighbor(cell, d).is_some_and(|n| path.is_set(n)))
}

/// Whether a set cell with neighborhood `ring` may be removed.
fn is_removable(ring: &[bool; 8]) -> bool {
    !is_end(ring) && connectivity_number(ring) == 1
}

/// A path end: at most one neighbor, or two neighbors adjacent to each
/// other around the ring.
fn is_end(ring: &[bool; 8]) -> bool {
    match ring.iter().filter(|&&v| v).count() {
        0 | 1 => true,
        2 => (0..8).any(|k| ring[k] && ring[(k + 1) % 8]),
        _ => false,
    }
}

/// Yokoi 8-connectivity number of a cell's neighborhood.
///
/// Counts the 8-connected runs of set neighbors separated by unset
/// 4-neighbors; equals 1 exactly when removing the cell leaves the
/// topology of the set region unchanged.
fn connectivity_number(ring: &[bool; 8]) -> usize {
    let unset = |k: usize| usize::from(!ring[k % 8]);
    [0, 2, 4, 6]
        .into_iter()
        .map(|k| unset(k) - unset(k) * unset(k + 1) * unset(k + 2))
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::grid::{GridGeometry, Mask};

    fn mask_from(rows: &[&str]) -> Mask {
        let geometry = GridGeometry::square(rows.len(), rows[0].len(), 1.0);
        Mask::from_fn(geometry, |c| rows[c.row].as_bytes()[c.col] == b'#')
    }

    fn render(mask: &Mask) -> String {
        (0..mask.rows())
            .map(|r| {
                (0..mask.cols())
                    .map(|c| if mask.is_set(Cell::new(r, c)) { '#' } else { '.' })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn assert_one_wide(mask: &Mask) {
        for cell in mask.set_cells() {
            assert!(
                mask.neighbor_count(cell) <= 2,
                "cell {cell:?} has {} neighbors in\n{}",
                mask.neighbor_count(cell),
                render(mask)
            );
        }
    }

    fn has_full_block(mask: &Mask) -> bool {
        (1..mask.rows()).any(|r| {
            (1..mask.cols()).any(|c| {
                [(r - 1, c - 1), (r - 1, c), (r, c - 1), (r, c)]
                    .into_iter()
                    .all(|(row, col)| mask.is_set(Cell::new(row, col)))
            })
        })
    }

    #[test]
    fn empty_mask_is_an_error() {
        let mask = mask_from(&["...", "..."]);
        assert_eq!(thin(&mask, 10), Err(FlowPathError::EmptyCorridor));
    }

    #[test]
    fn connectivity_number_cases() {
        assert_eq!(connectivity_number(&[false; 8]), 0);
        assert_eq!(connectivity_number(&[true; 8]), 0);
        // West and east set: two runs.
        let mut line = [false; 8];
        line[0] = true;
        line[4] = true;
        assert_eq!(connectivity_number(&line), 2);
        // West and south set: one run through the corner.
        let mut corner = [false; 8];
        corner[4] = true;
        corner[6] = true;
        assert_eq!(connectivity_number(&corner), 1);
    }

    #[test]
    fn end_detection() {
        let mut ring = [false; 8];
        assert!(is_end(&ring));
        ring[0] = true;
        assert!(is_end(&ring));
        ring[7] = true;
        assert!(is_end(&ring), "touching pair wraps around the ring");
        ring[7] = false;
        ring[4] = true;
        assert!(!is_end(&ring));
    }

    #[test]
    fn diagonal_line_is_untouched() {
        let mask = mask_from(&["#....", ".#...", "..#..", "...#.", "....#"]);
        let skeleton = thin(&mask, 10).unwrap();
        assert_eq!(skeleton.path, mask);
        assert!(skeleton.converged);
        assert_eq!(skeleton.iterations, 1);
    }

    #[test]
    fn staircase_collapses_to_diagonal_steps() {
        let mask = mask_from(&["##...", ".##..", "..##.", "...##"]);
        let skeleton = thin(&mask, 10).unwrap();
        assert_eq!(
            render(&skeleton.path),
            "#....\n.#...\n..#..\n...##"
        );
        assert_one_wide(&skeleton.path);
    }

    #[test]
    fn thick_band_thins_to_connected_line() {
        let mask = mask_from(&[
            "..........",
            ".########.",
            ".########.",
            ".########.",
            "..........",
        ]);
        let skeleton = thin(&mask, 50).unwrap();
        assert!(skeleton.converged);
        assert!(skeleton.path.is_connected());
        assert!(!has_full_block(&skeleton.path), "\n{}", render(&skeleton.path));
        assert!(skeleton.path.count() >= 8);
    }

    #[test]
    fn two_by_two_block_keeps_a_link() {
        let mask = mask_from(&["##", "##"]);
        let skeleton = thin(&mask, 10).unwrap();
        assert!(skeleton.path.is_connected());
        assert_eq!(skeleton.path.count(), 2);
    }

    #[test]
    fn single_cell_survives() {
        let mask = mask_from(&["...", ".#.", "..."]);
        let skeleton = thin(&mask, 10).unwrap();
        assert_eq!(skeleton.path, mask);
    }

    #[test]
    fn anchors_are_never_removed() {
        // Unanchored, the north-west cell of a 2x2 block is peeled first.
        let mask = mask_from(&["##", "##"]);
        assert!(!thin(&mask, 10).unwrap().path.is_set(Cell::new(0, 0)));

        let anchors = [Cell::new(0, 0), Cell::new(1, 1)];
        let skeleton = thin_anchored(&mask, &anchors, 10).unwrap();
        assert_eq!(render(&skeleton.path), "#.\n.#");
    }

    #[test]
    fn thinning_is_idempotent() {
        let mask = mask_from(&[
            "###.....",
            "####....",
            ".#####..",
            "...#####",
            "....####",
        ]);
        let once = thin(&mask, 200).unwrap().path;
        let twice = thin(&once, 200).unwrap().path;
        assert_eq!(once, twice);
        assert!(once.is_connected());
    }

    #[test]
    fn iteration_cap_is_reported() {
        let mask = mask_from(&["#####", "#####", "#####", "#####", "#####"]);
        let skeleton = thin(&mask, 1).unwrap();
        assert_eq!(skeleton.iterations, 1);
        assert!(!skeleton.converged);
    }
}
