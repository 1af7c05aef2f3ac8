//! Grid data model: raster geometry, row-major cell storage, and the
//! eight-way drainage directions.
//!
//! Every grid in the pipeline is a [`Grid<T>`] sharing one
//! [`GridGeometry`]. No-data is expressed through the cell type:
//! direction and distance grids store `Option`s, masks store `bool`.

use image::GrayImage;
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};

use crate::types::{Coordinate, FlowPathError};

/// A cell address: zero-based row (north to south) and column (west to east).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Row index, 0 is the northernmost row.
    pub row: usize,
    /// Column index, 0 is the westernmost column.
    pub col: usize,
}

impl Cell {
    /// Create a new cell address.
    #[must_use]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Raster metadata: shape, north-west corner, and cell resolution.
///
/// Resolutions are in map units. `ns_res` is the height of a cell and
/// `ew_res` its width; they differ only on non-square rasters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Northern edge of the extent.
    pub north: f64,
    /// Western edge of the extent.
    pub west: f64,
    /// North-south cell resolution.
    pub ns_res: f64,
    /// East-west cell resolution.
    pub ew_res: f64,
}

impl GridGeometry {
    /// Create a geometry from its raw parts.
    #[must_use]
    pub const fn new(rows: usize, cols: usize, north: f64, west: f64, ns_res: f64, ew_res: f64) -> Self {
        Self {
            rows,
            cols,
            north,
            west,
            ns_res,
            ew_res,
        }
    }

    /// Square-celled geometry whose south-west corner sits at the origin.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn square(rows: usize, cols: usize, cell_size: f64) -> Self {
        Self::new(rows, cols, rows as f64 * cell_size, 0.0, cell_size, cell_size)
    }

    /// Southern edge of the extent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn south(&self) -> f64 {
        (self.rows as f64).mul_add(-self.ns_res, self.north)
    }

    /// Eastern edge of the extent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn east(&self) -> f64 {
        (self.cols as f64).mul_add(self.ew_res, self.west)
    }

    /// Total number of cells.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Total number of cells, or `None` if it does not fit in `usize`.
    #[must_use]
    pub const fn checked_cell_count(&self) -> Option<usize> {
        self.rows.checked_mul(self.cols)
    }

    /// Whether `cell` lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: Cell) -> bool {
        cell.row < self.rows && cell.col < self.cols
    }

    /// Whether two geometries describe the same cell layout.
    #[must_use]
    pub const fn same_shape(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    /// Map coordinate of the center of `cell`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_center(&self, cell: Cell) -> Coordinate {
        Coordinate::new(
            (cell.col as f64 + 0.5).mul_add(self.ew_res, self.west),
            (cell.row as f64 + 0.5).mul_add(-self.ns_res, self.north),
        )
    }

    /// The neighbor of `cell` one step in `direction`, if it is in bounds.
    #[must_use]
    pub fn neighbor(&self, cell: Cell, direction: Direction) -> Option<Cell> {
        let (dr, dc) = direction.offset();
        let row = cell.row.checked_add_signed(dr)?;
        let col = cell.col.checked_add_signed(dc)?;
        let next = Cell::new(row, col);
        self.contains(next).then_some(next)
    }

    /// Euclidean length of a single step in `direction`.
    #[must_use]
    pub fn step_length(&self, direction: Direction) -> f64 {
        match direction {
            Direction::North | Direction::South => self.ns_res,
            Direction::East | Direction::West => self.ew_res,
            Direction::NorthEast
            | Direction::NorthWest
            | Direction::SouthWest
            | Direction::SouthEast => self.ns_res.hypot(self.ew_res),
        }
    }

    pub(crate) const fn index(&self, cell: Cell) -> usize {
        cell.row * self.cols + cell.col
    }

    pub(crate) const fn cell_at(&self, index: usize) -> Cell {
        Cell::new(index / self.cols, index % self.cols)
    }
}

/// One of the eight drainage directions.
///
/// Numeric codes follow the GRASS drainage convention, counting
/// counter-clockwise from north-east: 1=NE, 2=N, 3=NW, 4=W, 5=SW, 6=S,
/// 7=SE, 8=E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Code 1.
    NorthEast,
    /// Code 2.
    North,
    /// Code 3.
    NorthWest,
    /// Code 4.
    West,
    /// Code 5.
    SouthWest,
    /// Code 6.
    South,
    /// Code 7.
    SouthEast,
    /// Code 8.
    East,
}

impl Direction {
    /// All directions in code order.
    pub const ALL: [Self; 8] = [
        Self::NorthEast,
        Self::North,
        Self::NorthWest,
        Self::West,
        Self::SouthWest,
        Self::South,
        Self::SouthEast,
        Self::East,
    ];

    /// The GRASS drainage code (1..=8).
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::NorthEast => 1,
            Self::North => 2,
            Self::NorthWest => 3,
            Self::West => 4,
            Self::SouthWest => 5,
            Self::South => 6,
            Self::SouthEast => 7,
            Self::East => 8,
        }
    }

    /// Decode a GRASS drainage code.
    ///
    /// Negative codes mark flow leaving the region and decode to the same
    /// direction as their absolute value. Zero (no outflow) and anything
    /// outside `-8..=8` decode to `None`.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code.unsigned_abs() {
            1 => Some(Self::NorthEast),
            2 => Some(Self::North),
            3 => Some(Self::NorthWest),
            4 => Some(Self::West),
            5 => Some(Self::SouthWest),
            6 => Some(Self::South),
            7 => Some(Self::SouthEast),
            8 => Some(Self::East),
            _ => None,
        }
    }

    /// `(row, col)` offset of the cell this direction points at.
    #[must_use]
    pub const fn offset(self) -> (isize, isize) {
        match self {
            Self::NorthEast => (-1, 1),
            Self::North => (-1, 0),
            Self::NorthWest => (-1, -1),
            Self::West => (0, -1),
            Self::SouthWest => (1, -1),
            Self::South => (1, 0),
            Self::SouthEast => (1, 1),
            Self::East => (0, 1),
        }
    }

    /// The direction pointing back the other way.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::NorthEast => Self::SouthWest,
            Self::North => Self::South,
            Self::NorthWest => Self::SouthEast,
            Self::West => Self::East,
            Self::SouthWest => Self::NorthEast,
            Self::South => Self::North,
            Self::SouthEast => Self::NorthWest,
            Self::East => Self::West,
        }
    }
}

/// Row-major raster of `T` with shared geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    geometry: GridGeometry,
    cells: Vec<T>,
}

/// Drainage directions; `None` is no-data or no outflow.
pub type DirectionGrid = Grid<Option<Direction>>;

/// Flow-path lengths in map units; `None` is unreachable.
pub type DistanceGrid = Grid<Option<f64>>;

/// Boolean raster used for corridor and path masks.
pub type Mask = Grid<bool>;

/// Cells whose combined flow length is within tolerance of the maximum.
pub type CorridorMask = Mask;

/// The thinned one-cell-wide longest flow path.
pub type PathGrid = Mask;

impl<T> Grid<T> {
    /// Wrap row-major cell data.
    ///
    /// # Errors
    ///
    /// Returns [`FlowPathError::GridMismatch`] if `cells.len()` differs
    /// from `geometry.cell_count()`.
    pub fn from_vec(geometry: GridGeometry, cells: Vec<T>) -> Result<Self, FlowPathError> {
        let expected = geometry.cell_count();
        if cells.len() != expected {
            return Err(FlowPathError::GridMismatch {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self { geometry, cells })
    }

    /// Build a grid by evaluating `f` for every cell in row-major order.
    pub fn from_fn(geometry: GridGeometry, mut f: impl FnMut(Cell) -> T) -> Self {
        let cells = (0..geometry.cell_count())
            .map(|i| f(geometry.cell_at(i)))
            .collect();
        Self { geometry, cells }
    }

    /// Raster metadata.
    #[must_use]
    pub const fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.geometry.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.geometry.cols
    }

    /// The value at `cell`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, cell: Cell) -> Option<&T> {
        if self.geometry.contains(cell) {
            self.cells.get(self.geometry.index(cell))
        } else {
            None
        }
    }

    /// Mutable access to the value at `cell`.
    pub fn get_mut(&mut self, cell: Cell) -> Option<&mut T> {
        if self.geometry.contains(cell) {
            let index = self.geometry.index(cell);
            self.cells.get_mut(index)
        } else {
            None
        }
    }

    /// All cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Iterate `(cell, value)` pairs in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Cell, &T)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, v)| (self.geometry.cell_at(i), v))
    }

    /// Apply `f` to every cell, keeping the geometry.
    #[must_use]
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid<U> {
        Grid {
            geometry: self.geometry,
            cells: self.cells.iter().map(f).collect(),
        }
    }
}

impl<T: Clone> Grid<T> {
    /// A grid with every cell set to `value`.
    #[must_use]
    pub fn filled(geometry: GridGeometry, value: T) -> Self {
        Self {
            geometry,
            cells: vec![value; geometry.cell_count()],
        }
    }
}

impl DirectionGrid {
    /// The cell `cell` drains into, or `None` for no-data cells, sinks,
    /// and cells draining off the grid edge.
    #[must_use]
    pub fn downstream_of(&self, cell: Cell) -> Option<Cell> {
        let direction = (*self.get(cell)?)?;
        self.geometry.neighbor(cell, direction)
    }

    /// Neighbors draining directly into `cell`, paired with their own
    /// flow direction.
    pub fn contributors(&self, cell: Cell) -> impl Iterator<Item = (Cell, Direction)> + '_ {
        Direction::ALL.into_iter().filter_map(move |towards| {
            let neighbor = self.geometry.neighbor(cell, towards)?;
            let inflow = towards.opposite();
            (self.get(neighbor).copied().flatten() == Some(inflow)).then_some((neighbor, inflow))
        })
    }

    /// Find a cell lying on a closed loop of direction pointers.
    ///
    /// Each cell is walked at most once; the walk stops at grid exits,
    /// sinks, and cells already known to terminate.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Cell> {
        const UNSEEN: u8 = 0;
        const ON_WALK: u8 = 1;
        const DONE: u8 = 2;

        let mut state = vec![UNSEEN; self.cells.len()];
        let mut walk = Vec::new();
        for start in 0..self.cells.len() {
            if state[start] != UNSEEN {
                continue;
            }
            let mut current = Some(self.geometry.cell_at(start));
            let mut looped = None;
            while let Some(cell) = current {
                let index = self.geometry.index(cell);
                match state[index] {
                    UNSEEN => {
                        state[index] = ON_WALK;
                        walk.push(index);
                        current = self.downstream_of(cell);
                    }
                    ON_WALK => {
                        looped = Some(cell);
                        break;
                    }
                    _ => break,
                }
            }
            for index in walk.drain(..) {
                state[index] = DONE;
            }
            if looped.is_some() {
                return looped;
            }
        }
        None
    }
}

impl DistanceGrid {
    /// Number of cells holding a distance.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|v| v.is_some()).count()
    }

    /// Largest distance in the grid.
    #[must_use]
    pub fn max_value(&self) -> Option<f64> {
        self.cells.iter().flatten().copied().reduce(f64::max)
    }
}

impl Mask {
    /// Number of set cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&v| v).count()
    }

    /// Whether `cell` is in bounds and set.
    #[must_use]
    pub fn is_set(&self, cell: Cell) -> bool {
        self.get(cell).copied().unwrap_or(false)
    }

    /// Set cells in row-major order.
    pub fn set_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.iter().filter_map(|(cell, &v)| v.then_some(cell))
    }

    /// Number of set 8-neighbors of `cell`.
    #[must_use]
    pub fn neighbor_count(&self, cell: Cell) -> usize {
        Direction::ALL
            .into_iter()
            .filter_map(|d| self.geometry.neighbor(cell, d))
            .filter(|&n| self.is_set(n))
            .count()
    }

    /// Set cells with more than two set neighbors (junctions of branches).
    #[must_use]
    pub fn branch_cells(&self) -> usize {
        self.set_cells()
            .filter(|&cell| self.neighbor_count(cell) > 2)
            .count()
    }

    /// Whether all set cells form one 8-connected region.
    ///
    /// An empty mask counts as connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.count() == 0 || self.component_count() == Some(1)
    }

    /// Render as a binary image: 255 for set cells, 0 otherwise.
    ///
    /// Returns `None` if either dimension exceeds `u32::MAX`.
    #[must_use]
    pub fn to_gray_image(&self) -> Option<GrayImage> {
        let width = u32::try_from(self.cols()).ok()?;
        let height = u32::try_from(self.rows()).ok()?;
        Some(GrayImage::from_fn(width, height, |x, y| {
            let set = self.is_set(Cell::new(y as usize, x as usize));
            image::Luma([if set { 255 } else { 0 }])
        }))
    }

    /// Number of 8-connected regions of set cells.
    ///
    /// Labels the mask with `imageproc`'s connected-component pass.
    /// Returns `None` if the mask cannot be rendered as an image.
    #[must_use]
    pub fn component_count(&self) -> Option<usize> {
        let image = self.to_gray_image()?;
        let labels = connected_components(&image, Connectivity::Eight, image::Luma([0u8]));
        let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0);
        usize::try_from(max_label).ok()
    }
}
