//! ASCII grid reading and writing.
//!
//! Two header styles are accepted on input:
//!
//! - ESRI (`r.out.gdal format=AAIGrid`, `r.out.arc`): `ncols`, `nrows`,
//!   `xllcorner` or `xllcenter`, `yllcorner` or `yllcenter`, `cellsize` or
//!   `dx`/`dy`, optional `NODATA_value`.
//! - GRASS (`r.out.ascii`): `north:`, `south:`, `east:`, `west:`, `rows:`,
//!   `cols:`, optional `null:`. A bare `*` in the body is a null cell.
//!
//! Keys are case-insensitive. The body lists rows north to south, values
//! separated by any whitespace. Output is always written with an ESRI
//! header.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use lfp_pipeline::{DirectionGrid, DistanceGrid, Grid, GridGeometry, PathGrid};

use crate::encoding::DirectionEncoding;
use crate::error::RasterError;

/// Value written for no-data cells.
pub const NODATA: i32 = -9999;

/// A parsed grid: geometry plus row-major values, `None` for no-data.
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiGrid {
    /// Shape and placement.
    pub geometry: GridGeometry,
    /// The declared no-data value, if any.
    pub nodata: Option<f64>,
    /// Cell values in row-major order.
    pub values: Vec<Option<f64>>,
}

/// Header keys with their values and the line each appeared on.
type Keys = HashMap<String, (f64, usize)>;

/// Parse an ASCII grid.
///
/// # Errors
///
/// Returns [`RasterError::Parse`] for unknown or missing header keys,
/// non-numeric values, or a body whose size does not match the header.
pub fn parse_ascii_grid(text: &str) -> Result<AsciiGrid, RasterError> {
    let mut keys = Keys::new();
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l)).peekable();

    while let Some(&(number, line)) = lines.peek() {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            lines.next();
            continue;
        };
        if !first.starts_with(|c: char| c.is_ascii_alphabetic()) {
            break;
        }
        let key = first.trim_end_matches(':').to_ascii_lowercase();
        let value = tokens
            .next()
            .ok_or_else(|| RasterError::parse(number, format!("header key `{first}` has no value")))?;
        let value = value
            .parse::<f64>()
            .map_err(|_| RasterError::parse(number, format!("`{key}` value `{value}` is not a number")))?;
        keys.insert(key, (value, number));
        lines.next();
    }

    let (geometry, nodata) = if keys.contains_key("ncols") {
        esri_geometry(&keys)?
    } else if keys.contains_key("rows") {
        grass_geometry(&keys)?
    } else {
        return Err(RasterError::parse(1, "missing grid header"));
    };

    let mut last_line = keys.values().map(|&(_, n)| n).max().unwrap_or(1);
    let expected = geometry.checked_cell_count().ok_or_else(|| {
        RasterError::parse(
            last_line,
            format!(
                "header declares {}x{} cells, too many to address",
                geometry.rows, geometry.cols
            ),
        )
    })?;
    // Every value takes at least one byte plus a separator, so the text
    // bounds the reservation whatever the header claims.
    let mut values = Vec::with_capacity(expected.min(text.len() / 2 + 1));
    for (number, line) in lines {
        last_line = number;
        for token in line.split_whitespace() {
            if values.len() == expected {
                return Err(RasterError::parse(
                    number,
                    format!("header declares {expected} cells but body has more"),
                ));
            }
            let value = if token == "*" {
                None
            } else {
                let v = token
                    .parse::<f64>()
                    .map_err(|_| RasterError::parse(number, format!("`{token}` is not a number")))?;
                (!is_nodata(v, nodata)).then_some(v)
            };
            values.push(value);
        }
    }

    if values.len() != expected {
        return Err(RasterError::parse(
            last_line,
            format!(
                "header declares {expected} cells but body has {}",
                values.len()
            ),
        ));
    }

    tracing::debug!(
        rows = geometry.rows,
        cols = geometry.cols,
        ?nodata,
        "ascii grid parsed"
    );
    Ok(AsciiGrid {
        geometry,
        nodata,
        values,
    })
}

fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    value.is_nan() || nodata.is_some_and(|nd| (value - nd).abs() <= f64::EPSILON * nd.abs().max(1.0))
}

fn required(keys: &Keys, name: &str) -> Result<(f64, usize), RasterError> {
    keys.get(name)
        .copied()
        .ok_or_else(|| RasterError::parse(1, format!("missing header key `{name}`")))
}

fn either(keys: &Keys, a: &str, b: &str) -> Result<(f64, usize, bool), RasterError> {
    match (keys.get(a), keys.get(b)) {
        (Some(&(v, n)), None) => Ok((v, n, true)),
        (None, Some(&(v, n))) => Ok((v, n, false)),
        (Some(_), Some(&(_, n))) => Err(RasterError::parse(n, format!("both `{a}` and `{b}` given"))),
        (None, None) => Err(RasterError::parse(1, format!("missing header key `{a}` or `{b}`"))),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::float_cmp)]
fn count(keys: &Keys, name: &str) -> Result<usize, RasterError> {
    let (value, line) = required(keys, name)?;
    if !(1.0..=f64::from(u32::MAX)).contains(&value) || value.trunc() != value {
        return Err(RasterError::parse(
            line,
            format!("`{name}` must be a positive integer, got {value}"),
        ));
    }
    Ok(value as usize)
}

fn resolution(value: f64, line: usize, name: &str) -> Result<f64, RasterError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(RasterError::parse(
            line,
            format!("`{name}` must be positive, got {value}"),
        ))
    }
}

#[allow(clippy::cast_precision_loss)]
fn esri_geometry(keys: &Keys) -> Result<(GridGeometry, Option<f64>), RasterError> {
    let cols = count(keys, "ncols")?;
    let rows = count(keys, "nrows")?;
    let (ew_res, ns_res) = if let Some(&(size, line)) = keys.get("cellsize") {
        let size = resolution(size, line, "cellsize")?;
        (size, size)
    } else {
        let (dx, dx_line) = required(keys, "dx")?;
        let (dy, dy_line) = required(keys, "dy")?;
        (
            resolution(dx, dx_line, "dx")?,
            resolution(dy, dy_line, "dy")?,
        )
    };

    let (x, _, x_corner) = either(keys, "xllcorner", "xllcenter")?;
    let (y, _, y_corner) = either(keys, "yllcorner", "yllcenter")?;
    let west = if x_corner { x } else { x - ew_res / 2.0 };
    let south = if y_corner { y } else { y - ns_res / 2.0 };
    let north = south + rows as f64 * ns_res;

    let nodata = keys.get("nodata_value").map(|&(v, _)| v);
    Ok((
        GridGeometry::new(rows, cols, north, west, ns_res, ew_res),
        nodata,
    ))
}

#[allow(clippy::cast_precision_loss)]
fn grass_geometry(keys: &Keys) -> Result<(GridGeometry, Option<f64>), RasterError> {
    let rows = count(keys, "rows")?;
    let cols = count(keys, "cols")?;
    let (north, north_line) = required(keys, "north")?;
    let (south, _) = required(keys, "south")?;
    let (east, east_line) = required(keys, "east")?;
    let (west, _) = required(keys, "west")?;
    let ns_res = resolution((north - south) / rows as f64, north_line, "north - south")?;
    let ew_res = resolution((east - west) / cols as f64, east_line, "east - west")?;

    let nodata = keys.get("null").map(|&(v, _)| v);
    Ok((
        GridGeometry::new(rows, cols, north, west, ns_res, ew_res),
        nodata,
    ))
}

/// Parse a drainage-direction grid. No-data cells have no direction.
///
/// # Errors
///
/// Any [`parse_ascii_grid`] error, plus [`RasterError::InvalidDirection`]
/// for values that are not codes in `encoding`.
pub fn parse_direction_grid(
    text: &str,
    encoding: DirectionEncoding,
) -> Result<DirectionGrid, RasterError> {
    let ascii = parse_ascii_grid(text)?;
    let geometry = ascii.geometry;
    let cells = ascii
        .values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let Some(value) = *value else {
                return Ok(None);
            };
            let invalid = || RasterError::InvalidDirection {
                row: i / geometry.cols,
                col: i % geometry.cols,
                code: value,
            };
            let code = integral(value).ok_or_else(invalid)?;
            encoding.decode(code).map_err(|_| invalid())
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Grid::from_vec(geometry, cells)?)
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn integral(value: f64) -> Option<i32> {
    let in_range = (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&value);
    (in_range && value.trunc() == value).then_some(value as i32)
}

/// Parse a distance grid, as written by [`format_distance_grid`].
///
/// # Errors
///
/// Any [`parse_ascii_grid`] error.
pub fn parse_distance_grid(text: &str) -> Result<DistanceGrid, RasterError> {
    let ascii = parse_ascii_grid(text)?;
    Ok(Grid::from_vec(ascii.geometry, ascii.values)?)
}

/// Read a drainage-direction grid from a file.
///
/// # Errors
///
/// [`RasterError::Io`] if the file cannot be read, otherwise as
/// [`parse_direction_grid`].
pub fn read_direction_grid(
    path: &Path,
    encoding: DirectionEncoding,
) -> Result<DirectionGrid, RasterError> {
    let text = std::fs::read_to_string(path)?;
    let grid = parse_direction_grid(&text, encoding)?;
    tracing::info!(
        path = %path.display(),
        rows = grid.rows(),
        cols = grid.cols(),
        ?encoding,
        "direction grid loaded"
    );
    Ok(grid)
}

fn write_header(out: &mut String, geometry: &GridGeometry) {
    let _ = writeln!(out, "ncols {}", geometry.cols);
    let _ = writeln!(out, "nrows {}", geometry.rows);
    let _ = writeln!(out, "xllcorner {}", geometry.west);
    let _ = writeln!(out, "yllcorner {}", geometry.south());
    if (geometry.ns_res - geometry.ew_res).abs() <= f64::EPSILON * geometry.ew_res {
        let _ = writeln!(out, "cellsize {}", geometry.ew_res);
    } else {
        let _ = writeln!(out, "dx {}", geometry.ew_res);
        let _ = writeln!(out, "dy {}", geometry.ns_res);
    }
    let _ = writeln!(out, "NODATA_value {NODATA}");
}

fn write_body<T>(out: &mut String, grid: &Grid<T>, mut cell: impl FnMut(&mut String, &T)) {
    for row in grid.cells().chunks(grid.cols().max(1)) {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            cell(out, value);
        }
        out.push('\n');
    }
}

/// Serialize a path grid: 1 on the path, [`NODATA`] elsewhere.
#[must_use]
pub fn format_path_grid(path: &PathGrid) -> String {
    let mut out = String::new();
    write_header(&mut out, path.geometry());
    write_body(&mut out, path, |out, &set| {
        let _ = write!(out, "{}", if set { 1 } else { NODATA });
    });
    out
}

/// Serialize a distance grid, [`NODATA`] for unreached cells.
#[must_use]
pub fn format_distance_grid(distance: &DistanceGrid) -> String {
    let mut out = String::new();
    write_header(&mut out, distance.geometry());
    write_body(&mut out, distance, |out, value| match value {
        Some(v) => {
            let _ = write!(out, "{v}");
        }
        None => {
            let _ = write!(out, "{NODATA}");
        }
    });
    out
}

/// Serialize a direction grid in `encoding`, 0 for cells without outflow.
#[must_use]
pub fn format_direction_grid(direction: &DirectionGrid, encoding: DirectionEncoding) -> String {
    let mut out = String::new();
    write_header(&mut out, direction.geometry());
    write_body(&mut out, direction, |out, &d| {
        let _ = write!(out, "{}", encoding.encode(d));
    });
    out
}

/// Write a path grid to a file.
///
/// # Errors
///
/// Returns [`RasterError::Io`] if the file cannot be written.
pub fn write_path_grid(path: &Path, grid: &PathGrid) -> Result<(), RasterError> {
    std::fs::write(path, format_path_grid(grid))?;
    tracing::debug!(path = %path.display(), cells = grid.count(), "path grid written");
    Ok(())
}

/// Write a distance grid to a file.
///
/// # Errors
///
/// Returns [`RasterError::Io`] if the file cannot be written.
pub fn write_distance_grid(path: &Path, grid: &DistanceGrid) -> Result<(), RasterError> {
    std::fs::write(path, format_distance_grid(grid))?;
    tracing::debug!(path = %path.display(), cells = grid.valid_count(), "distance grid written");
    Ok(())
}

/// Write a direction grid to a file in `encoding`.
///
/// # Errors
///
/// Returns [`RasterError::Io`] if the file cannot be written.
pub fn write_direction_grid(
    path: &Path,
    grid: &DirectionGrid,
    encoding: DirectionEncoding,
) -> Result<(), RasterError> {
    std::fs::write(path, format_direction_grid(grid, encoding))?;
    tracing::debug!(path = %path.display(), ?encoding, "direction grid written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lfp_pipeline::{Cell, Direction};

    use super::*;

    const ESRI: &str = "\
ncols 3
nrows 2
xllcorner 100
yllcorner 200
cellsize 10
NODATA_value -9999
8 8 6
-9999 1 0
";

    #[test]
    fn esri_header_sets_geometry() {
        let grid = parse_ascii_grid(ESRI).unwrap();
        let g = grid.geometry;
        assert_eq!((g.rows, g.cols), (2, 3));
        assert!((g.west - 100.0).abs() < 1e-12);
        assert!((g.north - 220.0).abs() < 1e-12);
        assert_eq!(grid.values[3], None);
        assert_eq!(grid.values[0], Some(8.0));
    }

    #[test]
    fn centre_registration_shifts_half_a_cell() {
        let text = "NCOLS 1\nNROWS 1\nXLLCENTER 5\nYLLCENTER 5\nCELLSIZE 10\n1\n";
        let g = parse_ascii_grid(text).unwrap().geometry;
        assert!(g.west.abs() < 1e-12);
        assert!((g.north - 10.0).abs() < 1e-12);
    }

    #[test]
    fn grass_header_and_star_nulls() {
        let text = "\
north: 20
south: 0
east: 30
west: 0
rows: 2
cols: 3
6 6 *
8 8 0
";
        let grid = parse_direction_grid(text, DirectionEncoding::Grass).unwrap();
        assert!((grid.geometry().ns_res - 10.0).abs() < 1e-12);
        assert_eq!(*grid.get(Cell::new(0, 2)).unwrap(), None);
        assert_eq!(*grid.get(Cell::new(1, 0)).unwrap(), Some(Direction::East));
    }

    #[test]
    fn grass_codes_decode() {
        let grid = parse_direction_grid(ESRI, DirectionEncoding::Grass).unwrap();
        assert_eq!(*grid.get(Cell::new(0, 0)).unwrap(), Some(Direction::East));
        assert_eq!(*grid.get(Cell::new(0, 2)).unwrap(), Some(Direction::South));
        assert_eq!(*grid.get(Cell::new(1, 0)).unwrap(), None);
        assert_eq!(*grid.get(Cell::new(1, 1)).unwrap(), Some(Direction::NorthEast));
        assert_eq!(*grid.get(Cell::new(1, 2)).unwrap(), None);
    }

    #[test]
    fn invalid_code_names_the_cell() {
        let err = parse_direction_grid(ESRI, DirectionEncoding::Esri).unwrap_err();
        // 6 is not an ESRI code.
        assert!(matches!(
            err,
            RasterError::InvalidDirection { row: 0, col: 2, .. }
        ));
    }

    #[test]
    fn fractional_code_is_invalid() {
        let text = "ncols 1\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\n2.5\n";
        assert!(matches!(
            parse_direction_grid(text, DirectionEncoding::Grass),
            Err(RasterError::InvalidDirection { .. })
        ));
    }

    #[test]
    fn short_body_is_a_parse_error() {
        let text = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2\n3\n";
        let err = parse_ascii_grid(text).unwrap_err();
        assert!(matches!(err, RasterError::Parse { line: 7, .. }), "{err}");
    }

    #[test]
    fn long_body_is_a_parse_error() {
        let text = "ncols 2\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2\n3\n";
        let err = parse_ascii_grid(text).unwrap_err();
        assert!(matches!(err, RasterError::Parse { line: 7, .. }));
    }

    #[test]
    fn huge_header_with_small_body_is_a_parse_error() {
        let text = "ncols 4000000000\nnrows 4000000000\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2\n";
        let err = parse_ascii_grid(text).unwrap_err();
        assert!(matches!(err, RasterError::Parse { .. }));
    }

    #[test]
    fn missing_header_key() {
        let text = "ncols 2\nnrows 2\nxllcorner 0\ncellsize 1\n1 2\n3 4\n";
        let err = parse_ascii_grid(text).unwrap_err();
        assert!(err.to_string().contains("yllcorner"), "{err}");
    }

    #[test]
    fn path_grid_writes_ones_and_nodata() {
        let geometry = GridGeometry::new(2, 2, 20.0, 0.0, 10.0, 10.0);
        let path = PathGrid::from_fn(geometry, |c| c.row == c.col);
        let text = format_path_grid(&path);
        assert!(text.starts_with("ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 10\n"));
        assert!(text.ends_with("1 -9999\n-9999 1\n"));
    }

    #[test]
    fn distance_grid_survives_a_write() {
        let geometry = GridGeometry::new(1, 3, 5.0, 2.0, 5.0, 4.0);
        let cells = vec![Some(0.0), None, Some(12.5)];
        let distance = DistanceGrid::from_vec(geometry, cells).unwrap();
        let text = format_distance_grid(&distance);
        assert!(text.contains("dx 4\ndy 5\n"));
        assert_eq!(parse_distance_grid(&text).unwrap(), distance);
    }

    #[test]
    fn direction_grid_rewrites_in_other_encoding() {
        let grid = parse_direction_grid(ESRI, DirectionEncoding::Grass).unwrap();
        let esri = format_direction_grid(&grid, DirectionEncoding::Esri);
        assert!(esri.ends_with("1 1 4\n0 128 0\n"));
        assert_eq!(
            parse_direction_grid(&esri, DirectionEncoding::Esri).unwrap(),
            grid
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_direction_grid(
            Path::new("/nonexistent/lfp/direction.asc"),
            DirectionEncoding::Grass,
        )
        .unwrap_err();
        assert!(matches!(err, RasterError::Io(_)));
    }
}
