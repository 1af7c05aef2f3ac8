//! lfp-raster: Grid file I/O for the longest flow path pipeline.
//!
//! Reads drainage-direction grids from ESRI or GRASS ASCII files, writes
//! path and distance grids back as ESRI ASCII, and renders PNG previews.
//! All computation lives in `lfp-pipeline`.

pub mod ascii;
pub mod encoding;
pub mod error;
pub mod preview;

pub use ascii::{
    AsciiGrid, NODATA, format_direction_grid, format_distance_grid, format_path_grid,
    parse_ascii_grid, parse_direction_grid, parse_distance_grid, read_direction_grid,
    write_direction_grid, write_distance_grid, write_path_grid,
};
pub use encoding::{DirectionEncoding, UnknownCode};
pub use error::RasterError;
pub use preview::{encode_png, render_preview, write_preview};
