//! Errors raised while reading, writing, or rendering grids.

use lfp_pipeline::FlowPathError;

/// Errors that can occur during raster I/O.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// The file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The grid text is malformed.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number where the problem was found.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// A cell holds a value that is not a drainage direction in the
    /// selected encoding.
    #[error("cell ({row}, {col}) holds invalid direction code {code}")]
    InvalidDirection {
        /// Row of the offending cell.
        row: usize,
        /// Column of the offending cell.
        col: usize,
        /// The value found.
        code: f64,
    },

    /// The parsed grid does not fit the pipeline's grid model.
    #[error(transparent)]
    Grid(#[from] FlowPathError),

    /// The preview does not fit in an image.
    #[error("preview of {rows}x{cols} cells at scale {scale} exceeds image limits")]
    TooLarge {
        /// Grid rows.
        rows: usize,
        /// Grid columns.
        cols: usize,
        /// Pixels per cell.
        scale: u32,
    },

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncode(String),
}

impl From<image::ImageError> for RasterError {
    fn from(err: image::ImageError) -> Self {
        Self::PngEncode(err.to_string())
    }
}

impl RasterError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
