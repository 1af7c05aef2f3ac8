//! PNG previews of a flow path over its drainage grid.

use std::path::Path;

use image::{ImageEncoder, Rgb, RgbImage};
use lfp_pipeline::{Cell, DirectionGrid, FlowPathError, PathGrid};

use crate::error::RasterError;

/// Cells without an outflow.
const NO_FLOW: Rgb<u8> = Rgb([255, 255, 255]);
/// Cells with a drainage direction.
const DRAINED: Rgb<u8> = Rgb([208, 214, 220]);
/// Cells on the path.
const PATH: Rgb<u8> = Rgb([20, 80, 200]);

/// Render `path` over `direction`, each cell as a `scale` x `scale` block.
///
/// # Errors
///
/// Returns [`RasterError::Grid`] if the grids differ in shape and
/// [`RasterError::TooLarge`] if the image would not fit in `u32` pixels.
pub fn render_preview(
    direction: &DirectionGrid,
    path: &PathGrid,
    scale: u32,
) -> Result<RgbImage, RasterError> {
    if !direction.geometry().same_shape(path.geometry()) {
        return Err(FlowPathError::GridMismatch {
            expected: direction.geometry().cell_count(),
            actual: path.geometry().cell_count(),
        }
        .into());
    }
    let too_large = || RasterError::TooLarge {
        rows: direction.rows(),
        cols: direction.cols(),
        scale,
    };
    let scale = scale.max(1);
    let width = u32::try_from(direction.cols())
        .ok()
        .and_then(|w| w.checked_mul(scale))
        .ok_or_else(too_large)?;
    let height = u32::try_from(direction.rows())
        .ok()
        .and_then(|h| h.checked_mul(scale))
        .ok_or_else(too_large)?;

    Ok(RgbImage::from_fn(width, height, |x, y| {
        let cell = Cell::new((y / scale) as usize, (x / scale) as usize);
        if path.is_set(cell) {
            PATH
        } else if direction.get(cell).copied().flatten().is_some() {
            DRAINED
        } else {
            NO_FLOW
        }
    }))
}

/// Encode an RGB image as PNG bytes.
///
/// # Errors
///
/// Returns [`RasterError::PngEncode`] if encoding fails.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, RasterError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(png_bytes)
}

/// Render and write a preview PNG.
///
/// # Errors
///
/// Any [`render_preview`] or [`encode_png`] error, plus
/// [`RasterError::Io`] if the file cannot be written.
pub fn write_preview(
    file: &Path,
    direction: &DirectionGrid,
    path: &PathGrid,
    scale: u32,
) -> Result<(), RasterError> {
    let png = encode_png(&render_preview(direction, path, scale)?)?;
    std::fs::write(file, &png)?;
    tracing::debug!(path = %file.display(), bytes = png.len(), "preview written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lfp_pipeline::{Direction, GridGeometry};

    use super::*;

    fn grids() -> (DirectionGrid, PathGrid) {
        let geometry = GridGeometry::square(2, 3, 1.0);
        let direction =
            DirectionGrid::from_fn(geometry, |c| (c.col < 2).then_some(Direction::East));
        let path = PathGrid::from_fn(geometry, |c| c.row == 0);
        (direction, path)
    }

    #[test]
    fn cells_are_scaled_and_coloured() {
        let (direction, path) = grids();
        let image = render_preview(&direction, &path, 4).unwrap();
        assert_eq!(image.dimensions(), (12, 8));
        assert_eq!(*image.get_pixel(3, 3), PATH);
        assert_eq!(*image.get_pixel(0, 4), DRAINED);
        assert_eq!(*image.get_pixel(11, 7), NO_FLOW);
    }

    #[test]
    fn mismatched_grids_are_rejected() {
        let (direction, _) = grids();
        let path = PathGrid::filled(GridGeometry::square(3, 3, 1.0), false);
        assert!(matches!(
            render_preview(&direction, &path, 1),
            Err(RasterError::Grid(FlowPathError::GridMismatch { .. }))
        ));
    }

    #[test]
    fn png_has_signature() {
        let (direction, path) = grids();
        let png = encode_png(&render_preview(&direction, &path, 1).unwrap()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
