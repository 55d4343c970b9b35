//! Source decoding and slice extraction.
//!
//! Decoding turns raw bytes into an RGBA buffer; extraction copies each
//! resolved [`PixelRect`] out of that buffer into an independent slice.

use std::sync::Arc;

use image::imageops::{self, FilterType};

use crate::geometry::Cell;
use crate::types::{PipelineError, PixelRect, RgbaImage, Slice, SliceId, SliceStatus};

/// Decode raw image bytes into an RGBA buffer.
///
/// Supports PNG, JPEG, BMP, and WebP (whatever the `image` crate was
/// built with).
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Copy one pixel rectangle out of `source`.
///
/// The output always has exactly `rect.width` x `rect.height` pixels.
/// Source coordinates past the image edge are clamped; when clamping
/// shrinks the readable region, the remainder is rescaled to the
/// requested size. A rectangle entirely outside the image yields a
/// fully transparent buffer.
#[must_use = "returns the extracted region"]
pub fn extract_region(source: &RgbaImage, rect: PixelRect) -> RgbaImage {
    let x = rect.x.min(source.width());
    let y = rect.y.min(source.height());
    let width = rect.right().min(source.width()) - x;
    let height = rect.bottom().min(source.height()) - y;

    if width == 0 || height == 0 {
        return RgbaImage::new(rect.width, rect.height);
    }

    let region = imageops::crop_imm(source, x, y, width, height).to_image();
    if width == rect.width && height == rect.height {
        region
    } else {
        imageops::resize(&region, rect.width, rect.height, FilterType::Triangle)
    }
}

/// Extract every rectangle from `source` into a fresh slice list.
///
/// Slices are positioned in a single row, in input order. Use
/// [`extract_cells`] to keep grid positions from geometry resolution.
#[must_use]
pub fn extract_slices(source: &RgbaImage, rects: &[PixelRect], generation: u64) -> Vec<Slice> {
    rects
        .iter()
        .enumerate()
        .map(|(index, &rect)| new_slice(source, rect, generation, index, 0, index))
        .collect()
}

/// Extract every resolved cell from `source` into a fresh slice list,
/// keeping each cell's row and column.
#[must_use]
pub fn extract_cells(source: &RgbaImage, cells: &[Cell], generation: u64) -> Vec<Slice> {
    cells
        .iter()
        .enumerate()
        .map(|(index, cell)| new_slice(source, cell.rect, generation, index, cell.row, cell.column))
        .collect()
}

fn new_slice(
    source: &RgbaImage,
    rect: PixelRect,
    generation: u64,
    index: usize,
    row: usize,
    column: usize,
) -> Slice {
    Slice {
        id: SliceId { generation, index },
        row,
        column,
        rect,
        original: Arc::new(extract_region(source, rect)),
        processed: None,
        status: SliceStatus::Idle,
        error: None,
    }
}
