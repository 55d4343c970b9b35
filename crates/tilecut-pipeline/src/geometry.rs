//! Geometry resolution: percentage crop + grid lines to pixel rectangles.
//!
//! The crop editor and grid editor work in percentages so their state is
//! independent of the source resolution. This module scales those
//! percentages against the actual image size and cuts the crop box into
//! cells.
//!
//! Each cell's width and height are rounded independently, without
//! carrying the fractional remainder into the next cell. Summed slice
//! widths can therefore differ from the rounded crop width by up to one
//! pixel per interior seam. Consumers rely on the per-cell rounding, so
//! it is kept as is.

use crate::types::{Dimensions, GridLines, PercentRect, PixelRect};

/// A resolved grid cell: its grid position and pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// Grid row (0-based).
    pub row: usize,
    /// Grid column (0-based).
    pub column: usize,
    /// Absolute pixel rectangle in the source image.
    pub rect: PixelRect,
}

/// Resolve a crop and grid into pixel rectangles, row-major.
///
/// See [`resolve_cells`] for the algorithm; this variant drops the grid
/// positions.
#[must_use]
pub fn resolve_geometry(image: Dimensions, crop: PercentRect, grid: &GridLines) -> Vec<PixelRect> {
    resolve_cells(image, crop, grid)
        .into_iter()
        .map(|cell| cell.rect)
        .collect()
}

/// Resolve a crop and grid into grid cells, row-major (top to bottom,
/// then left to right within a row).
///
/// 1. Scale the crop percentages against the image size to get the crop
///    origin and size in pixels.
/// 2. Scale the grid lines against the crop size, add the crop edges
///    (0 and the full crop extent), sort, and drop duplicates.
/// 3. Emit one rectangle per pair of consecutive cut positions, offset by
///    the crop origin, with width and height rounded per cell.
///
/// Cells whose rounded width or height is zero are dropped. Row and
/// column indices count only emitted cells, so they stay dense.
///
/// Geometry resolution never fails. A non-finite crop field counts as
/// 0, so a NaN extent yields no cells, and non-finite grid lines are
/// skipped. Callers that want to reject such input validate it first
/// (see [`PercentRect::is_finite`]).
#[must_use]
pub fn resolve_cells(image: Dimensions, crop: PercentRect, grid: &GridLines) -> Vec<Cell> {
    let (cx, cw) = crop_span(crop.x, crop.w, image.width);
    let (cy, ch) = crop_span(crop.y, crop.h, image.height);

    let x_spans = spans(&cut_positions(&grid.vertical, cw), cx);
    let y_spans = spans(&cut_positions(&grid.horizontal, ch), cy);

    let mut cells = Vec::with_capacity(x_spans.len() * y_spans.len());
    for (row, &(y, height)) in y_spans.iter().enumerate() {
        for (column, &(x, width)) in x_spans.iter().enumerate() {
            cells.push(Cell {
                row,
                column,
                rect: PixelRect::new(x, y, width, height),
            });
        }
    }
    cells
}

/// Scale a percentage origin/extent pair against an axis length.
///
/// Both values are clamped to `[0, 100]` and the extent is clipped so
/// the span never leaves the image.
fn crop_span(origin_pct: f64, extent_pct: f64, axis: u32) -> (f64, f64) {
    let origin_pct = finite_or(origin_pct, 0.0).clamp(0.0, 100.0);
    let extent_pct = finite_or(extent_pct, 0.0).clamp(0.0, 100.0 - origin_pct);
    let axis = f64::from(axis);
    (origin_pct / 100.0 * axis, extent_pct / 100.0 * axis)
}

/// Sorted, de-duplicated cut positions along one axis of the crop box,
/// including both edges.
fn cut_positions(lines: &[f64], extent: f64) -> Vec<f64> {
    let mut cuts = Vec::with_capacity(lines.len() + 2);
    cuts.push(0.0);
    cuts.extend(
        lines
            .iter()
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0) / 100.0 * extent),
    );
    cuts.push(extent);
    cuts.sort_by(f64::total_cmp);
    cuts.dedup();
    cuts
}

/// Convert consecutive cut positions into `(origin, length)` pixel spans,
/// dropping spans that round to zero length.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn spans(cuts: &[f64], offset: f64) -> Vec<(u32, u32)> {
    cuts.windows(2)
        .filter_map(|pair| {
            let length = (pair[1] - pair[0]).round();
            if length < 1.0 {
                return None;
            }
            let origin = (offset + pair[0]).round().max(0.0);
            Some((origin as u32, length as u32))
        })
        .collect()
}

const fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}
