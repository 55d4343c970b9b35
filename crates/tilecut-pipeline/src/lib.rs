//! tilecut-pipeline: slice geometry and pixel post-processing (sans-IO).
//!
//! Cuts a source image into a grid of slices and post-processes each
//! slice through:
//! matting (border-connected background removal) -> color filter ->
//! outline stroke.
//!
//! This crate has **no I/O dependencies**: it works on in-memory byte
//! slices and buffers. Writing files lives in `tilecut-export` and the
//! command line in `tilecut`.
//!
//! Processing is scheduled by [`SliceQueue`], which hands out one job at
//! a time. [`run_to_completion`] drains it on the calling thread;
//! [`QueueWorker`] drives it from a background thread.

pub mod diagnostics;
pub mod extract;
pub mod filter;
pub mod geometry;
pub mod matting;
pub mod process;
pub mod queue;
pub mod stroke;
pub mod types;
pub mod worker;

pub use extract::{decode_image, extract_cells, extract_region, extract_slices};
pub use filter::{Filter, apply_filter};
pub use geometry::{Cell, resolve_cells, resolve_geometry};
pub use matting::remove_background;
pub use process::process_slice;
pub use queue::{Job, QueueEvent, SliceQueue, Ticket, run_to_completion};
pub use stroke::add_stroke;
pub use types::{
    Dimensions, GridLines, PercentRect, PipelineError, PixelRect, ProcessConfig, Rgb, RgbaImage,
    Slice, SliceId, SliceStatus,
};
pub use worker::QueueWorker;

/// Resolve the grid over `source` and extract every cell.
///
/// Slices come back `idle`, in row-major order, tagged with
/// `generation`. Feed them to a [`SliceQueue`] to schedule processing.
#[must_use]
pub fn slice_image(
    source: &RgbaImage,
    crop: PercentRect,
    grid: &GridLines,
    generation: u64,
) -> Vec<Slice> {
    let cells = resolve_cells(Dimensions::of(source), crop, grid);
    log::debug!(
        "slicing {}x{} source into {} cells (generation {generation})",
        source.width(),
        source.height(),
        cells.len()
    );
    extract_cells(source, &cells, generation)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn slice_image_covers_grid_in_row_major_order() {
        let source = RgbaImage::from_fn(40, 20, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let slices = slice_image(&source, PercentRect::FULL, &GridLines::uniform(4, 2), 3);
        assert_eq!(slices.len(), 8);
        assert_eq!((slices[5].row, slices[5].column), (1, 1));
        assert_eq!(slices[5].rect, PixelRect::new(10, 10, 10, 10));
        assert_eq!(slices[5].original.get_pixel(0, 0).0, [10, 10, 0, 255]);
        assert!(slices.iter().all(|s| s.id.generation == 3));
        assert!(slices.iter().all(|s| s.status == SliceStatus::Idle));
    }
}
