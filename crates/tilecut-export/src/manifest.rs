//! JSON manifest describing an exported slice set.
//!
//! The manifest records everything needed to reproduce the export: the
//! source size, the crop and grid in percent, the processing config, and
//! for every file the source rectangle it was cut from.

use serde::{Deserialize, Serialize};
use tilecut_pipeline::{
    Dimensions, GridLines, PercentRect, PixelRect, ProcessConfig, Slice, SliceStatus,
};

use crate::ExportError;
use crate::png::{grid_size, slice_file_name};

/// Description of an exported slice set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Source image size in pixels.
    pub source: Dimensions,
    /// Crop box, percent of the source.
    pub crop: PercentRect,
    /// Grid lines, percent of the crop box.
    pub grid: GridLines,
    /// Processing config the slices were produced with.
    pub config: ProcessConfig,
    /// Grid rows.
    pub rows: usize,
    /// Grid columns.
    pub columns: usize,
    /// One entry per file, in slice order.
    pub slices: Vec<ManifestEntry>,
}

/// One exported file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File name, matching [`slice_file_name`].
    pub file: String,
    /// Grid row (0-based).
    pub row: usize,
    /// Grid column (0-based).
    pub column: usize,
    /// Source rectangle in pixels.
    pub rect: PixelRect,
    /// Size of the exported buffer (larger than `rect` when stroked).
    pub output: Dimensions,
    /// Final processing state.
    pub status: SliceStatus,
    /// Last processing failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Manifest {
    /// Build a manifest for `slices` as they would be named by
    /// [`export_slices`](crate::export_slices) with the same `stem`.
    #[must_use]
    pub fn new(
        stem: &str,
        source: Dimensions,
        crop: PercentRect,
        grid: GridLines,
        config: ProcessConfig,
        slices: &[Slice],
    ) -> Self {
        let (rows, columns) = grid_size(slices);
        let entries = slices
            .iter()
            .map(|slice| ManifestEntry {
                file: slice_file_name(stem, slice, rows, columns),
                row: slice.row,
                column: slice.column,
                rect: slice.rect,
                output: Dimensions::of(slice.output()),
                status: slice.status,
                error: slice.error.clone(),
            })
            .collect();
        Self {
            source,
            crop,
            grid,
            config,
            rows,
            columns,
            slices: entries,
        }
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Manifest`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
