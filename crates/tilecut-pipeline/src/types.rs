//! Shared types for the tilecut slicing pipeline.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// Re-export `RgbaImage` so downstream crates can reference slice
/// buffers without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an existing buffer.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

/// A rectangle expressed as percentages (0–100) of a containing box.
///
/// The crop editor keeps `x + w <= 100` and `y + h <= 100`; geometry
/// resolution still clamps every field so values at (or slightly past)
/// the boundary never yield negative sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentRect {
    /// Left edge, percent of the box width.
    pub x: f64,
    /// Top edge, percent of the box height.
    pub y: f64,
    /// Width, percent of the box width.
    pub w: f64,
    /// Height, percent of the box height.
    pub h: f64,
}

impl PercentRect {
    /// The whole box.
    pub const FULL: Self = Self {
        x: 0.0,
        y: 0.0,
        w: 100.0,
        h: 100.0,
    };

    /// Create a new percent rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Returns `true` when every field is a finite number.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
    }
}

impl Default for PercentRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Interior grid division positions, as percentages of the crop box.
///
/// Values arrive in whatever order the grid editor produced them and
/// may contain duplicates or lines sitting exactly on the crop edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridLines {
    /// Vertical lines (x positions), percent of crop width.
    #[serde(rename = "v")]
    pub vertical: Vec<f64>,
    /// Horizontal lines (y positions), percent of crop height.
    #[serde(rename = "h")]
    pub horizontal: Vec<f64>,
}

impl GridLines {
    /// Create a grid line set from explicit positions.
    #[must_use]
    pub const fn new(vertical: Vec<f64>, horizontal: Vec<f64>) -> Self {
        Self {
            vertical,
            horizontal,
        }
    }

    /// Evenly spaced lines producing `columns` x `rows` cells.
    ///
    /// Zero is treated as one (no interior lines on that axis).
    #[must_use]
    pub fn uniform(columns: u32, rows: u32) -> Self {
        Self {
            vertical: even_divisions(columns),
            horizontal: even_divisions(rows),
        }
    }
}

fn even_divisions(count: u32) -> Vec<f64> {
    let count = count.max(1);
    (1..count)
        .map(|i| f64::from(i) * 100.0 / f64::from(count))
        .collect()
}

/// A rectangle in absolute source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels (always at least 1 when produced by geometry resolution).
    pub width: u32,
    /// Height in pixels (always at least 1 when produced by geometry resolution).
    pub height: u32,
}

impl PixelRect {
    /// Create a new pixel rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Number of pixels covered.
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// An opaque 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Pure white.
    pub const WHITE: Self = Self::new(255, 255, 255);
    /// Pure black.
    pub const BLACK: Self = Self::new(0, 0, 0);

    /// Create a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = PipelineError;

    /// Parse `#rrggbb` or `rrggbb` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(PipelineError::InvalidConfig(format!(
                "color must be '#rrggbb', got '{s}'"
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| {
                PipelineError::InvalidConfig(format!("invalid hex color '{s}': {e}"))
            })
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// Per-pass processing configuration.
///
/// A config is an immutable snapshot: the queue compares the active
/// config against each new one and any difference invalidates every
/// processed slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProcessConfig {
    /// Remove the border-connected white/transparent background.
    pub remove_white: bool,

    /// Add a solid outline around the opaque silhouette.
    pub add_stroke: bool,

    /// Configured outline width. Must be at least 1.
    ///
    /// The rendered outline is roughly
    /// [`STROKE_WIDTH_MULTIPLIER`](crate::stroke::STROKE_WIDTH_MULTIPLIER)
    /// times this value; callers should not double it themselves.
    pub stroke_width: u32,

    /// Outline color.
    pub stroke_color: Rgb,

    /// Color filter applied between matting and stroke.
    pub filter: Filter,
}

impl ProcessConfig {
    /// Default for [`remove_white`](Self::remove_white).
    pub const DEFAULT_REMOVE_WHITE: bool = false;
    /// Default for [`add_stroke`](Self::add_stroke).
    pub const DEFAULT_ADD_STROKE: bool = false;
    /// Default for [`stroke_width`](Self::stroke_width).
    pub const DEFAULT_STROKE_WIDTH: u32 = 3;
    /// Default for [`stroke_color`](Self::stroke_color).
    pub const DEFAULT_STROKE_COLOR: Rgb = Rgb::WHITE;
    /// Default for [`filter`](Self::filter).
    pub const DEFAULT_FILTER: Filter = Filter::None;

    /// Whether the queue has any work to do under this config.
    ///
    /// A filter on its own does not schedule processing; slices are only
    /// processed when matting or stroking is enabled.
    #[must_use]
    pub const fn needs_processing(&self) -> bool {
        self.remove_white || self.add_stroke
    }

    /// Check field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `stroke_width` is zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.stroke_width < 1 {
            return Err(PipelineError::InvalidConfig(format!(
                "stroke_width must be at least 1, got {}",
                self.stroke_width
            )));
        }
        Ok(())
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            remove_white: Self::DEFAULT_REMOVE_WHITE,
            add_stroke: Self::DEFAULT_ADD_STROKE,
            stroke_width: Self::DEFAULT_STROKE_WIDTH,
            stroke_color: Self::DEFAULT_STROKE_COLOR,
            filter: Self::DEFAULT_FILTER,
        }
    }
}

/// Processing state of a single slice.
///
/// ```text
/// idle ──▶ pending ──▶ processing ──▶ done
///   ▲                      │
///   └──────── failure ─────┘
/// ```
///
/// A config change or an original replacement moves `idle`/`done`
/// straight back to `pending`; a `processing` slice only follows once
/// its in-flight run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceStatus {
    /// Not scheduled; `processed` is absent unless left over from a
    /// failed retry.
    Idle,
    /// Waiting for the in-flight slot.
    Pending,
    /// Occupying the in-flight slot.
    Processing,
    /// `processed` holds the result for the active config.
    Done,
}

impl fmt::Display for SliceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Pending => f.write_str("pending"),
            Self::Processing => f.write_str("processing"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// Identity of a slice within one geometry generation.
///
/// `generation` changes on every full regeneration, so ids from a
/// previous crop/grid never match the current slice list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceId {
    /// Regeneration counter.
    pub generation: u64,
    /// Row-major position in the slice list.
    pub index: usize,
}

impl fmt::Display for SliceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.index)
    }
}

/// One cell of the sliced grid.
///
/// Buffers are reference counted and never mutated in place: every
/// stage that changes pixels produces a new buffer, so a slice can be
/// cloned into a snapshot cheaply while a worker reads its original.
#[derive(Debug, Clone)]
pub struct Slice {
    /// Identity within the current generation.
    pub id: SliceId,
    /// Grid row (0-based, top to bottom).
    pub row: usize,
    /// Grid column (0-based, left to right).
    pub column: usize,
    /// Source region this slice was cut from.
    pub rect: PixelRect,
    /// Pixels as extracted (or as replaced by an external edit).
    pub original: Arc<RgbaImage>,
    /// Result of the last successful processing run for the active config.
    pub processed: Option<Arc<RgbaImage>>,
    /// Scheduling state.
    pub status: SliceStatus,
    /// Message of the last processing failure, if the most recent run failed.
    pub error: Option<String>,
}

impl Slice {
    /// The buffer an exporter should use: processed when available,
    /// otherwise the original.
    #[must_use]
    pub fn output(&self) -> &RgbaImage {
        self.processed.as_deref().unwrap_or(&self.original)
    }
}

/// Errors that can occur while decoding, slicing, or processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the source image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The source image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A drawing surface could not be allocated.
    #[error("render context unavailable: {0}")]
    RenderContext(String),

    /// A processing stage received a buffer with no pixels.
    #[error("slice buffer is empty ({width}x{height})")]
    EmptySlice {
        /// Buffer width.
        width: u32,
        /// Buffer height.
        height: u32,
    },

    /// Processing or geometry configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A slice index does not exist in the current slice list.
    #[error("slice index {index} out of range (have {len} slices)")]
    UnknownSlice {
        /// Requested index.
        index: usize,
        /// Current slice count.
        len: usize,
    },

    /// The background queue worker has stopped.
    #[error("slice queue worker has stopped")]
    QueueClosed,
}
