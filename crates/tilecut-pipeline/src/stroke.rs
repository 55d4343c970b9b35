//! Outline synthesis by stacking blurred silhouette shadows.
//!
//! A single blurred shadow fades out gradually, so one pass gives a soft,
//! semi-transparent halo. Drawing the same shadow [`SHADOW_PASSES`] times
//! with source-over saturates it to a near-hard edge at roughly the blur
//! radius, which reads as a solid sticker outline.
//!
//! Steps, on a canvas padded by [`padding`] on every side:
//!
//! 1. Silhouette: copy of the input with every non-transparent pixel
//!    recolored to the stroke color (alpha kept).
//! 2. Shadow: the silhouette's alpha blurred with a Gaussian whose sigma
//!    is half the shadow blur radius (the usual canvas `shadowBlur`
//!    convention), colored with the stroke color.
//! 3. Draw shadow then silhouette onto an empty canvas, repeated
//!    [`SHADOW_PASSES`] times.
//! 4. Draw the original content on top.
//!
//! Compositing goes through `tiny-skia` pixmaps (premultiplied alpha).

use image::{GrayImage, Luma, Rgba};
use tiny_skia::{ColorU8, IntSize, Pixmap, PixmapPaint, Transform};

use crate::types::{PipelineError, Rgb, RgbaImage};

/// Factor applied to the configured stroke width before it drives blur
/// radius and padding.
///
/// The rendered outline is visibly about twice the configured width.
/// Kept for compatibility with existing stickers; retune here rather
/// than in callers.
pub const STROKE_WIDTH_MULTIPLIER: u32 = 2;

/// Extra padding, beyond the effective stroke width, so the blurred
/// shadow tail is never clipped.
pub const STROKE_PADDING_EXTRA: u32 = 4;

/// Number of times the blurred shadow is composited.
pub const SHADOW_PASSES: usize = 12;

/// Effective stroke width in pixels (also the shadow blur radius).
#[must_use]
pub const fn effective_width(stroke_width: u32) -> u32 {
    stroke_width.saturating_mul(STROKE_WIDTH_MULTIPLIER)
}

/// Padding added on each side of the canvas for a given stroke width.
#[must_use]
pub const fn padding(stroke_width: u32) -> u32 {
    effective_width(stroke_width).saturating_add(STROKE_PADDING_EXTRA)
}

/// Add an outline around the opaque silhouette of `image`.
///
/// The output is `2 * padding(stroke_width)` larger than the input on
/// each axis, with the input centered.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `stroke_width` is zero,
/// [`PipelineError::EmptySlice`] if `image` has no pixels, and
/// [`PipelineError::RenderContext`] if the padded canvas cannot be
/// allocated.
pub fn add_stroke(
    image: &RgbaImage,
    stroke_width: u32,
    color: Rgb,
) -> Result<RgbaImage, PipelineError> {
    if stroke_width == 0 {
        return Err(PipelineError::InvalidConfig(
            "stroke_width must be at least 1".into(),
        ));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::EmptySlice {
            width: image.width(),
            height: image.height(),
        });
    }

    let pad = padding(stroke_width);
    let width = image
        .width()
        .checked_add(pad.saturating_mul(2))
        .ok_or_else(|| canvas_too_large(image, pad))?;
    let height = image
        .height()
        .checked_add(pad.saturating_mul(2))
        .ok_or_else(|| canvas_too_large(image, pad))?;

    let mut padded = RgbaImage::new(width, height);
    image::imageops::replace(&mut padded, image, i64::from(pad), i64::from(pad));

    let silhouette = silhouette(&padded, color);
    let shadow = shadow(&silhouette, effective_width(stroke_width), color);

    let shadow = to_pixmap(&shadow)?;
    let silhouette = to_pixmap(&silhouette)?;
    let content = to_pixmap(&padded)?;
    let mut canvas = Pixmap::new(width, height).ok_or_else(|| {
        PipelineError::RenderContext(format!("cannot allocate {width}x{height} canvas"))
    })?;

    let paint = PixmapPaint::default();
    for _ in 0..SHADOW_PASSES {
        canvas.draw_pixmap(0, 0, shadow.as_ref(), &paint, Transform::identity(), None);
        canvas.draw_pixmap(0, 0, silhouette.as_ref(), &paint, Transform::identity(), None);
    }
    canvas.draw_pixmap(0, 0, content.as_ref(), &paint, Transform::identity(), None);

    Ok(from_pixmap(&canvas))
}

fn canvas_too_large(image: &RgbaImage, pad: u32) -> PipelineError {
    PipelineError::RenderContext(format!(
        "{}x{} padded by {pad} overflows canvas size",
        image.width(),
        image.height()
    ))
}

/// Recolor every non-transparent pixel to `color`, keeping alpha.
#[must_use]
pub fn silhouette(image: &RgbaImage, color: Rgb) -> RgbaImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        if px.0[3] != 0 {
            *px = Rgba([color.r, color.g, color.b, px.0[3]]);
        }
    }
    out
}

/// Blurred, colored copy of `silhouette`'s alpha.
fn shadow(silhouette: &RgbaImage, blur_radius: u32, color: Rgb) -> RgbaImage {
    let alpha = GrayImage::from_fn(silhouette.width(), silhouette.height(), |x, y| {
        Luma([silhouette.get_pixel(x, y).0[3]])
    });
    #[allow(clippy::cast_precision_loss)]
    let sigma = blur_radius as f32 / 2.0;
    let blurred = if sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(&alpha, sigma)
    } else {
        alpha
    };
    RgbaImage::from_fn(silhouette.width(), silhouette.height(), |x, y| {
        Rgba([color.r, color.g, color.b, blurred.get_pixel(x, y).0[0]])
    })
}

/// Convert a straight-alpha buffer to a premultiplied pixmap.
fn to_pixmap(image: &RgbaImage) -> Result<Pixmap, PipelineError> {
    let size = IntSize::from_wh(image.width(), image.height()).ok_or_else(|| {
        PipelineError::RenderContext(format!(
            "invalid pixmap size {}x{}",
            image.width(),
            image.height()
        ))
    })?;
    let data = image
        .pixels()
        .flat_map(|px| {
            let c = ColorU8::from_rgba(px.0[0], px.0[1], px.0[2], px.0[3]).premultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    Pixmap::from_vec(data, size)
        .ok_or_else(|| PipelineError::RenderContext("pixmap data size mismatch".into()))
}

/// Convert a premultiplied pixmap back to a straight-alpha buffer.
fn from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    RgbaImage::from_fn(pixmap.width(), pixmap.height(), |x, y| {
        pixmap.pixel(x, y).map_or(Rgba([0, 0, 0, 0]), |px| {
            let c = px.demultiply();
            Rgba([c.red(), c.green(), c.blue(), c.alpha()])
        })
    })
}
