//! Named color filters applied to slice buffers.
//!
//! Every filter works on RGB only and leaves alpha alone. Fully
//! transparent pixels (alpha 0) are skipped: their RGB is neither read
//! nor written, so color from matted-away background never shows up at
//! the silhouette edge once a stroke is composited.
//!
//! Filters compound when applied twice. Callers re-run them on the
//! unfiltered original, never on a previous output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, RgbaImage};

/// Color filter selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    /// No filter.
    #[default]
    None,
    /// Luminance grayscale (`0.299 R + 0.587 G + 0.114 B`).
    Grayscale,
    /// Classic sepia tone matrix.
    Sepia,
    /// Flat +30 on every channel.
    Brightness,
    /// Saturation boosted by 40% around the pixel's channel mean.
    Vibrant,
    /// Desaturate, split-tone (teal shadows, orange highlights), vignette.
    Cinematic,
    /// Bright, low-contrast, slightly cool.
    Japanese,
    /// Warm shift: more red and green, less blue.
    Warm,
}

impl Filter {
    /// All filters in display order.
    pub const ALL: [Self; 8] = [
        Self::None,
        Self::Grayscale,
        Self::Sepia,
        Self::Brightness,
        Self::Vibrant,
        Self::Cinematic,
        Self::Japanese,
        Self::Warm,
    ];

    /// Lowercase identifier, as used in configs and on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale",
            Self::Sepia => "sepia",
            Self::Brightness => "brightness",
            Self::Vibrant => "vibrant",
            Self::Cinematic => "cinematic",
            Self::Japanese => "japanese",
            Self::Warm => "warm",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Filter {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("unknown filter '{s}'")))
    }
}

/// Apply `filter` to a copy of `image`.
#[must_use = "returns the filtered buffer"]
pub fn apply_filter(image: &RgbaImage, filter: Filter) -> RgbaImage {
    let mut out = image.clone();
    apply_filter_in_place(&mut out, filter);
    out
}

/// Apply `filter` to `image` in place.
pub fn apply_filter_in_place(image: &mut RgbaImage, filter: Filter) {
    match filter {
        Filter::None => {}
        Filter::Grayscale => map_rgb(image, grayscale),
        Filter::Sepia => map_rgb(image, sepia),
        Filter::Brightness => map_rgb(image, |rgb| offset(rgb, [30.0, 30.0, 30.0])),
        Filter::Vibrant => map_rgb(image, vibrant),
        Filter::Cinematic => cinematic(image),
        Filter::Japanese => map_rgb(image, japanese),
        Filter::Warm => map_rgb(image, |rgb| offset(rgb, [25.0, 10.0, -15.0])),
    }
}

type Rgbf = [f32; 3];

/// Run a per-pixel RGB transform over every non-transparent pixel.
fn map_rgb(image: &mut RgbaImage, f: impl Fn(Rgbf) -> Rgbf) {
    for px in image.pixels_mut() {
        if px.0[3] == 0 {
            continue;
        }
        let out = f([f32::from(px.0[0]), f32::from(px.0[1]), f32::from(px.0[2])]);
        px.0[0] = to_channel(out[0]);
        px.0[1] = to_channel(out[1]);
        px.0[2] = to_channel(out[2]);
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn clamp(rgb: Rgbf) -> Rgbf {
    rgb.map(|v| v.clamp(0.0, 255.0))
}

fn luminance([r, g, b]: Rgbf) -> f32 {
    0.299f32.mul_add(r, 0.587f32.mul_add(g, 0.114 * b))
}

fn mean([r, g, b]: Rgbf) -> f32 {
    (r + g + b) / 3.0
}

/// Scale each channel's distance from `center` by `factor`.
fn scale_around(rgb: Rgbf, center: f32, factor: f32) -> Rgbf {
    rgb.map(|v| (v - center).mul_add(factor, center))
}

fn offset(rgb: Rgbf, delta: Rgbf) -> Rgbf {
    clamp([rgb[0] + delta[0], rgb[1] + delta[1], rgb[2] + delta[2]])
}

fn grayscale(rgb: Rgbf) -> Rgbf {
    let l = luminance(rgb);
    [l, l, l]
}

fn sepia([r, g, b]: Rgbf) -> Rgbf {
    clamp([
        0.393f32.mul_add(r, 0.769f32.mul_add(g, 0.189 * b)),
        0.349f32.mul_add(r, 0.686f32.mul_add(g, 0.168 * b)),
        0.272f32.mul_add(r, 0.534f32.mul_add(g, 0.131 * b)),
    ])
}

/// Saturation boost applied by [`Filter::Vibrant`].
const VIBRANT_BOOST: f32 = 1.4;

#[allow(clippy::float_cmp)]
fn vibrant(rgb: Rgbf) -> Rgbf {
    let max = rgb[0].max(rgb[1]).max(rgb[2]);
    let min = rgb[0].min(rgb[1]).min(rgb[2]);
    if max == min {
        return rgb;
    }
    clamp(scale_around(rgb, mean(rgb), VIBRANT_BOOST))
}

fn japanese(rgb: Rgbf) -> Rgbf {
    let bright = offset(rgb, [40.0, 40.0, 40.0]);
    let flat = clamp(scale_around(bright, mean(bright), 0.7));
    offset(flat, [-10.0, 0.0, 15.0])
}

/// Saturation kept by the first cinematic pass.
const CINEMATIC_SATURATION: f32 = 0.6;
/// Luminance splitting shadows from highlights in the split-tone pass.
const SPLIT_TONE_PIVOT: f32 = 128.0;
/// Shadow tint (toward cyan/blue).
const SHADOW_TINT: Rgbf = [-10.0, 5.0, 15.0];
/// Highlight tint (toward orange).
const HIGHLIGHT_TINT: Rgbf = [15.0, 5.0, -10.0];
/// Darkening at the far corners relative to the center.
const VIGNETTE_STRENGTH: f32 = 0.5;

/// Three whole-buffer passes: desaturate, split-tone, radial vignette.
#[allow(clippy::cast_precision_loss)]
fn cinematic(image: &mut RgbaImage) {
    map_rgb(image, |rgb| {
        clamp(scale_around(rgb, luminance(rgb), CINEMATIC_SATURATION))
    });

    map_rgb(image, |rgb| {
        let tint = if luminance(rgb) < SPLIT_TONE_PIVOT {
            SHADOW_TINT
        } else {
            HIGHLIGHT_TINT
        };
        offset(rgb, tint)
    });

    let cx = image.width() as f32 / 2.0;
    let cy = image.height() as f32 / 2.0;
    let max_dist = cx.hypot(cy);
    if max_dist <= 0.0 {
        return;
    }
    for (x, y, px) in image.enumerate_pixels_mut() {
        if px.0[3] == 0 {
            continue;
        }
        let dist = (x as f32 - cx).hypot(y as f32 - cy);
        let factor = VIGNETTE_STRENGTH.mul_add(-(dist / max_dist), 1.0);
        for c in &mut px.0[..3] {
            *c = to_channel(f32::from(*c) * factor);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    fn single(px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(1, 1, Rgba(px))
    }

    fn run(px: [u8; 4], filter: Filter) -> [u8; 4] {
        apply_filter(&single(px), filter).get_pixel(0, 0).0
    }

    #[test]
    fn none_is_noop() {
        let img = RgbaImage::from_fn(4, 4, |x, y| Rgba([x as u8 * 40, y as u8 * 50, 7, 200]));
        assert_eq!(apply_filter(&img, Filter::None), img);
    }

    #[test]
    fn transparent_pixels_are_never_touched() {
        let img = RgbaImage::from_fn(6, 6, |x, _| {
            if x < 3 {
                Rgba([12, 200, 90, 0])
            } else {
                Rgba([12, 200, 90, 255])
            }
        });
        for filter in Filter::ALL {
            let out = apply_filter(&img, filter);
            for (x, y, px) in out.enumerate_pixels() {
                if x < 3 {
                    assert_eq!(px.0, [12, 200, 90, 0], "{filter} touched ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn alpha_is_preserved() {
        for filter in Filter::ALL {
            assert_eq!(run([100, 150, 200, 77], filter)[3], 77, "{filter}");
        }
    }

    #[test]
    fn grayscale_of_gray_is_unchanged() {
        for v in [0, 1, 64, 128, 200, 254, 255] {
            assert_eq!(run([v, v, v, 255], Filter::Grayscale), [v, v, v, 255]);
        }
    }

    #[test]
    fn grayscale_uses_luminance_weights() {
        assert_eq!(run([255, 0, 0, 255], Filter::Grayscale), [76, 76, 76, 255]);
        assert_eq!(run([0, 255, 0, 255], Filter::Grayscale), [150, 150, 150, 255]);
        assert_eq!(run([0, 0, 255, 255], Filter::Grayscale), [29, 29, 29, 255]);
    }

    #[test]
    fn sepia_clamps_white() {
        assert_eq!(run([255, 255, 255, 255], Filter::Sepia), [255, 255, 239, 255]);
    }

    #[test]
    fn brightness_adds_thirty_and_clamps() {
        assert_eq!(run([10, 230, 250, 255], Filter::Brightness), [40, 255, 255, 255]);
    }

    #[test]
    fn warm_shifts_channels() {
        assert_eq!(run([100, 100, 10, 255], Filter::Warm), [125, 110, 0, 255]);
    }

    #[test]
    fn vibrant_skips_perfect_gray() {
        assert_eq!(run([90, 90, 90, 255], Filter::Vibrant), [90, 90, 90, 255]);
    }

    #[test]
    fn vibrant_pushes_channels_away_from_mean() {
        // mean = 100; deltas -20, 0, +20 become -28, 0, +28.
        assert_eq!(run([80, 100, 120, 255], Filter::Vibrant), [72, 100, 128, 255]);
    }

    #[test]
    fn japanese_brightens_flattens_and_cools() {
        // +40 -> (140, 140, 140); flat stays; cool -> (130, 140, 155).
        assert_eq!(run([100, 100, 100, 255], Filter::Japanese), [130, 140, 155, 255]);
    }

    #[test]
    fn cinematic_vignette_darkens_corners_more_than_center() {
        let img = RgbaImage::from_pixel(21, 21, Rgba([200, 200, 200, 255]));
        let out = apply_filter(&img, Filter::Cinematic);
        let center = out.get_pixel(10, 10).0;
        let corner = out.get_pixel(0, 0).0;
        for c in 0..3 {
            assert!(
                corner[c] < center[c],
                "channel {c}: corner {corner:?} not darker than center {center:?}"
            );
        }
    }

    #[test]
    fn cinematic_split_tone_depends_on_luminance() {
        // A 1x1 buffer is vignetted uniformly; only channel order matters.
        let dark = run([40, 40, 40, 255], Filter::Cinematic);
        let bright = run([220, 220, 220, 255], Filter::Cinematic);
        assert!(dark[2] > dark[0], "shadows lean blue: {dark:?}");
        assert!(bright[0] > bright[2], "highlights lean orange: {bright:?}");
    }

    #[test]
    fn filters_compound_when_reapplied() {
        let once = run([100, 100, 100, 255], Filter::Brightness);
        let twice = apply_filter(&single(once), Filter::Brightness).get_pixel(0, 0).0;
        assert_eq!(twice, [160, 160, 160, 255]);
    }

    #[test]
    fn names_parse_and_display() {
        for filter in Filter::ALL {
            assert_eq!(filter.to_string().parse::<Filter>().unwrap(), filter);
        }
        assert_eq!("Sepia".parse::<Filter>().unwrap(), Filter::Sepia);
        assert!("posterize".parse::<Filter>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Filter::Cinematic).unwrap();
        assert_eq!(json, r#""cinematic""#);
    }
}
