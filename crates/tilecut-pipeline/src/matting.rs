//! Background removal by border-seeded flood fill.
//!
//! Every border pixel that looks like background (near-white or nearly
//! transparent) seeds a breadth-first fill over 4-connected neighbors.
//! Each reached pixel gets alpha 0; RGB is left as is. White regions
//! that do not touch the border through background pixels (eyes,
//! highlights, text counters) are never reached and stay opaque.
//!
//! Edges are binary: a pixel is either removed or untouched. There is
//! no soft matte.

use std::collections::VecDeque;

use crate::types::RgbaImage;

/// Pixels with alpha below this count as background regardless of color.
pub const ALPHA_TRANSPARENT_THRESHOLD: u8 = 20;

/// Opaque pixels whose R, G, and B all exceed this count as white background.
pub const WHITE_THRESHOLD: u8 = 240;

/// Whether a pixel can be traversed by the background fill.
#[must_use]
pub const fn is_background(px: [u8; 4]) -> bool {
    let [r, g, b, a] = px;
    a < ALPHA_TRANSPARENT_THRESHOLD
        || (r > WHITE_THRESHOLD && g > WHITE_THRESHOLD && b > WHITE_THRESHOLD)
}

/// Remove the border-connected background, returning a new buffer.
#[must_use = "returns the matted buffer"]
pub fn remove_background(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    remove_background_in_place(&mut out);
    out
}

/// Remove the border-connected background in place.
///
/// Returns the number of pixels that were reached by the fill (and
/// therefore now have alpha 0). Runs in `O(width * height)` with one
/// visited flag per pixel. An image with no background pixels on its
/// border is left unchanged.
pub fn remove_background_in_place(image: &mut RgbaImage) -> usize {
    let (w, h) = (image.width() as usize, image.height() as usize);
    if w == 0 || h == 0 {
        return 0;
    }

    let mut visited = vec![false; w * h];
    let mut queue = VecDeque::new();

    {
        let data: &[u8] = image.as_raw();
        let traversable = |idx: usize| {
            let o = idx * 4;
            is_background([data[o], data[o + 1], data[o + 2], data[o + 3]])
        };
        let mut seed = |idx: usize| {
            if !visited[idx] && traversable(idx) {
                visited[idx] = true;
                queue.push_back(idx);
            }
        };

        for x in 0..w {
            seed(x);
            seed((h - 1) * w + x);
        }
        for y in 0..h {
            seed(y * w);
            seed(y * w + w - 1);
        }
    }

    let data: &mut [u8] = image;
    let mut removed = 0;

    while let Some(idx) = queue.pop_front() {
        data[idx * 4 + 3] = 0;
        removed += 1;

        let x = idx % w;
        let neighbors = [
            // Left/right steps never cross a row boundary.
            (x > 0).then(|| idx - 1),
            (x + 1 < w).then(|| idx + 1),
            idx.checked_sub(w),
            Some(idx + w).filter(|&n| n < w * h),
        ];

        for n in neighbors.into_iter().flatten() {
            if visited[n] {
                continue;
            }
            let o = n * 4;
            if is_background([data[o], data[o + 1], data[o + 2], data[o + 3]]) {
                visited[n] = true;
                queue.push_back(n);
            }
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const RED: Rgba<u8> = Rgba([200, 30, 30, 255]);

    /// `size`x`size` image: a `border`-pixel white frame around red.
    fn framed(size: u32, border: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if x < border || y < border || x >= size - border || y >= size - border {
                WHITE
            } else {
                RED
            }
        })
    }

    #[test]
    fn fully_white_image_is_fully_removed() {
        let img = RgbaImage::from_pixel(9, 6, WHITE);
        let out = remove_background(&img);
        assert!(out.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn removed_pixels_keep_rgb() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([250, 245, 241, 255]));
        let out = remove_background(&img);
        assert!(out.pixels().all(|p| p.0 == [250, 245, 241, 0]));
    }

    #[test]
    fn one_pixel_border_is_removed_interior_untouched() {
        let img = framed(10, 1);
        let mut out = img.clone();
        let removed = remove_background_in_place(&mut out);

        assert_eq!(removed, 10 * 10 - 8 * 8);
        for (x, y, px) in out.enumerate_pixels() {
            let on_border = x == 0 || y == 0 || x == 9 || y == 9;
            if on_border {
                assert_eq!(px.0[3], 0, "border pixel ({x}, {y}) should be removed");
            } else {
                assert_eq!(*px, RED, "interior pixel ({x}, {y}) should be untouched");
            }
        }
    }

    #[test]
    fn no_background_on_border_is_noop() {
        let img = RgbaImage::from_fn(8, 8, |x, y| {
            if (2..6).contains(&x) && (2..6).contains(&y) {
                WHITE
            } else {
                RED
            }
        });
        let mut out = img.clone();
        assert_eq!(remove_background_in_place(&mut out), 0);
        assert_eq!(out, img);
    }

    #[test]
    fn enclosed_white_region_is_preserved() {
        // White frame, red ring, white "eye" in the middle.
        let img = RgbaImage::from_fn(11, 11, |x, y| {
            let edge = x == 0 || y == 0 || x == 10 || y == 10;
            let eye = (4..7).contains(&x) && (4..7).contains(&y);
            if edge || eye { WHITE } else { RED }
        });
        let out = remove_background(&img);
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
        assert_eq!(*out.get_pixel(5, 5), WHITE);
        assert_eq!(*out.get_pixel(2, 2), RED);
    }

    #[test]
    fn transparent_pixels_are_traversable() {
        // Transparent border connects to an inner white pocket.
        let img = RgbaImage::from_fn(7, 7, |x, y| {
            let edge = x == 0 || y == 0 || x == 6 || y == 6;
            if edge {
                Rgba([0, 0, 0, 5])
            } else if x == 1 && y == 3 {
                WHITE
            } else {
                RED
            }
        });
        let out = remove_background(&img);
        assert_eq!(out.get_pixel(1, 3).0[3], 0);
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
        assert_eq!(*out.get_pixel(3, 3), RED);
    }

    #[test]
    fn fill_is_four_connected() {
        // Corner pixel is white background; (1, 1) is white but touches it
        // only diagonally, so it must survive.
        let img = RgbaImage::from_fn(5, 5, |x, y| {
            if (x, y) == (0, 0) || (x, y) == (1, 1) {
                WHITE
            } else {
                RED
            }
        });
        let out = remove_background(&img);
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
        assert_eq!(*out.get_pixel(1, 1), WHITE);
    }

    #[test]
    fn matting_is_idempotent() {
        let once = remove_background(&framed(12, 2));
        let twice = remove_background(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn near_white_threshold_is_exclusive() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([240, 255, 255, 255]));
        assert_eq!(remove_background(&img), img);
    }

    #[test]
    fn empty_image_is_noop() {
        let mut img = RgbaImage::new(0, 0);
        assert_eq!(remove_background_in_place(&mut img), 0);
    }
}
