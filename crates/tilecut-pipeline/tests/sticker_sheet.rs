//! Integration test: decode a sticker sheet, slice it, and drain the queue.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Cursor;

use image::{ImageFormat, Rgba};
use tilecut_pipeline::{
    GridLines, PercentRect, ProcessConfig, Rgb, RgbaImage, SliceQueue, SliceStatus, decode_image,
    run_to_completion, slice_image,
};

/// 3x2 sheet of 30px cells on white, each with a colored 10px square
/// and a white "eye" pixel in the middle of the square.
fn sheet_png() -> Vec<u8> {
    let sheet = RgbaImage::from_fn(90, 60, |x, y| {
        let (cx, cy) = (x % 30, y % 30);
        if (10..20).contains(&cx) && (10..20).contains(&cy) {
            if cx == 15 && cy == 15 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([200, 40, u8::try_from(x / 30 * 60).unwrap(), 255])
            }
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let mut bytes = Vec::new();
    sheet
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn sticker_sheet_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();

    let source = decode_image(&sheet_png()).expect("decode should succeed");
    let slices = slice_image(&source, PercentRect::FULL, &GridLines::uniform(3, 2), 1);
    assert_eq!(slices.len(), 6);
    assert!(slices.iter().all(|s| s.original.dimensions() == (30, 30)));

    let config = ProcessConfig {
        remove_white: true,
        add_stroke: true,
        stroke_width: 2,
        stroke_color: Rgb::BLACK,
        ..ProcessConfig::default()
    };
    let mut queue = SliceQueue::new(config);
    queue.regenerate(slices);
    assert_eq!(queue.count(SliceStatus::Pending), 6);

    assert_eq!(run_to_completion(&mut queue), 6);
    assert!(queue.is_settled());

    let pad = tilecut_pipeline::stroke::padding(2);
    for slice in queue.snapshot().iter() {
        assert_eq!(slice.status, SliceStatus::Done, "slice {}", slice.id);
        let out = slice.processed.as_ref().unwrap();
        assert_eq!(out.dimensions(), (30 + 2 * pad, 30 + 2 * pad));
        // Background gone, eye kept.
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
        assert_eq!(out.get_pixel(15 + pad, 15 + pad).0, [255, 255, 255, 255]);
        // Outline just outside the square.
        let edge = out.get_pixel(9 + pad, 15 + pad).0;
        assert!(edge[3] > 200 && edge[0] < 40, "slice {}: {edge:?}", slice.id);
    }
}

#[test]
fn cropped_sheet_only_cuts_inside_crop() {
    let source = decode_image(&sheet_png()).unwrap();
    // Right two thirds of the sheet, top half.
    let crop = PercentRect::new(100.0 / 3.0, 0.0, 200.0 / 3.0, 50.0);
    let slices = slice_image(&source, crop, &GridLines::uniform(2, 1), 1);
    assert_eq!(slices.len(), 2);
    assert_eq!(slices[0].rect.x, 30);
    assert_eq!(slices[1].rect.x, 60);
    assert!(slices.iter().all(|s| s.rect.height == 30));
}

#[test]
fn garbage_bytes_fail_to_decode() {
    assert!(decode_image(b"definitely not an image").is_err());
    assert!(decode_image(&[]).is_err());
}
