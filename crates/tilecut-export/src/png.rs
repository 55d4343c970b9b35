//! PNG encoding and file naming for slices.
//!
//! Names follow `{stem}_r{row}_c{col}.png` with 1-based row and column
//! numbers, zero-padded to the digit count of the largest row/column in
//! the set so the files sort in grid order.

use std::io::Cursor;

use image::ImageFormat;
use tilecut_pipeline::{RgbaImage, Slice};

use crate::ExportError;

/// One encoded slice, ready to be written or bundled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// File name (no directory).
    pub name: String,
    /// PNG bytes.
    pub bytes: Vec<u8>,
}

/// Encode a buffer as PNG.
///
/// # Errors
///
/// Returns [`ExportError::Encode`] if the encoder fails (for example on
/// a zero-area buffer).
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// File name for `slice` in a grid of `rows` x `columns`.
#[must_use]
pub fn slice_file_name(stem: &str, slice: &Slice, rows: usize, columns: usize) -> String {
    let row_digits = digits(rows.max(slice.row + 1));
    let col_digits = digits(columns.max(slice.column + 1));
    format!(
        "{stem}_r{:0row_digits$}_c{:0col_digits$}.png",
        slice.row + 1,
        slice.column + 1,
    )
}

/// Encode every slice, using the processed buffer when there is one and
/// the original otherwise.
///
/// # Errors
///
/// Returns the first [`ExportError::Encode`] encountered.
pub fn export_slices(stem: &str, slices: &[Slice]) -> Result<Vec<ExportedFile>, ExportError> {
    let (rows, columns) = grid_size(slices);
    slices
        .iter()
        .map(|slice| {
            Ok(ExportedFile {
                name: slice_file_name(stem, slice, rows, columns),
                bytes: encode_png(slice.output())?,
            })
        })
        .collect()
}

/// Rows and columns spanned by `slices`.
pub(crate) fn grid_size(slices: &[Slice]) -> (usize, usize) {
    slices.iter().fold((0, 0), |(rows, columns), s| {
        (rows.max(s.row + 1), columns.max(s.column + 1))
    })
}

const fn digits(n: usize) -> usize {
    let mut n = n;
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use image::Rgba;
    use tilecut_pipeline::{PixelRect, SliceId, SliceStatus};

    use super::*;

    fn slice(index: usize, row: usize, column: usize) -> Slice {
        Slice {
            id: SliceId {
                generation: 0,
                index,
            },
            row,
            column,
            rect: PixelRect::new(0, 0, 3, 2),
            original: Arc::new(RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]))),
            processed: None,
            status: SliceStatus::Idle,
            error: None,
        }
    }

    #[test]
    fn names_are_one_based() {
        assert_eq!(slice_file_name("sheet", &slice(0, 0, 0), 2, 3), "sheet_r1_c1.png");
        assert_eq!(slice_file_name("sheet", &slice(5, 1, 2), 2, 3), "sheet_r2_c3.png");
    }

    #[test]
    fn names_are_padded_to_grid_width() {
        assert_eq!(slice_file_name("s", &slice(0, 0, 4), 1, 12), "s_r1_c05.png");
        assert_eq!(slice_file_name("s", &slice(0, 99, 0), 100, 1), "s_r100_c1.png");
        assert_eq!(slice_file_name("s", &slice(0, 8, 0), 100, 1), "s_r009_c1.png");
    }

    #[test]
    fn digits_counts_decimal_places() {
        assert_eq!(digits(0), 1);
        assert_eq!(digits(9), 1);
        assert_eq!(digits(10), 2);
        assert_eq!(digits(999), 3);
        assert_eq!(digits(1000), 4);
    }

    #[test]
    fn encoded_png_decodes_back() {
        let img = RgbaImage::from_fn(5, 4, |x, y| Rgba([x as u8 * 50, y as u8 * 60, 7, 128]));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        let back = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(back, img);
    }

    #[test]
    fn export_prefers_processed_buffer() {
        let mut processed = slice(1, 0, 1);
        processed.processed = Some(Arc::new(RgbaImage::from_pixel(7, 7, Rgba([1, 2, 3, 4]))));
        let files = export_slices("x", &[slice(0, 0, 0), processed]).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "x_r1_c1.png");
        assert_eq!(files[1].name, "x_r1_c2.png");
        let first = image::load_from_memory(&files[0].bytes).unwrap();
        let second = image::load_from_memory(&files[1].bytes).unwrap();
        assert_eq!((first.width(), first.height()), (3, 2));
        assert_eq!((second.width(), second.height()), (7, 7));
    }

    #[test]
    fn grid_size_spans_all_slices() {
        let slices = [slice(0, 0, 0), slice(1, 0, 1), slice(2, 2, 0)];
        assert_eq!(grid_size(&slices), (3, 2));
        assert_eq!(grid_size(&[]), (0, 0));
    }
}
