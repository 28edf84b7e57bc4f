//! Conversions between image files and NHWC `f32` tensors.
//!
//! Pixel tensors hold raw intensities in `[0, 255]` unless stated otherwise.

use std::path::Path;

use image::{
    error::{ParameterError, ParameterErrorKind},
    imageops::{self, FilterType},
    ColorType, DynamicImage, GrayImage, ImageBuffer, ImageError, ImageResult, RgbImage,
};
use ndarray::{s, stack, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Axis, ShapeError};

fn dimension_mismatch() -> ImageError {
    ImageError::Parameter(ParameterError::from_kind(
        ParameterErrorKind::DimensionMismatch,
    ))
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0., 255.) as u8
}

fn to_array(raw: Vec<u8>, height: u32, width: u32, channels: usize) -> ImageResult<Array3<f32>> {
    let data = raw.into_iter().map(f32::from).collect();
    Array3::from_shape_vec((height as usize, width as usize, channels), data)
        .map_err(|_| dimension_mismatch())
}

/// Reads an image keeping grey images single-channel, everything else becomes RGB.
pub fn imread(path: &Path) -> ImageResult<Array3<f32>> {
    let img = image::open(path)?;

    match img.color() {
        ColorType::L8 | ColorType::L16 => {
            let luma = img.to_luma8();
            let (w, h) = luma.dimensions();
            to_array(luma.into_raw(), h, w, 1)
        }
        _ => rgb_array(img.to_rgb8()),
    }
}

/// Reads an image as three channels regardless of how it was stored.
pub fn imread_rgb(path: &Path) -> ImageResult<Array3<f32>> {
    rgb_array(image::open(path)?.to_rgb8())
}

fn rgb_array(rgb: RgbImage) -> ImageResult<Array3<f32>> {
    let (w, h) = rgb.dimensions();
    to_array(rgb.into_raw(), h, w, 3)
}

/// Writes a `(h, w, 1)` or `(h, w, 3)` tensor.
pub fn imwrite(path: &Path, img: ArrayView3<'_, f32>) -> ImageResult<()> {
    let (h, w, c) = img.dim();
    let raw: Vec<u8> = img.iter().copied().map(to_u8).collect();

    let dynamic = match c {
        1 => GrayImage::from_raw(w as u32, h as u32, raw).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(w as u32, h as u32, raw).map(DynamicImage::ImageRgb8),
        _ => None,
    };

    dynamic.ok_or_else(dimension_mismatch)?.save(path)
}

/// Converts a single-channel map into an 8-bit grey image, multiplying every value by `scale`.
pub fn gray_image(map: ArrayView2<'_, f32>, scale: f32) -> ImageResult<GrayImage> {
    let (h, w) = map.dim();
    let raw = map.iter().map(|&v| to_u8(v * scale)).collect();
    ImageBuffer::from_raw(w as u32, h as u32, raw).ok_or_else(dimension_mismatch)
}

/// The size of a `(width, height)` image scaled by `factor`, truncated and never below one.
pub fn scaled_dims(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let scale = |d: u32| ((d as f64 * factor) as u32).max(1);
    (scale(width), scale(height))
}

/// Bilinearly rescales an RGB tensor by `factor`, going through 8-bit pixels.
pub fn resize_rgb(img: ArrayView3<'_, f32>, factor: f64) -> ImageResult<Array3<f32>> {
    let (h, w, _) = img.dim();
    let raw = img.iter().copied().map(to_u8).collect();
    let rgb: RgbImage =
        ImageBuffer::from_raw(w as u32, h as u32, raw).ok_or_else(dimension_mismatch)?;

    let (nw, nh) = scaled_dims(w as u32, h as u32, factor);
    rgb_array(imageops::resize(&rgb, nw, nh, FilterType::Triangle))
}

/// Bilinearly rescales a grey image by `factor`.
pub fn resize_gray(img: &GrayImage, factor: f64) -> GrayImage {
    let (nw, nh) = scaled_dims(img.width(), img.height(), factor);
    imageops::resize(img, nw, nh, FilterType::Triangle)
}

/// Maps `[0, 255]` pixels into `[-1, 1]`.
pub fn normalize(img: &Array3<f32>) -> Array3<f32> {
    img.mapv(|v| v / 127.5 - 1.)
}

/// Stacks same-shaped `(h, w, c)` images into a `(n, h, w, c)` batch.
pub fn stack_batch(items: &[Array3<f32>]) -> Result<Array4<f32>, ShapeError> {
    let views: Vec<ArrayView3<'_, f32>> = items.iter().map(|a| a.view()).collect();
    stack(Axis(0), &views)
}

/// Lays a batch out on a `rows x cols` grid, row-major. Unused cells stay black.
///
/// # Returns
/// A dimension mismatch error if the batch doesn't fit the grid.
pub fn img_tile(batch: ArrayView4<'_, f32>, grid: (usize, usize)) -> ImageResult<Array3<f32>> {
    let (n, h, w, c) = batch.dim();
    let (rows, cols) = grid;

    if n > rows * cols {
        return Err(dimension_mismatch());
    }

    let mut tile = Array3::zeros((rows * h, cols * w, c));
    for (i, img) in batch.axis_iter(Axis(0)).enumerate() {
        let (r, col) = (i / cols, i % cols);
        tile.slice_mut(s![r * h..(r + 1) * h, col * w..(col + 1) * w, ..])
            .assign(&img);
    }

    Ok(tile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use tempfile::tempdir;

    #[test]
    fn tile_places_items_row_major() {
        let batch = Array4::from_shape_fn((3, 2, 2, 1), |(i, ..)| i as f32 + 1.);
        let tile = img_tile(batch.view(), (2, 2)).unwrap();

        assert_eq!(tile.dim(), (4, 4, 1));
        assert_eq!(tile[[0, 0, 0]], 1.);
        assert_eq!(tile[[1, 3, 0]], 2.);
        assert_eq!(tile[[3, 1, 0]], 3.);
        assert_eq!(tile[[3, 3, 0]], 0.);
    }

    #[test]
    fn stack_batch_keeps_order() {
        let items: Vec<_> = (0..3).map(|i| Array3::from_elem((2, 3, 1), i as f32)).collect();
        let batch = stack_batch(&items).unwrap();

        assert_eq!(batch.dim(), (3, 2, 3, 1));
        assert_eq!(batch[[2, 1, 2, 0]], 2.);
        assert!(stack_batch(&[Array3::zeros((2, 2, 1)), Array3::zeros((2, 2, 3))]).is_err());
    }

    #[test]
    fn tile_rejects_overflowing_batch() {
        let batch = Array4::<f32>::zeros((5, 2, 2, 3));
        assert!(img_tile(batch.view(), (2, 2)).is_err());
    }

    #[test]
    fn write_then_read_keeps_channels() {
        let dir = tempdir().unwrap();

        let grey = Array3::from_shape_fn((3, 4, 1), |(r, c, _)| (r * 4 + c) as f32 * 10.);
        let grey_path = dir.path().join("grey.png");
        imwrite(&grey_path, grey.view()).unwrap();
        assert_eq!(imread(&grey_path).unwrap(), grey);

        let rgb = Array3::from_shape_fn((2, 3, 3), |(r, c, ch)| (r + c + ch) as f32);
        let rgb_path = dir.path().join("rgb.png");
        imwrite(&rgb_path, rgb.view()).unwrap();
        assert_eq!(imread(&rgb_path).unwrap(), rgb);
        assert_eq!(imread_rgb(&grey_path).unwrap().dim(), (3, 4, 3));
    }

    #[test]
    fn scaled_dims_truncate() {
        assert_eq!(scaled_dims(101, 50, 0.5), (50, 25));
        assert_eq!(scaled_dims(3, 3, 0.1), (1, 1));
        assert_eq!(scaled_dims(10, 20, 2.0), (20, 40));
    }

    #[test]
    fn resize_rgb_changes_spatial_dims_only() {
        let img = Array3::from_elem((8, 6, 3), 100.);
        let resized = resize_rgb(img.view(), 0.5).unwrap();
        assert_eq!(resized.dim(), (4, 3, 3));
        assert!(resized.iter().all(|&v| (v - 100.).abs() <= 1.));
    }

    #[test]
    fn normalize_range() {
        let img = Array3::from_shape_vec((1, 3, 1), vec![0., 127.5, 255.]).unwrap();
        let n = normalize(&img);
        assert_eq!(n.as_slice().unwrap(), &[-1., 0., 1.]);
    }
}
