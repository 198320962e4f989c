//! Stride-aligned letterbox preprocessing
//!
//! The model expects BGR channel order and input dimensions that differ
//! from each target dimension by a multiple of the stride. The image is
//! uniformly scaled (aspect ratio preserved), then padded on all four
//! sides with the YOLO border value.

use image::{imageops, RgbImage};
use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};

/// Constant border value applied to all three channels when padding
pub const PAD_VALUE: u8 = 114;

/// Target input size for the letterbox transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSize {
    /// Same target for both dimensions
    Square(u32),
    /// Explicit (height, width) pair
    Exact { height: u32, width: u32 },
}

impl TargetSize {
    fn dims(self) -> (u32, u32) {
        match self {
            TargetSize::Square(size) => (size, size),
            TargetSize::Exact { height, width } => (height, width),
        }
    }
}

/// Result of the letterbox transform: padded BGR pixels plus final dimensions
#[derive(Debug, Clone)]
pub struct Letterboxed {
    /// Padded pixels, H x W x 3 in BGR channel order
    pub pixels: Array3<u8>,
    pub height: u32,
    pub width: u32,
}

/// Resize and pad an RGB image for model input.
///
/// The scale ratio is `min(target_h / h, target_w / w)`, so the image is
/// never distorted. Padding per dimension is `(target - resized) % stride`,
/// split evenly with the extra pixel on the bottom/right. The output is
/// therefore `resized + pad` per dimension, not necessarily the full target.
pub fn letterbox(image: &RgbImage, target: TargetSize, stride: u32) -> Letterboxed {
    let (target_h, target_w) = target.dims();
    let (w, h) = image.dimensions();

    // BGR channel order is the model's contract; swap before resizing.
    let mut bgr = RgbImage::new(w, h);
    for (dst, src) in bgr.pixels_mut().zip(image.pixels()) {
        dst.0 = [src.0[2], src.0[1], src.0[0]];
    }

    let r = f32::min(target_h as f32 / h as f32, target_w as f32 / w as f32);
    let resized_h = (h as f32 * r).round() as u32;
    let resized_w = (w as f32 * r).round() as u32;

    let resized = imageops::resize(&bgr, resized_w, resized_h, imageops::FilterType::Triangle);

    let pad_h = target_h.saturating_sub(resized_h) % stride;
    let pad_w = target_w.saturating_sub(resized_w) % stride;
    let top = pad_h / 2;
    let left = pad_w / 2;
    let out_h = resized_h + pad_h;
    let out_w = resized_w + pad_w;

    let mut pixels = Array3::from_elem((out_h as usize, out_w as usize, 3), PAD_VALUE);
    for (x, y, px) in resized.enumerate_pixels() {
        let yy = (y + top) as usize;
        let xx = (x + left) as usize;
        pixels[[yy, xx, 0]] = px.0[0];
        pixels[[yy, xx, 1]] = px.0[1];
        pixels[[yy, xx, 2]] = px.0[2];
    }

    Letterboxed {
        pixels,
        height: out_h,
        width: out_w,
    }
}

/// Convert a letterboxed image to the model's input layout: NCHW, batch 1,
/// f32 samples normalized to [0, 1]
pub fn to_input_tensor(boxed: &Letterboxed) -> Array4<f32> {
    let h = boxed.height as usize;
    let w = boxed.width as usize;

    let mut tensor = Array4::zeros((1, 3, h, w));
    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                tensor[[0, c, y, x]] = f32::from(boxed.pixels[[y, x, c]]) / 255.0;
            }
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(rgb))
    }

    #[test]
    fn test_letterbox_dimensions_are_stride_aligned() {
        // 200x100 at square target 320: r = 1.6, resized 320x160, and 160 is
        // already a stride multiple so no height padding is added.
        let img = solid_image(200, 100, [255, 255, 255]);
        let boxed = letterbox(&img, TargetSize::Square(320), 32);

        assert_eq!((boxed.width, boxed.height), (320, 160));
        assert_eq!((320 - boxed.height) % 32, 0);
        assert_eq!((320 - boxed.width) % 32, 0);
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 123x77 at square target 256: r = 256/123, resized 256x160, and
        // both pads happen to be zero, so the output dims expose the resize.
        let img = solid_image(123, 77, [10, 10, 10]);
        let boxed = letterbox(&img, TargetSize::Square(256), 32);

        assert_eq!((boxed.width, boxed.height), (256, 160));

        let resized_ratio = f64::from(boxed.width) / f64::from(boxed.height);
        let orig_ratio = 123.0 / 77.0;
        // Within rounding of one pixel on the shorter dimension.
        assert!((resized_ratio - orig_ratio).abs() < 256.0 / 160.0 - 256.0 / 161.0);
    }

    #[test]
    fn test_letterbox_single_pixel_image() {
        let img = solid_image(1, 1, [0, 0, 0]);
        let boxed = letterbox(&img, TargetSize::Square(32), 32);

        assert_eq!((boxed.width, boxed.height), (32, 32));
    }

    #[test]
    fn test_letterbox_no_padding_when_target_matches() {
        let img = solid_image(64, 64, [255, 255, 255]);
        let boxed = letterbox(&img, TargetSize::Square(64), 32);

        assert_eq!((boxed.width, boxed.height), (64, 64));
        // No border anywhere: every sample comes from the (white) image.
        assert!(boxed.pixels.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_letterbox_pad_split_and_value() {
        // 64x20 at square target 64: no resize (r = 1), pad_h = 44 % 32 = 12,
        // split 6 above and 6 below.
        let img = solid_image(64, 20, [255, 255, 255]);
        let boxed = letterbox(&img, TargetSize::Square(64), 32);

        assert_eq!((boxed.width, boxed.height), (64, 32));
        for y in 0..6 {
            assert_eq!(boxed.pixels[[y, 0, 0]], PAD_VALUE);
        }
        for y in 6..26 {
            assert_eq!(boxed.pixels[[y, 0, 0]], 255);
        }
        for y in 26..32 {
            assert_eq!(boxed.pixels[[y, 0, 0]], PAD_VALUE);
        }
    }

    #[test]
    fn test_letterbox_odd_padding_extra_pixel_after() {
        // pad_h = (64 - 21) % 32 = 11: 5 above, 6 below.
        let img = solid_image(64, 21, [255, 255, 255]);
        let boxed = letterbox(&img, TargetSize::Square(64), 32);

        assert_eq!(boxed.height, 32);
        assert_eq!(boxed.pixels[[4, 0, 0]], PAD_VALUE);
        assert_eq!(boxed.pixels[[5, 0, 0]], 255);
        assert_eq!(boxed.pixels[[25, 0, 0]], 255);
        assert_eq!(boxed.pixels[[26, 0, 0]], PAD_VALUE);
    }

    #[test]
    fn test_letterbox_swaps_to_bgr() {
        let img = solid_image(32, 32, [10, 20, 30]);
        let boxed = letterbox(&img, TargetSize::Square(32), 32);

        assert_eq!(boxed.pixels[[16, 16, 0]], 30);
        assert_eq!(boxed.pixels[[16, 16, 1]], 20);
        assert_eq!(boxed.pixels[[16, 16, 2]], 10);
    }

    #[test]
    fn test_letterbox_exact_target() {
        let img = solid_image(100, 50, [0, 0, 0]);
        let boxed = letterbox(&img, TargetSize::Exact { height: 64, width: 128 }, 32);

        // r = min(64/50, 128/100) = 1.28, resized 128x64, no padding.
        assert_eq!((boxed.width, boxed.height), (128, 64));
    }

    #[test]
    fn test_input_tensor_layout_and_normalization() {
        let img = solid_image(64, 20, [255, 0, 0]);
        let boxed = letterbox(&img, TargetSize::Square(64), 32);
        let tensor = to_input_tensor(&boxed);

        assert_eq!(tensor.shape(), &[1, 3, 32, 64]);
        assert!(tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));

        // Border rows carry the normalized pad value in every channel.
        let pad = f32::from(PAD_VALUE) / 255.0;
        assert!((tensor[[0, 0, 0, 0]] - pad).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] - pad).abs() < 1e-6);

        // Image rows are BGR: red lands in the last channel.
        assert!((tensor[[0, 0, 16, 32]] - 0.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 16, 32]] - 1.0).abs() < 1e-6);
    }
}
