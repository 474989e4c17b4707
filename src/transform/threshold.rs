//! Binarization: global (Otsu) and local (Gaussian-weighted adaptive)
//! thresholds.
//!
//! Both produce two-level images where a pixel becomes 255 when it is
//! strictly brighter than its threshold and 0 otherwise.

use super::filter;
use image::{GrayImage, Luma};
use imageproc::contrast::{ThresholdType, threshold};

/// Otsu level for a grayscale image. 0 for empty images.
pub fn otsu_level(image: &GrayImage) -> u8 {
    if image.width() == 0 || image.height() == 0 {
        return 0;
    }
    imageproc::contrast::otsu_level(image)
}

/// Apply a fixed global threshold.
pub fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    threshold(image, level, ThresholdType::Binary)
}

/// Threshold each pixel against the Gaussian-weighted mean of its
/// `block_size` x `block_size` neighborhood minus `c`.
///
/// The mean is rounded to an integer before the comparison. Borders are
/// replicated.
pub fn adaptive_threshold(image: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let mean = filter::gaussian_local_mean(image, block_size);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let local = mean.get_pixel(x, y).0[0].round() as i32;
        let value = i32::from(image.get_pixel(x, y).0[0]);
        Luma([if value > local - c { 255 } else { 0 }])
    })
}
