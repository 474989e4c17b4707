//! Smoothing filters used by the denoise and adaptive threshold steps.

use image::{GrayImage, ImageBuffer, Luma, Pixel};
use imageproc::filter::{Kernel, separable_filter_equal};

/// 1-2-1 Gaussian, row-major. Weights are exact in `f32`.
const GAUSSIAN_3X3: [f32; 9] = [
    0.0625, 0.125, 0.0625, //
    0.125, 0.25, 0.125, //
    0.0625, 0.125, 0.0625,
];

/// Blur every channel with a fixed 3x3 Gaussian kernel.
///
/// Borders are padded by continuity, so a uniform image stays uniform.
/// Results are rounded to the nearest integer.
pub fn gaussian_blur_3x3<P>(image: &ImageBuffer<P, Vec<u8>>) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    Kernel::new(&GAUSSIAN_3X3, 3, 3).filter(image, |channel, acc: f32| {
        *channel = acc.round().clamp(0.0, 255.0) as u8;
    })
}

/// Normalized 1D Gaussian weights for a window of `size` taps.
///
/// A non-positive `sigma` is derived from the size the way OpenCV does:
/// `0.3 * ((size - 1) / 2 - 1) + 0.8`, which is 2.0 for 11 taps.
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let size = size.max(1);
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (size / 2) as f32;
    let mut weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);
    weights
}

/// Gaussian-weighted local mean of each pixel over a `size` x `size` window.
///
/// Computed in `f32` with replicated borders.
pub fn gaussian_local_mean(image: &GrayImage, size: u32) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    let float = ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Luma([f32::from(image.get_pixel(x, y).0[0])])
    });
    separable_filter_equal(&float, &gaussian_kernel(size, 0.0))
}
