//! Image transform chain that prepares a captured frame for recognition.
//!
//! The order is fixed: crop → grayscale → denoise → threshold → invert →
//! single-channel collapse.

pub mod filter;
pub mod threshold;

use crate::defaults;
use crate::error::{MeterError, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use std::fmt;
use std::str::FromStr;

/// Binarization algorithm applied after denoising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdMode {
    /// Leave intensities unchanged.
    None,
    /// Global threshold chosen automatically from the histogram.
    #[default]
    Otsu,
    /// Gaussian-weighted local threshold per neighborhood.
    Adaptive,
}

impl FromStr for ThresholdMode {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ThresholdMode::None),
            "otsu" => Ok(ThresholdMode::Otsu),
            "adaptive" => Ok(ThresholdMode::Adaptive),
            other => Err(MeterError::UnknownThreshold {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ThresholdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThresholdMode::None => "none",
            ThresholdMode::Otsu => "otsu",
            ThresholdMode::Adaptive => "adaptive",
        };
        f.write_str(name)
    }
}

/// Rectangular region of interest in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    /// Build a region from signed `[x, y, w, h]` values as found in config files.
    pub fn from_signed(values: [i64; 4]) -> Result<Self> {
        let [x, y, width, height] = values;
        if values.iter().any(|v| *v < 0) {
            return Err(MeterError::InvalidRoi {
                message: format!("components must be non-negative, got {values:?}"),
            });
        }
        if width == 0 || height == 0 {
            return Err(MeterError::InvalidRoi {
                message: format!("width and height must be positive, got {width}x{height}"),
            });
        }
        let to_u32 = |v: i64| {
            u32::try_from(v).map_err(|_| MeterError::InvalidRoi {
                message: format!("component {v} is too large"),
            })
        };
        Ok(Self {
            x: to_u32(x)?,
            y: to_u32(y)?,
            width: to_u32(width)?,
            height: to_u32(height)?,
        })
    }

    /// Check that the region lies entirely inside a frame of the given size.
    pub fn check_within(&self, frame_width: u32, frame_height: u32) -> Result<()> {
        let right = u64::from(self.x) + u64::from(self.width);
        let bottom = u64::from(self.y) + u64::from(self.height);
        if right > u64::from(frame_width) || bottom > u64::from(frame_height) {
            return Err(MeterError::RoiOutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                frame_width,
                frame_height,
            });
        }
        Ok(())
    }
}

/// Transform chain configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    pub grayscale: bool,
    pub denoise: bool,
    pub threshold: ThresholdMode,
    pub invert: bool,
    pub roi: Option<Roi>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            grayscale: true,
            denoise: true,
            threshold: ThresholdMode::Otsu,
            invert: false,
            roi: None,
        }
    }
}

/// Intermediate image while the chain runs.
enum Working {
    Color(RgbImage),
    Gray(GrayImage),
}

impl Working {
    fn from_frame(frame: DynamicImage) -> Self {
        match frame {
            DynamicImage::ImageLuma8(gray) => Working::Gray(gray),
            other if other.color().channel_count() <= 2 => Working::Gray(other.to_luma8()),
            other => Working::Color(other.to_rgb8()),
        }
    }

    fn into_gray(self) -> GrayImage {
        match self {
            Working::Color(rgb) => DynamicImage::ImageRgb8(rgb).to_luma8(),
            Working::Gray(gray) => gray,
        }
    }
}

/// Run the transform chain over a captured frame.
///
/// The returned image is always single-channel. An ROI that does not fit
/// inside the frame is reported as [`MeterError::RoiOutOfBounds`] rather than
/// clamped.
pub fn apply(frame: &DynamicImage, config: &TransformConfig) -> Result<GrayImage> {
    let cropped = match config.roi {
        Some(roi) => {
            roi.check_within(frame.width(), frame.height())?;
            frame.crop_imm(roi.x, roi.y, roi.width, roi.height)
        }
        None => frame.clone(),
    };

    let mut working = Working::from_frame(cropped);

    if config.grayscale {
        working = Working::Gray(working.into_gray());
    }

    if config.denoise {
        working = match working {
            Working::Color(rgb) => Working::Color(filter::gaussian_blur_3x3(&rgb)),
            Working::Gray(gray) => Working::Gray(filter::gaussian_blur_3x3(&gray)),
        };
    }

    working = match config.threshold {
        ThresholdMode::None => working,
        ThresholdMode::Otsu => {
            let gray = working.into_gray();
            let level = threshold::otsu_level(&gray);
            log::trace!("otsu level {}", level);
            Working::Gray(threshold::binarize(&gray, level))
        }
        ThresholdMode::Adaptive => Working::Gray(threshold::adaptive_threshold(
            &working.into_gray(),
            defaults::ADAPTIVE_BLOCK_SIZE,
            defaults::ADAPTIVE_C,
        )),
    };

    if config.invert {
        match &mut working {
            Working::Color(rgb) => image::imageops::invert(rgb),
            Working::Gray(gray) => image::imageops::invert(gray),
        }
    }

    Ok(working.into_gray())
}
