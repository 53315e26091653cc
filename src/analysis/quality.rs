//! Sharpness and resolution check.
//!
//! The focus proxy is the variance of the 4-neighbour Laplacian response,
//! computed over the whole frame with mirrored borders.

use image::GrayImage;
use serde::Serialize;

use crate::imaging::{convolve3x3, mean_stddev};

/// Below this variance the frame is blurry.
pub const BLURRY_BELOW: f64 = 100.0;
/// Below this variance (and not blurry) the frame is only fair.
pub const FAIR_BELOW: f64 = 200.0;
/// Sharp frames with fewer pixels than this are too small to read.
pub const MIN_PIXEL_COUNT: u64 = 100_000;

const BLURRY_MESSAGE: &str = "图像模糊，请保持稳定重新拍照";
const FAIR_MESSAGE: &str = "图像质量一般，建议重新拍照";
const LOW_RESOLUTION_MESSAGE: &str = "图像分辨率较低，请靠近药品标签拍照";
const GOOD_MESSAGE: &str = "图像质量良好";

const LAPLACIAN: [[f64; 3]; 3] = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageQuality {
    Blurry,
    Fair,
    LowResolution,
    Good,
}

impl ImageQuality {
    /// Blurry and low-resolution frames must be retaken.
    pub fn needs_retake(self) -> bool {
        matches!(self, ImageQuality::Blurry | ImageQuality::LowResolution)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub quality: ImageQuality,
    pub sharpness_score: f64,
    pub pixel_count: u64,
    pub message: String,
}

/// Classifies a frame from its focus score and size.
///
/// Sharpness is checked before resolution, so a small blurry frame is
/// reported as blurry.
pub fn classify_quality(sharpness_score: f64, pixel_count: u64) -> QualityReport {
    let (quality, message) = if sharpness_score < BLURRY_BELOW {
        (ImageQuality::Blurry, BLURRY_MESSAGE)
    } else if sharpness_score < FAIR_BELOW {
        (ImageQuality::Fair, FAIR_MESSAGE)
    } else if pixel_count < MIN_PIXEL_COUNT {
        (ImageQuality::LowResolution, LOW_RESOLUTION_MESSAGE)
    } else {
        (ImageQuality::Good, GOOD_MESSAGE)
    };

    QualityReport {
        quality,
        sharpness_score,
        pixel_count,
        message: message.to_string(),
    }
}

/// Variance of the Laplacian response over every pixel.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (_, stddev) = mean_stddev(convolve3x3(gray, &LAPLACIAN));
    stddev * stddev
}

/// Measures and classifies a grayscale frame.
pub fn analyze_quality(gray: &GrayImage) -> QualityReport {
    let sharpness = laplacian_variance(gray);
    let pixel_count = gray.width() as u64 * gray.height() as u64;
    let report = classify_quality(sharpness, pixel_count);

    log::info!(
        "Quality: sharpness={:.2} pixels={} -> {:?}",
        sharpness,
        pixel_count,
        report.quality
    );

    report
}
