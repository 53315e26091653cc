//! Lighting detection via brightness analysis.
//!
//! Classifies a frame by its mean grayscale intensity and reports whether
//! the flash has to be fired before the next shot.

use image::GrayImage;
use serde::Serialize;

use crate::imaging::mean_stddev;

/// Below this mean the frame is dark and the flash is needed.
pub const DARK_BELOW: f64 = 80.0;
/// Below this mean (and not dark) the frame is dim.
pub const DIM_BELOW: f64 = 120.0;
/// Above this mean the frame is bright.
pub const BRIGHT_ABOVE: f64 = 200.0;

pub const DARK_MESSAGE: &str = "当前光线不足，三秒后自动开启闪光灯，请注意保护眼睛";
const DIM_MESSAGE: &str = "光线较暗，建议调整角度或开启闪光灯";
const BRIGHT_MESSAGE: &str = "光线充足，可以开始拍照";
const GOOD_MESSAGE: &str = "光线条件良好，可以开始拍照";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LightCondition {
    Dark,
    Dim,
    Good,
    Bright,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightingReport {
    pub condition: LightCondition,
    /// Mean intensity, 0.0 (black) to 255.0 (white)
    pub mean_brightness: f64,
    /// Intensity standard deviation, a rough global contrast measure
    pub brightness_stddev: f64,
    pub needs_flash: bool,
    pub message: String,
}

/// Classifies lighting from precomputed statistics.
///
/// Total over all inputs: `<80` dark, `[80,120)` dim, `>200` bright,
/// everything else good.
pub fn classify_lighting(mean_brightness: f64, brightness_stddev: f64) -> LightingReport {
    let (condition, message) = if mean_brightness < DARK_BELOW {
        (LightCondition::Dark, DARK_MESSAGE)
    } else if mean_brightness < DIM_BELOW {
        (LightCondition::Dim, DIM_MESSAGE)
    } else if mean_brightness > BRIGHT_ABOVE {
        (LightCondition::Bright, BRIGHT_MESSAGE)
    } else {
        (LightCondition::Good, GOOD_MESSAGE)
    };

    LightingReport {
        condition,
        mean_brightness,
        brightness_stddev,
        needs_flash: condition == LightCondition::Dark,
        message: message.to_string(),
    }
}

/// Measures and classifies a grayscale frame.
pub fn analyze_lighting(gray: &GrayImage) -> LightingReport {
    let (mean, stddev) = mean_stddev(gray.pixels().map(|p| p[0] as f64));
    let report = classify_lighting(mean, stddev);

    log::info!(
        "Lighting: mean={:.2} std={:.2} -> {:?}",
        mean,
        stddev,
        report.condition
    );

    report
}
