//! Pre-shot capture analysis.
//!
//! This module provides:
//! - Lighting classification from pixel statistics
//! - Sharpness / resolution classification via Laplacian variance
//! - A cheap OCR pre-scan for drug vocabulary

pub mod content;
pub mod lighting;
pub mod quality;

pub use content::{ContentSignal, pre_scan, scan_text};
pub use lighting::{LightCondition, LightingReport, analyze_lighting, classify_lighting};
pub use quality::{
    ImageQuality, QualityReport, analyze_quality, classify_quality, laplacian_variance,
};

use serde::Serialize;

/// Outcome of one analyzer on one frame.
///
/// An unreadable frame becomes `Error` with a message and no numbers, so
/// it can never be mistaken for a real measurement (e.g. "dark").
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Assessment<T> {
    Success(T),
    Error { message: String },
}

impl<T> Assessment<T> {
    pub fn error(message: impl Into<String>) -> Self {
        Assessment::Error {
            message: message.into(),
        }
    }

    pub fn report(&self) -> Option<&T> {
        match self {
            Assessment::Success(report) => Some(report),
            Assessment::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Assessment::Error { .. })
    }
}
