//! Medicine package capture assistant.
//!
//! Judges whether a photo of a medicine box is usable, conditions it for
//! OCR, and turns the recognized text into a drug record plus spoken
//! guidance for the user.

pub mod analysis;
pub mod config;
pub mod frame;
pub mod guidance;
pub mod imaging;
pub mod logging;
pub mod ocr;
pub mod paths;
pub mod pipeline;
pub mod validation;
pub mod vocabulary;

pub use config::AppConfig;
pub use pipeline::{CaptureAnalysis, PipelineError, RecognitionReport, analyze_capture, recognize};
