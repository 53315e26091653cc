use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Pixel rectangle of a recognized text block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

/// One block of recognized text, as returned by the OCR collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub words: String,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    /// Recognition confidence in [0, 1], when the engine reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl TextBlock {
    pub fn new(words: impl Into<String>, top: u32, left: u32) -> Self {
        Self {
            words: words.into(),
            bounding_box: BoundingBox {
                top,
                left,
                ..BoundingBox::default()
            },
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// A failed OCR call: machine-readable code plus a message for humans.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("OCR failed [{code}]: {message}")]
pub struct OcrError {
    pub code: String,
    pub message: String,
}

impl OcrError {
    pub const EMPTY_IMAGE: &'static str = "EMPTY_IMAGE";
    pub const TOKEN_ERROR: &'static str = "TOKEN_ERROR";
    pub const NETWORK_ERROR: &'static str = "NETWORK_ERROR";
    pub const SERVICE_ERROR: &'static str = "SERVICE_ERROR";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// The external text-recognition service.
///
/// Implementations own any session state (tokens, connections) and must be
/// safe to call from overlapping invocations.
pub trait OcrEngine: Send + Sync {
    /// Recognizes text in an encoded image (PNG, JPEG, ...).
    fn recognize(&self, image: &[u8]) -> Result<Vec<TextBlock>, OcrError>;
}

/// Engine that answers every call with the same prepared blocks.
///
/// Backs the CLI `--blocks` option and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticOcr {
    blocks: Vec<TextBlock>,
}

impl StaticOcr {
    pub fn new(blocks: Vec<TextBlock>) -> Self {
        Self { blocks }
    }

    /// Loads a JSON array of text blocks.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let blocks: Vec<TextBlock> = serde_json::from_str(&contents)?;
        log::info!("Loaded {} text blocks from {}", blocks.len(), path.display());
        Ok(Self::new(blocks))
    }
}

impl OcrEngine for StaticOcr {
    fn recognize(&self, _image: &[u8]) -> Result<Vec<TextBlock>, OcrError> {
        Ok(self.blocks.clone())
    }
}
