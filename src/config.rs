//! Configuration types.
//!
//! Loads settings from config.json at startup. Provides preprocessing
//! bounds, keyword vocabularies, the validation field set and the OCR
//! service endpoint. Nothing here is global: callers pass the slices they
//! need into each operation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::ocr::preprocess::PreprocessConfig;
use crate::validation::RequiredField;
use crate::vocabulary::Vocabulary;

/// Baidu Cloud OCR connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub api_key: String,
    pub secret_key: String,
    pub token_url: String,
    pub ocr_url: String,
    /// Recognition language, e.g. "CHN_ENG" for mixed Chinese/English
    pub language_type: String,
    pub request_timeout_secs: u64,
    pub token_timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            token_url: "https://aip.baidubce.com/oauth/2.0/token".to_string(),
            ocr_url: "https://aip.baidubce.com/rest/2.0/ocr/v1/general_basic".to_string(),
            language_type: "CHN_ENG".to_string(),
            request_timeout_secs: 30,
            token_timeout_secs: 10,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub preprocess: PreprocessConfig,
    pub vocabulary: Vocabulary,
    /// Fields a record needs to count as complete
    pub required_fields: Vec<RequiredField>,
    pub ocr: OcrConfig,
    /// Default log level when RUST_LOG is unset
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            vocabulary: Vocabulary::default(),
            required_fields: RequiredField::ALL.to_vec(),
            ocr: OcrConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads config from `path`, or returns defaults if it is missing or
    /// unreadable. Credentials from the environment win over the file.
    pub fn load(path: &Path) -> Self {
        let mut config = Self::load_file(path);
        config.apply_env();
        config
    }

    fn load_file(path: &Path) -> Self {
        if !path.exists() {
            log::info!("{} not found. Using default config.", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("BAIDU_API_KEY") {
            self.ocr.api_key = key;
        }
        if let Ok(secret) = std::env::var("BAIDU_SECRET_KEY") {
            self.ocr.secret_key = secret;
        }
    }

    /// Writes the default config to `path` (for reference).
    pub fn save_default(path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&Self::default())?;
        fs::write(path, json)?;
        Ok(())
    }
}
