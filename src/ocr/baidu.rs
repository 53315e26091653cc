//! Baidu Cloud general OCR client.
//!
//! Holds the only cross-request state in the crate: the OAuth access token,
//! cached behind a mutex so overlapping recognitions share one token.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Local};
use serde::Deserialize;
use std::sync::Mutex;

use super::engine::{BoundingBox, OcrEngine, OcrError, TextBlock};
use crate::config::OcrConfig;

/// Tokens live 30 days; refresh an hour early.
const TOKEN_LIFETIME_HOURS: i64 = 29 * 24 + 23;

struct CachedToken {
    token: String,
    expires_at: DateTime<Local>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct OcrResponse {
    words_result: Option<Vec<WordsResult>>,
    error_code: Option<serde_json::Value>,
    error_msg: Option<String>,
}

#[derive(Deserialize)]
struct WordsResult {
    words: String,
    location: Option<Location>,
    probability: Option<Probability>,
}

#[derive(Deserialize)]
struct Location {
    top: i64,
    left: i64,
    width: i64,
    height: i64,
}

#[derive(Deserialize)]
struct Probability {
    average: f64,
}

fn clamp_coord(v: i64) -> u32 {
    v.clamp(0, u32::MAX as i64) as u32
}

/// Converts a raw OCR response body into text blocks or the provider's error.
fn parse_ocr_response(body: &str) -> Result<Vec<TextBlock>, OcrError> {
    let response: OcrResponse = serde_json::from_str(body)
        .map_err(|e| OcrError::new(OcrError::SERVICE_ERROR, format!("invalid OCR response: {}", e)))?;

    match response.words_result {
        Some(words) => Ok(words
            .into_iter()
            .map(|w| TextBlock {
                words: w.words,
                bounding_box: w
                    .location
                    .map(|l| BoundingBox {
                        top: clamp_coord(l.top),
                        left: clamp_coord(l.left),
                        width: clamp_coord(l.width),
                        height: clamp_coord(l.height),
                    })
                    .unwrap_or_default(),
                confidence: w.probability.map(|p| p.average as f32),
            })
            .collect()),
        None => {
            let code = match response.error_code {
                Some(serde_json::Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => "UNKNOWN_ERROR".to_string(),
            };
            let message = response.error_msg.unwrap_or_else(|| "OCR识别失败".to_string());
            Err(OcrError::new(code, message))
        }
    }
}

pub struct BaiduOcr {
    config: OcrConfig,
    client: reqwest::blocking::Client,
    token: Mutex<Option<CachedToken>>,
}

impl BaiduOcr {
    pub fn new(config: OcrConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;
        log::info!("Baidu OCR client ready ({})", config.ocr_url);
        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    /// Returns the cached token, fetching a new one when absent or expired.
    fn access_token(&self) -> Result<String, OcrError> {
        let mut cached = self.token.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(token) = cached.as_ref() {
            if Local::now() < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        if self.config.api_key.is_empty() || self.config.secret_key.is_empty() {
            return Err(OcrError::new(
                OcrError::TOKEN_ERROR,
                "OCR API key or secret key is not configured",
            ));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .timeout(std::time::Duration::from_secs(self.config.token_timeout_secs))
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.api_key.as_str()),
                ("client_secret", self.config.secret_key.as_str()),
            ])
            .send()
            .and_then(|r| r.text())
            .map_err(|e| OcrError::new(OcrError::NETWORK_ERROR, e.to_string()))?;

        let parsed: TokenResponse = serde_json::from_str(&response)
            .map_err(|e| OcrError::new(OcrError::TOKEN_ERROR, e.to_string()))?;

        match parsed.access_token {
            Some(token) => {
                log::info!("Baidu OCR token acquired");
                *cached = Some(CachedToken {
                    token: token.clone(),
                    expires_at: Local::now() + Duration::hours(TOKEN_LIFETIME_HOURS),
                });
                Ok(token)
            }
            None => {
                let reason = parsed
                    .error_description
                    .or(parsed.error)
                    .unwrap_or_else(|| "no access_token in response".to_string());
                log::error!("Baidu OCR token request failed: {}", reason);
                Err(OcrError::new(OcrError::TOKEN_ERROR, reason))
            }
        }
    }
}

impl OcrEngine for BaiduOcr {
    fn recognize(&self, image: &[u8]) -> Result<Vec<TextBlock>, OcrError> {
        if image.is_empty() {
            return Err(OcrError::new(OcrError::EMPTY_IMAGE, "图片文件为空"));
        }

        let token = self.access_token()?;
        let encoded = STANDARD.encode(image);
        log::debug!("OCR request: {} bytes, base64 length {}", image.len(), encoded.len());

        let body = self
            .client
            .post(&self.config.ocr_url)
            .query(&[("access_token", token.as_str())])
            .form(&[
                ("image", encoded.as_str()),
                ("language_type", self.config.language_type.as_str()),
                ("detect_direction", "true"),
                ("paragraph", "true"),
                ("probability", "true"),
            ])
            .send()
            .and_then(|r| r.text())
            .map_err(|e| {
                log::error!("Baidu OCR network error: {}", e);
                OcrError::new(OcrError::NETWORK_ERROR, format!("网络连接异常: {}", e))
            })?;

        match parse_ocr_response(&body) {
            Ok(blocks) => {
                log::info!("Baidu OCR recognized {} text blocks", blocks.len());
                Ok(blocks)
            }
            Err(e) => {
                log::error!("Baidu OCR rejected request: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_words_result() {
        let body = r#"{
            "log_id": 1,
            "words_result_num": 2,
            "words_result": [
                {"words": "阿莫西林胶囊", "location": {"top": 10, "left": 5, "width": 100, "height": 20},
                 "probability": {"average": 0.95, "min": 0.9, "variance": 0.001}},
                {"words": "用法：口服"}
            ]
        }"#;

        let blocks = parse_ocr_response(body).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].bounding_box.top, 10);
        assert_eq!(blocks[0].bounding_box.left, 5);
        assert!((blocks[0].confidence.unwrap() - 0.95).abs() < 1e-6);
        assert_eq!(blocks[1].bounding_box, BoundingBox::default());
        assert_eq!(blocks[1].confidence, None);
    }

    #[test]
    fn test_parse_provider_error() {
        let body = r#"{"error_code": 110, "error_msg": "Access token invalid or no longer valid"}"#;
        let err = parse_ocr_response(body).unwrap_err();
        assert_eq!(err.code, "110");
        assert_eq!(err.message, "Access token invalid or no longer valid");
    }

    #[test]
    fn test_parse_garbage_is_service_error() {
        let err = parse_ocr_response("<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.code, OcrError::SERVICE_ERROR);
    }

    #[test]
    fn test_missing_credentials_fail_without_network() {
        let engine = BaiduOcr::new(OcrConfig::default()).unwrap();
        let err = engine.recognize(b"\x89PNG").unwrap_err();
        assert_eq!(err.code, OcrError::TOKEN_ERROR);

        let err = engine.recognize(&[]).unwrap_err();
        assert_eq!(err.code, OcrError::EMPTY_IMAGE);
    }
}
