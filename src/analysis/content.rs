//! Quick content check: does the frame show drug label text at all?
//!
//! Runs the OCR collaborator once and looks for fixed vocabulary. The
//! result is advisory; it gates the pre-shot guidance but never replaces
//! full extraction.

use serde::Serialize;

use crate::ocr::{OcrEngine, OcrError};
use crate::vocabulary::Vocabulary;

const FOUND_MESSAGE: &str = "检测到药品信息，开始识别，保持不动";
const NOT_FOUND_MESSAGE: &str = "未检测到药品信息，请对准药品标签重新拍照";
const OCR_FAILED_MESSAGE: &str = "无法识别图片内容";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentSignal {
    /// Drug name evidence plus usage or dosage evidence
    pub has_drug_info: bool,
    /// Tracked keywords present in the text, in vocabulary order
    pub matched_keywords: Vec<String>,
    pub has_name: bool,
    pub has_usage: bool,
    pub has_dosage: bool,
    pub has_expiry: bool,
    pub message: String,
    /// Characters in the joined OCR text
    pub text_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_error: Option<OcrError>,
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| !k.is_empty() && text.contains(k.as_str()))
}

/// Keyword scan over already-recognized text.
pub fn scan_text(text: &str, vocab: &Vocabulary) -> ContentSignal {
    let has_name = contains_any(text, &vocab.prescan_name_keywords);
    let has_usage = contains_any(text, &vocab.prescan_usage_keywords);
    let has_dosage = contains_any(text, &vocab.prescan_dosage_keywords);
    let has_expiry = contains_any(text, &vocab.prescan_expiry_keywords);
    let has_drug_info = has_name && (has_usage || has_dosage);

    let mut matched_keywords: Vec<String> = Vec::new();
    for keyword in &vocab.prescan_tracked_keywords {
        if !keyword.is_empty() && text.contains(keyword.as_str()) && !matched_keywords.contains(keyword) {
            matched_keywords.push(keyword.clone());
        }
    }

    ContentSignal {
        has_drug_info,
        matched_keywords,
        has_name,
        has_usage,
        has_dosage,
        has_expiry,
        message: if has_drug_info {
            FOUND_MESSAGE
        } else {
            NOT_FOUND_MESSAGE
        }
        .to_string(),
        text_length: text.chars().count(),
        ocr_error: None,
    }
}

/// Runs a cheap OCR pass on the raw frame and scans the joined text.
///
/// An OCR failure yields a signal without drug info that carries the error.
pub fn pre_scan(image: &[u8], ocr: &dyn OcrEngine, vocab: &Vocabulary) -> ContentSignal {
    match ocr.recognize(image) {
        Ok(blocks) => {
            let text = blocks
                .iter()
                .map(|b| b.words.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let signal = scan_text(&text, vocab);
            log::info!(
                "Pre-scan: {} blocks, keywords {:?}, has_drug_info={}",
                blocks.len(),
                signal.matched_keywords,
                signal.has_drug_info
            );
            signal
        }
        Err(e) => {
            log::warn!("Pre-scan OCR failed: {}", e);
            ContentSignal {
                has_drug_info: false,
                matched_keywords: Vec::new(),
                has_name: false,
                has_usage: false,
                has_dosage: false,
                has_expiry: false,
                message: OCR_FAILED_MESSAGE.to_string(),
                text_length: 0,
                ocr_error: Some(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{StaticOcr, TextBlock};

    struct BrokenOcr;

    impl OcrEngine for BrokenOcr {
        fn recognize(&self, _image: &[u8]) -> Result<Vec<TextBlock>, OcrError> {
            Err(OcrError::new(OcrError::NETWORK_ERROR, "connection refused"))
        }
    }

    #[test]
    fn test_name_and_usage_is_drug_info() {
        let signal = scan_text("阿莫西林胶囊 用法：口服", &Vocabulary::default());
        assert!(signal.has_drug_info);
        assert!(signal.has_name);
        assert!(signal.has_usage);
        assert_eq!(signal.message, FOUND_MESSAGE);
    }

    #[test]
    fn test_name_only_is_not_drug_info() {
        let signal = scan_text("胶囊", &Vocabulary::default());
        assert!(signal.has_name);
        assert!(!signal.has_usage);
        assert!(!signal.has_dosage);
        assert!(!signal.has_drug_info);
        assert_eq!(signal.message, NOT_FOUND_MESSAGE);
    }

    #[test]
    fn test_dosage_without_name_is_not_drug_info() {
        let signal = scan_text("一次2粒，一日3次", &Vocabulary::default());
        assert!(signal.has_dosage);
        assert!(!signal.has_drug_info);
    }

    #[test]
    fn test_matched_keywords_and_expiry() {
        let signal = scan_text("维生素C片 用量：一次1片 有效期：2026年", &Vocabulary::default());
        assert_eq!(signal.matched_keywords, vec!["片", "用量", "有效期"]);
        assert!(signal.has_expiry);
        assert_eq!(signal.text_length, "维生素C片 用量：一次1片 有效期：2026年".chars().count());
    }

    #[test]
    fn test_pre_scan_joins_blocks() {
        let ocr = StaticOcr::new(vec![
            TextBlock::new("胶囊", 0, 0),
            TextBlock::new("用法", 20, 0),
        ]);
        let signal = pre_scan(b"img", &ocr, &Vocabulary::default());
        assert!(signal.has_drug_info);
        assert!(signal.ocr_error.is_none());
    }

    #[test]
    fn test_pre_scan_ocr_failure() {
        let signal = pre_scan(b"img", &BrokenOcr, &Vocabulary::default());
        assert!(!signal.has_drug_info);
        assert_eq!(signal.message, OCR_FAILED_MESSAGE);
        assert_eq!(
            signal.ocr_error.map(|e| e.code),
            Some(OcrError::NETWORK_ERROR.to_string())
        );
    }
}
