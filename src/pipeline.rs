//! The two entry points: the pre-shot capture check and full recognition.
//!
//! Both are synchronous and stateless; everything they need comes in as
//! arguments, so concurrent calls never share data.

use serde::Serialize;
use thiserror::Error;

use crate::analysis::{
    Assessment, ContentSignal, LightingReport, QualityReport, analyze_lighting, analyze_quality,
    pre_scan,
};
use crate::config::AppConfig;
use crate::frame::Frame;
use crate::guidance::{
    GuidanceDecision, capture_guidance, ocr_failure_guidance, recognition_guidance,
};
use crate::ocr::{DrugExtractor, DrugRecord, OcrEngine, OcrError, preprocess};
use crate::validation::{ValidationResult, validate};

const UNREADABLE_MESSAGE: &str = "无法读取图片";

/// Input that no stage can work with.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no image data supplied")]
    EmptyFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureAnalysis {
    pub lighting: Assessment<LightingReport>,
    pub quality: Assessment<QualityReport>,
    pub content: ContentSignal,
    pub guidance: GuidanceDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionReport {
    pub drug_record: DrugRecord,
    pub validation: ValidationResult,
    pub guidance: GuidanceDecision,
    pub confidence: f32,
    /// Text blocks returned by OCR
    pub block_count: usize,
    /// Whether OCR saw the preprocessed image rather than the original
    pub image_processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_error: Option<OcrError>,
}

/// Judges whether a frame is worth recognizing.
///
/// An undecodable frame still gets a content pre-scan; its lighting and
/// quality come back as errors.
pub fn analyze_capture(
    bytes: &[u8],
    ocr: &dyn OcrEngine,
    config: &AppConfig,
) -> Result<CaptureAnalysis, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyFrame);
    }

    let (lighting, quality) = match Frame::decode(bytes) {
        Ok(frame) => {
            let gray = frame.gray();
            log::info!(
                "Analyzing {}x{} frame ({} channels, {} bytes)",
                frame.width(),
                frame.height(),
                frame.channels(),
                frame.bytes().len()
            );
            (
                Assessment::Success(analyze_lighting(&gray)),
                Assessment::Success(analyze_quality(&gray)),
            )
        }
        Err(e) => {
            log::warn!("Frame analysis skipped: {}", e);
            (
                Assessment::error(UNREADABLE_MESSAGE),
                Assessment::error(UNREADABLE_MESSAGE),
            )
        }
    };

    let content = pre_scan(bytes, ocr, &config.vocabulary);
    let guidance = capture_guidance(&lighting, &quality, &content);

    Ok(CaptureAnalysis {
        lighting,
        quality,
        content,
        guidance,
    })
}

/// Preprocesses, runs OCR, extracts, validates and decides what to say.
///
/// Runs regardless of any earlier pre-scan result. OCR failure is reported
/// inside the result, never as an `Err`.
pub fn recognize(
    bytes: &[u8],
    ocr: &dyn OcrEngine,
    config: &AppConfig,
) -> Result<RecognitionReport, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyFrame);
    }

    let prepared = preprocess(bytes, &config.preprocess);

    let (drug_record, block_count, ocr_error) = match ocr.recognize(&prepared.bytes) {
        Ok(blocks) => {
            let record = DrugExtractor::new(&config.vocabulary).extract(&blocks);
            (record, blocks.len(), None)
        }
        Err(e) => {
            log::error!("Recognition OCR failed: {}", e);
            (DrugRecord::from_ocr_error(&e), 0, Some(e))
        }
    };

    if drug_record.is_failed() {
        log::warn!("Recognition produced no fields ({} blocks)", block_count);
    }

    let validation = validate(&drug_record, &config.required_fields);
    let guidance = match &ocr_error {
        Some(e) => ocr_failure_guidance(e),
        None => recognition_guidance(&drug_record, &validation),
    };

    Ok(RecognitionReport {
        confidence: drug_record.confidence,
        drug_record,
        validation,
        guidance,
        block_count,
        image_processed: prepared.processed,
        ocr_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::GuidanceAction;
    use crate::ocr::{FaultCode, StaticOcr, TextBlock};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
    use std::io::Cursor;

    struct BrokenOcr;

    impl OcrEngine for BrokenOcr {
        fn recognize(&self, _image: &[u8]) -> Result<Vec<TextBlock>, OcrError> {
            Err(OcrError::new(OcrError::NETWORK_ERROR, "connection reset"))
        }
    }

    fn png(img: DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Sharp, well-lit, large enough: a 400x300 checkerboard of 60 and 240.
    fn good_frame() -> Vec<u8> {
        png(DynamicImage::ImageLuma8(ImageBuffer::from_fn(400, 300, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Luma([60])
            } else {
                Luma([240])
            }
        })))
    }

    fn label_ocr() -> StaticOcr {
        StaticOcr::new(vec![
            TextBlock::new("生产厂家：XX制药有限公司", 90, 0).with_confidence(0.9),
            TextBlock::new("通用名称：阿莫西林胶囊", 10, 0).with_confidence(0.9),
            TextBlock::new("用法：口服", 30, 0).with_confidence(0.7),
            TextBlock::new("有效期：2025年12月", 120, 0),
            TextBlock::new("用量：一次0.5g，一日3次", 60, 0).with_confidence(0.8),
        ])
    }

    #[test]
    fn test_recognize_end_to_end() {
        let report = recognize(&good_frame(), &label_ocr(), &AppConfig::default()).unwrap();
        let record = &report.drug_record;

        assert_eq!(record.drug_name, "阿莫西林胶囊");
        assert!(record.usage.contains("口服"));
        assert!(record.dosage.contains("一次0.5g"));
        assert!(record.dosage.contains("一日3次"));
        assert_eq!(record.manufacturer, "XX制药有限公司");
        assert_eq!(record.expiry_date, "2025年12月");

        assert_eq!(report.validation.completeness_score, 100.0);
        assert!(report.validation.is_complete);
        assert_eq!(report.guidance.action, GuidanceAction::Continue);
        assert_eq!(
            report.guidance.voice_text,
            "药品名称：阿莫西林胶囊。用法用量：一次0.5g，一日3次。使用方法：口服。\
             生产厂家：XX制药有限公司。有效期：2025年12月。"
        );
        assert!((report.confidence - 0.825).abs() < 1e-6);
        assert_eq!(report.block_count, 5);
        assert!(report.image_processed);
        assert!(report.ocr_error.is_none());
    }

    #[test]
    fn test_recognize_ocr_failure_is_not_no_text() {
        let report = recognize(&good_frame(), &BrokenOcr, &AppConfig::default()).unwrap();

        let fault = report.drug_record.error.as_ref().unwrap();
        assert_eq!(fault.code, FaultCode::OcrFailed);
        assert_eq!(report.validation.completeness_score, 0.0);
        assert_eq!(report.guidance.action, GuidanceAction::Retake);
        assert_eq!(report.guidance.voice_text, "识别失败，请重试");
        assert_eq!(
            report.ocr_error.map(|e| e.code),
            Some(OcrError::NETWORK_ERROR.to_string())
        );
    }

    #[test]
    fn test_recognize_no_text() {
        let report =
            recognize(&good_frame(), &StaticOcr::default(), &AppConfig::default()).unwrap();
        let fault = report.drug_record.error.as_ref().unwrap();
        assert_eq!(fault.code, FaultCode::NoText);
        assert_eq!(report.confidence, 0.0);
        assert_eq!(report.guidance.action, GuidanceAction::Retake);
        assert!(report.ocr_error.is_none());
    }

    #[test]
    fn test_recognize_undecodable_frame_still_runs_ocr() {
        let report = recognize(b"not an image", &label_ocr(), &AppConfig::default()).unwrap();
        assert!(!report.image_processed);
        assert_eq!(report.drug_record.drug_name, "阿莫西林胶囊");
    }

    #[test]
    fn test_empty_frame_is_an_error() {
        let config = AppConfig::default();
        assert!(matches!(
            recognize(&[], &label_ocr(), &config),
            Err(PipelineError::EmptyFrame)
        ));
        assert!(matches!(
            analyze_capture(&[], &label_ocr(), &config),
            Err(PipelineError::EmptyFrame)
        ));
    }

    #[test]
    fn test_analyze_capture_good_frame_continues() {
        let analysis = analyze_capture(&good_frame(), &label_ocr(), &AppConfig::default()).unwrap();
        assert!(!analysis.lighting.is_error());
        assert!(!analysis.quality.is_error());
        assert!(analysis.content.has_drug_info);
        assert_eq!(analysis.guidance.action, GuidanceAction::Continue);
    }

    #[test]
    fn test_analyze_capture_dark_frame_flashes() {
        let dark = png(DynamicImage::ImageLuma8(ImageBuffer::from_pixel(400, 300, Luma([20]))));
        let analysis = analyze_capture(&dark, &label_ocr(), &AppConfig::default()).unwrap();
        assert_eq!(analysis.guidance.action, GuidanceAction::Flash);
        assert_eq!(analysis.guidance.wait_seconds, 3);
    }

    #[test]
    fn test_analyze_capture_unreadable_frame() {
        let analysis =
            analyze_capture(b"garbage", &label_ocr(), &AppConfig::default()).unwrap();
        assert!(analysis.lighting.is_error());
        assert!(analysis.quality.is_error());
        // Content is still scanned
        assert!(analysis.content.has_drug_info);
        assert_eq!(analysis.guidance.action, GuidanceAction::Retake);

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["lighting"]["status"], "error");
        assert!(json["lighting"].get("mean_brightness").is_none());
    }
}
