//! Next-action decisions spoken to the user.
//!
//! Two separate tables: one before the shot (lighting, quality, content)
//! and one after recognition (completeness). Each is first-match-wins.

use serde::Serialize;

use crate::analysis::{Assessment, ContentSignal, LightingReport, QualityReport};
use crate::ocr::{DrugRecord, OcrError};
use crate::validation::{RequiredField, ValidationResult};

/// Seconds the caller waits before the flash fires
pub const FLASH_WAIT_SECONDS: u32 = 3;

const FLASH_VOICE: &str = "当前光线不足，三秒后自动开启闪光灯，请注意保护眼睛";
const CONTINUE_MESSAGE: &str = "图像质量良好，开始识别";
const CONTINUE_VOICE: &str = "图像质量良好，开始识别，请保持不动";

const RETAKE_MESSAGE: &str = "识别信息不完整，请重新拍照";
const FLIP_SIDE_VOICE: &str = "请变换药品另一个面，当前面信息不完整";
const AIM_AT_NAME_VOICE: &str = "请对准药品名称部分重新拍照";
const AIM_AT_DOSAGE_VOICE: &str = "请对准用法用量部分重新拍照";
const ADJUST_ANGLE_VOICE: &str = "请调整角度重新拍照";
const RECOGNIZED_MESSAGE: &str = "识别完成";
const EMPTY_SUMMARY_VOICE: &str = "识别完成，但信息不完整";

const OCR_FAILED_VOICE: &str = "识别失败，请重试";

/// Missing this many required fields means the wrong side is facing the camera
const FLIP_SIDE_MISSING: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceAction {
    Continue,
    Retake,
    Flash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuidanceDecision {
    pub action: GuidanceAction,
    pub message: String,
    pub voice_text: String,
    pub wait_seconds: u32,
}

impl GuidanceDecision {
    fn retake(message: impl Into<String>, voice_text: impl Into<String>) -> Self {
        Self {
            action: GuidanceAction::Retake,
            message: message.into(),
            voice_text: voice_text.into(),
            wait_seconds: 0,
        }
    }

    fn proceed(message: impl Into<String>, voice_text: impl Into<String>) -> Self {
        Self {
            action: GuidanceAction::Continue,
            message: message.into(),
            voice_text: voice_text.into(),
            wait_seconds: 0,
        }
    }
}

/// Pre-shot decision: flash, then image quality, then content.
///
/// A frame that could not be assessed asks for a retake.
pub fn capture_guidance(
    lighting: &Assessment<LightingReport>,
    quality: &Assessment<QualityReport>,
    content: &ContentSignal,
) -> GuidanceDecision {
    let decision = if let Some(report) = lighting.report().filter(|r| r.needs_flash) {
        GuidanceDecision {
            action: GuidanceAction::Flash,
            message: report.message.clone(),
            voice_text: FLASH_VOICE.to_string(),
            wait_seconds: FLASH_WAIT_SECONDS,
        }
    } else {
        match quality {
            Assessment::Error { message } => {
                GuidanceDecision::retake(message.as_str(), message.as_str())
            }
            Assessment::Success(report) if report.quality.needs_retake() => {
                GuidanceDecision::retake(report.message.as_str(), report.message.as_str())
            }
            Assessment::Success(_) if !content.has_drug_info => {
                GuidanceDecision::retake(content.message.as_str(), content.message.as_str())
            }
            Assessment::Success(_) => GuidanceDecision::proceed(CONTINUE_MESSAGE, CONTINUE_VOICE),
        }
    };

    log::info!("Capture guidance: {:?} ({})", decision.action, decision.message);
    decision
}

/// Spoken summary of the present fields in fixed order.
pub fn spoken_summary(record: &DrugRecord) -> String {
    let fields = [
        (RequiredField::DrugName.label(), &record.drug_name),
        (RequiredField::Dosage.label(), &record.dosage),
        (RequiredField::Usage.label(), &record.usage),
        (RequiredField::Manufacturer.label(), &record.manufacturer),
        ("有效期", &record.expiry_date),
    ];

    let summary: String = fields
        .iter()
        .map(|(label, value)| (label, value.trim()))
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| format!("{}：{}。", label, value))
        .collect();

    if summary.is_empty() {
        EMPTY_SUMMARY_VOICE.to_string()
    } else {
        summary
    }
}

/// Post-recognition decision: retake with a targeted hint, or read the
/// record back.
pub fn recognition_guidance(record: &DrugRecord, validation: &ValidationResult) -> GuidanceDecision {
    let decision = if validation.need_retake {
        let voice = if validation.missing_fields.len() >= FLIP_SIDE_MISSING {
            FLIP_SIDE_VOICE
        } else if validation.is_missing(RequiredField::DrugName) {
            AIM_AT_NAME_VOICE
        } else if validation.is_missing(RequiredField::Dosage) {
            AIM_AT_DOSAGE_VOICE
        } else {
            ADJUST_ANGLE_VOICE
        };
        GuidanceDecision::retake(RETAKE_MESSAGE, voice)
    } else {
        GuidanceDecision::proceed(RECOGNIZED_MESSAGE, spoken_summary(record))
    };

    log::info!("Recognition guidance: {:?} ({})", decision.action, decision.voice_text);
    decision
}

/// Decision when the OCR collaborator failed outright.
pub fn ocr_failure_guidance(err: &OcrError) -> GuidanceDecision {
    GuidanceDecision::retake(format!("OCR识别失败: {}", err.message), OCR_FAILED_VOICE)
}
