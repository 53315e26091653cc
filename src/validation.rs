//! Completeness scoring of an extracted record.

use serde::{Deserialize, Serialize};

use crate::ocr::DrugRecord;

/// Below this score the user is asked to retake
pub const RETAKE_BELOW: f64 = 50.0;
/// At or above this score the record counts as complete
pub const COMPLETE_FROM: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    DrugName,
    Dosage,
    Usage,
    Manufacturer,
}

impl RequiredField {
    pub const ALL: [RequiredField; 4] = [
        RequiredField::DrugName,
        RequiredField::Dosage,
        RequiredField::Usage,
        RequiredField::Manufacturer,
    ];

    /// Label used in spoken messages
    pub fn label(self) -> &'static str {
        match self {
            RequiredField::DrugName => "药品名称",
            RequiredField::Dosage => "用法用量",
            RequiredField::Usage => "使用方法",
            RequiredField::Manufacturer => "生产厂家",
        }
    }

    pub fn value(self, record: &DrugRecord) -> &str {
        match self {
            RequiredField::DrugName => &record.drug_name,
            RequiredField::Dosage => &record.dosage,
            RequiredField::Usage => &record.usage,
            RequiredField::Manufacturer => &record.manufacturer,
        }
    }

    pub fn is_present(self, record: &DrugRecord) -> bool {
        !self.value(record).trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Percentage of required fields present, 0..=100
    pub completeness_score: f64,
    pub present_fields: Vec<RequiredField>,
    pub missing_fields: Vec<RequiredField>,
    pub need_retake: bool,
    pub is_complete: bool,
}

impl ValidationResult {
    pub fn is_missing(&self, field: RequiredField) -> bool {
        self.missing_fields.contains(&field)
    }
}

/// Scores `record` against `required`. An empty requirement set scores 100.
pub fn validate(record: &DrugRecord, required: &[RequiredField]) -> ValidationResult {
    let mut present_fields = Vec::new();
    let mut missing_fields = Vec::new();
    for &field in required {
        if present_fields.contains(&field) || missing_fields.contains(&field) {
            continue;
        }
        if field.is_present(record) {
            present_fields.push(field);
        } else {
            missing_fields.push(field);
        }
    }

    let total = present_fields.len() + missing_fields.len();
    let completeness_score = if total == 0 {
        100.0
    } else {
        present_fields.len() as f64 / total as f64 * 100.0
    };

    log::info!(
        "Validation: {:.0}% complete, missing {:?}",
        completeness_score,
        missing_fields
    );

    ValidationResult {
        completeness_score,
        present_fields,
        missing_fields,
        need_retake: completeness_score < RETAKE_BELOW,
        is_complete: completeness_score >= COMPLETE_FROM,
    }
}
