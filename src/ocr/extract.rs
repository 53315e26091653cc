use anyhow::Result;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use super::engine::{OcrError, TextBlock};
use crate::vocabulary::Vocabulary;

/// Name reported when text exists but no rule finds a drug name
pub const UNKNOWN_DRUG: &str = "未知药品";

/// Separator between accumulated usage / dosage matches
const JOIN_SEPARATOR: &str = "；";

/// Confidence when blocks exist but none reports a score
const NEUTRAL_CONFIDENCE: f32 = 0.5;

/// Upper bound on a single compiled rule, so oversized vocabulary entries
/// fail cleanly instead of consuming memory.
const RULE_SIZE_LIMIT: usize = 2 * (1 << 20);

/// A per-dose or per-day quantity; a name candidate containing one is a
/// dosage phrase such as `一次2片`.
const DOSAGE_QUANTITY: &str = r"(?:一次|每次|一日|每日|一天|每天)\s*[0-9一二两三四五六七八九十半]";

/// Numbers as printed on labels: digits, decimals, Chinese numerals, ranges.
const QUANTITY: &str =
    r"[0-9一二两三四五六七八九十半]+(?:\.[0-9]+)?(?:\s*[～~\-至]\s*[0-9一二两三四五六七八九十半]+(?:\.[0-9]+)?)?";

/// Why a record carries no extracted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCode {
    /// The OCR collaborator failed
    OcrFailed,
    /// OCR succeeded but returned no text
    NoText,
    /// Extraction itself broke
    ExtractionError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionFault {
    pub code: FaultCode,
    pub message: String,
}

/// Normalized drug label data. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrugRecord {
    pub drug_name: String,
    pub usage: String,
    pub dosage: String,
    pub side_effects: String,
    pub contraindications: String,
    pub allergens: String,
    pub storage: String,
    pub manufacturer: String,
    pub expiry_date: String,
    pub batch_number: String,
    /// Reading-order text the fields were extracted from
    pub raw_text: String,
    /// Mean OCR confidence in [0, 1]
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExtractionFault>,
}

impl DrugRecord {
    /// A record with every field empty and the given fault attached.
    pub fn failed(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            error: Some(ExtractionFault {
                code,
                message: message.into(),
            }),
            ..Self::default()
        }
    }

    /// Record for an OCR call that never produced blocks.
    pub fn from_ocr_error(err: &OcrError) -> Self {
        Self::failed(FaultCode::OcrFailed, err.to_string())
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Sorts blocks top-to-bottom, then left-to-right, and joins them with
/// single spaces.
pub fn assemble_text(blocks: &[TextBlock]) -> String {
    let mut sorted: Vec<&TextBlock> = blocks.iter().collect();
    sorted.sort_by_key(|b| (b.bounding_box.top, b.bounding_box.left));
    sorted
        .iter()
        .map(|b| b.words.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mean of the reported block confidences, clamped to [0, 1].
///
/// No blocks: 0.0. Blocks without any score: 0.5.
pub fn block_confidence(blocks: &[TextBlock]) -> f32 {
    if blocks.is_empty() {
        return 0.0;
    }
    let scores: Vec<f32> = blocks
        .iter()
        .filter_map(|b| b.confidence)
        .filter(|c| c.is_finite())
        .collect();
    if scores.is_empty() {
        return NEUTRAL_CONFIDENCE;
    }
    (scores.iter().sum::<f32>() / scores.len() as f32).clamp(0.0, 1.0)
}

fn compile(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern)
        .size_limit(RULE_SIZE_LIMIT)
        .build()?)
}

/// `a|b|c` over escaped words, longest first so longer words win at the
/// same position. `None` for an empty list.
fn alternation(words: &[String]) -> Option<String> {
    let mut words: Vec<&str> = words
        .iter()
        .map(|w| w.as_str())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return None;
    }
    words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
    words.dedup();
    Some(
        words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

fn clean_value(value: &str) -> &str {
    value.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '，' | ',' | '；' | ';' | '：' | ':' | '、')
    })
}

/// One candidate rule of a field. Group 1 (or the whole match) is the value.
struct Rule {
    pattern: Regex,
    /// Cut the value at the next section header
    stop_at_header: bool,
    /// Values matching this are skipped
    reject: Option<Regex>,
}

impl Rule {
    /// `label: value`, the value running until the next header.
    fn labeled(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            stop_at_header: true,
            reject: None,
        })
    }

    /// A self-contained phrase taken verbatim.
    fn phrase(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            stop_at_header: false,
            reject: None,
        })
    }

    fn rejecting(mut self, pattern: &str) -> Result<Self> {
        self.reject = Some(compile(pattern)?);
        Ok(self)
    }

    fn values<'t>(
        &'t self,
        text: &'t str,
        headers: Option<&'t Regex>,
    ) -> impl Iterator<Item = String> + 't {
        self.pattern.captures_iter(text).filter_map(move |caps| {
            let raw = caps.get(1).or_else(|| caps.get(0))?.as_str();
            let cut = match (self.stop_at_header, headers) {
                (true, Some(h)) => h.find(raw).map_or(raw, |m| &raw[..m.start()]),
                _ => raw,
            };
            let value = clean_value(cut);
            if value.is_empty() || self.reject.as_ref().is_some_and(|r| r.is_match(value)) {
                return None;
            }
            Some(value.to_string())
        })
    }
}

/// The ordered candidate rules for every field.
struct RuleSet {
    headers: Option<Regex>,
    drug_name: Vec<Rule>,
    usage: Vec<Rule>,
    dosage: Vec<Rule>,
    side_effects: Vec<Rule>,
    contraindications: Vec<Rule>,
    allergens: Vec<Rule>,
    storage: Vec<Rule>,
    manufacturer: Vec<Rule>,
    expiry_date: Vec<Rule>,
    batch_number: Vec<Rule>,
}

/// Labeled rules `label[：:]? value` for each label, in order.
fn labeled_rules(labels: &[&str], value: &str) -> Result<Vec<Rule>> {
    labels
        .iter()
        .map(|label| Rule::labeled(&format!(r"{}[：:]?\s*({})", regex::escape(label), value)))
        .collect()
}

impl RuleSet {
    fn build(vocab: &Vocabulary) -> Result<Self> {
        let headers = match alternation(&vocab.field_labels) {
            Some(alt) => Some(compile(&format!("(?:{})[：:]", alt))?),
            None => None,
        };

        // Name: suffix match, explicit labels, brackets, short labels, fallback.
        // The leftmost run ending in any form wins; quantity phrases are skipped.
        let mut drug_name = Vec::new();
        if let Some(forms) = alternation(&vocab.dosage_forms) {
            drug_name.push(
                Rule::phrase(&format!(r"([\p{{Han}}A-Za-z0-9]+?(?:{}))", forms))?
                    .rejecting(DOSAGE_QUANTITY)?,
            );
        }
        drug_name.extend(labeled_rules(&["通用名称", "商品名称", "药品名称"], r"[^\s，。]+")?);
        drug_name.push(Rule::phrase(r"【([^】]+)】")?);
        drug_name.extend(labeled_rules(&["品名", "名称"], r"[^\s，。]+")?);
        if let Some(forms) = alternation(&vocab.name_fallback_forms) {
            drug_name.push(
                Rule::phrase(&format!(r"(\p{{Han}}{{2,8}}(?:{}))", forms))?
                    .rejecting(DOSAGE_QUANTITY)?,
            );
        }

        let mut usage = vec![Rule::labeled(r"用法[：:]?\s*([^。]+?)(?:用量|。|$)")?];
        usage.extend(labeled_rules(&["服用方法", "给药途径"], "[^。]+")?);
        if let Some(routes) = alternation(&vocab.route_keywords) {
            usage.push(Rule::phrase(&format!("({})", routes))?);
        }

        let mut dosage = labeled_rules(&["用量", "剂量"], "[^。]+")?;
        dosage.push(Rule::phrase(&format!(
            r"((?:一次|每次)\s*{}\s*(?:片|粒|支|袋|包|丸|滴|揿|mg|毫克|ml|mL|毫升|g|克))",
            QUANTITY
        ))?);
        dosage.push(Rule::phrase(&format!(
            r"((?:一日|每日|一天|每天)\s*{}\s*[次回])",
            QUANTITY
        ))?);

        let side_effects = labeled_rules(&["不良反应", "副作用", "可能引起"], "[^。]+")?;
        let contraindications =
            labeled_rules(&["禁忌症", "禁忌", "禁用", "不宜", "慎用"], "[^。]+")?;

        let mut allergens = vec![Rule::phrase(r"((?:对本品)?过敏(?:者|体质|史)[^。，,；;]*)")?];
        allergens.push(Rule::labeled(r"过敏(?:反应)?[：:]\s*([^。]+)")?);

        let storage = labeled_rules(&["贮藏", "储存", "保存", "存放"], "[^。]+")?;

        let mut manufacturer = labeled_rules(&["生产厂家", "生产企业", "制造商"], "[^。]+")?;
        if let Some(suffixes) = alternation(&vocab.manufacturer_suffixes) {
            manufacturer.push(Rule::phrase(&format!(
                r"([\p{{Han}}A-Za-z0-9（）()]+?(?:{}))",
                suffixes
            ))?);
        }

        let expiry_date = labeled_rules(&["有效期至", "有效期", "失效日期", "失效期"], "[^。]+")?;

        let mut batch_number = vec![Rule::labeled(
            r"(?:生产批号|产品批号|批号)[：:]?\s*([A-Za-z0-9][A-Za-z0-9\-]*)",
        )?];
        batch_number.extend(labeled_rules(&["批号"], "[^。]+")?);

        Ok(Self {
            headers,
            drug_name,
            usage,
            dosage,
            side_effects,
            contraindications,
            allergens,
            storage,
            manufacturer,
            expiry_date,
            batch_number,
        })
    }

    /// First value of the first rule that matches.
    fn first_match(&self, rules: &[Rule], text: &str) -> Option<String> {
        rules
            .iter()
            .find_map(|rule| rule.values(text, self.headers.as_ref()).next())
    }

    /// Every value of every rule, skipping ones already covered, joined.
    fn all_matches(&self, rules: &[Rule], text: &str) -> String {
        let mut accepted: Vec<String> = Vec::new();
        for rule in rules {
            for value in rule.values(text, self.headers.as_ref()) {
                if !accepted.iter().any(|a| a.contains(value.as_str())) {
                    accepted.push(value);
                }
            }
        }
        accepted.join(JOIN_SEPARATOR)
    }
}

/// Turns OCR text blocks into a `DrugRecord`.
pub struct DrugExtractor<'a> {
    vocab: &'a Vocabulary,
}

impl<'a> DrugExtractor<'a> {
    pub fn new(vocab: &'a Vocabulary) -> Self {
        Self { vocab }
    }

    /// Extracts every field. Never fails: an internal fault produces an
    /// empty record marked `extraction_error`, and blank text produces one
    /// marked `no_text`.
    pub fn extract(&self, blocks: &[TextBlock]) -> DrugRecord {
        let raw_text = assemble_text(blocks);
        let confidence = block_confidence(blocks);

        let record = if raw_text.trim().is_empty() {
            log::warn!("No text in {} OCR blocks", blocks.len());
            DrugRecord::failed(FaultCode::NoText, "未识别到任何文字")
        } else {
            match self.extract_fields(&raw_text) {
                Ok(record) => {
                    log::info!("Drug info extracted: {}", record.drug_name);
                    record
                }
                Err(e) => {
                    log::error!("Drug info extraction failed: {}", e);
                    DrugRecord::failed(FaultCode::ExtractionError, format!("信息提取失败: {}", e))
                }
            }
        };

        DrugRecord {
            raw_text,
            confidence,
            ..record
        }
    }

    fn extract_fields(&self, text: &str) -> Result<DrugRecord> {
        let rules = RuleSet::build(self.vocab)?;
        let first = |field: &[Rule]| rules.first_match(field, text).unwrap_or_default();

        Ok(DrugRecord {
            drug_name: rules
                .first_match(&rules.drug_name, text)
                .unwrap_or_else(|| UNKNOWN_DRUG.to_string()),
            usage: rules.all_matches(&rules.usage, text),
            dosage: rules.all_matches(&rules.dosage, text),
            side_effects: first(&rules.side_effects),
            contraindications: first(&rules.contraindications),
            allergens: first(&rules.allergens),
            storage: first(&rules.storage),
            manufacturer: first(&rules.manufacturer),
            expiry_date: first(&rules.expiry_date),
            batch_number: first(&rules.batch_number),
            ..DrugRecord::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks_of(lines: &[&str]) -> Vec<TextBlock> {
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| TextBlock::new(*line, i as u32 * 20, 0))
            .collect()
    }

    fn extract(lines: &[&str]) -> DrugRecord {
        let vocab = Vocabulary::default();
        DrugExtractor::new(&vocab).extract(&blocks_of(lines))
    }

    #[test]
    fn test_assemble_text_reading_order() {
        let blocks = vec![
            TextBlock::new("third", 40, 0),
            TextBlock::new("second", 10, 50),
            TextBlock::new("first", 10, 5),
        ];
        assert_eq!(assemble_text(&blocks), "first second third");
    }

    #[test]
    fn test_block_confidence() {
        assert_eq!(block_confidence(&[]), 0.0);
        assert_eq!(block_confidence(&blocks_of(&["a", "b"])), 0.5);

        let scored = vec![
            TextBlock::new("a", 0, 0).with_confidence(0.9),
            TextBlock::new("b", 10, 0).with_confidence(0.7),
            TextBlock::new("c", 20, 0),
        ];
        assert!((block_confidence(&scored) - 0.8).abs() < 1e-6);

        let out_of_range = vec![TextBlock::new("a", 0, 0).with_confidence(1.7)];
        assert_eq!(block_confidence(&out_of_range), 1.0);
    }

    #[test]
    fn test_full_label() {
        let record = extract(&[
            "通用名称：阿莫西林胶囊",
            "用法：口服",
            "用量：一次0.5g，一日3次",
            "生产厂家：XX制药有限公司",
            "有效期：2025年12月",
        ]);

        assert_eq!(record.drug_name, "阿莫西林胶囊");
        assert!(record.usage.contains("口服"));
        assert!(record.dosage.contains("一次0.5g"));
        assert!(record.dosage.contains("一日3次"));
        assert_eq!(record.manufacturer, "XX制药有限公司");
        assert_eq!(record.expiry_date, "2025年12月");
        assert!(record.error.is_none());
        assert_eq!(record.confidence, 0.5);
    }

    #[test]
    fn test_usage_and_dosage_do_not_repeat() {
        let record = extract(&["用法：口服 用量：一次0.5g，一日3次"]);
        assert_eq!(record.usage, "口服");
        assert_eq!(record.dosage, "一次0.5g，一日3次");
    }

    #[test]
    fn test_dosage_accumulates_bare_quantities() {
        let record = extract(&["维生素C片 成人一次2片 每日3次"]);
        assert_eq!(record.dosage, "一次2片；每日3次");
        assert_eq!(record.drug_name, "维生素C片");
    }

    #[test]
    fn test_usage_accumulates_routes() {
        let record = extract(&["红霉素软膏 外用 给药途径：涂抹患处"]);
        assert_eq!(record.usage, "涂抹患处；外用");
    }

    #[test]
    fn test_name_rule_order() {
        // No dosage-form suffix: explicit label wins
        assert_eq!(extract(&["药品名称：阿司匹林 用法：口服"]).drug_name, "阿司匹林");
        // Bracketed name
        assert_eq!(extract(&["【布洛芬缓释剂】 用量：一次1粒"]).drug_name, "布洛芬缓释剂");
        // Short label
        assert_eq!(extract(&["品名：蒲地蓝消炎口服溶液"]).drug_name, "蒲地蓝消炎口服溶液");
        // Nothing recognizable
        assert_eq!(extract(&["hello world"]).drug_name, UNKNOWN_DRUG);
    }

    #[test]
    fn test_name_is_not_a_dosage_phrase() {
        let record = extract(&["通用名称：阿莫西林胶囊", "用量：一次2片，一日3次"]);
        assert_eq!(record.drug_name, "阿莫西林胶囊");

        let record = extract(&["用量：一次2片", "维生素C片"]);
        assert_eq!(record.drug_name, "维生素C片");

        let record = extract(&["用量：成人一次2片"]);
        assert_eq!(record.drug_name, UNKNOWN_DRUG);
    }

    #[test]
    fn test_combined_usage_dosage_label() {
        let record = extract(&["用法用量：口服，一次1粒，一日2次。"]);
        assert_eq!(record.usage, "口服");
        assert_eq!(record.dosage, "口服，一次1粒，一日2次");
    }

    #[test]
    fn test_label_value_stops_at_next_header() {
        let record = extract(&["通用名称：感冒灵颗粒用法：开水冲服"]);
        assert_eq!(record.drug_name, "感冒灵颗粒");
        assert_eq!(record.usage, "开水冲服");
    }

    #[test]
    fn test_secondary_fields() {
        let record = extract(&[
            "不良反应：偶见皮疹。",
            "禁忌症：严重肝肾功能不全者禁用。",
            "对本品过敏者禁用。",
            "贮藏：密封，在阴凉干燥处保存。",
            "有效期至：2027/03",
            "生产批号：B230415 国药准字H123",
        ]);

        assert_eq!(record.side_effects, "偶见皮疹");
        assert_eq!(record.contraindications, "严重肝肾功能不全者禁用");
        assert_eq!(record.allergens, "对本品过敏者禁用");
        assert_eq!(record.storage, "密封，在阴凉干燥处保存");
        assert_eq!(record.expiry_date, "2027/03");
        assert_eq!(record.batch_number, "B230415");
    }

    #[test]
    fn test_manufacturer_suffix_fallback() {
        let record = extract(&["阿莫西林胶囊", "华北制药股份有限公司"]);
        assert_eq!(record.manufacturer, "华北制药股份有限公司");
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let record = extract(&["阿莫西林胶囊"]);
        assert_eq!(record.usage, "");
        assert_eq!(record.dosage, "");
        assert_eq!(record.manufacturer, "");
        assert_eq!(record.batch_number, "");
        assert!(!record.is_failed());
    }

    #[test]
    fn test_blank_text_is_no_text() {
        let vocab = Vocabulary::default();
        let extractor = DrugExtractor::new(&vocab);

        let empty = extractor.extract(&[]);
        assert_eq!(empty.error.as_ref().map(|e| e.code), Some(FaultCode::NoText));
        assert_eq!(empty.drug_name, "");
        assert_eq!(empty.confidence, 0.0);
        assert!(empty.is_failed());

        let blank = extractor.extract(&blocks_of(&["  ", ""]));
        assert_eq!(blank.error.map(|e| e.code), Some(FaultCode::NoText));
        assert_eq!(blank.confidence, 0.5);
    }

    #[test]
    fn test_internal_fault_becomes_marked_record() {
        let vocab = Vocabulary {
            dosage_forms: vec!["A".repeat(1_000_000)],
            ..Vocabulary::default()
        };
        let record = DrugExtractor::new(&vocab).extract(&blocks_of(&["阿莫西林胶囊 用法：口服"]));

        assert_eq!(
            record.error.as_ref().map(|e| e.code),
            Some(FaultCode::ExtractionError)
        );
        assert_eq!(record.drug_name, "");
        assert_eq!(record.usage, "");
        assert_eq!(record.raw_text, "阿莫西林胶囊 用法：口服");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let vocab = Vocabulary::default();
        let extractor = DrugExtractor::new(&vocab);
        let blocks = blocks_of(&["通用名称：布洛芬片", "用法用量：口服，一次1片，一日2次。"]);

        assert_eq!(extractor.extract(&blocks), extractor.extract(&blocks));
    }

    #[test]
    fn test_ocr_error_record() {
        let record = DrugRecord::from_ocr_error(&OcrError::new("110", "token invalid"));
        assert_eq!(record.error.map(|e| e.code), Some(FaultCode::OcrFailed));
        assert_eq!(record.drug_name, "");
        assert_eq!(record.confidence, 0.0);
    }
}
