//! Keyword vocabularies used by the pre-scan and the field extractor.
//!
//! Lists in the config file extend the built-in defaults: new entries are
//! appended, duplicates and empty strings are ignored.

use serde::{Deserialize, Serialize};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "VocabularyExtensions")]
pub struct Vocabulary {
    /// Dosage-form suffixes that end a drug name
    pub dosage_forms: Vec<String>,
    /// Suffixes for the last-resort 2-8 character name match
    pub name_fallback_forms: Vec<String>,
    /// Bare administration-route words accepted as usage
    pub route_keywords: Vec<String>,
    /// Pre-scan: any of these means a drug name is visible
    pub prescan_name_keywords: Vec<String>,
    /// Pre-scan: usage evidence
    pub prescan_usage_keywords: Vec<String>,
    /// Pre-scan: dosage evidence
    pub prescan_dosage_keywords: Vec<String>,
    /// Pre-scan: expiry evidence
    pub prescan_expiry_keywords: Vec<String>,
    /// Pre-scan: keywords reported back in `matched_keywords`
    pub prescan_tracked_keywords: Vec<String>,
    /// Company suffixes for the unlabeled manufacturer fallback, longest first
    pub manufacturer_suffixes: Vec<String>,
    /// Section headers on a label; a header followed by a colon ends the
    /// previous field's value
    pub field_labels: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            dosage_forms: strings(&[
                "片", "胶囊", "颗粒", "丸", "口服液", "注射液", "软膏", "滴眼液", "栓剂", "贴剂",
                "喷雾剂", "糖浆", "冲剂", "散剂", "膏剂", "酊剂", "洗剂", "搽剂",
            ]),
            name_fallback_forms: strings(&[
                "片", "胶囊", "颗粒", "丸", "口服液", "注射液", "软膏", "滴眼液",
            ]),
            route_keywords: strings(&[
                "口服", "外用", "静脉注射", "肌肉注射", "皮下注射", "舌下含服", "直肠给药",
                "阴道给药", "滴眼", "滴耳", "滴鼻", "吸入",
            ]),
            prescan_name_keywords: strings(&["片", "胶囊", "颗粒", "丸", "口服液", "注射液"]),
            prescan_usage_keywords: strings(&["用法", "服用", "口服", "外用"]),
            prescan_dosage_keywords: strings(&["用量", "剂量", "一次", "一日"]),
            prescan_expiry_keywords: strings(&["有效期", "失效期", "生产日期"]),
            prescan_tracked_keywords: strings(&[
                "片", "胶囊", "颗粒", "丸", "口服液", "注射液", "用法", "用量", "有效期",
                "生产日期",
            ]),
            manufacturer_suffixes: strings(&["股份有限公司", "制药有限公司", "有限公司", "制药厂"]),
            field_labels: strings(&[
                "通用名称", "商品名称", "药品名称", "英文名称", "汉语拼音", "品名", "成份", "成分",
                "性状", "适应症", "功能主治", "规格", "用法用量", "用法", "用量", "剂量",
                "服用方法", "给药途径", "不良反应", "副作用", "禁忌症", "禁忌", "注意事项", "贮藏",
                "储存", "保存", "存放", "包装", "生产厂家", "生产企业", "制造商", "企业名称",
                "生产地址", "地址", "电话", "批准文号", "有效期至", "有效期", "失效期", "失效日期",
                "生产日期", "生产批号", "产品批号", "批号",
            ]),
        }
    }
}

/// Vocabulary entries as written in the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VocabularyExtensions {
    dosage_forms: Vec<String>,
    name_fallback_forms: Vec<String>,
    route_keywords: Vec<String>,
    prescan_name_keywords: Vec<String>,
    prescan_usage_keywords: Vec<String>,
    prescan_dosage_keywords: Vec<String>,
    prescan_expiry_keywords: Vec<String>,
    prescan_tracked_keywords: Vec<String>,
    manufacturer_suffixes: Vec<String>,
    field_labels: Vec<String>,
}

fn extend_unique(list: &mut Vec<String>, extra: Vec<String>) {
    for item in extra {
        if !item.is_empty() && !list.contains(&item) {
            list.push(item);
        }
    }
}

impl From<VocabularyExtensions> for Vocabulary {
    fn from(extra: VocabularyExtensions) -> Self {
        let mut vocab = Vocabulary::default();
        extend_unique(&mut vocab.dosage_forms, extra.dosage_forms);
        extend_unique(&mut vocab.name_fallback_forms, extra.name_fallback_forms);
        extend_unique(&mut vocab.route_keywords, extra.route_keywords);
        extend_unique(&mut vocab.prescan_name_keywords, extra.prescan_name_keywords);
        extend_unique(&mut vocab.prescan_usage_keywords, extra.prescan_usage_keywords);
        extend_unique(&mut vocab.prescan_dosage_keywords, extra.prescan_dosage_keywords);
        extend_unique(&mut vocab.prescan_expiry_keywords, extra.prescan_expiry_keywords);
        extend_unique(&mut vocab.prescan_tracked_keywords, extra.prescan_tracked_keywords);
        extend_unique(&mut vocab.manufacturer_suffixes, extra.manufacturer_suffixes);
        extend_unique(&mut vocab.field_labels, extra.field_labels);
        vocab
    }
}
