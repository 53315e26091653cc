//! Text recognition: the OCR collaborator, frame conditioning before the
//! OCR call, and drug field extraction from the returned blocks.

pub mod baidu;
pub mod engine;
pub mod extract;
pub mod preprocess;

pub use baidu::BaiduOcr;
pub use engine::{BoundingBox, OcrEngine, OcrError, StaticOcr, TextBlock};
pub use extract::{
    DrugExtractor, DrugRecord, ExtractionFault, FaultCode, UNKNOWN_DRUG, assemble_text,
    block_confidence,
};
pub use preprocess::{PreparedImage, PreprocessConfig, condition_image, preprocess};
