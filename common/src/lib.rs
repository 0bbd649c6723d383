//! Hairstyle Analyzer Common Library
//!
//! I/Oを持たない共有コード: データモデル、プロンプト生成、
//! レスポンス検証、テンプレート選択、レコード組み立て、Excelバッファ生成

pub mod types;
pub mod error;
pub mod prompts;
pub mod parser;
pub mod template;
pub mod record;
pub mod export;

pub use types::{
    AttributeResult, Candidate, ClassificationResult, CouponCandidate, MatchResult,
    OutputRecord, Sex, StyleFeatures, StylistCandidate, EMPTY_MARKER, NONE_FOUND,
    UNCLASSIFIED,
};
pub use error::{Error, Result};
pub use parser::{extract_json, parse_attribute, parse_classification, parse_selection};
pub use template::{StyleTemplate, TemplateCatalog};
pub use record::{assemble_record, sort_records, RecordParts};
