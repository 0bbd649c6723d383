//! 出力レコード組み立て（純粋関数）
//!
//! 分類・属性・照合結果・テンプレート・ファイル名を1行のOutputRecordにまとめる。
//! 上流の値が欠けている列は空マーカーで埋め、列を省略しない。

use crate::template::StyleTemplate;
use crate::types::{
    AttributeResult, ClassificationResult, MatchResult, OutputRecord, EMPTY_MARKER,
};

/// 1画像分の組み立て材料
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParts<'a> {
    pub image_filename: &'a str,
    pub classification: Option<&'a ClassificationResult>,
    pub attribute: Option<&'a AttributeResult>,
    pub stylist: Option<&'a MatchResult>,
    pub coupon: Option<&'a MatchResult>,
    pub template: Option<&'a StyleTemplate>,
}

/// レコードを組み立てる
pub fn assemble_record(parts: &RecordParts<'_>) -> OutputRecord {
    let (comment, style_title, style_menu, hashtags) = match (parts.template, parts.classification) {
        (Some(t), _) => (
            t.comment.clone(),
            t.title.clone(),
            t.menu.clone(),
            t.hashtag.clone(),
        ),
        (None, Some(c)) => (
            c.features.impression.clone(),
            c.category.clone(),
            EMPTY_MARKER.to_string(),
            format_hashtags(&c.keywords),
        ),
        (None, None) => (
            EMPTY_MARKER.to_string(),
            EMPTY_MARKER.to_string(),
            EMPTY_MARKER.to_string(),
            EMPTY_MARKER.to_string(),
        ),
    };

    let (sex, length) = parts
        .attribute
        .map(|a| (a.sex.to_string(), a.length.clone()))
        .unwrap_or_else(|| (EMPTY_MARKER.to_string(), EMPTY_MARKER.to_string()));

    OutputRecord {
        stylist_name: match_cell(parts.stylist),
        coupon_name: match_cell(parts.coupon),
        comment,
        style_title,
        sex,
        length,
        style_menu,
        hashtags,
        image_filename: parts.image_filename.to_string(),
    }
}

/// 出力前の並べ替え（ファイル名順）
pub fn sort_records(records: &mut [OutputRecord]) {
    records.sort_by(|a, b| a.image_filename.cmp(&b.image_filename));
}

fn match_cell(result: Option<&MatchResult>) -> String {
    result
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| EMPTY_MARKER.to_string())
}

/// キーワードを「#a,#b」形式にする
fn format_hashtags(keywords: &[String]) -> String {
    keywords
        .iter()
        .map(|k| {
            if k.starts_with('#') {
                k.clone()
            } else {
                format!("#{}", k)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
