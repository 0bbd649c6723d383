//! APIレスポンスパーサー
//!
//! AIのレスポンス文字列からJSONオブジェクトを抽出し、
//! 厳密なスキーマで検証してから内部型に変換する。
//! 未知フィールド・必須フィールド欠落・許可リスト外の値はすべてエラー。

use crate::error::{Error, Result};
use crate::types::{AttributeResult, ClassificationResult, Sex, StyleFeatures};
use serde::Deserialize;

/// APIレスポンスからJSON部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 生の {...} オブジェクト
/// 3. エラー
///
/// # Examples
/// ```
/// use hairstyle_analyzer_common::extract_json;
///
/// let response = "結果: {\"category\": \"ボブ\"}";
/// let json = extract_json(response).unwrap();
/// assert_eq!(json, "{\"category\": \"ボブ\"}");
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    // ```json ... ``` ブロックを探す
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7; // "```json" の長さ
        if let Some(end_offset) = response[start..].find("```") {
            let end = start + end_offset;
            return Ok(response[start..end].trim());
        }
    }

    // 生の {...} を探す
    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end >= start {
                return Ok(&response[start..=end]);
            }
        }
    }

    Err(Error::Parse("JSONが見つかりません".into()))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFeatures {
    color: String,
    cut_technique: String,
    styling: String,
    impression: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClassification {
    category: String,
    features: RawFeatures,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAttribute {
    sex: String,
    length: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSelection {
    name: String,
    #[serde(default)]
    #[allow(dead_code)]
    reason: Option<String>,
}

fn parse_object<'a, T: Deserialize<'a>>(response: &'a str, label: &str) -> Result<T> {
    let json_str = extract_json(response)?;
    serde_json::from_str(json_str.trim())
        .map_err(|e| Error::Parse(format!("{} JSONパースエラー: {}", label, e)))
}

/// 分類レスポンスをパース
///
/// # Arguments
/// * `response` - AIのレスポンス
/// * `categories` - 許可されたカテゴリ
/// * `max_keywords` - キーワードの最大数（超過分は切り捨て）
pub fn parse_classification(
    response: &str,
    categories: &[String],
    max_keywords: usize,
) -> Result<ClassificationResult> {
    let raw: RawClassification = parse_object(response, "分類")?;

    let category = raw.category.trim();
    if !categories.iter().any(|c| c == category) {
        return Err(Error::Validation(format!(
            "カテゴリ「{}」は候補にありません",
            category
        )));
    }

    let keywords = raw
        .keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .take(max_keywords)
        .collect();

    Ok(ClassificationResult {
        category: category.to_string(),
        features: StyleFeatures {
            color: raw.features.color.trim().to_string(),
            cut_technique: raw.features.cut_technique.trim().to_string(),
            styling: raw.features.styling.trim().to_string(),
            impression: raw.features.impression.trim().to_string(),
        },
        keywords,
    })
}

/// 性別・長さレスポンスをパース
pub fn parse_attribute(response: &str, length_choices: &[String]) -> Result<AttributeResult> {
    let raw: RawAttribute = parse_object(response, "属性")?;

    let sex: Sex = raw.sex.parse().map_err(Error::Validation)?;

    let length = raw.length.trim();
    if !length_choices.iter().any(|c| c == length) {
        return Err(Error::Validation(format!(
            "長さ「{}」は選択肢にありません",
            length
        )));
    }

    Ok(AttributeResult {
        sex,
        length: length.to_string(),
    })
}

/// 候補選択レスポンスをパース
///
/// 返された名前が候補名のいずれかと完全一致した場合のみ成功。
pub fn parse_selection(response: &str, candidate_names: &[&str]) -> Result<String> {
    let raw: RawSelection = parse_object(response, "候補選択")?;
    let name = raw.name.trim();

    candidate_names
        .iter()
        .find(|candidate| **candidate == name)
        .map(|candidate| candidate.to_string())
        .ok_or_else(|| Error::Validation(format!("「{}」は候補一覧にありません", name)))
}
