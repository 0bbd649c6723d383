//! 解析結果の型定義
//!
//! CLIと出力処理で共有される型:
//! - ClassificationResult: スタイル分類（カテゴリ・特徴・キーワード）
//! - AttributeResult: 性別・長さ属性
//! - StylistCandidate / CouponCandidate: サロンサイトから取得した候補
//! - MatchResult: 候補からの選択結果
//! - OutputRecord: Excel 1行分（A〜I列）

use serde::{Deserialize, Serialize};
use std::fmt;

/// 分類が最終的に失敗した画像に付けるカテゴリ
pub const UNCLASSIFIED: &str = "unclassified";

/// 照合できなかった場合の表示
pub const NONE_FOUND: &str = "none found";

/// 上流の値が欠けている列の表示
pub const EMPTY_MARKER: &str = "";

/// スタイルの特徴
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleFeatures {
    pub color: String,
    pub cut_technique: String,
    pub styling: String,
    pub impression: String,
}

impl StyleFeatures {
    /// テンプレートのスコア計算に使う値
    pub fn values(&self) -> [&str; 4] {
        [
            self.color.as_str(),
            self.cut_technique.as_str(),
            self.styling.as_str(),
            self.impression.as_str(),
        ]
    }
}

/// スタイル分類結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    pub features: StyleFeatures,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ClassificationResult {
    /// リトライ枯渇時の番兵値
    pub fn unclassified() -> Self {
        Self {
            category: UNCLASSIFIED.to_string(),
            ..Default::default()
        }
    }

    pub fn is_unclassified(&self) -> bool {
        self.category == UNCLASSIFIED
    }
}

/// 性別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Ladies,
    Mens,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Ladies => "ladies",
            Sex::Mens => "mens",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ladies" => Ok(Sex::Ladies),
            "mens" => Ok(Sex::Mens),
            _ => Err(format!("Unknown sex: {}. Use ladies or mens", s)),
        }
    }
}

/// 性別・長さ属性
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeResult {
    pub sex: Sex,
    pub length: String,
}

/// スタイリスト候補
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylistCandidate {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// クーポン候補
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponCandidate {
    pub name: String,
    #[serde(default)]
    pub text: String,
}

/// 名前と説明を持つ照合候補
pub trait Candidate {
    fn name(&self) -> &str;
    fn detail(&self) -> &str;
}

impl Candidate for StylistCandidate {
    fn name(&self) -> &str {
        &self.name
    }

    fn detail(&self) -> &str {
        &self.description
    }
}

impl Candidate for CouponCandidate {
    fn name(&self) -> &str {
        &self.name
    }

    fn detail(&self) -> &str {
        &self.text
    }
}

/// 候補照合の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MatchResult {
    Selected(String),
    #[default]
    NotFound,
}

impl MatchResult {
    pub fn name(&self) -> Option<&str> {
        match self {
            MatchResult::Selected(name) => Some(name),
            MatchResult::NotFound => None,
        }
    }

    /// 出力セルに書く文字列
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(NONE_FOUND)
    }
}

/// Excel出力の1行（列順はA〜I固定）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub stylist_name: String,  // A
    pub coupon_name: String,   // B
    pub comment: String,       // C
    pub style_title: String,   // D
    pub sex: String,           // E
    pub length: String,        // F
    pub style_menu: String,    // G
    pub hashtags: String,      // H
    pub image_filename: String, // I
}

impl OutputRecord {
    /// 列記号（ヘッダー設定のキー）
    pub const COLUMNS: [&'static str; 9] = ["A", "B", "C", "D", "E", "F", "G", "H", "I"];

    /// A〜I列の順に値を返す
    pub fn to_row(&self) -> [&str; 9] {
        [
            self.stylist_name.as_str(),
            self.coupon_name.as_str(),
            self.comment.as_str(),
            self.style_title.as_str(),
            self.sex.as_str(),
            self.length.as_str(),
            self.style_menu.as_str(),
            self.hashtags.as_str(),
            self.image_filename.as_str(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_serde_lowercase() {
        let json = serde_json::to_string(&Sex::Ladies).unwrap();
        assert_eq!(json, "\"ladies\"");
        let sex: Sex = serde_json::from_str("\"mens\"").unwrap();
        assert_eq!(sex, Sex::Mens);
        assert!(serde_json::from_str::<Sex>("\"unisex\"").is_err());
    }

    #[test]
    fn test_sex_from_str() {
        assert_eq!("LADIES".parse::<Sex>().unwrap(), Sex::Ladies);
        assert!("other".parse::<Sex>().is_err());
    }

    #[test]
    fn test_unclassified_sentinel() {
        let result = ClassificationResult::unclassified();
        assert!(result.is_unclassified());
        assert!(result.keywords.is_empty());
    }

    #[test]
    fn test_match_result_display() {
        assert_eq!(MatchResult::Selected("佐藤".into()).display_name(), "佐藤");
        assert_eq!(MatchResult::NotFound.display_name(), NONE_FOUND);
    }

    #[test]
    fn test_output_record_column_order() {
        let record = OutputRecord {
            stylist_name: "a".into(),
            coupon_name: "b".into(),
            comment: "c".into(),
            style_title: "d".into(),
            sex: "e".into(),
            length: "f".into(),
            style_menu: "g".into(),
            hashtags: "h".into(),
            image_filename: "i".into(),
        };
        assert_eq!(record.to_row(), ["a", "b", "c", "d", "e", "f", "g", "h", "i"]);
        assert_eq!(OutputRecord::COLUMNS.len(), record.to_row().len());
    }
}
