//! スタイルテンプレートモジュール
//!
//! サロンが用意したテンプレートCSV（category,title,menu,comment,hashtag）を読み込み、
//! 分類結果に最も近いテンプレートをAIを使わずに決定的に選ぶ。

use crate::error::{Error, Result};
use crate::types::ClassificationResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// CSVの1行
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleTemplate {
    pub category: String,
    pub title: String,
    pub menu: String,
    pub comment: String,
    pub hashtag: String,
}

impl StyleTemplate {
    /// キーワード・特徴値がテンプレート本文に何回現れるか
    fn score(&self, classification: &ClassificationResult) -> usize {
        let haystack = [
            self.title.as_str(),
            self.menu.as_str(),
            self.comment.as_str(),
            self.hashtag.as_str(),
        ];

        classification
            .keywords
            .iter()
            .map(String::as_str)
            .chain(classification.features.values())
            .filter(|term| !term.is_empty())
            .filter(|term| haystack.iter().any(|text| text.contains(term)))
            .count()
    }
}

/// テンプレート一覧
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateCatalog {
    templates: Vec<StyleTemplate>,
}

impl TemplateCatalog {
    pub fn new(templates: Vec<StyleTemplate>) -> Self {
        Self { templates }
    }

    /// CSVファイルから読み込み
    pub fn from_csv(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_csv_str(&content)
    }

    /// CSV文字列から読み込み（1行目はヘッダー、列数は5列ちょうど）
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let mut templates = Vec::new();

        for row in parse_csv(content)?.into_iter().skip(1) {
            if row.fields.iter().all(|f| f.is_empty()) {
                continue;
            }
            let [category, title, menu, comment, hashtag]: [String; 5] =
                row.fields.try_into().map_err(|fields: Vec<String>| {
                    Error::Parse(format!(
                        "テンプレートCSV {}行目: 列数は5列である必要があります（{}列）",
                        row.line,
                        fields.len()
                    ))
                })?;

            templates.push(StyleTemplate {
                category,
                title,
                menu,
                comment,
                hashtag,
            });
        }

        Ok(Self { templates })
    }

    pub fn templates(&self) -> &[StyleTemplate] {
        &self.templates
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// カテゴリ一覧（ファイル内の出現順、重複なし）
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for template in &self.templates {
            if !template.category.is_empty() && !categories.contains(&template.category) {
                categories.push(template.category.clone());
            }
        }
        categories
    }

    /// 分類結果のカテゴリ内でスコア最大のテンプレート（同点は先頭優先）
    pub fn best_for(&self, classification: &ClassificationResult) -> Option<&StyleTemplate> {
        let mut best: Option<(&StyleTemplate, usize)> = None;

        for template in self
            .templates
            .iter()
            .filter(|t| t.category == classification.category)
        {
            let score = template.score(classification);
            match best {
                Some((_, best_score)) if best_score >= score => {}
                _ => best = Some((template, score)),
            }
        }

        best.map(|(template, _)| template)
    }
}

/// CSVの1レコード
struct CsvRow {
    /// レコードが始まる行番号（1始まり）
    line: usize,
    fields: Vec<String>,
}

/// CSV全体をレコードに分割
///
/// ダブルクォート、`""` エスケープ、クォート内の改行に対応。
fn parse_csv(content: &str) -> Result<Vec<CsvRow>> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut row_start = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
                rows.push(CsvRow {
                    line: row_start,
                    fields: std::mem::take(&mut fields),
                });
                line += 1;
                row_start = line;
            }
            '\n' => {
                current.push(c);
                line += 1;
            }
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err(Error::Parse(format!(
            "テンプレートCSV {}行目: クォートが閉じていません",
            row_start
        )));
    }
    if !current.is_empty() || !fields.is_empty() {
        fields.push(current.trim().to_string());
        rows.push(CsvRow {
            line: row_start,
            fields,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StyleFeatures;

    const TEST_CSV: &str = r##"category,title,menu,comment,hashtag
ボブ,大人ボブ,カット+カラー,"扱いやすい、上品なボブです","#ボブ,#大人可愛い"
ボブ,透明感アッシュボブ,カット+カラー,アッシュで透明感を,"#アッシュ,#透明感"
ショート,ハンサムショート,カット,"""かっこいい""ショート",#ショート
"##;

    fn classification(category: &str, keywords: &[&str], color: &str) -> ClassificationResult {
        ClassificationResult {
            category: category.to_string(),
            features: StyleFeatures {
                color: color.to_string(),
                ..Default::default()
            },
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_csv_quotes() {
        let rows = parse_csv(r#"a,"b,c","say ""hi""",d"#).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields, vec!["a", "b,c", "say \"hi\"", "d"]);
    }

    #[test]
    fn test_load_csv() {
        let catalog = TemplateCatalog::from_csv_str(TEST_CSV).unwrap();
        assert_eq!(catalog.templates().len(), 3);
        assert_eq!(catalog.templates()[0].comment, "扱いやすい、上品なボブです");
        assert_eq!(catalog.templates()[0].hashtag, "#ボブ,#大人可愛い");
        assert_eq!(catalog.templates()[1].hashtag, "#アッシュ,#透明感");
        assert_eq!(catalog.templates()[2].comment, "\"かっこいい\"ショート");
    }

    #[test]
    fn test_load_csv_quoted_newline() {
        let csv = "category,title,menu,comment,hashtag\r\n\
                   ボブ,大人ボブ,カット,\"1行目\n2行目\",#ボブ\r\n\
                   ショート,ショート,カット,短い,#ショート\r\n";
        let catalog = TemplateCatalog::from_csv_str(csv).unwrap();
        assert_eq!(catalog.templates().len(), 2);
        assert_eq!(catalog.templates()[0].comment, "1行目\n2行目");
        assert_eq!(catalog.templates()[0].hashtag, "#ボブ");
        assert_eq!(catalog.templates()[1].category, "ショート");
    }

    #[test]
    fn test_load_csv_rejects_short_rows() {
        let result = TemplateCatalog::from_csv_str("category,title\nボブ,大人ボブ\n");
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_load_csv_rejects_extra_fields() {
        // クォートしないハッシュタグは列が増える
        let csv = "category,title,menu,comment,hashtag\nボブ,大人ボブ,カット,上品,#ボブ,#大人可愛い\n";
        match TemplateCatalog::from_csv_str(csv) {
            Err(Error::Parse(msg)) => {
                assert!(msg.contains("2行目"));
                assert!(msg.contains("6列"));
            }
            other => panic!("unexpected: {:?}", other.map(|c| c.templates().len())),
        }
    }

    #[test]
    fn test_load_csv_unclosed_quote() {
        let csv = "category,title,menu,comment,hashtag\nボブ,大人ボブ,カット,\"閉じない,#ボブ\n";
        assert!(matches!(TemplateCatalog::from_csv_str(csv), Err(Error::Parse(_))));
    }

    #[test]
    fn test_categories_in_file_order() {
        let catalog = TemplateCatalog::from_csv_str(TEST_CSV).unwrap();
        assert_eq!(catalog.categories(), vec!["ボブ", "ショート"]);
    }

    #[test]
    fn test_best_for_prefers_keyword_hits() {
        let catalog = TemplateCatalog::from_csv_str(TEST_CSV).unwrap();
        let c = classification("ボブ", &["透明感"], "アッシュ");
        assert_eq!(catalog.best_for(&c).unwrap().title, "透明感アッシュボブ");
    }

    #[test]
    fn test_best_for_tie_keeps_first_row() {
        let catalog = TemplateCatalog::from_csv_str(TEST_CSV).unwrap();
        let c = classification("ボブ", &[], "");
        assert_eq!(catalog.best_for(&c).unwrap().title, "大人ボブ");
    }

    #[test]
    fn test_best_for_unknown_category() {
        let catalog = TemplateCatalog::from_csv_str(TEST_CSV).unwrap();
        let c = classification("ロング", &["透明感"], "");
        assert!(catalog.best_for(&c).is_none());
    }
}
