//! プロンプト生成モジュール
//!
//! 設定ファイルのテンプレートに含まれる名前付きプレースホルダ
//! （`{categories}`, `{length_choices}`, `{stylists}`, `{coupons}`,
//! `{category}`, `{color}`, `{cut_technique}`, `{styling}`, `{impression}`）
//! を埋めてプロンプト文字列を作る。

use crate::types::{Candidate, ClassificationResult};

/// 分類プロンプトの既定値
pub const DEFAULT_CLASSIFICATION_PROMPT: &str = r#"あなたはヘアサロンのスタイル写真を分類する美容師です。

## カテゴリ
以下から最も適切なものを1つ選択：
{categories}

## 出力形式（厳密にこのJSON形式で出力）
{
  "category": "カテゴリから選択",
  "features": {
    "color": "髪色の説明",
    "cut_technique": "カット技法",
    "styling": "スタイリング方法",
    "impression": "全体の印象"
  },
  "keywords": ["特徴的なキーワード", "..."]
}

## 注意
- カテゴリは上記リスト以外を出力しない
- キーワードは最大3つ
- JSONのみ出力。説明文は不要"#;

/// 性別・長さ判定プロンプトの既定値
pub const DEFAULT_ATTRIBUTE_PROMPT: &str = r#"写真のヘアスタイルの性別と長さを判定してください。

## 長さの選択肢
{length_choices}

## 出力形式（厳密にこのJSON形式で出力）
{"sex": "ladies または mens", "length": "長さの選択肢から1つ"}

JSONのみ出力。説明文は不要"#;

/// スタイリスト選択プロンプトの既定値
pub const DEFAULT_STYLIST_PROMPT: &str = r#"以下のスタイルを担当するのに最も適したスタイリストを1人選んでください。

## スタイル
カテゴリ: {category}
髪色: {color}
カット技法: {cut_technique}
スタイリング: {styling}
印象: {impression}

## スタイリスト一覧
{stylists}

## 出力形式
{"name": "一覧の名前をそのまま", "reason": "選択理由"}

一覧にない名前は出力しない。JSONのみ出力"#;

/// クーポン選択プロンプトの既定値
pub const DEFAULT_COUPON_PROMPT: &str = r#"以下のスタイルに最も合うクーポンを1つ選んでください。

## スタイル
カテゴリ: {category}
髪色: {color}
カット技法: {cut_technique}
スタイリング: {styling}
印象: {impression}

## クーポン一覧
{coupons}

## 出力形式
{"name": "一覧のクーポン名をそのまま", "reason": "選択理由"}

一覧にない名前は出力しない。JSONのみ出力"#;

/// テンプレート中の `{name}` を値で置換する
///
/// 未知のプレースホルダやJSON例の波括弧はそのまま残す。
pub fn render_prompt(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (name, value) in vars {
        rendered = rendered.replace(&format!("{{{}}}", name), value);
    }
    rendered
}

/// 選択肢を「- xxx」形式の行リストにする
pub fn bullet_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 候補一覧を「- 名前: 説明」形式にする
pub fn candidate_list<C: Candidate>(candidates: &[C]) -> String {
    candidates
        .iter()
        .map(|c| {
            let detail = c.detail().trim();
            if detail.is_empty() {
                format!("- {}", c.name())
            } else {
                format!("- {}: {}", c.name(), detail)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 分類プロンプト
pub fn build_classification_prompt(template: &str, categories: &[String]) -> String {
    render_prompt(template, &[("categories", &bullet_list(categories))])
}

/// 属性プロンプト
pub fn build_attribute_prompt(template: &str, length_choices: &[String]) -> String {
    render_prompt(template, &[("length_choices", &bullet_list(length_choices))])
}

/// 候補選択プロンプト（`list_placeholder` は "stylists" または "coupons"）
pub fn build_selection_prompt<C: Candidate>(
    template: &str,
    list_placeholder: &str,
    candidates: &[C],
    classification: &ClassificationResult,
) -> String {
    let list = candidate_list(candidates);
    let f = &classification.features;
    render_prompt(
        template,
        &[
            (list_placeholder, list.as_str()),
            ("category", classification.category.as_str()),
            ("color", f.color.as_str()),
            ("cut_technique", f.cut_technique.as_str()),
            ("styling", f.styling.as_str()),
            ("impression", f.impression.as_str()),
        ],
    )
}
