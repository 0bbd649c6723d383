use crate::analyzer::retry::FailureReason;
use std::fmt;
use thiserror::Error;

/// 実行全体のエラー（設定不備やExcel出力失敗など、処理を止めるもの）
#[derive(Error, Debug)]
pub enum HairstyleError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。設定ファイルの gemini.api_key か環境変数 GEMINI_API_KEY を設定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像が見つかりません: {0}")]
    NoImagesFound(String),

    #[error("スクレイピングエラー: {0}")]
    Scrape(String),

    #[error("Excel生成エラー: {0}")]
    ExcelGeneration(String),

    #[error("HTTPクライアント初期化エラー: {0}")]
    HttpClient(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML解析エラー: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] hairstyle_analyzer_common::Error),
}

pub type Result<T> = std::result::Result<T, HairstyleError>;

/// パイプラインの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Classification,
    Attribute,
    StylistMatch,
    CouponMatch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Classification => "classification",
            Stage::Attribute => "attribute",
            Stage::StylistMatch => "stylist_match",
            Stage::CouponMatch => "coupon_match",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1画像の1段階が失敗した理由（バッチは止めない）
#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("{stage}: {attempts}回試行してもすべて失敗しました（最後の理由: {last}）")]
    Exhausted {
        stage: Stage,
        attempts: u32,
        last: FailureReason,
    },

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("処理中にワーカーが異常終了しました: {0}")]
    Aborted(String),
}

impl StageError {
    /// 失敗した段階（画像読み込み等は None）
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageError::Exhausted { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// 分類段階のエラー
pub type ClassificationError = StageError;
