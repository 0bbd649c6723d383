//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// レスポンスからJSONを取り出せない、またはスキーマに合わない
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSONとしては正しいが値が許可リスト外
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
