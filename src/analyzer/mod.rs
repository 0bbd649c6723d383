//! AI解析
//!
//! - client: VisionModelトレイトとGeminiクライアント
//! - retry: リトライ/フォールバックの状態機械とペーサー
//! - cache: 内容ハッシュキーのキャッシュ
//! - invoker: スタイル分類
//! - attribute: 性別・長さ判定

pub mod attribute;
pub mod cache;
pub mod client;
pub mod invoker;
pub mod retry;

pub use attribute::AttributeResolver;
pub use cache::{ContentCache, SharedCache};
pub use client::{CallError, GeminiClient, ImagePayload, ModelRequest, VisionModel};
pub use invoker::ModelInvoker;
pub use retry::{FailureReason, Pacer, RetryPolicy};

use crate::config::GeminiConfig;
use crate::error::StageError;
use crate::scanner::ImageTask;

/// メモリに読み込んだ画像
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub file_name: String,
    /// 内容ハッシュ（SHA-256, hex）
    pub hash: String,
    pub payload: ImagePayload,
}

impl LoadedImage {
    /// 画像ファイルを読み込む
    pub async fn load(task: &ImageTask) -> Result<Self, StageError> {
        let bytes = tokio::fs::read(&task.path)
            .await
            .map_err(|e| StageError::ImageLoad(format!("{}: {}", task.path.display(), e)))?;

        if bytes.is_empty() {
            return Err(StageError::ImageLoad(format!("{}: 空のファイルです", task.path.display())));
        }

        Ok(Self {
            file_name: task.file_name.clone(),
            hash: task.hash.clone(),
            payload: ImagePayload::from_bytes(bytes),
        })
    }
}

/// 試す順のモデル名（プライマリ、必要ならフォールバック）
pub fn model_chain(config: &GeminiConfig, with_fallback: bool) -> Vec<String> {
    let mut models = vec![config.model.clone()];
    if with_fallback {
        if let Some(fallback) = config.fallback_model.as_deref() {
            let fallback = fallback.trim();
            if !fallback.is_empty() && fallback != config.model {
                models.push(fallback.to_string());
            }
        }
    }
    models
}
