//! スタイル分類の呼び出し
//!
//! キャッシュ → プライマリモデル → フォールバックモデル の順に試す。
//! 成功した結果はキャッシュへ書き込む。

use std::sync::Arc;
use tracing::debug;

use hairstyle_analyzer_common::{
    parse_classification, prompts::build_classification_prompt, ClassificationResult,
};

use super::cache::{cache_key, CacheKind, SharedCache};
use super::client::VisionModel;
use super::retry::{call_with_retry, FailureReason, Pacer, RetryPolicy, StageCall};
use super::{model_chain, LoadedImage};
use crate::config::GeminiConfig;
use crate::error::{ClassificationError, Stage};

pub struct ModelInvoker {
    model: Arc<dyn VisionModel>,
    cache: SharedCache,
    models: Vec<String>,
    policy: RetryPolicy,
    max_tokens: u32,
    temperature: f32,
    max_keywords: usize,
}

impl ModelInvoker {
    pub fn new(model: Arc<dyn VisionModel>, cache: SharedCache, config: &GeminiConfig) -> Self {
        Self {
            model,
            cache,
            models: model_chain(config, true),
            policy: RetryPolicy {
                max_retries: config.max_retries,
                retry_delay: config.retry_delay(),
                timeout: config.timeout(),
            },
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_keywords: config.max_keywords,
        }
    }

    /// 画像を分類する
    ///
    /// # Arguments
    /// * `image` - 読み込み済み画像（内容ハッシュ付き）
    /// * `prompt_template` - `{categories}` を含むプロンプト
    /// * `categories` - 許可されたカテゴリ
    /// * `pacer` - 呼び出しワーカーのペーサー
    pub async fn classify(
        &self,
        image: &LoadedImage,
        prompt_template: &str,
        categories: &[String],
        pacer: &mut Pacer,
    ) -> Result<ClassificationResult, ClassificationError> {
        let key = cache_key(&image.hash, CacheKind::Classification);

        let cached: Option<ClassificationResult> = self.cache.lock().get_as(&key);
        if let Some(result) = cached {
            // カテゴリ設定が変わっていたら使わない
            if categories.iter().any(|c| *c == result.category) {
                debug!(file = image.file_name.as_str(), "分類キャッシュヒット");
                return Ok(result);
            }
        }

        let prompt = build_classification_prompt(prompt_template, categories);
        let call = StageCall {
            stage: Stage::Classification,
            models: &self.models,
            prompt: &prompt,
            image: Some(&image.payload),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let result = call_with_retry(self.model.as_ref(), &call, &self.policy, pacer, |text| {
            parse_classification(text, categories, self.max_keywords).map_err(FailureReason::from)
        })
        .await?;

        // 保存失敗はキャッシュしないだけ
        if let Err(e) = self.cache.lock().put_as(key, &result) {
            debug!(error = %e, "分類結果をキャッシュできません");
        }

        Ok(result)
    }
}
