//! 性別・長さの判定
//!
//! 分類結果からは導かず、同じ画像に対して独立したAI呼び出しを行う。

use std::sync::Arc;
use tracing::debug;

use hairstyle_analyzer_common::{parse_attribute, prompts::build_attribute_prompt, AttributeResult};

use super::cache::{cache_key, CacheKind, SharedCache};
use super::client::VisionModel;
use super::retry::{call_with_retry, FailureReason, Pacer, RetryPolicy, StageCall};
use super::{model_chain, LoadedImage};
use crate::config::GeminiConfig;
use crate::error::{Stage, StageError};

pub struct AttributeResolver {
    model: Arc<dyn VisionModel>,
    cache: SharedCache,
    models: Vec<String>,
    policy: RetryPolicy,
    prompt_template: String,
    length_choices: Vec<String>,
    max_tokens: u32,
    temperature: f32,
}

impl AttributeResolver {
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
            prompt_template: config.attribute_prompt_template.clone(),
            length_choices: config.length_choices.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub async fn resolve(&self, image: &LoadedImage, pacer: &mut Pacer) -> Result<AttributeResult, StageError> {
        let key = cache_key(&image.hash, CacheKind::Attribute);

        let cached: Option<AttributeResult> = self.cache.lock().get_as(&key);
        if let Some(result) = cached {
            if self.length_choices.iter().any(|c| *c == result.length) {
                debug!(file = image.file_name.as_str(), "属性キャッシュヒット");
                return Ok(result);
            }
        }

        let prompt = build_attribute_prompt(&self.prompt_template, &self.length_choices);
        let call = StageCall {
            stage: Stage::Attribute,
            models: &self.models,
            prompt: &prompt,
            image: Some(&image.payload),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let result = call_with_retry(self.model.as_ref(), &call, &self.policy, pacer, |text| {
            parse_attribute(text, &self.length_choices).map_err(FailureReason::from)
        })
        .await?;

        if let Err(e) = self.cache.lock().put_as(key, &result) {
            debug!(error = %e, "属性結果をキャッシュできません");
        }

        Ok(result)
    }
}
