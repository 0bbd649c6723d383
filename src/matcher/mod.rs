//! スタイリスト・クーポン照合
//!
//! スクレイピングした候補一覧と分類結果をAIに渡し、最も合う1件を選ばせる。
//! 返された名前は候補名と完全一致した場合のみ採用する（キャッシュしない）。

use std::sync::Arc;
use tracing::{debug, warn};

use hairstyle_analyzer_common::{
    parse_selection, prompts::build_selection_prompt, Candidate, ClassificationResult,
    CouponCandidate, MatchResult, StylistCandidate,
};

use crate::analyzer::retry::{call_with_retry, FailureReason, Pacer, RetryPolicy, StageCall};
use crate::analyzer::{model_chain, VisionModel};
use crate::config::{GeminiConfig, MatchingConfig};
use crate::error::{Stage, StageError};

pub struct MatchSelector {
    model: Arc<dyn VisionModel>,
    models: Vec<String>,
    policy: RetryPolicy,
    stylist_prompt: String,
    coupon_prompt: String,
    max_tokens: u32,
    temperature: f32,
}

impl MatchSelector {
    pub fn new(model: Arc<dyn VisionModel>, gemini: &GeminiConfig, matching: &MatchingConfig) -> Self {
        Self {
            model,
            models: model_chain(gemini, matching.use_fallback_model),
            policy: RetryPolicy {
                max_retries: gemini.max_retries,
                retry_delay: gemini.retry_delay(),
                timeout: gemini.timeout(),
            },
            stylist_prompt: gemini.stylist_prompt_template.clone(),
            coupon_prompt: gemini.coupon_prompt_template.clone(),
            max_tokens: gemini.max_tokens,
            temperature: gemini.temperature,
        }
    }

    pub async fn select_stylist(
        &self,
        candidates: &[StylistCandidate],
        classification: &ClassificationResult,
        pacer: &mut Pacer,
    ) -> Result<MatchResult, StageError> {
        self.select(Stage::StylistMatch, &self.stylist_prompt, "stylists", candidates, classification, pacer)
            .await
    }

    pub async fn select_coupon(
        &self,
        candidates: &[CouponCandidate],
        classification: &ClassificationResult,
        pacer: &mut Pacer,
    ) -> Result<MatchResult, StageError> {
        self.select(Stage::CouponMatch, &self.coupon_prompt, "coupons", candidates, classification, pacer)
            .await
    }

    async fn select<C: Candidate + Sync>(
        &self,
        stage: Stage,
        template: &str,
        list_placeholder: &str,
        candidates: &[C],
        classification: &ClassificationResult,
        pacer: &mut Pacer,
    ) -> Result<MatchResult, StageError> {
        if candidates.is_empty() {
            debug!(stage = %stage, "候補が空のためAIを呼ばずに none found");
            return Ok(MatchResult::NotFound);
        }

        let names: Vec<&str> = candidates.iter().map(|c| c.name()).collect();
        let prompt = build_selection_prompt(template, list_placeholder, candidates, classification);
        let call = StageCall {
            stage,
            models: &self.models,
            prompt: &prompt,
            image: None,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let outcome = call_with_retry(self.model.as_ref(), &call, &self.policy, pacer, |text| {
            parse_selection(text, &names).map_err(FailureReason::from)
        })
        .await;

        match outcome {
            Ok(name) => Ok(MatchResult::Selected(name)),
            // 候補外の名前しか返ってこなかった
            Err(StageError::Exhausted { last, attempts, .. }) if last.is_validation() => {
                warn!(stage = %stage, attempts, reason = %last, "候補一覧にない名前のみ返されたため none found");
                Ok(MatchResult::NotFound)
            }
            Err(e) => Err(e),
        }
    }
}
