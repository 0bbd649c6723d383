//! リトライとモデルフォールバック
//!
//! 1段階分のAI呼び出しを状態機械として進める:
//!
//! ```text
//! Attempting{model, attempt} ─成功→ Succeeded
//!        │
//!        └─失敗→ Failed ─→ 同じモデルで再試行 / 次のモデルへ / Exhausted
//! ```
//!
//! モデルごとに `max_retries` 回まで試し、尽きたら次のモデル（フォールバック）へ進む。
//! 再試行不可の失敗（4xx）はそのモデルの残り回数を捨てて次へ進む。

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::client::{CallError, ImagePayload, ModelRequest, VisionModel};
use crate::error::{Stage, StageError};

/// 1回の試行が失敗した理由
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    Timeout,
    RateLimited,
    Transport(String),
    /// 5xx
    Server { status: u16, message: String },
    /// 5xx以外のHTTPエラー（再試行しない）
    Rejected { status: u16, message: String },
    EmptyResponse,
    MalformedJson(String),
    Validation(String),
}

impl FailureReason {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureReason::Rejected { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, FailureReason::Validation(_))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "タイムアウト"),
            FailureReason::RateLimited => write!(f, "レート制限"),
            FailureReason::Transport(msg) => write!(f, "通信エラー: {}", msg),
            FailureReason::Server { status, message } => write!(f, "サーバーエラー {}: {}", status, message),
            FailureReason::Rejected { status, message } => write!(f, "リクエスト拒否 {}: {}", status, message),
            FailureReason::EmptyResponse => write!(f, "空のレスポンス"),
            FailureReason::MalformedJson(msg) => write!(f, "JSON不正: {}", msg),
            FailureReason::Validation(msg) => write!(f, "検証エラー: {}", msg),
        }
    }
}

impl From<CallError> for FailureReason {
    fn from(err: CallError) -> Self {
        match err {
            CallError::RateLimited => FailureReason::RateLimited,
            CallError::Transport(msg) => FailureReason::Transport(msg),
            CallError::EmptyResponse => FailureReason::EmptyResponse,
            CallError::Http { status, message } if status >= 500 => FailureReason::Server { status, message },
            CallError::Http { status, message } => FailureReason::Rejected { status, message },
        }
    }
}

impl From<hairstyle_analyzer_common::Error> for FailureReason {
    fn from(err: hairstyle_analyzer_common::Error) -> Self {
        match err {
            hairstyle_analyzer_common::Error::Validation(msg) => FailureReason::Validation(msg),
            other => FailureReason::MalformedJson(other.to_string()),
        }
    }
}

/// 呼び出し1回あたりの再試行設定
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// モデルごとの試行回数（最低1）
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// 0ならタイムアウトなし
    pub timeout: Duration,
}

impl RetryPolicy {
    fn attempts_per_model(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// 状態機械の状態
#[derive(Debug, Clone, PartialEq)]
pub enum CallState<T> {
    Attempting { model: usize, attempt: u32 },
    Succeeded { model: usize, attempt: u32, value: T },
    Failed { model: usize, attempt: u32, reason: FailureReason },
    Exhausted { attempts: u32, last: FailureReason },
}

impl<T> CallState<T> {
    pub fn start() -> Self {
        CallState::Attempting { model: 0, attempt: 1 }
    }

    /// Failedからの遷移（それ以外の状態はそのまま）
    pub fn advance(self, policy: &RetryPolicy, model_count: usize, total_attempts: u32) -> Self {
        match self {
            CallState::Failed { model, attempt, reason } => {
                if reason.is_retryable() && attempt < policy.attempts_per_model() {
                    CallState::Attempting { model, attempt: attempt + 1 }
                } else if model + 1 < model_count {
                    CallState::Attempting { model: model + 1, attempt: 1 }
                } else {
                    CallState::Exhausted { attempts: total_attempts, last: reason }
                }
            }
            other => other,
        }
    }
}

/// ワーカー単位のAPI呼び出し間隔
///
/// 同じワーカーの連続した呼び出しの間に `delay` 以上空ける。
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last_call: Option<Instant>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last_call: None }
    }

    /// 次の呼び出しまで待つ
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// 1段階分の呼び出し内容
pub struct StageCall<'a> {
    pub stage: Stage,
    /// 試す順のモデル名（先頭がプライマリ）
    pub models: &'a [String],
    pub prompt: &'a str,
    pub image: Option<&'a ImagePayload>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// リトライとフォールバックを行いながらモデルを呼び、`validate` を通った値を返す
pub async fn call_with_retry<T, F>(
    model: &dyn VisionModel,
    call: &StageCall<'_>,
    policy: &RetryPolicy,
    pacer: &mut Pacer,
    validate: F,
) -> Result<T, StageError>
where
    F: Fn(&str) -> Result<T, FailureReason>,
{
    if call.models.is_empty() {
        return Err(StageError::Exhausted {
            stage: call.stage,
            attempts: 0,
            last: FailureReason::Rejected {
                status: 0,
                message: "モデルが設定されていません".into(),
            },
        });
    }

    let mut state: CallState<T> = CallState::start();
    let mut total_attempts = 0u32;

    loop {
        match state {
            CallState::Attempting { model: index, attempt } => {
                if total_attempts > 0 && !policy.retry_delay.is_zero() {
                    tokio::time::sleep(policy.retry_delay).await;
                }
                pacer.wait().await;
                total_attempts += 1;

                let model_name = call.models[index].as_str();
                debug!(stage = %call.stage, model = model_name, attempt, "AI呼び出し");

                let request = ModelRequest {
                    model: model_name,
                    prompt: call.prompt,
                    image: call.image,
                    max_tokens: call.max_tokens,
                    temperature: call.temperature,
                };

                let outcome = match invoke(model, &request, policy.timeout).await {
                    Ok(text) => validate(&text),
                    Err(reason) => Err(reason),
                };

                state = match outcome {
                    Ok(value) => CallState::Succeeded { model: index, attempt, value },
                    Err(reason) => {
                        warn!(stage = %call.stage, model = model_name, attempt, %reason, "AI呼び出し失敗");
                        CallState::Failed { model: index, attempt, reason }
                    }
                };
            }
            CallState::Failed { .. } => {
                state = state.advance(policy, call.models.len(), total_attempts);
            }
            CallState::Exhausted { attempts, last } => {
                return Err(StageError::Exhausted {
                    stage: call.stage,
                    attempts,
                    last,
                });
            }
            CallState::Succeeded { model: index, attempt, value } => {
                debug!(stage = %call.stage, model = call.models[index].as_str(), attempt, "AI呼び出し成功");
                return Ok(value);
            }
        }
    }
}

async fn invoke(
    model: &dyn VisionModel,
    request: &ModelRequest<'_>,
    timeout: Duration,
) -> Result<String, FailureReason> {
    if timeout.is_zero() {
        return model.generate(request).await.map_err(FailureReason::from);
    }

    match tokio::time::timeout(timeout, model.generate(request)).await {
        Ok(result) => result.map_err(FailureReason::from),
        Err(_) => Err(FailureReason::Timeout),
    }
}
