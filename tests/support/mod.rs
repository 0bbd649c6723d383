//! テスト用のVisionModel
//!
//! モデルごとのキューに積んだ応答を先に返し、空なら応答関数で応答を作る。
//! すべての呼び出しを記録し、同時実行数の最大値も数える。

#![allow(dead_code)]

use async_trait::async_trait;
use hairstyle_analyzer::analyzer::{CallError, ModelRequest, VisionModel};
use hairstyle_analyzer::config::Config;
use hairstyle_analyzer::scanner::{self, ImageTask};
use hairstyle_analyzer::scraper::Candidates;
use hairstyle_analyzer_common::{CouponCandidate, StylistCandidate};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const PRIMARY: &str = "primary-model";
pub const FALLBACK: &str = "fallback-model";

pub type Reply = Result<String, CallError>;
type Responder = Box<dyn Fn(&ModelRequest<'_>) -> Reply + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub stage: &'static str,
    pub image: Option<String>,
    pub at: Instant,
}

pub struct ScriptedModel {
    responder: Responder,
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Duration,
    model_delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(responder: impl Fn(&ModelRequest<'_>) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            model_delays: HashMap::new(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// すべての段階に正しい応答を返すモデル
    pub fn well_behaved() -> Self {
        Self::new(valid_reply)
    }

    /// 1回の呼び出しにかかる時間
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 特定モデルだけ呼び出しに時間がかかる
    pub fn with_model_delay(mut self, model: &str, delay: Duration) -> Self {
        self.model_delays.insert(model.to_string(), delay);
        self
    }

    pub fn queue(&self, model: &str, reply: Reply) {
        self.queued
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.stage == stage).collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<String, CallError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: request.model.to_string(),
            stage: stage_of(request.prompt),
            image: image_label(request),
            at: Instant::now(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.model_delays.get(request.model).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(request.model)
            .and_then(|q| q.pop_front());
        let reply = match queued {
            Some(reply) => reply,
            None => (self.responder)(request),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

/// テスト用プロンプトの先頭語で段階を判定
pub fn stage_of(prompt: &str) -> &'static str {
    if prompt.starts_with("CLASSIFY") {
        "classification"
    } else if prompt.starts_with("ATTRIBUTE") {
        "attribute"
    } else if prompt.starts_with("STYLIST") {
        "stylist"
    } else if prompt.starts_with("COUPON") {
        "coupon"
    } else {
        "unknown"
    }
}

/// テスト画像は中身がラベル文字列
pub fn image_label(request: &ModelRequest<'_>) -> Option<String> {
    request
        .image
        .map(|image| String::from_utf8_lossy(&image.bytes).to_string())
}

pub fn classification_json(category: &str) -> String {
    format!(
        r#"{{"category": "{}", "features": {{"color": "アッシュ", "cut_technique": "レイヤー", "styling": "ストレート", "impression": "ナチュラル"}}, "keywords": ["透明感", "ツヤ"]}}"#,
        category
    )
}

pub fn attribute_json() -> String {
    r#"{"sex": "ladies", "length": "ミディアム"}"#.to_string()
}

pub fn selection_json(name: &str) -> String {
    format!(r#"{{"name": "{}", "reason": "得意なスタイル"}}"#, name)
}

pub fn valid_reply(request: &ModelRequest<'_>) -> Reply {
    Ok(match stage_of(request.prompt) {
        "classification" => classification_json("ボブ"),
        "attribute" => attribute_json(),
        "stylist" => selection_json("佐藤"),
        "coupon" => selection_json("カット+カラー"),
        _ => String::new(),
    })
}

pub fn transport_error() -> CallError {
    CallError::Transport("connection reset".into())
}

/// 待ち時間ゼロ、短いプロンプトのテスト設定
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.categories = vec!["ボブ".into(), "ショート".into(), "ロング".into()];

    config.gemini.model = PRIMARY.into();
    config.gemini.fallback_model = Some(FALLBACK.into());
    config.gemini.max_retries = 2;
    config.gemini.retry_delay = 0.0;
    config.gemini.timeout = 5.0;
    config.gemini.prompt_template = "CLASSIFY {categories}".into();
    config.gemini.attribute_prompt_template = "ATTRIBUTE {length_choices}".into();
    config.gemini.stylist_prompt_template = "STYLIST {category} {stylists}".into();
    config.gemini.coupon_prompt_template = "COUPON {category} {coupons}".into();
    config.gemini.length_choices = vec!["ショート".into(), "ミディアム".into(), "ロング".into()];

    config.processing.batch_size = 2;
    config.processing.api_delay = 0.0;
    config.processing.max_retries = 1;
    config.processing.retry_delay = 0.0;
    config.processing.memory_per_image_mb = 1;
    config.processing.max_memory_mb = 100;

    config
}

pub fn candidates() -> Candidates {
    Candidates {
        stylists: vec![
            StylistCandidate { name: "佐藤".into(), description: "ボブが得意".into() },
            StylistCandidate { name: "鈴木".into(), description: "メンズカット".into() },
        ],
        coupons: vec![
            CouponCandidate { name: "カット+カラー".into(), text: "¥8,000".into() },
            CouponCandidate { name: "縮毛矯正".into(), text: "¥12,000".into() },
        ],
    }
}

/// `image-1.jpg` 〜 `image-N.jpg` を作ってスキャンする（中身は "image-N"）
pub fn write_images(dir: &Path, count: usize) -> Vec<ImageTask> {
    for i in 1..=count {
        std::fs::write(dir.join(format!("image-{}.jpg", i)), format!("image-{}", i)).unwrap();
    }
    scanner::scan_folder(dir).unwrap()
}
