//! Vision AI呼び出し
//!
//! パイプラインはVisionModelトレイト越しにモデルを呼ぶ。
//! JSON形状の検証は呼び出し側（common::parser）が持ち、ここは生テキストを返すだけ。

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::{HairstyleError, Result};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 1回のAI呼び出しで発生するエラー
#[derive(Error, Debug)]
pub enum CallError {
    #[error("レート制限に達しました (HTTP 429)")]
    RateLimited,

    #[error("HTTPエラー {status}: {message}")]
    Http { status: u16, message: String },

    #[error("通信エラー: {0}")]
    Transport(String),

    #[error("レスポンスにテキストが含まれていません")]
    EmptyResponse,
}

/// 送信する画像
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    /// バイト列からMIMEタイプを推定して作成
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = image::guess_format(&bytes)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_else(|_| "image/jpeg".to_string());
        Self { bytes, mime_type }
    }
}

/// モデルへのリクエスト
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub image: Option<&'a ImagePayload>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// 画像+テキストを受け取りテキストを返すモデル
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, request: &ModelRequest<'_>) -> std::result::Result<String, CallError>;
}

// --- Gemini API -------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini generateContent クライアント
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| HairstyleError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            endpoint: GEMINI_ENDPOINT.to_string(),
        })
    }

    /// エンドポイント差し替え（プロキシ等）
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn url(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.endpoint.trim_end_matches('/'), model)
    }
}

fn build_body<'a>(request: &ModelRequest<'a>) -> GenerateRequest<'a> {
    let mut parts = vec![Part::Text { text: request.prompt }];
    if let Some(image) = request.image {
        parts.push(Part::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
            },
        });
    }

    GenerateRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
        },
    }
}

fn extract_text(response: GenerateResponse) -> std::result::Result<String, CallError> {
    let text: String = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        Err(CallError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn generate(&self, request: &ModelRequest<'_>) -> std::result::Result<String, CallError> {
        let body = build_body(request);

        let response = self
            .http
            .post(self.url(request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(CallError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CallError::Http {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        extract_text(parsed)
    }
}
