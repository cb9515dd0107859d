//! Language-model client abstraction.
//!
//! The pipeline talks to the model through [`AnalysisClient`]. The
//! composition root (CLI command, HTTP server, or test) builds one with
//! [`create_client`] and passes it down; nothing holds a global handle.
//!
//! # Providers
//!
//! | Provider | Description |
//! |----------|-------------|
//! | `mock` | Deterministic canned results, no network |
//! | `gemini` | Google Gemini `generateContent` REST API |
//!
//! The Gemini client retries 429 and 5xx responses (and transport errors)
//! with exponential backoff: 1s, 2s, 4s, ... capped at 32s. Other 4xx
//! responses fail immediately.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use consumer_sense_core::upstream::{parse_upstream_response, MalformedResponse};
use consumer_sense_core::AnalysisResult;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::ModelConfig;
use crate::prompts;

/// An image to send to the model, with its sniffed MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageInput {
    /// Wrap raw bytes, rejecting anything that is not a recognizable image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if !infer::is_image(&bytes) {
            bail!("input is not a recognized image format");
        }
        let mime_type = infer::get(&bytes)
            .map(|kind| kind.mime_type().to_string())
            .ok_or_else(|| anyhow!("could not determine image type"))?;
        Ok(Self { bytes, mime_type })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        Self::from_bytes(bytes).with_context(|| format!("Unsupported image: {}", path.display()))
    }

    fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Turns feedback into an [`AnalysisResult`].
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Model identifier recorded on documents.
    fn model_name(&self) -> &str;

    /// Analyze free text (typed, pasted, or scraped).
    async fn analyze_text(&self, text: &str) -> Result<AnalysisResult>;

    /// Analyze one or more screenshots, optionally with accompanying text.
    async fn analyze_images(
        &self,
        images: &[ImageInput],
        context: Option<&str>,
    ) -> Result<AnalysisResult>;
}

/// Build the client named by `config.provider`.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn AnalysisClient>> {
    match config.provider.as_str() {
        "mock" => Ok(Box::new(MockClient)),
        "gemini" => Ok(Box::new(GeminiClient::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

// ============ Mock Provider ============

/// Canned results for local development and tests.
pub struct MockClient;

pub const MOCK_MODEL: &str = "mock";

#[async_trait]
impl AnalysisClient for MockClient {
    fn model_name(&self) -> &str {
        MOCK_MODEL
    }

    async fn analyze_text(&self, text: &str) -> Result<AnalysisResult> {
        let mut analysis = Map::new();
        analysis.insert("sentiment".into(), json!("Neutral"));
        analysis.insert("themes".into(), json!([]));
        analysis.insert("intent".into(), json!("unknown"));
        analysis.insert("score".into(), json!(0.5));
        analysis.insert("confidence".into(), json!(0.8));
        analysis.insert("overall_summary".into(), json!("Mock Summary"));
        analysis.insert("top_level_advice".into(), json!("Mock Advice"));

        Ok(AnalysisResult {
            input_text: Some(text.to_string()),
            extracted_text: Some(text.to_string()),
            analysis: Some(analysis),
            model: Some(MOCK_MODEL.to_string()),
            processing_latency_ms: Some(3),
        })
    }

    async fn analyze_images(
        &self,
        _images: &[ImageInput],
        _context: Option<&str>,
    ) -> Result<AnalysisResult> {
        Ok(AnalysisResult {
            input_text: Some("Mock".to_string()),
            extracted_text: Some("Mock".to_string()),
            analysis: Some(Map::new()),
            model: Some(MOCK_MODEL.to_string()),
            processing_latency_ms: Some(5),
        })
    }
}

// ============ Gemini Provider ============

pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiClient {
    /// Build a client, reading the API key from the env var named in config.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ModelConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// Send one `generateContent` request and return the response text.
    async fn generate(&self, parts: Vec<Value>) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.0
            }
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying gemini request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        return response_text(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::warn!(%status, "gemini request failed, will retry");
                        last_err = Some(anyhow!("Gemini API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Gemini API error {}: {}", status, body_text);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "gemini request failed, will retry");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Gemini request failed after retries")))
    }

    async fn analyze(&self, parts: Vec<Value>, input_text: Option<String>) -> Result<AnalysisResult> {
        let start = Instant::now();
        let text = self.generate(parts).await?;
        let latency = start.elapsed().as_millis() as u64;

        let upstream = parse_upstream_response(&text)?;
        tracing::debug!(kind = upstream.kind(), latency_ms = latency, "gemini analysis parsed");
        Ok(upstream.into_analysis_result(input_text, self.model.clone(), Some(latency)))
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn analyze_text(&self, text: &str) -> Result<AnalysisResult> {
        let parts = vec![json!({ "text": prompts::text_prompt(text) })];
        self.analyze(parts, Some(text.to_string())).await
    }

    async fn analyze_images(
        &self,
        images: &[ImageInput],
        context: Option<&str>,
    ) -> Result<AnalysisResult> {
        if images.is_empty() {
            bail!("no images to analyze");
        }
        let mut parts = vec![json!({ "text": prompts::image_prompt(context) })];
        for image in images {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": image.to_base64(),
                }
            }));
        }
        let input_text = context
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} images processed", images.len()));
        self.analyze(parts, Some(input_text)).await
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(json: &Value) -> Result<String> {
    let Some(parts) = json
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    else {
        // Blocked prompts and truncated candidates come back without parts.
        let reason = [
            ("blockReason", "/promptFeedback/blockReason"),
            ("finishReason", "/candidates/0/finishReason"),
        ]
        .iter()
        .find_map(|(label, ptr)| {
            json.pointer(ptr)
                .and_then(Value::as_str)
                .map(|r| format!("{} {}", label, r))
        })
        .unwrap_or_else(|| "missing candidates[0].content.parts".to_string());
        return Err(MalformedResponse::NoContent(reason).into());
    };

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn image_input_sniffs_png() {
        let img = ImageInput::from_bytes(PNG_HEADER.to_vec()).unwrap();
        assert_eq!(img.mime_type, "image/png");
    }

    #[test]
    fn image_input_rejects_text() {
        assert!(ImageInput::from_bytes(b"just words".to_vec()).is_err());
    }

    #[test]
    fn response_text_joins_parts() {
        let json = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"kind\":"}, {"text": "\"single_review\"}"}]}}]
        });
        assert_eq!(response_text(&json).unwrap(), "{\"kind\":\"single_review\"}");
        assert!(response_text(&json!({"candidates": []})).is_err());
    }

    #[test]
    fn response_without_parts_is_malformed() {
        let err = response_text(&json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MalformedResponse>(),
            Some(MalformedResponse::NoContent(reason)) if reason == "blockReason SAFETY"
        ));

        let err = response_text(&json!({"candidates": [{"finishReason": "MAX_TOKENS"}]})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "model response has no content (finishReason MAX_TOKENS)"
        );

        let err = response_text(&json!({})).unwrap_err();
        assert!(err.downcast_ref::<MalformedResponse>().is_some());
    }

    #[test]
    fn create_client_rejects_unknown_provider() {
        let config = ModelConfig {
            provider: "other".into(),
            ..Default::default()
        };
        assert!(create_client(&config).is_err());
    }

    #[tokio::test]
    async fn mock_text_echoes_input() {
        let client = create_client(&ModelConfig::default()).unwrap();
        let result = client.analyze_text("Great app").await.unwrap();
        assert_eq!(result.extracted_text.as_deref(), Some("Great app"));
        assert_eq!(result.model.as_deref(), Some("mock"));
        assert_eq!(result.analysis.unwrap()["sentiment"], "Neutral");
    }

    #[tokio::test]
    async fn mock_images_have_empty_analysis() {
        let result = MockClient.analyze_images(&[], None).await.unwrap();
        assert!(result.analysis.unwrap().is_empty());
        assert_eq!(result.extracted_text.as_deref(), Some("Mock"));
    }
}
