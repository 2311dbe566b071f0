use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Failure of a single generation call
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("API quota exhausted ({status}): {message}")]
    Quota { status: u16, message: String },

    #[error("Gemini API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request to Gemini failed: {0}")]
    Transport(String),

    #[error("unexpected Gemini response: {0}")]
    Malformed(String),
}

impl GenerateError {
    /// Whether another credential might succeed where this one failed
    pub fn is_quota(&self) -> bool {
        match self {
            GenerateError::Quota { .. } => true,
            GenerateError::Transport(msg) => mentions_quota(msg),
            GenerateError::Api { .. } | GenerateError::Malformed(_) => false,
        }
    }
}

/// Compatibility check for errors that only carry text
fn mentions_quota(text: &str) -> bool {
    text.contains("429") || text.contains("RESOURCE_EXHAUSTED") || text.to_lowercase().contains("quota")
}

/// A generative text service; the credential is bound per call
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, GenerateError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Google Gemini `generateContent` client
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    model: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, GenerateError> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        debug!("Generating via Gemini model {}", self.model);

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json",
            },
        };

        // The key travels in a header so it never shows up in error URLs
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GenerateError::Malformed(e.without_url().to_string()))?;
        extract_text(&json)
    }
}

fn classify_failure(status: StatusCode, body: &str) -> GenerateError {
    let detail = serde_json::from_str::<ErrorBody>(body).ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    let exhausted = detail.as_ref().is_some_and(|d| d.status == "RESOURCE_EXHAUSTED");

    if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
        GenerateError::Quota {
            status: status.as_u16(),
            message,
        }
    } else {
        GenerateError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

fn extract_text(json: &serde_json::Value) -> Result<String, GenerateError> {
    let text: String = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| parts.iter().filter_map(|p| p.get("text")?.as_str()).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .or_else(|| json.pointer("/candidates/0/finishReason"))
            .and_then(|r| r.as_str())
            .unwrap_or("no text in response");
        return Err(GenerateError::Malformed(reason.to_string()));
    }
    Ok(text)
}
