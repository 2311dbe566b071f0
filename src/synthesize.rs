use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::{debug, info};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::Recipe;
use crate::error::AppError;
use crate::gemini::{GenerateError, TextGenerator};
use crate::keys::{ApiKeyPool, RotationError, rotate};
use crate::thumbnail_url;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("model response is not a recipe JSON object: {0}")]
    Parse(String),
}

impl SynthesisError {
    pub fn is_quota(&self) -> bool {
        matches!(self, SynthesisError::Generate(e) if e.is_quota())
    }
}

/// The model's answer before the authoritative fields are filled in
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecipeDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub ingredients: Option<Vec<String>>,
    pub steps: Option<Vec<String>>,
    pub tips: Option<Vec<String>>,
}

/// Entries used when the model finds no ingredients or steps
#[derive(Debug, Clone)]
pub struct Sentinels {
    pub ingredients: String,
    pub steps: String,
}

/// Longest prefix of `text` with at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_prompt(title: &str, source: &str, output_language: &str) -> String {
    format!(
        r#"You are a cooking assistant. Read the material taken from a short cooking video and write down the recipe it describes.

Video title: {title}

Material (captions, or the video description when there are none):
"""
{source}
"""

Rules:
- Write every value in {output_language}.
- Respond with a single JSON object and nothing else. No markdown, no commentary.
- The object must have exactly these keys:
{{
  "title": string,
  "description": string (one or two sentences about the dish),
  "ingredients": [string] (include quantities when mentioned),
  "steps": [string] (in cooking order),
  "tips": [string] (may be empty)
}}
- If the material does not mention ingredients or steps, return an empty list for them. Do not invent any."#
    )
}

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("valid regex"));
static BRACED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

fn parse_strict(raw: &str) -> Option<RecipeDraft> {
    serde_json::from_str(raw.trim()).ok()
}

/// Content of the first markdown code fence, if any
fn strip_fences(raw: &str) -> Option<&str> {
    FENCE.captures(raw).and_then(|caps| caps.get(1)).map(|m| m.as_str().trim())
}

/// Span from the first `{` to the last `}`
fn braced_span(raw: &str) -> Option<&str> {
    BRACED.find(raw).map(|m| m.as_str())
}

/// Parse a model response, tolerating code fences and surrounding prose
pub fn extract_json(raw: &str) -> Result<RecipeDraft, SynthesisError> {
    if let Some(draft) = parse_strict(raw) {
        return Ok(draft);
    }
    if let Some(draft) = strip_fences(raw).and_then(parse_strict) {
        debug!("Parsed recipe JSON after stripping code fences");
        return Ok(draft);
    }
    if let Some(draft) = braced_span(raw).and_then(parse_strict) {
        debug!("Parsed recipe JSON from braced span");
        return Ok(draft);
    }
    let preview: String = raw.chars().take(200).collect();
    Err(SynthesisError::Parse(preview))
}

fn clean(items: Option<Vec<String>>) -> Vec<String> {
    items
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn or_sentinel(items: Vec<String>, sentinel: &str) -> Vec<String> {
    if items.is_empty() { vec![sentinel.to_string()] } else { items }
}

/// Build the final recipe, trusting only our own title and video id
pub fn finalize(draft: RecipeDraft, title: &str, video_id: &str, sentinels: &Sentinels) -> Recipe {
    Recipe {
        title: title.to_string(),
        description: draft.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
        ingredients: or_sentinel(clean(draft.ingredients), &sentinels.ingredients),
        steps: or_sentinel(clean(draft.steps), &sentinels.steps),
        tips: clean(draft.tips),
        video_id: video_id.to_string(),
        thumbnail: thumbnail_url(video_id),
    }
}

/// One generation attempt with a single key
pub async fn synthesize_once(
    generator: &dyn TextGenerator,
    api_key: &str,
    prompt: &str,
) -> Result<RecipeDraft, SynthesisError> {
    let raw = generator.generate(api_key, prompt).await?;
    extract_json(&raw)
}

/// Prompt building, key rotation and response parsing around a generator
pub struct Synthesizer {
    generator: Arc<dyn TextGenerator>,
    keys: ApiKeyPool,
    backoff: Duration,
    output_language: String,
    max_source_chars: usize,
    sentinels: Sentinels,
}

impl Synthesizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        keys: ApiKeyPool,
        backoff: Duration,
        output_language: impl Into<String>,
        max_source_chars: usize,
        sentinels: Sentinels,
    ) -> Self {
        Self {
            generator,
            keys,
            backoff,
            output_language: output_language.into(),
            max_source_chars,
            sentinels,
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub async fn synthesize(&self, title: &str, source: &str, video_id: &str) -> Result<Recipe, AppError> {
        if self.keys.is_empty() {
            return Err(AppError::NotConfigured);
        }

        let source = truncate_chars(source, self.max_source_chars);
        let prompt = build_prompt(title, source, &self.output_language);
        info!(
            "Synthesizing recipe for {video_id} from {} chars with {} key(s)",
            source.chars().count(),
            self.keys.len()
        );

        let generator = self.generator.as_ref();
        let prompt = prompt.as_str();
        let draft = rotate(&self.keys, self.backoff, SynthesisError::is_quota, |key| async move {
            synthesize_once(generator, &key, prompt).await
        })
        .await
        .map_err(|e| match e {
            RotationError::NoKeys => AppError::NotConfigured,
            RotationError::Exhausted(e) | RotationError::Failed(e) => AppError::Synthesis(e.to_string()),
        })?;

        Ok(finalize(draft, title, video_id, &self.sentinels))
    }
}
