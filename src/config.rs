use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use log::debug;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "recipeclip";

/// What to do when no captions can be retrieved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionPolicy {
    /// Analyze the description, then the title, instead
    #[default]
    Fallback,
    /// Reject the request
    Strict,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub api_keys: Vec<String>,
    pub model: String,
    pub max_duration_secs: u64,
    pub caption_languages: Vec<String>,
    pub output_language: String,
    pub max_source_chars: usize,
    pub min_source_chars: usize,
    pub caption_policy: CaptionPolicy,
    pub missing_ingredients: String,
    pub missing_steps: String,
    pub http_timeout_secs: u64,
    pub ytdlp_path: String,
    pub ytdlp_timeout_secs: u64,
    pub retry_backoff_ms: u64,
    pub bookmarks_path: PathBuf,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: "gemini-2.0-flash".to_string(),
            max_duration_secs: 120,
            caption_languages: vec!["ko".to_string(), "en".to_string()],
            output_language: "Korean".to_string(),
            max_source_chars: 15_000,
            min_source_chars: 20,
            caption_policy: CaptionPolicy::Fallback,
            missing_ingredients: "재료 정보를 찾을 수 없습니다.".to_string(),
            missing_steps: "조리 순서를 찾을 수 없습니다.".to_string(),
            http_timeout_secs: 60,
            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_timeout_secs: 60,
            retry_backoff_ms: 250,
            bookmarks_path: data_dir().join("bookmarks.json"),
            templates_dir: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
            host: "127.0.0.1".to_string(),
            port: 8003,
        }
    }
}

impl Config {
    /// Load config from the given path, or ~/.config/recipeclip/config.toml,
    /// then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
        let mut config = if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content).wrap_err_with(|| format!("invalid config file {}", path.display()))?
        } else {
            debug!("No config file found at {}", path.display());
            Config::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override fields from environment variables, looked up through `var`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(keys) = var("GEMINI_API_KEYS").map(|k| split_list(&k)).filter(|k| !k.is_empty()) {
            self.api_keys = keys;
        } else if let Some(key) = var("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_keys = vec![key.trim().to_string()];
        }
        if let Some(model) = var("GEMINI_MODEL") {
            self.model = model;
        }
        if let Some(secs) = var("RECIPECLIP_MAX_DURATION_SECS").and_then(|s| s.trim().parse().ok()) {
            self.max_duration_secs = secs;
        }
        if let Some(langs) = var("RECIPECLIP_CAPTION_LANGS") {
            let langs = split_list(&langs);
            if !langs.is_empty() {
                self.caption_languages = langs;
            }
        }
        if let Some(lang) = var("RECIPECLIP_OUTPUT_LANGUAGE") {
            self.output_language = lang;
        }
        if let Some(path) = var("RECIPECLIP_BOOKMARKS") {
            self.bookmarks_path = PathBuf::from(path);
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(APP_NAME)
        .join("config.toml")
}

pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}
