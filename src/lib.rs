pub mod bookmarks;
pub mod captions;
pub mod config;
pub mod error;
pub mod gemini;
pub mod keys;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod synthesize;
pub mod youtube;
pub mod ytdlp;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A recipe extracted from a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub thumbnail: String,
}

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid regex"));

// The id must be followed by a delimiter or the end of input, so a 12-character
// token never yields an 11-character prefix.
static URL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[?&]v=|/shorts/|/embed/|youtu\.be/|/v/|/e/)([^#&?/\s]{11})(?:[#&?/]|$)").expect("valid regex")
});

/// Extract video ID from various YouTube URL formats
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    if BARE_ID.is_match(input) {
        return Some(input.to_string());
    }

    URL_ID.captures(input).map(|caps| caps[1].to_string())
}

/// Well-known thumbnail URL for a video
pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{video_id}/maxresdefault.jpg")
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn test_bare_video_id() {
        assert_eq!(extract_video_id(ID), Some(ID.to_string()));
    }

    #[test]
    fn test_all_url_shapes_agree() {
        let urls = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ?si=abcdef",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/e/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ#t=30",
        ];
        for url in urls {
            assert_eq!(extract_video_id(url).as_deref(), Some(ID), "{url}");
        }
    }

    #[test]
    fn test_watch_url_with_extra_params() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=120"),
            Some(ID.to_string())
        );
    }

    #[test]
    fn test_short_id_rejected() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=abc123"), None);
    }

    #[test]
    fn test_long_id_not_truncated() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQX"), None);
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQXYZ"), None);
    }

    #[test]
    fn test_wrong_parameter_name() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?id=dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?xv=dQw4w9WgXcQ"), None);
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(extract_video_id("not-a-valid-id"), None);
        assert_eq!(extract_video_id("https://example.com/recipes/kimchi"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn test_whitespace_trimming() {
        assert_eq!(extract_video_id("  https://youtu.be/dQw4w9WgXcQ \n"), Some(ID.to_string()));
    }

    #[test]
    fn test_thumbnail_url() {
        assert_eq!(
            thumbnail_url("ABCDEFGHIJK"),
            "https://img.youtube.com/vi/ABCDEFGHIJK/maxresdefault.jpg"
        );
    }

    #[test]
    fn test_recipe_optional_fields_default() {
        let recipe: Recipe = serde_json::from_str(r#"{"title":"Toast","video_id":"ABCDEFGHIJK"}"#).unwrap();
        assert!(recipe.description.is_none());
        assert!(recipe.tips.is_empty());
        assert!(recipe.ingredients.is_empty());
    }
}
