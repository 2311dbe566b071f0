use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use log::{info, warn};

use crate::captions::{CaptionChain, CaptionResult};
use crate::config::{CaptionPolicy, Config};
use crate::error::AppError;
use crate::gemini::{GeminiClient, TextGenerator};
use crate::keys::ApiKeyPool;
use crate::metadata::{MetadataSource, VideoMetadata, check_duration, fetch_fail_open};
use crate::synthesize::{Sentinels, Synthesizer};
use crate::youtube::{InnerTubeCaptions, PageScraper};
use crate::ytdlp::YtDlp;
use crate::{Recipe, extract_video_id};

/// Where the analyzed text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Captions,
    Description,
    Title,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Captions => write!(f, "captions"),
            SourceKind::Description => write!(f, "description"),
            SourceKind::Title => write!(f, "title"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub kind: SourceKind,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub languages: Vec<String>,
    pub max_duration_secs: u64,
    pub min_source_chars: usize,
    pub caption_policy: CaptionPolicy,
}

impl From<&Config> for ExtractSettings {
    fn from(config: &Config) -> Self {
        Self {
            languages: config.caption_languages.clone(),
            max_duration_secs: config.max_duration_secs,
            min_source_chars: config.min_source_chars,
            caption_policy: config.caption_policy,
        }
    }
}

/// URL in, recipe out
pub struct Extractor {
    metadata: Arc<dyn MetadataSource>,
    page: Arc<dyn MetadataSource>,
    captions: CaptionChain,
    synthesizer: Synthesizer,
    settings: ExtractSettings,
}

impl Extractor {
    pub fn new(
        metadata: Arc<dyn MetadataSource>,
        page: Arc<dyn MetadataSource>,
        captions: CaptionChain,
        synthesizer: Synthesizer,
        settings: ExtractSettings,
    ) -> Self {
        Self {
            metadata,
            page,
            captions,
            synthesizer,
            settings,
        }
    }

    /// Wire up the real YouTube, yt-dlp and Gemini backends
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        let ytdlp = Arc::new(YtDlp::new(
            config.ytdlp_path.clone(),
            Duration::from_secs(config.ytdlp_timeout_secs),
            client.clone(),
        ));
        // One instance serves metadata and subtitles so both share its info cache
        let captions = CaptionChain::new(vec![
            Box::new(InnerTubeCaptions::new(client.clone())),
            Box::new(Arc::clone(&ytdlp)),
        ]);
        let generator: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(client.clone(), config.model.clone()));
        let synthesizer = Synthesizer::new(
            generator,
            ApiKeyPool::new(config.api_keys.clone()),
            Duration::from_millis(config.retry_backoff_ms),
            config.output_language.clone(),
            config.max_source_chars,
            Sentinels {
                ingredients: config.missing_ingredients.clone(),
                steps: config.missing_steps.clone(),
            },
        );

        Ok(Self::new(
            ytdlp,
            Arc::new(PageScraper::new(client)),
            captions,
            synthesizer,
            ExtractSettings::from(config),
        ))
    }

    pub fn key_count(&self) -> usize {
        self.synthesizer.key_count()
    }

    pub async fn extract(&self, url: &str) -> Result<Recipe, AppError> {
        let video_id = extract_video_id(url).ok_or_else(|| AppError::InvalidUrl(url.trim().to_string()))?;
        if self.key_count() == 0 {
            return Err(AppError::NotConfigured);
        }
        info!("Extracting recipe for {video_id}");

        let meta = fetch_fail_open(self.metadata.as_ref(), &video_id).await;
        check_duration(meta.as_ref(), self.settings.max_duration_secs)?;

        let captions = self.captions.fetch(&video_id, &self.settings.languages).await;
        let title = self.resolve_title(&video_id, meta.as_ref()).await?;
        let source = select_source(
            captions,
            meta.as_ref(),
            &title,
            self.settings.caption_policy,
            self.settings.min_source_chars,
        )?;
        info!("Analyzing {video_id} from {} ({} chars)", source.kind, source.text.chars().count());

        self.synthesizer.synthesize(&title, &source.text, &video_id).await
    }

    async fn resolve_title(&self, video_id: &str, meta: Option<&VideoMetadata>) -> Result<String, AppError> {
        if let Some(title) = meta.and_then(|m| m.title.clone()) {
            return Ok(title);
        }
        match self.page.fetch(video_id).await {
            Ok(VideoMetadata { title: Some(title), .. }) => Ok(title),
            Ok(_) => Err(AppError::Metadata(format!("no title for {video_id}"))),
            Err(e) => Err(AppError::Metadata(format!("{e:#}"))),
        }
    }
}

fn analyzable(text: &str, min_chars: usize) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() >= min_chars
}

/// Choose the text to analyze: captions, or under the fallback policy the
/// description and then the title
pub fn select_source(
    captions: CaptionResult,
    meta: Option<&VideoMetadata>,
    title: &str,
    policy: CaptionPolicy,
    min_chars: usize,
) -> Result<SourceText, AppError> {
    let missing = match captions {
        CaptionResult::Text(text) if analyzable(&text, min_chars) => {
            return Ok(SourceText {
                kind: SourceKind::Captions,
                text,
            });
        }
        other => other,
    };

    match (policy, missing) {
        (CaptionPolicy::Strict, CaptionResult::Failed(msg)) => return Err(AppError::Captions(msg)),
        (CaptionPolicy::Strict, CaptionResult::Text(_)) => return Err(AppError::InsufficientContent),
        (CaptionPolicy::Strict, _) => return Err(AppError::NoCaptions),
        (CaptionPolicy::Fallback, CaptionResult::Failed(msg)) => {
            warn!("Caption retrieval failed, falling back to description: {msg}");
        }
        (CaptionPolicy::Fallback, other) => info!("No usable captions ({other:?}), falling back to description"),
    }

    let description = meta.and_then(|m| m.description.as_deref()).unwrap_or_default();
    if analyzable(description, min_chars) {
        return Ok(SourceText {
            kind: SourceKind::Description,
            text: description.to_string(),
        });
    }
    if analyzable(title, min_chars) {
        return Ok(SourceText {
            kind: SourceKind::Title,
            text: title.to_string(),
        });
    }
    Err(AppError::InsufficientContent)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    const URL: &str = "https://www.youtube.com/watch?v=ABCDEFGHIJK";
    const CAPTIONS: &str = "today we make kimchi stew with pork belly and aged kimchi";

    fn captions() -> CaptionResult {
        CaptionResult::Text(CAPTIONS.to_string())
    }

    #[test]
    fn test_select_captions_first() {
        let source = select_source(captions(), meta("t", "d", 0).as_ref(), "t", CaptionPolicy::Fallback, 20).unwrap();
        assert_eq!(source.kind, SourceKind::Captions);
        assert_eq!(source.text, CAPTIONS);
    }

    #[test]
    fn test_select_description_fallback() {
        let description = "Ingredients: rice, egg, soy sauce, green onion";
        let source = select_source(
            CaptionResult::Failed("timeout".into()),
            meta("Fried rice", description, 30).as_ref(),
            "Fried rice",
            CaptionPolicy::Fallback,
            20,
        )
        .unwrap();
        assert_eq!(source.kind, SourceKind::Description);
        assert_eq!(source.text, description);
    }

    #[test]
    fn test_select_title_fallback() {
        let title = "Three ingredient banana pancakes for breakfast";
        let source = select_source(CaptionResult::NotFound, None, title, CaptionPolicy::Fallback, 20).unwrap();
        assert_eq!(source.kind, SourceKind::Title);
    }

    #[test]
    fn test_select_nothing_analyzable() {
        let err = select_source(
            CaptionResult::Disabled,
            meta("Soup", "", 30).as_ref(),
            "Soup",
            CaptionPolicy::Fallback,
            20,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InsufficientContent));
    }

    #[test]
    fn test_short_captions_fall_back() {
        let description = "A long enough description of the dish";
        let source = select_source(
            CaptionResult::Text("[Music]".into()),
            meta("t", description, 30).as_ref(),
            "t",
            CaptionPolicy::Fallback,
            20,
        )
        .unwrap();
        assert_eq!(source.kind, SourceKind::Description);
    }

    #[test]
    fn test_strict_policy() {
        let desc = meta("t", "A long enough description of the dish", 30);
        let err = select_source(CaptionResult::NotFound, desc.as_ref(), "t", CaptionPolicy::Strict, 20).unwrap_err();
        assert!(matches!(err, AppError::NoCaptions));
        let err = select_source(CaptionResult::Failed("503".into()), desc.as_ref(), "t", CaptionPolicy::Strict, 20)
            .unwrap_err();
        assert!(matches!(err, AppError::Captions(ref m) if m == "503"));
    }

    #[tokio::test]
    async fn test_extract_happy_path() {
        let generator = Arc::new(FakeGenerator::default());
        let extractor = extractor(
            meta("Kimchi Stew", "", 90),
            None,
            captions(),
            Arc::clone(&generator),
            2,
            CaptionPolicy::Fallback,
        );
        let recipe = extractor.extract(URL).await.unwrap();
        assert_eq!(recipe.title, "Kimchi Stew");
        assert_eq!(recipe.video_id, "ABCDEFGHIJK");
        assert_eq!(recipe.ingredients, ["kimchi", "pork"]);
        assert_eq!(recipe.thumbnail, "https://img.youtube.com/vi/ABCDEFGHIJK/maxresdefault.jpg");
        assert_eq!(generator.calls(), 1);
        assert!(generator.prompts.lock().unwrap()[0].contains(CAPTIONS));
    }

    #[tokio::test]
    async fn test_extract_invalid_url() {
        let generator = Arc::new(FakeGenerator::default());
        let extractor = extractor(None, None, captions(), Arc::clone(&generator), 1, CaptionPolicy::Fallback);
        let err = extractor.extract("https://example.com/video").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidUrl(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_extract_too_long() {
        let generator = Arc::new(FakeGenerator::default());
        let extractor = extractor(
            meta("t", "", 200),
            None,
            captions(),
            Arc::clone(&generator),
            1,
            CaptionPolicy::Fallback,
        );
        let err = extractor.extract(URL).await.unwrap_err();
        assert!(matches!(err, AppError::TooLong { duration: 200, max: 120 }));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_metadata_failure_fails_open_with_page_title() {
        let generator = Arc::new(FakeGenerator::default());
        let page = Some(VideoMetadata {
            title: Some("Scraped title".into()),
            ..VideoMetadata::default()
        });
        let extractor = extractor(None, page, captions(), Arc::clone(&generator), 1, CaptionPolicy::Fallback);
        let recipe = extractor.extract(URL).await.unwrap();
        assert_eq!(recipe.title, "Scraped title");
    }

    #[tokio::test]
    async fn test_no_title_anywhere_is_metadata_error() {
        let generator = Arc::new(FakeGenerator::default());
        let extractor = extractor(None, None, captions(), Arc::clone(&generator), 1, CaptionPolicy::Fallback);
        let err = extractor.extract(URL).await.unwrap_err();
        assert!(matches!(err, AppError::Metadata(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_content_never_reaches_generator() {
        let generator = Arc::new(FakeGenerator::default());
        let extractor = extractor(
            meta("Soup", "", 60),
            None,
            CaptionResult::NotFound,
            Arc::clone(&generator),
            1,
            CaptionPolicy::Fallback,
        );
        let err = extractor.extract(URL).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientContent));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_keys_is_not_configured() {
        let generator = Arc::new(FakeGenerator::default());
        let extractor = extractor(
            meta("Stew", "", 60),
            None,
            captions(),
            Arc::clone(&generator),
            0,
            CaptionPolicy::Fallback,
        );
        let err = extractor.extract(URL).await.unwrap_err();
        assert!(matches!(err, AppError::NotConfigured));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_keys_fails_before_any_lookup() {
        use std::sync::atomic::Ordering;

        let metadata = Arc::new(FakeMetadata::new(meta("Stew", "", 60)));
        let page = Arc::new(FakeMetadata::new(None));
        let strategy = Arc::new(FakeCaptions::new(captions()));
        let extractor = Extractor::new(
            Arc::clone(&metadata) as Arc<dyn MetadataSource>,
            Arc::clone(&page) as Arc<dyn MetadataSource>,
            CaptionChain::new(vec![Box::new(Arc::clone(&strategy))]),
            synthesizer(Arc::new(FakeGenerator::default()), 0),
            settings(CaptionPolicy::Fallback),
        );

        let err = extractor.extract(URL).await.unwrap_err();
        assert!(matches!(err, AppError::NotConfigured));
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
        assert_eq!(page.calls.load(Ordering::SeqCst), 0);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_url_reported_before_missing_keys() {
        let extractor = extractor(
            None,
            None,
            captions(),
            Arc::new(FakeGenerator::default()),
            0,
            CaptionPolicy::Fallback,
        );
        let err = extractor.extract("not a video").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidUrl(_)));
    }
}
