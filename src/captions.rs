use async_trait::async_trait;
use log::{debug, info};

/// Outcome of a single caption lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionResult {
    /// Plain caption text, possibly empty
    Text(String),
    /// The video has no usable caption track
    NotFound,
    /// The uploader disabled captions
    Disabled,
    /// Network or parse error, with detail for diagnostics
    Failed(String),
}

impl CaptionResult {
    fn has_text(&self) -> bool {
        matches!(self, CaptionResult::Text(t) if !t.trim().is_empty())
    }

    // Failed > Disabled > empty Text > NotFound
    fn rank(&self) -> u8 {
        match self {
            CaptionResult::NotFound => 0,
            CaptionResult::Text(_) => 1,
            CaptionResult::Disabled => 2,
            CaptionResult::Failed(_) => 3,
        }
    }
}

/// One way of getting caption text for a video
#[async_trait]
pub trait CaptionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `languages` is ordered by preference
    async fn fetch(&self, video_id: &str, languages: &[String]) -> CaptionResult;
}

#[async_trait]
impl<T: CaptionStrategy + ?Sized> CaptionStrategy for std::sync::Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn fetch(&self, video_id: &str, languages: &[String]) -> CaptionResult {
        (**self).fetch(video_id, languages).await
    }
}

/// Ordered list of strategies, tried until one yields text
#[derive(Default)]
pub struct CaptionChain {
    strategies: Vec<Box<dyn CaptionStrategy>>,
}

impl CaptionChain {
    pub fn new(strategies: Vec<Box<dyn CaptionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub async fn fetch(&self, video_id: &str, languages: &[String]) -> CaptionResult {
        let mut worst = CaptionResult::NotFound;
        for strategy in &self.strategies {
            let result = strategy.fetch(video_id, languages).await;
            if result.has_text() {
                info!("Captions for {video_id} from {}", strategy.name());
                return result;
            }
            debug!("{} gave no captions for {video_id}: {result:?}", strategy.name());
            if result.rank() > worst.rank() {
                worst = result;
            }
        }
        worst
    }
}
