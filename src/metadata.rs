use async_trait::async_trait;
use eyre::Result;
use log::{debug, warn};

use crate::error::AppError;

/// Descriptive metadata for a single video
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_secs: Option<u64>,
}

/// Looks up metadata for a video id
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<VideoMetadata>;
}

/// Fetch metadata, failing open: a lookup error is logged and yields `None`.
pub async fn fetch_fail_open(source: &dyn MetadataSource, video_id: &str) -> Option<VideoMetadata> {
    match source.fetch(video_id).await {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!("Metadata lookup failed for {video_id}, continuing without it: {e:#}");
            None
        }
    }
}

/// Reject videos longer than `max_secs`. Unknown durations pass.
pub fn check_duration(meta: Option<&VideoMetadata>, max_secs: u64) -> Result<(), AppError> {
    match meta.and_then(|m| m.duration_secs) {
        Some(duration) if duration > max_secs => Err(AppError::TooLong { duration, max: max_secs }),
        Some(duration) => {
            debug!("Duration {duration}s within {max_secs}s ceiling");
            Ok(())
        }
        None => {
            debug!("Duration unknown, skipping ceiling check");
            Ok(())
        }
    }
}
