use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::Recipe;
use crate::error::AppError;

/// A saved recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    #[serde(flatten)]
    pub recipe: Recipe,
}

/// Bookmarks persisted as a single JSON array, rewritten in full on every change
pub struct BookmarkStore {
    path: PathBuf,
    // Held across each read-modify-write so concurrent writers cannot lose updates
    lock: Mutex<()>,
}

impl BookmarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All bookmarks in insertion order
    pub async fn list(&self) -> Vec<Bookmark> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Save a recipe, returning the new bookmark id
    pub async fn add(&self, recipe: Recipe) -> Result<String, AppError> {
        if recipe.video_id.trim().is_empty() {
            return Err(AppError::MissingVideoId);
        }

        let _guard = self.lock.lock().await;
        let mut bookmarks = self.load().await;
        if bookmarks.iter().any(|b| b.recipe.video_id == recipe.video_id) {
            debug!("Bookmark for {} already exists", recipe.video_id);
            return Err(AppError::Duplicate);
        }

        let id = uuid::Uuid::new_v4().to_string();
        bookmarks.push(Bookmark { id: id.clone(), recipe });
        self.save(&bookmarks).await?;
        debug!("Added bookmark {id}");
        Ok(id)
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut bookmarks = self.load().await;
        let before = bookmarks.len();
        bookmarks.retain(|b| b.id != id);
        if bookmarks.len() == before {
            return Err(AppError::BookmarkNotFound);
        }
        self.save(&bookmarks).await?;
        debug!("Deleted bookmark {id}");
        Ok(())
    }

    // A missing or corrupt file reads as an empty list
    async fn load(&self) -> Vec<Bookmark> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Could not read bookmarks {}: {e}", self.path.display());
                return Vec::new();
            }
        };
        match serde_json::from_str(&data) {
            Ok(bookmarks) => bookmarks,
            Err(e) => {
                warn!("Ignoring unparseable bookmarks {}: {e}", self.path.display());
                Vec::new()
            }
        }
    }

    async fn save(&self, bookmarks: &[Bookmark]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_string_pretty(bookmarks)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .wrap_err_with(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .wrap_err_with(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
