//! Persistence of the feed container
//!
//! The [`FeedStore`] trait is the seam between the feed pipeline and storage.
//! [`JsonFileStore`] keeps the container in a single JSON document wrapped in a
//! version envelope (`{"version": N, "data": ...}`). Older documents are
//! upgraded in place by the migrations in [`migrations`] before being
//! deserialized, so fields added later never break loading.

pub mod migrations;

use crate::channel::FeedContainer;
use crate::error::{Error, Result};
use crate::utils::write_atomic;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Versioned storage of the feed container
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Load the stored container, empty when nothing was stored yet
    async fn load(&self) -> Result<FeedContainer>;

    /// Store `feeds`, returning true if the stored state changed
    async fn store(&self, feeds: &FeedContainer) -> Result<bool>;
}

#[derive(Serialize)]
struct Envelope<'a> {
    version: u32,
    data: &'a FeedContainer,
}

/// [`FeedStore`] backed by a JSON file
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Default file name inside the data directory
    pub const FILE_NAME: &'static str = "feeds.json";

    /// Store at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<data_dir>/feeds.json`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(Self::FILE_NAME))
    }

    /// Location of the document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn serialize(feeds: &FeedContainer) -> Result<String> {
        let envelope = Envelope {
            version: migrations::CURRENT_VERSION,
            data: feeds,
        };
        Ok(serde_json::to_string_pretty(&envelope)?)
    }

    /// Parse a stored document, applying pending migrations
    pub fn parse(content: &str) -> Result<FeedContainer> {
        let document: Value = serde_json::from_str(content)?;
        let data = migrations::upgrade(document)?;
        serde_json::from_value(data)
            .map_err(|e| Error::Persistence(format!("invalid feed data: {e}")))
    }
}

#[async_trait]
impl FeedStore for JsonFileStore {
    async fn load(&self) -> Result<FeedContainer> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no stored feeds, starting empty");
                return Ok(FeedContainer::new());
            }
            Err(e) => return Err(e.into()),
        };

        let feeds = Self::parse(&content)?;
        tracing::info!(path = %self.path.display(), feeds = feeds.len(), "feeds loaded");
        Ok(feeds)
    }

    async fn store(&self, feeds: &FeedContainer) -> Result<bool> {
        let content = Self::serialize(feeds)?;

        match tokio::fs::read_to_string(&self.path).await {
            Ok(previous) if previous == content => {
                tracing::debug!(path = %self.path.display(), "feeds unchanged, store skipped");
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        write_atomic(&self.path, content.as_bytes()).await?;
        tracing::info!(path = %self.path.display(), feeds = feeds.len(), "feeds stored");
        Ok(true)
    }
}
