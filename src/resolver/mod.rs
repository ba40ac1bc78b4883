//! Source resolution
//!
//! Turns a feed URL into a [`Channel`]. The URL is first fetched and parsed as
//! an RSS or Atom document. Only when that fails structurally (unreachable,
//! error status, not a feed) is it handed to the playlist extractor. A feed
//! that parses but has no items is a valid result and stops the fallback.

mod feed_parser;
mod playlist;

pub use feed_parser::parse_feed_content;
pub use playlist::{convert_info_to_channel, resolve_playlist};

use crate::channel::{Channel, feed_dir_name};
use crate::config::{Config, ResolverConfig, RetryConfig};
use crate::error::{Error, ResolutionError, Result};
use crate::retry::with_retry;
use crate::ytdlp::InfoExtractor;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the copy of the fetched document kept in the feed directory
pub const SOURCE_FILE_NAME: &str = "source.rss";

/// Resolves feed URLs into channels
#[derive(Clone)]
pub struct SourceResolver {
    http_client: reqwest::Client,
    extractor: Option<Arc<dyn InfoExtractor>>,
    feeds_dir: PathBuf,
    config: ResolverConfig,
    retry: RetryConfig,
}

impl SourceResolver {
    /// Create a resolver
    ///
    /// Without an extractor only RSS/Atom sources can be resolved.
    pub fn new(config: &Config, extractor: Option<Arc<dyn InfoExtractor>>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.resolver.request_timeout)
            .user_agent(config.resolver.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            extractor,
            feeds_dir: config.feeds_dir(),
            config: config.resolver.clone(),
            retry: config.retry.clone(),
        })
    }

    /// Resolve `url`, never failing
    ///
    /// When every strategy fails the error is logged and an empty channel is returned.
    pub async fn resolve(
        &self,
        feed_id: &str,
        url: &str,
        known_links: &HashSet<String>,
        max_fetch: usize,
    ) -> Channel {
        match self.try_resolve(feed_id, url, known_links, max_fetch).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(feed_id, url, error = %e, "unable to fetch feed data");
                Channel::default()
            }
        }
    }

    /// Resolve `url`, reporting why the last strategy failed
    pub async fn try_resolve(
        &self,
        feed_id: &str,
        url: &str,
        known_links: &HashSet<String>,
        max_fetch: usize,
    ) -> std::result::Result<Channel, ResolutionError> {
        tracing::info!(feed_id, url, "fetching feed data");

        let rss_error = match self.resolve_feed_document(feed_id, url).await {
            Ok(channel) => {
                tracing::info!(feed_id, items = channel.len(), "feed document parsed");
                return Ok(channel);
            }
            Err(e) => e,
        };
        tracing::warn!(feed_id, error = %rss_error, "not a feed document, trying playlist");

        let Some(extractor) = self.extractor.as_deref() else {
            return Err(rss_error);
        };
        resolve_playlist(extractor, url, known_links, max_fetch).await
    }

    /// Fetch and parse `url` as RSS/Atom, storing the raw document
    pub async fn resolve_feed_document(
        &self,
        feed_id: &str,
        url: &str,
    ) -> std::result::Result<Channel, ResolutionError> {
        let content = self.read_url(url).await?;

        if self.config.write_source {
            let source_path = self
                .feeds_dir
                .join(feed_dir_name(feed_id))
                .join(SOURCE_FILE_NAME);
            if let Err(e) = crate::utils::write_atomic(&source_path, content.as_bytes()).await {
                tracing::warn!(path = %source_path.display(), error = %e, "unable to store source document");
            }
        }

        parse_feed_content(&content).inspect_err(|e| {
            tracing::warn!(feed_id, error = %e, "malformed feed detected");
        })
    }

    async fn read_url(&self, url: &str) -> std::result::Result<String, ResolutionError> {
        let parsed =
            url::Url::parse(url).map_err(|e| ResolutionError::Unreachable(format!("{url}: {e}")))?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| ResolutionError::Unreachable(format!("invalid file URL {url}")))?;
            return tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ResolutionError::Unreachable(format!("{}: {e}", path.display())));
        }

        let response = with_retry(&self.retry, || {
            let request = self.http_client.get(parsed.clone());
            async move { request.send().await.map_err(Error::from) }
        })
        .await
        .map_err(|e| ResolutionError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolutionError::HttpStatus(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| ResolutionError::Unreachable(e.to_string()))
    }
}
