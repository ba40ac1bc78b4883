//! yt-dlp command line wrapper
//!
//! Playlist listing, availability checks and the last-resort audio extraction
//! all go through the external `yt-dlp` binary. Its `-J` output is deserialized
//! into [`ExtractInfo`].

use crate::availability::{Availability, AvailabilityChecker};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default limit for a single yt-dlp invocation
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Thumbnail entry of a yt-dlp info document
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExtractThumbnail {
    /// Image URL
    #[serde(default)]
    pub url: Option<String>,
    /// Width in pixels
    #[serde(default)]
    pub width: Option<u32>,
    /// Height in pixels
    #[serde(default)]
    pub height: Option<u32>,
}

/// Subset of the yt-dlp info document used by feedcast
///
/// The same shape describes a playlist (with `entries`) and a single video.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExtractInfo {
    /// Extractor-specific id
    #[serde(default)]
    pub id: Option<String>,
    /// Title
    #[serde(default)]
    pub title: Option<String>,
    /// URL of the entry (flat listings)
    #[serde(default)]
    pub url: Option<String>,
    /// URL the extraction started from
    #[serde(default)]
    pub original_url: Option<String>,
    /// Last path segment of the page, "playlist" for playlists
    #[serde(default)]
    pub webpage_url_basename: Option<String>,
    /// Channel page of the uploader
    #[serde(default)]
    pub channel_url: Option<String>,
    /// Description text
    #[serde(default)]
    pub description: Option<String>,
    /// Upload day as `YYYYMMDD`
    #[serde(default)]
    pub upload_date: Option<String>,
    /// Unix timestamp of the extraction
    #[serde(default)]
    pub epoch: Option<i64>,
    /// Preferred thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// All thumbnails, smallest first
    #[serde(default)]
    pub thumbnails: Option<Vec<ExtractThumbnail>>,
    /// Live state ("not_live", "is_upcoming", ...)
    #[serde(default)]
    pub live_status: Option<String>,
    /// Playlist entries, absent for single videos
    #[serde(default)]
    pub entries: Option<Vec<ExtractInfo>>,
}

impl ExtractInfo {
    /// Link of an entry: `url`, falling back to `original_url`
    pub fn link(&self) -> Option<&str> {
        [self.url.as_deref(), self.original_url.as_deref()]
            .into_iter()
            .flatten()
            .find(|link| !link.is_empty())
    }

    /// True if yt-dlp reported the page as a playlist
    pub fn is_playlist_page(&self) -> bool {
        self.webpage_url_basename.as_deref() == Some("playlist")
    }
}

/// Source of yt-dlp style info documents
#[async_trait]
pub trait InfoExtractor: Send + Sync {
    /// Fetch metadata of `url`, listing at most `max_items` playlist entries
    ///
    /// Entries of a playlist page are returned oldest first.
    async fn fetch_info(&self, url: &str, max_items: usize) -> Result<ExtractInfo>;
}

/// Handle to the yt-dlp executable
#[derive(Clone, Debug)]
pub struct YtDlp {
    binary_path: PathBuf,
    timeout: Duration,
}

impl YtDlp {
    /// Create a wrapper around an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Use `configured` if set, otherwise search PATH
    pub fn discover(configured: Option<&Path>) -> Option<Self> {
        match configured {
            Some(path) => Some(Self::new(path.to_path_buf())),
            None => Self::from_path(),
        }
    }

    /// Override the per-invocation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the executable
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Download `link` and convert it to a 128 kbit/s mp3 at `output`
    pub async fn extract_audio(&self, link: &str, output: &Path) -> Result<()> {
        // yt-dlp appends the final extension itself
        let template = output.with_extension("%(ext)s");
        let mut command = Command::new(&self.binary_path);
        command
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--audio-quality")
            .arg("128K")
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--quiet")
            .arg("-o")
            .arg(&template)
            .arg(link);
        self.run(command).await.map(|_| ())
    }

    async fn run(&self, mut command: Command) -> Result<Vec<u8>> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                Error::ExternalTool(format!(
                    "yt-dlp timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::ExternalTool(format!("failed to execute yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalTool(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// Parse a `-J` document and put playlist entries in chronological order
pub fn parse_info(json: &[u8]) -> Result<ExtractInfo> {
    let mut info: ExtractInfo = serde_json::from_slice(json)?;
    if info.is_playlist_page()
        && let Some(entries) = info.entries.as_mut()
    {
        // playlists list newest first
        entries.reverse();
    }
    Ok(info)
}

#[async_trait]
impl InfoExtractor for YtDlp {
    async fn fetch_info(&self, url: &str, max_items: usize) -> Result<ExtractInfo> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("--dump-single-json")
            .arg("--flat-playlist")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--playlist-items")
            .arg(format!("1:{}", max_items.max(1)))
            .arg(url);
        let stdout = self.run(command).await?;
        parse_info(&stdout)
    }
}

#[async_trait]
impl AvailabilityChecker for YtDlp {
    async fn check_availability(&self, link: &str) -> Availability {
        match self.fetch_info(link, 1).await {
            Ok(info) => Availability::from_live_status(info.live_status.as_deref()),
            Err(e) => {
                tracing::warn!(link, error = %e, "availability lookup failed");
                Availability::Invalid
            }
        }
    }
}
