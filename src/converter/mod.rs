//! Media conversion fallback chain
//!
//! A link is converted to mp3 by trying a list of [`MediaConverterBackend`]s.
//! Web service backends are shuffled on every call so no single service sees
//! all the traffic; last-resort backends (the local yt-dlp) always run after
//! them. The first backend whose output passes the audio magic-byte check wins.
//!
//! Backend failures are soft: errors and panics are logged and the next
//! backend is tried. [`ConverterChain::convert`] only reports whether a valid
//! file was produced.

mod ajax;
mod download;
mod yt1s;
mod ytdlp_backend;

pub use ajax::AjaxProgressBackend;
pub use download::download_to;
pub use yt1s::Yt1sBackend;
pub use ytdlp_backend::YtDlpBackend;

use crate::config::{BackendKind, Config, ConverterConfig};
use crate::error::{ConversionError, Error, Result};
use crate::ytdlp::YtDlp;
use async_trait::async_trait;
use futures::FutureExt;
use rand::Rng;
use rand::seq::SliceRandom;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// One way of turning a media link into an mp3 file
#[async_trait]
pub trait MediaConverterBackend: Send + Sync {
    /// Convert `link` and write the result to `output`
    ///
    /// Returning `Ok` only claims success; the chain validates the file.
    async fn try_convert(&self, link: &str, output: &Path) -> Result<()>;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Last-resort backends are never shuffled and run after all others
    fn is_last_resort(&self) -> bool {
        false
    }
}

/// Randomized pause between requests to web services
#[derive(Clone, Copy, Debug)]
pub struct HumanDelay {
    enabled: bool,
    min: Duration,
    max: Duration,
}

impl HumanDelay {
    /// Delay drawn uniformly from `min..=max`
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            enabled: true,
            min,
            max: max.max(min),
        }
    }

    /// No delay at all
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Build from the converter settings
    pub fn from_config(config: &ConverterConfig) -> Self {
        if config.mimic_human {
            Self::new(
                Duration::from_millis(config.mimic_delay_min_ms),
                Duration::from_millis(config.mimic_delay_max_ms),
            )
        } else {
            Self::disabled()
        }
    }

    /// True if [`pause`](Self::pause) sleeps
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pick the next delay
    pub fn next_delay(&self) -> Duration {
        if !self.enabled || self.max.is_zero() {
            return Duration::ZERO;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Sleep for a random interval
    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Returns true if `header` starts like an mp3 file
///
/// Accepts an ID3v2 tag or a bare MPEG audio frame sync.
pub fn looks_like_mp3(header: &[u8]) -> bool {
    match header {
        [b'I', b'D', b'3', ..] => true,
        [0xFF, second, ..] => second & 0xE0 == 0xE0,
        _ => false,
    }
}

/// Check the magic bytes of `path`
pub async fn is_valid_mp3(path: &Path) -> bool {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(_) => return false,
    };
    let mut header = [0u8; 3];
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(_) => return false,
        }
    }
    looks_like_mp3(&header[..filled])
}

/// Ordered set of conversion backends with validation and cleanup
#[derive(Clone, Default)]
pub struct ConverterChain {
    backends: Vec<Arc<dyn MediaConverterBackend>>,
}

impl ConverterChain {
    /// Create a chain from explicit backends
    pub fn new(backends: Vec<Arc<dyn MediaConverterBackend>>) -> Self {
        Self { backends }
    }

    /// Build the backends named in the configuration
    ///
    /// The yt-dlp backend is skipped when no binary is available.
    pub fn from_config(config: &Config, ytdlp: Option<YtDlp>) -> Result<Self> {
        let converter = &config.converter;
        let http_client = reqwest::Client::builder()
            .timeout(converter.request_timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {e}")))?;
        let delay = HumanDelay::from_config(converter);

        let mut backends: Vec<Arc<dyn MediaConverterBackend>> = Vec::new();
        for kind in &converter.backends {
            match kind {
                BackendKind::LoaderTo => backends.push(Arc::new(AjaxProgressBackend::loader_to(
                    http_client.clone(),
                    converter,
                ))),
                BackendKind::Oceansaver => backends.push(Arc::new(
                    AjaxProgressBackend::oceansaver(http_client.clone(), converter),
                )),
                BackendKind::Yt1s => backends.push(Arc::new(Yt1sBackend::new(
                    http_client.clone(),
                    &converter.yt1s_base_url,
                    delay,
                    converter.poll_interval(),
                ))),
                BackendKind::YtDlp => match ytdlp.clone() {
                    Some(ytdlp) => backends.push(Arc::new(YtDlpBackend::new(ytdlp))),
                    None => tracing::warn!("yt-dlp not found, backend disabled"),
                },
            }
        }

        if backends.is_empty() {
            return Err(Error::Config {
                message: "no usable conversion backend".to_string(),
                key: Some("converter.backends".to_string()),
            });
        }
        Ok(Self::new(backends))
    }

    /// Number of backends
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True if the chain has no backends
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Names of the backends in configuration order
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Backends in the order one conversion tries them
    fn attempt_order(&self) -> Vec<Arc<dyn MediaConverterBackend>> {
        let (mut order, last): (Vec<_>, Vec<_>) = self
            .backends
            .iter()
            .cloned()
            .partition(|backend| !backend.is_last_resort());
        order.shuffle(&mut rand::thread_rng());
        order.extend(last);
        order
    }

    /// Convert `link` into an mp3 at `output`
    ///
    /// Returns true once a backend produced a file that passes validation.
    /// Invalid or partial files are removed before the next backend runs.
    pub async fn convert(&self, link: &str, output: &Path) -> bool {
        match self.try_convert(link, output).await {
            Ok(backend) => {
                tracing::info!(link, backend, output = %output.display(), "conversion completed");
                true
            }
            Err(e) => {
                tracing::error!(link, error = %e, "unable to convert media");
                false
            }
        }
    }

    /// Like [`convert`](Self::convert), returning the winning backend name
    pub async fn try_convert(
        &self,
        link: &str,
        output: &Path,
    ) -> std::result::Result<&'static str, ConversionError> {
        if let Some(parent) = output.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            tracing::error!(dir = %parent.display(), error = %e, "unable to create output directory");
            return Err(ConversionError::Exhausted);
        }

        for backend in self.attempt_order() {
            let name = backend.name();
            tracing::info!(link, backend = name, "trying conversion backend");

            let attempt = AssertUnwindSafe(backend.try_convert(link, output))
                .catch_unwind()
                .await;
            match attempt {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(link, backend = name, error = %e, "conversion backend failed");
                    remove_partial(output).await;
                    continue;
                }
                Err(_) => {
                    tracing::error!(link, backend = name, "conversion backend panicked");
                    remove_partial(output).await;
                    continue;
                }
            }

            if is_valid_mp3(output).await {
                return Ok(name);
            }
            tracing::warn!(
                link,
                error = %ConversionError::InvalidOutput { backend: name },
                "discarding converted file"
            );
            remove_partial(output).await;
        }

        Err(ConversionError::Exhausted)
    }
}

/// User agent sent to the web converters
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/116.0";

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "unable to remove output"),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
