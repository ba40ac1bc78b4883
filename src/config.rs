//! Configuration types for feedcast

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

/// Main configuration for [`FeedCaster`](crate::FeedCaster)
///
/// Every field has a default, so an empty JSON object is a valid configuration.
/// The data directory is threaded explicitly through the resolver, converter,
/// generator and server instead of living in a global.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root of all generated output (default: "./data")
    ///
    /// Feed output lives under `<data_dir>/feed/<feed dir name>/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Feed HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Source resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Media conversion settings
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Bulk refresh scheduling
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Retry policy for remote fetches
    #[serde(default)]
    pub retry: RetryConfig,

    /// Path to the yt-dlp executable (searched on PATH if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Keep at most this many media files across all feeds after a bulk refresh
    #[serde(default)]
    pub file_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            resolver: ResolverConfig::default(),
            converter: ConverterConfig::default(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            ytdlp_path: None,
            file_limit: None,
        }
    }
}

impl Config {
    /// Directory holding all per-feed output directories
    pub fn feeds_dir(&self) -> PathBuf {
        self.data_dir.join("feed")
    }

    /// Check settings that serde defaults cannot guard
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(config_error("port must not be 0", "server.port"));
        }
        if self.converter.mimic_delay_min_ms > self.converter.mimic_delay_max_ms {
            return Err(config_error(
                "mimic_delay_min_ms must not exceed mimic_delay_max_ms",
                "converter.mimic_delay_min_ms",
            ));
        }
        if self.converter.backends.is_empty() {
            return Err(config_error(
                "at least one conversion backend is required",
                "converter.backends",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// Feed HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (default: 0.0.0.0, reachable from the LAN)
    #[serde(default = "default_bind_ip")]
    pub bind_address: IpAddr,

    /// Port to listen on (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host (and optional port) written into enclosure URLs
    ///
    /// When None, `<primary outbound address>:<port>` is used.
    #[serde(default)]
    pub host: Option<String>,

    /// Enable CORS (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (empty or "*" allows any)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_ip(),
            port: default_port(),
            host: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    /// Socket address the server listens on
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// Source resolution configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum number of new playlist entries fetched per resolution (default: 10)
    ///
    /// 0 skips the per-entry lookup and uses the flat listing as is.
    #[serde(default = "default_max_fetch")]
    pub max_fetch: usize,

    /// Timeout for fetching a feed document (default: 5 seconds)
    #[serde(default = "default_feed_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User agent sent with feed requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Keep a copy of the fetched document as `source.rss` (default: true)
    #[serde(default = "default_true")]
    pub write_source: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_fetch: default_max_fetch(),
            request_timeout: default_feed_timeout(),
            user_agent: default_user_agent(),
            write_source: true,
        }
    }
}

/// Conversion backend selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// loader.to web service
    LoaderTo,
    /// oceansaver (ddownr) web service, same protocol as loader.to
    Oceansaver,
    /// yt1s web service
    Yt1s,
    /// Local yt-dlp executable (always tried last)
    YtDlp,
}

/// Media conversion configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Enabled backends (default: all)
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendKind>,

    /// Sleep a random interval between calls to web services (default: true)
    #[serde(default = "default_true")]
    pub mimic_human: bool,

    /// Lower bound of the random delay in milliseconds (default: 1000)
    #[serde(default = "default_mimic_delay_min_ms")]
    pub mimic_delay_min_ms: u64,

    /// Upper bound of the random delay in milliseconds (default: 3000)
    #[serde(default = "default_mimic_delay_max_ms")]
    pub mimic_delay_max_ms: u64,

    /// Base URL of the loader.to service
    #[serde(default = "default_loader_base_url")]
    pub loader_base_url: String,

    /// Base URL of the oceansaver service
    #[serde(default = "default_oceansaver_base_url")]
    pub oceansaver_base_url: String,

    /// Base URL of the yt1s service
    #[serde(default = "default_yt1s_base_url")]
    pub yt1s_base_url: String,

    /// Interval between conversion progress polls in milliseconds (default: 3000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up after this many polls without progress (default: 20)
    #[serde(default = "default_poll_max_unchanged")]
    pub poll_max_unchanged: u32,

    /// Timeout of a single request to a web service (default: 60 seconds)
    #[serde(default = "default_converter_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            mimic_human: true,
            mimic_delay_min_ms: default_mimic_delay_min_ms(),
            mimic_delay_max_ms: default_mimic_delay_max_ms(),
            loader_base_url: default_loader_base_url(),
            oceansaver_base_url: default_oceansaver_base_url(),
            yt1s_base_url: default_yt1s_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_unchanged: default_poll_max_unchanged(),
            request_timeout: default_converter_timeout(),
        }
    }
}

impl ConverterConfig {
    /// Delay between progress polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Bulk refresh scheduling configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run feed jobs one after another instead of in parallel (default: false)
    #[serde(default)]
    pub single_threaded: bool,
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_bind_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_fetch() -> usize {
    10
}

fn default_feed_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_user_agent() -> String {
    format!("feedcast/{}", env!("CARGO_PKG_VERSION"))
}

fn default_backends() -> Vec<BackendKind> {
    vec![
        BackendKind::LoaderTo,
        BackendKind::Oceansaver,
        BackendKind::Yt1s,
        BackendKind::YtDlp,
    ]
}

fn default_mimic_delay_min_ms() -> u64 {
    1000
}

fn default_mimic_delay_max_ms() -> u64 {
    3000
}

fn default_loader_base_url() -> String {
    "https://loader.to".to_string()
}

fn default_oceansaver_base_url() -> String {
    "https://p.oceansaver.in".to_string()
}

fn default_yt1s_base_url() -> String {
    "https://yt1s.com".to_string()
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_poll_max_unchanged() -> u32 {
    20
}

fn default_converter_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
