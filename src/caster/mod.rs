//! Feed pipeline orchestration split into focused submodules.
//!
//! The [`FeedCaster`] struct and its methods are organized by domain:
//! - [`pipeline`] - Fetch, convert and generate for a single feed
//! - [`bulk`] - Parallel refresh of all feeds
//! - [`prune`] - File limit enforcement
//! - [`server`] - Feed server start/stop
//!
//! Refresh jobs never hold the feed lock while talking to the network. Each
//! job works on a clone of its [`FeedEntry`] and hands the result back as a
//! [`FeedUpdate`], which the caster writes into the shared container.

mod bulk;
mod pipeline;
mod prune;
mod server;

use crate::availability::{AssumeAvailable, AvailabilityChecker};
use crate::channel::{FeedContainer, FeedEntry};
use crate::config::Config;
use crate::converter::ConverterChain;
use crate::error::{Error, Result};
use crate::persistence::{FeedStore, JsonFileStore};
use crate::resolver::SourceResolver;
use crate::scheduler::{ExecutionMode, JobScheduler};
use crate::server::{FeedServer, ServerState, public_host};
use crate::ytdlp::{InfoExtractor, YtDlp};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Observer of feed changes, typically a UI refresh trigger
pub trait Notifier: Send + Sync {
    /// Called after feed state visible to observers changed
    fn on_feed_changed(&self);
}

impl<F> Notifier for F
where
    F: Fn() + Send + Sync,
{
    fn on_feed_changed(&self) {
        self()
    }
}

/// Result of one refresh job
#[derive(Clone, Debug)]
pub struct FeedUpdate {
    /// Position of the feed in the container when the job started
    pub index: usize,
    /// Refreshed copy of the feed
    pub entry: FeedEntry,
}

/// Collaborators of a [`FeedCaster`]
pub struct CasterServices {
    /// Feed URL resolution
    pub resolver: SourceResolver,
    /// Media conversion
    pub converter: ConverterChain,
    /// Availability lookups before conversion
    pub availability: Arc<dyn AvailabilityChecker>,
    /// Persistence of the feed container
    pub store: Arc<dyn FeedStore>,
}

/// Drives resolution, conversion, generation and serving of all feeds
#[derive(Clone)]
pub struct FeedCaster {
    config: Arc<Config>,
    feeds: Arc<RwLock<FeedContainer>>,
    resolver: SourceResolver,
    converter: ConverterChain,
    availability: Arc<dyn AvailabilityChecker>,
    store: Arc<dyn FeedStore>,
    scheduler: JobScheduler,
    notifier: Option<Arc<dyn Notifier>>,
    server: Arc<FeedServer>,
    server_callbacks: ServerCallbacks,
    host: String,
}

type StartedCallback = Arc<dyn Fn(SocketAddr) + Send + Sync>;
type StoppedCallback = Arc<dyn Fn() + Send + Sync>;

/// Server status hooks, kept so the server can be rebuilt with them
#[derive(Clone, Default)]
struct ServerCallbacks {
    on_started: Option<StartedCallback>,
    on_stopped: Option<StoppedCallback>,
}

impl FeedCaster {
    /// Create a caster with the default collaborators
    ///
    /// yt-dlp is looked up at `config.ytdlp_path` or in PATH. Without it only
    /// RSS/Atom sources resolve and the web converters are the only backends.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let ytdlp = YtDlp::discover(config.ytdlp_path.as_deref());
        match &ytdlp {
            Some(ytdlp) => tracing::info!(path = %ytdlp.binary_path().display(), "using yt-dlp"),
            None => tracing::warn!("yt-dlp not found, playlist sources are unavailable"),
        }

        let extractor = ytdlp
            .clone()
            .map(|ytdlp| Arc::new(ytdlp) as Arc<dyn InfoExtractor>);
        let availability: Arc<dyn AvailabilityChecker> = match ytdlp.clone() {
            Some(ytdlp) => Arc::new(ytdlp),
            None => Arc::new(AssumeAvailable),
        };

        let services = CasterServices {
            resolver: SourceResolver::new(&config, extractor)?,
            converter: ConverterChain::from_config(&config, ytdlp)?,
            availability,
            store: Arc::new(JsonFileStore::in_dir(&config.data_dir)),
        };
        Ok(Self::from_parts(config, services))
    }

    /// Create a caster from explicit collaborators
    pub fn from_parts(config: Config, services: CasterServices) -> Self {
        let host = public_host(&config.server);
        let feeds = Arc::new(RwLock::new(FeedContainer::new()));
        let server_state = ServerState {
            feeds: feeds.clone(),
            feeds_dir: config.feeds_dir(),
            host: host.clone(),
        };
        let server = Arc::new(FeedServer::new(config.server.clone(), server_state));
        let scheduler =
            JobScheduler::new(ExecutionMode::from_single_threaded(config.scheduler.single_threaded));

        Self {
            config: Arc::new(config),
            feeds,
            resolver: services.resolver,
            converter: services.converter,
            availability: services.availability,
            store: services.store,
            scheduler,
            notifier: None,
            server,
            server_callbacks: ServerCallbacks::default(),
            host,
        }
    }

    /// Register the change observer
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Register feed server status callbacks
    ///
    /// Must be called before the server is started.
    pub fn with_server_callbacks<S, T>(mut self, on_started: S, on_stopped: T) -> Self
    where
        S: Fn(SocketAddr) + Send + Sync + 'static,
        T: Fn() + Send + Sync + 'static,
    {
        self.server_callbacks = ServerCallbacks {
            on_started: Some(Arc::new(on_started)),
            on_stopped: Some(Arc::new(on_stopped)),
        };
        self.rebuild_server();
        self
    }

    /// Override the `host:port` used in enclosure URLs
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self.rebuild_server();
        self
    }

    /// Replace the (stopped) server with one using the current host and hooks
    fn rebuild_server(&mut self) {
        let mut server = FeedServer::new(self.config.server.clone(), self.server_state());
        if let Some(callback) = self.server_callbacks.on_started.clone() {
            server = server.on_started(move |address| callback(address));
        }
        if let Some(callback) = self.server_callbacks.on_stopped.clone() {
            server = server.on_stopped(move || callback());
        }
        self.server = Arc::new(server);
    }

    fn server_state(&self) -> ServerState {
        ServerState {
            feeds: self.feeds.clone(),
            feeds_dir: self.config.feeds_dir(),
            host: self.host.clone(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared feed container
    ///
    /// Refresh results are written back under the write lock, so readers
    /// always see complete entries.
    pub fn feeds(&self) -> Arc<RwLock<FeedContainer>> {
        self.feeds.clone()
    }

    /// `host:port` written into generated feeds
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Directory holding the per-feed directories
    pub fn feeds_dir(&self) -> PathBuf {
        self.config.feeds_dir()
    }

    /// Append a feed, returning its index
    pub async fn add_feed(&self, feed: FeedEntry) -> usize {
        let index = self.feeds.write().await.add_feed(feed);
        self.notify();
        index
    }

    /// Remove the feed at `index`
    pub async fn remove_feed(&self, index: usize) -> Option<FeedEntry> {
        let removed = self.feeds.write().await.remove_feed(index);
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Replace the in-memory feeds with the stored ones
    pub async fn load(&self) -> Result<()> {
        let loaded = self.store.load().await?;
        *self.feeds.write().await = loaded;
        self.notify();
        Ok(())
    }

    /// Persist the feeds, returning true if the stored state changed
    pub async fn save(&self) -> Result<bool> {
        let feeds = self.feeds.read().await;
        self.store.store(&feeds).await
    }

    /// Clone of the feed at `index`
    async fn entry_at(&self, index: usize) -> Result<FeedEntry> {
        self.feeds
            .read()
            .await
            .get(index)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("feed #{index}")))
    }

    /// Write a job result back into the container
    ///
    /// The update is dropped if the slot now holds a different feed.
    async fn apply_update(&self, update: FeedUpdate) -> bool {
        let mut feeds = self.feeds.write().await;
        match feeds.get(update.index) {
            Some(current) if current.feed_id == update.entry.feed_id => {
                feeds.replace_feed(update.index, update.entry);
                true
            }
            _ => {
                tracing::warn!(
                    index = update.index,
                    feed_id = %update.entry.feed_id,
                    "feed changed during refresh, update dropped"
                );
                false
            }
        }
    }

    fn notify(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.on_feed_changed();
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
