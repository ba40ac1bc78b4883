//! # feedcast
//!
//! Turns video channels and playlists into podcast feeds.
//!
//! Each registered feed points at a source URL: an RSS/Atom document or a
//! playlist that yt-dlp can list. A refresh resolves the source into a
//! [`Channel`], converts every new item to mp3 through a fallback chain of
//! conversion services, and writes a podcast RSS document whose enclosures
//! point at the local files. The built-in HTTP server publishes the feeds.
//!
//! ## Quick Start
//!
//! ```no_run
//! use feedcast::{Config, FeedCaster, FeedEntry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let caster = FeedCaster::new(Config::default())?
//!         .with_notifier(|| println!("feeds changed"));
//!     caster.load().await?;
//!
//!     caster
//!         .add_feed(FeedEntry::new(
//!             "Example",
//!             "UCexample",
//!             "https://www.youtube.com/feeds/videos.xml?channel_id=UCexample",
//!         ))
//!         .await;
//!
//!     let refreshed = caster.refresh_all(false).await;
//!     println!("refreshed {refreshed} feeds");
//!
//!     caster.start_server().await?;
//!     feedcast::run_with_shutdown(caster).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Pre-conversion availability checks
pub mod availability;
/// Feed orchestration
pub mod caster;
/// Channel, item and feed data model
pub mod channel;
/// Configuration types
pub mod config;
/// Media conversion fallback chain
pub mod converter;
/// Error types
pub mod error;
/// Podcast RSS generation
pub mod generator;
/// Feed container persistence
pub mod persistence;
/// Source URL resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Bulk job execution
pub mod scheduler;
/// Feed HTTP server
pub mod server;
/// Utility functions
pub mod utils;
/// yt-dlp subprocess wrapper
pub mod ytdlp;

// Re-export commonly used types
pub use availability::{Availability, AvailabilityChecker};
pub use caster::{CasterServices, FeedCaster, FeedUpdate, Notifier};
pub use channel::{Channel, FeedContainer, FeedEntry, Item, Thumbnail};
pub use config::{Config, ConverterConfig, ServerConfig};
pub use converter::{ConverterChain, MediaConverterBackend};
pub use error::{ConversionError, Error, ResolutionError, Result};
pub use persistence::{FeedStore, JsonFileStore};
pub use resolver::SourceResolver;
pub use server::ServerStatus;

/// Signal that ended a [`run_with_shutdown`] session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl+C or SIGINT
    Interrupt,
    /// SIGTERM, as sent by service managers and container runtimes
    Terminate,
}

/// Run until Ctrl+C (or SIGTERM on unix), then stop serving and save.
///
/// # Example
///
/// ```no_run
/// use feedcast::{Config, FeedCaster, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let caster = FeedCaster::new(Config::default())?;
///     caster.start_server().await?;
///
///     run_with_shutdown(caster).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(caster: FeedCaster) -> Result<()> {
    run_until(&caster, shutdown_signal()).await?;
    Ok(())
}

/// Wait for `shutdown`, then stop the feed server and persist the feeds
///
/// Returns the signal that ended the session.
pub async fn run_until<F>(caster: &FeedCaster, shutdown: F) -> Result<ShutdownSignal>
where
    F: std::future::Future<Output = ShutdownSignal>,
{
    let signal = shutdown.await;
    tracing::info!(?signal, "feedcast shutting down");
    caster.stop_server().await?;
    let saved = caster.save().await?;
    tracing::info!(saved, "feedcast stopped");
    Ok(signal)
}

async fn shutdown_signal() -> ShutdownSignal {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, only Ctrl+C stops feedcast");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Ctrl+C handler unavailable, stopping now");
            }
            ShutdownSignal::Interrupt
        }
        () = terminate => ShutdownSignal::Terminate,
    }
}
