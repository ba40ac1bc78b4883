//! Feed HTTP server
//!
//! Serves the generated RSS documents and the converted media so podcast
//! clients on the local network can subscribe to them.
//!
//! # Routes
//!
//! - `GET /` - HTML index of all feeds
//! - `GET|POST /feed/:id` - RSS document of a feed
//! - `GET /feed/:id/:file` - Files of the feed directory (media, stored `rss`)
//!
//! [`FeedServer`] owns the lifecycle: `start` binds the socket before
//! returning so bind errors reach the caller, `stop` triggers graceful
//! shutdown and waits for the server task to finish.

mod routes;

pub use routes::{NOT_FOUND_BODY, create_router, index_page};

use crate::channel::FeedContainer;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use axum::http::HeaderValue;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Lifecycle state of the server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerStatus {
    /// Not listening
    Stopped,
    /// Accepting connections
    Started,
}

/// Shared state of all route handlers
#[derive(Clone)]
pub struct ServerState {
    /// Feeds to serve
    pub feeds: Arc<RwLock<FeedContainer>>,
    /// Root of the per-feed directories
    pub feeds_dir: PathBuf,
    /// `host:port` written into generated enclosure URLs
    pub host: String,
}

type StartedCallback = Arc<dyn Fn(SocketAddr) + Send + Sync>;
type StoppedCallback = Arc<dyn Fn() + Send + Sync>;

struct RunningServer {
    address: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Start/stop wrapper around the axum feed server
pub struct FeedServer {
    config: ServerConfig,
    state: ServerState,
    running: Mutex<Option<RunningServer>>,
    on_started: Option<StartedCallback>,
    on_stopped: Option<StoppedCallback>,
}

impl FeedServer {
    /// Create a stopped server
    pub fn new(config: ServerConfig, state: ServerState) -> Self {
        Self {
            config,
            state,
            running: Mutex::new(None),
            on_started: None,
            on_stopped: None,
        }
    }

    /// Callback invoked with the bound address after every start
    pub fn on_started<F>(mut self, callback: F) -> Self
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        self.on_started = Some(Arc::new(callback));
        self
    }

    /// Callback invoked after every stop
    pub fn on_stopped<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_stopped = Some(Arc::new(callback));
        self
    }

    /// Current lifecycle state
    pub async fn status(&self) -> ServerStatus {
        if self.running.lock().await.is_some() {
            ServerStatus::Started
        } else {
            ServerStatus::Stopped
        }
    }

    /// Address the server listens on, if started
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|running| running.address)
    }

    /// Bind and start serving
    ///
    /// Starting a started server is a no-op returning the existing address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(server) = running.as_ref() {
            tracing::debug!(address = %server.address, "feed server already started");
            return Ok(server.address);
        }

        let bind_address = self.config.socket_addr();
        tracing::info!(address = %bind_address, "starting feed server");

        let listener = TcpListener::bind(bind_address)
            .await
            .map_err(|source| Error::ServerBind {
                address: bind_address,
                source,
            })?;
        let address = listener.local_addr()?;

        let app = create_router(self.state.clone(), &self.config);
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(signal.cancelled_owned())
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "feed server failed");
            }
            tracing::info!("feed server task ended");
        });

        *running = Some(RunningServer {
            address,
            shutdown,
            handle,
        });
        drop(running);

        tracing::info!(address = %address, "feed server listening");
        if let Some(callback) = &self.on_started {
            callback(address);
        }
        Ok(address)
    }

    /// Shut down and wait for the server task
    ///
    /// Stopping a stopped server is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let Some(server) = self.running.lock().await.take() else {
            tracing::debug!("feed server not running");
            return Ok(());
        };

        tracing::info!(address = %server.address, "stopping feed server");
        server.shutdown.cancel();
        server
            .handle
            .await
            .map_err(|e| Error::Server(format!("server task failed: {e}")))?;

        if let Some(callback) = &self.on_stopped {
            callback();
        }
        Ok(())
    }
}

/// Best-effort IP address other hosts on the network can reach us at
///
/// Connecting a UDP socket sends nothing; it only selects the outbound
/// interface. Falls back to loopback.
pub fn primary_outbound_address() -> IpAddr {
    let local_ip = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        Ok(socket.local_addr()?.ip())
    };
    match local_ip() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            tracing::debug!(error = %e, "outbound address discovery failed, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// `host:port` used in generated URLs
///
/// The configured host wins; otherwise the outbound address and the server port.
pub fn public_host(config: &ServerConfig) -> String {
    match &config.host {
        Some(host) if !host.is_empty() => host.clone(),
        _ => SocketAddr::new(primary_outbound_address(), config.port).to_string(),
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
