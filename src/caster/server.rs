//! Feed server control

use super::FeedCaster;
use crate::error::Result;
use crate::server::ServerStatus;
use std::net::SocketAddr;

impl FeedCaster {
    /// Start serving feeds, returning the bound address
    pub async fn start_server(&self) -> Result<SocketAddr> {
        self.server.start().await
    }

    /// Stop serving feeds and wait for the server to shut down
    pub async fn stop_server(&self) -> Result<()> {
        self.server.stop().await
    }

    /// Lifecycle state of the feed server
    pub async fn server_status(&self) -> ServerStatus {
        self.server.status().await
    }
}
