//! Connection establishment and health checking.
//!
//! The pool is generic over a [`Connector`] so its acquire/release mechanics
//! can be exercised without a live server. [`MySqlConnector`] is the
//! production implementation backed by sqlx.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::ConnectOptions;
use sqlx::Connection;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use tokio::time::timeout;

use crate::config::PoolConfig;
use crate::error::{Error, Result};

/// Opens, checks, and closes connections on behalf of the pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type managed by the pool.
    type Conn: Send + 'static;

    /// Open a new connection. A single attempt; retry policy lives in the
    /// pool.
    async fn connect(&self) -> Result<Self::Conn>;

    /// Check that an idle connection is still usable.
    async fn check(&self, conn: &mut Self::Conn) -> bool;

    /// Close a connection gracefully.
    async fn close(&self, conn: Self::Conn);
}

/// Connector for MySQL servers.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
}

impl MySqlConnector {
    /// Build a connector from pool configuration. No network I/O happens
    /// here; the first dial is on first acquire.
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            options: config.connect_options(),
            connect_timeout: config.connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Conn = MySqlConnection;

    async fn connect(&self) -> Result<MySqlConnection> {
        match timeout(self.connect_timeout, self.options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(source)) => Err(Error::Connect { source }),
            Err(_) => Err(Error::timeout(
                "connection establishment",
                self.connect_timeout.as_secs(),
            )),
        }
    }

    async fn check(&self, conn: &mut MySqlConnection) -> bool {
        conn.ping().await.is_ok()
    }

    async fn close(&self, conn: MySqlConnection) {
        if let Err(error) = conn.close().await {
            tracing::debug!(error = %error, "error while closing connection");
        }
    }
}
