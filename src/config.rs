//! Pool configuration.

use std::time::Duration;

use sqlx::mysql::MySqlConnectOptions;

use crate::error::{Error, Result};

/// Configuration for the connection pool.
///
/// All values have documented defaults; construction performs no network
/// I/O. Connections are opened lazily on first acquire.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// MySQL server host.
    pub host: String,

    /// MySQL server port.
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Password for authentication.
    pub password: String,

    /// Default database selected for new connections. `None` connects at
    /// server level.
    pub database: Option<String>,

    /// Maximum number of connections the pool may hold.
    pub max_connections: u32,

    /// Time budget for establishing a single connection.
    pub connect_timeout: Duration,

    /// Time to wait for a free connection before failing with
    /// `PoolExhausted`.
    pub acquire_timeout: Duration,

    /// Bounded number of connection attempts before surfacing
    /// `ConnectionUnavailable`. Must be at least 1.
    pub connect_retries: u32,

    /// Whether to ping idle connections before handing them out.
    pub test_on_checkout: bool,

    /// Time budget for a single query or statement.
    pub query_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: None,
            max_connections: 5,
            connect_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(30),
            connect_retries: 2,
            test_on_checkout: true,
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the default database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the single-connection establishment timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the bounded number of connection attempts.
    #[must_use]
    pub fn connect_retries(mut self, attempts: u32) -> Self {
        self.connect_retries = attempts;
        self
    }

    /// Enable or disable pinging idle connections on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    /// Set the per-statement query timeout.
    #[must_use]
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::configuration(
                "max_connections must be greater than 0",
            ));
        }
        if self.connect_retries == 0 {
            return Err(Error::configuration(
                "connect_retries must be at least 1",
            ));
        }
        if self.host.is_empty() {
            return Err(Error::configuration("host must not be empty"));
        }
        Ok(())
    }

    /// Build sqlx connect options from this configuration.
    pub(crate) fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .charset("utf8mb4");
        if let Some(db) = &self.database {
            options = options.database(db);
        }
        options
    }
}
