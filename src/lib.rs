//! MySQL connection pooling and script execution.
//!
//! This crate wraps a bounded, lazily-populated MySQL connection pool with a
//! query execution facade and a SQL script runner:
//!
//! - [`Pool`] hands out [`Lease`]s on connections, bounded by a semaphore,
//!   with health checks and bounded reconnect on checkout.
//! - [`Executor`] runs reads, transactional writes, and batches; parameters
//!   bind through driver placeholders and rows come back as JSON maps.
//! - [`ScriptRunner`] splits `.sql` files into statements (honoring string
//!   literals, comments, and `DELIMITER` directives) and executes each file
//!   on a single session, fail-fast.
//! - [`EventSink`] receives structured events for queries, database
//!   switches, and script files.
//!
//! ```no_run
//! use mysql_script_pool::{Executor, PoolConfig, QueryParam, ScriptRunner};
//!
//! # async fn demo() -> Result<(), mysql_script_pool::Error> {
//! let config = PoolConfig::new()
//!     .host("db.example.com")
//!     .username("app")
//!     .password("secret")
//!     .database("inventory")
//!     .max_connections(8);
//! let executor = Executor::new(config)?;
//!
//! let rows = executor
//!     .fetch_all(
//!         "SELECT id, name FROM items WHERE stock > ?",
//!         &[QueryParam::Int(10)],
//!         None,
//!     )
//!     .await?;
//! println!("{} rows", rows.row_count());
//!
//! let runner = ScriptRunner::new(executor.clone());
//! runner.run_file("migrations/001_init.sql", None).await?;
//!
//! executor.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod event;
pub mod executor;
pub mod models;
pub mod pool;
mod row;
pub mod script;
pub mod splitter;

pub use config::PoolConfig;
pub use connector::{Connector, MySqlConnector};
pub use error::{Error, Result};
pub use event::{Event, EventKind, EventSink, NoopSink, SharedSink, TracingSink};
pub use executor::{Executor, MySqlLease};
pub use models::{QueryParam, QueryRows, Row, WriteOutcome};
pub use pool::{Lease, Pool, PoolStatus};
pub use script::{ScriptRunner, SequenceError, StatementExecutor};
pub use splitter::split_script;
