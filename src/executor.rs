//! Query execution facade.
//!
//! [`Executor`] layers read, write, and raw operations on top of the pool.
//! Every operation acquires a lease, runs, and releases the lease before
//! returning; callers never manage connection lifetime, except through the
//! explicit [`Executor::raw`] opt-out for streaming use cases.
//!
//! Database overrides are per-lease: `USE` is issued on the leased
//! connection only, and the session is restored to the default database (or
//! discarded) before the connection rejoins the idle set, so overrides never
//! leak into other callers.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use sqlx::mysql::{MySqlArguments, MySqlConnection};
use sqlx::{Executor as _, MySql};
use tokio::time::timeout;

use crate::config::PoolConfig;
use crate::connector::MySqlConnector;
use crate::error::{Error, Result, truncate};
use crate::event::{Event, EventKind, EventSink};
use crate::models::{QueryParam, QueryRows, Row, WriteOutcome};
use crate::pool::{Lease, Pool};
use crate::row::{row_to_map, rows_to_query_rows};
use crate::script::{SequenceError, StatementExecutor};

/// A lease on a MySQL connection.
pub type MySqlLease = Lease<MySqlConnector>;

/// Query execution facade over a MySQL connection pool.
#[derive(Clone)]
pub struct Executor {
    pool: Pool<MySqlConnector>,
    default_database: Option<String>,
    query_timeout: std::time::Duration,
    sink: Arc<dyn EventSink>,
}

impl Executor {
    /// Create an executor and its pool from configuration. No connection is
    /// opened until the first operation.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let connector = MySqlConnector::new(&config);
        let pool = Pool::new(connector, &config);
        Ok(Self {
            pool,
            default_database: config.database.clone(),
            query_timeout: config.query_timeout,
            sink: Arc::new(crate::event::NoopSink),
        })
    }

    /// Attach an event sink receiving structured operation events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Access the underlying pool (status, teardown).
    pub fn pool(&self) -> &Pool<MySqlConnector> {
        &self.pool
    }

    /// Tear down the pool. Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run a read statement and return the first row, if any.
    pub async fn fetch_one(
        &self,
        sql: &str,
        params: &[QueryParam],
        database: Option<&str>,
    ) -> Result<Option<Row>> {
        let start = Instant::now();
        let mut lease = self.pool.acquire().await?;
        let result = match self.apply_override(&mut lease, database).await {
            Ok(switched) => {
                let result = self.fetch_one_on(&mut lease, sql, params).await;
                self.restore_default(&mut lease, switched).await;
                result
            }
            Err(err) => Err(err),
        };
        match &result {
            Ok(row) => self.record_success(sql, start, json!({"rows": row.is_some() as u64})),
            Err(err) => {
                note_failure(&mut lease, err);
                self.record_failure(sql, start, err);
            }
        }
        lease.release().await;
        result
    }

    /// Run a read statement and materialize all rows.
    pub async fn fetch_all(
        &self,
        sql: &str,
        params: &[QueryParam],
        database: Option<&str>,
    ) -> Result<QueryRows> {
        let start = Instant::now();
        let mut lease = self.pool.acquire().await?;
        let result = match self.apply_override(&mut lease, database).await {
            Ok(switched) => {
                let result = self.fetch_all_on(&mut lease, sql, params).await;
                self.restore_default(&mut lease, switched).await;
                result
            }
            Err(err) => Err(err),
        };
        match &result {
            Ok(rows) => self.record_success(sql, start, json!({"rows": rows.row_count()})),
            Err(err) => {
                note_failure(&mut lease, err);
                self.record_failure(sql, start, err);
            }
        }
        lease.release().await;
        result
    }

    /// Run a write statement inside a transaction and commit.
    ///
    /// On any failure after submission the transaction is rolled back before
    /// the lease is released.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[QueryParam],
        database: Option<&str>,
    ) -> Result<WriteOutcome> {
        let start = Instant::now();
        let mut lease = self.pool.acquire().await?;
        let result = match self.apply_override(&mut lease, database).await {
            Ok(switched) => {
                let result = self.execute_on(&mut lease, sql, params).await;
                self.restore_default(&mut lease, switched).await;
                result
            }
            Err(err) => Err(err),
        };
        match &result {
            Ok(outcome) => {
                self.record_success(sql, start, json!({"rows_affected": outcome.rows_affected}));
            }
            Err(err) => {
                note_failure(&mut lease, err);
                self.record_failure(sql, start, err);
            }
        }
        lease.release().await;
        result
    }

    /// Run one statement template against many parameter rows in a single
    /// transaction. The statement is prepared once and rebound per row.
    pub async fn execute_batch(
        &self,
        sql: &str,
        rows: &[Vec<QueryParam>],
        database: Option<&str>,
    ) -> Result<WriteOutcome> {
        let start = Instant::now();
        let mut lease = self.pool.acquire().await?;
        let result = match self.apply_override(&mut lease, database).await {
            Ok(switched) => {
                let result = self.execute_batch_on(&mut lease, sql, rows).await;
                self.restore_default(&mut lease, switched).await;
                result
            }
            Err(err) => Err(err),
        };
        match &result {
            Ok(outcome) => self.record_success(
                sql,
                start,
                json!({"rows_affected": outcome.rows_affected, "batch_size": rows.len()}),
            ),
            Err(err) => {
                note_failure(&mut lease, err);
                self.record_failure(sql, start, err);
            }
        }
        lease.release().await;
        result
    }

    /// Acquire a lease for caller-managed execution (streaming, cursors).
    ///
    /// This is the sole operation where the caller owns the connection
    /// lifetime; release is still guaranteed on all exit paths because
    /// dropping the lease returns it. With a database override the lease is
    /// marked broken up front so the switched session never rejoins the
    /// idle set.
    pub async fn raw(&self, database: Option<&str>) -> Result<MySqlLease> {
        let mut lease = self.pool.acquire().await?;
        if database.is_some() {
            match self.apply_override(&mut lease, database).await {
                Ok(_) => lease.mark_broken(),
                Err(err) => {
                    lease.release().await;
                    return Err(err);
                }
            }
        }
        Ok(lease)
    }

    /// Name of the database the session selects by default, as reported by
    /// the server.
    pub async fn current_database(&self) -> Result<Option<String>> {
        const SQL: &str = "SELECT DATABASE()";
        let mut lease = self.pool.acquire().await?;
        let fut = sqlx::query_scalar::<_, Option<String>>(SQL).fetch_one(&mut *lease);
        let result = match timeout(self.query_timeout, fut).await {
            Ok(Ok(db)) => Ok(db),
            Ok(Err(e)) => Err(Error::statement(SQL, e)),
            Err(_) => Err(Error::timeout(
                "query execution",
                self.query_timeout.as_secs(),
            )),
        };
        if let Err(err) = &result {
            note_failure(&mut lease, err);
        }
        lease.release().await;
        result
    }

    async fn fetch_one_on(
        &self,
        lease: &mut MySqlLease,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Option<Row>> {
        let fut = async {
            if params.is_empty() {
                (&mut **lease).fetch_optional(sql).await
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_param(query, param);
                }
                query.fetch_optional(&mut **lease).await
            }
        };
        match timeout(self.query_timeout, fut).await {
            Ok(Ok(row)) => Ok(row.as_ref().map(row_to_map)),
            Ok(Err(e)) => Err(Error::statement(sql, e)),
            Err(_) => Err(self.query_timeout_error()),
        }
    }

    async fn fetch_all_on(
        &self,
        lease: &mut MySqlLease,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<QueryRows> {
        let fut = async {
            if params.is_empty() {
                (&mut **lease).fetch_all(sql).await
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_param(query, param);
                }
                query.fetch_all(&mut **lease).await
            }
        };
        match timeout(self.query_timeout, fut).await {
            Ok(Ok(rows)) => Ok(rows_to_query_rows(&rows)),
            Ok(Err(e)) => Err(Error::statement(sql, e)),
            Err(_) => Err(self.query_timeout_error()),
        }
    }

    async fn execute_on(
        &self,
        lease: &mut MySqlLease,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<WriteOutcome> {
        let rows = [params];
        let fut = write_in_transaction(&mut **lease, sql, &rows);
        match timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(self.query_timeout_error()),
        }
    }

    async fn execute_batch_on(
        &self,
        lease: &mut MySqlLease,
        sql: &str,
        rows: &[Vec<QueryParam>],
    ) -> Result<WriteOutcome> {
        let row_refs: Vec<&[QueryParam]> = rows.iter().map(Vec::as_slice).collect();
        let fut = write_in_transaction(&mut **lease, sql, &row_refs);
        match timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(self.query_timeout_error()),
        }
    }

    /// Issue a per-lease `USE` when a database override is requested.
    /// Returns whether a switch happened.
    async fn apply_override(
        &self,
        lease: &mut MySqlLease,
        database: Option<&str>,
    ) -> Result<bool> {
        let Some(db) = database else {
            return Ok(false);
        };
        let stmt = format!("USE {}", quote_identifier(db));
        match timeout(self.query_timeout, (&mut **lease).execute(stmt.as_str())).await {
            Ok(Ok(_)) => {
                tracing::debug!(database = db, "switched session database");
                self.record(EventKind::DatabaseSwitch, json!({"database": db}));
                Ok(true)
            }
            Ok(Err(e)) => {
                let err = Error::statement(&stmt, e);
                note_failure(lease, &err);
                Err(err)
            }
            Err(_) => {
                lease.mark_broken();
                Err(Error::timeout(
                    "database switch",
                    self.query_timeout.as_secs(),
                ))
            }
        }
    }

    /// Point a switched session back at the default database before it
    /// rejoins the idle set. When that is impossible the connection is
    /// discarded so the override cannot leak to other callers.
    async fn restore_default(&self, lease: &mut MySqlLease, switched: bool) {
        if !switched || lease.is_broken() {
            return;
        }
        match &self.default_database {
            Some(db) => {
                let stmt = format!("USE {}", quote_identifier(db));
                if let Err(error) = (&mut **lease).execute(stmt.as_str()).await {
                    tracing::warn!(error = %error, "failed to restore default database, discarding connection");
                    lease.mark_broken();
                }
            }
            None => lease.mark_broken(),
        }
    }

    fn query_timeout_error(&self) -> Error {
        Error::timeout("query execution", self.query_timeout.as_secs())
    }

    fn record(&self, kind: EventKind, context: JsonValue) {
        self.sink.record(&Event::now(kind, context));
    }

    fn record_success(&self, sql: &str, start: Instant, extra: JsonValue) {
        let mut context = json!({
            "sql": truncate(sql, 200),
            "elapsed_ms": start.elapsed().as_millis() as u64,
        });
        if let (Some(target), Some(source)) = (context.as_object_mut(), extra.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        self.record(EventKind::QuerySuccess, context);
    }

    fn record_failure(&self, sql: &str, start: Instant, error: &Error) {
        self.record(
            EventKind::QueryFailure,
            json!({
                "sql": truncate(sql, 200),
                "elapsed_ms": start.elapsed().as_millis() as u64,
                "error": error.to_string(),
            }),
        );
    }
}

#[async_trait]
impl StatementExecutor for Executor {
    /// Execute statements in order on one session. Statements run through
    /// the unprepared path (stored procedure bodies cannot be prepared) and
    /// commit individually under autocommit.
    async fn execute_sequence(
        &self,
        statements: &[String],
        database: Option<&str>,
    ) -> std::result::Result<(), SequenceError> {
        let mut lease = match self.pool.acquire().await {
            Ok(lease) => lease,
            Err(err) => return Err(SequenceError::Setup(err)),
        };
        let switched = match self.apply_override(&mut lease, database).await {
            Ok(switched) => switched,
            Err(err) => {
                lease.release().await;
                return Err(SequenceError::Setup(err));
            }
        };
        for (index, statement) in statements.iter().enumerate() {
            let start = Instant::now();
            let fut = (&mut *lease).execute(statement.as_str());
            let outcome = match timeout(self.query_timeout, fut).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(Error::statement(statement, e)),
                Err(_) => Err(self.query_timeout_error()),
            };
            if let Err(source) = outcome {
                note_failure(&mut lease, &source);
                self.record_failure(statement, start, &source);
                self.restore_default(&mut lease, switched).await;
                lease.release().await;
                return Err(SequenceError::Statement { index, source });
            }
        }
        self.restore_default(&mut lease, switched).await;
        lease.release().await;
        Ok(())
    }
}

/// Bind a parameter to a MySQL query through a driver placeholder.
fn bind_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Session surface the transactional write path runs against.
///
/// Implemented by [`MySqlConnection`]; tests substitute a recording session
/// to exercise the commit/rollback decision without a server.
#[async_trait]
pub(crate) trait WriteSession: Send {
    async fn begin(&mut self) -> std::result::Result<(), sqlx::Error>;
    async fn commit(&mut self) -> std::result::Result<(), sqlx::Error>;
    async fn rollback(&mut self) -> std::result::Result<(), sqlx::Error>;
    /// Run one statement. Returns (rows affected, last insert id; 0 when the
    /// statement generated none).
    async fn apply(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> std::result::Result<(u64, u64), sqlx::Error>;
}

#[async_trait]
impl WriteSession for MySqlConnection {
    async fn begin(&mut self) -> std::result::Result<(), sqlx::Error> {
        (&mut *self).execute("BEGIN").await.map(|_| ())
    }

    async fn commit(&mut self) -> std::result::Result<(), sqlx::Error> {
        (&mut *self).execute("COMMIT").await.map(|_| ())
    }

    async fn rollback(&mut self) -> std::result::Result<(), sqlx::Error> {
        (&mut *self).execute("ROLLBACK").await.map(|_| ())
    }

    async fn apply(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> std::result::Result<(u64, u64), sqlx::Error> {
        let done = if params.is_empty() {
            // Unprepared path: statements like CREATE PROCEDURE cannot go
            // through the prepared-statement protocol.
            (&mut *self).execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_param(query, param);
            }
            query.execute(&mut *self).await?
        };
        Ok((done.rows_affected(), done.last_insert_id()))
    }
}

/// Run one statement template against each parameter row inside a single
/// transaction. The first failing row rolls the transaction back and
/// surfaces the statement error; nothing is committed.
pub(crate) async fn write_in_transaction<S: WriteSession + ?Sized>(
    session: &mut S,
    sql: &str,
    rows: &[&[QueryParam]],
) -> Result<WriteOutcome> {
    session
        .begin()
        .await
        .map_err(|e| Error::statement("BEGIN", e))?;
    let mut rows_affected = 0u64;
    let mut last_insert_id = None;
    for params in rows {
        match session.apply(sql, params).await {
            Ok((affected, insert_id)) => {
                rows_affected += affected;
                if insert_id != 0 {
                    last_insert_id = Some(insert_id);
                }
            }
            Err(e) => {
                if let Err(rollback_err) = session.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed after statement error");
                }
                return Err(Error::statement(sql, e));
            }
        }
    }
    session
        .commit()
        .await
        .map_err(|e| Error::statement(sql, e))?;
    Ok(WriteOutcome {
        rows_affected,
        last_insert_id,
    })
}

/// Mark the lease broken when the error points at a dead session rather
/// than a rejected statement. A timed-out statement leaves the connection
/// mid-protocol, so it is discarded too.
fn note_failure(lease: &mut MySqlLease, error: &Error) {
    let broken = match error {
        Error::Timeout { .. } => true,
        Error::Statement { source, .. } => is_connection_error(source),
        _ => false,
    };
    if broken {
        lease.mark_broken();
    }
}

fn is_connection_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::PoolClosed
    )
}

/// Quote a MySQL identifier with backticks.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
