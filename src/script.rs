//! Script file execution.
//!
//! [`ScriptRunner`] reads `.sql` files, splits them into statements, and
//! executes them in order through a [`StatementExecutor`]. All statements of
//! one file run on a single session, so session state (a `USE`, temporary
//! tables, procedures created under a custom delimiter) carries across the
//! file. Execution is fail-fast: the first failing statement aborts the file
//! and, for multi-file runs, everything after it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::fs;

use crate::error::{Error, Result};
use crate::event::{Event, EventKind, EventSink, NoopSink};
use crate::splitter::split_script;

/// Executes an ordered statement sequence on one session.
///
/// The seam between the runner and the pool: production code uses
/// [`crate::Executor`], tests substitute a recording implementation.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute_sequence(
        &self,
        statements: &[String],
        database: Option<&str>,
    ) -> std::result::Result<(), SequenceError>;
}

/// Failure from [`StatementExecutor::execute_sequence`].
#[derive(Debug)]
pub enum SequenceError {
    /// The session could not be prepared (acquire or database switch
    /// failed); no statement ran.
    Setup(Error),
    /// A statement failed. `index` is 0-based over the emitted statements.
    Statement { index: usize, source: Error },
}

/// Runs SQL script files against a statement executor.
pub struct ScriptRunner<E> {
    executor: E,
    sink: Arc<dyn EventSink>,
}

impl<E: StatementExecutor> ScriptRunner<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            sink: Arc::new(NoopSink),
        }
    }

    /// Attach an event sink receiving file-level events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Execute one script file. Returns the number of statements executed.
    ///
    /// A file that splits into zero statements (empty, or comments only) is
    /// a successful no-op. On a statement failure the error carries the file
    /// path and the 0-based index of the failing statement.
    pub async fn run_file(&self, path: impl AsRef<Path>, database: Option<&str>) -> Result<usize> {
        let path = path.as_ref();
        let script = fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(path, e))?;
        let statements = split_script(&script)?;
        tracing::info!(
            file = %path.display(),
            statements = statements.len(),
            "running script file"
        );
        self.record(
            EventKind::ScriptFileStart,
            json!({
                "file": path.display().to_string(),
                "statements": statements.len(),
            }),
        );

        if statements.is_empty() {
            self.record_end(path, 0, None);
            return Ok(0);
        }

        match self.executor.execute_sequence(&statements, database).await {
            Ok(()) => {
                self.record_end(path, statements.len(), None);
                Ok(statements.len())
            }
            Err(SequenceError::Setup(source)) => {
                self.record_end(path, 0, Some(&source));
                Err(source)
            }
            Err(SequenceError::Statement { index, source }) => {
                let err = Error::script(path, index, source);
                self.record_end(path, index, Some(&err));
                Err(err)
            }
        }
    }

    /// Execute script files in the given order, fail-fast. Files after a
    /// failing one are not touched. Returns the files that completed.
    ///
    /// On failure the returned [`Error::Script`] names the failing file;
    /// because execution follows the given order, every file before it in
    /// `paths` completed and every file from it onward did not run.
    pub async fn run_many(
        &self,
        paths: &[PathBuf],
        database: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let mut completed = Vec::with_capacity(paths.len());
        for path in paths {
            self.run_file(path, database).await?;
            completed.push(path.clone());
        }
        Ok(completed)
    }

    /// Resolve file names against a directory and execute them in the given
    /// order with [`ScriptRunner::run_many`] semantics.
    pub async fn run_directory(
        &self,
        dir: impl AsRef<Path>,
        filenames: &[&str],
        database: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let paths: Vec<PathBuf> = filenames.iter().map(|name| dir.join(name)).collect();
        tracing::debug!(dir = %dir.display(), files = paths.len(), "running script directory");
        self.run_many(&paths, database).await
    }

    fn record(&self, kind: EventKind, context: serde_json::Value) {
        self.sink.record(&Event::now(kind, context));
    }

    fn record_end(&self, path: &Path, executed: usize, error: Option<&Error>) {
        let context = match error {
            None => json!({
                "file": path.display().to_string(),
                "executed": executed,
                "status": "ok",
            }),
            Some(err) => json!({
                "file": path.display().to_string(),
                "executed": executed,
                "status": "error",
                "error": err.to_string(),
            }),
        };
        self.record(EventKind::ScriptFileEnd, context);
    }
}
