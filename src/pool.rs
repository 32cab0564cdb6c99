//! Bounded connection pool with lease semantics.
//!
//! The pool owns every connection; callers hold a [`Lease`] granting
//! exclusive temporary use. Capacity accounting rides on a semaphore, so a
//! caller abandoning an acquire wait leaves no ghost reservation: the permit
//! is released when the wait future drops. Connections are created lazily up
//! to capacity. A broken connection is never repaired in place; it is
//! discarded and replaced on next demand.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::config::PoolConfig;
use crate::connector::Connector;
use crate::error::{Error, Result};

/// A bounded pool of database connections.
///
/// Cloning is cheap and clones share the same pool state.
pub struct Pool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PoolInner<C: Connector> {
    connector: C,
    max_connections: u32,
    acquire_timeout: std::time::Duration,
    connect_retries: u32,
    test_on_checkout: bool,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<C::Conn>>,
    closed: AtomicBool,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Connections sitting idle in the pool.
    pub idle: u32,
    /// Permits currently handed out (leases plus in-flight dials).
    pub in_use: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl<C: Connector> Pool<C> {
    /// Create a pool. No connection is opened until the first acquire.
    pub fn new(connector: C, config: &PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                max_connections: config.max_connections,
                acquire_timeout: config.acquire_timeout,
                connect_retries: config.connect_retries,
                test_on_checkout: config.test_on_checkout,
                semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
                idle: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Acquire a lease on a healthy connection.
    ///
    /// Waits up to the configured acquire timeout for capacity, then reuses
    /// an idle connection or dials a new one. Fails with
    /// [`Error::PoolExhausted`] when capacity never frees up,
    /// [`Error::ConnectionUnavailable`] when dialing keeps failing, and
    /// [`Error::PoolClosed`] after teardown.
    pub async fn acquire(&self) -> Result<Lease<C>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed);
        }

        let start = Instant::now();
        let permit = match timeout(
            self.inner.acquire_timeout,
            Arc::clone(&self.inner.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            // The semaphore only errors once teardown closed it.
            Ok(Err(_)) => return Err(Error::PoolClosed),
            Err(_) => {
                return Err(Error::PoolExhausted {
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        loop {
            let candidate = self.inner.idle.lock().pop_front();
            match candidate {
                Some(mut conn) => {
                    if self.inner.test_on_checkout
                        && !self.inner.connector.check(&mut conn).await
                    {
                        tracing::debug!("discarding idle connection that failed health check");
                        self.inner.connector.close(conn).await;
                        continue;
                    }
                    tracing::trace!("reusing idle connection");
                    return Ok(Lease::new(conn, permit, Arc::clone(&self.inner)));
                }
                None => {
                    let conn = self.connect_with_retries().await?;
                    tracing::trace!("opened new connection");
                    return Ok(Lease::new(conn, permit, Arc::clone(&self.inner)));
                }
            }
        }
    }

    async fn connect_with_retries(&self) -> Result<C::Conn> {
        let attempts = self.inner.connect_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.connector.connect().await {
                Ok(conn) => return Ok(conn),
                Err(source) => {
                    if attempt >= attempts {
                        return Err(Error::ConnectionUnavailable {
                            attempts,
                            source: Box::new(source),
                        });
                    }
                    tracing::warn!(attempt, error = %source, "connection attempt failed, retrying");
                }
            }
        }
    }

    /// Tear the pool down.
    ///
    /// Idle connections are closed immediately; leased connections are
    /// closed when their lease is released. Pending and future acquires fail
    /// with [`Error::PoolClosed`]. Safe to call more than once.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.semaphore.close();
        let drained: Vec<C::Conn> = {
            let mut idle = self.inner.idle.lock();
            idle.drain(..).collect()
        };
        for conn in drained {
            self.inner.connector.close(conn).await;
        }
        tracing::info!("connection pool closed");
    }

    /// Check if teardown has begun.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Current pool occupancy.
    pub fn status(&self) -> PoolStatus {
        let idle = self.inner.idle.lock().len() as u32;
        let available = self.inner.semaphore.available_permits() as u32;
        PoolStatus {
            idle,
            in_use: self.inner.max_connections.saturating_sub(available),
            max: self.inner.max_connections,
        }
    }
}

/// Exclusive temporary use of one pooled connection.
///
/// Dropping the lease returns the connection to the pool (or discards it if
/// marked broken). Prefer [`Lease::release`] where possible: it closes
/// discarded connections gracefully instead of severing the socket.
pub struct Lease<C: Connector> {
    conn: Option<C::Conn>,
    pool: Arc<PoolInner<C>>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> Lease<C> {
    fn new(conn: C::Conn, permit: OwnedSemaphorePermit, pool: Arc<PoolInner<C>>) -> Self {
        Self {
            conn: Some(conn),
            pool,
            broken: false,
            _permit: permit,
        }
    }

    /// Mark the underlying connection as broken. It will be discarded on
    /// release instead of returning to the idle set.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Check if the connection has been marked broken.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Return the connection to the pool, closing it gracefully when it is
    /// broken or the pool has shut down.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken || self.pool.closed.load(Ordering::SeqCst) {
                tracing::debug!(broken = self.broken, "closing connection on release");
                self.pool.connector.close(conn).await;
            } else {
                self.pool.idle.lock().push_back(conn);
                tracing::trace!("connection returned to pool");
            }
        }
        // The permit drops with self, freeing capacity.
    }
}

impl<C: Connector> std::fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("broken", &self.broken)
            .field("held", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Deref for Lease<C> {
    type Target = C::Conn;

    fn deref(&self) -> &C::Conn {
        // Invariant: `conn` is Some for the lifetime of the lease; it is
        // only taken by `release` (which consumes self) and `Drop`.
        self.conn.as_ref().expect("lease already released")
    }
}

impl<C: Connector> DerefMut for Lease<C> {
    fn deref_mut(&mut self) -> &mut C::Conn {
        self.conn.as_mut().expect("lease already released")
    }
}

impl<C: Connector> Drop for Lease<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.broken && !self.pool.closed.load(Ordering::SeqCst) {
                self.pool.idle.lock().push_back(conn);
                tracing::trace!("connection returned to pool on drop");
            } else {
                // Dropping the connection severs the session; replacement is
                // lazy on next demand.
                tracing::debug!(broken = self.broken, "discarding connection on drop");
            }
        }
    }
}
