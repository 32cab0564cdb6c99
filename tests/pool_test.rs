//! Pool behavior tests against a mock connector: lease lifecycle, capacity
//! accounting, reconnect policy, and teardown.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, timeout};

use mysql_script_pool::{Connector, Error, Pool, PoolConfig, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct MockConn {
    id: u32,
}

#[derive(Default)]
struct MockInner {
    next_id: AtomicU32,
    connect_calls: AtomicU32,
    fail_first: AtomicU32,
    unhealthy: Mutex<HashSet<u32>>,
    closed: Mutex<Vec<u32>>,
}

/// Connector double that assigns ids, can fail the first N dials, and can
/// declare individual connections unhealthy.
#[derive(Clone, Default)]
struct MockConnector {
    inner: Arc<MockInner>,
}

impl MockConnector {
    fn new() -> Self {
        Self::default()
    }

    fn fail_first(self, attempts: u32) -> Self {
        self.inner.fail_first.store(attempts, Ordering::SeqCst);
        self
    }

    fn mark_unhealthy(&self, id: u32) {
        self.inner.unhealthy.lock().insert(id);
    }

    fn connect_calls(&self) -> u32 {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    fn closed_ids(&self) -> Vec<u32> {
        self.inner.closed.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Conn = MockConn;

    async fn connect(&self) -> Result<MockConn> {
        let call = self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.inner.fail_first.load(Ordering::SeqCst) {
            return Err(Error::configuration("simulated connect failure"));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConn { id })
    }

    async fn check(&self, conn: &mut MockConn) -> bool {
        !self.inner.unhealthy.lock().contains(&conn.id)
    }

    async fn close(&self, conn: MockConn) {
        self.inner.closed.lock().push(conn.id);
    }
}

fn config(max_connections: u32) -> PoolConfig {
    PoolConfig::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_millis(200))
}

#[tokio::test]
async fn test_connections_created_lazily() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector.clone(), &config(3));
    assert_eq!(connector.connect_calls(), 0);

    let lease = pool.acquire().await.unwrap();
    assert_eq!(connector.connect_calls(), 1);
    lease.release().await;
}

#[tokio::test]
async fn test_released_connection_is_reused() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector.clone(), &config(3));

    let lease = pool.acquire().await.unwrap();
    let first_id = lease.id;
    lease.release().await;

    let lease = pool.acquire().await.unwrap();
    assert_eq!(lease.id, first_id);
    assert_eq!(connector.connect_calls(), 1);
    lease.release().await;
}

#[tokio::test]
async fn test_dropped_lease_returns_connection() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector.clone(), &config(1));

    let lease = pool.acquire().await.unwrap();
    let first_id = lease.id;
    drop(lease);

    let lease = pool.acquire().await.unwrap();
    assert_eq!(lease.id, first_id);
    assert_eq!(connector.connect_calls(), 1);
}

#[tokio::test]
async fn test_acquire_blocks_at_capacity_until_release() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector, &config(1));

    let held = pool.acquire().await.unwrap();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await });

    // The waiter must not complete while the only connection is leased.
    sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    held.release().await;
    let lease = waiter.await.unwrap().unwrap();
    lease.release().await;
}

#[tokio::test]
async fn test_capacity_bound_holds_under_contention() {
    let connector = MockConnector::new();
    let pool = Pool::new(
        connector.clone(),
        &PoolConfig::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(5)),
    );

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let pool = pool.clone();
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let lease = pool.acquire().await.unwrap();
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(10)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            lease.release().await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(connector.connect_calls() <= 2);
}

#[tokio::test]
async fn test_broken_connection_is_discarded_and_replaced() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector.clone(), &config(1));

    let mut lease = pool.acquire().await.unwrap();
    let first_id = lease.id;
    lease.mark_broken();
    lease.release().await;
    assert_eq!(connector.closed_ids(), vec![first_id]);

    let lease = pool.acquire().await.unwrap();
    assert_ne!(lease.id, first_id);
    assert_eq!(connector.connect_calls(), 2);
    lease.release().await;
}

#[tokio::test]
async fn test_unhealthy_idle_connection_discarded_on_checkout() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector.clone(), &config(2));

    let lease = pool.acquire().await.unwrap();
    let first_id = lease.id;
    lease.release().await;

    connector.mark_unhealthy(first_id);

    let lease = pool.acquire().await.unwrap();
    assert_ne!(lease.id, first_id);
    assert!(connector.closed_ids().contains(&first_id));
    lease.release().await;
}

#[tokio::test]
async fn test_acquire_times_out_when_exhausted() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector, &config(1));

    let _held = pool.acquire().await.unwrap();
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::PoolExhausted { waited_ms } if waited_ms >= 150));
}

#[tokio::test]
async fn test_cancelled_wait_leaves_no_ghost_reservation() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector, &config(1));

    let held = pool.acquire().await.unwrap();

    // Abandon a wait mid-flight; its pending permit must be released.
    let abandoned = timeout(Duration::from_millis(20), pool.acquire()).await;
    assert!(abandoned.is_err());

    held.release().await;
    let lease = pool.acquire().await.unwrap();
    lease.release().await;
}

#[tokio::test]
async fn test_connect_retries_until_success() {
    let connector = MockConnector::new().fail_first(2);
    let pool = Pool::new(
        connector.clone(),
        &config(1).connect_retries(3),
    );

    let lease = pool.acquire().await.unwrap();
    assert_eq!(connector.connect_calls(), 3);
    lease.release().await;
}

#[tokio::test]
async fn test_connect_failure_surfaces_after_bounded_attempts() {
    let connector = MockConnector::new().fail_first(10);
    let pool = Pool::new(
        connector.clone(),
        &config(1).connect_retries(2),
    );

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionUnavailable { attempts: 2, .. }));
    assert_eq!(connector.connect_calls(), 2);
}

#[tokio::test]
async fn test_close_drains_idle_and_rejects_acquire() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector.clone(), &config(2));

    let lease = pool.acquire().await.unwrap();
    let id = lease.id;
    lease.release().await;

    pool.close().await;
    pool.close().await; // idempotent

    assert!(pool.is_closed());
    assert_eq!(connector.closed_ids(), vec![id]);
    assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));
}

#[tokio::test]
async fn test_close_wakes_pending_waiters() {
    let connector = MockConnector::new();
    let pool = Pool::new(
        connector,
        &PoolConfig::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5)),
    );

    let _held = pool.acquire().await.unwrap();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await });
    sleep(Duration::from_millis(20)).await;

    pool.close().await;
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::PoolClosed)));
}

#[tokio::test]
async fn test_leased_connection_closed_on_release_after_shutdown() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector.clone(), &config(1));

    let lease = pool.acquire().await.unwrap();
    let id = lease.id;
    pool.close().await;

    lease.release().await;
    assert_eq!(connector.closed_ids(), vec![id]);
}

#[tokio::test]
async fn test_lease_has_debug_representation() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector, &config(1));

    let mut lease = pool.acquire().await.unwrap();
    assert!(format!("{lease:?}").contains("broken: false"));
    lease.mark_broken();
    assert!(format!("{lease:?}").contains("broken: true"));
    lease.release().await;
}

#[tokio::test]
async fn test_status_reflects_occupancy() {
    let connector = MockConnector::new();
    let pool = Pool::new(connector, &config(3));

    let status = pool.status();
    assert_eq!(status.idle, 0);
    assert_eq!(status.in_use, 0);
    assert_eq!(status.max, 3);

    let lease = pool.acquire().await.unwrap();
    let status = pool.status();
    assert_eq!(status.in_use, 1);

    lease.release().await;
    let status = pool.status();
    assert_eq!(status.idle, 1);
    assert_eq!(status.in_use, 0);
}
