use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, trace, warn};

use crate::client::conn::Conn;
use crate::error::ClientError;
use crate::transport::Connector;

/// A bounded pool of connections to one authority.
///
/// Up to `max_connections` live connections and up to `max_waiters` parked
/// acquirers. Waiters are strictly FIFO: a released connection is handed to
/// the head waiter under the pool lock, so a fresh `acquire` can never
/// overtake the queue.
pub(crate) struct Pool {
    shared: Arc<PoolShared>,
    connector: Connector,
    max_connections: usize,
    max_waiters: usize,
    body_capacity: usize,
}

/// The part of the pool the connection drivers talk back to (release on
/// exchange completion, destroy on transport close). Drivers hold it weakly;
/// the pool owning side keeps it alive.
pub(crate) struct PoolShared {
    inner: Mutex<PoolInner>,
    drained: Notify,
}

struct PoolInner {
    connections: HashMap<u64, Arc<Conn>>,
    available: VecDeque<Arc<Conn>>,
    waiters: VecDeque<oneshot::Sender<Arc<Conn>>>,
    dialing: usize,
    closed: bool,
}

enum Plan {
    Dial,
    Wait(oneshot::Receiver<Arc<Conn>>),
}

struct DialGuard<'a> {
    shared: &'a PoolShared,
}

impl Drop for DialGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock().dialing -= 1;
    }
}

impl Pool {
    pub(crate) fn new(connector: Connector, max_connections: usize, max_waiters: usize, body_capacity: usize) -> Self {
        let shared = Arc::new(PoolShared {
            inner: Mutex::new(PoolInner {
                connections: HashMap::new(),
                available: VecDeque::new(),
                waiters: VecDeque::new(),
                dialing: 0,
                closed: false,
            }),
            drained: Notify::new(),
        });
        Self { shared, connector, max_connections, max_waiters, body_capacity }
    }

    /// Get an idle connection, dial a new one while below the cap, or park
    /// in the waiter queue.
    pub(crate) async fn acquire(&self) -> Result<Arc<Conn>, ClientError> {
        let plan = {
            let mut inner = self.shared.lock();

            if inner.closed {
                return Err(ClientError::ClientAlreadyClosed);
            }

            while let Some(conn) = inner.available.pop_front() {
                if conn.is_open() {
                    trace!(conn_id = conn.id(), "reusing idle connection");
                    return Ok(conn);
                }
                trace!(conn_id = conn.id(), "discarding closed idle connection");
            }

            if inner.connections.len() + inner.dialing < self.max_connections {
                inner.dialing += 1;
                Plan::Dial
            } else if inner.waiters.len() >= self.max_waiters {
                return Err(ClientError::TooManyWaiters);
            } else {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(tx);
                trace!(waiters = inner.waiters.len(), "pool exhausted, parking acquirer");
                Plan::Wait(rx)
            }
        };

        match plan {
            Plan::Dial => self.dial().await,
            Plan::Wait(rx) => rx.await.map_err(|_| ClientError::ClientAlreadyClosed),
        }
    }

    async fn dial(&self) -> Result<Arc<Conn>, ClientError> {
        // the reservation must not leak if the acquirer is dropped mid-dial
        let guard = DialGuard { shared: &self.shared };
        let result = self.connector.dial().await;

        let mut inner = self.shared.lock();
        std::mem::forget(guard);
        inner.dialing -= 1;

        match result {
            Err(e) => {
                warn!(cause = %e, "dial failed");
                Err(ClientError::connect(e))
            }
            Ok(transport) => {
                if inner.closed {
                    return Err(ClientError::ClientAlreadyClosed);
                }

                let (conn, driver) = Conn::new(transport, Arc::downgrade(&self.shared), self.body_capacity);
                inner.connections.insert(conn.id(), conn.clone());
                let total = inner.connections.len();
                drop(inner);

                tokio::spawn(driver.run());
                debug!(conn_id = conn.id(), total, "connection established");
                Ok(conn)
            }
        }
    }

    /// Return an acquired connection that was never handed to its driver
    /// (dispatch failed early). Open connections go back into rotation.
    pub(crate) fn release(&self, conn: Arc<Conn>) {
        self.shared.release(conn);
    }

    /// One-way shutdown: fail all waiters, close every connection, wait for
    /// the drivers to drain. Idempotent; concurrent callers all wait.
    pub(crate) async fn stop(&self) {
        let (waiters, conns) = {
            let mut inner = self.shared.lock();
            if inner.closed {
                (VecDeque::new(), Vec::new())
            } else {
                inner.closed = true;
                inner.available.clear();
                let waiters = std::mem::take(&mut inner.waiters);
                let conns: Vec<_> = inner.connections.values().cloned().collect();
                (waiters, conns)
            }
        };

        // dropping the senders fails every parked acquirer
        drop(waiters);

        if !conns.is_empty() {
            info!(connections = conns.len(), "closing pooled connections");
        }
        for conn in conns {
            conn.close();
        }

        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.lock().connections.is_empty() {
                break;
            }
            notified.await;
        }
    }

    pub(crate) fn opened_connections(&self) -> usize {
        self.shared.lock().connections.len()
    }

    pub(crate) fn idle_connections(&self) -> usize {
        self.shared.lock().available.len()
    }
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        // a poisoned pool lock only means a panic elsewhere; the state
        // itself stays consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Put a finished connection back into rotation: the head waiter gets it
    /// directly, bypassing `available`.
    pub(crate) fn release(&self, mut conn: Arc<Conn>) {
        let mut inner = self.lock();

        if inner.closed || !conn.is_open() || conn.is_upgraded() {
            return;
        }

        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(conn) {
                Ok(()) => {
                    trace!("released connection handed to waiter");
                    return;
                }
                // that acquirer gave up; try the next one
                Err(returned) => conn = returned,
            }
        }

        trace!(conn_id = conn.id(), "connection back in idle set");
        inner.available.push_back(conn);
    }

    /// Forget a connection whose transport is gone. Called exactly once per
    /// connection, by its driver.
    pub(crate) fn destroy(&self, id: u64) {
        let mut inner = self.lock();

        if inner.connections.remove(&id).is_none() {
            error!(conn_id = id, "destroying a connection that was never registered");
            debug_assert!(false, "destroying a connection that was never registered");
        }
        inner.available.retain(|conn| conn.id() != id);

        let drained = inner.connections.is_empty();
        drop(inner);

        if drained {
            self.drained.notify_waiters();
        }
    }
}
