//! Bounded, thread-safe connection pool fronting a backend client.
//!
//! Mirrors the original service's own `ConnectionPool`: a bounded queue of
//! idle connections plus a factory that lazily builds a fresh one when the
//! queue is empty. Checkout returns an RAII guard that puts the connection
//! back on `Drop`, which gives "return-on-success, drop-on-exception" for
//! free — callers that hit a backend error can call [`PooledConnection::discard`]
//! to suppress the return instead of unwinding through a `Drop` impl that
//! would otherwise quietly reuse a possibly-poisoned connection.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Default pool capacity, matching the original service's default.
pub const DEFAULT_POOL_SIZE: usize = 20;

struct Inner<T> {
    idle_tx: Sender<T>,
    idle_rx: Receiver<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

/// A bounded pool of reusable `T` connections.
pub struct Pool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Pool<T> {
    /// Builds a pool with the given capacity and connection factory.
    pub fn new(capacity: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let (idle_tx, idle_rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                idle_tx,
                idle_rx,
                factory: Box::new(factory),
            }),
        }
    }

    /// Checks out a connection, creating a new one if the pool is empty.
    pub fn checkout(&self) -> PooledConnection<T> {
        let conn = self
            .inner
            .idle_rx
            .try_recv()
            .unwrap_or_else(|_| (self.inner.factory)());

        PooledConnection {
            conn: Some(conn),
            pool: self.clone(),
        }
    }

    fn release(&self, conn: T) {
        // A full queue means the pool is already at capacity with idle
        // connections; just drop the extra one instead of blocking.
        if let Err(TrySendError::Disconnected(_)) = self.inner.idle_tx.try_send(conn) {
            log::warn!("connection pool channel disconnected on release");
        }
    }
}

/// An RAII handle on a checked-out connection. Returns the connection to the
/// pool on `Drop` unless [`discard`](Self::discard) was called first.
pub struct PooledConnection<T: Send + 'static> {
    conn: Option<T>,
    pool: Pool<T>,
}

impl<T: Send + 'static> PooledConnection<T> {
    /// Drops the connection without returning it to the pool, for use after
    /// observing a backend error that may have left the connection in a bad
    /// state.
    pub fn discard(mut self) {
        self.conn.take();
    }
}

impl<T: Send + 'static> std::ops::Deref for PooledConnection<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl<T: Send + 'static> std::ops::DerefMut for PooledConnection<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection taken before drop")
    }
}

impl<T: Send + 'static> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Runs `f` on a scoped worker thread and waits up to `timeout` (§5.2's
/// per-backend timeout policy). `None` means the call didn't finish in time.
pub(crate) fn with_timeout<T: Send>(timeout: Duration, f: impl FnOnce() -> T + Send) -> Option<T> {
    std::thread::scope(|scope| {
        let (tx, rx) = crossbeam_channel::bounded(1);
        scope.spawn(move || {
            let _ = tx.send(f());
        });
        rx.recv_timeout(timeout).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_log::test;

    #[test]
    fn reuses_released_connections_instead_of_constructing_new_ones() {
        let created = Arc::new(AtomicUsize::new(0));
        let created_clone = created.clone();
        let pool: Pool<usize> = Pool::new(2, move || {
            created_clone.fetch_add(1, Ordering::SeqCst)
        });

        let a = pool.checkout();
        drop(a);
        let _b = pool.checkout();

        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn discard_prevents_reuse() {
        let created = Arc::new(AtomicUsize::new(0));
        let created_clone = created.clone();
        let pool: Pool<usize> = Pool::new(2, move || {
            created_clone.fetch_add(1, Ordering::SeqCst)
        });

        let a = pool.checkout();
        a.discard();
        let _b = pool.checkout();

        assert_eq!(created.load(Ordering::SeqCst), 2);
    }
}
