//! Bounded connection pool
//!
//! A small cache of live database sessions, capacity `pool_size`. Borrowing
//! pops from the cache without blocking; a miss establishes a brand-new
//! connection through the classified-retry protocol. Connections are not
//! validated on return, so a borrower may receive a dead session and should
//! expect execute-time failure rather than borrow-time failure — that trade
//! keeps the borrow path free of extra round-trips.
//!
//! Establishing a connection is slow (network I/O plus backoff sleeps) and
//! runs entirely outside the cache lock; only the push/pop against the cache
//! is a critical section.

use crate::config::SharedSettings;
use crate::db::connector::Connector;
use crate::db::retry::{RetryState, backoff_delay};
use crate::error::{ConnectError, ConnectResult};
use crate::redact::redact;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Diagnostics snapshot of the cache
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolDetails {
    /// `pool_size` from the live settings
    pub configured_size: usize,
    /// Connections currently sitting idle in the cache
    pub available: usize,
    /// Capacity of the current cache (changes only on reset)
    pub max_size: usize,
}

struct Cache<T> {
    slots: VecDeque<T>,
    capacity: usize,
}

/// Bounded, concurrency-safe cache of database sessions
pub struct ConnectionPool<C: Connector> {
    connector: C,
    settings: SharedSettings,
    cache: Mutex<Cache<C::Conn>>,
    retry: Mutex<RetryState>,
}

impl<C: Connector> ConnectionPool<C> {
    /// Build a pool sized from the current settings. No connections are
    /// opened until the first borrow.
    pub fn new(connector: C, settings: SharedSettings) -> Self {
        let capacity = settings.read(|s| s.pool_size);
        Self {
            connector,
            settings,
            cache: Mutex::new(Cache {
                slots: VecDeque::with_capacity(capacity),
                capacity,
            }),
            retry: Mutex::new(RetryState::default()),
        }
    }

    /// Borrow a connection: cached if available, freshly established
    /// otherwise. The returned guard gives the connection back to the cache
    /// on every exit path; call [`PooledConn::discard`] instead after an
    /// execution failure.
    pub async fn acquire(self: &Arc<Self>) -> ConnectResult<PooledConn<C>> {
        let cached = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.slots.pop_front()
        };

        let conn = match cached {
            Some(conn) => conn,
            None => self.connect_with_retry().await?,
        };

        Ok(PooledConn {
            conn: Some(conn),
            pool: Arc::clone(self),
            discard: false,
        })
    }

    /// Establish a new physical connection under the retry policy.
    ///
    /// Each attempt is a tagged success/failure recorded into [`RetryState`];
    /// the delay before attempt `n+1` is `backoff * 2^(n-1)` seconds, and the
    /// final failure is surfaced immediately with no trailing sleep.
    async fn connect_with_retry(&self) -> ConnectResult<C::Conn> {
        let (attempts, backoff, options, debug_logging) = self.settings.read(|s| {
            (
                s.connection_attempts.max(1),
                s.connection_retry_backoff_s,
                s.connect_options(),
                s.db_debug_logging,
            )
        });

        {
            let mut retry = self.retry.lock().unwrap_or_else(|e| e.into_inner());
            retry.begin(attempts, backoff);
        }

        let mut last_err: Option<ConnectError> = None;
        for attempt in 1..=attempts {
            match self.connector.connect(&options).await {
                Ok(conn) => {
                    let mut retry = self.retry.lock().unwrap_or_else(|e| e.into_inner());
                    let had_failures = retry.attempts > 0;
                    retry.record_success();
                    drop(retry);
                    if had_failures {
                        tracing::info!(
                            "Database connection recovered on attempt {attempt}/{attempts}"
                        );
                    }
                    return Ok(conn);
                }
                Err(err) => {
                    let delay = backoff_delay(backoff, attempt, attempts);
                    let message = redact(&err.to_string());
                    {
                        let mut retry = self.retry.lock().unwrap_or_else(|e| e.into_inner());
                        retry.record_failure(&err, message.clone(), delay);
                    }

                    if attempt == attempts {
                        tracing::error!(
                            "Database connection attempt {attempt}/{attempts} failed: {message}"
                        );
                    } else {
                        tracing::warn!(
                            "Database connection attempt {attempt}/{attempts} failed: {message}; \
                             retrying in {:.2}s",
                            delay.as_secs_f64()
                        );
                    }
                    if debug_logging {
                        tracing::debug!(
                            kind = err.kind_name(),
                            attempt,
                            attempts,
                            "connection attempt failed"
                        );
                    }

                    last_err = Some(err);
                    if attempt < attempts && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ConnectError::Unclassified("no connection attempts made".into())))
    }

    /// Drain and close every cached connection, then rebuild the cache sized
    /// to the *current* `pool_size`. In-flight borrowers are unaffected;
    /// their connections simply fail to re-enter a full cache later.
    pub fn reset(&self) {
        let capacity = self.settings.read(|s| s.pool_size);
        let drained = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            let old = std::mem::take(&mut cache.slots);
            cache.capacity = capacity;
            cache.slots = VecDeque::with_capacity(capacity);
            old
        };
        // Closing happens on drop, outside the critical section.
        let count = drained.len();
        drop(drained);
        tracing::info!("Connection pool reset: closed {count} cached connections, capacity {capacity}");
    }

    /// Cache diagnostics; safe to call concurrently with borrows and resets.
    pub fn pool_details(&self) -> PoolDetails {
        let configured_size = self.settings.read(|s| s.pool_size);
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        PoolDetails {
            configured_size,
            available: cache.slots.len(),
            max_size: cache.capacity,
        }
    }

    /// Read-only snapshot of the most recent connection attempt sequence.
    pub fn retry_state(&self) -> RetryState {
        self.retry.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn release(&self, conn: C::Conn) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if cache.slots.len() < cache.capacity {
            cache.slots.push_back(conn);
        } else {
            drop(cache);
            tracing::debug!("connection cache full; closing returned connection");
            drop(conn);
        }
    }
}

/// Scoped borrow of one pooled connection
///
/// Dereferences to the underlying session. On drop the connection re-enters
/// the cache (or is closed if the cache is full); after an execution failure
/// call [`PooledConn::discard`] so a possibly-poisoned session is never
/// recycled.
pub struct PooledConn<C: Connector> {
    conn: Option<C::Conn>,
    pool: Arc<ConnectionPool<C>>,
    discard: bool,
}

impl<C: Connector> PooledConn<C> {
    /// Close this connection instead of returning it to the cache.
    pub fn discard(mut self) {
        self.discard = true;
    }
}

impl<C: Connector> std::fmt::Debug for PooledConn<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn")
            .field("connected", &self.conn.is_some())
            .field("discard", &self.discard)
            .finish()
    }
}

impl<C: Connector> std::ops::Deref for PooledConn<C> {
    type Target = C::Conn;

    fn deref(&self) -> &C::Conn {
        self.conn
            .as_ref()
            .expect("connection is only taken during drop")
    }
}

impl<C: Connector> Drop for PooledConn<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.discard {
                tracing::debug!("discarding borrowed connection");
            } else {
                self.pool.release(conn);
            }
        }
    }
}
