use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::session::{Session, SessionManager};

struct IdleSession {
    session: Session,
    since: Instant,
}

struct PoolInner {
    sessions: Arc<SessionManager>,
    identity: String,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleSession>>,
    closed: AtomicBool,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl PoolInner {
    fn release(&self, session: Session) {
        if !session.is_open() {
            return;
        }
        let mut idle = self.idle.lock().expect("pool lock poisoned");
        if self.closed.load(Ordering::SeqCst) {
            drop(idle);
            return;
        }
        idle.push(IdleSession {
            session,
            since: Instant::now(),
        });
    }

    fn reap_idle(&self) -> usize {
        let expired: Vec<IdleSession> = {
            let mut idle = self.idle.lock().expect("pool lock poisoned");
            let (keep, expired): (Vec<_>, Vec<_>) = idle
                .drain(..)
                .partition(|s| s.since.elapsed() < self.config.idle_timeout);
            *idle = keep;
            expired
        };
        let evicted = expired.len();
        if evicted > 0 {
            debug!(evicted, "evicted idle sessions");
        }
        evicted
    }
}

/// Fixed-size pool of open sessions for one identity.
///
/// At most `max_size` sessions are checked out at once; further callers wait.
/// Returned sessions are kept idle and reused. A background task closes
/// sessions idle for longer than `idle_timeout`.
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Create the pool and start its reaper.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(sessions: Arc<SessionManager>, identity: impl Into<String>, config: PoolConfig) -> Self {
        let inner = Arc::new(PoolInner {
            sessions,
            identity: identity.into(),
            permits: Arc::new(Semaphore::new(config.max_size)),
            config,
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            reaper: Mutex::new(None),
        });

        let weak: Weak<PoolInner> = Arc::downgrade(&inner);
        let interval = inner.config.reap_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                if pool.closed.load(Ordering::SeqCst) {
                    break;
                }
                pool.reap_idle();
            }
        });
        *inner.reaper.lock().expect("pool lock poisoned") = Some(handle);

        info!(
            max_size = inner.config.max_size,
            idle_timeout_secs = inner.config.idle_timeout.as_secs(),
            "session pool started"
        );
        Self { inner }
    }

    /// Check out a session, reusing an idle one when available.
    pub async fn acquire(&self) -> GatewayResult<PooledSession> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::Pool("pool is shut down".into()));
        }
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::Pool("pool is shut down".into()))?;

        loop {
            let candidate = self.inner.idle.lock().expect("pool lock poisoned").pop();
            match candidate {
                Some(idle) if idle.session.is_open() => {
                    return Ok(PooledSession::new(idle.session, &self.inner, permit));
                }
                // Dropping a dead session closes it.
                Some(_) => continue,
                None => break,
            }
        }

        let session = self.inner.sessions.open(&self.inner.identity).await?;
        Ok(PooledSession::new(session, &self.inner, permit))
    }

    /// Close sessions idle longer than the configured timeout.
    pub fn reap_idle(&self) -> usize {
        self.inner.reap_idle()
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().expect("pool lock poisoned").len()
    }

    /// Sessions that can be checked out without waiting on a return.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Close all idle sessions and refuse further checkouts. Sessions still
    /// checked out are closed when returned.
    pub fn shutdown(&self) {
        let drained: Vec<IdleSession> = {
            let mut idle = self.inner.idle.lock().expect("pool lock poisoned");
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            idle.drain(..).collect()
        };
        self.inner.permits.close();
        if let Some(handle) = self.inner.reaper.lock().expect("pool lock poisoned").take() {
            handle.abort();
        }
        info!(closed = drained.len(), "session pool shut down");
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("identity", &self.inner.identity)
            .field("max_size", &self.inner.config.max_size)
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// A checked-out session. Returned to the pool on drop unless discarded.
pub struct PooledSession {
    session: Option<Session>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    fn new(session: Session, pool: &Arc<PoolInner>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            session: Some(session),
            pool: Arc::clone(pool),
            _permit: permit,
        }
    }

    /// Close the session instead of returning it to the pool.
    pub fn discard(mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

impl Deref for PooledSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        // `session` is only taken by `discard` and `drop`, both consuming.
        self.session.as_ref().expect("pooled session present")
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}
