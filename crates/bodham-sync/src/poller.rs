use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bodham_types::Identified;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::{CollectionStore, LoadState};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct Shared {
    /// Closed by `stop`. Results are applied only while holding this lock
    /// with the gate open.
    open: Mutex<bool>,
    token: CancellationToken,
    wake: Notify,
    applied: AtomicU64,
}

/// Periodic background fetch tied to the lifetime of a [`PollHandle`].
pub struct Poller;

impl Poller {
    /// Fetch now, then every `interval`, handing each successful result to
    /// `apply`. Failures are logged and skipped.
    pub fn start<T, E, F, Fut, A>(interval: Duration, fetch: F, mut apply: A) -> PollHandle
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        A: FnMut(T) + Send + 'static,
    {
        Self::spawn(interval, fetch, move |result| match result {
            Ok(value) => {
                apply(value);
                true
            }
            Err(e) => {
                warn!("poll fetch failed: {}", e);
                false
            }
        })
    }

    /// Keep `store` in step with `fetch`. A failed fetch leaves the contents
    /// alone and marks the store `Failed`.
    pub fn into_store<T, E, F, Fut>(store: CollectionStore<T>, interval: Duration, fetch: F) -> PollHandle
    where
        T: Identified + Clone + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
    {
        Self::spawn(interval, fetch, move |result| match result {
            Ok(items) => {
                store.replace_all(items);
                store.set_load_state(LoadState::Ready);
                true
            }
            Err(e) => {
                warn!("poll fetch failed, keeping previous contents: {}", e);
                store.set_load_state(LoadState::Failed(e.to_string()));
                false
            }
        })
    }

    fn spawn<T, E, F, Fut, H>(interval: Duration, mut fetch: F, mut handle: H) -> PollHandle
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        H: FnMut(Result<T, E>) -> bool + Send + 'static,
    {
        let shared = Arc::new(Shared {
            open: Mutex::new(true),
            token: CancellationToken::new(),
            wake: Notify::new(),
            applied: AtomicU64::new(0),
        });

        let task = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = shared.token.cancelled() => break,
                        _ = shared.wake.notified() => debug!("poll poked"),
                        _ = ticker.tick() => {}
                    }

                    let result = tokio::select! {
                        biased;
                        _ = shared.token.cancelled() => break,
                        result = fetch() => result,
                    };

                    {
                        let open = shared.open.lock();
                        if !*open {
                            break;
                        }
                        if handle(result) {
                            shared.applied.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                debug!("poller stopped");
            })
        };

        PollHandle {
            shared,
            task: Some(task),
        }
    }
}

/// Owner of a running poll loop. Dropping it stops the loop.
pub struct PollHandle {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop polling. Idempotent. Once this returns no further result is
    /// applied, even from a fetch that is already in flight.
    pub fn stop(&self) {
        *self.shared.open.lock() = false;
        self.shared.token.cancel();
    }

    /// Fetch again right away without waiting for the next tick.
    pub fn poke(&self) {
        self.shared.wake.notify_one();
    }

    /// Number of results applied so far.
    pub fn applied(&self) -> u64 {
        self.shared.applied.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.shared.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
