//! Start/stop-controlled repeating fetch.
//!
//! One loop per controller: the fetch is awaited to completion, its outcome is
//! published, then the loop sleeps for the interval before fetching again.
//! Failures are logged and posted to the error sink; they never end the loop.
//! Only `stop_polling` (or dropping the controller) does.

use crate::domain::errors::TravisError;
use crate::domain::external_apis::host::ErrorApi;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};

pub const POLL_INTERVAL: Duration = Duration::from_millis(1500);

pub type PollUpdate<T> = Option<Result<T, TravisError>>;

pub struct PollingController<T> {
    interval: Duration,
    running: Arc<AtomicBool>,
    // Bumped on every start so a loop left over from an earlier start/stop
    // cycle notices it has been superseded.
    generation: Arc<AtomicU64>,
    wake: Arc<Notify>,
    updates: Arc<watch::Sender<PollUpdate<T>>>,
    error_api: Arc<dyn ErrorApi>,
}

impl<T: Clone + Send + Sync + 'static> PollingController<T> {
    pub fn new(error_api: Arc<dyn ErrorApi>) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            interval: POLL_INTERVAL,
            running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            wake: Arc::new(Notify::new()),
            updates: Arc::new(updates),
            error_api,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Outcome of the most recent fetch of the current loop.
    pub fn subscribe(&self) -> watch::Receiver<PollUpdate<T>> {
        self.updates.subscribe()
    }

    /// Spawns the loop. Returns `false` without doing anything when a loop is
    /// already running.
    pub fn start_polling<F, Fut>(&self, fetch: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TravisError>> + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Polling already running");
            return false;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        // The previous loop's last value doesn't describe this one.
        self.updates.send_if_modified(|current| current.take().is_some());

        let running = Arc::clone(&self.running);
        let current_generation = Arc::clone(&self.generation);
        let wake = Arc::clone(&self.wake);
        let updates = Arc::clone(&self.updates);
        let error_api = Arc::clone(&self.error_api);
        let interval = self.interval;

        tokio::spawn(async move {
            let is_current = || {
                running.load(Ordering::SeqCst)
                    && current_generation.load(Ordering::SeqCst) == generation
            };
            tracing::debug!("Polling loop {} started", generation);

            while is_current() {
                let outcome = fetch().await;
                if let Err(e) = &outcome {
                    tracing::warn!("Polling fetch failed: {}", e);
                    error_api.post(e);
                }
                // A fetch that was in flight when the loop was stopped is
                // discarded. Checked under the channel lock so a newer loop's
                // reset can't be overwritten.
                let published = updates.send_if_modified(|current| {
                    if !is_current() {
                        return false;
                    }
                    *current = Some(outcome);
                    true
                });
                if !published {
                    break;
                }

                tokio::select! {
                    () = tokio::time::sleep(interval) => {},
                    () = wake.notified() => {},
                }
            }
            tracing::debug!("Polling loop {} stopped", generation);
        });
        true
    }

    pub fn stop_polling(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.wake.notify_waiters();
        }
    }
}

impl<T> Drop for PollingController<T> {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.wake.notify_waiters();
        }
    }
}
