//! Confirmation tracking for both ledgers.
//!
//! `ConfirmationPoller` turns a confirmation query into a fixed-interval
//! stream that stops when the shutdown channel flips; `ConfirmationWatcher`
//! interprets the counts and notices when they go backwards.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Result, SwapError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherEvent {
    AwaitingConfirmations { confirmations: u64, remaining: u64 },
    Confirmed { confirmations: u64 },
    ReorgDetected { previous: u64, current: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmationWatcher {
    required: u64,
    last_seen: Option<u64>,
}

impl ConfirmationWatcher {
    pub fn new(required: u64) -> Self {
        Self {
            required,
            last_seen: None,
        }
    }

    pub fn last_seen(&self) -> Option<u64> {
        self.last_seen
    }

    pub fn evaluate(&mut self, confirmations: u64) -> WatcherEvent {
        let previous = self.last_seen.replace(confirmations);
        if let Some(previous) = previous {
            if confirmations < previous {
                warn!(previous, current = confirmations, "Confirmations went backwards");
                return WatcherEvent::ReorgDetected {
                    previous,
                    current: confirmations,
                };
            }
        }

        if confirmations >= self.required {
            WatcherEvent::Confirmed { confirmations }
        } else {
            WatcherEvent::AwaitingConfirmations {
                confirmations,
                remaining: self.required - confirmations,
            }
        }
    }
}

/// Resolves once `shutdown` reads `true`. A dropped sender never cancels.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationPoller {
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ConfirmationPoller {
    pub fn new(interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self { interval, shutdown }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Queries `fetch` immediately and then once per interval.
    pub fn stream<T, F, Fut>(&self, fetch: F) -> impl Stream<Item = anyhow::Result<T>> + Send
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
    {
        let interval = self.interval;
        stream::unfold(
            (fetch, self.shutdown.clone(), true),
            move |(mut fetch, mut shutdown, first)| async move {
                if !first {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = cancelled(&mut shutdown) => return None,
                    }
                }
                if *shutdown.borrow() {
                    return None;
                }
                let item = fetch().await;
                Some((item, (fetch, shutdown, false)))
            },
        )
    }

    /// Polls until `required` confirmations are reported.
    pub async fn wait_for<F, Fut>(&self, label: &'static str, required: u64, fetch: F) -> Result<u64>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<u64>> + Send,
    {
        let mut watcher = ConfirmationWatcher::new(required);
        let confirmations = self.stream(fetch);
        futures::pin_mut!(confirmations);
        while let Some(count) = confirmations.next().await {
            match watcher.evaluate(count?) {
                WatcherEvent::Confirmed { confirmations } => {
                    debug!(label, confirmations, "Confirmed");
                    return Ok(confirmations);
                }
                WatcherEvent::AwaitingConfirmations { remaining, .. } => {
                    debug!(label, remaining, "Awaiting confirmations");
                }
                WatcherEvent::ReorgDetected { previous, current } => {
                    warn!(label, previous, current, "Reorg while awaiting confirmations");
                }
            }
        }
        Err(SwapError::Cancelled)
    }

    /// Polls until `fetch` yields a value.
    pub async fn wait_for_value<T, F, Fut>(&self, label: &'static str, fetch: F) -> Result<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send,
    {
        let polls = self.stream(fetch);
        futures::pin_mut!(polls);
        while let Some(item) = polls.next().await {
            if let Some(value) = item? {
                return Ok(value);
            }
            debug!(label, "Still waiting");
        }
        Err(SwapError::Cancelled)
    }
}
