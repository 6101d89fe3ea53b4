//! Reload triggering.
//!
//! A relevant change does not reload the ruler directly. The dispatcher
//! drops a [`ReloadRequest`] into a [`ReloadQueue`] and returns to the watch
//! stream; a single [`ReloadWorker`] drains the queue and runs the fixed
//! [`RetryTrigger`] sequence for each request.
//!
//! The queue holds at most one pending request. Anything arriving while one
//! is already pending is coalesced into it, so bursts of changes cost at
//! most one extra sequence and sequences never overlap.

use crate::state::{Phase, StatusBoard};
use crate::store::ObjectKey;
use reload_client::ReloadClientTrait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Reload calls per sequence.
pub const RELOAD_ATTEMPTS: u32 = 10;

/// Delay before each reload call, including the first.
pub const RELOAD_INTERVAL: Duration = Duration::from_secs(10);

/// A queued request to run one reload sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    /// Object whose change caused the request
    pub object: ObjectKey,
    /// Its resource version at the time
    pub resource_version: Option<String>,
}

/// What happened to a request handed to [`ReloadQueue::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Queued behind the running sequence, if any.
    Queued,
    /// A request was already pending; this one folds into it.
    Coalesced,
    /// The worker is gone.
    Closed,
}

/// Sending side of the reload queue.
#[derive(Debug, Clone)]
pub struct ReloadQueue {
    tx: mpsc::Sender<ReloadRequest>,
}

impl ReloadQueue {
    /// Creates the queue and the receiver the worker drains.
    pub fn bounded() -> (Self, mpsc::Receiver<ReloadRequest>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Requests a reload sequence without waiting.
    pub fn request(&self, request: ReloadRequest) -> Enqueued {
        match self.tx.try_send(request) {
            Ok(()) => Enqueued::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Enqueued::Coalesced,
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueued::Closed,
        }
    }
}

/// Outcome of one reload sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceReport {
    /// Reload calls made
    pub attempts: u32,
    /// Calls that got no response
    pub failures: u32,
}

/// Fixed-count, fixed-interval reload sequence.
#[derive(Debug)]
pub struct RetryTrigger<C> {
    client: Arc<C>,
    attempts: u32,
    interval: Duration,
}

impl<C: ReloadClientTrait> RetryTrigger<C> {
    /// Creates a trigger with [`RELOAD_ATTEMPTS`] and [`RELOAD_INTERVAL`].
    pub fn new(client: Arc<C>) -> Self {
        Self::with_schedule(client, RELOAD_ATTEMPTS, RELOAD_INTERVAL)
    }

    /// Creates a trigger with an explicit schedule.
    pub fn with_schedule(client: Arc<C>, attempts: u32, interval: Duration) -> Self {
        Self {
            client,
            attempts,
            interval,
        }
    }

    /// Runs the whole sequence: sleep, signal, repeat.
    ///
    /// Failed calls are logged and never shorten the sequence; every
    /// attempt always runs.
    pub async fn run_sequence(&self) -> SequenceReport {
        let mut failures = 0;

        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.interval).await;

            match self.client.reload().await {
                Ok(status) => {
                    debug!(
                        "Reload attempt {}/{} to {} answered {}",
                        attempt,
                        self.attempts,
                        self.client.endpoint(),
                        status
                    );
                }
                Err(e) => {
                    failures += 1;
                    error!(
                        "Reload attempt {}/{} to {} failed: {}",
                        attempt,
                        self.attempts,
                        self.client.endpoint(),
                        e
                    );
                }
            }
        }

        SequenceReport {
            attempts: self.attempts,
            failures,
        }
    }
}

/// Drains the reload queue, one sequence at a time.
#[derive(Debug)]
pub struct ReloadWorker<C> {
    trigger: RetryTrigger<C>,
    status: StatusBoard,
}

impl<C: ReloadClientTrait> ReloadWorker<C> {
    /// Creates a worker reporting into `status`.
    pub fn new(trigger: RetryTrigger<C>, status: StatusBoard) -> Self {
        Self { trigger, status }
    }

    /// Runs until every [`ReloadQueue`] handle is dropped and the queue is empty.
    ///
    /// Once the watch side has stopped, a running sequence is finished but
    /// requests still pending in the queue are dropped.
    pub async fn run(self, mut requests: mpsc::Receiver<ReloadRequest>) {
        info!("Reload worker started");

        while let Some(request) = requests.recv().await {
            if self.status.phase() == Phase::Stopped {
                warn!(
                    "Controller stopped, dropping pending reload for ConfigMap {} (resourceVersion {})",
                    request.object,
                    request.resource_version.as_deref().unwrap_or("<none>")
                );
                requests.close();
                continue;
            }

            info!(
                "Reloading Thanos ruler for ConfigMap {} (resourceVersion {})",
                request.object,
                request.resource_version.as_deref().unwrap_or("<none>")
            );

            self.status.set_reload_in_flight(true);
            let report = self.trigger.run_sequence().await;
            self.status.set_reload_in_flight(false);

            if report.failures == 0 {
                info!("Thanos ruler has reloaded config files ({} signals sent)", report.attempts);
            } else {
                error!(
                    "Reload sequence for {} finished with {}/{} failed signals",
                    request.object, report.failures, report.attempts
                );
            }
        }

        info!("Reload worker stopped");
    }
}
