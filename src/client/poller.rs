use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::cache::{CallChange, LocalCallView};
use super::source::CallSource;
use crate::call::{CallId, CallStatus, GroupId};
use crate::config::POLL_INTERVAL;

/// Device-side reaction to reconciled changes (stop capture, refresh the
/// segment list, show the recording indicator, ...)
#[async_trait::async_trait]
pub trait LocalCallSink: Send + Sync {
    async fn apply(&self, change: &CallChange);
}

/// Why a poller stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Terminated(CallStatus),
    Vanished,
    Cancelled,
}

/// Final state handed back when a poller stops
#[derive(Debug, Clone)]
pub struct PollSummary {
    pub reason: StopReason,
    pub ticks: u64,
    pub failed_polls: u64,
    pub view: LocalCallView,
}

/// Periodic read-only reconciliation of one call on one device
///
/// Runs on its own task so a slow or failing poll never touches the media
/// connection. Failed polls keep the last known state and retry on the next
/// tick.
pub struct ReconciliationPoller {
    group_id: GroupId,
    view: LocalCallView,
    source: Arc<dyn CallSource>,
    sink: Arc<dyn LocalCallSink>,
    interval: Duration,
}

/// Handle to a running poller; dropping it cancels polling
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<PollSummary>,
}

impl ReconciliationPoller {
    pub fn new(
        group_id: GroupId,
        call_id: CallId,
        source: Arc<dyn CallSource>,
        sink: Arc<dyn LocalCallSink>,
    ) -> Self {
        Self {
            group_id,
            view: LocalCallView::new(call_id),
            source,
            sink,
            interval: POLL_INTERVAL,
        }
    }

    /// Start from a view the device already has
    pub fn with_view(mut self, view: LocalCallView) -> Self {
        self.view = view;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> PollerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        PollerHandle { shutdown, task }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PollSummary {
        let call_id = *self.view.call_id();
        info!("Reconciliation poller started for call {}", call_id);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ticks = 0u64;
        let mut failed_polls = 0u64;
        let mut consecutive_failures = 0u32;

        let reason = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break StopReason::Cancelled,
            }
            ticks += 1;

            let fetched = tokio::time::timeout(
                self.interval,
                self.source.fetch(&self.group_id, &call_id),
            )
            .await;

            let changes = match fetched {
                Ok(Ok(Some(record))) => {
                    consecutive_failures = 0;
                    self.view.reconcile(&record)
                }
                Ok(Ok(None)) => {
                    consecutive_failures = 0;
                    self.view.mark_vanished()
                }
                Ok(Err(e)) => {
                    consecutive_failures += 1;
                    failed_polls += 1;
                    warn!(
                        "Poll for call {} failed ({} in a row), keeping last state: {:#}",
                        call_id, consecutive_failures, e
                    );
                    continue;
                }
                Err(_) => {
                    consecutive_failures += 1;
                    failed_polls += 1;
                    warn!(
                        "Poll for call {} timed out ({} in a row), keeping last state",
                        call_id, consecutive_failures
                    );
                    continue;
                }
            };

            for change in &changes {
                debug!("Call {} change: {:?}", call_id, change);
                self.sink.apply(change).await;
            }

            if let Some(status) = self.view.status().filter(|s| s.is_terminal()) {
                break StopReason::Terminated(status);
            }
            if self.view.is_closed() {
                break StopReason::Vanished;
            }
        };

        info!("Reconciliation poller for call {} stopped: {:?}", call_id, reason);

        PollSummary {
            reason,
            ticks,
            failed_polls,
            view: self.view,
        }
    }
}

impl PollerHandle {
    /// Stop polling and return the final view
    pub async fn cancel(self) -> Option<PollSummary> {
        let _ = self.shutdown.send(true);
        self.task.await.ok()
    }

    /// Wait for the poller to stop on its own (call terminated or vanished)
    pub async fn join(self) -> Option<PollSummary> {
        let PollerHandle { shutdown, task } = self;
        let summary = task.await.ok();
        drop(shutdown);
        summary
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
