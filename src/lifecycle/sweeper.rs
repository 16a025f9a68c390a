use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::service::CallService;

/// Background sweep that expires calls stuck ringing
///
/// Runs independently of any device, so a call whose only connected device
/// went offline still leaves `ringing`.
pub struct ExpirySweeper {
    service: Arc<CallService>,
    interval: Duration,
}

/// Stops the sweeper when dropped or shut down
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ExpirySweeper {
    pub fn new(service: Arc<CallService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!("Expiry sweeper started (every {:?})", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                match self.service.expire_stale().await {
                    Ok(0) => {}
                    Ok(expired) => debug!("Expiry sweep marked {} calls missed", expired),
                    Err(e) => error!("Expiry sweep failed: {}", e),
                }
            }

            info!("Expiry sweeper stopped");
        });

        SweeperHandle { shutdown, task }
    }
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Expiry sweeper task panicked: {}", e);
        }
    }
}
