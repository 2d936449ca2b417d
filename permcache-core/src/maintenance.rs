//! Background maintenance task
//!
//! Periodically purges expired cache entries and forgets idle key slots.
//! The task is owned by a [`MaintenanceHandle`]; shutting the handle down
//! (or dropping it) stops the task, which is the manager's teardown.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::manager::PermissionCacheManager;

/// Owner of a running maintenance task
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the task and wait for it
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "maintenance task ended abnormally");
            }
        }
        info!("permission cache maintenance stopped");
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl PermissionCacheManager {
    /// Start the periodic maintenance task on the current tokio runtime
    pub fn spawn_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        let interval = self.config().maintenance.sweep_interval();
        let manager = Arc::clone(self);
        let (tx, mut rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => {
                        let report = manager.run_maintenance().await;
                        if report.purged_entries > 0 || report.pruned_slots > 0 {
                            debug!(
                                purged = report.purged_entries,
                                pruned = report.pruned_slots,
                                "maintenance swept"
                            );
                        }
                    }
                }
            }
        });

        info!(interval_secs = interval.as_secs(), "permission cache maintenance started");
        MaintenanceHandle {
            shutdown: Some(tx),
            task: Some(task),
        }
    }
}
