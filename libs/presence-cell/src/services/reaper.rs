// libs/presence-cell/src/services/reaper.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::registry::PresenceRegistry;

/// Background task that physically evicts expired presence rows.
pub struct PresenceReaper {
    registry: Arc<PresenceRegistry>,
    interval: Duration,
}

impl PresenceReaper {
    pub fn new(registry: Arc<PresenceRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub async fn run_once(&self) -> usize {
        match self.registry.purge_expired().await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Presence purge failed: {}", e);
                0
            }
        }
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Presence reaper started (every {:?})", self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.run_once().await;
                        debug!("Presence reaper tick removed {} entries", removed);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Presence reaper stopped");
        })
    }
}
