//! Periodic removal of expired sessions.

use super::store::SessionStore;
use crate::event::{GatewayEvent, GatewayEventsSender};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Schedules [`SessionStore::sweep`] on a fixed interval until shut down.
pub struct SessionSweeper {
    store: SessionStore,
    interval: Duration,
    events_tx: Option<GatewayEventsSender>,
}

impl SessionSweeper {
    /// Create a sweeper for `store` running every `interval`.
    #[must_use]
    pub fn new(store: SessionStore, interval: Duration) -> Self {
        Self {
            store,
            interval,
            events_tx: None,
        }
    }

    /// Report sweeps that removed sessions on `events_tx`.
    #[must_use]
    pub fn with_events(mut self, events_tx: GatewayEventsSender) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    /// Run one sweep now.
    pub fn run_once(&self) -> usize {
        let removed = self.store.sweep();
        if removed > 0 {
            info!("Session sweep removed {removed} expired sessions");
            if let Some(ref tx) = self.events_tx {
                let _ = tx.send(GatewayEvent::SessionsSwept { removed });
            }
        } else {
            debug!("Session sweep found nothing to remove");
        }
        removed
    }

    /// Spawn the sweep loop. It exits once `shutdown_rx` turns true or its
    /// sender is dropped.
    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Session sweeper stopping");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.run_once();
                    }
                }
            }
        })
    }
}
