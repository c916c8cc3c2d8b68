//! Background loop that re-syncs every active account on a fixed interval.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::sync::SyncService;

pub struct PeriodicSync {
    sync: SyncService,
    period: Duration,
}

impl PeriodicSync {
    /// Spawn the loop. The first pass runs one full period after startup.
    pub fn spawn(sync: SyncService, period: Duration) -> tokio::task::JoinHandle<()> {
        let service = Self { sync, period };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(period = ?self.period, "Starting periodic sync");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // `interval` fires immediately; skip that tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    async fn run_once(&self) {
        match self.sync.sync_all().await {
            Ok(outcomes) if outcomes.is_empty() => {
                debug!("Periodic sync: no active accounts");
            }
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|o| !o.success).count();
                info!(
                    accounts = outcomes.len(),
                    failed,
                    "Periodic sync pass complete"
                );
            }
            Err(e) => error!(error = %e, "Periodic sync pass failed"),
        }
    }
}
