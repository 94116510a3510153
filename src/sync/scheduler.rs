//! Periodic sync runs driven by the live configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use super::{Orchestrator, SyncSnapshot};
use crate::config::Config;

/// Run sync passes over every host each `sync.interval_secs`.
///
/// The interval is re-read after every wake-up, so a reload can enable,
/// disable or retune the schedule.  Returns when the config channel closes.
pub async fn run_scheduler(
    orchestrator: Arc<Orchestrator>,
    mut config: watch::Receiver<Arc<Config>>,
) {
    loop {
        let interval = config.borrow().sync.interval_secs.map(Duration::from_secs);

        let Some(interval) = interval else {
            debug!("sync scheduler idle; no interval configured");
            if config.changed().await.is_err() {
                return;
            }
            continue;
        };

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            changed = config.changed() => {
                if changed.is_err() {
                    return;
                }
                debug!("configuration reloaded; rescheduling sync");
                continue;
            }
        }

        let snapshot = SyncSnapshot::capture(&config.borrow_and_update());
        info!(hosts = snapshot.hosts.len(), "scheduled sync run starting");
        orchestrator.run(&snapshot).await;
    }
}
