//! Per-host sync pass: list, register, reconcile.
//!
//! A pass tolerates failure at every step after listing.  A failed lookup,
//! clone check or dispatch marks that entry `Failed` and moves on; a failed
//! batch registration is logged and reconciliation still runs.  Only a
//! listing failure ends a host's pass, and never the whole run.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::{EntryOutcome, OutcomeKind, PassSummary, RunSummary, SyncOutcome, SyncSnapshot};
use crate::config::HostConfig;
use crate::directory::{NewRepo, RepoDirectory};
use crate::error::Result;
use crate::git::GitBackend;
use crate::metrics::MetricsRegistry;
use crate::upstream::{MetadataRefresher, RemoteLister, UpdateDispatcher};

/// Whether a repository should be (re)fetched.
///
/// A missing clone is always enqueued; an existing one only when automatic
/// updates are enabled.
pub fn should_enqueue(cloned: bool, auto_updates_disabled: bool) -> bool {
    !cloned || !auto_updates_disabled
}

/// Drives sync passes against shared collaborators.  Holds no state of its
/// own between passes, so concurrent runs are safe.
#[derive(Clone)]
pub struct Orchestrator {
    lister: Arc<dyn RemoteLister>,
    directory: Arc<dyn RepoDirectory>,
    dispatcher: Arc<dyn UpdateDispatcher>,
    git: Arc<dyn GitBackend>,
    metadata: Arc<dyn MetadataRefresher>,
    metrics: MetricsRegistry,
}

impl Orchestrator {
    pub fn new(
        lister: Arc<dyn RemoteLister>,
        directory: Arc<dyn RepoDirectory>,
        dispatcher: Arc<dyn UpdateDispatcher>,
        git: Arc<dyn GitBackend>,
        metadata: Arc<dyn MetadataRefresher>,
        metrics: MetricsRegistry,
    ) -> Self {
        Self {
            lister,
            directory,
            dispatcher,
            git,
            metadata,
            metrics,
        }
    }

    /// Run one pass per configured host, in configuration order.
    pub async fn run(&self, snapshot: &SyncSnapshot) -> RunSummary {
        let mut summary = RunSummary::default();
        for host in &snapshot.hosts {
            match self
                .run_pass(host, snapshot.disable_auto_git_updates)
                .await
            {
                Ok(pass) => summary.passes.push(pass),
                Err(e) => {
                    warn!(host = %host.host, error = %e, "listing failed; skipping host");
                    self.metrics.record_pass(false, None);
                    summary.failed_hosts.push((host.host.clone(), e.to_string()));
                }
            }
        }
        info!(
            hosts = snapshot.hosts.len(),
            failed_hosts = summary.failed_hosts.len(),
            "sync run complete"
        );
        summary
    }

    /// Sync a single host.  Fails only if the host cannot be listed.
    #[instrument(skip(self, host), fields(host = %host.host))]
    pub async fn run_pass(
        &self,
        host: &HostConfig,
        auto_updates_disabled: bool,
    ) -> Result<PassSummary> {
        let started_at = Utc::now();
        let clock = Instant::now();

        // 1. List.
        let names = self.lister.list_repositories(&host.host).await?;
        debug!(count = names.len(), "listed remote repositories");

        let mut counts: BTreeMap<OutcomeKind, usize> = BTreeMap::new();

        // 2. Register.  Must finish before any entry is reconciled.
        let batch: Vec<NewRepo> = names
            .iter()
            .map(|name| NewRepo {
                name: name.clone(),
                enabled: true,
            })
            .collect();
        let registration_failed = match self.directory.insert_if_absent(&batch).await {
            Ok(inserted) => {
                let inserted: HashSet<String> = inserted.into_iter().collect();
                for name in &names {
                    let kind = if inserted.contains(name) {
                        OutcomeKind::Registered
                    } else {
                        OutcomeKind::AlreadyKnown
                    };
                    *counts.entry(kind).or_default() += 1;
                    self.metrics.record_outcome(kind);
                }
                false
            }
            Err(e) => {
                warn!(num_repos = batch.len(), error = %e, "batch registration failed");
                true
            }
        };

        // 3. Reconcile each entry independently, in listing order.
        let total = names.len();
        let mut entries = Vec::with_capacity(total);
        for (i, name) in names.iter().enumerate() {
            let outcome = self
                .reconcile(host, name, auto_updates_disabled, i, total)
                .await;
            *counts.entry(outcome.kind()).or_default() += 1;
            self.metrics.record_outcome(outcome.kind());
            entries.push(EntryOutcome {
                name: name.clone(),
                outcome,
            });
        }

        let duration = clock.elapsed();
        self.metrics.record_pass(true, Some(duration));

        let summary = PassSummary {
            host: host.host.clone(),
            started_at,
            duration,
            registration_failed,
            counts,
            entries,
        };
        info!(
            repos = total,
            registered = summary.count(OutcomeKind::Registered),
            clone_triggered = summary.count(OutcomeKind::CloneTriggered),
            fetch_triggered = summary.count(OutcomeKind::FetchTriggered),
            skipped = summary.count(OutcomeKind::Skipped),
            failed = summary.count(OutcomeKind::Failed),
            elapsed_ms = duration.as_millis() as u64,
            "sync pass complete"
        );
        Ok(summary)
    }

    async fn reconcile(
        &self,
        host: &HostConfig,
        name: &str,
        auto_updates_disabled: bool,
        i: usize,
        total: usize,
    ) -> SyncOutcome {
        let record = match self.directory.resolve(name).await {
            Ok(record) => record,
            Err(e) => {
                warn!(repo = %name, error = %e, "could not resolve repository");
                return SyncOutcome::Failed(e.to_string());
            }
        };

        if !record.enabled {
            debug!(repo = %name, "repository disabled; skipping");
            return SyncOutcome::Skipped;
        }

        let cloned = match self.git.is_cloned(&record.name).await {
            Ok(cloned) => cloned,
            Err(e) => {
                warn!(repo = %name, error = %e, "could not determine clone state");
                return SyncOutcome::Failed(e.to_string());
            }
        };

        let outcome = if should_enqueue(cloned, auto_updates_disabled) {
            info!(repo = %name, cloned, i, total, "enqueueing repository update");
            if let Err(e) = self.dispatcher.enqueue_update(&record.name).await {
                warn!(repo = %name, error = %e, "could not enqueue repository update");
                return SyncOutcome::Failed(e.to_string());
            }
            if cloned {
                SyncOutcome::FetchTriggered
            } else {
                SyncOutcome::CloneTriggered
            }
        } else {
            debug!(repo = %name, "already cloned and auto updates disabled");
            SyncOutcome::Skipped
        };

        if host.metadata_command.is_some() {
            if let Err(e) = self.metadata.refresh(host, &record.name).await {
                warn!(repo = %name, error = %e, "metadata refresh failed");
            }
        }

        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
