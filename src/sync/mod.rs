//! Repository synchronization: discover repositories on external hosts,
//! register them in the directory, and enqueue clones or fetches.

pub mod orchestrator;
pub mod scheduler;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prometheus_client::encoding::EncodeLabelValue;
use serde::Serialize;

use crate::config::{Config, HostConfig};

pub use orchestrator::Orchestrator;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Configuration captured once at the start of a sync run.  Later config
/// reloads do not affect a run already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub hosts: Vec<HostConfig>,
    pub disable_auto_git_updates: bool,
}

impl SyncSnapshot {
    pub fn capture(config: &Config) -> Self {
        Self {
            hosts: config.hosts.clone(),
            disable_auto_git_updates: config.sync.disable_auto_git_updates,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one listed repository during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Newly inserted into the directory by this pass.
    Registered,
    /// Already present in the directory.
    AlreadyKnown,
    /// Not cloned yet; a clone was enqueued.
    CloneTriggered,
    /// Already cloned; a fetch was enqueued.
    FetchTriggered,
    /// Disabled, or cloned while automatic updates are off.
    Skipped,
    Failed(String),
}

impl SyncOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            SyncOutcome::Registered => OutcomeKind::Registered,
            SyncOutcome::AlreadyKnown => OutcomeKind::AlreadyKnown,
            SyncOutcome::CloneTriggered => OutcomeKind::CloneTriggered,
            SyncOutcome::FetchTriggered => OutcomeKind::FetchTriggered,
            SyncOutcome::Skipped => OutcomeKind::Skipped,
            SyncOutcome::Failed(_) => OutcomeKind::Failed,
        }
    }
}

/// [`SyncOutcome`] without its payload; used for counting and metrics.
#[derive(
    Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, EncodeLabelValue,
)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Registered,
    AlreadyKnown,
    CloneTriggered,
    FetchTriggered,
    Skipped,
    Failed,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::Registered => "registered",
            OutcomeKind::AlreadyKnown => "already_known",
            OutcomeKind::CloneTriggered => "clone_triggered",
            OutcomeKind::FetchTriggered => "fetch_triggered",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Reconciliation result for one listed repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    pub name: String,
    pub outcome: SyncOutcome,
}

/// Result of one host's pass.
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Set when the batch registration call failed.
    pub registration_failed: bool,
    /// Registration and reconciliation outcomes, counted together.
    pub counts: BTreeMap<OutcomeKind, usize>,
    /// Reconciliation outcome per entry, in listing order.
    pub entries: Vec<EntryOutcome>,
}

impl PassSummary {
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn outcome_of(&self, name: &str) -> Option<&SyncOutcome> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.outcome)
    }
}

/// Result of a sync run across every configured host.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub passes: Vec<PassSummary>,
    /// Hosts whose listing failed, with the error message.
    pub failed_hosts: Vec<(String, String)>,
}
