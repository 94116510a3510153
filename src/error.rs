//! Error taxonomy shared by the protocol bridge, the sync orchestrator and
//! the collaborator implementations.
//!
//! Collaborators build rich context with `anyhow` internally and convert to
//! [`Error`] at their trait boundary so callers can branch on the kind.

use thiserror::Error;

/// Every failure the core can report.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown repository (or other entity).
    #[error("repository not found: {0}")]
    NotFound(String),

    /// Repository exists but is administratively disabled.
    #[error("repository is not enabled: {0}")]
    Disabled(String),

    /// A Git service other than `git-upload-pack` was requested.
    #[error("unsupported service: {0:?} (only git-upload-pack is served)")]
    UnsupportedProtocolOperation(String),

    /// The `git` subprocess failed to start or exited unsuccessfully.
    #[error("git execution failed: {0:#}")]
    UpstreamExecution(#[source] anyhow::Error),

    /// I/O failure while streaming to or from the protocol peer.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The listing API, the directory or the update dispatcher failed.
    #[error("dependency unavailable: {0:#}")]
    DependencyUnavailable(#[source] anyhow::Error),

    /// A pkt-line could not be encoded or decoded.
    #[error("pkt-line framing error: {0}")]
    Framing(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Short, stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Disabled(_) => "disabled",
            Error::UnsupportedProtocolOperation(_) => "unsupported_operation",
            Error::UpstreamExecution(_) => "upstream_execution",
            Error::Transport(_) => "transport",
            Error::DependencyUnavailable(_) => "dependency_unavailable",
            Error::Framing(_) => "framing",
        }
    }
}
