//! Collaborators the sync orchestrator drives: the hosting gateway listing
//! API, the update dispatcher and the per-repository metadata refresher.
//!
//! Each is a trait so the orchestrator never depends on how the remote side
//! is reached.

pub mod dispatcher;
pub mod lister;
pub mod metadata;

use crate::config::HostConfig;
use crate::error::Result;

pub use dispatcher::HttpDispatcher;
pub use lister::HttpLister;
pub use metadata::CommandRefresher;

/// Lists the repositories hosted behind an external gateway.
#[async_trait::async_trait]
pub trait RemoteLister: Send + Sync {
    /// Repository names in the order the gateway reports them.
    async fn list_repositories(&self, host: &str) -> Result<Vec<String>>;
}

/// Queues fetch/clone work for a repository.  Enqueueing the same name
/// twice is harmless.
#[async_trait::async_trait]
pub trait UpdateDispatcher: Send + Sync {
    async fn enqueue_update(&self, repo_name: &str) -> Result<()>;
}

/// Best-effort refresh of a repository's external metadata.  No retries.
#[async_trait::async_trait]
pub trait MetadataRefresher: Send + Sync {
    async fn refresh(&self, host: &HostConfig, repo_name: &str) -> Result<()>;
}
