//! Repository directory abstraction.
//!
//! The directory is the authoritative catalog of repositories and their
//! `enabled` flag.  The sync orchestrator and the protocol bridge only use
//! the idempotent operations of [`RepoDirectory`], so any number of them may
//! share one catalog concurrently.

pub mod http;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DirectoryConfig;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A repository as known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: i32,
    pub name: String,
    pub enabled: bool,
}

/// Insert request for a repository that may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRepo {
    pub name: String,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait RepoDirectory: Send + Sync {
    /// Insert every entry whose name is unknown; existing records are left
    /// untouched.  Returns the names that were newly inserted.
    async fn insert_if_absent(&self, entries: &[NewRepo]) -> Result<Vec<String>>;

    /// Look up a repository by name.  Unknown names fail with
    /// [`Error::NotFound`](crate::error::Error::NotFound).
    async fn resolve(&self, name: &str) -> Result<RepositoryRecord>;

    /// Names of all enabled repositories, sorted.
    async fn list_enabled(&self) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the configured [`RepoDirectory`] implementation.
pub fn build_directory(
    config: &DirectoryConfig,
    http_client: reqwest::Client,
    timeout: Duration,
) -> Arc<dyn RepoDirectory> {
    match config {
        DirectoryConfig::Memory { seed } => Arc::new(memory::MemoryDirectory::with_seed(
            seed.iter().map(|s| NewRepo {
                name: s.name.clone(),
                enabled: s.enabled,
            }),
        )),
        DirectoryConfig::Http { url } => {
            Arc::new(http::HttpDirectory::new(http_client, url, timeout))
        }
    }
}
