//! Repository sync orchestrator and Git smart-HTTP upload-pack bridge.
//!
//! The binary in `main.rs` wires these modules together; everything it
//! serves is reachable from [`http::handler::create_router`].

pub mod bridge;
pub mod config;
pub mod deps;
pub mod directory;
pub mod error;
pub mod git;
pub mod health;
pub mod http;
pub mod metrics;
pub mod sync;
pub mod upstream;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use crate::bridge::UploadPackBridge;
use crate::config::Config;
use crate::deps::PackageIndex;
use crate::directory::RepoDirectory;
use crate::metrics::MetricsRegistry;
use crate::sync::Orchestrator;

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers and background tasks.
///
/// `config` tracks reloads; the other fields are built once at startup from
/// the initial configuration.
pub struct AppState {
    pub config: watch::Receiver<Arc<Config>>,
    pub repos_root: PathBuf,
    pub directory: Arc<dyn RepoDirectory>,
    pub bridge: UploadPackBridge,
    pub orchestrator: Arc<Orchestrator>,
    pub packages: Arc<dyn PackageIndex>,
    pub metrics: MetricsRegistry,
}
