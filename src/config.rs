use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub git: GitConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    pub gitserver: EndpointConfig,
    pub repo_updater: EndpointConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// External hosts whose repositories are mirrored.
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    /// Packages known to the dependency index.
    #[serde(default)]
    pub packages: Vec<IndexedPackage>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:3090`).
    #[serde(default = "default_http_listen")]
    pub http_listen: String,
}

fn default_http_listen() -> String {
    "127.0.0.1:3090".to_string()
}

// ---------------------------------------------------------------------------
// Git storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GitConfig {
    /// Root directory holding bare repositories as `{name}.git`.
    pub repos_root: String,
    /// Path or name of the `git` executable.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
}

fn default_git_binary() -> String {
    "git".to_string()
}

// ---------------------------------------------------------------------------
// Repository directory
// ---------------------------------------------------------------------------

/// Which repository catalog backs the directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DirectoryConfig {
    /// In-process catalog, optionally pre-populated.
    Memory {
        #[serde(default)]
        seed: Vec<SeedRepo>,
    },
    /// Remote catalog service reached over HTTP.
    Http { url: String },
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self::Memory { seed: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedRepo {
    pub name: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn bool_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Collaborator endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the service (e.g. `http://gitserver:3178`).
    pub url: String,
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Only clone repositories that are missing; never re-fetch cloned ones.
    #[serde(default)]
    pub disable_auto_git_updates: bool,
    /// Interval (seconds) between scheduled sync runs.  Unset disables the
    /// scheduler; runs are then only triggered over HTTP.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// Timeout (seconds) applied to every collaborator HTTP request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            disable_auto_git_updates: false,
            interval_secs: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Hosts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    /// Address of the hosting gateway, as understood by the listing API.
    pub host: String,
    /// Shell command run per repository to refresh its external metadata.
    #[serde(default)]
    pub metadata_command: Option<String>,
}

// ---------------------------------------------------------------------------
// Package index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexedPackage {
    pub language: String,
    /// Language-specific package descriptor, e.g. `{id: "com.example:widgets"}`.
    pub descriptor: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("failed to load config file: {}", path.display()))
}

/// Parse and validate YAML configuration text.
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(contents).context("invalid YAML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        config.server.http_listen.parse::<std::net::SocketAddr>().is_ok(),
        "server.http_listen is not a socket address: {}",
        config.server.http_listen
    );
    anyhow::ensure!(
        !config.git.repos_root.trim().is_empty(),
        "git.repos_root must not be empty"
    );
    anyhow::ensure!(
        config.sync.interval_secs != Some(0),
        "sync.interval_secs must be positive"
    );
    anyhow::ensure!(
        config.sync.request_timeout_secs > 0,
        "sync.request_timeout_secs must be positive"
    );
    for host in &config.hosts {
        anyhow::ensure!(!host.host.trim().is_empty(), "hosts[].host must not be empty");
        if let Some(cmd) = &host.metadata_command {
            anyhow::ensure!(
                !cmd.trim().is_empty(),
                "metadata_command for {} must not be blank",
                host.host
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
