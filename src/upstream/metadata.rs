//! Metadata refresh through a host-configured shell command.
//!
//! The command runs once per repository with `REPO` and `HOST` in its
//! environment.  Its output is not interpreted; only the exit status matters.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::process::Command;
use tracing::{debug, instrument};

use super::MetadataRefresher;
use crate::config::HostConfig;
use crate::error::{Error, Result};

pub struct CommandRefresher {
    timeout: Duration,
}

impl CommandRefresher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl MetadataRefresher for CommandRefresher {
    #[instrument(skip(self, host), fields(host = %host.host))]
    async fn refresh(&self, host: &HostConfig, repo_name: &str) -> Result<()> {
        let Some(command) = host.metadata_command.as_deref() else {
            return Ok(());
        };

        let run = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("REPO", repo_name)
            .env("HOST", &host.host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                Error::UpstreamExecution(anyhow!(
                    "metadata command timed out after {:?}",
                    self.timeout
                ))
            })?
            .context("failed to spawn metadata command")
            .map_err(Error::UpstreamExecution)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::UpstreamExecution(anyhow!(
                "metadata command failed (status {}): {}",
                output.status,
                stderr.trim(),
            )));
        }

        debug!(repo = %repo_name, "metadata refreshed");
        Ok(())
    }
}
