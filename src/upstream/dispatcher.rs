use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Serialize;
use tracing::{debug, instrument};

use super::UpdateDispatcher;
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct EnqueueRequest<'a> {
    repo: &'a str,
}

/// Enqueues updates on the repo-updater service.
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl UpdateDispatcher for HttpDispatcher {
    #[instrument(skip(self))]
    async fn enqueue_update(&self, repo_name: &str) -> Result<()> {
        let url = format!("{}/enqueue-repo-update", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&EnqueueRequest { repo: repo_name })
            .send()
            .await
            .context("repo-updater unreachable")
            .map_err(Error::DependencyUnavailable)?;

        if !resp.status().is_success() {
            return Err(Error::DependencyUnavailable(anyhow!(
                "enqueue for {repo_name} returned {}",
                resp.status()
            )));
        }

        debug!("update enqueued");
        Ok(())
    }
}
