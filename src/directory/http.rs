//! Repository catalog reached over HTTP.
//!
//! Speaks the same JSON shapes that this service exposes under `/repos`, so
//! one instance can use another's catalog.

use std::time::Duration;

use anyhow::{anyhow, Context};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{NewRepo, RepoDirectory, RepositoryRecord};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct InsertBatchResponse {
    inserted: Vec<String>,
}

pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDirectory {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// `{base}/repos/by-name/{name}` with each name segment percent-encoded.
    fn by_name_url(&self, name: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid directory url {:?}", self.base_url))
            .map_err(unavailable)?;
        url.path_segments_mut()
            .map_err(|()| unavailable(anyhow!("directory url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["repos", "by-name"])
            .extend(name.split('/'));
        Ok(url)
    }
}

fn unavailable(err: impl Into<anyhow::Error>) -> Error {
    Error::DependencyUnavailable(err.into())
}

#[async_trait::async_trait]
impl RepoDirectory for HttpDirectory {
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn insert_if_absent(&self, entries: &[NewRepo]) -> Result<Vec<String>> {
        let url = format!("{}/repos/insert-batch", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(entries)
            .send()
            .await
            .context("repository directory unreachable")
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            return Err(unavailable(anyhow!(
                "POST {url} returned {}",
                resp.status()
            )));
        }

        let body: InsertBatchResponse = resp
            .json()
            .await
            .context("malformed insert-batch response")
            .map_err(unavailable)?;
        debug!(inserted = body.inserted.len(), "batch insert applied");
        Ok(body.inserted)
    }

    #[instrument(skip(self))]
    async fn resolve(&self, name: &str) -> Result<RepositoryRecord> {
        let url = self.by_name_url(name)?;
        let resp = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .context("repository directory unreachable")
            .map_err(unavailable)?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(Error::NotFound(name.to_string())),
            status if status.is_success() => resp
                .json()
                .await
                .context("malformed repository record")
                .map_err(unavailable),
            status => Err(unavailable(anyhow!("GET {url} returned {status}"))),
        }
    }

    #[instrument(skip(self))]
    async fn list_enabled(&self) -> Result<Vec<String>> {
        let url = format!("{}/repos/list-enabled", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .context("repository directory unreachable")
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            return Err(unavailable(anyhow!("GET {url} returned {}", resp.status())));
        }

        resp.json()
            .await
            .context("malformed list-enabled response")
            .map_err(unavailable)
    }
}
