use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::{debug, instrument};

use super::RemoteLister;
use crate::error::{Error, Result};

/// Lists repositories through the gitserver `list-gitolite` endpoint.
pub struct HttpLister {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpLister {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl RemoteLister for HttpLister {
    #[instrument(skip(self))]
    async fn list_repositories(&self, host: &str) -> Result<Vec<String>> {
        let url = format!("{}/list-gitolite", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("gitolite", host)])
            .timeout(self.timeout)
            .send()
            .await
            .context("listing API unreachable")
            .map_err(Error::DependencyUnavailable)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unreadable>"));
            return Err(Error::DependencyUnavailable(anyhow!(
                "listing {host} returned {status}: {}",
                body.trim()
            )));
        }

        let names: Vec<String> = resp
            .json()
            .await
            .context("malformed listing response")
            .map_err(Error::DependencyUnavailable)?;
        debug!(count = names.len(), "remote repositories listed");
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};

    use super::*;

    async fn list_gitolite(
        Query(params): Query<HashMap<String, String>>,
    ) -> std::result::Result<Json<Vec<String>>, (StatusCode, &'static str)> {
        match params.get("gitolite").map(String::as_str) {
            Some("git@gitolite.example.com") => {
                Ok(Json(vec!["zeta".to_string(), "alpha".to_string()]))
            }
            _ => Err((StatusCode::BAD_GATEWAY, "ssh: connection refused")),
        }
    }

    async fn serve() -> String {
        let app = Router::new().route("/list-gitolite", get(list_gitolite));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn lists_in_gateway_order() {
        let lister = HttpLister::new(
            reqwest::Client::new(),
            &serve().await,
            Duration::from_secs(5),
        );
        let names = lister
            .list_repositories("git@gitolite.example.com")
            .await
            .unwrap();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn gateway_error_is_dependency_unavailable() {
        let lister = HttpLister::new(
            reqwest::Client::new(),
            &serve().await,
            Duration::from_secs(5),
        );
        let err = lister
            .list_repositories("git@down.example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DependencyUnavailable(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
