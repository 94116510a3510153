//! [`GitBackend`] implementation that shells out to the system `git` binary
//! using [`tokio::process::Command`].
//!
//! Repositories are bare clones laid out as `{repos_root}/{name}.git`.

use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context as TaskContext, Poll};

use anyhow::{anyhow, Context};
use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, instrument, warn};

use super::{ByteStream, GitBackend};
use crate::config::GitConfig;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Backend struct
// ---------------------------------------------------------------------------

/// Local bare-repository store driven by the `git` CLI.
#[derive(Debug, Clone)]
pub struct LocalGit {
    repos_root: PathBuf,
    git_binary: String,
}

impl LocalGit {
    pub fn new(config: &GitConfig) -> Self {
        Self {
            repos_root: PathBuf::from(&config.repos_root),
            git_binary: config.git_binary.clone(),
        }
    }

    pub fn repos_root(&self) -> &Path {
        &self.repos_root
    }

    fn command(&self, location: &Path) -> Command {
        let mut cmd = Command::new(&self.git_binary);
        cmd.current_dir(location);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }
}

/// Reject names that could escape the repository root.
fn validate_repo_name(name: &str) -> Result<()> {
    let path = Path::new(name);
    let well_formed = !name.is_empty()
        && !name.contains('\\')
        && !name.contains('\0')
        && !name.split('/').any(str::is_empty)
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if well_formed {
        Ok(())
    } else {
        Err(Error::NotFound(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl GitBackend for LocalGit {
    fn location(&self, repo_name: &str) -> Result<PathBuf> {
        validate_repo_name(repo_name)?;
        Ok(self.repos_root.join(format!("{repo_name}.git")))
    }

    #[instrument(skip(self), fields(repo = %repo_name))]
    async fn is_cloned(&self, repo_name: &str) -> Result<bool> {
        let head = self.location(repo_name)?.join("HEAD");
        match tokio::fs::metadata(&head).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::UpstreamExecution(
                anyhow!(e).context(format!("failed to stat {}", head.display())),
            )),
        }
    }

    #[instrument(skip(self), fields(repo = %location.display()))]
    async fn advertise_refs(&self, location: &Path) -> Result<Bytes> {
        let output = self
            .command(location)
            .arg("upload-pack")
            .arg("--stateless-rpc")
            .arg("--advertise-refs")
            .arg(".")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("failed to spawn git upload-pack --advertise-refs")
            .map_err(Error::UpstreamExecution)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::UpstreamExecution(anyhow!(
                "git upload-pack --advertise-refs failed (status {}): {}",
                output.status,
                stderr.trim(),
            )));
        }

        debug!(bytes = output.stdout.len(), "refs advertised");
        Ok(Bytes::from(output.stdout))
    }

    #[instrument(skip(self, request), fields(repo = %location.display()))]
    async fn upload_pack(&self, location: &Path, request: ByteStream) -> Result<ByteStream> {
        let mut child = self
            .command(location)
            .arg("upload-pack")
            .arg("--stateless-rpc")
            .arg(".")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn git upload-pack")
            .map_err(Error::UpstreamExecution)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::UpstreamExecution(anyhow!("git upload-pack stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::UpstreamExecution(anyhow!("git upload-pack stdout not captured")))?;

        if let Some(mut stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut buf = String::new();
                if stderr.read_to_string(&mut buf).await.is_ok() && !buf.trim().is_empty() {
                    warn!(stderr = %buf.trim(), "git upload-pack wrote to stderr");
                }
            });
        }

        // Closing stdin when the request body ends signals EOF to git.
        let feeder = tokio::spawn(async move {
            let mut reader = StreamReader::new(request);
            tokio::io::copy(&mut reader, &mut stdin).await
        });

        // The child moves into the waiter; aborting the waiter drops the
        // child, and `kill_on_drop` then kills it.
        let exit = tokio::spawn(async move { child.wait().await });

        Ok(Box::pin(UploadPackOutput {
            stdout: ReaderStream::new(stdout),
            exit,
            feeder,
            stdout_done: false,
            finished: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Streamed upload-pack output
// ---------------------------------------------------------------------------

/// Stdout of a running `git upload-pack`.  Dropping the stream (for example
/// when the HTTP peer disconnects) kills the subprocess.
///
/// After stdout closes the stream waits for the exit status, so a failing
/// git ends the body with an error instead of a clean EOF.
struct UploadPackOutput {
    stdout: ReaderStream<ChildStdout>,
    exit: JoinHandle<io::Result<ExitStatus>>,
    feeder: JoinHandle<io::Result<u64>>,
    stdout_done: bool,
    finished: bool,
}

impl UploadPackOutput {
    /// Error from forwarding the request body, if any.  A broken pipe only
    /// means git stopped reading, which its exit status already reports.
    fn feeder_error(&mut self, cx: &mut TaskContext<'_>) -> Option<io::Error> {
        if !self.feeder.is_finished() {
            self.feeder.abort();
            return None;
        }
        match Pin::new(&mut self.feeder).poll(cx) {
            Poll::Ready(Ok(Ok(copied))) => {
                debug!(copied, "request body forwarded to git");
                None
            }
            Poll::Ready(Ok(Err(e))) if e.kind() == io::ErrorKind::BrokenPipe => None,
            Poll::Ready(Ok(Err(e))) => Some(e),
            Poll::Ready(Err(e)) => Some(io::Error::other(e)),
            Poll::Pending => None,
        }
    }
}

impl Stream for UploadPackOutput {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if !this.stdout_done {
            match Pin::new(&mut this.stdout).poll_next(cx) {
                Poll::Ready(None) => this.stdout_done = true,
                other => return other,
            }
        }

        let exited = match Pin::new(&mut this.exit).poll(cx) {
            Poll::Ready(res) => res,
            Poll::Pending => return Poll::Pending,
        };
        this.finished = true;

        match exited {
            Ok(Ok(status)) if status.success() => match this.feeder_error(cx) {
                Some(e) => Poll::Ready(Some(Err(e))),
                None => Poll::Ready(None),
            },
            Ok(Ok(status)) => {
                warn!(%status, "git upload-pack exited with non-zero status");
                let err = this.feeder_error(cx).unwrap_or_else(|| {
                    io::Error::other(format!("git upload-pack exited with {status}"))
                });
                Poll::Ready(Some(Err(err)))
            }
            Ok(Err(e)) => Poll::Ready(Some(Err(e))),
            Err(e) => Poll::Ready(Some(Err(io::Error::other(e)))),
        }
    }
}

impl Drop for UploadPackOutput {
    fn drop(&mut self) {
        self.feeder.abort();
        self.exit.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
