//! Git execution backend and packet-line framing.
//!
//! All repository access shells out to the `git` binary through
//! [`tokio::process::Command`]; see [`commands::LocalGit`].

pub mod commands;
pub mod pktline;

use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use crate::error::Result;

pub use commands::LocalGit;

/// A boxed stream of raw bytes, used for both directions of upload-pack.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Runs git operations against stored repositories.
#[async_trait::async_trait]
pub trait GitBackend: Send + Sync {
    /// Storage location of the named repository.  Does not check existence.
    fn location(&self, repo_name: &str) -> Result<PathBuf>;

    /// Whether a clone of the repository is present.
    async fn is_cloned(&self, repo_name: &str) -> Result<bool>;

    /// Output of `git upload-pack --stateless-rpc --advertise-refs .`.
    ///
    /// The returned bytes are already pkt-line framed by git; callers must
    /// pass them through unchanged.
    async fn advertise_refs(&self, location: &Path) -> Result<Bytes>;

    /// Run a stateless `git upload-pack`, feeding `request` to stdin and
    /// returning stdout as a stream.  Dropping the returned stream stops the
    /// subprocess.
    async fn upload_pack(&self, location: &Path, request: ByteStream) -> Result<ByteStream>;
}
