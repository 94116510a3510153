//! Git smart-HTTP upload-pack bridge.
//!
//! Serves the two halves of a stateless-RPC fetch for one repository:
//! the ref advertisement (`info/refs`) and the proxied `git-upload-pack`
//! exchange.  Transport-agnostic; the HTTP layer maps results onto
//! responses.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::directory::{RepoDirectory, RepositoryRecord};
use crate::error::{Error, Result};
use crate::git::pktline::{encode_line, flush_line};
use crate::git::{ByteStream, GitBackend};

/// The only Git service this bridge serves.
pub const UPLOAD_PACK_SERVICE: &str = "git-upload-pack";

pub const ADVERTISEMENT_CONTENT_TYPE: &str = "application/x-git-upload-pack-advertisement";
pub const RESULT_CONTENT_TYPE: &str = "application/x-git-upload-pack-result";

/// A complete ref advertisement response.
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub content_type: &'static str,
    pub body: Bytes,
}

/// A streamed upload-pack response.
pub struct UploadPackResponse {
    pub content_type: &'static str,
    pub body: ByteStream,
}

/// Build the advertisement body: the framed service header, a flush, then
/// `refs` exactly as git produced them.  `refs` already carries its own
/// pkt-line framing and must not be framed again.
pub fn advertisement_body(refs: &[u8]) -> Result<Bytes> {
    let header = encode_line(format!("# service={UPLOAD_PACK_SERVICE}\n").as_bytes())?;
    let mut body = Vec::with_capacity(header.len() + 4 + refs.len());
    body.extend_from_slice(&header);
    body.extend_from_slice(flush_line());
    body.extend_from_slice(refs);
    Ok(Bytes::from(body))
}

/// Gate applied before a repository is served: disabled repositories are
/// rejected.
pub fn ensure_enabled(record: &RepositoryRecord) -> Result<()> {
    if record.enabled {
        Ok(())
    } else {
        Err(Error::Disabled(record.name.clone()))
    }
}

#[derive(Clone)]
pub struct UploadPackBridge {
    directory: Arc<dyn RepoDirectory>,
    git: Arc<dyn GitBackend>,
}

impl UploadPackBridge {
    pub fn new(directory: Arc<dyn RepoDirectory>, git: Arc<dyn GitBackend>) -> Self {
        Self { directory, git }
    }

    /// Advertise refs for `repo_name`.
    ///
    /// The service name is checked before anything else so an unsupported
    /// request touches neither the directory nor git.
    #[instrument(skip(self))]
    pub async fn advertise_refs(&self, repo_name: &str, service: &str) -> Result<Advertisement> {
        if service != UPLOAD_PACK_SERVICE {
            return Err(Error::UnsupportedProtocolOperation(service.to_string()));
        }

        let record = self.directory.resolve(repo_name).await?;
        ensure_enabled(&record)?;

        let location = self.git.location(&record.name)?;
        let refs = self.git.advertise_refs(&location).await?;
        debug!(refs_bytes = refs.len(), "advertising refs");

        Ok(Advertisement {
            content_type: ADVERTISEMENT_CONTENT_TYPE,
            body: advertisement_body(&refs)?,
        })
    }

    /// Proxy an upload-pack exchange for `repo_name`.
    ///
    /// Only existence is checked here.  Callers apply [`ensure_enabled`]
    /// before proxying.
    #[instrument(skip(self, request))]
    pub async fn proxy_upload_pack(
        &self,
        repo_name: &str,
        request: ByteStream,
    ) -> Result<UploadPackResponse> {
        let record = self.directory.resolve(repo_name).await?;
        let location = self.git.location(&record.name)?;
        let body = self.git.upload_pack(&location, request).await?;
        Ok(UploadPackResponse {
            content_type: RESULT_CONTENT_TYPE,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::{stream, TryStreamExt};

    use super::*;
    use crate::directory::memory::MemoryDirectory;
    use crate::directory::NewRepo;
    use crate::git::pktline::{decode_pkt_lines, PktLine};

    /// Git backend that serves canned refs and echoes upload-pack input.
    pub(crate) struct FakeGit {
        pub refs: Bytes,
        pub fail: bool,
        pub advertise_calls: AtomicUsize,
        pub upload_calls: AtomicUsize,
    }

    impl FakeGit {
        pub(crate) fn new(refs: &'static [u8]) -> Self {
            Self {
                refs: Bytes::from_static(refs),
                fail: false,
                advertise_calls: AtomicUsize::new(0),
                upload_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl GitBackend for FakeGit {
        fn location(&self, repo_name: &str) -> Result<PathBuf> {
            Ok(PathBuf::from("/repos").join(format!("{repo_name}.git")))
        }

        async fn is_cloned(&self, _repo_name: &str) -> Result<bool> {
            Ok(true)
        }

        async fn advertise_refs(&self, _location: &Path) -> Result<Bytes> {
            self.advertise_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::UpstreamExecution(anyhow::anyhow!("exit status 128")));
            }
            Ok(self.refs.clone())
        }

        async fn upload_pack(&self, _location: &Path, request: ByteStream) -> Result<ByteStream> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::UpstreamExecution(anyhow::anyhow!("spawn failed")));
            }
            Ok(request)
        }
    }

    pub(crate) fn directory_with(repos: &[(&str, bool)]) -> Arc<MemoryDirectory> {
        Arc::new(MemoryDirectory::with_seed(repos.iter().map(|(name, enabled)| {
            NewRepo {
                name: name.to_string(),
                enabled: *enabled,
            }
        })))
    }

    const REFS: &[u8] = b"003ddeadbeefdeadbeefdeadbeefdeadbeefdeadbeef refs/heads/main\n0000";

    fn bridge(repos: &[(&str, bool)], git: Arc<FakeGit>) -> UploadPackBridge {
        UploadPackBridge::new(directory_with(repos), git)
    }

    #[test]
    fn advertisement_body_starts_with_header_and_flush() {
        let body = advertisement_body(b"anything at all").unwrap();
        let header = encode_line(b"# service=git-upload-pack\n").unwrap();
        assert!(body.starts_with(&header));
        assert_eq!(&body[header.len()..header.len() + 4], b"0000");
        assert_eq!(&body[header.len() + 4..], b"anything at all");
    }

    #[test]
    fn advertisement_body_with_empty_refs() {
        let body = advertisement_body(b"").unwrap();
        assert_eq!(&body[..], b"001e# service=git-upload-pack\n0000");
    }

    #[tokio::test]
    async fn advertise_refs_frames_header_and_passes_refs_through() {
        let git = Arc::new(FakeGit::new(REFS));
        let bridge = bridge(&[("acme/widgets", true)], git.clone());

        let adv = bridge
            .advertise_refs("acme/widgets", "git-upload-pack")
            .await
            .unwrap();
        assert_eq!(adv.content_type, "application/x-git-upload-pack-advertisement");

        let packets = decode_pkt_lines(&adv.body).unwrap();
        assert_eq!(packets[0], PktLine::Data(b"# service=git-upload-pack\n".to_vec()));
        assert_eq!(packets[1], PktLine::Flush);
        assert!(adv.body.ends_with(REFS));
        assert_eq!(git.advertise_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsupported_service_has_no_side_effects() {
        let git = Arc::new(FakeGit::new(REFS));
        let bridge = bridge(&[], git.clone());

        // Unknown repo: the service check must fire before the lookup.
        let err = bridge
            .advertise_refs("acme/missing", "git-receive-pack")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedProtocolOperation(s) if s == "git-receive-pack"));
        assert_eq!(git.advertise_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn advertise_unknown_repo_is_not_found() {
        let bridge = bridge(&[], Arc::new(FakeGit::new(REFS)));
        let err = bridge
            .advertise_refs("acme/missing", "git-upload-pack")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn advertise_disabled_repo_is_rejected_before_git_runs() {
        let git = Arc::new(FakeGit::new(REFS));
        let bridge = bridge(&[("acme/legacy", false)], git.clone());
        let err = bridge
            .advertise_refs("acme/legacy", "git-upload-pack")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Disabled(name) if name == "acme/legacy"));
        assert_eq!(git.advertise_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn advertise_execution_failure_propagates() {
        let mut git = FakeGit::new(REFS);
        git.fail = true;
        let bridge = bridge(&[("acme/widgets", true)], Arc::new(git));
        let err = bridge
            .advertise_refs("acme/widgets", "git-upload-pack")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamExecution(_)));
    }

    #[tokio::test]
    async fn proxy_streams_backend_output() {
        let bridge = bridge(&[("acme/widgets", true)], Arc::new(FakeGit::new(REFS)));
        let request: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"0009done\n")),
            Ok(Bytes::from_static(b"0000")),
        ]));

        let resp = bridge
            .proxy_upload_pack("acme/widgets", request)
            .await
            .unwrap();
        assert_eq!(resp.content_type, "application/x-git-upload-pack-result");
        let chunks: Vec<Bytes> = resp.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"0009done\n0000");
    }

    #[tokio::test]
    async fn proxy_does_not_check_enabled_flag() {
        let bridge = bridge(&[("acme/legacy", false)], Arc::new(FakeGit::new(REFS)));
        let request: ByteStream = Box::pin(stream::empty());
        assert!(bridge.proxy_upload_pack("acme/legacy", request).await.is_ok());
    }

    #[tokio::test]
    async fn proxy_unknown_repo_is_not_found() {
        let bridge = bridge(&[], Arc::new(FakeGit::new(REFS)));
        let request: ByteStream = Box::pin(stream::empty());
        let err = bridge
            .proxy_upload_pack("acme/missing", request)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
