//! In-memory blob store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

use crate::provider::{
    check_base, validate_blob_path, validate_transaction, BlobMap, BlobStore, PushOutcome,
    VersionedBlob,
};
use crate::remote::{CommitInfo, Credentials, RemoteLocator, RemoteResolver};
use nexusvault_common::{Error, Result, VaultOwner};

/// Failure injected into the next push against a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFailure {
    Network,
    Rejected,
    Authentication,
}

impl PushFailure {
    fn into_error(self) -> Error {
        match self {
            PushFailure::Network => Error::Network("Injected network failure".to_string()),
            PushFailure::Rejected => Error::PushRejected("Injected ref update rejection".to_string()),
            PushFailure::Authentication => {
                Error::Authentication("Injected credential rejection".to_string())
            }
        }
    }
}

/// One commit: a full snapshot of the tree.
#[derive(Debug, Clone)]
struct Snapshot {
    id: String,
    message: String,
    blobs: BlobMap,
}

#[derive(Debug, Default)]
struct Remote {
    history: Vec<Snapshot>,
    authorized_key: Option<Vec<u8>>,
    pending_failure: Option<PushFailure>,
}

impl Remote {
    fn head(&self) -> Option<&Snapshot> {
        self.history.last()
    }
}

/// In-memory blob store.
///
/// Remotes are keyed by locator string and created on first use. Each
/// push checks, builds and applies its snapshot under one write lock, so a
/// failed push leaves the remote exactly as it was.
pub struct MemoryStore {
    resolver: RemoteResolver,
    remotes: Arc<RwLock<HashMap<String, Remote>>>,
}

impl MemoryStore {
    /// Create an empty store that resolves owners with the default template.
    pub fn new() -> Self {
        Self::with_resolver(RemoteResolver::default())
    }

    /// Create an empty store that resolves owners with `resolver`.
    pub fn with_resolver(resolver: RemoteResolver) -> Self {
        Self {
            resolver,
            remotes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn resolver(&self) -> &RemoteResolver {
        &self.resolver
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Remote>>> {
        self.remotes
            .read()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Remote>>> {
        self.remotes
            .write()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    /// Make the next push to `remote` fail with `failure`.
    pub fn fail_next_push(&self, remote: &RemoteLocator, failure: PushFailure) -> Result<()> {
        self.write()?
            .entry(remote.to_string())
            .or_default()
            .pending_failure = Some(failure);
        Ok(())
    }

    /// Require pushes to `remote` to present exactly this SSH private key.
    pub fn authorize(&self, remote: &RemoteLocator, private_key: &[u8]) -> Result<()> {
        self.write()?
            .entry(remote.to_string())
            .or_default()
            .authorized_key = Some(private_key.to_vec());
        Ok(())
    }

    /// Blobs at the head of `remote`, if it has any commits.
    pub fn head_snapshot(&self, remote: &RemoteLocator) -> Result<Option<BlobMap>> {
        Ok(self
            .read()?
            .get(remote.as_str())
            .and_then(Remote::head)
            .map(|s| s.blobs.clone()))
    }

    /// Message of the head commit of `remote`.
    pub fn head_message(&self, remote: &RemoteLocator) -> Result<Option<String>> {
        Ok(self
            .read()?
            .get(remote.as_str())
            .and_then(Remote::head)
            .map(|s| s.message.clone()))
    }

    /// Identifier of the head commit of `remote`.
    pub fn head_commit(&self, remote: &RemoteLocator) -> Result<Option<String>> {
        Ok(self
            .read()?
            .get(remote.as_str())
            .and_then(Remote::head)
            .map(|s| s.id.clone()))
    }

    /// Number of commits reachable from the head of `remote`.
    pub fn commit_count(&self, remote: &RemoteLocator) -> Result<usize> {
        Ok(self
            .read()?
            .get(remote.as_str())
            .map(|r| r.history.len())
            .unwrap_or(0))
    }

    fn check_push(remote: &mut Remote, credentials: &Credentials) -> Result<()> {
        if let Some(failure) = remote.pending_failure.take() {
            return Err(failure.into_error());
        }
        if let Some(expected) = &remote.authorized_key {
            if credentials.private_key() != Some(expected.as_slice()) {
                return Err(Error::Authentication(
                    "Remote rejected the presented key".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_raw(&self, owner: &VaultOwner, path: &str) -> Result<Vec<u8>> {
        let locator = self.resolver.locate(owner);
        self.fetch_versioned(owner, path)
            .await?
            .content
            .ok_or_else(|| Error::NotFound(format!("{} in {}", path, locator)))
    }

    async fn fetch_versioned(&self, owner: &VaultOwner, path: &str) -> Result<VersionedBlob> {
        validate_blob_path(path)?;
        let locator = self.resolver.locate(owner);
        let remotes = self.read()?;
        let head = remotes.get(locator.as_str()).and_then(Remote::head);
        Ok(VersionedBlob {
            head: head.map(|s| s.id.clone()),
            content: head.and_then(|s| s.blobs.get(path).cloned()),
        })
    }

    async fn remove_and_push_atomic(
        &self,
        remote: &RemoteLocator,
        credentials: &Credentials,
        base: Option<&str>,
        remove: &[String],
        blobs: BlobMap,
        commit: &CommitInfo,
    ) -> Result<PushOutcome> {
        validate_transaction(remove, &blobs)?;

        let mut remotes = self.write()?;
        let target = remotes.entry(remote.to_string()).or_default();
        Self::check_push(target, credentials)?;
        check_base(remote, target.head().map(|s| s.id.as_str()), base)?;

        let mut tree = target.head().map(|s| s.blobs.clone()).unwrap_or_default();
        let mut missing_removals = Vec::new();
        for path in remove {
            if tree.remove(path).is_none() {
                missing_removals.push(path.clone());
            }
        }
        tree.extend(blobs);

        let snapshot = Snapshot {
            id: Uuid::new_v4().simple().to_string(),
            message: commit.message.clone(),
            blobs: tree,
        };
        let id = snapshot.id.clone();
        target.history.push(snapshot);

        debug!(remote = %remote, commit = %id, "memory push applied");
        Ok(PushOutcome {
            commit: id,
            missing_removals,
        })
    }

    async fn force_push_root(
        &self,
        remote: &RemoteLocator,
        credentials: &Credentials,
        blobs: BlobMap,
        commit: &CommitInfo,
    ) -> Result<PushOutcome> {
        validate_transaction(&[], &blobs)?;

        let mut remotes = self.write()?;
        let target = remotes.entry(remote.to_string()).or_default();
        Self::check_push(target, credentials)?;

        let snapshot = Snapshot {
            id: Uuid::new_v4().simple().to_string(),
            message: commit.message.clone(),
            blobs,
        };
        let id = snapshot.id.clone();
        target.history = vec![snapshot];

        debug!(remote = %remote, commit = %id, "memory history replaced");
        Ok(PushOutcome {
            commit: id,
            missing_removals: Vec::new(),
        })
    }
}
