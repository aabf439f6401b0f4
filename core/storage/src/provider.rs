//! Blob store trait definition.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::remote::{CommitInfo, Credentials, RemoteLocator};
use nexusvault_common::{Error, Result, VaultOwner};

/// Blob writes for one transaction, keyed by repository path.
pub type BlobMap = BTreeMap<String, Vec<u8>>;

/// A blob read together with the commit it was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedBlob {
    /// Head commit of the branch, or `None` if the branch has no commits.
    pub head: Option<String>,
    /// Blob content at `head`, or `None` if the path is absent there.
    pub content: Option<Vec<u8>>,
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Identifier of the commit now at the head of the branch.
    pub commit: String,
    /// Removal paths that were already absent from the remote head.
    pub missing_removals: Vec<String>,
}

/// Versioned remote blob store.
///
/// Every mutating call is one transaction: it produces exactly one commit
/// and one ref update, so either every blob in the call becomes visible or
/// none does. Callers must put index and data blobs in the same call.
/// Implementations never retry.
///
/// Non-forced pushes name the `base` commit the caller's state was read
/// from (`None` for a branch without commits). A remote whose head is not
/// `base` refuses the push with `PushRejected`, so a writer working from a
/// stale index can never replace newer remote state.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Get the store name (e.g., "git", "memory").
    fn name(&self) -> &str;

    /// Retrieve one blob at `path` from the head of `owner`'s vault.
    ///
    /// # Errors
    /// - `NotFound` if the branch or the path does not exist
    /// - `Authentication` / `Network` on transport failures
    async fn fetch_raw(&self, owner: &VaultOwner, path: &str) -> Result<Vec<u8>>;

    /// Retrieve one blob and the head commit it was read from, in one
    /// consistent read.
    ///
    /// A missing branch or path is reported through [`VersionedBlob`], not
    /// as an error.
    async fn fetch_versioned(&self, owner: &VaultOwner, path: &str) -> Result<VersionedBlob>;

    /// Write every blob in `blobs` in one commit on top of `base` and push it.
    async fn push_atomic(
        &self,
        remote: &RemoteLocator,
        credentials: &Credentials,
        base: Option<&str>,
        blobs: BlobMap,
        commit: &CommitInfo,
    ) -> Result<PushOutcome> {
        self.remove_and_push_atomic(remote, credentials, base, &[], blobs, commit)
            .await
    }

    /// Remove `remove` and write `blobs` in one commit on top of `base`,
    /// then push it as a non-forced update.
    ///
    /// # Preconditions
    /// - Every path passes [`validate_blob_path`]
    /// - No path appears both in `remove` and in `blobs`
    ///
    /// # Postconditions
    /// - On success the remote head is the new commit, whose parent is `base`
    /// - On failure the remote head is unchanged
    ///
    /// # Errors
    /// - `PushRejected` if the remote head is not `base`, or the remote
    ///   refused the update
    /// - `Authentication` / `Network` on transport failures
    async fn remove_and_push_atomic(
        &self,
        remote: &RemoteLocator,
        credentials: &Credentials,
        base: Option<&str>,
        remove: &[String],
        blobs: BlobMap,
        commit: &CommitInfo,
    ) -> Result<PushOutcome>;

    /// Replace the remote history with one parentless commit holding
    /// exactly `blobs`, force-updating the branch.
    ///
    /// All prior history and blobs become unreachable.
    async fn force_push_root(
        &self,
        remote: &RemoteLocator,
        credentials: &Credentials,
        blobs: BlobMap,
        commit: &CommitInfo,
    ) -> Result<PushOutcome>;

    /// Replace the remote history with a single empty commit.
    async fn force_push_empty(
        &self,
        remote: &RemoteLocator,
        credentials: &Credentials,
        commit: &CommitInfo,
    ) -> Result<PushOutcome> {
        self.force_push_root(remote, credentials, BlobMap::new(), commit)
            .await
    }
}

/// Check that `path` is a relative, normalised repository path.
///
/// # Errors
/// - Returns `Validation` for empty paths, absolute paths, backslashes or
///   empty, `.` or `..` segments
pub fn validate_blob_path(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(Error::Validation(format!("Invalid blob path '{}'", path)));
    }
    if path
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(Error::Validation(format!("Invalid blob path '{}'", path)));
    }
    Ok(())
}

/// Refuse a push whose `base` is not the remote's current `head`.
pub(crate) fn check_base(
    remote: &RemoteLocator,
    head: Option<&str>,
    base: Option<&str>,
) -> Result<()> {
    if head == base {
        return Ok(());
    }
    Err(Error::PushRejected(format!(
        "{} moved from {} to {}; reconnect to pick up the newer vault state",
        remote,
        base.unwrap_or("an empty branch"),
        head.unwrap_or("an empty branch")
    )))
}

/// Validate a whole transaction before any work is done.
pub(crate) fn validate_transaction(remove: &[String], blobs: &BlobMap) -> Result<()> {
    for path in remove.iter().chain(blobs.keys()) {
        validate_blob_path(path)?;
    }
    if let Some(path) = remove.iter().find(|p| blobs.contains_key(*p)) {
        return Err(Error::Validation(format!(
            "Blob path '{}' is both removed and written",
            path
        )));
    }
    Ok(())
}
