//! Git-backed blob store.
//!
//! Each transaction works in a private, throwaway bare repository: fetch
//! the branch head, build the new trees straight from blobs (no worktree,
//! no index), write exactly one commit and push one refspec. The remote
//! only changes when that final ref update is accepted, so an error
//! anywhere before it leaves the remote untouched.
//!
//! Fetches ask for the head commit only (`depth = 1`). libgit2's local
//! transport refuses shallow fetches, so local paths and `file://` remotes
//! fetch the whole branch instead.
//!
//! libgit2 is blocking, so every transaction runs on the blocking pool.

use async_trait::async_trait;
use git2::{
    Commit, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, FileMode, ObjectType, Oid,
    PushOptions, Remote, RemoteCallbacks, Repository, Signature, Tree,
};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::provider::{
    check_base, validate_blob_path, validate_transaction, BlobMap, BlobStore, PushOutcome,
    VersionedBlob,
};
use crate::raw::RawHttpFetcher;
use crate::remote::{CommitInfo, Credentials, RemoteLocator, RemoteResolver};
use nexusvault_common::{Error, Result, VaultOwner};

/// Default branch holding the vault.
pub const DEFAULT_BRANCH: &str = "master";

const REMOTE_NAME: &str = "origin";

/// Blob store backed by a remote git repository.
pub struct GitStore {
    resolver: RemoteResolver,
    branch: String,
    raw: Option<RawHttpFetcher>,
}

impl GitStore {
    /// Create a store for remotes derived by `resolver`, on `branch`.
    pub fn new(resolver: RemoteResolver, branch: impl Into<String>) -> Self {
        Self {
            resolver,
            branch: branch.into(),
            raw: None,
        }
    }

    /// Serve [`BlobStore::fetch_raw`] from a raw-content endpoint instead of
    /// a git fetch.
    pub fn with_raw_fetcher(mut self, raw: RawHttpFetcher) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn resolver(&self) -> &RemoteResolver {
        &self.resolver
    }

    async fn read_versioned(&self, owner: &VaultOwner, path: &str) -> Result<VersionedBlob> {
        let url = self.resolver.locate(owner).to_string();
        let branch = self.branch.clone();
        let path = path.to_string();
        debug!(remote = %url, path = %path, "fetching single blob");
        run_blocking(move || read_blob(&url, &branch, &path)).await
    }

    async fn transact(&self, tx: Transaction) -> Result<PushOutcome> {
        let url = tx.url.clone();
        let outcome = run_blocking(move || tx.run()).await?;
        info!(remote = %url, commit = %outcome.commit, "push accepted");
        Ok(outcome)
    }
}

#[async_trait]
impl BlobStore for GitStore {
    fn name(&self) -> &str {
        "git"
    }

    async fn fetch_raw(&self, owner: &VaultOwner, path: &str) -> Result<Vec<u8>> {
        validate_blob_path(path)?;
        if let Some(raw) = &self.raw {
            return raw.fetch(owner, path).await;
        }

        let url = self.resolver.locate(owner).to_string();
        self.read_versioned(owner, path)
            .await?
            .content
            .ok_or_else(|| Error::NotFound(format!("{} in {}", path, url)))
    }

    async fn fetch_versioned(&self, owner: &VaultOwner, path: &str) -> Result<VersionedBlob> {
        validate_blob_path(path)?;
        self.read_versioned(owner, path).await
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
        self.transact(Transaction {
            url: remote.to_string(),
            credentials: credentials.clone(),
            branch: self.branch.clone(),
            base: base.map(str::to_string),
            remove: remove.to_vec(),
            blobs,
            commit: commit.clone(),
            replace_history: false,
        })
        .await
    }

    async fn force_push_root(
        &self,
        remote: &RemoteLocator,
        credentials: &Credentials,
        blobs: BlobMap,
        commit: &CommitInfo,
    ) -> Result<PushOutcome> {
        validate_transaction(&[], &blobs)?;
        self.transact(Transaction {
            url: remote.to_string(),
            credentials: credentials.clone(),
            branch: self.branch.clone(),
            base: None,
            remove: Vec::new(),
            blobs,
            commit: commit.clone(),
            replace_history: true,
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Storage(format!("Git worker failed: {}", e)))?
}

/// One commit-and-push, owned so it can move onto the blocking pool.
struct Transaction {
    url: String,
    credentials: Credentials,
    branch: String,
    /// Expected remote head; ignored when replacing history.
    base: Option<String>,
    remove: Vec<String>,
    blobs: BlobMap,
    commit: CommitInfo,
    replace_history: bool,
}

impl Transaction {
    fn run(self) -> Result<PushOutcome> {
        let (_scratch, repo) = scratch_repo()?;
        let mut remote = repo.remote(REMOTE_NAME, &self.url).map_err(local_error)?;

        let parent = if self.replace_history {
            None
        } else {
            let head = fetch_branch(&repo, &mut remote, &self.credentials, &self.branch)?;
            let head_id = head.as_ref().map(|c| c.id().to_string());
            check_base(
                &RemoteLocator::new(self.url.as_str()),
                head_id.as_deref(),
                self.base.as_deref(),
            )?;
            head
        };
        let base = match &parent {
            Some(commit) => Some(commit.tree().map_err(local_error)?),
            None => None,
        };

        let mut changes: Vec<Change<'_>> = self
            .remove
            .iter()
            .map(|path| Change::new(path, None))
            .collect();
        changes.extend(
            self.blobs
                .iter()
                .map(|(path, data)| Change::new(path, Some(data.as_slice()))),
        );

        let mut missing = Vec::new();
        let tree_id = match apply_changes(&repo, base, changes, &mut missing)? {
            Some(id) => id,
            None => repo
                .treebuilder(None)
                .and_then(|b| b.write())
                .map_err(local_error)?,
        };
        let tree = repo.find_tree(tree_id).map_err(local_error)?;

        let signature = Signature::now(&self.commit.author_name, &self.commit.author_email)
            .map_err(|e| Error::Validation(format!("Invalid commit author: {}", e.message())))?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let commit_id = repo
            .commit(
                None,
                &signature,
                &signature,
                &self.commit.message,
                &tree,
                &parents,
            )
            .map_err(local_error)?;

        repo.reference(
            &format!("refs/heads/{}", self.branch),
            commit_id,
            true,
            "nexus transaction",
        )
        .map_err(local_error)?;

        push_branch(
            &mut remote,
            &self.credentials,
            &self.branch,
            self.replace_history,
        )?;

        Ok(PushOutcome {
            commit: commit_id.to_string(),
            missing_removals: missing,
        })
    }
}

/// A pending write (`content` set) or removal, addressed by the path
/// segments still to descend.
struct Change<'a> {
    full: &'a str,
    segments: Vec<&'a str>,
    content: Option<&'a [u8]>,
}

impl<'a> Change<'a> {
    fn new(full: &'a str, content: Option<&'a [u8]>) -> Self {
        Self {
            full,
            segments: full.split('/').collect(),
            content,
        }
    }
}

/// Apply `changes` on top of `base`, returning the new tree id, or `None`
/// when the resulting tree would be empty.
fn apply_changes(
    repo: &Repository,
    base: Option<Tree<'_>>,
    changes: Vec<Change<'_>>,
    missing: &mut Vec<String>,
) -> Result<Option<Oid>> {
    let mut builder = repo.treebuilder(base.as_ref()).map_err(local_error)?;
    let mut nested: BTreeMap<&str, Vec<Change<'_>>> = BTreeMap::new();

    for mut change in changes {
        if change.segments.len() > 1 {
            let name = change.segments.remove(0);
            nested.entry(name).or_default().push(change);
            continue;
        }
        let name = change.segments[0];
        let existing = builder
            .get(name)
            .map_err(local_error)?
            .map(|entry| entry.kind());

        match change.content {
            Some(data) => {
                if existing == Some(Some(ObjectType::Tree)) {
                    return Err(Error::Validation(format!(
                        "Blob path '{}' collides with a directory",
                        change.full
                    )));
                }
                let blob = repo.blob(data).map_err(local_error)?;
                builder
                    .insert(name, blob, FileMode::Blob.into())
                    .map_err(local_error)?;
            }
            None => {
                if existing == Some(Some(ObjectType::Blob)) {
                    builder.remove(name).map_err(local_error)?;
                } else {
                    missing.push(change.full.to_string());
                }
            }
        }
    }

    for (name, sub) in nested {
        let existing = builder
            .get(name)
            .map_err(local_error)?
            .map(|entry| (entry.id(), entry.kind()));
        let is_tree = matches!(existing, Some((_, Some(ObjectType::Tree))));

        let subtree = match existing {
            Some((id, Some(ObjectType::Tree))) => Some(repo.find_tree(id).map_err(local_error)?),
            Some(_) if sub.iter().any(|c| c.content.is_some()) => {
                return Err(Error::Validation(format!(
                    "Blob path under '{}' passes through a file",
                    name
                )));
            }
            _ => None,
        };

        match apply_changes(repo, subtree, sub, missing)? {
            Some(id) => {
                builder
                    .insert(name, id, FileMode::Tree.into())
                    .map_err(local_error)?;
            }
            None if is_tree => builder.remove(name).map_err(local_error)?,
            None => {}
        }
    }

    if builder.len() == 0 {
        Ok(None)
    } else {
        builder.write().map(Some).map_err(local_error)
    }
}

fn scratch_repo() -> Result<(TempDir, Repository)> {
    let dir = tempfile::Builder::new().prefix("nexus-git-").tempdir()?;
    let repo = Repository::init_bare(dir.path()).map_err(local_error)?;
    Ok((dir, repo))
}

/// Whether libgit2 would serve `url` over a transport that supports
/// shallow fetches. Local paths and `file://` URLs use the local
/// transport, which does not.
fn supports_shallow(url: &str) -> bool {
    !(url.starts_with("file://") || Path::new(url).exists())
}

/// Fetch the head of `branch` into a tracking ref and return it.
fn fetch_branch<'r>(
    repo: &'r Repository,
    remote: &mut Remote<'r>,
    credentials: &Credentials,
    branch: &str,
) -> Result<Option<Commit<'r>>> {
    let tracking = format!("refs/remotes/{}/{}", REMOTE_NAME, branch);
    let refspec = format!("+refs/heads/{}:{}", branch, tracking);

    let mut callbacks = RemoteCallbacks::new();
    install_credentials(&mut callbacks, credentials);
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    if remote.url().map(supports_shallow).unwrap_or(false) {
        options.depth(1);
    }

    remote
        .fetch(&[refspec.as_str()], Some(&mut options), None)
        .map_err(transport_error)?;

    match repo.find_reference(&tracking) {
        Ok(reference) => reference.peel_to_commit().map(Some).map_err(local_error),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(local_error(e)),
    }
}

fn push_branch(
    remote: &mut Remote<'_>,
    credentials: &Credentials,
    branch: &str,
    force: bool,
) -> Result<()> {
    let mut rejection: Option<String> = None;
    {
        let mut callbacks = RemoteCallbacks::new();
        install_credentials(&mut callbacks, credentials);
        callbacks.push_update_reference(|refname, status| {
            if let Some(reason) = status {
                rejection = Some(format!("{}: {}", refname, reason));
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        let refspec = format!(
            "{}refs/heads/{branch}:refs/heads/{branch}",
            if force { "+" } else { "" },
            branch = branch
        );
        remote
            .push(&[refspec.as_str()], Some(&mut options))
            .map_err(transport_error)?;
    }

    match rejection {
        Some(reason) => Err(Error::PushRejected(reason)),
        None => Ok(()),
    }
}

fn install_credentials<'a>(callbacks: &mut RemoteCallbacks<'a>, credentials: &'a Credentials) {
    let mut key_offered = false;
    callbacks.credentials(move |_url, username_from_url, allowed| match credentials {
        Credentials::SshKey {
            user,
            private_key,
            passphrase,
        } => {
            if allowed.contains(CredentialType::USERNAME) {
                return Cred::username(user);
            }
            // libgit2 calls back again after a rejected key; stop there.
            if key_offered || !allowed.contains(CredentialType::SSH_KEY) {
                return Err(auth_failure("Remote rejected the SSH key"));
            }
            key_offered = true;

            let key = std::str::from_utf8(private_key.as_bytes())
                .map_err(|_| auth_failure("SSH private key is not valid UTF-8"))?;
            let passphrase = match passphrase {
                Some(p) => Some(
                    std::str::from_utf8(p.as_bytes())
                        .map_err(|_| auth_failure("SSH key passphrase is not valid UTF-8"))?,
                ),
                None => None,
            };
            Cred::ssh_key_from_memory(
                username_from_url.unwrap_or(user.as_str()),
                None,
                key,
                passphrase,
            )
        }
        Credentials::None => Err(auth_failure(
            "Remote requires authentication but no credentials were supplied",
        )),
    });
}

fn auth_failure(message: &str) -> git2::Error {
    git2::Error::new(ErrorCode::Auth, ErrorClass::Callback, message)
}

/// Read `path` at the head of `branch`. A tree at `path` counts as absent.
fn read_blob(url: &str, branch: &str, path: &str) -> Result<VersionedBlob> {
    let (_scratch, repo) = scratch_repo()?;
    let mut remote = repo.remote(REMOTE_NAME, url).map_err(local_error)?;
    let head = match fetch_branch(&repo, &mut remote, &Credentials::None, branch)? {
        Some(head) => head,
        None => return Ok(VersionedBlob::default()),
    };

    let tree = head.tree().map_err(local_error)?;
    let content = match tree.get_path(Path::new(path)) {
        Ok(entry) => {
            let object = entry.to_object(&repo).map_err(local_error)?;
            object.as_blob().map(|blob| blob.content().to_vec())
        }
        Err(e) if e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(local_error(e)),
    };
    Ok(VersionedBlob {
        head: Some(head.id().to_string()),
        content,
    })
}

/// Map a failure talking to the remote onto the vault error taxonomy.
fn transport_error(e: git2::Error) -> Error {
    let message = e.message().to_string();
    let lower = message.to_lowercase();
    match e.code() {
        ErrorCode::Auth => Error::Authentication(message),
        ErrorCode::NotFastForward => Error::PushRejected(message),
        _ if e.class() == ErrorClass::Ssh && lower.contains("auth") => {
            Error::Authentication(message)
        }
        _ if e.class() == ErrorClass::Http
            && (lower.contains("401") || lower.contains("403")) =>
        {
            Error::Authentication(message)
        }
        _ if lower.contains("non-fast-forward") || lower.contains("rejected") => {
            Error::PushRejected(message)
        }
        _ => Error::Network(message),
    }
}

fn local_error(e: git2::Error) -> Error {
    Error::Storage(e.message().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct Fixture {
        _dir: TempDir,
        store: GitStore,
        owner: VaultOwner,
        remote: RemoteLocator,
        bare: std::path::PathBuf,
    }

    impl Fixture {
        fn head(&self) -> Option<String> {
            let repo = Repository::open_bare(&self.bare).unwrap();
            let head = repo.find_reference("refs/heads/master").ok()?;
            let id = head.peel_to_commit().unwrap().id().to_string();
            Some(id)
        }
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let bare = dir.path().join("alice.git");
        Repository::init_bare(&bare).unwrap();

        let template = format!("{}/{{owner}}.git", dir.path().display());
        let resolver = RemoteResolver::new(template);
        let owner = VaultOwner::new("alice").unwrap();
        let remote = resolver.locate(&owner);

        Fixture {
            _dir: dir,
            store: GitStore::new(resolver, DEFAULT_BRANCH),
            owner,
            remote,
            bare,
        }
    }

    fn commit(msg: &str) -> CommitInfo {
        CommitInfo::new(msg, "Nexus", "nexus@example.invalid")
    }

    fn blobs(pairs: &[(&str, &str)]) -> BlobMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    fn history_len(bare: &Path) -> usize {
        let repo = Repository::open_bare(bare).unwrap();
        let mut walk = repo.revwalk().unwrap();
        walk.push_ref("refs/heads/master").unwrap();
        walk.count()
    }

    #[tokio::test]
    async fn test_push_then_fetch_single_blob() {
        let fx = fixture();
        fx.store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                fx.head().as_deref(),
                blobs(&[(".config/index", "idx"), ("0a1b2c3d", "payload")]),
                &commit("Nexus: Updated notes.txt"),
            )
            .await
            .unwrap();

        let got = fx.store.fetch_raw(&fx.owner, "0a1b2c3d").await.unwrap();
        assert_eq!(got, b"payload");
        let index = fx.store.fetch_raw(&fx.owner, ".config/index").await.unwrap();
        assert_eq!(index, b"idx");
        assert_eq!(history_len(&fx.bare), 1);
    }

    #[tokio::test]
    async fn test_fetch_from_empty_remote_is_not_found() {
        let fx = fixture();
        let result = fx.store.fetch_raw(&fx.owner, ".config/index").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        let versioned = fx.store.fetch_versioned(&fx.owner, ".config/index").await.unwrap();
        assert_eq!(versioned, VersionedBlob::default());
    }

    #[tokio::test]
    async fn test_fetch_versioned_reports_head() {
        let fx = fixture();
        let outcome = fx
            .store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                None,
                blobs(&[("a", "1")]),
                &commit("c1"),
            )
            .await
            .unwrap();

        let present = fx.store.fetch_versioned(&fx.owner, "a").await.unwrap();
        assert_eq!(present.head.as_deref(), Some(outcome.commit.as_str()));
        assert_eq!(present.content.as_deref(), Some(&b"1"[..]));

        let absent = fx.store.fetch_versioned(&fx.owner, "b").await.unwrap();
        assert_eq!(absent.head, present.head);
        assert!(absent.content.is_none());
    }

    #[tokio::test]
    async fn test_push_from_stale_base_rejected() {
        let fx = fixture();
        let first = fx
            .store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                None,
                blobs(&[("a", "1")]),
                &commit("c1"),
            )
            .await
            .unwrap();
        fx.store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                Some(&first.commit),
                blobs(&[("b", "2")]),
                &commit("c2"),
            )
            .await
            .unwrap();

        let result = fx
            .store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                Some(&first.commit),
                blobs(&[("c", "3")]),
                &commit("c3"),
            )
            .await;
        assert!(matches!(result, Err(Error::PushRejected(_))));
        assert_eq!(history_len(&fx.bare), 2);
        assert!(fx.store.fetch_raw(&fx.owner, "c").await.is_err());
    }

    #[tokio::test]
    async fn test_each_push_is_one_commit_on_top_of_head() {
        let fx = fixture();
        fx.store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                fx.head().as_deref(),
                blobs(&[("a", "1")]),
                &commit("c1"),
            )
            .await
            .unwrap();
        let outcome = fx
            .store
            .remove_and_push_atomic(
                &fx.remote,
                &Credentials::None,
                fx.head().as_deref(),
                &["a".to_string(), "never-there".to_string()],
                blobs(&[("shared/xyz", "ptr")]),
                &commit("c2"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.missing_removals, vec!["never-there".to_string()]);
        assert_eq!(history_len(&fx.bare), 2);
        assert!(matches!(
            fx.store.fetch_raw(&fx.owner, "a").await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(fx.store.fetch_raw(&fx.owner, "shared/xyz").await.unwrap(), b"ptr");
    }

    #[tokio::test]
    async fn test_removing_last_file_prunes_directory() {
        let fx = fixture();
        fx.store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                fx.head().as_deref(),
                blobs(&[("shared/one", "1"), ("keep", "k")]),
                &commit("c1"),
            )
            .await
            .unwrap();
        fx.store
            .remove_and_push_atomic(
                &fx.remote,
                &Credentials::None,
                fx.head().as_deref(),
                &["shared/one".to_string()],
                BlobMap::new(),
                &commit("c2"),
            )
            .await
            .unwrap();

        let repo = Repository::open_bare(&fx.bare).unwrap();
        let head = repo.find_reference("refs/heads/master").unwrap();
        let tree = head.peel_to_commit().unwrap().tree().unwrap();
        assert!(tree.get_name("shared").is_none());
        assert!(tree.get_name("keep").is_some());
    }

    #[tokio::test]
    async fn test_force_push_replaces_history() {
        let fx = fixture();
        for i in 0..3 {
            fx.store
                .push_atomic(
                    &fx.remote,
                    &Credentials::None,
                    fx.head().as_deref(),
                    blobs(&[(format!("f{}", i).as_str(), "x")]),
                    &commit("c"),
                )
                .await
                .unwrap();
        }
        assert_eq!(history_len(&fx.bare), 3);

        fx.store
            .force_push_root(
                &fx.remote,
                &Credentials::None,
                blobs(&[(".config/key", "k")]),
                &commit("Nexus: PURGE VAULT"),
            )
            .await
            .unwrap();

        assert_eq!(history_len(&fx.bare), 1);
        assert!(fx.store.fetch_raw(&fx.owner, "f0").await.is_err());
        assert_eq!(fx.store.fetch_raw(&fx.owner, ".config/key").await.unwrap(), b"k");
    }

    #[tokio::test]
    async fn test_force_push_empty() {
        let fx = fixture();
        fx.store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                fx.head().as_deref(),
                blobs(&[("a", "1")]),
                &commit("c"),
            )
            .await
            .unwrap();
        fx.store
            .force_push_empty(&fx.remote, &Credentials::None, &commit("purge"))
            .await
            .unwrap();

        assert_eq!(history_len(&fx.bare), 1);
        let repo = Repository::open_bare(&fx.bare).unwrap();
        let tree = repo
            .find_reference("refs/heads/master")
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .tree()
            .unwrap();
        assert_eq!(tree.len(), 0);
    }

    #[tokio::test]
    async fn test_blob_through_file_rejected() {
        let fx = fixture();
        fx.store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                fx.head().as_deref(),
                blobs(&[("a", "1")]),
                &commit("c"),
            )
            .await
            .unwrap();
        let result = fx
            .store
            .push_atomic(
                &fx.remote,
                &Credentials::None,
                fx.head().as_deref(),
                blobs(&[("a/b", "2")]),
                &commit("c"),
            )
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(history_len(&fx.bare), 1);
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_network_error() {
        let dir = tempdir().unwrap();
        let resolver = RemoteResolver::new(format!("{}/missing/{{owner}}.git", dir.path().display()));
        let store = GitStore::new(resolver.clone(), DEFAULT_BRANCH);
        let owner = VaultOwner::new("nobody").unwrap();

        let result = store
            .push_atomic(
                &resolver.locate(&owner),
                &Credentials::None,
                None,
                blobs(&[("a", "1")]),
                &commit("c"),
            )
            .await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[test]
    fn test_shallow_only_for_network_remotes() {
        let dir = tempdir().unwrap();
        assert!(!supports_shallow(&dir.path().display().to_string()));
        assert!(!supports_shallow("file:///srv/git/alice.git"));
        assert!(supports_shallow("git@github.com:alice/vault.git"));
        assert!(supports_shallow("https://github.com/alice/vault.git"));
    }

    #[test]
    fn test_transport_error_classification() {
        let auth = git2::Error::new(ErrorCode::Auth, ErrorClass::Ssh, "bad key");
        assert!(matches!(transport_error(auth), Error::Authentication(_)));

        let stale = git2::Error::new(
            ErrorCode::NotFastForward,
            ErrorClass::Reference,
            "cannot push non-fastforwardable reference",
        );
        assert!(matches!(transport_error(stale), Error::PushRejected(_)));

        let down = git2::Error::new(ErrorCode::GenericError, ErrorClass::Net, "connection refused");
        assert!(matches!(transport_error(down), Error::Network(_)));
    }
}
