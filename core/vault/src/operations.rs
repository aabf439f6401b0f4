//! Vault file operations with encryption/decryption.
//!
//! Every mutation follows the same shape: build the next index as a copy,
//! stage the encrypted blobs and the sealed index, push them in one
//! transaction on top of the session's head commit, and only then swap the
//! copy into the session. A failed push therefore leaves both the remote
//! and the session untouched, and a push from a session that has fallen
//! behind the remote is rejected rather than applied.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::config::{shared_path, Settings, INDEX_PATH, KEY_PATH, SETTINGS_PATH};
use crate::index::{Entry, EntryKind, FileRecord, IndexStats, VaultIndex};
use crate::session::Session;
use crate::share::{SharePointer, ShareString};
use nexusvault_common::{Error, Result, VaultPath};
use nexusvault_crypto::{
    decrypt, decrypt_with_key, derive_and_encrypt, encrypt_with_key, generate_file_key,
    generate_storage_id, FileKey, KdfParams,
};
use nexusvault_storage::{BlobMap, BlobStore, RemoteResolver};

/// Files fetched concurrently by a directory download.
pub const DOWNLOAD_CONCURRENCY: usize = 4;

/// Random bytes behind a share secret (32 hex characters).
pub const SHARE_SECRET_BYTES: usize = 16;

/// Capability to approve a destructive step.
///
/// Implemented for `bool` (a pre-supplied answer) and for any
/// `FnMut(&str) -> bool` (e.g. an interactive prompt).
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl Confirm for bool {
    fn confirm(&mut self, _prompt: &str) -> bool {
        *self
    }
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Outcome of [`VaultOperations::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub storage_id: String,
    pub overwritten: bool,
}

/// Outcome of [`VaultOperations::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub storage_id: String,
    /// The blob was already absent from the remote; only the index changed.
    pub blob_was_missing: bool,
}

/// Details of one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub path: VaultPath,
    pub storage_id: String,
    pub encrypted_size: usize,
    pub wrapped_key: String,
}

/// Vault-wide summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStats {
    pub owner: String,
    pub counts: IndexStats,
    pub settings: Settings,
}

/// Wrap a file key under a password for storage in the index.
pub(crate) fn wrap_file_key(key: &FileKey, password: &[u8], params: &KdfParams) -> Result<String> {
    derive_and_encrypt(key.as_bytes(), password, params).map(hex::encode)
}

/// Recover a file key wrapped by [`wrap_file_key`].
pub(crate) fn unwrap_file_key(wrapped: &str, password: &[u8]) -> Result<FileKey> {
    let sealed = hex::decode(wrapped).map_err(|_| Error::DecryptionFailed)?;
    let raw = decrypt(&sealed, password)?;
    FileKey::from_slice(&raw).map_err(|_| Error::DecryptionFailed)
}

/// Decrypt a content blob whose key is wrapped under `password`.
///
/// Key unwrapping runs the password KDF, so this is done on the blocking
/// pool.
pub(crate) async fn open_file_blob(
    blob: Vec<u8>,
    wrapped: String,
    password: nexusvault_common::SensitiveBytes,
) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let key = unwrap_file_key(&wrapped, password.as_bytes())?;
        decrypt_with_key(&blob, &key)
    })
    .await
    .map_err(|e| Error::Crypto(format!("Decryption worker failed: {}", e)))?
}

/// Generate a storage id of `byte_len` random bytes not present in `taken`.
pub(crate) fn fresh_id(byte_len: usize, taken: &BTreeSet<String>) -> String {
    loop {
        let id = generate_storage_id(byte_len);
        if !taken.contains(&id) {
            return id;
        }
    }
}

/// Vault operations handler.
///
/// Borrows an authenticated session and the backend for the duration of
/// one or more operations.
pub struct VaultOperations<'a> {
    session: &'a mut Session,
    store: &'a dyn BlobStore,
    resolver: &'a RemoteResolver,
}

impl<'a> VaultOperations<'a> {
    /// Create new operations handler for a session.
    pub fn new(
        session: &'a mut Session,
        store: &'a dyn BlobStore,
        resolver: &'a RemoteResolver,
    ) -> Self {
        Self {
            session,
            store,
            resolver,
        }
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    fn password(&self) -> &[u8] {
        self.session.password().as_bytes()
    }

    fn kdf(&self) -> KdfParams {
        self.session.settings().kdf_params
    }

    fn persist(&self) {
        if let Err(e) = self.session.persist() {
            warn!(error = %e, "failed to update session cache");
        }
    }

    /// Upload `content` to `path`.
    ///
    /// An existing file is only replaced after `confirm` approves; the
    /// replacement keeps the storage id (the old blob is overwritten in
    /// place) but always gets a fresh file key.
    ///
    /// # Postconditions
    /// - The content blob and the updated index land in one commit
    /// - On any error the session index and the remote are unchanged
    ///
    /// # Errors
    /// - `Validation` if `path` is the root or a folder, or runs through a file
    /// - `Conflict` if overwriting was declined
    /// - Backend errors from the push
    pub async fn upload(
        &mut self,
        path: &VaultPath,
        content: &[u8],
        mut confirm: impl Confirm,
    ) -> Result<UploadReport> {
        if path.is_root() {
            return Err(Error::Validation(
                "Cannot upload to the vault root".to_string(),
            ));
        }

        let existing = match self.session.index().find_entry(path) {
            Ok(Entry::File { storage_id, .. }) => Some(storage_id.clone()),
            Ok(Entry::Folder { .. }) => {
                return Err(Error::Validation(format!("{} is a folder", path)));
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if existing.is_some()
            && !confirm.confirm(&format!("{} already exists in the vault. Overwrite?", path))
        {
            return Err(Error::Conflict(format!("Overwrite of {} declined", path)));
        }

        let overwritten = existing.is_some();
        let storage_id = match existing {
            Some(id) => id,
            None => fresh_id(
                self.session.settings().file_id_bytes(),
                &self.session.index().storage_ids(),
            ),
        };

        let key = generate_file_key();
        let sealed_content = encrypt_with_key(content, &key)?;
        let wrapped = wrap_file_key(&key, self.password(), &self.kdf())?;

        let mut next = self.session.index().clone();
        next.add_file(path, storage_id.clone(), wrapped)?;

        let mut blobs = BlobMap::new();
        blobs.insert(storage_id.clone(), sealed_content);
        blobs.insert(INDEX_PATH.to_string(), next.seal(self.password(), &self.kdf())?);

        debug!(path = %path, storage_id = %storage_id, overwritten, "pushing upload");
        let outcome = self
            .store
            .push_atomic(
                &self.session.remote(self.resolver),
                &self.session.credentials(),
                self.session.head(),
                blobs,
                &self.session.settings().commit(&format!("Updated {}", path)),
            )
            .await?;

        self.session.advance(next, outcome.commit);
        self.persist();

        info!(path = %path, size = content.len(), "file uploaded");
        Ok(UploadReport {
            storage_id,
            overwritten,
        })
    }

    /// Delete the file at `path`.
    ///
    /// The blob removal and the index update share one commit. A blob that
    /// is already gone from the remote is logged and reported, not fatal.
    ///
    /// # Errors
    /// - `NotFound` if `path` does not exist
    /// - `Validation` if `path` is a folder
    /// - Backend errors from the push
    pub async fn delete(&mut self, path: &VaultPath) -> Result<DeleteReport> {
        let record = self.session.index().find_file(path)?;

        let mut next = self.session.index().clone();
        next.remove_file(path)?;

        let mut blobs = BlobMap::new();
        blobs.insert(INDEX_PATH.to_string(), next.seal(self.password(), &self.kdf())?);

        let outcome = self
            .store
            .remove_and_push_atomic(
                &self.session.remote(self.resolver),
                &self.session.credentials(),
                self.session.head(),
                std::slice::from_ref(&record.storage_id),
                blobs,
                &self.session.settings().commit(&format!("Deleted {}", path)),
            )
            .await?;

        let blob_was_missing = outcome.missing_removals.contains(&record.storage_id);
        if blob_was_missing {
            warn!(
                path = %path,
                storage_id = %record.storage_id,
                "blob was already missing from the remote; index entry removed"
            );
        }

        self.session.advance(next, outcome.commit);
        self.persist();

        info!(path = %path, "file deleted");
        Ok(DeleteReport {
            storage_id: record.storage_id,
            blob_was_missing,
        })
    }

    /// Destroy every file and all history in the vault.
    ///
    /// The remote is replaced by a single commit that holds only the
    /// encrypted signing key, the settings and an empty index, so the vault
    /// stays connectable with the same password.
    ///
    /// # Errors
    /// - `Conflict` if `confirm` declines
    /// - Backend errors from the force push
    pub async fn purge(&mut self, mut confirm: impl Confirm) -> Result<()> {
        let owner = self.session.owner().to_string();
        if !confirm.confirm(&format!(
            "Permanently delete every file in the vault of {}?",
            owner
        )) {
            return Err(Error::Conflict("Purge declined".to_string()));
        }

        let empty = VaultIndex::new();
        let settings = self.session.settings();
        let mut blobs = BlobMap::new();
        blobs.insert(
            KEY_PATH.to_string(),
            derive_and_encrypt(
                self.session.signing_key().as_bytes(),
                self.password(),
                &settings.kdf_params,
            )?,
        );
        blobs.insert(SETTINGS_PATH.to_string(), settings.seal(self.password())?);
        blobs.insert(INDEX_PATH.to_string(), empty.seal(self.password(), &self.kdf())?);

        let outcome = self
            .store
            .force_push_root(
                &self.session.remote(self.resolver),
                &self.session.credentials(),
                blobs,
                &settings.commit("PURGE VAULT"),
            )
            .await?;

        self.session.advance(empty, outcome.commit);
        self.persist();

        warn!(owner = %owner, "vault purged");
        Ok(())
    }

    /// Every entry in the vault, folders before their contents.
    pub fn list(&self) -> Result<Vec<(VaultPath, EntryKind)>> {
        self.session.index().entries()
    }

    /// Case-insensitive substring search over file paths.
    pub fn search(&self, query: &str) -> Result<Vec<(VaultPath, String)>> {
        self.session.index().search(query)
    }

    async fn fetch_and_open(&self, record: &FileRecord) -> Result<Vec<u8>> {
        let blob = self
            .store
            .fetch_raw(self.session.owner(), &record.storage_id)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::NotFound(format!(
                    "Blob {} for {} is missing from the remote",
                    record.storage_id, record.path
                )),
                other => other,
            })?;
        open_file_blob(blob, record.file_key.clone(), self.session.password().clone()).await
    }

    /// Decrypted content of the file at `path`.
    ///
    /// # Errors
    /// - `NotFound` if `path` or its blob does not exist
    /// - `Validation` if `path` is a folder
    /// - `DecryptionFailed` if the blob or wrapped key does not decrypt
    pub async fn read_file(&self, path: &VaultPath) -> Result<Vec<u8>> {
        let record = self.session.index().find_file(path)?;
        let content = self.fetch_and_open(&record).await?;
        debug!(path = %path, size = content.len(), "file read");
        Ok(content)
    }

    /// Write the decrypted content of `path` to `writer`, ending it with a
    /// newline if it does not already end with one.
    pub async fn read_to<W>(&self, path: &VaultPath, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let content = self.read_file(path).await?;
        writer.write_all(&content).await?;
        if content.last() != Some(&b'\n') {
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Download the file at `path` to `dest`.
    ///
    /// When `dest` is an existing directory the file keeps its vault name
    /// inside it. Returns the written path.
    pub async fn download_file(&self, path: &VaultPath, dest: &Path) -> Result<PathBuf> {
        let content = self.read_file(path).await?;
        let name = path
            .name()
            .ok_or_else(|| Error::Validation("The vault root is not a file".to_string()))?;

        let target = if tokio::fs::metadata(dest)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            dest.join(name)
        } else {
            dest.to_path_buf()
        };
        write_file(&target, &content).await?;

        info!(path = %path, dest = %target.display(), "file downloaded");
        Ok(target)
    }

    /// Download every file under the folder `path` into `dest`, keeping
    /// the layout below `path`.
    ///
    /// Files are fetched concurrently and each is written as soon as its
    /// own fetch and decryption complete, so the order is unspecified.
    ///
    /// # Errors
    /// - `NotFound` if `path` does not exist or holds no files
    /// - `Validation` if `path` is a file
    /// - The first fetch or decryption failure; files already written stay
    pub async fn download_directory(&self, path: &VaultPath, dest: &Path) -> Result<Vec<PathBuf>> {
        let records = self.session.index().files_under(path)?;
        if records.is_empty() {
            return Err(Error::NotFound(format!("No files found under {}", path)));
        }

        let written: Vec<PathBuf> = stream::iter(records)
            .map(|record| async move {
                let content = self.fetch_and_open(&record).await?;
                let mut target = dest.to_path_buf();
                for component in record.path.strip_prefix(path).unwrap_or_default() {
                    target.push(component);
                }
                write_file(&target, &content).await?;
                debug!(path = %record.path, dest = %target.display(), "file downloaded");
                Ok::<_, Error>(target)
            })
            .buffer_unordered(DOWNLOAD_CONCURRENCY)
            .try_collect()
            .await?;

        info!(path = %path, files = written.len(), "directory downloaded");
        Ok(written)
    }

    /// Storage details of the file at `path`, including the size of its
    /// encrypted blob.
    pub async fn file_info(&self, path: &VaultPath) -> Result<FileInfo> {
        let record = self.session.index().find_file(path)?;
        let blob = self
            .store
            .fetch_raw(self.session.owner(), &record.storage_id)
            .await?;

        Ok(FileInfo {
            name: path.name().unwrap_or_default().to_string(),
            path: record.path,
            storage_id: record.storage_id,
            encrypted_size: blob.len(),
            wrapped_key: record.file_key,
        })
    }

    /// File and folder counts plus the vault settings.
    pub fn stats(&self) -> VaultStats {
        VaultStats {
            owner: self.session.owner().to_string(),
            counts: self.session.index().statistics(),
            settings: self.session.settings().clone(),
        }
    }

    /// Share the file at `path` through an encrypted pointer.
    ///
    /// A random share secret protects a pointer blob pushed to
    /// `shared/<reference>`. The returned share string carries the secret;
    /// the vault password never leaves the session.
    pub async fn share(&mut self, path: &VaultPath) -> Result<String> {
        let record = self.session.index().find_file(path)?;
        let key = unwrap_file_key(&record.file_key, self.password())?;

        let secret = generate_storage_id(SHARE_SECRET_BYTES);
        let reference = generate_storage_id(self.session.settings().share_id_bytes());

        let pointer = SharePointer {
            storage_id: record.storage_id.clone(),
            file_key: wrap_file_key(&key, secret.as_bytes(), &self.kdf())?,
        };
        let mut blobs = BlobMap::new();
        blobs.insert(
            shared_path(&reference),
            pointer.seal(secret.as_bytes(), &self.kdf())?,
        );

        let outcome = self
            .store
            .push_atomic(
                &self.session.remote(self.resolver),
                &self.session.credentials(),
                self.session.head(),
                blobs,
                &self.session.settings().commit(&format!("Shared {}", path)),
            )
            .await?;

        self.session.set_head(Some(outcome.commit));
        self.persist();

        info!(path = %path, reference = %reference, "share pointer published");
        Ok(ShareString::Pointer {
            owner: self.session.owner().clone(),
            reference,
            secret,
            file_name: path.name().map(str::to_string),
        }
        .to_string())
    }

    /// Share the file at `path` by handing out its raw file key.
    ///
    /// Nothing is pushed. Anyone holding the string can decrypt this one
    /// file until it is overwritten.
    pub fn share_direct(&self, path: &VaultPath) -> Result<String> {
        let record = self.session.index().find_file(path)?;
        let key = unwrap_file_key(&record.file_key, self.password())?;
        Ok(ShareString::Direct {
            owner: self.session.owner().clone(),
            storage_id: record.storage_id,
            file_key: key.to_hex(),
        }
        .to_string())
    }
}

pub(crate) async fn write_file(target: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(target, content).await?;
    Ok(())
}
