//! Share strings and anonymous retrieval of shared files.
//!
//! Two forms exist:
//! - Pointer: `<owner>:<reference>:<secret>[:<base64 name>]`. The secret
//!   opens an encrypted pointer blob at `shared/<reference>` that names
//!   the storage id and carries the file key re-wrapped under the secret.
//! - Direct: `<owner>:<storage id>:<file key hex>`. The raw file key is
//!   handed out and nothing is pushed.
//!
//! Neither form exposes the vault password.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::shared_path;
use crate::operations::{unwrap_file_key, write_file};
use nexusvault_common::{Error, Result, VaultOwner, VaultPath};
use nexusvault_crypto::{decrypt, decrypt_with_key, derive_and_encrypt, FileKey, KdfParams, KEY_LENGTH};
use nexusvault_storage::BlobStore;

/// Encrypted pointer stored at `shared/<reference>`.
#[derive(Serialize, Deserialize)]
pub(crate) struct SharePointer {
    #[serde(rename = "storageID")]
    pub storage_id: String,
    /// File key wrapped under the share secret, hex encoded.
    #[serde(rename = "fileKey")]
    pub file_key: String,
}

impl SharePointer {
    pub(crate) fn seal(&self, secret: &[u8], params: &KdfParams) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        derive_and_encrypt(&json, secret, params)
    }

    pub(crate) fn open(sealed: &[u8], secret: &[u8]) -> Result<Self> {
        let json = decrypt(sealed, secret)?;
        serde_json::from_slice(&json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Parsed share string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareString {
    Pointer {
        owner: VaultOwner,
        reference: String,
        secret: String,
        file_name: Option<String>,
    },
    Direct {
        owner: VaultOwner,
        storage_id: String,
        file_key: String,
    },
}

fn is_direct_key(part: &str) -> bool {
    part.len() == KEY_LENGTH * 2 && part.bytes().all(|b| b.is_ascii_hexdigit())
}

impl ShareString {
    /// Parse a share string.
    ///
    /// Three parts whose last is a 64-character hex key are the direct
    /// form; any other three or four parts are the pointer form.
    ///
    /// # Errors
    /// - `Validation` for a malformed string, owner or file name
    pub fn parse(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.trim().split(':').collect();
        if !(3..=4).contains(&parts.len()) || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::Validation(format!(
                "Malformed share string: expected owner:id:key, got {} part(s)",
                parts.len()
            )));
        }
        let owner = VaultOwner::new(parts[0])?;
        if !parts[1].bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::Validation(format!(
                "Malformed share identifier '{}'",
                parts[1]
            )));
        }

        if parts.len() == 3 && is_direct_key(parts[2]) {
            return Ok(Self::Direct {
                owner,
                storage_id: parts[1].to_string(),
                file_key: parts[2].to_ascii_lowercase(),
            });
        }

        let file_name = match parts.get(3) {
            Some(encoded) => Some(decode_file_name(encoded)?),
            None => None,
        };
        Ok(Self::Pointer {
            owner,
            reference: parts[1].to_string(),
            secret: parts[2].to_string(),
            file_name,
        })
    }

    pub fn owner(&self) -> &VaultOwner {
        match self {
            Self::Pointer { owner, .. } | Self::Direct { owner, .. } => owner,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Pointer { file_name, .. } => file_name.as_deref(),
            Self::Direct { .. } => None,
        }
    }
}

/// The name must be a single safe path component; it is used verbatim
/// when writing the download.
fn decode_file_name(encoded: &str) -> Result<String> {
    let invalid = || Error::Validation("Share string carries an invalid file name".to_string());
    let bytes = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| invalid())?;
    let name = String::from_utf8(bytes).map_err(|_| invalid())?;
    let path = VaultPath::from_components(vec![name.clone()]).map_err(|_| invalid())?;
    if path.components().len() != 1 {
        return Err(invalid());
    }
    Ok(name)
}

impl fmt::Display for ShareString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pointer {
                owner,
                reference,
                secret,
                file_name,
            } => {
                write!(f, "{}:{}:{}", owner, reference, secret)?;
                if let Some(name) = file_name {
                    write!(f, ":{}", URL_SAFE_NO_PAD.encode(name))?;
                }
                Ok(())
            }
            Self::Direct {
                owner,
                storage_id,
                file_key,
            } => write!(f, "{}:{}:{}", owner, storage_id, file_key),
        }
    }
}

/// A decrypted shared file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFile {
    /// Name carried by the share string, if any.
    pub name: Option<String>,
    pub storage_id: String,
    pub content: Vec<u8>,
}

/// Fetch and decrypt the file behind `share`. No session is needed.
///
/// # Errors
/// - `NotFound` if the pointer or the blob is gone
/// - `DecryptionFailed` if the secret or key does not open it
pub async fn read_shared(store: &dyn BlobStore, share: &ShareString) -> Result<SharedFile> {
    match share {
        ShareString::Direct {
            owner,
            storage_id,
            file_key,
        } => {
            let key = FileKey::from_hex(file_key).map_err(|_| Error::DecryptionFailed)?;
            let blob = store.fetch_raw(owner, storage_id).await?;
            Ok(SharedFile {
                name: None,
                storage_id: storage_id.clone(),
                content: decrypt_with_key(&blob, &key)?,
            })
        }
        ShareString::Pointer {
            owner,
            reference,
            secret,
            file_name,
        } => {
            let sealed = store.fetch_raw(owner, &shared_path(reference)).await?;
            let pointer = SharePointer::open(&sealed, secret.as_bytes())?;
            let key = unwrap_file_key(&pointer.file_key, secret.as_bytes())?;
            debug!(owner = %owner, reference = %reference, "share pointer opened");

            let blob = store.fetch_raw(owner, &pointer.storage_id).await?;
            Ok(SharedFile {
                name: file_name.clone(),
                content: decrypt_with_key(&blob, &key)?,
                storage_id: pointer.storage_id,
            })
        }
    }
}

/// Fetch the file behind `share` and write it under `dest`.
///
/// When `dest` is an existing directory, the file is named after the share
/// string's file name, or its storage id when it carries none.
pub async fn download_shared(
    store: &dyn BlobStore,
    share: &ShareString,
    dest: &Path,
) -> Result<PathBuf> {
    let file = read_shared(store, share).await?;
    let target = if tokio::fs::metadata(dest)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        dest.join(file.name.as_deref().unwrap_or(&file.storage_id))
    } else {
        dest.to_path_buf()
    };
    write_file(&target, &file.content).await?;
    info!(owner = %share.owner(), dest = %target.display(), "shared file downloaded");
    Ok(target)
}
