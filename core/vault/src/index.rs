//! Vault index: the encrypted map from vault paths to stored blobs.
//!
//! The index is an owned tree of tagged entries. Folders own their children
//! outright and lookups always walk from the root, so no parent links are
//! needed. Children live in a `BTreeMap`, which makes both the serialized
//! form and every traversal order independent of insertion order.
//!
//! Invariants maintained by the mutating operations:
//! - every file entry names exactly one storage id
//! - folders are never empty (removal prunes emptied ancestors)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use nexusvault_common::{Error, Result, VaultPath};
use nexusvault_crypto::{decrypt, derive_and_encrypt, KdfParams};

/// One node of the index tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entry {
    /// A stored file.
    File {
        /// Backend blob name of the encrypted content.
        storage_id: String,
        /// File key wrapped under the vault password, hex encoded.
        file_key: String,
    },
    /// A folder with at least one descendant file.
    Folder { children: BTreeMap<String, Entry> },
}

impl Entry {
    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File { .. })
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Entry::Folder { .. })
    }

    fn kind(&self) -> EntryKind {
        match self {
            Entry::File { .. } => EntryKind::File,
            Entry::Folder { .. } => EntryKind::Folder,
        }
    }
}

/// Kind of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// A file entry together with its full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: VaultPath,
    pub storage_id: String,
    pub file_key: String,
}

/// Counts reported by [`VaultIndex::statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    pub folders: usize,
}

/// The decrypted vault index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultIndex {
    entries: BTreeMap<String, Entry>,
}

impl VaultIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry at `path`.
    ///
    /// # Errors
    /// - `Validation` for the root, which is not an entry
    /// - `NotFound` if any segment is missing or an intermediate segment
    ///   is not a folder
    pub fn find_entry(&self, path: &VaultPath) -> Result<&Entry> {
        let (last, parents) = path
            .components()
            .split_last()
            .ok_or_else(|| Error::Validation("The vault root is not an entry".to_string()))?;

        let mut level = &self.entries;
        for component in parents {
            match level.get(component) {
                Some(Entry::Folder { children }) => level = children,
                _ => return Err(Error::NotFound(format!("{} not found in vault", path))),
            }
        }
        level
            .get(last)
            .ok_or_else(|| Error::NotFound(format!("{} not found in vault", path)))
    }

    /// Find the file at `path`.
    ///
    /// # Errors
    /// - `NotFound` if nothing is at `path`
    /// - `Validation` if `path` is a folder
    pub fn find_file(&self, path: &VaultPath) -> Result<FileRecord> {
        match self.find_entry(path)? {
            Entry::File {
                storage_id,
                file_key,
            } => Ok(FileRecord {
                path: path.clone(),
                storage_id: storage_id.clone(),
                file_key: file_key.clone(),
            }),
            Entry::Folder { .. } => Err(Error::Validation(format!("{} is a folder", path))),
        }
    }

    /// Whether an entry exists at `path`.
    pub fn contains(&self, path: &VaultPath) -> bool {
        self.find_entry(path).is_ok()
    }

    /// Create or overwrite the file entry at `path`, creating intermediate
    /// folders as needed.
    ///
    /// # Postconditions
    /// - `find_file(path)` returns the new storage id and key
    /// - Returns the replaced entry, if any
    ///
    /// # Errors
    /// - `Validation` if `path` is the root, an intermediate segment is a
    ///   file, or `path` itself is a folder
    pub fn add_file(
        &mut self,
        path: &VaultPath,
        storage_id: impl Into<String>,
        file_key: impl Into<String>,
    ) -> Result<Option<Entry>> {
        let (last, parents) = path
            .components()
            .split_last()
            .ok_or_else(|| Error::Validation("Cannot store a file at the vault root".to_string()))?;

        let mut level = &mut self.entries;
        for component in parents {
            let next = level
                .entry(component.clone())
                .or_insert_with(|| Entry::Folder {
                    children: BTreeMap::new(),
                });
            level = match next {
                Entry::Folder { children } => children,
                Entry::File { .. } => {
                    return Err(Error::Validation(format!(
                        "Cannot store {}: '{}' is a file",
                        path, component
                    )));
                }
            };
        }

        if let Some(Entry::Folder { .. }) = level.get(last) {
            return Err(Error::Validation(format!("{} is a folder", path)));
        }
        Ok(level.insert(
            last.clone(),
            Entry::File {
                storage_id: storage_id.into(),
                file_key: file_key.into(),
            },
        ))
    }

    /// Remove the file at `path`, pruning any folders it leaves empty.
    ///
    /// # Errors
    /// - `NotFound` if nothing is at `path`
    /// - `Validation` if `path` is a folder or the root
    pub fn remove_file(&mut self, path: &VaultPath) -> Result<FileRecord> {
        let record = self.find_file(path)?;
        remove_below(&mut self.entries, path.components());
        Ok(record)
    }

    /// Every file in the vault, in traversal order.
    pub fn files(&self) -> Result<Vec<FileRecord>> {
        self.files_under(&VaultPath::root())
    }

    /// Every file at or below the folder `path` (the root selects the
    /// whole vault), in traversal order.
    ///
    /// # Errors
    /// - `NotFound` if `path` does not exist
    /// - `Validation` if `path` is a file
    pub fn files_under(&self, path: &VaultPath) -> Result<Vec<FileRecord>> {
        let start = if path.is_root() {
            &self.entries
        } else {
            match self.find_entry(path)? {
                Entry::Folder { children } => children,
                Entry::File { .. } => {
                    return Err(Error::Validation(format!("{} is a file", path)));
                }
            }
        };

        Ok(walk(path, start)?
            .into_iter()
            .filter_map(|(path, entry)| match entry {
                Entry::File {
                    storage_id,
                    file_key,
                } => Some(FileRecord {
                    path,
                    storage_id: storage_id.clone(),
                    file_key: file_key.clone(),
                }),
                Entry::Folder { .. } => None,
            })
            .collect())
    }

    /// Every entry (folders and files) in traversal order: depth first,
    /// children in name order, a folder before its contents.
    pub fn entries(&self) -> Result<Vec<(VaultPath, EntryKind)>> {
        Ok(walk(&VaultPath::root(), &self.entries)?
            .into_iter()
            .map(|(path, entry)| (path, entry.kind()))
            .collect())
    }

    /// Storage ids of every file in the vault.
    pub fn storage_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        let mut stack: Vec<&BTreeMap<String, Entry>> = vec![&self.entries];
        while let Some(level) = stack.pop() {
            for entry in level.values() {
                match entry {
                    Entry::File { storage_id, .. } => {
                        ids.insert(storage_id.clone());
                    }
                    Entry::Folder { children } => stack.push(children),
                }
            }
        }
        ids
    }

    /// Case-insensitive substring search over file paths.
    ///
    /// Returns `(path, storage_id)` pairs in traversal order.
    pub fn search(&self, query: &str) -> Result<Vec<(VaultPath, String)>> {
        let needle = query.to_lowercase();
        Ok(self
            .files()?
            .into_iter()
            .filter(|record| {
                record
                    .path
                    .to_string_path()
                    .to_lowercase()
                    .contains(&needle)
            })
            .map(|record| (record.path, record.storage_id))
            .collect())
    }

    /// Count files and folders.
    pub fn statistics(&self) -> IndexStats {
        let mut stats = IndexStats::default();
        let mut stack: Vec<&BTreeMap<String, Entry>> = vec![&self.entries];
        while let Some(level) = stack.pop() {
            for entry in level.values() {
                match entry {
                    Entry::File { .. } => stats.files += 1,
                    Entry::Folder { children } => {
                        stats.folders += 1;
                        stack.push(children);
                    }
                }
            }
        }
        stats
    }

    /// Serialize to bytes.
    ///
    /// The encoding is deterministic: equal indexes produce equal bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes, rejecting names that are not valid path
    /// segments.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let index: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        walk(&VaultPath::root(), &index.entries)?;
        Ok(index)
    }

    /// Serialize and encrypt under `password`.
    pub fn seal(&self, password: &[u8], params: &KdfParams) -> Result<Vec<u8>> {
        derive_and_encrypt(&self.to_bytes()?, password, params)
    }

    /// Decrypt with `password` and deserialize.
    ///
    /// # Errors
    /// - `DecryptionFailed` for a wrong password or damaged blob
    pub fn open(sealed: &[u8], password: &[u8]) -> Result<Self> {
        Self::from_bytes(&decrypt(sealed, password)?)
    }
}

/// Pre-order traversal with an explicit stack.
fn walk<'a>(
    start: &VaultPath,
    level: &'a BTreeMap<String, Entry>,
) -> Result<Vec<(VaultPath, &'a Entry)>> {
    let mut out = Vec::new();
    let mut stack: Vec<(VaultPath, &'a Entry)> = Vec::new();
    for (name, entry) in level.iter().rev() {
        stack.push((start.join(name)?, entry));
    }

    while let Some((path, entry)) = stack.pop() {
        if let Entry::Folder { children } = entry {
            for (name, child) in children.iter().rev() {
                stack.push((path.join(name)?, child));
            }
        }
        out.push((path, entry));
    }
    Ok(out)
}

/// Remove the leaf at `components` and drop folders left empty.
///
/// The caller has already checked that the leaf exists and is a file.
fn remove_below(level: &mut BTreeMap<String, Entry>, components: &[String]) {
    match components {
        [] => {}
        [leaf] => {
            level.remove(leaf);
        }
        [head, rest @ ..] => {
            let emptied = match level.get_mut(head) {
                Some(Entry::Folder { children }) => {
                    remove_below(children, rest);
                    children.is_empty()
                }
                _ => false,
            };
            if emptied {
                level.remove(head);
            }
        }
    }
}
