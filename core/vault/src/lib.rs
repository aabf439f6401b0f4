//! Vault engine for nexusvault.
//!
//! This module provides:
//! - Vault setup, connection and the cached session lifecycle
//! - The encrypted index mapping vault paths to storage ids and keys
//! - Encrypted file operations, sharing and vault transfer
//!
//! # Architecture
//! Every operation runs in an explicit [`Session`] against a
//! [`nexusvault_storage::BlobStore`]. Content and index changes are pushed
//! together in one commit; the session only changes after the push
//! succeeds.

pub mod cache;
pub mod config;
pub mod index;
pub mod operations;
pub mod session;
pub mod share;
pub mod transfer;

pub use cache::SessionCache;
pub use config::{ClientConfig, Settings};
pub use index::{Entry, EntryKind, FileRecord, IndexStats, VaultIndex};
pub use operations::{
    Confirm, DeleteReport, FileInfo, UploadReport, VaultOperations, VaultStats,
};
pub use session::Session;
pub use share::{download_shared, read_shared, ShareString, SharedFile};
pub use transfer::{transfer_vault, TransferReport};
