//! Storage backend adapter for nexusvault.
//!
//! The vault's durable backend is a remote version-controlled repository,
//! treated here as an opaque blob store with four transactions: fetch one
//! blob, push a set of blob writes and removals as one commit, and
//! force-replace the whole history.
//!
//! # Design Principles
//! - Atomicity: every push creates exactly one commit and updates one ref,
//!   so all blobs in a transaction become visible together or not at all
//! - Optimistic concurrency: a push names the commit it builds on and is
//!   rejected when the remote has moved past it
//! - No implicit retries: failures surface to the caller unchanged
//! - Backend isolation: no vault or crypto logic in this crate

pub mod git;
pub mod memory;
pub mod provider;
pub mod raw;
pub mod remote;

pub use git::GitStore;
pub use memory::{MemoryStore, PushFailure};
pub use provider::{validate_blob_path, BlobMap, BlobStore, PushOutcome, VersionedBlob};
pub use raw::RawHttpFetcher;
pub use remote::{CommitInfo, Credentials, RemoteLocator, RemoteResolver};
