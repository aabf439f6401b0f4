//! Common utilities and types shared across the nexusvault crates.
//!
//! This module provides the error taxonomy every vault operation reports
//! through, plus the small value types (vault paths, owners, secret buffers)
//! the other crates pass around.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{SensitiveBytes, VaultOwner, VaultPath};
