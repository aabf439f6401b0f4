//! Common error types for nexusvault.

use thiserror::Error;

/// Top-level error type for vault operations.
///
/// Every public operation reports failures through this enum. Each variant
/// carries a human-readable message; [`Error::kind`] gives the caller a
/// stable tag to map onto exit codes.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad password or credentials, including a vault index that does not
    /// decrypt with the supplied password.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Vault path or remote object absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Overwrite (or another destructive step) was declined.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Ciphertext failed authentication: wrong password, wrong key or
    /// corrupted data. The cause is deliberately not distinguished.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Backend communication failed.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend refused the ref update.
    #[error("Push rejected: {0}")]
    PushRejected(String),

    /// Malformed input or wrong entry kind for the requested operation.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Encryption-side cryptographic failure.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Backend-local failure that is not a transport problem.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    NotFound,
    Conflict,
    DecryptionFailed,
    Network,
    PushRejected,
    Validation,
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::DecryptionFailed => ErrorKind::DecryptionFailed,
            Error::Network(_) => ErrorKind::Network,
            Error::PushRejected(_) => ErrorKind::PushRejected,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Crypto(_) | Error::Storage(_) | Error::Serialization(_) | Error::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl ErrorKind {
    /// Process exit code for this kind of failure.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Internal => 1,
            ErrorKind::Validation => 2,
            ErrorKind::Authentication => 3,
            ErrorKind::DecryptionFailed => 4,
            ErrorKind::NotFound => 5,
            ErrorKind::Conflict => 6,
            ErrorKind::Network => 7,
            ErrorKind::PushRejected => 8,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
