//! Key material. Every key type zeroizes on drop and redacts its `Debug`.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use nexusvault_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of key-derivation salts in bytes.
pub const SALT_LENGTH: usize = 32;

/// Key derived from a password or share secret.
///
/// Wraps the vault index and per-file keys. Never stored.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Key for encrypting file contents.
///
/// Generated fresh for every upload, independent of the vault password.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FileKey {
    key: [u8; KEY_LENGTH],
}

impl FileKey {
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a file key from a slice, e.g. freshly unwrapped key material.
    ///
    /// # Errors
    /// - Returns error if the slice is not exactly KEY_LENGTH bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            Error::Crypto(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Parse a file key from its hex form.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let mut bytes = hex::decode(encoded)
            .map_err(|e| Error::Validation(format!("Invalid key encoding: {}", e)))?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Lowercase hex form of the raw key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }

    /// Generate a random file key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileKey([REDACTED])")
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Salt(pub [u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_material_differs() {
        assert_ne!(FileKey::generate().as_bytes(), FileKey::generate().as_bytes());
        assert_ne!(Salt::generate().as_bytes(), Salt::generate().as_bytes());
    }

    #[test]
    fn test_file_key_hex() {
        let key = FileKey::from_bytes([0xab; KEY_LENGTH]);
        assert_eq!(key.to_hex(), "ab".repeat(KEY_LENGTH));
        assert_eq!(FileKey::from_hex(&key.to_hex()).unwrap().as_bytes(), key.as_bytes());

        assert!(matches!(FileKey::from_hex("zz"), Err(Error::Validation(_))));
        assert!(matches!(FileKey::from_hex("abcd"), Err(Error::Crypto(_))));
        assert!(FileKey::from_slice(&[0u8; 31]).is_err());
    }

    #[test]
    fn test_debug_redacted() {
        let key = FileKey::from_bytes([0xab; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "FileKey([REDACTED])");
        let master = MasterKey::from_bytes([0xcd; KEY_LENGTH]);
        assert!(!format!("{:?}", master).contains("cd"));
    }
}
