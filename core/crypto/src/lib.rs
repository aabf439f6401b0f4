//! Cryptographic primitives for nexusvault.
//!
//! This module provides the two-tier envelope the vault is built on:
//! - Password tier: Argon2id-derived keys wrap the vault index and every
//!   per-file key
//! - File tier: each file's content is sealed under its own random key
//! - Authenticated encryption using XChaCha20-Poly1305 throughout
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Every decryption failure surfaces as the same opaque error

pub mod aead;
pub mod envelope;
pub mod kdf;
pub mod keys;

pub use envelope::{
    decrypt, decrypt_with_key, derive_and_encrypt, encrypt_with_key, generate_file_key,
    generate_storage_id,
};
pub use kdf::{derive_key, KdfParams};
pub use keys::{FileKey, MasterKey, Salt, KEY_LENGTH};
