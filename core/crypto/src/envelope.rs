//! Two-tier encryption envelope.
//!
//! The password tier derives a key from a password or share secret and
//! seals small payloads (the vault index, wrapped file keys, share
//! pointers). The output is self-describing:
//!
//! ```text
//! "NXV1" || m_cost u32le || t_cost u32le || p_cost u32le || salt[32] || nonce[24] || ciphertext || tag[16]
//! ```
//!
//! The header is bound into the tag as associated data, so decryption needs
//! nothing but the password and the blob.
//!
//! The file tier seals file content under a random [`FileKey`] using the
//! plain `nonce || ciphertext || tag` layout from [`crate::aead`].

use rand::RngCore;

use crate::aead;
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{FileKey, Salt, SALT_LENGTH};
use nexusvault_common::{Error, Result};

/// Format marker for password-tier envelopes.
pub const MAGIC: &[u8; 4] = b"NXV1";

/// Length of the password-tier header.
pub const HEADER_LEN: usize = MAGIC.len() + 12 + SALT_LENGTH;

fn encode_header(params: &KdfParams, salt: &Salt) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(MAGIC);
    header[4..8].copy_from_slice(&params.memory_cost.to_le_bytes());
    header[8..12].copy_from_slice(&params.time_cost.to_le_bytes());
    header[12..16].copy_from_slice(&params.parallelism.to_le_bytes());
    header[16..].copy_from_slice(salt.as_bytes());
    header
}

fn decode_header(header: &[u8]) -> Option<(KdfParams, Salt)> {
    if header.len() != HEADER_LEN || &header[..4] != MAGIC {
        return None;
    }
    let word = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
    let params = KdfParams {
        memory_cost: word(4),
        time_cost: word(8),
        parallelism: word(12),
    };
    let mut salt = [0u8; SALT_LENGTH];
    salt.copy_from_slice(&header[16..]);
    Some((params, Salt::from_bytes(salt)))
}

/// Encrypt `plaintext` under a key derived from `password`.
///
/// A fresh salt and nonce are generated per call.
///
/// # Errors
/// - Returns `Validation` if the password is empty
/// - Returns `Crypto` if the KDF parameters are rejected
pub fn derive_and_encrypt(plaintext: &[u8], password: &[u8], params: &KdfParams) -> Result<Vec<u8>> {
    let salt = Salt::generate();
    let key = derive_key(password, &salt, params)?;
    let header = encode_header(params, &salt);

    let sealed = aead::encrypt_with_aad(key.as_bytes(), plaintext, &header)?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a password-tier envelope.
///
/// # Errors
/// - Returns `DecryptionFailed` for a wrong password, a tampered or
///   truncated blob, or a header this crate would not have produced
pub fn decrypt(ciphertext: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < HEADER_LEN {
        return Err(Error::DecryptionFailed);
    }
    let (header, sealed) = ciphertext.split_at(HEADER_LEN);
    let (params, salt) = decode_header(header).ok_or(Error::DecryptionFailed)?;
    if !params.is_within_bounds() {
        return Err(Error::DecryptionFailed);
    }

    let key = derive_key(password, &salt, &params).map_err(|_| Error::DecryptionFailed)?;
    aead::decrypt_with_aad(key.as_bytes(), sealed, header)
}

/// Encrypt file content under its own file key.
pub fn encrypt_with_key(plaintext: &[u8], key: &FileKey) -> Result<Vec<u8>> {
    aead::encrypt(key.as_bytes(), plaintext)
}

/// Decrypt file content sealed by [`encrypt_with_key`].
pub fn decrypt_with_key(ciphertext: &[u8], key: &FileKey) -> Result<Vec<u8>> {
    aead::decrypt(key.as_bytes(), ciphertext)
}

/// Generate a fresh random file key.
pub fn generate_file_key() -> FileKey {
    FileKey::generate()
}

/// Generate a random storage identifier: `byte_len` random bytes as lowercase hex.
pub fn generate_storage_id(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
