//! XChaCha20-Poly1305 sealing shared by both envelope tiers.
//!
//! Output layout is `nonce[24] || ciphertext || tag[16]`. Nonces are random;
//! the extended nonce makes collisions negligible without a counter.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng, Payload},
    XChaCha20Poly1305,
};

use crate::keys::KEY_LENGTH;
use nexusvault_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

fn cipher_for(key: &[u8]) -> Result<XChaCha20Poly1305> {
    if key.len() != KEY_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid key length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        )));
    }
    Ok(XChaCha20Poly1305::new(GenericArray::from_slice(key)))
}

/// Seal `plaintext` under a raw 32-byte key.
///
/// # Errors
/// - `Crypto` if `key` is not [`KEY_LENGTH`] bytes
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    encrypt_with_aad(key, plaintext, &[])
}

/// Encrypt plaintext, binding `aad` into the authentication tag.
///
/// The associated data is not stored in the output; the same bytes must be
/// presented again to [`decrypt_with_aad`].
pub fn encrypt_with_aad(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Open a blob produced by [`encrypt`].
///
/// # Errors
/// - `Crypto` if `key` is not [`KEY_LENGTH`] bytes
/// - `DecryptionFailed` for short input or a failed tag check
pub fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    decrypt_with_aad(key, ciphertext, &[])
}

/// Decrypt ciphertext produced by [`encrypt_with_aad`].
pub fn decrypt_with_aad(key: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::DecryptionFailed);
    }

    let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_SIZE);
    let nonce = GenericArray::from_slice(nonce_bytes);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: encrypted,
                aad,
            },
        )
        .map_err(|_| Error::DecryptionFailed)
}
