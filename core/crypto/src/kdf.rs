//! Argon2id derivation of password-tier keys.
//!
//! The parameters travel in every envelope header, so a vault can change
//! its settings without re-encrypting older blobs.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::keys::{MasterKey, Salt, KEY_LENGTH};
use nexusvault_common::{Error, Result};

/// Upper bound on memory cost accepted from an envelope header (1 GiB).
pub const MAX_MEMORY_COST: u32 = 1024 * 1024;

/// Upper bound on iterations accepted from an envelope header.
pub const MAX_TIME_COST: u32 = 16;

/// Upper bound on lanes accepted from an envelope header.
pub const MAX_PARALLELISM: u32 = 16;

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// 64 MiB, 3 passes, 4 lanes.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// 256 MiB, 4 passes, 4 lanes. Expect several seconds per derivation.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// 32 MiB, 3 passes, 2 lanes. The default for new vaults.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Check the parameters are within the bounds this crate will derive with.
    ///
    /// Envelope headers are attacker-controlled, so decryption refuses
    /// parameters that would make derivation arbitrarily expensive.
    pub fn is_within_bounds(&self) -> bool {
        (1..=MAX_PARALLELISM).contains(&self.parallelism)
            && (1..=MAX_TIME_COST).contains(&self.time_cost)
            && self.memory_cost >= 8 * self.parallelism
            && self.memory_cost <= MAX_MEMORY_COST
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::moderate()
    }
}

/// Derive a 32-byte key from `password` and `salt`.
///
/// Deterministic for equal inputs. Used for vault passwords and share
/// secrets alike.
///
/// # Errors
/// - `Validation` for an empty password
/// - `Crypto` if argon2 rejects the parameters
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<MasterKey> {
    if password.is_empty() {
        return Err(Error::Validation("Password cannot be empty".to_string()));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(password, salt.as_bytes(), &mut key_bytes)
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(MasterKey::from_bytes(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHEAP: KdfParams = KdfParams {
        memory_cost: 64,
        time_cost: 1,
        parallelism: 1,
    };

    #[test]
    fn test_same_inputs_same_key() {
        let salt = Salt::from_bytes([3u8; 32]);
        let a = derive_key(b"vault password", &salt, &CHEAP).unwrap();
        let b = derive_key(b"vault password", &salt, &CHEAP).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_salt_password_and_params_all_matter() {
        let salt = Salt::from_bytes([3u8; 32]);
        let base = derive_key(b"pw", &salt, &CHEAP).unwrap();

        let other_salt = derive_key(b"pw", &Salt::from_bytes([4u8; 32]), &CHEAP).unwrap();
        let other_pw = derive_key(b"pw2", &salt, &CHEAP).unwrap();
        let other_params = derive_key(
            b"pw",
            &salt,
            &KdfParams {
                time_cost: 2,
                ..CHEAP
            },
        )
        .unwrap();

        for other in [other_salt, other_pw, other_params] {
            assert_ne!(base.as_bytes(), other.as_bytes());
        }
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(
            derive_key(b"", &Salt::generate(), &CHEAP),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_bounds() {
        for preset in [
            KdfParams::interactive(),
            KdfParams::moderate(),
            KdfParams::sensitive(),
            CHEAP,
        ] {
            assert!(preset.is_within_bounds(), "{:?}", preset);
        }
        assert_eq!(KdfParams::default(), KdfParams::moderate());

        let hostile = [
            KdfParams {
                memory_cost: u32::MAX,
                ..CHEAP
            },
            KdfParams {
                time_cost: 0,
                ..CHEAP
            },
            KdfParams {
                parallelism: 64,
                memory_cost: 1024,
                ..CHEAP
            },
        ];
        for params in hostile {
            assert!(!params.is_within_bounds(), "{:?}", params);
        }
    }
}
