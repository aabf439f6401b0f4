//! Vault settings and local client configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use nexusvault_common::{Error, Result};
use nexusvault_crypto::{decrypt, derive_and_encrypt, KdfParams};
use nexusvault_storage::git::DEFAULT_BRANCH;
use nexusvault_storage::raw::DEFAULT_RAW_TEMPLATE;
use nexusvault_storage::remote::DEFAULT_REMOTE_TEMPLATE;
use nexusvault_storage::{CommitInfo, RemoteResolver};

/// Encrypted vault index.
pub const INDEX_PATH: &str = ".config/index";

/// Encrypted signing key.
pub const KEY_PATH: &str = ".config/key";

/// Encrypted vault settings.
pub const SETTINGS_PATH: &str = ".config/settings";

/// Directory holding share pointers.
pub const SHARED_DIR: &str = "shared";

/// Bounds on configurable identifier lengths, in hex characters.
pub const MIN_ID_LENGTH: usize = 8;
pub const MAX_ID_LENGTH: usize = 64;

/// Blob path of the share pointer named `reference`.
pub fn shared_path(reference: &str) -> String {
    format!("{}/{}", SHARED_DIR, reference)
}

/// Per-vault settings, stored encrypted beside the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Author name on every commit.
    pub commit_author_name: String,
    /// Author email on every commit.
    pub commit_author_email: String,
    /// Prefix of every commit message: `"<prefix>: <action>"`.
    pub commit_message_prefix: String,
    /// Length of generated storage ids, in hex characters.
    pub file_id_length: usize,
    /// Length of generated share references, in hex characters.
    pub share_id_length: usize,
    /// Argon2id parameters used when encrypting under a password.
    pub kdf_params: KdfParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            commit_author_name: "Nexus".to_string(),
            commit_author_email: "nexus@cli.io".to_string(),
            commit_message_prefix: "Nexus".to_string(),
            file_id_length: 16,
            share_id_length: 16,
            kdf_params: KdfParams::default(),
        }
    }
}

impl Settings {
    /// Check the settings can produce valid commits and identifiers.
    ///
    /// # Errors
    /// - `Validation` if an id length is odd or outside 8..=64, the author
    ///   is blank, or the KDF parameters are out of bounds
    pub fn validate(&self) -> Result<()> {
        for (name, len) in [
            ("file_id_length", self.file_id_length),
            ("share_id_length", self.share_id_length),
        ] {
            if len % 2 != 0 || !(MIN_ID_LENGTH..=MAX_ID_LENGTH).contains(&len) {
                return Err(Error::Validation(format!(
                    "{} must be an even number between {} and {}, got {}",
                    name, MIN_ID_LENGTH, MAX_ID_LENGTH, len
                )));
            }
        }
        if self.commit_author_name.trim().is_empty() || self.commit_author_email.trim().is_empty()
        {
            return Err(Error::Validation(
                "Commit author name and email must be set".to_string(),
            ));
        }
        if !self.kdf_params.is_within_bounds() {
            return Err(Error::Validation(
                "KDF parameters are out of bounds".to_string(),
            ));
        }
        Ok(())
    }

    /// Random bytes behind a storage id.
    pub fn file_id_bytes(&self) -> usize {
        self.file_id_length / 2
    }

    /// Random bytes behind a share reference.
    pub fn share_id_bytes(&self) -> usize {
        self.share_id_length / 2
    }

    /// Commit metadata for `action`, e.g. `"Updated docs/a.txt"`.
    pub fn commit(&self, action: &str) -> CommitInfo {
        CommitInfo::new(
            format!("{}: {}", self.commit_message_prefix, action),
            &self.commit_author_name,
            &self.commit_author_email,
        )
    }

    /// Serialize and encrypt under `password`.
    pub fn seal(&self, password: &[u8]) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        derive_and_encrypt(&json, password, &self.kdf_params)
    }

    /// Decrypt and deserialize settings sealed by [`Settings::seal`].
    pub fn open(sealed: &[u8], password: &[u8]) -> Result<Self> {
        let json = decrypt(sealed, password)?;
        let settings: Self =
            serde_json::from_slice(&json).map_err(|e| Error::Serialization(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Machine-local client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote address template; `{owner}` is replaced by the vault owner.
    pub remote_template: String,
    /// Raw-content URL template for single-file fetches. When unset,
    /// fetches go through git.
    pub raw_url_template: Option<String>,
    /// Branch holding the vault.
    pub branch: String,
    /// Directory for the session cache.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_template: DEFAULT_REMOTE_TEMPLATE.to_string(),
            raw_url_template: Some(DEFAULT_RAW_TEMPLATE.to_string()),
            branch: DEFAULT_BRANCH.to_string(),
            cache_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Serialization(format!("Invalid config {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("nexus").join("config.json"))
    }

    /// Directory for the session cache.
    ///
    /// # Errors
    /// - `Validation` if none is configured and the platform has no cache
    ///   directory
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::cache_dir()
                .map(|d| d.join("nexus"))
                .ok_or_else(|| Error::Validation("No cache directory available".to_string())),
        }
    }

    pub fn resolver(&self) -> RemoteResolver {
        RemoteResolver::new(self.remote_template.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.file_id_bytes(), 8);
        assert_eq!(settings.commit("Updated a.txt").message, "Nexus: Updated a.txt");
    }

    #[test]
    fn test_settings_validation() {
        let odd = Settings {
            file_id_length: 15,
            ..Settings::default()
        };
        assert!(matches!(odd.validate(), Err(Error::Validation(_))));

        let long = Settings {
            share_id_length: 128,
            ..Settings::default()
        };
        assert!(long.validate().is_err());

        let anonymous = Settings {
            commit_author_name: " ".to_string(),
            ..Settings::default()
        };
        assert!(anonymous.validate().is_err());
    }

    #[test]
    fn test_settings_seal_open() {
        let settings = Settings {
            file_id_length: 32,
            kdf_params: KdfParams {
                memory_cost: 64,
                time_cost: 1,
                parallelism: 1,
            },
            ..Settings::default()
        };
        let sealed = settings.seal(b"pw").unwrap();
        assert_eq!(Settings::open(&sealed, b"pw").unwrap(), settings);
        assert!(Settings::open(&sealed, b"nope").is_err());
    }

    #[test]
    fn test_settings_missing_fields_default() {
        let settings: Settings = serde_json::from_str(r#"{"file_id_length": 24}"#).unwrap();
        assert_eq!(settings.file_id_length, 24);
        assert_eq!(settings.commit_author_name, "Nexus");
    }

    #[test]
    fn test_client_config_load() {
        let dir = tempdir().unwrap();
        let missing = ClientConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(missing, ClientConfig::default());

        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"remote_template": "/srv/{owner}.git", "raw_url_template": null}"#,
        )
        .unwrap();
        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.remote_template, "/srv/{owner}.git");
        assert_eq!(config.raw_url_template, None);
        assert_eq!(config.branch, "master");

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            ClientConfig::load(&path),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_shared_path() {
        assert_eq!(shared_path("ab12"), "shared/ab12");
    }
}
