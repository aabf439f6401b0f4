//! Local encrypted session cache.
//!
//! Lets consecutive commands reuse one connection without re-fetching the
//! index or asking for the password again. Two private files are written:
//! `session.key` (a random cache key) and `session.bin` (the session
//! snapshot encrypted under that key).
//!
//! The cache is advisory. A session can always be rebuilt from the remote
//! and the password, so a missing or unreadable cache yields `None`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::config::Settings;
use crate::index::VaultIndex;
use crate::session::Session;
use nexusvault_common::{Error, Result, SensitiveBytes, VaultOwner};
use nexusvault_crypto::{decrypt_with_key, encrypt_with_key, FileKey};

/// Unix mode for the cache directory.
pub const PRIVATE_DIR_MODE: u32 = 0o700;
/// Unix mode for cache files.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

const KEY_FILE: &str = "session.key";
const STATE_FILE: &str = "session.bin";

#[derive(Serialize, Deserialize)]
struct Snapshot {
    owner: String,
    password: String,
    signing_key: String,
    settings: Settings,
    index: VaultIndex,
    #[serde(default)]
    head: Option<String>,
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.password.zeroize();
        self.signing_key.zeroize();
    }
}

/// On-disk session cache rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCache {
    dir: PathBuf,
}

impl SessionCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Persist `session`, replacing any previous snapshot.
    ///
    /// A fresh cache key is generated on every save.
    pub fn save(&self, session: &Session) -> Result<()> {
        let snapshot = Snapshot {
            owner: session.owner().to_string(),
            password: hex::encode(session.password().as_bytes()),
            signing_key: hex::encode(session.signing_key().as_bytes()),
            settings: session.settings().clone(),
            index: session.index().clone(),
            head: session.head().map(str::to_string),
        };
        let mut json =
            serde_json::to_vec(&snapshot).map_err(|e| Error::Serialization(e.to_string()))?;
        let key = FileKey::generate();
        let sealed = encrypt_with_key(&json, &key);
        json.zeroize();
        let sealed = sealed?;

        ensure_private_dir(&self.dir)?;
        write_private_file_atomic(&self.key_path(), key.as_bytes())?;
        write_private_file_atomic(&self.state_path(), &sealed)?;
        debug!(dir = %self.dir.display(), "session cached");
        Ok(())
    }

    /// Restore the cached session, if there is a usable one.
    ///
    /// Corrupt state is discarded with a warning rather than reported.
    pub fn load(&self) -> Result<Option<Session>> {
        let (key_bytes, sealed) = match (fs::read(self.key_path()), fs::read(self.state_path())) {
            (Ok(key), Ok(state)) => (SensitiveBytes::new(key), state),
            (Err(e), _) | (_, Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None);
            }
            (Err(e), _) | (_, Err(e)) => return Err(e.into()),
        };

        match Self::restore(&key_bytes, &sealed) {
            Ok(mut session) => {
                session.attach_cache(self.clone());
                Ok(Some(session))
            }
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "discarding unreadable session cache");
                self.clear()?;
                Ok(None)
            }
        }
    }

    fn restore(key_bytes: &SensitiveBytes, sealed: &[u8]) -> Result<Session> {
        let key = FileKey::from_slice(key_bytes.as_bytes())?;
        let mut json = decrypt_with_key(sealed, &key)?;
        let parsed = serde_json::from_slice::<Snapshot>(&json);
        json.zeroize();
        let snapshot = parsed.map_err(|e| Error::Serialization(e.to_string()))?;

        let password = hex::decode(&snapshot.password)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let signing_key = hex::decode(&snapshot.signing_key)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let mut session = Session::from_parts(
            VaultOwner::new(snapshot.owner.clone())?,
            SensitiveBytes::new(password),
            SensitiveBytes::new(signing_key),
            snapshot.settings.clone(),
            snapshot.index.clone(),
        );
        session.set_head(snapshot.head.clone());
        Ok(session)
    }

    /// Remove both cache files. Missing files are not an error.
    pub fn clear(&self) -> Result<()> {
        for path in [self.state_path(), self.key_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn ensure_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    set_permissions(path, PRIVATE_DIR_MODE)
}

/// Write via a uniquely named sibling and rename over the target, so a
/// reader never sees a partial file.
fn write_private_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("tmp");
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    fs::write(&temp_path, bytes)?;
    set_permissions(&temp_path, PRIVATE_FILE_MODE)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::owner;
    use nexusvault_common::VaultPath;
    use tempfile::tempdir;

    fn session() -> Session {
        let mut index = VaultIndex::new();
        index
            .add_file(&VaultPath::parse("docs/a.txt").unwrap(), "0011", "aa")
            .unwrap();
        let mut session = Session::from_parts(
            owner("alice"),
            "pw".into(),
            "key".into(),
            Settings::default(),
            index,
        );
        session.set_head(Some("3f2a".to_string()));
        session
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("nexus"));
        cache.save(&session()).unwrap();

        let restored = cache.load().unwrap().unwrap();
        assert_eq!(restored.owner().as_str(), "alice");
        assert_eq!(restored.password().as_bytes(), b"pw");
        assert_eq!(restored.signing_key().as_bytes(), b"key");
        assert_eq!(restored.index(), session().index());
        assert_eq!(restored.head(), Some("3f2a"));
    }

    #[test]
    fn test_load_absent_is_none() {
        let dir = tempdir().unwrap();
        let cache = SessionCache::new(dir.path());
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_cache_discarded() {
        let dir = tempdir().unwrap();
        let cache = SessionCache::new(dir.path());
        cache.save(&session()).unwrap();
        fs::write(dir.path().join(STATE_FILE), b"garbage").unwrap();

        assert!(cache.load().unwrap().is_none());
        assert!(!dir.path().join(KEY_FILE).exists());
        assert!(!dir.path().join(STATE_FILE).exists());
    }

    #[test]
    fn test_state_is_not_plaintext() {
        let dir = tempdir().unwrap();
        let cache = SessionCache::new(dir.path());
        cache.save(&session()).unwrap();
        let state = fs::read(dir.path().join(STATE_FILE)).unwrap();
        let hay = String::from_utf8_lossy(&state);
        assert!(!hay.contains("docs"));
        assert!(!hay.contains("alice"));
    }

    #[cfg(unix)]
    #[test]
    fn test_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("c"));
        cache.save(&session()).unwrap();
        for name in [KEY_FILE, STATE_FILE] {
            let mode = fs::metadata(dir.path().join("c").join(name))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, PRIVATE_FILE_MODE);
        }
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let cache = SessionCache::new(dir.path());
        cache.save(&session()).unwrap();
        cache.clear().unwrap();
        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
    }
}
