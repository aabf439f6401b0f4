//! Vault session management.
//!
//! A [`Session`] is the authenticated context every vault operation runs
//! in: owner, password, signing key, settings and the decrypted index. It
//! is built by [`Session::setup`] or [`Session::connect`] (or restored from
//! a [`SessionCache`]) and threaded explicitly into each operation. Secrets
//! are scrubbed when the session is dropped.
//!
//! The session also remembers the remote commit its index was read from.
//! Every push names that commit as its base, so a session whose index has
//! fallen behind the remote gets `PushRejected` instead of overwriting the
//! newer index.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::cache::SessionCache;
use crate::config::{Settings, INDEX_PATH, KEY_PATH, SETTINGS_PATH};
use crate::index::VaultIndex;
use nexusvault_common::{Error, Result, SensitiveBytes, VaultOwner};
use nexusvault_crypto::{decrypt, derive_and_encrypt};
use nexusvault_storage::{BlobStore, Credentials, RemoteLocator, RemoteResolver};

/// Authenticated vault context.
pub struct Session {
    owner: VaultOwner,
    password: SensitiveBytes,
    signing_key: SensitiveBytes,
    settings: Settings,
    index: VaultIndex,
    head: Option<String>,
    cache: Option<SessionCache>,
}

impl Session {
    pub(crate) fn from_parts(
        owner: VaultOwner,
        password: SensitiveBytes,
        signing_key: SensitiveBytes,
        settings: Settings,
        index: VaultIndex,
    ) -> Self {
        Self {
            owner,
            password,
            signing_key,
            settings,
            index,
            head: None,
            cache: None,
        }
    }

    /// Initialise a new vault for `owner`.
    ///
    /// # Preconditions
    /// - `owner`'s remote exists and accepts `signing_key`
    ///
    /// # Postconditions
    /// - One commit holds the encrypted signing key, the encrypted settings
    ///   and an empty encrypted index
    /// - Returns a session over the empty vault
    ///
    /// # Errors
    /// - `Conflict` if the vault already has an index
    /// - `Validation` for an empty password or invalid settings
    /// - Backend errors from the fetch or push
    pub async fn setup(
        store: &dyn BlobStore,
        resolver: &RemoteResolver,
        owner: VaultOwner,
        password: SensitiveBytes,
        signing_key: SensitiveBytes,
        settings: Settings,
    ) -> Result<Self> {
        settings.validate()?;
        if password.is_empty() {
            return Err(Error::Validation("Password cannot be empty".to_string()));
        }

        let existing = store.fetch_versioned(&owner, INDEX_PATH).await?;
        if existing.content.is_some() {
            return Err(Error::Conflict(format!(
                "A vault already exists for {}",
                owner
            )));
        }

        let index = VaultIndex::new();
        let mut blobs = BTreeMap::new();
        blobs.insert(
            KEY_PATH.to_string(),
            derive_and_encrypt(
                signing_key.as_bytes(),
                password.as_bytes(),
                &settings.kdf_params,
            )?,
        );
        blobs.insert(
            SETTINGS_PATH.to_string(),
            settings.seal(password.as_bytes())?,
        );
        blobs.insert(
            INDEX_PATH.to_string(),
            index.seal(password.as_bytes(), &settings.kdf_params)?,
        );

        let mut session = Self::from_parts(owner, password, signing_key, settings, index);
        let outcome = store
            .push_atomic(
                &resolver.locate(&session.owner),
                &session.credentials(),
                existing.head.as_deref(),
                blobs,
                &session.settings.commit("Vault Setup"),
            )
            .await?;
        session.head = Some(outcome.commit);

        info!(owner = %session.owner, "vault initialised");
        Ok(session)
    }

    /// Authenticate against `owner`'s vault.
    ///
    /// The signing key is decrypted first to validate the password; the
    /// settings and the index follow. The head commit the index was read
    /// from becomes the base of the session's next push.
    ///
    /// # Errors
    /// - `NotFound` if the vault was never set up
    /// - `Authentication` if the password does not decrypt the vault
    /// - Backend errors from the fetches
    pub async fn connect(
        store: &dyn BlobStore,
        owner: VaultOwner,
        password: SensitiveBytes,
    ) -> Result<Self> {
        let sealed_key = store.fetch_raw(&owner, KEY_PATH).await.map_err(|e| {
            if e.is_not_found() {
                Error::NotFound(format!("No vault initialised for {}", owner))
            } else {
                e
            }
        })?;
        let signing_key = decrypt(&sealed_key, password.as_bytes())
            .map(SensitiveBytes::new)
            .map_err(|_| Error::Authentication("Invalid vault password".to_string()))?;

        let settings = match store.fetch_raw(&owner, SETTINGS_PATH).await {
            Ok(sealed) => Settings::open(&sealed, password.as_bytes())?,
            Err(e) if e.is_not_found() => Settings::default(),
            Err(e) => return Err(e),
        };

        let versioned = store.fetch_versioned(&owner, INDEX_PATH).await?;
        let index = match &versioned.content {
            Some(sealed) => VaultIndex::open(sealed, password.as_bytes()).map_err(|e| match e {
                Error::DecryptionFailed => {
                    Error::Authentication("Vault index does not decrypt".to_string())
                }
                other => other,
            })?,
            None => {
                debug!(owner = %owner, "no index blob, starting empty");
                VaultIndex::new()
            }
        };

        info!(owner = %owner, files = index.statistics().files, "connected");
        let mut session = Self::from_parts(owner, password, signing_key, settings, index);
        session.head = versioned.head;
        Ok(session)
    }

    /// End the session, removing any persisted copy.
    ///
    /// Secrets are scrubbed as the session drops.
    pub fn disconnect(self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.clear()?;
        }
        info!(owner = %self.owner, "disconnected");
        Ok(())
    }

    /// Persist through `cache` after every successful mutation.
    pub fn attach_cache(&mut self, cache: SessionCache) {
        self.cache = Some(cache);
    }

    /// Write the session to its cache, if one is attached.
    pub fn persist(&self) -> Result<()> {
        match &self.cache {
            Some(cache) => cache.save(self),
            None => Ok(()),
        }
    }

    pub fn owner(&self) -> &VaultOwner {
        &self.owner
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &VaultIndex {
        &self.index
    }

    #[cfg(test)]
    pub(crate) fn index_mut(&mut self) -> &mut VaultIndex {
        &mut self.index
    }

    /// Remote commit the index was last read from or pushed as.
    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Adopt the index and head of an accepted push.
    pub(crate) fn advance(&mut self, index: VaultIndex, commit: String) {
        self.index = index;
        self.head = Some(commit);
    }

    pub(crate) fn set_head(&mut self, head: Option<String>) {
        self.head = head;
    }

    pub(crate) fn password(&self) -> &SensitiveBytes {
        &self.password
    }

    pub(crate) fn signing_key(&self) -> &SensitiveBytes {
        &self.signing_key
    }

    /// Credentials for pushing to this vault.
    pub fn credentials(&self) -> Credentials {
        Credentials::ssh(self.signing_key.clone())
    }

    /// Remote of this vault under `resolver`.
    pub fn remote(&self, resolver: &RemoteResolver) -> RemoteLocator {
        resolver.locate(&self.owner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("owner", &self.owner)
            .field("files", &self.index.statistics().files)
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}
