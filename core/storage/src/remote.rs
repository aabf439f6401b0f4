//! Remote addressing and authentication for the backing repository.

use nexusvault_common::{SensitiveBytes, VaultOwner};
use std::fmt;

/// Default template for deriving a remote from a vault owner.
pub const DEFAULT_REMOTE_TEMPLATE: &str = "git@github.com:{owner}/.nexus.git";

/// Address of one vault's backing repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLocator(String);

impl RemoteLocator {
    /// Wrap an already-resolved remote address.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives a [`RemoteLocator`] from a [`VaultOwner`].
///
/// One vault exists per owner; the locator is the template with every
/// `{owner}` placeholder replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResolver {
    template: String,
}

impl RemoteResolver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Resolve the remote for `owner`.
    pub fn locate(&self, owner: &VaultOwner) -> RemoteLocator {
        RemoteLocator(self.template.replace("{owner}", owner.as_str()))
    }
}

impl Default for RemoteResolver {
    fn default() -> Self {
        Self::new(DEFAULT_REMOTE_TEMPLATE)
    }
}

/// Credentials presented to the remote on push.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// No authentication (local paths, anonymous transports).
    None,
    /// SSH key authentication with an in-memory private key.
    SshKey {
        user: String,
        private_key: SensitiveBytes,
        passphrase: Option<SensitiveBytes>,
    },
}

impl Credentials {
    /// SSH credentials for the conventional `git` user.
    pub fn ssh(private_key: SensitiveBytes) -> Self {
        Credentials::SshKey {
            user: "git".to_string(),
            private_key,
            passphrase: None,
        }
    }

    /// The private key bytes, if any.
    pub fn private_key(&self) -> Option<&[u8]> {
        match self {
            Credentials::None => None,
            Credentials::SshKey { private_key, .. } => Some(private_key.as_bytes()),
        }
    }
}

/// Commit metadata for one push transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub message: String,
    pub author_name: String,
    pub author_email: String,
}

impl CommitInfo {
    pub fn new(
        message: impl Into<String>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            author_name: author_name.into(),
            author_email: author_email.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolver() {
        let owner = VaultOwner::new("alice").unwrap();
        let locator = RemoteResolver::default().locate(&owner);
        assert_eq!(locator.as_str(), "git@github.com:alice/.nexus.git");
    }

    #[test]
    fn test_custom_template() {
        let resolver = RemoteResolver::new("/srv/vaults/{owner}.git");
        let owner = VaultOwner::new("bob").unwrap();
        assert_eq!(resolver.locate(&owner).to_string(), "/srv/vaults/bob.git");
    }

    #[test]
    fn test_credentials_debug_hides_key() {
        let creds = Credentials::ssh(SensitiveBytes::from("-----BEGIN KEY-----"));
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("BEGIN"));
        assert_eq!(creds.private_key(), Some("-----BEGIN KEY-----".as_bytes()));
    }
}
