//! Single-file fetches over a raw-content HTTP endpoint.
//!
//! Hosted repositories usually serve the head of a branch as plain files,
//! which is far cheaper than any git transfer when only `.config/index` or
//! one blob is needed.

use reqwest::{Client, StatusCode};
use url::Url;

use nexusvault_common::{Error, Result, VaultOwner};

/// Default raw-content URL template.
pub const DEFAULT_RAW_TEMPLATE: &str =
    "https://raw.githubusercontent.com/{owner}/.nexus/{branch}/{path}";

/// Fetches one blob by URL template substitution.
///
/// Placeholders: `{owner}`, `{branch}` and `{path}`.
#[derive(Debug, Clone)]
pub struct RawHttpFetcher {
    http: Client,
    template: String,
    branch: String,
}

impl RawHttpFetcher {
    /// Create a fetcher for `template` on `branch`.
    ///
    /// # Errors
    /// - Returns `Network` if the HTTP client cannot be initialised
    pub fn new(template: impl Into<String>, branch: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("nexusvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            template: template.into(),
            branch: branch.into(),
        })
    }

    /// Build the URL for `path` in `owner`'s vault.
    ///
    /// # Errors
    /// - Returns `Validation` if the substituted template is not a URL
    pub fn url_for(&self, owner: &VaultOwner, path: &str) -> Result<Url> {
        let raw = self
            .template
            .replace("{owner}", owner.as_str())
            .replace("{branch}", &self.branch)
            .replace("{path}", path);
        Url::parse(&raw).map_err(|e| Error::Validation(format!("Invalid raw URL '{}': {}", raw, e)))
    }

    /// Fetch the blob at `path`.
    ///
    /// # Errors
    /// - `NotFound` on 404
    /// - `Authentication` on 401 or 403
    /// - `Network` for any other failure
    pub async fn fetch(&self, owner: &VaultOwner, path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(owner, path)?;

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("{} in vault of {}", path, owner)));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Authentication(format!(
                "Access to vault of {} denied ({})",
                owner, status
            )));
        }
        if !status.is_success() {
            return Err(Error::Network(format!("Fetch of {} failed: {}", url, status)));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::Network(format!("Failed to read response body: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        let fetcher = RawHttpFetcher::new(DEFAULT_RAW_TEMPLATE, "master").unwrap();
        let owner = VaultOwner::new("alice").unwrap();
        let url = fetcher.url_for(&owner, ".config/index").unwrap();
        assert_eq!(
            url.as_str(),
            "https://raw.githubusercontent.com/alice/.nexus/master/.config/index"
        );
    }

    #[test]
    fn test_invalid_template() {
        let fetcher = RawHttpFetcher::new("not a url {path}", "master").unwrap();
        let owner = VaultOwner::new("alice").unwrap();
        assert!(matches!(
            fetcher.url_for(&owner, "x"),
            Err(Error::Validation(_))
        ));
    }
}
