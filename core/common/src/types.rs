//! Common types used throughout nexusvault.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Owner of a vault: the backend account or namespace the vault lives under.
///
/// One vault exists per owner, and the remote locator is derived from it,
/// so the name must be usable inside a URL path and inside share strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VaultOwner(String);

impl VaultOwner {
    /// Create a new VaultOwner from a string.
    ///
    /// # Errors
    /// - Returns error if the name is empty
    /// - Returns error if the name contains `:`, `/`, `\` or whitespace
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::Validation(
                "Vault owner cannot be empty".to_string(),
            ));
        }
        if name
            .chars()
            .any(|c| c == ':' || c == '/' || c == '\\' || c.is_whitespace())
        {
            return Err(crate::Error::Validation(format!(
                "Vault owner '{}' contains an invalid character",
                name
            )));
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaultOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A virtual path within a vault, independent of underlying storage.
///
/// Paths are `/`-delimited segments relative to the vault root. The string
/// form carries no leading slash (`docs/a.txt`); the root renders as `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaultPath {
    components: Vec<String>,
}

impl VaultPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Errors
    /// - Returns error if any component is empty, `.` or `..`
    /// - Returns error if any component contains a separator
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            Self::check_component(comp)?;
        }
        Ok(Self { components })
    }

    fn check_component(comp: &str) -> crate::Result<()> {
        if comp.is_empty() {
            return Err(crate::Error::Validation(
                "Path component cannot be empty".to_string(),
            ));
        }
        if comp == "." || comp == ".." {
            return Err(crate::Error::Validation(format!(
                "Path component '{}' is not allowed",
                comp
            )));
        }
        if comp.contains('/') || comp.contains('\\') {
            return Err(crate::Error::Validation(
                "Path component cannot contain separators".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a path string into VaultPath.
    ///
    /// Uses '/' as separator; leading and trailing slashes are ignored.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = path.split('/').map(String::from).collect();
        Self::from_components(components)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Last component; `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Child of this path named `child`.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        Self::check_component(child)?;
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Whether `self` equals `ancestor` or lies below it.
    pub fn starts_with(&self, ancestor: &VaultPath) -> bool {
        self.components.starts_with(&ancestor.components)
    }

    /// Components of `self` below `ancestor`, if `self` lies under it.
    pub fn strip_prefix(&self, ancestor: &VaultPath) -> Option<&[String]> {
        if self.starts_with(ancestor) {
            Some(&self.components[ancestor.components.len()..])
        } else {
            None
        }
    }

    /// Convert to the relative string form used as an index key.
    pub fn to_string_path(&self) -> String {
        self.components.join("/")
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.to_string_path())
        }
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SensitiveBytes {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for SensitiveBytes {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_owner_creation() {
        let owner = VaultOwner::new("alice").unwrap();
        assert_eq!(owner.as_str(), "alice");
    }

    #[test]
    fn test_vault_owner_rejects_separators() {
        assert!(VaultOwner::new("").is_err());
        assert!(VaultOwner::new("al:ice").is_err());
        assert!(VaultOwner::new("al/ice").is_err());
        assert!(VaultOwner::new("al ice").is_err());
    }

    #[test]
    fn test_vault_path_forms() {
        let root = VaultPath::root();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");
        assert_eq!(root.name(), None);
        for input in ["", "/", "//"] {
            assert_eq!(VaultPath::parse(input).unwrap(), root);
        }

        let path = VaultPath::parse("/docs/2024/report.pdf/").unwrap();
        assert_eq!(path.components(), &["docs", "2024", "report.pdf"]);
        assert_eq!(path.to_string(), "docs/2024/report.pdf");
        assert_eq!(path.name(), Some("report.pdf"));
        assert_eq!(
            root.join("docs").unwrap().join("2024").unwrap().join("report.pdf").unwrap(),
            path
        );
    }

    #[test]
    fn test_vault_path_rejects_unsafe_components() {
        for input in ["a/../b", "a//b", "./a", ".."] {
            assert!(VaultPath::parse(input).is_err(), "accepted {:?}", input);
        }
        assert!(VaultPath::root().join("a/b").is_err());
        assert!(VaultPath::from_components(vec!["a\\b".to_string()]).is_err());
    }

    #[test]
    fn test_vault_path_prefix() {
        let dir = VaultPath::parse("docs").unwrap();
        let file = VaultPath::parse("docs/sub/a.txt").unwrap();
        assert!(file.starts_with(&dir));
        assert!(file.starts_with(&VaultPath::root()));
        assert_eq!(
            file.strip_prefix(&dir).unwrap(),
            &["sub".to_string(), "a.txt".to_string()]
        );
        assert!(dir.strip_prefix(&file).is_none());
    }

    #[test]
    fn test_sensitive_bytes_debug_redacted() {
        let secret = SensitiveBytes::from("hunter2");
        assert_eq!(format!("{:?}", secret), "SensitiveBytes([REDACTED; 7 bytes])");
    }

    proptest::proptest! {
        #[test]
        fn prop_path_string_roundtrip(
            components in proptest::collection::vec("[a-zA-Z0-9_-][a-zA-Z0-9._ -]{0,11}", 0..6)
        ) {
            let path = VaultPath::from_components(components).unwrap();
            let reparsed = VaultPath::parse(&path.to_string_path()).unwrap();
            proptest::prop_assert_eq!(reparsed, path);
        }
    }
}
