//! Configuration access
//!
//! The PKI core only reads string values. Configuration loading and
//! layering belong to the host application; [`MapConfiguration`] is a small
//! in-memory implementation that can also be loaded from a flat JSON file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PkiError, Result};

/// Primary key for the upstream certificate repository directory
pub const UPSTREAM_CERT_REPO: &str = "pki.crypto.upstream_cert_repo";
/// Legacy key for the upstream certificate repository directory
pub const LEGACY_UPSTREAM_CERT_REPO: &str = "pki.ca_cert_upstream";

/// Comma separated list of scheme names
pub const CRYPTO_SCHEMES: &str = "pki.crypto.schemes";
/// Name of the default scheme
pub const DEFAULT_CRYPTO_SCHEME: &str = "pki.crypto.default_scheme";

pub const SCHEME_CERT: &str = "cert";
pub const SCHEME_KEY: &str = "key";
pub const SCHEME_KEY_PASSWORD: &str = "key_password";
pub const SCHEME_SIGNATURE_ALGORITHM: &str = "signature_algorithm";
pub const SCHEME_KEY_ALGORITHM: &str = "key_algorithm";
pub const SCHEME_KEY_SIZE: &str = "key_size";

/// Pre-scheme CA settings, used by the `legacy` scheme
pub const LEGACY_CA_CERT: &str = "pki.ca_cert";
pub const LEGACY_CA_KEY: &str = "pki.ca_key";
pub const LEGACY_CA_KEY_PASSWORD: &str = "pki.ca_key_password";

/// `pki.crypto.scheme.<name>.`
pub fn scheme_prefix(name: &str) -> String {
    format!("pki.crypto.scheme.{}.", name)
}

/// `pki.crypto.scheme.<name>.<field>`
pub fn scheme_key(name: &str, field: &str) -> String {
    format!("{}{}", scheme_prefix(name), field)
}

/// Read-only string configuration source
pub trait Configuration: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    /// The value for `key` with surrounding whitespace removed, or `None` when absent or blank
    fn get_non_blank(&self, key: &str) -> Option<String> {
        self.get_string(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// In-memory configuration
#[derive(Debug, Clone, Default)]
pub struct MapConfiguration {
    values: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlatValue {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl FlatValue {
    fn into_string(self) -> String {
        match self {
            FlatValue::String(value) => value,
            FlatValue::Number(value) => value.to_string(),
            FlatValue::Bool(value) => value.to_string(),
        }
    }
}

impl MapConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Parse a flat JSON object of string, number or boolean values
    pub fn from_json_str(json: &str) -> Result<Self> {
        let values: HashMap<String, FlatValue> = serde_json::from_str(json).map_err(|e| {
            PkiError::ConfigurationError(format!("Invalid configuration JSON: {}", e))
        })?;

        Ok(Self {
            values: values
                .into_iter()
                .map(|(key, value)| (key, value.into_string()))
                .collect(),
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            PkiError::ConfigurationError(format!(
                "Unable to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }
}

impl Configuration for MapConfiguration {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Resolve the upstream certificate repository path, preferring the primary key
pub fn resolve_upstream_repository(config: &dyn Configuration) -> Result<PathBuf> {
    config
        .get_non_blank(UPSTREAM_CERT_REPO)
        .or_else(|| config.get_non_blank(LEGACY_UPSTREAM_CERT_REPO))
        .map(PathBuf::from)
        .ok_or_else(|| {
            PkiError::ConfigurationError(format!(
                "No upstream certificate repository configured; set {} or {}",
                UPSTREAM_CERT_REPO, LEGACY_UPSTREAM_CERT_REPO
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_keys() {
        assert_eq!(scheme_key("rsa", SCHEME_CERT), "pki.crypto.scheme.rsa.cert");
        assert_eq!(scheme_prefix("ec-p256"), "pki.crypto.scheme.ec-p256.");
    }

    #[test]
    fn test_upstream_repository_prefers_primary_key() {
        let config = MapConfiguration::from_pairs([
            (UPSTREAM_CERT_REPO, "/etc/pki/upstream"),
            (LEGACY_UPSTREAM_CERT_REPO, "/etc/legacy/upstream"),
        ]);
        assert_eq!(
            resolve_upstream_repository(&config).unwrap(),
            PathBuf::from("/etc/pki/upstream")
        );
    }

    #[test]
    fn test_upstream_repository_falls_back_to_legacy_key() {
        let config = MapConfiguration::from_pairs([
            (UPSTREAM_CERT_REPO, "   "),
            (LEGACY_UPSTREAM_CERT_REPO, "/etc/legacy/upstream"),
        ]);
        assert_eq!(
            resolve_upstream_repository(&config).unwrap(),
            PathBuf::from("/etc/legacy/upstream")
        );
    }

    #[test]
    fn test_upstream_repository_missing() {
        let config = MapConfiguration::new();
        assert!(matches!(
            resolve_upstream_repository(&config),
            Err(PkiError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_json_configuration() {
        let config = MapConfiguration::from_json_str(
            r#"{
                "pki.crypto.schemes": "rsa, ec",
                "pki.crypto.scheme.rsa.key_size": 4096,
                "pki.debug": true
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.get_string(CRYPTO_SCHEMES).as_deref(),
            Some("rsa, ec")
        );
        assert_eq!(
            config.get_string("pki.crypto.scheme.rsa.key_size").as_deref(),
            Some("4096")
        );
        assert_eq!(config.get_string("pki.debug").as_deref(), Some("true"));
        assert_eq!(config.get_string("missing"), None);
    }

    #[test]
    fn test_json_configuration_rejects_nested_values() {
        let result = MapConfiguration::from_json_str(r#"{"pki": {"ca_cert": "/tmp/ca.pem"}}"#);
        assert!(matches!(result, Err(PkiError::ConfigurationError(_))));
    }
}
