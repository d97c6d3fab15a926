//! Configuration for the remote record store, exports and browser calls
//!
//! Every setting has a default matching the public BrowserBytes service, so
//! `BytesConfig::default()` works out of the box. `BytesConfig::from_env()`
//! layers `BROWSERBYTES_*` environment variables over the defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::codec::ExportFormat;
use crate::{BrowserBytesError, Result};

pub const DEFAULT_REMOTE_URL: &str = "https://wtf.pockethost.io";
pub const DEFAULT_COLLECTION: &str = "browserBytes";
pub const HAVELOC_COLLECTION: &str = "havelocCreds";
pub const DEFAULT_PASSPHRASE_URL: &str = "https://makemeapassword.ligos.net/api/v1/passphrase/json";
pub const DEFAULT_FILE_PREFIX: &str = "browserbytes";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_REMOTE_URL: &str = "BROWSERBYTES_REMOTE_URL";
pub const ENV_COLLECTION: &str = "BROWSERBYTES_COLLECTION";
pub const ENV_PASSPHRASE_URL: &str = "BROWSERBYTES_PASSPHRASE_URL";
pub const ENV_REQUEST_TIMEOUT: &str = "BROWSERBYTES_REQUEST_TIMEOUT_SECS";
pub const ENV_BROWSER_TIMEOUT: &str = "BROWSERBYTES_BROWSER_TIMEOUT_SECS";
pub const ENV_FILE_PREFIX: &str = "BROWSERBYTES_FILE_PREFIX";
pub const ENV_SESSION_STORAGE: &str = "BROWSERBYTES_SESSION_STORAGE";

/// Remote record store and passphrase service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the record store
    pub base_url: String,
    /// Collection holding the records
    pub collection: String,
    /// Endpoint returning `{"pws": [...]}`
    pub passphrase_url: String,
    /// Timeout for each HTTP request, in seconds
    pub request_timeout_secs: u64,
}

impl RemoteConfig {
    /// Settings for the default `browserBytes` collection
    pub fn browser_bytes() -> Self {
        RemoteConfig {
            base_url: DEFAULT_REMOTE_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            passphrase_url: DEFAULT_PASSPHRASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Settings for the `havelocCreds` collection
    pub fn haveloc() -> Self {
        Self::browser_bytes().with_collection(HAVELOC_COLLECTION)
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (what, value) in [
            ("record store URL", &self.base_url),
            ("passphrase service URL", &self.passphrase_url),
        ] {
            let url = url::Url::parse(value).map_err(|e| {
                BrowserBytesError::config(format!("Invalid {what} '{value}': {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(BrowserBytesError::config(format!(
                    "{what} must be http or https, got '{value}'"
                )));
            }
        }

        let collection = self.collection.as_str();
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(BrowserBytesError::config(format!(
                "Invalid collection name '{collection}'"
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(BrowserBytesError::config(
                "Request timeout must be at least one second",
            ));
        }
        Ok(())
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::browser_bytes()
    }
}

/// File export settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Prefix of generated export file names
    pub file_prefix: String,
    /// Format used when none is requested
    pub format: ExportFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            format: ExportFormat::Json,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytesConfig {
    pub remote: RemoteConfig,
    pub export: ExportConfig,
    /// Deadline for each browser storage or cookie call, in seconds
    pub browser_timeout_secs: u64,
    /// Capture `sessionStorage` alongside `localStorage`
    pub include_session_storage: bool,
}

impl BytesConfig {
    /// Default configuration for the `browserBytes` collection
    pub fn browser_bytes() -> Self {
        BytesConfig {
            remote: RemoteConfig::browser_bytes(),
            export: ExportConfig::default(),
            browser_timeout_secs: DEFAULT_TIMEOUT_SECS,
            include_session_storage: false,
        }
    }

    /// Default configuration for the `havelocCreds` collection
    pub fn haveloc() -> Self {
        BytesConfig {
            remote: RemoteConfig::haveloc(),
            ..Self::browser_bytes()
        }
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_timeout_secs)
    }

    /// Read `BROWSERBYTES_*` environment variables over the defaults
    ///
    /// # Errors
    /// * `BrowserBytesError::Config` - a variable is set to an unusable value
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BytesConfig::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::browser_bytes();

        if let Some(url) = lookup(ENV_REMOTE_URL) {
            config.remote.base_url = url;
        }
        if let Some(collection) = lookup(ENV_COLLECTION) {
            config.remote.collection = collection;
        }
        if let Some(url) = lookup(ENV_PASSPHRASE_URL) {
            config.remote.passphrase_url = url;
        }
        if let Some(secs) = lookup(ENV_REQUEST_TIMEOUT) {
            config.remote.request_timeout_secs = parse_secs(ENV_REQUEST_TIMEOUT, &secs)?;
        }
        if let Some(secs) = lookup(ENV_BROWSER_TIMEOUT) {
            config.browser_timeout_secs = parse_secs(ENV_BROWSER_TIMEOUT, &secs)?;
        }
        if let Some(prefix) = lookup(ENV_FILE_PREFIX) {
            config.export.file_prefix = prefix;
        }
        if let Some(flag) = lookup(ENV_SESSION_STORAGE) {
            config.include_session_storage = parse_flag(ENV_SESSION_STORAGE, &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.remote.validate()?;

        let prefix = &self.export.file_prefix;
        if prefix.trim().is_empty() || prefix.contains(['/', '\\']) {
            return Err(BrowserBytesError::config(format!(
                "Invalid export file prefix '{prefix}'"
            )));
        }
        if self.browser_timeout_secs == 0 {
            return Err(BrowserBytesError::config(
                "Browser timeout must be at least one second",
            ));
        }
        Ok(())
    }
}

impl Default for BytesConfig {
    fn default() -> Self {
        Self::browser_bytes()
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| BrowserBytesError::config(format!("{key} must be a number of seconds, got '{value}'")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(BrowserBytesError::config(format!(
            "{key} must be true or false, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BytesConfig::default();
        assert_eq!(config.remote.base_url, "https://wtf.pockethost.io");
        assert_eq!(config.remote.collection, "browserBytes");
        assert_eq!(config.export.file_prefix, "browserbytes");
        assert_eq!(config.export.format, ExportFormat::Json);
        assert_eq!(config.browser_timeout(), Duration::from_secs(30));
        assert!(!config.include_session_storage);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_haveloc_preset() {
        let config = BytesConfig::haveloc();
        assert_eq!(config.remote.collection, "havelocCreds");
        assert_eq!(config.remote.base_url, DEFAULT_REMOTE_URL);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = BytesConfig::from_lookup(lookup(&[
            (ENV_REMOTE_URL, "http://localhost:8090"),
            (ENV_COLLECTION, "testRecords"),
            (ENV_REQUEST_TIMEOUT, "5"),
            (ENV_SESSION_STORAGE, "yes"),
        ]))
        .unwrap();

        assert_eq!(config.remote.base_url, "http://localhost:8090");
        assert_eq!(config.remote.collection, "testRecords");
        assert_eq!(config.remote.request_timeout(), Duration::from_secs(5));
        assert!(config.include_session_storage);
        assert_eq!(config.remote.passphrase_url, DEFAULT_PASSPHRASE_URL);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        for vars in [
            vec![(ENV_REQUEST_TIMEOUT, "soon")],
            vec![(ENV_BROWSER_TIMEOUT, "0")],
            vec![(ENV_SESSION_STORAGE, "maybe")],
            vec![(ENV_REMOTE_URL, "ftp://example.com")],
            vec![(ENV_COLLECTION, "bad name")],
            vec![(ENV_FILE_PREFIX, "a/b")],
        ] {
            let result = BytesConfig::from_lookup(lookup(&vars));
            assert!(
                matches!(result, Err(BrowserBytesError::Config(_))),
                "accepted {vars:?}"
            );
        }
    }

    #[test]
    fn test_config_serde() {
        let config = BytesConfig::haveloc();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"format\":\"json\""));
        let back: BytesConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
