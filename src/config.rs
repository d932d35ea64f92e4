use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MirrorError, Result};
use crate::github::ListingStrategy;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// The only key a config file must carry
pub const API_KEY_FIELD: &str = "github_api_key";

/// Runtime configuration, loaded once at startup and passed by reference
#[derive(Deserialize, Clone)]
pub struct Config {
    /// Personal access token used for every API call
    pub github_api_key: String,

    /// Root directory that receives one working copy per repository
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Which endpoint is used to enumerate repositories
    #[serde(default)]
    pub listing: ListingStrategy,

    /// GitHub REST API root
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Connect and read timeout for API calls, in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Upper bound for mirroring a single repository, in seconds
    #[serde(default = "default_git_timeout")]
    pub git_timeout: u64,
}

// Default value functions
fn default_destination() -> String {
    "github".to_string()
}
fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_http_timeout() -> u64 {
    30
}
fn default_git_timeout() -> u64 {
    300
}

impl Config {
    /// Build a config around a token, every other setting at its default
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            github_api_key: token.into(),
            destination: default_destination(),
            listing: ListingStrategy::default(),
            api_base_url: default_api_base_url(),
            http_timeout: default_http_timeout(),
            git_timeout: default_git_timeout(),
        }
    }

    /// Load `config.json` from the current directory
    pub fn load_default() -> Result<Self> {
        Self::load(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MirrorError::Config(format!(
                "could not find {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Config(format!("could not read {}: {}", path.display(), e))
        })?;

        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            MirrorError::Config(format!("could not parse {}: {}", path.display(), e))
        })?;

        // Report a missing token by name before serde gets a chance to
        // complain about it in more general terms.
        match value.get(API_KEY_FIELD) {
            None => {
                return Err(MirrorError::Config(format!(
                    "could not find key {} in {}",
                    API_KEY_FIELD,
                    path.display()
                )))
            }
            Some(serde_json::Value::String(token)) if token.trim().is_empty() => {
                return Err(MirrorError::Config(format!(
                    "key {} in {} is empty",
                    API_KEY_FIELD,
                    path.display()
                )))
            }
            Some(_) => {}
        }

        serde_json::from_value(value).map_err(|e| {
            MirrorError::Config(format!("invalid settings in {}: {}", path.display(), e))
        })
    }

    /// Destination root with `~` and environment variables expanded
    pub fn destination_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.destination).map_err(|e| {
            MirrorError::Config(format!(
                "failed to expand destination {}: {}",
                self.destination, e
            ))
        })?;

        Ok(PathBuf::from(expanded.as_ref()))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout)
    }
}

// Keeps the token out of logs and panic messages.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("github_api_key", &"<redacted>")
            .field("destination", &self.destination)
            .field("listing", &self.listing)
            .field("api_base_url", &self.api_base_url)
            .field("http_timeout", &self.http_timeout)
            .field("git_timeout", &self.git_timeout)
            .finish()
    }
}
