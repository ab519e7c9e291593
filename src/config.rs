//! Configuration loading and persistence.
//!
//! Handles reading and writing the classline configuration file.
//! Sensitive tokens are stored in the OS keyring via the credentials module.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

use crate::credentials::Credentials;
use crate::role::Role;

/// Configuration for the classline client.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// URL of the Classline backend.
    pub server_url: String,
    /// Auth token - NOT serialized to disk (stored in keyring).
    #[serde(skip)]
    pub token: String,
    /// Maximum number of notifications requested per fetch.
    pub fetch_limit: usize,
    /// Role reported by the backend at login. Drives the single
    /// role-dispatch boundary in the CLI; not authoritative server-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "https://api.classline.app".to_string(),
            token: String::new(),
            fetch_limit: 100,
            role: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/classline-test`
    /// 2. `CLASSLINE_CONFIG_DIR` env var: explicit override
    /// 3. `CLASSLINE_ENV=test`: `tmp/classline-test` (integration tests)
    /// 4. Default: platform config dir (macOS: ~/Library/Application Support/classline)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                // Unit tests: use the repo's tmp/ directory
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/classline-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(test_dir) = std::env::var("CLASSLINE_CONFIG_DIR") {
                    PathBuf::from(test_dir)
                } else if crate::env::should_skip_keyring() {
                    // Integration tests: use the repo's tmp/ directory
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/classline-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("classline")
                }
            }
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    /// Token is loaded from consolidated keyring credentials (or env var).
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|_| Self::default());
        config.apply_env_overrides();

        // Load token from keyring if not set via env var
        if config.token.is_empty() {
            if let Ok(creds) = Credentials::load() {
                if let Some(token) = creds.auth_token() {
                    config.token = token.to_string();
                }
            }
        }

        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server_url) = std::env::var("CLASSLINE_SERVER_URL") {
            self.server_url = server_url;
        }

        // Token from env var (for CI/CD)
        if let Ok(token) = std::env::var("CLASSLINE_TOKEN") {
            self.token = token;
        }

        if let Ok(fetch_limit) = std::env::var("CLASSLINE_FETCH_LIMIT") {
            if let Ok(limit) = fetch_limit.parse::<usize>() {
                self.fetch_limit = limit;
            }
        }
    }

    /// Persists the current configuration to disk.
    /// Note: the token is NOT saved here (use save_token for that).
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Owner read/write only
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Get the auth token for API authentication.
    pub fn auth_token(&self) -> &str {
        &self.token
    }

    /// Check if we have an authentication token.
    /// Absence is a valid terminal state: logged out.
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Save a new auth token to the consolidated keyring.
    pub fn save_token(&mut self, token: &str) -> Result<()> {
        self.token = token.to_string();

        let mut creds = Credentials::load().unwrap_or_default();
        creds.set_auth_token(token.to_string());
        creds.save()?;

        Ok(())
    }

    /// Clear the token from keyring (logout).
    pub fn clear_token(&mut self) -> Result<()> {
        self.token.clear();

        let mut creds = Credentials::load().unwrap_or_default();
        creds.clear_auth_token();
        creds.save()?;

        Ok(())
    }
}
