//! Consolidated keyring storage for client credentials.
//!
//! Stores all secrets in a single keyring entry to avoid multiple
//! macOS keychain prompts when the binary changes (new builds).
//!
//! # Storage
//!
//! Production: single OS keyring entry `classline/credentials` containing JSON.
//! Test mode: file at `{config_dir}/credentials.json`.
//!
//! # Contents
//!
//! - Auth token issued by the backend at login. Absence is a valid terminal
//!   state (logged out).
//! - Device push token issued by the platform push service, at most one
//!   cached value at a time, plus a pending flag when the backend upsert has
//!   not happened yet.
//! - A stable device id generated on first use, sent with push-token
//!   registrations so the backend keys tokens per device.
//!
//! # Graceful Degradation
//!
//! macOS keychain may block access when the binary signature changes.
//! Retry logic distinguishes between a locked keyring, a missing entry
//! (normal first run), and denied access (signature mismatch).

use anyhow::Result;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

use crate::constants::{
    KEYRING_CREDENTIALS, KEYRING_RETRY_ATTEMPTS, KEYRING_RETRY_DELAY_MS, KEYRING_SERVICE,
};

/// Categorized keyring access errors for better user feedback.
#[derive(Debug)]
pub enum KeyringAccessError {
    /// Keyring is locked and requires user interaction to unlock.
    Locked(String),
    /// Entry does not exist (normal for first run).
    NotFound,
    /// Access denied, likely due to binary signature change.
    AccessDenied(String),
    /// Data exists but is corrupted or unparseable.
    Corrupted(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked(msg) => write!(f, "Keyring locked: {msg}"),
            Self::NotFound => write!(f, "Keyring entry not found"),
            Self::AccessDenied(msg) => write!(f, "Keyring access denied: {msg}"),
            Self::Corrupted(msg) => write!(f, "Keyring data corrupted: {msg}"),
            Self::Other(msg) => write!(f, "Keyring error: {msg}"),
        }
    }
}

impl std::error::Error for KeyringAccessError {}

/// Categorize a keyring error for better user feedback.
fn categorize_keyring_error(err: &keyring::Error) -> KeyringAccessError {
    let msg = format!("{err:?}");
    let msg_lower = msg.to_lowercase();

    if msg_lower.contains("no password")
        || msg_lower.contains("not found")
        || msg_lower.contains("nopassword")
    {
        return KeyringAccessError::NotFound;
    }

    if msg_lower.contains("user interaction") || msg_lower.contains("user canceled") {
        return KeyringAccessError::Locked(msg);
    }

    if msg_lower.contains("denied")
        || msg_lower.contains("codesign")
        || msg_lower.contains("authorization")
        || msg_lower.contains("not allowed")
    {
        return KeyringAccessError::AccessDenied(msg);
    }

    KeyringAccessError::Other(msg)
}

/// Check if keyring should be skipped (test mode).
fn should_skip_keyring() -> bool {
    #[cfg(test)]
    {
        return true;
    }

    #[cfg(not(test))]
    {
        // Direct env var check as a safety fallback in case this is called
        // before env detection is exercised anywhere else.
        if let Ok(env_val) = std::env::var("CLASSLINE_ENV") {
            if env_val == "test" {
                return true;
            }
        }

        crate::env::should_skip_keyring()
    }
}

/// Get the credentials file path for test mode.
fn credentials_file_path() -> Result<PathBuf> {
    crate::config::Config::config_dir().map(|d| d.join("credentials.json"))
}

/// Consolidated credentials stored in a single keyring entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Credentials {
    /// Auth token issued at login. `None` means logged out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Device push token from the platform push service.
    /// At most one valid value is cached at a time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,

    /// True when the cached push token has not been upserted to the backend
    /// yet (no auth token at registration time, or the upsert failed).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub push_pending: bool,

    /// Stable device identifier, generated on first use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Uuid>,

    /// Schema version for future migrations.
    #[serde(default = "default_version")]
    pub version: u8,
}

fn default_version() -> u8 {
    1
}

impl Credentials {
    /// Load credentials from keyring (or file in test mode).
    ///
    /// Keyring access may block on OS prompts and retry sleeps; callers on
    /// an async runtime should wrap this in `spawn_blocking`.
    pub fn load() -> Result<Self> {
        if should_skip_keyring() {
            return Self::load_from_file();
        }

        Ok(Self::load_from_keyring())
    }

    /// Load from keyring, retrying transient failures.
    ///
    /// Degrades to empty credentials rather than failing: a missing entry is
    /// a normal first run, corrupted data cannot be repaired here, and after
    /// exhausted retries the user can simply log in again.
    fn load_from_keyring() -> Self {
        let mut attempt = 0;
        loop {
            let err = match Self::try_load_from_keyring() {
                Ok(creds) => return creds,
                Err(err) => err,
            };

            match err {
                KeyringAccessError::NotFound => {
                    log::debug!("No credentials found in keyring, returning empty");
                    return Self::default();
                }
                KeyringAccessError::Corrupted(_) => {
                    log::warn!("Keyring data corrupted, returning empty credentials: {}", err);
                    return Self::default();
                }
                _ => {}
            }

            attempt += 1;
            if attempt >= KEYRING_RETRY_ATTEMPTS {
                log::warn!(
                    "Keyring access failed after {} attempts: {}. \
                     Credentials may need to be re-entered.",
                    attempt,
                    err
                );
                if matches!(err, KeyringAccessError::AccessDenied(_)) {
                    log::info!(
                        "Hint: Binary signature may have changed. \
                         You may need to log in again or unlock your keychain."
                    );
                }
                return Self::default();
            }

            log::debug!(
                "Keyring access failed ({}), retry {}/{}",
                err,
                attempt + 1,
                KEYRING_RETRY_ATTEMPTS
            );
            thread::sleep(Duration::from_millis(KEYRING_RETRY_DELAY_MS));
        }
    }

    /// Attempt a single load from keyring, categorizing any errors.
    fn try_load_from_keyring() -> std::result::Result<Self, KeyringAccessError> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_CREDENTIALS)
            .map_err(|e| KeyringAccessError::Other(format!("Failed to create entry: {e:?}")))?;

        match entry.get_password() {
            Ok(json) => {
                let creds: Credentials = serde_json::from_str(&json)
                    .map_err(|e| KeyringAccessError::Corrupted(format!("JSON parse error: {e}")))?;
                log::debug!("Loaded consolidated credentials from keyring");
                Ok(creds)
            }
            Err(e) => Err(categorize_keyring_error(&e)),
        }
    }

    /// Load credentials from file (test mode).
    fn load_from_file() -> Result<Self> {
        let path = credentials_file_path()?;
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let creds: Credentials = serde_json::from_str(&content)?;
            log::debug!("Loaded credentials from file (test mode)");
            Ok(creds)
        } else {
            log::debug!("No credentials file found, returning empty");
            Ok(Credentials::default())
        }
    }

    /// Save credentials to keyring (or file in test mode).
    pub fn save(&self) -> Result<()> {
        if should_skip_keyring() {
            return self.save_to_file();
        }

        let entry = Entry::new(KEYRING_SERVICE, KEYRING_CREDENTIALS)
            .map_err(|e| anyhow::anyhow!("Failed to create keyring entry: {e:?}"))?;

        let json = serde_json::to_string(self)?;
        entry
            .set_password(&json)
            .map_err(|e| anyhow::anyhow!("Failed to store credentials in keyring: {e:?}"))?;

        log::info!("Saved consolidated credentials to OS keyring");
        Ok(())
    }

    /// Save credentials to file (test mode).
    fn save_to_file(&self) -> Result<()> {
        let path = credentials_file_path()?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;

        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;

        log::debug!("Saved credentials to file (test mode)");
        Ok(())
    }

    /// Delete all credentials from keyring.
    pub fn delete() -> Result<()> {
        if should_skip_keyring() {
            let path = credentials_file_path()?;
            if path.exists() {
                fs::remove_file(&path)?;
            }
            return Ok(());
        }

        let entry = Entry::new(KEYRING_SERVICE, KEYRING_CREDENTIALS)
            .map_err(|e| anyhow::anyhow!("Failed to create keyring entry: {e:?}"))?;

        let _ = entry.delete_credential();
        log::info!("Deleted credentials from OS keyring");
        Ok(())
    }

    // === Auth token accessors ===

    /// Get the auth token if logged in.
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Set the auth token.
    pub fn set_auth_token(&mut self, token: String) {
        self.auth_token = Some(token);
    }

    /// Clear the auth token (logout).
    pub fn clear_auth_token(&mut self) {
        self.auth_token = None;
    }

    // === Push token accessors ===

    /// Get the cached device push token if any.
    pub fn push_token(&self) -> Option<&str> {
        self.push_token.as_deref()
    }

    /// Cache a device push token, superseding any previous value.
    ///
    /// `pending` marks whether the backend upsert is still outstanding.
    pub fn set_push_token(&mut self, token: String, pending: bool) {
        self.push_token = Some(token);
        self.push_pending = pending;
    }

    /// Mark the cached push token as synced with the backend.
    pub fn mark_push_synced(&mut self) {
        self.push_pending = false;
    }

    /// Clear the cached push token.
    pub fn clear_push_token(&mut self) {
        self.push_token = None;
        self.push_pending = false;
    }

    /// Get the stable device id, generating and storing one if absent.
    pub fn device_id_or_create(&mut self) -> Uuid {
        match self.device_id {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                self.device_id = Some(id);
                id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_roundtrip() {
        let mut creds = Credentials::default();
        creds.auth_token = Some("clt_test123".to_string());
        creds.set_push_token("fcm:device-abc".to_string(), true);

        let json = serde_json::to_string(&creds).unwrap();
        let loaded: Credentials = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded.auth_token, creds.auth_token);
        assert_eq!(loaded.push_token, creds.push_token);
        assert!(loaded.push_pending);
    }

    #[test]
    fn test_credentials_skips_none_fields() {
        let creds = Credentials::default();

        let json = serde_json::to_string(&creds).unwrap();
        assert!(!json.contains("auth_token"));
        assert!(!json.contains("push_token"));
        assert!(!json.contains("push_pending"));
        assert!(!json.contains("device_id"));
    }

    #[test]
    fn test_push_token_superseded() {
        let mut creds = Credentials::default();
        creds.set_push_token("old-token".to_string(), false);
        creds.set_push_token("new-token".to_string(), true);

        assert_eq!(creds.push_token(), Some("new-token"));
        assert!(creds.push_pending);

        creds.mark_push_synced();
        assert!(!creds.push_pending);
    }

    #[test]
    fn test_clear_push_token_resets_pending() {
        let mut creds = Credentials::default();
        creds.set_push_token("tok".to_string(), true);
        creds.clear_push_token();

        assert_eq!(creds.push_token(), None);
        assert!(!creds.push_pending);
    }

    #[test]
    fn test_device_id_stable_once_created() {
        let mut creds = Credentials::default();
        let first = creds.device_id_or_create();
        let second = creds.device_id_or_create();
        assert_eq!(first, second);

        let json = serde_json::to_string(&creds).unwrap();
        let mut loaded: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.device_id_or_create(), first);
    }

    #[test]
    fn test_logout_clears_auth_only() {
        let mut creds = Credentials::default();
        creds.set_auth_token("clt_abc".to_string());
        creds.set_push_token("tok".to_string(), false);

        creds.clear_auth_token();
        assert_eq!(creds.auth_token(), None);
        // Push token survives logout; removal is a separate explicit step
        assert_eq!(creds.push_token(), Some("tok"));
    }

    #[test]
    fn test_keyring_access_error_display() {
        let locked = KeyringAccessError::Locked("user canceled".to_string());
        assert!(locked.to_string().contains("Keyring locked"));

        let not_found = KeyringAccessError::NotFound;
        assert!(not_found.to_string().contains("not found"));

        let denied = KeyringAccessError::AccessDenied("codesign".to_string());
        assert!(denied.to_string().contains("access denied"));

        let corrupted = KeyringAccessError::Corrupted("invalid json".to_string());
        assert!(corrupted.to_string().contains("corrupted"));
    }
}
