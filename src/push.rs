//! Device push-token registration lifecycle.
//!
//! Obtains a device token from the platform push service, caches it in the
//! credential store, and upserts it to the backend once authenticated. The
//! platform side (permission prompt + token issuance) sits behind the
//! [`PushPlatform`] trait so the lifecycle is testable without a device.
//!
//! # Failure semantics
//!
//! - Permission denial is terminal for the session; no retry loop.
//! - A failed or impossible upsert (offline, not logged in) leaves the
//!   token cached with the pending flag set; it is retried only when
//!   [`PushRegistrar::flush_pending`] runs (next login / foreground).
//!   No automatic backoff.

use anyhow::Result;

use crate::credentials::Credentials;
use crate::server::{ApiClient, DeviceTokenPayload};

/// Result of the platform notification-permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// User allowed notifications.
    Granted,
    /// User refused. Terminal for this session.
    Denied,
}

/// Platform push service: permission prompt and device-token issuance.
///
/// Implemented by the embedding app; tests use an in-memory fake.
pub trait PushPlatform {
    /// Ask the user for notification permission.
    fn request_permission(&self) -> Permission;

    /// Obtain the current device token from the push service.
    fn device_token(&self) -> Result<String>;
}

/// Outcome of a registration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Token cached and upserted to the backend.
    Registered,
    /// Token cached; backend upsert still outstanding.
    Pending,
    /// User refused notification permission; nothing cached.
    PermissionDenied,
}

/// Drives the push-token lifecycle against the credential store.
///
/// Borrows the credentials; persisting them is the caller's concern so a
/// single load/save brackets however many steps run together.
#[derive(Debug)]
pub struct PushRegistrar<'a> {
    creds: &'a mut Credentials,
}

impl<'a> PushRegistrar<'a> {
    /// Create a registrar over the given credentials.
    pub fn new(creds: &'a mut Credentials) -> Self {
        Self { creds }
    }

    /// Request permission and register the device token.
    ///
    /// Pass `api` when an auth token is present; `None` caches the token as
    /// pending without any HTTP call.
    pub async fn initialize(
        &mut self,
        platform: &dyn PushPlatform,
        api: Option<&ApiClient>,
    ) -> Result<RegistrationOutcome> {
        if platform.request_permission() == Permission::Denied {
            log::info!("Notification permission denied; push disabled this session");
            return Ok(RegistrationOutcome::PermissionDenied);
        }

        let token = platform.device_token()?;
        self.register(token, api).await
    }

    /// Replace the cached device token after the platform rotates it.
    pub async fn on_token_refresh(
        &mut self,
        new_token: String,
        api: Option<&ApiClient>,
    ) -> Result<RegistrationOutcome> {
        log::debug!("Platform refreshed device push token");
        self.register(new_token, api).await
    }

    /// Retry the backend upsert for a pending cached token.
    ///
    /// Sends at most one HTTP request; does nothing when no token is
    /// pending. Returns `true` if the token is synced afterwards.
    pub async fn flush_pending(&mut self, api: &ApiClient) -> Result<bool> {
        if !self.creds.push_pending {
            return Ok(self.creds.push_token().is_some());
        }
        let Some(token) = self.creds.push_token().map(str::to_string) else {
            // Pending without a token is a stale flag; clear it
            self.creds.push_pending = false;
            return Ok(false);
        };
        Ok(self.upsert(token, api).await == RegistrationOutcome::Registered)
    }

    /// Tell the backend to forget this device's token and clear the local
    /// cache. Used on logout. The local cache is cleared even if the remote
    /// call fails; the next registration supersedes the server-side entry.
    pub async fn remove_token(&mut self, api: &ApiClient) -> Result<()> {
        if self.creds.push_token().is_some() {
            let device_id = self.creds.device_id_or_create();
            if let Err(e) = api.remove_device_token(device_id).await {
                log::warn!("Failed to remove push token from backend: {}", e);
            }
        }
        self.creds.clear_push_token();
        Ok(())
    }

    async fn register(
        &mut self,
        token: String,
        api: Option<&ApiClient>,
    ) -> Result<RegistrationOutcome> {
        self.creds.set_push_token(token.clone(), true);

        match api {
            Some(api) => Ok(self.upsert(token, api).await),
            None => {
                log::debug!("No auth token yet; push token cached as pending");
                Ok(RegistrationOutcome::Pending)
            }
        }
    }

    async fn upsert(&mut self, token: String, api: &ApiClient) -> RegistrationOutcome {
        let device_id = self.creds.device_id_or_create();
        let payload = DeviceTokenPayload::new(device_id, token);

        match api.upsert_device_token(&payload).await {
            Ok(()) => {
                self.creds.mark_push_synced();
                RegistrationOutcome::Registered
            }
            Err(e) => {
                // Stays pending; retried on the next flush_pending
                log::warn!("Push token upsert failed, leaving pending: {}", e);
                RegistrationOutcome::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePlatform {
        permission: Permission,
        token: &'static str,
    }

    impl PushPlatform for FakePlatform {
        fn request_permission(&self) -> Permission {
            self.permission
        }

        fn device_token(&self) -> Result<String> {
            Ok(self.token.to_string())
        }
    }

    #[tokio::test]
    async fn test_initialize_without_auth_caches_pending() {
        let mut creds = Credentials::default();
        let platform = FakePlatform {
            permission: Permission::Granted,
            token: "fcm:device-1",
        };

        let outcome = PushRegistrar::new(&mut creds)
            .initialize(&platform, None)
            .await
            .expect("initialize");

        assert_eq!(outcome, RegistrationOutcome::Pending);
        assert_eq!(creds.push_token(), Some("fcm:device-1"));
        assert!(creds.push_pending);
    }

    #[tokio::test]
    async fn test_permission_denied_is_terminal() {
        let mut creds = Credentials::default();
        let platform = FakePlatform {
            permission: Permission::Denied,
            token: "unused",
        };

        let outcome = PushRegistrar::new(&mut creds)
            .initialize(&platform, None)
            .await
            .expect("initialize");

        assert_eq!(outcome, RegistrationOutcome::PermissionDenied);
        assert_eq!(creds.push_token(), None);
        assert!(!creds.push_pending);
    }

    #[tokio::test]
    async fn test_token_refresh_supersedes_cached_value() {
        let mut creds = Credentials::default();
        creds.set_push_token("fcm:old".to_string(), false);

        let outcome = PushRegistrar::new(&mut creds)
            .on_token_refresh("fcm:new".to_string(), None)
            .await
            .expect("refresh");

        assert_eq!(outcome, RegistrationOutcome::Pending);
        assert_eq!(creds.push_token(), Some("fcm:new"));
        assert!(creds.push_pending);
    }

    #[tokio::test]
    async fn test_flush_pending_without_token_clears_stale_flag() {
        let mut creds = Credentials::default();
        creds.push_pending = true;

        let api = ApiClient::new("http://127.0.0.1:9".to_string(), String::new())
            .expect("client builds");
        let synced = PushRegistrar::new(&mut creds)
            .flush_pending(&api)
            .await
            .expect("flush");

        assert!(!synced);
        assert!(!creds.push_pending);
    }

    #[tokio::test]
    async fn test_flush_pending_noop_when_synced() {
        let mut creds = Credentials::default();
        creds.set_push_token("fcm:ok".to_string(), false);

        // Unroutable address: any HTTP attempt would fail, proving none is made
        let api = ApiClient::new("http://127.0.0.1:9".to_string(), String::new())
            .expect("client builds");
        let synced = PushRegistrar::new(&mut creds)
            .flush_pending(&api)
            .await
            .expect("flush");

        assert!(synced);
        assert!(!creds.push_pending);
    }
}
