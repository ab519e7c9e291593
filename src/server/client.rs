//! API client for communicating with the Classline backend.
//!
//! Provides the [`ApiClient`] struct which handles all HTTP communication:
//! notification fetch and mutations, device push-token registration, and
//! login. All requests except login carry the Bearer auth token.

use reqwest::Client;

use super::error::ApiError;
use super::types::{DeviceTokenPayload, LoginRequest, LoginResponse, NotificationListResponse};
use crate::constants;
use uuid::Uuid;

/// Async HTTP client for the Classline backend.
///
/// Encapsulates client configuration and provides one method per endpoint.
/// Cheap to clone; the inner reqwest client pools connections.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    server_url: String,
    auth_token: String,
}

impl ApiClient {
    /// Creates a new API client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(server_url: String, auth_token: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            server_url,
            auth_token,
        })
    }

    /// Creates an API client with a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(client: Client, server_url: String, auth_token: String) -> Self {
        Self {
            client,
            server_url,
            auth_token,
        }
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Consume a response, mapping non-success statuses into [`ApiError`].
    async fn check(
        response: reqwest::Response,
        login: bool,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), body, login))
    }

    /// Log in with email and password, returning the token and role.
    ///
    /// The only unauthenticated call; login failures get friendlier
    /// messages for the common status codes.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let url = format!("{}/api/sessions", self.server_url);
        let payload = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self.client.post(&url).json(&payload).send().await?;
        let response = Self::check(response, true).await?;
        Ok(response.json().await?)
    }

    /// Fetch the notification list, optionally unread-only.
    ///
    /// The response replaces the local record set wholesale; merging is the
    /// store's concern (revision guard), not the transport's.
    pub async fn fetch_notifications(
        &self,
        unread_only: bool,
        limit: usize,
    ) -> Result<NotificationListResponse, ApiError> {
        let mut url = format!("{}/api/notifications?limit={}", self.server_url, limit);
        if unread_only {
            url.push_str("&unread=true");
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        let response = Self::check(response, false).await?;
        Ok(response.json().await?)
    }

    /// Mark one notification read.
    pub async fn mark_read(&self, id: i64) -> Result<(), ApiError> {
        let url = format!("{}/api/notifications/{}/read", self.server_url, id);

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        Self::check(response, false).await?;
        log::debug!("Marked notification {} read", id);
        Ok(())
    }

    /// Mark every notification read.
    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        let url = format!("{}/api/notifications/read_all", self.server_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        Self::check(response, false).await?;
        log::debug!("Marked all notifications read");
        Ok(())
    }

    /// Delete one notification.
    pub async fn delete_notification(&self, id: i64) -> Result<(), ApiError> {
        let url = format!("{}/api/notifications/{}", self.server_url, id);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        Self::check(response, false).await?;
        log::debug!("Deleted notification {}", id);
        Ok(())
    }

    /// Upsert this device's push token so the backend can route push
    /// notifications here. PUT for upsert semantics.
    pub async fn upsert_device_token(&self, payload: &DeviceTokenPayload) -> Result<(), ApiError> {
        let url = format!(
            "{}/api/devices/{}/push_token",
            self.server_url, payload.device_id
        );

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.auth_token)
            .json(payload)
            .send()
            .await?;
        Self::check(response, false).await?;
        log::info!("Registered push token for device {}", payload.device_id);
        Ok(())
    }

    /// Tell the backend to forget this device's push token (logout).
    pub async fn remove_device_token(&self, device_id: Uuid) -> Result<(), ApiError> {
        let url = format!("{}/api/devices/{}/push_token", self.server_url, device_id);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        Self::check(response, false).await?;
        log::info!("Removed push token for device {}", device_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_client_creation() {
        let client = ApiClient::new(
            "https://example.com".to_string(),
            "clt_test".to_string(),
        );

        assert!(client.is_ok());
        let client = client.expect("client builds");
        assert_eq!(client.server_url(), "https://example.com");
    }

    #[test]
    fn test_api_client_with_custom_client() {
        let http_client = Client::new();
        let client = ApiClient::with_client(
            http_client,
            "https://custom.example.com".to_string(),
            "clt_custom".to_string(),
        );

        assert_eq!(client.server_url(), "https://custom.example.com");
    }
}
