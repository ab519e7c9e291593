//! Request/response payloads for the Classline backend API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Role;
use crate::store::Notification;

/// Response from `GET /api/notifications`.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationListResponse {
    /// Records, newest first.
    pub notifications: Vec<Notification>,
    /// Server's unread count for the owning user.
    ///
    /// Informational only; the store recomputes its own counter from the
    /// record set rather than trusting this value.
    #[serde(default)]
    pub unread_count: usize,
}

/// Request body for `POST /api/sessions` (login).
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Response from a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// Account role, parsed into the closed variant at this boundary.
    pub role: Role,
}

/// Request body for the device push-token upsert.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceTokenPayload {
    /// Stable device identifier generated client-side.
    pub device_id: Uuid,
    /// Platform push token to route notifications to this device.
    pub push_token: String,
    /// Human-readable device name for the user's device list.
    pub device_name: String,
}

impl DeviceTokenPayload {
    /// Build a payload, deriving the device name from the hostname.
    pub fn new(device_id: Uuid, push_token: String) -> Self {
        let device_name = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "Classline client".to_string());
        Self {
            device_id,
            push_token,
            device_name,
        }
    }
}
