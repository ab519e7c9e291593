//! Server communication module for classline-sync.
//!
//! HTTP adapter for the Classline backend:
//!
//! - [`ApiClient`] - async reqwest client, one method per endpoint
//! - [`ApiError`] - error taxonomy (auth / network / server-rejected)
//! - request/response payload types
//!
//! Realtime push events arrive over the WebSocket channel, not here; this
//! module covers the pull/mutate side of notification sync plus device
//! push-token registration and login.

pub mod client;
pub mod error;
pub mod types;

pub use client::ApiClient;
pub use error::ApiError;
pub use types::{DeviceTokenPayload, LoginResponse, NotificationListResponse};
