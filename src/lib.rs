//! Classline sync - notification synchronization client.
//!
//! This crate provides the client-side notification sync layer for the
//! Classline school-management backend: durable token storage, device
//! push-token registration, a realtime WebSocket channel, and an ordered
//! notification store with a derived unread counter.
//!
//! # Architecture
//!
//! - **Credentials** - auth token + device push token in OS keyring
//! - **PushRegistrar** - device token lifecycle against the backend
//! - **RealtimeManager** - the single realtime connection per process
//! - **NotificationStore** - ordered records, unread counter, stale-fetch guard
//! - **ApiClient** - HTTP adapter for fetch and mutations
//!
//! Screens (the CLI here) consume the store, dispatch mutations through
//! the API client, and drive the push/realtime lifecycle on auth
//! transitions.

pub mod channel;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod env;
pub mod push;
pub mod resource;
pub mod role;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use channel::{ChannelEvent, ConnectionState, RealtimeManager};
pub use config::Config;
pub use credentials::Credentials;
pub use push::{PushPlatform, PushRegistrar};
pub use resource::Resource;
pub use role::Role;
pub use server::{ApiClient, ApiError};
pub use store::{Notification, NotificationStore};
