//! Generic tri-state async resource.
//!
//! Every async view needs the same loading/error/data shape. Instead of
//! hand-duplicating three fields per screen, `Resource<T>` carries the
//! lifecycle of one fetched payload.

/// Lifecycle of an asynchronously fetched value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Resource<T> {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// Request in flight.
    Loading,
    /// Request succeeded.
    Ready(T),
    /// Request failed with a user-facing message.
    Failed(String),
}

impl<T> Resource<T> {
    /// True while a request is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading)
    }

    /// The payload, if ready.
    pub fn value(&self) -> Option<&T> {
        match self {
            Resource::Ready(v) => Some(v),
            _ => None,
        }
    }

    /// The error message, if failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            Resource::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    /// Map the payload type, preserving the lifecycle state.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resource<U> {
        match self {
            Resource::Idle => Resource::Idle,
            Resource::Loading => Resource::Loading,
            Resource::Ready(v) => Resource::Ready(f(v)),
            Resource::Failed(msg) => Resource::Failed(msg),
        }
    }

    /// Fold a request result into the resource.
    pub fn resolve(&mut self, result: Result<T, impl std::fmt::Display>) {
        *self = match result {
            Ok(v) => Resource::Ready(v),
            Err(e) => Resource::Failed(e.to_string()),
        };
    }
}
