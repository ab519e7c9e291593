//! API error taxonomy.
//!
//! Three failure classes the UI layer renders differently: missing/invalid
//! credentials (login required, never auto-retried), network failures
//! (retry affordance), and server rejections (message shown, friendlier
//! strings for a small fixed set of login status codes).

/// Errors from Classline backend API calls.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid auth token. Surfaced as a login requirement.
    Unauthorized,
    /// Request never reached the server (DNS, TCP, timeout).
    Network(String),
    /// Server answered with a non-success status.
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body or mapped message.
        message: String,
    },
}

impl ApiError {
    /// Build from a non-success response status and body.
    ///
    /// Login endpoints get friendlier strings for the handful of status
    /// codes users actually hit; everything else is passed through.
    pub fn from_status(status: u16, body: String, login: bool) -> Self {
        if status == 401 && !login {
            return Self::Unauthorized;
        }
        let message = if login {
            match status {
                401 => "Invalid email or password".to_string(),
                403 => "Account is disabled. Contact your school administrator.".to_string(),
                429 => "Too many login attempts. Try again in a few minutes.".to_string(),
                _ => body,
            }
        } else {
            body
        };
        Self::Server { status, message }
    }

    /// True if the failure means the user must log in (again).
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// True if the request never reached the server.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "Not authenticated - please log in"),
            Self::Network(msg) => write!(f, "Network error: {msg}"),
            Self::Server { status, message } => write!(f, "Server error ({status}): {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
