//! Application-wide constants for classline-sync.
//!
//! Centralizes timeouts and policy knobs so they are discoverable in one
//! place instead of scattered through the modules that use them.

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for API calls.
///
/// Applies to individual requests against the Classline backend. 10 seconds
/// covers slow school-network links without hanging the CLI indefinitely.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the server's `welcome` frame after the WebSocket
/// handshake before giving up on the connection attempt.
pub const WELCOME_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Realtime channel reconnection
// ============================================================================

/// Initial reconnect backoff.
pub const INITIAL_BACKOFF_SECS: u64 = 1;

/// Backoff ceiling. Doubling stops here.
pub const MAX_BACKOFF_SECS: u64 = 30;

/// Reconnection attempts before the channel gives up and parks itself in
/// `Disconnected`. Gaps are repaired by the next explicit HTTP fetch.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 8;

/// No traffic (including server pings) for this long means the connection
/// is considered stale and is torn down for reconnect.
pub const CONNECTION_STALE_TIMEOUT_SECS: u64 = 45;

/// How often the stale check runs.
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 10;

// ============================================================================
// Credential storage
// ============================================================================

/// Keyring service name.
pub const KEYRING_SERVICE: &str = "classline";

/// Consolidated keyring entry name.
pub const KEYRING_CREDENTIALS: &str = "credentials";

/// Retry attempts for transient keyring access failures.
pub const KEYRING_RETRY_ATTEMPTS: u32 = 2;

/// Delay between keyring retry attempts in milliseconds.
pub const KEYRING_RETRY_DELAY_MS: u64 = 500;
