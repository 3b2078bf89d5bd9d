//! Shared constants for end-to-end tests

/// How long to wait for the test server to answer its first request
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Delay between readiness polls
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Timeout for individual HTTP requests
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// How long a test waits for a relayed message before giving up
pub const MESSAGE_TIMEOUT_MS: u64 = 2000;

/// How long a test waits to be sure no message arrives
pub const SILENCE_TIMEOUT_MS: u64 = 200;

/// Close code sent when the relay shuts down
pub const CLOSE_GOING_AWAY: u16 = 1001;
