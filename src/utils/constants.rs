//! Shared constants and invariants

pub const DEFAULT_BUFFER_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MIN_REFRESH_DELAY_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

// Worker supervision
pub const DEFAULT_MAX_RESTARTS: u32 = 3;
pub const DEFAULT_RESTART_WINDOW_SECS: u64 = 5;

// Error reports
pub const TIMEOUT_REPORT_MSG: &str = "token request timed out";
