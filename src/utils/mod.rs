// src/utils/mod.rs
// Common utility functions

pub mod hash;
pub mod timeout;

pub use hash::{sha256_hash, sha256_hash_bytes};
pub use timeout::with_timeout;

/// Current wall-clock time in whole seconds since the epoch.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
