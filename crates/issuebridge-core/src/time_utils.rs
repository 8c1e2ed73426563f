use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Returns the current Unix timestamp in seconds.
pub fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Returns true when `expires_unix` is present and no longer in the future.
pub fn is_expired_unix(expires_unix: Option<u64>, now_unix: u64) -> bool {
    matches!(expires_unix, Some(value) if value <= now_unix)
}

/// Formats a Unix timestamp as an RFC 7231 HTTP date (`Expires` attribute form).
pub fn format_http_date(unix_seconds: u64) -> String {
    let seconds = i64::try_from(unix_seconds).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Source of wall-clock time for expiry decisions.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        current_unix_timestamp()
    }
}

/// Clock that only moves when told to. Used to exercise TTL windows.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_unix: AtomicU64,
}

impl ManualClock {
    pub fn new(now_unix: u64) -> Self {
        Self {
            now_unix: AtomicU64::new(now_unix),
        }
    }

    pub fn set(&self, now_unix: u64) {
        self.now_unix.store(now_unix, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now_unix.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> u64 {
        self.now_unix.load(Ordering::SeqCst)
    }
}
