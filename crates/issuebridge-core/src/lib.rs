//! Foundational types shared across issuebridge crates.
//!
//! Provides the clock abstraction used for correlation-token expiry, the
//! user-facing error taxonomy, and the localized message catalog rendered by
//! both the HTTP callback surface and the Discord command surface.

pub mod error;
pub mod messages;
pub mod time_utils;

pub use error::BridgeError;
pub use messages::{Locale, Messages, MAX_MESSAGE_CHARS};
pub use time_utils::{
    current_unix_timestamp, format_http_date, is_expired_unix, Clock, ManualClock, SystemClock,
};
