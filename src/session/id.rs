use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Time-based identifier shared by every artifact of one session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Identifier for a session starting at `time`, e.g. `20250301_142233_517`
    pub fn from_time(time: SystemTime, timezone: &Tz) -> Self {
        let local = DateTime::<Utc>::from(time).with_timezone(timezone);
        Self(local.format("%Y%m%d_%H%M%S_%3f").to_string())
    }

    /// Same identifier with a numeric suffix, used when two sessions start
    /// within the same millisecond
    pub fn with_suffix(&self, suffix: u32) -> Self {
        Self(format!("{}_{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Resolve configured timezone, falling back to UTC on parse errors
pub fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!("Invalid timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}
