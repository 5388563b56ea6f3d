//! Timestamps.
//!
//! Envelope payloads carry wall-clock time as a 13-digit decimal string of
//! milliseconds since the Unix epoch. Timestamps are client-supplied: the
//! signer embeds its own clock, and log order trusts it. See the note on
//! [`crate::envelope`].

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::TIMESTAMP_LEN;

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the Unix epoch.
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Returns the milliseconds since the Unix epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Renders the timestamp as the 13-digit decimal text used in payloads.
    pub fn to_text(&self) -> String {
        format!("{:013}", self.0)
    }

    /// Parses the 13-digit decimal text form.
    pub fn parse_text(s: &str) -> Option<Self> {
        if s.len() != TIMESTAMP_LEN {
            return None;
        }
        s.parse::<i64>().ok().map(Self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}
