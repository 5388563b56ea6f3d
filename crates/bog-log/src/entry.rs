//! Decoded log entries.

use bog_core::{Hash, TIMESTAMP_LEN};
use serde::{Deserialize, Serialize};

/// A verified, decoded view of one envelope in the log.
///
/// Serialized field names (`sig`, `opened`, `ts`) are the persisted and
/// directory wire format and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Hash of the envelope blob; the log membership key.
    pub hash: Hash,
    /// The envelope itself.
    #[serde(rename = "sig")]
    pub envelope: String,
    /// The author: leading 44 characters of the envelope.
    pub author: String,
    /// The verified payload: timestamp text followed by the content hash.
    pub opened: String,
    /// The referenced content blob, when locally replicated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Signing timestamp as 13-digit decimal text.
    pub ts: String,
}

impl LogEntry {
    /// The content hash embedded in the opened payload.
    pub fn content_hash(&self) -> Option<Hash> {
        // Persisted state may have been tampered with; never index it.
        Hash::parse(self.opened.get(TIMESTAMP_LEN..)?)
    }

    /// The signing timestamp as a number, for ordering. Unparseable text
    /// sorts first.
    pub fn ts_millis(&self) -> i64 {
        self.ts.parse().unwrap_or(0)
    }
}
