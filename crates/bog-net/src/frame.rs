//! Inbound frame classification.
//!
//! The wire carries two kinds of text frames and nothing distinguishes them
//! except shape: a frame that is exactly one canonical hash is a request or
//! announcement for that hash, everything else is raw content offered for
//! ingest. Classification happens here, once, so the rest of the endpoint
//! works with a tagged value.

use bog_core::{Hash, HASH_LEN};

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A single content hash: the peer wants this content, or is announcing
    /// that it exists.
    HashRef(Hash),
    /// Anything else: an envelope or content blob offered for ingest.
    Raw(String),
}

impl Frame {
    /// Classifies an inbound text frame by shape.
    pub fn classify(text: &str) -> Frame {
        if text.len() == HASH_LEN {
            if let Some(hash) = Hash::parse(text) {
                return Frame::HashRef(hash);
            }
        }
        Frame::Raw(text.to_string())
    }
}
