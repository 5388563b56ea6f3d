//! Metadata documents.
//!
//! A content blob may carry structured front-matter ahead of its body:
//!
//! ```text
//! ---
//! name: ada
//! image: <hash>
//! previous: <hash>
//! ---
//! body text
//! ```
//!
//! `image` and `previous` point at other content hashes and are first-class
//! replication dependencies, as are markdown-style image references embedded
//! in the body (`![alt](<hash>)`). `previous` is advisory only: it links an
//! author's envelopes into a chain but is never validated, and log order
//! stays purely timestamp-based.

use crate::hash::Hash;

const FENCE: &str = "---\n";

/// A parsed metadata document: optional front-matter fields plus the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaDoc {
    /// Display name of the author at signing time.
    pub name: Option<String>,
    /// Content hash of an avatar image blob.
    pub image: Option<Hash>,
    /// Content hash of the author's previous envelope. Advisory only.
    pub previous: Option<Hash>,
    /// The message body.
    pub body: String,
}

impl MetaDoc {
    /// Parses a content blob. Text without front-matter is all body.
    pub fn parse(content: &str) -> Self {
        let Some(rest) = content.strip_prefix(FENCE) else {
            return Self {
                body: content.to_string(),
                ..Self::default()
            };
        };
        let Some(end) = rest.find("\n---") else {
            return Self {
                body: content.to_string(),
                ..Self::default()
            };
        };

        let mut doc = Self::default();
        for line in rest[..end].lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "name" => doc.name = Some(value.to_string()),
                "image" => doc.image = Hash::parse(value),
                "previous" => doc.previous = Hash::parse(value),
                _ => {}
            }
        }

        let body = &rest[end + 4..];
        doc.body = body.strip_prefix('\n').unwrap_or(body).to_string();
        doc
    }

    /// Renders the document back to blob text.
    ///
    /// With no front-matter fields set, the output is the bare body,
    /// matching what a plain (non-document) message looks like.
    pub fn compose(&self) -> String {
        if self.name.is_none() && self.image.is_none() && self.previous.is_none() {
            return self.body.clone();
        }
        let mut out = String::from(FENCE);
        if let Some(name) = &self.name {
            out.push_str(&format!("name: {name}\n"));
        }
        if let Some(image) = &self.image {
            out.push_str(&format!("image: {image}\n"));
        }
        if let Some(previous) = &self.previous {
            out.push_str(&format!("previous: {previous}\n"));
        }
        out.push_str("---\n");
        out.push_str(&self.body);
        out
    }

    /// Collects every content hash this document depends on: the `image` and
    /// `previous` fields plus embedded body image references.
    pub fn dependencies(&self) -> Vec<Hash> {
        let mut deps = Vec::new();
        if let Some(image) = &self.image {
            deps.push(image.clone());
        }
        if let Some(previous) = &self.previous {
            deps.push(previous.clone());
        }
        deps.extend(body_image_refs(&self.body));
        deps
    }
}

/// Extracts markdown-style image references whose target is a content hash.
pub fn body_image_refs(body: &str) -> Vec<Hash> {
    let mut refs = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("](") {
        let target = &rest[start + 2..];
        if let Some(end) = target.find(')') {
            if let Some(hash) = Hash::parse(&target[..end]) {
                refs.push(hash);
            }
            rest = &target[end + 1..];
        } else {
            break;
        }
    }
    refs
}
