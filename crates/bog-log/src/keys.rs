//! Fixed store keys for persisted state.
//!
//! These share the key space with content-addressed blobs; none of them is
//! 44 characters, so they can never collide with a content hash.

/// The local identity keypair, as one concatenated string.
pub const KEYPAIR: &str = "keypair";

/// The ordered envelope hash array, serialized as JSON.
pub const HASHLOG: &str = "hashlog";

/// The decoded log entry array, serialized as JSON.
pub const OPENEDLOG: &str = "openedlog";

/// The local profile name included in composed documents.
pub const NAME: &str = "name";

/// Content hash of the local avatar image.
pub const IMAGE: &str = "image";

/// Hash of the most recently signed envelope (advisory chain link).
pub const PREVIOUS: &str = "previous";
