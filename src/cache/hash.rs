//! SHA-256 digests for content keys and embedded payloads.

use sha2::{Digest, Sha256};

/// SHA-256 of a text, as 64 lowercase hex characters.
pub fn hash_text(text: &str) -> String {
    hash_parts([text])
}

/// SHA-256 over several texts, each terminated by a NUL byte so that
/// `["ab", "c"]` and `["a", "bc"]` hash differently.
///
/// Embedded payloads hash their schema header followed by every encoded
/// block, which ties a digest to both the columns and the row order.
pub fn hash_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
