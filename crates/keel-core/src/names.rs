//! Length-safe derived object names.
//!
//! Derived names (`<machine>-machine-plan`, `<cluster>-keel-state`) must
//! stay within the 63-character object-name limit. Joined names that
//! would exceed it are truncated and suffixed with a short content hash
//! so distinct inputs stay distinct.

use sha2::{Digest, Sha256};

const MAX_NAME_LEN: usize = 63;
const HASH_LEN: usize = 6;

/// Join name parts with `-`, truncating with a hash suffix if the result
/// would exceed the object-name length limit.
pub fn safe_concat_name(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-");

    if joined.len() <= MAX_NAME_LEN {
        return joined;
    }

    let digest = Sha256::digest(joined.as_bytes());
    let suffix = &hex::encode(digest)[..HASH_LEN];
    // Keep a separator before the hash so the truncation point is visible.
    format!("{}-{}", &joined[..MAX_NAME_LEN - HASH_LEN - 1], suffix)
}
