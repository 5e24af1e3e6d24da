//! Name normalisation.

use sha2::{Digest, Sha256};

/// Lowercase `input`, replace every run of characters outside `[a-z0-9]` with a
/// single `-`, and trim leading and trailing dashes.
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// First 8 hex characters of the SHA-256 of `input`.
#[must_use]
pub fn short_hash(input: &str) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..8].to_string()
}
