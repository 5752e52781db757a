//! Opaque row keys
//!
//! Every version row (and every link) gets an 8-character Base58 key that
//! never changes, independent of the row's path.

use uuid::Uuid;

/// Length of every generated key
pub const KEY_LENGTH: usize = 8;

/// Generate a fresh random key
///
/// Encodes a v4 UUID as Base58 and keeps the trailing characters, which are
/// the least significant digits and therefore close to uniformly distributed.
pub fn generate() -> String {
    let encoded = bs58::encode(Uuid::new_v4().as_bytes()).into_string();
    encoded[encoded.len() - KEY_LENGTH..].to_string()
}

/// Whether `s` has the length of a key
///
/// A path can share this shape, so callers must still look both up.
pub fn is_key_length(s: &str) -> bool {
    s.len() == KEY_LENGTH
}
