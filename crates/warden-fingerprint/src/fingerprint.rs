//! Salted snapshot fingerprints.
//!
//! Pipeline:
//!
//! ```text
//! canonical bytes ─┬─ SHA-256 ─┐
//!                  └─ BLAKE3 ──┼─ concat ─ SHA-512 ─ hex ─ first 64 chars
//!        timestamp salt ───────┘
//! ```
//!
//! Because the salt changes on every call, equal inputs produce different
//! fingerprints. A fingerprint identifies one snapshot in the forensic log;
//! accept/reject decisions never compare fingerprints.

use crate::canonicalize::canonical_bytes;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of a fingerprint in hex characters.
pub const DIGEST_HEX_LEN: usize = 64;

/// Disambiguates salts taken within the same clock tick.
static SALT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A 64-character lowercase hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The digest as hex text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the digest is exactly [`DIGEST_HEX_LEN`] lowercase
    /// hex characters.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == DIGEST_HEX_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprints `snapshot` with a fresh timestamp salt.
///
/// # Errors
///
/// Returns an error if `snapshot` cannot be serialized to JSON.
pub fn fingerprint<T: Serialize + ?Sized>(snapshot: &T) -> Result<Fingerprint> {
    fingerprint_with_salt(snapshot, &fresh_salt())
}

/// Fingerprints `snapshot` with a caller-supplied salt.
///
/// Deterministic for a fixed salt, which makes the pipeline itself
/// testable.
///
/// # Errors
///
/// Returns an error if `snapshot` cannot be serialized to JSON.
///
/// # Example
///
/// ```rust
/// use warden_fingerprint::fingerprint_with_salt;
/// use serde_json::json;
///
/// let a = fingerprint_with_salt(&json!({"score": 1}), b"salt")?;
/// let b = fingerprint_with_salt(&json!({"score": 1}), b"salt")?;
/// assert_eq!(a, b);
/// # Ok::<(), warden_fingerprint::FingerprintError>(())
/// ```
pub fn fingerprint_with_salt<T: Serialize + ?Sized>(snapshot: &T, salt: &[u8]) -> Result<Fingerprint> {
    let bytes = canonical_bytes(snapshot)?;

    let sha = hex(&Sha256::digest(&bytes));
    let blake = blake3::hash(&bytes).to_hex();

    let mut outer = Sha512::new();
    outer.update(sha.as_bytes());
    outer.update(blake.as_bytes());
    outer.update(salt);

    let mut digest = hex(&outer.finalize());
    digest.truncate(DIGEST_HEX_LEN);
    Ok(Fingerprint(digest))
}

fn fresh_salt() -> Vec<u8> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let seq = SALT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos}:{seq}").into_bytes()
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
