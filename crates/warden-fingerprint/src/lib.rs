//! # Warden Fingerprint
//!
//! Hashing primitives for the Warden snapshot store.
//!
//! ## Components
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`canonicalize`] | Deterministic JSON bytes (sorted keys, minimal escaping) |
//! | [`fingerprint`] | Salted forensic digest of a snapshot, 64 hex chars |
//! | [`digest_fields`] | Unsalted SHA-256 per tracked field |
//! | [`compare_fields`] | Field-level drift report between two digest sets |
//!
//! ## Two kinds of hash
//!
//! Fingerprints mix in a fresh timestamp salt, so fingerprinting the same
//! state twice yields two different digests. They identify a snapshot in
//! the forensic log and are never compared for equality.
//!
//! Field digests are unsalted and deterministic. They replace pointer
//! identity as the signal for "this field changed" and drive the drift
//! check.
//!
//! ```rust
//! use warden_fingerprint::{digest_fields, fingerprint, DIGEST_HEX_LEN};
//! use warden_types::TrackedState;
//!
//! let state = TrackedState::new().with_field("score", 10);
//!
//! let a = fingerprint(&state)?;
//! let b = fingerprint(&state)?;
//! assert_eq!(a.as_str().len(), DIGEST_HEX_LEN);
//! assert_eq!(b.as_str().len(), DIGEST_HEX_LEN);
//!
//! assert_eq!(digest_fields(&state), digest_fields(&state));
//! # Ok::<(), warden_fingerprint::FingerprintError>(())
//! ```

pub mod canonicalize;
mod drift;
mod error;
mod fingerprint;

pub use canonicalize::{canonical_bytes, canonicalize};
pub use drift::{
    compare_fields, digest_fields, digest_value, ChangeKind, DriftLevel, FieldChange, FieldDigest,
    FieldDigests, FieldDrift,
};
pub use error::{FingerprintError, Result};
pub use fingerprint::{fingerprint, fingerprint_with_salt, Fingerprint, DIGEST_HEX_LEN};
