//! Content-Addressed Entity Identities
//!
//! An [`Identity`] is a 20-byte digest handle for an entity. Minting one from
//! a string hashes the string; reconstructing one from storage carries only
//! the digest. The display name is debugging metadata and never participates
//! in equality, ordering, or hashing, so identities survive storage
//! round-trips: a digest read back from an index key compares equal to the
//! originally minted handle and interns to the same pointer.

use sha1::{Digest, Sha1};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Length of an identity digest in bytes
pub const HASH_LEN: usize = 20;

/// A content-addressed entity handle.
///
/// Equality, ordering, and hashing are defined over the digest alone.
pub struct Identity {
    hash: [u8; HASH_LEN],
    name: Option<String>,
}

impl Identity {
    /// Mint an identity from a source string.
    ///
    /// The digest is the SHA-1 of the string's bytes; the string is retained
    /// as the display name. Returns the process-wide interned handle.
    pub fn from_name(name: &str) -> Arc<Identity> {
        let mut hasher = Sha1::new();
        hasher.update(name.as_bytes());
        let hash: [u8; HASH_LEN] = hasher.finalize().into();
        crate::value::intern::intern_identity(Identity {
            hash,
            name: Some(name.to_string()),
        })
    }

    /// Reconstruct an identity from a bare digest (storage round-trip path).
    ///
    /// If the identity was previously minted with a name, the named handle is
    /// returned; otherwise the handle carries no display name.
    pub fn from_hash(hash: [u8; HASH_LEN]) -> Arc<Identity> {
        crate::value::intern::intern_identity(Identity { hash, name: None })
    }

    /// The 20-byte digest.
    pub fn hash(&self) -> &[u8; HASH_LEN] {
        &self.hash
    }

    /// The display name, if this handle was minted from a string.
    ///
    /// Debugging output only; never consulted for equality.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn into_parts(self) -> ([u8; HASH_LEN], Option<String>) {
        (self.hash, self.name)
    }

    pub(crate) fn from_parts(hash: [u8; HASH_LEN], name: Option<String>) -> Identity {
        Identity { hash, name }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Identity {}

impl PartialOrd for Identity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", hex::encode(self.hash)),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Identity({} {})", &hex::encode(self.hash)[..8], name),
            None => write!(f, "Identity({})", &hex::encode(self.hash)[..8]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_hash_based() {
        let minted = Identity::from_name("alice");
        let restored = Identity::from_hash(*minted.as_ref().hash());
        assert_eq!(minted, restored);
    }

    #[test]
    fn test_round_trip_interns_to_same_handle() {
        let minted = Identity::from_name("bob");
        let restored = Identity::from_hash(*minted.as_ref().hash());
        assert!(Arc::ptr_eq(&minted, &restored));
    }

    #[test]
    fn test_distinct_names_distinct_identities() {
        let a = Identity::from_name("alice");
        let b = Identity::from_name("bob");
        assert_ne!(a, b);
        assert_ne!(a.as_ref().hash(), b.as_ref().hash());
    }

    #[test]
    fn test_deterministic_digest() {
        // SHA-1 of a fixed string is stable across runs
        let a = Identity::from_name("fixture");
        let b = Identity::from_name("fixture");
        assert_eq!(a.as_ref().hash(), b.as_ref().hash());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
