//! Process-Wide Interning Pools
//!
//! Unique [`Identity`] and [`Keyword`] records live behind stable `Arc`
//! handles for the lifetime of the process. Two interned handles for the same
//! logical value compare equal as pointers, which the hot comparison paths
//! exploit; equality still holds by digest/canonical-string comparison when an
//! interned handle meets a non-interned record.
//!
//! ## Concurrency
//!
//! The pools are sharded maps: readers resolving an existing handle take no
//! global lock, writers contend only within a shard. Handles, once published,
//! are never replaced, so `Arc::ptr_eq` stays valid for the process lifetime.

use crate::value::identity::{Identity, HASH_LEN};
use crate::value::keyword::Keyword;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};

static IDENTITIES: OnceLock<DashMap<[u8; HASH_LEN], Arc<Identity>>> = OnceLock::new();
static KEYWORDS: OnceLock<DashMap<String, Arc<Keyword>>> = OnceLock::new();

fn identity_pool() -> &'static DashMap<[u8; HASH_LEN], Arc<Identity>> {
    IDENTITIES.get_or_init(DashMap::new)
}

fn keyword_pool() -> &'static DashMap<String, Arc<Keyword>> {
    KEYWORDS.get_or_init(DashMap::new)
}

/// Intern an identity record, returning the stable handle for its digest.
///
/// First publication wins: a digest minted with a display name keeps that
/// name, and a bare digest arriving first is not upgraded when the named
/// variant shows up later. Equality is digest-based either way.
pub(crate) fn intern_identity(identity: Identity) -> Arc<Identity> {
    let pool = identity_pool();
    let (hash, name) = identity.into_parts();
    if let Some(existing) = pool.get(&hash) {
        return Arc::clone(&existing);
    }
    pool.entry(hash)
        .or_insert_with(|| Arc::new(Identity::from_parts(hash, name)))
        .clone()
}

/// Intern a keyword record, returning the stable handle for its canonical form.
pub(crate) fn intern_keyword(keyword: Keyword) -> Arc<Keyword> {
    let pool = keyword_pool();
    if let Some(existing) = pool.get(keyword.canonical()) {
        return Arc::clone(&existing);
    }
    pool.entry(keyword.canonical().to_string())
        .or_insert_with(|| Arc::new(keyword))
        .clone()
}

/// Number of interned identities (diagnostics).
pub fn identity_pool_size() -> usize {
    identity_pool().len()
}

/// Number of interned keywords (diagnostics).
pub fn keyword_pool_size() -> usize {
    keyword_pool().len()
}
