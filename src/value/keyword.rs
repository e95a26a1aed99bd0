//! Namespaced Keywords
//!
//! A [`Keyword`] is an immutable `:namespace/name` identifier, used for datom
//! attributes. Equality is string equality of the canonical form; interned
//! handles additionally compare by pointer on hot paths.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An immutable namespaced identifier such as `:user/name`.
pub struct Keyword {
    /// Canonical form including the leading colon, e.g. `:user/name`
    canonical: String,
    /// Byte offset of the name segment within `canonical`
    name_start: usize,
}

impl Keyword {
    /// Intern a keyword from namespace and name parts.
    pub fn new(namespace: &str, name: &str) -> Arc<Keyword> {
        let canonical = format!(":{namespace}/{name}");
        let name_start = canonical.len() - name.len();
        crate::value::intern::intern_keyword(Keyword {
            canonical,
            name_start,
        })
    }

    /// Intern a keyword from its canonical form (`:ns/name` or `:name`).
    ///
    /// Returns `None` when `text` is not a keyword literal.
    pub fn parse(text: &str) -> Option<Arc<Keyword>> {
        let rest = text.strip_prefix(':')?;
        if rest.is_empty() {
            return None;
        }
        let name_start = match rest.find('/') {
            Some(slash) if slash + 1 < rest.len() => 1 + slash + 1,
            Some(_) => return None,
            None => 1,
        };
        Some(crate::value::intern::intern_keyword(Keyword {
            canonical: text.to_string(),
            name_start,
        }))
    }

    /// The canonical form, including the leading colon.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The namespace segment, if present.
    pub fn namespace(&self) -> Option<&str> {
        if self.name_start > 1 {
            Some(&self.canonical[1..self.name_start - 1])
        } else {
            None
        }
    }

    /// The name segment.
    pub fn name(&self) -> &str {
        &self.canonical[self.name_start..]
    }
}

impl PartialEq for Keyword {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Keyword {}

impl PartialOrd for Keyword {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Keyword {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl Hash for Keyword {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

impl fmt::Debug for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keyword({})", self.canonical)
    }
}
