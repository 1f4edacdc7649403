//! Identifier types for the verbum engine.
//!
//! Users, domains, content hashes and distribution runs are named by
//! validated string newtypes; medallions get niche-optimized numeric ids from
//! an [`AtomicIdAllocator`]. All string ids are checked once at the boundary so
//! every id inside the engine is safe to embed in a store key.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::IdError;

const MAX_ID_LEN: usize = 128;

fn validate(kind: &'static str, raw: &str) -> Result<(), IdError> {
    let reason = if raw.is_empty() {
        Some("must not be empty")
    } else if raw.len() > MAX_ID_LEN {
        Some("longer than 128 bytes")
    } else if raw.trim() != raw {
        Some("has surrounding whitespace")
    } else if raw.contains('/') {
        Some("contains '/'")
    } else if raw.chars().any(char::is_control) {
        Some("contains control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(IdError::Invalid {
            kind,
            raw: raw.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident, $kind:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
                let raw = raw.into();
                validate($kind, &raw)?;
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// A contributor / stakeholder, as issued by the identity service.
    UserId,
    "user"
);
string_id!(
    /// A content domain whose revenue is shared among owners.
    DomainId,
    "domain"
);
string_id!(
    /// Hash of a generated content artifact; the idempotency key for claims.
    ContentHash,
    "content hash"
);
string_id!(
    /// Caller-chosen identifier of one distribution run.
    RunId,
    "run"
);

/// Unique, niche-optimized identifier for a medallion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MedallionId(NonZeroU64);

impl MedallionId {
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(MedallionId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for MedallionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "med:{}", self.0)
    }
}

/// Thread-safe id allocator producing monotonically increasing ids from 1.
#[derive(Debug)]
pub struct AtomicIdAllocator {
    next: AtomicU64,
}

impl AtomicIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Create an allocator that resumes from a given id (after reloading state).
    pub fn starting_from(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start.max(1)),
        }
    }

    /// Allocate the next medallion id.
    pub fn next_id(&self) -> Result<MedallionId, IdError> {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        MedallionId::new(raw).ok_or(IdError::AllocatorExhausted)
    }

    /// Allocate the next raw sequence number (audit events).
    pub fn next_seq(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The next id that *would* be allocated, without consuming it.
    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for AtomicIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Seconds since the UNIX epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medallion_id_niche_optimization() {
        assert_eq!(
            std::mem::size_of::<Option<MedallionId>>(),
            std::mem::size_of::<MedallionId>()
        );
    }

    #[test]
    fn string_ids_reject_unsafe_input() {
        assert!(UserId::new("alice").is_ok());
        assert!(UserId::new("").is_err());
        assert!(UserId::new(" alice").is_err());
        assert!(DomainId::new("jazz/bebop").is_err());
        assert!(DomainId::new("tab\there").is_err());
        assert!(ContentHash::new("a".repeat(129)).is_err());
    }

    #[test]
    fn string_id_serde_validates() {
        let ok: UserId = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(ok.as_str(), "bob");
        let bad: Result<UserId, _> = serde_json::from_str("\"a/b\"");
        assert!(bad.is_err());
    }

    #[test]
    fn allocator_produces_sequential_ids() {
        let alloc = AtomicIdAllocator::new();
        assert_eq!(alloc.next_id().unwrap().get(), 1);
        assert_eq!(alloc.next_id().unwrap().get(), 2);
        assert_eq!(alloc.peek_next(), 3);
    }

    #[test]
    fn allocator_starting_from() {
        let alloc = AtomicIdAllocator::starting_from(100);
        assert_eq!(alloc.next_id().unwrap().get(), 100);
        assert_eq!(AtomicIdAllocator::starting_from(0).peek_next(), 1);
    }

    #[test]
    fn medallion_id_display() {
        assert_eq!(MedallionId::new(7).unwrap().to_string(), "med:7");
    }
}
