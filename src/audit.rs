//! Ledger audit trail: how every ownership share came to be.
//!
//! Each unlock, reward increase and admin revocation appends one event. Rows
//! in the ledger are never deleted, so the trail plus the current row explain
//! the full history of a share.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::ids::{AtomicIdAllocator, ContentHash, DomainId, UserId};

/// What kind of ledger mutation happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    Unlocked,
    /// Reward credited for a settled claim.
    Rewarded { content_hash: ContentHash },
    /// Admin revocation, with the operator's reason.
    Revoked { reason: String },
}

/// A single audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub seq: u64,
    pub kind: AuditKind,
    pub user: UserId,
    pub domain: DomainId,
    pub before_bps: u32,
    pub after_bps: u32,
    /// Seconds since UNIX epoch.
    pub timestamp: u64,
}

/// Append-only, in-memory view of the audit trail.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: RwLock<Vec<AuditEvent>>,
    seq: AtomicIdAllocator,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore events read back from the store, resuming the sequence.
    pub fn from_events(mut events: Vec<AuditEvent>) -> Self {
        events.sort_by_key(|e| e.seq);
        let next = events.last().map(|e| e.seq + 1).unwrap_or(1);
        Self {
            events: RwLock::new(events),
            seq: AtomicIdAllocator::starting_from(next),
        }
    }

    /// Build the next event without appending it.
    pub fn prepare(
        &self,
        kind: AuditKind,
        user: &UserId,
        domain: &DomainId,
        before_bps: u32,
        after_bps: u32,
        timestamp: u64,
    ) -> AuditEvent {
        AuditEvent {
            seq: self.seq.next_seq(),
            kind,
            user: user.clone(),
            domain: domain.clone(),
            before_bps,
            after_bps,
            timestamp,
        }
    }

    /// Publish a committed event at its sequence position.
    ///
    /// Commits in different domains may finish out of sequence order; keeping
    /// the list sorted makes reads match what a restart reloads. Sequence
    /// numbers are strictly increasing but not dense: a failed commit leaves
    /// its number unused.
    pub fn append(&self, event: AuditEvent) {
        let mut events = self.events.write().expect("audit lock poisoned");
        let at = events.partition_point(|e| e.seq < event.seq);
        events.insert(at, event);
    }

    /// Events touching `domain`, oldest first.
    pub fn for_domain(&self, domain: &DomainId) -> Vec<AuditEvent> {
        self.events
            .read()
            .expect("audit lock poisoned")
            .iter()
            .filter(|e| &e.domain == domain)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().expect("audit lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
