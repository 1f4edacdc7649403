//! Collaborator seams: the services the engine consumes but does not own.
//!
//! Transcription, content generation and identity live outside this crate.
//! The engine only sees these traits, so tests and the CLI can plug in
//! in-memory implementations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ContentHash, DomainId, UserId};
use crate::ledger::Tier;

/// One unit of contributed text, e.g. a transcribed recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub unit_id: String,
    pub user: UserId,
    pub text: String,
}

/// A generated artifact offered for a reward claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub content_hash: ContentHash,
    pub text: String,
    pub content_type: Option<String>,
    pub domain: DomainId,
}

/// Produces text units to ingest.
pub trait TextSource: Send + Sync {
    /// Units ready for ingestion. Each call returns only new units.
    fn pending_units(&self) -> Vec<TextUnit>;
}

/// Produces candidate artifacts for a user.
pub trait ContentGenerator: Send + Sync {
    fn generated_for(&self, user: &UserId) -> Vec<GeneratedContent>;
}

/// Resolves a user's identity tier. `None` means the user is unknown.
pub trait IdentityService: Send + Sync {
    fn tier(&self, user: &UserId) -> Option<Tier>;
}

impl IdentityService for HashMap<UserId, Tier> {
    fn tier(&self, user: &UserId) -> Option<Tier> {
        self.get(user).copied()
    }
}

impl<F> IdentityService for F
where
    F: Fn(&UserId) -> Option<Tier> + Send + Sync,
{
    fn tier(&self, user: &UserId) -> Option<Tier> {
        self(user)
    }
}

/// A text source that hands out a fixed list of units once.
#[derive(Debug, Default)]
pub struct QueuedTextSource {
    queue: std::sync::Mutex<Vec<TextUnit>>,
}

impl QueuedTextSource {
    pub fn new(units: Vec<TextUnit>) -> Self {
        Self {
            queue: std::sync::Mutex::new(units),
        }
    }

    pub fn push(&self, unit: TextUnit) {
        self.queue.lock().expect("text source lock poisoned").push(unit);
    }
}

impl TextSource for QueuedTextSource {
    fn pending_units(&self) -> Vec<TextUnit> {
        std::mem::take(&mut *self.queue.lock().expect("text source lock poisoned"))
    }
}
