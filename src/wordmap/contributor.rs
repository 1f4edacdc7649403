//! Per-contributor wordmaps: a decayed accumulator of everything a user submitted.

use serde::{Deserialize, Serialize};

use super::Wordmap;
use super::merge::merge;
use crate::error::WordmapError;
use crate::ids::UserId;

/// A contributor's linguistic fingerprint.
///
/// Created by the first content unit and only ever appended to afterwards.
/// The first unit is also kept verbatim in `pure_source` as provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorWordmap {
    pub owner: UserId,
    pub terms: Wordmap,
    /// Number of content units merged in so far.
    pub recording_count: u64,
    /// Id of the first content unit.
    pub source_id: String,
    /// The first unit's wordmap, undecayed.
    pub pure_source: Wordmap,
    /// Seconds since UNIX epoch of the last merge.
    pub last_updated: u64,
}

impl ContributorWordmap {
    /// Start a wordmap from a user's first content unit.
    pub fn first(
        owner: UserId,
        unit_id: impl Into<String>,
        incoming: Wordmap,
        cap: usize,
        now: u64,
    ) -> Result<Self, WordmapError> {
        if incoming.is_empty() {
            return Err(WordmapError::EmptyIncoming {
                owner: owner.to_string(),
            });
        }
        let mut terms = incoming.clone();
        terms.truncate(cap);
        Ok(Self {
            owner,
            terms,
            recording_count: 1,
            source_id: unit_id.into(),
            pure_source: incoming,
            last_updated: now,
        })
    }

    /// Merge one more content unit in. An empty unit is rejected and leaves
    /// the wordmap untouched.
    pub fn absorb(
        &mut self,
        incoming: &Wordmap,
        decay: f64,
        cap: usize,
        now: u64,
    ) -> Result<(), WordmapError> {
        if incoming.is_empty() {
            return Err(WordmapError::EmptyIncoming {
                owner: self.owner.to_string(),
            });
        }
        self.terms = merge(&self.terms, incoming, decay, cap);
        self.recording_count += 1;
        self.last_updated = self.last_updated.max(now);
        Ok(())
    }

    /// Create-or-merge: the single entry point used by ingestion.
    pub fn accumulate(
        existing: Option<&ContributorWordmap>,
        owner: &UserId,
        unit_id: &str,
        incoming: Wordmap,
        decay: f64,
        cap: usize,
        now: u64,
    ) -> Result<Self, WordmapError> {
        match existing {
            None => Self::first(owner.clone(), unit_id, incoming, cap, now),
            Some(current) => {
                let mut next = current.clone();
                next.absorb(&incoming, decay, cap, now)?;
                Ok(next)
            }
        }
    }
}
