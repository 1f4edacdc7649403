//! Alignment scoring: how well a candidate text matches a target vocabulary.
//!
//! Alignment is the Jaccard similarity of the candidate's term set and the
//! target wordmap's term set. Term order and counts are deliberately ignored:
//! the question is whether the candidate speaks the domain's vocabulary.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WordmapError;
use crate::ids::DomainId;
use crate::text::{ExtractionSlots, TextProcessor, extract_bounded};
use crate::wordmap::{DomainWordmap, Wordmap};

/// A scored candidate with the overlap that produced the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    /// Jaccard similarity in [0, 1].
    pub score: f64,
    pub matched_terms: usize,
    pub candidate_terms: usize,
    pub target_terms: usize,
}

impl Alignment {
    fn between(candidate: &Wordmap, target: &Wordmap) -> Self {
        let matched_terms = candidate.iter().filter(|(t, _)| target.contains(t)).count();
        Self {
            score: candidate.jaccard(target),
            matched_terms,
            candidate_terms: candidate.len(),
            target_terms: target.len(),
        }
    }

    fn zero(target: &Wordmap) -> Self {
        Self {
            score: 0.0,
            matched_terms: 0,
            candidate_terms: 0,
            target_terms: target.len(),
        }
    }
}

/// Scores candidate texts against domain wordmaps.
#[derive(Clone)]
pub struct AlignmentScorer {
    processor: Arc<dyn TextProcessor>,
    timeout: Duration,
    slots: ExtractionSlots,
}

impl std::fmt::Debug for AlignmentScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentScorer")
            .field("timeout", &self.timeout)
            .field("in_flight", &self.slots.in_use())
            .finish()
    }
}

impl AlignmentScorer {
    pub fn new(processor: Arc<dyn TextProcessor>, timeout: Duration) -> Self {
        Self {
            processor,
            timeout,
            slots: ExtractionSlots::default(),
        }
    }

    /// Extract the candidate wordmap under the configured timeout.
    pub fn candidate_wordmap(&self, text: &str) -> Wordmap {
        extract_bounded(
            Arc::clone(&self.processor),
            text.to_string(),
            self.timeout,
            &self.slots,
        )
    }

    /// Score `text` against `target`.
    ///
    /// A missing or empty target is an error; an empty candidate scores 0.
    pub fn score(
        &self,
        domain: &DomainId,
        text: &str,
        target: Option<&DomainWordmap>,
    ) -> Result<Alignment, WordmapError> {
        let target = match target {
            Some(t) if !t.terms.is_empty() => &t.terms,
            _ => {
                return Err(WordmapError::DomainNotFound {
                    domain: domain.to_string(),
                });
            }
        };
        let candidate = self.candidate_wordmap(text);
        Ok(score_wordmaps(&candidate, target))
    }
}

/// Score an already-extracted candidate against a non-empty target.
pub fn score_wordmaps(candidate: &Wordmap, target: &Wordmap) -> Alignment {
    if candidate.is_empty() {
        return Alignment::zero(target);
    }
    Alignment::between(candidate, target)
}
