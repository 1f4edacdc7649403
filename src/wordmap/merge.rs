//! The decay merge: how older wordmap mass is discounted as new content arrives.
//!
//! Every existing term is multiplied by `decay` but never falls below 1.0, so a
//! term once seen is never forgotten outright. Incoming counts are added at
//! full weight, then the result is truncated to the heaviest `cap` terms.
//! An empty `incoming` only decays `existing`.

use super::Wordmap;

/// Weight floor for a term that has been seen at least once.
pub const TERM_FLOOR: f64 = 1.0;

/// Decay `existing`, add `incoming`, and keep the top `cap` terms.
pub fn merge(existing: &Wordmap, incoming: &Wordmap, decay: f64, cap: usize) -> Wordmap {
    let mut merged = existing.clone();
    for w in merged.values_mut() {
        *w = (*w * decay).max(TERM_FLOOR);
    }
    for (term, count) in incoming.iter() {
        *merged.entry(term) += count;
    }
    merged.truncate(cap);
    merged
}
