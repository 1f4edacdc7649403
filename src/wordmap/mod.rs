//! Wordmaps: bounded term → frequency fingerprints.
//!
//! - [`merge`]: the one decay-merge rule used wherever a wordmap is updated
//! - [`contributor`]: per-user accumulators built from ingested content
//! - [`domain`]: ownership-weighted aggregates, always fully recomputed
//!
//! [`Wordmap`] itself is an ordered map, so iteration, serialization, and
//! floating-point accumulation order are all deterministic.

pub mod contributor;
pub mod domain;
pub mod merge;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use contributor::ContributorWordmap;
pub use domain::{DomainWordmap, OwnerShare, WordmapComparison};

/// Default bound on the number of terms in any wordmap.
pub const DEFAULT_CAP: usize = 200;

/// A bounded term → weight mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wordmap {
    terms: BTreeMap<String, f64>,
}

impl Wordmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw counts, dropping non-positive or non-finite weights and
    /// keeping the `cap` heaviest terms.
    pub fn from_counts(counts: BTreeMap<String, f64>, cap: usize) -> Self {
        let mut wm = Self {
            terms: counts
                .into_iter()
                .filter(|(term, w)| !term.is_empty() && w.is_finite() && *w > 0.0)
                .collect(),
        };
        wm.truncate(cap);
        wm
    }

    pub fn get(&self, term: &str) -> Option<f64> {
        self.terms.get(term).copied()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterate in term order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.terms.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn term_set(&self) -> BTreeSet<&str> {
        self.terms.keys().map(String::as_str).collect()
    }

    /// Sum of all weights.
    pub fn mass(&self) -> f64 {
        self.terms.values().sum()
    }

    pub(crate) fn entry(&mut self, term: &str) -> &mut f64 {
        self.terms.entry(term.to_string()).or_insert(0.0)
    }

    pub(crate) fn retain(&mut self, f: impl FnMut(&String, &mut f64) -> bool) {
        self.terms.retain(f);
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.terms.values_mut()
    }

    /// Terms sorted heaviest first; ties broken by term so the order is total.
    pub fn ranked(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked
    }

    /// Keep only the `cap` heaviest terms.
    pub fn truncate(&mut self, cap: usize) {
        if self.terms.len() <= cap {
            return;
        }
        let keep: BTreeSet<String> = self
            .ranked()
            .into_iter()
            .take(cap)
            .map(|(t, _)| t.to_string())
            .collect();
        self.terms.retain(|t, _| keep.contains(t));
    }

    /// Jaccard similarity of the two term sets. Two empty maps score 0.
    pub fn jaccard(&self, other: &Wordmap) -> f64 {
        let union = self
            .terms
            .keys()
            .chain(other.terms.keys())
            .collect::<BTreeSet<_>>()
            .len();
        if union == 0 {
            return 0.0;
        }
        let intersection = self.terms.keys().filter(|t| other.terms.contains_key(*t)).count();
        intersection as f64 / union as f64
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Wordmap {
    /// Collect without truncation; duplicate terms are summed.
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut counts = BTreeMap::new();
        for (term, w) in iter {
            *counts.entry(term.into()).or_insert(0.0) += w;
        }
        Self::from_counts(counts, usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_heaviest_with_term_tiebreak() {
        let mut wm: Wordmap = [("b", 2.0), ("a", 2.0), ("c", 5.0), ("d", 1.0)]
            .into_iter()
            .collect();
        wm.truncate(2);
        assert_eq!(wm.term_set(), ["a", "c"].into_iter().collect());
    }

    #[test]
    fn from_counts_drops_invalid_weights() {
        let wm: Wordmap = [("ok", 1.0), ("zero", 0.0), ("neg", -3.0), ("nan", f64::NAN)]
            .into_iter()
            .collect();
        assert_eq!(wm.len(), 1);
        assert!(wm.contains("ok"));
    }

    #[test]
    fn jaccard_is_order_insensitive() {
        let a: Wordmap = [("x", 1.0), ("y", 9.0)].into_iter().collect();
        let b: Wordmap = [("y", 1.0), ("z", 1.0)].into_iter().collect();
        assert!((a.jaccard(&b) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(a.jaccard(&b), b.jaccard(&a));
        assert_eq!(Wordmap::new().jaccard(&Wordmap::new()), 0.0);
    }

    #[test]
    fn ranked_is_heaviest_first() {
        let wm: Wordmap = [("low", 1.0), ("high", 3.0)].into_iter().collect();
        assert_eq!(wm.ranked()[0], ("high", 3.0));
        assert_eq!(wm.mass(), 4.0);
    }
}
