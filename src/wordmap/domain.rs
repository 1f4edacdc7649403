//! Domain wordmaps: the ownership-weighted aggregate of all owners' vocabularies.
//!
//! A domain wordmap is never patched in place. [`recalculate`] rebuilds it from
//! scratch out of the ownership rows and contributor wordmaps, so replaying the
//! same inputs always reproduces the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::contributor::ContributorWordmap;
use super::Wordmap;
use crate::error::WordmapError;
use crate::ids::{DomainId, UserId};

/// Aggregated weights below this are dropped.
pub const WEIGHT_FLOOR: f64 = 1.0;

/// The fully derived vocabulary fingerprint of one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainWordmap {
    pub domain: DomainId,
    pub terms: Wordmap,
    /// Owners with a positive share whose wordmap contributed.
    pub contributor_count: u32,
    /// Content units behind the contributing wordmaps.
    pub total_units: u64,
    /// Latest `last_updated` among the contributing wordmaps.
    pub last_updated: u64,
}

/// One owner's input to a recalculation.
#[derive(Debug, Clone, Copy)]
pub struct OwnerShare<'a> {
    pub user: &'a UserId,
    /// Ownership share in basis points.
    pub bps: u32,
    pub wordmap: Option<&'a ContributorWordmap>,
}

/// Rebuild a domain wordmap from its owners.
///
/// `weight(term) = Σ count(owner, term) × bps(owner) / 10000`, keeping terms
/// with weight ≥ 1 and at most `cap` of them. Owners are folded in user order
/// regardless of the order given. Fails if no owner holds a positive share.
pub fn recalculate(
    domain: &DomainId,
    owners: &[OwnerShare<'_>],
    cap: usize,
) -> Result<DomainWordmap, WordmapError> {
    let mut active: Vec<&OwnerShare<'_>> = owners.iter().filter(|o| o.bps > 0).collect();
    if active.is_empty() {
        return Err(WordmapError::NoOwners {
            domain: domain.to_string(),
        });
    }
    active.sort_by(|a, b| a.user.cmp(b.user));

    let mut weighted: BTreeMap<String, f64> = BTreeMap::new();
    let mut contributor_count = 0u32;
    let mut total_units = 0u64;
    let mut last_updated = 0u64;

    for owner in active {
        let Some(cwm) = owner.wordmap else {
            tracing::debug!(%domain, user = %owner.user, "owner has no wordmap yet; skipping");
            continue;
        };
        contributor_count += 1;
        total_units += cwm.recording_count;
        last_updated = last_updated.max(cwm.last_updated);
        let bps = f64::from(owner.bps);
        for (term, count) in cwm.terms.iter() {
            *weighted.entry(term.to_string()).or_insert(0.0) += count * bps / 10_000.0;
        }
    }

    weighted.retain(|_, w| *w >= WEIGHT_FLOOR);
    let terms = Wordmap::from_counts(weighted, cap);
    tracing::debug!(%domain, terms = terms.len(), contributor_count, "recalculated domain wordmap");

    Ok(DomainWordmap {
        domain: domain.clone(),
        terms,
        contributor_count,
        total_units,
        last_updated,
    })
}

/// Diagnostic comparison of two domains' vocabularies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordmapComparison {
    pub jaccard: f64,
    pub shared: Vec<String>,
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
}

/// Jaccard similarity plus the symmetric difference, term lists sorted.
pub fn compare(a: &Wordmap, b: &Wordmap) -> WordmapComparison {
    let set_a = a.term_set();
    let set_b = b.term_set();
    WordmapComparison {
        jaccard: a.jaccard(b),
        shared: set_a.intersection(&set_b).map(|t| t.to_string()).collect(),
        only_in_a: set_a.difference(&set_b).map(|t| t.to_string()).collect(),
        only_in_b: set_b.difference(&set_a).map(|t| t.to_string()).collect(),
    }
}
