//! Reward settlement: turning an alignment score into an ownership increase.
//!
//! A claim is keyed by (content hash, user, domain). The first successful
//! claim for a key is recorded; every later claim with the same key returns
//! that record unchanged instead of crediting again.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;
use crate::ids::{ContentHash, DomainId, UserId};
use crate::ledger::{IncreaseOutcome, OwnershipLedger, bps_to_percent};
use crate::scoring::Alignment;

/// A candidate artifact submitted for reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub user: UserId,
    pub domain: DomainId,
    pub content_hash: ContentHash,
    pub text: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Uniqueness key of a claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimKey {
    pub content_hash: ContentHash,
    pub user: UserId,
    pub domain: DomainId,
}

impl ClaimKey {
    pub fn of(request: &ClaimRequest) -> Self {
        Self {
            content_hash: request.content_hash.clone(),
            user: request.user.clone(),
            domain: request.domain.clone(),
        }
    }
}

/// A settled claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardClaim {
    pub key: ClaimKey,
    pub content_type: Option<String>,
    pub alignment: f64,
    /// Reward earned by the alignment, before clipping.
    pub requested_bps: u32,
    /// Reward actually credited to the ledger.
    pub reward_bps: u32,
    /// The user's share right after this claim settled.
    pub ownership_bps: u32,
    pub claimed_at: u64,
}

/// What a claim call reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub alignment_score: f64,
    pub reward_pct: f64,
    pub applied_pct: f64,
    pub new_ownership_pct: f64,
    /// True when this call replayed an earlier settlement.
    pub replayed: bool,
}

impl ClaimOutcome {
    pub fn from_claim(claim: &RewardClaim, replayed: bool) -> Self {
        Self {
            alignment_score: claim.alignment,
            reward_pct: bps_to_percent(claim.requested_bps),
            applied_pct: bps_to_percent(claim.reward_bps),
            new_ownership_pct: bps_to_percent(claim.ownership_bps),
            replayed,
        }
    }
}

/// Slack for float error when flooring a reward to basis points.
const REWARD_EPSILON: f64 = 1e-9;

/// Threshold and reward scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardPolicy {
    pub min_alignment: f64,
    pub max_reward_bps: u32,
}

impl RewardPolicy {
    /// Reward for an alignment, monotonic in the score.
    ///
    /// Floors to whole basis points after absorbing float error, so a product
    /// such as `0.29 × 200 = 57.999…` credits 58.
    pub fn reward_bps(&self, alignment: f64) -> u32 {
        let scaled = alignment.clamp(0.0, 1.0) * f64::from(self.max_reward_bps);
        ((scaled + REWARD_EPSILON).floor() as u32).min(self.max_reward_bps)
    }

    /// Reward for an alignment, or `BelowThreshold` carrying the score.
    pub fn evaluate(&self, alignment: f64) -> Result<u32, SettlementError> {
        if alignment < self.min_alignment {
            return Err(SettlementError::BelowThreshold {
                alignment,
                threshold: self.min_alignment,
            });
        }
        Ok(self.reward_bps(alignment))
    }
}

/// A planned, not yet committed settlement.
#[derive(Debug, Clone)]
pub struct PlannedSettlement {
    pub claim: RewardClaim,
    pub increase: IncreaseOutcome,
}

/// Registry of settled claims plus the reward policy.
#[derive(Debug)]
pub struct RewardSettlement {
    claims: DashMap<ClaimKey, RewardClaim>,
    policy: RewardPolicy,
}

impl RewardSettlement {
    pub fn new(policy: RewardPolicy) -> Self {
        Self {
            claims: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RewardPolicy {
        self.policy
    }

    pub fn load(&self, claims: impl IntoIterator<Item = RewardClaim>) {
        for claim in claims {
            self.claims.insert(claim.key.clone(), claim);
        }
    }

    /// The earlier settlement for this key, if any.
    pub fn prior(&self, key: &ClaimKey) -> Option<RewardClaim> {
        self.claims.get(key).map(|c| c.value().clone())
    }

    /// Plan a settlement: check the threshold and plan the ledger increase.
    /// Nothing is mutated.
    pub fn plan(
        &self,
        request: &ClaimRequest,
        alignment: &Alignment,
        ledger: &OwnershipLedger,
        now: u64,
    ) -> Result<PlannedSettlement, SettlementError> {
        let requested_bps = self.policy.evaluate(alignment.score)?;
        let increase = ledger
            .plan_increase(&request.user, &request.domain, requested_bps, now)
            .map_err(|source| SettlementError::Rejected {
                alignment: alignment.score,
                source,
            })?;
        let claim = RewardClaim {
            key: ClaimKey::of(request),
            content_type: request.content_type.clone(),
            alignment: alignment.score,
            requested_bps,
            reward_bps: increase.applied_bps,
            ownership_bps: increase.row.bps,
            claimed_at: now,
        };
        Ok(PlannedSettlement { claim, increase })
    }

    /// Record a committed claim. Returns the existing record if the key was
    /// already settled, leaving it untouched.
    pub fn record(&self, claim: RewardClaim) -> RewardClaim {
        self.claims
            .entry(claim.key.clone())
            .or_insert(claim)
            .value()
            .clone()
    }

    /// All settled claims of a user, oldest first.
    pub fn claims_of(&self, user: &UserId) -> Vec<RewardClaim> {
        let mut claims: Vec<RewardClaim> = self
            .claims
            .iter()
            .filter(|c| &c.key().user == user)
            .map(|c| c.value().clone())
            .collect();
        claims.sort_by(|a, b| a.claimed_at.cmp(&b.claimed_at).then_with(|| a.key.cmp(&b.key)));
        claims
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierShares;
    use crate::ledger::Tier;

    fn policy() -> RewardPolicy {
        RewardPolicy {
            min_alignment: 0.10,
            max_reward_bps: 200,
        }
    }

    fn request(hash: &str) -> ClaimRequest {
        ClaimRequest {
            user: UserId::new("alice").unwrap(),
            domain: DomainId::new("jazz").unwrap(),
            content_hash: ContentHash::new(hash).unwrap(),
            text: "saxophone".into(),
            content_type: Some("article".into()),
        }
    }

    fn alignment(score: f64) -> Alignment {
        Alignment {
            score,
            matched_terms: 1,
            candidate_terms: 1,
            target_terms: 1,
        }
    }

    #[test]
    fn reward_is_monotonic_and_capped() {
        let p = policy();
        let mut last = 0;
        for i in 0..=100 {
            let r = p.reward_bps(f64::from(i) / 100.0);
            assert!(r >= last);
            last = r;
        }
        assert_eq!(p.reward_bps(1.0), 200);
        assert_eq!(p.reward_bps(0.5), 100);
    }

    #[test]
    fn reward_floors_without_float_drift() {
        let p = policy();
        assert_eq!(p.reward_bps(0.29), 58);
        assert_eq!(p.reward_bps(0.57), 114);
        assert_eq!(p.reward_bps(0.2949), 58);
    }

    #[test]
    fn below_threshold_carries_score() {
        let err = policy().evaluate(0.05).unwrap_err();
        assert_eq!(err.alignment(), Some(0.05));
        assert_eq!(policy().evaluate(0.10).unwrap(), 20);
    }

    #[test]
    fn plan_does_not_mutate_ledger() {
        let ledger = OwnershipLedger::new(5_000, TierShares::default());
        let req = request("h1");
        ledger.unlock(&req.user, &req.domain, Tier::Contributor, 1).unwrap();
        let settlement = RewardSettlement::new(policy());
        let planned = settlement.plan(&req, &alignment(0.5), &ledger, 2).unwrap();
        assert_eq!(planned.claim.reward_bps, 100);
        assert_eq!(planned.claim.ownership_bps, 300);
        assert_eq!(ledger.get(&req.user, &req.domain).unwrap().bps, 200);
        assert!(settlement.is_empty());
    }

    #[test]
    fn ledger_rejection_keeps_score() {
        let ledger = OwnershipLedger::new(5_000, TierShares::default());
        let settlement = RewardSettlement::new(policy());
        let err = settlement
            .plan(&request("h1"), &alignment(0.4), &ledger, 2)
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::Rejected {
                source: crate::error::LedgerError::NotFound { .. },
                ..
            }
        ));
        assert_eq!(err.alignment(), Some(0.4));
    }

    #[test]
    fn record_keeps_first_settlement() {
        let ledger = OwnershipLedger::new(5_000, TierShares::default());
        let req = request("h1");
        ledger.unlock(&req.user, &req.domain, Tier::Contributor, 1).unwrap();
        let settlement = RewardSettlement::new(policy());
        let first = settlement.plan(&req, &alignment(0.5), &ledger, 2).unwrap().claim;
        let second = settlement.plan(&req, &alignment(0.9), &ledger, 3).unwrap().claim;
        assert_eq!(settlement.record(first.clone()), first);
        assert_eq!(settlement.record(second), first);
        assert_eq!(settlement.prior(&ClaimKey::of(&req)), Some(first));
        assert_eq!(settlement.len(), 1);
    }

    #[test]
    fn outcome_converts_to_percent() {
        let ledger = OwnershipLedger::new(5_000, TierShares::default());
        let req = request("h2");
        ledger.unlock(&req.user, &req.domain, Tier::Contributor, 1).unwrap();
        let claim = RewardSettlement::new(policy())
            .plan(&req, &alignment(0.25), &ledger, 2)
            .unwrap()
            .claim;
        let out = ClaimOutcome::from_claim(&claim, false);
        assert_eq!(out.reward_pct, 0.5);
        assert_eq!(out.new_ownership_pct, 2.5);
    }
}
