//! Weighted payout engine: proportional, exact-sum distribution of a pool.
//!
//! # Integer math
//!
//! Pools are integer minor units (e.g. cents) and weights are integer
//! hundredths, so every share is `pool × weight / Σweight` rounded down.
//! The rounding remainder goes to the highest-weight stakeholder (lowest user
//! id on ties), which makes Σ payouts == pool exactly and the assignment
//! reproducible.
//!
//! A run is identified by a caller-chosen [`RunId`] and executes at most once.

pub mod weights;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::config::WeightCoefficients;
use crate::error::PayoutError;
use crate::ids::{RunId, UserId};

pub use weights::{ActivityStats, StakeholderWeight};

pub type PayoutResult<T> = std::result::Result<T, PayoutError>;

/// What kind of money a run distributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutType {
    Revenue,
    Yield,
    Sponsor,
}

impl std::fmt::Display for PayoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Revenue => write!(f, "revenue"),
            Self::Yield => write!(f, "yield"),
            Self::Sponsor => write!(f, "sponsor"),
        }
    }
}

impl std::str::FromStr for PayoutType {
    type Err = PayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "revenue" => Ok(Self::Revenue),
            "yield" => Ok(Self::Yield),
            "sponsor" => Ok(Self::Sponsor),
            other => Err(PayoutError::Validation {
                message: format!("unknown payout type \"{other}\""),
            }),
        }
    }
}

/// One stakeholder's payout within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub run_id: RunId,
    pub user: UserId,
    pub amount: u64,
    /// Total weight (hundredths) snapshotted for this run.
    pub weight_at_payout: u32,
}

/// A completed distribution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRun {
    pub run_id: RunId,
    pub payout_type: PayoutType,
    pub pool: u64,
    pub records: Vec<PayoutRecord>,
    pub completed_at: u64,
}

impl DistributionRun {
    pub fn total_paid(&self) -> u64 {
        self.records.iter().map(|r| r.amount).sum()
    }
}

/// Split `pool` proportionally to `weights`, assigning the remainder to the
/// heaviest stakeholder. Zero weights are skipped.
pub fn allocate(pool: u64, weights: &[(UserId, u32)]) -> PayoutResult<Vec<(UserId, u32, u64)>> {
    if pool == 0 {
        return Err(PayoutError::Validation {
            message: "revenue pool must be positive".into(),
        });
    }
    let mut eligible: Vec<(UserId, u32)> =
        weights.iter().filter(|(_, w)| *w > 0).cloned().collect();
    if eligible.is_empty() {
        return Err(PayoutError::NoStakeholders);
    }
    eligible.sort_by(|a, b| a.0.cmp(&b.0));

    let total_weight: u128 = eligible.iter().map(|(_, w)| u128::from(*w)).sum();
    let mut shares: Vec<(UserId, u32, u64)> = eligible
        .into_iter()
        .map(|(user, w)| {
            let share = u128::from(pool) * u128::from(w) / total_weight;
            (user, w, share as u64)
        })
        .collect();

    let paid: u64 = shares.iter().map(|(_, _, s)| *s).sum();
    let remainder = pool - paid;
    if remainder > 0 {
        // First maximum in user order: the lowest user id wins ties.
        let heaviest = shares
            .iter()
            .enumerate()
            .fold(0, |best, (i, s)| if s.1 > shares[best].1 { i } else { best });
        shares[heaviest].2 += remainder;
    }
    Ok(shares)
}

/// Weights, activity counters and completed runs.
#[derive(Debug)]
pub struct WeightedPayoutEngine {
    weights: DashMap<UserId, StakeholderWeight>,
    activity: DashMap<UserId, ActivityStats>,
    runs: DashMap<RunId, DistributionRun>,
    coefficients: WeightCoefficients,
}

impl WeightedPayoutEngine {
    pub fn new(coefficients: WeightCoefficients) -> Self {
        Self {
            weights: DashMap::new(),
            activity: DashMap::new(),
            runs: DashMap::new(),
            coefficients,
        }
    }

    pub fn load_weights(&self, weights: impl IntoIterator<Item = StakeholderWeight>) {
        for w in weights {
            self.weights.insert(w.user.clone(), w);
        }
    }

    pub fn load_activity(&self, activity: impl IntoIterator<Item = (UserId, ActivityStats)>) {
        for (user, stats) in activity {
            self.activity.insert(user, stats);
        }
    }

    pub fn load_runs(&self, runs: impl IntoIterator<Item = DistributionRun>) {
        for run in runs {
            self.runs.insert(run.run_id.clone(), run);
        }
    }

    pub fn activity(&self, user: &UserId) -> ActivityStats {
        self.activity
            .get(user)
            .map(|a| a.value().clone())
            .unwrap_or_default()
    }

    /// The user's counters with `update` applied, not yet stored.
    pub fn plan_activity(
        &self,
        user: &UserId,
        update: impl FnOnce(&mut ActivityStats),
    ) -> ActivityStats {
        let mut stats = self.activity(user);
        update(&mut stats);
        stats
    }

    pub fn put_activity(&self, user: &UserId, stats: ActivityStats) {
        self.activity.insert(user.clone(), stats);
    }

    /// Recompute a user's weight from their counters, not yet stored.
    pub fn plan_weights(&self, user: &UserId, now: u64) -> StakeholderWeight {
        StakeholderWeight::compute(user, &self.activity(user), &self.coefficients, now)
    }

    pub fn put_weight(&self, weight: StakeholderWeight) {
        self.weights.insert(weight.user.clone(), weight);
    }

    pub fn weight(&self, user: &UserId) -> Option<StakeholderWeight> {
        self.weights.get(user).map(|w| w.value().clone())
    }

    /// Snapshot positive weights of the users accepted by `eligible`.
    pub fn snapshot(&self, eligible: impl Fn(&UserId) -> bool) -> Vec<(UserId, u32)> {
        let mut snapshot: Vec<(UserId, u32)> = self
            .weights
            .iter()
            .filter(|w| w.total > 0 && eligible(w.key()))
            .map(|w| (w.key().clone(), w.total))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    pub fn run(&self, run_id: &RunId) -> Option<DistributionRun> {
        self.runs.get(run_id).map(|r| r.value().clone())
    }

    pub fn is_completed(&self, run_id: &RunId) -> bool {
        self.runs.contains_key(run_id)
    }

    /// Plan a run over the current weights. Nothing is stored.
    pub fn plan_distribution(
        &self,
        run_id: &RunId,
        pool: u64,
        payout_type: PayoutType,
        eligible: impl Fn(&UserId) -> bool,
        now: u64,
    ) -> PayoutResult<DistributionRun> {
        if self.is_completed(run_id) {
            return Err(PayoutError::RunAlreadyCompleted {
                run_id: run_id.to_string(),
            });
        }
        let shares = allocate(pool, &self.snapshot(eligible))?;
        let records: Vec<PayoutRecord> = shares
            .into_iter()
            .map(|(user, weight, amount)| PayoutRecord {
                run_id: run_id.clone(),
                user,
                amount,
                weight_at_payout: weight,
            })
            .collect();
        let run = DistributionRun {
            run_id: run_id.clone(),
            payout_type,
            pool,
            records,
            completed_at: now,
        };
        let total = run.total_paid();
        if total != pool {
            return Err(PayoutError::Consistency {
                run_id: run_id.to_string(),
                total,
                pool,
            });
        }
        Ok(run)
    }

    /// Record a committed run. Returns `false` if the id was already taken.
    pub fn record_run(&self, run: DistributionRun) -> bool {
        match self.runs.entry(run.run_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(run);
                true
            }
        }
    }

    /// Every payout a user has received, ordered by run completion.
    pub fn payouts_of(&self, user: &UserId) -> Vec<PayoutRecord> {
        let mut runs: Vec<DistributionRun> = self.runs.iter().map(|r| r.value().clone()).collect();
        runs.sort_by(|a, b| a.completed_at.cmp(&b.completed_at).then_with(|| a.run_id.cmp(&b.run_id)));
        runs.into_iter()
            .flat_map(|r| r.records.into_iter())
            .filter(|r| &r.user == user)
            .collect()
    }
}
