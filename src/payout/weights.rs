//! Stakeholder performance weights.
//!
//! Four components, each on a 0–100 scale held as hundredths (0..=10000):
//!
//! | component | rule |
//! |---|---|
//! | accuracy | 100 − incorrect-prediction rate; 50 with no resolved prediction |
//! | engagement | 0 → 0, 1–10 → 5·n, 11+ → 50 + 2·(n − 10), capped at 100 |
//! | sponsor relevance | % of contributions matched to a sponsor |
//! | consistency | distinct active days in the trailing 30: 0/1–7/8–14/15–21/22+ → 0/25/50/75/100 |
//!
//! The total is the coefficient-weighted sum (40/30/20/10 by default).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::WeightCoefficients;
use crate::ids::UserId;

/// Full scale of a component, in hundredths of a point.
pub const FULL_SCALE: u32 = 10_000;

const SECS_PER_DAY: u64 = 86_400;
/// Trailing window used for consistency.
pub const CONSISTENCY_WINDOW_DAYS: u64 = 30;

/// Raw activity counters a weight is computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub resolved_predictions: u64,
    pub incorrect_predictions: u64,
    pub interactions: u64,
    pub contributions: u64,
    pub sponsor_matched: u64,
    /// Day numbers (days since UNIX epoch) with any activity, trailing window only.
    pub active_days: BTreeSet<u64>,
}

impl ActivityStats {
    pub fn record_prediction(&mut self, correct: bool, now: u64) {
        self.resolved_predictions += 1;
        if !correct {
            self.incorrect_predictions += 1;
        }
        self.touch(now);
    }

    pub fn record_interaction(&mut self, now: u64) {
        self.interactions += 1;
        self.touch(now);
    }

    pub fn record_contribution(&mut self, sponsor_matched: bool, now: u64) {
        self.contributions += 1;
        if sponsor_matched {
            self.sponsor_matched += 1;
        }
        self.touch(now);
    }

    /// Mark today active and forget days that fell out of the window.
    fn touch(&mut self, now: u64) {
        let today = now / SECS_PER_DAY;
        self.active_days.insert(today);
        let horizon = today.saturating_sub(CONSISTENCY_WINDOW_DAYS - 1);
        self.active_days.retain(|&d| d >= horizon);
    }

    /// Distinct active days within the trailing window ending at `now`.
    pub fn active_days_within_window(&self, now: u64) -> u64 {
        let today = now / SECS_PER_DAY;
        let horizon = today.saturating_sub(CONSISTENCY_WINDOW_DAYS - 1);
        self.active_days
            .iter()
            .filter(|&&d| d >= horizon && d <= today)
            .count() as u64
    }
}

pub fn accuracy(stats: &ActivityStats) -> u32 {
    if stats.resolved_predictions == 0 {
        return FULL_SCALE / 2;
    }
    let incorrect = stats.incorrect_predictions.min(stats.resolved_predictions);
    let error_rate = incorrect * u64::from(FULL_SCALE) / stats.resolved_predictions;
    FULL_SCALE - error_rate as u32
}

pub fn engagement(interactions: u64) -> u32 {
    let points = match interactions {
        0 => 0,
        1..=10 => 5 * interactions,
        n => (n - 10).saturating_mul(2).saturating_add(50).min(100),
    };
    points as u32 * 100
}

pub fn sponsor_relevance(stats: &ActivityStats) -> u32 {
    if stats.contributions == 0 {
        return 0;
    }
    let matched = stats.sponsor_matched.min(stats.contributions);
    (matched * u64::from(FULL_SCALE) / stats.contributions) as u32
}

pub fn consistency(active_days: u64) -> u32 {
    let points = match active_days {
        0 => 0,
        1..=7 => 25,
        8..=14 => 50,
        15..=21 => 75,
        _ => 100,
    };
    points * 100
}

/// A stakeholder's weight snapshot. Components and total in hundredths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeholderWeight {
    pub user: UserId,
    pub accuracy: u32,
    pub engagement: u32,
    pub sponsor_relevance: u32,
    pub consistency: u32,
    pub total: u32,
    pub updated_at: u64,
}

impl StakeholderWeight {
    /// Compute a fresh weight from activity counters.
    pub fn compute(
        user: &UserId,
        stats: &ActivityStats,
        coefficients: &WeightCoefficients,
        now: u64,
    ) -> Self {
        let accuracy = accuracy(stats);
        let engagement = engagement(stats.interactions);
        let sponsor_relevance = sponsor_relevance(stats);
        let consistency = consistency(stats.active_days_within_window(now));
        let weighted = u64::from(accuracy) * u64::from(coefficients.accuracy)
            + u64::from(engagement) * u64::from(coefficients.engagement)
            + u64::from(sponsor_relevance) * u64::from(coefficients.sponsor_relevance)
            + u64::from(consistency) * u64::from(coefficients.consistency);
        let total = (weighted / 100).min(u64::from(FULL_SCALE)) as u32;
        Self {
            user: user.clone(),
            accuracy,
            engagement,
            sponsor_relevance,
            consistency,
            total,
            updated_at: now,
        }
    }

    /// Total weight on the 0–100 presentation scale.
    pub fn total_weight(&self) -> f64 {
        f64::from(self.total) / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = SECS_PER_DAY;

    #[test]
    fn accuracy_is_neutral_without_samples() {
        assert_eq!(accuracy(&ActivityStats::default()), 5_000);
    }

    #[test]
    fn accuracy_subtracts_error_rate() {
        let mut stats = ActivityStats::default();
        for i in 0..4 {
            stats.record_prediction(i != 0, DAY);
        }
        assert_eq!(accuracy(&stats), 7_500);
    }

    #[test]
    fn engagement_steps() {
        assert_eq!(engagement(0), 0);
        assert_eq!(engagement(1), 500);
        assert_eq!(engagement(10), 5_000);
        assert_eq!(engagement(11), 5_200);
        assert_eq!(engagement(35), 10_000);
        assert_eq!(engagement(10_000), 10_000);
    }

    #[test]
    fn consistency_buckets() {
        assert_eq!(consistency(0), 0);
        assert_eq!(consistency(7), 2_500);
        assert_eq!(consistency(8), 5_000);
        assert_eq!(consistency(21), 7_500);
        assert_eq!(consistency(30), 10_000);
    }

    #[test]
    fn trailing_window_forgets_old_days() {
        let mut stats = ActivityStats::default();
        stats.record_interaction(DAY);
        stats.record_interaction(2 * DAY);
        assert_eq!(stats.active_days_within_window(2 * DAY), 2);
        stats.record_interaction(40 * DAY);
        assert_eq!(stats.active_days_within_window(40 * DAY), 1);
        assert_eq!(stats.active_days.len(), 1);
    }

    #[test]
    fn total_is_weighted_sum() {
        let mut stats = ActivityStats::default();
        let now = 100 * DAY;
        for _ in 0..10 {
            stats.record_prediction(true, now);
        }
        for _ in 0..4 {
            stats.record_contribution(true, now);
        }
        let w = StakeholderWeight::compute(
            &UserId::new("u").unwrap(),
            &stats,
            &WeightCoefficients::default(),
            now,
        );
        // accuracy 100, engagement 0, sponsor 100, consistency 25 (one active day)
        assert_eq!(w.accuracy, 10_000);
        assert_eq!(w.engagement, 0);
        assert_eq!(w.sponsor_relevance, 10_000);
        assert_eq!(w.consistency, 2_500);
        assert_eq!(w.total, 4_000 + 2_000 + 250);
        assert_eq!(w.total_weight(), 62.5);
    }

    #[test]
    fn fresh_user_weight_is_accuracy_neutral_only() {
        let w = StakeholderWeight::compute(
            &UserId::new("new").unwrap(),
            &ActivityStats::default(),
            &WeightCoefficients::default(),
            0,
        );
        assert_eq!(w.total, 2_000);
    }
}
