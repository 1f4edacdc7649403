//! Ownership ledger: bounded, basis-point shares of each domain.
//!
//! One row per (user, domain). Shares are integer basis points so the
//! per-domain bound Σ share ≤ 10000 bps (100%) is exact. Whatever is not
//! allocated is the platform reserve. Rows are never deleted: admin
//! revocation lowers a share and the audit trail keeps the history.
//!
//! Mutations come in two steps, `plan_*` then [`OwnershipLedger::commit`], so
//! the engine can persist a planned row before it becomes visible in memory.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::config::TierShares;
use crate::error::LedgerError;
use crate::ids::{DomainId, UserId};

/// 100% in basis points.
pub const TOTAL_BPS: u32 = 10_000;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Identity tier, as reported by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Explorer,
    Contributor,
    Patron,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explorer => write!(f, "explorer"),
            Self::Contributor => write!(f, "contributor"),
            Self::Patron => write!(f, "patron"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "explorer" => Ok(Self::Explorer),
            "contributor" => Ok(Self::Contributor),
            "patron" => Ok(Self::Patron),
            other => Err(LedgerError::Validation {
                message: format!("unknown tier \"{other}\" (expected explorer, contributor or patron)"),
            }),
        }
    }
}

/// A user's share of one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRow {
    pub user: UserId,
    pub domain: DomainId,
    pub bps: u32,
    pub tier: Tier,
    pub unlocked_at: u64,
    pub updated_at: u64,
}

impl OwnershipRow {
    /// Share as a human-readable percentage.
    pub fn percent(&self) -> f64 {
        bps_to_percent(self.bps)
    }
}

pub fn bps_to_percent(bps: u32) -> f64 {
    f64::from(bps) / 100.0
}

/// Convert a percentage to basis points, rejecting values outside [0, 100].
pub fn percent_to_bps(pct: f64) -> LedgerResult<u32> {
    if !(0.0..=100.0).contains(&pct) {
        return Err(LedgerError::Validation {
            message: format!("percentage {pct} is outside [0, 100]"),
        });
    }
    Ok((pct * 100.0).round() as u32)
}

/// Result of a planned increase. `applied_bps` may be less than requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncreaseOutcome {
    pub row: OwnershipRow,
    pub previous_bps: u32,
    pub requested_bps: u32,
    pub applied_bps: u32,
}

/// Result of a planned admin revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeOutcome {
    pub row: OwnershipRow,
    pub previous_bps: u32,
}

/// In-memory ownership table.
pub struct OwnershipLedger {
    rows: RwLock<BTreeMap<DomainId, BTreeMap<UserId, OwnershipRow>>>,
    per_user_cap_bps: u32,
    tier_shares: TierShares,
}

impl std::fmt::Debug for OwnershipLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let domains = self.rows.read().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("OwnershipLedger")
            .field("domains", &domains)
            .field("per_user_cap_bps", &self.per_user_cap_bps)
            .finish()
    }
}

impl OwnershipLedger {
    pub fn new(per_user_cap_bps: u32, tier_shares: TierShares) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            per_user_cap_bps,
            tier_shares,
        }
    }

    /// Restore rows read back from the store.
    pub fn load(&self, rows: impl IntoIterator<Item = OwnershipRow>) {
        let mut table = self.rows.write().expect("ledger lock poisoned");
        for row in rows {
            table
                .entry(row.domain.clone())
                .or_default()
                .insert(row.user.clone(), row);
        }
    }

    pub fn get(&self, user: &UserId, domain: &DomainId) -> Option<OwnershipRow> {
        let table = self.rows.read().expect("ledger lock poisoned");
        table.get(domain).and_then(|d| d.get(user)).cloned()
    }

    /// Every row of a domain, including zeroed ones, in user order.
    pub fn domain_rows(&self, domain: &DomainId) -> Vec<OwnershipRow> {
        let table = self.rows.read().expect("ledger lock poisoned");
        table
            .get(domain)
            .map(|d| d.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Rows of a domain with a positive share.
    pub fn owners(&self, domain: &DomainId) -> Vec<OwnershipRow> {
        let mut rows = self.domain_rows(domain);
        rows.retain(|r| r.bps > 0);
        rows
    }

    /// All domains in which `user` holds a positive share.
    pub fn user_domains(&self, user: &UserId) -> Vec<OwnershipRow> {
        let table = self.rows.read().expect("ledger lock poisoned");
        table
            .values()
            .filter_map(|d| d.get(user))
            .filter(|r| r.bps > 0)
            .cloned()
            .collect()
    }

    pub fn domains(&self) -> Vec<DomainId> {
        let table = self.rows.read().expect("ledger lock poisoned");
        table.keys().cloned().collect()
    }

    pub fn domain_total_bps(&self, domain: &DomainId) -> u32 {
        let table = self.rows.read().expect("ledger lock poisoned");
        table
            .get(domain)
            .map(|d| d.values().map(|r| r.bps).sum())
            .unwrap_or(0)
    }

    /// Plan a new row with the tier's starting share, clipped to the user cap
    /// and to the domain's unallocated remainder.
    pub fn plan_unlock(
        &self,
        user: &UserId,
        domain: &DomainId,
        tier: Tier,
        now: u64,
    ) -> LedgerResult<OwnershipRow> {
        if let Some(existing) = self.get(user, domain) {
            return Err(LedgerError::AlreadyUnlocked {
                user: user.to_string(),
                domain: domain.to_string(),
                current_bps: existing.bps,
            });
        }
        let remaining = TOTAL_BPS.saturating_sub(self.domain_total_bps(domain));
        let bps = self
            .tier_shares
            .for_tier(tier)
            .min(self.per_user_cap_bps)
            .min(remaining);
        Ok(OwnershipRow {
            user: user.clone(),
            domain: domain.clone(),
            bps,
            tier,
            unlocked_at: now,
            updated_at: now,
        })
    }

    /// Plan `share += delta`, clipped to the per-user cap and to the domain's
    /// unallocated remainder. The applied delta is always reported.
    pub fn plan_increase(
        &self,
        user: &UserId,
        domain: &DomainId,
        delta_bps: u32,
        now: u64,
    ) -> LedgerResult<IncreaseOutcome> {
        let row = self.get(user, domain).ok_or_else(|| LedgerError::NotFound {
            user: user.to_string(),
            domain: domain.to_string(),
        })?;
        let previous_bps = row.bps;
        let user_headroom = self.per_user_cap_bps.saturating_sub(previous_bps);
        let domain_headroom = TOTAL_BPS.saturating_sub(self.domain_total_bps(domain));
        let applied_bps = delta_bps.min(user_headroom).min(domain_headroom);
        Ok(IncreaseOutcome {
            row: OwnershipRow {
                bps: previous_bps + applied_bps,
                updated_at: if applied_bps > 0 { now } else { row.updated_at },
                ..row
            },
            previous_bps,
            requested_bps: delta_bps,
            applied_bps,
        })
    }

    /// Plan an admin revocation lowering a share to `new_bps`.
    pub fn plan_revoke(
        &self,
        user: &UserId,
        domain: &DomainId,
        new_bps: u32,
        now: u64,
    ) -> LedgerResult<RevokeOutcome> {
        let row = self.get(user, domain).ok_or_else(|| LedgerError::NotFound {
            user: user.to_string(),
            domain: domain.to_string(),
        })?;
        if new_bps > row.bps {
            return Err(LedgerError::Validation {
                message: format!(
                    "revocation cannot raise a share ({} -> {new_bps} bps)",
                    row.bps
                ),
            });
        }
        let previous_bps = row.bps;
        Ok(RevokeOutcome {
            row: OwnershipRow {
                bps: new_bps,
                updated_at: now,
                ..row
            },
            previous_bps,
        })
    }

    /// Check that replacing the row would keep the domain within 100%.
    pub fn verify(&self, row: &OwnershipRow) -> LedgerResult<()> {
        let table = self.rows.read().expect("ledger lock poisoned");
        let others: u64 = table
            .get(&row.domain)
            .map(|d| {
                d.values()
                    .filter(|r| r.user != row.user)
                    .map(|r| u64::from(r.bps))
                    .sum()
            })
            .unwrap_or(0);
        let total_bps = others + u64::from(row.bps);
        if total_bps > u64::from(TOTAL_BPS) {
            return Err(LedgerError::Consistency {
                domain: row.domain.to_string(),
                total_bps,
            });
        }
        Ok(())
    }

    /// Make a planned row visible. Fails, changing nothing, if the domain
    /// would exceed 100%.
    pub fn commit(&self, row: OwnershipRow) -> LedgerResult<()> {
        self.verify(&row)?;
        let mut table = self.rows.write().expect("ledger lock poisoned");
        table
            .entry(row.domain.clone())
            .or_default()
            .insert(row.user.clone(), row);
        Ok(())
    }

    /// Plan and commit an unlock in one step.
    pub fn unlock(
        &self,
        user: &UserId,
        domain: &DomainId,
        tier: Tier,
        now: u64,
    ) -> LedgerResult<OwnershipRow> {
        let row = self.plan_unlock(user, domain, tier, now)?;
        self.commit(row.clone())?;
        Ok(row)
    }

    /// Plan and commit an increase in one step.
    pub fn increase(
        &self,
        user: &UserId,
        domain: &DomainId,
        delta_bps: u32,
        now: u64,
    ) -> LedgerResult<IncreaseOutcome> {
        let outcome = self.plan_increase(user, domain, delta_bps, now)?;
        self.commit(outcome.row.clone())?;
        Ok(outcome)
    }
}
