//! Medallion market: scarce, priced entitlements that gate payout participation.
//!
//! # Lifecycle
//!
//! ```text
//! minted (active) ──list──▶ listed ──buy──▶ active (new owner)
//!        ▲                    │
//!        └──────delist────────┘
//! any non-revoked ──revoke──▶ revoked (terminal)
//! ```
//!
//! # Pricing
//!
//! Founding medallions cost a fixed price until their cap is reached. Standard
//! medallions start at the base price and climb linearly to 20× base as the
//! supply runs out. Earned medallions are free, uncapped and cannot be sold.
//! Revoked medallions keep consuming supply, so prices never fall.
//!
//! # Escrow
//!
//! Stakes accumulate per user. Once the escrow covers the cheapest tier the
//! user can still mint, that tier is minted and the excess carries forward.
//!
//! Like the ledger, every mutation is planned first and committed after the
//! engine has persisted the result.

use std::collections::BTreeMap;
use std::sync::RwLock;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::EconomyConfig;
use crate::error::MarketError;
use crate::ids::{AtomicIdAllocator, MedallionId, UserId};

pub type MarketResult<T> = std::result::Result<T, MarketError>;

/// Standard medallions reach `base × STANDARD_PRICE_SPAN` at full depletion.
const STANDARD_PRICE_SPAN: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedallionKind {
    Founding,
    Standard,
    Earned,
}

impl std::fmt::Display for MedallionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Founding => write!(f, "founding"),
            Self::Standard => write!(f, "standard"),
            Self::Earned => write!(f, "earned"),
        }
    }
}

impl std::str::FromStr for MedallionKind {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "founding" => Ok(Self::Founding),
            "standard" => Ok(Self::Standard),
            "earned" => Ok(Self::Earned),
            other => Err(MarketError::Validation {
                message: format!("unknown medallion type \"{other}\""),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedallionState {
    Active,
    Listed { ask: u64 },
    Revoked { reason: String },
}

impl std::fmt::Display for MedallionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Listed { .. } => write!(f, "listed"),
            Self::Revoked { .. } => write!(f, "revoked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medallion {
    pub id: MedallionId,
    pub kind: MedallionKind,
    pub owner: UserId,
    pub mint_price: u64,
    /// Last price paid for it: the mint price, then each sale's ask.
    pub market_value: u64,
    pub state: MedallionState,
    pub crash_count: u32,
    pub accurate_count: u32,
    pub minted_at: u64,
    pub revoked_at: Option<u64>,
}

impl Medallion {
    /// Not revoked. A listed medallion is still held by its owner.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, MedallionState::Revoked { .. })
    }

    pub fn samples(&self) -> u32 {
        self.crash_count.saturating_add(self.accurate_count)
    }

    fn transition_error(&self, action: &str) -> MarketError {
        MarketError::InvalidTransition {
            id: self.id.get(),
            state: self.state.to_string(),
            action: action.to_string(),
        }
    }
}

/// Supply status of one medallion type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supply {
    pub kind: MedallionKind,
    pub minted: u32,
    pub cap: Option<u32>,
    pub remaining: Option<u32>,
    pub price: u64,
}

/// Caps and prices per medallion type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub founding_cap: u32,
    pub standard_cap: u32,
    pub founding_price: u64,
    pub standard_base_price: u64,
}

impl PricingPolicy {
    pub fn from_config(config: &EconomyConfig) -> Self {
        Self {
            founding_cap: config.founding_cap,
            standard_cap: config.standard_cap,
            founding_price: config.founding_price,
            standard_base_price: config.standard_base_price,
        }
    }

    pub fn cap(&self, kind: MedallionKind) -> Option<u32> {
        match kind {
            MedallionKind::Founding => Some(self.founding_cap),
            MedallionKind::Standard => Some(self.standard_cap),
            MedallionKind::Earned => None,
        }
    }

    /// Price of the next medallion of `kind` after `minted` have been issued.
    ///
    /// Standard: `base × (1 + 19 × (1 − remaining / cap))`, in integer math.
    pub fn price(&self, kind: MedallionKind, minted: u32) -> u64 {
        match kind {
            MedallionKind::Founding => self.founding_price,
            MedallionKind::Earned => 0,
            MedallionKind::Standard => {
                let cap = u128::from(self.standard_cap.max(1));
                let minted = u128::from(minted).min(cap);
                let base = u128::from(self.standard_base_price);
                let span = u128::from(STANDARD_PRICE_SPAN - 1);
                let price = base * (cap + span * minted) / cap;
                u64::try_from(price).unwrap_or(u64::MAX)
            }
        }
    }
}

/// Revocation thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevocationPolicy {
    pub min_samples: u32,
    pub crash_rate_pct: u32,
}

impl RevocationPolicy {
    pub fn from_config(config: &EconomyConfig) -> Self {
        Self {
            min_samples: config.revoke_min_samples,
            crash_rate_pct: config.revoke_crash_rate_pct,
        }
    }

    /// Enough samples and a crash rate strictly above the threshold.
    pub fn check(&self, medallion: &Medallion) -> MarketResult<()> {
        let samples = medallion.samples();
        if samples < self.min_samples {
            return Err(MarketError::Ineligible {
                message: format!(
                    "{} has {samples} resolved outcomes, {} required for revocation",
                    medallion.id, self.min_samples
                ),
            });
        }
        let crashes = u64::from(medallion.crash_count) * 100;
        if crashes <= u64::from(self.crash_rate_pct) * u64::from(samples) {
            return Err(MarketError::Ineligible {
                message: format!(
                    "{} crash rate {}/{samples} does not exceed {}%",
                    medallion.id, medallion.crash_count, self.crash_rate_pct
                ),
            });
        }
        Ok(())
    }
}

/// A planned stake: the escrow balance afterwards and the medallion it mints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeOutcome {
    pub user: UserId,
    pub staked: u64,
    pub escrow_balance: u64,
    pub minted: Option<Medallion>,
}

/// A completed sale. Settling the payment is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub medallion: Medallion,
    pub seller: UserId,
    pub price: u64,
}

/// Medallion registry, escrow balances and market rules.
#[derive(Debug)]
pub struct MedallionMarket {
    medallions: RwLock<BTreeMap<MedallionId, Medallion>>,
    escrow: DashMap<UserId, u64>,
    ids: AtomicIdAllocator,
    pricing: PricingPolicy,
    revocation: RevocationPolicy,
}

impl MedallionMarket {
    pub fn new(pricing: PricingPolicy, revocation: RevocationPolicy) -> Self {
        Self {
            medallions: RwLock::new(BTreeMap::new()),
            escrow: DashMap::new(),
            ids: AtomicIdAllocator::new(),
            pricing,
            revocation,
        }
    }

    /// Restore medallions and escrow balances read back from the store.
    pub fn load(
        pricing: PricingPolicy,
        revocation: RevocationPolicy,
        medallions: impl IntoIterator<Item = Medallion>,
        escrow: impl IntoIterator<Item = (UserId, u64)>,
    ) -> Self {
        let medallions: BTreeMap<MedallionId, Medallion> =
            medallions.into_iter().map(|m| (m.id, m)).collect();
        let next = medallions.keys().next_back().map(|id| id.get() + 1).unwrap_or(1);
        Self {
            medallions: RwLock::new(medallions),
            escrow: escrow.into_iter().collect(),
            ids: AtomicIdAllocator::starting_from(next),
            pricing,
            revocation,
        }
    }

    pub fn pricing(&self) -> PricingPolicy {
        self.pricing
    }

    pub fn get(&self, id: MedallionId) -> MarketResult<Medallion> {
        self.medallions
            .read()
            .expect("market lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(MarketError::NotFound { id: id.get() })
    }

    /// Number of medallions of `kind` ever minted, revoked ones included.
    pub fn minted(&self, kind: MedallionKind) -> u32 {
        let count = self
            .medallions
            .read()
            .expect("market lock poisoned")
            .values()
            .filter(|m| m.kind == kind)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Current price of the next medallion of `kind`.
    pub fn price(&self, kind: MedallionKind) -> u64 {
        self.pricing.price(kind, self.minted(kind))
    }

    pub fn supply(&self) -> Vec<Supply> {
        [MedallionKind::Founding, MedallionKind::Standard, MedallionKind::Earned]
            .into_iter()
            .map(|kind| {
                let minted = self.minted(kind);
                let cap = self.pricing.cap(kind);
                Supply {
                    kind,
                    minted,
                    cap,
                    remaining: cap.map(|c| c.saturating_sub(minted)),
                    price: self.pricing.price(kind, minted),
                }
            })
            .collect()
    }

    pub fn escrow_balance(&self, user: &UserId) -> u64 {
        self.escrow.get(user).map(|b| *b).unwrap_or(0)
    }

    pub fn medallions_of(&self, owner: &UserId) -> Vec<Medallion> {
        self.medallions
            .read()
            .expect("market lock poisoned")
            .values()
            .filter(|m| &m.owner == owner)
            .cloned()
            .collect()
    }

    /// Listed medallions, cheapest first.
    pub fn listings(&self) -> Vec<Medallion> {
        let mut listed: Vec<Medallion> = self
            .medallions
            .read()
            .expect("market lock poisoned")
            .values()
            .filter(|m| matches!(m.state, MedallionState::Listed { .. }))
            .cloned()
            .collect();
        listed.sort_by_key(|m| match m.state {
            MedallionState::Listed { ask } => (ask, m.id),
            _ => (u64::MAX, m.id),
        });
        listed
    }

    pub fn holds_active(&self, owner: &UserId) -> bool {
        self.medallions
            .read()
            .expect("market lock poisoned")
            .values()
            .any(|m| &m.owner == owner && m.is_active())
    }

    fn holds_active_kind(&self, owner: &UserId, kind: MedallionKind) -> bool {
        self.medallions
            .read()
            .expect("market lock poisoned")
            .values()
            .any(|m| &m.owner == owner && m.kind == kind && m.is_active())
    }

    fn check_mintable(&self, owner: &UserId, kind: MedallionKind) -> MarketResult<()> {
        if let Some(cap) = self.pricing.cap(kind) {
            if self.minted(kind) >= cap {
                return Err(MarketError::SupplyExceeded {
                    kind: kind.to_string(),
                    cap,
                });
            }
        }
        if self.holds_active_kind(owner, kind) {
            return Err(MarketError::Ineligible {
                message: format!("{owner} already holds an active {kind} medallion"),
            });
        }
        Ok(())
    }

    /// Plan a mint at the current price. Nothing is stored.
    pub fn plan_mint(
        &self,
        owner: &UserId,
        kind: MedallionKind,
        now: u64,
    ) -> MarketResult<Medallion> {
        self.check_mintable(owner, kind)?;
        let price = self.price(kind);
        let id = self.ids.next_id().map_err(|e| MarketError::Validation {
            message: e.to_string(),
        })?;
        Ok(Medallion {
            id,
            kind,
            owner: owner.clone(),
            mint_price: price,
            market_value: price,
            state: MedallionState::Active,
            crash_count: 0,
            accurate_count: 0,
            minted_at: now,
            revoked_at: None,
        })
    }

    /// Plan an earned medallion: free, uncapped, one per owner.
    pub fn plan_award_earned(&self, owner: &UserId, now: u64) -> MarketResult<Medallion> {
        self.plan_mint(owner, MedallionKind::Earned, now)
    }

    /// Plan a stake: add `amount` to the user's escrow and, if it now covers
    /// the cheapest tier the user can still mint, mint it and keep the rest.
    pub fn plan_stake(&self, user: &UserId, amount: u64, now: u64) -> MarketResult<StakeOutcome> {
        if amount == 0 {
            return Err(MarketError::Validation {
                message: "stake amount must be positive".into(),
            });
        }
        // min_by_key keeps the first minimum, so standard wins ties.
        let target = [MedallionKind::Standard, MedallionKind::Founding]
            .into_iter()
            .filter(|kind| self.check_mintable(user, *kind).is_ok())
            .min_by_key(|kind| self.price(*kind))
            .ok_or_else(|| MarketError::Ineligible {
                message: format!("{user} cannot mint any further medallion"),
            })?;

        let balance = self
            .escrow_balance(user)
            .checked_add(amount)
            .ok_or_else(|| MarketError::Validation {
                message: "escrow balance overflow".into(),
            })?;
        let price = self.price(target);
        if balance < price {
            return Ok(StakeOutcome {
                user: user.clone(),
                staked: amount,
                escrow_balance: balance,
                minted: None,
            });
        }
        let medallion = self.plan_mint(user, target, now)?;
        Ok(StakeOutcome {
            user: user.clone(),
            staked: amount,
            escrow_balance: balance - medallion.mint_price,
            minted: Some(medallion),
        })
    }

    /// Plan a listing at `ask`. Only the owner can list an active,
    /// transferable medallion.
    pub fn plan_list(&self, id: MedallionId, seller: &UserId, ask: u64) -> MarketResult<Medallion> {
        let mut medallion = self.get(id)?;
        if &medallion.owner != seller {
            return Err(MarketError::Ineligible {
                message: format!("{seller} does not own {id}"),
            });
        }
        if medallion.kind == MedallionKind::Earned {
            return Err(MarketError::Ineligible {
                message: "earned medallions are non-transferable".into(),
            });
        }
        if ask == 0 {
            return Err(MarketError::Validation {
                message: "ask price must be positive".into(),
            });
        }
        if medallion.state != MedallionState::Active {
            return Err(medallion.transition_error("list"));
        }
        medallion.state = MedallionState::Listed { ask };
        Ok(medallion)
    }

    pub fn plan_delist(&self, id: MedallionId, seller: &UserId) -> MarketResult<Medallion> {
        let mut medallion = self.get(id)?;
        if &medallion.owner != seller {
            return Err(MarketError::Ineligible {
                message: format!("{seller} does not own {id}"),
            });
        }
        if !matches!(medallion.state, MedallionState::Listed { .. }) {
            return Err(medallion.transition_error("delist"));
        }
        medallion.state = MedallionState::Active;
        Ok(medallion)
    }

    /// Plan a purchase at the listed ask, transferring ownership.
    pub fn plan_buy(&self, id: MedallionId, buyer: &UserId) -> MarketResult<SaleReceipt> {
        let mut medallion = self.get(id)?;
        let ask = match medallion.state {
            MedallionState::Listed { ask } => ask,
            _ => return Err(medallion.transition_error("be bought")),
        };
        if &medallion.owner == buyer {
            return Err(MarketError::Ineligible {
                message: format!("{buyer} already owns {id}"),
            });
        }
        if self.holds_active_kind(buyer, medallion.kind) {
            return Err(MarketError::Ineligible {
                message: format!("{buyer} already holds an active {} medallion", medallion.kind),
            });
        }
        let seller = std::mem::replace(&mut medallion.owner, buyer.clone());
        medallion.market_value = ask;
        medallion.state = MedallionState::Active;
        Ok(SaleReceipt {
            medallion,
            seller,
            price: ask,
        })
    }

    /// Plan recording one resolved outcome for a medallion's holder.
    pub fn plan_outcome(&self, id: MedallionId, crashed: bool) -> MarketResult<Medallion> {
        let mut medallion = self.get(id)?;
        if !medallion.is_active() {
            return Err(medallion.transition_error("record outcomes"));
        }
        if crashed {
            medallion.crash_count = medallion.crash_count.saturating_add(1);
        } else {
            medallion.accurate_count = medallion.accurate_count.saturating_add(1);
        }
        Ok(medallion)
    }

    /// Plan a revocation. Requires a reason and a qualifying crash record.
    pub fn plan_revoke(&self, id: MedallionId, reason: &str, now: u64) -> MarketResult<Medallion> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(MarketError::Validation {
                message: "revocation requires a reason".into(),
            });
        }
        let mut medallion = self.get(id)?;
        if !medallion.is_active() {
            return Err(medallion.transition_error("be revoked"));
        }
        self.revocation.check(&medallion)?;
        medallion.state = MedallionState::Revoked {
            reason: reason.to_string(),
        };
        medallion.revoked_at = Some(now);
        Ok(medallion)
    }

    /// Make a planned medallion visible. A freshly minted one is re-checked
    /// against the cap and the one-per-owner rule.
    pub fn commit(&self, medallion: Medallion) -> MarketResult<()> {
        let mut table = self.medallions.write().expect("market lock poisoned");
        if !table.contains_key(&medallion.id) {
            let kind = medallion.kind;
            let minted = table.values().filter(|m| m.kind == kind).count();
            if let Some(cap) = self.pricing.cap(kind) {
                if minted >= cap as usize {
                    return Err(MarketError::SupplyExceeded {
                        kind: kind.to_string(),
                        cap,
                    });
                }
            }
            if table
                .values()
                .any(|m| m.owner == medallion.owner && m.kind == kind && m.is_active())
            {
                return Err(MarketError::Ineligible {
                    message: format!("{} already holds an active {kind} medallion", medallion.owner),
                });
            }
        }
        table.insert(medallion.id, medallion);
        Ok(())
    }

    pub fn commit_stake(&self, outcome: &StakeOutcome) -> MarketResult<()> {
        if let Some(medallion) = &outcome.minted {
            self.commit(medallion.clone())?;
        }
        self.escrow.insert(outcome.user.clone(), outcome.escrow_balance);
        Ok(())
    }
}
