//! Engine facade: top-level API for the verbum ownership economy.
//!
//! The `Engine` owns every component and the persistence handle, and is the
//! only place where they are wired together.
//!
//! # Consistency
//!
//! Each mutating call plans its changes without touching component state,
//! writes them to the [`Store`] as one batch, and only then publishes them in
//! memory. A failed commit therefore changes nothing.
//!
//! Ledger and domain-wordmap mutations for one domain are serialized by a
//! per-domain lock. Per-user locks guard contributor wordmaps and activity
//! counters. When both are needed the user lock is taken first and domain
//! locks in domain order. Domain wordmaps are published as `Arc` snapshots,
//! so readers see either the old or the new wordmap, never a partial one.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditKind, AuditLog};
use crate::collab::{ContentGenerator, IdentityService, TextSource, TextUnit};
use crate::config::EconomyConfig;
use crate::error::{
    EngineError, LedgerError, MarketError, TreasuryError, VerbumResult, WordmapError,
};
use crate::ids::{ContentHash, DomainId, MedallionId, RunId, UserId, now_secs};
use crate::ledger::{OwnershipLedger, OwnershipRow, Tier, bps_to_percent, percent_to_bps};
use crate::market::{
    Medallion, MedallionKind, MedallionMarket, PricingPolicy, RevocationPolicy, SaleReceipt,
    StakeOutcome, Supply,
};
use crate::payout::{ActivityStats, DistributionRun, PayoutType, StakeholderWeight, WeightedPayoutEngine};
use crate::scoring::{Alignment, AlignmentScorer, score_wordmaps};
use crate::settlement::{ClaimKey, ClaimOutcome, ClaimRequest, RewardPolicy, RewardSettlement};
use crate::store::{Batch, Store, keys};
use crate::text::{TextProcessor, WordFrequencyExtractor};
use crate::treasury::{Treasury, TreasuryState};
use crate::wordmap::domain::{self, OwnerShare};
use crate::wordmap::{ContributorWordmap, DomainWordmap, WordmapComparison};

/// Configuration for the verbum engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Data directory for persistence. `None` for memory-only mode.
    pub data_dir: Option<PathBuf>,
    pub economy: EconomyConfig,
}

/// One term of a domain wordmap view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    pub weighted_count: f64,
}

/// Read view of a domain wordmap, heaviest terms first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordmapView {
    pub domain: DomainId,
    pub terms: Vec<TermWeight>,
    pub contributor_count: u32,
    pub total_units: u64,
    pub last_updated: u64,
}

impl From<&DomainWordmap> for WordmapView {
    fn from(dwm: &DomainWordmap) -> Self {
        Self {
            domain: dwm.domain.clone(),
            terms: dwm
                .terms
                .ranked()
                .into_iter()
                .map(|(term, weighted_count)| TermWeight {
                    term: term.to_string(),
                    weighted_count,
                })
                .collect(),
            contributor_count: dwm.contributor_count,
            total_units: dwm.total_units,
            last_updated: dwm.last_updated,
        }
    }
}

/// A user's share of a domain, as exposed to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainShare {
    pub domain: DomainId,
    pub ownership_pct: f64,
    pub unlocked_at: u64,
}

impl From<&OwnershipRow> for DomainShare {
    fn from(row: &OwnershipRow) -> Self {
        Self {
            domain: row.domain.clone(),
            ownership_pct: row.percent(),
            unlocked_at: row.unlocked_at,
        }
    }
}

/// Result of ingesting one text unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub user: UserId,
    pub unit_id: String,
    pub recording_count: u64,
    pub terms: usize,
    /// Domains whose wordmap was rebuilt because the user owns a share.
    pub recalculated: Vec<DomainId>,
}

/// One stakeholder's payout, as exposed to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutShare {
    pub user: UserId,
    pub amount: u64,
    /// Weight at payout time, 0..=100.
    pub weight: f64,
}

impl PayoutShare {
    fn from_run(run: &DistributionRun) -> Vec<Self> {
        run.records
            .iter()
            .map(|r| Self {
                user: r.user.clone(),
                amount: r.amount,
                weight: f64::from(r.weight_at_payout) / 100.0,
            })
            .collect()
    }
}

/// Alignment of one candidate against one domain in a cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAlignment {
    pub domain: DomainId,
    pub alignment: Alignment,
}

/// Treasury read view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryView {
    pub balance: u64,
    pub yield_bps: u32,
    pub yield_pool: u64,
    pub total_deposited: u64,
    pub total_released: u64,
}

/// The verbum ownership-economy engine.
pub struct Engine {
    config: EngineConfig,
    store: Arc<Store>,
    scorer: AlignmentScorer,
    contributors: DashMap<UserId, ContributorWordmap>,
    domain_wordmaps: DashMap<DomainId, Arc<DomainWordmap>>,
    ledger: OwnershipLedger,
    audit: AuditLog,
    settlement: RewardSettlement,
    payouts: WeightedPayoutEngine,
    market: MedallionMarket,
    treasury: Treasury,
    domain_locks: DashMap<DomainId, Arc<Mutex<()>>>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    market_lock: Mutex<()>,
    payout_lock: Mutex<()>,
}

impl Engine {
    /// Create an engine with the built-in word-frequency extractor.
    pub fn new(config: EngineConfig) -> VerbumResult<Self> {
        let processor = Arc::new(WordFrequencyExtractor::with_cap(config.economy.wordmap_cap));
        Self::with_processor(config, processor)
    }

    /// Create an engine with a custom text processor.
    ///
    /// Opens the store and reloads every persisted entity.
    pub fn with_processor(
        config: EngineConfig,
        processor: Arc<dyn TextProcessor>,
    ) -> VerbumResult<Self> {
        config
            .economy
            .validate()
            .map_err(|e| EngineError::InvalidConfig {
                message: e.to_string(),
            })?;
        let economy = &config.economy;

        let store = match config.data_dir {
            Some(ref dir) => {
                std::fs::create_dir_all(dir).map_err(|_| EngineError::DataDir {
                    path: dir.display().to_string(),
                })?;
                Store::with_persistence(dir)?
            }
            None => Store::memory_only(),
        };

        let contributors: DashMap<UserId, ContributorWordmap> = store
            .scan_prefix::<ContributorWordmap>(keys::CONTRIBUTOR)?
            .into_iter()
            .map(|c| (c.owner.clone(), c))
            .collect();
        let domain_wordmaps: DashMap<DomainId, Arc<DomainWordmap>> = store
            .scan_prefix::<DomainWordmap>(keys::DOMAIN_WORDMAP)?
            .into_iter()
            .map(|d| (d.domain.clone(), Arc::new(d)))
            .collect();

        let ledger = OwnershipLedger::new(economy.per_user_cap_bps, economy.tier_shares);
        ledger.load(store.scan_prefix::<OwnershipRow>(keys::OWNERSHIP)?);

        let settlement = RewardSettlement::new(RewardPolicy {
            min_alignment: economy.min_alignment,
            max_reward_bps: economy.max_reward_bps,
        });
        settlement.load(store.scan_prefix(keys::CLAIM)?);

        let payouts = WeightedPayoutEngine::new(economy.weights);
        payouts.load_weights(store.scan_prefix::<StakeholderWeight>(keys::WEIGHT)?);
        payouts.load_activity(store.scan_prefix::<(UserId, ActivityStats)>(keys::ACTIVITY)?);
        payouts.load_runs(store.scan_prefix::<DistributionRun>(keys::RUN)?);

        let market = MedallionMarket::load(
            PricingPolicy::from_config(economy),
            RevocationPolicy::from_config(economy),
            store.scan_prefix::<Medallion>(keys::MEDALLION)?,
            store.scan_prefix::<(UserId, u64)>(keys::ESCROW)?,
        );

        let treasury = Treasury::with_state(
            store.get::<TreasuryState>(keys::TREASURY)?.unwrap_or_default(),
            economy.treasury_yield_bps,
        );
        let audit = AuditLog::from_events(store.scan_prefix(keys::AUDIT)?);

        let scorer = AlignmentScorer::new(
            processor,
            Duration::from_millis(economy.extract_timeout_ms),
        );

        tracing::info!(
            persistent = store.is_persistent(),
            contributors = contributors.len(),
            domains = domain_wordmaps.len(),
            claims = settlement.len(),
            audit_events = audit.len(),
            "initializing verbum engine"
        );

        Ok(Self {
            config,
            store: Arc::new(store),
            scorer,
            contributors,
            domain_wordmaps,
            ledger,
            audit,
            settlement,
            payouts,
            market,
            treasury,
            domain_locks: DashMap::new(),
            user_locks: DashMap::new(),
            market_lock: Mutex::new(()),
            payout_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn economy(&self) -> &EconomyConfig {
        &self.config.economy
    }

    // -----------------------------------------------------------------------
    // Locks and shared helpers
    // -----------------------------------------------------------------------

    fn domain_lock(&self, domain: &DomainId) -> Arc<Mutex<()>> {
        Arc::clone(self.domain_locks.entry(domain.clone()).or_default().value())
    }

    fn user_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        Arc::clone(self.user_locks.entry(user.clone()).or_default().value())
    }

    /// Rebuild a domain wordmap from `rows`, optionally with one contributor's
    /// wordmap replaced (`Some`) or wiped (`None`) ahead of its commit.
    ///
    /// Returns `None` when no owner holds a positive share.
    fn derive_domain_wordmap(
        &self,
        domain: &DomainId,
        rows: &[OwnershipRow],
        pending: Option<(&UserId, Option<&ContributorWordmap>)>,
    ) -> Option<DomainWordmap> {
        let held: Vec<(&UserId, u32, Option<ContributorWordmap>)> = rows
            .iter()
            .filter(|r| r.bps > 0)
            .map(|r| {
                let wordmap = match pending {
                    Some((user, replacement)) if user == &r.user => replacement.cloned(),
                    _ => self.contributors.get(&r.user).map(|c| c.value().clone()),
                };
                (&r.user, r.bps, wordmap)
            })
            .collect();
        let shares: Vec<OwnerShare<'_>> = held
            .iter()
            .map(|(user, bps, wordmap)| OwnerShare {
                user: *user,
                bps: *bps,
                wordmap: wordmap.as_ref(),
            })
            .collect();
        domain::recalculate(domain, &shares, self.economy().wordmap_cap).ok()
    }

    /// The domain's rows with `row` inserted or replaced.
    fn rows_with(&self, row: &OwnershipRow) -> Vec<OwnershipRow> {
        let mut rows = self.ledger.domain_rows(&row.domain);
        rows.retain(|r| r.user != row.user);
        rows.push(row.clone());
        rows
    }

    fn stage_domain_wordmap(
        batch: &mut Batch,
        domain: &DomainId,
        derived: Option<&DomainWordmap>,
    ) -> VerbumResult<()> {
        match derived {
            Some(dwm) => batch.put(keys::domain_wordmap(domain), dwm)?,
            None => batch.delete(keys::domain_wordmap(domain)),
        }
        Ok(())
    }

    fn publish_domain_wordmap(&self, domain: &DomainId, derived: Option<DomainWordmap>) {
        match derived {
            Some(dwm) => {
                self.domain_wordmaps.insert(domain.clone(), Arc::new(dwm));
            }
            None => {
                self.domain_wordmaps.remove(domain);
            }
        }
    }

    /// Persist a ledger row change together with its audit event and the
    /// rebuilt domain wordmap, then publish all three.
    fn apply_ledger_change(
        &self,
        row: OwnershipRow,
        event: AuditEvent,
        mut batch: Batch,
    ) -> VerbumResult<()> {
        self.ledger.verify(&row)?;
        let derived = self.derive_domain_wordmap(&row.domain, &self.rows_with(&row), None);
        batch.put(keys::ownership(&row.domain, &row.user), &row)?;
        batch.put(keys::audit(event.seq), &event)?;
        Self::stage_domain_wordmap(&mut batch, &row.domain, derived.as_ref())?;
        self.store.commit(batch)?;

        let domain = row.domain.clone();
        self.ledger.commit(row)?;
        self.audit.append(event);
        self.publish_domain_wordmap(&domain, derived);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Wordmaps
    // -----------------------------------------------------------------------

    /// Extract a text unit and merge it into its author's wordmap.
    ///
    /// Every domain the author holds a share of is recalculated in the same
    /// commit. An empty extraction is rejected and changes nothing.
    pub fn ingest(&self, unit: TextUnit) -> VerbumResult<IngestReport> {
        let incoming = self.scorer.candidate_wordmap(&unit.text);
        let now = now_secs();
        let economy = self.economy();

        let user_lock = self.user_lock(&unit.user);
        let _user_guard = user_lock.lock().expect("user lock poisoned");

        let existing = self.contributors.get(&unit.user).map(|c| c.value().clone());
        let next = ContributorWordmap::accumulate(
            existing.as_ref(),
            &unit.user,
            &unit.unit_id,
            incoming,
            economy.decay,
            economy.wordmap_cap,
            now,
        )?;
        let activity = self
            .payouts
            .plan_activity(&unit.user, |a| a.record_contribution(false, now));

        let mut domains: Vec<DomainId> = self
            .ledger
            .user_domains(&unit.user)
            .into_iter()
            .map(|r| r.domain)
            .collect();
        domains.sort();
        let locks: Vec<Arc<Mutex<()>>> = domains.iter().map(|d| self.domain_lock(d)).collect();
        let _domain_guards: Vec<_> = locks
            .iter()
            .map(|l| l.lock().expect("domain lock poisoned"))
            .collect();

        let mut batch = Batch::new();
        batch.put(keys::contributor(&unit.user), &next)?;
        batch.put(keys::activity(&unit.user), &(unit.user.clone(), activity.clone()))?;
        let mut derived = Vec::with_capacity(domains.len());
        for domain in &domains {
            let rows = self.ledger.domain_rows(domain);
            let dwm = self.derive_domain_wordmap(domain, &rows, Some((&unit.user, Some(&next))));
            Self::stage_domain_wordmap(&mut batch, domain, dwm.as_ref())?;
            derived.push((domain.clone(), dwm));
        }
        self.store.commit(batch)?;

        let report = IngestReport {
            user: unit.user.clone(),
            unit_id: unit.unit_id,
            recording_count: next.recording_count,
            terms: next.terms.len(),
            recalculated: domains,
        };
        self.contributors.insert(unit.user.clone(), next);
        self.payouts.put_activity(&unit.user, activity);
        for (domain, dwm) in derived {
            self.publish_domain_wordmap(&domain, dwm);
        }
        tracing::info!(
            user = %report.user,
            unit = %report.unit_id,
            terms = report.terms,
            domains = report.recalculated.len(),
            "ingested text unit"
        );
        Ok(report)
    }

    /// Ingest everything a source has pending. A unit that fails is logged
    /// and skipped; the rest still go in.
    pub fn ingest_from(&self, source: &dyn TextSource) -> Vec<(String, VerbumResult<IngestReport>)> {
        source
            .pending_units()
            .into_iter()
            .map(|unit| {
                let unit_id = unit.unit_id.clone();
                let result = self.ingest(unit);
                if let Err(ref e) = result {
                    tracing::warn!(unit = %unit_id, error = %e, "skipping text unit");
                }
                (unit_id, result)
            })
            .collect()
    }

    /// Wipe a contributor's wordmap and rebuild the domains it fed.
    pub fn reset_contributor_wordmap(&self, user: &UserId) -> VerbumResult<Vec<DomainId>> {
        let user_lock = self.user_lock(user);
        let _user_guard = user_lock.lock().expect("user lock poisoned");

        if !self.contributors.contains_key(user) {
            return Err(WordmapError::ContributorNotFound {
                user: user.to_string(),
            }
            .into());
        }
        let mut domains: Vec<DomainId> = self
            .ledger
            .user_domains(user)
            .into_iter()
            .map(|r| r.domain)
            .collect();
        domains.sort();
        let locks: Vec<Arc<Mutex<()>>> = domains.iter().map(|d| self.domain_lock(d)).collect();
        let _domain_guards: Vec<_> = locks
            .iter()
            .map(|l| l.lock().expect("domain lock poisoned"))
            .collect();

        let mut batch = Batch::new();
        batch.delete(keys::contributor(user));
        let mut derived = Vec::with_capacity(domains.len());
        for domain in &domains {
            let rows = self.ledger.domain_rows(domain);
            let dwm = self.derive_domain_wordmap(domain, &rows, Some((user, None)));
            Self::stage_domain_wordmap(&mut batch, domain, dwm.as_ref())?;
            derived.push((domain.clone(), dwm));
        }
        self.store.commit(batch)?;

        self.contributors.remove(user);
        for (domain, dwm) in derived {
            self.publish_domain_wordmap(&domain, dwm);
        }
        tracing::info!(%user, domains = domains.len(), "contributor wordmap reset");
        Ok(domains)
    }

    /// Fully recompute a domain wordmap from the ledger and contributor wordmaps.
    pub fn recalculate(&self, domain: &DomainId) -> VerbumResult<Arc<DomainWordmap>> {
        let lock = self.domain_lock(domain);
        let _guard = lock.lock().expect("domain lock poisoned");

        let rows = self.ledger.domain_rows(domain);
        let dwm = self
            .derive_domain_wordmap(domain, &rows, None)
            .ok_or_else(|| WordmapError::NoOwners {
                domain: domain.to_string(),
            })?;
        let mut batch = Batch::new();
        batch.put(keys::domain_wordmap(domain), &dwm)?;
        self.store.commit(batch)?;

        let snapshot = Arc::new(dwm);
        self.domain_wordmaps
            .insert(domain.clone(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn contributor_wordmap(&self, user: &UserId) -> Option<ContributorWordmap> {
        self.contributors.get(user).map(|c| c.value().clone())
    }

    /// The current snapshot of a domain wordmap.
    pub fn domain_wordmap(&self, domain: &DomainId) -> Option<Arc<DomainWordmap>> {
        self.domain_wordmaps.get(domain).map(|d| Arc::clone(d.value()))
    }

    pub fn wordmap(&self, domain: &DomainId) -> VerbumResult<WordmapView> {
        let dwm = self
            .domain_wordmap(domain)
            .ok_or_else(|| WordmapError::DomainNotFound {
                domain: domain.to_string(),
            })?;
        Ok(WordmapView::from(dwm.as_ref()))
    }

    pub fn compare(&self, a: &DomainId, b: &DomainId) -> VerbumResult<WordmapComparison> {
        let find = |d: &DomainId| {
            self.domain_wordmap(d)
                .ok_or_else(|| WordmapError::DomainNotFound {
                    domain: d.to_string(),
                })
        };
        let (wa, wb) = (find(a)?, find(b)?);
        Ok(domain::compare(&wa.terms, &wb.terms))
    }

    /// Score one candidate against many domains.
    ///
    /// Domains without a wordmap are logged and skipped. Results are sorted
    /// by score, best first.
    pub fn score_across_domains(&self, text: &str, domains: &[DomainId]) -> Vec<DomainAlignment> {
        let candidate = self.scorer.candidate_wordmap(text);
        let mut scored: Vec<DomainAlignment> = domains
            .iter()
            .filter_map(|domain| match self.domain_wordmap(domain) {
                Some(dwm) if !dwm.terms.is_empty() => Some(DomainAlignment {
                    domain: domain.clone(),
                    alignment: score_wordmaps(&candidate, &dwm.terms),
                }),
                _ => {
                    tracing::warn!(%domain, "no domain wordmap; skipping in cascade");
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.alignment
                .score
                .total_cmp(&a.alignment.score)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        scored
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    /// Grant the tier's starting share of a domain.
    pub fn unlock(&self, user: &UserId, domain: &DomainId, tier: Tier) -> VerbumResult<DomainShare> {
        let now = now_secs();
        let user_lock = self.user_lock(user);
        let _user_guard = user_lock.lock().expect("user lock poisoned");
        let lock = self.domain_lock(domain);
        let _guard = lock.lock().expect("domain lock poisoned");

        let row = self.ledger.plan_unlock(user, domain, tier, now)?;
        let event = self
            .audit
            .prepare(AuditKind::Unlocked, user, domain, 0, row.bps, now);
        let share = DomainShare::from(&row);
        let bps = row.bps;
        self.apply_ledger_change(row, event, Batch::new())?;
        tracing::info!(%user, %domain, %tier, bps, "domain unlocked");
        Ok(share)
    }

    /// Unlock with the tier reported by the identity service.
    pub fn unlock_verified(
        &self,
        identity: &dyn IdentityService,
        user: &UserId,
        domain: &DomainId,
    ) -> VerbumResult<DomainShare> {
        let tier = identity.tier(user).ok_or_else(|| LedgerError::Validation {
            message: format!("identity service does not know {user}"),
        })?;
        self.unlock(user, domain, tier)
    }

    /// Score a candidate and credit the reward to the claimant's share.
    ///
    /// Replaying a settled (content hash, user, domain) returns the recorded
    /// outcome with `replayed` set and credits nothing.
    pub fn claim_reward(&self, request: ClaimRequest) -> VerbumResult<ClaimOutcome> {
        let key = ClaimKey::of(&request);
        if let Some(prior) = self.settlement.prior(&key) {
            return Ok(ClaimOutcome::from_claim(&prior, true));
        }
        // Extraction runs before the domain lock is taken.
        let candidate = self.scorer.candidate_wordmap(&request.text);
        let now = now_secs();

        let lock = self.domain_lock(&request.domain);
        let _guard = lock.lock().expect("domain lock poisoned");

        if let Some(prior) = self.settlement.prior(&key) {
            return Ok(ClaimOutcome::from_claim(&prior, true));
        }
        let target = self
            .domain_wordmap(&request.domain)
            .filter(|d| !d.terms.is_empty())
            .ok_or_else(|| WordmapError::DomainNotFound {
                domain: request.domain.to_string(),
            })?;
        let alignment = score_wordmaps(&candidate, &target.terms);

        let planned = match self.settlement.plan(&request, &alignment, &self.ledger, now) {
            Ok(p) => p,
            Err(e) => {
                tracing::info!(
                    user = %request.user,
                    domain = %request.domain,
                    alignment = alignment.score,
                    error = %e,
                    "claim rejected"
                );
                return Err(e.into());
            }
        };
        let claim = planned.claim;
        let increase = planned.increase;

        let mut batch = Batch::new();
        batch.put(keys::claim(&claim.key), &claim)?;
        if increase.applied_bps > 0 {
            let event = self.audit.prepare(
                AuditKind::Rewarded {
                    content_hash: request.content_hash.clone(),
                },
                &request.user,
                &request.domain,
                increase.previous_bps,
                increase.row.bps,
                now,
            );
            self.apply_ledger_change(increase.row.clone(), event, batch)?;
        } else {
            self.store.commit(batch)?;
        }
        let claim = self.settlement.record(claim);

        tracing::info!(
            user = %request.user,
            domain = %request.domain,
            alignment = claim.alignment,
            requested_bps = claim.requested_bps,
            applied_bps = claim.reward_bps,
            "claim settled"
        );
        Ok(ClaimOutcome::from_claim(&claim, false))
    }

    /// Claim every artifact the generator produced for `user`. Each claim
    /// settles independently; failures are logged and reported per item.
    pub fn claim_generated(
        &self,
        user: &UserId,
        generator: &dyn ContentGenerator,
    ) -> Vec<(ContentHash, VerbumResult<ClaimOutcome>)> {
        generator
            .generated_for(user)
            .into_iter()
            .map(|content| {
                let hash = content.content_hash.clone();
                let result = self.claim_reward(ClaimRequest {
                    user: user.clone(),
                    domain: content.domain,
                    content_hash: content.content_hash,
                    text: content.text,
                    content_type: content.content_type,
                });
                if let Err(ref e) = result {
                    tracing::warn!(%user, content = %hash, error = %e, "generated claim failed");
                }
                (hash, result)
            })
            .collect()
    }

    /// Admin revocation: lower a share to `new_pct`. The row stays.
    pub fn revoke_ownership(
        &self,
        user: &UserId,
        domain: &DomainId,
        new_pct: f64,
        reason: &str,
    ) -> VerbumResult<DomainShare> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::Validation {
                message: "revocation requires a reason".into(),
            }
            .into());
        }
        let new_bps = percent_to_bps(new_pct)?;
        let now = now_secs();
        let user_lock = self.user_lock(user);
        let _user_guard = user_lock.lock().expect("user lock poisoned");
        let lock = self.domain_lock(domain);
        let _guard = lock.lock().expect("domain lock poisoned");

        let outcome = self.ledger.plan_revoke(user, domain, new_bps, now)?;
        let event = self.audit.prepare(
            AuditKind::Revoked {
                reason: reason.to_string(),
            },
            user,
            domain,
            outcome.previous_bps,
            new_bps,
            now,
        );
        let share = DomainShare::from(&outcome.row);
        self.apply_ledger_change(outcome.row, event, Batch::new())?;
        tracing::info!(
            %user,
            %domain,
            before_bps = outcome.previous_bps,
            after_bps = new_bps,
            reason,
            "ownership revoked"
        );
        Ok(share)
    }

    /// Domains in which `user` holds a positive share.
    pub fn user_domains(&self, user: &UserId) -> Vec<DomainShare> {
        self.ledger
            .user_domains(user)
            .iter()
            .map(DomainShare::from)
            .collect()
    }

    pub fn ownership(&self, user: &UserId, domain: &DomainId) -> Option<OwnershipRow> {
        self.ledger.get(user, domain)
    }

    /// Every row of a domain, zeroed ones included.
    pub fn domain_owners(&self, domain: &DomainId) -> Vec<OwnershipRow> {
        self.ledger.domain_rows(domain)
    }

    pub fn domain_total_pct(&self, domain: &DomainId) -> f64 {
        bps_to_percent(self.ledger.domain_total_bps(domain))
    }

    pub fn domains(&self) -> Vec<DomainId> {
        self.ledger.domains()
    }

    pub fn audit_log(&self, domain: &DomainId) -> Vec<AuditEvent> {
        self.audit.for_domain(domain)
    }

    // -----------------------------------------------------------------------
    // Activity and weights
    // -----------------------------------------------------------------------

    fn record_activity(
        &self,
        user: &UserId,
        update: impl FnOnce(&mut ActivityStats),
    ) -> VerbumResult<ActivityStats> {
        let user_lock = self.user_lock(user);
        let _guard = user_lock.lock().expect("user lock poisoned");
        let stats = self.payouts.plan_activity(user, update);
        let mut batch = Batch::new();
        batch.put(keys::activity(user), &(user.clone(), stats.clone()))?;
        self.store.commit(batch)?;
        self.payouts.put_activity(user, stats.clone());
        Ok(stats)
    }

    pub fn record_prediction(&self, user: &UserId, correct: bool) -> VerbumResult<ActivityStats> {
        let now = now_secs();
        self.record_activity(user, |a| a.record_prediction(correct, now))
    }

    pub fn record_interaction(&self, user: &UserId) -> VerbumResult<ActivityStats> {
        let now = now_secs();
        self.record_activity(user, |a| a.record_interaction(now))
    }

    /// Record a contribution made outside [`Engine::ingest`], e.g. one
    /// matched to a sponsor.
    pub fn record_contribution(
        &self,
        user: &UserId,
        sponsor_matched: bool,
    ) -> VerbumResult<ActivityStats> {
        let now = now_secs();
        self.record_activity(user, |a| a.record_contribution(sponsor_matched, now))
    }

    pub fn activity(&self, user: &UserId) -> ActivityStats {
        self.payouts.activity(user)
    }

    /// Recompute and store a stakeholder's weight from their activity.
    pub fn update_weights(&self, user: &UserId) -> VerbumResult<StakeholderWeight> {
        let user_lock = self.user_lock(user);
        let _guard = user_lock.lock().expect("user lock poisoned");
        let weight = self.payouts.plan_weights(user, now_secs());
        let mut batch = Batch::new();
        batch.put(keys::weight(user), &weight)?;
        self.store.commit(batch)?;
        tracing::debug!(%user, total = weight.total, "stakeholder weight updated");
        self.payouts.put_weight(weight.clone());
        Ok(weight)
    }

    pub fn weight(&self, user: &UserId) -> Option<StakeholderWeight> {
        self.payouts.weight(user)
    }

    // -----------------------------------------------------------------------
    // Distributions and treasury
    // -----------------------------------------------------------------------

    fn eligible(&self, user: &UserId) -> bool {
        !self.economy().require_medallion || self.market.holds_active(user)
    }

    /// Split `pool` across stakeholders by weight, exactly, once per run id.
    pub fn distribute_payout(
        &self,
        run_id: &RunId,
        pool: u64,
        payout_type: PayoutType,
    ) -> VerbumResult<Vec<PayoutShare>> {
        let _guard = self.payout_lock.lock().expect("payout lock poisoned");
        let run = self.payouts.plan_distribution(
            run_id,
            pool,
            payout_type,
            |u| self.eligible(u),
            now_secs(),
        )?;
        let mut batch = Batch::new();
        batch.put(keys::run(run_id), &run)?;
        self.store.commit(batch)?;

        let shares = PayoutShare::from_run(&run);
        tracing::info!(
            run = %run_id,
            %payout_type,
            pool,
            stakeholders = shares.len(),
            "distribution run completed"
        );
        self.payouts.record_run(run);
        Ok(shares)
    }

    /// Distribute the treasury's yield pool and debit the treasury in the
    /// same commit.
    pub fn distribute_yield(&self, run_id: &RunId) -> VerbumResult<Vec<PayoutShare>> {
        let _guard = self.payout_lock.lock().expect("payout lock poisoned");
        let pool = self.treasury.yield_pool();
        if pool == 0 {
            return Err(TreasuryError::Validation {
                message: "yield pool is empty; deposit into the treasury first".into(),
            }
            .into());
        }
        let run = self.payouts.plan_distribution(
            run_id,
            pool,
            PayoutType::Yield,
            |u| self.eligible(u),
            now_secs(),
        )?;
        let treasury = self.treasury.plan_release(pool)?;
        let mut batch = Batch::new();
        batch.put(keys::run(run_id), &run)?;
        batch.put(keys::TREASURY.to_string(), &treasury)?;
        self.store.commit(batch)?;

        let shares = PayoutShare::from_run(&run);
        tracing::info!(run = %run_id, pool, balance = treasury.balance, "yield distributed");
        self.treasury.commit(treasury);
        self.payouts.record_run(run);
        Ok(shares)
    }

    pub fn distribution(&self, run_id: &RunId) -> Option<DistributionRun> {
        self.payouts.run(run_id)
    }

    pub fn treasury_deposit(&self, amount: u64) -> VerbumResult<TreasuryView> {
        let _guard = self.payout_lock.lock().expect("payout lock poisoned");
        let next = self.treasury.plan_deposit(amount)?;
        let mut batch = Batch::new();
        batch.put(keys::TREASURY.to_string(), &next)?;
        self.store.commit(batch)?;
        self.treasury.commit(next);
        tracing::info!(amount, balance = next.balance, "treasury deposit");
        Ok(self.treasury())
    }

    pub fn treasury(&self) -> TreasuryView {
        let state = self.treasury.state();
        TreasuryView {
            balance: state.balance,
            yield_bps: self.treasury.yield_bps(),
            yield_pool: self.treasury.yield_pool(),
            total_deposited: state.total_deposited,
            total_released: state.total_released,
        }
    }

    // -----------------------------------------------------------------------
    // Medallions
    // -----------------------------------------------------------------------

    fn commit_medallion(&self, medallion: Medallion) -> VerbumResult<()> {
        let mut batch = Batch::new();
        batch.put(keys::medallion(medallion.id), &medallion)?;
        self.store.commit(batch)?;
        self.market.commit(medallion)?;
        Ok(())
    }

    pub fn medallion_price(&self, kind: MedallionKind) -> u64 {
        self.market.price(kind)
    }

    pub fn mint_medallion(&self, owner: &UserId, kind: MedallionKind) -> VerbumResult<Medallion> {
        let _guard = self.market_lock.lock().expect("market lock poisoned");
        let medallion = self.market.plan_mint(owner, kind, now_secs())?;
        self.commit_medallion(medallion.clone())?;
        tracing::info!(%owner, %kind, id = %medallion.id, price = medallion.mint_price, "medallion minted");
        Ok(medallion)
    }

    /// Grant an earned medallion. Free, uncapped and non-transferable.
    pub fn award_earned(&self, owner: &UserId) -> VerbumResult<Medallion> {
        let _guard = self.market_lock.lock().expect("market lock poisoned");
        let medallion = self.market.plan_award_earned(owner, now_secs())?;
        self.commit_medallion(medallion.clone())?;
        tracing::info!(%owner, id = %medallion.id, "earned medallion awarded");
        Ok(medallion)
    }

    /// Add to the user's escrow, minting the cheapest tier once it is covered.
    pub fn stake_toward_medallion(&self, user: &UserId, amount: u64) -> VerbumResult<StakeOutcome> {
        let _guard = self.market_lock.lock().expect("market lock poisoned");
        let outcome = self.market.plan_stake(user, amount, now_secs())?;
        let mut batch = Batch::new();
        batch.put(keys::escrow(user), &(user.clone(), outcome.escrow_balance))?;
        if let Some(ref medallion) = outcome.minted {
            batch.put(keys::medallion(medallion.id), medallion)?;
        }
        self.store.commit(batch)?;
        self.market.commit_stake(&outcome)?;
        match outcome.minted {
            Some(ref m) => tracing::info!(
                %user,
                kind = %m.kind,
                id = %m.id,
                carried = outcome.escrow_balance,
                "stake minted medallion"
            ),
            None => tracing::debug!(%user, escrow = outcome.escrow_balance, "stake escrowed"),
        }
        Ok(outcome)
    }

    pub fn list_medallion(&self, id: MedallionId, seller: &UserId, ask: u64) -> VerbumResult<Medallion> {
        let _guard = self.market_lock.lock().expect("market lock poisoned");
        let medallion = self.market.plan_list(id, seller, ask)?;
        self.commit_medallion(medallion.clone())?;
        tracing::info!(%id, %seller, ask, "medallion listed");
        Ok(medallion)
    }

    pub fn delist_medallion(&self, id: MedallionId, seller: &UserId) -> VerbumResult<Medallion> {
        let _guard = self.market_lock.lock().expect("market lock poisoned");
        let medallion = self.market.plan_delist(id, seller)?;
        self.commit_medallion(medallion.clone())?;
        Ok(medallion)
    }

    pub fn buy_medallion(&self, id: MedallionId, buyer: &UserId) -> VerbumResult<SaleReceipt> {
        let _guard = self.market_lock.lock().expect("market lock poisoned");
        let receipt = self.market.plan_buy(id, buyer)?;
        self.commit_medallion(receipt.medallion.clone())?;
        tracing::info!(%id, seller = %receipt.seller, %buyer, price = receipt.price, "medallion sold");
        Ok(receipt)
    }

    /// Record one resolved outcome (crash or accurate) for a medallion.
    pub fn record_medallion_outcome(&self, id: MedallionId, crashed: bool) -> VerbumResult<Medallion> {
        let _guard = self.market_lock.lock().expect("market lock poisoned");
        let medallion = self.market.plan_outcome(id, crashed)?;
        self.commit_medallion(medallion.clone())?;
        Ok(medallion)
    }

    pub fn revoke_medallion(&self, id: MedallionId, reason: &str) -> VerbumResult<Medallion> {
        let _guard = self.market_lock.lock().expect("market lock poisoned");
        let medallion = self.market.plan_revoke(id, reason, now_secs())?;
        self.commit_medallion(medallion.clone())?;
        tracing::info!(%id, owner = %medallion.owner, reason = reason.trim(), "medallion revoked");
        Ok(medallion)
    }

    pub fn medallion(&self, id: MedallionId) -> VerbumResult<Medallion> {
        Ok(self.market.get(id)?)
    }

    /// Resolve a raw numeric id, as typed on the command line.
    pub fn medallion_id(raw: u64) -> VerbumResult<MedallionId> {
        Ok(MedallionId::new(raw).ok_or(MarketError::NotFound { id: raw })?)
    }

    pub fn medallions_of(&self, owner: &UserId) -> Vec<Medallion> {
        self.market.medallions_of(owner)
    }

    pub fn medallion_listings(&self) -> Vec<Medallion> {
        self.market.listings()
    }

    pub fn medallion_supply(&self) -> Vec<Supply> {
        self.market.supply()
    }

    pub fn escrow_balance(&self, user: &UserId) -> u64 {
        self.market.escrow_balance(user)
    }

    // -----------------------------------------------------------------------
    // Info
    // -----------------------------------------------------------------------

    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            persistent: self.store.is_persistent(),
            contributors: self.contributors.len(),
            domains: self.ledger.domains().len(),
            domain_wordmaps: self.domain_wordmaps.len(),
            claims: self.settlement.len(),
            audit_events: self.audit.len(),
            medallions: self
                .market
                .supply()
                .iter()
                .map(|s| s.minted as usize)
                .sum(),
            treasury_balance: self.treasury.balance(),
        }
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub persistent: bool,
    pub contributors: usize,
    pub domains: usize,
    pub domain_wordmaps: usize,
    pub claims: usize,
    pub audit_events: usize,
    pub medallions: usize,
    pub treasury_balance: u64,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "verbum engine info")?;
        writeln!(f, "  persistent:     {}", self.persistent)?;
        writeln!(f, "  contributors:   {}", self.contributors)?;
        writeln!(f, "  domains:        {}", self.domains)?;
        writeln!(f, "  wordmaps:       {}", self.domain_wordmaps)?;
        writeln!(f, "  claims:         {}", self.claims)?;
        writeln!(f, "  audit events:   {}", self.audit_events)?;
        writeln!(f, "  medallions:     {}", self.medallions)?;
        writeln!(f, "  treasury:       {}", self.treasury_balance)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("ledger", &self.ledger)
            .finish()
    }
}
