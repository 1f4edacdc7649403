//! End-to-end integration tests for the verbum engine.
//!
//! These tests drive the public `Engine` API the way a collaborator would:
//! unlock domains, ingest text, claim rewards, pay stakeholders and trade
//! medallions, checking the economy's invariants along the way.

use std::collections::HashMap;

use verbum::collab::{ContentGenerator, GeneratedContent, QueuedTextSource, TextUnit};
use verbum::config::{EconomyConfig, TierShares};
use verbum::engine::{Engine, EngineConfig};
use verbum::error::{
    LedgerError, MarketError, PayoutError, SettlementError, VerbumError, WordmapError,
};
use verbum::ids::{ContentHash, DomainId, RunId, UserId};
use verbum::ledger::Tier;
use verbum::market::MedallionKind;
use verbum::payout::PayoutType;
use verbum::settlement::ClaimRequest;

fn engine_with(economy: EconomyConfig) -> Engine {
    Engine::new(EngineConfig {
        economy,
        ..Default::default()
    })
    .unwrap()
}

fn test_engine() -> Engine {
    engine_with(EconomyConfig::default())
}

fn u(name: &str) -> UserId {
    UserId::new(name).unwrap()
}

fn d(name: &str) -> DomainId {
    DomainId::new(name).unwrap()
}

fn h(name: &str) -> ContentHash {
    ContentHash::new(name).unwrap()
}

fn unit(user: &str, id: &str, text: &str) -> TextUnit {
    TextUnit {
        unit_id: id.into(),
        user: u(user),
        text: text.into(),
    }
}

fn claim(user: &str, domain: &str, hash: &str, text: &str) -> ClaimRequest {
    ClaimRequest {
        user: u(user),
        domain: d(domain),
        content_hash: h(hash),
        text: text.into(),
        content_type: Some("article".into()),
    }
}

fn repeat(word: &str, n: usize) -> String {
    vec![word; n].join(" ")
}

/// A patron owning `jazz` whose wordmap makes saxophone and trumpet survive
/// the 5% weighting (40 × 0.05 = 2).
fn jazz_engine() -> Engine {
    let engine = test_engine();
    engine.unlock(&u("alice"), &d("jazz"), Tier::Patron).unwrap();
    let text = format!("{} {}", repeat("saxophone", 40), repeat("trumpet", 40));
    engine.ingest(unit("alice", "rec-1", &text)).unwrap();
    engine
}

#[test]
fn domain_wordmap_weights_owners_by_share() {
    let engine = engine_with(EconomyConfig {
        per_user_cap_bps: 6_000,
        tier_shares: TierShares {
            explorer: 4_000,
            contributor: 6_000,
            patron: 500,
        },
        ..Default::default()
    });
    engine.unlock(&u("ana"), &d("music"), Tier::Explorer).unwrap();
    engine.unlock(&u("ben"), &d("music"), Tier::Contributor).unwrap();
    assert_eq!(engine.domain_total_pct(&d("music")), 100.0);

    engine
        .ingest(unit("ana", "a-1", &repeat("saxophone", 10)))
        .unwrap();
    let text = format!("{} {}", repeat("saxophone", 10), repeat("trumpet", 5));
    let report = engine.ingest(unit("ben", "b-1", &text)).unwrap();
    assert_eq!(report.recalculated, vec![d("music")]);

    let dwm = engine.domain_wordmap(&d("music")).unwrap();
    assert!((dwm.terms.get("saxophone").unwrap() - 10.0).abs() < 1e-9);
    assert!((dwm.terms.get("trumpet").unwrap() - 3.0).abs() < 1e-9);
    assert_eq!(dwm.contributor_count, 2);
    assert_eq!(dwm.total_units, 2);

    // A full rebuild reproduces the incrementally maintained snapshot.
    let rebuilt = engine.recalculate(&d("music")).unwrap();
    assert_eq!(rebuilt.terms, dwm.terms);

    let view = engine.wordmap(&d("music")).unwrap();
    assert_eq!(view.terms[0].term, "saxophone");
}

#[test]
fn aligned_claim_credits_and_replay_is_idempotent() {
    let engine = jazz_engine();
    let first = engine
        .claim_reward(claim("alice", "jazz", "hash-1", "Saxophone and trumpet"))
        .unwrap();
    assert!((first.alignment_score - 1.0).abs() < 1e-12);
    assert_eq!(first.applied_pct, 2.0);
    assert_eq!(first.new_ownership_pct, 7.0);
    assert!(!first.replayed);

    let replay = engine
        .claim_reward(claim("alice", "jazz", "hash-1", "Saxophone and trumpet"))
        .unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.new_ownership_pct, 7.0);
    assert_eq!(engine.ownership(&u("alice"), &d("jazz")).unwrap().bps, 700);

    let second = engine
        .claim_reward(claim("alice", "jazz", "hash-2", "trumpet saxophone"))
        .unwrap();
    assert_eq!(second.new_ownership_pct, 9.0);

    // unlock + two rewards
    assert_eq!(engine.audit_log(&d("jazz")).len(), 3);
}

#[test]
fn reward_is_clipped_at_the_per_user_cap() {
    let engine = engine_with(EconomyConfig {
        tier_shares: TierShares {
            explorer: 50,
            contributor: 200,
            patron: 4_950,
        },
        ..Default::default()
    });
    engine.unlock(&u("alice"), &d("jazz"), Tier::Patron).unwrap();
    engine
        .ingest(unit("alice", "rec-1", &repeat("saxophone", 5)))
        .unwrap();

    let outcome = engine
        .claim_reward(claim("alice", "jazz", "hash-1", "saxophone"))
        .unwrap();
    assert_eq!(outcome.reward_pct, 2.0);
    assert_eq!(outcome.applied_pct, 0.5);
    assert_eq!(outcome.new_ownership_pct, 50.0);

    // At the cap the claim still settles, crediting nothing.
    let capped = engine
        .claim_reward(claim("alice", "jazz", "hash-2", "saxophone"))
        .unwrap();
    assert_eq!(capped.applied_pct, 0.0);
    assert_eq!(capped.new_ownership_pct, 50.0);
}

#[test]
fn below_threshold_claim_changes_nothing() {
    let engine = jazz_engine();
    let err = engine
        .claim_reward(claim("alice", "jazz", "hash-1", "guitar distortion riff"))
        .unwrap_err();
    match err {
        VerbumError::Settlement(SettlementError::BelowThreshold {
            alignment,
            threshold,
        }) => {
            assert_eq!(alignment, 0.0);
            assert_eq!(threshold, 0.10);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(engine.ownership(&u("alice"), &d("jazz")).unwrap().bps, 500);

    // A rejected claim is not recorded, so the hash can still settle later.
    let later = engine
        .claim_reward(claim("alice", "jazz", "hash-1", "saxophone"))
        .unwrap();
    assert!(!later.replayed);
}

/// `jazz` with twenty distinct terms, so partial overlaps score fractions.
fn wide_jazz_engine() -> Engine {
    let engine = test_engine();
    engine.unlock(&u("alice"), &d("jazz"), Tier::Patron).unwrap();
    let text: Vec<String> = (0..20).map(|i| repeat(&format!("term{i:02}x"), 40)).collect();
    engine.ingest(unit("alice", "rec-1", &text.join(" "))).unwrap();
    assert_eq!(engine.domain_wordmap(&d("jazz")).unwrap().terms.len(), 20);
    engine
}

#[test]
fn partial_overlap_below_threshold_reports_score() {
    let engine = wide_jazz_engine();
    let err = engine
        .claim_reward(claim("alice", "jazz", "hash-1", "term00x otherword"))
        .unwrap_err();
    match &err {
        VerbumError::Settlement(s @ SettlementError::BelowThreshold { alignment, .. }) => {
            // One shared term out of a 21-term union.
            assert_eq!(*alignment, 1.0 / 21.0);
            assert_eq!(s.alignment(), Some(1.0 / 21.0));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(engine.ownership(&u("alice"), &d("jazz")).unwrap().bps, 500);
    assert_eq!(engine.audit_log(&d("jazz")).len(), 1);
}

#[test]
fn claim_without_share_reports_score() {
    let engine = wide_jazz_engine();
    let err = engine
        .claim_reward(claim("mallory", "jazz", "hash-1", "term00x term01x"))
        .unwrap_err();
    match err {
        VerbumError::Settlement(
            ref s @ SettlementError::Rejected {
                source: LedgerError::NotFound { .. },
                ..
            },
        ) => {
            assert_eq!(s.alignment(), Some(0.1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(engine.ownership(&u("mallory"), &d("jazz")).is_none());
}

#[test]
fn unlock_twice_is_rejected() {
    let engine = test_engine();
    engine.unlock(&u("ana"), &d("jazz"), Tier::Explorer).unwrap();
    let err = engine
        .unlock(&u("ana"), &d("jazz"), Tier::Patron)
        .unwrap_err();
    assert!(matches!(
        err,
        VerbumError::Ledger(LedgerError::AlreadyUnlocked { .. })
    ));
    assert_eq!(engine.user_domains(&u("ana")).len(), 1);
}

#[test]
fn unlock_verified_uses_identity_tier() {
    let engine = test_engine();
    let identities: HashMap<UserId, Tier> = [(u("ana"), Tier::Contributor)].into_iter().collect();

    let share = engine
        .unlock_verified(&identities, &u("ana"), &d("jazz"))
        .unwrap();
    assert_eq!(share.ownership_pct, 2.0);

    let err = engine
        .unlock_verified(&identities, &u("ghost"), &d("jazz"))
        .unwrap_err();
    assert!(matches!(err, VerbumError::Ledger(LedgerError::Validation { .. })));
}

#[test]
fn revocation_lowers_share_and_rebuilds_wordmap() {
    let engine = jazz_engine();
    let share = engine
        .revoke_ownership(&u("alice"), &d("jazz"), 0.0, "terms of service")
        .unwrap();
    assert_eq!(share.ownership_pct, 0.0);
    // The row stays, but a domain with no positive owner has no wordmap.
    assert_eq!(engine.domain_owners(&d("jazz")).len(), 1);
    assert!(engine.domain_wordmap(&d("jazz")).is_none());
    assert!(engine.user_domains(&u("alice")).is_empty());

    let events = engine.audit_log(&d("jazz"));
    let last = events.last().unwrap();
    assert_eq!(last.before_bps, 500);
    assert_eq!(last.after_bps, 0);
}

#[test]
fn compare_and_cascade_scoring() {
    let engine = jazz_engine();
    engine.unlock(&u("alice"), &d("rock"), Tier::Patron).unwrap();
    // Alice now owns both domains, so both are rebuilt from her wordmap.
    let text = format!("{} {}", repeat("guitar", 40), repeat("saxophone", 40));
    engine.ingest(unit("alice", "rec-2", &text)).unwrap();

    let comparison = engine.compare(&d("jazz"), &d("rock")).unwrap();
    assert_eq!(comparison.jaccard, 1.0);
    assert!(comparison.only_in_a.is_empty());

    let scored =
        engine.score_across_domains("saxophone", &[d("jazz"), d("rock"), d("missing")]);
    assert_eq!(scored.len(), 2);
    assert!(scored[0].alignment.score >= scored[1].alignment.score);

    let err = engine.compare(&d("jazz"), &d("missing")).unwrap_err();
    assert!(matches!(
        err,
        VerbumError::Wordmap(WordmapError::DomainNotFound { .. })
    ));
}

#[test]
fn ingest_from_skips_failed_units() {
    let engine = test_engine();
    let source = QueuedTextSource::new(vec![
        unit("ana", "ok-1", "saxophone improvisation"),
        unit("ana", "empty", "the and of"),
        unit("ana", "ok-2", "trumpet improvisation"),
    ]);
    let results = engine.ingest_from(&source);
    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    assert!(results[1].1.is_err());
    assert!(results[2].1.is_ok());

    let cwm = engine.contributor_wordmap(&u("ana")).unwrap();
    assert_eq!(cwm.recording_count, 2);
    assert_eq!(cwm.source_id, "ok-1");
    assert_eq!(engine.activity(&u("ana")).contributions, 2);
}

struct FixedGenerator(Vec<GeneratedContent>);

impl ContentGenerator for FixedGenerator {
    fn generated_for(&self, _user: &UserId) -> Vec<GeneratedContent> {
        self.0.clone()
    }
}

#[test]
fn claim_generated_settles_each_item() {
    let engine = jazz_engine();
    let generator = FixedGenerator(vec![
        GeneratedContent {
            content_hash: h("g-1"),
            text: "saxophone trumpet".into(),
            content_type: None,
            domain: d("jazz"),
        },
        GeneratedContent {
            content_hash: h("g-2"),
            text: "saxophone".into(),
            content_type: None,
            domain: d("unknown"),
        },
    ]);
    let results = engine.claim_generated(&u("alice"), &generator);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].1.as_ref().unwrap().new_ownership_pct, 7.0);
    assert!(results[1].1.is_err());
}

#[test]
fn reset_wipes_contributor_and_domain_terms() {
    let engine = jazz_engine();
    let domains = engine.reset_contributor_wordmap(&u("alice")).unwrap();
    assert_eq!(domains, vec![d("jazz")]);
    assert!(engine.contributor_wordmap(&u("alice")).is_none());
    assert!(engine.wordmap(&d("jazz")).unwrap().terms.is_empty());

    let err = engine.reset_contributor_wordmap(&u("alice")).unwrap_err();
    assert!(matches!(
        err,
        VerbumError::Wordmap(WordmapError::ContributorNotFound { .. })
    ));
}

#[test]
fn payout_sums_exactly_and_runs_once() {
    let engine = engine_with(EconomyConfig {
        require_medallion: false,
        ..Default::default()
    });
    for (name, interactions) in [("amy", 3), ("bob", 12), ("cat", 0)] {
        for _ in 0..interactions {
            engine.record_interaction(&u(name)).unwrap();
        }
        engine.record_prediction(&u(name), true).unwrap();
        engine.update_weights(&u(name)).unwrap();
    }

    let run = RunId::new("2026-10").unwrap();
    let shares = engine
        .distribute_payout(&run, 1_001, PayoutType::Revenue)
        .unwrap();
    assert_eq!(shares.len(), 3);
    assert_eq!(shares.iter().map(|s| s.amount).sum::<u64>(), 1_001);
    let bob = shares.iter().find(|s| s.user == u("bob")).unwrap();
    assert!(shares.iter().all(|s| s.amount <= bob.amount));

    let err = engine
        .distribute_payout(&run, 1_001, PayoutType::Revenue)
        .unwrap_err();
    assert!(matches!(
        err,
        VerbumError::Payout(PayoutError::RunAlreadyCompleted { .. })
    ));
    assert_eq!(engine.distribution(&run).unwrap().total_paid(), 1_001);
}

#[test]
fn payout_requires_medallion_holders_by_default() {
    let engine = test_engine();
    engine.record_interaction(&u("amy")).unwrap();
    engine.update_weights(&u("amy")).unwrap();
    engine.record_interaction(&u("bob")).unwrap();
    engine.update_weights(&u("bob")).unwrap();

    let run = RunId::new("r1").unwrap();
    let err = engine
        .distribute_payout(&run, 500, PayoutType::Sponsor)
        .unwrap_err();
    assert!(matches!(err, VerbumError::Payout(PayoutError::NoStakeholders)));

    engine
        .mint_medallion(&u("amy"), MedallionKind::Standard)
        .unwrap();
    let shares = engine
        .distribute_payout(&run, 500, PayoutType::Sponsor)
        .unwrap();
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0].user, u("amy"));
    assert_eq!(shares[0].amount, 500);
}

#[test]
fn treasury_yield_is_released_once_per_run() {
    let engine = engine_with(EconomyConfig {
        require_medallion: false,
        ..Default::default()
    });
    engine.record_interaction(&u("amy")).unwrap();
    engine.update_weights(&u("amy")).unwrap();

    let view = engine.treasury_deposit(100_000).unwrap();
    assert_eq!(view.yield_pool, 5_000);

    let shares = engine.distribute_yield(&RunId::new("y1").unwrap()).unwrap();
    assert_eq!(shares[0].amount, 5_000);
    let view = engine.treasury();
    assert_eq!(view.balance, 95_000);
    assert_eq!(view.total_released, 5_000);

    assert!(engine.distribute_yield(&RunId::new("y1").unwrap()).is_err());
    assert_eq!(engine.treasury().balance, 95_000);
}

#[test]
fn standard_price_follows_the_bonding_curve() {
    let engine = test_engine();
    assert_eq!(engine.medallion_price(MedallionKind::Standard), 10_000);
    assert_eq!(engine.medallion_price(MedallionKind::Founding), 500_000);
    assert_eq!(engine.medallion_price(MedallionKind::Earned), 0);

    let first = engine
        .mint_medallion(&u("amy"), MedallionKind::Standard)
        .unwrap();
    assert_eq!(first.mint_price, 10_000);
    // base × (1000 + 19 × 1) / 1000
    assert_eq!(engine.medallion_price(MedallionKind::Standard), 10_190);

    let err = engine
        .mint_medallion(&u("amy"), MedallionKind::Standard)
        .unwrap_err();
    assert!(matches!(err, VerbumError::Market(MarketError::Ineligible { .. })));
}

#[test]
fn staking_carries_the_escrow_remainder() {
    let engine = test_engine();
    let first = engine.stake_toward_medallion(&u("amy"), 6_000).unwrap();
    assert!(first.minted.is_none());
    assert_eq!(first.escrow_balance, 6_000);

    let second = engine.stake_toward_medallion(&u("amy"), 5_000).unwrap();
    let minted = second.minted.unwrap();
    assert_eq!(minted.kind, MedallionKind::Standard);
    assert_eq!(second.escrow_balance, 1_000);
    assert_eq!(engine.escrow_balance(&u("amy")), 1_000);
    assert_eq!(engine.medallions_of(&u("amy")).len(), 1);
}

#[test]
fn resale_transfers_and_revocation_needs_a_crash_record() {
    let engine = test_engine();
    let medallion = engine
        .mint_medallion(&u("amy"), MedallionKind::Standard)
        .unwrap();
    let id = medallion.id;

    engine.list_medallion(id, &u("amy"), 12_000).unwrap();
    assert_eq!(engine.medallion_listings().len(), 1);
    let receipt = engine.buy_medallion(id, &u("bob")).unwrap();
    assert_eq!(receipt.seller, u("amy"));
    assert_eq!(receipt.price, 12_000);
    assert_eq!(engine.medallion(id).unwrap().owner, u("bob"));
    assert!(engine.medallion_listings().is_empty());

    for i in 0..10 {
        engine.record_medallion_outcome(id, i < 6).unwrap();
    }
    // 6 of 10 does not exceed 70%.
    let err = engine.revoke_medallion(id, "crash rate").unwrap_err();
    assert!(matches!(err, VerbumError::Market(MarketError::Ineligible { .. })));

    for _ in 0..10 {
        engine.record_medallion_outcome(id, true).unwrap();
    }
    // 16 of 20 = 80%.
    let revoked = engine.revoke_medallion(id, "crash rate").unwrap();
    assert!(!revoked.is_active());

    // Revoked supply still counts toward the price.
    assert_eq!(engine.medallion_price(MedallionKind::Standard), 10_190);
}

#[test]
fn earned_medallions_are_not_transferable() {
    let engine = test_engine();
    let earned = engine.award_earned(&u("amy")).unwrap();
    assert_eq!(earned.mint_price, 0);
    let err = engine.list_medallion(earned.id, &u("amy"), 100).unwrap_err();
    assert!(matches!(err, VerbumError::Market(MarketError::Ineligible { .. })));
}
