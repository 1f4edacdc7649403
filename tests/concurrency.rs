//! Concurrency tests: the ledger and market bounds must hold under
//! simultaneous callers.

use std::sync::Arc;
use std::thread;

use verbum::collab::TextUnit;
use verbum::config::{EconomyConfig, TierShares};
use verbum::engine::{Engine, EngineConfig};
use verbum::ids::{ContentHash, DomainId, UserId};
use verbum::ledger::Tier;
use verbum::market::MedallionKind;
use verbum::settlement::ClaimRequest;

fn u(name: &str) -> UserId {
    UserId::new(name).unwrap()
}

fn jazz() -> DomainId {
    DomainId::new("jazz").unwrap()
}

/// Twenty owners at 4.5% each leave 10% of headroom for rewards.
fn crowded_domain() -> Arc<Engine> {
    let engine = Engine::new(EngineConfig {
        economy: EconomyConfig {
            tier_shares: TierShares {
                explorer: 50,
                contributor: 200,
                patron: 450,
            },
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap();
    for i in 0..20 {
        engine
            .unlock(&u(&format!("user-{i:02}")), &jazz(), Tier::Patron)
            .unwrap();
    }
    engine
        .ingest(TextUnit {
            unit_id: "seed".into(),
            user: u("user-00"),
            text: vec!["saxophone"; 40].join(" "),
        })
        .unwrap();
    Arc::new(engine)
}

#[test]
fn concurrent_claims_never_exceed_the_domain_total() {
    let engine = crowded_domain();
    let handles: Vec<_> = (0..20)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for n in 0..3 {
                    let request = ClaimRequest {
                        user: u(&format!("user-{i:02}")),
                        domain: jazz(),
                        content_hash: ContentHash::new(format!("c-{i}-{n}")).unwrap(),
                        text: "saxophone".into(),
                        content_type: None,
                    };
                    engine.claim_reward(request).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total: u32 = engine.domain_owners(&jazz()).iter().map(|r| r.bps).sum();
    assert_eq!(total, 10_000);
    assert_eq!(engine.domain_total_pct(&jazz()), 100.0);
}

#[test]
fn concurrent_replays_credit_once() {
    let engine = crowded_domain();
    let request = ClaimRequest {
        user: u("user-03"),
        domain: jazz(),
        content_hash: ContentHash::new("shared").unwrap(),
        text: "saxophone".into(),
        content_type: None,
    };
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let request = request.clone();
            thread::spawn(move || engine.claim_reward(request).unwrap())
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|o| !o.replayed).count(), 1);
    assert!(outcomes.iter().all(|o| o.new_ownership_pct == 6.5));
    assert_eq!(engine.ownership(&u("user-03"), &jazz()).unwrap().bps, 650);
}

#[test]
fn concurrent_stakes_respect_supply_and_one_per_owner() {
    let engine = Arc::new(
        Engine::new(EngineConfig {
            economy: EconomyConfig {
                founding_cap: 1,
                standard_cap: 3,
                founding_price: 1_000_000,
                standard_base_price: 1_000,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap(),
    );
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let user = u(&format!("staker-{i}"));
                for _ in 0..4 {
                    // Later stakes may find every tier sold out.
                    let _ = engine.stake_toward_medallion(&user, 10_000);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let supply = engine.medallion_supply();
    let minted = |kind: MedallionKind| supply.iter().find(|s| s.kind == kind).unwrap().minted;
    assert!(minted(MedallionKind::Founding) <= 1);
    assert_eq!(minted(MedallionKind::Standard), 3);

    for i in 0..8 {
        let held = engine.medallions_of(&u(&format!("staker-{i}")));
        let standard = held.iter().filter(|m| m.kind == MedallionKind::Standard).count();
        let founding = held.iter().filter(|m| m.kind == MedallionKind::Founding).count();
        assert!(standard <= 1 && founding <= 1);
    }
}
