// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # verbum
//!
//! A wordmap-weighted ownership economy. Contributors build vocabulary
//! fingerprints from the text they contribute; those fingerprints, weighted by
//! ownership, define each domain's wordmap; generated content that aligns with
//! a domain's wordmap earns its creator a bounded share of that domain.
//!
//! ## Architecture
//!
//! - **Wordmaps** (`wordmap`, `text`): decay-merged term maps per contributor,
//!   ownership-weighted recalculation per domain
//! - **Scoring** (`scoring`): Jaccard alignment of candidate text against a domain
//! - **Ownership** (`ledger`, `settlement`, `audit`): basis-point shares with a
//!   hard 100% ceiling per domain, idempotent reward claims, append-only audit
//! - **Payouts** (`payout`, `treasury`): activity-weighted, remainder-exact
//!   distributions and treasury yield
//! - **Medallions** (`market`): capped, bonding-curve priced access tokens with
//!   escrow staking, resale and crash-rate revocation
//! - **Storage** (`store`): ACID batches (redb), reloaded at startup
//!
//! ## Library usage
//!
//! ```no_run
//! use verbum::collab::TextUnit;
//! use verbum::engine::{Engine, EngineConfig};
//! use verbum::ids::{DomainId, UserId};
//! use verbum::ledger::Tier;
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let alice = UserId::new("alice").unwrap();
//! let jazz = DomainId::new("jazz").unwrap();
//! engine.unlock(&alice, &jazz, Tier::Contributor).unwrap();
//! engine
//!     .ingest(TextUnit {
//!         unit_id: "rec-1".into(),
//!         user: alice.clone(),
//!         text: "saxophone improvisation over a walking bass line".into(),
//!     })
//!     .unwrap();
//! println!("{:?}", engine.wordmap(&jazz).unwrap());
//! ```

pub mod audit;
pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod market;
pub mod paths;
pub mod payout;
pub mod scoring;
pub mod settlement;
pub mod store;
pub mod text;
pub mod treasury;
pub mod wordmap;
