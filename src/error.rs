//! Rich diagnostic error types for the verbum engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly what
//! went wrong and whether retrying makes sense.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the verbum engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum VerbumError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Wordmap(#[from] WordmapError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Payout(#[from] PayoutError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Treasury(#[from] TreasuryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Identifier errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IdError {
    #[error("invalid {kind} identifier {raw:?}: {reason}")]
    #[diagnostic(
        code(verbum::id::invalid),
        help(
            "Identifiers must be 1 to 128 characters, must not contain '/' \
             or control characters, and must not have surrounding whitespace."
        )
    )]
    Invalid {
        kind: &'static str,
        raw: String,
        reason: &'static str,
    },

    #[error("medallion id allocator exhausted")]
    #[diagnostic(code(verbum::id::exhausted))]
    AllocatorExhausted,
}

// ---------------------------------------------------------------------------
// Wordmap errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum WordmapError {
    #[error("empty wordmap submitted for {owner}")]
    #[diagnostic(
        code(verbum::wordmap::empty_incoming),
        help(
            "The content unit produced no countable terms. Submit text with at least \
             one non-stopword term of three or more characters."
        )
    )]
    EmptyIncoming { owner: String },

    #[error("domain {domain} has no owners with a positive share")]
    #[diagnostic(
        code(verbum::wordmap::no_owners),
        help("Unlock the domain for at least one contributor before recalculating its wordmap.")
    )]
    NoOwners { domain: String },

    #[error("no wordmap for domain {domain}")]
    #[diagnostic(
        code(verbum::wordmap::domain_not_found),
        help(
            "The domain wordmap has not been computed yet, or it is empty. \
             Owners of the domain must ingest content before candidates can be scored."
        )
    )]
    DomainNotFound { domain: String },

    #[error("no wordmap for contributor {user}")]
    #[diagnostic(
        code(verbum::wordmap::contributor_not_found),
        help("The contributor has not ingested any content yet.")
    )]
    ContributorNotFound { user: String },
}

// ---------------------------------------------------------------------------
// Ledger errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("{user} already unlocked {domain} (current share {current_bps} bps)")]
    #[diagnostic(
        code(verbum::ledger::already_unlocked),
        help("The ownership row already exists. No action needed; the current share is reported.")
    )]
    AlreadyUnlocked {
        user: String,
        domain: String,
        current_bps: u32,
    },

    #[error("no ownership row for {user} in {domain}")]
    #[diagnostic(
        code(verbum::ledger::not_found),
        help("Unlock the domain for this user first.")
    )]
    NotFound { user: String, domain: String },

    #[error("invalid ledger operation: {message}")]
    #[diagnostic(code(verbum::ledger::validation))]
    Validation { message: String },

    #[error("ownership of {domain} would total {total_bps} bps, above 10000")]
    #[diagnostic(
        code(verbum::ledger::consistency),
        help(
            "The commit was aborted and nothing was applied. This indicates a bug \
             in delta clipping; please report it with the audit log for the domain."
        )
    )]
    Consistency { domain: String, total_bps: u64 },
}

// ---------------------------------------------------------------------------
// Settlement errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SettlementError {
    #[error("alignment {alignment:.4} is below the reward threshold {threshold:.4}")]
    #[diagnostic(
        code(verbum::settlement::below_threshold),
        help(
            "The content's vocabulary overlaps too little with the domain wordmap. \
             Resubmit content that uses more of the domain's vocabulary."
        )
    )]
    BelowThreshold { alignment: f64, threshold: f64 },

    #[error("invalid claim: {message}")]
    #[diagnostic(code(verbum::settlement::validation))]
    Validation { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Wordmap(#[from] WordmapError),

    #[error("claim scored {alignment:.4} but the ledger rejected it")]
    #[diagnostic(
        code(verbum::settlement::rejected),
        help("The wrapped ledger error says why; a missing share means the claimant must unlock the domain first.")
    )]
    Rejected {
        alignment: f64,
        #[source]
        #[diagnostic_source]
        source: LedgerError,
    },
}

impl SettlementError {
    /// The alignment score achieved, if the claim got far enough to be scored.
    pub fn alignment(&self) -> Option<f64> {
        match self {
            Self::BelowThreshold { alignment, .. } | Self::Rejected { alignment, .. } => {
                Some(*alignment)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Payout errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PayoutError {
    #[error("invalid distribution: {message}")]
    #[diagnostic(code(verbum::payout::validation))]
    Validation { message: String },

    #[error("no eligible stakeholders with a positive weight")]
    #[diagnostic(
        code(verbum::payout::no_stakeholders),
        help(
            "Update stakeholder weights first, and make sure participants hold an \
             active medallion when medallion gating is enabled."
        )
    )]
    NoStakeholders,

    #[error("distribution run {run_id} already completed")]
    #[diagnostic(
        code(verbum::payout::run_completed),
        help("Each run id is executed at most once. Use a fresh run id for a new distribution.")
    )]
    RunAlreadyCompleted { run_id: String },

    #[error("distribution run {run_id} pays out {total} but the pool is {pool}")]
    #[diagnostic(
        code(verbum::payout::consistency),
        help("The run was aborted before any record was written. Please report this as a bug.")
    )]
    Consistency { run_id: String, total: u64, pool: u64 },
}

// ---------------------------------------------------------------------------
// Medallion market errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MarketError {
    #[error("{kind} medallion supply exhausted (cap {cap})")]
    #[diagnostic(
        code(verbum::market::supply_exceeded),
        help("No more medallions of this type can be minted. Buy a listed one instead.")
    )]
    SupplyExceeded { kind: String, cap: u32 },

    #[error("not eligible: {message}")]
    #[diagnostic(code(verbum::market::ineligible))]
    Ineligible { message: String },

    #[error("medallion {id} not found")]
    #[diagnostic(code(verbum::market::not_found))]
    NotFound { id: u64 },

    #[error("medallion {id} cannot {action} while {state}")]
    #[diagnostic(
        code(verbum::market::invalid_transition),
        help("Medallions move MINTED -> LISTED <-> ACTIVE -> REVOKED; REVOKED is terminal.")
    )]
    InvalidTransition {
        id: u64,
        state: String,
        action: String,
    },

    #[error("invalid market operation: {message}")]
    #[diagnostic(code(verbum::market::validation))]
    Validation { message: String },
}

// ---------------------------------------------------------------------------
// Treasury errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TreasuryError {
    #[error("treasury holds {balance}, cannot release {requested}")]
    #[diagnostic(code(verbum::treasury::insufficient_funds))]
    InsufficientFunds { requested: u64, balance: u64 },

    #[error("invalid treasury operation: {message}")]
    #[diagnostic(code(verbum::treasury::validation))]
    Validation { message: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(verbum::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(verbum::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             The whole batch was rolled back; no partial state was written."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(verbum::store::serde),
        help(
            "Failed to serialize or deserialize a record. \
             This usually means the stored format changed between versions."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(verbum::engine::invalid_config),
        help("Check the EconomyConfig fields. {message}")
    )]
    InvalidConfig { message: String },

    #[error("data directory error: {path}")]
    #[diagnostic(
        code(verbum::engine::data_dir),
        help("Ensure the path exists and has read/write permissions.")
    )]
    DataDir { path: String },
}

/// Convenience alias for functions returning verbum results.
pub type VerbumResult<T> = std::result::Result<T, VerbumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_error_converts_to_verbum_error() {
        let err = LedgerError::NotFound {
            user: "alice".into(),
            domain: "jazz".into(),
        };
        let top: VerbumError = err.into();
        assert!(matches!(top, VerbumError::Ledger(LedgerError::NotFound { .. })));
    }

    #[test]
    fn settlement_error_wraps_wordmap_error() {
        let err: SettlementError = WordmapError::DomainNotFound {
            domain: "jazz".into(),
        }
        .into();
        assert!(matches!(err, SettlementError::Wordmap(WordmapError::DomainNotFound { .. })));
        assert_eq!(err.alignment(), None);
    }

    #[test]
    fn below_threshold_reports_alignment() {
        let err = SettlementError::BelowThreshold {
            alignment: 0.05,
            threshold: 0.10,
        };
        assert_eq!(err.alignment(), Some(0.05));
        let msg = format!("{err}");
        assert!(msg.contains("0.0500"));
        assert!(msg.contains("0.1000"));
    }
}
