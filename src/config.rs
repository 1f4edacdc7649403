//! Economy configuration: every tunable constant of the engine.
//!
//! Configuration is persisted as TOML. Missing fields fall back to the
//! defaults below, so a config file only needs to name what it overrides.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Tier;

/// Errors from loading or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(verbum::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(verbum::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(verbum::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value `{field}`: {message}")]
    #[diagnostic(code(verbum::config::invalid))]
    Invalid { field: &'static str, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Starting share granted on unlock, per identity tier (basis points).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierShares {
    pub explorer: u32,
    pub contributor: u32,
    pub patron: u32,
}

impl Default for TierShares {
    fn default() -> Self {
        Self {
            explorer: 50,
            contributor: 200,
            patron: 500,
        }
    }
}

impl TierShares {
    pub fn for_tier(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Explorer => self.explorer,
            Tier::Contributor => self.contributor,
            Tier::Patron => self.patron,
        }
    }
}

/// Percent coefficients of the stakeholder weight formula. Must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightCoefficients {
    pub accuracy: u32,
    pub engagement: u32,
    pub sponsor_relevance: u32,
    pub consistency: u32,
}

impl Default for WeightCoefficients {
    fn default() -> Self {
        Self {
            accuracy: 40,
            engagement: 30,
            sponsor_relevance: 20,
            consistency: 10,
        }
    }
}

impl WeightCoefficients {
    pub fn sum(&self) -> u32 {
        self.accuracy + self.engagement + self.sponsor_relevance + self.consistency
    }
}

/// Every tunable constant of the ownership economy.
///
/// Percentages are basis points (1% = 100 bps), money is integer minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Multiplier applied to existing wordmap counts on every merge.
    pub decay: f64,
    /// Maximum number of terms kept in any wordmap.
    pub wordmap_cap: usize,
    /// Minimum alignment score for a claim to earn a reward.
    pub min_alignment: f64,
    /// Reward granted for a perfect (1.0) alignment, in basis points.
    pub max_reward_bps: u32,
    /// Maximum share one user may hold in one domain, in basis points.
    pub per_user_cap_bps: u32,
    pub tier_shares: TierShares,
    pub weights: WeightCoefficients,
    pub founding_cap: u32,
    pub standard_cap: u32,
    pub founding_price: u64,
    pub standard_base_price: u64,
    /// Resolved outcomes a medallion needs before it can be revoked.
    pub revoke_min_samples: u32,
    /// Crash rate (percent) a medallion must exceed to be revoked.
    pub revoke_crash_rate_pct: u32,
    /// Only holders of an active medallion take part in distributions.
    pub require_medallion: bool,
    /// Upper bound on one text-extraction call.
    pub extract_timeout_ms: u64,
    /// Share of the treasury balance released as the yield pool, in basis points.
    pub treasury_yield_bps: u32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            decay: 0.95,
            wordmap_cap: 200,
            min_alignment: 0.10,
            max_reward_bps: 200,
            per_user_cap_bps: 5_000,
            tier_shares: TierShares::default(),
            weights: WeightCoefficients::default(),
            founding_cap: 100,
            standard_cap: 1_000,
            founding_price: 500_000,
            standard_base_price: 10_000,
            revoke_min_samples: 10,
            revoke_crash_rate_pct: 70,
            require_medallion: true,
            extract_timeout_ms: 2_000,
            treasury_yield_bps: 500,
        }
    }
}

impl EconomyConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject values that would break the engine's invariants.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &'static str, message: impl Into<String>) -> ConfigResult<()> {
            Err(ConfigError::Invalid {
                field,
                message: message.into(),
            })
        }

        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return invalid("decay", format!("must be in (0, 1], got {}", self.decay));
        }
        if self.wordmap_cap == 0 {
            return invalid("wordmap_cap", "must be > 0");
        }
        if !(0.0..=1.0).contains(&self.min_alignment) {
            return invalid("min_alignment", "must be in [0, 1]");
        }
        if self.per_user_cap_bps == 0 || self.per_user_cap_bps > 10_000 {
            return invalid("per_user_cap_bps", "must be in 1..=10000");
        }
        if self.max_reward_bps > self.per_user_cap_bps {
            return invalid("max_reward_bps", "must not exceed per_user_cap_bps");
        }
        let shares = self.tier_shares;
        if [shares.explorer, shares.contributor, shares.patron]
            .iter()
            .any(|&s| s > self.per_user_cap_bps)
        {
            return invalid("tier_shares", "tier starting shares must not exceed per_user_cap_bps");
        }
        if self.weights.sum() != 100 {
            return invalid(
                "weights",
                format!("coefficients must sum to 100, got {}", self.weights.sum()),
            );
        }
        if self.founding_cap == 0 || self.standard_cap == 0 {
            return invalid("standard_cap", "medallion caps must be > 0");
        }
        if self.standard_base_price == 0 {
            return invalid("standard_base_price", "must be > 0");
        }
        if self.revoke_crash_rate_pct > 100 {
            return invalid("revoke_crash_rate_pct", "must be a percentage");
        }
        if self.treasury_yield_bps > 10_000 {
            return invalid("treasury_yield_bps", "must be in 0..=10000");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EconomyConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: EconomyConfig = toml::from_str(
            r#"
            min_alignment = 0.2

            [tier_shares]
            patron = 800
            "#,
        )
        .unwrap();
        assert_eq!(config.min_alignment, 0.2);
        assert_eq!(config.tier_shares.patron, 800);
        assert_eq!(config.tier_shares.explorer, 50);
        assert_eq!(config.wordmap_cap, 200);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/verbum.toml");
        let config = EconomyConfig {
            standard_cap: 50,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EconomyConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn weights_must_sum_to_100() {
        let config = EconomyConfig {
            weights: WeightCoefficients {
                accuracy: 50,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "weights", .. })
        ));
    }

    #[test]
    fn reward_cannot_exceed_user_cap() {
        let config = EconomyConfig {
            max_reward_bps: 6_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
