//! Award policy table: payout rates per membership tier.
//!
//! The table is resolved once at startup (reference rates plus optional
//! per-tier overrides from configuration) and then shared read-only.

use std::collections::HashMap;

use serde::Deserialize;

use crate::model::MembershipTier;

/// Payout rates for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AwardRates {
    /// Points per elapsed recurring period.
    pub recurring_per_period: u64,
    /// Points per item the first time it becomes public.
    pub one_time_per_publication: u64,
}

impl AwardRates {
    /// No award of either kind.
    pub const NONE: Self = Self::new(0, 0);

    pub const fn new(recurring_per_period: u64, one_time_per_publication: u64) -> Self {
        Self {
            recurring_per_period,
            one_time_per_publication,
        }
    }
}

/// Reference rates: Free/Paid earn only publication awards, Gold/Supporter
/// earn both.
pub fn reference_rates(tier: &MembershipTier) -> AwardRates {
    match tier {
        MembershipTier::Free => AwardRates::new(0, 100),
        MembershipTier::Paid => AwardRates::new(0, 1_000),
        MembershipTier::Gold => AwardRates::new(100_000, 1_000),
        MembershipTier::Supporter => AwardRates::new(1_000_000, 1_000),
        MembershipTier::Other(_) => AwardRates::NONE,
    }
}

/// Policy configuration.
///
/// ```yaml
/// policy:
///   tiers:
///     gold:
///       recurring_per_period: 150000
///       one_time_per_publication: 1000
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Rate overrides keyed by tier label (case-insensitive).
    pub tiers: HashMap<String, AwardRates>,
}

/// Total mapping from tier to rates. Unmapped tiers pay nothing.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    overrides: HashMap<String, AwardRates>,
}

impl PolicyTable {
    /// Table with the reference rates only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with reference rates, replaced per tier by configured overrides.
    pub fn from_config(config: &PolicyConfig) -> Self {
        let overrides = config
            .tiers
            .iter()
            .map(|(label, rates)| (label.trim().to_ascii_lowercase(), *rates))
            .collect();
        Self { overrides }
    }

    /// Rates that apply to `tier`.
    pub fn rates_for(&self, tier: &MembershipTier) -> AwardRates {
        self.overrides
            .get(&tier.as_str().to_ascii_lowercase())
            .copied()
            .unwrap_or_else(|| reference_rates(tier))
    }
}
