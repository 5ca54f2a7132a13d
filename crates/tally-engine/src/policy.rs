use anyhow::{Context, Result};
use chrono::Duration;

use tally_types::models::TierThresholds;

/// Operating policy for the loyalty core. Everything here is a product
/// knob, not a correctness invariant: changing it affects which operations
/// are accepted, never whether accepted operations stay consistent.
#[derive(Debug, Clone)]
pub struct Policy {
    /// How long an issued voucher stays redeemable.
    pub voucher_ttl: Duration,
    /// Maximum distance from the event location for a GPS check-in.
    pub checkin_radius_m: f64,
    /// Balance thresholds for the derived tier.
    pub tiers: TierThresholds,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            voucher_ttl: Duration::days(7),
            checkin_radius_m: 1100.0,
            tiers: TierThresholds::default(),
        }
    }
}

impl Policy {
    /// Read overrides from `TALLY_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut policy = Self::default();

        if let Ok(days) = std::env::var("TALLY_VOUCHER_TTL_DAYS") {
            let days: i64 = days.parse().context("TALLY_VOUCHER_TTL_DAYS")?;
            policy.voucher_ttl = Duration::days(days);
        }
        if let Ok(radius) = std::env::var("TALLY_CHECKIN_RADIUS_M") {
            policy.checkin_radius_m = radius.parse().context("TALLY_CHECKIN_RADIUS_M")?;
        }
        if let Ok(gold) = std::env::var("TALLY_TIER_GOLD") {
            policy.tiers.gold = gold.parse().context("TALLY_TIER_GOLD")?;
        }
        if let Ok(platinum) = std::env::var("TALLY_TIER_PLATINUM") {
            policy.tiers.platinum = platinum.parse().context("TALLY_TIER_PLATINUM")?;
        }

        Ok(policy)
    }
}
