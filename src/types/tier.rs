//! Subscription tiers

use serde::{Deserialize, Serialize};

/// Subscription level governing quotas and model reachability.
///
/// Totally ordered: `Free < Pro < Unlimited`. A model with
/// `minimum_tier = T` is reachable from any tier `>= T`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Unlimited,
}

impl Tier {
    /// The next tier up, saturating at `Unlimited`.
    ///
    /// Used for the temporary premium-credit upgrade and for computing
    /// the upsell surface ("a better model exists one tier up").
    pub fn upgraded(&self) -> Tier {
        match self {
            Tier::Free => Tier::Pro,
            Tier::Pro => Tier::Unlimited,
            Tier::Unlimited => Tier::Unlimited,
        }
    }

    /// Stable wire/label name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Unlimited => "unlimited",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_totally_ordered() {
        assert!(Tier::Free < Tier::Pro);
        assert!(Tier::Pro < Tier::Unlimited);
    }

    #[test]
    fn upgrade_saturates() {
        assert_eq!(Tier::Free.upgraded(), Tier::Pro);
        assert_eq!(Tier::Pro.upgraded(), Tier::Unlimited);
        assert_eq!(Tier::Unlimited.upgraded(), Tier::Unlimited);
    }
}
