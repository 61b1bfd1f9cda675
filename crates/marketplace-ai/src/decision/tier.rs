use serde::{Deserialize, Serialize};

use super::domain::CompositeScore;

/// Ordered threshold table mapping a composite score onto a tier.
///
/// Bands are checked from the highest threshold down; the first band whose threshold the
/// score reaches wins, and anything below every threshold lands on `floor`. Thresholds must
/// be strictly descending, which keeps the mapping monotonic and exhaustive.
#[derive(Debug, Clone, Copy)]
pub struct TierBands<T: 'static> {
    bands: &'static [(f64, T)],
    floor: T,
}

impl<T: Copy + 'static> TierBands<T> {
    pub const fn new(bands: &'static [(f64, T)], floor: T) -> Self {
        Self { bands, floor }
    }

    pub fn classify(&self, score: CompositeScore) -> T {
        debug_assert!(
            self.bands.windows(2).all(|pair| pair[0].0 > pair[1].0),
            "tier thresholds must be strictly descending"
        );
        self.bands
            .iter()
            .find(|(threshold, _)| score.value() >= *threshold)
            .map(|(_, tier)| *tier)
            .unwrap_or(self.floor)
    }
}

/// Fraud risk tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub const fn action(self) -> &'static str {
        match self {
            Self::Critical => "block",
            Self::High => "review",
            Self::Medium | Self::Low => "allow",
        }
    }
}

pub const FRAUD_BANDS: TierBands<RiskTier> = TierBands::new(
    &[
        (0.8, RiskTier::Critical),
        (0.5, RiskTier::High),
        (0.3, RiskTier::Medium),
    ],
    RiskTier::Low,
);

/// Verification outcome tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Rejected,
    HumanReview,
    Approved,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::HumanReview => "human_review",
            Self::Approved => "approved",
        }
    }

    pub const fn action(self) -> &'static str {
        match self {
            Self::Rejected => "auto_rejected",
            Self::HumanReview => "human_review",
            Self::Approved => "auto_approved",
        }
    }

    /// Status stored by the system of record.
    pub const fn record_status(self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::HumanReview => "pending_review",
            Self::Approved => "approved",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "rejected" => Some(Self::Rejected),
            "human_review" => Some(Self::HumanReview),
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

pub const VERIFICATION_BANDS: TierBands<VerificationStatus> = TierBands::new(
    &[
        (0.85, VerificationStatus::Approved),
        (0.50, VerificationStatus::HumanReview),
    ],
    VerificationStatus::Rejected,
);

/// Job complexity buckets, simplest first. The winning keyword bucket is the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    Moderate,
    Complex,
    Enterprise,
}

impl ComplexityTier {
    pub const ALL: [Self; 4] = [Self::Simple, Self::Moderate, Self::Complex, Self::Enterprise];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.label() == label)
    }
}

/// Strength of the best candidate for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFit {
    Weak,
    Moderate,
    Strong,
}

impl MatchFit {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
        }
    }

    pub const fn action(self) -> &'static str {
        match self {
            Self::Weak => "skip",
            Self::Moderate => "consider",
            Self::Strong => "shortlist",
        }
    }
}

pub const MATCH_BANDS: TierBands<MatchFit> = TierBands::new(
    &[(0.70, MatchFit::Strong), (0.40, MatchFit::Moderate)],
    MatchFit::Weak,
);

#[cfg(test)]
mod tests {
    use super::*;

    fn fraud(score: f64) -> RiskTier {
        FRAUD_BANDS.classify(CompositeScore::new(score))
    }

    #[test]
    fn fraud_band_edges_are_inclusive() {
        assert_eq!(fraud(0.0), RiskTier::Low);
        assert_eq!(fraud(0.2999), RiskTier::Low);
        assert_eq!(fraud(0.3), RiskTier::Medium);
        assert_eq!(fraud(0.5), RiskTier::High);
        assert_eq!(fraud(0.8), RiskTier::Critical);
        assert_eq!(fraud(1.0), RiskTier::Critical);
        assert_eq!(RiskTier::Critical.action(), "block");
        assert_eq!(RiskTier::High.action(), "review");
        assert_eq!(RiskTier::Medium.action(), "allow");
    }

    #[test]
    fn verification_bands_route_middle_scores_to_review() {
        let classify = |score| VERIFICATION_BANDS.classify(CompositeScore::new(score));
        assert_eq!(classify(0.85), VerificationStatus::Approved);
        assert_eq!(classify(0.84), VerificationStatus::HumanReview);
        assert_eq!(classify(0.5), VerificationStatus::HumanReview);
        assert_eq!(classify(0.49), VerificationStatus::Rejected);
    }

    #[test]
    fn tiers_are_monotonic_over_the_unit_interval() {
        let mut previous = fraud(0.0);
        for step in 0..=1000 {
            let tier = fraud(step as f64 / 1000.0);
            assert!(tier >= previous, "tier regressed at step {step}");
            previous = tier;
        }
    }

    #[test]
    fn complexity_labels_round_trip() {
        for tier in ComplexityTier::ALL {
            assert_eq!(ComplexityTier::from_label(tier.label()), Some(tier));
        }
        assert_eq!(ComplexityTier::from_label("galactic"), None);
    }
}
