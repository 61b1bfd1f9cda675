use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decision families handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    FraudCheck,
    FraudBaseline,
    MatchRank,
    ScopeAnalysis,
    VerificationCheck,
    ProfileEnrichment,
}

impl DecisionKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::FraudCheck => "fraud_check",
            Self::FraudBaseline => "fraud_baseline",
            Self::MatchRank => "match_rank",
            Self::ScopeAnalysis => "scope_analysis",
            Self::VerificationCheck => "verification_check",
            Self::ProfileEnrichment => "profile_enrichment",
        }
    }

    /// Name recorded for decisions produced by the deterministic rules.
    pub const fn rule_engine(self) -> &'static str {
        match self {
            Self::FraudCheck => "fraud-rule-engine",
            Self::FraudBaseline => "fraud-baseline",
            Self::MatchRank => "match-rule-engine",
            Self::ScopeAnalysis => "scope-rule-engine",
            Self::VerificationCheck => "verification-rule-engine",
            Self::ProfileEnrichment => "profile-basic",
        }
    }

    /// Prefix of the rule-engine model version (`fraud-v1.0.0`).
    pub const fn version_prefix(self) -> &'static str {
        match self {
            Self::FraudCheck | Self::FraudBaseline => "fraud",
            Self::MatchRank => "match",
            Self::ScopeAnalysis => "scope",
            Self::VerificationCheck => "verification",
            Self::ProfileEnrichment => "rule",
        }
    }
}

/// Score bounded to `[0, 1]`. NaN collapses to zero.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeScore(f64);

impl CompositeScore {
    pub const ZERO: Self = Self(0.0);
    pub const ONE: Self = Self(1.0);

    pub fn new(raw: f64) -> Self {
        if raw.is_nan() {
            Self(0.0)
        } else {
            // `clamp` keeps -0.0, which an empty `sum()` produces.
            Self(raw.clamp(0.0, 1.0) + 0.0)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Value rounded to four decimals for wire payloads.
    pub fn rounded(self) -> f64 {
        round_to(self.0, 4)
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor + 0.0
}

/// One named contributor to a composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    #[serde(rename = "factor")]
    pub name: String,
    pub contribution: f64,
    pub description: String,
}

impl Factor {
    pub fn new(name: impl Into<String>, contribution: f64, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contribution: CompositeScore::new(contribution).value(),
            description: description.into(),
        }
    }
}

/// Which path produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Ai,
    Rules,
}

/// Entity a decision is about, used for audit trails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl RequestRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

/// Engine output before provenance (source, version, timing) is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict<D> {
    pub composite_score: CompositeScore,
    pub tier: &'static str,
    pub action: &'static str,
    pub factors: Vec<Factor>,
    pub detail: D,
}

/// Immutable outcome of one decision request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision<D> {
    pub kind: DecisionKind,
    pub request_ref: RequestRef,
    pub composite_score: CompositeScore,
    pub tier: &'static str,
    pub action: &'static str,
    pub top_factors: Vec<Factor>,
    pub model_source: ModelSource,
    pub model_name: String,
    pub model_version: String,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
    pub detail: D,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_score_clamps_into_unit_interval() {
        assert_eq!(CompositeScore::new(1.4).value(), 1.0);
        assert_eq!(CompositeScore::new(-0.2).value(), 0.0);
        assert_eq!(CompositeScore::new(f64::NAN).value(), 0.0);
        assert_eq!(CompositeScore::new(0.123456).rounded(), 0.1235);
    }

    #[test]
    fn negative_zero_never_reaches_the_wire() {
        let score = CompositeScore::new(-0.0);
        assert!(score.value().is_sign_positive());
        assert!(score.rounded().is_sign_positive());
        assert!(round_to(-0.00001, 4).is_sign_positive());
        assert_eq!(serde_json::to_string(&score).expect("serializes"), "0.0");
        assert_eq!(serde_json::to_string(&score.rounded()).expect("serializes"), "0.0");
    }

    #[test]
    fn factor_serializes_with_wire_field_names() {
        let factor = Factor::new("short_cover_letter", 0.3, "very short");
        let value = serde_json::to_value(&factor).expect("serializes");
        assert_eq!(value["factor"], "short_cover_letter");
        assert_eq!(value["contribution"], 0.3);
    }
}
