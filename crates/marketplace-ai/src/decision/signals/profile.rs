use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{require_non_empty, ValidationError};
use crate::decision::aggregate::sum_clamped;
use crate::decision::analyzer::MalformedResponse;
use crate::decision::domain::{CompositeScore, Decision, DecisionKind, Factor, RequestRef, Verdict};
use crate::decision::orchestrator::DecisionEngine;
use crate::decision::tier::TierBands;

const PROFILE_DEPTH: TierBands<&str> = TierBands::new(&[(0.67, "rich"), (0.34, "partial")], "sparse");

/// Freelancer profile facts published once onboarding completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub user_id: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub experience_years: f64,
    #[serde(default)]
    pub hourly_rate: f64,
    #[serde(default)]
    pub completed_jobs: u32,
    #[serde(default)]
    pub avg_rating: f64,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub certifications: Vec<String>,
}

impl ProfileSnapshot {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("user_id", &self.user_id)
    }
}

/// Profile summary stored for future matching.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub embedding: Value,
}

fn coverage_factors(profile: &ProfileSnapshot) -> Vec<Factor> {
    let fields = [
        ("skills", !profile.skills.is_empty()),
        ("bio", !profile.bio.trim().is_empty()),
        ("experience_years", profile.experience_years > 0.0),
        ("specializations", !profile.specializations.is_empty()),
        ("education", !profile.education.trim().is_empty()),
        ("certifications", !profile.certifications.is_empty()),
    ];
    let share = 1.0 / fields.len() as f64;
    fields
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| Factor::new(name, share, format!("{name} filled in")))
        .collect()
}

fn profile_verdict(score: CompositeScore, factors: Vec<Factor>, embedding: Value) -> Verdict<ProfileSummary> {
    Verdict {
        composite_score: score,
        tier: PROFILE_DEPTH.classify(score),
        action: "index",
        factors,
        detail: ProfileSummary { embedding },
    }
}

/// Basic profile summary keyed on skills and experience.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileEngine;

impl DecisionEngine for ProfileEngine {
    type Input = ProfileSnapshot;
    type Detail = ProfileSummary;

    fn kind(&self) -> DecisionKind {
        DecisionKind::ProfileEnrichment
    }

    fn request_ref(&self, input: &ProfileSnapshot) -> RequestRef {
        RequestRef::new("freelancer", input.user_id.clone())
    }

    fn evaluate(&self, input: &ProfileSnapshot) -> Verdict<ProfileSummary> {
        let factors = coverage_factors(input);
        let score = CompositeScore::new(sum_clamped(&factors).rounded());
        profile_verdict(
            score,
            factors,
            json!({
                "skills": input.skills,
                "experience_years": input.experience_years,
            }),
        )
    }

    fn interpret(
        &self,
        input: &ProfileSnapshot,
        payload: &Value,
    ) -> Result<Verdict<ProfileSummary>, MalformedResponse> {
        if !payload.is_object() {
            return Err(MalformedResponse::new("profile summary must be an object"));
        }
        let factors = coverage_factors(input);
        let score = CompositeScore::new(sum_clamped(&factors).rounded());
        Ok(profile_verdict(score, factors, payload.clone()))
    }

    fn audit_output(&self, decision: &Decision<ProfileSummary>) -> Value {
        json!({
            "depth": decision.tier,
            "fields": decision.top_factors.iter().map(|factor| factor.name.as_str()).collect::<Vec<_>>(),
            "primary_domain": decision.detail.embedding.get("primary_domain"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_summary_keeps_skills_and_experience() {
        let snapshot = ProfileSnapshot {
            user_id: "fl-1".to_string(),
            skills: vec!["rust".to_string()],
            bio: "Systems engineer".to_string(),
            experience_years: 7.0,
            ..ProfileSnapshot::default()
        };
        let verdict = ProfileEngine.evaluate(&snapshot);
        assert_eq!(
            verdict.detail.embedding,
            json!({"skills": ["rust"], "experience_years": 7.0})
        );
        assert_eq!(verdict.tier, "partial");
        assert_eq!(verdict.factors.len(), 3);
    }

    #[test]
    fn empty_profile_is_sparse() {
        let verdict = ProfileEngine.evaluate(&ProfileSnapshot {
            user_id: "fl-2".to_string(),
            ..ProfileSnapshot::default()
        });
        assert_eq!(verdict.composite_score, CompositeScore::ZERO);
        assert_eq!(verdict.tier, "sparse");
    }

    #[test]
    fn analyzer_summary_must_be_an_object() {
        let snapshot = ProfileSnapshot {
            user_id: "fl-3".to_string(),
            ..ProfileSnapshot::default()
        };
        let verdict = ProfileEngine
            .interpret(&snapshot, &json!({"primary_domain": "backend"}))
            .expect("object accepted");
        assert_eq!(verdict.detail.embedding["primary_domain"], "backend");
        assert!(ProfileEngine.interpret(&snapshot, &json!("text")).is_err());
    }
}
