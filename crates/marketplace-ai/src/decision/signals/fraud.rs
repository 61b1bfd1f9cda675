use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{factors_field, fired, number_field, require_non_empty, silent, Signal, ValidationError};
use crate::decision::aggregate::sum_clamped;
use crate::decision::analyzer::MalformedResponse;
use crate::decision::domain::{CompositeScore, Decision, DecisionKind, Factor, RequestRef, Verdict};
use crate::decision::orchestrator::DecisionEngine;
use crate::decision::tier::FRAUD_BANDS;

const DISPOSABLE_DOMAINS: &[&str] = &[
    "tempmail.com",
    "throwaway.email",
    "guerrillamail.com",
    "mailinator.com",
    "yopmail.com",
    "10minutemail.com",
    "trashmail.com",
    "sharklasers.com",
    "guerrillamailblock.com",
];

fn default_entity_type() -> String {
    "proposal".to_string()
}

/// Account and proposal facts submitted for a synchronous fraud check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FraudCheckRequest {
    pub account_id: String,
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub bid_amount: Option<f64>,
    #[serde(default)]
    pub job_budget_min: Option<f64>,
    #[serde(default)]
    pub job_budget_max: Option<f64>,
    #[serde(default)]
    pub job_skills: Vec<String>,
    #[serde(default)]
    pub freelancer_skills: Vec<String>,
    #[serde(default)]
    pub account_age_days: Option<u32>,
    #[serde(default)]
    pub proposals_last_hour: Option<u32>,
    #[serde(default)]
    pub total_proposals: Option<u32>,
}

impl FraudCheckRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("account_id", &self.account_id)?;
        if self.bid_amount.map_or(false, |bid| bid < 0.0 || !bid.is_finite()) {
            return Err(ValidationError::new("bid_amount", "must be a non-negative number"));
        }
        Ok(())
    }
}

/// Facts known about a freshly registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBaseline {
    pub user_id: String,
    pub email: String,
    #[serde(default = "unknown_role")]
    pub role: String,
}

fn unknown_role() -> String {
    "unknown".to_string()
}

pub fn cover_letter_signal(cover_letter: Option<&str>) -> Signal {
    let Some(letter) = cover_letter.filter(|letter| !letter.is_empty()) else {
        return silent();
    };
    let length = letter.trim().chars().count();
    if length < 20 {
        fired(Factor::new(
            "short_cover_letter",
            0.3,
            format!("Cover letter is very short ({length} chars), likely generic"),
        ))
    } else if length < 50 {
        fired(Factor::new(
            "brief_cover_letter",
            0.1,
            format!("Cover letter is brief ({length} chars)"),
        ))
    } else {
        silent()
    }
}

pub fn bid_signal(bid: Option<f64>, budget_min: Option<f64>) -> Signal {
    let (Some(bid), Some(min)) = (bid, budget_min) else {
        return silent();
    };
    if min <= 0.0 {
        return silent();
    }
    if bid < min * 0.3 {
        fired(Factor::new(
            "suspiciously_low_bid",
            0.25,
            format!("Bid ${bid:.0} is <30% of minimum budget ${min:.0}"),
        ))
    } else if bid < min * 0.5 {
        fired(Factor::new(
            "low_bid",
            0.1,
            format!("Bid ${bid:.0} is <50% of minimum budget ${min:.0}"),
        ))
    } else {
        silent()
    }
}

/// Proposal velocity. A brand-new account with a large proposal history scores at least
/// 0.25 and only replaces the hourly factor when that raises the score.
pub fn velocity_signal(
    proposals_last_hour: Option<u32>,
    total_proposals: Option<u32>,
    account_age_days: Option<u32>,
) -> Signal {
    let mut signal = match proposals_last_hour {
        Some(count) if count > 10 => fired(Factor::new(
            "high_proposal_velocity",
            0.35,
            format!("{count} proposals in the last hour (bot-like)"),
        )),
        Some(count) if count > 5 => fired(Factor::new(
            "elevated_proposal_velocity",
            0.15,
            format!("{count} proposals in the last hour"),
        )),
        _ => silent(),
    };

    if let (Some(age), Some(total)) = (account_age_days, total_proposals) {
        if age < 3 && total > 20 && signal.0 < 0.25 {
            signal = fired(Factor::new(
                "new_account_high_activity",
                0.25,
                format!("{total} proposals in {age} days"),
            ));
        }
    }

    signal
}

pub fn skill_overlap_signal(job_skills: &[String], freelancer_skills: &[String]) -> Signal {
    if job_skills.is_empty() || freelancer_skills.is_empty() {
        return silent();
    }
    let job: HashSet<String> = job_skills.iter().map(|s| s.to_lowercase()).collect();
    let freelancer: HashSet<String> = freelancer_skills.iter().map(|s| s.to_lowercase()).collect();

    if job.is_disjoint(&freelancer) && job_skills.len() >= 2 {
        fired(Factor::new(
            "no_skill_match",
            0.2,
            format!("No skill overlap: job needs {job_skills:?}, freelancer has {freelancer_skills:?}"),
        ))
    } else {
        silent()
    }
}

pub fn disposable_email_signal(email: &str) -> Signal {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return silent();
    };
    let domain = domain.to_lowercase();
    if DISPOSABLE_DOMAINS.contains(&domain.as_str()) {
        fired(Factor::new(
            "disposable_email",
            0.4,
            format!("Email uses disposable domain: {domain}"),
        ))
    } else {
        silent()
    }
}

pub fn numeric_email_signal(email: &str) -> Signal {
    let local = email.split_once('@').map(|(local, _)| local).unwrap_or_default();
    let length = local.chars().count();
    if length <= 5 {
        return silent();
    }
    let digits = local.chars().filter(char::is_ascii_digit).count();
    let ratio = digits as f64 / length as f64;
    if ratio > 0.6 {
        fired(Factor::new(
            "numeric_email",
            0.15,
            format!("Email local part is {:.0}% digits", ratio * 100.0),
        ))
    } else {
        silent()
    }
}

fn fraud_verdict(score: CompositeScore, factors: Vec<Factor>) -> Verdict<()> {
    let tier = FRAUD_BANDS.classify(score);
    Verdict {
        composite_score: score,
        tier: tier.label(),
        action: tier.action(),
        factors,
        detail: (),
    }
}

fn fraud_from_payload(payload: &Value) -> Result<Verdict<()>, MalformedResponse> {
    let score = number_field(payload, "fraud_score")
        .ok_or_else(|| MalformedResponse::missing("fraud_score"))?;
    Ok(fraud_verdict(
        CompositeScore::new(score),
        factors_field(payload, "risk_factors"),
    ))
}

fn fraud_audit_output<D>(decision: &Decision<D>) -> Value {
    json!({
        "fraud_score": decision.composite_score.rounded(),
        "risk_tier": decision.tier,
        "recommended_action": decision.action,
        "factors_count": decision.top_factors.len(),
    })
}

/// Sum-then-clamp fraud scoring for proposals.
#[derive(Debug, Clone, Copy, Default)]
pub struct FraudEngine;

impl FraudEngine {
    pub fn signals(&self, request: &FraudCheckRequest) -> Vec<Signal> {
        vec![
            cover_letter_signal(request.cover_letter.as_deref()),
            bid_signal(request.bid_amount, request.job_budget_min),
            velocity_signal(
                request.proposals_last_hour,
                request.total_proposals,
                request.account_age_days,
            ),
            skill_overlap_signal(&request.job_skills, &request.freelancer_skills),
        ]
    }
}

impl DecisionEngine for FraudEngine {
    type Input = FraudCheckRequest;
    type Detail = ();

    fn kind(&self) -> DecisionKind {
        DecisionKind::FraudCheck
    }

    fn request_ref(&self, input: &FraudCheckRequest) -> RequestRef {
        RequestRef::new(
            input.entity_type.clone(),
            input
                .entity_id
                .clone()
                .unwrap_or_else(|| input.account_id.clone()),
        )
    }

    fn evaluate(&self, input: &FraudCheckRequest) -> Verdict<()> {
        let factors: Vec<Factor> = self
            .signals(input)
            .into_iter()
            .filter_map(|(_, factor)| factor)
            .collect();
        fraud_verdict(sum_clamped(&factors), factors)
    }

    fn interpret(
        &self,
        _input: &FraudCheckRequest,
        payload: &Value,
    ) -> Result<Verdict<()>, MalformedResponse> {
        fraud_from_payload(payload)
    }

    fn audit_output(&self, decision: &Decision<()>) -> Value {
        fraud_audit_output(decision)
    }

    fn audit_confidence(&self, decision: &Decision<()>) -> f64 {
        1.0 - decision.composite_score.value()
    }
}

/// Registration-time account screening.
#[derive(Debug, Clone, Copy, Default)]
pub struct FraudBaselineEngine;

impl DecisionEngine for FraudBaselineEngine {
    type Input = AccountBaseline;
    type Detail = ();

    fn kind(&self) -> DecisionKind {
        DecisionKind::FraudBaseline
    }

    fn request_ref(&self, input: &AccountBaseline) -> RequestRef {
        RequestRef::new("user", input.user_id.clone())
    }

    fn evaluate(&self, input: &AccountBaseline) -> Verdict<()> {
        let factors: Vec<Factor> = [
            disposable_email_signal(&input.email),
            numeric_email_signal(&input.email),
        ]
        .into_iter()
        .filter_map(|(_, factor)| factor)
        .collect();
        fraud_verdict(sum_clamped(&factors), factors)
    }

    fn interpret(
        &self,
        _input: &AccountBaseline,
        payload: &Value,
    ) -> Result<Verdict<()>, MalformedResponse> {
        fraud_from_payload(payload)
    }

    fn audit_output(&self, decision: &Decision<()>) -> Value {
        fraud_audit_output(decision)
    }

    fn audit_confidence(&self, decision: &Decision<()>) -> f64 {
        1.0 - decision.composite_score.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::tier::RiskTier;
    use proptest::prelude::*;
    use serde_json::json;

    fn skills(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cover_letter_thresholds() {
        assert_eq!(cover_letter_signal(None).0, 0.0);
        assert_eq!(cover_letter_signal(Some("")).0, 0.0);
        assert_eq!(cover_letter_signal(Some("hire me")).0, 0.3);
        assert_eq!(cover_letter_signal(Some(&"a".repeat(30))).0, 0.1);
        assert_eq!(cover_letter_signal(Some(&"a".repeat(50))).0, 0.0);
        let (_, factor) = cover_letter_signal(Some("   hi   "));
        assert_eq!(
            factor.expect("fires").description,
            "Cover letter is very short (2 chars), likely generic"
        );
    }

    #[test]
    fn bid_thresholds_require_positive_minimum() {
        assert_eq!(bid_signal(Some(100.0), Some(1000.0)).0, 0.25);
        assert_eq!(bid_signal(Some(400.0), Some(1000.0)).0, 0.1);
        assert_eq!(bid_signal(Some(500.0), Some(1000.0)).0, 0.0);
        assert_eq!(bid_signal(Some(0.0), Some(0.0)).0, 0.0);
        assert_eq!(bid_signal(None, Some(1000.0)).0, 0.0);
        let (_, factor) = bid_signal(Some(100.0), Some(1000.0));
        assert_eq!(
            factor.expect("fires").description,
            "Bid $100 is <30% of minimum budget $1000"
        );
    }

    #[test]
    fn new_account_activity_only_replaces_weaker_velocity() {
        let (score, factor) = velocity_signal(Some(12), Some(25), Some(1));
        assert_eq!(score, 0.35);
        assert_eq!(factor.expect("fires").name, "high_proposal_velocity");

        let (score, factor) = velocity_signal(Some(6), Some(25), Some(1));
        assert_eq!(score, 0.25);
        assert_eq!(factor.expect("fires").name, "new_account_high_activity");

        let (score, _) = velocity_signal(None, Some(25), Some(5));
        assert_eq!(score, 0.0);
    }

    #[test]
    fn skill_overlap_needs_two_job_skills() {
        let job = skills(&["Rust", "Tokio"]);
        assert_eq!(skill_overlap_signal(&job, &skills(&["Figma"])).0, 0.2);
        assert_eq!(skill_overlap_signal(&job, &skills(&["rust"])).0, 0.0);
        assert_eq!(skill_overlap_signal(&skills(&["Rust"]), &skills(&["Figma"])).0, 0.0);
        assert_eq!(skill_overlap_signal(&job, &[]).0, 0.0);
    }

    #[test]
    fn bot_like_account_lands_at_least_medium() {
        let request = FraudCheckRequest {
            account_id: "acct-1".to_string(),
            account_age_days: Some(1),
            total_proposals: Some(25),
            proposals_last_hour: Some(12),
            ..FraudCheckRequest::default()
        };
        let verdict = FraudEngine.evaluate(&request);
        assert!(verdict.composite_score.value() >= 0.35);
        assert!(verdict
            .factors
            .iter()
            .any(|factor| factor.name == "high_proposal_velocity" && factor.contribution >= 0.35));
        assert!(matches!(verdict.tier, "medium" | "high" | "critical"));
    }

    #[test]
    fn all_signals_saturate_to_critical() {
        let request = FraudCheckRequest {
            account_id: "acct-2".to_string(),
            cover_letter: Some("pick me".to_string()),
            bid_amount: Some(10.0),
            job_budget_min: Some(500.0),
            job_skills: skills(&["rust", "go"]),
            freelancer_skills: skills(&["excel"]),
            proposals_last_hour: Some(30),
            ..FraudCheckRequest::default()
        };
        let verdict = FraudEngine.evaluate(&request);
        assert_eq!(verdict.composite_score.value(), 1.0);
        assert_eq!(verdict.tier, RiskTier::Critical.label());
        assert_eq!(verdict.action, "block");
    }

    #[test]
    fn baseline_flags_disposable_numeric_addresses() {
        let input = AccountBaseline {
            user_id: "u-1".to_string(),
            email: "12345678@Mailinator.com".to_string(),
            role: "client".to_string(),
        };
        let verdict = FraudBaselineEngine.evaluate(&input);
        assert!((verdict.composite_score.value() - 0.55).abs() < 1e-9);
        assert_eq!(verdict.tier, "high");
        let (_, factor) = numeric_email_signal(&input.email);
        assert_eq!(factor.expect("fires").description, "Email local part is 100% digits");

        let clean = AccountBaseline {
            email: "ada@example.com".to_string(),
            ..input
        };
        assert_eq!(FraudBaselineEngine.evaluate(&clean).tier, "low");
    }

    #[test]
    fn addresses_without_an_at_sign_have_no_local_part() {
        assert_eq!(numeric_email_signal("123456789"), silent());
        assert_eq!(numeric_email_signal(""), silent());
        assert!(numeric_email_signal("123456789@example.com").1.is_some());

        let input = AccountBaseline {
            user_id: "u-2".to_string(),
            email: "4155550123".to_string(),
            role: "freelancer".to_string(),
        };
        let verdict = FraudBaselineEngine.evaluate(&input);
        assert!(verdict.factors.is_empty());
        assert_eq!(verdict.tier, "low");
    }

    #[test]
    fn analyzer_payload_requires_a_score() {
        let request = FraudCheckRequest {
            account_id: "acct-3".to_string(),
            ..FraudCheckRequest::default()
        };
        let verdict = FraudEngine
            .interpret(&request, &json!({"fraud_score": 0.62, "risk_tier": "low"}))
            .expect("valid payload");
        assert_eq!(verdict.tier, "high");
        assert!(FraudEngine
            .interpret(&request, &json!({"risk_tier": "low"}))
            .is_err());
    }

    proptest! {
        #[test]
        fn fraud_score_stays_in_unit_interval(
            letter_len in 0usize..80,
            bid in proptest::option::of(0.0f64..10_000.0),
            min in proptest::option::of(0.0f64..10_000.0),
            last_hour in proptest::option::of(0u32..50),
            total in proptest::option::of(0u32..100),
            age in proptest::option::of(0u32..30),
        ) {
            let request = FraudCheckRequest {
                account_id: "acct".to_string(),
                cover_letter: Some("x".repeat(letter_len)),
                bid_amount: bid,
                job_budget_min: min,
                proposals_last_hour: last_hour,
                total_proposals: total,
                account_age_days: age,
                job_skills: skills(&["a", "b"]),
                freelancer_skills: skills(&["c"]),
                ..FraudCheckRequest::default()
            };
            let verdict = FraudEngine.evaluate(&request);
            let score = verdict.composite_score.value();
            prop_assert!((0.0..=1.0).contains(&score));
            prop_assert_eq!(verdict.tier, FRAUD_BANDS.classify(verdict.composite_score).label());
        }
    }
}
