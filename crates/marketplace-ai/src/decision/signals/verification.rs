use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{is_present, number_field, require_non_empty, ValidationError};
use crate::decision::aggregate::sum_clamped;
use crate::decision::analyzer::MalformedResponse;
use crate::decision::domain::{CompositeScore, Decision, DecisionKind, Factor, RequestRef, Verdict};
use crate::decision::orchestrator::DecisionEngine;
use crate::decision::tier::{VerificationStatus, VERIFICATION_BANDS};

/// Composite assigned to evidence types without a weight table.
pub const UNKNOWN_TYPE_SCORE: f64 = 0.5;

const IDENTITY: &[(&str, f64)] = &[
    ("government_id", 0.35),
    ("selfie", 0.25),
    ("name_and_dob", 0.20),
    ("address", 0.10),
    ("id_number", 0.10),
];
const PAYMENT_METHOD: &[(&str, f64)] = &[
    ("bank_account", 0.40),
    ("tax_id", 0.35),
    ("billing_address", 0.25),
];
const SKILL_ASSESSMENT: &[(&str, f64)] = &[
    ("assessment_score", 0.40),
    ("certifications", 0.30),
    ("experience_years", 0.30),
];
const PORTFOLIO: &[(&str, f64)] = &[
    ("portfolio_items", 0.40),
    ("item_descriptions", 0.25),
    ("original_work", 0.20),
    ("client_references", 0.15),
];
const WORK_HISTORY: &[(&str, f64)] = &[
    ("previous_positions", 0.40),
    ("professional_profile", 0.25),
    ("references", 0.25),
    ("consistent_timeline", 0.10),
];

/// Confidence for a submission whose evidence is held by the system of record rather than
/// attached to the event. Never low enough to reject.
pub fn attached_evidence_baseline(verification_type: &str) -> f64 {
    match verification_type {
        "identity" => 0.75,
        "skill_assessment" => 0.80,
        "portfolio" => 0.85,
        "work_history" => 0.70,
        "payment_method" => 0.90,
        _ => 0.70,
    }
}

/// Evidence weights for a verification type, `None` for unknown types.
pub fn evidence_weights(verification_type: &str) -> Option<&'static [(&'static str, f64)]> {
    match verification_type {
        "identity" => Some(IDENTITY),
        "payment_method" => Some(PAYMENT_METHOD),
        "skill_assessment" => Some(SKILL_ASSESSMENT),
        "portfolio" => Some(PORTFOLIO),
        "work_history" => Some(WORK_HISTORY),
        _ => None,
    }
}

fn default_type() -> String {
    "identity".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    #[serde(default)]
    pub verification_id: Option<String>,
    pub user_id: String,
    #[serde(default = "default_type", alias = "type")]
    pub verification_type: String,
    #[serde(default)]
    pub evidence: Map<String, Value>,
}

impl VerificationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("user_id", &self.user_id)?;
        require_non_empty("verification_type", &self.verification_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCheck {
    pub check: String,
    pub passed: bool,
}

/// Status and per-check results attached to a verification decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    pub verification_type: String,
    pub checks: Vec<EvidenceCheck>,
}

impl VerificationOutcome {
    pub fn requires_human_review(&self) -> bool {
        self.status == VerificationStatus::HumanReview
    }
}

fn evidence_present(evidence: &Map<String, Value>, key: &str) -> bool {
    if key == "name_and_dob" {
        is_present(evidence.get("full_name")) && is_present(evidence.get("date_of_birth"))
    } else {
        is_present(evidence.get(key))
    }
}

/// Presence check per weighted evidence key, in table order.
pub fn evidence_checks(verification_type: &str, evidence: &Map<String, Value>) -> Vec<EvidenceCheck> {
    evidence_weights(verification_type)
        .unwrap_or_default()
        .iter()
        .map(|(key, _)| EvidenceCheck {
            check: key.to_string(),
            passed: evidence_present(evidence, key),
        })
        .collect()
}

/// Weighted presence sum, or the fixed unknown-type score.
pub fn evidence_score(verification_type: &str, evidence: &Map<String, Value>) -> (CompositeScore, Vec<Factor>) {
    let Some(weights) = evidence_weights(verification_type) else {
        return (CompositeScore::new(UNKNOWN_TYPE_SCORE), Vec::new());
    };
    let factors: Vec<Factor> = weights
        .iter()
        .filter(|(key, _)| evidence_present(evidence, key))
        .map(|(key, weight)| Factor::new(*key, *weight, format!("{key} provided")))
        .collect();
    (CompositeScore::new(sum_clamped(&factors).rounded()), factors)
}

fn verdict(
    score: CompositeScore,
    factors: Vec<Factor>,
    verification_type: &str,
    checks: Vec<EvidenceCheck>,
) -> Verdict<VerificationOutcome> {
    let status = VERIFICATION_BANDS.classify(score);
    Verdict {
        composite_score: score,
        tier: status.label(),
        action: status.action(),
        factors,
        detail: VerificationOutcome {
            status,
            verification_type: verification_type.to_string(),
            checks,
        },
    }
}

/// Weighted evidence-presence verification.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationEngine;

impl DecisionEngine for VerificationEngine {
    type Input = VerificationRequest;
    type Detail = VerificationOutcome;

    fn kind(&self) -> DecisionKind {
        DecisionKind::VerificationCheck
    }

    fn request_ref(&self, input: &VerificationRequest) -> RequestRef {
        match &input.verification_id {
            Some(id) => RequestRef::new("verification", id.clone()),
            None => RequestRef::new("user", input.user_id.clone()),
        }
    }

    fn evaluate(&self, input: &VerificationRequest) -> Verdict<VerificationOutcome> {
        if input.evidence.is_empty() {
            let score = CompositeScore::new(attached_evidence_baseline(&input.verification_type));
            let factors = vec![Factor::new(
                "type_baseline",
                score.value(),
                format!("no evidence attached, {} baseline", input.verification_type),
            )];
            return verdict(score, factors, &input.verification_type, Vec::new());
        }
        let (score, factors) = evidence_score(&input.verification_type, &input.evidence);
        let checks = evidence_checks(&input.verification_type, &input.evidence);
        verdict(score, factors, &input.verification_type, checks)
    }

    fn interpret(
        &self,
        input: &VerificationRequest,
        payload: &Value,
    ) -> Result<Verdict<VerificationOutcome>, MalformedResponse> {
        let confidence = number_field(payload, "confidence")
            .ok_or_else(|| MalformedResponse::missing("confidence"))?;
        let checks: Vec<EvidenceCheck> = payload
            .get("checks")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        Some(EvidenceCheck {
                            check: entry.get("check")?.as_str()?.to_string(),
                            passed: entry.get("passed").and_then(Value::as_bool).unwrap_or(false),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let score = CompositeScore::new(confidence);
        let factors = payload
            .get("summary")
            .and_then(Value::as_str)
            .map(|summary| vec![Factor::new("analyzer_summary", score.value(), summary)])
            .unwrap_or_default();
        Ok(verdict(score, factors, &input.verification_type, checks))
    }

    fn audit_output(&self, decision: &Decision<VerificationOutcome>) -> Value {
        json!({
            "status": decision.detail.status.label(),
            "decision": decision.action,
            "analysis_type": decision.detail.verification_type,
            "checks_passed": decision.detail.checks.iter().filter(|check| check.passed).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn request(kind: &str, value: Value) -> VerificationRequest {
        VerificationRequest {
            verification_id: Some("ver-1".to_string()),
            user_id: "user-1".to_string(),
            verification_type: kind.to_string(),
            evidence: evidence(value),
        }
    }

    #[test]
    fn complete_payment_method_is_auto_approved() {
        let verdict = VerificationEngine.evaluate(&request(
            "payment_method",
            json!({"bank_account": true, "tax_id": true, "billing_address": true}),
        ));
        assert_eq!(verdict.composite_score.value(), 1.0);
        assert_eq!(verdict.detail.status, VerificationStatus::Approved);
        assert!(!verdict.detail.requires_human_review());
        assert_eq!(verdict.action, "auto_approved");
    }

    #[test]
    fn identity_requires_name_and_date_of_birth_together() {
        let partial = evidence_score(
            "identity",
            &evidence(json!({"government_id": "passport", "selfie": true, "full_name": "Ada"})),
        );
        assert_eq!(partial.0.value(), 0.6);

        let verdict = VerificationEngine.evaluate(&request(
            "identity",
            json!({
                "government_id": "passport",
                "selfie": true,
                "full_name": "Ada",
                "date_of_birth": "1815-12-10"
            }),
        ));
        assert_eq!(verdict.composite_score.value(), 0.8);
        assert_eq!(verdict.detail.status, VerificationStatus::HumanReview);
        assert_eq!(VerificationStatus::HumanReview.record_status(), "pending_review");
        let passed: Vec<&str> = verdict
            .detail
            .checks
            .iter()
            .filter(|check| check.passed)
            .map(|check| check.check.as_str())
            .collect();
        assert_eq!(passed, vec!["government_id", "selfie", "name_and_dob"]);
    }

    #[test]
    fn falsy_evidence_is_not_counted() {
        let (score, factors) = evidence_score(
            "portfolio",
            &evidence(json!({"portfolio_items": [], "item_descriptions": "", "original_work": false, "client_references": 0})),
        );
        assert_eq!(score, CompositeScore::ZERO);
        assert!(factors.is_empty());
        let verdict = VerificationEngine.evaluate(&request(
            "portfolio",
            json!({"portfolio_items": [], "original_work": false}),
        ));
        assert_eq!(verdict.detail.status, VerificationStatus::Rejected);
        assert_eq!(verdict.action, "auto_rejected");
    }

    #[test]
    fn submissions_without_evidence_are_never_rejected() {
        let payment = VerificationEngine.evaluate(&request("payment_method", json!({})));
        assert_eq!(payment.composite_score.value(), 0.9);
        assert_eq!(payment.detail.status, VerificationStatus::Approved);
        assert!(payment.detail.checks.is_empty());
        assert_eq!(payment.factors[0].name, "type_baseline");

        let identity = VerificationEngine.evaluate(&request("identity", json!({})));
        assert_eq!(identity.detail.status, VerificationStatus::HumanReview);

        for kind in ["identity", "skill_assessment", "portfolio", "work_history", "payment_method", "dna_sample"] {
            let verdict = VerificationEngine.evaluate(&request(kind, json!({})));
            assert_ne!(verdict.detail.status, VerificationStatus::Rejected, "{kind}");
        }
    }

    #[test]
    fn unknown_type_defaults_to_review() {
        let verdict = VerificationEngine.evaluate(&request("dna_sample", json!({"anything": true})));
        assert_eq!(verdict.composite_score.value(), UNKNOWN_TYPE_SCORE);
        assert_eq!(verdict.detail.status, VerificationStatus::HumanReview);
        assert!(verdict.detail.checks.is_empty());
    }

    #[test]
    fn type_alias_is_accepted_on_the_wire() {
        let request: VerificationRequest =
            serde_json::from_value(json!({"user_id": "u", "type": "work_history"}))
                .expect("deserializes");
        assert_eq!(request.verification_type, "work_history");
        assert!(request.evidence.is_empty());
    }

    #[test]
    fn analyzer_confidence_drives_status() {
        let payload = json!({
            "confidence": 0.91,
            "checks": [{"check": "document_authentic", "passed": true, "notes": "ok"}],
            "summary": "Looks genuine"
        });
        let verdict = VerificationEngine
            .interpret(&request("identity", json!({})), &payload)
            .expect("valid payload");
        assert_eq!(verdict.detail.status, VerificationStatus::Approved);
        assert_eq!(verdict.detail.checks.len(), 1);
        assert!(VerificationEngine
            .interpret(&request("identity", json!({})), &json!({"summary": "?"}))
            .is_err());
    }
}
