use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::audit::AuditRecorder;
use super::domain::{Decision, Factor};
use super::orchestrator::{DecisionEngine, DecisionOrchestrator};
use super::signals::fraud::{AccountBaseline, FraudBaselineEngine, FraudCheckRequest, FraudEngine};
use super::signals::matching::{MatchEngine, MatchRequest, MatchResult};
use super::signals::profile::{ProfileEngine, ProfileSnapshot};
use super::signals::scope::{Milestone, ScopeEngine, ScopeRequest};
use super::signals::verification::{
    EvidenceCheck, VerificationEngine, VerificationOutcome, VerificationRequest,
};
use super::signals::ValidationError;
use super::tier::VerificationStatus;

/// Where a decision was requested from; selects the analyzer timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPath {
    /// Synchronous HTTP endpoint with a hard latency budget.
    Sync,
    /// Event handler, free to wait longer on the analyzer.
    Event,
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerTimeouts {
    pub sync: Duration,
    pub event: Duration,
}

impl AnalyzerTimeouts {
    fn for_path(&self, path: CallPath) -> Duration {
        match path {
            CallPath::Sync => self.sync,
            CallPath::Event => self.event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudCheckResponse {
    pub account_id: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub fraud_score: f64,
    pub risk_tier: &'static str,
    pub recommended_action: &'static str,
    pub top_risk_factors: Vec<Factor>,
    pub model_version: String,
    pub enforcement_mode: String,
}

/// Registration baseline in the shape stored by the system of record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudBaselineReport {
    pub user_id: String,
    pub fraud_score: f64,
    pub risk_tier: &'static str,
    pub risk_factors: Vec<Factor>,
    pub model_name: String,
    pub model_version: String,
    pub input_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResponse {
    pub job_id: String,
    pub results: Vec<MatchResult>,
    pub model_version: String,
    pub total_candidates: usize,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeResponse {
    pub job_id: String,
    pub milestones: Vec<Milestone>,
    pub total_estimated_hours: f64,
    pub total_estimated_cost: f64,
    pub confidence_score: f64,
    pub complexity_tier: &'static str,
    pub model_version: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResponse {
    pub verification_id: String,
    pub user_id: String,
    pub verification_type: String,
    pub status: &'static str,
    pub confidence_score: f64,
    pub model_version: String,
    pub requires_human_review: bool,
    #[serde(skip)]
    pub decision: &'static str,
    #[serde(skip)]
    pub checks: Vec<EvidenceCheck>,
}

impl VerificationResponse {
    /// Status stored by the system of record (`pending_review` instead of `human_review`).
    pub fn record_status(&self) -> &'static str {
        VerificationStatus::from_label(self.status).map_or(self.status, VerificationStatus::record_status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileEmbeddingResponse {
    pub profile_embedding: Value,
    pub model_version: String,
}

/// Synchronous entry point shared by the HTTP routes and the event handlers.
pub struct DecisionService {
    orchestrator: DecisionOrchestrator,
    recorder: AuditRecorder,
    timeouts: AnalyzerTimeouts,
    enforcement_mode: String,
}

impl DecisionService {
    pub fn new(
        orchestrator: DecisionOrchestrator,
        recorder: AuditRecorder,
        timeouts: AnalyzerTimeouts,
        enforcement_mode: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            recorder,
            timeouts,
            enforcement_mode: enforcement_mode.into(),
        }
    }

    pub fn orchestrator(&self) -> &DecisionOrchestrator {
        &self.orchestrator
    }

    async fn run<E: DecisionEngine>(
        &self,
        engine: &E,
        input: &E::Input,
        path: CallPath,
    ) -> Decision<E::Detail> {
        let decision = self
            .orchestrator
            .decide(engine, input, self.timeouts.for_path(path))
            .await;
        self.recorder.record(engine, &decision).await;
        decision
    }

    pub async fn check_fraud(
        &self,
        request: FraudCheckRequest,
        path: CallPath,
    ) -> Result<FraudCheckResponse, DecisionError> {
        request.validate()?;
        let decision = self.run(&FraudEngine, &request, path).await;
        Ok(FraudCheckResponse {
            account_id: request.account_id,
            entity_type: request.entity_type,
            entity_id: request.entity_id,
            fraud_score: decision.composite_score.rounded(),
            risk_tier: decision.tier,
            recommended_action: decision.action,
            top_risk_factors: decision.top_factors,
            model_version: decision.model_version,
            enforcement_mode: self.enforcement_mode.clone(),
        })
    }

    pub async fn fraud_baseline(
        &self,
        account: AccountBaseline,
        path: CallPath,
    ) -> Result<FraudBaselineReport, DecisionError> {
        if account.user_id.trim().is_empty() {
            return Err(ValidationError::new("user_id", "must not be empty").into());
        }
        let decision = self.run(&FraudBaselineEngine, &account, path).await;
        Ok(FraudBaselineReport {
            input_data: json!({ "email": account.email, "role": account.role }),
            user_id: account.user_id,
            fraud_score: decision.composite_score.rounded(),
            risk_tier: decision.tier,
            risk_factors: decision.top_factors,
            model_name: decision.model_name,
            model_version: decision.model_version,
        })
    }

    pub async fn rank_matches(
        &self,
        request: MatchRequest,
        path: CallPath,
    ) -> Result<MatchResponse, DecisionError> {
        request.validate()?;
        let decision = self.run(&MatchEngine, &request, path).await;
        Ok(MatchResponse {
            job_id: request.job_id,
            results: decision.detail.results,
            model_version: decision.model_version,
            total_candidates: decision.detail.total_candidates,
            latency_ms: decision.latency_ms,
        })
    }

    pub async fn analyze_scope(
        &self,
        request: ScopeRequest,
        path: CallPath,
    ) -> Result<ScopeResponse, DecisionError> {
        request.validate()?;
        let decision = self.run(&ScopeEngine, &request, path).await;
        Ok(ScopeResponse {
            job_id: request.job_id,
            milestones: decision.detail.milestones,
            total_estimated_hours: decision.detail.total_estimated_hours,
            total_estimated_cost: decision.detail.total_estimated_cost,
            confidence_score: decision.composite_score.rounded(),
            complexity_tier: decision.tier,
            model_version: decision.model_version,
            latency_ms: decision.latency_ms,
        })
    }

    pub async fn verify(
        &self,
        mut request: VerificationRequest,
        path: CallPath,
    ) -> Result<VerificationResponse, DecisionError> {
        request.validate()?;
        let verification_id = request
            .verification_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let decision = self.run(&VerificationEngine, &request, path).await;
        let VerificationOutcome {
            status,
            verification_type,
            checks,
        } = decision.detail;
        Ok(VerificationResponse {
            verification_id,
            user_id: request.user_id,
            verification_type,
            status: status.label(),
            confidence_score: decision.composite_score.rounded(),
            model_version: decision.model_version,
            requires_human_review: status == VerificationStatus::HumanReview,
            decision: decision.action,
            checks,
        })
    }

    pub async fn enrich_profile(
        &self,
        snapshot: ProfileSnapshot,
        path: CallPath,
    ) -> Result<ProfileEmbeddingResponse, DecisionError> {
        snapshot.validate()?;
        let decision = self.run(&ProfileEngine, &snapshot, path).await;
        Ok(ProfileEmbeddingResponse {
            profile_embedding: decision.detail.embedding,
            model_version: decision.model_version,
        })
    }
}

/// Error raised by the decision service.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
