use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::events::{DomainEvent, JobPublished, Topic, UserRegistered, VerificationSubmitted};
use crate::decision::service::{CallPath, DecisionError, DecisionService};
use crate::decision::signals::fraud::AccountBaseline;
use crate::decision::signals::matching::{FreelancerCandidate, MatchRequest};
use crate::decision::signals::profile::ProfileSnapshot;
use crate::decision::signals::scope::ScopeRequest;
use crate::decision::signals::verification::VerificationRequest;
use crate::delivery::{DeliveryClient, DeliveryOutcome};

const MATCH_LIMIT: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error("delivery to {path} failed after {attempts} attempt(s): {error}")]
    Delivery {
        path: String,
        error: String,
        attempts: u32,
    },
    #[error("unexpected response from {path}: {reason}")]
    UnexpectedResponse { path: String, reason: String },
    #[error("{subscription} does not handle {topic} events")]
    WrongTopic {
        subscription: &'static str,
        topic: Topic,
    },
    #[error("payload could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Consumer bound to one subscription.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn topic(&self) -> Topic;

    fn subscription(&self) -> &'static str;

    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError>;
}

fn confirmed(path: String, outcome: DeliveryOutcome) -> Result<Value, HandlerError> {
    match outcome {
        DeliveryOutcome::Confirmed(body) => Ok(body),
        DeliveryOutcome::Failed { error, attempts } => Err(HandlerError::Delivery {
            path,
            error,
            attempts,
        }),
    }
}

fn to_body<T: Serialize>(payload: &T) -> Result<Value, HandlerError> {
    Ok(serde_json::to_value(payload)?)
}

/// Registration fraud baseline, stored on `POST /fraud/baseline`.
pub struct FraudBaselineHandler {
    service: Arc<DecisionService>,
    delivery: Arc<DeliveryClient>,
}

impl FraudBaselineHandler {
    pub fn new(service: Arc<DecisionService>, delivery: Arc<DeliveryClient>) -> Self {
        Self { service, delivery }
    }

    async fn on_registered(&self, event: UserRegistered) -> Result<(), HandlerError> {
        let account = AccountBaseline {
            user_id: event.user_id,
            email: event.email,
            role: event.role,
        };
        let report = self.service.fraud_baseline(account, CallPath::Event).await?;
        let body = to_body(&report)?;
        confirmed(
            "/fraud/baseline".to_string(),
            self.delivery.post("/fraud/baseline", &body).await,
        )?;
        info!(
            user_id = %report.user_id,
            fraud_score = report.fraud_score,
            risk_tier = report.risk_tier,
            "fraud baseline stored"
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler for FraudBaselineHandler {
    fn topic(&self) -> Topic {
        Topic::UserRegistered
    }

    fn subscription(&self) -> &'static str {
        "user-registered-fraud"
    }

    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError> {
        match event {
            DomainEvent::UserRegistered(event) => self.on_registered(event).await,
            other => Err(HandlerError::WrongTopic {
                subscription: self.subscription(),
                topic: other.topic(),
            }),
        }
    }
}

/// Opens a pending identity verification for new freelancers.
pub struct VerificationBootstrapHandler {
    delivery: Arc<DeliveryClient>,
}

impl VerificationBootstrapHandler {
    pub fn new(delivery: Arc<DeliveryClient>) -> Self {
        Self { delivery }
    }

    async fn on_registered(&self, event: UserRegistered) -> Result<(), HandlerError> {
        if event.role != "freelancer" {
            info!(user_id = %event.user_id, role = %event.role, "skipping non-freelancer");
            return Ok(());
        }
        let body = json!({
            "user_id": event.user_id,
            "type": "identity",
            "status": "pending",
            "data": { "reason": "auto_created_on_registration" },
        });
        confirmed(
            "/verifications".to_string(),
            self.delivery.post("/verifications", &body).await,
        )?;
        info!(user_id = %event.user_id, "identity verification created");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for VerificationBootstrapHandler {
    fn topic(&self) -> Topic {
        Topic::UserRegistered
    }

    fn subscription(&self) -> &'static str {
        "user-registered-verification"
    }

    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError> {
        match event {
            DomainEvent::UserRegistered(event) => self.on_registered(event).await,
            other => Err(HandlerError::WrongTopic {
                subscription: self.subscription(),
                topic: other.topic(),
            }),
        }
    }
}

/// Scores submitted evidence and patches the verification record.
pub struct VerificationHandler {
    service: Arc<DecisionService>,
    delivery: Arc<DeliveryClient>,
}

impl VerificationHandler {
    pub fn new(service: Arc<DecisionService>, delivery: Arc<DeliveryClient>) -> Self {
        Self { service, delivery }
    }

    async fn on_submitted(&self, event: VerificationSubmitted) -> Result<(), HandlerError> {
        let request = VerificationRequest {
            verification_id: Some(event.verification_id),
            user_id: event.user_id,
            verification_type: event.verification_type,
            evidence: event.evidence,
        };
        let response = self.service.verify(request, CallPath::Event).await?;
        let path = format!("/verifications/{}", response.verification_id);
        let body = json!({
            "status": response.record_status(),
            "confidence_score": response.confidence_score,
            "model_version": response.model_version,
            "ai_result": {
                "decision": response.decision,
                "confidence": response.confidence_score,
                "analysis_type": response.verification_type,
                "checks_passed": response.checks,
            },
        });
        confirmed(path.clone(), self.delivery.patch(&path, &body).await)?;
        info!(
            verification_id = %response.verification_id,
            status = response.record_status(),
            decision = response.decision,
            "verification updated"
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler for VerificationHandler {
    fn topic(&self) -> Topic {
        Topic::VerificationSubmitted
    }

    fn subscription(&self) -> &'static str {
        "verification-submitted-automation"
    }

    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError> {
        match event {
            DomainEvent::VerificationSubmitted(event) => self.on_submitted(event).await,
            other => Err(HandlerError::WrongTopic {
                subscription: self.subscription(),
                topic: other.topic(),
            }),
        }
    }
}

/// Ranks the candidate pool of a freshly published job.
pub struct MatchHandler {
    service: Arc<DecisionService>,
    delivery: Arc<DeliveryClient>,
}

impl MatchHandler {
    pub fn new(service: Arc<DecisionService>, delivery: Arc<DeliveryClient>) -> Self {
        Self { service, delivery }
    }

    async fn candidates(&self, job_id: &str) -> Result<Vec<FreelancerCandidate>, HandlerError> {
        let path = format!("/jobs/{job_id}/candidates");
        let body = confirmed(path.clone(), self.delivery.get(&path).await)?;
        match body.get("candidates") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(candidates) => serde_json::from_value(candidates.clone()).map_err(|err| {
                HandlerError::UnexpectedResponse {
                    path,
                    reason: err.to_string(),
                }
            }),
        }
    }

    async fn on_published(&self, job: JobPublished) -> Result<(), HandlerError> {
        let candidates = self.candidates(&job.job_id).await?;
        if candidates.is_empty() {
            info!(job_id = %job.job_id, "no candidates found");
            return Ok(());
        }

        let request = MatchRequest {
            job_id: job.job_id,
            job_skills: job.skills_required,
            job_budget_min: job.budget_min,
            job_budget_max: job.budget_max,
            experience_level: job.experience_level,
            candidates,
            limit: MATCH_LIMIT,
        };
        let response = self.service.rank_matches(request, CallPath::Event).await?;
        let path = format!("/jobs/{}/matches", response.job_id);
        let body = json!({
            "results": response.results,
            "model_version": response.model_version,
            "latency_ms": response.latency_ms,
        });
        confirmed(path.clone(), self.delivery.post(&path, &body).await)?;
        info!(
            job_id = %response.job_id,
            candidates = response.results.len(),
            model_version = %response.model_version,
            "job matches stored"
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler for MatchHandler {
    fn topic(&self) -> Topic {
        Topic::JobPublished
    }

    fn subscription(&self) -> &'static str {
        "job-published-match"
    }

    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError> {
        match event {
            DomainEvent::JobPublished(job) => self.on_published(job).await,
            other => Err(HandlerError::WrongTopic {
                subscription: self.subscription(),
                topic: other.topic(),
            }),
        }
    }
}

/// Breaks a freshly published job into milestones.
pub struct ScopeHandler {
    service: Arc<DecisionService>,
    delivery: Arc<DeliveryClient>,
}

impl ScopeHandler {
    pub fn new(service: Arc<DecisionService>, delivery: Arc<DeliveryClient>) -> Self {
        Self { service, delivery }
    }

    async fn on_published(&self, job: JobPublished) -> Result<(), HandlerError> {
        if job.description.is_empty() {
            info!(job_id = %job.job_id, "skipping empty description");
            return Ok(());
        }

        let request = ScopeRequest {
            job_id: job.job_id,
            title: job.title,
            description: job.description,
            category: job.category,
            skills_required: job.skills_required,
            budget_min: job.budget_min,
            budget_type: "fixed".to_string(),
            budget_max: job.budget_max,
        };
        let response = self.service.analyze_scope(request, CallPath::Event).await?;
        let path = format!("/jobs/{}/scope", response.job_id);
        let body = json!({
            "ai_scope": {
                "milestones": response.milestones,
                "total_estimated_hours": response.total_estimated_hours,
                "total_estimated_cost": response.total_estimated_cost,
                "complexity_tier": response.complexity_tier,
            },
            "model_version": response.model_version,
            "confidence": response.confidence_score,
        });
        confirmed(path.clone(), self.delivery.patch(&path, &body).await)?;
        info!(
            job_id = %response.job_id,
            complexity = response.complexity_tier,
            milestones = response.milestones.len(),
            "scope stored"
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ScopeHandler {
    fn topic(&self) -> Topic {
        Topic::JobPublished
    }

    fn subscription(&self) -> &'static str {
        "job-published-scope"
    }

    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError> {
        match event {
            DomainEvent::JobPublished(job) => self.on_published(job).await,
            other => Err(HandlerError::WrongTopic {
                subscription: self.subscription(),
                topic: other.topic(),
            }),
        }
    }
}

/// Stores a profile summary used by later matching.
pub struct ProfileHandler {
    service: Arc<DecisionService>,
    delivery: Arc<DeliveryClient>,
}

impl ProfileHandler {
    pub fn new(service: Arc<DecisionService>, delivery: Arc<DeliveryClient>) -> Self {
        Self { service, delivery }
    }

    async fn on_ready(&self, profile: ProfileSnapshot) -> Result<(), HandlerError> {
        let user_id = profile.user_id.clone();
        let response = self.service.enrich_profile(profile, CallPath::Event).await?;
        let path = format!("/freelancers/{user_id}/embedding");
        let body = to_body(&response)?;
        confirmed(path.clone(), self.delivery.patch(&path, &body).await)?;
        info!(user_id = %user_id, model_version = %response.model_version, "profile summary stored");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ProfileHandler {
    fn topic(&self) -> Topic {
        Topic::ProfileReady
    }

    fn subscription(&self) -> &'static str {
        "profile-ready-match"
    }

    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError> {
        match event {
            DomainEvent::ProfileReady(profile) => self.on_ready(profile).await,
            other => Err(HandlerError::WrongTopic {
                subscription: self.subscription(),
                topic: other.topic(),
            }),
        }
    }
}

/// Every subscription the service consumes.
pub fn default_handlers(
    service: Arc<DecisionService>,
    delivery: Arc<DeliveryClient>,
) -> Vec<Arc<dyn EventHandler>> {
    vec![
        Arc::new(FraudBaselineHandler::new(service.clone(), delivery.clone())),
        Arc::new(VerificationBootstrapHandler::new(delivery.clone())),
        Arc::new(VerificationHandler::new(service.clone(), delivery.clone())),
        Arc::new(MatchHandler::new(service.clone(), delivery.clone())),
        Arc::new(ScopeHandler::new(service.clone(), delivery.clone())),
        Arc::new(ProfileHandler::new(service, delivery)),
    ]
}
