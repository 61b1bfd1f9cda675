use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::{json, Value};

use crate::decision::analyzer::{AiOutcome, Analyzer};
use crate::decision::audit::{AuditRecord, AuditRecorder, AuditSink, AuditSinkError, PersistMode};
use crate::decision::domain::DecisionKind;
use crate::decision::orchestrator::{AiGate, DecisionOrchestrator};
use crate::decision::service::{AnalyzerTimeouts, DecisionService};
use crate::decision::signals::fraud::FraudCheckRequest;
use crate::decision::signals::matching::{FreelancerCandidate, MatchRequest};

pub(super) const SYNC_TIMEOUT: Duration = Duration::from_millis(400);

/// Analyzer replaying a fixed outcome and counting calls.
pub(super) struct ScriptedAnalyzer {
    outcome: AiOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub(super) fn new(outcome: AiOutcome) -> Self {
        Self {
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn slow(outcome: AiOutcome, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(outcome)
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn model_name(&self) -> &str {
        "test-model"
    }

    async fn analyze(&self, _kind: DecisionKind, _input: &Value) -> AiOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}

#[derive(Default)]
pub(super) struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub(super) fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit mutex poisoned").clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditSinkError> {
        self.records
            .lock()
            .expect("audit mutex poisoned")
            .push(record.clone());
        Ok(())
    }
}

pub(super) struct UnreachableSink;

#[async_trait]
impl AuditSink for UnreachableSink {
    async fn persist(&self, _record: &AuditRecord) -> Result<(), AuditSinkError> {
        Err(AuditSinkError::Unavailable("connection refused".to_string()))
    }
}

pub(super) fn orchestrator(analyzer: Arc<dyn Analyzer>, ai_enabled: bool) -> DecisionOrchestrator {
    DecisionOrchestrator::new(analyzer, AiGate::new(ai_enabled), "v1.0.0")
}

pub(super) fn build_service(
    analyzer: Arc<dyn Analyzer>,
    ai_enabled: bool,
    sink: Arc<dyn AuditSink>,
) -> DecisionService {
    build_service_persisting(analyzer, ai_enabled, sink, PersistMode::Inline)
}

pub(super) fn build_service_persisting(
    analyzer: Arc<dyn Analyzer>,
    ai_enabled: bool,
    sink: Arc<dyn AuditSink>,
    mode: PersistMode,
) -> DecisionService {
    DecisionService::new(
        orchestrator(analyzer, ai_enabled),
        AuditRecorder::new(sink, mode),
        AnalyzerTimeouts {
            sync: SYNC_TIMEOUT,
            event: Duration::from_secs(15),
        },
        "shadow",
    )
}

pub(super) fn rules_only_service() -> (Arc<DecisionService>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    let service = build_service(
        Arc::new(ScriptedAnalyzer::new(AiOutcome::Unavailable)),
        false,
        sink.clone(),
    );
    (Arc::new(service), sink)
}

pub(super) fn bot_like_request() -> FraudCheckRequest {
    FraudCheckRequest {
        account_id: "acct-42".to_string(),
        entity_type: "proposal".to_string(),
        entity_id: Some("prop-7".to_string()),
        cover_letter: Some("Hire me please".to_string()),
        account_age_days: Some(1),
        total_proposals: Some(25),
        proposals_last_hour: Some(12),
        ..FraudCheckRequest::default()
    }
}

pub(super) fn match_request() -> MatchRequest {
    MatchRequest {
        job_id: "job-1".to_string(),
        job_skills: vec!["rust".to_string(), "postgres".to_string()],
        job_budget_min: Some(50.0),
        job_budget_max: Some(120.0),
        experience_level: Some("mid".to_string()),
        candidates: vec![
            FreelancerCandidate {
                freelancer_id: "fl-a".to_string(),
                skills: vec!["Rust".to_string(), "Postgres".to_string()],
                hourly_rate: Some(80.0),
                experience_years: Some(3.0),
                profile_completeness: Some(90.0),
                verification_level: Some("verified".to_string()),
                avg_rating: Some(4.8),
                total_jobs_completed: Some(40),
            },
            FreelancerCandidate {
                freelancer_id: "fl-b".to_string(),
                skills: vec!["figma".to_string()],
                hourly_rate: Some(200.0),
                ..FreelancerCandidate::default()
            },
        ],
        limit: 20,
    }
}

pub(super) fn ai_fraud_payload() -> Value {
    json!({
        "fraud_score": 0.86,
        "risk_tier": "low",
        "risk_factors": [
            {"factor": "copy_paste_letter", "contribution": 0.5, "description": "template text"},
            {"factor": "burst_activity", "contribution": 0.36, "description": "burst"}
        ],
        "recommended_action": "allow",
        "reasoning": "bot"
    })
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
