use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{round_to, Decision};
use super::orchestrator::DecisionEngine;

/// Immutable trail entry written once per decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub decision_type: &'static str,
    pub entity_type: String,
    pub entity_id: String,
    pub model_name: String,
    pub model_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_version: Option<String>,
    pub output: Value,
    pub confidence_score: f64,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn from_decision<E: DecisionEngine>(engine: &E, decision: &Decision<E::Detail>) -> Self {
        let explanation = decision
            .top_factors
            .first()
            .map(|factor| factor.description.clone())
            .filter(|description| !description.is_empty());
        Self {
            id: Uuid::new_v4(),
            decision_type: decision.kind.label(),
            entity_type: decision.request_ref.entity_type.clone(),
            entity_id: decision.request_ref.entity_id.clone(),
            model_name: decision.model_name.clone(),
            model_version: decision.model_version.clone(),
            prompt_version: None,
            output: engine.audit_output(decision),
            confidence_score: round_to(engine.audit_confidence(decision).clamp(0.0, 1.0), 4),
            latency_ms: decision.latency_ms,
            explanation,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditSinkError {
    #[error("audit write rejected: {0}")]
    Rejected(String),
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Durable destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditSinkError>;
}

/// Sink that only keeps the log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlySink;

#[async_trait]
impl AuditSink for LogOnlySink {
    async fn persist(&self, _record: &AuditRecord) -> Result<(), AuditSinkError> {
        Ok(())
    }
}

/// How the durable write is scheduled relative to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// Spawn the write and return immediately.
    Background,
    /// Await the write before returning. Used by the CLI and tests.
    Inline,
}

/// Logs every record synchronously, then persists it best-effort.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    mode: PersistMode,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, mode: PersistMode) -> Self {
        Self { sink, mode }
    }

    pub async fn record<E: DecisionEngine>(
        &self,
        engine: &E,
        decision: &Decision<E::Detail>,
    ) -> AuditRecord {
        let record = AuditRecord::from_decision(engine, decision);
        log_record(&record);

        match self.mode {
            PersistMode::Inline => persist_best_effort(self.sink.as_ref(), &record).await,
            PersistMode::Background => {
                let sink = Arc::clone(&self.sink);
                let pending = record.clone();
                tokio::spawn(async move {
                    persist_best_effort(sink.as_ref(), &pending).await;
                });
            }
        }

        record
    }
}

fn log_record(record: &AuditRecord) {
    let output = record.output.to_string();
    info!(
        target: "audit",
        audit_id = %record.id,
        decision_type = record.decision_type,
        entity_type = %record.entity_type,
        entity_id = %record.entity_id,
        model_name = %record.model_name,
        model_version = %record.model_version,
        confidence = record.confidence_score,
        latency_ms = record.latency_ms,
        output = %output,
        "ai_decision_logged"
    );
}

async fn persist_best_effort(sink: &dyn AuditSink, record: &AuditRecord) {
    if let Err(err) = sink.persist(record).await {
        warn!(
            audit_id = %record.id,
            decision_type = record.decision_type,
            error = %err,
            "audit persistence failed"
        );
    }
}
