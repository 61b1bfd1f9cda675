use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::aggregate::top_factors;
use super::analyzer::{AiOutcome, Analyzer, MalformedResponse};
use super::domain::{Decision, DecisionKind, ModelSource, RequestRef, Verdict};

/// One decision domain: its rule path plus how to read an analyzer payload.
pub trait DecisionEngine: Send + Sync {
    type Input: Serialize + Send + Sync;
    type Detail: Send + Sync;

    fn kind(&self) -> DecisionKind;

    fn request_ref(&self, input: &Self::Input) -> RequestRef;

    /// Deterministic rule path. Pure and allocation-light.
    fn evaluate(&self, input: &Self::Input) -> Verdict<Self::Detail>;

    /// Converts a successful analyzer payload into a verdict.
    fn interpret(
        &self,
        input: &Self::Input,
        payload: &Value,
    ) -> Result<Verdict<Self::Detail>, MalformedResponse>;

    /// Summary stored in the audit record.
    fn audit_output(&self, decision: &Decision<Self::Detail>) -> Value;

    fn audit_confidence(&self, decision: &Decision<Self::Detail>) -> f64 {
        decision.composite_score.value()
    }
}

/// Runtime switch for the AI path, read once per decision.
#[derive(Debug, Clone)]
pub struct AiGate(Arc<AtomicBool>);

impl AiGate {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }
}

/// Tries the analyzer first and falls back to the engine's rules on any non-success.
pub struct DecisionOrchestrator {
    analyzer: Arc<dyn Analyzer>,
    gate: AiGate,
    model_version: String,
}

impl DecisionOrchestrator {
    pub fn new(analyzer: Arc<dyn Analyzer>, gate: AiGate, model_version: impl Into<String>) -> Self {
        Self {
            analyzer,
            gate,
            model_version: model_version.into(),
        }
    }

    pub fn gate(&self) -> &AiGate {
        &self.gate
    }

    /// Version string recorded for rule-path decisions, e.g. `fraud-v1.0.0`.
    pub fn rules_version(&self, kind: DecisionKind) -> String {
        format!("{}-{}", kind.version_prefix(), self.model_version)
    }

    pub fn ai_version(&self) -> String {
        format!("vertex-ai/{}", self.analyzer.model_name())
    }

    pub async fn decide<E>(
        &self,
        engine: &E,
        input: &E::Input,
        ai_timeout: Duration,
    ) -> Decision<E::Detail>
    where
        E: DecisionEngine,
    {
        let started = Instant::now();
        let kind = engine.kind();

        let ai_verdict = if self.gate.is_enabled() {
            self.try_ai(engine, input, ai_timeout).await
        } else {
            None
        };

        let (verdict, model_source, model_name, model_version) = match ai_verdict {
            Some(verdict) => (
                verdict,
                ModelSource::Ai,
                self.analyzer.model_name().to_string(),
                self.ai_version(),
            ),
            None => (
                engine.evaluate(input),
                ModelSource::Rules,
                kind.rule_engine().to_string(),
                self.rules_version(kind),
            ),
        };

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            decision_type = kind.label(),
            model_source = ?model_source,
            tier = verdict.tier,
            latency_ms,
            "decision produced"
        );

        Decision {
            kind,
            request_ref: engine.request_ref(input),
            composite_score: verdict.composite_score,
            tier: verdict.tier,
            action: verdict.action,
            top_factors: top_factors(verdict.factors),
            model_source,
            model_name,
            model_version,
            latency_ms,
            created_at: Utc::now(),
            detail: verdict.detail,
        }
    }

    async fn try_ai<E>(
        &self,
        engine: &E,
        input: &E::Input,
        ai_timeout: Duration,
    ) -> Option<Verdict<E::Detail>>
    where
        E: DecisionEngine,
    {
        let kind = engine.kind();
        let payload = match serde_json::to_value(input) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(decision_type = kind.label(), error = %err, "analyzer input not serializable");
                return None;
            }
        };

        let outcome = tokio::time::timeout(ai_timeout, self.analyzer.analyze(kind, &payload))
            .await
            .unwrap_or_else(|_| {
                AiOutcome::Failed(format!("timed out after {} ms", ai_timeout.as_millis()))
            });

        match outcome {
            AiOutcome::Success(response) => match engine.interpret(input, &response) {
                Ok(verdict) => Some(verdict),
                Err(err) => {
                    warn!(decision_type = kind.label(), error = %err, "falling back to rules");
                    None
                }
            },
            AiOutcome::Unavailable => {
                debug!(decision_type = kind.label(), "analyzer unavailable");
                None
            }
            AiOutcome::Failed(reason) => {
                warn!(decision_type = kind.label(), reason = %reason, "falling back to rules");
                None
            }
        }
    }
}
