//! Decision pipeline: signal extraction, aggregation, tiering, AI-first orchestration with
//! rule fallback, and audit recording.

pub mod aggregate;
pub mod analyzer;
pub mod audit;
pub mod domain;
pub mod orchestrator;
pub mod router;
pub mod service;
pub mod signals;
pub mod tier;

#[cfg(test)]
mod tests;

pub use analyzer::{AiOutcome, Analyzer, DisabledAnalyzer, HttpAnalyzer, MalformedResponse};
pub use audit::{AuditRecord, AuditRecorder, AuditSink, AuditSinkError, LogOnlySink, PersistMode};
pub use domain::{CompositeScore, Decision, DecisionKind, Factor, ModelSource, RequestRef, Verdict};
pub use orchestrator::{AiGate, DecisionEngine, DecisionOrchestrator};
pub use router::decision_router;
pub use service::{
    AnalyzerTimeouts, CallPath, DecisionError, DecisionService, FraudBaselineReport,
    FraudCheckResponse, MatchResponse, ProfileEmbeddingResponse, ScopeResponse,
    VerificationResponse,
};
pub use signals::ValidationError;
