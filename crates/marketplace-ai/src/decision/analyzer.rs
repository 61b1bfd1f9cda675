//! Opaque AI analyzer capability.
//!
//! The orchestrator never sees analyzer errors as errors: every call resolves to an
//! [`AiOutcome`], and anything short of `Success` sends the request down the rule path.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;

use super::domain::DecisionKind;

/// Result of one analyzer call.
#[derive(Debug, Clone, PartialEq)]
pub enum AiOutcome {
    Success(Value),
    Unavailable,
    Failed(String),
}

/// Analyzer payload that does not fit the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed analyzer response: {0}")]
pub struct MalformedResponse(String);

impl MalformedResponse {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn missing(field: &str) -> Self {
        Self(format!("missing or invalid `{field}`"))
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Model name recorded on AI-sourced decisions.
    fn model_name(&self) -> &str;

    async fn analyze(&self, kind: DecisionKind, input: &Value) -> AiOutcome;
}

/// Analyzer used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAnalyzer;

#[async_trait]
impl Analyzer for DisabledAnalyzer {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn analyze(&self, _kind: DecisionKind, _input: &Value) -> AiOutcome {
        AiOutcome::Unavailable
    }
}

/// Analyzer reached over HTTP. The client is built on first use and shared afterwards.
#[derive(Debug)]
pub struct HttpAnalyzer {
    endpoint: Url,
    model_name: String,
    timeout: Duration,
    client: OnceCell<reqwest::Client>,
}

impl HttpAnalyzer {
    pub fn new(endpoint: Url, model_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint,
            model_name: model_name.into(),
            timeout,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client, reqwest::Error> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder().timeout(self.timeout).build()
            })
            .await
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn analyze(&self, kind: DecisionKind, input: &Value) -> AiOutcome {
        let client = match self.client().await {
            Ok(client) => client,
            Err(err) => return AiOutcome::Failed(format!("analyzer client unavailable: {err}")),
        };

        let body = json!({ "decision_type": kind.label(), "input": input });
        let response = match client.post(self.endpoint.clone()).json(&body).send().await {
            Ok(response) => response,
            Err(err) => return AiOutcome::Failed(err.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            return AiOutcome::Failed(format!("analyzer returned {status}"));
        }

        match response.text().await {
            Ok(text) => match parse_analyzer_text(&text) {
                Ok(payload) => {
                    debug!(decision_type = kind.label(), "analyzer responded");
                    AiOutcome::Success(payload)
                }
                Err(err) => AiOutcome::Failed(err.to_string()),
            },
            Err(err) => AiOutcome::Failed(err.to_string()),
        }
    }
}

/// Accepts raw JSON or JSON wrapped in a markdown code fence.
pub fn parse_analyzer_text(text: &str) -> Result<Value, MalformedResponse> {
    let mut body = text.trim();
    if body.starts_with("```") {
        body = body.split_once('\n').map_or("", |(_, rest)| rest);
        body = body.rsplit_once("```").map_or(body, |(inner, _)| inner).trim();
    }
    serde_json::from_str(body).map_err(|err| MalformedResponse::new(err.to_string()))
}
