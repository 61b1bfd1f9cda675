//! Retrying client for the system of record.
//!
//! Every call resolves to a [`DeliveryOutcome`]; callers log a failed delivery and carry on,
//! the decision itself is never blocked on it.

pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::DeliveryConfig;
use crate::decision::audit::{AuditRecord, AuditSink, AuditSinkError};

pub use transport::{HttpTransport, Method, Transport, TransportError, TransportResponse};

/// Bounded exponential backoff: `base_delay * 2^(attempt-1)` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Confirmed(Value),
    Failed { error: String, attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// Response body on success, `{"error": ...}` otherwise.
    pub fn into_envelope(self) -> Value {
        match self {
            Self::Confirmed(body) => body,
            Self::Failed { error, .. } => json!({ "error": error }),
        }
    }
}

enum AttemptError {
    Terminal(String),
    Retryable(String),
}

pub struct DeliveryClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(Arc::new(HttpTransport::new(
            config.base_url.clone(),
            config.token.clone(),
            config.timeout,
        )))
    }

    pub async fn get(&self, path: &str) -> DeliveryOutcome {
        self.request(Method::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> DeliveryOutcome {
        self.request(Method::Post, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> DeliveryOutcome {
        self.request(Method::Patch, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> DeliveryOutcome {
        self.request(Method::Put, path, Some(body)).await
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> DeliveryOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            match self.attempt(method, path, body, attempt).await {
                Ok(body) => return DeliveryOutcome::Confirmed(body),
                Err(AttemptError::Terminal(reason)) => {
                    last_error = reason;
                    break;
                }
                Err(AttemptError::Retryable(reason)) => last_error = reason,
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.delay_after(attempt)).await;
            }
        }

        error!(%method, path, attempts, error = %last_error, "delivery failed");
        DeliveryOutcome::Failed {
            error: last_error,
            attempts,
        }
    }

    async fn attempt(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        attempt: u32,
    ) -> Result<Value, AttemptError> {
        let started = Instant::now();
        match self.transport.send(method, path, body).await {
            Ok(response) => {
                let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(%method, path, status = response.status, latency_ms, attempt, "delivery attempt");
                match response.status {
                    200..=299 => Ok(response.body),
                    status => {
                        let detail = snippet(&response.body);
                        warn!(%method, path, status, body = %detail, attempt, "delivery http error");
                        let reason = format!("HTTP {status}: {detail}");
                        if (400..500).contains(&status) {
                            Err(AttemptError::Terminal(reason))
                        } else {
                            Err(AttemptError::Retryable(reason))
                        }
                    }
                }
            }
            Err(err) => {
                warn!(%method, path, error = %err, attempt, "delivery transport error");
                if err.is_retryable() {
                    Err(AttemptError::Retryable(err.to_string()))
                } else {
                    Err(AttemptError::Terminal(err.to_string()))
                }
            }
        }
    }
}

fn snippet(body: &Value) -> String {
    let text = match body {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    text.chars().take(500).collect()
}

/// Audit records land on `POST /decisions`.
#[async_trait]
impl AuditSink for DeliveryClient {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditSinkError> {
        let body = serde_json::to_value(record)
            .map_err(|err| AuditSinkError::Rejected(err.to_string()))?;
        match self.post("/decisions", &body).await {
            DeliveryOutcome::Confirmed(_) => Ok(()),
            DeliveryOutcome::Failed { error, .. } => Err(AuditSinkError::Unavailable(error)),
        }
    }
}
