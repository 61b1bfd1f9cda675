use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::decision::signals::profile::ProfileSnapshot;

/// Topics the pipeline subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    UserRegistered,
    JobPublished,
    ProfileReady,
    VerificationSubmitted,
}

impl Topic {
    pub const ALL: [Self; 4] = [
        Self::UserRegistered,
        Self::JobPublished,
        Self::ProfileReady,
        Self::VerificationSubmitted,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::UserRegistered => "user-registered",
            Self::JobPublished => "job-published",
            Self::ProfileReady => "profile-ready",
            Self::VerificationSubmitted => "verification-submitted",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn unknown_role() -> String {
    "unknown".to_string()
}

fn identity_type() -> String {
    "identity".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserRegistered {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "unknown_role")]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobPublished {
    pub job_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills_required: Vec<String>,
    #[serde(default)]
    pub budget_min: Option<f64>,
    #[serde(default)]
    pub budget_max: Option<f64>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VerificationSubmitted {
    pub verification_id: String,
    pub user_id: String,
    #[serde(default = "identity_type", rename = "type")]
    pub verification_type: String,
    #[serde(default, alias = "data")]
    pub evidence: Map<String, Value>,
}

/// One decoded message, typed by the topic it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    UserRegistered(UserRegistered),
    JobPublished(JobPublished),
    ProfileReady(ProfileSnapshot),
    VerificationSubmitted(VerificationSubmitted),
}

#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("{topic} payload is not valid JSON for this topic: {source}")]
    Json {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
    #[error("{topic} payload is missing `{field}`")]
    MissingField { topic: Topic, field: &'static str },
}

impl DomainEvent {
    /// Decodes a raw message body for `topic`, rejecting blank identifiers.
    pub fn decode(topic: Topic, data: &[u8]) -> Result<Self, EventDecodeError> {
        let json = |source| EventDecodeError::Json { topic, source };
        let event = match topic {
            Topic::UserRegistered => Self::UserRegistered(serde_json::from_slice(data).map_err(json)?),
            Topic::JobPublished => Self::JobPublished(serde_json::from_slice(data).map_err(json)?),
            Topic::ProfileReady => Self::ProfileReady(serde_json::from_slice(data).map_err(json)?),
            Topic::VerificationSubmitted => {
                Self::VerificationSubmitted(serde_json::from_slice(data).map_err(json)?)
            }
        };

        let (field, value) = event.primary_key();
        if value.trim().is_empty() {
            return Err(EventDecodeError::MissingField { topic, field });
        }
        Ok(event)
    }

    pub fn topic(&self) -> Topic {
        match self {
            Self::UserRegistered(_) => Topic::UserRegistered,
            Self::JobPublished(_) => Topic::JobPublished,
            Self::ProfileReady(_) => Topic::ProfileReady,
            Self::VerificationSubmitted(_) => Topic::VerificationSubmitted,
        }
    }

    /// Identifier field used in logs.
    pub fn primary_key(&self) -> (&'static str, &str) {
        match self {
            Self::UserRegistered(event) => ("user_id", &event.user_id),
            Self::JobPublished(event) => ("job_id", &event.job_id),
            Self::ProfileReady(event) => ("user_id", &event.user_id),
            Self::VerificationSubmitted(event) => ("verification_id", &event.verification_id),
        }
    }
}
