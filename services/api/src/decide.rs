use crate::infra::build_decision_service;
use clap::{Args, ValueEnum};
use marketplace_ai::config::AppConfig;
use marketplace_ai::decision::{CallPath, DecisionService, LogOnlySink, PersistMode};
use marketplace_ai::error::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum DecisionDomain {
    /// Proposal or account fraud check
    Fraud,
    /// Registration fraud baseline
    Baseline,
    /// Rank freelancers against a job
    Match,
    /// Milestone plan for a job description
    Scope,
    /// Evidence-based verification
    Verification,
    /// Profile summary for a freelancer
    Profile,
}

#[derive(Args, Debug)]
pub(crate) struct DecideArgs {
    /// Decision domain to run
    #[arg(value_enum)]
    pub(crate) domain: DecisionDomain,
    /// JSON request body, shaped like the matching HTTP endpoint's payload
    #[arg(long)]
    pub(crate) input: PathBuf,
}

pub(crate) async fn run_decide(args: DecideArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let raw = std::fs::read_to_string(&args.input)?;
    let service = build_decision_service(&config, Arc::new(LogOnlySink), PersistMode::Inline);

    let output = decide(&service, args.domain, &raw).await?;
    let rendered =
        serde_json::to_string_pretty(&output).map_err(|err| AppError::Input(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

/// Runs one decision on the synchronous path and returns the endpoint's response body.
pub(crate) async fn decide(
    service: &DecisionService,
    domain: DecisionDomain,
    raw: &str,
) -> Result<Value, AppError> {
    let path = CallPath::Sync;
    match domain {
        DecisionDomain::Fraud => render(service.check_fraud(parse(raw)?, path).await),
        DecisionDomain::Baseline => render(service.fraud_baseline(parse(raw)?, path).await),
        DecisionDomain::Match => render(service.rank_matches(parse(raw)?, path).await),
        DecisionDomain::Scope => render(service.analyze_scope(parse(raw)?, path).await),
        DecisionDomain::Verification => render(service.verify(parse(raw)?, path).await),
        DecisionDomain::Profile => render(service.enrich_profile(parse(raw)?, path).await),
    }
}

fn parse<T: DeserializeOwned>(raw: &str) -> Result<T, AppError> {
    serde_json::from_str(raw).map_err(|err| AppError::Input(format!("request body: {err}")))
}

fn render<T, E>(result: Result<T, E>) -> Result<Value, AppError>
where
    T: Serialize,
    E: std::fmt::Display,
{
    let body = result.map_err(|err| AppError::Input(err.to_string()))?;
    serde_json::to_value(body).map_err(|err| AppError::Input(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_only() -> Arc<DecisionService> {
        let config = AppConfig::from_lookup(|key| match key {
            "AI_ENABLED" => Some("false".to_string()),
            _ => None,
        })
        .expect("default config");
        build_decision_service(&config, Arc::new(LogOnlySink), PersistMode::Inline)
    }

    #[tokio::test]
    async fn scope_decision_prints_the_endpoint_shape() {
        let raw = r#"{"job_id":"j-9","title":"Landing page","description":"Responsive landing page with a contact form","budget_max":1500}"#;

        let body = decide(&rules_only(), DecisionDomain::Scope, raw)
            .await
            .expect("scope decided");

        assert_eq!(body["job_id"], "j-9");
        assert!(body["milestones"].as_array().is_some_and(|m| !m.is_empty()));
        assert_eq!(body["model_version"], "scope-v1.0.0");
    }

    #[tokio::test]
    async fn baseline_flags_disposable_numeric_addresses() {
        let raw = r#"{"user_id":"u-1","email":"12345678@mailinator.com","role":"client"}"#;

        let body = decide(&rules_only(), DecisionDomain::Baseline, raw)
            .await
            .expect("baseline decided");

        assert_eq!(body["risk_tier"], "high");
        assert_eq!(body["model_name"], "fraud-baseline");
    }

    #[tokio::test]
    async fn malformed_input_and_validation_failures_are_input_errors() {
        let service = rules_only();

        let garbage = decide(&service, DecisionDomain::Fraud, "{").await;
        assert!(matches!(garbage, Err(AppError::Input(_))));

        let blank = decide(
            &service,
            DecisionDomain::Fraud,
            r#"{"account_id":" ","entity_type":"proposal"}"#,
        )
        .await;
        assert!(matches!(blank, Err(AppError::Input(reason)) if reason.contains("account_id")));
    }
}
