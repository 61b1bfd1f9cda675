use marketplace_ai::config::{AnalyzerConfig, AppConfig, IngestionConfig};
use marketplace_ai::decision::{
    AiGate, Analyzer, AnalyzerTimeouts, AuditRecorder, AuditSink, DecisionOrchestrator,
    DecisionService, DisabledAnalyzer, HttpAnalyzer, PersistMode,
};
use marketplace_ai::delivery::DeliveryClient;
use marketplace_ai::ingestion::{default_handlers, IngestionSupervisor, PollSettings, PubSubRestQueue};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn build_analyzer(config: &AnalyzerConfig) -> Arc<dyn Analyzer> {
    match &config.endpoint {
        Some(endpoint) => Arc::new(HttpAnalyzer::new(
            endpoint.clone(),
            config.model_name.clone(),
            config.event_timeout,
        )),
        None => {
            if config.enabled {
                warn!("AI enabled without MODEL_ENDPOINT; every decision will use rules");
            }
            Arc::new(DisabledAnalyzer)
        }
    }
}

pub(crate) fn build_decision_service(
    config: &AppConfig,
    sink: Arc<dyn AuditSink>,
    mode: PersistMode,
) -> Arc<DecisionService> {
    let orchestrator = DecisionOrchestrator::new(
        build_analyzer(&config.analyzer),
        AiGate::new(config.analyzer.enabled),
        config.model.version.clone(),
    );
    Arc::new(DecisionService::new(
        orchestrator,
        AuditRecorder::new(sink, mode),
        AnalyzerTimeouts {
            sync: config.analyzer.sync_timeout,
            event: config.analyzer.event_timeout,
        },
        config.model.enforcement_mode.clone(),
    ))
}

/// Starts one subscriber per handler when a queue endpoint is configured.
pub(crate) fn start_ingestion(
    config: &IngestionConfig,
    service: Arc<DecisionService>,
    delivery: Arc<DeliveryClient>,
) -> Option<IngestionSupervisor> {
    let Some(endpoint) = config.endpoint.clone() else {
        info!("no queue endpoint configured, ingestion disabled");
        return None;
    };

    let queue = Arc::new(PubSubRestQueue::new(
        endpoint,
        config.project_id.clone(),
        config.pull_timeout,
    ));
    let supervisor = IngestionSupervisor::start(
        queue,
        default_handlers(service, delivery),
        PollSettings::from_config(config),
        config.shutdown_grace,
    );
    info!(subscriptions = ?supervisor.subscriptions(), "ingestion started");
    Some(supervisor)
}
