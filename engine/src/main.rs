use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};

use vigil_config::FeatureToggles;
use vigil_engine::services::{
    EscalationNotifier, NullPatternAnalyzer, Orchestrator, ServicePatternAnalyzer,
    StaticPatternAnalyzer, TestCase,
};
use vigil_engine::sources::{
    AppMetricsFeed, CommandExecutor, MetricsSource, RecordingCommandExecutor,
    ShellCommandExecutor, SysinfoMetricsSource,
};
use vigil_engine::{EngineConfig, EngineState};
use vigil_observability::{init_tracing, TracingConfig};

/// Built-in smoke suite so the regression loop has something to chew on
/// before the host registers its own suites.
fn builtin_suite(metrics_source: Arc<dyn MetricsSource>) -> Vec<TestCase> {
    vec![
        TestCase::new("metrics_source_responds", move || {
            let source = metrics_source.clone();
            async move {
                source
                    .sample()
                    .await
                    .map(|_| ())
                    .map_err(|err| err.to_string())
            }
        }),
        TestCase::new("timer_resolution", || async {
            let start = Instant::now();
            tokio::time::sleep(Duration::from_millis(10)).await;
            if start.elapsed() < Duration::from_millis(5) {
                return Err("timer fired early".to_string());
            }
            Ok(())
        }),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing(TracingConfig::for_service("vigil-engine"));

    info!("Starting Vigil engine...");

    let config = EngineConfig::from_env();
    let toggles = FeatureToggles::from_env_path();

    let feed = Arc::new(AppMetricsFeed::new());
    let metrics_source: Arc<dyn MetricsSource> =
        Arc::new(SysinfoMetricsSource::new(feed.clone()));

    let command_executor: Arc<dyn CommandExecutor> = if toggles.shell_executor_enabled() {
        info!("Shell executor enabled; maintenance actions run against the host");
        Arc::new(ShellCommandExecutor::new(
            config.system_profile_path.clone(),
            config.generation_keep,
            config.log_retention_days,
        ))
    } else {
        warn!("ShellExecutor toggle disabled; maintenance actions are recorded, not executed");
        Arc::new(RecordingCommandExecutor::succeeding())
    };

    let notifier = if toggles.webhook_escalation_enabled() {
        match &config.escalation_webhook_url {
            Some(url) => {
                info!(url = %url, "Escalations will also be delivered by webhook");
                Arc::new(EscalationNotifier::with_webhook(url.clone()))
            }
            None => {
                warn!("WebhookEscalation enabled but no webhook URL configured; using log only");
                Arc::new(EscalationNotifier::log_only())
            }
        }
    } else {
        Arc::new(EscalationNotifier::log_only())
    };

    let pattern_analyzer: Arc<dyn ServicePatternAnalyzer> = if toggles.pattern_analysis_enabled() {
        Arc::new(StaticPatternAnalyzer::default())
    } else {
        Arc::new(NullPatternAnalyzer)
    };

    let state = EngineState::new(
        config,
        metrics_source.clone(),
        command_executor,
        pattern_analyzer,
        notifier,
    );
    state
        .test_runner
        .register_suite("engine_smoke", builtin_suite(metrics_source))
        .await;

    let orchestrator = Orchestrator::new(state);
    orchestrator.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    orchestrator.stop().await;

    let status = orchestrator.status().await;
    info!(
        status = %serde_json::to_string(&status).context("serializing final status")?,
        "Final engine status"
    );

    Ok(())
}
