use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use vigil_models::{Issue, MetricsSnapshot};

use crate::config::EngineConfig;
use crate::services::health::{HealthEvaluator, HealthThresholds};
use crate::services::notifications::EscalationNotifier;
use crate::services::optimizer::{
    OpportunityScanner, OptimizationApplier, ScannerThresholds, ServicePatternAnalyzer,
};
use crate::services::prediction::TrendPredictor;
use crate::services::recovery::RecoveryExecutor;
use crate::services::testing::RegressionTestRunner;
use crate::sources::{CommandExecutor, ComponentLocks, MetricsSource};

/// Shared engine state: service instances plus the collections the
/// periodic tasks mutate. Built once and injected into the orchestrator;
/// there is no global instance.
pub struct EngineState {
    pub config: EngineConfig,
    pub metrics_source: Arc<dyn MetricsSource>,
    pub command_executor: Arc<dyn CommandExecutor>,
    pub notifier: Arc<EscalationNotifier>,

    // Service instances
    pub evaluator: HealthEvaluator,
    pub recovery: RecoveryExecutor,
    pub predictor: TrendPredictor,
    pub scanner: OpportunityScanner,
    pub applier: OptimizationApplier,
    pub test_runner: RegressionTestRunner,

    // Shared mutable state, guarded per collection
    pub issues: RwLock<HashMap<String, Issue>>,
    pub current: RwLock<Option<MetricsSnapshot>>,
    pub last_check: RwLock<DateTime<Utc>>,
}

impl EngineState {
    pub fn new(
        config: EngineConfig,
        metrics_source: Arc<dyn MetricsSource>,
        command_executor: Arc<dyn CommandExecutor>,
        pattern_analyzer: Arc<dyn ServicePatternAnalyzer>,
        notifier: Arc<EscalationNotifier>,
    ) -> Arc<Self> {
        let locks = Arc::new(ComponentLocks::new());
        let action_timeout = Duration::from_secs(config.action_timeout_secs);

        let recovery = RecoveryExecutor::new(
            command_executor.clone(),
            notifier.clone(),
            locks.clone(),
            config.max_recovery_attempts,
            action_timeout,
            config.result_history_size,
        );

        let scanner = OpportunityScanner::new(
            ScannerThresholds {
                memory_optimize_at: config.memory_optimize_at,
                disk_cleanup_at: config.disk_cleanup_at,
                cache_clear_interval_hours: config.cache_clear_interval_hours,
                generation_keep: config.generation_keep,
                ..ScannerThresholds::default()
            },
            pattern_analyzer,
        );

        let applier = OptimizationApplier::new(
            command_executor.clone(),
            metrics_source.clone(),
            locks,
            chrono::Duration::seconds(config.optimization_cooldown_secs),
            config.min_opportunity_score,
            config.min_predicted_health,
            Duration::from_secs(config.settle_secs),
            action_timeout,
            config.result_history_size,
        );

        Arc::new(Self {
            evaluator: HealthEvaluator::new(HealthThresholds::default()),
            recovery,
            predictor: TrendPredictor::new(config.metrics_history_size),
            scanner,
            applier,
            test_runner: RegressionTestRunner::new(config.test_history_size),
            issues: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            last_check: RwLock::new(Utc::now()),
            metrics_source,
            command_executor,
            notifier,
            config,
        })
    }
}
