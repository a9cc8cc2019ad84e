use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use vigil_models::{
    DiskUsage, MetricsSnapshot, OptimizationOpportunity, OptimizationReport, OptimizationResult,
    OptimizationType,
};

use crate::sources::{CommandExecutor, ComponentLocks, MetricsSource, SourceError};

/// Historical resource-pattern figures for one service.
#[derive(Debug, Clone)]
pub struct ServicePattern {
    pub service: String,
    pub optimization_potential: f64,
    pub potential_savings: f64,
    pub confidence: f64,
}

/// Pluggable source of service tuning candidates. Tuning is never applied
/// automatically, so an analyzer only ever surfaces suggestions.
pub trait ServicePatternAnalyzer: Send + Sync {
    fn analyze(&self) -> Vec<ServicePattern>;
}

/// Capability disabled: no patterns, no tuning suggestions.
pub struct NullPatternAnalyzer;

impl ServicePatternAnalyzer for NullPatternAnalyzer {
    fn analyze(&self) -> Vec<ServicePattern> {
        Vec::new()
    }
}

/// Fixed pattern figures, for tests and hosts without real analysis.
pub struct StaticPatternAnalyzer {
    patterns: Vec<ServicePattern>,
}

impl StaticPatternAnalyzer {
    pub fn new(patterns: Vec<ServicePattern>) -> Self {
        Self { patterns }
    }
}

impl Default for StaticPatternAnalyzer {
    fn default() -> Self {
        Self::new(
            ["nginx", "postgresql", "docker"]
                .into_iter()
                .map(|service| ServicePattern {
                    service: service.to_string(),
                    optimization_potential: 0.3,
                    potential_savings: 20.0,
                    confidence: 0.6,
                })
                .collect(),
        )
    }
}

impl ServicePatternAnalyzer for StaticPatternAnalyzer {
    fn analyze(&self) -> Vec<ServicePattern> {
        self.patterns.clone()
    }
}

/// Everything one scan pass looks at.
pub struct ScanContext {
    pub snapshot: MetricsSnapshot,
    pub disks: Vec<DiskUsage>,
    pub generation_count: u64,
    /// None when no cache pass has ever run.
    pub hours_since_cache_clear: Option<f64>,
    pub forecast: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct ScannerThresholds {
    pub memory_optimize_at: f64,
    pub disk_cleanup_at: f64,
    pub cache_clear_interval_hours: f64,
    pub generation_keep: u64,
    pub forecast_cpu_optimize_at: f64,
    pub pattern_potential_floor: f64,
}

impl Default for ScannerThresholds {
    fn default() -> Self {
        Self {
            memory_optimize_at: 70.0,
            disk_cleanup_at: 80.0,
            cache_clear_interval_hours: 24.0,
            generation_keep: 10,
            forecast_cpu_optimize_at: 80.0,
            pattern_potential_floor: 0.5,
        }
    }
}

/// Emits scored preventive opportunities from current state and forecast.
/// Each heuristic is independent.
pub struct OpportunityScanner {
    thresholds: ScannerThresholds,
    analyzer: Arc<dyn ServicePatternAnalyzer>,
}

impl OpportunityScanner {
    pub fn new(thresholds: ScannerThresholds, analyzer: Arc<dyn ServicePatternAnalyzer>) -> Self {
        Self {
            thresholds,
            analyzer,
        }
    }

    pub fn scan(&self, ctx: &ScanContext) -> Vec<OptimizationOpportunity> {
        let t = &self.thresholds;
        let mut opportunities = Vec::new();

        let memory = ctx.snapshot.memory_percent;
        if memory > t.memory_optimize_at {
            opportunities.push(OptimizationOpportunity::new(
                "mem_opt",
                OptimizationType::MemoryManagement,
                ((memory / 10.0) as u8).min(10),
                HashMap::from([("memory_freed_percent".to_string(), 15.0)]),
                0.8,
                format!("Optimize memory usage (currently {:.1}%)", memory),
                vec![
                    "clear_caches".to_string(),
                    "restart_heavy_services".to_string(),
                ],
                true,
            ));
        }

        for disk in &ctx.disks {
            if disk.percent > t.disk_cleanup_at {
                opportunities.push(OptimizationOpportunity::new(
                    "disk_opt",
                    OptimizationType::DiskCleanup,
                    ((disk.percent / 10.0) as u8).min(10),
                    HashMap::from([("disk_freed_gb".to_string(), 5.0)]),
                    0.9,
                    format!("Clean disk {} ({:.1}% full)", disk.mount_point, disk.percent),
                    vec![
                        "clean_logs".to_string(),
                        "clean_cache_dirs".to_string(),
                        "optimize_store".to_string(),
                    ],
                    disk.mount_point != "/",
                ));
            }
        }

        if ctx.generation_count > t.generation_keep * 2 {
            let reclaimable =
                (ctx.generation_count.saturating_sub(t.generation_keep)) as f64 * 0.5;
            opportunities.push(OptimizationOpportunity::new(
                "gen_cleanup",
                OptimizationType::GenerationCleanup,
                5,
                HashMap::from([("disk_freed_gb".to_string(), reclaimable)]),
                0.95,
                format!(
                    "Clean old system generations ({} found)",
                    ctx.generation_count
                ),
                vec!["remove_old_generations".to_string()],
                true,
            ));
        }

        let cache_due = match ctx.hours_since_cache_clear {
            None => true,
            Some(hours) => hours > t.cache_clear_interval_hours,
        };
        if cache_due {
            opportunities.push(OptimizationOpportunity::new(
                "cache_opt",
                OptimizationType::CacheOptimization,
                3,
                HashMap::from([("performance_improvement".to_string(), 10.0)]),
                0.7,
                "Periodic cache optimization",
                vec![
                    "clear_old_caches".to_string(),
                    "rebuild_cache_index".to_string(),
                ],
                true,
            ));
        }

        for pattern in self.analyzer.analyze() {
            if pattern.optimization_potential > t.pattern_potential_floor {
                opportunities.push(OptimizationOpportunity::new(
                    "svc_tune",
                    OptimizationType::ServiceTuning,
                    (((pattern.optimization_potential * 10.0) as u8).min(10)).max(1),
                    HashMap::from([(
                        "resource_reduction".to_string(),
                        pattern.potential_savings,
                    )]),
                    pattern.confidence,
                    format!("Tune {} service configuration", pattern.service),
                    vec![format!("tune_{}_config", pattern.service)],
                    // Tuning always goes through an operator.
                    false,
                ));
            }
        }

        if let Some(&predicted_cpu) = ctx.forecast.get("cpu") {
            if predicted_cpu > t.forecast_cpu_optimize_at {
                opportunities.push(OptimizationOpportunity::new(
                    "proc_opt",
                    OptimizationType::ProcessOptimization,
                    ((predicted_cpu / 10.0) as u8).min(10),
                    HashMap::from([(
                        "cpu_headroom_percent".to_string(),
                        predicted_cpu - t.forecast_cpu_optimize_at,
                    )]),
                    0.75,
                    format!(
                        "Rebalance workers before CPU saturation (forecast {:.1}%)",
                        predicted_cpu
                    ),
                    vec!["rebalance_workers".to_string()],
                    true,
                ));
            }
        }

        opportunities
    }
}

/// Applies opportunities under the automation gates: safety flag, per-type
/// cooldown, minimum score, and a floor on predicted health so an already
/// failing system is left alone.
pub struct OptimizationApplier {
    executor: Arc<dyn CommandExecutor>,
    metrics_source: Arc<dyn MetricsSource>,
    locks: Arc<ComponentLocks>,
    last_applied: RwLock<HashMap<OptimizationType, DateTime<Utc>>>,
    history: RwLock<VecDeque<OptimizationResult>>,
    cooldown: chrono::Duration,
    min_score: f64,
    min_predicted_health: f64,
    settle: Duration,
    action_timeout: Duration,
    history_size: usize,
}

impl OptimizationApplier {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        metrics_source: Arc<dyn MetricsSource>,
        locks: Arc<ComponentLocks>,
        cooldown: chrono::Duration,
        min_score: f64,
        min_predicted_health: f64,
        settle: Duration,
        action_timeout: Duration,
        history_size: usize,
    ) -> Self {
        Self {
            executor,
            metrics_source,
            locks,
            last_applied: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            cooldown,
            min_score,
            min_predicted_health,
            settle,
            action_timeout,
            history_size,
        }
    }

    pub async fn should_apply(
        &self,
        opportunity: &OptimizationOpportunity,
        predicted_health: f64,
    ) -> bool {
        if !opportunity.safe_to_automate {
            info!(
                opportunity_id = %opportunity.id,
                kind = %opportunity.kind,
                "Optimization requires manual approval"
            );
            return false;
        }

        if let Some(last) = self.last_applied.read().await.get(&opportunity.kind) {
            if Utc::now() - *last < self.cooldown {
                debug!(kind = %opportunity.kind, "Optimization in cooldown");
                return false;
            }
        }

        if opportunity.score() < self.min_score {
            debug!(
                kind = %opportunity.kind,
                score = opportunity.score(),
                "Optimization score below threshold"
            );
            return false;
        }

        if predicted_health < self.min_predicted_health {
            warn!(
                predicted_health,
                "System health too low for optimization"
            );
            return false;
        }

        true
    }

    /// Best-effort application: one failing action marks the result failed
    /// but later actions still run, and the cooldown advances either way
    /// so a broken action cannot retry in a tight loop.
    pub async fn apply(
        &self,
        opportunity: &OptimizationOpportunity,
    ) -> Result<OptimizationResult, SourceError> {
        info!(
            opportunity_id = %opportunity.id,
            kind = %opportunity.kind,
            "Applying optimization: {}",
            opportunity.description
        );

        let started = Instant::now();
        let before = MetricsSnapshot::from_reading(&self.metrics_source.sample().await?);

        let mut success = true;
        let mut error: Option<String> = None;
        {
            let _guard = self.locks.acquire(opportunity.kind.as_str()).await;
            let params = json!({
                "opportunity": opportunity.id,
                "kind": opportunity.kind.as_str(),
            });

            for action in &opportunity.actions {
                match timeout(self.action_timeout, self.executor.execute(action, &params)).await {
                    Ok(Ok(outcome)) if outcome.success => {}
                    Ok(Ok(outcome)) => {
                        success = false;
                        warn!(action = %action, output = %outcome.output, "Optimization action failed");
                        error.get_or_insert(format!("{}: {}", action, outcome.output));
                    }
                    Ok(Err(err)) => {
                        success = false;
                        warn!(action = %action, error = %err, "Optimization action errored");
                        error.get_or_insert(format!("{}: {}", action, err));
                    }
                    Err(_) => {
                        success = false;
                        warn!(action = %action, "Optimization action timed out");
                        error.get_or_insert(format!("{}: timed out", action));
                    }
                }
            }
        }

        // Cooldown advances even on failure.
        self.last_applied
            .write()
            .await
            .insert(opportunity.kind, Utc::now());

        tokio::time::sleep(self.settle).await;
        let after = match self.metrics_source.sample().await {
            Ok(reading) => MetricsSnapshot::from_reading(&reading),
            Err(err) => {
                success = false;
                error.get_or_insert(format!("post-measurement failed: {}", err));
                before.clone()
            }
        };

        let result = OptimizationResult {
            opportunity_id: opportunity.id.clone(),
            kind: opportunity.kind,
            success,
            actual_benefit: compute_benefit(&before, &after),
            metrics_before: before,
            metrics_after: after,
            duration_seconds: started.elapsed().as_secs_f64(),
            rolled_back: false,
            error,
            finished_at: Utc::now(),
        };

        if result.success {
            info!(
                opportunity_id = %result.opportunity_id,
                benefit = ?result.actual_benefit,
                "Optimization succeeded"
            );
        } else {
            warn!(
                opportunity_id = %result.opportunity_id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Optimization failed"
            );
        }

        let mut history = self.history.write().await;
        history.push_back(result.clone());
        if history.len() > self.history_size {
            history.pop_front();
        }

        Ok(result)
    }

    pub async fn hours_since_applied(&self, kind: OptimizationType) -> Option<f64> {
        self.last_applied
            .read()
            .await
            .get(&kind)
            .map(|last| (Utc::now() - *last).num_seconds() as f64 / 3600.0)
    }

    pub async fn optimizations_applied(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn report(&self, hours: i64) -> OptimizationReport {
        let history = self.history.read().await;
        let recent: Vec<OptimizationResult> = history
            .iter()
            .filter(|result| result.finished_within(hours))
            .cloned()
            .collect();
        let successful = recent.iter().filter(|result| result.success).count();
        let total = recent.len();

        OptimizationReport {
            period_hours: hours,
            total,
            successful,
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
            recent: recent.into_iter().rev().take(10).collect(),
        }
    }
}

/// Per-resource improvement between the before and after snapshots. Only
/// actual improvements are reported.
fn compute_benefit(before: &MetricsSnapshot, after: &MetricsSnapshot) -> HashMap<String, f64> {
    let mut benefit = HashMap::new();
    let freed_memory = before.memory_percent - after.memory_percent;
    if freed_memory > 0.0 {
        benefit.insert("memory_freed_percent".to_string(), freed_memory);
    }
    let freed_disk = before.disk_percent - after.disk_percent;
    if freed_disk > 0.0 {
        benefit.insert("disk_freed_percent".to_string(), freed_disk);
    }
    let freed_cpu = before.cpu_percent - after.cpu_percent;
    if freed_cpu > 0.0 {
        benefit.insert("cpu_freed_percent".to_string(), freed_cpu);
    }
    let faster = before.response_time_ms - after.response_time_ms;
    if faster > 0.0 {
        benefit.insert("response_time_improvement_ms".to_string(), faster);
    }
    benefit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{RecordingCommandExecutor, SimulatedMetricsSource};
    use vigil_models::SystemReading;

    fn snapshot(memory: f64, disk: f64) -> MetricsSnapshot {
        MetricsSnapshot::new(30.0, memory, disk, 200.0, 0.0, 100.0, 10)
    }

    fn context(memory: f64, disks: Vec<DiskUsage>) -> ScanContext {
        ScanContext {
            snapshot: snapshot(memory, disks.first().map(|d| d.percent).unwrap_or(50.0)),
            disks,
            generation_count: 0,
            hours_since_cache_clear: Some(1.0),
            forecast: HashMap::new(),
        }
    }

    fn scanner() -> OpportunityScanner {
        OpportunityScanner::new(ScannerThresholds::default(), Arc::new(NullPatternAnalyzer))
    }

    fn applier(executor: Arc<RecordingCommandExecutor>) -> OptimizationApplier {
        let source = Arc::new(SimulatedMetricsSource::with_reading(SystemReading {
            cpu_percent: 30.0,
            memory_percent: 75.0,
            disks: vec![DiskUsage {
                mount_point: "/".to_string(),
                percent: 50.0,
            }],
            response_time_ms: 200.0,
            error_rate: 0.0,
            throughput: 100.0,
            active_users: 10,
        }));
        OptimizationApplier::new(
            executor,
            source,
            Arc::new(ComponentLocks::new()),
            chrono::Duration::hours(1),
            3.0,
            40.0,
            Duration::from_millis(0),
            Duration::from_secs(5),
            100,
        )
    }

    fn memory_opportunity() -> OptimizationOpportunity {
        OptimizationOpportunity::new(
            "mem_opt",
            OptimizationType::MemoryManagement,
            8,
            HashMap::new(),
            0.8,
            "free memory",
            vec!["clear_caches".to_string()],
            true,
        )
    }

    #[test]
    fn test_memory_heuristic() {
        let opportunities = scanner().scan(&context(75.0, vec![]));
        let mem: Vec<_> = opportunities
            .iter()
            .filter(|o| o.kind == OptimizationType::MemoryManagement)
            .collect();
        assert_eq!(mem.len(), 1);
        assert_eq!(mem[0].priority, 7);
        assert!((mem[0].confidence - 0.8).abs() < 1e-9);
        assert!(mem[0].safe_to_automate);
    }

    #[test]
    fn test_root_mount_is_never_safe_to_automate() {
        let opportunities = scanner().scan(&context(
            30.0,
            vec![
                DiskUsage {
                    mount_point: "/".to_string(),
                    percent: 85.0,
                },
                DiskUsage {
                    mount_point: "/data".to_string(),
                    percent: 85.0,
                },
            ],
        ));
        let disks: Vec<_> = opportunities
            .iter()
            .filter(|o| o.kind == OptimizationType::DiskCleanup)
            .collect();
        assert_eq!(disks.len(), 2);
        let root = disks.iter().find(|o| o.description.contains("/ ")).unwrap();
        let data = disks.iter().find(|o| o.description.contains("/data")).unwrap();
        assert!(!root.safe_to_automate);
        assert!(data.safe_to_automate);
    }

    #[test]
    fn test_generation_cleanup_needs_double_retention() {
        let mut ctx = context(30.0, vec![]);
        ctx.generation_count = 20;
        assert!(!scanner()
            .scan(&ctx)
            .iter()
            .any(|o| o.kind == OptimizationType::GenerationCleanup));

        ctx.generation_count = 21;
        let opportunities = scanner().scan(&ctx);
        let gen = opportunities
            .iter()
            .find(|o| o.kind == OptimizationType::GenerationCleanup)
            .unwrap();
        assert_eq!(gen.priority, 5);
        assert!((gen.confidence - 0.95).abs() < 1e-9);
        assert!((gen.estimated_benefit["disk_freed_gb"] - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_cache_heuristic_interval() {
        let mut ctx = context(30.0, vec![]);
        assert!(!scanner()
            .scan(&ctx)
            .iter()
            .any(|o| o.kind == OptimizationType::CacheOptimization));

        ctx.hours_since_cache_clear = None;
        assert!(scanner()
            .scan(&ctx)
            .iter()
            .any(|o| o.kind == OptimizationType::CacheOptimization));

        ctx.hours_since_cache_clear = Some(25.0);
        assert!(scanner()
            .scan(&ctx)
            .iter()
            .any(|o| o.kind == OptimizationType::CacheOptimization));
    }

    #[test]
    fn test_service_tuning_requires_approval() {
        let analyzer = StaticPatternAnalyzer::new(vec![ServicePattern {
            service: "postgresql".to_string(),
            optimization_potential: 0.7,
            potential_savings: 25.0,
            confidence: 0.65,
        }]);
        let scanner = OpportunityScanner::new(ScannerThresholds::default(), Arc::new(analyzer));
        let opportunities = scanner.scan(&context(30.0, vec![]));
        let tuning = opportunities
            .iter()
            .find(|o| o.kind == OptimizationType::ServiceTuning)
            .unwrap();
        assert!(!tuning.safe_to_automate);
        assert_eq!(tuning.priority, 7);
    }

    #[test]
    fn test_forecast_heuristic_emits_process_optimization() {
        let mut ctx = context(30.0, vec![]);
        ctx.forecast.insert("cpu".to_string(), 88.0);
        let opportunities = scanner().scan(&ctx);
        let proc = opportunities
            .iter()
            .find(|o| o.kind == OptimizationType::ProcessOptimization)
            .unwrap();
        assert_eq!(proc.priority, 8);
        assert_eq!(proc.actions, vec!["rebalance_workers".to_string()]);
    }

    #[tokio::test]
    async fn test_score_gating() {
        let applier = applier(Arc::new(RecordingCommandExecutor::succeeding()));

        let mut weak = memory_opportunity();
        weak.priority = 2;
        weak.confidence = 0.5;
        assert!(!applier.should_apply(&weak, 90.0).await);

        let mut eligible = memory_opportunity();
        eligible.priority = 6;
        eligible.confidence = 0.6;
        assert!(applier.should_apply(&eligible, 90.0).await);
    }

    #[tokio::test]
    async fn test_unsafe_and_unhealthy_are_refused() {
        let applier = applier(Arc::new(RecordingCommandExecutor::succeeding()));

        let mut unsafe_opportunity = memory_opportunity();
        unsafe_opportunity.safe_to_automate = false;
        assert!(!applier.should_apply(&unsafe_opportunity, 90.0).await);

        // Predicted health below the floor refuses even a good candidate.
        assert!(!applier.should_apply(&memory_opportunity(), 39.0).await);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_application() {
        let executor = Arc::new(RecordingCommandExecutor::succeeding());
        let applier = applier(executor.clone());
        let opportunity = memory_opportunity();

        assert!(applier.should_apply(&opportunity, 90.0).await);
        applier.apply(&opportunity).await.unwrap();
        assert!(!applier.should_apply(&opportunity, 90.0).await);
        assert_eq!(executor.call_count("clear_caches"), 1);
    }

    #[tokio::test]
    async fn test_cooldown_advances_on_failed_apply() {
        let executor = Arc::new(RecordingCommandExecutor::failing());
        let applier = applier(executor);
        let opportunity = memory_opportunity();

        let result = applier.apply(&opportunity).await.unwrap();
        assert!(!result.success);
        assert!(result.error.is_some());
        // Failure still arms the cooldown.
        assert!(!applier.should_apply(&opportunity, 90.0).await);
    }

    #[tokio::test]
    async fn test_failed_action_does_not_abort_rest() {
        let executor = Arc::new(RecordingCommandExecutor::succeeding());
        executor.set_outcome("clear_caches", false);
        let applier = applier(executor.clone());

        let mut opportunity = memory_opportunity();
        opportunity.actions = vec![
            "clear_caches".to_string(),
            "restart_heavy_services".to_string(),
        ];
        let result = applier.apply(&opportunity).await.unwrap();
        assert!(!result.success);
        assert!(!result.rolled_back);
        // The second action still ran.
        assert_eq!(executor.call_count("restart_heavy_services"), 1);
    }

    #[tokio::test]
    async fn test_report_rollup() {
        let applier = applier(Arc::new(RecordingCommandExecutor::succeeding()));
        applier.apply(&memory_opportunity()).await.unwrap();

        let report = applier.report(24).await;
        assert_eq!(report.total, 1);
        assert_eq!(report.successful, 1);
        assert!((report.success_rate - 1.0).abs() < 1e-9);
        assert_eq!(report.recent.len(), 1);
    }

    #[test]
    fn test_benefit_only_counts_improvements() {
        let before = MetricsSnapshot::new(50.0, 80.0, 70.0, 400.0, 0.0, 100.0, 10);
        let after = MetricsSnapshot::new(55.0, 65.0, 70.0, 300.0, 0.0, 100.0, 10);
        let benefit = compute_benefit(&before, &after);
        assert!((benefit["memory_freed_percent"] - 15.0).abs() < 1e-9);
        assert!((benefit["response_time_improvement_ms"] - 100.0).abs() < 1e-9);
        // CPU got worse and disk is unchanged, so neither is reported.
        assert!(!benefit.contains_key("cpu_freed_percent"));
        assert!(!benefit.contains_key("disk_freed_percent"));
    }
}
