use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use vigil_models::{EngineStatus, HealthStatus, MetricsSnapshot, OptimizationType, SystemReading};

use crate::state::EngineState;

/// Error-rate floor applied once the test loop reports a sustained
/// suite-wide failure streak. Just above the diagnosis threshold, so the
/// evaluator opens a rollback-class issue.
const SUITE_FAILURE_ERROR_FLOOR: f64 = 0.06;
const SUITE_FAILURE_STREAK: u32 = 3;

impl EngineState {
    /// One monitoring pass: sample, diagnose, then at most one recovery
    /// attempt per open issue. A failed sample skips the pass without
    /// touching any state.
    pub async fn monitoring_cycle(&self) {
        let mut reading = match self.metrics_source.sample().await {
            Ok(reading) => reading,
            Err(err) => {
                warn!(error = %err, "Metrics sampling failed; skipping cycle");
                return;
            }
        };
        self.apply_test_signal(&mut reading);

        let snapshot = MetricsSnapshot::from_reading(&reading);
        self.predictor.record(snapshot.clone()).await;
        *self.current.write().await = Some(snapshot.clone());
        *self.last_check.write().await = Utc::now();

        let cpu_trend = self.predictor.trend_for("cpu").await;
        let memory_trend = self.predictor.trend_for("memory").await;
        debug!(
            health_score = snapshot.health_score,
            status = %snapshot.status(),
            cpu_trend = ?cpu_trend,
            memory_trend = ?memory_trend,
            "Monitoring cycle"
        );

        // Diagnose, deduping against issues that are already open.
        let diagnosed = self.evaluator.evaluate(&snapshot, &self.config.component);
        let open_ids: Vec<String> = {
            let mut issues = self.issues.write().await;
            let open_fingerprints: Vec<String> = issues
                .values()
                .filter(|issue| issue.is_open())
                .map(|issue| issue.fingerprint())
                .collect();
            for issue in diagnosed {
                if open_fingerprints.contains(&issue.fingerprint()) {
                    continue;
                }
                warn!(
                    issue_id = %issue.id,
                    severity = %issue.severity,
                    description = %issue.description,
                    "Issue detected"
                );
                issues.insert(issue.id.clone(), issue);
            }
            issues
                .values()
                .filter(|issue| issue.is_open() && !issue.escalated)
                .map(|issue| issue.id.clone())
                .collect()
        };

        // Exactly one attempt per open issue per cycle. Each issue is taken
        // out of the map for the duration of its attempt so the lock is not
        // held across command execution.
        for id in open_ids {
            let Some(mut issue) = self.issues.write().await.remove(&id) else {
                continue;
            };
            let _ = self.recovery.attempt_recovery(&mut issue).await;
            self.issues.write().await.insert(issue.id.clone(), issue);
        }
    }

    /// Sustained suite-wide test failures are treated as elevated error
    /// rate so the next diagnosis pass surfaces them.
    fn apply_test_signal(&self, reading: &mut SystemReading) {
        let streak = self.test_runner.consecutive_failures();
        if streak >= SUITE_FAILURE_STREAK && reading.error_rate < SUITE_FAILURE_ERROR_FLOOR {
            debug!(streak, "Raising error rate floor from test failures");
            reading.error_rate = SUITE_FAILURE_ERROR_FLOOR;
        }
    }

    /// One optimization pass: forecast, scan, then apply the best few
    /// candidates that pass the automation gates.
    pub async fn optimization_cycle(&self) {
        let reading = match self.metrics_source.sample().await {
            Ok(reading) => reading,
            Err(err) => {
                warn!(error = %err, "Metrics sampling failed; skipping optimization cycle");
                return;
            }
        };
        let snapshot = MetricsSnapshot::from_reading(&reading);

        let horizon = self.config.forecast_horizon_minutes;
        let forecast = self.predictor.predict(horizon).await;
        let predicted_health = self.predictor.predict_health_score(horizon).await;

        let generation_count = match self
            .command_executor
            .execute("count_generations", &json!({}))
            .await
        {
            Ok(outcome) if outcome.success => outcome
                .output
                .lines()
                .filter(|line| !line.trim().is_empty())
                .count() as u64,
            _ => 0,
        };

        let ctx = crate::services::optimizer::ScanContext {
            snapshot,
            disks: reading.disks,
            generation_count,
            hours_since_cache_clear: self
                .applier
                .hours_since_applied(OptimizationType::CacheOptimization)
                .await,
            forecast,
        };

        let mut opportunities = self.scanner.scan(&ctx);
        opportunities.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for opportunity in opportunities
            .into_iter()
            .take(self.config.top_opportunities_per_cycle)
        {
            if self.applier.should_apply(&opportunity, predicted_health).await {
                if let Err(err) = self.applier.apply(&opportunity).await {
                    warn!(
                        opportunity_id = %opportunity.id,
                        error = %err,
                        "Optimization aborted before any action ran"
                    );
                }
            }
        }
    }

    /// One continuous-testing pass over every registered suite.
    pub async fn testing_cycle(&self) {
        let results = self.test_runner.run_cycle().await;
        if !results.is_empty() {
            debug!(
                executed = results.len(),
                failed = results.iter().filter(|r| !r.passed).count(),
                "Testing cycle"
            );
        }
    }

    /// Long-interval trim: resolved issues age out after a day, escalated
    /// ones after a week. Bounded histories take care of themselves.
    pub async fn housekeeping_cycle(&self) {
        let now = Utc::now();
        let resolved_cutoff = chrono::Duration::hours(self.config.resolved_retention_hours);
        let escalated_cutoff = chrono::Duration::hours(self.config.escalated_retention_hours);

        let mut issues = self.issues.write().await;
        let before = issues.len();
        issues.retain(|_, issue| {
            if let Some(resolved_at) = issue.resolved_at {
                return now - resolved_at <= resolved_cutoff;
            }
            if issue.escalated {
                return now - issue.detected_at <= escalated_cutoff;
            }
            true
        });
        let dropped = before - issues.len();
        if dropped > 0 {
            debug!(dropped, "Housekeeping trimmed settled issues");
        }
    }

    pub async fn status(&self, monitoring_active: bool) -> EngineStatus {
        let current = self.current.read().await.clone();
        let (health_score, cpu, memory, disk, health_status) = match &current {
            Some(snapshot) => (
                snapshot.health_score,
                snapshot.cpu_percent,
                snapshot.memory_percent,
                snapshot.disk_percent,
                snapshot.status(),
            ),
            None => (100.0, 0.0, 0.0, 0.0, HealthStatus::Good),
        };

        EngineStatus {
            health_status,
            health_score,
            monitoring_active,
            last_check: *self.last_check.read().await,
            cpu_percent: cpu,
            memory_percent: memory,
            disk_percent: disk,
            active_issues: self
                .issues
                .read()
                .await
                .values()
                .filter(|issue| issue.is_open())
                .count(),
            recoveries_performed: self.recovery.recoveries_performed().await,
            optimizations_applied: self.applier.optimizations_applied().await,
            test_summary: self.test_runner.summary().await,
            predictions: self
                .predictor
                .predict(self.config.forecast_horizon_minutes)
                .await,
        }
    }
}

/// Owns the periodic tasks. Each loop checks the shutdown signal at the
/// top of its body; in-flight work always finishes so the system is never
/// left half-remediated.
pub struct Orchestrator {
    state: Arc<EngineState>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(state: Arc<EngineState>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state,
            shutdown,
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let config = &self.state.config;
        let mut handles = self.handles.lock().await;
        handles.push(self.spawn_periodic(
            "monitoring",
            Duration::from_secs(config.check_interval_secs),
            |state| async move { state.monitoring_cycle().await },
        ));
        handles.push(self.spawn_periodic(
            "optimization",
            Duration::from_secs(config.optimization_interval_secs),
            |state| async move { state.optimization_cycle().await },
        ));
        handles.push(self.spawn_periodic(
            "testing",
            Duration::from_secs(config.test_interval_secs),
            |state| async move { state.testing_cycle().await },
        ));
        handles.push(self.spawn_periodic(
            "housekeeping",
            Duration::from_secs(config.housekeeping_interval_secs),
            |state| async move { state.housekeeping_cycle().await },
        ));

        info!(
            check_interval_secs = config.check_interval_secs,
            optimization_interval_secs = config.optimization_interval_secs,
            test_interval_secs = config.test_interval_secs,
            "Self-healing engine started"
        );
    }

    fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, body: F) -> JoinHandle<()>
    where
        F: Fn(Arc<EngineState>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => {}
                }
                if *shutdown.borrow() {
                    debug!(task = name, "Periodic task stopping");
                    break;
                }
                body(Arc::clone(&state)).await;
            }
        })
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("Self-healing engine stopped");
    }

    pub async fn status(&self) -> EngineStatus {
        self.state.status(self.running.load(Ordering::SeqCst)).await
    }
}
