use tracing::debug;

use vigil_models::{HealthStatus, Issue, MetricsSnapshot, RecoveryStrategy};

/// Static diagnosis thresholds. The defaults match long-observed operating
/// ranges; hosts can override them through [`crate::config::EngineConfig`].
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub cpu_degraded: f64,
    pub cpu_critical: f64,
    pub memory_degraded: f64,
    pub memory_critical: f64,
    pub disk_critical: f64,
    pub response_degraded_ms: f64,
    pub error_degraded: f64,
    pub error_critical: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            cpu_degraded: 90.0,
            cpu_critical: 95.0,
            memory_degraded: 85.0,
            memory_critical: 95.0,
            disk_critical: 90.0,
            response_degraded_ms: 2000.0,
            error_degraded: 0.05,
            error_critical: 0.10,
        }
    }
}

/// Turns a metrics snapshot into zero or more issues. Pure: the only
/// output is the returned issue list.
#[derive(Debug, Clone, Default)]
pub struct HealthEvaluator {
    thresholds: HealthThresholds,
}

impl HealthEvaluator {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    /// Diagnosis rules are independent; one snapshot can yield several
    /// issues. High error rate is the one condition that always needs a
    /// human, so those issues are never auto-recoverable.
    pub fn evaluate(&self, metrics: &MetricsSnapshot, component: &str) -> Vec<Issue> {
        let t = &self.thresholds;
        let mut issues = Vec::new();

        if metrics.cpu_percent > t.cpu_degraded {
            issues.push(Issue::new(
                "cpu",
                component,
                if metrics.cpu_percent > t.cpu_critical {
                    HealthStatus::Critical
                } else {
                    HealthStatus::Degraded
                },
                format!("High CPU usage: {:.1}%", metrics.cpu_percent),
                metrics.clone(),
                RecoveryStrategy::Restart,
                true,
            ));
        }

        if metrics.memory_percent > t.memory_degraded {
            issues.push(Issue::new(
                "memory",
                component,
                if metrics.memory_percent > t.memory_critical {
                    HealthStatus::Critical
                } else {
                    HealthStatus::Degraded
                },
                format!("High memory usage: {:.1}%", metrics.memory_percent),
                metrics.clone(),
                RecoveryStrategy::MemoryRelease,
                true,
            ));
        }

        if metrics.disk_percent > t.disk_critical {
            issues.push(Issue::new(
                "disk",
                component,
                HealthStatus::Critical,
                format!("Low disk space: {:.1}% free", 100.0 - metrics.disk_percent),
                metrics.clone(),
                RecoveryStrategy::CacheClear,
                true,
            ));
        }

        if metrics.response_time_ms > t.response_degraded_ms {
            issues.push(Issue::new(
                "latency",
                component,
                HealthStatus::Degraded,
                format!("Slow response time: {:.0}ms", metrics.response_time_ms),
                metrics.clone(),
                RecoveryStrategy::Reindex,
                true,
            ));
        }

        if metrics.error_rate > t.error_degraded {
            issues.push(Issue::new(
                "errors",
                component,
                if metrics.error_rate > t.error_critical {
                    HealthStatus::Critical
                } else {
                    HealthStatus::Degraded
                },
                format!("High error rate: {:.1}%", metrics.error_rate * 100.0),
                metrics.clone(),
                RecoveryStrategy::Rollback,
                false,
            ));
        }

        if !issues.is_empty() {
            debug!(
                component,
                count = issues.len(),
                health_score = metrics.health_score,
                "Diagnosis produced issues"
            );
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(cpu: f64, memory: f64, disk: f64, response_ms: f64, error_rate: f64) -> MetricsSnapshot {
        MetricsSnapshot::new(cpu, memory, disk, response_ms, error_rate, 100.0, 10)
    }

    #[test]
    fn test_healthy_snapshot_yields_nothing() {
        let evaluator = HealthEvaluator::default();
        let issues = evaluator.evaluate(&snapshot(50.0, 50.0, 50.0, 200.0, 0.0), "system");
        assert!(issues.is_empty());
    }

    #[test]
    fn test_critical_cpu_suggests_restart() {
        let evaluator = HealthEvaluator::default();
        let issues = evaluator.evaluate(&snapshot(96.0, 50.0, 50.0, 200.0, 0.0), "system");
        assert_eq!(issues.len(), 1);
        let issue = &issues[0];
        assert_eq!(issue.severity, HealthStatus::Critical);
        assert_eq!(issue.suggested_recovery, RecoveryStrategy::Restart);
        assert!(issue.auto_recoverable);
    }

    #[test]
    fn test_degraded_cpu_below_critical_band() {
        let evaluator = HealthEvaluator::default();
        let issues = evaluator.evaluate(&snapshot(92.0, 50.0, 50.0, 200.0, 0.0), "system");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, HealthStatus::Degraded);
    }

    #[test]
    fn test_error_rate_issues_never_auto_recover() {
        let evaluator = HealthEvaluator::default();

        for rate in [0.06, 0.2] {
            let issues = evaluator.evaluate(&snapshot(50.0, 50.0, 50.0, 200.0, rate), "system");
            assert_eq!(issues.len(), 1);
            let issue = &issues[0];
            assert_eq!(issue.suggested_recovery, RecoveryStrategy::Rollback);
            assert!(!issue.auto_recoverable);
        }
    }

    #[test]
    fn test_rules_are_independent() {
        let evaluator = HealthEvaluator::default();
        let issues = evaluator.evaluate(&snapshot(96.0, 96.0, 95.0, 2500.0, 0.2), "system");
        assert_eq!(issues.len(), 5);

        let strategies: Vec<_> = issues.iter().map(|i| i.suggested_recovery).collect();
        assert_eq!(
            strategies,
            vec![
                RecoveryStrategy::Restart,
                RecoveryStrategy::MemoryRelease,
                RecoveryStrategy::CacheClear,
                RecoveryStrategy::Reindex,
                RecoveryStrategy::Rollback,
            ]
        );
    }
}
