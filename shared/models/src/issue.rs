use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::{HealthStatus, MetricsSnapshot};

/// Recovery strategies the engine can dispatch. Escalate has no automated
/// effect; it only notifies an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Restart,
    Rollback,
    CacheClear,
    MemoryRelease,
    Reindex,
    Repair,
    Escalate,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Restart => "restart",
            RecoveryStrategy::Rollback => "rollback",
            RecoveryStrategy::CacheClear => "cache_clear",
            RecoveryStrategy::MemoryRelease => "memory_release",
            RecoveryStrategy::Reindex => "reindex",
            RecoveryStrategy::Repair => "repair",
            RecoveryStrategy::Escalate => "escalate",
        }
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnosed health problem. Created by the evaluator, then owned by the
/// recovery path: attempted up to the configured ceiling, after which it is
/// either resolved or flagged unrecoverable and escalated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub component: String,
    pub severity: HealthStatus,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
    pub suggested_recovery: RecoveryStrategy,
    pub auto_recoverable: bool,
    pub recovery_attempts: u32,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    /// Terminal for automation: once escalated, the engine stops retrying.
    pub escalated: bool,
}

impl Issue {
    pub fn new(
        prefix: &str,
        component: impl Into<String>,
        severity: HealthStatus,
        description: impl Into<String>,
        metrics: MetricsSnapshot,
        suggested_recovery: RecoveryStrategy,
        auto_recoverable: bool,
    ) -> Self {
        Self {
            id: format!("{}_{}", prefix, Uuid::new_v4()),
            component: component.into(),
            severity,
            description: description.into(),
            detected_at: Utc::now(),
            metrics,
            suggested_recovery,
            auto_recoverable,
            recovery_attempts: 0,
            resolved_at: None,
            resolution: None,
            escalated: false,
        }
    }

    /// Stable identity for dedup across diagnosis cycles: the same
    /// component degrading the same way maps to one open issue.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.component, self.suggested_recovery)
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Append-only record of a completed recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub issue_id: String,
    pub strategy: RecoveryStrategy,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot::new(50.0, 50.0, 50.0, 100.0, 0.0, 100.0, 1)
    }

    #[test]
    fn test_new_issue_starts_open() {
        let issue = Issue::new(
            "cpu",
            "system",
            HealthStatus::Critical,
            "High CPU usage: 96.0%",
            snapshot(),
            RecoveryStrategy::Restart,
            true,
        );
        assert!(issue.id.starts_with("cpu_"));
        assert!(issue.is_open());
        assert_eq!(issue.recovery_attempts, 0);
        assert!(issue.resolution.is_none());
    }

    #[test]
    fn test_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&RecoveryStrategy::CacheClear).unwrap(),
            "\"cache_clear\""
        );
        assert_eq!(
            serde_json::to_string(&RecoveryStrategy::MemoryRelease).unwrap(),
            "\"memory_release\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn test_fingerprint_tracks_component_and_strategy() {
        let a = Issue::new(
            "mem",
            "system",
            HealthStatus::Degraded,
            "a",
            snapshot(),
            RecoveryStrategy::MemoryRelease,
            true,
        );
        let b = Issue::new(
            "mem",
            "system",
            HealthStatus::Critical,
            "b",
            snapshot(),
            RecoveryStrategy::MemoryRelease,
            true,
        );
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = Issue::new(
            "disk",
            "system",
            HealthStatus::Critical,
            "c",
            snapshot(),
            RecoveryStrategy::CacheClear,
            true,
        );
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
