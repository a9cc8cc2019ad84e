use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::MetricsSnapshot;

/// Closed set of proactive optimization kinds. Exhaustive matches keep a
/// new kind from silently falling through the applier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationType {
    MemoryManagement,
    CacheOptimization,
    ServiceTuning,
    DiskCleanup,
    ProcessOptimization,
    NetworkTuning,
    GenerationCleanup,
    StoreOptimization,
}

impl OptimizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationType::MemoryManagement => "memory_management",
            OptimizationType::CacheOptimization => "cache_optimization",
            OptimizationType::ServiceTuning => "service_tuning",
            OptimizationType::DiskCleanup => "disk_cleanup",
            OptimizationType::ProcessOptimization => "process_optimization",
            OptimizationType::NetworkTuning => "network_tuning",
            OptimizationType::GenerationCleanup => "generation_cleanup",
            OptimizationType::StoreOptimization => "store_optimization",
        }
    }
}

impl std::fmt::Display for OptimizationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A preventive improvement candidate, distinct from a reactive issue.
/// Created fresh each scan cycle, never mutated, consumed at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOpportunity {
    pub id: String,
    pub kind: OptimizationType,
    /// 1-10, higher is more important.
    pub priority: u8,
    pub estimated_benefit: HashMap<String, f64>,
    pub confidence: f64,
    pub description: String,
    pub actions: Vec<String>,
    pub safe_to_automate: bool,
}

impl OptimizationOpportunity {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        prefix: &str,
        kind: OptimizationType,
        priority: u8,
        estimated_benefit: HashMap<String, f64>,
        confidence: f64,
        description: impl Into<String>,
        actions: Vec<String>,
        safe_to_automate: bool,
    ) -> Self {
        Self {
            id: format!("{}_{}", prefix, Uuid::new_v4()),
            kind,
            priority,
            estimated_benefit,
            confidence,
            description: description.into(),
            actions,
            safe_to_automate,
        }
    }

    pub fn score(&self) -> f64 {
        f64::from(self.priority) * self.confidence
    }
}

/// Append-only outcome of one applied (or attempted) optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub opportunity_id: String,
    pub kind: OptimizationType,
    pub success: bool,
    pub metrics_before: MetricsSnapshot,
    pub metrics_after: MetricsSnapshot,
    pub actual_benefit: HashMap<String, f64>,
    pub duration_seconds: f64,
    pub rolled_back: bool,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl OptimizationResult {
    pub fn finished_within(&self, hours: i64) -> bool {
        Utc::now() - self.finished_at <= chrono::Duration::hours(hours)
    }
}

/// Rollup of recent optimization activity for the reporting surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub period_hours: i64,
    pub total: usize,
    pub successful: usize,
    pub success_rate: f64,
    pub recent: Vec<OptimizationResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_priority_times_confidence() {
        let low = OptimizationOpportunity::new(
            "cache_opt",
            OptimizationType::CacheOptimization,
            2,
            HashMap::new(),
            0.5,
            "periodic cache pass",
            vec!["clear_old_caches".into()],
            true,
        );
        assert!((low.score() - 1.0).abs() < 1e-9);

        let eligible = OptimizationOpportunity::new(
            "mem_opt",
            OptimizationType::MemoryManagement,
            6,
            HashMap::new(),
            0.6,
            "free memory",
            vec!["clear_caches".into()],
            true,
        );
        assert!((eligible.score() - 3.6).abs() < 1e-9);
    }
}
