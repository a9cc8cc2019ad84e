use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::HealthStatus;
use crate::testing::TestSummary;

/// Status surface exposed to whatever hosts the engine. Presentation of
/// this data is out of the engine's hands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub health_status: HealthStatus,
    pub health_score: f64,
    pub monitoring_active: bool,
    pub last_check: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub active_issues: usize,
    pub recoveries_performed: usize,
    pub optimizations_applied: usize,
    pub test_summary: TestSummary,
    /// Forecast per resource name for the configured horizon.
    pub predictions: HashMap<String, f64>,
}
