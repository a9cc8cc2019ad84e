use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single registered test execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    pub passed: bool,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub error_message: Option<String>,
    pub performance_regression: bool,
}

/// Rollup over the most recent test results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub avg_duration_ms: f64,
    pub regressions: usize,
}

impl TestSummary {
    pub fn from_results<'a>(results: impl Iterator<Item = &'a TestResult>) -> Self {
        let mut summary = TestSummary::default();
        let mut duration_total = 0.0;
        for result in results {
            summary.total += 1;
            if result.passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            if result.performance_regression {
                summary.regressions += 1;
            }
            duration_total += result.duration_ms;
        }
        if summary.total > 0 {
            summary.pass_rate = summary.passed as f64 / summary.total as f64;
            summary.avg_duration_ms = duration_total / summary.total as f64;
        }
        summary
    }
}
