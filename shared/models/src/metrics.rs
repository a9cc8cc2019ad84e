use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw readings pulled from the metrics source in a single sampling pass.
///
/// Disk usage is kept per mount here; the snapshot collapses it to the
/// fullest mount, while the optimization scanner keeps the full vector to
/// tell root from data mounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disks: Vec<DiskUsage>,
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub throughput: f64,
    pub active_users: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mount_point: String,
    pub percent: f64,
}

impl SystemReading {
    /// Usage of the fullest mount; 0.0 when no disks were reported.
    pub fn worst_disk_percent(&self) -> f64 {
        self.disks
            .iter()
            .map(|d| d.percent)
            .fold(0.0_f64, f64::max)
    }
}

/// Overall health bands, ordered from worst to best so that comparisons
/// follow the score ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Failed,
    Critical,
    Degraded,
    Good,
    Excellent,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthStatus::Excellent
        } else if score >= 75.0 {
            HealthStatus::Good
        } else if score >= 50.0 {
            HealthStatus::Degraded
        } else if score >= 25.0 {
            HealthStatus::Critical
        } else {
            HealthStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Excellent => "excellent",
            HealthStatus::Good => "good",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
            HealthStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weighted-penalty health score, clamped to [0, 100].
pub fn health_score(
    cpu_percent: f64,
    memory_percent: f64,
    disk_percent: f64,
    response_time_ms: f64,
    error_rate: f64,
) -> f64 {
    let mut score = 100.0;
    score -= (cpu_percent - 80.0).max(0.0) * 0.5;
    score -= (memory_percent - 85.0).max(0.0) * 0.8;
    score -= (disk_percent - 90.0).max(0.0) * 1.0;
    score -= ((response_time_ms - 1000.0).max(0.0) / 100.0).min(20.0);
    score -= error_rate * 100.0;
    score.clamp(0.0, 100.0)
}

/// Immutable record of one measurement instant plus its derived health
/// score. The score is computed at construction and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub throughput: f64,
    pub active_users: u64,
    pub health_score: f64,
}

impl MetricsSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cpu_percent: f64,
        memory_percent: f64,
        disk_percent: f64,
        response_time_ms: f64,
        error_rate: f64,
        throughput: f64,
        active_users: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu_percent,
            memory_percent,
            disk_percent,
            response_time_ms,
            error_rate,
            throughput,
            active_users,
            health_score: health_score(
                cpu_percent,
                memory_percent,
                disk_percent,
                response_time_ms,
                error_rate,
            ),
        }
    }

    pub fn from_reading(reading: &SystemReading) -> Self {
        Self::new(
            reading.cpu_percent,
            reading.memory_percent,
            reading.worst_disk_percent(),
            reading.response_time_ms,
            reading.error_rate,
            reading.throughput,
            reading.active_users,
        )
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus::from_score(self.health_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_score_clamped() {
        // Pathological inputs on either side must stay inside [0, 100].
        assert_eq!(health_score(0.0, 0.0, 0.0, 0.0, 0.0), 100.0);
        assert_eq!(health_score(100.0, 100.0, 100.0, 60_000.0, 1.0), 0.0);
        let mid = health_score(85.0, 90.0, 92.0, 1_500.0, 0.02);
        assert!((0.0..=100.0).contains(&mid));
    }

    #[test]
    fn test_health_score_penalties() {
        // cpu 90 -> -5, memory 90 -> -4, response 1500 -> -5, errors 2% -> -2
        let score = health_score(90.0, 90.0, 50.0, 1_500.0, 0.02);
        assert!((score - 84.0).abs() < 1e-9);
    }

    #[test]
    fn test_status_bands() {
        assert_eq!(HealthStatus::from_score(95.0), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_score(90.0), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_score(80.0), HealthStatus::Good);
        assert_eq!(HealthStatus::from_score(60.0), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_score(30.0), HealthStatus::Critical);
        assert_eq!(HealthStatus::from_score(10.0), HealthStatus::Failed);
    }

    #[test]
    fn test_status_ordering() {
        assert!(HealthStatus::Excellent > HealthStatus::Good);
        assert!(HealthStatus::Good > HealthStatus::Degraded);
        assert!(HealthStatus::Degraded > HealthStatus::Critical);
        assert!(HealthStatus::Critical > HealthStatus::Failed);
    }

    #[test]
    fn test_worst_disk_percent() {
        let reading = SystemReading {
            cpu_percent: 10.0,
            memory_percent: 20.0,
            disks: vec![
                DiskUsage {
                    mount_point: "/".into(),
                    percent: 40.0,
                },
                DiskUsage {
                    mount_point: "/data".into(),
                    percent: 91.0,
                },
            ],
            response_time_ms: 100.0,
            error_rate: 0.0,
            throughput: 50.0,
            active_users: 3,
        };
        assert_eq!(reading.worst_disk_percent(), 91.0);
        let snapshot = MetricsSnapshot::from_reading(&reading);
        assert_eq!(snapshot.disk_percent, 91.0);
    }
}
