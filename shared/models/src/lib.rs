pub mod issue;
pub mod metrics;
pub mod optimization;
pub mod status;
pub mod testing;

pub use issue::{Issue, RecoveryRecord, RecoveryStrategy};
pub use metrics::{health_score, DiskUsage, HealthStatus, MetricsSnapshot, SystemReading};
pub use optimization::{
    OptimizationOpportunity, OptimizationReport, OptimizationResult, OptimizationType,
};
pub use status::EngineStatus;
pub use testing::{TestResult, TestSummary};
