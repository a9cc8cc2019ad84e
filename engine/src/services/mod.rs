pub mod health;
pub mod notifications;
pub mod optimizer;
pub mod orchestration;
pub mod prediction;
pub mod recovery;
pub mod testing;

pub use health::{HealthEvaluator, HealthThresholds};
pub use notifications::{EscalationNotice, EscalationNotifier};
pub use optimizer::{
    NullPatternAnalyzer, OpportunityScanner, OptimizationApplier, ScanContext, ScannerThresholds,
    ServicePattern, ServicePatternAnalyzer, StaticPatternAnalyzer,
};
pub use orchestration::Orchestrator;
pub use prediction::{classify_series, Trend, TrendPredictor};
pub use recovery::RecoveryExecutor;
pub use testing::{RegressionTestRunner, TestCase};
