use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{error, info};

use vigil_models::{TestResult, TestSummary};

/// Summaries cover the most recent results only.
const SUMMARY_WINDOW: usize = 100;
/// A run slower than baseline by this factor counts as a regression.
const REGRESSION_FACTOR: f64 = 1.2;

type TestFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// A named, invokable test unit. The callable reports failure by
/// returning an error; panics are caught and recorded the same way.
#[derive(Clone)]
pub struct TestCase {
    name: String,
    func: TestFn,
}

impl TestCase {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move || func().boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs registered suites, remembers a per-test duration baseline, and
/// flags performance regressions against it.
pub struct RegressionTestRunner {
    suites: RwLock<HashMap<String, Vec<TestCase>>>,
    results: RwLock<VecDeque<TestResult>>,
    baselines: RwLock<HashMap<String, f64>>,
    consecutive_suite_failures: AtomicU32,
    history_size: usize,
}

impl RegressionTestRunner {
    pub fn new(history_size: usize) -> Self {
        Self {
            suites: RwLock::new(HashMap::new()),
            results: RwLock::new(VecDeque::new()),
            baselines: RwLock::new(HashMap::new()),
            consecutive_suite_failures: AtomicU32::new(0),
            history_size,
        }
    }

    pub async fn register_suite(&self, name: impl Into<String>, tests: Vec<TestCase>) {
        self.suites.write().await.insert(name.into(), tests);
    }

    pub async fn suite_names(&self) -> Vec<String> {
        self.suites.read().await.keys().cloned().collect()
    }

    pub async fn run_suite(&self, suite_name: &str) -> Vec<TestResult> {
        let cases = match self.suites.read().await.get(suite_name) {
            Some(cases) => cases.clone(),
            None => {
                error!(suite = suite_name, "Test suite not found");
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(cases.len());
        for case in &cases {
            let result = self.run_single(case).await;
            if !result.passed {
                error!(
                    test = %result.test_name,
                    error = result.error_message.as_deref().unwrap_or("unknown"),
                    "Test failed"
                );
            }
            results.push(result);
        }

        let mut stored = self.results.write().await;
        for result in &results {
            stored.push_back(result.clone());
            if stored.len() > self.history_size {
                stored.pop_front();
            }
        }

        results
    }

    async fn run_single(&self, case: &TestCase) -> TestResult {
        let start = Instant::now();
        let outcome = AssertUnwindSafe((case.func)()).catch_unwind().await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(Ok(())) => {
                let regression = {
                    let mut baselines = self.baselines.write().await;
                    match baselines.get(case.name()) {
                        Some(baseline) => duration_ms > baseline * REGRESSION_FACTOR,
                        None => {
                            // First run seeds the baseline.
                            baselines.insert(case.name().to_string(), duration_ms);
                            false
                        }
                    }
                };
                TestResult {
                    test_name: case.name().to_string(),
                    passed: true,
                    duration_ms,
                    timestamp: Utc::now(),
                    error_message: None,
                    performance_regression: regression,
                }
            }
            Ok(Err(message)) => TestResult {
                test_name: case.name().to_string(),
                passed: false,
                duration_ms,
                timestamp: Utc::now(),
                error_message: Some(message),
                performance_regression: false,
            },
            Err(panic) => {
                let message = panic
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
                    .unwrap_or_else(|| "test panicked".to_string());
                TestResult {
                    test_name: case.name().to_string(),
                    passed: false,
                    duration_ms,
                    timestamp: Utc::now(),
                    error_message: Some(message),
                    performance_regression: false,
                }
            }
        }
    }

    /// One continuous-testing pass over every registered suite. A pass
    /// where every executed test fails bumps the consecutive-failure
    /// counter; any passing test resets it.
    pub async fn run_cycle(&self) -> Vec<TestResult> {
        let mut all = Vec::new();
        for suite in self.suite_names().await {
            let results = self.run_suite(&suite).await;
            let failures = results.iter().filter(|result| !result.passed).count();
            if failures > 0 {
                error!(suite = %suite, failures, "Test failures in suite");
            }
            all.extend(results);
        }

        if !all.is_empty() {
            if all.iter().all(|result| !result.passed) {
                let streak = self
                    .consecutive_suite_failures
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                info!(streak, "Suite-wide test failure");
            } else {
                self.consecutive_suite_failures.store(0, Ordering::Relaxed);
            }
        }

        all
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_suite_failures.load(Ordering::Relaxed)
    }

    /// Override the remembered baseline for one test, e.g. after a known
    /// performance change.
    pub async fn set_baseline(&self, test_name: impl Into<String>, duration_ms: f64) {
        self.baselines
            .write()
            .await
            .insert(test_name.into(), duration_ms);
    }

    pub async fn baseline(&self, test_name: &str) -> Option<f64> {
        self.baselines.read().await.get(test_name).copied()
    }

    /// Rolling pass rate and friends over the last 100 results.
    pub async fn summary(&self) -> TestSummary {
        let results = self.results.read().await;
        let start = results.len().saturating_sub(SUMMARY_WINDOW);
        TestSummary::from_results(results.iter().skip(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing(name: &str) -> TestCase {
        TestCase::new(name, || async { Ok(()) })
    }

    fn failing(name: &str) -> TestCase {
        TestCase::new(name, || async { Err("assertion failed".to_string()) })
    }

    #[tokio::test]
    async fn test_results_and_errors_are_recorded() {
        let runner = RegressionTestRunner::new(1000);
        runner
            .register_suite("smoke", vec![passing("ok"), failing("bad")])
            .await;

        let results = runner.run_suite("smoke").await;
        assert_eq!(results.len(), 2);
        let ok = results.iter().find(|r| r.test_name == "ok").unwrap();
        let bad = results.iter().find(|r| r.test_name == "bad").unwrap();
        assert!(ok.passed);
        assert!(!bad.passed);
        assert_eq!(bad.error_message.as_deref(), Some("assertion failed"));
    }

    #[tokio::test]
    async fn test_panicking_test_becomes_failure() {
        let runner = RegressionTestRunner::new(1000);
        runner
            .register_suite(
                "smoke",
                vec![TestCase::new("explodes", || async {
                    panic!("boom");
                })],
            )
            .await;

        let results = runner.run_suite("smoke").await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
        assert_eq!(results[0].error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_first_run_seeds_baseline_without_regression() {
        let runner = RegressionTestRunner::new(1000);
        runner.register_suite("perf", vec![passing("fast")]).await;

        let results = runner.run_suite("perf").await;
        assert!(!results[0].performance_regression);
        assert!(runner.baseline("fast").await.is_some());
    }

    #[tokio::test]
    async fn test_regression_flag_uses_baseline_factor() {
        let runner = RegressionTestRunner::new(1000);
        runner.register_suite("perf", vec![passing("steady")]).await;

        // A generous baseline keeps the real run well inside the budget.
        runner.set_baseline("steady", 60_000.0).await;
        let results = runner.run_suite("perf").await;
        assert!(!results[0].performance_regression);

        // A near-zero baseline makes any real run exceed 1.2x.
        runner.set_baseline("steady", 1e-6).await;
        let results = runner.run_suite("perf").await;
        assert!(results[0].performance_regression);
    }

    #[tokio::test]
    async fn test_missing_suite_returns_empty() {
        let runner = RegressionTestRunner::new(1000);
        assert!(runner.run_suite("ghost").await.is_empty());
    }

    #[tokio::test]
    async fn test_consecutive_failure_counter() {
        let runner = RegressionTestRunner::new(1000);
        runner.register_suite("smoke", vec![failing("bad")]).await;

        for expected in 1..=3 {
            runner.run_cycle().await;
            assert_eq!(runner.consecutive_failures(), expected);
        }

        // One passing test resets the streak.
        runner
            .register_suite("smoke", vec![passing("ok"), failing("bad")])
            .await;
        runner.run_cycle().await;
        assert_eq!(runner.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_summary_covers_recent_window() {
        let runner = RegressionTestRunner::new(1000);
        runner
            .register_suite("smoke", vec![passing("ok"), failing("bad")])
            .await;

        for _ in 0..3 {
            runner.run_cycle().await;
        }
        let summary = runner.summary().await;
        assert_eq!(summary.total, 6);
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.failed, 3);
        assert!((summary.pass_rate - 0.5).abs() < 1e-9);
    }
}
