use std::env;
use std::str::FromStr;

/// Engine configuration. Every field has an operational default; the env
/// override names follow the field names.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Logical component name used for system-wide diagnoses.
    pub component: String,

    // Task intervals
    pub check_interval_secs: u64,
    pub optimization_interval_secs: u64,
    pub test_interval_secs: u64,
    pub housekeeping_interval_secs: u64,

    // Recovery
    pub max_recovery_attempts: u32,
    pub action_timeout_secs: u64,

    // Optimization
    pub settle_secs: u64,
    pub optimization_cooldown_secs: i64,
    pub min_opportunity_score: f64,
    pub min_predicted_health: f64,
    pub forecast_horizon_minutes: f64,
    pub top_opportunities_per_cycle: usize,
    pub memory_optimize_at: f64,
    pub disk_cleanup_at: f64,
    pub cache_clear_interval_hours: f64,
    pub generation_keep: u64,

    // Bounded histories
    pub metrics_history_size: usize,
    pub result_history_size: usize,
    pub test_history_size: usize,

    // Housekeeping
    pub resolved_retention_hours: i64,
    pub escalated_retention_hours: i64,
    pub log_retention_days: u32,

    // External surfaces
    pub escalation_webhook_url: Option<String>,
    pub system_profile_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            component: "system".to_string(),
            check_interval_secs: 30,
            optimization_interval_secs: 300,
            test_interval_secs: 300,
            housekeeping_interval_secs: 86_400,
            max_recovery_attempts: 3,
            action_timeout_secs: 45,
            settle_secs: 5,
            optimization_cooldown_secs: 3_600,
            min_opportunity_score: 3.0,
            min_predicted_health: 40.0,
            forecast_horizon_minutes: 60.0,
            top_opportunities_per_cycle: 3,
            memory_optimize_at: 70.0,
            disk_cleanup_at: 80.0,
            cache_clear_interval_hours: 24.0,
            generation_keep: 10,
            metrics_history_size: 1_000,
            result_history_size: 100,
            test_history_size: 1_000,
            resolved_retention_hours: 24,
            escalated_retention_hours: 168,
            log_retention_days: 30,
            escalation_webhook_url: None,
            system_profile_path: "/nix/var/nix/profiles/system".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            component: env::var("VIGIL_COMPONENT").unwrap_or(defaults.component),
            check_interval_secs: env_parse("VIGIL_CHECK_INTERVAL_SECS", defaults.check_interval_secs),
            optimization_interval_secs: env_parse(
                "VIGIL_OPTIMIZATION_INTERVAL_SECS",
                defaults.optimization_interval_secs,
            ),
            test_interval_secs: env_parse("VIGIL_TEST_INTERVAL_SECS", defaults.test_interval_secs),
            housekeeping_interval_secs: env_parse(
                "VIGIL_HOUSEKEEPING_INTERVAL_SECS",
                defaults.housekeeping_interval_secs,
            ),
            max_recovery_attempts: env_parse(
                "VIGIL_MAX_RECOVERY_ATTEMPTS",
                defaults.max_recovery_attempts,
            ),
            action_timeout_secs: env_parse("VIGIL_ACTION_TIMEOUT_SECS", defaults.action_timeout_secs),
            settle_secs: env_parse("VIGIL_SETTLE_SECS", defaults.settle_secs),
            optimization_cooldown_secs: env_parse(
                "VIGIL_OPTIMIZATION_COOLDOWN_SECS",
                defaults.optimization_cooldown_secs,
            ),
            min_opportunity_score: env_parse(
                "VIGIL_MIN_OPPORTUNITY_SCORE",
                defaults.min_opportunity_score,
            ),
            min_predicted_health: env_parse(
                "VIGIL_MIN_PREDICTED_HEALTH",
                defaults.min_predicted_health,
            ),
            forecast_horizon_minutes: env_parse(
                "VIGIL_FORECAST_HORIZON_MINUTES",
                defaults.forecast_horizon_minutes,
            ),
            top_opportunities_per_cycle: env_parse(
                "VIGIL_TOP_OPPORTUNITIES_PER_CYCLE",
                defaults.top_opportunities_per_cycle,
            ),
            memory_optimize_at: env_parse("VIGIL_MEMORY_OPTIMIZE_AT", defaults.memory_optimize_at),
            disk_cleanup_at: env_parse("VIGIL_DISK_CLEANUP_AT", defaults.disk_cleanup_at),
            cache_clear_interval_hours: env_parse(
                "VIGIL_CACHE_CLEAR_INTERVAL_HOURS",
                defaults.cache_clear_interval_hours,
            ),
            generation_keep: env_parse("VIGIL_GENERATION_KEEP", defaults.generation_keep),
            metrics_history_size: env_parse(
                "VIGIL_METRICS_HISTORY_SIZE",
                defaults.metrics_history_size,
            ),
            result_history_size: env_parse(
                "VIGIL_RESULT_HISTORY_SIZE",
                defaults.result_history_size,
            ),
            test_history_size: env_parse("VIGIL_TEST_HISTORY_SIZE", defaults.test_history_size),
            resolved_retention_hours: env_parse(
                "VIGIL_RESOLVED_RETENTION_HOURS",
                defaults.resolved_retention_hours,
            ),
            escalated_retention_hours: env_parse(
                "VIGIL_ESCALATED_RETENTION_HOURS",
                defaults.escalated_retention_hours,
            ),
            log_retention_days: env_parse("VIGIL_LOG_RETENTION_DAYS", defaults.log_retention_days),
            escalation_webhook_url: env::var("VIGIL_ESCALATION_WEBHOOK_URL")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            system_profile_path: env::var("VIGIL_SYSTEM_PROFILE_PATH")
                .unwrap_or(defaults.system_profile_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_operational_baseline() {
        let config = EngineConfig::default();
        assert_eq!(config.check_interval_secs, 30);
        assert_eq!(config.optimization_interval_secs, 300);
        assert_eq!(config.max_recovery_attempts, 3);
        assert_eq!(config.metrics_history_size, 1_000);
        assert!((config.min_opportunity_score - 3.0).abs() < 1e-9);
        assert!(config.escalation_webhook_url.is_none());
    }
}
