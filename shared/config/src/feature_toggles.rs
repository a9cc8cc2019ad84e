use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct FeatureToggles {
    #[serde(flatten)]
    pub flags: HashMap<String, bool>,
}

impl FeatureToggles {
    // Load from a provided path or env var FEATURE_TOGGLES_PATH, defaulting to ./feature-toggles.json
    pub fn from_path(path: Option<String>) -> Self {
        let default_path = std::env::var("FEATURE_TOGGLES_PATH")
            .unwrap_or_else(|_| "feature-toggles.json".to_string());
        let path = path.unwrap_or(default_path);

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => FeatureToggles::default(),
        }
    }

    pub fn from_env_path() -> Self {
        Self::from_path(None)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn is_enabled_or(&self, name: &str, default: bool) -> bool {
        self.flags.get(name).copied().unwrap_or(default)
    }

    // Convenience: whether maintenance actions run real commands.
    // Off means the engine wires the recording executor instead, so it can
    // run on developer machines without touching services.
    pub fn shell_executor_enabled(&self) -> bool {
        self.is_enabled_or("ShellExecutor", false)
    }

    // Convenience: whether escalations also POST to the configured webhook
    // in addition to the log channel.
    pub fn webhook_escalation_enabled(&self) -> bool {
        self.is_enabled_or("WebhookEscalation", false)
    }

    // Convenience: whether service pattern analysis feeds tuning
    // opportunities. Disabled by default; tuning is never auto-applied
    // either way.
    pub fn pattern_analysis_enabled(&self) -> bool {
        self.is_enabled_or("ServicePatternAnalysis", false)
    }

    // Get all enabled features
    pub fn enabled_features(&self) -> Vec<String> {
        self.flags
            .iter()
            .filter(|(_, &enabled)| enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    // Get all disabled features
    pub fn disabled_features(&self) -> Vec<String> {
        self.flags
            .iter()
            .filter(|(_, &enabled)| !enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

// Thread-safe cached feature toggles for hot reload support
lazy_static::lazy_static! {
    static ref CACHED_TOGGLES: Arc<RwLock<FeatureToggles>> = {
        Arc::new(RwLock::new(FeatureToggles::from_env_path()))
    };
}

// Get cached toggles (read-optimized)
pub fn get_cached_toggles() -> FeatureToggles {
    CACHED_TOGGLES.read().clone()
}

// Reload toggles from file (write operation)
pub fn reload_toggles() {
    let mut cache = CACHED_TOGGLES.write();
    *cache = FeatureToggles::from_env_path();
}
