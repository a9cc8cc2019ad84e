use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use vigil_models::SystemReading;

pub mod command;
pub mod system;

pub use command::{RecordingCommandExecutor, ShellCommandExecutor};
pub use system::{AppMetricsFeed, SimulatedMetricsSource, SysinfoMetricsSource};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("metrics source unavailable: {0}")]
    Unavailable(String),
    #[error("metrics source timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown maintenance action: {0}")]
    UnknownAction(String),
    #[error("invalid parameters for {action}: {reason}")]
    InvalidParams { action: String, reason: String },
}

/// Point-in-time accessor for raw system readings. Implementations must
/// not block for more than a few seconds; a failed sample makes the
/// caller skip its cycle without mutating any history.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn sample(&self) -> Result<SystemReading, SourceError>;
}

/// Result of one maintenance operation.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub output: String,
}

impl CommandOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Privileged maintenance operations. Restart, cache-clear, reindex and
/// repair actions must be idempotent; rollback must succeed as a no-op
/// when there is nothing to roll back to.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, action: &str, params: &Value) -> Result<CommandOutcome, CommandError>;
}

/// Advisory locks keyed by component name. Two concurrent maintenance
/// actions must not target the same component; action frequency is low
/// enough that a plain mutex map suffices.
#[derive(Default)]
pub struct ComponentLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ComponentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, component: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(component.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_component_locks_are_exclusive_per_name() {
        let locks = Arc::new(ComponentLocks::new());

        let guard = locks.acquire("postgresql").await;
        // A different component is unaffected.
        let other = locks.acquire("nginx").await;
        drop(other);

        // The same component stays held until the guard drops.
        let locks2 = Arc::clone(&locks);
        let contended = tokio::spawn(async move {
            let _g = locks2.acquire("postgresql").await;
        });
        tokio::task::yield_now().await;
        assert!(!contended.is_finished());

        drop(guard);
        contended.await.unwrap();
    }
}
