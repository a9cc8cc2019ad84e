use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{error, info, warn};

use vigil_models::{Issue, RecoveryRecord, RecoveryStrategy};

use crate::services::notifications::{EscalationNotice, EscalationNotifier};
use crate::sources::{CommandExecutor, ComponentLocks};

/// Dispatches recovery strategies for diagnosed issues, enforcing the
/// attempt ceiling and escalating what automation cannot fix.
pub struct RecoveryExecutor {
    executor: Arc<dyn CommandExecutor>,
    notifier: Arc<EscalationNotifier>,
    locks: Arc<ComponentLocks>,
    history: RwLock<VecDeque<RecoveryRecord>>,
    max_attempts: u32,
    action_timeout: Duration,
    history_size: usize,
}

impl RecoveryExecutor {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        notifier: Arc<EscalationNotifier>,
        locks: Arc<ComponentLocks>,
        max_attempts: u32,
        action_timeout: Duration,
        history_size: usize,
    ) -> Self {
        Self {
            executor,
            notifier,
            locks,
            history: RwLock::new(VecDeque::new()),
            max_attempts,
            action_timeout,
            history_size,
        }
    }

    /// One recovery attempt. Returns true when the issue resolved; a false
    /// return leaves the issue open for the next cycle unless it was
    /// escalated, which is terminal.
    pub async fn attempt_recovery(&self, issue: &mut Issue) -> bool {
        if !issue.auto_recoverable {
            warn!(issue_id = %issue.id, "Issue requires manual intervention");
            self.escalate(issue).await;
            return false;
        }

        if issue.recovery_attempts >= self.max_attempts {
            error!(
                issue_id = %issue.id,
                attempts = issue.recovery_attempts,
                "Max recovery attempts reached"
            );
            issue.auto_recoverable = false;
            self.escalate(issue).await;
            return false;
        }

        issue.recovery_attempts += 1;
        let strategy = issue.suggested_recovery;
        info!(
            issue_id = %issue.id,
            strategy = %strategy,
            attempt = issue.recovery_attempts,
            "Attempting recovery"
        );

        let success = self.dispatch(issue).await;
        if success {
            issue.resolved_at = Some(Utc::now());
            issue.resolution = Some(format!("Auto-recovered using {}", strategy));
            info!(issue_id = %issue.id, strategy = %strategy, "Recovery succeeded");

            let mut history = self.history.write().await;
            history.push_back(RecoveryRecord {
                issue_id: issue.id.clone(),
                strategy,
                timestamp: Utc::now(),
                attempts: issue.recovery_attempts,
                success: true,
            });
            if history.len() > self.history_size {
                history.pop_front();
            }
        }
        success
    }

    /// Strategy dispatch. Every failure mode inside a handler, including a
    /// timeout, is converted to a false outcome so the caller only ever
    /// sees success or retryable failure.
    async fn dispatch(&self, issue: &Issue) -> bool {
        let (action, params) = match issue.suggested_recovery {
            RecoveryStrategy::Restart => {
                ("restart_service", json!({ "service": issue.component }))
            }
            RecoveryStrategy::Rollback => {
                ("rollback_release", json!({ "component": issue.component }))
            }
            RecoveryStrategy::CacheClear => ("clear_caches", json!({ "scope": issue.component })),
            RecoveryStrategy::MemoryRelease => ("release_memory", json!({})),
            RecoveryStrategy::Reindex => ("rebuild_index", json!({ "component": issue.component })),
            RecoveryStrategy::Repair => ("run_repair", json!({ "component": issue.component })),
            RecoveryStrategy::Escalate => {
                // Notify-only strategy; it never reports success.
                self.notifier
                    .escalate(&EscalationNotice::from_issue(issue))
                    .await;
                return false;
            }
        };

        let _guard = self.locks.acquire(&issue.component).await;
        match timeout(self.action_timeout, self.executor.execute(action, &params)).await {
            Ok(Ok(outcome)) => {
                if !outcome.success {
                    warn!(
                        issue_id = %issue.id,
                        action,
                        output = %outcome.output,
                        "Recovery action failed"
                    );
                }
                outcome.success
            }
            Ok(Err(err)) => {
                error!(issue_id = %issue.id, action, error = %err, "Recovery action errored");
                false
            }
            Err(_) => {
                warn!(
                    issue_id = %issue.id,
                    action,
                    timeout_secs = self.action_timeout.as_secs(),
                    "Recovery action timed out"
                );
                false
            }
        }
    }

    async fn escalate(&self, issue: &mut Issue) {
        issue.escalated = true;
        self.notifier
            .escalate(&EscalationNotice::from_issue(issue))
            .await;
    }

    pub async fn history(&self) -> Vec<RecoveryRecord> {
        self.history.read().await.iter().cloned().collect()
    }

    pub async fn recoveries_performed(&self) -> usize {
        self.history.read().await.len()
    }
}
