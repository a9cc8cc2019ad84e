use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use vigil_models::{HealthStatus, Issue, RecoveryStrategy};

/// Structured payload handed to an operator when automation gives up.
#[derive(Debug, Clone, Serialize)]
pub struct EscalationNotice {
    pub issue_id: String,
    pub component: String,
    pub severity: HealthStatus,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub attempts: u32,
    pub suggested_strategy: RecoveryStrategy,
}

impl EscalationNotice {
    pub fn from_issue(issue: &Issue) -> Self {
        Self {
            issue_id: issue.id.clone(),
            component: issue.component.clone(),
            severity: issue.severity,
            description: issue.description.clone(),
            detected_at: issue.detected_at,
            attempts: issue.recovery_attempts,
            suggested_strategy: issue.suggested_recovery,
        }
    }
}

/// Emits escalation notices. The log channel is always on; a webhook can
/// be added for hosts that route alerts elsewhere. Delivery problems are
/// logged and swallowed so escalation never fails its caller.
pub struct EscalationNotifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
    emitted: AtomicUsize,
}

impl EscalationNotifier {
    pub fn log_only() -> Self {
        Self {
            webhook_url: None,
            client: reqwest::Client::new(),
            emitted: AtomicUsize::new(0),
        }
    }

    pub fn with_webhook(url: impl Into<String>) -> Self {
        Self {
            webhook_url: Some(url.into()),
            client: reqwest::Client::new(),
            emitted: AtomicUsize::new(0),
        }
    }

    pub async fn escalate(&self, notice: &EscalationNotice) {
        warn!(
            issue_id = %notice.issue_id,
            component = %notice.component,
            severity = %notice.severity,
            attempts = notice.attempts,
            suggested_strategy = %notice.suggested_strategy,
            description = %notice.description,
            "Manual intervention required"
        );

        if let Some(url) = &self.webhook_url {
            if let Err(err) = self.client.post(url).json(notice).send().await {
                warn!(error = %err, "Escalation webhook delivery failed");
            }
        }

        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::Relaxed)
    }
}
