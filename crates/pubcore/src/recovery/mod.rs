//! Error-recovery strategy (C6).
//!
//! Runs after a terminal failure the orchestrator cannot route around:
//! best-effort "demote to draft" plus a capture of the failure state for
//! the audit log. Recovery failure is logged but never re-raised — the
//! original failure is always what the caller sees.

use crate::error::ErrorKind;
use crate::provider::PublishingProvider;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on the best-effort save-draft attempt.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Captured state from a failed run, written to the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryRecord {
    /// Unix timestamp (seconds) the recovery attempt ran.
    pub timestamp: i64,
    /// The error kind that triggered recovery.
    pub error_kind: ErrorKind,
    /// Human-readable detail on the triggering failure.
    pub error_message: String,
    /// Screenshot captured during recovery, if the provider could produce one.
    pub screenshot: Option<Vec<u8>>,
    /// The CMS post ID, if the provider could identify one.
    pub post_id: Option<String>,
    /// Whether the best-effort save-draft attempt succeeded.
    pub draft_saved: bool,
}

/// Executes the post-failure recovery sequence described in §4.6.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryStrategy;

impl RecoveryStrategy {
    /// Construct a recovery strategy.
    pub fn new() -> Self {
        Self
    }

    /// Attempt to demote the run to a saved draft and capture failure
    /// state. Never returns an `Err` — a failure to recover is recorded
    /// in the returned `RecoveryRecord` rather than propagated, per §4.6
    /// ("recovery failure is logged but never re-raised").
    pub async fn recover(
        &self,
        provider: &mut dyn PublishingProvider,
        error_kind: ErrorKind,
        error_message: String,
        now: i64,
    ) -> RecoveryRecord {
        let draft_saved = match tokio::time::timeout(DEFAULT_RECOVERY_TIMEOUT, provider.save_draft())
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "recovery save_draft failed");
                false
            }
            Err(_) => {
                tracing::warn!("recovery save_draft timed out");
                false
            }
        };

        let screenshot = match provider.capture_screenshot().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "recovery screenshot capture failed");
                None
            }
        };

        let post_id = match provider.get_current_post_id().await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "recovery post id lookup failed");
                None
            }
        };

        if !draft_saved {
            tracing::error!(kind = %error_kind, "recovery could not save a draft");
        }

        RecoveryRecord {
            timestamp: now,
            error_kind,
            error_message,
            screenshot,
            post_id,
            draft_saved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeProvider;

    #[tokio::test]
    async fn recover_saves_draft_and_captures_state() {
        let mut provider = FakeProvider::new("dom");
        provider.navigate_to_new_post().await.unwrap();

        let record = RecoveryStrategy::new()
            .recover(&mut provider, ErrorKind::NavigationTimeout, "timed out".to_string(), 1_000)
            .await;

        assert!(record.draft_saved);
        assert_eq!(record.post_id.as_deref(), Some("post-1"));
        assert_eq!(record.error_kind, ErrorKind::NavigationTimeout);
    }

    #[tokio::test]
    async fn recover_records_failure_without_raising() {
        use crate::provider::fake::ScriptedFailure;

        let mut provider = FakeProvider::new("dom").with_failures(vec![ScriptedFailure {
            primitive: "save_draft",
            nth: 1,
            kind: ErrorKind::ElementNotFound,
        }]);

        let record = RecoveryStrategy::new()
            .recover(&mut provider, ErrorKind::AuthRejected, "login failed".to_string(), 2_000)
            .await;

        assert!(!record.draft_saved);
        assert_eq!(record.error_kind, ErrorKind::AuthRejected);
    }
}
