//! Pre-publish safety validator (C5).
//!
//! Invoked by the orchestrator immediately before the terminal phase,
//! whenever the intent is not `SaveDraft`. Runs a fixed sequence of
//! checks against the request and the live provider state and returns a
//! report; it never aborts the run itself — the orchestrator decides
//! what a critical failure means.

use crate::error::ProviderError;
use crate::model::{PublishIntent, PublishRequest};
use crate::provider::PublishingProvider;
use serde::{Deserialize, Serialize};

/// Infrastructure failure while running a check (e.g. the provider's
/// introspection call itself errored). Distinct from a check simply
/// failing its condition, which is recorded in the report.
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    /// A provider introspection call needed by a check could not complete.
    #[error("safety check '{check}' could not run: {source}")]
    CheckUnavailable {
        /// Name of the check that could not run.
        check: &'static str,
        /// The underlying provider failure.
        #[source]
        source: ProviderError,
    },
}

/// The outcome of a single named check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    /// Stable check name, e.g. `"title_length"`.
    pub name: &'static str,
    /// Whether the check's condition held.
    pub passed: bool,
    /// Human-readable detail.
    pub message: String,
    /// Whether a failure of this check blocks publish.
    pub critical: bool,
}

impl Check {
    fn pass(name: &'static str, critical: bool, message: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            message: message.into(),
            critical,
        }
    }

    fn fail(name: &'static str, critical: bool, message: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            message: message.into(),
            critical,
        }
    }
}

/// Result of running the full preflight sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyReport {
    /// Whether publish may proceed (no critical check failed).
    pub safe: bool,
    /// Every check that ran, in order.
    pub checks: Vec<Check>,
    /// Messages from non-critical checks that failed.
    pub warnings: Vec<String>,
    /// Messages from critical checks that failed.
    pub errors: Vec<String>,
}

/// Runs the fixed preflight sequence described in §4.5.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyValidator;

impl SafetyValidator {
    /// Construct a validator. Stateless; kept as a type for symmetry with
    /// the other C1-adjacent components and to leave room for future
    /// configuration (e.g. a pluggable check list).
    pub fn new() -> Self {
        Self
    }

    /// Run every required check against `request` and `provider`,
    /// producing a `SafetyReport`. `now` is the current Unix timestamp,
    /// passed in rather than read from the clock so callers can test the
    /// schedule-validity boundary deterministically.
    pub async fn validate(
        &self,
        request: &PublishRequest,
        provider: &mut dyn PublishingProvider,
        now: i64,
    ) -> Result<SafetyReport, SafetyError> {
        let mut checks = Vec::with_capacity(7);

        checks.push(self.check_title(request));
        checks.push(self.check_body(request));
        checks.push(self.check_draft_status(provider).await?);
        checks.push(self.check_content_saved(provider).await?);
        checks.push(self.check_intent_echo(request));
        checks.push(self.check_taxonomy(request));
        if let Some(check) = self.check_schedule_validity(request, now) {
            checks.push(check);
        }

        let warnings = checks
            .iter()
            .filter(|c| !c.passed && !c.critical)
            .map(|c| c.message.clone())
            .collect();
        let errors: Vec<String> = checks
            .iter()
            .filter(|c| !c.passed && c.critical)
            .map(|c| c.message.clone())
            .collect();
        let safe = errors.is_empty();

        Ok(SafetyReport {
            safe,
            checks,
            warnings,
            errors,
        })
    }

    fn check_title(&self, request: &PublishRequest) -> Check {
        if request.article.title_valid() {
            Check::pass("title_length", true, "title length is valid")
        } else {
            Check::fail(
                "title_length",
                true,
                format!(
                    "title has {} chars, minimum is {}",
                    request.article.title.chars().count(),
                    crate::model::MIN_TITLE_LEN
                ),
            )
        }
    }

    fn check_body(&self, request: &PublishRequest) -> Check {
        if request.article.body_valid() {
            Check::pass("body_length", true, "body length is valid")
        } else {
            Check::fail(
                "body_length",
                true,
                format!(
                    "body has {} chars, minimum is {}",
                    request.article.body.chars().count(),
                    crate::model::MIN_BODY_LEN
                ),
            )
        }
    }

    async fn check_draft_status(
        &self,
        provider: &mut dyn PublishingProvider,
    ) -> Result<Check, SafetyError> {
        let is_draft = provider
            .verify_draft_status()
            .await
            .map_err(|source| SafetyError::CheckUnavailable {
                check: "draft_status",
                source,
            })?;
        Ok(if is_draft {
            Check::pass("draft_status", true, "post is in draft status")
        } else {
            Check::fail("draft_status", true, "post is not in draft status")
        })
    }

    async fn check_content_saved(
        &self,
        provider: &mut dyn PublishingProvider,
    ) -> Result<Check, SafetyError> {
        let saved = provider
            .verify_content_saved()
            .await
            .map_err(|source| SafetyError::CheckUnavailable {
                check: "content_saved",
                source,
            })?;
        Ok(if saved {
            Check::pass("content_saved", false, "content is saved")
        } else {
            Check::fail("content_saved", false, "latest content edits are not confirmed saved")
        })
    }

    fn check_intent_echo(&self, request: &PublishRequest) -> Check {
        Check::pass(
            "intent_echo",
            false,
            format!("intent is {}", request.intent.label()),
        )
    }

    fn check_taxonomy(&self, request: &PublishRequest) -> Check {
        if request.taxonomy.primary_category.is_some() {
            Check::pass("taxonomy_presence", false, "primary category is set")
        } else {
            Check::fail("taxonomy_presence", false, "no primary category is set")
        }
    }

    fn check_schedule_validity(&self, request: &PublishRequest, now: i64) -> Option<Check> {
        match request.intent {
            PublishIntent::Schedule { at } if at <= now => Some(Check::fail(
                "schedule_validity",
                true,
                format!("scheduled time {at} is not after current time {now}"),
            )),
            PublishIntent::Schedule { .. } => {
                Some(Check::pass("schedule_validity", true, "scheduled time is in the future"))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CmsKind;
    use crate::model::{Article, Credentials, Faq, Image, Seo, TargetCms, Taxonomy};
    use crate::provider::fake::FakeProvider;

    fn request(title: &str, body: &str, intent: PublishIntent) -> PublishRequest {
        PublishRequest {
            article: Article {
                title: title.to_string(),
                body: body.to_string(),
                excerpt: None,
                seo: Seo::default(),
                author: None,
            },
            images: Vec::<Image>::new(),
            taxonomy: Taxonomy {
                primary_category: Some("news".to_string()),
                secondary_categories: Vec::new(),
                tags: Vec::new(),
            },
            faqs: Vec::<Faq>::new(),
            related_articles: Vec::new(),
            intent,
            target_cms: TargetCms {
                url: "https://cms.test".to_string(),
                kind: CmsKind::WordPress,
            },
            credentials: Credentials {
                username: "a".to_string(),
                password: "b".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn valid_request_passes_with_no_errors() {
        let req = request(&"x".repeat(20), &"y".repeat(60), PublishIntent::PublishNow);
        let mut provider = FakeProvider::new("dom");
        provider.save_draft().await.unwrap();
        provider.set_title(&req.article.title).await.unwrap();
        provider.set_body(&req.article.body).await.unwrap();

        let report = SafetyValidator::new()
            .validate(&req, &mut provider, 1_000)
            .await
            .unwrap();
        assert!(report.safe);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn title_below_minimum_blocks_with_critical_error() {
        let req = request("Hi", &"y".repeat(60), PublishIntent::PublishNow);
        let mut provider = FakeProvider::new("dom");
        provider.save_draft().await.unwrap();

        let report = SafetyValidator::new()
            .validate(&req, &mut provider, 1_000)
            .await
            .unwrap();
        assert!(!report.safe);
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "title_length" && !c.passed && c.critical));
    }

    #[tokio::test]
    async fn schedule_in_the_past_is_blocked() {
        let req = request(
            &"x".repeat(20),
            &"y".repeat(60),
            PublishIntent::Schedule { at: 99 },
        );
        let mut provider = FakeProvider::new("dom");
        provider.save_draft().await.unwrap();

        let report = SafetyValidator::new()
            .validate(&req, &mut provider, 100)
            .await
            .unwrap();
        assert!(!report.safe);
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "schedule_validity" && !c.passed));
    }

    #[tokio::test]
    async fn non_draft_status_is_critical() {
        let req = request(&"x".repeat(20), &"y".repeat(60), PublishIntent::PublishNow);
        let mut provider = FakeProvider::new("dom");

        let report = SafetyValidator::new()
            .validate(&req, &mut provider, 1_000)
            .await
            .unwrap();
        assert!(!report.safe);
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "draft_status" && !c.passed && c.critical));
    }

    #[tokio::test]
    async fn missing_taxonomy_is_warning_only() {
        let mut req = request(&"x".repeat(20), &"y".repeat(60), PublishIntent::PublishNow);
        req.taxonomy.primary_category = None;
        let mut provider = FakeProvider::new("dom");
        provider.save_draft().await.unwrap();

        let report = SafetyValidator::new()
            .validate(&req, &mut provider, 1_000)
            .await
            .unwrap();
        assert!(report.safe);
        assert!(!report.warnings.is_empty());
    }
}
