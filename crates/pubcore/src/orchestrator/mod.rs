//! Orchestrator state machine (C7) — the heart of the core.
//!
//! A linear phase sequence with per-phase retry and one-shot failover.
//! Owns the active provider and, on exhaustion, the fallback provider;
//! neither provider ever reaches back into the orchestrator.

use crate::config::Settings;
use crate::error::{ErrorKind, OrchestratorError, ProviderError};
use crate::metrics::Registry;
use crate::model::{
    Phase, PhaseOutcome, PhaseResult, PublishContext, PublishRequest, PublishResult, ResultError,
};
use crate::provider::{PublishingProvider, SeoOutcome};
use crate::recovery::RecoveryStrategy;
use crate::safety::SafetyValidator;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Drives one publishing run end to end. Stateless across runs: every
/// `publish` call gets its own `PublishContext` and owns its providers
/// for the duration of the call, per §6.
pub struct Orchestrator {
    settings: Arc<Settings>,
    safety: SafetyValidator,
    recovery: RecoveryStrategy,
    metrics: Option<Arc<Registry>>,
}

/// The two providers a run may use: the preferred primary and an
/// optional fallback taken over on exhaustion.
pub struct ProviderPair {
    /// The preferred provider, tried first.
    pub primary: Box<dyn PublishingProvider>,
    /// The backup provider, used at most once per run after failover.
    pub fallback: Option<Box<dyn PublishingProvider>>,
}

impl Orchestrator {
    /// Construct an orchestrator sharing `settings` and, optionally, a
    /// process-wide metrics registry.
    pub fn new(settings: Arc<Settings>, metrics: Option<Arc<Registry>>) -> Result<Self, OrchestratorError> {
        settings
            .validate()
            .map_err(OrchestratorError::ConfigInvalid)?;
        Ok(Self {
            settings,
            safety: SafetyValidator::new(),
            recovery: RecoveryStrategy::new(),
            metrics,
        })
    }

    /// Drive `request` through the full phase sequence using `providers`,
    /// returning a `PublishResult` that is always populated (§7).
    pub async fn publish(&self, request: PublishRequest, providers: ProviderPair, now: i64) -> PublishResult {
        let task_id = uuid::Uuid::new_v4().to_string();
        let mut ctx = PublishContext::new(task_id.clone(), request, now);
        let mut current = providers.primary;
        let mut fallback = providers.fallback;
        ctx.current_provider_name = current.name().to_string();

        let mut phase_log: Vec<PhaseResult> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        let outcome = match tokio::time::timeout(
            self.settings.whole_run_timeout(),
            self.run_sequence(&mut ctx, &mut current, &mut fallback, &mut phase_log, &mut warnings),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(task_id = %task_id, "whole-run deadline expired");
                let message = "whole-run deadline expired".to_string();
                self.recover(&mut ctx, current.as_mut(), ErrorKind::Timeout, message.clone())
                    .await;
                Err((ErrorKind::Timeout, message))
            }
        };

        ctx.cost_usd = self.estimate_run_cost(&ctx, current.as_ref());

        // Best-effort shutdown of whichever provider ended up active.
        if let Err(e) = current.close().await {
            tracing::warn!(task_id = %task_id, error = %e, "provider close failed");
        }

        let duration_seconds = (now - ctx.started_at).max(0) as f64;

        let result = match outcome {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_article("success", &ctx.current_provider_name);
                    metrics.observe_publish_duration(&ctx.current_provider_name, duration_seconds);
                }
                PublishResult {
                    success: true,
                    task_id,
                    url: ctx.published_url.clone(),
                    provider_used: ctx.current_provider_name.clone(),
                    fallback_triggered: ctx.fallback_triggered,
                    retry_count: ctx.retry_count,
                    duration_seconds,
                    cost_usd: ctx.cost_usd,
                    error: None,
                    warnings,
                    phases: phase_log,
                    screenshots: ctx.screenshots.clone(),
                }
            }
            Err((kind, message)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_article("failure", &ctx.current_provider_name);
                }
                PublishResult {
                    success: false,
                    task_id,
                    url: ctx.published_url.clone(),
                    provider_used: ctx.current_provider_name.clone(),
                    fallback_triggered: ctx.fallback_triggered,
                    retry_count: ctx.retry_count,
                    duration_seconds,
                    cost_usd: ctx.cost_usd,
                    error: Some(ResultError { kind, message }),
                    warnings,
                    phases: phase_log,
                    screenshots: ctx.screenshots.clone(),
                }
            }
        };

        result
    }

    /// Estimate the run's total cost. Prefers the active provider's real
    /// tracked cost (LLM token usage) when it has one; falls back to the
    /// flat per-provider estimate otherwise. A fallback run also pays the
    /// exhausted primary's estimated base cost, per §4.8.
    fn estimate_run_cost(&self, ctx: &PublishContext, current: &dyn PublishingProvider) -> f64 {
        let has_images = !ctx.request.images.is_empty();
        let token_count = (ctx.request.article.body.len() / 4) as u32;

        let tracked = current.accumulated_cost_usd();
        let mut cost = if tracked > 0.0 {
            tracked
        } else {
            crate::metrics::estimate_cost(&ctx.current_provider_name, has_images, token_count)
        };
        if ctx.fallback_triggered {
            let primary_name = if ctx.current_provider_name == "dom" { "vision" } else { "dom" };
            cost += crate::metrics::estimate_cost(primary_name, has_images, token_count);
        }
        cost
    }

    /// Run every phase in the canonical sequence, handling retry and
    /// failover, and returning the classified terminal failure if any.
    async fn run_sequence(
        &self,
        ctx: &mut PublishContext,
        current: &mut Box<dyn PublishingProvider>,
        fallback: &mut Option<Box<dyn PublishingProvider>>,
        phase_log: &mut Vec<PhaseResult>,
        warnings: &mut Vec<String>,
    ) -> Result<(), (ErrorKind, String)> {
        for phase in Phase::SEQUENCE {
            if phase.is_conditional() && self.phase_inputs_empty(phase, &ctx.request) {
                continue;
            }

            if phase == Phase::SafetyGate {
                match self.run_safety_gate(ctx, current.as_mut(), phase_log).await {
                    Ok(()) => {}
                    Err((kind, message)) => {
                        self.recover(ctx, current.as_mut(), kind, message.clone()).await;
                        return Err((kind, message));
                    }
                }
                ctx.record_completed(phase);
                continue;
            }

            if phase == Phase::Terminal {
                match self.run_terminal(ctx, current.as_mut(), warnings).await {
                    Ok(()) => {
                        ctx.record_completed(phase);
                        continue;
                    }
                    Err((kind, message)) => {
                        self.recover(ctx, current.as_mut(), kind, message.clone()).await;
                        return Err((kind, message));
                    }
                }
            }

            match self
                .run_retriable_phase(ctx, current, fallback, phase_log, phase)
                .await
            {
                Ok(()) => ctx.record_completed(phase),
                Err((kind, message)) => {
                    self.recover(ctx, current.as_mut(), kind, message.clone()).await;
                    return Err((kind, message));
                }
            }
        }

        Ok(())
    }

    fn phase_inputs_empty(&self, phase: Phase, request: &PublishRequest) -> bool {
        match phase {
            Phase::ProcessImages => request.images.is_empty(),
            Phase::SetSeo => false,
            Phase::SetTaxonomy => {
                request.taxonomy.primary_category.is_none()
                    && request.taxonomy.secondary_categories.is_empty()
                    && request.taxonomy.tags.is_empty()
            }
            Phase::InsertRelated => request.related_articles.is_empty(),
            Phase::InsertFaqSchema => request.faqs.is_empty(),
            _ => false,
        }
    }

    /// Execute one content phase with per-phase retry and, on exhaustion,
    /// one-shot failover to the fallback provider.
    async fn run_retriable_phase(
        &self,
        ctx: &mut PublishContext,
        current: &mut Box<dyn PublishingProvider>,
        fallback: &mut Option<Box<dyn PublishingProvider>>,
        phase_log: &mut Vec<PhaseResult>,
        phase: Phase,
    ) -> Result<(), (ErrorKind, String)> {
        let mut local_retries = 0u32;
        loop {
            let provider_name = current.name().to_string();
            let result = run_phase(
                phase,
                ctx,
                current.as_mut(),
                self.settings.providers.media_upload_concurrency,
            )
            .await;
            match result {
                Ok(()) => {
                    phase_log.push(PhaseResult {
                        action: format!("{phase:?}"),
                        target: None,
                        outcome: if local_retries == 0 {
                            PhaseOutcome::Success
                        } else {
                            PhaseOutcome::Retried
                        },
                        screenshot_ref: None,
                        metadata: HashMap::new(),
                    });
                    return Ok(());
                }
                Err(e) if e.is_transient() && local_retries < self.settings.max_retries() => {
                    local_retries += 1;
                    ctx.retry_count += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_operation_error(&format!("{phase:?}"), &provider_name, e.kind);
                    }
                    let delay = self.settings.retry_delay(local_retries);
                    tracing::warn!(
                        task_id = %ctx.task_id,
                        phase = ?phase,
                        provider = %provider_name,
                        retry_count = local_retries,
                        error = %e,
                        "transient phase failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_operation_error(&format!("{phase:?}"), &provider_name, e.kind);
                    }
                    if e.is_transient() && !ctx.fallback_triggered && self.settings.fallback_enabled() {
                        if let Some(fallback_provider) = fallback.take() {
                            self.failover(ctx, current, fallback_provider).await?;
                            phase_log.push(PhaseResult {
                                action: format!("{phase:?}:failover"),
                                target: None,
                                outcome: PhaseOutcome::Retried,
                                screenshot_ref: None,
                                metadata: HashMap::new(),
                            });
                            local_retries = 0;
                            continue;
                        }
                    }
                    let screenshot_ref = self.capture_failure_screenshot(ctx, current.as_mut()).await;
                    phase_log.push(PhaseResult {
                        action: format!("{phase:?}"),
                        target: None,
                        outcome: PhaseOutcome::Failed,
                        screenshot_ref,
                        metadata: HashMap::new(),
                    });
                    return Err((e.kind, e.message));
                }
            }
        }
    }

    /// Execute the failover protocol described in §4.7: capture cookies,
    /// close the exhausted provider, initialize the fallback with them.
    async fn failover(
        &self,
        ctx: &mut PublishContext,
        current: &mut Box<dyn PublishingProvider>,
        mut fallback_provider: Box<dyn PublishingProvider>,
    ) -> Result<(), (ErrorKind, String)> {
        let cookies = current.get_cookies().await.unwrap_or_default();
        let from_name = current.name().to_string();
        if let Err(e) = current.close().await {
            tracing::warn!(task_id = %ctx.task_id, error = %e, "failover: closing exhausted provider failed");
        }

        fallback_provider
            .initialize(&ctx.request.target_cms.url, Some(cookies.clone()))
            .await
            .map_err(|e| (e.kind, e.message))?;

        let to_name = fallback_provider.name().to_string();
        if let Some(metrics) = &self.metrics {
            metrics.record_fallback(&from_name, &to_name, "provider_exhausted");
        }
        tracing::info!(task_id = %ctx.task_id, from = %from_name, to = %to_name, "failover triggered");

        ctx.session_cookies = cookies;
        ctx.fallback_triggered = true;
        ctx.current_provider_name = to_name;
        *current = fallback_provider;
        Ok(())
    }

    async fn run_safety_gate(
        &self,
        ctx: &mut PublishContext,
        provider: &mut dyn PublishingProvider,
        phase_log: &mut Vec<PhaseResult>,
    ) -> Result<(), (ErrorKind, String)> {
        if matches!(ctx.request.intent, crate::model::PublishIntent::SaveDraft) {
            return Ok(());
        }
        if !self.settings.safety_checks_enabled() {
            return Ok(());
        }

        let report = self
            .safety
            .validate(&ctx.request, provider, ctx.started_at)
            .await
            .map_err(|e| (ErrorKind::SafetyBlocked, e.to_string()))?;

        let screenshot_ref = if report.safe {
            None
        } else {
            self.capture_failure_screenshot(ctx, provider).await
        };

        phase_log.push(PhaseResult {
            action: "SafetyGate".to_string(),
            target: None,
            outcome: if report.safe {
                PhaseOutcome::Success
            } else {
                PhaseOutcome::Failed
            },
            screenshot_ref,
            metadata: HashMap::from([("warnings".to_string(), report.warnings.join("; "))]),
        });

        if report.safe {
            Ok(())
        } else {
            Err((ErrorKind::SafetyBlocked, report.errors.join("; ")))
        }
    }

    /// Invoke the terminal publish/schedule/save-draft call exactly once,
    /// reconciling ambiguous failures via introspection per §4.7.
    async fn run_terminal(
        &self,
        ctx: &mut PublishContext,
        provider: &mut dyn PublishingProvider,
        warnings: &mut Vec<String>,
    ) -> Result<(), (ErrorKind, String)> {
        let terminal_result = match ctx.request.intent {
            crate::model::PublishIntent::SaveDraft => provider.save_draft().await,
            crate::model::PublishIntent::PublishNow => provider.publish().await,
            crate::model::PublishIntent::Schedule { at } => provider.schedule(at).await,
        };

        if let Err(e) = terminal_result {
            let post_id = provider.get_current_post_id().await.ok().flatten();
            let url = provider.get_published_url().await.ok().flatten();
            if post_id.is_some() || url.is_some() {
                warnings.push("AMBIGUOUS_PUBLISH".to_string());
                ctx.published_url = url;
                tracing::warn!(
                    task_id = %ctx.task_id,
                    error = %e,
                    "terminal call failed but post shows signs of publication; reporting success with warning"
                );
                return Ok(());
            }
            self.capture_failure_screenshot(ctx, provider).await;
            return Err((ErrorKind::ProviderExhausted, e.to_string()));
        }

        Ok(())
    }

    /// Capture a screenshot at a failing step and persist it under the
    /// configured screenshot directory, keyed by content hash so repeated
    /// captures of the same page state reuse the same file. Best-effort:
    /// a capture or write failure is logged and yields no reference.
    async fn capture_failure_screenshot(
        &self,
        ctx: &mut PublishContext,
        provider: &mut dyn PublishingProvider,
    ) -> Option<String> {
        let bytes = match provider.capture_screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(task_id = %ctx.task_id, error = %e, "screenshot capture failed");
                return None;
            }
        };

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        bytes.hash(&mut hasher);
        let digest = hasher.finish();

        let dir = crate::config::expand_tilde(&self.settings.screenshot_dir);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(task_id = %ctx.task_id, error = %e, "failed to create screenshot directory");
            return None;
        }

        let filename = format!("{digest:016x}.png");
        let path = dir.join(&filename);
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            tracing::warn!(task_id = %ctx.task_id, error = %e, "failed to write screenshot");
            return None;
        }

        let path_str = path.to_string_lossy().into_owned();
        ctx.screenshots.push(path_str.clone());
        Some(path_str)
    }

    async fn recover(
        &self,
        ctx: &mut PublishContext,
        provider: &mut dyn PublishingProvider,
        kind: ErrorKind,
        message: String,
    ) {
        let record = self.recovery.recover(provider, kind, message, ctx.started_at).await;
        if !record.draft_saved {
            tracing::error!(task_id = %ctx.task_id, "recovery strategy could not save a draft");
        }
    }
}

/// Execute the provider call(s) belonging to a single phase. Kept as a
/// free function (rather than a method) so `run_retriable_phase`'s retry
/// loop can call it without juggling a second mutable borrow of `self`.
fn run_phase<'a>(
    phase: Phase,
    ctx: &'a mut PublishContext,
    provider: &'a mut dyn PublishingProvider,
    media_upload_concurrency: usize,
) -> BoxFuture<'a, Result<(), ProviderError>> {
    Box::pin(async move {
        match phase {
            Phase::Initialize => {
                let cookies = if ctx.session_cookies.is_empty() {
                    None
                } else {
                    Some(ctx.session_cookies.clone())
                };
                provider
                    .initialize(&ctx.request.target_cms.url, cookies)
                    .await
            }
            Phase::Login => {
                let session_cookies_present = !ctx.session_cookies.is_empty();
                provider
                    .login(&ctx.request.credentials, session_cookies_present)
                    .await?;
                ctx.session_cookies = provider.get_cookies().await?;
                Ok(())
            }
            Phase::FillContent => {
                provider.navigate_to_new_post().await?;
                provider.set_title(&ctx.request.article.title).await?;
                provider.set_body(&ctx.request.article.body).await?;
                Ok(())
            }
            Phase::SaveDraft => provider.save_draft().await,
            Phase::ProcessImages => {
                let images = crate::model::images_in_insertion_order(&ctx.request.images);
                let uploads = provider
                    .upload_images_batch(&images, media_upload_concurrency)
                    .await;
                for (image, uploaded) in images.iter().zip(uploads.into_iter()) {
                    uploaded?;
                    provider.insert_image_at_position(image, image.position).await?;
                    if image.is_featured {
                        provider.set_featured_image(image).await?;
                    }
                }
                Ok(())
            }
            Phase::SetSeo => {
                match provider.set_seo(&ctx.request.article.seo).await? {
                    SeoOutcome::Configured { .. } => {}
                    SeoOutcome::NoPluginDetected => {
                        tracing::warn!(task_id = %ctx.task_id, "no SEO plugin detected");
                    }
                }
                Ok(())
            }
            Phase::SetTaxonomy => provider.set_taxonomy(&ctx.request.taxonomy).await,
            Phase::InsertRelated => {
                provider
                    .insert_related_articles(&ctx.request.related_articles)
                    .await
            }
            Phase::InsertFaqSchema => provider.insert_faq_schema(&ctx.request.faqs).await,
            Phase::SafetyGate | Phase::Terminal => unreachable!("handled outside run_phase"),
            Phase::CaptureUrl => {
                let url = provider.get_published_url().await?;
                if url.is_some() {
                    tracing::debug!(task_id = %ctx.task_id, "captured published url");
                }
                Ok(())
            }
            Phase::Close => provider.close().await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::*;
    use crate::provider::fake::{FakeProvider, ScriptedFailure};

    fn sample_request(intent: PublishIntent) -> PublishRequest {
        PublishRequest {
            article: Article {
                title: "Hello, world, daily edition".to_string(),
                body: format!("<p>{}</p>", "x".repeat(200)),
                excerpt: None,
                seo: Seo::default(),
                author: None,
            },
            images: Vec::new(),
            taxonomy: Taxonomy {
                primary_category: Some("news".to_string()),
                secondary_categories: Vec::new(),
                tags: Vec::new(),
            },
            faqs: Vec::new(),
            related_articles: Vec::new(),
            intent,
            target_cms: TargetCms {
                url: "https://cms.test".to_string(),
                kind: CmsKind::WordPress,
            },
            credentials: Credentials {
                username: "u".to_string(),
                password: "p".to_string(),
            },
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(Settings::default()), None).unwrap()
    }

    #[tokio::test]
    async fn happy_path_publishes_with_dom_provider() {
        let request = sample_request(PublishIntent::PublishNow);
        let providers = ProviderPair {
            primary: Box::new(FakeProvider::new("dom")),
            fallback: Some(Box::new(FakeProvider::new("vision"))),
        };
        let result = orchestrator().publish(request, providers, 1_000_000).await;
        assert!(result.success);
        assert_eq!(result.provider_used, "dom");
        assert!(!result.fallback_triggered);
        assert!(result.url.is_some());
    }

    #[tokio::test]
    async fn too_short_title_is_safety_blocked() {
        let mut request = sample_request(PublishIntent::PublishNow);
        request.article.title = "Hi".to_string();
        let providers = ProviderPair {
            primary: Box::new(FakeProvider::new("dom")),
            fallback: None,
        };
        let result = orchestrator().publish(request, providers, 1_000_000).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::SafetyBlocked);
    }

    #[tokio::test]
    async fn schedule_in_the_past_is_safety_blocked() {
        let request = sample_request(PublishIntent::Schedule { at: 10 });
        let providers = ProviderPair {
            primary: Box::new(FakeProvider::new("dom")),
            fallback: None,
        };
        let result = orchestrator().publish(request, providers, 1_000).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::SafetyBlocked);
    }

    #[tokio::test]
    async fn primary_exhaustion_triggers_fallback_success() {
        let request = sample_request(PublishIntent::PublishNow);
        let settings = Arc::new(Settings {
            retry: crate::config::RetryConfig {
                max_retries: 1,
                ..crate::config::RetryConfig::default()
            },
            ..Settings::default()
        });
        let failing = FakeProvider::new("dom").with_failures(vec![
            ScriptedFailure {
                primitive: "set_title",
                nth: 1,
                kind: ErrorKind::ElementNotFound,
            },
            ScriptedFailure {
                primitive: "set_title",
                nth: 2,
                kind: ErrorKind::ElementNotFound,
            },
        ]);
        let providers = ProviderPair {
            primary: Box::new(failing),
            fallback: Some(Box::new(FakeProvider::new("vision"))),
        };
        let orchestrator = Orchestrator::new(settings, None).unwrap();
        let result = orchestrator.publish(request, providers, 1_000_000).await;
        assert!(result.success);
        assert_eq!(result.provider_used, "vision");
        assert!(result.fallback_triggered);
    }

    #[tokio::test]
    async fn zero_images_skips_process_images_phase() {
        let request = sample_request(PublishIntent::SaveDraft);
        let providers = ProviderPair {
            primary: Box::new(FakeProvider::new("dom")),
            fallback: None,
        };
        let result = orchestrator().publish(request, providers, 1_000_000).await;
        assert!(result.success);
        assert!(!result.phases.iter().any(|p| p.action == "ProcessImages"));
    }
}
