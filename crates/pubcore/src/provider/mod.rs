//! Provider interface (C1) — the uniform capability surface every
//! automation back-end exposes. The orchestrator depends on nothing
//! beyond this trait.

pub mod dom;
pub mod fake;
pub mod vision;

use crate::error::ProviderError;
use crate::model::{Cookie, Credentials, Image, Seo, Taxonomy};
use async_trait::async_trait;

/// Everything the orchestrator needs from a back-end. Every operation is
/// asynchronous and may suspend; every fallible operation returns a
/// classified `ProviderError` (never an opaque exception).
///
/// Named fields/elements/actions are resolved internally by the
/// implementation through the selector or instruction bundle — the
/// orchestrator never passes raw selectors.
#[async_trait]
pub trait PublishingProvider: Send + Sync {
    /// Display name used in logs, metrics labels, and `PublishResult.provider_used`.
    fn name(&self) -> &'static str;

    // ---- Lifecycle ----

    /// Initialize the provider against a CMS base URL, optionally reusing
    /// session cookies captured from a prior provider (failover handoff).
    async fn initialize(
        &mut self,
        cms_base_url: &str,
        session_cookies: Option<Vec<Cookie>>,
    ) -> Result<(), ProviderError>;

    /// Release the provider's resources (browser/session). Idempotent.
    async fn close(&mut self) -> Result<(), ProviderError>;

    // ---- Session surface ----

    /// Current session cookies, for handoff on failover.
    async fn get_cookies(&self) -> Result<Vec<Cookie>, ProviderError>;

    /// Capture a screenshot of the current page state.
    async fn capture_screenshot(&self) -> Result<Vec<u8>, ProviderError>;

    // ---- Authentication ----

    /// Authenticate against the CMS admin. If `session_cookies_present` is
    /// `true` (a prior provider's cookies were already carried into
    /// `initialize`), first checks whether the session is already live and
    /// skips submitting credentials if so. Otherwise fills and submits the
    /// login form and waits for confirmation the session is live.
    /// Returns `AuthRejected` (fatal, no retry) if credentials are
    /// submitted but no live session results.
    async fn login(
        &mut self,
        credentials: &Credentials,
        session_cookies_present: bool,
    ) -> Result<(), ProviderError>;

    // ---- Navigation ----

    /// Navigate directly to a URL.
    async fn navigate(&mut self, url: &str) -> Result<(), ProviderError>;

    /// Navigate to the CMS's "new post" endpoint.
    async fn navigate_to_new_post(&mut self) -> Result<(), ProviderError>;

    // ---- Composite content operations ----

    /// Set the post title.
    async fn set_title(&mut self, title: &str) -> Result<(), ProviderError>;

    /// Set the post body.
    async fn set_body(&mut self, body: &str) -> Result<(), ProviderError>;

    /// Upload an image to the media library (does not insert it into the body).
    async fn upload_to_media_library(&mut self, image: &Image) -> Result<(), ProviderError>;

    /// Upload a batch of images to the media library. Upload order is
    /// unspecified (insertion order is handled separately and is not).
    /// Providers that can issue concurrent upload requests safely should
    /// override this to do so, bounded by `max_concurrent`; the default
    /// uploads sequentially. Returns one result per input image, in input
    /// order.
    async fn upload_images_batch(
        &mut self,
        images: &[Image],
        max_concurrent: usize,
    ) -> Vec<Result<(), ProviderError>> {
        let _ = max_concurrent;
        let mut results = Vec::with_capacity(images.len());
        for image in images {
            results.push(self.upload_to_media_library(image).await);
        }
        results
    }

    /// Insert a previously-uploaded image into the body at `paragraph_index`
    /// (`0` = before the first paragraph, `k` = after the k-th paragraph).
    async fn insert_image_at_position(
        &mut self,
        image: &Image,
        paragraph_index: u32,
    ) -> Result<(), ProviderError>;

    /// Designate an already-uploaded image as the featured image.
    async fn set_featured_image(&mut self, image: &Image) -> Result<(), ProviderError>;

    /// Assign categories and tags.
    async fn set_taxonomy(&mut self, taxonomy: &Taxonomy) -> Result<(), ProviderError>;

    /// Configure the detected SEO plugin. Emits `SEO_PLUGIN_MISSING` as a
    /// non-fatal warning (not an `Err`) when no plugin is detected; callers
    /// distinguish via `SeoOutcome`.
    async fn set_seo(&mut self, seo: &Seo) -> Result<SeoOutcome, ProviderError>;

    /// Append a related-articles block linking to the given `(title, url)` pairs.
    async fn insert_related_articles(
        &mut self,
        articles: &[(String, String)],
    ) -> Result<(), ProviderError>;

    /// Append FAQ schema (and visible FAQ content) for the given pairs.
    async fn insert_faq_schema(&mut self, faqs: &[crate::model::Faq]) -> Result<(), ProviderError>;

    // ---- Terminal operations ----

    /// Save the current content as a draft.
    async fn save_draft(&mut self) -> Result<(), ProviderError>;

    /// Publish immediately. Invoked at most once per run.
    async fn publish(&mut self) -> Result<(), ProviderError>;

    /// Schedule for a future Unix timestamp. Invoked at most once per run.
    async fn schedule(&mut self, at: i64) -> Result<(), ProviderError>;

    /// Read back the published/scheduled URL after a terminal call.
    async fn get_published_url(&mut self) -> Result<Option<String>, ProviderError>;

    // ---- Introspection (used by the safety validator) ----

    /// Whether the post is currently in draft status.
    async fn verify_draft_status(&mut self) -> Result<bool, ProviderError>;

    /// Whether the latest content edits have been persisted.
    async fn verify_content_saved(&mut self) -> Result<bool, ProviderError>;

    /// The CMS-assigned post ID, if a post has been created.
    async fn get_current_post_id(&mut self) -> Result<Option<String>, ProviderError>;

    // ---- Cost instrumentation ----

    /// Accumulated real cost in USD tracked internally by this provider
    /// (e.g. from LLM token usage), if it tracks one. Providers with a
    /// fixed per-call cost (the DOM provider) return `0.0` here and are
    /// costed by the caller instead.
    fn accumulated_cost_usd(&self) -> f64 {
        0.0
    }
}

/// Result of attempting to configure SEO metadata: which plugin (if any)
/// was detected and configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeoOutcome {
    /// SEO metadata was applied through the named plugin.
    Configured {
        /// Vendor name, e.g. `"yoast"`, `"rank_math"`, `"all_in_one"`.
        plugin: String,
    },
    /// No supported SEO plugin was detected on the page.
    NoPluginDetected,
}
