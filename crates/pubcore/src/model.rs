//! Data model shared across the provider, safety, recovery, and orchestrator
//! modules — the nouns of a publishing run.
//!
//! Every type here derives `Serialize`/`Debug` so a run is fully
//! introspectable by external collaborators (audit logs, debug surfaces).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the orchestrator should do with the article once content phases
/// complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishIntent {
    /// Leave the post as a draft; no terminal write beyond save-draft.
    SaveDraft,
    /// Publish immediately.
    PublishNow,
    /// Publish at a future time.
    Schedule {
        /// Unix timestamp (seconds) the post should go live.
        at: i64,
    },
}

impl PublishIntent {
    /// Short machine-readable name, used in logs and metrics labels.
    pub fn label(&self) -> &'static str {
        match self {
            PublishIntent::SaveDraft => "save_draft",
            PublishIntent::PublishNow => "publish_now",
            PublishIntent::Schedule { .. } => "schedule",
        }
    }
}

/// CMS login credentials. Opaque at the core — never logged, never
/// included in `Debug` output beyond the username.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// CMS account username.
    pub username: String,
    /// CMS account password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Which CMS family a provider targets. Used to key selector/instruction
/// bundle lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmsKind {
    /// WordPress-family admin UI (classic editor or Gutenberg).
    WordPress,
}

/// A single article body plus SEO metadata, ready to be published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// The post title.
    pub title: String,
    /// Rendered HTML body.
    pub body: String,
    /// Optional short excerpt/summary.
    pub excerpt: Option<String>,
    /// SEO metadata for the active SEO plugin.
    pub seo: Seo,
    /// Byline, if the CMS tracks multiple authors.
    pub author: Option<String>,
}

/// Minimum title length (§3 Article invariant).
pub const MIN_TITLE_LEN: usize = 5;
/// Minimum body length (§3 Article invariant).
pub const MIN_BODY_LEN: usize = 50;

impl Article {
    /// Whether the title meets the minimum-length invariant.
    pub fn title_valid(&self) -> bool {
        self.title.chars().count() >= MIN_TITLE_LEN
    }

    /// Whether the body meets the minimum-length invariant.
    pub fn body_valid(&self) -> bool {
        self.body.chars().count() >= MIN_BODY_LEN
    }
}

/// SEO metadata for the configured SEO plugin (Yoast, Rank Math, etc).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seo {
    /// SEO title, distinct from the on-page title.
    pub meta_title: String,
    /// Meta description shown in search results.
    pub meta_description: String,
    /// The single focus keyword the plugin scores against.
    pub focus_keyword: String,
    /// Primary keywords to target.
    pub primary_keywords: Vec<String>,
    /// Secondary/supporting keywords.
    pub secondary_keywords: Vec<String>,
    /// Canonical URL override.
    pub canonical: Option<String>,
    /// Open Graph title override.
    pub og_title: Option<String>,
    /// Open Graph description override.
    pub og_description: Option<String>,
}

/// An image to be uploaded to the media library and inserted into the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    /// Local filesystem path to the image asset.
    pub local_path: String,
    /// Filename to use when uploading.
    pub filename: String,
    /// Alt text set on upload.
    pub alt_text: String,
    /// Caption shown under the image.
    pub caption: String,
    /// Paragraph index to insert after (`0` = before the first paragraph).
    pub position: u32,
    /// Whether this image should also be set as the featured image.
    pub is_featured: bool,
    /// Original remote URL the image was sourced from, if any.
    pub source_url: Option<String>,
}

/// Images in ascending-`position` insertion order (§5: uploading order is
/// unspecified, but each image's insert call must precede one with a
/// greater position).
pub fn images_in_insertion_order(images: &[Image]) -> Vec<Image> {
    let mut ordered = images.to_vec();
    ordered.sort_by_key(|i| i.position);
    ordered
}

/// Category/tag assignment for a post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Taxonomy {
    /// The single primary category, if one is designated.
    pub primary_category: Option<String>,
    /// Additional non-primary categories.
    pub secondary_categories: Vec<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
}

/// A single frequently-asked-question pair, in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Faq {
    /// The question text.
    pub question: String,
    /// The answer text.
    pub answer: String,
}

/// Target CMS connection info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetCms {
    /// Base URL of the CMS admin UI.
    pub url: String,
    /// Which CMS family this is.
    pub kind: CmsKind,
}

/// A single named cookie, as captured from or handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Cookie domain.
    pub domain: String,
}

/// The immutable input to a single publishing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    /// The article content.
    pub article: Article,
    /// Images to upload and place in the body.
    pub images: Vec<Image>,
    /// Category/tag assignment.
    pub taxonomy: Taxonomy,
    /// FAQ entries to render as schema + visible content.
    pub faqs: Vec<Faq>,
    /// `(title, url)` pairs to render as a related-articles block.
    /// Sourced upstream (not parsed or generated by this core); an empty
    /// list skips `InsertRelated`.
    pub related_articles: Vec<(String, String)>,
    /// What to do at the terminal phase.
    pub intent: PublishIntent,
    /// Target CMS connection info.
    pub target_cms: TargetCms,
    /// Login credentials.
    pub credentials: Credentials,
}

/// The canonical phase sequence, in execution order. Parenthesized phases
/// in the design (`PROCESS_IMAGES`, `SET_SEO`, `SET_TAXONOMY`,
/// `INSERT_RELATED`, `INSERT_FAQ_SCHEMA`) are skipped when their inputs
/// are empty but still appear here as the canonical ordering reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Construct/initialize the provider against the target CMS.
    Initialize,
    /// Log in, reusing session cookies if present.
    Login,
    /// Set title and body.
    FillContent,
    /// Persist the draft so later phases have a saved post to act on.
    SaveDraft,
    /// Upload and insert images, ascending by position.
    ProcessImages,
    /// Configure the detected SEO plugin.
    SetSeo,
    /// Assign categories and tags.
    SetTaxonomy,
    /// Append related-articles links.
    InsertRelated,
    /// Append FAQ schema + visible FAQ content.
    InsertFaqSchema,
    /// Run the preflight safety validator.
    SafetyGate,
    /// Issue the terminal publish/schedule/save-draft call.
    Terminal,
    /// Read back the published URL.
    CaptureUrl,
    /// Release the provider's resources.
    Close,
}

impl Phase {
    /// The full canonical ordering, used to validate that
    /// `completed_phases` is always a prefix of this sequence.
    pub const SEQUENCE: [Phase; 12] = [
        Phase::Initialize,
        Phase::Login,
        Phase::FillContent,
        Phase::SaveDraft,
        Phase::ProcessImages,
        Phase::SetSeo,
        Phase::SetTaxonomy,
        Phase::InsertRelated,
        Phase::InsertFaqSchema,
        Phase::SafetyGate,
        Phase::Terminal,
        Phase::CaptureUrl,
    ];

    /// Phases that are skipped when their corresponding input is empty.
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            Phase::ProcessImages
                | Phase::SetSeo
                | Phase::SetTaxonomy
                | Phase::InsertRelated
                | Phase::InsertFaqSchema
        )
    }
}

/// Mutable run-scoped state threaded through the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishContext {
    /// Unique identifier for this run.
    pub task_id: String,
    /// The immutable request this context is driving.
    pub request: PublishRequest,
    /// Name of the provider currently driving the run ("dom" or "llm").
    pub current_provider_name: String,
    /// Cookies captured from the active provider, carried across failover.
    pub session_cookies: Vec<Cookie>,
    /// Phases that have completed successfully, in order.
    pub completed_phases: Vec<Phase>,
    /// Retries attempted on the current phase since the last failover.
    pub retry_count: u32,
    /// Whether failover to the fallback provider has occurred.
    pub fallback_triggered: bool,
    /// The published/scheduled URL, once known.
    pub published_url: Option<String>,
    /// Unix timestamp (seconds) the run started.
    pub started_at: i64,
    /// Accumulated cost estimate in USD across both providers.
    pub cost_usd: f64,
    /// References to screenshots captured at failing steps, in order.
    pub screenshots: Vec<String>,
}

impl PublishContext {
    /// Construct a fresh context for a new run.
    pub fn new(task_id: String, request: PublishRequest, started_at: i64) -> Self {
        Self {
            task_id,
            request,
            current_provider_name: String::new(),
            session_cookies: Vec::new(),
            completed_phases: Vec::new(),
            retry_count: 0,
            fallback_triggered: false,
            published_url: None,
            started_at,
            cost_usd: 0.0,
            screenshots: Vec::new(),
        }
    }

    /// Record a phase as completed.
    pub fn record_completed(&mut self, phase: Phase) {
        self.completed_phases.push(phase);
    }
}

/// Outcome of a single phase execution, as recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseOutcome {
    /// Succeeded on the first attempt.
    Success,
    /// Succeeded after one or more retries.
    Retried,
    /// Failed after exhausting retries (and failover, if available).
    Failed,
}

/// A single audit entry for one phase attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    /// The action performed (e.g. `"fill_input:new_post_title"`).
    pub action: String,
    /// The named target the action operated on, if any.
    pub target: Option<String>,
    /// The outcome of the attempt.
    pub outcome: PhaseOutcome,
    /// Reference to a screenshot captured at this step, if any.
    pub screenshot_ref: Option<String>,
    /// Free-form structured metadata (provider name, retry count, etc).
    pub metadata: HashMap<String, String>,
}

/// The classified error reported on a failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultError {
    /// The taxonomy value this failure falls under.
    pub kind: crate::error::ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// The terminal, caller-facing result of a publishing run. Populated
/// exactly once, regardless of success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    /// Whether the run ended in a publishable/published state.
    pub success: bool,
    /// The task ID this result belongs to.
    pub task_id: String,
    /// The published/scheduled URL, if known.
    pub url: Option<String>,
    /// Which provider ultimately drove the terminal phase.
    pub provider_used: String,
    /// Whether failover to the fallback provider occurred.
    pub fallback_triggered: bool,
    /// Total retries across the run.
    pub retry_count: u32,
    /// Wall-clock duration of the run, in seconds.
    pub duration_seconds: f64,
    /// Estimated cost of the run, in USD.
    pub cost_usd: f64,
    /// The classified failure, if any.
    pub error: Option<ResultError>,
    /// Non-fatal warnings surfaced during the run (e.g. `AMBIGUOUS_PUBLISH`).
    pub warnings: Vec<String>,
    /// Per-phase audit trail.
    pub phases: Vec<PhaseResult>,
    /// References to screenshots captured during the run.
    pub screenshots: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_length_boundary() {
        let mut article = Article {
            title: "x".repeat(5),
            body: "x".repeat(50),
            excerpt: None,
            seo: Seo::default(),
            author: None,
        };
        assert!(article.title_valid());
        article.title = "x".repeat(4);
        assert!(!article.title_valid());
    }

    #[test]
    fn body_length_boundary() {
        let mut article = Article {
            title: "hello".to_string(),
            body: "x".repeat(50),
            excerpt: None,
            seo: Seo::default(),
            author: None,
        };
        assert!(article.body_valid());
        article.body = "x".repeat(49);
        assert!(!article.body_valid());
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn phase_sequence_is_canonical_order() {
        assert_eq!(Phase::SEQUENCE[0], Phase::Initialize);
        assert_eq!(Phase::SEQUENCE[9], Phase::SafetyGate);
        assert_eq!(*Phase::SEQUENCE.last().unwrap(), Phase::CaptureUrl);
    }

    #[test]
    fn conditional_phases_flagged() {
        assert!(Phase::ProcessImages.is_conditional());
        assert!(!Phase::Login.is_conditional());
        assert!(!Phase::SafetyGate.is_conditional());
    }

    #[test]
    fn publish_intent_label() {
        assert_eq!(PublishIntent::SaveDraft.label(), "save_draft");
        assert_eq!(PublishIntent::Schedule { at: 0 }.label(), "schedule");
    }
}
