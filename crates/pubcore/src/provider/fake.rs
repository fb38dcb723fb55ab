//! In-memory provider test double (§A.4).
//!
//! Drives the orchestrator state machine deterministically in tests
//! without a real browser or LLM. Failures are injected per-primitive,
//! per-call-count, so tests can reproduce exact retry/failover sequences
//! (e.g. "fail `fill_input` on attempts 1 and 2, succeed on 3").

use super::{PublishingProvider, SeoOutcome};
use crate::error::{ErrorKind, ProviderError};
use crate::model::{Cookie, Credentials, Faq, Image, Seo, Taxonomy};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};

/// A scripted failure: fail with `kind` on the `nth` call to `primitive`
/// (1-indexed), then behave normally.
#[derive(Debug, Clone)]
pub struct ScriptedFailure {
    /// The primitive name (matches the method name, e.g. `"set_title"`).
    pub primitive: &'static str,
    /// Which call number to fail (1-indexed).
    pub nth: u32,
    /// The error kind to fail with.
    pub kind: ErrorKind,
}

/// Deterministic fake implementing [`PublishingProvider`].
pub struct FakeProvider {
    name: &'static str,
    call_counts: HashMap<&'static str, u32>,
    failures: HashMap<&'static str, VecDeque<(u32, ErrorKind)>>,
    initialized: bool,
    cookies: Vec<Cookie>,
    title: Option<String>,
    body: Option<String>,
    draft_saved: bool,
    published: bool,
    scheduled_at: Option<i64>,
    published_url: Option<String>,
    post_id: Option<String>,
    uploaded_images: Vec<String>,
    inserted_positions: Vec<u32>,
    taxonomy: Option<Taxonomy>,
    seo_outcome: SeoOutcome,
}

impl FakeProvider {
    /// Construct a fake with the given display name and no scripted failures.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            call_counts: HashMap::new(),
            failures: HashMap::new(),
            initialized: false,
            cookies: Vec::new(),
            title: None,
            body: None,
            draft_saved: false,
            published: false,
            scheduled_at: None,
            published_url: None,
            post_id: None,
            uploaded_images: Vec::new(),
            inserted_positions: Vec::new(),
            taxonomy: None,
            seo_outcome: SeoOutcome::Configured {
                plugin: "yoast".to_string(),
            },
        }
    }

    /// Script one or more failures for this fake.
    pub fn with_failures(mut self, failures: Vec<ScriptedFailure>) -> Self {
        for f in failures {
            self.failures
                .entry(f.primitive)
                .or_default()
                .push_back((f.nth, f.kind));
        }
        self
    }

    /// Override the SEO outcome returned by `set_seo`.
    pub fn with_seo_outcome(mut self, outcome: SeoOutcome) -> Self {
        self.seo_outcome = outcome;
        self
    }

    /// The order in which `insert_image_at_position` was called, by
    /// paragraph index, as actually observed — used to assert §8's image
    /// ordering invariant.
    pub fn inserted_positions(&self) -> &[u32] {
        &self.inserted_positions
    }

    /// Number of times the publish terminal call was attempted.
    pub fn publish_call_count(&self) -> u32 {
        *self.call_counts.get("publish").unwrap_or(&0)
    }

    fn maybe_fail(&mut self, primitive: &'static str) -> Result<(), ProviderError> {
        let count = self.call_counts.entry(primitive).or_insert(0);
        *count += 1;
        let current = *count;
        if let Some(queue) = self.failures.get_mut(primitive) {
            if let Some(&(nth, kind)) = queue.front() {
                if nth == current {
                    queue.pop_front();
                    return Err(ProviderError::new(
                        kind,
                        format!("fake: scripted failure on {primitive} call #{current}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PublishingProvider for FakeProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(
        &mut self,
        _cms_base_url: &str,
        session_cookies: Option<Vec<Cookie>>,
    ) -> Result<(), ProviderError> {
        self.maybe_fail("initialize")?;
        self.initialized = true;
        if let Some(cookies) = session_cookies {
            self.cookies = cookies;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        self.maybe_fail("close")?;
        self.initialized = false;
        Ok(())
    }

    async fn get_cookies(&self) -> Result<Vec<Cookie>, ProviderError> {
        Ok(self.cookies.clone())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, ProviderError> {
        Ok(vec![0u8; 4])
    }

    async fn login(
        &mut self,
        _credentials: &Credentials,
        session_cookies_present: bool,
    ) -> Result<(), ProviderError> {
        self.maybe_fail("login")?;
        if !session_cookies_present {
            self.cookies = vec![Cookie {
                name: "session".to_string(),
                value: "fake-session-token".to_string(),
                domain: "cms.test".to_string(),
            }];
        }
        Ok(())
    }

    async fn navigate(&mut self, _url: &str) -> Result<(), ProviderError> {
        self.maybe_fail("navigate")
    }

    async fn navigate_to_new_post(&mut self) -> Result<(), ProviderError> {
        self.maybe_fail("navigate_to_new_post")?;
        self.post_id = Some("post-1".to_string());
        Ok(())
    }

    async fn set_title(&mut self, title: &str) -> Result<(), ProviderError> {
        self.maybe_fail("set_title")?;
        self.title = Some(title.to_string());
        Ok(())
    }

    async fn set_body(&mut self, body: &str) -> Result<(), ProviderError> {
        self.maybe_fail("set_body")?;
        self.body = Some(body.to_string());
        Ok(())
    }

    async fn upload_to_media_library(&mut self, image: &Image) -> Result<(), ProviderError> {
        self.maybe_fail("upload_to_media_library")?;
        self.uploaded_images.push(image.filename.clone());
        Ok(())
    }

    async fn insert_image_at_position(
        &mut self,
        _image: &Image,
        paragraph_index: u32,
    ) -> Result<(), ProviderError> {
        self.maybe_fail("insert_image_at_position")?;
        self.inserted_positions.push(paragraph_index);
        Ok(())
    }

    async fn set_featured_image(&mut self, _image: &Image) -> Result<(), ProviderError> {
        self.maybe_fail("set_featured_image")
    }

    async fn set_taxonomy(&mut self, taxonomy: &Taxonomy) -> Result<(), ProviderError> {
        self.maybe_fail("set_taxonomy")?;
        self.taxonomy = Some(taxonomy.clone());
        Ok(())
    }

    async fn set_seo(&mut self, _seo: &Seo) -> Result<SeoOutcome, ProviderError> {
        self.maybe_fail("set_seo")?;
        Ok(self.seo_outcome.clone())
    }

    async fn insert_related_articles(
        &mut self,
        _articles: &[(String, String)],
    ) -> Result<(), ProviderError> {
        self.maybe_fail("insert_related_articles")
    }

    async fn insert_faq_schema(&mut self, _faqs: &[Faq]) -> Result<(), ProviderError> {
        self.maybe_fail("insert_faq_schema")
    }

    async fn save_draft(&mut self) -> Result<(), ProviderError> {
        self.maybe_fail("save_draft")?;
        self.draft_saved = true;
        Ok(())
    }

    async fn publish(&mut self) -> Result<(), ProviderError> {
        self.maybe_fail("publish")?;
        self.published = true;
        self.published_url = Some(format!(
            "https://example.test/{}",
            self.post_id.clone().unwrap_or_else(|| "post-1".to_string())
        ));
        Ok(())
    }

    async fn schedule(&mut self, at: i64) -> Result<(), ProviderError> {
        self.maybe_fail("schedule")?;
        self.scheduled_at = Some(at);
        self.published_url = Some(format!(
            "https://example.test/{}",
            self.post_id.clone().unwrap_or_else(|| "post-1".to_string())
        ));
        Ok(())
    }

    async fn get_published_url(&mut self) -> Result<Option<String>, ProviderError> {
        self.maybe_fail("get_published_url")?;
        Ok(self.published_url.clone())
    }

    async fn verify_draft_status(&mut self) -> Result<bool, ProviderError> {
        self.maybe_fail("verify_draft_status")?;
        Ok(self.draft_saved)
    }

    async fn verify_content_saved(&mut self) -> Result<bool, ProviderError> {
        self.maybe_fail("verify_content_saved")?;
        Ok(self.title.is_some() && self.body.is_some())
    }

    async fn get_current_post_id(&mut self) -> Result<Option<String>, ProviderError> {
        self.maybe_fail("get_current_post_id")?;
        Ok(self.post_id.clone())
    }
}
