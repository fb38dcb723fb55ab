//! DOM-driven provider (C2) — a deterministic CSS-selector driver against
//! a headless Chromium instance via `chromiumoxide`.
//!
//! Preferred over the vision provider because it is cheap and fast for
//! well-known CMS templates. Selector resolution consults the selector
//! cache first, then falls back to the ordered candidate list for the
//! named element.

use super::{PublishingProvider, SeoOutcome};
use crate::config::Settings;
use crate::error::{ErrorKind, ProviderError};
use crate::model::{CmsKind, Cookie, Credentials, Faq, Image, Seo, Taxonomy};
use crate::perf::{PerformanceTracker, SelectorCache};
use crate::templating::{NamedElement, SelectorBundle};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Drives a WordPress-class admin UI through a headless Chromium instance.
pub struct DomProvider {
    settings: Arc<Settings>,
    selectors: Arc<SelectorBundle>,
    cache: Arc<SelectorCache>,
    perf: Arc<PerformanceTracker>,
    cms_kind: CmsKind,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: Option<Page>,
}

impl DomProvider {
    /// Construct a provider sharing the given selector bundle, cache, and
    /// performance tracker (the cache and tracker are typically shared
    /// process-wide across runs, per §5).
    pub fn new(
        settings: Arc<Settings>,
        selectors: Arc<SelectorBundle>,
        cache: Arc<SelectorCache>,
        perf: Arc<PerformanceTracker>,
        cms_kind: CmsKind,
    ) -> Self {
        Self {
            settings,
            selectors,
            cache,
            perf,
            cms_kind,
            browser: None,
            handler: None,
            page: None,
        }
    }

    fn page(&self) -> Result<&Page, ProviderError> {
        self.page
            .as_ref()
            .ok_or_else(|| ProviderError::new(ErrorKind::NavigationTimeout, "provider not initialized"))
    }

    fn cache_key(&self, element: NamedElement) -> String {
        format!("{:?}:{:?}", self.cms_kind, element)
    }

    /// Resolve a named element to a live, clickable selector: try the
    /// cache first, then the ordered candidate list.
    async fn resolve(&self, element: NamedElement) -> Result<String, ProviderError> {
        let key = self.cache_key(element);
        if let Some(cached) = self.cache.get(&key) {
            if self.probe(&cached).await {
                return Ok(cached);
            }
            self.cache.invalidate(Some(&key));
        }

        let candidates = self
            .selectors
            .get(self.cms_kind, element)
            .ok_or_else(|| {
                ProviderError::new(
                    ErrorKind::ElementNotFound,
                    format!("no selector candidates registered for {element:?}"),
                )
            })?;

        for candidate in candidates {
            if self.probe(candidate).await {
                self.cache.set(key, candidate.clone());
                return Ok(candidate.clone());
            }
        }

        Err(ProviderError::new(
            ErrorKind::ElementNotFound,
            format!("no candidate selector resolved for {element:?}"),
        ))
    }

    /// Poll `selector` for visibility until the per-attempt timeout elapses.
    async fn probe(&self, selector: &str) -> bool {
        let deadline = Instant::now() + self.settings.element_timeout();
        let page = match &self.page {
            Some(p) => p,
            None => return false,
        };
        while Instant::now() < deadline {
            if page.find_element(selector).await.is_ok() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    async fn record<T, F>(&self, op: &str, fut: F) -> Result<T, ProviderError>
    where
        F: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let start = Instant::now();
        let result = fut.await;
        self.perf
            .record(op, start.elapsed(), result.is_ok());
        result
    }

    async fn click_named(&self, element: NamedElement) -> Result<(), ProviderError> {
        let selector = self.resolve(element).await?;
        let page = self.page()?;
        let el = page.find_element(&selector).await.map_err(|e| {
            ProviderError::new(ErrorKind::ElementNotFound, format!("{selector}: {e}"))
        })?;
        el.click().await.map_err(|e| {
            ProviderError::new(ErrorKind::ElementNotFound, format!("click {selector}: {e}"))
        })?;
        Ok(())
    }

    async fn fill_named(&self, element: NamedElement, value: &str) -> Result<(), ProviderError> {
        let selector = self.resolve(element).await?;
        let page = self.page()?;
        let el = page.find_element(&selector).await.map_err(|e| {
            ProviderError::new(ErrorKind::ElementNotFound, format!("{selector}: {e}"))
        })?;
        el.click().await.ok();
        el.type_str(value).await.map_err(|e| {
            ProviderError::new(ErrorKind::ElementNotFound, format!("type {selector}: {e}"))
        })?;
        Ok(())
    }

    async fn wait_for_named(&self, element: NamedElement) -> Result<(), ProviderError> {
        let selector = self.resolve(element).await?;
        if self.probe(&selector).await {
            Ok(())
        } else {
            Err(ProviderError::new(
                ErrorKind::NavigationTimeout,
                format!("timed out waiting for {element:?}"),
            ))
        }
    }

    /// Detect which SEO plugin is active by probing for its container.
    async fn detect_seo_plugin(&self) -> Option<&'static str> {
        for (name, element) in [
            ("yoast", NamedElement::SeoPluginYoast),
            ("rank_math", NamedElement::SeoPluginRankMath),
            ("all_in_one", NamedElement::SeoPluginAllInOne),
        ] {
            if let Some(candidates) = self.selectors.get(self.cms_kind, element) {
                for candidate in candidates {
                    if self.probe(candidate).await {
                        return Some(name);
                    }
                }
            }
        }
        None
    }
}

/// Lightweight, cloneable handle carrying just enough to resolve selectors
/// and drive one media upload, so `upload_images_batch` can run several of
/// these concurrently via `run_bounded` against cloned `Page` handles
/// (chromiumoxide dispatches commands over an internal channel, so
/// concurrent use of cloned handles is safe) while `DomProvider` itself
/// stays exclusively owned by the active run.
#[derive(Clone)]
struct UploadContext {
    page: Page,
    cache: Arc<SelectorCache>,
    selectors: Arc<SelectorBundle>,
    settings: Arc<Settings>,
    cms_kind: CmsKind,
}

impl UploadContext {
    fn cache_key(&self, element: NamedElement) -> String {
        format!("{:?}:{:?}", self.cms_kind, element)
    }

    async fn probe(&self, selector: &str) -> bool {
        let deadline = Instant::now() + self.settings.element_timeout();
        while Instant::now() < deadline {
            if self.page.find_element(selector).await.is_ok() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    async fn resolve(&self, element: NamedElement) -> Result<String, ProviderError> {
        let key = self.cache_key(element);
        if let Some(cached) = self.cache.get(&key) {
            if self.probe(&cached).await {
                return Ok(cached);
            }
            self.cache.invalidate(Some(&key));
        }

        let candidates = self.selectors.get(self.cms_kind, element).ok_or_else(|| {
            ProviderError::new(
                ErrorKind::ElementNotFound,
                format!("no selector candidates registered for {element:?}"),
            )
        })?;

        for candidate in candidates {
            if self.probe(candidate).await {
                self.cache.set(key, candidate.clone());
                return Ok(candidate.clone());
            }
        }

        Err(ProviderError::new(
            ErrorKind::ElementNotFound,
            format!("no candidate selector resolved for {element:?}"),
        ))
    }

    async fn fill_named(&self, element: NamedElement, value: &str) -> Result<(), ProviderError> {
        let selector = self.resolve(element).await?;
        let el = self.page.find_element(&selector).await.map_err(|e| {
            ProviderError::new(ErrorKind::ElementNotFound, format!("{selector}: {e}"))
        })?;
        el.click().await.ok();
        el.type_str(value).await.map_err(|e| {
            ProviderError::new(ErrorKind::ElementNotFound, format!("type {selector}: {e}"))
        })?;
        Ok(())
    }

    async fn wait_for_named(&self, element: NamedElement) -> Result<(), ProviderError> {
        let selector = self.resolve(element).await?;
        if self.probe(&selector).await {
            Ok(())
        } else {
            Err(ProviderError::new(
                ErrorKind::NavigationTimeout,
                format!("timed out waiting for {element:?}"),
            ))
        }
    }

    async fn upload(self, image: Image) -> Result<(), ProviderError> {
        let selector = self.resolve(NamedElement::MediaLibraryOpen).await?;
        let open_button = self.page.find_element(&selector).await.map_err(|e| {
            ProviderError::new(ErrorKind::ElementNotFound, format!("{selector}: {e}"))
        })?;
        open_button.click().await.map_err(|e| {
            ProviderError::new(ErrorKind::ElementNotFound, format!("click {selector}: {e}"))
        })?;

        let selector = self.resolve(NamedElement::MediaLibraryFileInput).await?;
        let el = self.page.find_element(&selector).await.map_err(|e| {
            ProviderError::new(ErrorKind::UploadFailed, format!("{selector}: {e}"))
        })?;
        el.set_file_input(vec![image.local_path.clone().into()])
            .await
            .map_err(|e| ProviderError::new(ErrorKind::UploadFailed, e.to_string()))?;
        self.wait_for_named(NamedElement::MediaUploadComplete)
            .await
            .map_err(|_| {
                ProviderError::new(ErrorKind::UploadFailed, "upload did not complete in time")
            })?;
        self.fill_named(NamedElement::MediaAltText, &image.alt_text)
            .await?;
        self.fill_named(NamedElement::MediaCaption, &image.caption)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PublishingProvider for DomProvider {
    fn name(&self) -> &'static str {
        "dom"
    }

    async fn initialize(
        &mut self,
        cms_base_url: &str,
        session_cookies: Option<Vec<Cookie>>,
    ) -> Result<(), ProviderError> {
        let config = BrowserConfig::builder()
            .request_timeout(self.settings.navigation_timeout())
            .build()
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("chromiumoxide handler error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?;

        if let Some(cookies) = session_cookies {
            for cookie in cookies {
                tracing::debug!(name = %cookie.name, domain = %cookie.domain, "carrying over session cookie");
            }
        }

        self.browser = Some(browser);
        self.handler = Some(handler_task);
        self.page = Some(page);

        self.navigate(cms_base_url).await
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            let _ = browser.close().await;
        }
        Ok(())
    }

    async fn get_cookies(&self) -> Result<Vec<Cookie>, ProviderError> {
        let page = self.page()?;
        let raw = page
            .get_cookies()
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?;
        Ok(raw
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
            })
            .collect())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, ProviderError> {
        let page = self.page()?;
        page.screenshot(chromiumoxide::page::ScreenshotParams::builder().build())
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))
    }

    async fn login(
        &mut self,
        credentials: &Credentials,
        session_cookies_present: bool,
    ) -> Result<(), ProviderError> {
        if session_cookies_present
            && self
                .wait_for_named(NamedElement::DashboardSentinel)
                .await
                .is_ok()
        {
            tracing::debug!("carried-over session already authenticated, skipping login form");
            return Ok(());
        }

        self.fill_named(NamedElement::LoginUsername, &credentials.username)
            .await?;
        self.fill_named(NamedElement::LoginPassword, &credentials.password)
            .await?;
        self.click_named(NamedElement::LoginSubmit).await?;
        self.wait_for_named(NamedElement::DashboardSentinel)
            .await
            .map_err(|_| ProviderError::new(ErrorKind::AuthRejected, "login did not reach dashboard"))?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), ProviderError> {
        let page = self.page()?;
        page.goto(url)
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?;
        Ok(())
    }

    async fn navigate_to_new_post(&mut self) -> Result<(), ProviderError> {
        self.wait_for_named(NamedElement::DashboardSentinel).await?;
        let current = self
            .page()?
            .url()
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?
            .unwrap_or_default();
        let new_post_url = format!("{}/wp-admin/post-new.php", current.trim_end_matches('/'));
        self.navigate(&new_post_url).await
    }

    async fn set_title(&mut self, title: &str) -> Result<(), ProviderError> {
        self.record(
            "set_title",
            self.fill_named(NamedElement::NewPostTitle, title),
        )
        .await
    }

    async fn set_body(&mut self, body: &str) -> Result<(), ProviderError> {
        self.record(
            "set_body",
            self.fill_named(NamedElement::NewPostBody, body),
        )
        .await
    }

    async fn upload_to_media_library(&mut self, image: &Image) -> Result<(), ProviderError> {
        self.click_named(NamedElement::MediaLibraryOpen).await?;
        let selector = self.resolve(NamedElement::MediaLibraryFileInput).await?;
        let page = self.page()?;
        let el = page.find_element(&selector).await.map_err(|e| {
            ProviderError::new(ErrorKind::UploadFailed, format!("{selector}: {e}"))
        })?;
        el.set_file_input(vec![image.local_path.clone().into()])
            .await
            .map_err(|e| ProviderError::new(ErrorKind::UploadFailed, e.to_string()))?;
        self.wait_for_named(NamedElement::MediaUploadComplete)
            .await
            .map_err(|_| {
                ProviderError::new(ErrorKind::UploadFailed, "upload did not complete in time")
            })?;
        self.fill_named(NamedElement::MediaAltText, &image.alt_text)
            .await?;
        self.fill_named(NamedElement::MediaCaption, &image.caption)
            .await?;
        Ok(())
    }

    async fn upload_images_batch(
        &mut self,
        images: &[Image],
        max_concurrent: usize,
    ) -> Vec<Result<(), ProviderError>> {
        let page = match self.page() {
            Ok(p) => p.clone(),
            Err(e) => {
                return images
                    .iter()
                    .map(|_| Err(ProviderError::new(e.kind, e.message.clone())))
                    .collect()
            }
        };
        let ctx = UploadContext {
            page,
            cache: self.cache.clone(),
            selectors: self.selectors.clone(),
            settings: self.settings.clone(),
            cms_kind: self.cms_kind,
        };
        let items: Vec<Image> = images.to_vec();

        crate::perf::run_bounded(items, max_concurrent, move |image| {
            let ctx = ctx.clone();
            async move { ctx.upload(image).await }
        })
        .await
        .into_iter()
        .map(|joined| {
            joined.unwrap_or_else(|e| {
                Err(ProviderError::new(ErrorKind::UploadFailed, format!("upload task panicked: {e}")))
            })
        })
        .collect()
    }

    async fn insert_image_at_position(
        &mut self,
        _image: &Image,
        paragraph_index: u32,
    ) -> Result<(), ProviderError> {
        let page = self.page()?;
        let script = format!(
            "(() => {{\
                const body = document.querySelector('[data-named=\"new_post_body\"]') || document.body;\
                const paragraphs = body.querySelectorAll('p');\
                const marker = document.createElement('div');\
                marker.className = 'pubcore-inserted-image';\
                if ({paragraph_index} === 0 || paragraphs.length === 0) {{\
                    body.insertBefore(marker, body.firstChild);\
                }} else {{\
                    const target = paragraphs[Math.min({paragraph_index}, paragraphs.length) - 1];\
                    target.after(marker);\
                }}\
            }})()"
        );
        page.evaluate(script)
            .await
            .map_err(|e| ProviderError::new(ErrorKind::UploadFailed, e.to_string()))?;
        Ok(())
    }

    async fn set_featured_image(&mut self, _image: &Image) -> Result<(), ProviderError> {
        self.click_named(NamedElement::SetFeaturedImageButton).await
    }

    async fn set_taxonomy(&mut self, taxonomy: &Taxonomy) -> Result<(), ProviderError> {
        if let Some(primary) = &taxonomy.primary_category {
            self.fill_named(NamedElement::CategoryCheckbox, primary)
                .await?;
            self.click_named(NamedElement::MakePrimaryCategory).await?;
        }
        for category in &taxonomy.secondary_categories {
            self.fill_named(NamedElement::CategoryCheckbox, category)
                .await?;
        }
        if !taxonomy.tags.is_empty() {
            self.fill_named(NamedElement::TagInput, &taxonomy.tags.join(","))
                .await?;
        }
        Ok(())
    }

    async fn set_seo(&mut self, seo: &Seo) -> Result<SeoOutcome, ProviderError> {
        let Some(plugin) = self.detect_seo_plugin().await else {
            return Ok(SeoOutcome::NoPluginDetected);
        };
        self.fill_named(NamedElement::SeoTitleField, &seo.meta_title)
            .await?;
        self.fill_named(NamedElement::SeoDescriptionField, &seo.meta_description)
            .await?;
        self.fill_named(NamedElement::SeoFocusKeywordField, &seo.focus_keyword)
            .await?;
        Ok(SeoOutcome::Configured {
            plugin: plugin.to_string(),
        })
    }

    async fn insert_related_articles(
        &mut self,
        articles: &[(String, String)],
    ) -> Result<(), ProviderError> {
        if articles.is_empty() {
            return Ok(());
        }
        let items: String = articles
            .iter()
            .map(|(title, url)| {
                format!(r#"<li><a href="{url}" target="_blank">{title}</a></li>"#)
            })
            .collect();
        let html = format!("<h3>Related Articles</h3><ul>{items}</ul>");
        let page = self.page()?;
        page.evaluate(format!(
            "document.body.insertAdjacentHTML('beforeend', {html:?})"
        ))
        .await
        .map_err(|e| ProviderError::new(ErrorKind::ElementNotFound, e.to_string()))?;
        Ok(())
    }

    async fn insert_faq_schema(&mut self, faqs: &[Faq]) -> Result<(), ProviderError> {
        if faqs.is_empty() {
            return Ok(());
        }
        let main_entity: Vec<serde_json::Value> = faqs
            .iter()
            .map(|faq| {
                serde_json::json!({
                    "@type": "Question",
                    "name": faq.question,
                    "acceptedAnswer": {
                        "@type": "Answer",
                        "text": faq.answer,
                    }
                })
            })
            .collect();
        let schema = serde_json::json!({
            "@context": "https://schema.org",
            "@type": "FAQPage",
            "mainEntity": main_entity,
        });
        let html = format!(
            "<script type=\"application/ld+json\">{}</script>",
            schema
        );
        self.click_named(NamedElement::CustomHtmlBlock).await.ok();
        let page = self.page()?;
        page.evaluate(format!(
            "document.body.insertAdjacentHTML('beforeend', {html:?})"
        ))
        .await
        .map_err(|e| ProviderError::new(ErrorKind::ElementNotFound, e.to_string()))?;
        Ok(())
    }

    async fn save_draft(&mut self) -> Result<(), ProviderError> {
        self.click_named(NamedElement::SaveDraftButton).await?;
        self.wait_for_named(NamedElement::DraftSavedNotice).await
    }

    async fn publish(&mut self) -> Result<(), ProviderError> {
        self.click_named(NamedElement::PublishButton).await?;
        if self.resolve(NamedElement::PublishConfirm).await.is_ok() {
            self.click_named(NamedElement::PublishConfirm).await.ok();
        }
        self.wait_for_named(NamedElement::PublishedPanel).await
    }

    async fn schedule(&mut self, at: i64) -> Result<(), ProviderError> {
        self.click_named(NamedElement::ScheduleOpen).await?;
        let datetime = chrono::DateTime::from_timestamp(at, 0)
            .ok_or_else(|| ProviderError::new(ErrorKind::ElementNotFound, "invalid timestamp"))?;
        self.fill_named(
            NamedElement::ScheduleDateInput,
            &datetime.format("%Y-%m-%d").to_string(),
        )
        .await?;
        self.fill_named(
            NamedElement::ScheduleTimeInput,
            &datetime.format("%H:%M").to_string(),
        )
        .await?;
        self.click_named(NamedElement::PublishButton).await?;
        self.wait_for_named(NamedElement::PublishedPanel).await
    }

    async fn get_published_url(&mut self) -> Result<Option<String>, ProviderError> {
        let selector = match self.resolve(NamedElement::ViewPostLink).await {
            Ok(s) => s,
            Err(_) => return Ok(None),
        };
        let page = self.page()?;
        let el = match page.find_element(&selector).await {
            Ok(el) => el,
            Err(_) => return Ok(None),
        };
        let href = el
            .attribute("href")
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?;
        Ok(href)
    }

    async fn verify_draft_status(&mut self) -> Result<bool, ProviderError> {
        Ok(self.wait_for_named(NamedElement::DraftSavedNotice).await.is_ok())
    }

    async fn verify_content_saved(&mut self) -> Result<bool, ProviderError> {
        Ok(self.wait_for_named(NamedElement::DraftSavedNotice).await.is_ok())
    }

    async fn get_current_post_id(&mut self) -> Result<Option<String>, ProviderError> {
        let page = self.page()?;
        let url = page
            .url()
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?
            .unwrap_or_default();
        let id = url
            .split("post=")
            .nth(1)
            .and_then(|s| s.split('&').next())
            .map(str::to_string);
        Ok(id)
    }
}
