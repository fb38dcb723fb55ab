//! Vision/LLM-driven provider (C3) — acts on screenshots through an LLM
//! instead of CSS selectors. Used as the fallback when the DOM provider's
//! selector candidates are exhausted, or as the primary provider for CMS
//! templates with no registered selector bundle.
//!
//! Every action is decided by asking the model "given this screenshot and
//! this instruction, what should happen next", then executing the model's
//! answer as a coordinate click or keystroke sequence against the same
//! underlying Chromium page the DOM provider would use.

use super::{PublishingProvider, SeoOutcome};
use crate::config::Settings;
use crate::error::{ErrorKind, ProviderError};
use crate::llm::{GenerationParams, ImageAttachment, LlmProvider};
use crate::model::{CmsKind, Cookie, Credentials, Faq, Image, Seo, Taxonomy};
use crate::templating::InstructionBundle;
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

const SYSTEM_PROMPT: &str = "You control a web browser showing a CMS admin screen. \
Given a screenshot and an instruction, respond with a single JSON object \
describing the next UI action: either {\"action\":\"click\",\"x\":..,\"y\":..} \
or {\"action\":\"type\",\"text\":\"...\"} or {\"action\":\"done\"}.";

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ModelAction {
    Click { x: f64, y: f64 },
    Type { text: String },
    Done,
}

/// Drives a CMS admin UI by describing screenshots to an LLM and executing
/// its proposed actions, rather than resolving CSS selectors directly.
pub struct VisionProvider {
    settings: Arc<Settings>,
    instructions: Arc<InstructionBundle>,
    llm: Arc<dyn LlmProvider>,
    cms_kind: CmsKind,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: Option<Page>,
    accumulated_cost_usd: f64,
}

impl VisionProvider {
    /// Construct a provider driving `cms_kind` through `llm`.
    pub fn new(
        settings: Arc<Settings>,
        instructions: Arc<InstructionBundle>,
        llm: Arc<dyn LlmProvider>,
        cms_kind: CmsKind,
    ) -> Self {
        Self {
            settings,
            instructions,
            llm,
            cms_kind,
            browser: None,
            handler: None,
            page: None,
            accumulated_cost_usd: 0.0,
        }
    }

    fn page(&self) -> Result<&Page, ProviderError> {
        self.page
            .as_ref()
            .ok_or_else(|| ProviderError::new(ErrorKind::NavigationTimeout, "provider not initialized"))
    }

    async fn screenshot_base64(&self) -> Result<String, ProviderError> {
        let bytes = self.capture_screenshot().await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Render the named action template and drive the page until the
    /// model reports the action is complete, up to `max_steps` model
    /// round-trips.
    async fn perform(
        &mut self,
        action_name: &str,
        vars: &HashMap<&str, String>,
    ) -> Result<(), ProviderError> {
        let instruction = self
            .instructions
            .render(action_name, vars)
            .map_err(|e| ProviderError::new(ErrorKind::ElementNotFound, e.to_string()))?;

        let max_steps = self.settings.vision_max_steps();
        for _ in 0..max_steps {
            let screenshot = self.screenshot_base64().await?;
            let response = self
                .llm
                .complete_with_images(
                    SYSTEM_PROMPT,
                    &instruction,
                    &[ImageAttachment {
                        media_type: "image/png".to_string(),
                        data_base64: screenshot,
                    }],
                    &GenerationParams {
                        max_tokens: 256,
                        temperature: 0.0,
                        system_prompt: None,
                    },
                )
                .await
                .map_err(|e| ProviderError::new(ErrorKind::ElementNotFound, e.to_string()))?;

            self.accumulated_cost_usd += crate::llm::pricing::lookup(&response.model)
                .compute_cost(response.usage.input_tokens, response.usage.output_tokens);

            let action: ModelAction = serde_json::from_str(response.text.trim()).map_err(|e| {
                ProviderError::new(
                    ErrorKind::ElementNotFound,
                    format!("model returned an unparseable action: {e}"),
                )
            })?;

            match action {
                ModelAction::Done => return Ok(()),
                ModelAction::Click { x, y } => {
                    let page = self.page()?;
                    let script = format!(
                        "(() => {{ const el = document.elementFromPoint({x}, {y}); if (el) el.click(); }})()"
                    );
                    page.evaluate(script)
                        .await
                        .map_err(|e| ProviderError::new(ErrorKind::ElementNotFound, e.to_string()))?;
                }
                ModelAction::Type { text } => {
                    let page = self.page()?;
                    page.type_str(&text)
                        .await
                        .map_err(|e| ProviderError::new(ErrorKind::ElementNotFound, e.to_string()))?;
                }
            }
        }

        Err(ProviderError::new(
            ErrorKind::ElementNotFound,
            format!("exceeded {max_steps} vision steps performing '{action_name}'"),
        ))
    }
}

#[async_trait]
impl PublishingProvider for VisionProvider {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn accumulated_cost_usd(&self) -> f64 {
        self.accumulated_cost_usd
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
        if session_cookies_present {
            tracing::debug!("carried-over session cookies present, skipping login instruction");
            return Ok(());
        }
        let mut vars = HashMap::new();
        vars.insert("username", credentials.username.clone());
        vars.insert("password", credentials.password.clone());
        self.perform("login", &vars)
            .await
            .map_err(|e| ProviderError::new(ErrorKind::AuthRejected, e.message))
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
        let mut vars = HashMap::new();
        vars.insert("value", title.to_string());
        self.perform("fill_title", &vars).await
    }

    async fn set_body(&mut self, body: &str) -> Result<(), ProviderError> {
        let mut vars = HashMap::new();
        vars.insert("value", body.to_string());
        self.perform("fill_body", &vars).await
    }

    async fn upload_to_media_library(&mut self, image: &Image) -> Result<(), ProviderError> {
        let mut vars = HashMap::new();
        vars.insert("path", image.local_path.clone());
        self.perform("upload_image", &vars)
            .await
            .map_err(|e| ProviderError::new(ErrorKind::UploadFailed, e.message))
    }

    async fn insert_image_at_position(
        &mut self,
        image: &Image,
        paragraph_index: u32,
    ) -> Result<(), ProviderError> {
        let mut vars = HashMap::new();
        vars.insert("filename", image.filename.clone());
        vars.insert("position", paragraph_index.to_string());
        self.perform("upload_image", &vars).await
    }

    async fn set_featured_image(&mut self, image: &Image) -> Result<(), ProviderError> {
        let mut vars = HashMap::new();
        vars.insert("filename", image.filename.clone());
        self.perform("upload_image", &vars).await
    }

    async fn set_taxonomy(&mut self, taxonomy: &Taxonomy) -> Result<(), ProviderError> {
        let mut vars = HashMap::new();
        vars.insert("tags", taxonomy.tags.join(","));
        vars.insert("category", taxonomy.primary_category.clone().unwrap_or_default());
        self.perform("set_taxonomy", &vars).await
    }

    async fn set_seo(&mut self, seo: &Seo) -> Result<SeoOutcome, ProviderError> {
        let mut vars = HashMap::new();
        vars.insert("title", seo.meta_title.clone());
        vars.insert("description", seo.meta_description.clone());
        match self.perform("set_seo", &vars).await {
            Ok(()) => Ok(SeoOutcome::Configured {
                plugin: "vision".to_string(),
            }),
            Err(e) if e.kind == ErrorKind::ElementNotFound => Ok(SeoOutcome::NoPluginDetected),
            Err(e) => Err(e),
        }
    }

    async fn insert_related_articles(
        &mut self,
        articles: &[(String, String)],
    ) -> Result<(), ProviderError> {
        if articles.is_empty() {
            return Ok(());
        }
        let mut vars = HashMap::new();
        let joined = articles
            .iter()
            .map(|(title, url)| format!("{title} ({url})"))
            .collect::<Vec<_>>()
            .join(", ");
        vars.insert("value", format!("Related Articles: {joined}"));
        self.perform("fill_body", &vars).await
    }

    async fn insert_faq_schema(&mut self, faqs: &[Faq]) -> Result<(), ProviderError> {
        if faqs.is_empty() {
            return Ok(());
        }
        let mut vars = HashMap::new();
        let joined = faqs
            .iter()
            .map(|f| format!("Q: {} A: {}", f.question, f.answer))
            .collect::<Vec<_>>()
            .join(" | ");
        vars.insert("value", format!("FAQ: {joined}"));
        self.perform("fill_body", &vars).await
    }

    async fn save_draft(&mut self) -> Result<(), ProviderError> {
        self.perform("save_draft", &HashMap::new()).await
    }

    async fn publish(&mut self) -> Result<(), ProviderError> {
        self.perform("publish", &HashMap::new()).await
    }

    async fn schedule(&mut self, at: i64) -> Result<(), ProviderError> {
        let datetime = chrono::DateTime::from_timestamp(at, 0)
            .ok_or_else(|| ProviderError::new(ErrorKind::ElementNotFound, "invalid timestamp"))?;
        let mut vars = HashMap::new();
        vars.insert("date", datetime.format("%Y-%m-%d").to_string());
        vars.insert("time", datetime.format("%H:%M").to_string());
        self.perform("schedule", &vars).await
    }

    async fn get_published_url(&mut self) -> Result<Option<String>, ProviderError> {
        let page = self.page()?;
        Ok(page
            .url()
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?)
    }

    async fn verify_draft_status(&mut self) -> Result<bool, ProviderError> {
        let screenshot = self.screenshot_base64().await?;
        let response = self
            .llm
            .complete_with_images(
                SYSTEM_PROMPT,
                "Does this screenshot show a saved draft confirmation? Answer {\"action\":\"done\"} if yes, anything else if no.",
                &[ImageAttachment {
                    media_type: "image/png".to_string(),
                    data_base64: screenshot,
                }],
                &GenerationParams {
                    max_tokens: 32,
                    temperature: 0.0,
                    system_prompt: None,
                },
            )
            .await
            .map_err(|e| ProviderError::new(ErrorKind::ElementNotFound, e.to_string()))?;
        Ok(response.text.contains("done"))
    }

    async fn verify_content_saved(&mut self) -> Result<bool, ProviderError> {
        self.verify_draft_status().await
    }

    async fn get_current_post_id(&mut self) -> Result<Option<String>, ProviderError> {
        let page = self.page()?;
        let url = page
            .url()
            .await
            .map_err(|e| ProviderError::new(ErrorKind::NavigationTimeout, e.to_string()))?
            .unwrap_or_default();
        Ok(url
            .split("post=")
            .nth(1)
            .and_then(|s| s.split('&').next())
            .map(str::to_string))
    }
}
