//! Named-element selector bundles and instruction templates.
//!
//! Providers never see raw CSS selectors or natural-language instruction
//! strings directly from the orchestrator — both are opaque configuration
//! resolved through this module, keyed by a stable `NamedElement`/action
//! name so the same provider code works across CMS templates.

use crate::error::ConfigError;
use crate::model::CmsKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod defaults;

/// A semantic identifier for a field, button, or container a provider
/// needs to act on, independent of how any given CMS template implements it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedElement {
    /// Login username field.
    LoginUsername,
    /// Login password field.
    LoginPassword,
    /// Login submit button.
    LoginSubmit,
    /// Sentinel element confirming the dashboard is visible post-login.
    DashboardSentinel,
    /// Post title field.
    NewPostTitle,
    /// Post body editor.
    NewPostBody,
    /// Save-draft button.
    SaveDraftButton,
    /// Notice confirming the draft was saved.
    DraftSavedNotice,
    /// Publish button.
    PublishButton,
    /// Confirmation button for the two-step publish flow.
    PublishConfirm,
    /// Panel shown after a successful publish.
    PublishedPanel,
    /// Link to the published post within the success panel.
    ViewPostLink,
    /// Affordance opening the schedule date/time picker.
    ScheduleOpen,
    /// Schedule date input.
    ScheduleDateInput,
    /// Schedule time input.
    ScheduleTimeInput,
    /// Affordance opening the media-library upload dialog.
    MediaLibraryOpen,
    /// File input inside the media-library dialog.
    MediaLibraryFileInput,
    /// Notice confirming an upload completed.
    MediaUploadComplete,
    /// Alt-text field for the selected media item.
    MediaAltText,
    /// Caption field for the selected media item.
    MediaCaption,
    /// Button to set the currently selected media as featured image.
    SetFeaturedImageButton,
    /// Category checkbox container.
    CategoryCheckbox,
    /// Affordance to mark a category primary.
    MakePrimaryCategory,
    /// Tag input field.
    TagInput,
    /// Yoast SEO container.
    SeoPluginYoast,
    /// Rank Math SEO container.
    SeoPluginRankMath,
    /// All in One SEO container.
    SeoPluginAllInOne,
    /// SEO title field (vendor-agnostic, within the detected container).
    SeoTitleField,
    /// SEO meta description field.
    SeoDescriptionField,
    /// SEO focus keyword field.
    SeoFocusKeywordField,
    /// Custom HTML block insertion affordance, used for FAQ schema.
    CustomHtmlBlock,
}

/// Ordered candidate CSS selectors for each named element, per CMS kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorBundle {
    entries: HashMap<CmsKind, HashMap<NamedElement, Vec<String>>>,
}

/// Named elements every `SelectorBundle` must define selectors for.
pub const REQUIRED_NAMED_ELEMENTS: &[NamedElement] = &[
    NamedElement::LoginUsername,
    NamedElement::LoginPassword,
    NamedElement::LoginSubmit,
    NamedElement::DashboardSentinel,
    NamedElement::NewPostTitle,
    NamedElement::NewPostBody,
    NamedElement::SaveDraftButton,
    NamedElement::DraftSavedNotice,
    NamedElement::PublishButton,
    NamedElement::PublishedPanel,
    NamedElement::ViewPostLink,
];

impl SelectorBundle {
    /// Construct an empty bundle (test/builder use).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the candidate selector list for a named element under a CMS kind.
    pub fn set(&mut self, cms_kind: CmsKind, element: NamedElement, candidates: Vec<String>) {
        self.entries
            .entry(cms_kind)
            .or_default()
            .insert(element, candidates);
    }

    /// Look up the candidate selector list for a named element.
    pub fn get(&self, cms_kind: CmsKind, element: NamedElement) -> Option<&[String]> {
        self.entries
            .get(&cms_kind)
            .and_then(|m| m.get(&element))
            .map(Vec::as_slice)
    }

    /// Validate that every required named element has at least one
    /// candidate selector for the given CMS kind.
    pub fn validate(&self, cms_kind: CmsKind) -> Result<(), ConfigError> {
        for &element in REQUIRED_NAMED_ELEMENTS {
            match self.get(cms_kind, element) {
                Some(candidates) if !candidates.is_empty() => {}
                _ => {
                    return Err(ConfigError::MissingBundleEntry {
                        bundle: "selector",
                        name: format!("{element:?}"),
                        cms_kind: format!("{cms_kind:?}"),
                    })
                }
            }
        }
        Ok(())
    }
}

/// A natural-language instruction template for the vision/LLM provider,
/// with `{placeholder}` syntax for argument interpolation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstructionBundle {
    templates: HashMap<String, String>,
}

/// Action names every `InstructionBundle` must define a template for.
pub const REQUIRED_ACTION_NAMES: &[&str] = &[
    "login",
    "fill_title",
    "fill_body",
    "save_draft",
    "publish",
    "schedule",
    "upload_image",
    "set_seo",
    "set_taxonomy",
];

/// Errors raised when rendering an instruction template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// No template is registered for the given action name.
    #[error("no instruction template registered for action '{0}'")]
    UnknownAction(String),
    /// A placeholder in the template has no corresponding argument.
    #[error("missing argument for placeholder '{0}'")]
    MissingArg(String),
}

impl InstructionBundle {
    /// Construct an empty bundle (test/builder use).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the template string for an action name.
    pub fn set(&mut self, action_name: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(action_name.into(), template.into());
    }

    /// Render the template for `action_name`, substituting `{key}`
    /// placeholders from `vars`. Fails if a placeholder has no matching key.
    pub fn render(
        &self,
        action_name: &str,
        vars: &HashMap<&str, String>,
    ) -> Result<String, TemplateError> {
        let template = self
            .templates
            .get(action_name)
            .ok_or_else(|| TemplateError::UnknownAction(action_name.to_string()))?;

        let mut rendered = String::with_capacity(template.len());
        let bytes = template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(end) = template[i..].find('}') {
                    let key = &template[i + 1..i + end];
                    let value = vars
                        .get(key)
                        .ok_or_else(|| TemplateError::MissingArg(key.to_string()))?;
                    rendered.push_str(value);
                    i += end + 1;
                    continue;
                }
            }
            let ch = template[i..].chars().next().unwrap();
            rendered.push(ch);
            i += ch.len_utf8();
        }
        Ok(rendered)
    }

    /// Extract the set of placeholder names referenced in `action_name`'s
    /// template, used by the round-trip templating law.
    pub fn placeholders(&self, action_name: &str) -> Result<Vec<String>, TemplateError> {
        let template = self
            .templates
            .get(action_name)
            .ok_or_else(|| TemplateError::UnknownAction(action_name.to_string()))?;
        let mut names = Vec::new();
        let mut rest = template.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            if let Some(end) = after.find('}') {
                names.push(after[..end].to_string());
                rest = &after[end + 1..];
            } else {
                break;
            }
        }
        Ok(names)
    }

    /// Validate that every required action name has a registered template.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for &name in REQUIRED_ACTION_NAMES {
            if !self.templates.contains_key(name) {
                return Err(ConfigError::MissingBundleEntry {
                    bundle: "instruction",
                    name: name.to_string(),
                    cms_kind: "n/a".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_selector_bundle() -> SelectorBundle {
        let mut bundle = SelectorBundle::new();
        for &element in REQUIRED_NAMED_ELEMENTS {
            bundle.set(
                CmsKind::WordPress,
                element,
                vec![format!("#{element:?}")],
            );
        }
        bundle
    }

    #[test]
    fn selector_bundle_validates_when_complete() {
        let bundle = sample_selector_bundle();
        assert!(bundle.validate(CmsKind::WordPress).is_ok());
    }

    #[test]
    fn selector_bundle_rejects_missing_required_entry() {
        let bundle = SelectorBundle::new();
        let err = bundle.validate(CmsKind::WordPress).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBundleEntry { .. }));
    }

    #[test]
    fn selector_cache_key_resolves_by_cms_and_element() {
        let bundle = sample_selector_bundle();
        let candidates = bundle
            .get(CmsKind::WordPress, NamedElement::NewPostTitle)
            .unwrap();
        assert_eq!(candidates, &["#NewPostTitle".to_string()]);
    }

    fn sample_instruction_bundle() -> InstructionBundle {
        let mut bundle = InstructionBundle::new();
        for &name in REQUIRED_ACTION_NAMES {
            bundle.set(name, format!("do the {name} action"));
        }
        bundle.set("fill_title", "type '{value}' into the title field");
        bundle
    }

    #[test]
    fn instruction_bundle_validates_when_complete() {
        let bundle = sample_instruction_bundle();
        assert!(bundle.validate().is_ok());
    }

    #[test]
    fn instruction_bundle_rejects_missing_action() {
        let bundle = InstructionBundle::new();
        let err = bundle.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingBundleEntry { .. }));
    }

    #[test]
    fn render_substitutes_placeholder() {
        let bundle = sample_instruction_bundle();
        let mut vars = HashMap::new();
        vars.insert("value", "Hello world".to_string());
        let rendered = bundle.render("fill_title", &vars).unwrap();
        assert_eq!(rendered, "type 'Hello world' into the title field");
    }

    #[test]
    fn render_missing_arg_errors() {
        let bundle = sample_instruction_bundle();
        let vars = HashMap::new();
        let err = bundle.render("fill_title", &vars).unwrap_err();
        assert!(matches!(err, TemplateError::MissingArg(k) if k == "value"));
    }

    #[test]
    fn round_trip_placeholders_match_vars_keys() {
        let bundle = sample_instruction_bundle();
        let mut vars = HashMap::new();
        vars.insert("value", "anything".to_string());
        bundle.render("fill_title", &vars).unwrap();
        let placeholders = bundle.placeholders("fill_title").unwrap();
        assert_eq!(placeholders, vec!["value".to_string()]);
    }

    #[test]
    fn unknown_action_errors() {
        let bundle = InstructionBundle::new();
        let vars = HashMap::new();
        let err = bundle.render("nonexistent", &vars).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownAction(_)));
    }
}
