//! Built-in WordPress/Gutenberg selector and instruction defaults.
//!
//! These are starting-point candidates for a stock WordPress install with
//! the Gutenberg block editor and Yoast SEO. Self-hosted deployments with a
//! customized admin theme will want to override some of these through the
//! config file's `[selectors]`/`[instructions]` tables; the DOM provider
//! tries each candidate in order and falls through to the next on a miss.

use super::{InstructionBundle, NamedElement, SelectorBundle};
use crate::model::CmsKind;

/// A default `SelectorBundle` for `CmsKind::WordPress`, covering every
/// required named element plus the optional SEO/taxonomy/media ones.
pub fn wordpress_selector_bundle() -> SelectorBundle {
    let mut b = SelectorBundle::new();
    let w = CmsKind::WordPress;

    b.set(w, NamedElement::LoginUsername, vec!["#user_login".into()]);
    b.set(w, NamedElement::LoginPassword, vec!["#user_pass".into()]);
    b.set(w, NamedElement::LoginSubmit, vec!["#wp-submit".into()]);
    b.set(w, NamedElement::DashboardSentinel, vec!["#menu-posts".into()]);

    b.set(
        w,
        NamedElement::NewPostTitle,
        vec![
            ".editor-post-title__input".into(),
            "textarea.editor-post-title__input".into(),
        ],
    );
    b.set(
        w,
        NamedElement::NewPostBody,
        vec![".block-editor-default-block-appender__content".into()],
    );
    b.set(
        w,
        NamedElement::SaveDraftButton,
        vec![
            ".editor-post-save-draft".into(),
            "button[aria-label='Save draft']".into(),
        ],
    );
    b.set(
        w,
        NamedElement::DraftSavedNotice,
        vec![".components-snackbar__content".into()],
    );
    b.set(
        w,
        NamedElement::PublishButton,
        vec![".editor-post-publish-panel__toggle".into()],
    );
    b.set(
        w,
        NamedElement::PublishConfirm,
        vec![".editor-post-publish-button__button".into()],
    );
    b.set(
        w,
        NamedElement::PublishedPanel,
        vec![".post-publish-panel__postpublish".into()],
    );
    b.set(
        w,
        NamedElement::ViewPostLink,
        vec![".post-publish-panel__postpublish-header a".into()],
    );

    b.set(
        w,
        NamedElement::ScheduleOpen,
        vec![".edit-post-post-schedule__toggle".into()],
    );
    b.set(
        w,
        NamedElement::ScheduleDateInput,
        vec!["input[aria-label='Date']".into()],
    );
    b.set(
        w,
        NamedElement::ScheduleTimeInput,
        vec!["input[aria-label='Time']".into()],
    );

    b.set(
        w,
        NamedElement::MediaLibraryOpen,
        vec!["button[id*='upload']".into()],
    );
    b.set(
        w,
        NamedElement::MediaLibraryFileInput,
        vec!["input[type='file'][accept*='image']".into()],
    );
    b.set(
        w,
        NamedElement::MediaUploadComplete,
        vec![".media-button-insert".into()],
    );
    b.set(
        w,
        NamedElement::MediaAltText,
        vec!["textarea.setting[data-setting='alt']".into()],
    );
    b.set(
        w,
        NamedElement::MediaCaption,
        vec!["textarea.setting[data-setting='caption']".into()],
    );
    b.set(
        w,
        NamedElement::SetFeaturedImageButton,
        vec![".editor-post-featured-image__toggle".into()],
    );

    b.set(w, NamedElement::CategoryCheckbox, vec!["#categorychecklist input[type='checkbox']".into()]);
    b.set(w, NamedElement::MakePrimaryCategory, vec![".primary-category-control".into()]);
    b.set(w, NamedElement::TagInput, vec![".components-form-token-field__input".into()]);

    b.set(w, NamedElement::SeoPluginYoast, vec!["#wpseo-metabox-root".into()]);
    b.set(w, NamedElement::SeoPluginRankMath, vec!["#rank-math-metabox".into()]);
    b.set(w, NamedElement::SeoPluginAllInOne, vec!["#aioseo-post-settings-metabox".into()]);
    b.set(
        w,
        NamedElement::SeoTitleField,
        vec!["input[name='yoast_wpseo_title']".into()],
    );
    b.set(
        w,
        NamedElement::SeoDescriptionField,
        vec!["textarea[name='yoast_wpseo_metadesc']".into()],
    );
    b.set(
        w,
        NamedElement::SeoFocusKeywordField,
        vec!["input[name='yoast_wpseo_focuskw']".into()],
    );

    b.set(
        w,
        NamedElement::CustomHtmlBlock,
        vec!["button[aria-label='Custom HTML']".into()],
    );

    b
}

/// A default `InstructionBundle` for the vision/LLM provider, covering
/// every required action name.
pub fn vision_instruction_bundle() -> InstructionBundle {
    let mut b = InstructionBundle::new();
    b.set(
        "login",
        "Find the username field, type '{username}', find the password field, \
         type '{password}', then click the login/submit button.",
    );
    b.set(
        "fill_title",
        "Click the post title field at the top of the editor and type '{value}' into it.",
    );
    b.set(
        "fill_body",
        "Click into the main content/body editor area and type the following text: '{value}'.",
    );
    b.set(
        "save_draft",
        "Find and click the button that saves the current post as a draft, \
         without publishing it.",
    );
    b.set(
        "publish",
        "Find and click the publish button, then confirm publication if a \
         second confirmation button appears.",
    );
    b.set(
        "schedule",
        "Open the schedule/publish-date control, set the date to '{date}' and \
         the time to '{time}', then confirm the schedule.",
    );
    b.set(
        "upload_image",
        "Open the media upload dialog, select the local file at '{path}', wait \
         for the upload to complete, then insert it into the post.",
    );
    b.set(
        "set_seo",
        "Scroll to the SEO panel below the editor. If a focus keyword field is \
         present, type '{keyword}' into it. If a meta description field is \
         present, type '{description}' into it.",
    );
    b.set(
        "set_taxonomy",
        "Open the categories/tags panel in the sidebar. Check the category \
         named '{category}', then type each of these tags into the tag input, \
         pressing enter after each one: '{tags}'.",
    );
    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templating::REQUIRED_NAMED_ELEMENTS;

    #[test]
    fn wordpress_defaults_validate() {
        let bundle = wordpress_selector_bundle();
        assert!(bundle.validate(CmsKind::WordPress).is_ok());
    }

    #[test]
    fn wordpress_defaults_cover_every_required_element() {
        let bundle = wordpress_selector_bundle();
        for &element in REQUIRED_NAMED_ELEMENTS {
            assert!(
                bundle.get(CmsKind::WordPress, element).is_some(),
                "missing default selector for {element:?}"
            );
        }
    }

    #[test]
    fn vision_defaults_validate() {
        assert!(vision_instruction_bundle().validate().is_ok());
    }
}
