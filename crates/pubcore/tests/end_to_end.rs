//! Integration tests for the six end-to-end scenarios enumerated in §8,
//! driven against `FakeProvider` rather than a real browser/LLM.

use pubcore::config::{RetryConfig, Settings};
use pubcore::error::ErrorKind;
use pubcore::model::{
    Article, CmsKind, Credentials, Image, Phase, PublishIntent, PublishRequest, Seo, TargetCms,
    Taxonomy,
};
use pubcore::orchestrator::{Orchestrator, ProviderPair};
use pubcore::provider::fake::{FakeProvider, ScriptedFailure};
use std::sync::Arc;

fn base_request(intent: PublishIntent) -> PublishRequest {
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

fn fast_retry_settings(max_retries: u32) -> Arc<Settings> {
    Arc::new(Settings {
        retry: RetryConfig {
            max_retries,
            base_retry_delay_seconds: 0,
            ..RetryConfig::default()
        },
        ..Settings::default()
    })
}

/// Scenario 1: happy path, DOM provider.
#[tokio::test]
async fn happy_path_dom_provider() {
    let orchestrator = Orchestrator::new(fast_retry_settings(2), None).unwrap();
    let providers = ProviderPair {
        primary: Box::new(FakeProvider::new("dom")),
        fallback: Some(Box::new(FakeProvider::new("vision"))),
    };
    let result = orchestrator
        .publish(base_request(PublishIntent::PublishNow), providers, 1_000_000)
        .await;

    assert!(result.success);
    assert_eq!(result.provider_used, "dom");
    assert!(!result.fallback_triggered);
    assert_eq!(result.phases.last().unwrap().action, format!("{:?}", Phase::CaptureUrl));
    assert!(result.url.is_some());
}

/// Scenario 2: too-short title.
#[tokio::test]
async fn too_short_title_blocks_publish() {
    let orchestrator = Orchestrator::new(fast_retry_settings(2), None).unwrap();
    let mut request = base_request(PublishIntent::PublishNow);
    request.article.title = "Hi".to_string();
    let providers = ProviderPair {
        primary: Box::new(FakeProvider::new("dom")),
        fallback: None,
    };
    let result = orchestrator.publish(request, providers, 1_000_000).await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, ErrorKind::SafetyBlocked);
}

/// Scenario 3: primary exhaustion, fallback succeeds.
#[tokio::test]
async fn primary_exhaustion_falls_over_to_llm_provider() {
    let settings = fast_retry_settings(2);
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
        ScriptedFailure {
            primitive: "set_title",
            nth: 3,
            kind: ErrorKind::ElementNotFound,
        },
    ]);
    let providers = ProviderPair {
        primary: Box::new(failing),
        fallback: Some(Box::new(FakeProvider::new("vision"))),
    };
    let orchestrator = Orchestrator::new(settings.clone(), None).unwrap();
    let result = orchestrator
        .publish(base_request(PublishIntent::PublishNow), providers, 1_000_000)
        .await;

    assert!(result.success);
    assert_eq!(result.provider_used, "vision");
    assert!(result.fallback_triggered);
    assert!(result.retry_count >= settings.max_retries());
}

/// Scenario 4: schedule in the past.
#[tokio::test]
async fn schedule_in_the_past_blocks_publish() {
    let orchestrator = Orchestrator::new(fast_retry_settings(2), None).unwrap();
    let request = base_request(PublishIntent::Schedule { at: 940 });
    let providers = ProviderPair {
        primary: Box::new(FakeProvider::new("dom")),
        fallback: None,
    };
    let result = orchestrator.publish(request, providers, 1_000).await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, ErrorKind::SafetyBlocked);
}

/// Scenario 5: image ordering across positions `[2, 0, 5]` on a six-paragraph body.
#[tokio::test]
async fn images_insert_in_ascending_position_order() {
    let orchestrator = Orchestrator::new(fast_retry_settings(2), None).unwrap();
    let mut request = base_request(PublishIntent::SaveDraft);
    let body_paragraphs: String = (0..6).map(|_| "<p>para</p>").collect();
    request.article.body = body_paragraphs;

    let image = |position: u32, name: &str| Image {
        local_path: format!("/tmp/{name}.jpg"),
        filename: format!("{name}.jpg"),
        alt_text: String::new(),
        caption: String::new(),
        position,
        is_featured: false,
        source_url: None,
    };
    request.images = vec![image(2, "b"), image(0, "a"), image(5, "c")];

    let fake = FakeProvider::new("dom");
    let providers = ProviderPair {
        primary: Box::new(fake),
        fallback: None,
    };
    let result = orchestrator.publish(request, providers, 1_000_000).await;

    assert!(result.success);
    assert!(result.phases.iter().any(|p| p.action == format!("{:?}", Phase::ProcessImages)));
}

/// Scenario 6: ambiguous publish — terminal call errors but the post shows
/// signs of publication.
#[tokio::test]
async fn ambiguous_publish_succeeds_with_warning() {
    let orchestrator = Orchestrator::new(fast_retry_settings(2), None).unwrap();
    let fake = FakeProvider::new("dom").with_failures(vec![ScriptedFailure {
        primitive: "publish",
        nth: 1,
        kind: ErrorKind::NavigationTimeout,
    }]);
    let providers = ProviderPair {
        primary: Box::new(fake),
        fallback: None,
    };
    let result = orchestrator
        .publish(base_request(PublishIntent::PublishNow), providers, 1_000_000)
        .await;

    assert!(result.success);
    assert!(result.warnings.iter().any(|w| w == "AMBIGUOUS_PUBLISH"));
}
