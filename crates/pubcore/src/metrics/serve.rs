//! Prometheus text-format exposition for the metrics registry (§6 "pull
//! endpoint"). Optional and ambient: nothing in `publish()` depends on
//! this router being mounted.

use super::Registry;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

/// Build a router exposing `registry` at `path` in Prometheus text format.
/// Mount it into a larger `axum::Router` with `.merge()` or serve it
/// standalone for local/dev use.
pub fn router(registry: Arc<Registry>, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(registry)
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> (StatusCode, String) {
    (StatusCode::OK, registry.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[tokio::test]
    async fn metrics_endpoint_returns_rendered_registry() {
        let registry = Registry::new();
        registry.record_article("success", "dom");
        let app = router(Arc::clone(&registry), "/metrics");

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/metrics")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("articles_total"));
    }
}
