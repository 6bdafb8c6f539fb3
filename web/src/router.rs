use crate::controller::{
    admin_controller, events_controller, health_check_controller, publish_controller,
    webhook_controller,
};
use axum::routing::{get, post};
use axum::Router;
use service::AppState;

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
// The SSE connect endpoint is deliberately absent: streaming responses do
// not fit the OpenAPI request/response model.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Relay Platform API"
        ),
        paths(
            admin_controller::stats,
            admin_controller::connections,
            publish_controller::publish,
            webhook_controller::job_status,
            health_check_controller::health_check,
        ),
        components(
            schemas(
                publish_controller::PublishKind,
                publish_controller::PublishPayload,
                publish_controller::PublishResponse,
                webhook_controller::JobWebhookPayload,
                webhook_controller::WebhookResponse,
            )
        ),
        tags(
            (name = "relay_platform", description = "Real-time Event Dispatch API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(events_routes(app_state.clone()))
        .merge(admin_routes(app_state.clone()))
        .merge(publish_routes(app_state.clone()))
        .merge(webhook_routes(app_state))
        .merge(health_routes())
        .merge(RapiDoc::with_openapi("/api-docs/openapi2.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn events_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events", get(events_controller::stream_events))
        .with_state(app_state)
}

fn admin_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/stats", get(admin_controller::stats))
        .route("/connections", get(admin_controller::connections))
        .with_state(app_state)
}

fn publish_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/publish", post(publish_controller::publish))
        .with_state(app_state)
}

fn webhook_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/webhook/jobs", post(webhook_controller::job_status))
        .with_state(app_state)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use service::config::Config;
    use sse::manager::ManagerConfig;
    use sse::Manager;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        use clap::Parser;
        let manager = Manager::new(ManagerConfig {
            ping_interval: Duration::from_secs(3600),
            client_timeout: Duration::from_secs(7200),
            max_clients: 4,
            enable_logging: false,
        });
        AppState::new(Config::parse_from(["relay_platform_rs"]), manager)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let router = define_routes(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_start_empty() {
        let router = define_routes(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("\"total_clients\":0"));
    }

    #[tokio::test]
    async fn events_endpoint_streams_with_sse_headers() {
        let router = define_routes(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/events?user_id=alice&role=admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache"
        );
    }

    #[tokio::test]
    async fn publish_broadcast_reports_zero_without_clients() {
        let router = define_routes(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/publish")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"type": "system", "message": "scheduled maintenance"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, r#"{"notified":0}"#);
    }

    #[tokio::test]
    async fn publish_rejects_unknown_type() {
        let router = define_routes(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/publish")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"type": "telepathy"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn publish_progress_requires_a_target_user() {
        let router = define_routes(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/publish")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"type": "progress", "progress": 40}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_webhook_events_are_acknowledged_and_ignored() {
        let router = define_routes(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/webhook/jobs")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"event": "job.paused", "job_id": "j-1"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, r#"{"status":"ignored"}"#);
    }
}
