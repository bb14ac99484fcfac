use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    routing::get,
};
use tower::ServiceExt;

async fn ok_handler() -> &'static str {
    "ok"
}

async fn fail_handler() -> Result<&'static str, bundle_avatar::AppError> {
    Err(bundle_avatar::AppError::invalid_parameter(
        "tokenId",
        "abc",
        "Invalid tokenId abc",
    ))
}

fn build_app() -> Router {
    Router::new()
        .route("/ok", get(ok_handler))
        .route("/fail", get(fail_handler))
        .layer(axum::middleware::from_fn(
            bundle_avatar::request_id::request_id_middleware,
        ))
}

#[tokio::test]
async fn request_id_is_generated_when_missing() {
    let app = build_app();
    let resp = app
        .oneshot(Request::builder().uri("/ok").body(Body::empty()).unwrap())
        .await
        .expect("request /ok");

    assert_eq!(resp.status(), StatusCode::OK);
    let request_id = resp
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(request_id.starts_with("req_"), "x-request-id should be generated");
}

#[tokio::test]
async fn request_id_uses_client_value_when_valid() {
    let app = build_app();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/ok")
                .header("x-request-id", "client.req-001")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("request /ok");

    assert_eq!(resp.status(), StatusCode::OK);
    let request_id = resp
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert_eq!(request_id, "client.req-001");
}

#[tokio::test]
async fn request_id_replaces_unsafe_client_value() {
    let app = build_app();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/ok")
                .header("x-request-id", "bad id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("request /ok");

    let request_id = resp
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert_ne!(request_id, "bad id");
    assert!(request_id.starts_with("req_"));
}

#[tokio::test]
async fn error_response_keeps_request_id_and_plain_text_body() {
    let app = build_app();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/fail")
                .header("x-request-id", "err.req-001")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("request /fail");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("err.req-001")
    );
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    assert_eq!(&body[..], b"Invalid tokenId abc");
}
