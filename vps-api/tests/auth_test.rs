//! Integration tests for authentication middleware
//!
//! Tests that the auth middleware resolves the principal from proxy headers
//! and rejects requests without a usable identity.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use tower::ServiceExt; // for `oneshot`
use vps_api::auth::auth_middleware;
use vps_orchestrator::Principal;

// Simple handler that returns the resolved principal
async fn test_handler(
    axum::Extension(principal): axum::Extension<Principal>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "identity": principal.identity,
        "role": principal.role,
    }))
}

// Create a test app with auth middleware
fn create_test_app() -> Router {
    Router::new()
        .route("/protected", get(test_handler))
        .layer(middleware::from_fn(auth_middleware))
}

async fn send(headers: &[(&str, &str)]) -> axum::response::Response {
    let mut builder = Request::builder().uri("/protected");
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }

    create_test_app()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_user_header_defaults_to_user_role() {
    let response = send(&[("x-vps-user", "bob")]).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["identity"], "bob");
    assert_eq!(json["role"], "user");
}

#[tokio::test]
async fn test_admin_role_header() {
    let response = send(&[("x-vps-user", "root"), ("x-vps-role", "admin")]).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["role"], "admin");
}

#[tokio::test]
async fn test_forwarded_user_header_passes() {
    let response = send(&[("x-forwarded-user", "carol")]).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["identity"], "carol");
}

#[tokio::test]
async fn test_vps_user_header_takes_precedence() {
    let response = send(&[("x-forwarded-user", "carol"), ("x-vps-user", "bob")]).await;

    let json = body_json(response).await;
    assert_eq!(json["identity"], "bob");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let response = send(&[]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&[("x-vps-user", "   ")]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A role alone identifies nobody.
    let response = send(&[("x-vps-role", "admin")]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_role_is_unauthorized() {
    let response = send(&[("x-vps-user", "bob"), ("x-vps-role", "superuser")]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
