//! Common test utilities and helpers for vps-api tests
//!
//! Every test app runs over an in-memory database and the in-memory container
//! engine, so routes exercise the real orchestrator end to end.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use tower::ServiceExt;
use vps_orchestrator::test_utils::create_test_orchestrator;
use vps_orchestrator::{CreateVpsRequest, Principal, VpsOrchestrator, VpsRecord};
use vps_runtime::mock::MockRuntime;

pub const ADMIN: (&str, &str) = ("root", "admin");

/// Create a test VPS request with default values
pub fn create_test_vps_request(name: &str, owner: &str) -> CreateVpsRequest {
    CreateVpsRequest {
        name: name.to_string(),
        owner: owner.to_string(),
        support: "+1-555-0100".to_string(),
    }
}

/// Fixture: create a running VPS directly through the orchestrator
pub async fn fixture_vps(orchestrator: &VpsOrchestrator, name: &str, owner: &str) -> VpsRecord {
    orchestrator
        .create(&Principal::admin("root"), create_test_vps_request(name, owner))
        .await
        .expect("Failed to create fixture VPS")
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: Response<Body>) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}

/// Headers of an authenticated caller
pub fn auth_headers<'a>(identity: &'a str, role: &'a str) -> Vec<(&'static str, &'a str)> {
    vec![("x-vps-user", identity), ("x-vps-role", role)]
}

/// TestClient to encapsulate API interaction logic
pub struct TestClient {
    pub app: Router,
    pub orchestrator: VpsOrchestrator,
    pub runtime: MockRuntime,
}

impl TestClient {
    pub async fn new() -> Self {
        let (orchestrator, runtime) = create_test_orchestrator().await;
        let app = vps_api::create_app(orchestrator.clone());

        Self {
            app,
            orchestrator,
            runtime,
        }
    }

    /// Send a request to the API
    pub async fn send_request(&self, request: Request<Body>) -> Response<Body> {
        // Clone the app to allow reuse (Router is cheap to clone)
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<String>,
        headers: &[(&str, &str)],
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);

        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json)
            }
            None => Body::empty(),
        };

        self.send_request(builder.body(body).unwrap()).await
    }

    /// Post JSON to an endpoint
    pub async fn post<T: serde::Serialize>(
        &self,
        uri: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> Response<Body> {
        let json = serde_json::to_string(body).expect("Failed to serialize request body");
        self.send("POST", uri, Some(json), headers).await
    }

    /// Send a JSON-typed request with an arbitrary body
    pub async fn send_raw(
        &self,
        method: &str,
        uri: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Response<Body> {
        self.send(method, uri, Some(body.to_string()), headers).await
    }

    /// Post without a body, as lifecycle actions do
    pub async fn post_empty(&self, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        self.send("POST", uri, None, headers).await
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        self.send("GET", uri, None, headers).await
    }

    pub async fn delete(&self, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        self.send("DELETE", uri, None, headers).await
    }
}
