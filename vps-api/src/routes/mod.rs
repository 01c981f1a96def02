pub mod health;
pub mod vps;

use crate::{api_docs::ApiDoc, auth::auth_middleware, state::AppState};
use axum::{extract::Request, middleware, routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use uuid::Uuid;
use vps_orchestrator::VpsOrchestrator;

pub fn create_app(orchestrator: VpsOrchestrator) -> Router {
    let state = AppState::new(orchestrator);

    // Allow CORS for browser frontends served from another origin
    let cors = CorsLayer::permissive();

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request| {
        tracing::info_span!(
            "request",
            method = %req.method(),
            uri = %req.uri(),
            request_id = %Uuid::new_v4(),
        )
    });

    Router::new()
        .merge(health::routes()) // Health routes don't need auth
        .route("/api-docs/openapi.json", get(openapi_spec))
        .merge(vps::routes().layer(middleware::from_fn(auth_middleware)))
        .layer(cors)
        .layer(trace)
        .with_state(state)
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
