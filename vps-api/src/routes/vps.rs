use crate::{
    error::{ApiResult, ErrorBody},
    state::AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use vps_orchestrator::{CreateVpsRequest, LifecycleAction, Principal, SessionOutcome, VpsRecord};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/vps", get(list_vps).post(create_vps))
        .route("/api/v1/vps/{id}", get(get_vps).delete(delete_vps))
        .route("/api/v1/vps/{id}/ssh", get(open_ssh))
        .route("/api/v1/vps/{id}/{action}", post(vps_action))
}

/// Endpoint of a ready remote shell session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SshSession {
    pub ssh: String,
}

/// The session agent is still starting.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SshPending {
    pub status: String,
    pub message: String,
    pub retry_after_secs: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/vps",
    tag = "vps",
    responses(
        (status = 200, description = "VPS records visible to the caller", body = [VpsRecord]),
        (status = 401, description = "Missing or invalid identity")
    )
)]
pub async fn list_vps(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<VpsRecord>>> {
    let records = state.orchestrator.list(&principal).await?;

    Ok(Json(records))
}

#[utoipa::path(
    post,
    path = "/api/v1/vps",
    tag = "vps",
    request_body = CreateVpsRequest,
    responses(
        (status = 201, description = "VPS created and running", body = VpsRecord),
        (status = 400, description = "Malformed body, invalid or duplicate name", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 502, description = "Container runtime failed", body = ErrorBody),
        (status = 503, description = "Container runtime unreachable", body = ErrorBody)
    )
)]
pub async fn create_vps(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateVpsRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<VpsRecord>)> {
    let Json(req) = payload?;
    let record = state.orchestrator.create(&principal, req).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/api/v1/vps/{id}",
    tag = "vps",
    params(("id" = String, Path, description = "VPS name or numeric id")),
    responses(
        (status = 200, description = "VPS record", body = VpsRecord),
        (status = 404, description = "No such VPS", body = ErrorBody)
    )
)]
pub async fn get_vps(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<VpsRecord>> {
    let record = state.orchestrator.get(&principal, &id).await?;

    Ok(Json(record))
}

#[utoipa::path(
    delete,
    path = "/api/v1/vps/{id}",
    tag = "vps",
    params(("id" = String, Path, description = "VPS name or numeric id")),
    responses(
        (status = 200, description = "Final snapshot of the deleted VPS", body = VpsRecord),
        (status = 404, description = "No such VPS, or the caller may not delete it", body = ErrorBody)
    )
)]
pub async fn delete_vps(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<VpsRecord>> {
    let record = state.orchestrator.delete(&principal, &id).await?;

    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/api/v1/vps/{id}/{action}",
    tag = "vps",
    params(
        ("id" = String, Path, description = "VPS name or numeric id"),
        ("action" = String, Path, description = "start, stop, restart or reinstall")
    ),
    responses(
        (status = 200, description = "VPS record after the action", body = VpsRecord),
        (status = 400, description = "Unknown action", body = ErrorBody),
        (status = 404, description = "No such VPS", body = ErrorBody),
        (status = 409, description = "VPS has no container", body = ErrorBody),
        (status = 500, description = "Reinstall lost the previous container", body = ErrorBody)
    )
)]
pub async fn vps_action(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, action)): Path<(String, String)>,
) -> ApiResult<Json<VpsRecord>> {
    let action: LifecycleAction = action.parse()?;
    let record = state.orchestrator.perform(&principal, &id, action).await?;

    Ok(Json(record))
}

#[utoipa::path(
    get,
    path = "/api/v1/vps/{id}/ssh",
    tag = "vps",
    params(("id" = String, Path, description = "VPS name or numeric id")),
    responses(
        (status = 200, description = "Remote shell endpoint", body = SshSession),
        (status = 202, description = "Session agent still starting", body = SshPending),
        (status = 404, description = "No such VPS", body = ErrorBody),
        (status = 409, description = "VPS is not running", body = ErrorBody)
    )
)]
pub async fn open_ssh(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let response = match state.orchestrator.open_session(&principal, &id).await? {
        SessionOutcome::Ready { endpoint } => Json(SshSession { ssh: endpoint }).into_response(),
        SessionOutcome::Pending { retry_after } => {
            let secs = retry_after.as_secs();
            let body = SshPending {
                status: "pending".to_string(),
                message: format!("Session agent is starting, try again in {secs}s"),
                retry_after_secs: secs,
            };
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
    };

    Ok(response)
}
