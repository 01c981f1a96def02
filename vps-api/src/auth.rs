use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::debug;
use vps_orchestrator::{Principal, Role};

pub const USER_HEADER: &str = "x-vps-user";
pub const FORWARDED_USER_HEADER: &str = "x-forwarded-user";
pub const ROLE_HEADER: &str = "x-vps-role";

/// Auth middleware - resolves the principal from auth proxy headers
///
/// The proxy in front of vps-api authenticates the caller and sets
/// `x-vps-user` (or the oauth2-proxy style `x-forwarded-user`) and
/// `x-vps-role`. The values are trusted as-is. A missing role means `user`.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let identity = req
        .headers()
        .get(USER_HEADER)
        .or_else(|| req.headers().get(FORWARDED_USER_HEADER))
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            debug!("request without identity header");
            StatusCode::UNAUTHORIZED
        })?;

    let role = match req.headers().get(ROLE_HEADER) {
        None => Role::default(),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|s| s.parse::<Role>().ok())
            .ok_or_else(|| {
                debug!(identity = %identity, "request with unknown role");
                StatusCode::UNAUTHORIZED
            })?,
    };

    req.extensions_mut().insert(Principal::new(identity, role));

    Ok(next.run(req).await)
}
