use crate::error::ErrorBody;
use crate::routes::vps::{SshPending, SshSession};
use utoipa::OpenApi;
use vps_orchestrator::{CreateVpsRequest, ErrorKind, Role, VpsRecord, VpsStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::vps::list_vps,
        crate::routes::vps::create_vps,
        crate::routes::vps::get_vps,
        crate::routes::vps::delete_vps,
        crate::routes::vps::vps_action,
        crate::routes::vps::open_ssh,
    ),
    components(
        schemas(
            VpsRecord,
            VpsStatus,
            CreateVpsRequest,
            Role,
            ErrorKind,
            ErrorBody,
            SshSession,
            SshPending
        )
    ),
    tags(
        (name = "vps-api", description = "VPS Lifecycle API")
    )
)]
pub struct ApiDoc;
