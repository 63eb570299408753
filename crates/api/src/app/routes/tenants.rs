use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, warn};

use tenantguard_core::{TenantId, UserId};
use tenantguard_infra::lifecycle::BootstrapAdmin;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(provision))
        .route("/:id", delete(delete_tenant))
        .route("/:id/activate", post(activate))
        .route("/:id/suspend", post(suspend))
        .route("/:id/status", get(status))
}

#[derive(Debug, Deserialize)]
pub struct BootstrapAdminRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub name: String,
    pub admin: BootstrapAdminRequest,
}

/// Registry endpoints belong to platform operators only.
fn require_operator(principal: &PrincipalContext) -> Result<(), axum::response::Response> {
    if principal.is_platform_operator() {
        return Ok(());
    }
    warn!(
        user_id = %principal.principal().user_id(),
        role = principal.role().as_str(),
        "registry call by non-operator"
    );
    Err(errors::json_error(StatusCode::FORBIDDEN, "access_denied", "access denied"))
}

fn parse_tenant_id(raw: &str) -> Result<TenantId, axum::response::Response> {
    raw.parse::<TenantId>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid tenant id"))
}

pub async fn provision(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ProvisionRequest>,
) -> axum::response::Response {
    if let Err(resp) = require_operator(&principal) {
        return resp;
    }

    let admin = BootstrapAdmin {
        user_id: body.admin.user_id.unwrap_or_default(),
        email: body.admin.email,
        display_name: body.admin.display_name,
    };

    match services.layer.lifecycle.provision(&body.name, admin, Some(principal.principal())) {
        Ok(provisioned) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "tenant": provisioned.tenant,
                "admin_user_id": provisioned.admin.user_id().to_string(),
                "report": provisioned.report,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn activate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require_operator(&principal) {
        return resp;
    }
    let tenant_id = match parse_tenant_id(&id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.layer.lifecycle.activate(tenant_id, Some(principal.principal())) {
        Ok(tenant) => (StatusCode::OK, Json(tenant)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn suspend(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require_operator(&principal) {
        return resp;
    }
    let tenant_id = match parse_tenant_id(&id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    // Suspension waits on the tenant's exclusive fence.
    let operator = principal.principal().clone();
    let result = tokio::task::spawn_blocking(move || services.layer.lifecycle.suspend(tenant_id, Some(&operator))).await;

    match result {
        Ok(Ok(tenant)) => (StatusCode::OK, Json(tenant)).into_response(),
        Ok(Err(e)) => errors::lifecycle_error_to_response(e),
        Err(join_err) => worker_failed(tenant_id, join_err),
    }
}

/// Suspends, purges, verifies the purge, then marks the tenant deleted.
pub async fn delete_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require_operator(&principal) {
        return resp;
    }
    let tenant_id = match parse_tenant_id(&id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let operator = principal.principal().clone();
    let result = tokio::task::spawn_blocking(move || services.layer.lifecycle.delete(tenant_id, Some(&operator))).await;

    match result {
        Ok(Ok(deleted)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "tenant": deleted.tenant,
                "report": deleted.report,
                "attempts": deleted.attempts,
            })),
        )
            .into_response(),
        Ok(Err(e)) => errors::lifecycle_error_to_response(e),
        Err(join_err) => worker_failed(tenant_id, join_err),
    }
}

fn worker_failed(tenant_id: TenantId, err: tokio::task::JoinError) -> axum::response::Response {
    error!(tenant_id = %tenant_id, error = %err, "lifecycle task failed");
    errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
}

pub async fn status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require_operator(&principal) {
        return resp;
    }
    let tenant_id = match parse_tenant_id(&id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.layer.registry.status(tenant_id) {
        Ok(Some(status)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "tenant_id": tenant_id, "status": status })),
        )
            .into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        Err(e) => errors::registry_error_to_response(e),
    }
}
