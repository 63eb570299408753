use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use tenantguard_auth::AuthzError;
use tenantguard_infra::audit::AuditError;
use tenantguard_infra::lifecycle::LifecycleError;
use tenantguard_infra::registry::RegistryError;
use tenantguard_infra::rows::{GatewayError, StoreError};
use tenantguard_infra::storage::StorageError;

/// Denials never say whether the target exists in another tenant: anything
/// that could leak that is a plain 404.
pub fn authz_error_to_response(err: &AuthzError) -> Response {
    let (status, code) = match err {
        AuthzError::TenantInactive { .. }
        | AuthzError::CrossTenantJoin { .. }
        | AuthzError::PathAuthorization { .. } => (StatusCode::NOT_FOUND, "not_found"),
        AuthzError::PolicyDenied { .. } | AuthzError::NoRuleDefined { .. } => {
            (StatusCode::FORBIDDEN, "access_denied")
        }
        AuthzError::EvaluationTimeout { .. } => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };
    json_error(status, code, err.public_message())
}

pub fn gateway_error_to_response(err: GatewayError) -> Response {
    match err {
        GatewayError::Denied(e) => authz_error_to_response(&e),
        GatewayError::MissingTenantId => json_error(StatusCode::BAD_REQUEST, "missing_tenant_id", "row has no tenant id"),
        GatewayError::TenantReassignment => json_error(StatusCode::FORBIDDEN, "access_denied", "access denied"),
        GatewayError::InvalidPayload(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_payload", msg),
        GatewayError::UnknownTable(_) => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        GatewayError::Store(StoreError::DuplicateRow(_)) => json_error(StatusCode::CONFLICT, "conflict", "row already exists"),
        GatewayError::Store(e) => internal(e),
    }
}

pub fn storage_error_to_response(err: StorageError) -> Response {
    match err {
        StorageError::Denied(e) => authz_error_to_response(&e),
        StorageError::InvalidPath(e) => json_error(StatusCode::BAD_REQUEST, "invalid_path", e.to_string()),
        StorageError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StorageError::Store(e) => internal(e),
    }
}

pub fn registry_error_to_response(err: RegistryError) -> Response {
    match err {
        RegistryError::DuplicateName(_) | RegistryError::DuplicateId(_) => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        RegistryError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        RegistryError::InvalidTransition { .. } => json_error(StatusCode::CONFLICT, "invalid_transition", err.to_string()),
        RegistryError::DataNotPurged { .. } => json_error(StatusCode::CONFLICT, "data_not_purged", err.to_string()),
        RegistryError::Validation(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        RegistryError::Storage(_) => internal(err),
    }
}

pub fn lifecycle_error_to_response(err: LifecycleError) -> Response {
    match err {
        LifecycleError::Registry(e) => registry_error_to_response(e),
        LifecycleError::ProvisioningDefect { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "provisioning_defect", err.to_string())
        }
        LifecycleError::Audit(e) => audit_error_to_response(e),
        e => internal(e),
    }
}

pub fn audit_error_to_response(err: AuditError) -> Response {
    match err {
        AuditError::Denied(e) => authz_error_to_response(&e),
        AuditError::Unavailable(_) => {
            error!(error = %err, "audit log unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "temporarily unavailable")
        }
    }
}

fn internal(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "request failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_tenant_denials_look_like_missing_resources() {
        let path = authz_error_to_response(&AuthzError::PathAuthorization {
            path: "documents/tenant/x/secret.pdf".to_string(),
        });
        assert_eq!(path.status(), StatusCode::NOT_FOUND);

        let inactive = authz_error_to_response(&AuthzError::TenantInactive { tenant_id: None });
        assert_eq!(inactive.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn policy_denials_are_forbidden_and_timeouts_retryable() {
        let denied = authz_error_to_response(&AuthzError::PolicyDenied {
            rule: "table:contracts/read".to_string(),
            reason: "role not granted".to_string(),
        });
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let timeout = authz_error_to_response(&AuthzError::EvaluationTimeout {
            cause: "directory unavailable".to_string(),
        });
        assert_eq!(timeout.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
