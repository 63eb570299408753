use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use tenantguard_auth::{Decision, Operation, ResourceRef, Verb};
use tenantguard_core::TenantId;

use crate::app::services::AppServices;
use crate::context::PrincipalContext;

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub resource: ResourceRef,
    pub verb: Verb,
    #[serde(default)]
    pub target_tenant: Option<TenantId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub explain: bool,
}

/// Decision probe for the caller's own principal. Nothing is read or
/// written; allows are not audited, denials are.
pub async fn authorize(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<AuthorizeParams>,
    Json(body): Json<AuthorizeRequest>,
) -> axum::response::Response {
    let mut op = Operation::new(body.resource, body.verb);
    if let Some(t) = body.target_tenant {
        op = op.targeting(t);
    }

    let ctx = services.eval_context();
    let evaluator = &services.layer.evaluator;
    let target = op.resource.to_string();

    let result = evaluator
        .authorize(principal.principal(), &op, &ctx)
        .map_err(|err| services.layer.enforcer.deny(principal.principal(), &op, &target, err));

    if params.explain {
        let explanation = evaluator.explain(principal.principal(), &op, &ctx);
        return (StatusCode::OK, Json(explanation)).into_response();
    }

    (StatusCode::OK, Json(Decision::from(&result))).into_response()
}
