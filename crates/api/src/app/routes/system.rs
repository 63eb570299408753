use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    let p = principal.principal();
    Json(serde_json::json!({
        "user_id": p.user_id().to_string(),
        "tenant_id": p.tenant_id().map(|t| t.to_string()),
        "role": p.role().as_str(),
    }))
}
