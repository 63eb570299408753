use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// `GET /objects/{bucket}/tenant/{id}/{path}`
pub async fn download(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<String>,
) -> axum::response::Response {
    match services.layer.storage.download(principal.principal(), &path) {
        Ok(object) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, object.content_type)],
            object.bytes,
        )
            .into_response(),
        Err(e) => errors::storage_error_to_response(e),
    }
}

/// `PUT /objects/{bucket}/{relative}`
///
/// The tenant segment is never taken from the request: the object lands
/// under the caller's own namespace in `bucket`.
pub async fn upload(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let Some((bucket, relative)) = path.split_once('/') else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_path", "expected {bucket}/{path}");
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE);

    match services
        .layer
        .storage
        .upload(principal.principal(), bucket, relative, body.to_vec(), content_type)
    {
        Ok(stored) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "path": stored.to_string() })),
        )
            .into_response(),
        Err(e) => errors::storage_error_to_response(e),
    }
}

pub async fn delete(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<String>,
) -> axum::response::Response {
    match services.layer.storage.delete(principal.principal(), &path) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::storage_error_to_response(e),
    }
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(prefix): Path<String>,
) -> axum::response::Response {
    match services.layer.storage.list(principal.principal(), &prefix) {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::storage_error_to_response(e),
    }
}

pub async fn public_url(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<String>,
) -> axum::response::Response {
    match services.layer.storage.public_url(principal.principal(), &path) {
        Ok(url) => (StatusCode::OK, Json(serde_json::json!({ "url": url }))).into_response(),
        Err(e) => errors::storage_error_to_response(e),
    }
}
