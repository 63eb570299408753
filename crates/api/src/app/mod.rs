//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the isolation layer shared by every handler
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `errors.rs`: consistent, non-enumerating error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use tenantguard_auth::{Hs256JwtValidator, PolicyError};
use tenantguard_infra::IsolationConfig;

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over fresh in-memory services.
pub fn build_app(jwt_secret: String, config: IsolationConfig) -> Result<Router, PolicyError> {
    let services = Arc::new(services::build_services(config)?);
    Ok(build_router(jwt_secret, services))
}

/// Build the router over existing services.
pub fn build_router(jwt_secret: String, services: Arc<services::AppServices>) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Everything but the health probe needs a verified principal.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
