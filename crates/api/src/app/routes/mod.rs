use axum::{
    routing::{get, post},
    Router,
};

pub mod audit;
pub mod authorize;
pub mod data;
pub mod objects;
pub mod system;
pub mod tenants;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/authorize", post(authorize::authorize))
        .route("/audit", get(audit::export))
        .nest("/tenants", tenants::router())
        .route("/data/:table", get(data::select).post(data::insert))
        .route(
            "/objects/*path",
            get(objects::download).put(objects::upload).delete(objects::delete),
        )
        .route("/objects-list/*prefix", get(objects::list))
        .route("/objects-url/*path", get(objects::public_url))
}
