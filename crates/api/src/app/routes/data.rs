use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};

use tenantguard_infra::rows::{Condition, Row, Select};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// `GET /data/{table}?col=value&...`; every query parameter is an
/// equality filter.
pub async fn select(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(table): Path<String>,
    Query(filters): Query<BTreeMap<String, String>>,
) -> axum::response::Response {
    let query = filters
        .into_iter()
        .fold(Select::from(table.as_str()), |q, (column, raw)| {
            q.filter(Condition::eq(column, filter_value(&raw)))
        });

    match services.layer.rows.select(principal.principal(), &query) {
        Ok(rows) => {
            let items = rows.iter().map(|r| row_to_json(&services, &table, r)).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::gateway_error_to_response(e),
    }
}

/// `POST /data/{table}`; the row is stamped with the caller's tenant.
pub async fn insert(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(table): Path<String>,
    Json(values): Json<Map<String, Value>>,
) -> axum::response::Response {
    match services.layer.rows.insert_scoped(principal.principal(), &table, values) {
        Ok(row) => (StatusCode::CREATED, Json(row_to_json(&services, &table, &row))).into_response(),
        Err(e) => errors::gateway_error_to_response(e),
    }
}

/// Numbers and booleans compare as JSON values; anything else is a string.
fn filter_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(raw.to_string()),
    }
}

fn row_to_json(services: &AppServices, table: &str, row: &Row) -> Value {
    match services.layer.catalog.table(table) {
        Some(spec) => row.to_json(&spec.tenant_column),
        None => Value::Object(row.values.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_values_keep_ids_as_strings() {
        assert_eq!(filter_value("42"), Value::from(42));
        assert_eq!(filter_value("true"), Value::Bool(true));
        assert_eq!(
            filter_value("0192f0c4-8d1e-7c3a-9b7e-3f5d2c1a0b9e"),
            Value::String("0192f0c4-8d1e-7c3a-9b7e-3f5d2c1a0b9e".to_string())
        );
        assert_eq!(filter_value("null"), Value::String("null".to_string()));
    }
}
