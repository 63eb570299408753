use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use tenantguard_auth::{AuthzError, Grant, Operation, Principal, ResourceRef, RowScope, Verb};
use tenantguard_core::{RowId, TenantId};

use crate::enforce::Enforcer;
use crate::fence::{self, TenantFence};
use crate::schema::{Catalog, TableSpec};

use super::query::{Aggregate, AggregateValue, Condition, Delete, Insert, JoinQuery, Select, Update};
use super::store::{Row, RowStore, ScopedFilter, StoreError};

/// What a read does when its filter names a tenant other than the caller's.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForeignFilterMode {
    /// Return nothing, as if the rows did not exist. The attempt is audited.
    #[default]
    #[serde(rename = "empty")]
    EmptyResult,
    /// Fail with `CrossTenantJoin`.
    #[serde(rename = "reject")]
    Reject,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error(transparent)]
    Denied(#[from] AuthzError),

    #[error("row has no tenant id")]
    MissingTenantId,

    #[error("rows cannot be moved to another tenant")]
    TenantReassignment,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("table is not registered: {0}")]
    UnknownTable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One result of a join, keyed by table name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinedRow {
    pub rows: BTreeMap<String, Row>,
}

impl JoinedRow {
    pub fn get(&self, table: &str) -> Option<&Row> {
        self.rows.get(table)
    }

    fn with(&self, table: &str, row: Row) -> Self {
        let mut next = self.clone();
        next.rows.insert(table.to_string(), row);
        next
    }
}

/// Tenant ids a condition list names through the tenant column.
#[derive(Debug, Default)]
struct TenantRefs {
    named: BTreeSet<TenantId>,
    /// A tenant-column condition that cannot match any tenant id.
    unmatchable: bool,
}

impl TenantRefs {
    fn is_foreign(&self, own: TenantId) -> bool {
        self.unmatchable || self.named.iter().any(|t| *t != own)
    }
}

/// Strip tenant-column conditions out of `conditions`, remembering which
/// tenants they named. The store filter always gets the tenant from the
/// grant, never from the caller.
fn split_conditions(spec: &TableSpec, conditions: &[Condition]) -> (Vec<Condition>, TenantRefs) {
    let mut refs = TenantRefs::default();
    let mut rest = Vec::with_capacity(conditions.len());

    for condition in conditions {
        if condition.column != spec.tenant_column {
            rest.push(condition.clone());
            continue;
        }
        if condition.values().is_empty() {
            refs.unmatchable = true;
        }
        for value in condition.values() {
            match value.as_str().and_then(|s| s.parse::<TenantId>().ok()) {
                Some(t) => {
                    refs.named.insert(t);
                }
                None => refs.unmatchable = true,
            }
        }
    }
    (rest, refs)
}

fn owner_value(principal: &Principal) -> Value {
    Value::String(principal.user_id().to_string())
}

/// Row-level enforcement gateway.
///
/// The only path between callers and the [`RowStore`]. Every operation is
/// authorized first; every store call then carries the tenant from the
/// resulting grant, narrowed by the grant's row scope.
pub struct RowGateway {
    enforcer: Enforcer,
    store: Arc<dyn RowStore>,
    catalog: Arc<Catalog>,
    fence: Arc<TenantFence>,
    foreign_filter: ForeignFilterMode,
}

impl RowGateway {
    pub fn new(enforcer: Enforcer, store: Arc<dyn RowStore>, catalog: Arc<Catalog>, fence: Arc<TenantFence>) -> Self {
        Self {
            enforcer,
            store,
            catalog,
            fence,
            foreign_filter: ForeignFilterMode::default(),
        }
    }

    pub fn with_foreign_filter(mut self, mode: ForeignFilterMode) -> Self {
        self.foreign_filter = mode;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn select(&self, principal: &Principal, query: &Select) -> Result<Vec<Row>, GatewayError> {
        let op = read(&query.table);
        let spec = self.table_spec(principal, &op)?;
        let lock = principal.effective_tenant().map(|t| self.fence.lock_for(t));
        let _guard = lock.as_deref().map(fence::enter);

        let grant = self.enforcer.check(principal, &op, &query.table)?;
        let (conditions, refs) = split_conditions(spec, &query.conditions);
        if refs.is_foreign(grant.tenant_id) {
            self.foreign_filter(principal, &op, &grant, &query.table)?;
            return Ok(Vec::new());
        }

        let filter = scoped_filter(&grant, principal, conditions);
        Ok(self.store.select(&query.table, &filter)?)
    }

    /// Inner join. Every table is authorized separately and every tenant
    /// named in any clause must be the caller's own.
    pub fn join(&self, principal: &Principal, query: &JoinQuery) -> Result<Vec<JoinedRow>, GatewayError> {
        let base = &query.base.table;
        let mut seen = BTreeSet::from([base.as_str()]);
        let mut parts = vec![(read(base), base.as_str(), query.base.conditions.as_slice())];
        for clause in &query.joins {
            if !seen.insert(clause.table.as_str()) {
                return Err(GatewayError::InvalidPayload(format!("table '{}' joined twice", clause.table)));
            }
            parts.push((read(&clause.table), clause.table.as_str(), clause.conditions.as_slice()));
        }

        let mut spanned = BTreeSet::new();
        let mut split = Vec::with_capacity(parts.len());
        for (op, table, conditions) in &parts {
            let spec = self.table_spec(principal, op)?;
            let (rest, refs) = split_conditions(spec, conditions);
            if refs.unmatchable {
                let err = AuthzError::CrossTenantJoin {
                    resource: op.resource.to_string(),
                };
                return Err(self.enforcer.deny(principal, op, table, err).into());
            }
            spanned.extend(refs.named);
            split.push(rest);
        }

        let lock = principal.effective_tenant().map(|t| self.fence.lock_for(t));
        let _guard = lock.as_deref().map(fence::enter);

        let mut fetched = Vec::with_capacity(parts.len());
        for ((op, table, _), conditions) in parts.into_iter().zip(split) {
            let op = op.spanning(spanned.iter().copied());
            let grant = self.enforcer.check(principal, &op, table)?;
            let filter = scoped_filter(&grant, principal, conditions);
            fetched.push((table, self.store.select(table, &filter)?));
        }

        let mut fetched = fetched.into_iter();
        let Some((_, base_rows)) = fetched.next() else {
            return Ok(Vec::new());
        };
        let mut results: Vec<JoinedRow> = base_rows
            .into_iter()
            .map(|r| JoinedRow::default().with(base, r))
            .collect();

        for (clause, (table, rows)) in query.joins.iter().zip(fetched) {
            results = results
                .into_iter()
                .flat_map(|joined| {
                    let key = joined.get(base).and_then(|r| r.value(&clause.on_base));
                    rows.iter()
                        .filter(|r| key.is_some() && r.value(&clause.on_joined) == key)
                        .map(|r| joined.with(table, r.clone()))
                        .collect::<Vec<_>>()
                })
                .collect();
        }

        Ok(results)
    }

    /// Aggregate over one table. A tenant filter naming any other tenant is
    /// a cross-tenant aggregate and is rejected.
    pub fn aggregate(&self, principal: &Principal, query: &Select, aggregate: &Aggregate) -> Result<AggregateValue, GatewayError> {
        let op = read(&query.table);
        let spec = self.table_spec(principal, &op)?;
        let (conditions, refs) = split_conditions(spec, &query.conditions);
        if refs.unmatchable {
            let err = AuthzError::CrossTenantJoin {
                resource: op.resource.to_string(),
            };
            return Err(self.enforcer.deny(principal, &op, &query.table, err).into());
        }

        let lock = principal.effective_tenant().map(|t| self.fence.lock_for(t));
        let _guard = lock.as_deref().map(fence::enter);

        let op = op.spanning(refs.named);
        let grant = self.enforcer.check(principal, &op, &query.table)?;
        let filter = scoped_filter(&grant, principal, conditions);

        Ok(match aggregate {
            Aggregate::Count => AggregateValue::Count(self.store.count(&query.table, &filter)?),
            Aggregate::Sum { column } => AggregateValue::Sum(
                self.store
                    .select(&query.table, &filter)?
                    .iter()
                    .filter_map(|r| r.value(column).and_then(|v| v.as_f64()))
                    .sum(),
            ),
        })
    }

    /// Insert a row. The payload must name its tenant, and that tenant must
    /// be the caller's. Row ids are always minted here, so an insert never
    /// learns which ids other tenants hold.
    pub fn insert(&self, principal: &Principal, insert: Insert) -> Result<Row, GatewayError> {
        let table = insert.table.as_str();
        let op = Operation::new(ResourceRef::table(insert.table.clone()), Verb::Create);
        let spec = self.table_spec(principal, &op)?;

        let Some(tenant_id) = insert.tenant_id else {
            self.enforcer
                .reject(principal, principal.effective_tenant(), &op, table, "missing_tenant_id");
            return Err(GatewayError::MissingTenantId);
        };

        let lock = principal.effective_tenant().map(|t| self.fence.lock_for(t));
        let _guard = lock.as_deref().map(fence::enter);

        let op = op.targeting(tenant_id);
        let grant = self.enforcer.check(principal, &op, table)?;

        let mut values = insert.values;
        if values.contains_key("id") {
            return Err(GatewayError::InvalidPayload("'id' is assigned by the gateway".to_string()));
        }
        if let Some(claimed) = values.remove(&*spec.tenant_column) {
            if claimed.as_str() != Some(tenant_id.to_string().as_str()) {
                let err = AuthzError::PolicyDenied {
                    rule: grant.rule_id.clone(),
                    reason: "tenant column does not match the row tenant".to_string(),
                };
                return Err(self.enforcer.deny(principal, &op, table, err).into());
            }
        }
        if let RowScope::OwnedBy { column } = &grant.scope {
            let me = owner_value(principal);
            match values.get(&**column) {
                Some(owner) if *owner != me => {
                    let err = AuthzError::PolicyDenied {
                        rule: grant.rule_id.clone(),
                        reason: "row is not owned by the caller".to_string(),
                    };
                    return Err(self.enforcer.deny(principal, &op, table, err).into());
                }
                Some(_) => {}
                None => {
                    values.insert(column.to_string(), me);
                }
            }
        }

        let row = Row {
            id: RowId::new(),
            tenant_id,
            values,
        };
        self.store.insert(table, row.clone())?;
        debug!(tenant_id = %tenant_id, table = %table, row_id = %row.id, "row inserted");
        Ok(row)
    }

    /// Insert into the caller's own tenant without naming it.
    pub fn insert_scoped(&self, principal: &Principal, table: &str, values: Map<String, Value>) -> Result<Row, GatewayError> {
        let Some(tenant_id) = principal.effective_tenant() else {
            let op = Operation::new(ResourceRef::table(table.to_string()), Verb::Create);
            let err = self
                .enforcer
                .deny(principal, &op, table, AuthzError::TenantInactive { tenant_id: None });
            return Err(err.into());
        };
        self.insert(
            principal,
            Insert {
                table: table.to_string(),
                tenant_id: Some(tenant_id),
                values,
            },
        )
    }

    /// Update matching rows of the caller's tenant. Zero matches is a no-op.
    pub fn update(&self, principal: &Principal, update: &Update) -> Result<u64, GatewayError> {
        let table = update.table.as_str();
        let op = Operation::new(ResourceRef::table(update.table.clone()), Verb::Update);
        let spec = self.table_spec(principal, &op)?;

        if update.changes.contains_key(&*spec.tenant_column) {
            self.enforcer
                .reject(principal, principal.effective_tenant(), &op, table, "tenant_reassignment");
            return Err(GatewayError::TenantReassignment);
        }
        if update.changes.contains_key("id") {
            return Err(GatewayError::InvalidPayload("'id' cannot be changed".to_string()));
        }

        let lock = principal.effective_tenant().map(|t| self.fence.lock_for(t));
        let _guard = lock.as_deref().map(fence::enter);

        let grant = self.enforcer.check(principal, &op, table)?;
        let (conditions, refs) = split_conditions(spec, &update.conditions);
        if refs.is_foreign(grant.tenant_id) {
            self.foreign_filter(principal, &op, &grant, table)?;
            return Ok(0);
        }
        if let RowScope::OwnedBy { column } = &grant.scope {
            if update.changes.get(&**column).is_some_and(|v| *v != owner_value(principal)) {
                let err = AuthzError::PolicyDenied {
                    rule: grant.rule_id.clone(),
                    reason: "row ownership cannot be transferred".to_string(),
                };
                return Err(self.enforcer.deny(principal, &op, table, err).into());
            }
        }

        let filter = scoped_filter(&grant, principal, conditions);
        let updated = self.store.update(table, &filter, &update.changes)?;
        info!(tenant_id = %grant.tenant_id, table = %table, rows = updated, "rows updated");
        Ok(updated)
    }

    /// Delete matching rows of the caller's tenant. Zero matches is a no-op.
    pub fn delete(&self, principal: &Principal, delete: &Delete) -> Result<u64, GatewayError> {
        let table = delete.table.as_str();
        let op = Operation::new(ResourceRef::table(delete.table.clone()), Verb::Delete);
        let spec = self.table_spec(principal, &op)?;

        let lock = principal.effective_tenant().map(|t| self.fence.lock_for(t));
        let _guard = lock.as_deref().map(fence::enter);

        let grant = self.enforcer.check(principal, &op, table)?;
        let (conditions, refs) = split_conditions(spec, &delete.conditions);
        if refs.is_foreign(grant.tenant_id) {
            self.foreign_filter(principal, &op, &grant, table)?;
            return Ok(0);
        }

        let filter = scoped_filter(&grant, principal, conditions);
        let deleted = self.store.delete(table, &filter)?;
        info!(tenant_id = %grant.tenant_id, table = %table, rows = deleted, "rows deleted");
        Ok(deleted)
    }

    /// Catalog entry for the operation's table. An unregistered table is
    /// still run through the evaluator so the denial is the evaluator's.
    fn table_spec(&self, principal: &Principal, op: &Operation) -> Result<&TableSpec, GatewayError> {
        if let Some(spec) = self.catalog.table(op.resource.name()) {
            return Ok(spec);
        }
        self.enforcer.check(principal, op, op.resource.name())?;
        Err(GatewayError::UnknownTable(op.resource.name().to_string()))
    }

    fn foreign_filter(&self, principal: &Principal, op: &Operation, grant: &Grant, table: &str) -> Result<(), GatewayError> {
        match self.foreign_filter {
            ForeignFilterMode::EmptyResult => {
                warn!(
                    user_id = %principal.user_id(),
                    tenant_id = %grant.tenant_id,
                    operation = %op,
                    "filter names a foreign tenant; returning no rows"
                );
                self.enforcer
                    .reject(principal, Some(grant.tenant_id), op, table, "foreign_tenant_filter");
                Ok(())
            }
            ForeignFilterMode::Reject => {
                let err = AuthzError::CrossTenantJoin {
                    resource: op.resource.to_string(),
                };
                Err(self.enforcer.deny(principal, op, table, err).into())
            }
        }
    }
}

fn read(table: &str) -> Operation {
    Operation::new(ResourceRef::table(table.to_string()), Verb::Read)
}

fn scoped_filter(grant: &Grant, principal: &Principal, conditions: Vec<Condition>) -> ScopedFilter {
    let filter = ScopedFilter::tenant(grant.tenant_id).and_all(conditions);
    match &grant.scope {
        RowScope::Tenant => filter,
        RowScope::OwnedBy { column } => filter.and(Condition::eq(column.to_string(), owner_value(principal))),
    }
}
