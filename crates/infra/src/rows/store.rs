//! Row storage. Every read and write takes a [`ScopedFilter`], which cannot
//! be built without a tenant id.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use tenantguard_core::{RowId, TenantId, TenantScoped};

use super::query::Condition;

/// A stored row. The owning tenant lives outside `values` and never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub tenant_id: TenantId,
    pub values: Map<String, Value>,
}

impl Row {
    /// Value of `column`; `id` resolves to the row id.
    pub fn value(&self, column: &str) -> Option<Value> {
        if column == "id" {
            return Some(Value::String(self.id.to_string()));
        }
        self.values.get(column).cloned()
    }

    /// JSON view with the id and tenant column materialized.
    pub fn to_json(&self, tenant_column: &str) -> Value {
        let mut out = Map::with_capacity(self.values.len() + 2);
        out.insert("id".to_string(), Value::String(self.id.to_string()));
        out.insert(tenant_column.to_string(), Value::String(self.tenant_id.to_string()));
        for (k, v) in &self.values {
            out.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Value::Object(out)
    }
}

impl TenantScoped for Row {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// A filter that always carries exactly one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedFilter {
    tenant_id: TenantId,
    conditions: Vec<Condition>,
}

impl ScopedFilter {
    pub fn tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            conditions: Vec::new(),
        }
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn and_all(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.tenant_id == self.tenant_id && self.conditions.iter().all(|c| c.matches(row.value(&c.column).as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("row id already exists: {0}")]
    DuplicateRow(RowId),
    #[error("storage error: {0}")]
    Storage(String),
}

pub trait RowStore: Send + Sync {
    fn insert(&self, table: &str, row: Row) -> Result<(), StoreError>;

    fn select(&self, table: &str, filter: &ScopedFilter) -> Result<Vec<Row>, StoreError>;

    /// Merge `changes` into every matching row. Returns the number updated.
    fn update(&self, table: &str, filter: &ScopedFilter, changes: &Map<String, Value>) -> Result<u64, StoreError>;

    fn delete(&self, table: &str, filter: &ScopedFilter) -> Result<u64, StoreError>;

    fn count(&self, table: &str, filter: &ScopedFilter) -> Result<u64, StoreError>;
}

impl<S> RowStore for Arc<S>
where
    S: RowStore + ?Sized,
{
    fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        (**self).insert(table, row)
    }

    fn select(&self, table: &str, filter: &ScopedFilter) -> Result<Vec<Row>, StoreError> {
        (**self).select(table, filter)
    }

    fn update(&self, table: &str, filter: &ScopedFilter, changes: &Map<String, Value>) -> Result<u64, StoreError> {
        (**self).update(table, filter, changes)
    }

    fn delete(&self, table: &str, filter: &ScopedFilter) -> Result<u64, StoreError> {
        (**self).delete(table, filter)
    }

    fn count(&self, table: &str, filter: &ScopedFilter) -> Result<u64, StoreError> {
        (**self).count(table, filter)
    }
}

/// In-memory row store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRowStore {
    tables: RwLock<HashMap<String, BTreeMap<RowId, Row>>>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every row of `table` regardless of tenant. Test/inspection only.
    pub fn dump(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .map(|t| t.get(table).map(|rows| rows.values().cloned().collect()).unwrap_or_default())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Storage("row store lock poisoned".to_string())
}

impl RowStore for InMemoryRowStore {
    fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(&row.id) {
            return Err(StoreError::DuplicateRow(row.id));
        }
        rows.insert(row.id, row);
        Ok(())
    }

    fn select(&self, table: &str, filter: &ScopedFilter) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .get(table)
            .map(|rows| rows.values().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    fn update(&self, table: &str, filter: &ScopedFilter, changes: &Map<String, Value>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut updated = 0;
        for row in rows.values_mut().filter(|r| filter.matches(r)) {
            for (k, v) in changes {
                row.values.insert(k.clone(), v.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }

    fn delete(&self, table: &str, filter: &ScopedFilter) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|_, r| !filter.matches(r));
        Ok((before - rows.len()) as u64)
    }

    fn count(&self, table: &str, filter: &ScopedFilter) -> Result<u64, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .get(table)
            .map(|rows| rows.values().filter(|r| filter.matches(r)).count() as u64)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(tenant_id: TenantId, name: &str) -> Row {
        let mut values = Map::new();
        values.insert("name".to_string(), json!(name));
        Row {
            id: RowId::new(),
            tenant_id,
            values,
        }
    }

    #[test]
    fn filters_never_cross_tenants() {
        let store = InMemoryRowStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.insert("departments", row(a, "Sales")).unwrap();
        store.insert("departments", row(b, "Sales")).unwrap();

        let filter = ScopedFilter::tenant(a).and(Condition::eq("name", "Sales"));
        let rows = store.select("departments", &filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tenant_id, a);
    }

    #[test]
    fn row_ids_are_unique_across_tenants() {
        let store = InMemoryRowStore::new();
        let original = row(TenantId::new(), "Sales");
        let mut hijack = row(TenantId::new(), "Sales");
        hijack.id = original.id;

        store.insert("departments", original.clone()).unwrap();
        assert_eq!(
            store.insert("departments", hijack),
            Err(StoreError::DuplicateRow(original.id))
        );
    }

    #[test]
    fn delete_only_touches_the_scoped_tenant() {
        let store = InMemoryRowStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.insert("departments", row(a, "Sales")).unwrap();
        store.insert("departments", row(b, "Ops")).unwrap();

        assert_eq!(store.delete("departments", &ScopedFilter::tenant(a)).unwrap(), 1);
        assert_eq!(store.count("departments", &ScopedFilter::tenant(b)).unwrap(), 1);
        assert_eq!(store.dump("departments").len(), 1);
    }

    #[test]
    fn json_view_exposes_tenant_column() {
        let t = TenantId::new();
        let r = row(t, "Sales");
        let view = r.to_json("company_id");
        assert_eq!(view["company_id"], json!(t.to_string()));
        assert_eq!(view["id"], json!(r.id.to_string()));
    }
}
