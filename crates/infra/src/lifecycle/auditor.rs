use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tenantguard_core::TenantId;

use crate::rows::{RowStore, ScopedFilter};
use crate::schema::Catalog;
use crate::storage::{ObjectPrefix, ObjectStore};

use super::LifecycleError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Taken right after provisioning: only bootstrap rows allowed.
    Fresh,
    /// Taken after deletion: nothing may remain.
    Purge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    Table { table: String, found: u64, allowed: u64 },
    Bucket { bucket: String, found: u64 },
}

/// Census of one tenant's data at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleReport {
    pub tenant_id: TenantId,
    pub kind: ReportKind,
    pub checked_at: DateTime<Utc>,
    pub rows: BTreeMap<String, u64>,
    pub objects: BTreeMap<String, u64>,
    pub violations: Vec<Violation>,
}

impl LifecycleReport {
    /// A purge report with nothing left behind.
    pub fn clean_purge(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            kind: ReportKind::Purge,
            checked_at: Utc::now(),
            rows: BTreeMap::new(),
            objects: BTreeMap::new(),
            violations: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn total_rows(&self) -> u64 {
        self.rows.values().sum()
    }

    pub fn total_objects(&self) -> u64 {
        self.objects.values().sum()
    }
}

/// Verifies that a tenant's data footprint matches its lifecycle stage.
///
/// Reads the stores directly with a [`ScopedFilter`] for the tenant under
/// inspection; it never goes through the evaluator because the tenant is not
/// active at either checkpoint.
pub struct LifecycleAuditor {
    rows: Arc<dyn RowStore>,
    objects: Arc<dyn ObjectStore>,
    catalog: Arc<Catalog>,
}

impl LifecycleAuditor {
    pub fn new(rows: Arc<dyn RowStore>, objects: Arc<dyn ObjectStore>, catalog: Arc<Catalog>) -> Self {
        Self { rows, objects, catalog }
    }

    /// A new tenant may hold its bootstrap rows and nothing else.
    pub fn verify_fresh_tenant(&self, tenant_id: TenantId) -> Result<LifecycleReport, LifecycleError> {
        let report = self.census(tenant_id, ReportKind::Fresh)?;
        if report.is_clean() {
            info!(tenant_id = %tenant_id, rows = report.total_rows(), "fresh tenant verified");
        } else {
            warn!(tenant_id = %tenant_id, violations = ?report.violations, "fresh tenant holds unexpected data");
        }
        Ok(report)
    }

    /// A deleted tenant may hold nothing at all.
    pub fn verify_purge(&self, tenant_id: TenantId) -> Result<LifecycleReport, LifecycleError> {
        let report = self.census(tenant_id, ReportKind::Purge)?;
        if report.is_clean() {
            info!(tenant_id = %tenant_id, "tenant purge verified");
        } else {
            warn!(
                tenant_id = %tenant_id,
                remaining_rows = report.total_rows(),
                remaining_objects = report.total_objects(),
                "tenant data remains after purge"
            );
        }
        Ok(report)
    }

    fn census(&self, tenant_id: TenantId, kind: ReportKind) -> Result<LifecycleReport, LifecycleError> {
        let mut rows = BTreeMap::new();
        let mut objects = BTreeMap::new();
        let mut violations = Vec::new();

        let filter = ScopedFilter::tenant(tenant_id);
        for table in self.catalog.tables() {
            let found = self.rows.count(&table.name, &filter)?;
            let allowed = match kind {
                ReportKind::Fresh => table.fresh_allowance,
                ReportKind::Purge => 0,
            };
            if found > allowed {
                violations.push(Violation::Table {
                    table: table.name.to_string(),
                    found,
                    allowed,
                });
            }
            rows.insert(table.name.to_string(), found);
        }

        for bucket in self.catalog.tenant_buckets() {
            let found = self.objects.count_prefix(&ObjectPrefix::tenant_root(&bucket.name, tenant_id))?;
            if found > 0 {
                violations.push(Violation::Bucket {
                    bucket: bucket.name.to_string(),
                    found,
                });
            }
            objects.insert(bucket.name.to_string(), found);
        }

        Ok(LifecycleReport {
            tenant_id,
            kind,
            checked_at: Utc::now(),
            rows,
            objects,
            violations,
        })
    }
}
