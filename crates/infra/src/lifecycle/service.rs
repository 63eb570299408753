use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use tenantguard_auth::{Principal, Role};
use tenantguard_core::{RowId, Tenant, TenantId, TenantStatus, UserId};

use crate::audit::{self, AuditDecision, AuditEntry, AuditLog};
use crate::fence::{self, TenantFence};
use crate::registry::TenantRegistry;
use crate::rows::{Row, RowStore, ScopedFilter};
use crate::schema::{COMPANIES, Catalog, EMPLOYEES};
use crate::storage::{ObjectPrefix, ObjectStore};

use super::{LifecycleAuditor, LifecycleError, LifecycleReport};

/// First administrator of a new tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct ProvisionedTenant {
    pub tenant: Tenant,
    /// Principal for the bootstrap administrator.
    pub admin: Principal,
    pub report: LifecycleReport,
}

#[derive(Debug, Clone)]
pub struct DeletedTenant {
    pub tenant: Tenant,
    pub report: LifecycleReport,
    /// Purge passes it took to reach a clean report.
    pub attempts: u32,
}

/// Orchestrates provisioning, activation and deletion of tenants, with an
/// audit of the tenant's data footprint at every step.
pub struct TenantLifecycle {
    registry: Arc<TenantRegistry>,
    auditor: Arc<LifecycleAuditor>,
    rows: Arc<dyn RowStore>,
    objects: Arc<dyn ObjectStore>,
    catalog: Arc<Catalog>,
    fence: Arc<TenantFence>,
    audit: Arc<dyn AuditLog>,
    purge_attempts: u32,
}

impl TenantLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<TenantRegistry>,
        auditor: Arc<LifecycleAuditor>,
        rows: Arc<dyn RowStore>,
        objects: Arc<dyn ObjectStore>,
        catalog: Arc<Catalog>,
        fence: Arc<TenantFence>,
        audit: Arc<dyn AuditLog>,
        purge_attempts: u32,
    ) -> Self {
        Self {
            registry,
            auditor,
            rows,
            objects,
            catalog,
            fence,
            audit,
            purge_attempts: purge_attempts.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    pub fn auditor(&self) -> &Arc<LifecycleAuditor> {
        &self.auditor
    }

    /// Create a tenant, write its bootstrap rows, verify it holds nothing
    /// else and activate it.
    ///
    /// A tenant that fails the fresh check stays in `provisioning` and is
    /// never reachable. If a bootstrap write fails, the rows already written
    /// are purged before the error is returned.
    pub fn provision(
        &self,
        name: &str,
        admin: BootstrapAdmin,
        actor: Option<&Principal>,
    ) -> Result<ProvisionedTenant, LifecycleError> {
        let tenant = self.registry.create(name, actor)?;
        let tenant_id = tenant.id;

        if let Err(err) = self.write_bootstrap(&tenant, &admin) {
            error!(tenant_id = %tenant_id, error = %err, "bootstrap write failed; rolling back");
            if let Err(purge_err) = self.purge(tenant_id) {
                error!(tenant_id = %tenant_id, error = %purge_err, "bootstrap rollback failed");
            }
            audit::record(
                self.audit.as_ref(),
                AuditEntry::system(tenant_id, "tenant/provision", AuditDecision::Deny, "bootstrap_failed").by(actor),
            );
            return Err(err);
        }

        let report = self.auditor.verify_fresh_tenant(tenant_id)?;
        if !report.is_clean() {
            error!(tenant_id = %tenant_id, violations = ?report.violations, "provisioning defect; tenant left inactive");
            audit::record(
                self.audit.as_ref(),
                AuditEntry::system(tenant_id, "tenant/provision", AuditDecision::Deny, "provisioning_defect").by(actor),
            );
            return Err(LifecycleError::ProvisioningDefect {
                tenant_id,
                violations: report.violations,
            });
        }

        let tenant = self.registry.activate(tenant_id, actor)?;
        info!(tenant_id = %tenant_id, "tenant provisioned");
        Ok(ProvisionedTenant {
            tenant,
            admin: Principal::new(admin.user_id, tenant_id, Role::Admin),
            report,
        })
    }

    fn write_bootstrap(&self, tenant: &Tenant, admin: &BootstrapAdmin) -> Result<(), LifecycleError> {
        let tenant_id = tenant.id;
        if self.catalog.table(COMPANIES).is_some() {
            self.rows.insert(
                COMPANIES,
                Row {
                    id: RowId::tenant_root(tenant_id),
                    tenant_id,
                    values: object(json!({ "name": tenant.name })),
                },
            )?;
        }
        if self.catalog.table(EMPLOYEES).is_some() {
            self.rows.insert(
                EMPLOYEES,
                Row {
                    id: RowId::new(),
                    tenant_id,
                    values: object(json!({
                        "user_id": admin.user_id.to_string(),
                        "email": admin.email,
                        "display_name": admin.display_name,
                        "role": Role::Admin.as_str(),
                    })),
                },
            )?;
        }
        Ok(())
    }

    /// Activate a tenant. Coming out of `provisioning` it must pass the
    /// fresh check first.
    pub fn activate(&self, tenant_id: TenantId, actor: Option<&Principal>) -> Result<Tenant, LifecycleError> {
        if self.registry.get(tenant_id)?.status == TenantStatus::Provisioning {
            let report = self.auditor.verify_fresh_tenant(tenant_id)?;
            if !report.is_clean() {
                return Err(LifecycleError::ProvisioningDefect {
                    tenant_id,
                    violations: report.violations,
                });
            }
        }
        Ok(self.registry.activate(tenant_id, actor)?)
    }

    pub fn suspend(&self, tenant_id: TenantId, actor: Option<&Principal>) -> Result<Tenant, LifecycleError> {
        let lock = self.fence.lock_for(tenant_id);
        let _guard = fence::exclusive(&lock);
        Ok(self.registry.suspend(tenant_id, actor)?)
    }

    /// Delete a tenant and every row and object it owns.
    ///
    /// The tenant is suspended under the exclusive fence first, so no
    /// request authorized against `active` is still writing when the purge
    /// starts. Purge and verification are retried; if data still remains the
    /// tenant stays `suspended` and the failure is reported.
    pub fn delete(&self, tenant_id: TenantId, actor: Option<&Principal>) -> Result<DeletedTenant, LifecycleError> {
        let current = self.registry.get(tenant_id)?;
        if current.status == TenantStatus::Deleted {
            let report = self.auditor.verify_purge(tenant_id)?;
            return Ok(DeletedTenant {
                tenant: current,
                report,
                attempts: 0,
            });
        }

        {
            let lock = self.fence.lock_for(tenant_id);
            let _guard = fence::exclusive(&lock);
            self.registry.suspend(tenant_id, actor)?;
        }

        let mut report = LifecycleReport::clean_purge(tenant_id);
        for attempt in 1..=self.purge_attempts {
            let (rows, objects) = self.purge(tenant_id)?;
            report = self.auditor.verify_purge(tenant_id)?;
            info!(tenant_id = %tenant_id, attempt, rows, objects, clean = report.is_clean(), "tenant purge pass");

            if report.is_clean() {
                let tenant = self.registry.delete(tenant_id, &report, actor)?;
                return Ok(DeletedTenant {
                    tenant,
                    report,
                    attempts: attempt,
                });
            }
            warn!(tenant_id = %tenant_id, attempt, "purge incomplete; retrying");
        }

        error!(
            tenant_id = %tenant_id,
            remaining_rows = report.total_rows(),
            remaining_objects = report.total_objects(),
            "tenant purge failed; tenant left suspended"
        );
        // Refused with `DataNotPurged` unless the tenant was deleted meanwhile.
        let tenant = self.registry.delete(tenant_id, &report, actor)?;
        Ok(DeletedTenant {
            tenant,
            report,
            attempts: self.purge_attempts,
        })
    }

    /// Remove every row and object of `tenant_id`. Returns what was removed.
    pub(crate) fn purge(&self, tenant_id: TenantId) -> Result<(u64, u64), LifecycleError> {
        let filter = ScopedFilter::tenant(tenant_id);
        let mut rows = 0;
        for table in self.catalog.tables() {
            rows += self.rows.delete(&table.name, &filter)?;
        }
        let mut objects = 0;
        for bucket in self.catalog.tenant_buckets() {
            objects += self
                .objects
                .delete_prefix(&ObjectPrefix::tenant_root(&bucket.name, tenant_id))?;
        }
        Ok((rows, objects))
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
