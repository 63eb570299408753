//! Tenant lifecycle: provisioning, deletion with verified purge, and the
//! background compliance sweep.

mod auditor;
mod service;
mod sweep;

pub use auditor::{LifecycleAuditor, LifecycleReport, ReportKind, Violation};
pub use service::{BootstrapAdmin, DeletedTenant, ProvisionedTenant, TenantLifecycle};
pub use sweep::{LifecycleSweeper, SweepSummary, SweeperHandle};

use thiserror::Error;

use tenantguard_core::TenantId;

use crate::audit::AuditError;
use crate::registry::RegistryError;
use crate::rows::StoreError;
use crate::storage::ObjectStoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("tenant {tenant_id} failed the fresh-tenant check")]
    ProvisioningDefect {
        tenant_id: TenantId,
        violations: Vec<Violation>,
    },

    #[error(transparent)]
    Rows(#[from] StoreError),

    #[error(transparent)]
    Objects(#[from] ObjectStoreError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}
