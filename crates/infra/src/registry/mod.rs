//! Tenant registry: the source of truth for tenant identity and status.
//!
//! ```text
//! provisioning ──activate──▶ active ──suspend──▶ suspended ──delete──▶ deleted
//!      │                       ▲                    │
//!      └──────suspend──────────┼────────────────────┘
//!                              └──────activate──────┘
//! ```
//!
//! `deleted` is terminal and only reachable with a clean purge report.

mod store;

pub use store::{InMemoryTenantRepository, RepositoryError, TenantRepository};

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use tenantguard_auth::{DirectoryError, Principal, TenantDirectory};
use tenantguard_core::{DomainError, Tenant, TenantId, TenantStatus, normalize_tenant_name};

use crate::audit::{self, AuditDecision, AuditEntry, AuditLog};
use crate::lifecycle::{LifecycleReport, ReportKind};

/// Compare-and-set attempts before a transition gives up under contention.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tenant name already exists: {0}")]
    DuplicateName(String),

    #[error("tenant id already exists: {0}")]
    DuplicateId(TenantId),

    #[error("tenant not found: {0}")]
    NotFound(TenantId),

    #[error("tenant {tenant_id} cannot move from {from} to {to}")]
    InvalidTransition {
        tenant_id: TenantId,
        from: TenantStatus,
        to: TenantStatus,
    },

    #[error("tenant {tenant_id} still has data ({remaining_rows} rows, {remaining_objects} objects)")]
    DataNotPurged {
        tenant_id: TenantId,
        remaining_rows: u64,
        remaining_objects: u64,
    },

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("registry storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for RegistryError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::DuplicateId(id) => RegistryError::DuplicateId(id),
            RepositoryError::DuplicateName(name) => RegistryError::DuplicateName(name),
            RepositoryError::NotFound(id) => RegistryError::NotFound(id),
            RepositoryError::StatusConflict {
                tenant_id,
                expected,
                actual,
            } => RegistryError::InvalidTransition {
                tenant_id,
                from: actual,
                to: expected,
            },
            RepositoryError::Storage(msg) => RegistryError::Storage(msg),
        }
    }
}

pub struct TenantRegistry {
    repository: Arc<dyn TenantRepository>,
    audit: Arc<dyn AuditLog>,
    unique_names: bool,
}

impl TenantRegistry {
    pub fn new(repository: Arc<dyn TenantRepository>, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            repository,
            audit,
            unique_names: false,
        }
    }

    /// Reject names already used by a live tenant.
    pub fn with_unique_names(mut self, unique: bool) -> Self {
        self.unique_names = unique;
        self
    }

    /// Register a new tenant in `provisioning` under a fresh random id.
    ///
    /// `actor` is the operator behind the call; `None` for platform jobs.
    pub fn create(&self, name: &str, actor: Option<&Principal>) -> Result<Tenant, RegistryError> {
        let name = normalize_tenant_name(name)?;
        let tenant = Tenant::provisioning(TenantId::new(), name, Utc::now());

        self.repository.insert(tenant.clone(), self.unique_names)?;

        info!(tenant_id = %tenant.id, name = %tenant.name, "tenant created");
        audit::record(
            self.audit.as_ref(),
            AuditEntry::system(tenant.id, "tenant/create", AuditDecision::Allow, "tenant_created").by(actor),
        );
        Ok(tenant)
    }

    /// `provisioning` or `suspended` to `active`. Already-active is a no-op.
    pub fn activate(&self, id: TenantId, actor: Option<&Principal>) -> Result<Tenant, RegistryError> {
        self.transition(
            id,
            &[TenantStatus::Provisioning, TenantStatus::Suspended],
            TenantStatus::Active,
            "tenant_activated",
            actor,
        )
    }

    /// `active` or `provisioning` to `suspended`. Already-suspended is a no-op.
    pub fn suspend(&self, id: TenantId, actor: Option<&Principal>) -> Result<Tenant, RegistryError> {
        self.transition(
            id,
            &[TenantStatus::Active, TenantStatus::Provisioning],
            TenantStatus::Suspended,
            "tenant_suspended",
            actor,
        )
    }

    /// Mark a non-active tenant `deleted`.
    ///
    /// `report` must be a purge report for this tenant with no remaining
    /// rows or objects. Deleting an already-deleted tenant is a no-op.
    pub fn delete(&self, id: TenantId, report: &LifecycleReport, actor: Option<&Principal>) -> Result<Tenant, RegistryError> {
        let current = self.get(id)?;
        if current.status == TenantStatus::Deleted {
            return Ok(current);
        }

        if report.tenant_id != id || report.kind != ReportKind::Purge || !report.is_clean() {
            warn!(
                tenant_id = %id,
                remaining_rows = report.total_rows(),
                remaining_objects = report.total_objects(),
                "tenant deletion refused: data not purged"
            );
            audit::record(
                self.audit.as_ref(),
                AuditEntry::system(id, "tenant/delete", AuditDecision::Deny, "data_not_purged").by(actor),
            );
            return Err(RegistryError::DataNotPurged {
                tenant_id: id,
                remaining_rows: if report.tenant_id == id { report.total_rows() } else { 0 },
                remaining_objects: if report.tenant_id == id { report.total_objects() } else { 0 },
            });
        }

        self.transition(
            id,
            &[TenantStatus::Suspended, TenantStatus::Provisioning],
            TenantStatus::Deleted,
            "tenant_deleted",
            actor,
        )
    }

    pub fn exists(&self, id: TenantId) -> Result<bool, RegistryError> {
        Ok(self.repository.get(id)?.is_some())
    }

    pub fn status(&self, id: TenantId) -> Result<Option<TenantStatus>, RegistryError> {
        Ok(self.repository.get(id)?.map(|t| t.status))
    }

    pub fn get(&self, id: TenantId) -> Result<Tenant, RegistryError> {
        self.repository.get(id)?.ok_or(RegistryError::NotFound(id))
    }

    pub fn list(&self, status: Option<TenantStatus>) -> Result<Vec<Tenant>, RegistryError> {
        let mut tenants = self.repository.list()?;
        if let Some(status) = status {
            tenants.retain(|t| t.status == status);
        }
        Ok(tenants)
    }

    fn transition(
        &self,
        id: TenantId,
        allowed_from: &[TenantStatus],
        next: TenantStatus,
        reason: &'static str,
        actor: Option<&Principal>,
    ) -> Result<Tenant, RegistryError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let current = self.get(id)?;
            if current.status == next {
                return Ok(current);
            }
            if !allowed_from.contains(&current.status) {
                return Err(RegistryError::InvalidTransition {
                    tenant_id: id,
                    from: current.status,
                    to: next,
                });
            }

            match self
                .repository
                .compare_and_set_status(id, current.status, next, Utc::now())
            {
                Ok(updated) => {
                    info!(tenant_id = %id, from = %current.status, to = %next, "tenant status changed");
                    audit::record(
                        self.audit.as_ref(),
                        AuditEntry::system(id, format!("tenant/{}", next.as_str()), AuditDecision::Allow, reason).by(actor),
                    );
                    return Ok(updated);
                }
                // Lost a race; re-read and decide again.
                Err(RepositoryError::StatusConflict { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(RegistryError::Storage(format!(
            "tenant {id} status changed concurrently {MAX_TRANSITION_ATTEMPTS} times"
        )))
    }
}

impl TenantDirectory for TenantRegistry {
    fn tenant_status(&self, tenant_id: TenantId) -> Result<Option<TenantStatus>, DirectoryError> {
        self.repository
            .get(tenant_id)
            .map(|t| t.map(|t| t.status))
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))
    }
}
