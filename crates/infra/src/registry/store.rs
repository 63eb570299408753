//! Tenant record persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use tenantguard_core::{Tenant, TenantId, TenantStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("tenant id already exists: {0}")]
    DuplicateId(TenantId),
    #[error("tenant name already exists: {0}")]
    DuplicateName(String),
    #[error("tenant not found: {0}")]
    NotFound(TenantId),
    #[error("tenant {tenant_id} is {actual}, expected {expected}")]
    StatusConflict {
        tenant_id: TenantId,
        expected: TenantStatus,
        actual: TenantStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Tenant record store.
///
/// Inserts enforce id uniqueness (and name uniqueness when asked) as one
/// atomic step; status changes are compare-and-set so two racing
/// transitions cannot both win.
pub trait TenantRepository: Send + Sync {
    fn insert(&self, tenant: Tenant, unique_name: bool) -> Result<(), RepositoryError>;

    fn get(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError>;

    fn list(&self) -> Result<Vec<Tenant>, RepositoryError>;

    /// Move `id` from `expected` to `next`, failing with `StatusConflict`
    /// if the stored status is anything else.
    fn compare_and_set_status(
        &self,
        id: TenantId,
        expected: TenantStatus,
        next: TenantStatus,
        now: DateTime<Utc>,
    ) -> Result<Tenant, RepositoryError>;
}

impl<R> TenantRepository for Arc<R>
where
    R: TenantRepository + ?Sized,
{
    fn insert(&self, tenant: Tenant, unique_name: bool) -> Result<(), RepositoryError> {
        (**self).insert(tenant, unique_name)
    }

    fn get(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError> {
        (**self).get(id)
    }

    fn list(&self) -> Result<Vec<Tenant>, RepositoryError> {
        (**self).list()
    }

    fn compare_and_set_status(
        &self,
        id: TenantId,
        expected: TenantStatus,
        next: TenantStatus,
        now: DateTime<Utc>,
    ) -> Result<Tenant, RepositoryError> {
        (**self).compare_and_set_status(id, expected, next, now)
    }
}

/// In-memory tenant repository for tests/dev.
///
/// Deleted tenants are kept so their ids are never reissued.
#[derive(Debug, Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Storage("tenant repository lock poisoned".to_string())
}

impl TenantRepository for InMemoryTenantRepository {
    fn insert(&self, tenant: Tenant, unique_name: bool) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.write().map_err(poisoned)?;
        if tenants.contains_key(&tenant.id) {
            return Err(RepositoryError::DuplicateId(tenant.id));
        }
        if unique_name
            && tenants
                .values()
                .any(|t| t.status != TenantStatus::Deleted && t.name.eq_ignore_ascii_case(&tenant.name))
        {
            return Err(RepositoryError::DuplicateName(tenant.name));
        }
        tenants.insert(tenant.id, tenant);
        Ok(())
    }

    fn get(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError> {
        Ok(self.tenants.read().map_err(poisoned)?.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<Tenant>, RepositoryError> {
        let tenants = self.tenants.read().map_err(poisoned)?;
        let mut all: Vec<Tenant> = tenants.values().cloned().collect();
        all.sort_by_key(|t| (t.created_at, t.id));
        Ok(all)
    }

    fn compare_and_set_status(
        &self,
        id: TenantId,
        expected: TenantStatus,
        next: TenantStatus,
        now: DateTime<Utc>,
    ) -> Result<Tenant, RepositoryError> {
        let mut tenants = self.tenants.write().map_err(poisoned)?;
        let tenant = tenants.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        if tenant.status != expected {
            return Err(RepositoryError::StatusConflict {
                tenant_id: id,
                expected,
                actual: tenant.status,
            });
        }
        tenant.status = next;
        tenant.updated_at = now;
        Ok(tenant.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(name: &str) -> Tenant {
        Tenant::provisioning(TenantId::new(), name.to_string(), Utc::now())
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let repo = InMemoryTenantRepository::new();
        let t = tenant("Acme");
        repo.insert(t.clone(), false).unwrap();
        assert_eq!(repo.insert(t.clone(), false), Err(RepositoryError::DuplicateId(t.id)));
    }

    #[test]
    fn name_uniqueness_is_opt_in_and_case_insensitive() {
        let repo = InMemoryTenantRepository::new();
        repo.insert(tenant("Acme"), true).unwrap();
        repo.insert(tenant("acme"), false).unwrap();
        assert!(matches!(
            repo.insert(tenant("ACME"), true),
            Err(RepositoryError::DuplicateName(_))
        ));
    }

    #[test]
    fn compare_and_set_rejects_stale_status() {
        let repo = InMemoryTenantRepository::new();
        let t = tenant("Acme");
        repo.insert(t.clone(), false).unwrap();

        repo.compare_and_set_status(t.id, TenantStatus::Provisioning, TenantStatus::Active, Utc::now())
            .unwrap();
        let err = repo
            .compare_and_set_status(t.id, TenantStatus::Provisioning, TenantStatus::Active, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryError::StatusConflict {
                tenant_id: t.id,
                expected: TenantStatus::Provisioning,
                actual: TenantStatus::Active,
            }
        );
    }
}
