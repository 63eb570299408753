use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use tenantguard_auth::{
    ImpersonationAccess, ImpersonationError, ImpersonationGrant, PolicyError, PolicyEvaluator, Principal,
    TenantDirectory,
};
use tenantguard_core::TenantId;

use crate::audit::{self, AuditDecision, AuditEntry, AuditExporter, AuditLog, InMemoryAuditLog};
use crate::config::IsolationConfig;
use crate::enforce::{Enforcer, Evaluator};
use crate::fence::TenantFence;
use crate::lifecycle::{LifecycleAuditor, LifecycleSweeper, TenantLifecycle};
use crate::registry::{InMemoryTenantRepository, TenantRegistry, TenantRepository};
use crate::rows::{InMemoryRowStore, RowGateway, RowStore};
use crate::schema::{Catalog, default_policy};
use crate::storage::{InMemoryObjectStore, ObjectStore, StorageAuthorizer, StorageGateway};

/// Policy version installed at startup.
pub const INITIAL_POLICY_VERSION: u64 = 1;

/// Fully wired isolation layer.
///
/// Every component shares one registry, one audit log and one fence; the
/// evaluator reads tenant status straight from the registry.
#[derive(Clone)]
pub struct IsolationLayer {
    pub config: IsolationConfig,
    pub catalog: Arc<Catalog>,
    pub audit: Arc<dyn AuditLog>,
    pub registry: Arc<TenantRegistry>,
    pub evaluator: Arc<Evaluator>,
    pub enforcer: Enforcer,
    pub rows: Arc<RowGateway>,
    pub storage: Arc<StorageGateway>,
    pub lifecycle: Arc<TenantLifecycle>,
    pub fence: Arc<TenantFence>,
    pub exporter: AuditExporter,
}

impl IsolationLayer {
    /// Wire everything over in-memory stores.
    pub fn in_memory(config: IsolationConfig) -> Result<Self, PolicyError> {
        Self::with_stores(
            config,
            InMemoryTenantRepository::arc(),
            Arc::new(InMemoryAuditLog::new()),
            InMemoryRowStore::arc(),
            InMemoryObjectStore::arc(),
        )
    }

    /// Wire everything over the given stores. Fails when the default policy
    /// does not cover the whole catalog.
    pub fn with_stores(
        config: IsolationConfig,
        tenants: Arc<dyn TenantRepository>,
        audit: Arc<dyn AuditLog>,
        row_store: Arc<dyn RowStore>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Result<Self, PolicyError> {
        let catalog = Arc::new(Catalog::hr_default(&config.public_buckets));
        let policy = default_policy(&catalog, INITIAL_POLICY_VERSION)?;

        let registry = Arc::new(
            TenantRegistry::new(tenants, audit.clone()).with_unique_names(config.unique_tenant_names),
        );
        let directory: Arc<dyn TenantDirectory> = registry.clone();
        let evaluator = Arc::new(PolicyEvaluator::new(policy, directory));
        let fence = Arc::new(TenantFence::new());
        let enforcer = Enforcer::new(evaluator.clone(), audit.clone(), config.evaluation_timeout());

        let rows = Arc::new(
            RowGateway::new(enforcer.clone(), row_store.clone(), catalog.clone(), fence.clone())
                .with_foreign_filter(config.foreign_filter_mode),
        );
        let authorizer = Arc::new(StorageAuthorizer::new(
            enforcer.clone(),
            catalog.clone(),
            config.public_base_url.clone(),
        ));
        let storage = Arc::new(StorageGateway::new(authorizer, object_store.clone(), fence.clone()));

        let auditor = Arc::new(LifecycleAuditor::new(row_store.clone(), object_store.clone(), catalog.clone()));
        let lifecycle = Arc::new(TenantLifecycle::new(
            registry.clone(),
            auditor,
            row_store,
            object_store,
            catalog.clone(),
            fence.clone(),
            audit.clone(),
            config.purge_retries,
        ));

        info!(
            tables = catalog.tables().count(),
            buckets = catalog.buckets().count(),
            policy_version = INITIAL_POLICY_VERSION,
            "isolation layer ready"
        );

        Ok(Self {
            exporter: AuditExporter::new(audit.clone()),
            config,
            catalog,
            audit,
            registry,
            evaluator,
            enforcer,
            rows,
            storage,
            lifecycle,
            fence,
        })
    }

    pub fn sweeper(&self) -> LifecycleSweeper {
        LifecycleSweeper::new(self.lifecycle.clone(), self.audit.clone(), self.config.audit_retention())
    }

    /// Issue an impersonation grant to `superadmin` for `target` and return
    /// the principal that carries it. The grant itself is audited.
    pub fn impersonate(
        &self,
        superadmin: &Principal,
        target: TenantId,
        access: ImpersonationAccess,
        reason: &str,
        duration: chrono::Duration,
    ) -> Result<Principal, ImpersonationError> {
        let grant = ImpersonationGrant::issue(
            superadmin,
            target,
            access,
            reason,
            duration,
            self.config.impersonation_max_duration(),
            Utc::now(),
        )?;

        info!(
            user_id = %superadmin.user_id(),
            tenant_id = %target,
            grant_id = %grant.id(),
            expires_at = %grant.expires_at(),
            "impersonation granted"
        );
        let mut entry = AuditEntry::system(target, "tenant/impersonate", AuditDecision::Allow, "impersonation_granted");
        entry.principal = Some(superadmin.snapshot());
        audit::record(self.audit.as_ref(), entry);

        Ok(superadmin.clone().impersonating(grant))
    }
}
