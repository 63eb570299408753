use tenantguard_auth::{Principal, Role};
use tenantguard_core::TenantId;

/// Authenticated principal for a request.
///
/// Built from verified token claims only; handlers never read a tenant id
/// from the path, query or body to decide whose data they touch.
#[derive(Debug, Clone)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.principal.tenant_id()
    }

    pub fn role(&self) -> Role {
        self.principal.role()
    }

    pub fn is_platform_operator(&self) -> bool {
        self.principal.role().is_superadmin() && self.principal.impersonation().is_none()
    }
}
