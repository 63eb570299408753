use serde::{Deserialize, Serialize};

use tenantguard_core::{TenantId, UserId};

use crate::{ImpersonationGrant, JwtClaims, Role};

/// An authenticated actor.
///
/// The tenant claim is bound when the principal is built from verified
/// claims and has no setter: request parameters can never move a principal
/// into another tenant. The only way to act inside a foreign tenant is an
/// explicit, time-boxed [`ImpersonationGrant`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    user_id: UserId,
    tenant_id: Option<TenantId>,
    role: Role,
    impersonation: Option<ImpersonationGrant>,
}

impl Principal {
    /// Server-side construction for a principal bound to a tenant.
    pub fn new(user_id: UserId, tenant_id: TenantId, role: Role) -> Self {
        Self {
            user_id,
            tenant_id: Some(tenant_id),
            role,
            impersonation: None,
        }
    }

    /// A principal with no tenant claim (e.g. a platform operator).
    pub fn without_tenant(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            tenant_id: None,
            role,
            impersonation: None,
        }
    }

    /// Derive the principal from verified token claims.
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            role: claims.role,
            impersonation: None,
        }
    }

    /// Attach an impersonation grant. The evaluator checks that the grant was
    /// issued to this principal and is still inside its time box.
    pub fn impersonating(mut self, grant: ImpersonationGrant) -> Self {
        self.impersonation = Some(grant);
        self
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn impersonation(&self) -> Option<&ImpersonationGrant> {
        self.impersonation.as_ref()
    }

    /// Tenant this principal acts in: the impersonation target when a grant
    /// is attached, otherwise the tenant claim.
    ///
    /// This is a routing hint only; it says nothing about whether the grant
    /// is still valid. Authorization is decided by the evaluator.
    pub fn effective_tenant(&self) -> Option<TenantId> {
        match &self.impersonation {
            Some(grant) => Some(grant.target_tenant()),
            None => self.tenant_id,
        }
    }

    pub fn snapshot(&self) -> PrincipalSnapshot {
        PrincipalSnapshot {
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            role: self.role,
            impersonating: self.impersonation.as_ref().map(|g| g.target_tenant()),
        }
    }
}

/// Serializable view of a principal, recorded in audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalSnapshot {
    pub user_id: UserId,
    pub tenant_id: Option<TenantId>,
    pub role: Role,
    pub impersonating: Option<TenantId>,
}
