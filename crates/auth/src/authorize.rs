use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use tenantguard_core::{TenantId, TenantStatus};

use crate::policy::{PolicyError, PolicySet, ResourceRef, RowScope, Verb, rule_id};
use crate::{ImpersonationAccess, Principal, PrincipalSnapshot, Role};

/// Typed authorization failure. Every variant is a deny.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// The tenant is absent, unknown, or not `active`.
    #[error("tenant is not active")]
    TenantInactive { tenant_id: Option<TenantId> },

    /// A rule exists and explicitly does not allow the operation.
    #[error("denied by policy {rule}: {reason}")]
    PolicyDenied { rule: String, reason: String },

    /// No rule is registered for the pair (default deny).
    #[error("no policy rule for {resource}/{verb}")]
    NoRuleDefined { resource: String, verb: Verb },

    /// A query touched more than one tenant.
    #[error("cross-tenant query rejected on {resource}")]
    CrossTenantJoin { resource: String },

    /// A storage path is outside the caller's tenant namespace.
    #[error("storage path not authorized: {path}")]
    PathAuthorization { path: String },

    /// Infrastructure failure or deadline expiry while evaluating.
    #[error("authorization evaluation failed: {cause}")]
    EvaluationTimeout { cause: String },
}

impl AuthzError {
    /// Only infrastructure failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthzError::EvaluationTimeout { .. })
    }

    /// Stable code recorded in audit entries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AuthzError::TenantInactive { .. } => "tenant_inactive",
            AuthzError::PolicyDenied { .. } => "policy_denied",
            AuthzError::NoRuleDefined { .. } => "no_rule_defined",
            AuthzError::CrossTenantJoin { .. } => "cross_tenant_join",
            AuthzError::PathAuthorization { .. } => "path_authorization",
            AuthzError::EvaluationTimeout { .. } => "evaluation_timeout",
        }
    }

    /// Message safe to show end users; never reveals whether a resource
    /// exists in another tenant.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthzError::TenantInactive { .. }
            | AuthzError::CrossTenantJoin { .. }
            | AuthzError::PathAuthorization { .. } => "not found",
            AuthzError::PolicyDenied { .. } | AuthzError::NoRuleDefined { .. } => "access denied",
            AuthzError::EvaluationTimeout { .. } => "temporarily unavailable",
        }
    }

    fn denied(resource: &ResourceRef, verb: Verb, reason: impl Into<String>) -> Self {
        AuthzError::PolicyDenied {
            rule: rule_id(resource, verb),
            reason: reason.into(),
        }
    }
}

/// An operation to authorize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub resource: ResourceRef,
    pub verb: Verb,
    /// Tenant that owns the target, when the caller names one explicitly.
    pub target_tenant: Option<TenantId>,
    /// Tenants a join or aggregate would read from.
    pub spanned_tenants: Vec<TenantId>,
}

impl Operation {
    pub fn new(resource: ResourceRef, verb: Verb) -> Self {
        Self {
            resource,
            verb,
            target_tenant: None,
            spanned_tenants: Vec::new(),
        }
    }

    pub fn targeting(mut self, tenant_id: TenantId) -> Self {
        self.target_tenant = Some(tenant_id);
        self
    }

    pub fn spanning(mut self, tenants: impl IntoIterator<Item = TenantId>) -> Self {
        self.spanned_tenants.extend(tenants);
        self
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.resource, self.verb)
    }
}

/// Per-call evaluation context: the clock and an optional caller deadline.
#[derive(Debug, Copy, Clone)]
pub struct EvalContext {
    pub now: DateTime<Utc>,
    pub deadline: Option<Instant>,
}

impl EvalContext {
    pub fn now() -> Self {
        Self {
            now: Utc::now(),
            deadline: None,
        }
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now; a timeout past the clock's range means
    /// no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    fn check_deadline(&self) -> Result<(), AuthzError> {
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(AuthzError::EvaluationTimeout {
                cause: "deadline exceeded".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("tenant lookup timed out")]
    Timeout,

    #[error("tenant directory unavailable: {0}")]
    Unavailable(String),
}

/// Source of truth for tenant status, consulted on every evaluation.
///
/// Implementations must be read-after-write consistent: a status change
/// that has returned must be visible to the next lookup.
pub trait TenantDirectory: Send + Sync {
    fn tenant_status(&self, tenant_id: TenantId) -> Result<Option<TenantStatus>, DirectoryError>;
}

impl<D> TenantDirectory for Arc<D>
where
    D: TenantDirectory + ?Sized,
{
    fn tenant_status(&self, tenant_id: TenantId) -> Result<Option<TenantStatus>, DirectoryError> {
        (**self).tenant_status(tenant_id)
    }
}

/// How the principal reached the tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AccessMode {
    Tenant,
    Impersonation { grant_id: Uuid },
}

/// A successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// The tenant every storage access must be scoped to.
    pub tenant_id: TenantId,
    /// Role the rule was evaluated for.
    pub role: Role,
    pub mode: AccessMode,
    /// Narrowing applied inside the tenant.
    pub scope: RowScope,
    pub rule_id: String,
    pub policy_version: u64,
    /// The caller must append an audit entry for this allow.
    pub audit_required: bool,
}

/// Serializable allow/deny view of an evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&Result<Grant, AuthzError>> for Decision {
    fn from(value: &Result<Grant, AuthzError>) -> Self {
        match value {
            Ok(_) => Decision {
                allow: true,
                reason: None,
            },
            Err(e) => Decision {
                allow: false,
                reason: Some(e.reason_code().to_string()),
            },
        }
    }
}

/// Policy decision point.
///
/// Holds an injected, versioned [`PolicySet`] and a [`TenantDirectory`].
/// Evaluation is a pure function of `(principal, operation, policy, tenant
/// status, clock)`; any failure to establish those inputs denies.
pub struct PolicyEvaluator<D> {
    policy: RwLock<Arc<PolicySet>>,
    directory: D,
}

impl<D: TenantDirectory> PolicyEvaluator<D> {
    pub fn new(policy: PolicySet, directory: D) -> Self {
        Self {
            policy: RwLock::new(Arc::new(policy)),
            directory,
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Snapshot of the current policy set.
    pub fn policy(&self) -> Option<Arc<PolicySet>> {
        self.policy.read().ok().map(|p| p.clone())
    }

    /// Atomically swap the policy. Versions must strictly increase.
    pub fn replace_policy(&self, next: PolicySet) -> Result<(), PolicyError> {
        let mut guard = self.policy.write().unwrap_or_else(|e| e.into_inner());
        if next.version() <= guard.version() {
            return Err(PolicyError::VersionNotIncreasing {
                current: guard.version(),
                proposed: next.version(),
            });
        }
        debug!(from = guard.version(), to = next.version(), "policy replaced");
        *guard = Arc::new(next);
        Ok(())
    }

    /// Authorize `operation` for `principal`.
    ///
    /// - No storage IO besides the tenant status lookup
    /// - No panics
    /// - Fail-closed on every error path
    pub fn authorize(
        &self,
        principal: &Principal,
        operation: &Operation,
        ctx: &EvalContext,
    ) -> Result<Grant, AuthzError> {
        let result = self.evaluate(principal, operation, ctx);
        match &result {
            Ok(grant) => debug!(
                user_id = %principal.user_id(),
                tenant_id = %grant.tenant_id,
                operation = %operation,
                rule = %grant.rule_id,
                "authorization allowed"
            ),
            Err(err) => debug!(
                user_id = %principal.user_id(),
                operation = %operation,
                reason = err.reason_code(),
                "authorization denied"
            ),
        }
        result
    }

    fn evaluate(
        &self,
        principal: &Principal,
        operation: &Operation,
        ctx: &EvalContext,
    ) -> Result<Grant, AuthzError> {
        ctx.check_deadline()?;
        let resource = &operation.resource;
        let verb = operation.verb;

        // (1) effective tenant + status
        let (tenant_id, role, mode) = resolve_tenant(principal, operation, ctx)?;

        let status = self.directory.tenant_status(tenant_id).map_err(|e| {
            warn!(tenant_id = %tenant_id, error = %e, "tenant status lookup failed");
            AuthzError::EvaluationTimeout { cause: e.to_string() }
        })?;
        if status != Some(TenantStatus::Active) {
            return Err(AuthzError::TenantInactive {
                tenant_id: Some(tenant_id),
            });
        }
        ctx.check_deadline()?;

        // (2) rule lookup, default deny
        let policy = self.policy().ok_or_else(|| AuthzError::EvaluationTimeout {
            cause: "policy unavailable".to_string(),
        })?;
        let rule = policy
            .rule(resource, verb)
            .ok_or_else(|| AuthzError::NoRuleDefined {
                resource: resource.to_string(),
                verb,
            })?;

        // (3) tenant equality is the outer gate; roles only narrow
        if let Some(target) = operation.target_tenant {
            if target != tenant_id {
                return Err(AuthzError::denied(resource, verb, "tenant mismatch"));
            }
        }
        let grant = rule.grant_for(role).ok_or_else(|| {
            AuthzError::denied(resource, verb, format!("role '{role}' is not granted"))
        })?;

        // (4) joins/aggregates may only span the effective tenant
        if operation.spanned_tenants.iter().any(|t| *t != tenant_id) {
            return Err(AuthzError::CrossTenantJoin {
                resource: resource.to_string(),
            });
        }

        Ok(Grant {
            tenant_id,
            role,
            mode,
            scope: grant.scope.clone(),
            rule_id: rule.rule_id(),
            policy_version: policy.version(),
            audit_required: rule.audit_allows || matches!(mode, AccessMode::Impersonation { .. }),
        })
    }

    /// Explain the decision for `operation` in a form suitable for audits.
    pub fn explain(
        &self,
        principal: &Principal,
        operation: &Operation,
        ctx: &EvalContext,
    ) -> AuthorizationExplanation {
        let result = self.evaluate(principal, operation, ctx);
        let policy_version = self.policy().map(|p| p.version()).unwrap_or_default();

        match result {
            Ok(grant) => AuthorizationExplanation {
                operation: operation.to_string(),
                granted: true,
                reason: format!(
                    "rule {} grants role '{}' with scope {:?}",
                    grant.rule_id, grant.role, grant.scope
                ),
                principal: principal.snapshot(),
                policy_version,
                denial: None,
            },
            Err(err) => AuthorizationExplanation {
                operation: operation.to_string(),
                granted: false,
                reason: err.to_string(),
                principal: principal.snapshot(),
                policy_version,
                denial: Some(DenialReason {
                    code: err.reason_code().to_string(),
                    retryable: err.is_retryable(),
                    suggestions: suggestions_for(&err),
                }),
            },
        }
    }
}

fn resolve_tenant(
    principal: &Principal,
    operation: &Operation,
    ctx: &EvalContext,
) -> Result<(TenantId, Role, AccessMode), AuthzError> {
    let Some(grant) = principal.impersonation() else {
        let tenant_id = principal
            .tenant_id()
            .ok_or(AuthzError::TenantInactive { tenant_id: None })?;
        return Ok((tenant_id, principal.role(), AccessMode::Tenant));
    };

    let deny = |reason: &str| AuthzError::denied(&operation.resource, operation.verb, reason);

    if principal.role() != Role::Superadmin || grant.issued_to() != principal.user_id() {
        return Err(deny("impersonation grant not held by its superadmin"));
    }
    if !grant.is_active_at(ctx.now) {
        return Err(deny("impersonation grant expired"));
    }
    if operation.verb.is_mutation() && grant.access() == ImpersonationAccess::ReadOnly {
        return Err(deny("impersonation grant is read-only"));
    }

    // Inside the target tenant an impersonating superadmin acts as an admin.
    Ok((
        grant.target_tenant(),
        Role::Admin,
        AccessMode::Impersonation { grant_id: grant.id() },
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub operation: String,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalSnapshot,
    pub policy_version: u64,
    pub denial: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub code: String,
    pub retryable: bool,
    pub suggestions: Vec<String>,
}

fn suggestions_for(err: &AuthzError) -> Vec<String> {
    match err {
        AuthzError::TenantInactive { tenant_id: None } => {
            vec!["Authenticate with a token that carries a tenant claim".to_string()]
        }
        AuthzError::TenantInactive { .. } => {
            vec!["Activate the tenant before accessing its data".to_string()]
        }
        AuthzError::PolicyDenied { rule, .. } => vec![format!(
            "Check the role grants of rule {rule}; tenant equality is never negotiable"
        )],
        AuthzError::NoRuleDefined { resource, verb } => {
            vec![format!("Register an explicit rule for {resource}/{verb}")]
        }
        AuthzError::CrossTenantJoin { .. } => {
            vec!["Remove foreign tenant ids from join and filter clauses".to_string()]
        }
        AuthzError::PathAuthorization { .. } => {
            vec!["Build write paths with build_scoped_path".to_string()]
        }
        AuthzError::EvaluationTimeout { .. } => {
            vec!["Retry with backoff".to_string()]
        }
    }
}
