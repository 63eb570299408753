use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use tenantguard_auth::{AuthzError, EvalContext, Grant, Operation, PolicyEvaluator, Principal, TenantDirectory};
use tenantguard_core::TenantId;

use crate::audit::{self, AuditEntry, AuditLog};

/// The evaluator as wired by this crate: tenant status comes from the
/// registry behind a trait object.
pub type Evaluator = PolicyEvaluator<Arc<dyn TenantDirectory>>;

/// Policy enforcement point shared by the row and storage gateways.
///
/// Wraps every evaluation with its audit obligations: each denial is
/// recorded, and an allow that requires an audit entry is turned into a
/// deny when that entry cannot be written.
#[derive(Clone)]
pub struct Enforcer {
    evaluator: Arc<Evaluator>,
    audit: Arc<dyn AuditLog>,
    timeout: Duration,
}

impl Enforcer {
    pub fn new(evaluator: Arc<Evaluator>, audit: Arc<dyn AuditLog>, timeout: Duration) -> Self {
        Self {
            evaluator,
            audit,
            timeout,
        }
    }

    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }

    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    pub fn check(&self, principal: &Principal, operation: &Operation, target: &str) -> Result<Grant, AuthzError> {
        let ctx = EvalContext::now().with_timeout(self.timeout);
        match self.evaluator.authorize(principal, operation, &ctx) {
            Ok(grant) => {
                if grant.audit_required {
                    let entry = AuditEntry::allowed(principal, operation.to_string(), target, &grant);
                    if let Err(err) = self.audit.append(entry) {
                        warn!(
                            user_id = %principal.user_id(),
                            operation = %operation,
                            error = %err,
                            "audited operation refused: audit log unavailable"
                        );
                        return Err(AuthzError::EvaluationTimeout {
                            cause: format!("audit log unavailable: {err}"),
                        });
                    }
                }
                Ok(grant)
            }
            Err(err) => Err(self.deny(principal, operation, target, err)),
        }
    }

    /// Record `err` as a denial of `operation` and hand it back.
    pub fn deny(&self, principal: &Principal, operation: &Operation, target: &str, err: AuthzError) -> AuthzError {
        audit::record(
            self.audit.as_ref(),
            AuditEntry::denial(principal, operation.to_string(), target, &err),
        );
        err
    }

    /// Record a denial decided by the gateway itself under `reason`.
    pub fn reject(
        &self,
        principal: &Principal,
        tenant_id: Option<TenantId>,
        operation: &Operation,
        target: &str,
        reason: &str,
    ) {
        audit::record(
            self.audit.as_ref(),
            AuditEntry::rejected(principal, tenant_id, operation.to_string(), target, reason),
        );
    }
}
