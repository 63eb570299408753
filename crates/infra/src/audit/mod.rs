//! Append-only audit and compliance log.
//!
//! Every denial, every allowed operation under a rule marked
//! `audit_allows`, every impersonated operation and every tenant status
//! transition lands here. Entries are never modified; the only removal
//! path is retention expiry.

mod in_memory;

pub use in_memory::InMemoryAuditLog;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use tenantguard_auth::{AuthzError, Grant, Principal, PrincipalSnapshot, Role};
use tenantguard_core::{AuditEntryId, TenantId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit log unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Denied(#[from] AuthzError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    Allow,
    Deny,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub recorded_at: DateTime<Utc>,
    /// `None` for system actions (lifecycle jobs, sweeps).
    pub principal: Option<PrincipalSnapshot>,
    /// Tenant the operation was aimed at, when one is known.
    pub tenant_id: Option<TenantId>,
    /// e.g. `table:departments/read` or `tenant/activate`.
    pub operation: String,
    /// Table name, object path or `tenant:{id}`.
    pub target: String,
    pub decision: AuditDecision,
    /// Stable reason code (`policy_denied`, `tenant_activated`, ...).
    pub reason: String,
}

impl AuditEntry {
    fn new(
        principal: Option<PrincipalSnapshot>,
        tenant_id: Option<TenantId>,
        operation: impl Into<String>,
        target: impl Into<String>,
        decision: AuditDecision,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            recorded_at: Utc::now(),
            principal,
            tenant_id,
            operation: operation.into(),
            target: target.into(),
            decision,
            reason: reason.into(),
        }
    }

    pub fn denial(principal: &Principal, operation: impl Into<String>, target: impl Into<String>, err: &AuthzError) -> Self {
        let tenant_id = match err {
            AuthzError::TenantInactive { tenant_id } => *tenant_id,
            _ => principal.effective_tenant(),
        };
        Self::new(
            Some(principal.snapshot()),
            tenant_id,
            operation,
            target,
            AuditDecision::Deny,
            err.reason_code(),
        )
    }

    pub fn allowed(principal: &Principal, operation: impl Into<String>, target: impl Into<String>, grant: &Grant) -> Self {
        let reason = match grant.mode {
            tenantguard_auth::AccessMode::Tenant => "policy_allowed",
            tenantguard_auth::AccessMode::Impersonation { .. } => "impersonation",
        };
        Self::new(
            Some(principal.snapshot()),
            Some(grant.tenant_id),
            operation,
            target,
            AuditDecision::Allow,
            reason,
        )
    }

    /// A deny decided outside the evaluator, with a custom reason code.
    pub fn rejected(
        principal: &Principal,
        tenant_id: Option<TenantId>,
        operation: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            Some(principal.snapshot()),
            tenant_id,
            operation,
            target,
            AuditDecision::Deny,
            reason,
        )
    }

    /// An action taken by the platform itself.
    pub fn system(
        tenant_id: TenantId,
        operation: impl Into<String>,
        decision: AuditDecision,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            None,
            Some(tenant_id),
            operation,
            format!("tenant:{tenant_id}"),
            decision,
            reason,
        )
    }

    /// Attribute a system action to the operator who started it.
    pub fn by(mut self, actor: Option<&Principal>) -> Self {
        if let Some(actor) = actor {
            self.principal = Some(actor.snapshot());
        }
        self
    }

    pub fn at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }
}

/// Filter for [`AuditLog::query`]. Every field is optional; results are
/// ordered oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    pub tenant_id: Option<TenantId>,
    pub decision: Option<AuditDecision>,
    pub reason: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.tenant_id.is_none_or(|t| entry.tenant_id == Some(t))
            && self.decision.is_none_or(|d| entry.decision == d)
            && self.reason.as_deref().is_none_or(|r| entry.reason == r)
            && self.from.is_none_or(|from| entry.recorded_at >= from)
            && self.to.is_none_or(|to| entry.recorded_at < to)
    }
}

/// Append-only store. There is no update or single-entry
/// delete operation.
pub trait AuditLog: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError>;

    /// Drop entries recorded before `cutoff`. Returns how many were removed.
    fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, AuditError>;
}

impl<L> AuditLog for Arc<L>
where
    L: AuditLog + ?Sized,
{
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        (**self).append(entry)
    }

    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        (**self).query(query)
    }

    fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, AuditError> {
        (**self).purge_expired(cutoff)
    }
}

/// Best-effort append for entries whose loss must not change the outcome
/// (denials, lifecycle transitions). Failures are logged.
pub(crate) fn record(log: &dyn AuditLog, entry: AuditEntry) {
    let operation = entry.operation.clone();
    let reason = entry.reason.clone();
    if let Err(err) = log.append(entry) {
        error!(operation = %operation, reason = %reason, error = %err, "failed to append audit entry");
    }
}

/// Read access to the audit log for compliance export.
///
/// Only a superadmin acting as itself (not under an impersonation grant)
/// may export; tenant principals never see the platform-wide log.
#[derive(Clone)]
pub struct AuditExporter {
    log: Arc<dyn AuditLog>,
}

impl AuditExporter {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self { log }
    }

    pub fn export(&self, principal: &Principal, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        if principal.role() != Role::Superadmin || principal.impersonation().is_some() {
            let err = AuthzError::PolicyDenied {
                rule: "audit/export".to_string(),
                reason: "audit export requires superadmin".to_string(),
            };
            record(self.log.as_ref(), AuditEntry::denial(principal, "audit/export", "audit", &err));
            return Err(err.into());
        }

        let entries = self.log.query(query)?;
        info!(
            user_id = %principal.user_id(),
            tenant_id = ?query.tenant_id,
            entries = entries.len(),
            "audit log exported"
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tenantguard_core::UserId;

    use super::*;

    #[test]
    fn query_filters_by_tenant_decision_and_window() {
        let tenant = TenantId::new();
        let now = Utc::now();
        let entry = AuditEntry::system(tenant, "tenant/activate", AuditDecision::Allow, "tenant_activated").at(now);

        assert!(AuditQuery::for_tenant(tenant).matches(&entry));
        assert!(!AuditQuery::for_tenant(TenantId::new()).matches(&entry));

        let denials = AuditQuery {
            decision: Some(AuditDecision::Deny),
            ..AuditQuery::default()
        };
        assert!(!denials.matches(&entry));

        let window = AuditQuery {
            from: Some(now - Duration::minutes(1)),
            to: Some(now),
            ..AuditQuery::default()
        };
        assert!(!window.matches(&entry), "upper bound is exclusive");
    }

    #[test]
    fn denial_records_the_inactive_tenant() {
        let principal = Principal::new(UserId::new(), TenantId::new(), Role::Hr);
        let other = TenantId::new();
        let err = AuthzError::TenantInactive { tenant_id: Some(other) };
        let entry = AuditEntry::denial(&principal, "table:departments/read", "departments", &err);

        assert_eq!(entry.tenant_id, Some(other));
        assert_eq!(entry.reason, "tenant_inactive");
        assert_eq!(entry.decision, AuditDecision::Deny);
    }

    #[test]
    fn export_requires_superadmin() {
        let log = Arc::new(InMemoryAuditLog::new());
        let exporter = AuditExporter::new(log.clone());
        let admin = Principal::new(UserId::new(), TenantId::new(), Role::Admin);

        let err = exporter.export(&admin, &AuditQuery::default()).unwrap_err();
        assert!(matches!(err, AuditError::Denied(AuthzError::PolicyDenied { .. })));

        let superadmin = Principal::without_tenant(UserId::new(), Role::Superadmin);
        let entries = exporter.export(&superadmin, &AuditQuery::default()).unwrap();
        assert_eq!(entries.len(), 1, "the refused export is itself audited");
        assert_eq!(entries[0].operation, "audit/export");
    }
}
