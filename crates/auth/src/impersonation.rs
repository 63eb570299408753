//! Superadmin impersonation grants.
//!
//! A superadmin never gets tenant data through a policy rule. Instead it is
//! issued a grant naming exactly one target tenant, an access level and a
//! hard expiry. Every operation performed under a grant is audited.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use tenantguard_core::{TenantId, UserId};

use crate::{Principal, Role};

/// What an impersonating superadmin may do inside the target tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpersonationAccess {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImpersonationError {
    #[error("only superadmin principals may impersonate")]
    NotSuperadmin,

    #[error("an impersonation reason is required")]
    MissingReason,

    #[error("impersonation duration must be positive")]
    InvalidDuration,

    #[error("impersonation duration exceeds the maximum of {max_minutes} minutes")]
    ExceedsMaximum { max_minutes: i64 },
}

/// A time-boxed permission for one superadmin to act inside one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationGrant {
    id: Uuid,
    issued_to: UserId,
    target_tenant: TenantId,
    access: ImpersonationAccess,
    reason: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl ImpersonationGrant {
    /// Issue a grant for `issuer` (which must be a superadmin).
    pub fn issue(
        issuer: &Principal,
        target_tenant: TenantId,
        access: ImpersonationAccess,
        reason: impl Into<String>,
        duration: Duration,
        max_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, ImpersonationError> {
        if issuer.role() != Role::Superadmin {
            return Err(ImpersonationError::NotSuperadmin);
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(ImpersonationError::MissingReason);
        }
        if duration <= Duration::zero() {
            return Err(ImpersonationError::InvalidDuration);
        }
        if duration > max_duration {
            return Err(ImpersonationError::ExceedsMaximum {
                max_minutes: max_duration.num_minutes(),
            });
        }

        Ok(Self {
            id: Uuid::now_v7(),
            issued_to: issuer.user_id(),
            target_tenant,
            access,
            reason: reason.trim().to_string(),
            issued_at: now,
            expires_at: now + duration,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn issued_to(&self) -> UserId {
        self.issued_to
    }

    pub fn target_tenant(&self) -> TenantId {
        self.target_tenant
    }

    pub fn access(&self) -> ImpersonationAccess {
        self.access
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.issued_at <= now && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn superadmin() -> Principal {
        Principal::without_tenant(UserId::new(), Role::Superadmin)
    }

    #[test]
    fn grant_is_time_boxed() {
        let now = Utc::now();
        let grant = ImpersonationGrant::issue(
            &superadmin(),
            TenantId::new(),
            ImpersonationAccess::ReadOnly,
            "ticket 42",
            Duration::minutes(15),
            Duration::minutes(60),
            now,
        )
        .unwrap();

        assert!(grant.is_active_at(now));
        assert!(grant.is_active_at(now + Duration::minutes(14)));
        assert!(!grant.is_active_at(now + Duration::minutes(15)));
        assert!(!grant.is_active_at(now - Duration::seconds(1)));
    }

    #[test]
    fn non_superadmin_cannot_be_issued_a_grant() {
        let admin = Principal::new(UserId::new(), TenantId::new(), Role::Admin);
        let err = ImpersonationGrant::issue(
            &admin,
            TenantId::new(),
            ImpersonationAccess::ReadOnly,
            "support",
            Duration::minutes(5),
            Duration::minutes(60),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, ImpersonationError::NotSuperadmin);
    }

    #[test]
    fn duration_is_capped() {
        let err = ImpersonationGrant::issue(
            &superadmin(),
            TenantId::new(),
            ImpersonationAccess::ReadWrite,
            "migration",
            Duration::hours(3),
            Duration::minutes(60),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, ImpersonationError::ExceedsMaximum { max_minutes: 60 });
    }

    #[test]
    fn reason_is_required() {
        let err = ImpersonationGrant::issue(
            &superadmin(),
            TenantId::new(),
            ImpersonationAccess::ReadOnly,
            "   ",
            Duration::minutes(5),
            Duration::minutes(60),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, ImpersonationError::MissingReason);
    }
}
