//! Tenant model shared by every layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::TenantId;

/// Maximum length of a tenant display name (in characters).
pub const MAX_TENANT_NAME_LEN: usize = 200;

/// Lifecycle status of a tenant.
///
/// Only `Active` tenants may have data read or written on their behalf.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Provisioning,
    Active,
    Suspended,
    Deleted,
}

impl TenantStatus {
    pub fn is_active(self) -> bool {
        matches!(self, TenantStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TenantStatus::Provisioning => "provisioning",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Deleted => "deleted",
        }
    }
}

impl core::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TenantStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "provisioning" => Ok(TenantStatus::Provisioning),
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "deleted" => Ok(TenantStatus::Deleted),
            other => Err(DomainError::validation(format!("unknown tenant status '{other}'"))),
        }
    }
}

/// A registered tenant.
///
/// # Invariants
/// - `id` is immutable and never reused, even after deletion.
/// - `Deleted` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// A fresh tenant record in `Provisioning`.
    pub fn provisioning(id: TenantId, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            status: TenantStatus::Provisioning,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Normalize and validate a tenant display name.
pub fn normalize_tenant_name(name: &str) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("tenant name cannot be empty"));
    }
    if trimmed.chars().count() > MAX_TENANT_NAME_LEN {
        return Err(DomainError::validation(format!(
            "tenant name exceeds {MAX_TENANT_NAME_LEN} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(DomainError::validation("tenant name contains control characters"));
    }
    Ok(trimmed.to_string())
}

/// Marks types that belong to exactly one tenant.
///
/// Infrastructure components use this to verify that a value handed to them
/// is scoped to the tenant they are operating on.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl TenantScoped for Tenant {
    fn tenant_id(&self) -> TenantId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_is_active() {
        assert!(TenantStatus::Active.is_active());
        assert!(!TenantStatus::Provisioning.is_active());
        assert!(!TenantStatus::Suspended.is_active());
        assert!(!TenantStatus::Deleted.is_active());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Deleted".parse::<TenantStatus>().unwrap(), TenantStatus::Deleted);
        assert!("archived".parse::<TenantStatus>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TenantStatus::Provisioning).unwrap();
        assert_eq!(json, "\"provisioning\"");
    }

    #[test]
    fn names_are_trimmed_and_validated() {
        assert_eq!(normalize_tenant_name("  Acme  ").unwrap(), "Acme");
        assert!(normalize_tenant_name("   ").is_err());
        assert!(normalize_tenant_name("bad\u{0007}name").is_err());
        assert!(normalize_tenant_name(&"x".repeat(MAX_TENANT_NAME_LEN + 1)).is_err());
    }

    proptest::proptest! {
        #[test]
        fn normalization_is_idempotent(name in "\\PC{0,64}") {
            if let Ok(once) = normalize_tenant_name(&name) {
                proptest::prop_assert_eq!(normalize_tenant_name(&once).unwrap(), once);
            }
        }
    }
}
