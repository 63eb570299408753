//! `tenantguard-core`: shared building blocks of the isolation layer.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! identifiers, the tenant model and the domain error type.

pub mod error;
pub mod id;
pub mod tenant;

pub use error::{DomainError, DomainResult};
pub use id::{AuditEntryId, RowId, TenantId, UserId};
pub use tenant::{Tenant, TenantScoped, TenantStatus, normalize_tenant_name};
