//! `tenantguard-auth`: pure authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: it owns the
//! principal model, token claims, the typed policy set and the evaluator.
//! Tenant status is the only external input, read through [`TenantDirectory`].

pub mod authorize;
pub mod claims;
pub mod impersonation;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{
    AccessMode, AuthorizationExplanation, AuthzError, Decision, DirectoryError, EvalContext, Grant,
    Operation, PolicyEvaluator, TenantDirectory,
};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use impersonation::{ImpersonationAccess, ImpersonationError, ImpersonationGrant};
pub use policy::{PolicyError, PolicyRule, PolicySet, ResourceKind, ResourceRef, RoleGrant, RowScope, Verb};
pub use principal::{Principal, PrincipalSnapshot};
pub use roles::Role;
