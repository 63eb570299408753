use std::sync::Arc;

use tracing::warn;

use tenantguard_auth::{AuthzError, Grant, Operation, Principal, ResourceRef, Verb};

use crate::enforce::Enforcer;
use crate::schema::Catalog;

use super::StorageError;
use super::path::{ObjectPath, ObjectPrefix, PathScope};

/// Storage path authorizer.
///
/// Applies the bucket's policy rule and then checks that the path sits in
/// the namespace of the grant's tenant. Public buckets are reachable by any
/// active principal, read-only.
pub struct StorageAuthorizer {
    enforcer: Enforcer,
    catalog: Arc<Catalog>,
    public_base_url: String,
}

impl StorageAuthorizer {
    pub fn new(enforcer: Enforcer, catalog: Arc<Catalog>, public_base_url: impl Into<String>) -> Self {
        Self {
            enforcer,
            catalog,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Authorize `verb` on the object at `path`.
    pub fn authorize_storage_op(&self, principal: &Principal, path: &ObjectPath, verb: Verb) -> Result<Grant, StorageError> {
        self.authorize_scope(principal, path.bucket(), path.scope(), verb, &path.to_string())
    }

    /// Authorize a listing of `prefix`.
    pub fn authorize_list(&self, principal: &Principal, prefix: &ObjectPrefix) -> Result<Grant, StorageError> {
        self.authorize_scope(principal, prefix.bucket(), prefix.scope(), Verb::Read, &prefix.to_string())
    }

    /// Authorize a raw, client-supplied path; malformed paths are denials.
    pub fn authorize_raw(&self, principal: &Principal, raw: &str, verb: Verb) -> Result<(ObjectPath, Grant), StorageError> {
        let path = ObjectPath::parse(raw).map_err(|err| self.malformed(principal, raw, verb, &err.to_string()))?;
        let grant = self.authorize_storage_op(principal, &path, verb)?;
        Ok((path, grant))
    }

    /// Authorize a raw listing prefix; malformed prefixes are denials.
    pub fn authorize_raw_prefix(&self, principal: &Principal, raw: &str) -> Result<(ObjectPrefix, Grant), StorageError> {
        let prefix = ObjectPrefix::parse(raw).map_err(|err| self.malformed(principal, raw, Verb::Read, &err.to_string()))?;
        let grant = self.authorize_list(principal, &prefix)?;
        Ok((prefix, grant))
    }

    /// Build a write path inside the caller's tenant namespace.
    ///
    /// The tenant segment always comes from the principal. This is the only
    /// way uploads get a path.
    pub fn build_scoped_path(&self, principal: &Principal, bucket: &str, relative: &str) -> Result<ObjectPath, StorageError> {
        let Some(tenant_id) = principal.effective_tenant() else {
            let op = Operation::new(ResourceRef::bucket(bucket.to_string()), Verb::Create);
            let err = self
                .enforcer
                .deny(principal, &op, bucket, AuthzError::TenantInactive { tenant_id: None });
            return Err(err.into());
        };
        Ok(ObjectPath::in_tenant(bucket, tenant_id, relative)?)
    }

    /// URL for an object the caller may read. Tenant objects keep their
    /// `tenant/{id}` segment, so the URL names its owner.
    pub fn public_url(&self, principal: &Principal, raw: &str) -> Result<String, StorageError> {
        let (path, _) = self.authorize_raw(principal, raw, Verb::Read)?;
        Ok(format!("{}/{}", self.public_base_url.trim_end_matches('/'), path))
    }

    fn authorize_scope(
        &self,
        principal: &Principal,
        bucket: &str,
        scope: PathScope,
        verb: Verb,
        target: &str,
    ) -> Result<Grant, StorageError> {
        let op = Operation::new(ResourceRef::bucket(bucket.to_string()), verb);
        let grant = self.enforcer.check(principal, &op, target)?;

        let Some(spec) = self.catalog.bucket(bucket) else {
            return Err(self.outside(principal, &op, target));
        };
        let inside = match scope {
            PathScope::Tenant(t) => !spec.public && t == grant.tenant_id,
            PathScope::Public => spec.public && !verb.is_mutation(),
        };
        if !inside {
            warn!(
                user_id = %principal.user_id(),
                tenant_id = %grant.tenant_id,
                path = %target,
                verb = %verb,
                "storage path outside the caller's namespace"
            );
            return Err(self.outside(principal, &op, target));
        }
        Ok(grant)
    }

    fn outside(&self, principal: &Principal, op: &Operation, target: &str) -> StorageError {
        let err = AuthzError::PathAuthorization {
            path: target.to_string(),
        };
        self.enforcer.deny(principal, op, target, err).into()
    }

    fn malformed(&self, principal: &Principal, raw: &str, verb: Verb, detail: &str) -> StorageError {
        let bucket = raw.split('/').next().unwrap_or_default();
        let op = Operation::new(ResourceRef::bucket(bucket.to_string()), verb);
        warn!(user_id = %principal.user_id(), path = %raw, detail = %detail, "malformed storage path");
        self.outside(principal, &op, raw)
    }
}
