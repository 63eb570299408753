//! Object storage: path model, blob store and the tenant-namespaced
//! gateway in front of it.

mod authorizer;
mod object_store;
mod path;

pub use authorizer::StorageAuthorizer;
pub use object_store::{InMemoryObjectStore, ObjectMeta, ObjectStore, ObjectStoreError, StoredObject};
pub use path::{ObjectPath, ObjectPrefix, PathError, PathScope, TENANT_SEGMENT};

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use tenantguard_auth::{AuthzError, Principal, Verb};

use crate::fence::{self, TenantFence};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error(transparent)]
    Denied(#[from] AuthzError),

    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("object not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] ObjectStoreError),
}

/// Every object operation goes through here: authorize, then touch the
/// store with the validated path.
pub struct StorageGateway {
    authorizer: Arc<StorageAuthorizer>,
    store: Arc<dyn ObjectStore>,
    fence: Arc<TenantFence>,
}

impl StorageGateway {
    pub fn new(authorizer: Arc<StorageAuthorizer>, store: Arc<dyn ObjectStore>, fence: Arc<TenantFence>) -> Self {
        Self {
            authorizer,
            store,
            fence,
        }
    }

    pub fn authorizer(&self) -> &Arc<StorageAuthorizer> {
        &self.authorizer
    }

    /// Upload into the caller's namespace of `bucket`. Overwriting an
    /// existing object needs `update`, a new object `create`.
    pub fn upload(
        &self,
        principal: &Principal,
        bucket: &str,
        relative: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ObjectPath, StorageError> {
        let path = self.authorizer.build_scoped_path(principal, bucket, relative)?;
        let lock = path.tenant_id().map(|t| self.fence.lock_for(t));
        let _guard = lock.as_deref().map(fence::enter);

        let verb = if self.store.exists(&path)? { Verb::Update } else { Verb::Create };
        let grant = self.authorizer.authorize_storage_op(principal, &path, verb)?;

        let size = bytes.len();
        self.store.put(&path, bytes, content_type)?;
        info!(tenant_id = %grant.tenant_id, path = %path, size, "object stored");
        Ok(path)
    }

    pub fn download(&self, principal: &Principal, raw_path: &str) -> Result<StoredObject, StorageError> {
        let (path, _grant) = self.authorizer.authorize_raw(principal, raw_path, Verb::Read)?;
        self.store.get(&path)?.ok_or(StorageError::NotFound)
    }

    pub fn list(&self, principal: &Principal, raw_prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let (prefix, _grant) = self.authorizer.authorize_raw_prefix(principal, raw_prefix)?;
        Ok(self.store.list(&prefix)?)
    }

    pub fn delete(&self, principal: &Principal, raw_path: &str) -> Result<(), StorageError> {
        let lock = principal.effective_tenant().map(|t| self.fence.lock_for(t));
        let _guard = lock.as_deref().map(fence::enter);

        let (path, grant) = self.authorizer.authorize_raw(principal, raw_path, Verb::Delete)?;
        if !self.store.delete(&path)? {
            return Err(StorageError::NotFound);
        }
        debug!(tenant_id = %grant.tenant_id, path = %path, "object deleted");
        Ok(())
    }

    pub fn public_url(&self, principal: &Principal, raw_path: &str) -> Result<String, StorageError> {
        self.authorizer.public_url(principal, raw_path)
    }
}
