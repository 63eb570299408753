use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::path::{ObjectPath, ObjectPrefix};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub path: String,
    pub size: u64,
    pub content_type: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object storage error: {0}")]
    Storage(String),
}

/// Blob storage keyed by validated paths.
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` at `path`. Returns `true` when the object is new.
    fn put(&self, path: &ObjectPath, bytes: Vec<u8>, content_type: &str) -> Result<bool, ObjectStoreError>;

    fn get(&self, path: &ObjectPath) -> Result<Option<StoredObject>, ObjectStoreError>;

    fn exists(&self, path: &ObjectPath) -> Result<bool, ObjectStoreError>;

    /// Returns `true` when something was removed.
    fn delete(&self, path: &ObjectPath) -> Result<bool, ObjectStoreError>;

    fn list(&self, prefix: &ObjectPrefix) -> Result<Vec<ObjectMeta>, ObjectStoreError>;

    fn delete_prefix(&self, prefix: &ObjectPrefix) -> Result<u64, ObjectStoreError>;

    fn count_prefix(&self, prefix: &ObjectPrefix) -> Result<u64, ObjectStoreError>;
}

impl<S> ObjectStore for Arc<S>
where
    S: ObjectStore + ?Sized,
{
    fn put(&self, path: &ObjectPath, bytes: Vec<u8>, content_type: &str) -> Result<bool, ObjectStoreError> {
        (**self).put(path, bytes, content_type)
    }

    fn get(&self, path: &ObjectPath) -> Result<Option<StoredObject>, ObjectStoreError> {
        (**self).get(path)
    }

    fn exists(&self, path: &ObjectPath) -> Result<bool, ObjectStoreError> {
        (**self).exists(path)
    }

    fn delete(&self, path: &ObjectPath) -> Result<bool, ObjectStoreError> {
        (**self).delete(path)
    }

    fn list(&self, prefix: &ObjectPrefix) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        (**self).list(prefix)
    }

    fn delete_prefix(&self, prefix: &ObjectPrefix) -> Result<u64, ObjectStoreError> {
        (**self).delete_prefix(prefix)
    }

    fn count_prefix(&self, prefix: &ObjectPrefix) -> Result<u64, ObjectStoreError> {
        (**self).count_prefix(prefix)
    }
}

/// In-memory object store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every stored key. Test/inspection only.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().map(|o| o.keys().cloned().collect()).unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> ObjectStoreError {
    ObjectStoreError::Storage("object store lock poisoned".to_string())
}

fn under<'a>(
    objects: &'a BTreeMap<String, StoredObject>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a StoredObject)> + 'a {
    objects
        .range(prefix.to_string()..)
        .take_while(move |(k, _)| k.starts_with(prefix))
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, path: &ObjectPath, bytes: Vec<u8>, content_type: &str) -> Result<bool, ObjectStoreError> {
        let mut objects = self.objects.write().map_err(poisoned)?;
        let previous = objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(previous.is_none())
    }

    fn get(&self, path: &ObjectPath) -> Result<Option<StoredObject>, ObjectStoreError> {
        Ok(self.objects.read().map_err(poisoned)?.get(&path.to_string()).cloned())
    }

    fn exists(&self, path: &ObjectPath) -> Result<bool, ObjectStoreError> {
        Ok(self.objects.read().map_err(poisoned)?.contains_key(&path.to_string()))
    }

    fn delete(&self, path: &ObjectPath) -> Result<bool, ObjectStoreError> {
        Ok(self.objects.write().map_err(poisoned)?.remove(&path.to_string()).is_some())
    }

    fn list(&self, prefix: &ObjectPrefix) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        let objects = self.objects.read().map_err(poisoned)?;
        let prefix = prefix.to_string();
        Ok(under(&objects, &prefix)
            .map(|(key, obj)| ObjectMeta {
                path: key.clone(),
                size: obj.bytes.len() as u64,
                content_type: obj.content_type.clone(),
                updated_at: obj.updated_at,
            })
            .collect())
    }

    fn delete_prefix(&self, prefix: &ObjectPrefix) -> Result<u64, ObjectStoreError> {
        let mut objects = self.objects.write().map_err(poisoned)?;
        let prefix = prefix.to_string();
        let keys: Vec<String> = under(&objects, &prefix).map(|(k, _)| k.clone()).collect();
        for key in &keys {
            objects.remove(key);
        }
        Ok(keys.len() as u64)
    }

    fn count_prefix(&self, prefix: &ObjectPrefix) -> Result<u64, ObjectStoreError> {
        let objects = self.objects.read().map_err(poisoned)?;
        let prefix = prefix.to_string();
        Ok(under(&objects, &prefix).count() as u64)
    }
}
