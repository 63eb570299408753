use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tenantguard_core::TenantId;

/// Per-tenant reader/writer fence.
///
/// Every data operation holds the read side for its tenant from the
/// authorization check until the write lands. Suspension before deletion
/// takes the write side, so once it returns no operation authorized against
/// the old status is still in flight.
///
/// Entries live only while someone holds them. A lock nobody holds guards
/// nothing, so a fresh one is equivalent.
#[derive(Debug, Default)]
pub struct TenantFence {
    locks: Mutex<HashMap<TenantId, Weak<RwLock<()>>>>,
}

impl TenantFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `tenant_id`. Hold the returned `Arc` for as long as a
    /// guard taken from it is alive.
    pub fn lock_for(&self, tenant_id: TenantId) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(&tenant_id).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(RwLock::new(()));
        locks.insert(tenant_id, Arc::downgrade(&lock));
        lock
    }

    /// Tenants with a lock currently held somewhere.
    pub fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared access for a data operation.
pub fn enter(lock: &RwLock<()>) -> RwLockReadGuard<'_, ()> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

/// Exclusive access for a status change.
pub fn exclusive(lock: &RwLock<()>) -> RwLockWriteGuard<'_, ()> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
