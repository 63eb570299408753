use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{AuditEntry, AuditError, AuditLog, AuditQuery};

/// In-memory audit log for tests/dev.
///
/// Entries are kept in append order; `recorded_at` is monotone only as far
/// as the wall clock is.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> AuditError {
    AuditError::Unavailable("audit log lock poisoned".to_string())
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.write().map_err(poisoned)?.push(entry);
        Ok(())
    }

    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().map_err(poisoned)?;
        let matching = entries.iter().filter(|e| query.matches(e)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, AuditError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|e| e.recorded_at >= cutoff);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tenantguard_core::TenantId;

    use super::*;
    use crate::audit::AuditDecision;

    #[test]
    fn retention_purge_only_drops_expired_entries() {
        let log = InMemoryAuditLog::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        log.append(AuditEntry::system(tenant, "tenant/create", AuditDecision::Allow, "tenant_created").at(now - Duration::days(400)))
            .unwrap();
        log.append(AuditEntry::system(tenant, "tenant/activate", AuditDecision::Allow, "tenant_activated").at(now))
            .unwrap();

        let removed = log.purge_expired(now - Duration::days(365)).unwrap();
        assert_eq!(removed, 1);

        let left = log.query(&AuditQuery::for_tenant(tenant)).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].reason, "tenant_activated");
    }

    #[test]
    fn limit_keeps_oldest_first() {
        let log = InMemoryAuditLog::new();
        let tenant = TenantId::new();
        for reason in ["a", "b", "c"] {
            log.append(AuditEntry::system(tenant, "op", AuditDecision::Deny, reason)).unwrap();
        }
        let q = AuditQuery {
            limit: Some(2),
            ..AuditQuery::for_tenant(tenant)
        };
        let got: Vec<_> = log.query(&q).unwrap().into_iter().map(|e| e.reason).collect();
        assert_eq!(got, vec!["a", "b"]);
    }
}
