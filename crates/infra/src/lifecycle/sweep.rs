use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use tenantguard_core::{TenantId, TenantStatus};

use crate::audit::{self, AuditDecision, AuditEntry, AuditLog};

use super::{LifecycleError, TenantLifecycle};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    /// Deleted tenants found holding data again.
    pub drifted: Vec<TenantId>,
    /// Drifted tenants that were clean after a fresh purge.
    pub repurged: usize,
    pub audit_entries_expired: usize,
}

/// Handle to stop and join the sweeper thread.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl SweeperHandle {
    /// Request shutdown and wait for the sweeper to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Periodic compliance sweep.
///
/// - Re-verifies every deleted tenant and purges again on drift
/// - Expires audit entries past the retention window
pub struct LifecycleSweeper {
    lifecycle: Arc<TenantLifecycle>,
    audit: Arc<dyn AuditLog>,
    retention: chrono::Duration,
}

impl LifecycleSweeper {
    pub fn new(lifecycle: Arc<TenantLifecycle>, audit: Arc<dyn AuditLog>, retention: chrono::Duration) -> Self {
        Self {
            lifecycle,
            audit,
            retention,
        }
    }

    pub fn sweep_once(&self) -> Result<SweepSummary, LifecycleError> {
        let mut summary = SweepSummary::default();

        for tenant in self.lifecycle.registry().list(Some(TenantStatus::Deleted))? {
            summary.checked += 1;
            let report = self.lifecycle.auditor().verify_purge(tenant.id)?;
            if report.is_clean() {
                continue;
            }

            error!(
                tenant_id = %tenant.id,
                remaining_rows = report.total_rows(),
                remaining_objects = report.total_objects(),
                "data found for deleted tenant"
            );
            audit::record(
                self.audit.as_ref(),
                AuditEntry::system(tenant.id, "tenant/sweep", AuditDecision::Deny, "purge_drift"),
            );
            summary.drifted.push(tenant.id);

            self.lifecycle.purge(tenant.id)?;
            if self.lifecycle.auditor().verify_purge(tenant.id)?.is_clean() {
                summary.repurged += 1;
            }
        }

        let cutoff = Utc::now() - self.retention;
        summary.audit_entries_expired = self.audit.purge_expired(cutoff)?;

        Ok(summary)
    }

    /// Run [`Self::sweep_once`] every `interval` on a background thread.
    pub fn spawn(self, interval: Duration) -> std::io::Result<SweeperHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let join = thread::Builder::new()
            .name("tenant-sweeper".to_string())
            .spawn(move || self.run(interval, shutdown_rx))?;

        Ok(SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    fn run(&self, interval: Duration, shutdown_rx: mpsc::Receiver<()>) {
        loop {
            match shutdown_rx.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            match self.sweep_once() {
                Ok(summary) if summary.drifted.is_empty() => info!(
                    checked = summary.checked,
                    audit_entries_expired = summary.audit_entries_expired,
                    "lifecycle sweep finished"
                ),
                Ok(summary) => warn!(
                    checked = summary.checked,
                    drifted = summary.drifted.len(),
                    repurged = summary.repurged,
                    "lifecycle sweep found purge drift"
                ),
                Err(err) => warn!(error = %err, "lifecycle sweep failed"),
            }
        }
    }
}
