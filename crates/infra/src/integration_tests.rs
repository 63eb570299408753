//! End-to-end isolation tests over the fully wired in-memory layer.
//!
//! Verifies:
//! - No principal ever reads or writes another tenant's rows or objects
//! - Deleted tenants are unreachable and leave nothing behind
//! - Every denial is audited and audit failures deny audited operations

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;
    use serde_json::{Map, Value, json};

    use tenantguard_auth::{AuthzError, ImpersonationAccess, Principal, Role};
    use tenantguard_core::{RowId, TenantId, TenantStatus, UserId};

    use crate::audit::{AuditDecision, AuditEntry, AuditError, AuditLog, AuditQuery, InMemoryAuditLog};
    use crate::config::IsolationConfig;
    use crate::layer::IsolationLayer;
    use crate::lifecycle::{BootstrapAdmin, LifecycleError, ProvisionedTenant};
    use crate::registry::{InMemoryTenantRepository, RegistryError};
    use crate::rows::{
        Aggregate, AggregateValue, Condition, Delete, ForeignFilterMode, GatewayError, InMemoryRowStore, Insert,
        JoinQuery, Row, RowStore, ScopedFilter, Select, StoreError, Update,
    };
    use crate::storage::{InMemoryObjectStore, StorageError};

    fn layer() -> IsolationLayer {
        IsolationLayer::in_memory(IsolationConfig::default()).unwrap()
    }

    fn provision(layer: &IsolationLayer, name: &str) -> ProvisionedTenant {
        layer
            .lifecycle
            .provision(
                name,
                BootstrapAdmin {
                    user_id: UserId::new(),
                    email: format!("admin@{}.test", name.to_lowercase()),
                    display_name: format!("{name} Admin"),
                },
                None,
            )
            .unwrap()
    }

    fn values(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!("object literal expected"),
        }
    }

    fn add_department(layer: &IsolationLayer, admin: &Principal, name: &str) -> Row {
        layer
            .rows
            .insert_scoped(admin, "departments", values(json!({ "name": name })))
            .unwrap()
    }

    fn denials(layer: &IsolationLayer, tenant_id: TenantId, reason: &str) -> Vec<AuditEntry> {
        layer
            .audit
            .query(&AuditQuery {
                tenant_id: Some(tenant_id),
                decision: Some(AuditDecision::Deny),
                reason: Some(reason.to_string()),
                ..AuditQuery::default()
            })
            .unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rows
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn tenants_only_see_their_own_rows() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");

        add_department(&layer, &a.admin, "Sales");
        add_department(&layer, &b.admin, "Support");

        let rows = layer.rows.select(&b.admin, &Select::from("departments")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tenant_id, b.tenant.id);
        assert_eq!(rows[0].values["name"], json!("Support"));
    }

    #[test]
    fn foreign_tenant_filter_returns_nothing_and_is_audited() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");
        add_department(&layer, &a.admin, "Sales");

        let query = Select::from("departments").filter(Condition::eq("company_id", a.tenant.id.to_string()));
        let rows = layer.rows.select(&b.admin, &query).unwrap();

        assert!(rows.is_empty());
        assert_eq!(denials(&layer, b.tenant.id, "foreign_tenant_filter").len(), 1);
    }

    #[test]
    fn foreign_tenant_filter_can_be_rejected_outright() {
        let config = IsolationConfig {
            foreign_filter_mode: ForeignFilterMode::Reject,
            ..IsolationConfig::default()
        };
        let layer = IsolationLayer::in_memory(config).unwrap();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");

        let query = Select::from("departments").filter(Condition::eq("company_id", a.tenant.id.to_string()));
        let err = layer.rows.select(&b.admin, &query).unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::CrossTenantJoin { .. })));
        assert_eq!(denials(&layer, b.tenant.id, "cross_tenant_join").len(), 1);
    }

    #[test]
    fn update_aimed_at_foreign_row_is_a_no_op() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");

        let update = Update {
            table: "companies".to_string(),
            conditions: vec![Condition::eq("id", a.tenant.id.to_string())],
            changes: values(json!({ "name": "pwned" })),
        };
        assert_eq!(layer.rows.update(&b.admin, &update).unwrap(), 0);

        let own = layer.rows.select(&a.admin, &Select::from("companies")).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].values["name"], json!("Alpha"));
    }

    #[test]
    fn delete_by_row_id_cannot_reach_another_tenant() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");
        let row = add_department(&layer, &a.admin, "Sales");

        let delete = Delete {
            table: "departments".to_string(),
            conditions: vec![Condition::eq("id", row.id.to_string())],
        };
        assert_eq!(layer.rows.delete(&b.admin, &delete).unwrap(), 0);
        assert_eq!(layer.rows.delete(&a.admin, &delete).unwrap(), 1);
    }

    #[test]
    fn insert_must_name_the_callers_tenant() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");

        let missing = Insert {
            table: "departments".to_string(),
            tenant_id: None,
            values: values(json!({ "name": "Ghost" })),
        };
        assert_eq!(layer.rows.insert(&a.admin, missing), Err(GatewayError::MissingTenantId));

        let foreign = Insert {
            table: "departments".to_string(),
            tenant_id: Some(b.tenant.id),
            values: values(json!({ "name": "Trojan" })),
        };
        let err = layer.rows.insert(&a.admin, foreign).unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::PolicyDenied { .. })));

        let smuggled = Insert {
            table: "departments".to_string(),
            tenant_id: Some(a.tenant.id),
            values: values(json!({ "name": "Trojan", "company_id": b.tenant.id.to_string() })),
        };
        let err = layer.rows.insert(&a.admin, smuggled).unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::PolicyDenied { .. })));

        assert!(layer.rows.select(&b.admin, &Select::from("departments")).unwrap().is_empty());
    }

    #[test]
    fn rows_cannot_be_reparented() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");
        add_department(&layer, &a.admin, "Sales");

        let update = Update {
            table: "departments".to_string(),
            conditions: vec![],
            changes: values(json!({ "company_id": b.tenant.id.to_string() })),
        };
        assert_eq!(layer.rows.update(&a.admin, &update), Err(GatewayError::TenantReassignment));
    }

    #[test]
    fn foreign_row_ids_are_indistinguishable_from_unknown_ones() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");
        let row = add_department(&layer, &a.admin, "Sales");

        let attempt = |id: RowId| Insert {
            table: "departments".to_string(),
            tenant_id: Some(b.tenant.id),
            values: values(json!({ "id": id.to_string(), "name": "Mine now" })),
        };
        let existing = layer.rows.insert(&b.admin, attempt(row.id));
        let unknown = layer.rows.insert(&b.admin, attempt(RowId::new()));
        assert!(matches!(existing, Err(GatewayError::InvalidPayload(_))));
        assert_eq!(existing, unknown);

        let minted = add_department(&layer, &b.admin, "Sales");
        assert_ne!(minted.id, row.id);

        let still = layer.rows.select(&a.admin, &Select::from("departments")).unwrap();
        assert_eq!(still.len(), 1);
        assert_eq!(still[0].values["name"], json!("Sales"));
    }

    #[test]
    fn employees_only_see_their_own_record() {
        let layer = layer();
        let a = provision(&layer, "Alpha");

        let employee = Principal::new(UserId::new(), a.tenant.id, Role::Employee);
        layer
            .rows
            .insert_scoped(
                &a.admin,
                "employees",
                values(json!({ "user_id": employee.user_id().to_string(), "email": "e@alpha.test" })),
            )
            .unwrap();

        let visible = layer.rows.select(&employee, &Select::from("employees")).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].values["email"], json!("e@alpha.test"));

        let all = layer.rows.select(&a.admin, &Select::from("employees")).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn employee_cannot_file_absence_for_someone_else() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let employee = Principal::new(UserId::new(), a.tenant.id, Role::Employee);

        let own = layer
            .rows
            .insert_scoped(&employee, "absence_requests", values(json!({ "days": 2 })))
            .unwrap();
        assert_eq!(own.values["employee_user_id"], json!(employee.user_id().to_string()));

        let err = layer
            .rows
            .insert_scoped(
                &employee,
                "absence_requests",
                values(json!({ "days": 2, "employee_user_id": UserId::new().to_string() })),
            )
            .unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::PolicyDenied { .. })));
    }

    #[test]
    fn unregistered_table_has_no_rule() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let err = layer.rows.select(&a.admin, &Select::from("payroll")).unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::NoRuleDefined { .. })));
    }

    #[test]
    fn joins_stay_inside_one_tenant() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");
        let sales = add_department(&layer, &a.admin, "Sales");
        layer
            .rows
            .insert_scoped(
                &a.admin,
                "contracts",
                values(json!({ "department_id": sales.id.to_string(), "title": "Framework" })),
            )
            .unwrap();

        let query = JoinQuery::new(Select::from("departments")).join("contracts", "id", "department_id");
        let joined = layer.rows.join(&a.admin, &query).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].get("contracts").unwrap().values["title"], json!("Framework"));

        let mut sneaky = query.clone();
        sneaky.joins[0]
            .conditions
            .push(Condition::eq("company_id", b.tenant.id.to_string()));
        let err = layer.rows.join(&a.admin, &sneaky).unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::CrossTenantJoin { .. })));
    }

    #[test]
    fn aggregates_count_and_sum_within_the_tenant() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");
        for hours in [4.0, 3.5] {
            layer
                .rows
                .insert_scoped(&a.admin, "time_entries", values(json!({ "hours": hours })))
                .unwrap();
        }
        layer
            .rows
            .insert_scoped(&b.admin, "time_entries", values(json!({ "hours": 100 })))
            .unwrap();

        let query = Select::from("time_entries");
        assert_eq!(
            layer.rows.aggregate(&a.admin, &query, &Aggregate::Count).unwrap(),
            AggregateValue::Count(2)
        );
        assert_eq!(
            layer
                .rows
                .aggregate(&a.admin, &query, &Aggregate::Sum { column: "hours".to_string() })
                .unwrap(),
            AggregateValue::Sum(7.5)
        );

        let spanning = Select::from("time_entries").filter(Condition::one_of(
            "company_id",
            [a.tenant.id.to_string(), b.tenant.id.to_string()],
        ));
        let err = layer.rows.aggregate(&a.admin, &spanning, &Aggregate::Count).unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::CrossTenantJoin { .. })));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Storage
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn uploads_land_in_the_callers_namespace_only() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");

        let path = layer
            .storage
            .upload(&a.admin, "documents", "file.txt", b"hello".to_vec(), "text/plain")
            .unwrap();
        assert_eq!(path.to_string(), format!("documents/tenant/{}/file.txt", a.tenant.id));

        let own = layer.storage.download(&a.admin, &path.to_string()).unwrap();
        assert_eq!(own.bytes, b"hello");

        let err = layer.storage.download(&b.admin, &path.to_string()).unwrap_err();
        assert!(matches!(err, StorageError::Denied(AuthzError::PathAuthorization { .. })));

        let err = layer
            .storage
            .list(&b.admin, &format!("documents/tenant/{}/", a.tenant.id))
            .unwrap_err();
        assert!(matches!(err, StorageError::Denied(AuthzError::PathAuthorization { .. })));

        let err = layer.storage.delete(&b.admin, &path.to_string()).unwrap_err();
        assert!(matches!(err, StorageError::Denied(AuthzError::PathAuthorization { .. })));
        assert_eq!(denials(&layer, b.tenant.id, "path_authorization").len(), 3);
    }

    #[test]
    fn denied_requests_leave_no_fence_entries() {
        let layer = layer();
        let a = provision(&layer, "Alpha");

        for _ in 0..200 {
            let raw = format!("documents/tenant/{}/x.txt", TenantId::new());
            let err = layer.storage.delete(&a.admin, &raw).unwrap_err();
            assert!(matches!(err, StorageError::Denied(AuthzError::PathAuthorization { .. })));

            let foreign = Insert {
                table: "departments".to_string(),
                tenant_id: Some(TenantId::new()),
                values: values(json!({ "name": "Trojan" })),
            };
            assert!(layer.rows.insert(&a.admin, foreign).is_err());
        }
        assert!(layer.fence.is_empty());

        layer.lifecycle.delete(a.tenant.id, None).unwrap();
        assert!(layer.fence.is_empty());
    }

    #[test]
    fn traversal_in_a_relative_path_is_refused() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");

        let relative = format!("../../tenant/{}/evil.txt", b.tenant.id);
        let err = layer
            .storage
            .upload(&a.admin, "documents", &relative, vec![0], "text/plain")
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[test]
    fn public_bucket_is_read_only() {
        let layer = layer();
        let a = provision(&layer, "Alpha");

        let err = layer
            .storage
            .upload(&a.admin, "public-assets", "logo.png", vec![1], "image/png")
            .unwrap_err();
        assert!(matches!(err, StorageError::Denied(AuthzError::PolicyDenied { .. })));

        let url = layer.storage.public_url(&a.admin, "public-assets/logo.png").unwrap();
        assert_eq!(url, "https://files.localhost/public-assets/logo.png");
    }

    #[test]
    fn public_urls_embed_the_owning_tenant() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");
        let path = layer
            .storage
            .upload(&a.admin, "avatars", "me.png", vec![1], "image/png")
            .unwrap();

        let url = layer.storage.public_url(&a.admin, &path.to_string()).unwrap();
        assert_eq!(url, format!("https://files.localhost/avatars/tenant/{}/me.png", a.tenant.id));

        let err = layer.storage.public_url(&b.admin, &path.to_string()).unwrap_err();
        assert!(matches!(err, StorageError::Denied(AuthzError::PathAuthorization { .. })));
    }

    #[test]
    fn malformed_paths_are_denied_not_parsed_leniently() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let err = layer
            .storage
            .download(&a.admin, "documents/tenant/not-a-tenant/file.txt")
            .unwrap_err();
        assert!(matches!(err, StorageError::Denied(AuthzError::PathAuthorization { .. })));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn deleted_tenant_is_unreachable_and_empty() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let b = provision(&layer, "Beta");
        add_department(&layer, &a.admin, "Sales");
        add_department(&layer, &b.admin, "Support");
        layer
            .storage
            .upload(&a.admin, "documents", "file.txt", b"x".to_vec(), "text/plain")
            .unwrap();

        let deleted = layer.lifecycle.delete(a.tenant.id, None).unwrap();
        assert_eq!(deleted.tenant.status, TenantStatus::Deleted);
        assert!(deleted.report.is_clean());
        assert_eq!(deleted.attempts, 1);

        let err = layer
            .rows
            .insert_scoped(&a.admin, "departments", values(json!({ "name": "Zombie" })))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::TenantInactive { .. })));

        let report = layer.lifecycle.auditor().verify_purge(a.tenant.id).unwrap();
        assert_eq!(report.total_rows(), 0);
        assert_eq!(report.total_objects(), 0);

        // The other tenant is untouched.
        assert_eq!(layer.rows.select(&b.admin, &Select::from("departments")).unwrap().len(), 1);
    }

    #[test]
    fn deleting_twice_is_a_no_op() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        layer.lifecycle.delete(a.tenant.id, None).unwrap();
        let again = layer.lifecycle.delete(a.tenant.id, None).unwrap();
        assert_eq!(again.attempts, 0);
        assert_eq!(again.tenant.status, TenantStatus::Deleted);
    }

    #[test]
    fn provisioned_tenant_holds_only_bootstrap_rows() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        assert!(a.report.is_clean());
        assert_eq!(a.report.rows["companies"], 1);
        assert_eq!(a.report.rows["employees"], 1);
        assert_eq!(a.tenant.status, TenantStatus::Active);
    }

    #[test]
    fn activation_refuses_a_tenant_with_stray_data() {
        let rows = InMemoryRowStore::arc();
        let layer = IsolationLayer::with_stores(
            IsolationConfig::default(),
            InMemoryTenantRepository::arc(),
            Arc::new(InMemoryAuditLog::new()),
            rows.clone(),
            InMemoryObjectStore::arc(),
        )
        .unwrap();

        let tenant = layer.registry.create("Leaky", None).unwrap();
        rows.insert(
            "departments",
            Row {
                id: RowId::new(),
                tenant_id: tenant.id,
                values: Map::new(),
            },
        )
        .unwrap();

        let err = layer.lifecycle.activate(tenant.id, None).unwrap_err();
        assert!(matches!(err, LifecycleError::ProvisioningDefect { .. }));
        assert_eq!(layer.registry.status(tenant.id).unwrap(), Some(TenantStatus::Provisioning));
    }

    /// Ignores deletes while `stuck` is set and refuses employee rows while
    /// `reject_employees` is set.
    #[derive(Default)]
    struct FlakyRowStore {
        inner: InMemoryRowStore,
        stuck: AtomicBool,
        reject_employees: AtomicBool,
    }

    impl RowStore for FlakyRowStore {
        fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
            if table == "employees" && self.reject_employees.load(Ordering::SeqCst) {
                return Err(StoreError::Storage("employees unavailable".to_string()));
            }
            self.inner.insert(table, row)
        }

        fn select(&self, table: &str, filter: &ScopedFilter) -> Result<Vec<Row>, StoreError> {
            self.inner.select(table, filter)
        }

        fn update(&self, table: &str, filter: &ScopedFilter, changes: &Map<String, Value>) -> Result<u64, StoreError> {
            self.inner.update(table, filter, changes)
        }

        fn delete(&self, table: &str, filter: &ScopedFilter) -> Result<u64, StoreError> {
            if self.stuck.load(Ordering::SeqCst) {
                return Ok(0);
            }
            self.inner.delete(table, filter)
        }

        fn count(&self, table: &str, filter: &ScopedFilter) -> Result<u64, StoreError> {
            self.inner.count(table, filter)
        }
    }

    #[test]
    fn incomplete_purge_keeps_the_tenant_suspended() {
        let rows = Arc::new(FlakyRowStore::default());
        let layer = IsolationLayer::with_stores(
            IsolationConfig::default(),
            InMemoryTenantRepository::arc(),
            Arc::new(InMemoryAuditLog::new()),
            rows.clone(),
            InMemoryObjectStore::arc(),
        )
        .unwrap();
        let a = provision(&layer, "Alpha");

        rows.stuck.store(true, Ordering::SeqCst);
        let err = layer.lifecycle.delete(a.tenant.id, None).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Registry(RegistryError::DataNotPurged { remaining_rows: 2, .. })
        ));
        assert_eq!(layer.registry.status(a.tenant.id).unwrap(), Some(TenantStatus::Suspended));

        // Once the store recovers, a retry finishes the job.
        rows.stuck.store(false, Ordering::SeqCst);
        let deleted = layer.lifecycle.delete(a.tenant.id, None).unwrap();
        assert_eq!(deleted.tenant.status, TenantStatus::Deleted);
    }

    #[test]
    fn failed_bootstrap_rolls_back_its_rows() {
        let rows = Arc::new(FlakyRowStore::default());
        let layer = IsolationLayer::with_stores(
            IsolationConfig::default(),
            InMemoryTenantRepository::arc(),
            Arc::new(InMemoryAuditLog::new()),
            rows.clone(),
            InMemoryObjectStore::arc(),
        )
        .unwrap();

        rows.reject_employees.store(true, Ordering::SeqCst);
        let admin = BootstrapAdmin {
            user_id: UserId::new(),
            email: "admin@alpha.test".to_string(),
            display_name: "Alpha Admin".to_string(),
        };
        let err = layer.lifecycle.provision("Alpha", admin, None).unwrap_err();
        assert!(matches!(err, LifecycleError::Rows(StoreError::Storage(_))));

        let tenant = layer.registry.list(None).unwrap().pop().unwrap();
        assert_eq!(tenant.status, TenantStatus::Provisioning);
        assert!(rows.inner.dump("companies").is_empty());
        assert!(layer.lifecycle.auditor().verify_purge(tenant.id).unwrap().is_clean());
        assert_eq!(denials(&layer, tenant.id, "bootstrap_failed").len(), 1);
    }

    #[test]
    fn lifecycle_transitions_record_the_operator() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        let operator = Principal::without_tenant(UserId::new(), Role::Superadmin);

        layer.lifecycle.suspend(a.tenant.id, Some(&operator)).unwrap();
        layer.lifecycle.delete(a.tenant.id, Some(&operator)).unwrap();

        let entries = layer.audit.query(&AuditQuery::for_tenant(a.tenant.id)).unwrap();
        for reason in ["tenant_suspended", "tenant_deleted"] {
            let entry = entries.iter().find(|e| e.reason == reason).unwrap();
            assert_eq!(entry.principal, Some(operator.snapshot()));
        }
        let created = entries.iter().find(|e| e.reason == "tenant_created").unwrap();
        assert_eq!(created.principal, None);
    }

    #[test]
    fn sweep_repurges_data_that_reappears() {
        let rows = InMemoryRowStore::arc();
        let layer = IsolationLayer::with_stores(
            IsolationConfig::default(),
            InMemoryTenantRepository::arc(),
            Arc::new(InMemoryAuditLog::new()),
            rows.clone(),
            InMemoryObjectStore::arc(),
        )
        .unwrap();
        let a = provision(&layer, "Alpha");
        layer.lifecycle.delete(a.tenant.id, None).unwrap();

        // A late write from a replica lands after the purge.
        rows.insert(
            "time_entries",
            Row {
                id: RowId::new(),
                tenant_id: a.tenant.id,
                values: Map::new(),
            },
        )
        .unwrap();

        let summary = layer.sweeper().sweep_once().unwrap();
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.drifted, vec![a.tenant.id]);
        assert_eq!(summary.repurged, 1);
        assert!(rows.dump("time_entries").is_empty());
        assert_eq!(denials(&layer, a.tenant.id, "purge_drift").len(), 1);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Impersonation & audit
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn read_only_impersonation_reads_but_never_writes() {
        let layer = layer();
        let a = provision(&layer, "Alpha");
        add_department(&layer, &a.admin, "Sales");

        let superadmin = Principal::without_tenant(UserId::new(), Role::Superadmin);
        let support = layer
            .impersonate(
                &superadmin,
                a.tenant.id,
                ImpersonationAccess::ReadOnly,
                "ticket 1234",
                Duration::minutes(15),
            )
            .unwrap();

        assert_eq!(layer.rows.select(&support, &Select::from("departments")).unwrap().len(), 1);
        let err = layer
            .rows
            .insert_scoped(&support, "departments", values(json!({ "name": "Oops" })))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::PolicyDenied { .. })));

        let impersonated = layer
            .audit
            .query(&AuditQuery {
                reason: Some("impersonation".to_string()),
                ..AuditQuery::for_tenant(a.tenant.id)
            })
            .unwrap();
        assert_eq!(impersonated.len(), 1);
    }

    #[test]
    fn superadmin_without_grant_sees_no_tenant_data() {
        let layer = layer();
        provision(&layer, "Alpha");
        let superadmin = Principal::without_tenant(UserId::new(), Role::Superadmin);
        let err = layer.rows.select(&superadmin, &Select::from("departments")).unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::TenantInactive { tenant_id: None })));
    }

    /// Refuses every append.
    struct BrokenAuditLog;

    impl AuditLog for BrokenAuditLog {
        fn append(&self, _entry: AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Unavailable("disk full".to_string()))
        }

        fn query(&self, _query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
            Ok(Vec::new())
        }

        fn purge_expired(&self, _cutoff: DateTime<Utc>) -> Result<usize, AuditError> {
            Ok(0)
        }
    }

    #[test]
    fn audited_reads_fail_closed_when_audit_is_down() {
        let layer = IsolationLayer::with_stores(
            IsolationConfig::default(),
            InMemoryTenantRepository::arc(),
            Arc::new(BrokenAuditLog),
            InMemoryRowStore::arc(),
            InMemoryObjectStore::arc(),
        )
        .unwrap();
        let a = provision(&layer, "Alpha");

        let err = layer.rows.select(&a.admin, &Select::from("contracts")).unwrap_err();
        assert!(matches!(err, GatewayError::Denied(AuthzError::EvaluationTimeout { .. })));

        // Rules without audit obligations keep working.
        assert!(layer.rows.select(&a.admin, &Select::from("departments")).is_ok());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Properties
    // ─────────────────────────────────────────────────────────────────────

    proptest! {
        #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

        #[test]
        fn reads_never_cross_tenants(
            spread in prop::collection::vec((0usize..3, "[a-z]{1,8}"), 1..24),
            reader in 0usize..3,
        ) {
            let layer = layer();
            let tenants: Vec<ProvisionedTenant> =
                ["Alpha", "Beta", "Gamma"].iter().map(|n| provision(&layer, n)).collect();

            let mut expected = 0;
            for (owner, name) in &spread {
                add_department(&layer, &tenants[*owner].admin, name);
                if *owner == reader {
                    expected += 1;
                }
            }

            let me = &tenants[reader];
            let rows = layer.rows.select(&me.admin, &Select::from("departments")).unwrap();
            prop_assert_eq!(rows.len(), expected);
            prop_assert!(rows.iter().all(|r| r.tenant_id == me.tenant.id));

            for other in tenants.iter().filter(|t| t.tenant.id != me.tenant.id) {
                let query = Select::from("departments")
                    .filter(Condition::eq("company_id", other.tenant.id.to_string()));
                prop_assert!(layer.rows.select(&me.admin, &query).unwrap().is_empty());
            }
        }
    }
}
