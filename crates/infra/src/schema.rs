//! Catalog of tenant-owned tables and storage buckets, and the default
//! policy that covers them.

use std::borrow::Cow;
use std::collections::BTreeMap;

use tenantguard_auth::{PolicyError, PolicySet, ResourceRef, Role, RowScope, Verb};

/// A tenant-owned table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: Cow<'static, str>,
    /// Column that carries the owning tenant id.
    pub tenant_column: Cow<'static, str>,
    /// Rows a freshly provisioned tenant may already have (bootstrap data).
    pub fresh_allowance: u64,
}

impl TableSpec {
    pub fn new(name: impl Into<Cow<'static, str>>, tenant_column: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            tenant_column: tenant_column.into(),
            fresh_allowance: 0,
        }
    }

    pub fn with_fresh_allowance(mut self, rows: u64) -> Self {
        self.fresh_allowance = rows;
        self
    }

    pub fn resource(&self) -> ResourceRef {
        ResourceRef::table(self.name.clone())
    }
}

/// A storage bucket. Tenant buckets namespace every object under
/// `tenant/{tenant_id}/`; public buckets have no tenant namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: Cow<'static, str>,
    pub public: bool,
}

impl BucketSpec {
    pub fn resource(&self) -> ResourceRef {
        ResourceRef::bucket(self.name.clone())
    }
}

pub const COMPANIES: &str = "companies";
pub const EMPLOYEES: &str = "employees";

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableSpec>,
    buckets: BTreeMap<String, BucketSpec>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, spec: TableSpec) -> Self {
        self.tables.insert(spec.name.to_string(), spec);
        self
    }

    pub fn with_bucket(mut self, name: impl Into<Cow<'static, str>>, public: bool) -> Self {
        let name = name.into();
        self.buckets.insert(name.to_string(), BucketSpec { name, public });
        self
    }

    /// The HR workload: a company row per tenant (keyed by the tenant id
    /// itself), its employees and the records hanging off them.
    pub fn hr_default(public_buckets: &[String]) -> Self {
        let mut catalog = Self::new()
            .with_table(TableSpec::new(COMPANIES, "id").with_fresh_allowance(1))
            .with_table(TableSpec::new(EMPLOYEES, "company_id").with_fresh_allowance(1))
            .with_table(TableSpec::new("departments", "company_id"))
            .with_table(TableSpec::new("absence_requests", "company_id"))
            .with_table(TableSpec::new("time_entries", "company_id"))
            .with_table(TableSpec::new("documents", "company_id"))
            .with_table(TableSpec::new("contracts", "company_id"))
            .with_bucket("documents", false)
            .with_bucket("avatars", false);

        for bucket in public_buckets {
            catalog = catalog.with_bucket(Cow::Owned(bucket.clone()), true);
        }
        catalog
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.values()
    }

    pub fn bucket(&self, name: &str) -> Option<&BucketSpec> {
        self.buckets.get(name)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &BucketSpec> {
        self.buckets.values()
    }

    pub fn tenant_buckets(&self) -> impl Iterator<Item = &BucketSpec> {
        self.buckets.values().filter(|b| !b.public)
    }

    pub fn resources(&self) -> Vec<ResourceRef> {
        self.tables
            .values()
            .map(TableSpec::resource)
            .chain(self.buckets.values().map(BucketSpec::resource))
            .collect()
    }
}

/// Default HR policy over `catalog`, checked for completeness.
pub fn default_policy(catalog: &Catalog, version: u64) -> Result<PolicySet, PolicyError> {
    use Role::{Admin, Employee, Hr, Manager};
    const EVERYONE: &[Role] = &[Employee, Manager, Hr, Admin];
    const PEOPLE_OPS: &[Role] = &[Hr, Admin];

    let mut builder = PolicySet::builder(version);

    for table in catalog.tables() {
        let res = table.resource();
        builder = match &*table.name {
            COMPANIES => builder
                .allow(&res, Verb::Read, EVERYONE, RowScope::Tenant)
                .allow(&res, Verb::Update, &[Admin], RowScope::Tenant)
                .deny(&res, Verb::Create)
                .deny(&res, Verb::Delete)
                .audit_allows(&res, Verb::Update),
            EMPLOYEES => builder
                .allow(&res, Verb::Read, &[Manager, Hr, Admin], RowScope::Tenant)
                .allow(&res, Verb::Read, &[Employee], RowScope::owned_by("user_id"))
                .allow(&res, Verb::Create, PEOPLE_OPS, RowScope::Tenant)
                .allow(&res, Verb::Update, PEOPLE_OPS, RowScope::Tenant)
                .allow(&res, Verb::Delete, &[Admin], RowScope::Tenant)
                .audit_allows(&res, Verb::Delete),
            "absence_requests" | "time_entries" => builder
                .allow(&res, Verb::Read, &[Manager, Hr, Admin], RowScope::Tenant)
                .allow(&res, Verb::Read, &[Employee], RowScope::owned_by("employee_user_id"))
                .allow(&res, Verb::Create, &[Manager, Hr, Admin], RowScope::Tenant)
                .allow(&res, Verb::Create, &[Employee], RowScope::owned_by("employee_user_id"))
                .allow(&res, Verb::Update, &[Manager, Hr, Admin], RowScope::Tenant)
                .allow(&res, Verb::Delete, PEOPLE_OPS, RowScope::Tenant),
            "contracts" => builder
                .allow(&res, Verb::Read, PEOPLE_OPS, RowScope::Tenant)
                .allow(&res, Verb::Create, PEOPLE_OPS, RowScope::Tenant)
                .allow(&res, Verb::Update, PEOPLE_OPS, RowScope::Tenant)
                .allow(&res, Verb::Delete, &[Admin], RowScope::Tenant)
                .audit_allows(&res, Verb::Read)
                .audit_allows(&res, Verb::Update)
                .audit_allows(&res, Verb::Delete),
            _ => builder
                .allow(&res, Verb::Read, EVERYONE, RowScope::Tenant)
                .allow(&res, Verb::Create, &[Manager, Hr, Admin], RowScope::Tenant)
                .allow(&res, Verb::Update, &[Manager, Hr, Admin], RowScope::Tenant)
                .allow(&res, Verb::Delete, PEOPLE_OPS, RowScope::Tenant),
        };
    }

    for bucket in catalog.buckets() {
        let res = bucket.resource();
        builder = if bucket.public {
            builder
                .allow(&res, Verb::Read, EVERYONE, RowScope::Tenant)
                .deny(&res, Verb::Create)
                .deny(&res, Verb::Update)
                .deny(&res, Verb::Delete)
        } else if bucket.name == "avatars" {
            builder
                .allow(&res, Verb::Read, EVERYONE, RowScope::Tenant)
                .allow(&res, Verb::Create, EVERYONE, RowScope::Tenant)
                .allow(&res, Verb::Update, EVERYONE, RowScope::Tenant)
                .allow(&res, Verb::Delete, PEOPLE_OPS, RowScope::Tenant)
        } else {
            builder
                .allow(&res, Verb::Read, EVERYONE, RowScope::Tenant)
                .allow(&res, Verb::Create, &[Manager, Hr, Admin], RowScope::Tenant)
                .allow(&res, Verb::Update, &[Manager, Hr, Admin], RowScope::Tenant)
                .allow(&res, Verb::Delete, PEOPLE_OPS, RowScope::Tenant)
                .audit_allows(&res, Verb::Delete)
        };
    }

    let policy = builder.build()?;
    policy.ensure_complete(&catalog.resources())?;
    Ok(policy)
}
