use std::collections::HashMap;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use tenantguard_auth::{
    DirectoryError, EvalContext, Operation, PolicyEvaluator, PolicySet, Principal, ResourceRef,
    Role, RowScope, TenantDirectory, Verb,
};
use tenantguard_core::{TenantId, TenantStatus, UserId};

struct MapDirectory(HashMap<TenantId, TenantStatus>);

impl TenantDirectory for MapDirectory {
    fn tenant_status(&self, tenant_id: TenantId) -> Result<Option<TenantStatus>, DirectoryError> {
        Ok(self.0.get(&tenant_id).copied())
    }
}

fn bench_authorize(c: &mut Criterion) {
    let tenants: Vec<TenantId> = (0..1_000).map(|_| TenantId::new()).collect();
    let directory = MapDirectory(tenants.iter().map(|t| (*t, TenantStatus::Active)).collect());

    let mut builder = PolicySet::builder(1);
    let tables: Vec<ResourceRef> = (0..50).map(|i| ResourceRef::table(format!("table_{i}"))).collect();
    for table in &tables {
        for verb in Verb::ALL {
            builder = builder.allow(table, verb, &Role::TENANT_ROLES, RowScope::Tenant);
        }
    }
    let evaluator = PolicyEvaluator::new(builder.build().unwrap(), directory);

    let principal = Principal::new(UserId::new(), tenants[500], Role::Manager);
    let allowed = Operation::new(tables[25].clone(), Verb::Read).targeting(tenants[500]);
    let foreign = Operation::new(tables[25].clone(), Verb::Read).targeting(tenants[10]);
    let ctx = EvalContext::now();

    c.bench_function("authorize_allow", |b| {
        b.iter(|| evaluator.authorize(black_box(&principal), black_box(&allowed), &ctx))
    });

    c.bench_function("authorize_cross_tenant_deny", |b| {
        b.iter(|| evaluator.authorize(black_box(&principal), black_box(&foreign), &ctx))
    });
}

criterion_group!(benches, bench_authorize);
criterion_main!(benches);
