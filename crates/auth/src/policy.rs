//! Typed policy rules and the versioned policy set.
//!
//! Every `(resource, verb)` pair is an explicit rule. The tenant-equality
//! predicate is implicit and always evaluated first by the evaluator; a rule
//! only lists which roles may proceed and how far each role's view is
//! narrowed inside the tenant. A rule with no grants is an explicit deny.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Role;

/// Kind of resource a rule protects.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Table,
    Bucket,
}

/// A relational table or a storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: Cow<'static, str>,
}

impl ResourceRef {
    pub fn table(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: ResourceKind::Table,
            name: name.into(),
        }
    }

    pub fn bucket(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: ResourceKind::Bucket,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl core::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            ResourceKind::Table => write!(f, "table:{}", self.name),
            ResourceKind::Bucket => write!(f, "bucket:{}", self.name),
        }
    }
}

/// CRUD verb. Storage downloads and listings are `Read`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 4] = [Verb::Create, Verb::Read, Verb::Update, Verb::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Read => "read",
            Verb::Update => "update",
            Verb::Delete => "delete",
        }
    }

    pub fn is_mutation(self) -> bool {
        !matches!(self, Verb::Read)
    }
}

impl core::fmt::Display for Verb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far a role's access is narrowed inside its own tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RowScope {
    /// Every row of the tenant.
    Tenant,
    /// Only rows whose `column` holds the principal's user id.
    OwnedBy { column: Cow<'static, str> },
}

impl RowScope {
    pub fn owned_by(column: impl Into<Cow<'static, str>>) -> Self {
        RowScope::OwnedBy {
            column: column.into(),
        }
    }
}

/// One role's permission under a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub scope: RowScope,
}

/// A `(resource, verb)` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub resource: ResourceRef,
    pub verb: Verb,
    pub grants: Vec<RoleGrant>,
    /// Record an audit entry for every allowed operation, not only denials.
    pub audit_allows: bool,
}

impl PolicyRule {
    pub fn new(resource: ResourceRef, verb: Verb) -> Self {
        Self {
            resource,
            verb,
            grants: Vec::new(),
            audit_allows: false,
        }
    }

    pub fn rule_id(&self) -> String {
        rule_id(&self.resource, self.verb)
    }

    pub fn grant_for(&self, role: Role) -> Option<&RoleGrant> {
        self.grants.iter().find(|g| g.role == role)
    }
}

pub(crate) fn rule_id(resource: &ResourceRef, verb: Verb) -> String {
    format!("{resource}/{verb}")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy is incomplete; missing rules: {missing:?}")]
    Incomplete { missing: Vec<String> },

    #[error("rule {rule} grants superadmin; superadmin access must use impersonation")]
    SuperadminGrant { rule: String },

    #[error("rule {rule} grants role '{role}' more than once")]
    DuplicateGrant { rule: String, role: Role },

    #[error("policy version must increase (current {current}, proposed {proposed})")]
    VersionNotIncreasing { current: u64, proposed: u64 },
}

/// Immutable, versioned collection of rules injected into the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySet {
    version: u64,
    rules: HashMap<(ResourceRef, Verb), PolicyRule>,
}

impl PolicySet {
    pub fn builder(version: u64) -> PolicySetBuilder {
        PolicySetBuilder {
            version,
            rules: HashMap::new(),
        }
    }

    /// A policy with no rules: everything is denied.
    pub fn empty(version: u64) -> Self {
        Self {
            version,
            rules: HashMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn rule(&self, resource: &ResourceRef, verb: Verb) -> Option<&PolicyRule> {
        self.rules.get(&(resource.clone(), verb))
    }

    pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.values()
    }

    /// Resources that have at least one rule.
    pub fn resources(&self) -> BTreeSet<ResourceRef> {
        self.rules.keys().map(|(r, _)| r.clone()).collect()
    }

    /// Fail unless every resource has a rule for all four verbs.
    ///
    /// Run at startup so a missing predicate is a configuration error rather
    /// than a silent runtime gap.
    pub fn ensure_complete<'a, I>(&self, resources: I) -> Result<(), PolicyError>
    where
        I: IntoIterator<Item = &'a ResourceRef>,
    {
        let mut missing: Vec<String> = resources
            .into_iter()
            .flat_map(|r| Verb::ALL.into_iter().map(move |v| (r, v)))
            .filter(|(r, v)| self.rule(r, *v).is_none())
            .map(|(r, v)| rule_id(r, v))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            missing.sort();
            Err(PolicyError::Incomplete { missing })
        }
    }
}

/// Builder for [`PolicySet`].
#[derive(Debug, Clone)]
pub struct PolicySetBuilder {
    version: u64,
    rules: HashMap<(ResourceRef, Verb), PolicyRule>,
}

impl PolicySetBuilder {
    fn entry(&mut self, resource: &ResourceRef, verb: Verb) -> &mut PolicyRule {
        self.rules
            .entry((resource.clone(), verb))
            .or_insert_with(|| PolicyRule::new(resource.clone(), verb))
    }

    /// Allow `roles` to perform `verb` on `resource` with `scope`.
    pub fn allow(mut self, resource: &ResourceRef, verb: Verb, roles: &[Role], scope: RowScope) -> Self {
        let rule = self.entry(resource, verb);
        for role in roles {
            rule.grants.push(RoleGrant {
                role: *role,
                scope: scope.clone(),
            });
        }
        self
    }

    /// Register an explicit deny (a rule with no grants).
    pub fn deny(mut self, resource: &ResourceRef, verb: Verb) -> Self {
        self.entry(resource, verb);
        self
    }

    /// Audit every allowed operation matching this rule.
    pub fn audit_allows(mut self, resource: &ResourceRef, verb: Verb) -> Self {
        self.entry(resource, verb).audit_allows = true;
        self
    }

    pub fn build(self) -> Result<PolicySet, PolicyError> {
        for rule in self.rules.values() {
            let mut seen = BTreeSet::new();
            for grant in &rule.grants {
                if grant.role.is_superadmin() {
                    return Err(PolicyError::SuperadminGrant {
                        rule: rule.rule_id(),
                    });
                }
                if !seen.insert(grant.role) {
                    return Err(PolicyError::DuplicateGrant {
                        rule: rule.rule_id(),
                        role: grant.role,
                    });
                }
            }
        }

        Ok(PolicySet {
            version: self.version,
            rules: self.rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn departments() -> ResourceRef {
        ResourceRef::table("departments")
    }

    #[test]
    fn explicit_deny_is_a_rule_without_grants() {
        let set = PolicySet::builder(1)
            .deny(&departments(), Verb::Delete)
            .build()
            .unwrap();
        let rule = set.rule(&departments(), Verb::Delete).unwrap();
        assert!(rule.grants.is_empty());
        assert!(set.rule(&departments(), Verb::Read).is_none());
    }

    #[test]
    fn incomplete_policy_names_missing_pairs() {
        let set = PolicySet::builder(1)
            .allow(&departments(), Verb::Read, &[Role::Employee], RowScope::Tenant)
            .deny(&departments(), Verb::Create)
            .build()
            .unwrap();

        let err = set.ensure_complete([&departments()]).unwrap_err();
        assert_eq!(
            err,
            PolicyError::Incomplete {
                missing: vec![
                    "table:departments/delete".to_string(),
                    "table:departments/update".to_string(),
                ]
            }
        );
    }

    #[test]
    fn superadmin_grants_are_rejected() {
        let err = PolicySet::builder(1)
            .allow(&departments(), Verb::Read, &[Role::Superadmin], RowScope::Tenant)
            .build()
            .unwrap_err();
        assert!(matches!(err, PolicyError::SuperadminGrant { .. }));
    }

    #[test]
    fn duplicate_role_grants_are_rejected() {
        let err = PolicySet::builder(1)
            .allow(&departments(), Verb::Read, &[Role::Hr], RowScope::Tenant)
            .allow(&departments(), Verb::Read, &[Role::Hr], RowScope::owned_by("owner_id"))
            .build()
            .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateGrant { role: Role::Hr, .. }));
    }

    #[test]
    fn resource_display_includes_kind() {
        assert_eq!(ResourceRef::bucket("documents").to_string(), "bucket:documents");
        assert_eq!(departments().to_string(), "table:departments");
    }
}
