//! Query shapes accepted by the row gateway.
//!
//! Callers describe *what* they want; the gateway decides which tenant the
//! rows come from. Conditions on a table's tenant column are allowed but
//! only ever narrow: they can never widen a query past the principal's own
//! tenant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tenantguard_core::TenantId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Eq(Value),
    In(Vec<Value>),
}

/// `column = value` or `column IN (values)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub op: ConditionOp,
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: ConditionOp::Eq(value.into()),
        }
    }

    pub fn one_of<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            column: column.into(),
            op: ConditionOp::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match &self.op {
            ConditionOp::Eq(expected) => value == expected,
            ConditionOp::In(options) => options.contains(value),
        }
    }

    pub(crate) fn values(&self) -> &[Value] {
        match &self.op {
            ConditionOp::Eq(v) => std::slice::from_ref(v),
            ConditionOp::In(vs) => vs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub table: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// Inner join of another table onto the base table of a [`JoinQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub table: String,
    /// Column of the base table.
    pub on_base: String,
    /// Column of the joined table that must equal `on_base`.
    pub on_joined: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinQuery {
    pub base: Select,
    pub joins: Vec<JoinClause>,
}

impl JoinQuery {
    pub fn new(base: Select) -> Self {
        Self {
            base,
            joins: Vec::new(),
        }
    }

    pub fn join(mut self, table: impl Into<String>, on_base: impl Into<String>, on_joined: impl Into<String>) -> Self {
        self.joins.push(JoinClause {
            table: table.into(),
            on_base: on_base.into(),
            on_joined: on_joined.into(),
            conditions: Vec::new(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fn", rename_all = "snake_case")]
pub enum Aggregate {
    Count,
    /// Sum of a numeric column; non-numeric values are skipped.
    Sum { column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateValue {
    Count(u64),
    Sum(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table: String,
    /// Owning tenant. Must be present and equal to the principal's tenant.
    pub tenant_id: Option<TenantId>,
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub table: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub changes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub table: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
