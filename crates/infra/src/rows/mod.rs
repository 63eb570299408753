//! Row-level enforcement: tenant-scoped storage and the gateway in front
//! of it.

mod gateway;
mod query;
mod store;

pub use gateway::{ForeignFilterMode, GatewayError, JoinedRow, RowGateway};
pub use query::{
    Aggregate, AggregateValue, Condition, ConditionOp, Delete, Insert, JoinClause, JoinQuery, Select, Update,
};
pub use store::{InMemoryRowStore, Row, RowStore, ScopedFilter, StoreError};
