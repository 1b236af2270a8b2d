//! Minimal capability interfaces over a native driver: querier,
//! transaction, transactor, accessor. Decorators (timing, logging,
//! dry-run) compose on top of these without duplicating code paths.
use std::fmt;

use async_trait::async_trait;

use crate::error::DbError;
use crate::rows::{Row, Rows};
use crate::value::SqlValue;

/// Result of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// A prepared statement handle. The SQL is kept so the statement can be
/// re-dispatched through the querier that prepared it.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
}

/// Statement execution capability. Arguments are bound positionally
/// against the canonical `$N` placeholders after dialect rewriting.
#[async_trait]
pub trait Querier: Send + Sync {
    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError>;

    async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError>;

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError>;

    /// Validate a statement against the backend where the driver
    /// supports it and return a re-dispatchable handle.
    async fn prepare(&self, sql: &str) -> Result<Statement, DbError>;
}

/// A live transaction. Not safe for concurrent use; callers serialize.
#[async_trait]
pub trait Transaction: Querier {
    async fn commit(self: Box<Self>) -> Result<(), DbError>;
    async fn rollback(self: Box<Self>) -> Result<(), DbError>;

    /// Upcast helper; implementations return `self`.
    fn as_querier(&self) -> &dyn Querier;
}

/// Capability to start transactions.
#[async_trait]
pub trait Transactor: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError>;
}

/// Connection-pool statistics, best effort per backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub open: u32,
    pub idle: u32,
}

/// A connection pool: querier plus lifecycle operations.
#[async_trait]
pub trait Accessor: Querier + Transactor {
    async fn ping(&self) -> Result<(), DbError>;

    fn stats(&self) -> PoolStats;

    /// Close the pool. Closing exactly once is the caller's contract.
    async fn close(&self) -> Result<(), DbError>;

    /// Upcast helper; implementations return `self`.
    fn as_querier(&self) -> &dyn Querier;
}

impl fmt::Debug for dyn Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Accessor(..)")
    }
}
