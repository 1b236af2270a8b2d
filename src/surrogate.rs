//! Scriptable in-memory accessor. Backs unit tests across the crate and
//! any environment where a live backend is unavailable.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::DbError;
use crate::querier::{Accessor, ExecResult, PoolStats, Querier, Statement, Transaction, Transactor};
use crate::rows::{Row, Rows, SurrogateRows};
use crate::value::SqlValue;

/// What a scripted handler returns for one dispatched statement.
pub enum SurrogateOutcome {
    Exec(ExecResult),
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
    },
    Fail(DbError),
}

type Handler = dyn Fn(&str, &[SqlValue]) -> SurrogateOutcome + Send + Sync;

/// An accessor that answers from a scripted handler and records every
/// statement it sees (including BEGIN/COMMIT/ROLLBACK markers).
#[derive(Clone)]
pub struct SurrogateAccessor {
    handler: Arc<Handler>,
    statements: Arc<Mutex<Vec<String>>>,
}

impl Default for SurrogateAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SurrogateAccessor {
    /// Accessor that acknowledges every exec and returns no rows.
    pub fn new() -> Self {
        Self::with_handler(|_, _| SurrogateOutcome::Exec(ExecResult::default()))
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str, &[SqlValue]) -> SurrogateOutcome + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            statements: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every statement dispatched so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().expect("statement log poisoned").clone()
    }

    fn record(&self, sql: &str) {
        self.statements
            .lock()
            .expect("statement log poisoned")
            .push(sql.to_string());
    }

    fn dispatch(&self, sql: &str, args: &[SqlValue]) -> Result<SurrogateOutcome, DbError> {
        self.record(sql);
        match (self.handler)(sql, args) {
            SurrogateOutcome::Fail(err) => Err(err),
            outcome => Ok(outcome),
        }
    }
}

#[async_trait]
impl Querier for SurrogateAccessor {
    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
        match self.dispatch(sql, args)? {
            SurrogateOutcome::Exec(result) => Ok(result),
            SurrogateOutcome::Rows { .. } => Ok(ExecResult::default()),
            SurrogateOutcome::Fail(err) => Err(err),
        }
    }

    async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query(sql, args).await?;
        rows.next_row()
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError> {
        match self.dispatch(sql, args)? {
            SurrogateOutcome::Rows { columns, rows } => {
                let columns: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
                Ok(Box::new(SurrogateRows::new(columns, rows)))
            }
            SurrogateOutcome::Exec(_) => Ok(Box::new(SurrogateRows::default())),
            SurrogateOutcome::Fail(err) => Err(err),
        }
    }

    async fn prepare(&self, sql: &str) -> Result<Statement, DbError> {
        self.record(&format!("PREPARE: {sql}"));
        Ok(Statement {
            sql: sql.to_string(),
        })
    }
}

#[async_trait]
impl Transactor for SurrogateAccessor {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        self.record("BEGIN");
        Ok(Box::new(SurrogateTransaction {
            inner: self.clone(),
        }))
    }
}

#[async_trait]
impl Accessor for SurrogateAccessor {
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        PoolStats { open: 1, idle: 1 }
    }

    async fn close(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn as_querier(&self) -> &dyn Querier {
        self
    }
}

struct SurrogateTransaction {
    inner: SurrogateAccessor,
}

#[async_trait]
impl Querier for SurrogateTransaction {
    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
        self.inner.exec(sql, args).await
    }

    async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError> {
        self.inner.query_row(sql, args).await
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError> {
        self.inner.query(sql, args).await
    }

    async fn prepare(&self, sql: &str) -> Result<Statement, DbError> {
        self.inner.prepare(sql).await
    }
}

#[async_trait]
impl Transaction for SurrogateTransaction {
    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.inner.record("COMMIT");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.inner.record("ROLLBACK");
        Ok(())
    }

    fn as_querier(&self) -> &dyn Querier {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_rows_and_statement_log() {
        let accessor = SurrogateAccessor::with_handler(|sql, _| {
            if sql.starts_with("SELECT") {
                SurrogateOutcome::Rows {
                    columns: vec!["n".into()],
                    rows: vec![vec![SqlValue::Int(1)]],
                }
            } else {
                SurrogateOutcome::Exec(ExecResult {
                    rows_affected: 3,
                    last_insert_id: None,
                })
            }
        });

        let result = accessor.exec("DELETE FROM t", &[]).await.unwrap();
        assert_eq!(result.rows_affected, 3);

        let row = accessor.query_row("SELECT n", &[]).await.unwrap().unwrap();
        assert_eq!(row.get_i64(0).unwrap(), 1);

        assert_eq!(accessor.statements(), vec!["DELETE FROM t", "SELECT n"]);
    }
}
