//! sqlx-backed accessor covering SQLite, MySQL/MariaDB and PostgreSQL
//! through the `Any` driver.
use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Column, Connection, Executor, Row as _, ValueRef};
use tracing::debug;

use crate::config::{Config, ConnectionSettings};
use crate::error::DbError;
use crate::querier::{Accessor, ExecResult, PoolStats, Querier, Statement, Transaction, Transactor};
use crate::rows::{Row, Rows, SurrogateRows};
use crate::value::{SqlValue, format_vector};

type AnyQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

pub struct SqlxAccessor {
    pool: AnyPool,
}

impl SqlxAccessor {
    pub(crate) async fn connect(
        settings: &ConnectionSettings,
        cfg: &Config,
    ) -> Result<Self, DbError> {
        sqlx::any::install_default_drivers();
        let mut options = AnyPoolOptions::new();
        if cfg.max_open_conns > 0 {
            options = options.max_connections(cfg.max_open_conns);
        }
        if !cfg.max_conn_lifetime.is_zero() {
            options = options.max_lifetime(cfg.max_conn_lifetime);
        }
        debug!(target: "dbmux::sqlx", "connecting pool for {}", settings.scheme);
        let pool = options.connect(&settings.cleaned_url).await?;
        Ok(Self { pool })
    }
}

fn bind_args<'q>(mut query: AnyQuery<'q>, args: &'q [SqlValue]) -> AnyQuery<'q> {
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(Option::<i64>::None),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Bytes(b) => query.bind(b.clone()),
            // Any has no native uuid/time/vector kinds; bind text forms
            SqlValue::Uuid(u) => query.bind(u.to_string()),
            SqlValue::Time(t) => query.bind(t.to_rfc3339()),
            SqlValue::Vector(v) => query.bind(format_vector(v)),
            SqlValue::IntList(vs) => query.bind(
                vs.iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        };
    }
    query
}

fn decode_cell(row: &AnyRow, idx: usize) -> SqlValue {
    if row
        .try_get_raw(idx)
        .map(|value| value.is_null())
        .unwrap_or(true)
    {
        return SqlValue::Null;
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return SqlValue::Int(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return SqlValue::Float(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return SqlValue::Bool(v);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return SqlValue::Text(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return SqlValue::Bytes(v);
    }
    SqlValue::Null
}

fn rows_from(any_rows: Vec<AnyRow>) -> Box<dyn Rows> {
    let columns: Vec<String> = any_rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        })
        .unwrap_or_default();
    let values: Vec<Vec<SqlValue>> = any_rows
        .iter()
        .map(|row| (0..row.len()).map(|i| decode_cell(row, i)).collect())
        .collect();
    Box::new(SurrogateRows::new(
        columns.iter().map(|c| c.as_str()).collect(),
        values,
    ))
}

#[async_trait]
impl Querier for SqlxAccessor {
    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
        let result = bind_args(sqlx::query(sql), args)
            .execute(&self.pool)
            .await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        })
    }

    async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query(sql, args).await?;
        rows.next_row()
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError> {
        let fetched = bind_args(sqlx::query(sql), args)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows_from(fetched))
    }

    async fn prepare(&self, sql: &str) -> Result<Statement, DbError> {
        let mut conn = self.pool.acquire().await?;
        (&mut *conn).prepare(sql).await?;
        Ok(Statement {
            sql: sql.to_string(),
        })
    }
}

#[async_trait]
impl Transactor for SqlxAccessor {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqlxTransaction {
            tx: tokio::sync::Mutex::new(Some(tx)),
        }))
    }
}

#[async_trait]
impl Accessor for SqlxAccessor {
    async fn ping(&self) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            open: self.pool.size(),
            idle: self.pool.num_idle() as u32,
        }
    }

    async fn close(&self) -> Result<(), DbError> {
        self.pool.close().await;
        Ok(())
    }

    fn as_querier(&self) -> &dyn Querier {
        self
    }
}

struct SqlxTransaction {
    tx: tokio::sync::Mutex<Option<sqlx::Transaction<'static, Any>>>,
}

impl SqlxTransaction {
    fn finished() -> DbError {
        DbError::backend("transaction already finished")
    }
}

#[async_trait]
impl Querier for SqlxTransaction {
    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;
        let result = bind_args(sqlx::query(sql), args)
            .execute(&mut **tx)
            .await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        })
    }

    async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query(sql, args).await?;
        rows.next_row()
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;
        let fetched = bind_args(sqlx::query(sql), args)
            .fetch_all(&mut **tx)
            .await?;
        Ok(rows_from(fetched))
    }

    async fn prepare(&self, sql: &str) -> Result<Statement, DbError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;
        (&mut **tx).prepare(sql).await?;
        Ok(Statement {
            sql: sql.to_string(),
        })
    }
}

#[async_trait]
impl Transaction for SqlxTransaction {
    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        let tx = self
            .tx
            .lock()
            .await
            .take()
            .ok_or_else(Self::finished)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        let tx = self
            .tx
            .lock()
            .await
            .take()
            .ok_or_else(Self::finished)?;
        tx.rollback().await?;
        Ok(())
    }

    fn as_querier(&self) -> &dyn Querier {
        self
    }
}
