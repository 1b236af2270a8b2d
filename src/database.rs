//! The umbrella `Database` value: one dialect, one connection pool, the
//! registered per-table query builders, and the built-in connectors.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::config::{Config, ConnectionSettings};
use crate::dialect::Dialect;
use crate::dialect_cassandra::CassandraDialect;
use crate::dialect_mssql::MssqlDialect;
use crate::dialect_mysql::MysqlDialect;
use crate::dialect_postgres::PostgresDialect;
use crate::dialect_sqlite::SqliteDialect;
use crate::error::DbError;
use crate::querier::{Accessor, PoolStats};
use crate::registry::{Connector, Registry};
use crate::select::TableQueryBuilder;
use crate::session::{Session, SessionCtx};

#[derive(Debug)]
struct DatabaseInner {
    cfg: Config,
    dialect: Arc<dyn Dialect>,
    accessor: Arc<dyn Accessor>,
    builders: RwLock<HashMap<String, TableQueryBuilder>>,
    closed: AtomicBool,
}

/// A connection pool bound to exactly one dialect. Cheap to clone; all
/// clones share the pool and the builder registry.
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open through the default registry.
    pub async fn open(cfg: Config) -> Result<Database, DbError> {
        Registry::global().open(cfg).await
    }

    /// Bind an externally-adapted accessor (any native driver behind the
    /// [`Accessor`] trait) to a dialect. This is the integration point
    /// for engines without a bundled driver.
    pub fn with_accessor(
        cfg: Config,
        dialect: Arc<dyn Dialect>,
        accessor: Arc<dyn Accessor>,
    ) -> Database {
        Database {
            inner: Arc::new(DatabaseInner {
                cfg,
                dialect,
                accessor,
                builders: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Start a session carrying `ctx`'s cancellation token and latency
    /// counters.
    pub fn session(&self, ctx: SessionCtx) -> Session {
        Session::new(self.clone(), ctx)
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.inner.dialect
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.cfg
    }

    pub(crate) fn accessor(&self) -> &Arc<dyn Accessor> {
        &self.inner.accessor
    }

    /// Install (or replace) the query builder for a table.
    pub fn register_table_builder(&self, builder: TableQueryBuilder) {
        let mut builders = self.inner.builders.write().expect("builders poisoned");
        builders.insert(builder.table.clone(), builder);
    }

    pub fn unregister_table_builder(&self, table: &str) {
        let mut builders = self.inner.builders.write().expect("builders poisoned");
        builders.remove(table);
    }

    pub(crate) fn table_builder(&self, table: &str) -> Result<TableQueryBuilder, DbError> {
        let builders = self.inner.builders.read().expect("builders poisoned");
        builders
            .get(table)
            .cloned()
            .ok_or_else(|| DbError::BadInput(format!("unknown table {table:?}")))
    }

    /// Liveness probe; surfaces the low-level driver error unchanged.
    pub async fn ping(&self) -> Result<(), DbError> {
        self.inner.accessor.ping().await
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.accessor.stats()
    }

    /// Close the pool and release dialect-owned resources. Subsequent
    /// calls are no-ops.
    pub async fn close(&self) -> Result<(), DbError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(target: "dbmux::db", "closing {} pool", self.inner.dialect.name());
        self.inner.accessor.close().await?;
        self.inner.dialect.close();
        Ok(())
    }
}

/// Connector for the three sqlx-driven engines.
struct SqlxConnector;

#[async_trait]
impl Connector for SqlxConnector {
    async fn connection_pool(&self, cfg: Config) -> Result<Database, DbError> {
        let settings = ConnectionSettings::parse(&cfg.conn_string)?;
        let dialect: Arc<dyn Dialect> = match settings.scheme.as_str() {
            "sqlite" => Arc::new(SqliteDialect),
            "mysql" => Arc::new(MysqlDialect),
            "postgres" | "postgresql" => {
                Arc::new(PostgresDialect::new(settings.schema.clone()))
            }
            other => {
                return Err(DbError::BadInput(format!(
                    "scheme {other:?} is not sqlx-backed"
                )));
            }
        };
        let accessor = crate::backend_sqlx::SqlxAccessor::connect(&settings, &cfg).await?;
        Ok(Database::with_accessor(cfg, dialect, Arc::new(accessor)))
    }
}

struct ClickhouseConnector;

#[async_trait]
impl Connector for ClickhouseConnector {
    async fn connection_pool(&self, cfg: Config) -> Result<Database, DbError> {
        let settings = ConnectionSettings::parse(&cfg.conn_string)?;
        let accessor =
            crate::backend_clickhouse::ClickhouseAccessor::connect(&settings).await?;
        Ok(Database::with_accessor(
            cfg,
            Arc::new(crate::dialect_clickhouse::ClickhouseDialect),
            Arc::new(accessor),
        ))
    }
}

struct MssqlConnector;

#[async_trait]
impl Connector for MssqlConnector {
    async fn connection_pool(&self, cfg: Config) -> Result<Database, DbError> {
        let settings = ConnectionSettings::parse(&cfg.conn_string)?;
        let accessor = crate::backend_mssql::MssqlAccessor::connect(&settings).await?;
        Ok(Database::with_accessor(
            cfg,
            Arc::new(MssqlDialect::new(settings.schema.clone())),
            Arc::new(accessor),
        ))
    }
}

/// No CQL driver is bundled; the scheme resolves, the dialect is fully
/// supported, and a live pool is produced by adapting a driver through
/// [`Database::with_accessor`] with [`CassandraDialect`].
struct CassandraConnector;

#[async_trait]
impl Connector for CassandraConnector {
    async fn connection_pool(&self, cfg: Config) -> Result<Database, DbError> {
        // Validate the URL before refusing, so malformed input still
        // reports BadInput.
        let _ = ConnectionSettings::parse(&cfg.conn_string)?;
        Err(DbError::NotSupported(
            "no bundled cassandra driver; adapt one via Database::with_accessor".to_string(),
        ))
    }
}

pub(crate) fn register_builtin_connectors(registry: &Registry) -> Result<(), DbError> {
    let sqlx: Arc<dyn Connector> = Arc::new(SqlxConnector);
    for scheme in ["sqlite", "mysql", "postgres", "postgresql"] {
        registry.register(scheme, sqlx.clone())?;
    }
    let mssql: Arc<dyn Connector> = Arc::new(MssqlConnector);
    for scheme in ["mssql", "sqlserver"] {
        registry.register(scheme, mssql.clone())?;
    }
    registry.register("clickhouse", Arc::new(ClickhouseConnector))?;
    registry.register("cassandra", Arc::new(CassandraConnector))?;
    Ok(())
}

/// Convenience constructor pairing the Cassandra dialect with an adapted
/// accessor.
pub fn cassandra_database(
    cfg: Config,
    keyspace: Option<String>,
    accessor: Arc<dyn Accessor>,
) -> Database {
    Database::with_accessor(cfg, Arc::new(CassandraDialect::new(keyspace)), accessor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surrogate::SurrogateAccessor;

    fn surrogate_db() -> Database {
        Database::with_accessor(
            Config::new("sqlite://:memory:"),
            Arc::new(SqliteDialect),
            Arc::new(SurrogateAccessor::new()),
        )
    }

    #[test]
    fn builder_registration_lifecycle() {
        let db = surrogate_db();
        assert!(db.table_builder("jobs").is_err());
        db.register_table_builder(TableQueryBuilder::new("jobs"));
        assert!(db.table_builder("jobs").is_ok());
        db.unregister_table_builder("jobs");
        let err = db.table_builder("jobs").unwrap_err();
        assert!(err.to_string().contains("jobs"));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let db = surrogate_db();
        db.close().await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cassandra_scheme_is_registered_but_driverless() {
        let err = Database::open(Config::new("cassandra://localhost/ks"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotSupported(_)));
    }
}
