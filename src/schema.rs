//! Schema subsystem: existence probes against each engine's metadata
//! catalog, idempotent DDL, sequence management, and PostgreSQL
//! constraint read/write.
use tracing::debug;

use crate::database::Database;
use crate::dialect::{
    DataType, Dialect, DialectName, SequenceSupport, default_create_query_patch,
    rewrite_placeholders,
};
use crate::error::DbError;
use crate::filter::ColumnFilter;
use crate::select::TableQueryBuilder;
use crate::session::SessionCtx;
use crate::value::SqlValue;

/// One column of a table definition.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub ty: DataType,
    pub not_null: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: DataType, not_null: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            not_null,
        }
    }
}

/// Ordered table definition plus primary key and an optional engine
/// clause (e.g. a ClickHouse MergeTree ORDER BY).
#[derive(Debug, Clone, Default)]
pub struct TableDef {
    pub rows: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub engine: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Default,
    Unique,
}

/// A named table constraint (PostgreSQL only).
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub definition: String,
}

/// Metadata tables that probe as existing unconditionally.
fn metadata_tables(dialect: DialectName) -> &'static [&'static str] {
    match dialect {
        DialectName::Sqlite => &["sqlite_master", "sqlite_sequence"],
        DialectName::Mysql | DialectName::Postgres => &["information_schema.tables"],
        DialectName::Mssql => &["sys.tables"],
        DialectName::Clickhouse => &["system.tables"],
        DialectName::Cassandra => &["system_schema.tables"],
    }
}

/// Existence probe; the second element flags the keyspace-qualified
/// Cassandra form.
fn exists_query(dialect: &dyn Dialect) -> (&'static str, bool) {
    match dialect.name() {
        DialectName::Sqlite => (
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = $1",
            false,
        ),
        DialectName::Mysql => (
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = $1",
            false,
        ),
        DialectName::Postgres => (
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
            false,
        ),
        DialectName::Mssql => ("SELECT name FROM sys.tables WHERE name = $1", false),
        DialectName::Clickhouse => (
            "SELECT name FROM system.tables \
             WHERE database = currentDatabase() AND name = $1",
            false,
        ),
        DialectName::Cassandra => (
            "SELECT table_name FROM system_schema.tables \
             WHERE keyspace_name = $1 AND table_name = $2",
            true,
        ),
    }
}

fn filter_for(ty: DataType) -> ColumnFilter {
    match ty {
        DataType::Id | DataType::Int | DataType::BigInt => ColumnFilter::Id,
        DataType::Uuid => ColumnFilter::Uuid,
        DataType::String32 => ColumnFilter::Str {
            max_len: 32,
            allow_likes: true,
        },
        DataType::String36 => ColumnFilter::Str {
            max_len: 36,
            allow_likes: true,
        },
        DataType::String64 => ColumnFilter::Str {
            max_len: 64,
            allow_likes: true,
        },
        DataType::String128 => ColumnFilter::Str {
            max_len: 128,
            allow_likes: true,
        },
        DataType::String256 => ColumnFilter::Str {
            max_len: 256,
            allow_likes: true,
        },
        DataType::String | DataType::LongText => ColumnFilter::Str {
            max_len: 0,
            allow_likes: true,
        },
        DataType::DateTime | DataType::DateTime6 => ColumnFilter::Time,
        DataType::Boolean => ColumnFilter::Bool,
        _ => ColumnFilter::None,
    }
}

fn synthesize_create_table(dialect: &dyn Dialect, name: &str, def: &TableDef) -> String {
    let mut columns = Vec::with_capacity(def.rows.len());
    let mut inline_pk = false;
    for col in &def.rows {
        let native = dialect.get_type(col.ty);
        if native.is_empty() {
            debug!(target: "dbmux::schema", "dropping column {} ({:?}) unsupported on {}", col.name, col.ty, dialect.name());
            continue;
        }
        let mut part = format!("{} {native}", col.name);
        if native.contains("PRIMARY KEY") && def.primary_key == vec![col.name.clone()] {
            inline_pk = true;
        }
        if col.not_null {
            let not_null = dialect.get_type(DataType::NotNull);
            if !not_null.is_empty() && !native.contains("PRIMARY KEY") {
                part.push(' ');
                part.push_str(not_null);
            }
        }
        columns.push(part);
    }
    if !def.primary_key.is_empty() && !inline_pk {
        columns.push(format!("PRIMARY KEY ({})", def.primary_key.join(", ")));
    }

    let mut sql = format!(
        "CREATE TABLE {} ({})",
        dialect.table(name),
        columns.join(", ")
    );
    let engine = def
        .engine
        .clone()
        .unwrap_or_else(|| dialect.get_type(DataType::Engine).to_string());
    if !engine.is_empty() {
        sql.push(' ');
        sql.push_str(&engine);
    }
    sql
}

impl Database {
    /// Whether `name` exists. The metadata tables used for the probes
    /// report true unconditionally.
    pub async fn table_exists(&self, name: &str) -> Result<bool, DbError> {
        let dialect = self.dialect().clone();
        if metadata_tables(dialect.name())
            .iter()
            .any(|m| m.eq_ignore_ascii_case(name))
        {
            return Ok(true);
        }
        let session = self.session(SessionCtx::new());
        let (sql, needs_keyspace) = exists_query(dialect.as_ref());
        let sql = rewrite_placeholders(sql, dialect.placeholder_style());
        let args = if needs_keyspace {
            vec![
                SqlValue::Text(dialect.schema()),
                SqlValue::Text(name.to_string()),
            ]
        } else {
            vec![SqlValue::Text(name.to_string())]
        };
        let row = session.query_row(&sql, &args).await?;
        Ok(row.is_some())
    }

    /// Idempotently create `name`. With a non-empty `ddl` template, the
    /// template is patched (`{table}`, `{$token}`) and executed;
    /// otherwise the statement is synthesized from `def`. Either way the
    /// table's query builder is registered, one filter function per
    /// column.
    pub async fn create_table(
        &self,
        name: &str,
        def: &TableDef,
        ddl: &str,
    ) -> Result<(), DbError> {
        let register = || {
            let mut builder = TableQueryBuilder::new(name);
            for col in &def.rows {
                builder = builder.with_column(col.name.clone(), filter_for(col.ty));
            }
            self.register_table_builder(builder);
        };

        if self.table_exists(name).await? {
            register();
            return Ok(());
        }

        let dialect = self.dialect().clone();
        let sql = if ddl.is_empty() {
            synthesize_create_table(dialect.as_ref(), name, def)
        } else {
            default_create_query_patch(name, ddl, dialect.as_ref())
        };
        let session = self.session(SessionCtx::new());
        session.exec(&sql, &[]).await?;
        register();
        Ok(())
    }

    /// Drop or truncate `name` depending on `use_truncate` (TRUNCATE
    /// cascades on PostgreSQL; SQLite has no TRUNCATE and deletes).
    pub async fn drop_table(&self, name: &str, use_truncate: bool) -> Result<(), DbError> {
        let dialect = self.dialect().clone();
        let table = dialect.table(name);
        let sql = if use_truncate {
            match dialect.name() {
                DialectName::Sqlite => format!("DELETE FROM {table}"),
                DialectName::Postgres => format!("TRUNCATE TABLE {table} CASCADE"),
                _ => format!("TRUNCATE TABLE {table}"),
            }
        } else {
            format!("DROP TABLE IF EXISTS {table}")
        };
        let session = self.session(SessionCtx::new());
        session.exec(&sql, &[]).await?;
        if !use_truncate {
            self.unregister_table_builder(name);
        }
        Ok(())
    }

    /// Drop or truncate `name` following the connection's
    /// prefer-truncate flag.
    pub async fn clear_table(&self, name: &str) -> Result<(), DbError> {
        let use_truncate = self.config().prefer_truncate;
        self.drop_table(name, use_truncate).await
    }

    /// Idempotently create an index. ClickHouse and Cassandra report
    /// success without doing anything.
    pub async fn create_index(
        &self,
        name: &str,
        table: &str,
        columns: &[&str],
        kind: IndexKind,
    ) -> Result<(), DbError> {
        let dialect = self.dialect().clone();
        let session = self.session(SessionCtx::new());
        let unique = if kind == IndexKind::Unique {
            "UNIQUE "
        } else {
            ""
        };
        let column_list = columns.join(", ");
        let table_ref = dialect.table(table);
        match dialect.name() {
            DialectName::Clickhouse | DialectName::Cassandra => Ok(()),
            DialectName::Sqlite | DialectName::Postgres => {
                let sql = format!(
                    "CREATE {unique}INDEX IF NOT EXISTS {name} ON {table_ref} ({column_list})"
                );
                session.exec(&sql, &[]).await?;
                Ok(())
            }
            DialectName::Mysql => {
                let probe = rewrite_placeholders(
                    "SELECT 1 FROM information_schema.statistics \
                     WHERE table_schema = DATABASE() AND table_name = $1 AND index_name = $2",
                    dialect.placeholder_style(),
                );
                let found = session
                    .query_row(
                        &probe,
                        &[
                            SqlValue::Text(table.to_string()),
                            SqlValue::Text(name.to_string()),
                        ],
                    )
                    .await?;
                if found.is_none() {
                    let sql =
                        format!("CREATE {unique}INDEX {name} ON {table_ref} ({column_list})");
                    session.exec(&sql, &[]).await?;
                }
                Ok(())
            }
            DialectName::Mssql => {
                let probe = rewrite_placeholders(
                    "SELECT 1 FROM sys.indexes WHERE name = $1",
                    dialect.placeholder_style(),
                );
                let found = session
                    .query_row(&probe, &[SqlValue::Text(name.to_string())])
                    .await?;
                if found.is_none() {
                    let sql =
                        format!("CREATE {unique}INDEX {name} ON {table_ref} ({column_list})");
                    session.exec(&sql, &[]).await?;
                }
                Ok(())
            }
        }
    }

    /// Idempotently drop an index; no-op success on ClickHouse and
    /// Cassandra.
    pub async fn drop_index(&self, name: &str, table: &str) -> Result<(), DbError> {
        let dialect = self.dialect().clone();
        let session = self.session(SessionCtx::new());
        let table_ref = dialect.table(table);
        match dialect.name() {
            DialectName::Clickhouse | DialectName::Cassandra => Ok(()),
            DialectName::Sqlite | DialectName::Postgres => {
                session
                    .exec(&format!("DROP INDEX IF EXISTS {name}"), &[])
                    .await?;
                Ok(())
            }
            DialectName::Mysql => {
                let probe = rewrite_placeholders(
                    "SELECT 1 FROM information_schema.statistics \
                     WHERE table_schema = DATABASE() AND table_name = $1 AND index_name = $2",
                    dialect.placeholder_style(),
                );
                let found = session
                    .query_row(
                        &probe,
                        &[
                            SqlValue::Text(table.to_string()),
                            SqlValue::Text(name.to_string()),
                        ],
                    )
                    .await?;
                if found.is_some() {
                    session
                        .exec(&format!("DROP INDEX {name} ON {table_ref}"), &[])
                        .await?;
                }
                Ok(())
            }
            DialectName::Mssql => {
                let probe = rewrite_placeholders(
                    "SELECT 1 FROM sys.indexes WHERE name = $1",
                    dialect.placeholder_style(),
                );
                let found = session
                    .query_row(&probe, &[SqlValue::Text(name.to_string())])
                    .await?;
                if found.is_some() {
                    session
                        .exec(&format!("DROP INDEX {name} ON {table_ref}"), &[])
                        .await?;
                }
                Ok(())
            }
        }
    }

    /// Create a sequence. Native where the backend has sequences,
    /// emulated on SQLite with a single-row counter table, and a no-op
    /// success on ClickHouse and Cassandra.
    pub async fn create_sequence(&self, name: &str) -> Result<(), DbError> {
        let dialect = self.dialect().clone();
        let session = self.session(SessionCtx::new());
        let seq = dialect.table(name);
        match dialect.sequence_support() {
            SequenceSupport::Native => {
                let sql = match dialect.name() {
                    DialectName::Mssql => format!(
                        "IF NOT EXISTS (SELECT 1 FROM sys.sequences WHERE name = {}) \
                         CREATE SEQUENCE {seq} START WITH 1",
                        dialect.encode_string(name)
                    ),
                    _ => format!("CREATE SEQUENCE IF NOT EXISTS {seq}"),
                };
                session.exec(&sql, &[]).await?;
                Ok(())
            }
            SequenceSupport::Emulated => {
                session
                    .exec(
                        &format!("CREATE TABLE IF NOT EXISTS {seq} (value INTEGER NOT NULL)"),
                        &[],
                    )
                    .await?;
                session
                    .exec(
                        &format!(
                            "INSERT INTO {seq} (value) SELECT 1 \
                             WHERE NOT EXISTS (SELECT 1 FROM {seq})"
                        ),
                        &[],
                    )
                    .await?;
                Ok(())
            }
            SequenceSupport::Unsupported => Ok(()),
        }
    }

    /// Drop a sequence; no-op success where sequences are unsupported.
    pub async fn drop_sequence(&self, name: &str) -> Result<(), DbError> {
        let dialect = self.dialect().clone();
        let session = self.session(SessionCtx::new());
        let seq = dialect.table(name);
        match dialect.sequence_support() {
            SequenceSupport::Native => {
                let sql = match dialect.name() {
                    DialectName::Mssql => format!(
                        "IF EXISTS (SELECT 1 FROM sys.sequences WHERE name = {}) \
                         DROP SEQUENCE {seq}",
                        dialect.encode_string(name)
                    ),
                    _ => format!("DROP SEQUENCE IF EXISTS {seq}"),
                };
                session.exec(&sql, &[]).await?;
                Ok(())
            }
            SequenceSupport::Emulated => {
                session
                    .exec(&format!("DROP TABLE IF EXISTS {seq}"), &[])
                    .await?;
                Ok(())
            }
            SequenceSupport::Unsupported => Ok(()),
        }
    }

    /// Read table constraints. PostgreSQL only; every other dialect
    /// returns an empty list.
    pub async fn get_constraints(&self, table: &str) -> Result<Vec<Constraint>, DbError> {
        let dialect = self.dialect().clone();
        if dialect.name() != DialectName::Postgres {
            return Ok(Vec::new());
        }
        let session = self.session(SessionCtx::new());
        let sql = rewrite_placeholders(
            "SELECT conname, pg_get_constraintdef(oid) FROM pg_constraint \
             WHERE conrelid = CAST($1 AS regclass)",
            dialect.placeholder_style(),
        );
        let mut rows = session
            .query(&sql, &[SqlValue::Text(dialect.table(table))])
            .await?;
        let mut constraints = Vec::new();
        while let Some(row) = rows.next_row()? {
            constraints.push(Constraint {
                name: row.get_string(0)?,
                definition: row.get_string(1)?,
            });
        }
        rows.close()?;
        Ok(constraints)
    }

    /// Add a constraint; a silent no-op outside PostgreSQL.
    pub async fn add_constraint(
        &self,
        table: &str,
        name: &str,
        definition: &str,
    ) -> Result<(), DbError> {
        let dialect = self.dialect().clone();
        if dialect.name() != DialectName::Postgres {
            return Ok(());
        }
        let session = self.session(SessionCtx::new());
        let sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {name} {definition}",
            dialect.table(table)
        );
        session.exec(&sql, &[]).await?;
        Ok(())
    }

    /// Drop a constraint; a silent no-op outside PostgreSQL.
    pub async fn drop_constraint(&self, table: &str, name: &str) -> Result<(), DbError> {
        let dialect = self.dialect().clone();
        if dialect.name() != DialectName::Postgres {
            return Ok(());
        }
        let session = self.session(SessionCtx::new());
        let sql = format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {name}",
            dialect.table(table)
        );
        session.exec(&sql, &[]).await?;
        Ok(())
    }
}
