//! dbmux — a polyglot database access layer.
//!
//! One query/administration surface over six storage engines: SQLite,
//! MySQL/MariaDB, PostgreSQL, MSSQL, ClickHouse and Cassandra. The crate
//! is organized around four subsystems:
//!
//! - driver registry and connection lifecycle ([`registry`],
//!   [`database`], [`session`]);
//! - the dialect engine, a capability bundle of pure transforms per
//!   backend ([`dialect`] and the `dialect_*` modules);
//! - the structured filter compiler and statement builders ([`filter`],
//!   [`select`], [`builders`]);
//! - the multi-source cursor-paged search engine ([`search`],
//!   [`page_token`]).
//!
//! ```no_run
//! use dbmux::{Config, Database, SelectCtrl, SessionCtx};
//!
//! # async fn demo() -> Result<(), dbmux::DbError> {
//! let db = Database::open(Config::new("postgres://user@localhost/bench")).await?;
//! let session = db.session(SessionCtx::new());
//! let rows = session
//!     .select(
//!         "jobs",
//!         &SelectCtrl::new()
//!             .with_fields(["id", "state"])
//!             .with_cond("state", vec!["ne(failed)".into()])
//!             .with_order(["asc(id)"])
//!             .with_page(100, 0),
//!     )
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod backend_clickhouse;
pub mod backend_mssql;
pub mod backend_sqlx;
pub mod builders;
pub mod config;
pub mod database;
pub mod dialect;
pub mod dialect_cassandra;
pub mod dialect_clickhouse;
pub mod dialect_mssql;
pub mod dialect_mysql;
pub mod dialect_postgres;
pub mod dialect_sqlite;
pub mod error;
pub mod filter;
pub mod info;
pub mod page_token;
pub mod querier;
pub mod registry;
pub mod rows;
pub mod sanitize;
pub mod schema;
pub mod search;
pub mod select;
pub mod session;
pub mod surrogate;
pub mod value;

pub use config::{Config, ConnectionSettings, Logger, TracingLogger};
pub use database::{Database, cassandra_database};
pub use dialect::{DataType, Dialect, DialectName, Recommendation};
pub use error::DbError;
pub use filter::{ColumnFilter, IS_NOT_NULL, IS_NULL};
pub use page_token::PageToken;
pub use querier::{Accessor, ExecResult, PoolStats, Querier, Statement, Transaction, Transactor};
pub use rows::{CountRows, EmptyRows, Row, Rows, SurrogateRows};
pub use schema::{ColumnDef, Constraint, IndexKind, TableDef};
pub use search::{SearchPage, SearchRequest, SearchRow, SearchSource, search_paged};
pub use select::{OrderSpec, Page, SelectCtrl, TableQueryBuilder, UpdateCtrl};
pub use session::{CallTimings, Session, SessionCtx, Tx};
pub use value::SqlValue;
