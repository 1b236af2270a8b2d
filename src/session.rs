//! Per-call session surface: latency counters, cancellation, the
//! timing/logging decorator over any querier, and the transact retry
//! loop.
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{Config, Logger};
use crate::database::Database;
use crate::dialect::{Dialect, DialectName, SequenceSupport};
use crate::error::DbError;
use crate::querier::{Accessor, ExecResult, Querier, Statement};
use crate::rows::{EmptyRows, Row, Rows, dump};
use crate::value::SqlValue;

/// Retry budget for dialect-classified retriable errors in [`Session::transact`].
pub const MAX_RETRIES: u32 = 10;

/// Latency attribution phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Begin,
    Prepare,
    Exec,
    Query,
    Dealloc,
    Commit,
}

/// Six atomic nanosecond counters, accumulated by the decorator layer so
/// latency attribution survives retries. Release/acquire ordering; read
/// the aggregate only after joining outstanding work.
#[derive(Debug, Default)]
pub struct CallCounters {
    begin: AtomicI64,
    prepare: AtomicI64,
    exec: AtomicI64,
    query: AtomicI64,
    dealloc: AtomicI64,
    commit: AtomicI64,
}

/// Point-in-time snapshot of [`CallCounters`], in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallTimings {
    pub begin_ns: i64,
    pub prepare_ns: i64,
    pub exec_ns: i64,
    pub query_ns: i64,
    pub dealloc_ns: i64,
    pub commit_ns: i64,
}

impl CallCounters {
    pub fn add(&self, phase: Phase, ns: i64) {
        let counter = match phase {
            Phase::Begin => &self.begin,
            Phase::Prepare => &self.prepare,
            Phase::Exec => &self.exec,
            Phase::Query => &self.query,
            Phase::Dealloc => &self.dealloc,
            Phase::Commit => &self.commit,
        };
        counter.fetch_add(ns, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> CallTimings {
        CallTimings {
            begin_ns: self.begin.load(Ordering::Acquire),
            prepare_ns: self.prepare.load(Ordering::Acquire),
            exec_ns: self.exec.load(Ordering::Acquire),
            query_ns: self.query.load(Ordering::Acquire),
            dealloc_ns: self.dealloc.load(Ordering::Acquire),
            commit_ns: self.commit.load(Ordering::Acquire),
        }
    }
}

/// Per-call context: cancellation token plus the latency counters.
#[derive(Debug, Clone, Default)]
pub struct SessionCtx {
    cancel: CancellationToken,
    counters: Arc<CallCounters>,
}

impl SessionCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            counters: Arc::default(),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn timings(&self) -> CallTimings {
        self.counters.snapshot()
    }

    pub(crate) fn counters(&self) -> &CallCounters {
        &self.counters
    }
}

/// A session: one dialect, one connection pool, one call context. All
/// statement traffic goes through the decorator here, which accounts
/// latency, emits the four log streams, and applies dry-run.
pub struct Session {
    pub(crate) db: Database,
    pub(crate) ctx: SessionCtx,
}

impl Session {
    pub(crate) fn new(db: Database, ctx: SessionCtx) -> Self {
        Self { db, ctx }
    }

    pub fn ctx(&self) -> &SessionCtx {
        &self.ctx
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        self.db.dialect()
    }

    pub(crate) fn config(&self) -> &Config {
        self.db.config()
    }

    pub(crate) fn accessor(&self) -> &Arc<dyn Accessor> {
        self.db.accessor()
    }

    fn log(&self, logger: &Option<Arc<dyn Logger>>, msg: impl FnOnce() -> String) {
        if let Some(logger) = logger {
            logger.log(&msg());
        }
    }

    async fn with_cancel<T>(
        &self,
        fut: impl Future<Output = Result<T, DbError>>,
    ) -> Result<T, DbError> {
        tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => Err(DbError::Cancelled),
            result = fut => result,
        }
    }

    fn check_packet_size(&self, sql: &str) -> Result<(), DbError> {
        let limit = self.config().max_packet_size;
        if limit > 0 && sql.len() > limit {
            return Err(DbError::BadInput(format!(
                "statement of {} bytes exceeds max packet size {limit}",
                sql.len()
            )));
        }
        Ok(())
    }

    /// Decorated exec against an arbitrary querier (pool or transaction).
    pub(crate) async fn run_exec(
        &self,
        q: &dyn Querier,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<ExecResult, DbError> {
        self.check_packet_size(sql)?;
        let cfg = self.config();
        self.log(&cfg.query_logger, || format!("exec: {sql}; args={args:?}"));
        if cfg.dry_run {
            return Ok(ExecResult::default());
        }
        let started = Instant::now();
        let result = self.with_cancel(q.exec(sql, args)).await;
        let elapsed = started.elapsed();
        self.ctx
            .counters()
            .add(Phase::Exec, elapsed.as_nanos() as i64);
        self.log(&cfg.query_time_logger, || {
            format!("exec took {elapsed:?}: {sql}")
        });
        result
    }

    /// Decorated query. In explain mode the plan is routed to the explain
    /// logger and the result channel stays empty.
    pub(crate) async fn run_query(
        &self,
        q: &dyn Querier,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Box<dyn Rows>, DbError> {
        self.check_packet_size(sql)?;
        let cfg = self.config();
        self.log(&cfg.query_logger, || format!("query: {sql}; args={args:?}"));

        if cfg.explain_logger.is_some() {
            return self.run_explain(q, sql, args).await;
        }

        let started = Instant::now();
        let result = self.with_cancel(q.query(sql, args)).await;
        let elapsed = started.elapsed();
        self.ctx
            .counters()
            .add(Phase::Query, elapsed.as_nanos() as i64);
        self.log(&cfg.query_time_logger, || {
            format!("query took {elapsed:?}: {sql}")
        });

        let rows = result?;
        if let Some(logger) = &cfg.read_rows_logger {
            return Ok(Box::new(LoggingRows {
                inner: rows,
                logger: logger.clone(),
            }));
        }
        Ok(rows)
    }

    pub(crate) async fn run_query_row(
        &self,
        q: &dyn Querier,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Option<Row>, DbError> {
        self.check_packet_size(sql)?;
        let cfg = self.config();
        self.log(&cfg.query_logger, || {
            format!("query row: {sql}; args={args:?}")
        });
        let started = Instant::now();
        let result = self.with_cancel(q.query_row(sql, args)).await;
        let elapsed = started.elapsed();
        self.ctx
            .counters()
            .add(Phase::Query, elapsed.as_nanos() as i64);
        self.log(&cfg.query_time_logger, || {
            format!("query row took {elapsed:?}: {sql}")
        });
        result
    }

    async fn run_explain(
        &self,
        q: &dyn Querier,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Box<dyn Rows>, DbError> {
        let prefix = match self.dialect().name() {
            DialectName::Sqlite => "EXPLAIN QUERY PLAN",
            DialectName::Mysql | DialectName::Postgres | DialectName::Clickhouse => "EXPLAIN",
            DialectName::Mssql | DialectName::Cassandra => {
                return Err(DbError::NotSupported(format!(
                    "explain on {}",
                    self.dialect().name()
                )));
            }
        };
        let explain_sql = format!("{prefix} {sql}");
        let started = Instant::now();
        let mut rows = self.with_cancel(q.query(&explain_sql, args)).await?;
        self.ctx
            .counters()
            .add(Phase::Query, started.elapsed().as_nanos() as i64);
        let plan = dump(rows.as_mut())?;
        if let Some(logger) = &self.config().explain_logger {
            for line in plan.iter().skip(1) {
                logger.log(&line.join(" "));
            }
        }
        Ok(Box::new(EmptyRows))
    }

    /// Execute a statement against the session's pool.
    pub async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
        self.run_exec(self.accessor().as_querier(), sql, args).await
    }

    pub async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError> {
        self.run_query(self.accessor().as_querier(), sql, args)
            .await
    }

    pub async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError> {
        self.run_query_row(self.accessor().as_querier(), sql, args)
            .await
    }

    pub async fn prepare(&self, sql: &str) -> Result<Statement, DbError> {
        let started = Instant::now();
        let result = self
            .with_cancel(self.accessor().as_querier().prepare(sql))
            .await;
        self.ctx
            .counters()
            .add(Phase::Prepare, started.elapsed().as_nanos() as i64);
        result
    }

    /// Release a prepared statement, attributing the teardown latency.
    pub fn dealloc(&self, stmt: Statement) {
        let started = Instant::now();
        drop(stmt);
        self.ctx
            .counters()
            .add(Phase::Dealloc, started.elapsed().as_nanos() as i64);
    }

    /// Run `f` inside begin/commit with the dialect-directed retry and
    /// rollback policy. Retriable errors are absorbed up to
    /// [`MAX_RETRIES`] with a fresh transaction each time. On dialects
    /// without transactions the closure runs against the pool querier.
    pub async fn transact<T, F>(&self, mut f: F) -> Result<T, DbError>
    where
        F: for<'t> FnMut(&'t Tx<'t>) -> BoxFuture<'t, Result<T, DbError>>,
    {
        if !self.dialect().supports_transactions() {
            let tx = Tx {
                q: self.accessor().as_querier(),
                session: self,
            };
            return f(&tx).await;
        }

        let mut attempt = 0u32;
        loop {
            let started = Instant::now();
            let tx_box = self.with_cancel(self.accessor().begin()).await?;
            self.ctx
                .counters()
                .add(Phase::Begin, started.elapsed().as_nanos() as i64);

            let tx = Tx {
                q: tx_box.as_querier(),
                session: self,
            };
            let outcome = f(&tx).await;
            drop(tx);

            match outcome {
                Ok(value) => {
                    let started = Instant::now();
                    let committed = tx_box.commit().await;
                    self.ctx
                        .counters()
                        .add(Phase::Commit, started.elapsed().as_nanos() as i64);
                    match committed {
                        Ok(()) => return Ok(value),
                        Err(err) if self.ctx.is_cancelled() && is_tx_done(&err) => {
                            return Err(DbError::Cancelled);
                        }
                        Err(err) if self.is_retriable(&err) && attempt < MAX_RETRIES => {
                            attempt += 1;
                            debug!(target: "dbmux::tx", "retrying after commit conflict ({attempt}/{MAX_RETRIES}): {err}");
                        }
                        Err(err) => return Err(err),
                    }
                }
                Err(err) => {
                    if self.dialect().can_rollback(&err) {
                        let started = Instant::now();
                        if let Err(rb) = tx_box.rollback().await {
                            debug!(target: "dbmux::tx", "rollback failed: {rb}");
                        }
                        self.ctx
                            .counters()
                            .add(Phase::Commit, started.elapsed().as_nanos() as i64);
                    }
                    if self.is_retriable(&err) && attempt < MAX_RETRIES {
                        attempt += 1;
                        debug!(target: "dbmux::tx", "retrying after conflict ({attempt}/{MAX_RETRIES}): {err}");
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    fn is_retriable(&self, err: &DbError) -> bool {
        matches!(err, DbError::Retriable(_)) || self.dialect().is_retriable(err)
    }

    /// Next value of a named sequence. Native on MySQL/MariaDB,
    /// PostgreSQL and MSSQL. On SQLite the sequence is a single-row
    /// counter table updated inside a transaction; the value returned is
    /// the stored one, i.e. pre-increment, which deliberately diverges
    /// from NEXTVAL's post-increment semantics elsewhere.
    pub async fn next_val(&self, sequence: &str) -> Result<i64, DbError> {
        match self.dialect().sequence_support() {
            SequenceSupport::Native => {
                let sql = match self.dialect().name() {
                    DialectName::Postgres => {
                        format!("SELECT nextval('{}')", self.dialect().table(sequence))
                    }
                    _ => format!("SELECT NEXT VALUE FOR {}", self.dialect().table(sequence)),
                };
                let row = self
                    .query_row(&sql, &[])
                    .await?
                    .ok_or_else(|| DbError::backend("sequence query returned no row"))?;
                row.get_i64(0)
            }
            SequenceSupport::Emulated => {
                let table = self.dialect().table(sequence);
                let select = format!("SELECT value FROM {table} LIMIT 1");
                let update = format!("UPDATE {table} SET value = value + 1");
                self.transact(move |tx| {
                    let select = select.clone();
                    let update = update.clone();
                    Box::pin(async move {
                        let row = tx.query_row(&select, &[]).await?.ok_or_else(|| {
                            DbError::backend("sequence emulation table is empty")
                        })?;
                        let value = row.get_i64(0)?;
                        tx.exec(&update, &[]).await?;
                        Ok(value)
                    })
                })
                .await
            }
            SequenceSupport::Unsupported => Err(DbError::NotSupported(format!(
                "sequences on {}",
                self.dialect().name()
            ))),
        }
    }
}

/// The querier handed to a [`Session::transact`] closure. Statements run
/// through the same decorator as pool-level calls, against the
/// transaction's querier.
pub struct Tx<'t> {
    q: &'t dyn Querier,
    session: &'t Session,
}

impl Tx<'_> {
    pub async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
        self.session.run_exec(self.q, sql, args).await
    }

    pub async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError> {
        self.session.run_query(self.q, sql, args).await
    }

    pub async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError> {
        self.session.run_query_row(self.q, sql, args).await
    }

    pub async fn prepare(&self, sql: &str) -> Result<Statement, DbError> {
        let started = Instant::now();
        let result = self.session.with_cancel(self.q.prepare(sql)).await;
        self.session
            .ctx
            .counters()
            .add(Phase::Prepare, started.elapsed().as_nanos() as i64);
        result
    }
}

/// Commit errors reported after the server already finished the
/// transaction, used for the cancelled-commit rewrite.
fn is_tx_done(err: &DbError) -> bool {
    match err {
        DbError::Backend { message, .. } => {
            let lower = message.to_ascii_lowercase();
            lower.contains("transaction")
                && (lower.contains("done") || lower.contains("aborted") || lower.contains("closed"))
        }
        _ => false,
    }
}

#[derive(Debug)]
struct LoggingRows {
    inner: Box<dyn Rows>,
    logger: Arc<dyn Logger>,
}

impl Rows for LoggingRows {
    fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    fn next_row(&mut self) -> Result<Option<Row>, DbError> {
        let row = self.inner.next_row()?;
        if let Some(row) = &row {
            self.logger.log(&format!("row: {row:?}"));
        }
        Ok(row)
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use crate::config::Config;
    use crate::dialect_clickhouse::ClickhouseDialect;
    use crate::dialect_mssql::MssqlDialect;
    use crate::dialect_postgres::PostgresDialect;
    use crate::dialect_sqlite::SqliteDialect;
    use crate::surrogate::{SurrogateAccessor, SurrogateOutcome};

    fn session_with(
        dialect: Arc<dyn Dialect>,
        cfg: Config,
        accessor: SurrogateAccessor,
    ) -> Session {
        Database::with_accessor(cfg, dialect, Arc::new(accessor)).session(SessionCtx::new())
    }

    #[test]
    fn counters_accumulate() {
        let counters = CallCounters::default();
        counters.add(Phase::Exec, 100);
        counters.add(Phase::Exec, 50);
        counters.add(Phase::Commit, 7);
        let snap = counters.snapshot();
        assert_eq!(snap.exec_ns, 150);
        assert_eq!(snap.commit_ns, 7);
        assert_eq!(snap.begin_ns, 0);
    }

    #[test]
    fn tx_done_detection() {
        assert!(is_tx_done(&DbError::backend(
            "transaction has already been aborted"
        )));
        assert!(is_tx_done(&DbError::backend("Transaction is done")));
        assert!(!is_tx_done(&DbError::backend("syntax error")));
        assert!(!is_tx_done(&DbError::Cancelled));
    }

    #[tokio::test]
    async fn transact_retries_until_success_and_commits_once() {
        let failures = Arc::new(AtomicUsize::new(0));
        let fail_counter = failures.clone();
        let accessor = SurrogateAccessor::with_handler(move |sql, _| {
            if sql.starts_with("INSERT") && fail_counter.fetch_add(1, Ordering::SeqCst) < 2 {
                SurrogateOutcome::Fail(DbError::backend_with_code("40P01", "deadlock detected"))
            } else {
                SurrogateOutcome::Exec(crate::querier::ExecResult::default())
            }
        });
        let log = accessor.clone();
        let session = session_with(
            Arc::new(PostgresDialect::default()),
            Config::new("postgres://localhost/x"),
            accessor,
        );

        session
            .transact(|tx| {
                Box::pin(async move {
                    tx.exec("INSERT INTO t (id) VALUES ($1)", &[SqlValue::Int(1)])
                        .await?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        let statements = log.statements();
        let commits = statements.iter().filter(|s| s.as_str() == "COMMIT").count();
        let rollbacks = statements
            .iter()
            .filter(|s| s.as_str() == "ROLLBACK")
            .count();
        let begins = statements.iter().filter(|s| s.as_str() == "BEGIN").count();
        assert_eq!(commits, 1);
        assert_eq!(rollbacks, 2);
        assert_eq!(begins, 3);
    }

    #[tokio::test]
    async fn transact_gives_up_on_non_retriable_errors() {
        let accessor = SurrogateAccessor::with_handler(|sql, _| {
            if sql.starts_with("INSERT") {
                SurrogateOutcome::Fail(DbError::backend_with_code("23505", "unique violation"))
            } else {
                SurrogateOutcome::Exec(crate::querier::ExecResult::default())
            }
        });
        let log = accessor.clone();
        let session = session_with(
            Arc::new(PostgresDialect::default()),
            Config::new("postgres://localhost/x"),
            accessor,
        );

        let err = session
            .transact(|tx| {
                Box::pin(async move {
                    tx.exec("INSERT INTO t (id) VALUES ($1)", &[SqlValue::Int(1)])
                        .await?;
                    Ok(())
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.backend_code(), Some("23505"));
        assert_eq!(
            log.statements(),
            vec!["BEGIN", "INSERT INTO t (id) VALUES ($1)", "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn mssql_deadlock_victim_skips_rollback() {
        let failures = Arc::new(AtomicUsize::new(0));
        let fail_counter = failures.clone();
        let accessor = SurrogateAccessor::with_handler(move |sql, _| {
            if sql.starts_with("INSERT") && fail_counter.fetch_add(1, Ordering::SeqCst) < 1 {
                SurrogateOutcome::Fail(DbError::backend_with_code("1205", "deadlock victim"))
            } else {
                SurrogateOutcome::Exec(crate::querier::ExecResult::default())
            }
        });
        let log = accessor.clone();
        let session = session_with(
            Arc::new(MssqlDialect::default()),
            Config::new("mssql://localhost/x"),
            accessor,
        );

        session
            .transact(|tx| {
                Box::pin(async move {
                    tx.exec("INSERT INTO t (id) VALUES (@p1)", &[SqlValue::Int(1)])
                        .await?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        let statements = log.statements();
        assert!(!statements.iter().any(|s| s == "ROLLBACK"));
        assert_eq!(statements.iter().filter(|s| s.as_str() == "COMMIT").count(), 1);
    }

    #[tokio::test]
    async fn non_transactional_dialects_run_inline() {
        let accessor = SurrogateAccessor::new();
        let log = accessor.clone();
        let session = session_with(
            Arc::new(ClickhouseDialect),
            Config::new("clickhouse://localhost/x"),
            accessor,
        );
        session
            .transact(|tx| Box::pin(async move { tx.exec("INSERT INTO t VALUES (1)", &[]).await }))
            .await
            .unwrap();
        assert_eq!(log.statements(), vec!["INSERT INTO t VALUES (1)"]);
    }

    #[tokio::test]
    async fn dry_run_short_circuits_exec_but_not_query() {
        let accessor = SurrogateAccessor::with_handler(|_, _| SurrogateOutcome::Rows {
            columns: vec!["n".into()],
            rows: vec![vec![SqlValue::Int(1)]],
        });
        let log = accessor.clone();
        let session = session_with(
            Arc::new(SqliteDialect),
            Config::new("sqlite://x").with_dry_run(true),
            accessor,
        );

        let result = session.exec("DELETE FROM t", &[]).await.unwrap();
        assert_eq!(result.rows_affected, 0);
        let row = session.query_row("SELECT 1", &[]).await.unwrap();
        assert!(row.is_some());
        // only the query reached the backend
        assert_eq!(log.statements(), vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn cancelled_context_aborts_calls() {
        let accessor = SurrogateAccessor::new();
        let db = Database::with_accessor(
            Config::new("sqlite://x"),
            Arc::new(SqliteDialect),
            Arc::new(accessor),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let session = db.session(SessionCtx::with_cancel(cancel));
        let err = session.exec("DELETE FROM t", &[]).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn sqlite_sequence_emulation_is_pre_increment() {
        // single-row counter table behind the surrogate
        let counter = Arc::new(std::sync::Mutex::new(1i64));
        let state = counter.clone();
        let accessor = SurrogateAccessor::with_handler(move |sql, _| {
            if sql.starts_with("SELECT value FROM seq") {
                SurrogateOutcome::Rows {
                    columns: vec!["value".into()],
                    rows: vec![vec![SqlValue::Int(*state.lock().unwrap())]],
                }
            } else if sql.starts_with("UPDATE seq SET value = value + 1") {
                *state.lock().unwrap() += 1;
                SurrogateOutcome::Exec(crate::querier::ExecResult {
                    rows_affected: 1,
                    last_insert_id: None,
                })
            } else {
                SurrogateOutcome::Exec(crate::querier::ExecResult::default())
            }
        });
        let db = Database::with_accessor(
            Config::new("sqlite://x"),
            Arc::new(SqliteDialect),
            Arc::new(accessor),
        );
        db.create_sequence("seq").await.unwrap();
        let session = db.session(SessionCtx::new());
        let first = session.next_val("seq").await.unwrap();
        let second = session.next_val("seq").await.unwrap();
        assert!(first >= 1);
        assert_eq!(second, first + 1);
    }

    #[tokio::test]
    async fn unknown_table_issues_no_sql() {
        let accessor = SurrogateAccessor::new();
        let log = accessor.clone();
        let session = session_with(
            Arc::new(PostgresDialect::default()),
            Config::new("postgres://localhost/x"),
            accessor,
        );
        let err = session
            .select("no_such_table", &crate::select::SelectCtrl::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no_such_table"));
        assert!(log.statements().is_empty());
    }

    #[tokio::test]
    async fn exec_latency_lands_in_counters() {
        let accessor = SurrogateAccessor::new();
        let session = session_with(
            Arc::new(SqliteDialect),
            Config::new("sqlite://x"),
            accessor,
        );
        session.exec("DELETE FROM t", &[]).await.unwrap();
        let timings = session.ctx().timings();
        assert!(timings.exec_ns > 0);
        assert_eq!(timings.query_ns, 0);
    }
}
