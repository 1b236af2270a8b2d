//! MSSQL accessor over tiberius. One conversational connection guarded
//! by a mutex; transactions are driven with T-SQL statements on that
//! connection, so callers serialize (the transaction contract already
//! requires it).
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tiberius::{AuthMethod, Client, ColumnData, Config as TdsConfig, FromSql, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;
use url::Url;

use crate::config::ConnectionSettings;
use crate::error::DbError;
use crate::querier::{Accessor, ExecResult, PoolStats, Querier, Statement, Transaction, Transactor};
use crate::rows::{Row, Rows, SurrogateRows};
use crate::value::{SqlValue, format_vector};

type TdsClient = Client<Compat<TcpStream>>;
type SharedClient = Arc<tokio::sync::Mutex<Option<TdsClient>>>;

pub struct MssqlAccessor {
    client: SharedClient,
}

fn tds_error(err: tiberius::error::Error) -> DbError {
    match &err {
        tiberius::error::Error::Server(token) => {
            DbError::backend_with_code(token.code().to_string(), token.message().to_string())
        }
        other => DbError::backend(other.to_string()),
    }
}

impl MssqlAccessor {
    pub(crate) async fn connect(settings: &ConnectionSettings) -> Result<Self, DbError> {
        let url = Url::parse(&settings.cleaned_url)
            .map_err(|e| DbError::BadInput(format!("invalid mssql url: {e}")))?;
        let mut config = TdsConfig::new();
        config.host(url.host_str().unwrap_or("localhost"));
        config.port(url.port().unwrap_or(1433));
        if !url.username().is_empty() {
            config.authentication(AuthMethod::sql_server(
                url.username(),
                url.password().unwrap_or_default(),
            ));
        }
        if let Some(db) = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|db| !db.is_empty())
        {
            config.database(db);
        }
        config.trust_cert();

        debug!(target: "dbmux::mssql", "connecting to {}", config.get_addr());
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DbError::backend(format!("mssql tcp: {e}")))?;
        tcp.set_nodelay(true)
            .map_err(|e| DbError::backend(format!("mssql tcp: {e}")))?;
        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(tds_error)?;
        Ok(Self {
            client: Arc::new(tokio::sync::Mutex::new(Some(client))),
        })
    }
}

fn to_params(args: &[SqlValue]) -> Vec<Box<dyn ToSql>> {
    args.iter()
        .map(|arg| -> Box<dyn ToSql> {
            match arg {
                SqlValue::Null => Box::new(Option::<i64>::None),
                SqlValue::Bool(b) => Box::new(*b),
                SqlValue::Int(v) => Box::new(*v),
                SqlValue::Float(v) => Box::new(*v),
                SqlValue::Text(s) => Box::new(s.clone()),
                SqlValue::Bytes(b) => Box::new(b.clone()),
                SqlValue::Uuid(u) => Box::new(*u),
                SqlValue::Time(t) => Box::new(t.naive_utc()),
                SqlValue::Vector(v) => Box::new(format_vector(v)),
                SqlValue::IntList(vs) => Box::new(
                    vs.iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            }
        })
        .collect()
}

fn column_data_to_value(data: ColumnData<'static>) -> SqlValue {
    match data {
        ColumnData::U8(v) => v.map(|x| SqlValue::Int(x as i64)).unwrap_or(SqlValue::Null),
        ColumnData::I16(v) => v.map(|x| SqlValue::Int(x as i64)).unwrap_or(SqlValue::Null),
        ColumnData::I32(v) => v.map(|x| SqlValue::Int(x as i64)).unwrap_or(SqlValue::Null),
        ColumnData::I64(v) => v.map(SqlValue::Int).unwrap_or(SqlValue::Null),
        ColumnData::F32(v) => v
            .map(|x| SqlValue::Float(x as f64))
            .unwrap_or(SqlValue::Null),
        ColumnData::F64(v) => v.map(SqlValue::Float).unwrap_or(SqlValue::Null),
        ColumnData::Bit(v) => v.map(SqlValue::Bool).unwrap_or(SqlValue::Null),
        ColumnData::String(v) => v
            .map(|s| SqlValue::Text(s.into_owned()))
            .unwrap_or(SqlValue::Null),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid).unwrap_or(SqlValue::Null),
        ColumnData::Binary(v) => v
            .map(|b| SqlValue::Bytes(b.into_owned()))
            .unwrap_or(SqlValue::Null),
        ColumnData::Numeric(v) => v
            .map(|n| SqlValue::Text(n.to_string()))
            .unwrap_or(SqlValue::Null),
        other => match chrono::NaiveDateTime::from_sql(&other) {
            Ok(Some(naive)) => {
                SqlValue::Time(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
            }
            _ => SqlValue::Null,
        },
    }
}

fn rows_from(fetched: Vec<tiberius::Row>) -> Box<dyn Rows> {
    let columns: Vec<String> = fetched
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        })
        .unwrap_or_default();
    let values: Vec<Vec<SqlValue>> = fetched
        .into_iter()
        .map(|row| row.into_iter().map(column_data_to_value).collect())
        .collect();
    Box::new(SurrogateRows::new(
        columns.iter().map(|c| c.as_str()).collect(),
        values,
    ))
}

async fn run_exec(client: &SharedClient, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
    let params = to_params(args);
    let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut guard = client.lock().await;
    let conn = guard
        .as_mut()
        .ok_or_else(|| DbError::backend("mssql connection closed"))?;
    let result = conn.execute(sql, &refs).await.map_err(tds_error)?;
    Ok(ExecResult {
        rows_affected: result.total(),
        last_insert_id: None,
    })
}

async fn run_query(
    client: &SharedClient,
    sql: &str,
    args: &[SqlValue],
) -> Result<Box<dyn Rows>, DbError> {
    let params = to_params(args);
    let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut guard = client.lock().await;
    let conn = guard
        .as_mut()
        .ok_or_else(|| DbError::backend("mssql connection closed"))?;
    let stream = conn.query(sql, &refs).await.map_err(tds_error)?;
    let fetched = stream.into_first_result().await.map_err(tds_error)?;
    Ok(rows_from(fetched))
}

#[async_trait]
impl Querier for MssqlAccessor {
    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
        run_exec(&self.client, sql, args).await
    }

    async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query(sql, args).await?;
        rows.next_row()
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError> {
        run_query(&self.client, sql, args).await
    }

    async fn prepare(&self, sql: &str) -> Result<Statement, DbError> {
        // tiberius prepares behind the scenes (sp_prepexec)
        Ok(Statement {
            sql: sql.to_string(),
        })
    }
}

#[async_trait]
impl Transactor for MssqlAccessor {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        run_exec(&self.client, "BEGIN TRANSACTION", &[]).await?;
        Ok(Box::new(MssqlTransaction {
            client: self.client.clone(),
        }))
    }
}

#[async_trait]
impl Accessor for MssqlAccessor {
    async fn ping(&self) -> Result<(), DbError> {
        run_query(&self.client, "SELECT 1", &[]).await?;
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        PoolStats { open: 1, idle: 0 }
    }

    async fn close(&self) -> Result<(), DbError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.take() {
            client.close().await.map_err(tds_error)?;
        }
        Ok(())
    }

    fn as_querier(&self) -> &dyn Querier {
        self
    }
}

struct MssqlTransaction {
    client: SharedClient,
}

#[async_trait]
impl Querier for MssqlTransaction {
    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
        run_exec(&self.client, sql, args).await
    }

    async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query(sql, args).await?;
        rows.next_row()
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError> {
        run_query(&self.client, sql, args).await
    }

    async fn prepare(&self, sql: &str) -> Result<Statement, DbError> {
        Ok(Statement {
            sql: sql.to_string(),
        })
    }
}

#[async_trait]
impl Transaction for MssqlTransaction {
    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        run_exec(&self.client, "COMMIT TRANSACTION", &[]).await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        run_exec(
            &self.client,
            "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION",
            &[],
        )
        .await?;
        Ok(())
    }

    fn as_querier(&self) -> &dyn Querier {
        self
    }
}
