//! ClickHouse accessor over the HTTP interface. Arbitrary user SQL with
//! dynamically-shaped results needs the raw interface; responses are
//! requested as `FORMAT JSONCompact` so values keep their types.
use async_trait::async_trait;
use serde_json::Value as Json;
use tracing::debug;
use url::Url;

use crate::config::ConnectionSettings;
use crate::dialect::Dialect;
use crate::dialect_clickhouse::ClickhouseDialect;
use crate::error::DbError;
use crate::querier::{Accessor, ExecResult, PoolStats, Querier, Statement, Transaction, Transactor};
use crate::rows::{Row, Rows, SurrogateRows};
use crate::value::{SqlValue, sqlf};

pub struct ClickhouseAccessor {
    http: reqwest::Client,
    endpoint: String,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl ClickhouseAccessor {
    pub(crate) async fn connect(settings: &ConnectionSettings) -> Result<Self, DbError> {
        let url = Url::parse(&settings.cleaned_url).map_err(|e| {
            DbError::BadInput(format!("invalid clickhouse url: {e}"))
        })?;
        let host = url.host_str().unwrap_or("localhost");
        let port = url.port().unwrap_or(8123);
        let database = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|db| !db.is_empty())
            .map(|db| db.to_string());
        let accessor = Self {
            http: reqwest::Client::new(),
            endpoint: format!("http://{host}:{port}"),
            database,
            username: if url.username().is_empty() {
                None
            } else {
                Some(url.username().to_string())
            },
            password: url.password().map(|p| p.to_string()),
        };
        accessor.ping().await?;
        Ok(accessor)
    }

    fn request(&self, body: String) -> reqwest::RequestBuilder {
        let mut request = self.http.post(&self.endpoint);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }
        if let Some(database) = &self.database {
            request = request.query(&[("database", database.as_str())]);
        }
        request.body(body)
    }

    async fn post(&self, body: String) -> Result<String, DbError> {
        debug!(target: "dbmux::clickhouse", "dispatching {} bytes", body.len());
        let response = self
            .request(body)
            .send()
            .await
            .map_err(|e| DbError::backend(format!("clickhouse http: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DbError::backend(format!("clickhouse body: {e}")))?;
        if !status.is_success() {
            return Err(exception_error(&text));
        }
        Ok(text)
    }
}

/// Map a ClickHouse exception body (`Code: 60. DB::Exception: ...`) to a
/// coded backend error.
fn exception_error(body: &str) -> DbError {
    let code = body
        .strip_prefix("Code: ")
        .and_then(|rest| rest.split(['.', ',']).next())
        .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()));
    match code {
        Some(code) => DbError::backend_with_code(code, body.trim().to_string()),
        None => DbError::backend(body.trim().to_string()),
    }
}

/// Substitute `?` placeholders (outside string literals) with dialect
/// literals. The HTTP interface has no positional bind protocol.
fn interpolate(sql: &str, args: &[SqlValue], dialect: &dyn Dialect) -> Result<String, DbError> {
    if args.is_empty() {
        return Ok(sql.to_string());
    }
    let mut out = String::with_capacity(sql.len() + args.len() * 8);
    let mut pending = args.iter();
    let mut in_string = false;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                out.push(c);
            }
            '?' if !in_string => {
                let arg = pending.next().ok_or_else(|| {
                    DbError::BadInput("more placeholders than arguments".to_string())
                })?;
                out.push_str(&sqlf(dialect, arg));
            }
            _ => out.push(c),
        }
    }
    if pending.next().is_some() {
        return Err(DbError::BadInput(
            "more arguments than placeholders".to_string(),
        ));
    }
    Ok(out)
}

fn json_to_value(value: &Json) -> SqlValue {
    match value {
        Json::Null => SqlValue::Null,
        Json::Bool(b) => SqlValue::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => SqlValue::Float(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn parse_compact(body: &str) -> Result<Box<dyn Rows>, DbError> {
    if body.trim().is_empty() {
        return Ok(Box::new(SurrogateRows::default()));
    }
    let parsed: Json = serde_json::from_str(body)
        .map_err(|e| DbError::backend(format!("clickhouse response: {e}")))?;
    let columns: Vec<String> = parsed["meta"]
        .as_array()
        .map(|meta| {
            meta.iter()
                .filter_map(|m| m["name"].as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let rows: Vec<Vec<SqlValue>> = parsed["data"]
        .as_array()
        .map(|data| {
            data.iter()
                .filter_map(|row| row.as_array())
                .map(|row| row.iter().map(json_to_value).collect())
                .collect()
        })
        .unwrap_or_default();
    Ok(Box::new(SurrogateRows::new(
        columns.iter().map(|c| c.as_str()).collect(),
        rows,
    )))
}

#[async_trait]
impl Querier for ClickhouseAccessor {
    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, DbError> {
        let body = interpolate(sql, args, &ClickhouseDialect)?;
        self.post(body).await?;
        Ok(ExecResult::default())
    }

    async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query(sql, args).await?;
        rows.next_row()
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn Rows>, DbError> {
        let interpolated = interpolate(sql, args, &ClickhouseDialect)?;
        let body = format!(
            "{} FORMAT JSONCompact",
            interpolated.trim_end().trim_end_matches(';')
        );
        let text = self.post(body).await?;
        parse_compact(&text)
    }

    async fn prepare(&self, sql: &str) -> Result<Statement, DbError> {
        // no server-side prepare over HTTP
        Ok(Statement {
            sql: sql.to_string(),
        })
    }
}

#[async_trait]
impl Transactor for ClickhouseAccessor {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        Err(DbError::NotSupported(
            "transactions on clickhouse".to_string(),
        ))
    }
}

#[async_trait]
impl Accessor for ClickhouseAccessor {
    async fn ping(&self) -> Result<(), DbError> {
        let response = self
            .http
            .get(format!("{}/ping", self.endpoint))
            .send()
            .await
            .map_err(|e| DbError::backend(format!("clickhouse ping: {e}")))?;
        if !response.status().is_success() {
            return Err(DbError::backend(format!(
                "clickhouse ping status {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        // stateless http client
        PoolStats { open: 1, idle: 1 }
    }

    async fn close(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn as_querier(&self) -> &dyn Querier {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_respects_string_literals() {
        let out = interpolate(
            "SELECT ? FROM t WHERE s = 'a?b' AND n = ?",
            &[SqlValue::Int(1), SqlValue::Text("x".into())],
            &ClickhouseDialect,
        )
        .unwrap();
        assert_eq!(out, "SELECT 1 FROM t WHERE s = 'a?b' AND n = 'x'");
    }

    #[test]
    fn interpolation_arity_mismatch() {
        assert!(interpolate("SELECT ?", &[], &ClickhouseDialect).is_ok());
        assert!(
            interpolate("SELECT ?, ?", &[SqlValue::Int(1)], &ClickhouseDialect).is_err()
        );
        assert!(
            interpolate("SELECT 1", &[SqlValue::Int(1)], &ClickhouseDialect).is_err()
        );
    }

    #[test]
    fn exception_codes_are_extracted() {
        let err = exception_error("Code: 60. DB::Exception: Table t does not exist");
        assert_eq!(err.backend_code(), Some("60"));
        let err = exception_error("connection refused");
        assert_eq!(err.backend_code(), None);
    }

    #[test]
    fn compact_payload_parses() {
        let body = r#"{"meta":[{"name":"id","type":"UInt64"},{"name":"name","type":"String"}],
                       "data":[[1,"a"],[2,"b"]],"rows":2}"#;
        let mut rows = parse_compact(body).unwrap();
        assert_eq!(rows.columns(), &["id".to_string(), "name".to_string()]);
        let first = rows.next_row().unwrap().unwrap();
        assert_eq!(first.get_i64(0).unwrap(), 1);
        assert_eq!(first.get_string(1).unwrap(), "a");
    }
}
