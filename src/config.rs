//! Connection configuration and the pluggable logger surface.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::DbError;

/// Sink for one of the four query log streams. Implementations must be
/// cheap; they are called on the hot path.
pub trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

impl fmt::Debug for dyn Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Logger(..)")
    }
}

/// Logger bridging to the `tracing` ecosystem at debug level.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, msg: &str) {
        tracing::debug!(target: "dbmux::query", "{msg}");
    }
}

/// Connection configuration handed to [`crate::registry::Registry::open`].
#[derive(Clone, Default)]
pub struct Config {
    /// `scheme://driver-specific-rest?key=val&...`
    pub conn_string: String,
    /// 0 means the backend default
    pub max_open_conns: u32,
    /// zero duration means unlimited
    pub max_conn_lifetime: Duration,
    /// upper bound for a single statement payload, 0 means unlimited
    pub max_packet_size: usize,
    /// short-circuit every exec without dispatching it
    pub dry_run: bool,
    /// prefer TRUNCATE over DROP in `drop_table`
    pub prefer_truncate: bool,
    /// render literals into SQL text instead of binding placeholders
    pub interpolate_args: bool,
    pub query_logger: Option<Arc<dyn Logger>>,
    pub read_rows_logger: Option<Arc<dyn Logger>>,
    pub query_time_logger: Option<Arc<dyn Logger>>,
    pub explain_logger: Option<Arc<dyn Logger>>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "conn_string",
                &crate::sanitize::sanitize_conn_string(&self.conn_string),
            )
            .field("max_open_conns", &self.max_open_conns)
            .field("max_conn_lifetime", &self.max_conn_lifetime)
            .field("dry_run", &self.dry_run)
            .field("prefer_truncate", &self.prefer_truncate)
            .field("interpolate_args", &self.interpolate_args)
            .finish()
    }
}

impl Config {
    pub fn new(conn_string: impl Into<String>) -> Self {
        Self {
            conn_string: conn_string.into(),
            max_open_conns: 16,
            ..Default::default()
        }
    }

    pub fn with_max_open_conns(mut self, n: u32) -> Self {
        self.max_open_conns = n;
        self
    }

    pub fn with_max_conn_lifetime(mut self, d: Duration) -> Self {
        self.max_conn_lifetime = d;
        self
    }

    pub fn with_dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    pub fn with_prefer_truncate(mut self, on: bool) -> Self {
        self.prefer_truncate = on;
        self
    }

    pub fn with_interpolate_args(mut self, on: bool) -> Self {
        self.interpolate_args = on;
        self
    }

    pub fn with_query_logger(mut self, l: Arc<dyn Logger>) -> Self {
        self.query_logger = Some(l);
        self
    }

    pub fn with_read_rows_logger(mut self, l: Arc<dyn Logger>) -> Self {
        self.read_rows_logger = Some(l);
        self
    }

    pub fn with_query_time_logger(mut self, l: Arc<dyn Logger>) -> Self {
        self.query_time_logger = Some(l);
        self
    }

    pub fn with_explain_logger(mut self, l: Arc<dyn Logger>) -> Self {
        self.explain_logger = Some(l);
        self
    }
}

/// Connection parameters recognized (and consumed) by the access layer.
/// Everything recognized is stripped from the URL before the native
/// driver sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionSettings {
    pub scheme: String,
    /// the URL with recognized parameters removed
    pub cleaned_url: String,
    pub schema: Option<String>,
    pub sslmode: Option<String>,
    pub embedded_postgres: bool,
    pub ep_port: Option<u16>,
    pub ep_data_dir: Option<String>,
    pub ep_max_connections: Option<u32>,
}

impl ConnectionSettings {
    /// Parse a connection URL, pulling out and stripping the recognized
    /// query parameters.
    pub fn parse(conn_string: &str) -> Result<Self, DbError> {
        let (scheme, _) = crate::registry::parse_scheme(conn_string)?;
        let mut url = Url::parse(conn_string).map_err(|e| {
            DbError::BadInput(format!(
                "invalid connection string {}: {e}",
                crate::sanitize::sanitize_conn_string(conn_string)
            ))
        })?;

        let mut settings = ConnectionSettings {
            scheme: scheme.to_string(),
            ..Default::default()
        };

        let mut kept: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "schema" => settings.schema = Some(value.to_string()),
                "sslmode" => settings.sslmode = Some(value.to_string()),
                "embedded-postgres" => settings.embedded_postgres = value == "true",
                "ep-port" => {
                    settings.ep_port = Some(value.parse().map_err(|_| {
                        DbError::BadInput(format!("invalid ep-port value {value:?}"))
                    })?)
                }
                "ep-data-dir" => settings.ep_data_dir = Some(value.to_string()),
                "ep-max-connections" => {
                    settings.ep_max_connections = Some(value.parse().map_err(|_| {
                        DbError::BadInput(format!("invalid ep-max-connections value {value:?}"))
                    })?)
                }
                _ => {
                    kept.insert(key.to_string(), value.to_string());
                }
            }
        }

        if kept.is_empty() {
            url.set_query(None);
        } else {
            let query = kept
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
        settings.cleaned_url = url.to_string();
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_params_are_stripped() {
        let s = ConnectionSettings::parse(
            "postgres://u:p@localhost/db?schema=perf&sslmode=disable&application_name=bench",
        )
        .unwrap();
        assert_eq!(s.scheme, "postgres");
        assert_eq!(s.schema.as_deref(), Some("perf"));
        assert_eq!(s.sslmode.as_deref(), Some("disable"));
        assert_eq!(
            s.cleaned_url,
            "postgres://u:p@localhost/db?application_name=bench"
        );
    }

    #[test]
    fn embedded_postgres_params() {
        let s = ConnectionSettings::parse(
            "postgres://localhost/db?embedded-postgres=true&ep-port=5433&ep-data-dir=/tmp/ep&ep-max-connections=8",
        )
        .unwrap();
        assert!(s.embedded_postgres);
        assert_eq!(s.ep_port, Some(5433));
        assert_eq!(s.ep_data_dir.as_deref(), Some("/tmp/ep"));
        assert_eq!(s.ep_max_connections, Some(8));
        assert_eq!(s.cleaned_url, "postgres://localhost/db");
    }

    #[test]
    fn bad_ep_port_is_bad_input() {
        let err = ConnectionSettings::parse("postgres://localhost/db?ep-port=zero").unwrap_err();
        assert!(matches!(err, DbError::BadInput(_)));
    }

    #[test]
    fn unrecognized_query_is_preserved() {
        let s = ConnectionSettings::parse("mysql://localhost/db?charset=utf8mb4").unwrap();
        assert_eq!(s.cleaned_url, "mysql://localhost/db?charset=utf8mb4");
        assert_eq!(s.schema, None);
    }
}
