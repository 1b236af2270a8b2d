//! Scheme-indexed driver registry and connection-string parsing.
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::database::Database;
use crate::error::DbError;

/// Split `scheme://rest` on the first separator. Empty halves are a
/// [`DbError::BadInput`].
pub fn parse_scheme(cs: &str) -> Result<(&str, &str), DbError> {
    let Some(sep) = cs.find("://") else {
        return Err(DbError::BadInput(format!(
            "connection string {:?} has no scheme separator",
            crate::sanitize::sanitize_conn_string(cs)
        )));
    };
    let (scheme, rest) = (&cs[..sep], &cs[sep + 3..]);
    if scheme.is_empty() || rest.is_empty() {
        return Err(DbError::BadInput(format!(
            "connection string {:?} has an empty scheme or remainder",
            crate::sanitize::sanitize_conn_string(cs)
        )));
    }
    Ok((scheme, rest))
}

/// Creates a [`Database`] (a connection pool bound to a dialect) for one
/// URL scheme.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connection_pool(&self, cfg: Config) -> Result<Database, DbError>;
}

/// Scheme → connector table. A `Registry` is an ordinary value so tests
/// and embedders can hold isolated ones; [`Registry::global`] is the
/// process-wide default used by [`open`].
#[derive(Default)]
pub struct Registry {
    connectors: Mutex<HashMap<String, Arc<dyn Connector>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector for `scheme`. Duplicate registration is a
    /// [`DbError::AlreadyExists`]; races are excluded by the table lock.
    pub fn register(
        &self,
        scheme: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Result<(), DbError> {
        let scheme = scheme.into();
        let mut table = self.connectors.lock().expect("registry poisoned");
        if table.contains_key(&scheme) {
            return Err(DbError::AlreadyExists(format!("scheme {scheme:?}")));
        }
        debug!(target: "dbmux::registry", "registering scheme {scheme}");
        table.insert(scheme, connector);
        Ok(())
    }

    /// Look up the connector for the config's scheme and delegate pool
    /// creation to it.
    pub async fn open(&self, cfg: Config) -> Result<Database, DbError> {
        let (scheme, _) = parse_scheme(&cfg.conn_string)?;
        let connector = {
            let table = self.connectors.lock().expect("registry poisoned");
            table.get(scheme).cloned()
        };
        let Some(connector) = connector else {
            return Err(DbError::BadInput(format!("unknown scheme {scheme:?}")));
        };
        let sanitized = crate::sanitize::sanitize_conn_string(&cfg.conn_string);
        connector.connection_pool(cfg).await.map_err(|err| match err {
            DbError::Backend { code, message } => DbError::Backend {
                code,
                message: format!("open {sanitized}: {message}"),
            },
            other => other,
        })
    }

    /// The process-wide registry with the built-in schemes registered.
    pub fn global() -> &'static Registry {
        static GLOBAL: LazyLock<Registry> = LazyLock::new(|| {
            let registry = Registry::new();
            crate::database::register_builtin_connectors(&registry)
                .expect("built-in scheme registration");
            registry
        });
        &GLOBAL
    }
}

/// Open a database through the default registry.
pub async fn open(cfg: Config) -> Result<Database, DbError> {
    Registry::global().open(cfg).await
}
