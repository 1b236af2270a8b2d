//! Error kinds surfaced by the access layer.
use thiserror::Error;

/// Errors produced by dbmux itself or passed through from a backend driver.
///
/// Backend errors keep the native error code (SQLSTATE or server error
/// number) so dialects can classify retriability without string matching.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    /// A dialect-classified deadlock or lock timeout. The transact retry
    /// loop absorbs these up to its retry budget.
    #[error("retriable conflict: {0}")]
    Retriable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("backend: {message}")]
    Backend {
        code: Option<String>,
        message: String,
    },
}

impl DbError {
    /// Wrap a native driver error that carries no usable code.
    pub fn backend(message: impl Into<String>) -> Self {
        DbError::Backend {
            code: None,
            message: message.into(),
        }
    }

    /// Wrap a native driver error together with its SQLSTATE or error number.
    pub fn backend_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Backend {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// The native error code, if this is a backend error that carried one.
    pub fn backend_code(&self) -> Option<&str> {
        match self {
            DbError::Backend { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DbError::Cancelled)
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code() {
                Some(code) => DbError::backend_with_code(code.to_string(), db.to_string()),
                None => DbError::backend(db.to_string()),
            },
            _ => DbError::backend(err.to_string()),
        }
    }
}
