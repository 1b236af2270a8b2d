//! MySQL / MariaDB dialect.
use crate::dialect::{
    Dialect, DialectName, PlaceholderStyle, Recommendation, SequenceSupport,
};
use crate::error::DbError;

/// Server error numbers classified as retriable.
const ER_LOCK_DEADLOCK: &str = "1213";
const ER_LOCK_WAIT_TIMEOUT: &str = "1205";

#[derive(Debug, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> DialectName {
        DialectName::Mysql
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn encode_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn encode_bytes(&self, b: &[u8]) -> String {
        format!("X'{}'", hex::encode(b))
    }

    fn rand_func(&self) -> &'static str {
        "RAND()"
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn is_retriable(&self, err: &DbError) -> bool {
        matches!(
            err.backend_code(),
            Some(ER_LOCK_DEADLOCK) | Some(ER_LOCK_WAIT_TIMEOUT)
        )
    }

    fn sequence_support(&self) -> SequenceSupport {
        SequenceSupport::Native
    }

    fn settings_query(&self) -> &'static str {
        "SHOW VARIABLES"
    }

    fn recommendations(&self) -> Vec<Recommendation> {
        vec![
            Recommendation {
                setting: "max_connections",
                meaning: "maximum permitted number of simultaneous client connections",
                expected_value: None,
                min_value: Some(512),
                recommended_value: Some(2048),
            },
            Recommendation {
                setting: "innodb_buffer_pool_size",
                meaning: "size in bytes of the buffer pool",
                expected_value: None,
                min_value: Some(1 << 30),
                recommended_value: Some(4 << 30),
            },
            Recommendation {
                setting: "innodb_flush_log_at_trx_commit",
                meaning: "durability/throughput trade-off for redo log flushes",
                expected_value: Some("2"),
                min_value: None,
                recommended_value: None,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_and_lock_timeout_are_retriable() {
        let d = MysqlDialect;
        assert!(d.is_retriable(&DbError::backend_with_code("1213", "deadlock")));
        assert!(d.is_retriable(&DbError::backend_with_code("1205", "lock wait timeout")));
        assert!(!d.is_retriable(&DbError::backend_with_code("1064", "syntax")));
        assert!(!d.is_retriable(&DbError::BadInput("x".into())));
    }

    #[test]
    fn backslashes_are_escaped() {
        let d = MysqlDialect;
        assert_eq!(d.encode_string(r"a\b'c"), r"'a\\b''c'");
    }
}
