//! Cassandra (CQL) dialect. Non-transactional and non-retriable in the
//! core; multi-row inserts become `BEGIN BATCH` statements, which are
//! atomic per partition only.
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::dialect::{Dialect, DialectName, PlaceholderStyle, SequenceSupport};
use crate::value::format_vector;

#[derive(Debug, Default)]
pub struct CassandraDialect {
    /// keyspace from the connection URL path, if any
    pub keyspace: Option<String>,
}

impl CassandraDialect {
    pub fn new(keyspace: Option<String>) -> Self {
        Self { keyspace }
    }
}

impl Dialect for CassandraDialect {
    fn name(&self) -> DialectName {
        DialectName::Cassandra
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn encode_bytes(&self, b: &[u8]) -> String {
        format!("0x{}", hex::encode(b))
    }

    fn encode_time(&self, t: &DateTime<Utc>) -> String {
        format!("'{}'", t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    // CQL uuid literals are unquoted.
    fn encode_uuid(&self, u: &Uuid) -> String {
        u.to_string()
    }

    fn encode_vector(&self, v: &[f32]) -> String {
        format_vector(v)
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    fn table(&self, name: &str) -> String {
        match &self.keyspace {
            Some(ks) => format!("{ks}.{name}"),
            None => name.to_string(),
        }
    }

    fn schema(&self) -> String {
        self.keyspace.clone().unwrap_or_default()
    }

    fn sequence_support(&self) -> SequenceSupport {
        SequenceSupport::Unsupported
    }

    fn settings_query(&self) -> &'static str {
        "SELECT * FROM system.local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cql_literals() {
        let d = CassandraDialect::default();
        let u = Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
        assert_eq!(d.encode_uuid(&u), "6ba7b810-9dad-11d1-80b4-00c04fd430c8");
        assert_eq!(d.encode_bytes(&[0xab]), "0xab");
        assert!(!d.supports_transactions());
    }

    #[test]
    fn keyspace_qualification() {
        let d = CassandraDialect::new(Some("perf".into()));
        assert_eq!(d.table("events"), "perf.events");
    }
}
