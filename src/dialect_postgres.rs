//! PostgreSQL dialect, including pgvector ORDER BY forms.
use crate::dialect::{
    Dialect, DialectName, PlaceholderStyle, Recommendation, SequenceSupport,
};
use crate::error::DbError;
use crate::value::format_vector;

/// SQLSTATE for deadlock_detected.
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, Default)]
pub struct PostgresDialect {
    /// schema from the `schema` connection parameter, if any
    pub schema: Option<String>,
}

impl PostgresDialect {
    pub fn new(schema: Option<String>) -> Self {
        Self { schema }
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> DialectName {
        DialectName::Postgres
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn encode_bytes(&self, b: &[u8]) -> String {
        format!("'\\x{}'", hex::encode(b))
    }

    fn encode_order_by_vector(&self, field: &str, op: &str, vec: &[f32]) -> String {
        let operator = match op {
            "l2" | "<->" => "<->",
            "cosine" | "<=>" => "<=>",
            "ip" | "<#>" => "<#>",
            _ => return String::new(),
        };
        format!("{field} {operator} '{}'", format_vector(vec))
    }

    fn rand_func(&self) -> &'static str {
        "RANDOM()"
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn is_retriable(&self, err: &DbError) -> bool {
        err.backend_code() == Some(DEADLOCK_DETECTED)
    }

    fn table(&self, name: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{name}"),
            None => name.to_string(),
        }
    }

    fn schema(&self) -> String {
        self.schema.clone().unwrap_or_default()
    }

    fn sequence_support(&self) -> SequenceSupport {
        SequenceSupport::Native
    }

    fn settings_query(&self) -> &'static str {
        "SHOW ALL"
    }

    fn recommendations(&self) -> Vec<Recommendation> {
        vec![
            Recommendation {
                setting: "max_connections",
                meaning: "maximum number of concurrent connections",
                expected_value: None,
                min_value: Some(512),
                recommended_value: Some(2048),
            },
            Recommendation {
                setting: "shared_buffers",
                meaning: "shared memory buffers, in 8kB pages",
                expected_value: None,
                min_value: Some(131_072),
                recommended_value: Some(524_288),
            },
            Recommendation {
                setting: "autovacuum",
                meaning: "background vacuuming must stay enabled",
                expected_value: Some("on"),
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
    fn dollar_placeholders() {
        let d = PostgresDialect::default();
        assert_eq!(d.arg_placeholder(0), "$1");
        assert_eq!(d.arg_placeholder(9), "$10");
    }

    #[test]
    fn schema_qualification() {
        let d = PostgresDialect::new(Some("perf".into()));
        assert_eq!(d.table("users"), "perf.users");
        assert_eq!(d.schema(), "perf");
        assert_eq!(PostgresDialect::default().table("users"), "users");
    }

    #[test]
    fn vector_order_by() {
        let d = PostgresDialect::default();
        assert_eq!(
            d.encode_order_by_vector("embedding", "l2", &[1.0, 2.0]),
            "embedding <-> '[1,2]'"
        );
        assert_eq!(d.encode_order_by_vector("embedding", "bogus", &[1.0]), "");
    }

    #[test]
    fn deadlock_is_retriable() {
        let d = PostgresDialect::default();
        assert!(d.is_retriable(&DbError::backend_with_code("40P01", "deadlock")));
        assert!(!d.is_retriable(&DbError::backend_with_code("23505", "unique")));
    }
}
