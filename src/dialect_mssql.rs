//! MSSQL (SQL Server) dialect.
use crate::dialect::{
    Dialect, DialectName, PlaceholderStyle, Recommendation, SequenceSupport,
};
use crate::error::DbError;

/// Server error number raised for the chosen deadlock victim. The server
/// has already rolled the transaction back when this is surfaced, so an
/// application-initiated rollback must be skipped.
const DEADLOCK_VICTIM: &str = "1205";

#[derive(Debug, Default)]
pub struct MssqlDialect {
    pub schema: Option<String>,
}

impl MssqlDialect {
    pub fn new(schema: Option<String>) -> Self {
        Self { schema }
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> DialectName {
        DialectName::Mssql
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtP
    }

    fn encode_bytes(&self, b: &[u8]) -> String {
        format!("0x{}", hex::encode(b))
    }

    fn rand_func(&self) -> &'static str {
        "NEWID()"
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn is_retriable(&self, err: &DbError) -> bool {
        err.backend_code() == Some(DEADLOCK_VICTIM)
    }

    fn can_rollback(&self, err: &DbError) -> bool {
        err.backend_code() != Some(DEADLOCK_VICTIM)
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
        "SELECT name, CAST(value_in_use AS NVARCHAR(256)) AS value FROM sys.configurations"
    }

    fn recommendations(&self) -> Vec<Recommendation> {
        vec![
            Recommendation {
                setting: "max degree of parallelism",
                meaning: "number of processors used per parallel plan",
                expected_value: None,
                min_value: Some(1),
                recommended_value: Some(8),
            },
            Recommendation {
                setting: "max server memory (MB)",
                meaning: "upper bound for buffer pool memory",
                expected_value: None,
                min_value: Some(4096),
                recommended_value: Some(16_384),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_p_placeholders() {
        let d = MssqlDialect::default();
        assert_eq!(d.arg_placeholder(0), "@p1");
        assert_eq!(d.arg_placeholder(2), "@p3");
    }

    #[test]
    fn deadlock_victim_cannot_roll_back() {
        let d = MssqlDialect::default();
        let victim = DbError::backend_with_code("1205", "deadlock victim");
        assert!(d.is_retriable(&victim));
        assert!(!d.can_rollback(&victim));

        let other = DbError::backend_with_code("547", "constraint");
        assert!(!d.is_retriable(&other));
        assert!(d.can_rollback(&other));
    }
}
