//! ClickHouse dialect. Non-transactional and non-retriable in the core.
use crate::dialect::{Dialect, DialectName, PlaceholderStyle, SequenceSupport};
use crate::value::format_vector;

#[derive(Debug, Default)]
pub struct ClickhouseDialect;

impl Dialect for ClickhouseDialect {
    fn name(&self) -> DialectName {
        DialectName::Clickhouse
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn encode_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn encode_bytes(&self, b: &[u8]) -> String {
        format!("unhex('{}')", hex::encode(b))
    }

    fn encode_vector(&self, v: &[f32]) -> String {
        format_vector(v)
    }

    fn rand_func(&self) -> &'static str {
        "rand()"
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    fn sequence_support(&self) -> SequenceSupport {
        SequenceSupport::Unsupported
    }

    fn settings_query(&self) -> &'static str {
        "SELECT name, value FROM system.settings"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DataType;

    #[test]
    fn clickhouse_specifics() {
        let d = ClickhouseDialect;
        assert!(!d.supports_transactions());
        assert_eq!(d.encode_string("it's"), r"'it\'s'");
        assert_eq!(d.encode_vector(&[1.0, 2.0]), "[1,2]");
        assert_eq!(d.get_type(DataType::Id), "UInt64");
        assert_eq!(d.encode_bytes(&[0xff]), "unhex('ff')");
    }
}
