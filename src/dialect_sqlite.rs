//! SQLite dialect.
use crate::dialect::{Dialect, DialectName, PlaceholderStyle, SequenceSupport};

#[derive(Debug, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> DialectName {
        DialectName::Sqlite
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn encode_bytes(&self, b: &[u8]) -> String {
        format!("X'{}'", hex::encode(b))
    }

    fn rand_func(&self) -> &'static str {
        "RANDOM()"
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn sequence_support(&self) -> SequenceSupport {
        SequenceSupport::Emulated
    }

    fn settings_query(&self) -> &'static str {
        "PRAGMA compile_options"
    }
}
