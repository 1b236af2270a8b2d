//! Dialect engine: the per-backend behavior bundle.
//!
//! A [`Dialect`] is a set of pure transforms — logical type resolution,
//! placeholder style, literal encoding, retriability classification. It
//! never talks to the network; backends plug in underneath via the
//! querier layer.
use std::fmt;

use chrono::{DateTime, Utc};
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};
use uuid::Uuid;

use crate::error::DbError;
use crate::value::format_vector;

/// Closed enumeration of the supported backends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, Display, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[repr(usize)]
pub enum DialectName {
    Sqlite,
    Mysql,
    Postgres,
    Mssql,
    Clickhouse,
    Cassandra,
}

/// Logical type tokens used in table definitions and migration DDL
/// templates, written `{$token}` in template text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[repr(usize)]
pub enum DataType {
    /// auto-increment primary key
    Id,
    Int,
    #[strum(serialize = "bigint")]
    BigInt,
    String32,
    String36,
    String64,
    String128,
    String256,
    /// unbounded string
    String,
    #[strum(serialize = "longtext")]
    LongText,
    Uuid,
    Binary20,
    #[strum(serialize = "longblob")]
    LongBlob,
    #[strum(serialize = "hugeblob")]
    HugeBlob,
    #[strum(serialize = "datetime")]
    DateTime,
    /// datetime with 6 fractional-second digits
    #[strum(serialize = "datetime6")]
    DateTime6,
    /// current-timestamp expression
    Now,
    Boolean,
    /// the backend's TRUE literal
    BooleanTrue,
    /// the backend's FALSE literal
    BooleanFalse,
    Json,
    Vector3,
    Vector768,
    Unique,
    #[strum(serialize = "notnull")]
    NotNull,
    Null,
    Engine,
}

const N_DIALECTS: usize = <DialectName as EnumCount>::COUNT;
const N_TYPES: usize = <DataType as EnumCount>::COUNT;

/// The dialect × token type table. An empty string is a valid mapping:
/// the token is unsupported on that backend and is removed during
/// template patching.
///
/// Columns: sqlite, mysql, postgres, mssql, clickhouse, cassandra.
#[rustfmt::skip]
const TYPE_TABLE: [[&str; N_DIALECTS]; N_TYPES] = [
    /* Id          */ ["INTEGER PRIMARY KEY AUTOINCREMENT", "BIGINT AUTO_INCREMENT PRIMARY KEY", "BIGSERIAL PRIMARY KEY", "BIGINT IDENTITY(1,1) PRIMARY KEY", "UInt64", "bigint"],
    /* Int         */ ["INTEGER", "INT", "INT", "INT", "Int32", "int"],
    /* BigInt      */ ["INTEGER", "BIGINT", "BIGINT", "BIGINT", "Int64", "bigint"],
    /* String32    */ ["TEXT", "VARCHAR(32)", "VARCHAR(32)", "NVARCHAR(32)", "String", "text"],
    /* String36    */ ["TEXT", "VARCHAR(36)", "VARCHAR(36)", "NVARCHAR(36)", "String", "text"],
    /* String64    */ ["TEXT", "VARCHAR(64)", "VARCHAR(64)", "NVARCHAR(64)", "String", "text"],
    /* String128   */ ["TEXT", "VARCHAR(128)", "VARCHAR(128)", "NVARCHAR(128)", "String", "text"],
    /* String256   */ ["TEXT", "VARCHAR(256)", "VARCHAR(256)", "NVARCHAR(256)", "String", "text"],
    /* String      */ ["TEXT", "TEXT", "TEXT", "NVARCHAR(MAX)", "String", "text"],
    /* LongText    */ ["TEXT", "LONGTEXT", "TEXT", "NVARCHAR(MAX)", "String", "text"],
    /* Uuid        */ ["TEXT", "VARCHAR(36)", "UUID", "UNIQUEIDENTIFIER", "UUID", "uuid"],
    /* Binary20    */ ["BLOB", "BINARY(20)", "BYTEA", "BINARY(20)", "FixedString(20)", "blob"],
    /* LongBlob    */ ["BLOB", "MEDIUMBLOB", "BYTEA", "VARBINARY(MAX)", "String", "blob"],
    /* HugeBlob    */ ["BLOB", "LONGBLOB", "BYTEA", "VARBINARY(MAX)", "String", "blob"],
    /* DateTime    */ ["TIMESTAMP", "DATETIME", "TIMESTAMP", "DATETIME2(0)", "DateTime", "timestamp"],
    /* DateTime6   */ ["TIMESTAMP", "DATETIME(6)", "TIMESTAMP(6)", "DATETIME2(6)", "DateTime64(6)", "timestamp"],
    /* Now         */ ["CURRENT_TIMESTAMP", "NOW()", "NOW()", "SYSDATETIME()", "now()", "toTimestamp(now())"],
    /* Boolean     */ ["BOOLEAN", "TINYINT(1)", "BOOLEAN", "BIT", "UInt8", "boolean"],
    /* BooleanTrue */ ["1", "1", "TRUE", "1", "1", "true"],
    /* BooleanFalse*/ ["0", "0", "FALSE", "0", "0", "false"],
    /* Json        */ ["TEXT", "JSON", "JSONB", "NVARCHAR(MAX)", "String", "text"],
    /* Vector3     */ ["", "", "VECTOR(3)", "", "Array(Float32)", "vector<float, 3>"],
    /* Vector768   */ ["", "", "VECTOR(768)", "", "Array(Float32)", "vector<float, 768>"],
    /* Unique      */ ["UNIQUE", "UNIQUE", "UNIQUE", "UNIQUE", "", ""],
    /* NotNull     */ ["NOT NULL", "NOT NULL", "NOT NULL", "NOT NULL", "", ""],
    /* Null        */ ["NULL", "NULL", "NULL", "NULL", "", ""],
    /* Engine      */ ["", "ENGINE=InnoDB", "", "", "ENGINE = MergeTree() ORDER BY tuple()", ""],
];

/// Resolve a logical type token against one backend.
pub fn native_type(dialect: DialectName, ty: DataType) -> &'static str {
    TYPE_TABLE[ty as usize][dialect as usize]
}

/// Placeholder style used by the final rewrite pass. The canonical form
/// emitted by every builder is `$N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...` — kept as-is
    Dollar,
    /// `?` positional
    Question,
    /// `@p1, @p2, ...`
    AtP,
}

/// Native sequence support level, driving `create_sequence` / `next_val`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceSupport {
    Native,
    /// single-row counter table updated inside a transaction
    Emulated,
    Unsupported,
}

/// One tunable the dialect knows how to check on a live server.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub setting: &'static str,
    pub meaning: &'static str,
    /// exact expected value, when the tunable is an on/off switch
    pub expected_value: Option<&'static str>,
    pub min_value: Option<i64>,
    pub recommended_value: Option<i64>,
}

/// The per-backend behavior bundle. All methods are pure transforms.
pub trait Dialect: Send + Sync {
    fn name(&self) -> DialectName;

    /// Native type string for a logical token; empty when unsupported.
    fn get_type(&self, ty: DataType) -> &'static str {
        native_type(self.name(), ty)
    }

    /// Placeholder for the 0-based argument index `i`.
    fn arg_placeholder(&self, i: usize) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::Dollar => format!("${}", i + 1),
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::AtP => format!("@p{}", i + 1),
        }
    }

    fn placeholder_style(&self) -> PlaceholderStyle;

    fn encode_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn encode_bool(&self, b: bool) -> String {
        if b {
            self.get_type(DataType::BooleanTrue).to_string()
        } else {
            self.get_type(DataType::BooleanFalse).to_string()
        }
    }

    fn encode_bytes(&self, b: &[u8]) -> String;

    fn encode_time(&self, t: &DateTime<Utc>) -> String {
        format!("'{}'", t.format("%Y-%m-%d %H:%M:%S%.6f"))
    }

    fn encode_uuid(&self, u: &Uuid) -> String {
        format!("'{u}'")
    }

    fn encode_vector(&self, v: &[f32]) -> String {
        format!("'{}'", format_vector(v))
    }

    /// Nearest-neighbor ORDER BY fragment; empty on backends without
    /// vector search.
    fn encode_order_by_vector(&self, _field: &str, _op: &str, _vec: &[f32]) -> String {
        String::new()
    }

    /// The backend's random function, or empty when it has none.
    fn rand_func(&self) -> &'static str {
        ""
    }

    fn supports_transactions(&self) -> bool;

    /// Whether the error is a deadlock / lock timeout worth retrying.
    fn is_retriable(&self, _err: &DbError) -> bool {
        false
    }

    /// Whether an application-initiated rollback is still allowed after
    /// this error.
    fn can_rollback(&self, _err: &DbError) -> bool {
        true
    }

    /// Schema-qualified table reference where applicable.
    fn table(&self, name: &str) -> String {
        name.to_string()
    }

    /// Current schema / keyspace, empty when the backend has none.
    fn schema(&self) -> String {
        String::new()
    }

    fn sequence_support(&self) -> SequenceSupport;

    /// Metadata catalog query returning `(name, value)` settings rows.
    fn settings_query(&self) -> &'static str;

    fn recommendations(&self) -> Vec<Recommendation> {
        Vec::new()
    }

    /// Release any dialect-owned resource.
    fn close(&self) {}
}

impl fmt::Debug for dyn Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dialect({})", self.name())
    }
}

/// Rewrite canonical `$N` placeholders into the dialect's native form.
/// Runs as the final pass over a built statement. String literals are
/// skipped: interpolated mode embeds dialect-encoded literal text before
/// this pass runs, and a value such as `'$5 off'` must come through
/// unchanged.
pub fn rewrite_placeholders(sql: &str, style: PlaceholderStyle) -> String {
    use std::sync::LazyLock;
    static PLACEHOLDER: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"\$(\d+)").expect("placeholder regex"));
    let replacement = match style {
        PlaceholderStyle::Dollar => return sql.to_string(),
        PlaceholderStyle::Question => "?",
        PlaceholderStyle::AtP => "@p${1}",
    };

    let mut out = String::with_capacity(sql.len());
    let mut segment_start = 0;
    let mut in_string = false;
    for (idx, c) in sql.char_indices() {
        if c != '\'' {
            continue;
        }
        if in_string {
            // literal content plus its closing quote, verbatim
            out.push_str(&sql[segment_start..=idx]);
        } else {
            out.push_str(&PLACEHOLDER.replace_all(&sql[segment_start..idx], replacement));
            out.push('\'');
        }
        segment_start = idx + 1;
        in_string = !in_string;
    }
    let tail = &sql[segment_start..];
    if in_string {
        out.push_str(tail);
    } else {
        out.push_str(&PLACEHOLDER.replace_all(tail, replacement));
    }
    out
}

/// Substitute `{table}` and every recognized `{$token}` in a DDL template
/// with the dialect's native forms. Tokens that resolve to the empty
/// string are removed together with any immediately preceding space.
pub fn default_create_query_patch(
    table: &str,
    ddl: &str,
    dialect: &dyn Dialect,
) -> String {
    use strum::IntoEnumIterator;

    let mut out = ddl.replace("{table}", &dialect.table(table));
    for ty in DataType::iter() {
        let token: &'static str = ty.into();
        let marker = format!("{{${token}}}");
        if !out.contains(&marker) {
            continue;
        }
        let native = dialect.get_type(ty);
        if native.is_empty() {
            out = out.replace(&format!(" {marker}"), "");
            out = out.replace(&marker, "");
        } else {
            out = out.replace(&marker, native);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[test]
    fn every_token_has_a_row_for_every_dialect() {
        for ty in DataType::iter() {
            for d in DialectName::iter() {
                // must not panic; empty string is a valid outcome
                let _ = native_type(d, ty);
            }
        }
    }

    #[rstest]
    #[case(DialectName::Postgres, DataType::Uuid, "UUID")]
    #[case(DialectName::Mysql, DataType::Uuid, "VARCHAR(36)")]
    #[case(DialectName::Mssql, DataType::Boolean, "BIT")]
    #[case(DialectName::Clickhouse, DataType::Unique, "")]
    #[case(DialectName::Cassandra, DataType::Vector768, "vector<float, 768>")]
    fn type_table_spot_checks(
        #[case] dialect: DialectName,
        #[case] ty: DataType,
        #[case] expected: &str,
    ) {
        assert_eq!(native_type(dialect, ty), expected);
    }

    #[rstest]
    #[case(PlaceholderStyle::Dollar, "a = $1 AND b IN ($2, $13)")]
    #[case(PlaceholderStyle::Question, "a = ? AND b IN (?, ?)")]
    #[case(PlaceholderStyle::AtP, "a = @p1 AND b IN (@p2, @p13)")]
    fn placeholder_rewrite(#[case] style: PlaceholderStyle, #[case] expected: &str) {
        let canonical = "a = $1 AND b IN ($2, $13)";
        assert_eq!(rewrite_placeholders(canonical, style), expected);
    }

    #[rstest]
    #[case(
        PlaceholderStyle::Question,
        "SET note = '$5 off', code = ? WHERE tag = '$2' AND id = ?"
    )]
    #[case(
        PlaceholderStyle::AtP,
        "SET note = '$5 off', code = @p1 WHERE tag = '$2' AND id = @p2"
    )]
    fn placeholder_rewrite_skips_string_literals(
        #[case] style: PlaceholderStyle,
        #[case] expected: &str,
    ) {
        let sql = "SET note = '$5 off', code = $1 WHERE tag = '$2' AND id = $2";
        assert_eq!(rewrite_placeholders(sql, style), expected);
    }

    #[test]
    fn placeholder_rewrite_handles_doubled_quotes() {
        // '' toggles out of and back into the literal; both halves are
        // literal text either way
        let sql = "a = 'it''s $1' AND b = $1";
        assert_eq!(
            rewrite_placeholders(sql, PlaceholderStyle::Question),
            "a = 'it''s $1' AND b = ?"
        );
    }

    #[test]
    fn ddl_patching_substitutes_and_removes() {
        let d = crate::dialect_clickhouse::ClickhouseDialect;
        let ddl = "CREATE TABLE {table} (id {$id}, name {$string64} {$notnull} {$unique})";
        let patched = default_create_query_patch("t", ddl, &d);
        assert_eq!(patched, "CREATE TABLE t (id UInt64, name String)");
    }

    #[test]
    fn token_template_names_are_snake_case() {
        let token: &'static str = DataType::BooleanTrue.into();
        assert_eq!(token, "boolean_true");
        let token: &'static str = DataType::String32.into();
        assert_eq!(token, "string32");
    }
}
