//! Structured filter compiler: `{field: [func(value)...]}` descriptors
//! compiled into parameterized WHERE fragments. No user text ever lands
//! in SQL directly; values flow through placeholders or the dialect's
//! escaping path.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::dialect::Dialect;
use crate::error::DbError;
use crate::value::{SqlValue, sqlf};

/// Case-sensitive null sentinels.
pub const IS_NULL: &str = "<IS_NULL>";
pub const IS_NOT_NULL: &str = "<IS_NOT_NULL>";

/// Predicate functions of the filter grammar. `Asc`/`Desc`/`Nearest`
/// belong to the ordering grammar and are rejected inside WHERE.
const WHERE_FUNCS: &[&str] = &["lt", "le", "gt", "ge", "ne", "hlike", "tlike", "like"];
pub(crate) const ORDER_FUNCS: &[&str] = &["asc", "desc", "nearest"];

/// Split a predicate string into `(func, value)`. A bare value (or an
/// unrecognized `name(...)` form, e.g. a literal containing parens) is
/// equality.
pub fn parse_predicate(raw: &str) -> (Option<&str>, &str) {
    if let Some(open) = raw.find('(') {
        if raw.ends_with(')') {
            let func = &raw[..open];
            if WHERE_FUNCS.contains(&func) || ORDER_FUNCS.contains(&func) {
                return (Some(func), &raw[open + 1..raw.len() - 1]);
            }
        }
    }
    (None, raw)
}

/// Argument collector: placeholders in parameterized mode, dialect
/// literals in interpolated mode. Placeholders are emitted in the
/// canonical `$N` form and rewritten per dialect as a final pass.
pub struct QueryArgs<'d> {
    dialect: &'d dyn Dialect,
    interpolate: bool,
    args: Vec<SqlValue>,
}

impl<'d> QueryArgs<'d> {
    pub fn new(dialect: &'d dyn Dialect, interpolate: bool) -> Self {
        Self {
            dialect,
            interpolate,
            args: Vec::new(),
        }
    }

    /// Add one value, returning the SQL it is referenced by.
    pub fn push(&mut self, value: SqlValue) -> String {
        if self.interpolate {
            sqlf(self.dialect, &value)
        } else {
            self.args.push(value);
            format!("${}", self.args.len())
        }
    }

    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn into_args(self) -> Vec<SqlValue> {
        self.args
    }
}

/// Enum-column converter: maps an external string to its stored integer.
pub type EnumConv = Arc<dyn Fn(&str) -> Result<i64, DbError> + Send + Sync>;

/// Per-column filter function, installed at table registration.
#[derive(Clone)]
pub enum ColumnFilter {
    /// integer columns, including ids
    Id,
    Uuid,
    Str {
        /// 0 means unbounded
        max_len: usize,
        allow_likes: bool,
    },
    Enum {
        conv: EnumConv,
    },
    Bool,
    Time,
    /// column exists but carries no filter (blobs, json, vectors)
    None,
}

impl fmt::Debug for ColumnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnFilter::Id => write!(f, "Id"),
            ColumnFilter::Uuid => write!(f, "Uuid"),
            ColumnFilter::Str {
                max_len,
                allow_likes,
            } => f
                .debug_struct("Str")
                .field("max_len", max_len)
                .field("allow_likes", allow_likes)
                .finish(),
            ColumnFilter::Enum { .. } => write!(f, "Enum(..)"),
            ColumnFilter::Bool => write!(f, "Bool"),
            ColumnFilter::Time => write!(f, "Time"),
            ColumnFilter::None => write!(f, "None"),
        }
    }
}

/// Output of compiling one column's predicate list.
#[derive(Debug, Default)]
pub(crate) struct ColumnCond {
    pub fragments: Vec<String>,
    /// the predicate set is unsatisfiable; the whole query is empty
    pub empty: bool,
}

/// Compile one column. `field` arrives already table-qualified.
pub(crate) fn compile_column(
    filter: &ColumnFilter,
    field: &str,
    values: &[String],
    optimize: bool,
    qa: &mut QueryArgs<'_>,
) -> Result<ColumnCond, DbError> {
    // Sole sentinel predicates bypass the typed filters entirely.
    if values.len() == 1 {
        match values[0].as_str() {
            IS_NULL => {
                return Ok(ColumnCond {
                    fragments: vec![format!("{field} IS NULL")],
                    empty: false,
                });
            }
            IS_NOT_NULL => {
                return Ok(ColumnCond {
                    fragments: vec![format!("{field} IS NOT NULL")],
                    empty: false,
                });
            }
            _ => {}
        }
    }

    match filter {
        ColumnFilter::Id => id_cond(field, values, optimize, qa),
        ColumnFilter::Uuid => uuid_cond(field, values, qa),
        ColumnFilter::Str {
            max_len,
            allow_likes,
        } => string_cond(field, values, *max_len, *allow_likes, optimize, qa),
        ColumnFilter::Enum { conv } => enum_cond(field, values, conv, optimize, qa),
        ColumnFilter::Bool => {
            let conv: EnumConv = Arc::new(|s| match s {
                "true" | "TRUE" | "1" => Ok(1),
                "false" | "FALSE" | "0" => Ok(0),
                other => Err(DbError::BadInput(format!("invalid boolean {other:?}"))),
            });
            enum_cond(field, values, &conv, optimize, qa)
        }
        ColumnFilter::Time => time_cond(field, values, optimize, qa),
        ColumnFilter::None => Err(DbError::BadInput(format!(
            "column {field} cannot be filtered"
        ))),
    }
}

fn cmp_op(func: &str) -> Option<&'static str> {
    match func {
        "lt" => Some("<"),
        "le" => Some("<="),
        "gt" => Some(">"),
        "ge" => Some(">="),
        "ne" => Some("<>"),
        _ => None,
    }
}

/// Integer filter. Optimized mode compresses `gt/ge/lt/le` into a single
/// `(min, max]`-style range and the equality set into `IN()`.
fn id_cond(
    field: &str,
    values: &[String],
    optimize: bool,
    qa: &mut QueryArgs<'_>,
) -> Result<ColumnCond, DbError> {
    let mut cond = ColumnCond::default();

    let mut eq: Vec<i64> = Vec::new();
    let mut ne: Vec<i64> = Vec::new();
    // (value, inclusive)
    let mut lower: Option<(i64, bool)> = None;
    let mut upper: Option<(i64, bool)> = None;

    for raw in values {
        let (func, value) = parse_predicate(raw);
        let parsed: i64 = value
            .parse()
            .map_err(|_| DbError::BadInput(format!("invalid integer {value:?} for {field}")))?;
        match func {
            None => {
                if optimize {
                    eq.push(parsed);
                } else {
                    let p = qa.push(SqlValue::Int(parsed));
                    cond.fragments.push(format!("{field} = {p}"));
                }
            }
            Some("ne") => {
                if optimize {
                    ne.push(parsed);
                } else {
                    let p = qa.push(SqlValue::Int(parsed));
                    cond.fragments.push(format!("{field} <> {p}"));
                }
            }
            Some(f @ ("lt" | "le" | "gt" | "ge")) => {
                if optimize {
                    match f {
                        "gt" => tighten_lower(&mut lower, parsed, false),
                        "ge" => tighten_lower(&mut lower, parsed, true),
                        "lt" => tighten_upper(&mut upper, parsed, false),
                        "le" => tighten_upper(&mut upper, parsed, true),
                        _ => unreachable!(),
                    }
                } else {
                    let op = cmp_op(f).expect("comparison op");
                    let p = qa.push(SqlValue::Int(parsed));
                    cond.fragments.push(format!("{field} {op} {p}"));
                }
            }
            Some(other) => {
                return Err(DbError::BadInput(format!(
                    "function {other:?} is not valid for integer column {field}"
                )));
            }
        }
    }

    if !optimize {
        return Ok(cond);
    }

    // Prune the equality set by the range and exclusions.
    eq.sort_unstable();
    eq.dedup();
    eq.retain(|v| !ne.contains(v) && in_lower(&lower, *v) && in_upper(&upper, *v));
    let had_eq = values.iter().any(|v| parse_predicate(v).0.is_none());
    if had_eq {
        if eq.is_empty() {
            cond.empty = true;
            return Ok(cond);
        }
        // Equalities subsume the range.
        if eq.len() == 1 {
            let p = qa.push(SqlValue::Int(eq[0]));
            cond.fragments.push(format!("{field} = {p}"));
        } else {
            let ps: Vec<String> = eq.into_iter().map(|v| qa.push(SqlValue::Int(v))).collect();
            cond.fragments
                .push(format!("{field} IN ({})", ps.join(", ")));
        }
        return Ok(cond);
    }

    if let (Some((lo, lo_inc)), Some((hi, hi_inc))) = (&lower, &upper) {
        let lo_bound = if *lo_inc { *lo } else { lo + 1 };
        let hi_bound = if *hi_inc { *hi } else { hi - 1 };
        if lo_bound > hi_bound {
            cond.empty = true;
            return Ok(cond);
        }
    }
    if let Some((lo, inclusive)) = lower {
        let p = qa.push(SqlValue::Int(lo));
        let op = if inclusive { ">=" } else { ">" };
        cond.fragments.push(format!("{field} {op} {p}"));
    }
    if let Some((hi, inclusive)) = upper {
        let p = qa.push(SqlValue::Int(hi));
        let op = if inclusive { "<=" } else { "<" };
        cond.fragments.push(format!("{field} {op} {p}"));
    }
    for v in ne {
        let p = qa.push(SqlValue::Int(v));
        cond.fragments.push(format!("{field} <> {p}"));
    }
    Ok(cond)
}

fn tighten_lower(lower: &mut Option<(i64, bool)>, value: i64, inclusive: bool) {
    let candidate_bound = if inclusive { value } else { value + 1 };
    let replace = match lower {
        None => true,
        Some((cur, cur_inc)) => {
            let cur_bound = if *cur_inc { *cur } else { *cur + 1 };
            candidate_bound > cur_bound
        }
    };
    if replace {
        *lower = Some((value, inclusive));
    }
}

fn tighten_upper(upper: &mut Option<(i64, bool)>, value: i64, inclusive: bool) {
    let candidate_bound = if inclusive { value } else { value - 1 };
    let replace = match upper {
        None => true,
        Some((cur, cur_inc)) => {
            let cur_bound = if *cur_inc { *cur } else { *cur - 1 };
            candidate_bound < cur_bound
        }
    };
    if replace {
        *upper = Some((value, inclusive));
    }
}

fn in_lower(lower: &Option<(i64, bool)>, v: i64) -> bool {
    match lower {
        None => true,
        Some((lo, true)) => v >= *lo,
        Some((lo, false)) => v > *lo,
    }
}

fn in_upper(upper: &Option<(i64, bool)>, v: i64) -> bool {
    match upper {
        None => true,
        Some((hi, true)) => v <= *hi,
        Some((hi, false)) => v < *hi,
    }
}

/// UUID filter. Equality binds the native uuid; other comparisons are
/// lexicographic over the canonical text form.
fn uuid_cond(
    field: &str,
    values: &[String],
    qa: &mut QueryArgs<'_>,
) -> Result<ColumnCond, DbError> {
    let mut cond = ColumnCond::default();
    for raw in values {
        let (func, value) = parse_predicate(raw);
        let parsed = Uuid::parse_str(value)
            .map_err(|e| DbError::BadInput(format!("invalid uuid {value:?} for {field}: {e}")))?;
        match func {
            None => {
                let p = qa.push(SqlValue::Uuid(parsed));
                cond.fragments.push(format!("{field} = {p}"));
            }
            Some(f) => {
                let Some(op) = cmp_op(f) else {
                    return Err(DbError::BadInput(format!(
                        "function {f:?} is not valid for uuid column {field}"
                    )));
                };
                let p = qa.push(SqlValue::Text(parsed.to_string()));
                cond.fragments.push(format!("{field} {op} {p}"));
            }
        }
    }
    Ok(cond)
}

/// String filter with optional LIKE family and a length guard.
fn string_cond(
    field: &str,
    values: &[String],
    max_len: usize,
    allow_likes: bool,
    optimize: bool,
    qa: &mut QueryArgs<'_>,
) -> Result<ColumnCond, DbError> {
    let mut cond = ColumnCond::default();
    let mut eq: Vec<&str> = Vec::new();
    let mut ne: Vec<&str> = Vec::new();

    for raw in values {
        let (func, value) = parse_predicate(raw);
        if max_len > 0 && value.len() > max_len {
            return Err(DbError::BadInput(format!(
                "value for {field} exceeds maximum length {max_len}"
            )));
        }
        match func {
            None => eq.push(value),
            Some("ne") => ne.push(value),
            Some(f @ ("hlike" | "tlike" | "like")) => {
                if !allow_likes {
                    return Err(DbError::BadInput(format!(
                        "LIKE is not allowed on column {field}"
                    )));
                }
                let pattern = match f {
                    "hlike" => format!("{value}%"),
                    "tlike" => format!("%{value}"),
                    _ => format!("%{value}%"),
                };
                let p = qa.push(SqlValue::Text(pattern));
                cond.fragments.push(format!("{field} LIKE {p}"));
            }
            Some(f @ ("lt" | "le" | "gt" | "ge")) => {
                let op = cmp_op(f).expect("comparison op");
                let p = qa.push(SqlValue::Text(value.to_string()));
                cond.fragments.push(format!("{field} {op} {p}"));
            }
            Some(other) => {
                return Err(DbError::BadInput(format!(
                    "function {other:?} is not valid for string column {field}"
                )));
            }
        }
    }

    // v = x AND v <> x can never match; surface it instead of emitting
    // a silently-empty query.
    if let Some(conflict) = eq.iter().find(|v| ne.contains(v)) {
        return Err(DbError::BadInput(format!(
            "contradictory conditions on {field}: = and <> with {conflict:?}"
        )));
    }

    if optimize && eq.len() > 1 {
        let ps: Vec<String> = eq
            .iter()
            .map(|v| qa.push(SqlValue::Text(v.to_string())))
            .collect();
        cond.fragments
            .push(format!("{field} IN ({})", ps.join(", ")));
    } else {
        for v in &eq {
            let p = qa.push(SqlValue::Text(v.to_string()));
            cond.fragments.push(format!("{field} = {p}"));
        }
    }
    for v in &ne {
        let p = qa.push(SqlValue::Text(v.to_string()));
        cond.fragments.push(format!("{field} <> {p}"));
    }
    Ok(cond)
}

/// Enum filter: strings mapped to stored integers through the supplied
/// converter. Optimized mode prunes impossible combinations.
fn enum_cond(
    field: &str,
    values: &[String],
    conv: &EnumConv,
    optimize: bool,
    qa: &mut QueryArgs<'_>,
) -> Result<ColumnCond, DbError> {
    let mut cond = ColumnCond::default();
    let mut eq: Vec<i64> = Vec::new();
    let mut ne: Vec<i64> = Vec::new();

    for raw in values {
        let (func, value) = parse_predicate(raw);
        let mapped = conv(value)?;
        match func {
            None => eq.push(mapped),
            Some("ne") => ne.push(mapped),
            Some(other) => {
                return Err(DbError::BadInput(format!(
                    "function {other:?} is not valid for enum column {field}"
                )));
            }
        }
    }

    if optimize {
        eq.sort_unstable();
        eq.dedup();
        let had_eq = !eq.is_empty();
        eq.retain(|v| !ne.contains(v));
        if had_eq && eq.is_empty() {
            cond.empty = true;
            return Ok(cond);
        }
        if eq.len() == 1 {
            let p = qa.push(SqlValue::Int(eq[0]));
            cond.fragments.push(format!("{field} = {p}"));
        } else if !eq.is_empty() {
            let ps: Vec<String> = eq.into_iter().map(|v| qa.push(SqlValue::Int(v))).collect();
            cond.fragments
                .push(format!("{field} IN ({})", ps.join(", ")));
        }
        if !had_eq {
            for v in ne {
                let p = qa.push(SqlValue::Int(v));
                cond.fragments.push(format!("{field} <> {p}"));
            }
        }
    } else {
        for v in eq {
            let p = qa.push(SqlValue::Int(v));
            cond.fragments.push(format!("{field} = {p}"));
        }
        for v in ne {
            let p = qa.push(SqlValue::Int(v));
            cond.fragments.push(format!("{field} <> {p}"));
        }
    }
    Ok(cond)
}

/// Time filter; values are stored as int64 nanoseconds UTC.
fn time_cond(
    field: &str,
    values: &[String],
    _optimize: bool,
    qa: &mut QueryArgs<'_>,
) -> Result<ColumnCond, DbError> {
    let mut cond = ColumnCond::default();
    for raw in values {
        let (func, value) = parse_predicate(raw);
        let ns = parse_time_ns(value)?;
        match func {
            None => {
                let p = qa.push(SqlValue::Int(ns));
                cond.fragments.push(format!("{field} = {p}"));
            }
            Some(f) => {
                let Some(op) = cmp_op(f) else {
                    return Err(DbError::BadInput(format!(
                        "function {f:?} is not valid for time column {field}"
                    )));
                };
                let p = qa.push(SqlValue::Int(ns));
                cond.fragments.push(format!("{field} {op} {p}"));
            }
        }
    }
    Ok(cond)
}

/// Accepted forms: Unix seconds, Unix nanoseconds (`ns` suffix), RFC3339
/// (with nanos), RFC1123, RFC850, ANSI C. All interpreted as UTC.
pub fn parse_time_ns(value: &str) -> Result<i64, DbError> {
    if let Some(digits) = value.strip_suffix("ns") {
        if let Ok(ns) = digits.parse::<i64>() {
            return Ok(ns);
        }
    }
    if let Ok(secs) = value.parse::<i64>() {
        return Ok(secs * 1_000_000_000);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return t
            .with_timezone(&Utc)
            .timestamp_nanos_opt()
            .ok_or_else(|| DbError::BadInput(format!("time {value:?} out of range")));
    }
    // RFC1123 / RFC850 carry a textual zone; only UTC forms are accepted.
    let trimmed = value
        .trim_end_matches(" GMT")
        .trim_end_matches(" UTC");
    for format in ["%a, %d %b %Y %H:%M:%S", "%A, %d-%b-%y %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return ns_of(naive, value);
        }
    }
    // ANSI C asctime: "Mon Jan  2 15:04:05 2006"
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y") {
        return ns_of(naive, value);
    }
    Err(DbError::BadInput(format!("unrecognized time {value:?}")))
}

fn ns_of(naive: NaiveDateTime, original: &str) -> Result<i64, DbError> {
    naive
        .and_utc()
        .timestamp_nanos_opt()
        .ok_or_else(|| DbError::BadInput(format!("time {original:?} out of range")))
}

/// Compile a full WHERE descriptor against the registered column
/// filters. Fragments come back in deterministic (field-sorted) order.
pub(crate) fn compile_where(
    filters: &BTreeMap<String, ColumnFilter>,
    table: &str,
    where_cond: &BTreeMap<String, Vec<String>>,
    optimize: bool,
    qa: &mut QueryArgs<'_>,
) -> Result<(Vec<String>, bool), DbError> {
    let mut fragments = Vec::new();
    let mut requested = 0usize;

    for (column, values) in where_cond {
        if values.is_empty() {
            continue;
        }
        requested += 1;
        let filter = filters
            .get(column)
            .ok_or_else(|| DbError::BadInput(format!("unknown column {column:?} on {table}")))?;
        let qualified = format!("{table}.{column}");
        let compiled = compile_column(filter, &qualified, values, optimize, qa)?;
        if compiled.empty {
            return Ok((Vec::new(), true));
        }
        fragments.extend(compiled.fragments);
    }

    // Conditions were requested but nothing materialized: nothing can match.
    if requested > 0 && fragments.is_empty() {
        return Ok((Vec::new(), true));
    }
    Ok((fragments, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect_postgres::PostgresDialect;
    use rstest::rstest;

    #[rstest]
    #[case("lt(5)", Some("lt"), "5")]
    #[case("hlike(abc)", Some("hlike"), "abc")]
    #[case("plain", None, "plain")]
    #[case("now()", None, "now()")]
    #[case("nearest(v;l2;[1,2])", Some("nearest"), "v;l2;[1,2]")]
    fn predicate_parse(#[case] raw: &str, #[case] func: Option<&str>, #[case] value: &str) {
        assert_eq!(parse_predicate(raw), (func, value));
    }

    #[test]
    fn id_cond_optimized_builds_range_and_in() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let cond = id_cond(
            "t.id",
            &[
                "gt(3)".to_string(),
                "gt(5)".to_string(),
                "le(10)".to_string(),
            ],
            true,
            &mut qa,
        )
        .unwrap();
        assert_eq!(cond.fragments, vec!["t.id > $1", "t.id <= $2"]);
        assert_eq!(
            qa.into_args(),
            vec![SqlValue::Int(5), SqlValue::Int(10)]
        );
    }

    #[test]
    fn id_cond_equality_set_becomes_in() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let cond = id_cond(
            "t.id",
            &["7".to_string(), "3".to_string(), "7".to_string()],
            true,
            &mut qa,
        )
        .unwrap();
        assert_eq!(cond.fragments, vec!["t.id IN ($1, $2)"]);
        assert_eq!(qa.into_args(), vec![SqlValue::Int(3), SqlValue::Int(7)]);
    }

    #[test]
    fn id_cond_impossible_range_is_empty() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let cond = id_cond(
            "t.id",
            &["gt(10)".to_string(), "lt(5)".to_string()],
            true,
            &mut qa,
        )
        .unwrap();
        assert!(cond.empty);
    }

    #[test]
    fn id_cond_rejects_garbage() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let err = id_cond("t.id", &["abc".to_string()], false, &mut qa).unwrap_err();
        assert!(matches!(err, DbError::BadInput(_)));
    }

    #[test]
    fn string_cond_detects_contradiction() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let err = string_cond(
            "t.state",
            &["done".to_string(), "ne(done)".to_string()],
            0,
            true,
            false,
            &mut qa,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::BadInput(_)));
    }

    #[test]
    fn string_cond_like_family() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let cond = string_cond(
            "t.name",
            &[
                "hlike(ab)".to_string(),
                "tlike(yz)".to_string(),
                "like(mid)".to_string(),
            ],
            64,
            true,
            false,
            &mut qa,
        )
        .unwrap();
        assert_eq!(
            cond.fragments,
            vec!["t.name LIKE $1", "t.name LIKE $2", "t.name LIKE $3"]
        );
        assert_eq!(
            qa.into_args(),
            vec![
                SqlValue::Text("ab%".into()),
                SqlValue::Text("%yz".into()),
                SqlValue::Text("%mid%".into()),
            ]
        );
    }

    #[test]
    fn string_cond_enforces_max_len() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let err = string_cond(
            "t.name",
            &["toolongvalue".to_string()],
            4,
            true,
            false,
            &mut qa,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::BadInput(_)));
    }

    #[test]
    fn uuid_cond_lexicographic_comparison() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let cond = uuid_cond(
            "t.uuid",
            &["gt(6ba7b810-9dad-11d1-80b4-00c04fd430c8)".to_string()],
            &mut qa,
        )
        .unwrap();
        assert_eq!(cond.fragments, vec!["t.uuid > $1"]);
        assert_eq!(
            qa.into_args(),
            vec![SqlValue::Text("6ba7b810-9dad-11d1-80b4-00c04fd430c8".into())]
        );
    }

    #[test]
    fn uuid_cond_rejects_invalid() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let err = uuid_cond("t.uuid", &["not-a-uuid".to_string()], &mut qa).unwrap_err();
        assert!(matches!(err, DbError::BadInput(_)));
    }

    #[test]
    fn enum_cond_optimized_prunes_impossible() {
        let dialect = PostgresDialect::default();
        let conv: EnumConv = Arc::new(|s| match s {
            "queued" => Ok(1),
            "running" => Ok(2),
            other => Err(DbError::BadInput(format!("unknown state {other:?}"))),
        });
        let mut qa = QueryArgs::new(&dialect, false);
        let cond = enum_cond(
            "t.state",
            &["queued".to_string(), "ne(queued)".to_string()],
            &conv,
            true,
            &mut qa,
        )
        .unwrap();
        assert!(cond.empty);
    }

    #[rstest]
    #[case("1700000000", 1_700_000_000 * 1_000_000_000)]
    #[case("1700000000123456789ns", 1_700_000_000_123_456_789)]
    #[case("2023-11-14T22:13:20Z", 1_700_000_000 * 1_000_000_000)]
    #[case("Tue, 14 Nov 2023 22:13:20 GMT", 1_700_000_000 * 1_000_000_000)]
    #[case("Tuesday, 14-Nov-23 22:13:20 GMT", 1_700_000_000 * 1_000_000_000)]
    #[case("Tue Nov 14 22:13:20 2023", 1_700_000_000 * 1_000_000_000)]
    fn time_formats(#[case] input: &str, #[case] expected_ns: i64) {
        assert_eq!(parse_time_ns(input).unwrap(), expected_ns);
    }

    #[test]
    fn time_garbage_is_bad_input() {
        assert!(matches!(
            parse_time_ns("next tuesday"),
            Err(DbError::BadInput(_))
        ));
    }

    #[test]
    fn null_sentinels() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let cond = compile_column(
            &ColumnFilter::Str {
                max_len: 0,
                allow_likes: true,
            },
            "t.state",
            &[IS_NULL.to_string()],
            false,
            &mut qa,
        )
        .unwrap();
        assert_eq!(cond.fragments, vec!["t.state IS NULL"]);
        assert!(qa.is_empty());
    }

    #[test]
    fn unknown_column_is_bad_input() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, false);
        let filters = BTreeMap::new();
        let mut where_cond = BTreeMap::new();
        where_cond.insert("ghost".to_string(), vec!["1".to_string()]);
        let err = compile_where(&filters, "t", &where_cond, false, &mut qa).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn interpolated_mode_renders_literals() {
        let dialect = PostgresDialect::default();
        let mut qa = QueryArgs::new(&dialect, true);
        let cond = string_cond(
            "t.name",
            &["o'brien".to_string()],
            0,
            true,
            false,
            &mut qa,
        )
        .unwrap();
        assert_eq!(cond.fragments, vec!["t.name = 'o''brien'"]);
        assert!(qa.is_empty());
    }
}
