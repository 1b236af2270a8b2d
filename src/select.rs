//! SELECT composition: field lists, compiled WHERE, ordering grammar,
//! dialect-aware paging, and the final placeholder rewrite.
use std::collections::BTreeMap;

use crate::dialect::{Dialect, DialectName, rewrite_placeholders};
use crate::error::DbError;
use crate::filter::{ColumnFilter, QueryArgs, compile_where, parse_predicate};
use crate::rows::{EmptyRows, Rows};
use crate::session::Session;
use crate::value::SqlValue;

/// Page window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

/// Structured query descriptor. Empty `fields` means a `COUNT(0)` query.
#[derive(Debug, Clone, Default)]
pub struct SelectCtrl {
    pub fields: Vec<String>,
    pub where_cond: BTreeMap<String, Vec<String>>,
    pub order: Vec<String>,
    pub page: Page,
    pub optimize_conditions: bool,
}

impl SelectCtrl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cond(mut self, field: impl Into<String>, preds: Vec<String>) -> Self {
        self.where_cond.insert(field.into(), preds);
        self
    }

    pub fn with_order<I: IntoIterator<Item = S>, S: Into<String>>(mut self, order: I) -> Self {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page(mut self, limit: i64, offset: i64) -> Self {
        self.page = Page { limit, offset };
        self
    }
}

/// Update descriptor. SET values whose rendered form ends in `()` are
/// embedded as function calls instead of being bound.
#[derive(Debug, Clone, Default)]
pub struct UpdateCtrl {
    pub set: BTreeMap<String, SqlValue>,
    pub where_cond: BTreeMap<String, Vec<String>>,
    pub optimize_conditions: bool,
}

/// One parsed ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderSpec {
    Asc(String),
    Desc(String),
    Nearest {
        field: String,
        op: String,
        vector: Vec<f32>,
    },
}

impl OrderSpec {
    pub fn field(&self) -> &str {
        match self {
            OrderSpec::Asc(f) | OrderSpec::Desc(f) => f,
            OrderSpec::Nearest { field, .. } => field,
        }
    }

    pub fn is_desc(&self) -> bool {
        matches!(self, OrderSpec::Desc(_))
    }

    /// The raw grammar form, e.g. `asc(id)`.
    pub fn raw(&self) -> String {
        match self {
            OrderSpec::Asc(f) => format!("asc({f})"),
            OrderSpec::Desc(f) => format!("desc({f})"),
            OrderSpec::Nearest { field, op, vector } => {
                format!("nearest({field};{op};{})", crate::value::format_vector(vector))
            }
        }
    }
}

/// Parse `asc(field) | desc(field) | nearest(field;op;[v,...])`.
pub fn parse_order(raw: &str) -> Result<OrderSpec, DbError> {
    let (func, inner) = parse_predicate(raw);
    match func {
        Some("asc") => Ok(OrderSpec::Asc(inner.to_string())),
        Some("desc") => Ok(OrderSpec::Desc(inner.to_string())),
        Some("nearest") => {
            let parts: Vec<&str> = inner.splitn(3, ';').collect();
            if parts.len() != 3 {
                return Err(DbError::BadInput(format!(
                    "nearest needs field;op;vector, got {raw:?}"
                )));
            }
            Ok(OrderSpec::Nearest {
                field: parts[0].to_string(),
                op: parts[1].to_string(),
                vector: parse_vector(parts[2])?,
            })
        }
        _ => Err(DbError::BadInput(format!("invalid order entry {raw:?}"))),
    }
}

/// Parse the `[c1,c2,...]` vector literal.
pub fn parse_vector(lit: &str) -> Result<Vec<f32>, DbError> {
    let inner = lit
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| DbError::BadInput(format!("invalid vector literal {lit:?}")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|c| {
            c.trim()
                .parse::<f32>()
                .map_err(|_| DbError::BadInput(format!("invalid vector component {c:?}")))
        })
        .collect()
}

/// Per-table query builder, installed by table registration. Holds the
/// selectable column set and one filter function per column.
#[derive(Clone, Default, Debug)]
pub struct TableQueryBuilder {
    pub table: String,
    pub filters: BTreeMap<String, ColumnFilter>,
}

impl TableQueryBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, filter: ColumnFilter) -> Self {
        self.filters.insert(name.into(), filter);
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }
}

/// A fully built statement.
#[derive(Debug, Default)]
pub struct BuiltQuery {
    pub sql: String,
    pub args: Vec<SqlValue>,
    /// the filter proved the result empty; no SQL may be issued
    pub empty: bool,
}

/// Compose a SELECT for the registered table builder.
pub fn build_select(
    dialect: &dyn Dialect,
    builder: &TableQueryBuilder,
    ctrl: &SelectCtrl,
    interpolate: bool,
) -> Result<BuiltQuery, DbError> {
    let count_query = ctrl.fields.is_empty();
    if count_query && !ctrl.order.is_empty() {
        return Err(DbError::BadInput(
            "count queries cannot carry ORDER BY".to_string(),
        ));
    }

    let mut qa = QueryArgs::new(dialect, interpolate);
    let (fragments, empty) = compile_where(
        &builder.filters,
        &builder.table,
        &ctrl.where_cond,
        ctrl.optimize_conditions,
        &mut qa,
    )?;
    if empty {
        return Ok(BuiltQuery {
            empty: true,
            ..Default::default()
        });
    }

    let select_list = if count_query {
        "COUNT(0)".to_string()
    } else {
        let mut cols = Vec::with_capacity(ctrl.fields.len());
        for field in &ctrl.fields {
            if !builder.has_column(field) {
                return Err(DbError::BadInput(format!(
                    "unknown column {field:?} on {}",
                    builder.table
                )));
            }
            cols.push(format!("{}.{field}", builder.table));
        }
        cols.join(", ")
    };

    let mssql_top = dialect.name() == DialectName::Mssql
        && ctrl.page.limit > 0
        && ctrl.page.offset == 0;
    let mut sql = if mssql_top {
        format!(
            "SELECT TOP {} {select_list} FROM {}",
            ctrl.page.limit,
            dialect.table(&builder.table)
        )
    } else {
        format!("SELECT {select_list} FROM {}", dialect.table(&builder.table))
    };

    if !fragments.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&fragments.join(" AND "));
    }

    if !ctrl.order.is_empty() {
        let mut order_parts = Vec::with_capacity(ctrl.order.len());
        for raw in &ctrl.order {
            order_parts.push(order_fragment(dialect, &builder.table, raw)?);
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_parts.join(", "));
    }

    append_page_clause(dialect, &mut sql, ctrl)?;

    Ok(BuiltQuery {
        sql: rewrite_placeholders(&sql, dialect.placeholder_style()),
        args: qa.into_args(),
        empty: false,
    })
}

fn order_fragment(dialect: &dyn Dialect, table: &str, raw: &str) -> Result<String, DbError> {
    match parse_order(raw)? {
        OrderSpec::Asc(field) => Ok(format!("{table}.{field} ASC")),
        OrderSpec::Desc(field) => Ok(format!("{table}.{field} DESC")),
        OrderSpec::Nearest { field, op, vector } => {
            let fragment =
                dialect.encode_order_by_vector(&format!("{table}.{field}"), &op, &vector);
            if fragment.is_empty() {
                return Err(DbError::NotSupported(format!(
                    "vector search on {}",
                    dialect.name()
                )));
            }
            Ok(fragment)
        }
    }
}

fn append_page_clause(
    dialect: &dyn Dialect,
    sql: &mut String,
    ctrl: &SelectCtrl,
) -> Result<(), DbError> {
    let Page { limit, offset } = ctrl.page;
    if limit <= 0 && offset <= 0 {
        return Ok(());
    }
    match dialect.name() {
        DialectName::Mssql => {
            // TOP was emitted with the select list for the offset-less form.
            if offset > 0 {
                if ctrl.order.is_empty() {
                    return Err(DbError::BadInput(
                        "OFFSET on mssql requires an ORDER BY".to_string(),
                    ));
                }
                sql.push_str(&format!(" OFFSET {offset} ROWS"));
                if limit > 0 {
                    sql.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                }
            }
        }
        DialectName::Cassandra => {
            if offset > 0 {
                return Err(DbError::BadInput(
                    "cassandra does not support offsets".to_string(),
                ));
            }
            if limit > 0 {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
        }
        _ => {
            if limit > 0 {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }
    }
    Ok(())
}

impl Session {
    /// Run a structured select against a registered table. Unknown
    /// tables and columns are [`DbError::BadInput`] with no SQL issued;
    /// a filter that proves the result empty returns [`EmptyRows`].
    pub async fn select(&self, table: &str, ctrl: &SelectCtrl) -> Result<Box<dyn Rows>, DbError> {
        let builder = self.db.table_builder(table)?;
        let built = build_select(
            self.dialect().as_ref(),
            &builder,
            ctrl,
            self.config().interpolate_args,
        )?;
        if built.empty {
            return Ok(Box::new(EmptyRows));
        }
        self.query(&built.sql, &built.args).await
    }

    /// Count rows matching the descriptor (`SELECT COUNT(0)`).
    pub async fn count(&self, table: &str, ctrl: &SelectCtrl) -> Result<i64, DbError> {
        let mut count_ctrl = ctrl.clone();
        count_ctrl.fields = Vec::new();
        count_ctrl.order = Vec::new();
        let builder = self.db.table_builder(table)?;
        let built = build_select(
            self.dialect().as_ref(),
            &builder,
            &count_ctrl,
            self.config().interpolate_args,
        )?;
        if built.empty {
            return Ok(0);
        }
        let row = self
            .query_row(&built.sql, &built.args)
            .await?
            .ok_or_else(|| DbError::backend("count query returned no row"))?;
        row.get_i64(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect_cassandra::CassandraDialect;
    use crate::dialect_mssql::MssqlDialect;
    use crate::dialect_postgres::PostgresDialect;
    use rstest::rstest;

    fn users_builder() -> TableQueryBuilder {
        TableQueryBuilder::new("t")
            .with_column("id", ColumnFilter::Id)
            .with_column(
                "state",
                ColumnFilter::Str {
                    max_len: 64,
                    allow_likes: true,
                },
            )
            .with_column("created", ColumnFilter::Time)
    }

    #[test]
    fn select_with_null_sentinel() {
        let dialect = PostgresDialect::default();
        let ctrl = SelectCtrl::new()
            .with_fields(["id"])
            .with_cond("state", vec!["<IS_NULL>".to_string()]);
        let built = build_select(&dialect, &users_builder(), &ctrl, false).unwrap();
        assert_eq!(built.sql, "SELECT t.id FROM t WHERE t.state IS NULL");
        assert!(built.args.is_empty());
    }

    #[test]
    fn placeholders_count_matches_args() {
        let dialect = PostgresDialect::default();
        let ctrl = SelectCtrl::new()
            .with_fields(["id", "state"])
            .with_cond("id", vec!["gt(5)".to_string(), "le(10)".to_string()])
            .with_cond("state", vec!["queued".to_string()]);
        let built = build_select(&dialect, &users_builder(), &ctrl, false).unwrap();
        let placeholder_count = (1..=built.args.len())
            .filter(|n| built.sql.contains(&format!("${n}")))
            .count();
        assert_eq!(placeholder_count, built.args.len());
        assert_eq!(built.args.len(), 3);
    }

    #[test]
    fn count_query_disallows_order() {
        let dialect = PostgresDialect::default();
        let ctrl = SelectCtrl::new().with_order(["asc(id)"]);
        let err = build_select(&dialect, &users_builder(), &ctrl, false).unwrap_err();
        assert!(matches!(err, DbError::BadInput(_)));
    }

    #[test]
    fn count_query_synthesizes_count_zero() {
        let dialect = PostgresDialect::default();
        let ctrl = SelectCtrl::new().with_cond("id", vec!["7".to_string()]);
        let built = build_select(&dialect, &users_builder(), &ctrl, false).unwrap();
        assert_eq!(built.sql, "SELECT COUNT(0) FROM t WHERE t.id = $1");
    }

    #[test]
    fn unknown_field_is_bad_input() {
        let dialect = PostgresDialect::default();
        let ctrl = SelectCtrl::new().with_fields(["ghost"]);
        let err = build_select(&dialect, &users_builder(), &ctrl, false).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn order_and_paging_postgres() {
        let dialect = PostgresDialect::default();
        let ctrl = SelectCtrl::new()
            .with_fields(["id"])
            .with_order(["desc(created)", "asc(id)"])
            .with_page(10, 20);
        let built = build_select(&dialect, &users_builder(), &ctrl, false).unwrap();
        assert_eq!(
            built.sql,
            "SELECT t.id FROM t ORDER BY t.created DESC, t.id ASC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn mssql_top_and_offset_fetch() {
        let dialect = MssqlDialect::default();
        let top = SelectCtrl::new().with_fields(["id"]).with_page(10, 0);
        let built = build_select(&dialect, &users_builder(), &top, false).unwrap();
        assert_eq!(built.sql, "SELECT TOP 10 t.id FROM t");

        let paged = SelectCtrl::new()
            .with_fields(["id"])
            .with_order(["asc(id)"])
            .with_page(10, 20);
        let built = build_select(&dialect, &users_builder(), &paged, false).unwrap();
        assert_eq!(
            built.sql,
            "SELECT t.id FROM t ORDER BY t.id ASC OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );

        let bad = SelectCtrl::new().with_fields(["id"]).with_page(10, 20);
        assert!(build_select(&dialect, &users_builder(), &bad, false).is_err());
    }

    #[test]
    fn cassandra_rejects_offset() {
        let dialect = CassandraDialect::default();
        let ctrl = SelectCtrl::new().with_fields(["id"]).with_page(5, 5);
        assert!(build_select(&dialect, &users_builder(), &ctrl, false).is_err());
    }

    #[test]
    fn nearest_order_on_postgres() {
        let dialect = PostgresDialect::default();
        let builder = users_builder().with_column("embedding", ColumnFilter::None);
        let ctrl = SelectCtrl::new()
            .with_fields(["id"])
            .with_order(["nearest(embedding;l2;[1,2,3])"]);
        let built = build_select(&dialect, &builder, &ctrl, false).unwrap();
        assert_eq!(
            built.sql,
            "SELECT t.id FROM t ORDER BY t.embedding <-> '[1,2,3]'"
        );
    }

    #[test]
    fn nearest_order_unsupported_dialect() {
        let dialect = CassandraDialect::default();
        let builder = users_builder().with_column("embedding", ColumnFilter::None);
        let ctrl = SelectCtrl::new()
            .with_fields(["id"])
            .with_order(["nearest(embedding;l2;[1,2,3])"]);
        let err = build_select(&dialect, &builder, &ctrl, false).unwrap_err();
        assert!(matches!(err, DbError::NotSupported(_)));
    }

    #[rstest]
    #[case("asc(id)", OrderSpec::Asc("id".into()))]
    #[case("desc(state)", OrderSpec::Desc("state".into()))]
    fn order_parse(#[case] raw: &str, #[case] expected: OrderSpec) {
        assert_eq!(parse_order(raw).unwrap(), expected);
        assert_eq!(parse_order(raw).unwrap().raw(), raw);
    }

    #[test]
    fn vector_parse() {
        assert_eq!(parse_vector("[1,2.5,3]").unwrap(), vec![1.0, 2.5, 3.0]);
        assert!(parse_vector("1,2").is_err());
        assert!(parse_vector("[a]").is_err());
    }

    #[test]
    fn filter_emptiness_issues_no_sql() {
        let dialect = PostgresDialect::default();
        let mut ctrl = SelectCtrl::new().with_fields(["id"]).with_cond(
            "id",
            vec!["gt(10)".to_string(), "lt(5)".to_string()],
        );
        ctrl.optimize_conditions = true;
        let built = build_select(&dialect, &users_builder(), &ctrl, false).unwrap();
        assert!(built.empty);
        assert!(built.sql.is_empty());
    }
}
