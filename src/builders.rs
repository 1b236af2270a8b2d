//! INSERT and UPDATE composition with dialect-aware placeholders and
//! value encoding.
use crate::dialect::{Dialect, DialectName, rewrite_placeholders};
use crate::error::DbError;
use crate::filter::{QueryArgs, compile_where};
use crate::select::{BuiltQuery, TableQueryBuilder, UpdateCtrl};
use crate::session::Session;
use crate::value::SqlValue;

/// Compose a multi-row INSERT. Parameterized by default; interpolated
/// mode renders dialect-encoded literals instead. On Cassandra more than
/// one row becomes a `BEGIN BATCH` block, which is atomic per partition
/// only.
pub fn build_bulk_insert(
    dialect: &dyn Dialect,
    table: &str,
    rows: &[Vec<SqlValue>],
    cols: &[&str],
    interpolate: bool,
) -> Result<BuiltQuery, DbError> {
    if rows.is_empty() {
        return Err(DbError::BadInput("no rows to insert".to_string()));
    }
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != cols.len() {
            return Err(DbError::BadInput(format!(
                "row {idx} has {} values for {} columns",
                row.len(),
                cols.len()
            )));
        }
    }

    let mut qa = QueryArgs::new(dialect, interpolate);
    let table_ref = dialect.table(table);
    let col_list = cols.join(", ");

    let tuple = |row: &Vec<SqlValue>, qa: &mut QueryArgs<'_>| {
        let parts: Vec<String> = row.iter().map(|v| qa.push(v.clone())).collect();
        format!("({})", parts.join(","))
    };

    let sql = if dialect.name() == DialectName::Cassandra && rows.len() > 1 {
        let mut out = String::from("BEGIN BATCH\n");
        for row in rows {
            out.push_str(&format!(
                "\tINSERT INTO {table_ref}({col_list}) VALUES {};\n",
                tuple(row, &mut qa)
            ));
        }
        out.push_str("APPLY BATCH;");
        out
    } else {
        let tuples: Vec<String> = rows.iter().map(|row| tuple(row, &mut qa)).collect();
        format!(
            "INSERT INTO {table_ref}({col_list}) VALUES {};",
            tuples.join(", ")
        )
    };

    Ok(BuiltQuery {
        sql: rewrite_placeholders(&sql, dialect.placeholder_style()),
        args: qa.into_args(),
        empty: false,
    })
}

/// Compose an UPDATE. The WHERE side reuses the filter compiler;
/// ClickHouse uses its `ALTER TABLE … UPDATE …` mutation form.
pub fn build_update(
    dialect: &dyn Dialect,
    builder: &TableQueryBuilder,
    ctrl: &UpdateCtrl,
    interpolate: bool,
) -> Result<BuiltQuery, DbError> {
    if ctrl.set.is_empty() {
        return Err(DbError::BadInput("no columns to update".to_string()));
    }

    let mut qa = QueryArgs::new(dialect, interpolate);
    let mut assignments = Vec::with_capacity(ctrl.set.len());
    for (column, value) in &ctrl.set {
        if !builder.has_column(column) {
            return Err(DbError::BadInput(format!(
                "unknown column {column:?} on {}",
                builder.table
            )));
        }
        // A rendered form ending in `()` is a function call, e.g. NOW().
        let rendered = match value {
            SqlValue::Text(s) if s.ends_with("()") => s.clone(),
            other => qa.push(other.clone()),
        };
        assignments.push(format!("{column} = {rendered}"));
    }

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

    let table_ref = dialect.table(&builder.table);
    let set_list = assignments.join(", ");
    let mut sql = if dialect.name() == DialectName::Clickhouse {
        format!("ALTER TABLE {table_ref} UPDATE {set_list}")
    } else {
        format!("UPDATE {table_ref} SET {set_list}")
    };
    if !fragments.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&fragments.join(" AND "));
    } else if dialect.name() == DialectName::Clickhouse {
        // mutations require a predicate
        sql.push_str(" WHERE 1");
    }

    Ok(BuiltQuery {
        sql: rewrite_placeholders(&sql, dialect.placeholder_style()),
        args: qa.into_args(),
        empty: false,
    })
}

impl Session {
    /// Insert rows into `table`. Column membership is not checked here;
    /// the backend enforces it.
    pub async fn bulk_insert(
        &self,
        table: &str,
        rows: &[Vec<SqlValue>],
        cols: &[&str],
    ) -> Result<crate::querier::ExecResult, DbError> {
        let built = build_bulk_insert(
            self.dialect().as_ref(),
            table,
            rows,
            cols,
            self.config().interpolate_args,
        )?;
        self.exec(&built.sql, &built.args).await
    }

    /// Apply an update descriptor to a registered table, returning the
    /// affected row count. A filter that proves the predicate empty
    /// issues no SQL.
    pub async fn update(&self, table: &str, ctrl: &UpdateCtrl) -> Result<u64, DbError> {
        let builder = self.db.table_builder(table)?;
        let built = build_update(
            self.dialect().as_ref(),
            &builder,
            ctrl,
            self.config().interpolate_args,
        )?;
        if built.empty {
            return Ok(0);
        }
        let result = self.exec(&built.sql, &built.args).await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect_cassandra::CassandraDialect;
    use crate::dialect_clickhouse::ClickhouseDialect;
    use crate::dialect_mysql::MysqlDialect;
    use crate::dialect_postgres::PostgresDialect;
    use crate::filter::ColumnFilter;

    fn sample_rows() -> Vec<Vec<SqlValue>> {
        vec![
            vec![SqlValue::Int(1), SqlValue::Text("a".into())],
            vec![SqlValue::Int(2), SqlValue::Text("b".into())],
        ]
    }

    #[test]
    fn mysql_parameterized_insert() {
        let built = build_bulk_insert(
            &MysqlDialect,
            "t",
            &sample_rows(),
            &["id", "name"],
            false,
        )
        .unwrap();
        assert_eq!(built.sql, "INSERT INTO t(id, name) VALUES (?,?), (?,?);");
        assert_eq!(
            built.args,
            vec![
                SqlValue::Int(1),
                SqlValue::Text("a".into()),
                SqlValue::Int(2),
                SqlValue::Text("b".into()),
            ]
        );
    }

    #[test]
    fn mssql_insert_uses_at_p_placeholders() {
        let built = build_bulk_insert(
            &crate::dialect_mssql::MssqlDialect::default(),
            "t",
            &sample_rows(),
            &["id", "name"],
            false,
        )
        .unwrap();
        assert_eq!(
            built.sql,
            "INSERT INTO t(id, name) VALUES (@p1,@p2), (@p3,@p4);"
        );
        assert_eq!(built.args.len(), 4);
    }

    #[test]
    fn cassandra_batch_insert() {
        let built = build_bulk_insert(
            &CassandraDialect::default(),
            "t",
            &sample_rows(),
            &["id", "name"],
            false,
        )
        .unwrap();
        assert_eq!(
            built.sql,
            "BEGIN BATCH\n\tINSERT INTO t(id, name) VALUES (?,?);\n\tINSERT INTO t(id, name) VALUES (?,?);\nAPPLY BATCH;"
        );
        assert_eq!(built.args.len(), 4);
    }

    #[test]
    fn cassandra_single_row_is_plain_insert() {
        let built = build_bulk_insert(
            &CassandraDialect::default(),
            "t",
            &sample_rows()[..1],
            &["id", "name"],
            false,
        )
        .unwrap();
        assert_eq!(built.sql, "INSERT INTO t(id, name) VALUES (?,?);");
    }

    #[test]
    fn interpolated_insert_renders_literals() {
        let built = build_bulk_insert(
            &PostgresDialect::default(),
            "t",
            &sample_rows(),
            &["id", "name"],
            true,
        )
        .unwrap();
        assert_eq!(built.sql, "INSERT INTO t(id, name) VALUES (1,'a'), (2,'b');");
        assert!(built.args.is_empty());
    }

    #[test]
    fn interpolated_dollar_literal_survives_rewrite() {
        // the final placeholder pass must not touch `$N`-looking text
        // inside an embedded literal
        let rows = vec![vec![SqlValue::Int(1), SqlValue::Text("$5 off".into())]];
        let built =
            build_bulk_insert(&MysqlDialect, "t", &rows, &["id", "note"], true).unwrap();
        assert_eq!(built.sql, "INSERT INTO t(id, note) VALUES (1,'$5 off');");
        assert!(built.args.is_empty());
    }

    #[test]
    fn mixed_literal_and_placeholder_update() {
        let mut ctrl = UpdateCtrl::default();
        ctrl.set
            .insert("state".to_string(), SqlValue::Text("$10 credit".into()));
        ctrl.where_cond
            .insert("id".to_string(), vec!["7".to_string()]);
        let built = build_update(
            &crate::dialect_mssql::MssqlDialect::default(),
            &jobs_builder(),
            &ctrl,
            false,
        )
        .unwrap();
        // the bound value is untouched; only the canonical marker rewrites
        assert_eq!(built.sql, "UPDATE jobs SET state = @p1 WHERE jobs.id = @p2");
        assert_eq!(
            built.args,
            vec![SqlValue::Text("$10 credit".into()), SqlValue::Int(7)]
        );
    }

    #[test]
    fn mismatched_row_width_is_bad_input() {
        let err = build_bulk_insert(
            &MysqlDialect,
            "t",
            &[vec![SqlValue::Int(1)]],
            &["id", "name"],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::BadInput(_)));
    }

    fn jobs_builder() -> TableQueryBuilder {
        TableQueryBuilder::new("jobs")
            .with_column("id", ColumnFilter::Id)
            .with_column(
                "state",
                ColumnFilter::Str {
                    max_len: 32,
                    allow_likes: false,
                },
            )
            .with_column("updated", ColumnFilter::Time)
    }

    #[test]
    fn update_with_where() {
        let mut ctrl = UpdateCtrl::default();
        ctrl.set
            .insert("state".to_string(), SqlValue::Text("done".into()));
        ctrl.where_cond
            .insert("id".to_string(), vec!["7".to_string()]);
        let built = build_update(&PostgresDialect::default(), &jobs_builder(), &ctrl, false)
            .unwrap();
        assert_eq!(
            built.sql,
            "UPDATE jobs SET state = $1 WHERE jobs.id = $2"
        );
        assert_eq!(
            built.args,
            vec![SqlValue::Text("done".into()), SqlValue::Int(7)]
        );
    }

    #[test]
    fn update_function_call_is_embedded() {
        let mut ctrl = UpdateCtrl::default();
        ctrl.set
            .insert("updated".to_string(), SqlValue::Text("NOW()".into()));
        ctrl.where_cond
            .insert("id".to_string(), vec!["7".to_string()]);
        let built = build_update(&PostgresDialect::default(), &jobs_builder(), &ctrl, false)
            .unwrap();
        assert_eq!(built.sql, "UPDATE jobs SET updated = NOW() WHERE jobs.id = $1");
        assert_eq!(built.args, vec![SqlValue::Int(7)]);
    }

    #[test]
    fn clickhouse_update_uses_alter_table() {
        let mut ctrl = UpdateCtrl::default();
        ctrl.set
            .insert("state".to_string(), SqlValue::Text("done".into()));
        ctrl.where_cond
            .insert("id".to_string(), vec!["7".to_string()]);
        let built = build_update(&ClickhouseDialect, &jobs_builder(), &ctrl, false).unwrap();
        assert_eq!(
            built.sql,
            "ALTER TABLE jobs UPDATE state = ? WHERE jobs.id = ?"
        );
    }

    #[test]
    fn update_unknown_column_is_bad_input() {
        let mut ctrl = UpdateCtrl::default();
        ctrl.set
            .insert("ghost".to_string(), SqlValue::Int(0));
        let err =
            build_update(&PostgresDialect::default(), &jobs_builder(), &ctrl, false).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
