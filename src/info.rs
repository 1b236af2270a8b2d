//! Server-settings dump and tunable recommendations.
use prettytable::{Cell, Row as TableRow, Table};

use crate::database::Database;
use crate::dialect::{DialectName, Recommendation};
use crate::error::DbError;
use crate::session::SessionCtx;

/// How a live setting compares to the dialect's declared expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationSeverity {
    Ok,
    BelowMin,
    BelowRecommended,
    Mismatch,
    /// the setting was not present in the dump, or did not parse
    Unknown,
}

#[derive(Debug, Clone)]
pub struct RecommendationStatus {
    pub setting: &'static str,
    pub meaning: &'static str,
    pub current: Option<String>,
    pub severity: RecommendationSeverity,
}

impl Database {
    /// Dump the server settings as `(name, value)` pairs using the
    /// dialect's catalog query (`SHOW ALL`, `SHOW VARIABLES`,
    /// `sys.configurations`, `system.settings`, `system.local`).
    pub async fn settings(&self) -> Result<Vec<(String, String)>, DbError> {
        let session = self.session(SessionCtx::new());
        let mut rows = session
            .query(self.dialect().settings_query(), &[])
            .await?;
        let mut out = Vec::new();

        // system.local is one wide row; pair column names with values.
        let transpose = self.dialect().name() == DialectName::Cassandra;
        let columns: Vec<String> = rows.columns().to_vec();
        while let Some(row) = rows.next_row()? {
            if transpose {
                for (idx, column) in columns.iter().enumerate() {
                    let value = row
                        .value(idx)?
                        .as_string()
                        .unwrap_or_default();
                    out.push((column.clone(), value));
                }
            } else if row.len() >= 2 {
                out.push((row.get_string(0)?, row.get_string(1)?));
            } else if row.len() == 1 {
                out.push((row.get_string(0)?, String::new()));
            }
        }
        rows.close()?;
        Ok(out)
    }

    /// The settings dump rendered as a bordered two-column table.
    pub async fn settings_table(&self) -> Result<String, DbError> {
        let settings = self.settings().await?;
        Ok(format_settings(&settings))
    }

    /// Compare the live settings against the dialect's declared
    /// tunables.
    pub async fn recommendations_report(
        &self,
    ) -> Result<Vec<RecommendationStatus>, DbError> {
        let settings = self.settings().await?;
        let recommendations = self.dialect().recommendations();
        Ok(check_recommendations(&settings, &recommendations))
    }
}

/// Render `(name, value)` pairs with prettytable.
pub fn format_settings(settings: &[(String, String)]) -> String {
    let mut table = Table::new();
    table.add_row(TableRow::new(vec![Cell::new("name"), Cell::new("value")]));
    for (name, value) in settings {
        table.add_row(TableRow::new(vec![Cell::new(name), Cell::new(value)]));
    }
    table.to_string()
}

pub(crate) fn check_recommendations(
    settings: &[(String, String)],
    recommendations: &[Recommendation],
) -> Vec<RecommendationStatus> {
    recommendations
        .iter()
        .map(|rec| {
            let current = settings
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(rec.setting))
                .map(|(_, value)| value.clone());
            let severity = match &current {
                None => RecommendationSeverity::Unknown,
                Some(value) => classify(value, rec),
            };
            RecommendationStatus {
                setting: rec.setting,
                meaning: rec.meaning,
                current,
                severity,
            }
        })
        .collect()
}

fn classify(value: &str, rec: &Recommendation) -> RecommendationSeverity {
    if let Some(expected) = rec.expected_value {
        return if value.eq_ignore_ascii_case(expected) {
            RecommendationSeverity::Ok
        } else {
            RecommendationSeverity::Mismatch
        };
    }
    let Some(numeric) = parse_size(value) else {
        return RecommendationSeverity::Unknown;
    };
    if let Some(min) = rec.min_value {
        if numeric < min {
            return RecommendationSeverity::BelowMin;
        }
    }
    if let Some(recommended) = rec.recommended_value {
        if numeric < recommended {
            return RecommendationSeverity::BelowRecommended;
        }
    }
    RecommendationSeverity::Ok
}

/// Parse a numeric setting, honoring the memory-unit suffixes PostgreSQL
/// and MySQL report (`kB`, `MB`, `GB`, `TB`).
fn parse_size(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if let Ok(plain) = trimmed.parse::<i64>() {
        return Some(plain);
    }
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .filter(|&idx| idx > 0)?;
    let number: i64 = trimmed[..split].parse().ok()?;
    let multiplier = match trimmed[split..].trim() {
        "kB" | "KB" | "k" => 1 << 10,
        "MB" | "M" => 1 << 20,
        "GB" | "G" => 1 << 30,
        "TB" | "T" => 1i64 << 40,
        _ => return None,
    };
    Some(number * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2048", Some(2048))]
    #[case("128MB", Some(128 << 20))]
    #[case("8kB", Some(8 << 10))]
    #[case("1GB", Some(1 << 30))]
    #[case("on", None)]
    fn size_parse(#[case] input: &str, #[case] expected: Option<i64>) {
        assert_eq!(parse_size(input), expected);
    }

    #[test]
    fn recommendations_classify() {
        let settings = vec![
            ("max_connections".to_string(), "100".to_string()),
            ("shared_buffers".to_string(), "4GB".to_string()),
            ("autovacuum".to_string(), "off".to_string()),
        ];
        let recs = vec![
            Recommendation {
                setting: "max_connections",
                meaning: "",
                expected_value: None,
                min_value: Some(512),
                recommended_value: Some(2048),
            },
            Recommendation {
                setting: "shared_buffers",
                meaning: "",
                expected_value: None,
                min_value: Some(1 << 30),
                recommended_value: Some(2 << 30),
            },
            Recommendation {
                setting: "autovacuum",
                meaning: "",
                expected_value: Some("on"),
                min_value: None,
                recommended_value: None,
            },
            Recommendation {
                setting: "work_mem",
                meaning: "",
                expected_value: None,
                min_value: Some(1),
                recommended_value: None,
            },
        ];
        let report = check_recommendations(&settings, &recs);
        assert_eq!(report[0].severity, RecommendationSeverity::BelowMin);
        assert_eq!(report[1].severity, RecommendationSeverity::Ok);
        assert_eq!(report[2].severity, RecommendationSeverity::Mismatch);
        assert_eq!(report[3].severity, RecommendationSeverity::Unknown);
    }

    #[test]
    fn settings_render_as_table() {
        let rendered = format_settings(&[("a".to_string(), "1".to_string())]);
        assert!(rendered.contains("name"));
        assert!(rendered.contains("a"));
    }
}
