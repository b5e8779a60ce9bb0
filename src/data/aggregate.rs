use std::collections::HashMap;

use super::error::FilterWarning;
use super::model::{Row, Table, Value};
use super::schema::SchemaReport;

/// Key column of a grouped-count table.
pub const GROUP_KEY_COLUMN: &str = "group_key";
/// Count column of a grouped-count table.
pub const COUNT_COLUMN: &str = "count";
/// Key under which null cells are grouped.
pub const UNKNOWN_KEY: &str = "unknown";

// ---------------------------------------------------------------------------
// Aggregation spec
// ---------------------------------------------------------------------------

/// Grouped count over one column, descending by count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationSpec {
    pub group_by: String,
    /// Keep only the `limit` most frequent groups.
    pub limit: Option<usize>,
}

impl AggregationSpec {
    pub fn new(group_by: impl Into<String>) -> Self {
        AggregationSpec {
            group_by: group_by.into(),
            limit: None,
        }
    }

    pub fn top(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    pub table: Table,
    pub warnings: Vec<FilterWarning>,
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Distinct keys of `col` in first-encounter order, with the index of each
/// key's first row and its row count. Nulls share the `"unknown"` key.
fn groups(table: &Table, col: usize) -> Vec<(Value, usize, usize)> {
    let mut order: Vec<(Value, usize, usize)> = Vec::new();
    let mut index: HashMap<Value, usize> = HashMap::new();

    for (i, row) in table.rows().iter().enumerate() {
        let key = match &row[col] {
            Value::Null => Value::Text(UNKNOWN_KEY.to_string()),
            other => other.clone(),
        };
        match index.get(&key) {
            Some(&slot) => order[slot].2 += 1,
            None => {
                index.insert(key.clone(), order.len());
                order.push((key, i, 1));
            }
        }
    }
    order
}

fn counts_header() -> Vec<String> {
    vec![GROUP_KEY_COLUMN.to_string(), COUNT_COLUMN.to_string()]
}

/// Count rows per distinct value of `spec.group_by`.
///
/// The result has columns `(group_key, count)`, sorted by descending count;
/// equal counts keep the order in which their keys first appeared.
pub fn aggregate(table: &Table, spec: &AggregationSpec) -> AggregateOutcome {
    let empty_counts = || Table::from_parts(counts_header(), Vec::new());

    if table.is_empty() {
        return AggregateOutcome {
            table: empty_counts(),
            warnings: vec![FilterWarning::NoData],
        };
    }
    let report = SchemaReport::validate(table, &[spec.group_by.as_str()]);
    let Some(col) = report.capability(&spec.group_by).map(|c| c.index) else {
        log::warn!("group-by column '{}' not found", spec.group_by);
        return AggregateOutcome {
            table: empty_counts(),
            warnings: vec![FilterWarning::ColumnNotFound(spec.group_by.clone())],
        };
    };

    let mut grouped = groups(table, col);
    // Stable: ties stay in first-encounter order.
    grouped.sort_by(|a, b| b.2.cmp(&a.2));
    if let Some(limit) = spec.limit {
        grouped.truncate(limit);
    }

    let rows: Vec<Row> = grouped
        .into_iter()
        .map(|(key, _, count)| vec![key, Value::Integer(count as i64)])
        .collect();

    log::debug!(
        "aggregate by '{}': {} groups over {} rows",
        spec.group_by,
        rows.len(),
        table.len()
    );

    AggregateOutcome {
        table: Table::from_parts(counts_header(), rows),
        warnings: Vec::new(),
    }
}

/// One row per distinct value of `group_column`, carrying the
/// `value_columns` of the first row (in table order) with that value.
///
/// Output columns are `group_column` followed by the value columns that
/// exist; each missing one is reported and left out.
pub fn aggregate_first<S: AsRef<str>>(
    table: &Table,
    group_column: &str,
    value_columns: &[S],
) -> AggregateOutcome {
    let mut warnings = Vec::new();
    let wanted: Vec<&str> = std::iter::once(group_column)
        .chain(value_columns.iter().map(|c| c.as_ref()))
        .collect();
    let report = SchemaReport::validate(table, wanted.as_slice());

    let Some(key_col) = report.capability(group_column).map(|c| c.index) else {
        log::warn!("group column '{group_column}' not found");
        let warning = if table.is_empty() {
            FilterWarning::NoData
        } else {
            FilterWarning::ColumnNotFound(group_column.to_string())
        };
        return AggregateOutcome {
            table: Table::default(),
            warnings: vec![warning],
        };
    };

    let mut header = vec![group_column.to_string()];
    let mut value_idx = Vec::new();
    for name in value_columns {
        let name = name.as_ref();
        match report.capability(name).map(|c| c.index) {
            Some(i) if i != key_col && !value_idx.contains(&i) => {
                header.push(name.to_string());
                value_idx.push(i);
            }
            Some(_) => {}
            None => warnings.push(FilterWarning::ColumnNotFound(name.to_string())),
        }
    }

    if table.is_empty() {
        warnings.insert(0, FilterWarning::NoData);
    }

    let rows: Vec<Row> = groups(table, key_col)
        .into_iter()
        .map(|(key, first, _)| {
            let source = &table.rows()[first];
            let mut row = Vec::with_capacity(header.len());
            row.push(key);
            row.extend(value_idx.iter().map(|&i| source[i].clone()));
            row
        })
        .collect();

    AggregateOutcome {
        table: Table::from_parts(header, rows),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruments() -> Table {
        Table::new(
            vec!["instrument_type".into(), "file_name".into(), "size".into()],
            vec![
                vec!["EQUI".into(), "a.zip".into(), Value::Integer(10)],
                vec!["DEBT".into(), "b.zip".into(), Value::Integer(20)],
                vec!["DEBT".into(), "c.zip".into(), Value::Integer(30)],
                vec!["FUTR".into(), "d.zip".into(), Value::Integer(40)],
                vec![Value::Null, "e.zip".into(), Value::Integer(50)],
                vec!["EQUI".into(), "f.zip".into(), Value::Integer(60)],
            ],
        )
        .unwrap()
    }

    fn keys_and_counts(table: &Table) -> Vec<(String, i64)> {
        table
            .rows()
            .iter()
            .map(|r| match &r[1] {
                Value::Integer(n) => (r[0].to_string(), *n),
                other => panic!("count is not an integer: {other:?}"),
            })
            .collect()
    }

    #[test]
    fn counts_sorted_descending_with_stable_ties() {
        let out = aggregate(&instruments(), &AggregationSpec::new("instrument_type"));
        assert_eq!(out.table.column_names(), vec![GROUP_KEY_COLUMN, COUNT_COLUMN]);
        assert_eq!(
            keys_and_counts(&out.table),
            vec![
                ("EQUI".to_string(), 2),
                ("DEBT".to_string(), 2),
                ("FUTR".to_string(), 1),
                ("unknown".to_string(), 1),
            ]
        );
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn counts_sum_to_row_count() {
        let table = instruments();
        for column in ["instrument_type", "file_name", "size"] {
            let out = aggregate(&table, &AggregationSpec::new(column));
            let total: i64 = keys_and_counts(&out.table).iter().map(|(_, n)| n).sum();
            assert_eq!(total as usize, table.len(), "column {column}");
        }
    }

    #[test]
    fn limit_keeps_top_groups() {
        let out = aggregate(&instruments(), &AggregationSpec::new("instrument_type").top(1));
        assert_eq!(keys_and_counts(&out.table), vec![("EQUI".to_string(), 2)]);
    }

    #[test]
    fn all_null_column_groups_under_unknown() {
        let table = Table::new(
            vec!["k".into()],
            vec![vec![Value::Null], vec![Value::Null]],
        )
        .unwrap();
        let out = aggregate(&table, &AggregationSpec::new("k"));
        assert_eq!(keys_and_counts(&out.table), vec![("unknown".to_string(), 2)]);
    }

    #[test]
    fn empty_and_missing_column_are_warnings() {
        let out = aggregate(&Table::default(), &AggregationSpec::new("k"));
        assert!(out.table.is_empty());
        assert_eq!(out.warnings, vec![FilterWarning::NoData]);

        let out = aggregate(&instruments(), &AggregationSpec::new("venue"));
        assert!(out.table.is_empty());
        assert_eq!(out.warnings, vec![FilterWarning::ColumnNotFound("venue".into())]);
    }

    #[test]
    fn first_value_per_key() {
        let out = aggregate_first(&instruments(), "instrument_type", &["file_name", "size"]);
        assert_eq!(
            out.table.column_names(),
            vec!["instrument_type", "file_name", "size"]
        );
        let rows: Vec<Vec<String>> = out
            .table
            .rows()
            .iter()
            .map(|r| r.iter().map(|v| v.to_string()).collect())
            .collect();
        assert_eq!(
            rows,
            vec![
                vec!["EQUI", "a.zip", "10"],
                vec!["DEBT", "b.zip", "20"],
                vec!["FUTR", "d.zip", "40"],
                vec!["unknown", "e.zip", "50"],
            ]
        );
    }

    #[test]
    fn first_value_skips_missing_value_columns() {
        let out = aggregate_first(&instruments(), "instrument_type", &["venue", "size"]);
        assert_eq!(out.table.column_names(), vec!["instrument_type", "size"]);
        assert_eq!(out.warnings, vec![FilterWarning::ColumnNotFound("venue".into())]);
        assert_eq!(out.table.len(), 4);
    }

    #[test]
    fn first_value_on_empty_table() {
        let empty = Table::with_columns(vec!["k".into(), "v".into()]).unwrap();
        let out = aggregate_first(&empty, "k", &["v"]);
        assert!(out.table.is_empty());
        assert_eq!(out.table.column_names(), vec!["k", "v"]);
        assert_eq!(out.warnings, vec![FilterWarning::NoData]);
    }
}
