use std::collections::BTreeMap;

use super::model::{ColumnType, Table};

// ---------------------------------------------------------------------------
// Capability report: which expected columns a table actually carries
// ---------------------------------------------------------------------------

/// Where a column sits in a table and how its cells compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnCapability {
    pub index: usize,
    pub column_type: ColumnType,
}

/// Result of validating a table once against the columns a stage relies on.
///
/// Filters and aggregates build one report per input table and read column
/// positions and types from it. Shaping keeps the header, so a report stays
/// valid for every table derived from the one it was built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    /// expected column → its capability, or `None` when absent.
    columns: BTreeMap<String, Option<ColumnCapability>>,
}

impl SchemaReport {
    /// Check `table` for each of the `expected` column names.
    pub fn validate<S: AsRef<str>>(table: &Table, expected: &[S]) -> Self {
        let schema = table.schema();
        let columns = expected
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let capability = schema.index_of(name).zip(schema.column_type(name)).map(
                    |(index, column_type)| ColumnCapability { index, column_type },
                );
                (name.to_string(), capability)
            })
            .collect();
        SchemaReport { columns }
    }

    /// `true` when `column` was expected and is present.
    pub fn has_column(&self, column: &str) -> bool {
        self.capability(column).is_some()
    }

    pub fn capability(&self, column: &str) -> Option<ColumnCapability> {
        self.columns.get(column).copied().flatten()
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.capability(column).map(|c| c.column_type)
    }

    /// Expected columns the table lacks, in name order.
    pub fn missing(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, c)| c.is_none())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.columns.values().all(Option::is_some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Value;

    #[test]
    fn reports_present_and_missing_columns() {
        let table = Table::new(
            vec!["issuer_name".into(), "isin".into()],
            vec![vec![Value::from("Acme"), Value::from("FR0000000001")]],
        )
        .unwrap();
        let report = SchemaReport::validate(&table, &["issuer_name", "publication_date"]);

        assert!(report.has_column("issuer_name"));
        assert!(!report.has_column("publication_date"));
        assert!(!report.has_column("isin"), "only expected columns are reported");
        assert_eq!(report.column_type("issuer_name"), Some(ColumnType::Text));
        assert_eq!(report.missing(), vec!["publication_date".to_string()]);
        assert!(!report.is_complete());
    }

    #[test]
    fn capability_carries_position_and_type() {
        let table = Table::new(
            vec!["isin".into(), "listed".into(), "shares".into()],
            vec![vec![
                Value::from("FR0000000001"),
                Value::Date(chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
                Value::Integer(10),
            ]],
        )
        .unwrap();
        let report = SchemaReport::validate(&table, &["shares", "listed"]);
        assert_eq!(
            report.capability("listed"),
            Some(ColumnCapability { index: 1, column_type: ColumnType::Date })
        );
        assert_eq!(
            report.capability("shares"),
            Some(ColumnCapability { index: 2, column_type: ColumnType::Numeric })
        );
        assert_eq!(report.capability("isin"), None);
    }

    #[test]
    fn nothing_expected_is_complete() {
        let report = SchemaReport::validate::<&str>(&Table::default(), &[]);
        assert!(report.is_complete());
        assert!(report.missing().is_empty());
    }
}
