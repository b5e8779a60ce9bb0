use chrono::NaiveDate;

use super::error::FilterWarning;
use super::model::{ColumnType, Table, Value};
use super::schema::SchemaReport;

// ---------------------------------------------------------------------------
// Filter criteria
// ---------------------------------------------------------------------------

/// One predicate over a named column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    /// Keep rows whose cell contains `needle` (stringified, nulls never match).
    Substring {
        column: String,
        needle: String,
        case_sensitive: bool,
    },
    /// Keep rows whose cell is a date within `start..=end`.
    DateRange {
        column: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

impl Criterion {
    /// Case-insensitive substring match.
    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Criterion::Substring {
            column: column.into(),
            needle: needle.into(),
            case_sensitive: false,
        }
    }

    pub fn contains_exact_case(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Criterion::Substring {
            column: column.into(),
            needle: needle.into(),
            case_sensitive: true,
        }
    }

    pub fn between(column: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Criterion::DateRange {
            column: column.into(),
            start,
            end,
        }
    }

    /// Single-day range.
    pub fn on(column: impl Into<String>, day: NaiveDate) -> Self {
        Criterion::between(column, day, day)
    }

    pub fn column(&self) -> &str {
        match self {
            Criterion::Substring { column, .. } | Criterion::DateRange { column, .. } => column,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// Rows that passed, in input order.
    pub table: Table,
    /// Number of rows in `table`.
    pub matched: usize,
    /// Rows dropped by a date range because their cell held no valid date.
    pub invalid_dates: usize,
    pub warnings: Vec<FilterWarning>,
}

impl FilterOutcome {
    fn unchanged(table: &Table, warning: FilterWarning) -> Self {
        FilterOutcome {
            table: table.clone(),
            matched: table.len(),
            invalid_dates: 0,
            warnings: vec![warning],
        }
    }

    pub fn has_warning(&self, warning: &FilterWarning) -> bool {
        self.warnings.contains(warning)
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Apply one criterion, returning a new table.
///
/// * An empty input yields an empty table and [`FilterWarning::NoData`].
/// * An unknown column leaves the table as is and reports
///   [`FilterWarning::ColumnNotFound`].
/// * A date range over a column with no parseable date yields an empty table
///   and [`FilterWarning::NoValidDates`]; otherwise zero matches yield
///   [`FilterWarning::NoMatches`].
/// * Date ranges read cells by column type: date columns by their typed
///   value, text and mixed columns by parsing, numeric columns not at all.
pub fn filter(table: &Table, criterion: &Criterion) -> FilterOutcome {
    if table.is_empty() {
        return FilterOutcome::unchanged(table, FilterWarning::NoData);
    }
    let report = SchemaReport::validate(table, &[criterion.column()]);
    apply(table, criterion, &report)
}

/// Date carried by `cell`, read the way its column's type dictates.
fn cell_date(column_type: ColumnType, cell: &Value) -> Option<NaiveDate> {
    match column_type {
        // Digits such as 20230101 are amounts or ids, never dates.
        ColumnType::Numeric => None,
        ColumnType::Date => match cell {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None,
        },
        ColumnType::Text | ColumnType::Unknown => cell.as_date(),
    }
}

/// One criterion against a non-empty table, using a report built on that
/// table or on one it was filtered from.
fn apply(table: &Table, criterion: &Criterion, report: &SchemaReport) -> FilterOutcome {
    let column = criterion.column();
    let Some(capability) = report.capability(column) else {
        log::warn!("filter column '{column}' not found, skipping criterion");
        return FilterOutcome::unchanged(table, FilterWarning::ColumnNotFound(column.to_string()));
    };
    let col = capability.index;

    let mut invalid_dates = 0;
    let mut warnings = Vec::new();

    let indices: Vec<usize> = match criterion {
        Criterion::Substring {
            needle,
            case_sensitive,
            ..
        } => {
            let needle = if *case_sensitive {
                needle.clone()
            } else {
                needle.to_lowercase()
            };
            table
                .rows()
                .iter()
                .enumerate()
                .filter(|(_, row)| {
                    let cell = &row[col];
                    if cell.is_null() {
                        return false;
                    }
                    let text = cell.to_string();
                    if *case_sensitive {
                        text.contains(needle.as_str())
                    } else {
                        text.to_lowercase().contains(needle.as_str())
                    }
                })
                .map(|(i, _)| i)
                .collect()
        }
        Criterion::DateRange { start, end, .. } => {
            let mut valid = 0;
            let mut hits = Vec::new();
            for (i, row) in table.rows().iter().enumerate() {
                match cell_date(capability.column_type, &row[col]) {
                    Some(d) => {
                        valid += 1;
                        if *start <= d && d <= *end {
                            hits.push(i);
                        }
                    }
                    None => invalid_dates += 1,
                }
            }
            if valid == 0 {
                warnings.push(FilterWarning::NoValidDates {
                    column: column.to_string(),
                });
            }
            hits
        }
    };

    if indices.is_empty() && warnings.is_empty() {
        warnings.push(FilterWarning::NoMatches);
    }

    log::debug!(
        "filter on '{column}': {} of {} rows kept ({invalid_dates} invalid dates)",
        indices.len(),
        table.len()
    );

    FilterOutcome {
        table: table.select_rows(&indices),
        matched: indices.len(),
        invalid_dates,
        warnings,
    }
}

/// Left fold of [`filter`] over `criteria`. Stops early once nothing is left,
/// so a single `NoMatches` describes the empty result. The input table is
/// validated once for every criterion column.
pub fn filter_all(table: &Table, criteria: &[Criterion]) -> FilterOutcome {
    if table.is_empty() {
        return FilterOutcome::unchanged(table, FilterWarning::NoData);
    }
    let columns: Vec<&str> = criteria.iter().map(Criterion::column).collect();
    let report = SchemaReport::validate(table, columns.as_slice());

    let mut acc = FilterOutcome {
        table: table.clone(),
        matched: table.len(),
        invalid_dates: 0,
        warnings: Vec::new(),
    };
    for criterion in criteria {
        let step = apply(&acc.table, criterion, &report);
        acc.table = step.table;
        acc.matched = step.matched;
        acc.invalid_dates += step.invalid_dates;
        acc.warnings.extend(step.warnings);
        if acc.table.is_empty() {
            break;
        }
    }
    acc
}

/// Earliest and latest valid date in `column`; `None` when there is none.
pub fn date_bounds(table: &Table, column: &str) -> Option<(NaiveDate, NaiveDate)> {
    table
        .column_values(column)?
        .filter_map(|v| v.as_date())
        .fold(None, |acc, d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })
}
