use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Table construction
// ---------------------------------------------------------------------------

/// A table could not be assembled because its rows do not fit its header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("row {row} has {found} values but the header has {expected} columns")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Failure of the loader adapter. Always shown to the user as an error;
/// an empty table is *not* a `LoadError`.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The collaborator call itself failed (I/O, network, missing file).
    #[error("failed to fetch {source_id}: {cause}")]
    Fetch { source_id: String, cause: String },
    /// The collaborator answered, but the content could not be understood.
    #[error("malformed data from {source_id}: {cause}")]
    Malformed { source_id: String, cause: String },
    /// The table lacks columns the dataset is expected to carry.
    #[error("{source_id} is missing expected column(s): {}", .columns.join(", "))]
    MissingColumns {
        source_id: String,
        columns: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("flushing CSV output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("exported CSV is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

// ---------------------------------------------------------------------------
// Warnings (non-fatal)
// ---------------------------------------------------------------------------

/// Non-fatal conditions raised while shaping a table. Processing always
/// continues; the caller decides how to phrase the guidance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterWarning {
    /// The input table had no rows at all.
    NoData,
    /// The referenced column does not exist; the step was skipped.
    ColumnNotFound(String),
    /// The date column holds no parseable date.
    NoValidDates { column: String },
    /// Valid input, but nothing satisfied the criterion.
    NoMatches,
}

impl fmt::Display for FilterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterWarning::NoData => write!(f, "No data found."),
            FilterWarning::ColumnNotFound(col) => {
                write!(f, "Column '{col}' not found; criterion ignored.")
            }
            FilterWarning::NoValidDates { column } => {
                write!(f, "No valid dates found in column '{column}'.")
            }
            FilterWarning::NoMatches => write!(f, "No rows match the current filters."),
        }
    }
}
