use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use super::error::TableError;

/// Rendering used for date cells.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Rendering used for date-time cells; the fraction is omitted when zero.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Alternative date-time layouts accepted when reading text cells.
const DATETIME_INPUT_FORMATS: &[&str] = &[DATETIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f"];

// ---------------------------------------------------------------------------
// Value – a single cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
/// Equality, `Ord` and `Hash` are implemented by hand so values can key
/// group maps (floats compare by `total_cmp`, so `NaN` groups with itself).
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
                Date(_) => 5,
                DateTime(_) => 6,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Text(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Null => {}
        }
    }
}

/// Canonical textual form: the exact string written to CSV and searched by
/// the substring filter. Null renders as the empty string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Null => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Value {
    /// Guess the type of a raw text field.
    ///
    /// A typed value is only returned when its canonical rendering gives back
    /// exactly `s`; anything else stays text. `"1.50"` is therefore text,
    /// `"1.5"` a float, and exporting a re-read table reproduces its fields.
    pub fn infer(s: &str) -> Value {
        if s.is_empty() {
            return Value::Null;
        }
        let candidate = if let Ok(i) = s.parse::<i64>() {
            Value::Integer(i)
        } else if let Ok(f) = s.parse::<f64>() {
            Value::Float(f)
        } else if s == "true" || s == "false" {
            Value::Bool(s == "true")
        } else if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
            Value::Date(d)
        } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT) {
            Value::DateTime(dt)
        } else {
            return Value::Text(s.to_string());
        };

        if candidate.to_string() == s {
            candidate
        } else {
            Value::Text(s.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Calendar date carried by the cell, if any. Text cells are parsed as
    /// ISO dates or date-times; anything else is not a date.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::Text(s) => parse_date(s.trim()),
            _ => None,
        }
    }

    fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Integer(_) | Value::Float(_) => Some(ColumnType::Numeric),
            Value::Date(_) | Value::DateTime(_) => Some(ColumnType::Date),
            Value::Text(_) | Value::Bool(_) => Some(ColumnType::Text),
        }
    }
}

/// Parse an ISO date, or the date part of an ISO date-time.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Some(d);
    }
    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

// ---------------------------------------------------------------------------
// Schema – column descriptors
// ---------------------------------------------------------------------------

/// Semantic type of a column; only decides comparison semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Numeric,
    Date,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
}

/// Ordered column descriptors plus a name index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
    index: HashMap<String, usize>,
}

impl Schema {
    fn infer(names: Vec<String>, rows: &[Vec<Value>]) -> Self {
        let columns: Vec<ColumnDescriptor> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let mut seen = rows.iter().filter_map(|row| row[i].column_type());
                let column_type = match seen.next() {
                    None => ColumnType::Unknown,
                    Some(first) => {
                        if seen.all(|t| t == first) {
                            first
                        } else {
                            ColumnType::Unknown
                        }
                    }
                };
                ColumnDescriptor { name, column_type }
            })
            .collect();
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Schema { columns, index }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.index_of(name).map(|i| self.columns[i].column_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Table – immutable rows with a uniform schema
// ---------------------------------------------------------------------------

/// One row, aligned with the table's column order.
pub type Row = Vec<Value>;

/// An immutable, ordered table. Every shaping operation builds a new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    schema: Schema,
    rows: Vec<Row>,
}

impl Table {
    /// Build a table, checking that names are unique and rows fit the header.
    ///
    /// A table without columns has no rows either: rows of zero cells carry
    /// nothing and cannot be written back as CSV.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, TableError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::RaggedRow {
                    row: i,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Table::assemble(columns, rows))
    }

    /// A zero-row table with the given header.
    pub fn with_columns(columns: Vec<String>) -> Result<Self, TableError> {
        Table::new(columns, Vec::new())
    }

    /// Build a table from keyed records. Column order is first appearance;
    /// a key missing from a record becomes `Null`, a repeated key keeps the
    /// last value. Records without any key give an empty table.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Vec<(String, Value)>>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut rows: Vec<Row> = Vec::new();

        for record in records {
            let mut row = vec![Value::Null; columns.len()];
            for (key, value) in record {
                let i = match index.get(&key) {
                    Some(&i) => i,
                    None => {
                        let i = columns.len();
                        index.insert(key.clone(), i);
                        columns.push(key);
                        for earlier in &mut rows {
                            earlier.push(Value::Null);
                        }
                        row.push(Value::Null);
                        i
                    }
                };
                row[i] = value;
            }
            rows.push(row);
        }

        Table::assemble(columns, rows)
    }

    fn assemble(columns: Vec<String>, rows: Vec<Row>) -> Table {
        let rows = if columns.is_empty() { Vec::new() } else { rows };
        let schema = Schema::infer(columns, &rows);
        Table { schema, rows }
    }

    /// Build a table whose shape the caller already guarantees: unique names
    /// and rows exactly as wide as the header.
    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Row>) -> Table {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Table::assemble(columns, rows)
    }

    /// Same header, subset of rows in the given order. Indices are trusted.
    pub(crate) fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            schema: self.schema.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.names().map(str::to_string).collect()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.len()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.schema.index_of(column)?;
        self.rows.get(row).map(|r| &r[col])
    }

    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let col = self.schema.index_of(column)?;
        Some(self.rows.iter().map(move |r| &r[col]))
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        Table {
            schema: self.schema.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}
