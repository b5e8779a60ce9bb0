use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::error::{LoadError, TableError};
use super::model::{Row, Table, Value};
use super::schema::SchemaReport;

// ---------------------------------------------------------------------------
// Source identifiers
// ---------------------------------------------------------------------------

/// The regulatory datasets a panel can browse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// MiFID II file publications.
    Mifid,
    /// FIRDS instrument reference data files.
    Firds,
    /// Short-selling regulation exempted shares.
    Ssr,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [DatasetKind::Mifid, DatasetKind::Firds, DatasetKind::Ssr];

    pub fn slug(self) -> &'static str {
        match self {
            DatasetKind::Mifid => "mifid",
            DatasetKind::Firds => "firds",
            DatasetKind::Ssr => "ssr",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.slug())
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DatasetKind::ALL
            .into_iter()
            .find(|k| k.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown dataset '{s}' (expected mifid, firds or ssr)"))
    }
}

/// What to ask the collaborator for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceId {
    /// File-list metadata published for a dataset.
    FileList(DatasetKind),
    /// A fixed reference dataset.
    Reference(DatasetKind),
    /// One downloadable file, by locator.
    File(String),
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::FileList(kind) => write!(f, "{kind} file list"),
            SourceId::Reference(kind) => write!(f, "{kind} reference data"),
            SourceId::File(locator) => write!(f, "file '{locator}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator seam
// ---------------------------------------------------------------------------

/// Anything that can produce a table for a [`SourceId`]: the regulator's
/// data client, a local snapshot, a test double.
pub trait DataClient {
    fn fetch(&self, source: &SourceId) -> Result<Table>;
}

/// Marks a collaborator error as "answered, but the content is unusable".
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MalformedSource(pub String);

fn is_malformed(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<MalformedSource>()
            || cause.is::<csv::Error>()
            || cause.is::<serde_json::Error>()
            || cause.is::<parquet::errors::ParquetError>()
            || cause.is::<arrow::error::ArrowError>()
            || cause.is::<TableError>()
    })
}

/// Ask `client` for `source` and check the result carries `expected` columns.
///
/// A table without rows is a successful load; its columns are not checked,
/// since an empty answer often comes without a header.
pub fn load<C, S>(client: &C, source: &SourceId, expected: &[S]) -> Result<Table, LoadError>
where
    C: DataClient + ?Sized,
    S: AsRef<str>,
{
    let source_id = source.to_string();
    let table = client.fetch(source).map_err(|e| {
        let cause = format!("{e:#}");
        if is_malformed(&e) {
            LoadError::Malformed { source_id: source_id.clone(), cause }
        } else {
            LoadError::Fetch { source_id: source_id.clone(), cause }
        }
    })?;

    if !table.is_empty() {
        let report = SchemaReport::validate(&table, expected);
        if !report.is_complete() {
            return Err(LoadError::MissingColumns {
                source_id,
                columns: report.missing(),
            });
        }
    }

    log::info!(
        "Loaded {} rows from {source_id} with columns {:?}",
        table.len(),
        table.column_names()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// Local snapshot collaborator
// ---------------------------------------------------------------------------

const SNAPSHOT_EXTENSIONS: [&str; 3] = ["csv", "json", "parquet"];

/// Serves datasets from a snapshot directory:
///
/// ```text
/// <root>/<dataset>/files.{csv,json,parquet}      file lists
/// <root>/<dataset>/reference.{csv,json,parquet}  reference data
/// <root>/<locator>                               downloadable files
/// ```
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSource { root: root.into() }
    }

    fn find_snapshot(&self, kind: DatasetKind, stem: &str) -> Result<PathBuf> {
        let dir = self.root.join(kind.slug());
        SNAPSHOT_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{stem}.{ext}")))
            .find(|p| p.is_file())
            .with_context(|| format!("no {stem}.{{csv,json,parquet}} under {}", dir.display()))
    }

    fn resolve(&self, source: &SourceId) -> Result<PathBuf> {
        match source {
            SourceId::FileList(kind) => self.find_snapshot(*kind, "files"),
            SourceId::Reference(kind) => self.find_snapshot(*kind, "reference"),
            SourceId::File(locator) => {
                let locator = locator.strip_prefix("file://").unwrap_or(locator);
                if locator.contains("://") {
                    bail!("remote locator '{locator}' is not available in a local snapshot");
                }
                let path = Path::new(locator);
                Ok(if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.root.join(path)
                })
            }
        }
    }
}

impl DataClient for FileSource {
    fn fetch(&self, source: &SourceId) -> Result<Table> {
        let path = self.resolve(source)?;
        log::debug!("{source} resolved to {}", path.display());
        load_file(&path)
    }
}

// ---------------------------------------------------------------------------
// File readers
// ---------------------------------------------------------------------------

/// Read a table from a file. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, values type-inferred per cell
/// * `.json`    – `[{ "column": value, ... }, ...]`
/// * `.parquet` – scalar columns (strings, integers, floats, booleans, dates, timestamps)
pub fn load_file(path: &Path) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading {}", path.display()))?;
            parse_csv(&bytes).with_context(|| format!("parsing {}", path.display()))
        }
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => Err(MalformedSource(format!("unsupported file extension: .{other}")).into()),
    }
}

/// Parse CSV bytes: the first line names the columns, every field is typed
/// with [`Value::infer`]. Empty input gives an empty table.
pub fn parse_csv(bytes: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        rows.push(record.iter().map(Value::infer).collect::<Row>());
    }

    Ok(Table::new(headers, rows)?)
}

// -- JSON --

/// Records-oriented JSON: a top-level array of flat objects. Key order of
/// first appearance becomes column order.
fn load_json(path: &Path) -> Result<Table> {
    let bytes = std::fs::read(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_slice(&bytes).context("parsing JSON")?;

    let records = root
        .as_array()
        .ok_or_else(|| MalformedSource("expected a top-level JSON array".into()))?;

    let mut parsed = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| MalformedSource(format!("row {i} is not a JSON object")))?;
        parsed.push(
            obj.iter()
                .map(|(key, val)| (key.clone(), json_to_value(val)))
                .collect::<Vec<_>>(),
        );
    }

    Ok(Table::from_records(parsed))
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                n.as_f64().map_or(Value::Null, Value::Float)
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        nested => Value::Text(nested.to_string()),
    }
}

// -- Parquet --

fn load_parquet(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            rows.push(
                batch
                    .columns()
                    .iter()
                    .map(|col| extract_value(col, row))
                    .collect::<Row>(),
            );
        }
    }

    Ok(Table::new(columns, rows)?)
}

/// Extract one cell from an Arrow column. Types without a scalar mapping
/// fall back to Arrow's own rendering.
fn extract_value(col: &ArrayRef, row: usize) -> Value {
    if col.is_null(row) {
        return Value::Null;
    }
    let date_time = |dt: Option<chrono::NaiveDateTime>| dt.map_or(Value::Null, Value::DateTime);
    match col.data_type() {
        DataType::Utf8 => Value::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Int8 => Value::Integer(col.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => Value::Integer(col.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => Value::Integer(col.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => Value::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::Integer(col.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => Value::Integer(col.as_primitive::<UInt16Type>().value(row).into()),
        DataType::UInt32 => Value::Integer(col.as_primitive::<UInt32Type>().value(row).into()),
        DataType::UInt64 => {
            let v = col.as_primitive::<UInt64Type>().value(row);
            i64::try_from(v).map_or(Value::Float(v as f64), Value::Integer)
        }
        DataType::Float32 => Value::Float(col.as_primitive::<Float32Type>().value(row).into()),
        DataType::Float64 => Value::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => Value::Bool(col.as_boolean().value(row)),
        DataType::Date32 => col
            .as_primitive::<Date32Type>()
            .value_as_date(row)
            .map_or(Value::Null, Value::Date),
        DataType::Date64 => col
            .as_primitive::<Date64Type>()
            .value_as_date(row)
            .map_or(Value::Null, Value::Date),
        DataType::Timestamp(TimeUnit::Second, _) => {
            date_time(col.as_primitive::<TimestampSecondType>().value_as_datetime(row))
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            date_time(col.as_primitive::<TimestampMillisecondType>().value_as_datetime(row))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            date_time(col.as_primitive::<TimestampMicrosecondType>().value_as_datetime(row))
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            date_time(col.as_primitive::<TimestampNanosecondType>().value_as_datetime(row))
        }
        _ => array_value_to_string(col.as_ref(), row).map_or(Value::Null, Value::Text),
    }
}
