use super::error::ExportError;
use super::model::Table;

pub const CSV_MIME: &str = "text/csv";

// ---------------------------------------------------------------------------
// CSV serialization
// ---------------------------------------------------------------------------

/// Serialize `table` as UTF-8, comma-delimited CSV with a header row.
///
/// Fields are written in their canonical form (`Value`'s `Display`): ISO
/// dates, time only for date-time cells, numbers as stored, null as an empty
/// field. A field is quoted only when it contains a comma, a quote or a line
/// break. Lines end with `\n`. Output depends on nothing but the table.
pub fn export_csv(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b',')
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    if table.num_columns() > 0 {
        writer.write_record(table.schema().names())?;
    }
    let mut fields: Vec<String> = Vec::with_capacity(table.num_columns());
    for row in table.rows() {
        fields.clear();
        fields.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&fields)?;
    }

    writer.flush()?;
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Same as [`export_csv`], as a `String`.
pub fn export_csv_string(table: &Table) -> Result<String, ExportError> {
    Ok(String::from_utf8(export_csv(table)?)?)
}

// ---------------------------------------------------------------------------
// Export artifact
// ---------------------------------------------------------------------------

/// A ready-to-download CSV file. Built on demand from the table the user is
/// looking at and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    file_name: String,
    bytes: Vec<u8>,
}

impl ExportArtifact {
    pub fn from_table(file_name: impl Into<String>, table: &Table) -> Result<Self, ExportError> {
        let file_name = file_name.into();
        let bytes = export_csv(table)?;
        log::info!(
            "exported {} rows to {file_name} ({} bytes)",
            table.len(),
            bytes.len()
        );
        Ok(ExportArtifact { file_name, bytes })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        CSV_MIME
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
