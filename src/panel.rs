use std::fmt;

use chrono::NaiveDate;

use crate::config::{Catalog, DateDefault, DatasetConfig};
use crate::data::aggregate::aggregate;
use crate::data::export::ExportArtifact;
use crate::data::filter::{date_bounds, filter_all, Criterion};
use crate::data::loader::{load, DataClient, DatasetKind, SourceId};
use crate::data::model::Table;
use crate::data::schema::SchemaReport;

// ---------------------------------------------------------------------------
// Request / report
// ---------------------------------------------------------------------------

/// Everything the front end collects for one panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelRequest {
    pub kind: Option<DatasetKind>,
    /// Free text for the dataset's text filter.
    pub text: Option<String>,
    /// Inclusive date range for the dataset's date filter.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// Row of the filtered listing whose file should be fetched.
    pub selected_row: Option<usize>,
    /// Produce a CSV artifact.
    pub download: bool,
}

impl PanelRequest {
    pub fn new(kind: DatasetKind) -> Self {
        PanelRequest {
            kind: Some(kind),
            ..Default::default()
        }
    }
}

/// A user-visible outcome. Errors never escape the panel as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelMessage {
    Info(String),
    Warning(String),
    Error(String),
}

impl PanelMessage {
    pub fn is_error(&self) -> bool {
        matches!(self, PanelMessage::Error(_))
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, PanelMessage::Warning(_))
    }
}

impl fmt::Display for PanelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelMessage::Info(msg) => write!(f, "info: {msg}"),
            PanelMessage::Warning(msg) => write!(f, "warning: {msg}"),
            PanelMessage::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// A fetched file, previewed and optionally exported.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePreview {
    pub locator: String,
    /// Row count of the whole file.
    pub rows: usize,
    pub preview: Table,
    pub export: Option<ExportArtifact>,
}

/// What the renderer needs to draw one panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelReport {
    pub kind: Option<DatasetKind>,
    pub title: String,
    /// Rows loaded before filtering.
    pub total: usize,
    /// Rows left after filtering.
    pub matched: usize,
    /// First rows of the filtered listing.
    pub listing: Table,
    /// Date range actually applied.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub chart: Option<Table>,
    /// The filtered listing as CSV, for datasets without per-row files.
    pub export: Option<ExportArtifact>,
    pub file: Option<FilePreview>,
    pub messages: Vec<PanelMessage>,
}

impl PanelReport {
    fn new(kind: Option<DatasetKind>, title: impl Into<String>) -> Self {
        PanelReport {
            kind,
            title: title.into(),
            total: 0,
            matched: 0,
            listing: Table::default(),
            date_range: None,
            chart: None,
            export: None,
            file: None,
            messages: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(PanelMessage::is_error)
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.messages.push(PanelMessage::Info(msg.into()));
    }

    fn warn(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::warn!("{}: {msg}", self.title);
        self.messages.push(PanelMessage::Warning(msg));
    }

    fn error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::error!("{}: {msg}", self.title);
        self.messages.push(PanelMessage::Error(msg));
    }
}

// ---------------------------------------------------------------------------
// Pipeline orchestration
// ---------------------------------------------------------------------------

/// Run one panel: load → filter → chart → export / file download.
pub fn run_panel<C>(client: &C, config: &DatasetConfig, request: &PanelRequest) -> PanelReport
where
    C: DataClient + ?Sized,
{
    let mut report = PanelReport::new(Some(config.kind), config.title.clone());

    let table = match load(client, &config.source, config.expected_columns.as_slice()) {
        Ok(table) => table,
        Err(e) => {
            report.error(e.to_string());
            return report;
        }
    };
    report.total = table.len();
    if table.is_empty() {
        report.warn("No data found.");
        return report;
    }

    let criteria = criteria_for(config, request, &table, &mut report);
    let outcome = filter_all(&table, &criteria);
    for warning in &outcome.warnings {
        report.warn(warning.to_string());
    }
    if outcome.invalid_dates > 0 {
        report.info(format!(
            "{} row(s) without a valid date were excluded.",
            outcome.invalid_dates
        ));
    }

    report.matched = outcome.matched;
    report.listing = outcome.table.head(config.listing_preview);
    if report.listing.len() < outcome.matched {
        report.info(format!(
            "Showing the first {} of {} rows.",
            report.listing.len(),
            outcome.matched
        ));
    }

    if let Some(chart) = &config.chart {
        let available = SchemaReport::validate(&outcome.table, &[chart.group_by.as_str()]);
        if !available.has_column(&chart.group_by) {
            report.info(format!("Chart column '{}' is not available.", chart.group_by));
        } else if !outcome.table.is_empty() {
            report.chart = Some(aggregate(&outcome.table, &chart.aggregation()).table);
        }
    }

    match (&config.download_column, request.selected_row) {
        (Some(column), Some(row)) => {
            let file = fetch_selected(client, config, request, &outcome.table, column, row, &mut report);
            report.file = file;
        }
        (Some(_), None) if request.download => {
            report.warn("Select a file row to download.");
        }
        (None, Some(_)) => {
            report.warn("Rows of this dataset have no downloadable file.");
        }
        (None, None) if request.download => {
            match ExportArtifact::from_table(config.export_file_name.clone(), &outcome.table) {
                Ok(artifact) => report.export = Some(artifact),
                Err(e) => report.error(format!("Export failed: {e}")),
            }
        }
        _ => {}
    }

    report
}

/// Turn the request's inputs into filter criteria for this dataset.
fn criteria_for(
    config: &DatasetConfig,
    request: &PanelRequest,
    table: &Table,
    report: &mut PanelReport,
) -> Vec<Criterion> {
    let mut criteria = Vec::new();

    let text = request.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    match (&config.text_filter, text) {
        (Some(text_filter), Some(text)) => criteria.push(text_filter.criterion(text)),
        (None, Some(_)) => report.warn("This dataset has no text filter; input ignored."),
        _ => {}
    }

    if let Some(date_filter) = &config.date_filter {
        let range = match (request.date_range, date_filter.default) {
            (Some(range), _) => Some(range),
            (None, DateDefault::Latest) => match date_bounds(table, &date_filter.column) {
                Some((_, latest)) => Some((latest, latest)),
                // No valid date: an unbounded range yields the empty table and
                // the "no valid dates" warning.
                None => {
                    criteria.push(Criterion::between(
                        date_filter.column.clone(),
                        NaiveDate::MIN,
                        NaiveDate::MAX,
                    ));
                    None
                }
            },
            (None, DateDefault::All) => None,
        };
        if let Some((start, end)) = range {
            if start > end {
                report.warn(format!("Start date {start} is after end date {end}."));
            }
            criteria.push(Criterion::between(date_filter.column.clone(), start, end));
            report.date_range = Some((start, end));
        }
    } else if request.date_range.is_some() {
        report.warn("This dataset has no date filter; range ignored.");
    }

    criteria
}

fn fetch_selected<C>(
    client: &C,
    config: &DatasetConfig,
    request: &PanelRequest,
    listing: &Table,
    column: &str,
    row: usize,
    report: &mut PanelReport,
) -> Option<FilePreview>
where
    C: DataClient + ?Sized,
{
    if row >= listing.len() {
        report.warn(format!(
            "Row {row} is out of range ({} rows match).",
            listing.len()
        ));
        return None;
    }
    let locator = listing
        .value(row, column)
        .map(|v| v.to_string())
        .filter(|s| !s.is_empty());
    let Some(locator) = locator else {
        report.warn(format!("Row {row} has no '{column}'."));
        return None;
    };

    let file = match load::<_, &str>(client, &SourceId::File(locator.clone()), &[]) {
        Ok(file) => file,
        Err(e) => {
            report.error(e.to_string());
            return None;
        }
    };
    if file.is_empty() {
        report.warn(format!("File '{locator}' contains no data."));
    }

    let export = if request.download {
        match ExportArtifact::from_table(config.export_file_name.clone(), &file) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                report.error(format!("Export failed: {e}"));
                None
            }
        }
    } else {
        None
    };

    Some(FilePreview {
        locator,
        rows: file.len(),
        preview: file.head(config.file_preview),
        export,
    })
}

/// Look the request's dataset up in `catalog` and run it.
pub fn run_request<C>(client: &C, catalog: &Catalog, request: &PanelRequest) -> PanelReport
where
    C: DataClient + ?Sized,
{
    match request.kind.and_then(|kind| catalog.get(kind)) {
        Some(config) => run_panel(client, config, request),
        None => {
            let mut report = PanelReport::new(request.kind, "Unknown dataset");
            match request.kind {
                Some(kind) => report.error(format!("Dataset '{kind}' is not configured.")),
                None => report.error("No dataset selected."),
            }
            report
        }
    }
}

/// Run several panels; each one succeeds or fails on its own.
pub fn run_all<C>(client: &C, catalog: &Catalog, requests: &[PanelRequest]) -> Vec<PanelReport>
where
    C: DataClient + ?Sized,
{
    requests
        .iter()
        .map(|request| run_request(client, catalog, request))
        .collect()
}
