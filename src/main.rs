use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use regdata_explorer::config::Catalog;
use regdata_explorer::data::export::{export_csv_string, ExportArtifact};
use regdata_explorer::data::{
    aggregate, aggregate_first, filter_all, load, AggregationSpec, Criterion, DatasetKind,
    FileSource, SourceId, Table,
};
use regdata_explorer::panel::{run_request, PanelReport, PanelRequest};

#[derive(Parser)]
#[command(version, about = "Browse, filter and export regulatory datasets")]
struct Cli {
    /// Snapshot directory used as the data source.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,
    /// JSON catalog replacing the built-in dataset configuration.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured datasets.
    Datasets,
    /// Print the effective catalog as JSON.
    Catalog,
    /// Run one dataset panel.
    Panel {
        /// mifid, firds or ssr
        kind: DatasetKind,
        /// Text for the dataset's text filter.
        #[arg(short, long)]
        filter: Option<String>,
        /// First day of the date range (inclusive).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day of the date range (inclusive).
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Row of the filtered listing to fetch.
        #[arg(short, long)]
        select: Option<usize>,
        /// Write the CSV export.
        #[arg(short, long)]
        download: bool,
        /// Directory receiving exported files.
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Filter and summarise any local CSV, JSON or Parquet file.
    Shape {
        file: PathBuf,
        /// COLUMN=TEXT substring criterion (repeatable).
        #[arg(long = "contains", value_parser = parse_contains)]
        contains: Vec<Contains>,
        /// Make --contains criteria case-sensitive.
        #[arg(long)]
        case_sensitive: bool,
        /// COLUMN=START..END inclusive date criterion (repeatable).
        #[arg(long = "between", value_parser = parse_between)]
        between: Vec<Between>,
        /// Count rows per value of this column.
        #[arg(long)]
        group_by: Option<String>,
        /// Keep only the N largest groups.
        #[arg(long, requires = "group_by")]
        top: Option<usize>,
        /// KEY:COL,COL – first values of COLs per distinct KEY.
        #[arg(long, value_parser = parse_first, conflicts_with = "group_by")]
        first: Option<First>,
        /// Write the result here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone)]
struct Contains {
    column: String,
    needle: String,
}

#[derive(Debug, Clone)]
struct Between {
    column: String,
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Debug, Clone)]
struct First {
    key: String,
    columns: Vec<String>,
}

fn parse_contains(s: &str) -> Result<Contains, String> {
    let (column, needle) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=TEXT, got '{s}'"))?;
    Ok(Contains {
        column: column.to_string(),
        needle: needle.to_string(),
    })
}

fn parse_between(s: &str) -> Result<Between, String> {
    let (column, range) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=START..END, got '{s}'"))?;
    let (start, end) = range
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got '{range}'"))?;
    let day = |d: &str| {
        d.parse::<NaiveDate>()
            .map_err(|e| format!("invalid date '{d}': {e}"))
    };
    Ok(Between {
        column: column.to_string(),
        start: day(start)?,
        end: day(end)?,
    })
}

fn parse_first(s: &str) -> Result<First, String> {
    let (key, columns) = s
        .split_once(':')
        .ok_or_else(|| format!("expected KEY:COL,COL, got '{s}'"))?;
    Ok(First {
        key: key.to_string(),
        columns: columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let catalog = match &cli.catalog {
        Some(path) => Catalog::from_json_file(path)?,
        None => Catalog::builtin(),
    };

    match cli.command {
        Commands::Datasets => {
            for dataset in &catalog.datasets {
                println!("{:<6} {}", dataset.kind, dataset.title);
            }
            Ok(())
        }
        Commands::Catalog => {
            println!("{}", catalog.to_json_pretty()?);
            Ok(())
        }
        Commands::Panel {
            kind,
            filter,
            from,
            to,
            select,
            download,
            out,
        } => {
            let date_range = match (from, to) {
                (None, None) => None,
                (from, to) => Some((
                    from.unwrap_or(NaiveDate::MIN),
                    to.unwrap_or(NaiveDate::MAX),
                )),
            };
            let request = PanelRequest {
                kind: Some(kind),
                text: filter,
                date_range,
                selected_row: select,
                download,
            };
            let source = FileSource::new(&cli.data_dir);
            let report = run_request(&source, &catalog, &request);
            print_report(&report)?;
            write_artifacts(&report, &out)?;
            if report.has_errors() {
                bail!("panel '{kind}' reported errors");
            }
            Ok(())
        }
        Commands::Shape {
            file,
            contains,
            case_sensitive,
            between,
            group_by,
            top,
            first,
            out,
        } => {
            let mut criteria: Vec<Criterion> = contains
                .into_iter()
                .map(|c| Criterion::Substring {
                    column: c.column,
                    needle: c.needle,
                    case_sensitive,
                })
                .collect();
            criteria.extend(
                between
                    .into_iter()
                    .map(|b| Criterion::between(b.column, b.start, b.end)),
            );
            let result = shape(&file, &criteria, group_by, top, first)?;
            let text = export_csv_string(&result)?;
            match out {
                Some(path) => std::fs::write(&path, text)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => print!("{text}"),
            }
            Ok(())
        }
    }
}

fn shape(
    file: &Path,
    criteria: &[Criterion],
    group_by: Option<String>,
    top: Option<usize>,
    first: Option<First>,
) -> Result<Table> {
    let locator = file
        .to_str()
        .ok_or_else(|| anyhow!("path {} is not valid UTF-8", file.display()))?;
    let source = FileSource::new(".");
    let table = load::<_, &str>(&source, &SourceId::File(locator.to_string()), &[])?;

    let filtered = filter_all(&table, criteria);
    for warning in &filtered.warnings {
        eprintln!("warning: {warning}");
    }
    if filtered.invalid_dates > 0 {
        eprintln!(
            "info: {} row(s) without a valid date were excluded",
            filtered.invalid_dates
        );
    }
    eprintln!("{} of {} rows match", filtered.matched, table.len());

    let shaped = if let Some(column) = group_by {
        let spec = AggregationSpec { group_by: column, limit: top };
        aggregate(&filtered.table, &spec)
    } else if let Some(first) = first {
        aggregate_first(&filtered.table, &first.key, first.columns.as_slice())
    } else {
        return Ok(filtered.table);
    };
    for warning in &shaped.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(shaped.table)
}

/// `start .. end`, with the open-ended sentinels shown as `open`.
fn describe_range(start: NaiveDate, end: NaiveDate) -> String {
    let bound = |d: NaiveDate| {
        if d == NaiveDate::MIN || d == NaiveDate::MAX {
            "open".to_string()
        } else {
            d.to_string()
        }
    };
    format!("{} .. {}", bound(start), bound(end))
}

fn print_report(report: &PanelReport) -> Result<()> {
    println!("== {} ==", report.title);
    for message in &report.messages {
        println!("{message}");
    }
    if let Some((start, end)) = report.date_range {
        println!("date range: {}", describe_range(start, end));
    }
    println!("{} of {} rows match", report.matched, report.total);
    if !report.listing.is_empty() {
        println!();
        print!("{}", export_csv_string(&report.listing)?);
    }
    if let Some(chart) = &report.chart {
        println!();
        println!("-- top values --");
        print!("{}", export_csv_string(chart)?);
    }
    if let Some(file) = &report.file {
        println!();
        println!("-- {} ({} rows) --", file.locator, file.rows);
        print!("{}", export_csv_string(&file.preview)?);
    }
    Ok(())
}

fn write_artifacts(report: &PanelReport, out: &Path) -> Result<()> {
    let artifacts: Vec<&ExportArtifact> = report
        .export
        .iter()
        .chain(report.file.iter().filter_map(|f| f.export.as_ref()))
        .collect();
    if artifacts.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    for artifact in artifacts {
        let path = out.join(artifact.file_name());
        std::fs::write(&path, artifact.bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {} ({})", path.display(), artifact.mime_type());
        println!("saved {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn half_open_ranges_print_as_open() {
        assert_eq!(
            describe_range(date(2023, 1, 1), NaiveDate::MAX),
            "2023-01-01 .. open"
        );
        assert_eq!(
            describe_range(NaiveDate::MIN, date(2023, 6, 15)),
            "open .. 2023-06-15"
        );
        assert_eq!(
            describe_range(date(2023, 1, 1), date(2023, 1, 2)),
            "2023-01-01 .. 2023-01-02"
        );
    }

    #[test]
    fn between_argument_parses() {
        let between = parse_between("publication_date=2023-01-01..2023-01-31").unwrap();
        assert_eq!(between.column, "publication_date");
        assert_eq!(between.start, date(2023, 1, 1));
        assert_eq!(between.end, date(2023, 1, 31));
        assert!(parse_between("publication_date=2023-01-01").is_err());
    }
}
