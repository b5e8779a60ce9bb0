use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::data::filter::Criterion;
use crate::data::loader::{DatasetKind, SourceId};
use crate::data::AggregationSpec;

// ---------------------------------------------------------------------------
// Per-dataset configuration
// ---------------------------------------------------------------------------

/// Free-text filter input bound to one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFilter {
    pub column: String,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Upper-case the user's input before matching (codes such as `EQUI`).
    #[serde(default)]
    pub uppercase: bool,
}

impl TextFilter {
    pub fn criterion(&self, input: &str) -> Criterion {
        let needle = if self.uppercase {
            input.to_uppercase()
        } else {
            input.to_string()
        };
        Criterion::Substring {
            column: self.column.clone(),
            needle,
            case_sensitive: self.case_sensitive,
        }
    }
}

/// What a date filter does when the user gave no range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateDefault {
    /// Show only the most recent date present in the table.
    Latest,
    /// No filtering.
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFilter {
    pub column: String,
    #[serde(default)]
    pub default: DateDefault,
}

/// Grouped-count chart drawn next to the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub group_by: String,
    #[serde(default)]
    pub top: Option<usize>,
}

impl ChartSpec {
    pub fn aggregation(&self) -> AggregationSpec {
        AggregationSpec {
            group_by: self.group_by.clone(),
            limit: self.top,
        }
    }
}

fn default_preview() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub kind: DatasetKind,
    pub title: String,
    pub source: SourceId,
    /// Columns a non-empty load must carry.
    #[serde(default)]
    pub expected_columns: Vec<String>,
    #[serde(default)]
    pub text_filter: Option<TextFilter>,
    #[serde(default)]
    pub date_filter: Option<DateFilter>,
    #[serde(default)]
    pub chart: Option<ChartSpec>,
    /// Column holding the locator of each listed file, for listings whose
    /// rows can be downloaded.
    #[serde(default)]
    pub download_column: Option<String>,
    #[serde(default = "default_preview")]
    pub listing_preview: usize,
    #[serde(default = "default_preview")]
    pub file_preview: usize,
    pub export_file_name: String,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub datasets: Vec<DatasetConfig>,
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::builtin()
    }
}

impl Catalog {
    /// The three regulatory datasets the explorer ships with.
    pub fn builtin() -> Self {
        let strings = |cols: &[&str]| cols.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        Catalog {
            datasets: vec![
                DatasetConfig {
                    kind: DatasetKind::Mifid,
                    title: "MiFID II Dataset".into(),
                    source: SourceId::FileList(DatasetKind::Mifid),
                    expected_columns: strings(&["publication_date", "download_link"]),
                    text_filter: None,
                    date_filter: Some(DateFilter {
                        column: "publication_date".into(),
                        default: DateDefault::Latest,
                    }),
                    chart: Some(ChartSpec {
                        group_by: "file_type".into(),
                        top: Some(10),
                    }),
                    download_column: Some("download_link".into()),
                    listing_preview: 100,
                    file_preview: 100,
                    export_file_name: "mifid_data.csv".into(),
                },
                DatasetConfig {
                    kind: DatasetKind::Firds,
                    title: "FIRDS (Instrument Reference Data)".into(),
                    source: SourceId::FileList(DatasetKind::Firds),
                    expected_columns: strings(&["instrument_type", "download_link"]),
                    text_filter: Some(TextFilter {
                        column: "instrument_type".into(),
                        case_sensitive: true,
                        uppercase: true,
                    }),
                    date_filter: None,
                    chart: Some(ChartSpec {
                        group_by: "instrument_type".into(),
                        top: Some(10),
                    }),
                    download_column: Some("download_link".into()),
                    listing_preview: 50,
                    file_preview: 100,
                    export_file_name: "firds_data.csv".into(),
                },
                DatasetConfig {
                    kind: DatasetKind::Ssr,
                    title: "SSR (Short Selling Exemptions)".into(),
                    source: SourceId::Reference(DatasetKind::Ssr),
                    expected_columns: strings(&["issuer_name"]),
                    text_filter: Some(TextFilter {
                        column: "issuer_name".into(),
                        case_sensitive: false,
                        uppercase: false,
                    }),
                    date_filter: None,
                    chart: Some(ChartSpec {
                        group_by: "country_code".into(),
                        top: Some(10),
                    }),
                    download_column: None,
                    listing_preview: 100,
                    file_preview: 100,
                    export_file_name: "ssr_data.csv".into(),
                },
            ],
        }
    }

    pub fn get(&self, kind: DatasetKind) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.kind == kind)
    }

    /// Parse a catalog from JSON and check it.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(text).context("parsing catalog JSON")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        Catalog::from_json_str(&text).with_context(|| format!("loading catalog {}", path.display()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing catalog")
    }

    /// One entry per dataset kind, and an export name for each.
    pub fn validate(&self) -> Result<()> {
        for (i, dataset) in self.datasets.iter().enumerate() {
            if self.datasets[..i].iter().any(|d| d.kind == dataset.kind) {
                bail!("dataset '{}' is configured twice", dataset.kind);
            }
            if dataset.export_file_name.trim().is_empty() {
                bail!("dataset '{}' has an empty export file name", dataset.kind);
            }
        }
        Ok(())
    }
}
