//! Filter, summarise and export regulatory datasets.
//!
//! [`data`] holds the pure table pipeline, [`config`] the per-dataset
//! catalog, and [`panel`] wires both together for a front end.

pub mod config;
pub mod data;
pub mod panel;

pub use config::{Catalog, DatasetConfig};
pub use data::{DataClient, DatasetKind, FileSource, SourceId, Table, Value};
pub use panel::{run_all, run_panel, run_request, PanelMessage, PanelReport, PanelRequest};
