//! Data layer: the dataset panel pipeline.
//!
//! Architecture:
//! ```text
//!   DataClient (regulator client, local snapshot, ...)
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  fetch → Table | LoadError, expected-column check
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  substring / date-range criteria → new Table + warnings
//!   └──────────┘
//!        │
//!        ├──────────────┐
//!        ▼              ▼
//!   ┌──────────┐   ┌───────────┐
//!   │  export   │   │ aggregate  │  grouped counts, first value per key
//!   └──────────┘   └───────────┘
//!   CSV artifact
//! ```
//!
//! Every stage is a pure function over an immutable [`model::Table`].

pub mod aggregate;
pub mod error;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod schema;

pub use aggregate::{aggregate, aggregate_first, AggregateOutcome, AggregationSpec};
pub use error::{ExportError, FilterWarning, LoadError, TableError};
pub use export::{export_csv, ExportArtifact};
pub use filter::{date_bounds, filter, filter_all, Criterion, FilterOutcome};
pub use loader::{load, parse_csv, DataClient, DatasetKind, FileSource, SourceId};
pub use model::{ColumnType, Table, Value};
pub use schema::{ColumnCapability, SchemaReport};
