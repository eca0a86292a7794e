//! `palm-etl` turns the palm-oil group's loosely structured tracking workbooks into canonical,
//! append-only time series: one row per (date, plant) upstream, one row per (date, product)
//! downstream, one row per (date, plant code) for the kernel mass balance.
//!
//! ## Pipeline
//!
//! raw workbook → [`extract`] (date-column detection, value normalization, record extraction
//! driven by a [`layout`]) → [`merge`] (date-range replacement or in-place patch) → [`store`]
//! (atomic CSV/Parquet rewrite). [`pipeline::Pipeline`] runs that cycle per source family.
//!
//! **Source families:**
//!
//! - **Seguimiento** (daily tracking workbook): upstream and downstream rows
//! - **GEO_CPO** (per-plant CPO database): upstream rows with tank levels and measured quality
//! - **CZZ_CPKO** (kernel expeller): patches kernel fields of existing Codazzi rows
//! - **Planeación** (planning workbook): patches budget fields of existing rows
//! - **Monthly history CSV**: month-end upstream rows, kept in their own file
//! - **Kernel mass-balance reports** (JSON): one row per plant-day
//!
//! Values are `Option<f64>` end to end: an empty or unreadable cell is absent, a zero is a zero.
//!
//! ## Quick example: import a tracking workbook
//!
//! ```no_run
//! use palm_etl::pipeline::{Pipeline, SourceFamily};
//! use palm_etl::settings::Settings;
//!
//! # fn main() -> Result<(), palm_etl::EtlError> {
//! let pipeline = Pipeline::from_settings(Settings::default())?;
//! // No path: the newest `*SEGUIMIENTO*.xlsx` in `data/` is used.
//! let report = pipeline.import(SourceFamily::Seguimiento, None)?;
//! print!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`layout`]: declarative cell-locator documents per source family
//! - [`extract`]: workbook access and one extractor per source family
//! - [`model`]: typed observations and the [`model::Observation`] trait
//! - [`merge`]: historical merge engine and patch pass
//! - [`store`]: dataset reader/writer (CSV, Parquet)
//! - [`processing`]: validation, reductions and summaries
//! - [`pipeline`]: import orchestration, observers and source discovery
//! - [`settings`]: runtime configuration
//! - [`types`]: storage-neutral schema and dataset types
//! - [`error`]: error types used across the crate

pub mod error;
pub mod extract;
pub mod layout;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod processing;
pub mod settings;
pub mod store;
pub mod types;

pub use error::{EtlError, EtlResult};
