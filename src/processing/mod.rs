//! Checks and aggregates over canonical datasets.
//!
//! - [`reduce()`]: column reductions (count/sum/min/max/mean)
//! - [`validate_upstream`] / [`validate_downstream`]: physical and arithmetic consistency
//! - [`summarize_upstream`] / [`summarize_downstream`]: per-entity totals and weighted ratios
//!
//! ## Example: weighted extraction rate
//!
//! ```rust
//! use chrono::NaiveDate;
//! use palm_etl::model::{Plant, UpstreamRecord};
//! use palm_etl::processing::summarize_upstream;
//!
//! let day = |d| NaiveDate::from_ymd_opt(2025, 12, d).unwrap();
//! let mut rows = Vec::new();
//! for (d, rff, cpo) in [(1, 100.0, 20.0), (2, 300.0, 30.0)] {
//!     let mut rec = UpstreamRecord::new(day(d), Plant::Mlb);
//!     rec.rff_actual = Some(rff);
//!     rec.cpo_actual = Some(cpo);
//!     rows.push(rec);
//! }
//!
//! let summary = summarize_upstream(&rows, None);
//! assert_eq!(summary[0].weighted_tea, Some(12.5));
//! ```

pub mod reduce;
pub mod summary;
pub mod validate;

pub use reduce::{ReduceOp, reduce};
pub use summary::{PlantSummary, ProductSummary, Variance, summarize_downstream, summarize_upstream, variance};
pub use validate::{
    IssueKind, IssueLevel, ValidationIssue, ValidationReport, ValidationRules, validate_downstream,
    validate_upstream,
};
