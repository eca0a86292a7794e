//! Record extractors, one per source family, plus the cell-level helpers they share.

pub mod balance;
pub mod budget;
pub mod cpko;
pub mod dates;
pub mod geo_cpo;
pub mod historical;
pub mod normalize;
pub mod seguimiento;
pub mod workbook;

use tracing::warn;

use crate::layout::LayoutDrift;

pub use balance::{BalanceReport, daily_balance, extract_balance_reports, parse_reports};
pub use budget::{BudgetPatch, extract_budget};
pub use cpko::{KernelPatch, extract_cpko};
pub use dates::{detect_date_columns, detect_date_columns_in_row};
pub use geo_cpo::extract_geo_cpo;
pub use historical::extract_historical;
pub use normalize::{NormalizePolicy, normalize, parse_number_text, scale_fraction};
pub use seguimiento::{SeguimientoExtraction, extract_seguimiento};
pub use workbook::{Sheet, Workbook};

/// Output of one extractor run over one source.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub records: Vec<T>,
    /// Blocks skipped because a label cell no longer matched.
    pub drift: Vec<LayoutDrift>,
    /// Configured sheets the workbook does not contain.
    pub missing_sheets: Vec<String>,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            drift: Vec::new(),
            missing_sheets: Vec::new(),
        }
    }
}

impl<T> Extraction<T> {
    pub(crate) fn note_missing_sheet(&mut self, sheet: &str) {
        if !self.missing_sheets.iter().any(|s| s == sheet) {
            warn!(sheet, "sheet not found; extracting nothing from it");
            self.missing_sheets.push(sheet.to_string());
        }
    }

    pub(crate) fn note_drift(&mut self, block: &str, drift: Vec<LayoutDrift>) {
        for d in &drift {
            warn!(block, drift = %d, "layout drift; skipping block");
        }
        self.drift.extend(drift);
    }
}
