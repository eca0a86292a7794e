//! Planning workbook: daily budget (ME) per plant, used to correct budgets of existing rows.

use chrono::NaiveDate;
use tracing::{info, warn};

use super::Extraction;
use super::dates::detect_date_columns_in_row;
use super::normalize::NormalizePolicy;
use super::workbook::{Workbook, collect_drift};
use crate::layout::BudgetLayout;
use crate::merge::Patch;
use crate::model::{Plant, UpstreamRecord, round_to};

/// Budget fields of one (date, plant), in tonnes. `None` leaves the stored value alone, except
/// for budgets derived from one the patch replaces (see [`BudgetPatch::apply_to`]).
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetPatch {
    pub date: NaiveDate,
    pub plant: Plant,
    pub rff_budget: Option<f64>,
    pub cpo_budget: Option<f64>,
    pub palm_kernel_budget: Option<f64>,
    pub kernel_budget: Option<f64>,
    pub kernel_oil_budget: Option<f64>,
    /// Share of the CPO budget taken as palm-kernel budget when it must be re-derived.
    pub palm_kernel_share: f64,
}

impl BudgetPatch {
    fn is_empty(&self) -> bool {
        self.rff_budget.is_none()
            && self.cpo_budget.is_none()
            && self.palm_kernel_budget.is_none()
            && self.kernel_budget.is_none()
            && self.kernel_oil_budget.is_none()
    }
}

impl Patch<UpstreamRecord> for BudgetPatch {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn entity_key(&self) -> &str {
        self.plant.as_str()
    }

    /// Overwrites the budgets the patch carries. A new RFF budget without a CPO budget
    /// re-derives CPO from the stored TEA target, and a changed CPO budget without a
    /// palm-kernel budget re-derives palm kernel from it.
    fn apply_to(&self, rec: &mut UpstreamRecord) {
        let cpo_budget = self.cpo_budget.or_else(|| {
            let rff = self.rff_budget?;
            let target = rec.tea_target?;
            Some(round_to(rff * target / 100.0, 2))
        });
        let palm_kernel_budget = self.palm_kernel_budget.or_else(|| {
            cpo_budget
                .filter(|&cpo| rec.cpo_budget != Some(cpo))
                .map(|cpo| round_to(cpo * self.palm_kernel_share, 2))
        });
        for (field, value) in [
            (&mut rec.rff_budget, self.rff_budget),
            (&mut rec.cpo_budget, cpo_budget),
            (&mut rec.palm_kernel_budget, palm_kernel_budget),
            (&mut rec.kernel_budget, self.kernel_budget),
            (&mut rec.kernel_oil_budget, self.kernel_oil_budget),
        ] {
            if value.is_some() {
                *field = value;
            }
        }
    }
}

pub fn extract_budget(book: &Workbook, layout: &BudgetLayout) -> Extraction<BudgetPatch> {
    let mut out = Extraction::default();
    let Some(sheet) = book.sheet(&layout.sheet) else {
        out.note_missing_sheet(&layout.sheet);
        return out;
    };
    let dates = detect_date_columns_in_row(sheet.range, layout.header_row, layout.first_date_column);
    if dates.is_empty() {
        warn!(sheet = sheet.name, "no date columns found");
        return out;
    }

    let policy = NormalizePolicy::default();
    let tonnes = |row: u32, col: u32| {
        sheet
            .number(row, col, &policy)
            .map(|v| round_to(layout.mass_unit.to_tonnes(v), 2))
    };

    let kernel_rows = match &layout.kernel {
        Some(rows) => {
            let drift = collect_drift([&rows.kernel, &rows.kernel_oil], |loc| {
                sheet.check_row_label(layout.label_column, loc)
            });
            if drift.is_empty() {
                Some(rows)
            } else {
                out.note_drift("kernel", drift);
                None
            }
        }
        None => None,
    };

    for rows in &layout.plants {
        let drift = collect_drift(
            [&rows.rff, &rows.cpo, &rows.palm_kernel, &rows.palm_kernel_cpo],
            |loc| sheet.check_row_label(layout.label_column, loc),
        );
        if !drift.is_empty() {
            out.note_drift(rows.plant.as_str(), drift);
            continue;
        }
        let kernel = kernel_rows.filter(|k| k.plant == rows.plant);
        for (&col, &date) in &dates {
            // The palm-kernel budget only counts on days its gate row is filled in.
            let palm_kernel_budget = sheet
                .number(rows.palm_kernel.index(), col, &policy)
                .and_then(|_| tonnes(rows.palm_kernel_cpo.index(), col));
            let patch = BudgetPatch {
                date,
                plant: rows.plant,
                rff_budget: tonnes(rows.rff.index(), col),
                cpo_budget: tonnes(rows.cpo.index(), col),
                palm_kernel_budget,
                kernel_budget: kernel.and_then(|k| tonnes(k.kernel.index(), col)),
                kernel_oil_budget: kernel.and_then(|k| tonnes(k.kernel_oil.index(), col)),
                palm_kernel_share: layout.palm_kernel_share,
            };
            if !patch.is_empty() {
                out.records.push(patch);
            }
        }
    }
    info!(patches = out.records.len(), days = dates.len(), "planning budget extracted");
    out
}
