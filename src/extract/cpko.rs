//! Kernel expeller workbook. Produces patches for existing upstream rows of the kernel plant;
//! it never yields rows of its own.

use chrono::NaiveDate;
use tracing::info;

use super::Extraction;
use super::normalize::NormalizePolicy;
use super::workbook::{Workbook, collect_drift};
use crate::layout::CpkoLayout;
use crate::merge::Patch;
use crate::model::{Plant, UpstreamRecord, ratio_pct, round_to};

/// Kernel fields of one (date, plant), in tonnes.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelPatch {
    pub date: NaiveDate,
    pub plant: Plant,
    pub kernel_actual: Option<f64>,
    pub kernel_oil_actual: Option<f64>,
    pub kernel_oil_budget: Option<f64>,
    pub kernel_extraction: Option<f64>,
}

impl Patch<UpstreamRecord> for KernelPatch {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn entity_key(&self) -> &str {
        self.plant.as_str()
    }

    /// Overwrite the kernel fields this patch carries; absent values leave the row untouched.
    fn apply_to(&self, rec: &mut UpstreamRecord) {
        for (field, value) in [
            (&mut rec.kernel_actual, self.kernel_actual),
            (&mut rec.kernel_oil_actual, self.kernel_oil_actual),
            (&mut rec.kernel_oil_budget, self.kernel_oil_budget),
            (&mut rec.kernel_extraction, self.kernel_extraction),
        ] {
            if value.is_some() {
                *field = value;
            }
        }
    }
}

pub fn extract_cpko(book: &Workbook, layout: &CpkoLayout) -> Extraction<KernelPatch> {
    let mut out = Extraction::default();
    let Some(sheet) = book.sheet(&layout.sheet) else {
        out.note_missing_sheet(&layout.sheet);
        return out;
    };
    // Column labels, when configured, sit on the row above the data.
    let header_row = layout.data_start_row.saturating_sub(1);
    let drift = collect_drift(
        [
            &layout.date,
            &layout.opening_inventory,
            &layout.kernel_oil,
            &layout.kernel_processed,
        ],
        |loc| sheet.check_column_label(header_row, loc),
    );
    if !drift.is_empty() {
        out.note_drift(layout.plant.as_str(), drift);
        return out;
    }
    let Some(last_row) = sheet.last_row() else {
        return out;
    };

    let policy = NormalizePolicy {
        error_floor: Some(layout.error_floor),
    };
    let tonnes = |v: Option<f64>| v.map(|v| round_to(layout.mass_unit.to_tonnes(v), 2));
    for row in layout.data_start_row..=last_row {
        let Some(date) = sheet.date(row, layout.date.index()) else {
            continue;
        };
        let opening = sheet.number(row, layout.opening_inventory.index(), &policy);
        let kernel_oil = sheet.number(row, layout.kernel_oil.index(), &policy);
        let kernel = sheet.number(row, layout.kernel_processed.index(), &policy);
        if opening.is_none() && kernel_oil.is_none() && kernel.is_none() {
            continue;
        }
        let kernel_actual = tonnes(kernel);
        out.records.push(KernelPatch {
            date,
            plant: layout.plant,
            kernel_actual,
            kernel_oil_actual: tonnes(kernel_oil),
            kernel_oil_budget: kernel_actual
                .map(|k| round_to(k * layout.target_extraction / 100.0, 2)),
            kernel_extraction: ratio_pct(kernel_oil, kernel),
        });
    }
    info!(plant = %layout.plant, patches = out.records.len(), "cpko extracted");
    out
}

#[cfg(test)]
mod tests {
    use calamine::{Data, Range};
    use chrono::NaiveDate;

    use super::extract_cpko;
    use crate::extract::Workbook;
    use crate::layout::SourceLayouts;
    use crate::merge::Patch;
    use crate::model::{Plant, UpstreamRecord};

    fn grid() -> Range<Data> {
        let mut grid: Range<Data> = Range::new((0, 0), (4, 6));
        grid.set_value((2, 0), Data::String("2025-10-01".to_string()));
        grid.set_value((2, 1), Data::Float(5_000.0));
        grid.set_value((2, 4), Data::Float(12_300.0));
        grid.set_value((2, 6), Data::Float(30_000.0));
        // Formula garbage below the error floor reads as absent.
        grid.set_value((3, 0), Data::String("2025-10-02".to_string()));
        grid.set_value((3, 4), Data::Float(-2.0e9));
        grid.set_value((3, 6), Data::Float(28_000.0));
        grid.set_value((4, 0), Data::String("Total".to_string()));
        grid.set_value((4, 6), Data::Float(58_000.0));
        grid
    }

    #[test]
    fn rows_become_kernel_patches() {
        let layouts = SourceLayouts::builtin().unwrap();
        let book = Workbook::from_sheets(vec![("Base de Datos".to_string(), grid())]);
        let out = extract_cpko(&book, &layouts.cpko);
        assert_eq!(out.records.len(), 2);

        let first = &out.records[0];
        assert_eq!(first.plant, Plant::Codazzi);
        assert_eq!(first.kernel_actual, Some(30.0));
        assert_eq!(first.kernel_oil_actual, Some(12.3));
        assert_eq!(first.kernel_oil_budget, Some(12.3));
        assert_eq!(first.kernel_extraction, Some(41.0));

        let second = &out.records[1];
        assert_eq!(second.kernel_oil_actual, None);
        assert_eq!(second.kernel_extraction, None);
    }

    #[test]
    fn applying_keeps_fields_the_patch_lacks() {
        let layouts = SourceLayouts::builtin().unwrap();
        let book = Workbook::from_sheets(vec![("Base de Datos".to_string(), grid())]);
        let patch = extract_cpko(&book, &layouts.cpko).records.remove(1);

        let mut rec = UpstreamRecord::new(NaiveDate::from_ymd_opt(2025, 10, 2).unwrap(), Plant::Codazzi);
        rec.kernel_oil_actual = Some(11.0);
        rec.kernel_budget = Some(29.0);
        patch.apply_to(&mut rec);
        assert_eq!(rec.kernel_actual, Some(28.0));
        assert_eq!(rec.kernel_oil_actual, Some(11.0));
        assert_eq!(rec.kernel_budget, Some(29.0));
    }
}
