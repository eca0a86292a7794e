//! Daily tracking workbook: plants down the `UPSTREAM` sheet, products down `DOWNSTREAM`,
//! one column per day.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use super::Extraction;
use super::dates::detect_date_columns_in_row;
use super::normalize::{NormalizePolicy, parse_number_text, scale_fraction};
use super::workbook::{Sheet, Workbook, collect_drift};
use crate::layout::families::{DownstreamSheet, KernelBlock, PlantBlock, UpstreamSheet};
use crate::layout::{MassUnit, SeguimientoLayout};
use crate::model::{DownstreamRecord, UpstreamRecord, ratio_pct, round_to, round2};

static TEA_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)TEA%?\s*([\d,\.]+)%?").unwrap_or_else(|e| panic!("TEA label pattern: {e}"))
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeguimientoExtraction {
    pub upstream: Extraction<UpstreamRecord>,
    pub downstream: Extraction<DownstreamRecord>,
}

pub fn extract_seguimiento(book: &Workbook, layout: &SeguimientoLayout) -> SeguimientoExtraction {
    let upstream = extract_upstream(book, &layout.upstream);
    let downstream = extract_downstream(book, &layout.downstream);
    info!(
        upstream_rows = upstream.records.len(),
        downstream_rows = downstream.records.len(),
        "seguimiento extracted"
    );
    SeguimientoExtraction {
        upstream,
        downstream,
    }
}

/// Target extraction rate embedded in a label such as `"TEA% 21,6%"`.
pub fn tea_target_from_label(label: &str) -> Option<f64> {
    let caps = TEA_LABEL.captures(label)?;
    parse_number_text(caps.get(1)?.as_str()).filter(|v| *v > 0.0)
}

fn extract_upstream(book: &Workbook, layout: &UpstreamSheet) -> Extraction<UpstreamRecord> {
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
    debug!(sheet = sheet.name, days = dates.len(), "date columns detected");

    for block in &layout.plants {
        let drift = collect_drift(
            [&block.rff_budget, &block.rff_actual, &block.cpo_actual, &block.tea],
            |loc| sheet.check_row_label(layout.label_column, loc),
        );
        if !drift.is_empty() {
            out.note_drift(block.plant.as_str(), drift);
            continue;
        }

        let tea_target = sheet
            .text(block.tea.index(), layout.label_column)
            .and_then(|label| tea_target_from_label(&label));
        let tea_target = match tea_target {
            Some(target) => target,
            None => {
                warn!(plant = %block.plant, fallback = block.tea_target, "TEA target not in label");
                block.tea_target
            }
        };

        let kernel = match (block.kernel, &layout.kernel) {
            (true, Some(rows)) => {
                let drift = collect_drift(
                    [
                        &rows.kernel_budget,
                        &rows.kernel_actual,
                        &rows.kernel_oil_actual,
                        &rows.kernel_extraction,
                    ],
                    |loc| sheet.check_row_label(layout.label_column, loc),
                );
                if drift.is_empty() {
                    Some(rows)
                } else {
                    out.note_drift("kernel", drift);
                    None
                }
            }
            _ => None,
        };

        for (&col, &date) in &dates {
            let Some(rec) = plant_day(&sheet, layout, block, kernel, tea_target, col, date) else {
                continue;
            };
            out.records.push(rec);
        }
    }
    out
}

fn plant_day(
    sheet: &Sheet<'_>,
    layout: &UpstreamSheet,
    block: &PlantBlock,
    kernel: Option<&KernelBlock>,
    tea_target: f64,
    col: u32,
    date: chrono::NaiveDate,
) -> Option<UpstreamRecord> {
    let policy = NormalizePolicy::default();
    let mass = |loc: &crate::layout::Locator| {
        tonnes(layout.mass_unit, sheet.number(loc.index(), col, &policy))
    };
    let rff_budget = mass(&block.rff_budget);
    let rff_actual = mass(&block.rff_actual);
    let cpo_actual = mass(&block.cpo_actual);
    if rff_budget.is_none() && rff_actual.is_none() && cpo_actual.is_none() {
        return None;
    }

    let mut rec = UpstreamRecord::new(date, block.plant);
    rec.rff_budget = rff_budget;
    rec.rff_actual = rff_actual;
    rec.cpo_actual = cpo_actual;
    rec.cpo_budget = rff_budget.map(|b| round_to(b * tea_target / 100.0, 2));
    rec.tea_target = Some(tea_target);
    rec.tea_actual = rec.computed_tea().or_else(|| {
        round2(scale_fraction(sheet.number(block.tea.index(), col, &policy)))
    });
    rec.estimate_palm_kernel(layout.palm_kernel_share);
    rec.synthesize_quality();

    if let Some(rows) = kernel {
        let kernel_budget = mass(&rows.kernel_budget);
        let kernel_actual = mass(&rows.kernel_actual);
        let kernel_oil = mass(&rows.kernel_oil_actual);
        rec.kernel_budget = kernel_budget;
        rec.kernel_actual = kernel_actual;
        rec.kernel_oil_actual = kernel_oil;
        rec.kernel_oil_budget =
            kernel_budget.map(|b| round_to(b * rows.target_extraction / 100.0, 2));
        rec.kernel_extraction = ratio_pct(kernel_oil, kernel_actual).or_else(|| {
            round2(scale_fraction(
                sheet.number(rows.kernel_extraction.index(), col, &policy),
            ))
        });
    }
    Some(rec)
}

fn tonnes(unit: MassUnit, value: Option<f64>) -> Option<f64> {
    value.map(|v| round_to(unit.to_tonnes(v), 2))
}

fn extract_downstream(book: &Workbook, layout: &DownstreamSheet) -> Extraction<DownstreamRecord> {
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
    for product in &layout.products {
        let drift = collect_drift([&product.budget, &product.actual], |loc| {
            sheet.check_row_label(layout.label_column, loc)
        });
        if !drift.is_empty() {
            out.note_drift(&product.product, drift);
            continue;
        }
        for (&col, &date) in &dates {
            let budget = round2(sheet.number(product.budget.index(), col, &policy));
            let actual = round2(sheet.number(product.actual.index(), col, &policy));
            if budget.is_none() && actual.is_none() {
                continue;
            }
            out.records.push(DownstreamRecord::new(
                date,
                product.product.clone(),
                Some(product.product_type.clone()),
                budget,
                actual,
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use calamine::{Data, Range};

    use super::{extract_seguimiento, tea_target_from_label};
    use crate::extract::Workbook;
    use crate::layout::SourceLayouts;
    use crate::model::{Plant, QualitySource};

    fn date_header(grid: &mut Range<Data>) {
        grid.set_value((0, 0), Data::String("ZONA".to_string()));
        grid.set_value((0, 1), Data::String("2025-12-01".to_string()));
        grid.set_value((0, 2), Data::String("2025-12-02".to_string()));
        grid.set_value((0, 3), Data::String("ACUMULADO S1".to_string()));
    }

    fn upstream_grid() -> Range<Data> {
        let mut grid: Range<Data> = Range::new((0, 0), (56, 3));
        date_header(&mut grid);
        grid.set_value((4, 0), Data::String("Ext Codazzi Proy".to_string()));
        grid.set_value((5, 0), Data::String("Ext Codazzi Real".to_string()));
        grid.set_value((6, 0), Data::String("CPO".to_string()));
        grid.set_value((7, 0), Data::String("TEA% 22%".to_string()));
        for (row, values) in [(4, [500.0, 500.0, 1000.0]), (5, [480.0, 0.0, 480.0]), (6, [100.8, 0.0, 100.8])] {
            for (i, v) in values.into_iter().enumerate() {
                grid.set_value((row, i as u32 + 1), Data::Float(v));
            }
        }
        grid.set_value((52, 1), Data::Float(30.0));
        grid.set_value((53, 1), Data::Float(28.0));
        grid.set_value((54, 1), Data::Float(11.2));
        grid
    }

    #[test]
    fn tea_target_reads_inline_percentages() {
        assert_eq!(tea_target_from_label("TEA% 18.6%"), Some(18.6));
        assert_eq!(tea_target_from_label("tea 21,6%"), Some(21.6));
        assert_eq!(tea_target_from_label("TEA%"), None);
        assert_eq!(tea_target_from_label("CPO"), None);
    }

    #[test]
    fn plant_rows_become_daily_observations() {
        let layouts = SourceLayouts::builtin().unwrap();
        let book = Workbook::from_sheets(vec![("UPSTREAM".to_string(), upstream_grid())]);
        let out = extract_seguimiento(&book, &layouts.seguimiento);

        assert_eq!(out.downstream.missing_sheets, vec!["DOWNSTREAM".to_string()]);
        // Codazzi has both days; the other plants carry no labels and drift.
        assert_eq!(out.upstream.records.len(), 2);
        assert_eq!(out.upstream.drift.len(), 3 * 4);

        let day1 = &out.upstream.records[0];
        assert_eq!(day1.plant, Plant::Codazzi);
        assert_eq!(day1.tea_target, Some(22.0));
        assert_eq!(day1.tea_actual, Some(21.0));
        assert_eq!(day1.cpo_budget, Some(110.0));
        assert_eq!(day1.palm_kernel_actual, Some(5.04));
        assert_eq!(day1.quality_source, Some(QualitySource::Estimated));
        assert_eq!(day1.kernel_oil_actual, Some(11.2));
        assert_eq!(day1.kernel_extraction, Some(40.0));
        assert_eq!(day1.kernel_oil_budget, Some(12.3));

        // A real zero-production day is kept, not dropped.
        let day2 = &out.upstream.records[1];
        assert_eq!(day2.rff_actual, Some(0.0));
        assert_eq!(day2.tea_actual, None);
        assert_eq!(day2.quality_source, None);
    }
}
