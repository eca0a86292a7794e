//! Per-plant CPO database workbook: dated rows per plant, tank levels and measured tank quality.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use super::Extraction;
use super::normalize::{NormalizePolicy, scale_fraction};
use super::workbook::{Workbook, collect_drift};
use crate::layout::GeoCpoLayout;
use crate::layout::families::{GeoPlantSheet, QualitySheet, TankSheet};
use crate::model::{Plant, QualitySource, UpstreamRecord, round_to, round2};

type DayKey = (NaiveDate, Plant);

/// Averaged quality of one plant-day.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TankQuality {
    acidity: f64,
    moisture: Option<f64>,
    impurities: Option<f64>,
}

/// Extract upstream rows from every configured plant sheet, then lay tank levels and measured
/// quality over them by (date, plant).
pub fn extract_geo_cpo(book: &Workbook, layout: &GeoCpoLayout) -> Extraction<UpstreamRecord> {
    let mut out = Extraction::default();
    for plant in &layout.plants {
        let before = out.records.len();
        extract_plant(book, layout, plant, &mut out);
        debug!(plant = %plant.plant, rows = out.records.len() - before, "plant sheet read");
    }

    let levels = extract_tank_levels(book, layout, &mut out);
    let quality = match &layout.quality {
        Some(sheet) => extract_quality(book, sheet, &mut out),
        None => BTreeMap::new(),
    };

    let mut with_tanks = 0usize;
    let mut with_quality = 0usize;
    for rec in &mut out.records {
        let key = (rec.date, rec.plant);
        if let Some(tanks) = levels.get(&key) {
            rec.tanks = *tanks;
            with_tanks += 1;
        }
        if let Some(q) = quality.get(&key) {
            rec.acidity = Some(q.acidity);
            rec.moisture = q.moisture;
            rec.impurities = q.impurities;
            rec.quality_source = Some(QualitySource::Measured);
            with_quality += 1;
        }
    }
    info!(
        rows = out.records.len(),
        with_tanks, with_quality, "geo_cpo extracted"
    );
    out
}

fn extract_plant(
    book: &Workbook,
    layout: &GeoCpoLayout,
    cfg: &GeoPlantSheet,
    out: &mut Extraction<UpstreamRecord>,
) {
    let Some(sheet) = book.sheet(&cfg.sheet) else {
        out.note_missing_sheet(&cfg.sheet);
        return;
    };
    let drift = collect_drift(
        [
            &cfg.date,
            &cfg.opening_inventory,
            &cfg.cpo,
            &cfg.rff,
            &cfg.extraction,
            &cfg.closing_inventory,
        ],
        |loc| sheet.check_column_label(cfg.header_row, loc),
    );
    if !drift.is_empty() {
        out.note_drift(cfg.plant.as_str(), drift);
        return;
    }
    let Some(last_row) = sheet.last_row() else {
        return;
    };

    let policy = NormalizePolicy::default();
    let tonnes = |v: Option<f64>| v.map(|v| round_to(layout.mass_unit.to_tonnes(v), 2));
    for row in cfg.data_start_row..=last_row {
        let Some(date) = sheet.date(row, cfg.date.index()) else {
            continue;
        };
        let opening = sheet.number(row, cfg.opening_inventory.index(), &policy);
        let cpo = sheet.number(row, cfg.cpo.index(), &policy);
        let rff = sheet.number(row, cfg.rff.index(), &policy);
        if rff.is_none() && cpo.is_none() && opening.is_none() {
            continue;
        }

        let mut rec = UpstreamRecord::new(date, cfg.plant);
        rec.rff_actual = tonnes(rff);
        // The database sheets carry no fruit budget; processed fruit stands in for it.
        rec.rff_budget = rec.rff_actual;
        rec.cpo_actual = tonnes(cpo);
        rec.cpo_budget = rec
            .rff_budget
            .map(|b| round_to(b * cfg.tea_target / 100.0, 2));
        rec.tea_target = Some(cfg.tea_target);
        rec.tea_actual = rec.computed_tea().or_else(|| {
            round2(scale_fraction(
                sheet.number(row, cfg.extraction.index(), &policy),
            ))
        });
        // Share of CPO, not RFF, as in the tracking workbook.
        rec.estimate_palm_kernel(layout.palm_kernel_share);
        rec.cpo_inventory = tonnes(sheet.number(row, cfg.closing_inventory.index(), &policy));
        out.records.push(rec);
    }
}

fn extract_tank_levels(
    book: &Workbook,
    layout: &GeoCpoLayout,
    out: &mut Extraction<UpstreamRecord>,
) -> BTreeMap<DayKey, [Option<f64>; 4]> {
    let mut levels = BTreeMap::new();
    for cfg in &layout.tanks {
        read_tank_sheet(book, layout, cfg, out, &mut levels);
    }
    levels
}

fn read_tank_sheet(
    book: &Workbook,
    layout: &GeoCpoLayout,
    cfg: &TankSheet,
    out: &mut Extraction<UpstreamRecord>,
    levels: &mut BTreeMap<DayKey, [Option<f64>; 4]>,
) {
    let Some(sheet) = book.sheet(&cfg.sheet) else {
        out.note_missing_sheet(&cfg.sheet);
        return;
    };
    let Some(last_row) = sheet.last_row() else {
        return;
    };
    let policy = NormalizePolicy::default();
    for row in cfg.data_start_row..=last_row {
        let Some(date) = sheet.date(row, cfg.date_column) else {
            continue;
        };
        let mut slots = [None; 4];
        for (slot, tank) in slots.iter_mut().zip(&cfg.tanks) {
            *slot = sheet
                .number(row, tank.column, &policy)
                .map(|v| round_to(layout.mass_unit.to_tonnes(v), 2));
        }
        levels.insert((date, cfg.plant), slots);
    }
}

fn extract_quality(
    book: &Workbook,
    cfg: &QualitySheet,
    out: &mut Extraction<UpstreamRecord>,
) -> BTreeMap<DayKey, TankQuality> {
    let mut quality = BTreeMap::new();
    let Some(sheet) = book.sheet(&cfg.sheet) else {
        out.note_missing_sheet(&cfg.sheet);
        return quality;
    };
    let Some(last_row) = sheet.last_row() else {
        return quality;
    };
    let policy = NormalizePolicy::default();
    for row in cfg.data_start_row..=last_row {
        let Some(date) = sheet.date(row, cfg.date_column) else {
            continue;
        };
        for plant in &cfg.plants {
            let mut acidity = Vec::new();
            let mut moisture = Vec::new();
            let mut impurities = Vec::new();
            for tank in &plant.tanks {
                // A tank without acidity was not sampled that day.
                let Some(a) = sheet.number(row, tank.acidity, &policy).filter(|a| *a > 0.0)
                else {
                    continue;
                };
                acidity.push(a);
                moisture.extend(sheet.number(row, tank.moisture, &policy));
                impurities.extend(sheet.number(row, tank.impurities, &policy));
            }
            let Some(acidity) = mean(&acidity) else {
                continue;
            };
            quality.insert(
                (date, plant.plant),
                TankQuality {
                    acidity: round_to(acidity, 2),
                    moisture: mean(&moisture).map(|v| round_to(v, 2)),
                    impurities: mean(&impurities).map(|v| round_to(v, 3)),
                },
            );
        }
    }
    quality
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use calamine::{Data, Range};

    use super::extract_geo_cpo;
    use crate::extract::Workbook;
    use crate::layout::SourceLayouts;
    use crate::model::{Plant, QualitySource};

    fn sinu_sheet() -> Range<Data> {
        let mut grid: Range<Data> = Range::new((0, 0), (6, 10));
        grid.set_value((2, 4), Data::String("Producción CPO".to_string()));
        grid.set_value((2, 6), Data::String("RFF Procesada".to_string()));
        grid.set_value((4, 0), Data::String("2025-11-03".to_string()));
        grid.set_value((4, 1), Data::Float(150_000.0));
        grid.set_value((4, 4), Data::Float(66_000.0));
        grid.set_value((4, 6), Data::Float(300_000.0));
        grid.set_value((4, 8), Data::Float(0.22));
        grid.set_value((4, 10), Data::Float(210_500.0));
        // Inventory only: kept, with no production.
        grid.set_value((5, 0), Data::String("2025-11-04".to_string()));
        grid.set_value((5, 1), Data::Float(210_500.0));
        // Nothing at all: skipped.
        grid.set_value((6, 0), Data::String("2025-11-05".to_string()));
        grid
    }

    fn tank_sheet() -> Range<Data> {
        let mut grid: Range<Data> = Range::new((0, 0), (4, 11));
        grid.set_value((4, 1), Data::String("2025-11-03".to_string()));
        grid.set_value((4, 6), Data::Float(95_400.0));
        grid.set_value((4, 11), Data::Float(310_000.0));
        grid
    }

    fn quality_sheet() -> Range<Data> {
        let mut grid: Range<Data> = Range::new((0, 0), (4, 39));
        grid.set_value((4, 0), Data::String("2025-11-03".to_string()));
        grid.set_value((4, 33), Data::Float(3.0));
        grid.set_value((4, 34), Data::Float(0.1));
        grid.set_value((4, 35), Data::Float(0.02));
        grid.set_value((4, 37), Data::Float(4.0));
        grid.set_value((4, 38), Data::Float(0.2));
        grid.set_value((4, 39), Data::Float(0.026));
        grid
    }

    #[test]
    fn database_rows_tanks_and_quality_are_combined() {
        let layouts = SourceLayouts::builtin().unwrap();
        let book = Workbook::from_sheets(vec![
            ("BD Sinu".to_string(), sinu_sheet()),
            ("Medidas_Sinu".to_string(), tank_sheet()),
            ("Calidad Tnk".to_string(), quality_sheet()),
        ]);
        let out = extract_geo_cpo(&book, &layouts.geo_cpo);

        assert!(out.missing_sheets.contains(&"Base de Datos".to_string()));
        assert_eq!(out.records.len(), 2);

        let day = &out.records[0];
        assert_eq!(day.plant, Plant::Sinu);
        assert_eq!(day.rff_actual, Some(300.0));
        assert_eq!(day.rff_budget, Some(300.0));
        assert_eq!(day.cpo_actual, Some(66.0));
        assert_eq!(day.cpo_budget, Some(66.0));
        assert_eq!(day.tea_actual, Some(22.0));
        // 5 % of CPO, not of RFF.
        assert_eq!(day.palm_kernel_actual, Some(3.3));
        assert_eq!(day.cpo_inventory, Some(210.5));
        assert_eq!(day.tanks, [Some(95.4), Some(310.0), None, None]);
        assert_eq!(day.quality_source, Some(QualitySource::Measured));
        assert_eq!(day.acidity, Some(3.5));
        assert_eq!(day.moisture, Some(0.15));
        // Quality parameters are never rescaled as fractions.
        assert_eq!(day.impurities, Some(0.023));

        let idle = &out.records[1];
        assert_eq!(idle.rff_actual, None);
        assert_eq!(idle.tea_actual, None);
        assert_eq!(idle.quality_source, None);
    }

    #[test]
    fn drifted_columns_skip_the_plant() {
        let layouts = SourceLayouts::builtin().unwrap();
        let mut grid = sinu_sheet();
        grid.set_value((2, 6), Data::String("Despachos".to_string()));
        let book = Workbook::from_sheets(vec![("BD Sinu".to_string(), grid)]);
        let out = extract_geo_cpo(&book, &layouts.geo_cpo);
        assert!(out.records.is_empty());
        assert_eq!(out.drift.len(), 1);
        assert_eq!(out.drift[0].column, 6);
    }
}
