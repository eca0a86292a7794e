#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use palm_etl::layout::SourceLayouts;
use palm_etl::pipeline::Pipeline;
use palm_etl::settings::Settings;
use rust_xlsxwriter::Workbook;

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
}

pub fn pipeline(data_dir: &Path) -> Pipeline {
    let settings = Settings {
        data_dir: data_dir.to_path_buf(),
        ..Settings::default()
    };
    Pipeline::new(settings, SourceLayouts::builtin().unwrap())
}

/// One MLB day of the tracking workbook: (date, rff budget, rff actual, cpo).
pub type MlbDay = (NaiveDate, f64, f64, f64);

/// Tracking workbook with the MLB block filled in for `days`, a trailing `ACUMULADO` column and,
/// when `refinery` is given, a `DOWNSTREAM` sheet with "Refinería 1" (budget, actual) per day.
pub fn write_seguimiento(path: &Path, days: &[MlbDay], refinery: Option<&[(f64, f64)]>) {
    let mut wb = Workbook::new();

    let ws = wb.add_worksheet();
    ws.set_name("UPSTREAM").unwrap();
    ws.write_string(0, 0, "ZONA").unwrap();
    ws.write_string(11, 0, "Ext MLB Proy").unwrap();
    ws.write_string(12, 0, "Ext MLB Real").unwrap();
    ws.write_string(13, 0, "CPO MLB").unwrap();
    ws.write_string(14, 0, "TEA% 18,6%").unwrap();
    let mut totals = [0.0_f64; 3];
    for (i, &(date, budget, actual, cpo)) in days.iter().enumerate() {
        let col = i as u16 + 1;
        ws.write_string(0, col, date.format("%Y-%m-%d").to_string())
            .unwrap();
        ws.write_number(11, col, budget).unwrap();
        ws.write_number(12, col, actual).unwrap();
        ws.write_number(13, col, cpo).unwrap();
        totals[0] += budget;
        totals[1] += actual;
        totals[2] += cpo;
    }
    let acc = days.len() as u16 + 1;
    ws.write_string(0, acc, "ACUMULADO S1").unwrap();
    for (row, total) in [(11, totals[0]), (12, totals[1]), (13, totals[2])] {
        ws.write_number(row, acc, total).unwrap();
    }

    if let Some(refinery) = refinery {
        let ws = wb.add_worksheet();
        ws.set_name("DOWNSTREAM").unwrap();
        ws.write_string(0, 0, "PRODUCTO").unwrap();
        ws.write_string(1, 0, "Refinería 1 ME").unwrap();
        ws.write_string(2, 0, "Refinería 1 Real").unwrap();
        for (i, (&(date, ..), &(budget, actual))) in days.iter().zip(refinery).enumerate() {
            let col = i as u16 + 1;
            ws.write_string(0, col, date.format("%Y-%m-%d").to_string())
                .unwrap();
            ws.write_number(1, col, budget).unwrap();
            ws.write_number(2, col, actual).unwrap();
        }
    }

    wb.save(path).unwrap();
}

pub fn seguimiento_path(dir: &Path) -> PathBuf {
    dir.join("SEGUIMIENTO_DIARIO.xlsx")
}
