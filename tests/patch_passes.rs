mod common;

use std::fs;
use std::path::Path;

use common::{day, pipeline, seguimiento_path, write_seguimiento};
use palm_etl::EtlError;
use palm_etl::model::{Plant, UpstreamRecord};
use palm_etl::pipeline::SourceFamily;
use palm_etl::store::{read_records, write_records};
use rust_xlsxwriter::Workbook;

/// Planning workbook with MLB budget rows (rff, cpo) per day.
fn write_planning(path: &Path, days: &[(u32, f64, f64)]) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Resumen").unwrap();
    ws.write_string(0, 0, "PLANTA").unwrap();
    ws.write_string(0, 1, "TOTAL MES").unwrap();
    for (i, &(d, rff, cpo)) in days.iter().enumerate() {
        let col = i as u16 + 2;
        ws.write_string(0, col, day(d).format("%Y-%m-%d").to_string())
            .unwrap();
        ws.write_number(3, col, rff).unwrap();
        ws.write_number(4, col, cpo).unwrap();
    }
    wb.save(path).unwrap();
}

/// Kernel expeller workbook: (day, cpko kg, kernel processed kg).
fn write_cpko(path: &Path, rows: &[(u32, f64, f64)]) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Base de Datos").unwrap();
    ws.write_string(0, 0, "BALANCE CPKO CODAZZI").unwrap();
    for (col, header) in [(0, "FECHA"), (1, "INV. INICIAL"), (4, "CPKO"), (6, "ALMENDRA")] {
        ws.write_string(1, col, header).unwrap();
    }
    for (i, &(d, cpko, kernel)) in rows.iter().enumerate() {
        let row = i as u32 + 2;
        ws.write_string(row, 0, day(d).format("%Y-%m-%d").to_string())
            .unwrap();
        ws.write_number(row, 1, 5000.0).unwrap();
        ws.write_number(row, 4, cpko).unwrap();
        ws.write_number(row, 6, kernel).unwrap();
    }
    wb.save(path).unwrap();
}

#[test]
fn budget_pass_overwrites_budgets_of_existing_rows_only() {
    let dir = tempfile::tempdir().unwrap();
    let source = seguimiento_path(dir.path());
    write_seguimiento(
        &source,
        &[(day(1), 500.0, 400.0, 74.0), (day(2), 500.0, 450.0, 81.0)],
        None,
    );
    let p = pipeline(dir.path());
    p.import(SourceFamily::Seguimiento, Some(&source)).unwrap();

    let planning = dir.path().join("PLANEACION_2025.xlsx");
    write_planning(&planning, &[(1, 520.0, 97.0), (2, 530.0, 98.5), (4, 540.0, 100.0)]);
    let report = p.import(SourceFamily::Budget, None).unwrap();
    assert_eq!(report.extracted, 3);
    let update = &report.updates[0];
    assert_eq!((update.patched, update.unmatched, update.rows), (2, 1, 2));
    assert!(update.written);

    let stored: Vec<UpstreamRecord> = read_records(dir.path().join("upstream.csv")).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].rff_budget, Some(520.0));
    assert_eq!(stored[0].cpo_budget, Some(97.0));
    assert_eq!(stored[1].cpo_budget, Some(98.5));
    // Actuals and derived rates are left alone.
    assert_eq!(stored[0].rff_actual, Some(400.0));
    assert_eq!(stored[0].tea_actual, Some(18.5));
}

#[test]
fn kernel_pass_patches_the_kernel_plant() {
    let dir = tempfile::tempdir().unwrap();
    let mut history = Vec::new();
    for d in [1, 2] {
        for plant in [Plant::Codazzi, Plant::Mlb] {
            let mut rec = UpstreamRecord::new(day(d), plant);
            rec.rff_actual = Some(400.0);
            history.push(rec);
        }
    }
    let upstream = dir.path().join("upstream.csv");
    write_records(&upstream, &history).unwrap();

    let source = dir.path().join("CZZ_CPKO_DIC.xlsx");
    // Day 2 carries a formula-error artifact in the CPKO column; day 3 has no row to patch.
    write_cpko(
        &source,
        &[(1, 12_000.0, 30_000.0), (2, -9_999_999.0, 20_000.0), (3, 11_000.0, 28_000.0)],
    );
    let report = pipeline(dir.path())
        .import(SourceFamily::Cpko, Some(&source))
        .unwrap();
    let update = &report.updates[0];
    assert_eq!((update.patched, update.unmatched), (2, 1));

    let stored: Vec<UpstreamRecord> = read_records(&upstream).unwrap();
    assert_eq!(stored.len(), 4);
    let czz: Vec<&UpstreamRecord> = stored.iter().filter(|r| r.plant == Plant::Codazzi).collect();
    assert_eq!(czz[0].kernel_actual, Some(30.0));
    assert_eq!(czz[0].kernel_oil_actual, Some(12.0));
    assert_eq!(czz[0].kernel_extraction, Some(40.0));
    assert_eq!(czz[0].kernel_oil_budget, Some(12.3));
    assert_eq!(czz[1].kernel_actual, Some(20.0));
    assert_eq!(czz[1].kernel_oil_actual, None);

    assert!(
        stored
            .iter()
            .filter(|r| r.plant == Plant::Mlb)
            .all(|r| r.kernel_actual.is_none())
    );
}

#[test]
fn patch_pass_without_history_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("CZZ_CPKO_DIC.xlsx");
    write_cpko(&source, &[(1, 12_000.0, 30_000.0)]);

    let err = pipeline(dir.path())
        .import(SourceFamily::Cpko, Some(&source))
        .unwrap_err();
    assert!(matches!(err, EtlError::NothingToPatch { .. }));
    assert!(!dir.path().join("upstream.csv").exists());
}

#[test]
fn corrupt_upstream_halts_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = dir.path().join("upstream.csv");
    fs::write(&upstream, "fecha,zona\nnot-a-date,MLB\n").unwrap();
    let source = seguimiento_path(dir.path());
    write_seguimiento(
        &source,
        &[(day(1), 500.0, 400.0, 74.0)],
        Some(&[(100.0, 90.0)]),
    );

    let err = pipeline(dir.path())
        .import(SourceFamily::Seguimiento, Some(&source))
        .unwrap_err();
    assert!(matches!(err, EtlError::CorruptHistory { .. }));
    assert_eq!(
        fs::read_to_string(&upstream).unwrap(),
        "fecha,zona\nnot-a-date,MLB\n"
    );
    assert!(!dir.path().join("downstream.csv").exists());
}

#[test]
fn monthly_history_goes_to_its_own_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("Historico_extractoras.csv"),
        "EXTRACTORA,AÑO,enero,febrero\n\
         Codazzi,RFF Procesada 2024,10000,9000\n\
         Codazzi,Producción CPO 2024,2100,1980\n\
         Codazzi,Proyección RFF 2024,1,1\n",
    )
    .unwrap();

    let report = pipeline(dir.path())
        .import(SourceFamily::Historical, None)
        .unwrap();
    assert_eq!(report.extracted, 2);
    assert!(!dir.path().join("upstream.csv").exists());

    let stored: Vec<UpstreamRecord> =
        read_records(dir.path().join("upstream_historico.csv")).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].date, chrono::NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    assert_eq!(stored[0].tea_actual, Some(21.0));
    assert_eq!(stored[1].tea_actual, Some(22.0));
}
