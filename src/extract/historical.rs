//! Consolidated monthly history CSV: one row per (plant, metric, year), one column per month.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{Months, NaiveDate};
use regex::Regex;
use tracing::{debug, info, warn};

use super::Extraction;
use super::normalize::{parse_number_text, scale_fraction};
use crate::error::{EtlError, EtlResult};
use crate::layout::HistoricalLayout;
use crate::model::{Plant, UpstreamRecord, round2};

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

static TRAILING_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*$").unwrap_or_else(|e| panic!("year pattern: {e}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    Rff,
    Cpo,
    Extraction,
}

#[derive(Debug, Default, Clone, Copy)]
struct MonthValues {
    rff: Option<f64>,
    cpo: Option<f64>,
    extraction: Option<f64>,
}

/// Split a kind cell such as `"Producción CPO 2024"` into metric and year.
fn parse_kind(raw: &str, skip_markers: &[String]) -> Option<(Metric, i32)> {
    let raw = raw.trim();
    if skip_markers.iter().any(|m| raw.contains(m.as_str())) {
        return None;
    }
    let year = TRAILING_YEAR.captures(raw)?.get(1)?.as_str().parse().ok()?;
    let lower = raw.to_lowercase();
    let metric = if lower.contains("rff") {
        Metric::Rff
    } else if lower.contains("cpo") {
        Metric::Cpo
    } else if lower.contains("extrac") {
        Metric::Extraction
    } else {
        return None;
    };
    Some((metric, year))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

pub fn extract_historical(
    path: impl AsRef<Path>,
    layout: &HistoricalLayout,
) -> EtlResult<Extraction<UpstreamRecord>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(EtlError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    extract_historical_from_reader(&mut rdr, layout)
}

/// Read monthly history from an existing CSV reader.
pub fn extract_historical_from_reader<R: Read>(
    rdr: &mut csv::Reader<R>,
    layout: &HistoricalLayout,
) -> EtlResult<Extraction<UpstreamRecord>> {
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(plant_idx), Some(kind_idx)) =
        (column(&layout.plant_column), column(&layout.kind_column))
    else {
        return Err(EtlError::SchemaMismatch {
            message: format!(
                "history needs columns '{}' and '{}'; headers={headers:?}",
                layout.plant_column, layout.kind_column
            ),
        });
    };
    let month_idxs: Vec<(u32, usize)> = MONTHS
        .iter()
        .zip(1u32..)
        .filter_map(|(name, month)| {
            let idx = headers.iter().position(|h| h.to_lowercase() == *name)?;
            Some((month, idx))
        })
        .collect();
    if month_idxs.is_empty() {
        warn!("history has no month columns");
    }

    let mut months: BTreeMap<(Plant, i32, u32), MonthValues> = BTreeMap::new();
    for result in rdr.records() {
        let record = result?;
        let plant_raw = record.get(plant_idx).unwrap_or("");
        let Ok(plant) = plant_raw.parse::<Plant>() else {
            debug!(plant = plant_raw.trim(), "skipping row of unknown plant");
            continue;
        };
        let Some((metric, year)) = parse_kind(record.get(kind_idx).unwrap_or(""), &layout.skip_markers)
        else {
            continue;
        };
        let threshold = layout.kilogram_threshold(plant);
        for &(month, idx) in &month_idxs {
            let Some(mut value) = record.get(idx).and_then(parse_number_text) else {
                continue;
            };
            let entry = months.entry((plant, year, month)).or_default();
            match metric {
                Metric::Rff | Metric::Cpo => {
                    if threshold.is_some_and(|t| value > t) {
                        value /= 1000.0;
                    }
                    if metric == Metric::Rff {
                        entry.rff = Some(value);
                    } else {
                        entry.cpo = Some(value);
                    }
                }
                Metric::Extraction => entry.extraction = Some(value),
            }
        }
    }

    let mut out = Extraction::default();
    for ((plant, year, month), values) in months {
        if values.rff.is_none() && values.cpo.is_none() {
            continue;
        }
        let Some(date) = last_day_of_month(year, month) else {
            continue;
        };
        let mut rec = UpstreamRecord::new(date, plant);
        rec.rff_actual = round2(values.rff);
        rec.cpo_actual = round2(values.cpo);
        rec.tea_target = Some(plant.default_tea_target());
        rec.tea_actual = rec
            .computed_tea()
            .or_else(|| round2(scale_fraction(values.extraction)));
        rec.estimate_palm_kernel(layout.palm_kernel_share);
        out.records.push(rec);
    }
    out.records.sort_by(|a, b| (a.date, a.plant).cmp(&(b.date, b.plant)));
    info!(rows = out.records.len(), "monthly history extracted");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{extract_historical_from_reader, last_day_of_month, parse_kind, Metric};
    use crate::layout::SourceLayouts;
    use crate::model::Plant;

    const HISTORY: &str = "\u{feff}EXTRACTORA,AÑO,enero,febrero,marzo\n\
        MLB,RFF Procesada 2024,\"9.500.000\",9200,\n\
        MLB,Producción CPO 2024,\"1.805.000\",1700,\n\
        MLB,Extracción 2024,0.19,0.185,0.2\n\
        MLB,Proyección RFF 2024,1,1,1\n\
        SINÚ,RFF Procesada 2024,8000,,\n\
        Desconocida,RFF Procesada 2024,1,1,1\n";

    #[test]
    fn kind_cells_carry_metric_and_year() {
        let skip = vec!["Promedio".to_string()];
        assert_eq!(parse_kind("RFF Procesada 2017", &skip), Some((Metric::Rff, 2017)));
        assert_eq!(parse_kind(" Producción CPO 2020 ", &skip), Some((Metric::Cpo, 2020)));
        assert_eq!(parse_kind("Extracción 2019", &skip), Some((Metric::Extraction, 2019)));
        assert_eq!(parse_kind("Promedio 2019", &skip), None);
        assert_eq!(parse_kind("RFF Procesada", &skip), None);
    }

    #[test]
    fn month_ends() {
        assert_eq!(last_day_of_month(2024, 2), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(last_day_of_month(2023, 12), NaiveDate::from_ymd_opt(2023, 12, 31));
    }

    #[test]
    fn monthly_rows_are_emitted_at_month_end() {
        let layouts = SourceLayouts::builtin().unwrap();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(HISTORY.as_bytes());
        let out = extract_historical_from_reader(&mut rdr, &layouts.historical).unwrap();

        // MLB Jan + Feb, Sinú Jan; March carries only an extraction rate.
        assert_eq!(out.records.len(), 3);
        let jan_mlb = out
            .records
            .iter()
            .find(|r| r.plant == Plant::Mlb && r.date == NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
            .unwrap();
        // Kilogram years are brought back to tonnes.
        assert_eq!(jan_mlb.rff_actual, Some(9500.0));
        assert_eq!(jan_mlb.cpo_actual, Some(1805.0));
        assert_eq!(jan_mlb.tea_actual, Some(19.0));
        assert_eq!(jan_mlb.tea_target, Some(18.6));
        assert_eq!(jan_mlb.rff_budget, None);
        assert_eq!(jan_mlb.palm_kernel_actual, Some(90.25));

        let sinu = out.records.iter().find(|r| r.plant == Plant::Sinu).unwrap();
        assert_eq!(sinu.cpo_actual, None);
        assert_eq!(sinu.tea_actual, None);
    }
}
