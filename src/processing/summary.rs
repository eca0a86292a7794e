//! Per-entity totals over a canonical dataset.

use chrono::NaiveDate;

use super::reduce::{ReduceOp, reduce};
use crate::model::{DownstreamRecord, UpstreamRecord, ratio_pct, round_to, to_dataset};
use crate::types::{DataSet, Value};

/// Totals for one plant over the summarized rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantSummary {
    pub plant: String,
    /// Rows (days) in the period.
    pub days: usize,
    pub rff_actual: Option<f64>,
    pub rff_budget: Option<f64>,
    pub cpo_actual: Option<f64>,
    pub cpo_budget: Option<f64>,
    /// Plain average of the daily TEA.
    pub mean_tea: Option<f64>,
    /// ΣCPO / ΣRFF × 100.
    pub weighted_tea: Option<f64>,
    pub cpo_variance: Option<Variance>,
}

/// Totals for one product over the summarized rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSummary {
    pub product: String,
    pub days: usize,
    pub budget: Option<f64>,
    pub actual: Option<f64>,
    /// Σactual / Σbudget × 100.
    pub compliance: Option<f64>,
}

/// Gap between an actual and its budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variance {
    /// actual − budget.
    pub absolute: f64,
    /// (actual − budget) / budget × 100.
    pub percent: Option<f64>,
    /// actual / budget × 100.
    pub compliance: Option<f64>,
}

/// Variance of `actual` against `budget`; `None` unless both are present.
pub fn variance(actual: Option<f64>, budget: Option<f64>) -> Option<Variance> {
    let (a, b) = (actual?, budget?);
    Some(Variance {
        absolute: round_to(a - b, 2),
        percent: ratio_pct(Some(a - b), Some(b)),
        compliance: ratio_pct(Some(a), Some(b)),
    })
}

fn column_total(dataset: &DataSet, column: &str, op: ReduceOp) -> Option<f64> {
    reduce(dataset, column, op)
        .as_ref()
        .and_then(Value::as_f64)
        .map(|v| round_to(v, 2))
}

fn in_range(date: NaiveDate, range: Option<(NaiveDate, NaiveDate)>) -> bool {
    range.is_none_or(|(from, to)| (from..=to).contains(&date))
}

/// One summary per plant present in `records`, optionally restricted to `[from, to]`.
pub fn summarize_upstream(
    records: &[UpstreamRecord],
    range: Option<(NaiveDate, NaiveDate)>,
) -> Vec<PlantSummary> {
    let selected: Vec<UpstreamRecord> = records
        .iter()
        .filter(|r| in_range(r.date, range))
        .cloned()
        .collect();
    let dataset = to_dataset(&selected);
    let Some(zone_idx) = dataset.schema.index_of("zona") else {
        return Vec::new();
    };

    let mut out: Vec<PlantSummary> = dataset
        .distinct_text("zona")
        .into_iter()
        .map(|plant| {
            let rows = dataset
                .filter_rows(|row| row.get(zone_idx).and_then(Value::as_str) == Some(plant.as_str()));
            let rff_actual = column_total(&rows, "rff_real", ReduceOp::Sum);
            let cpo_actual = column_total(&rows, "cpo_real", ReduceOp::Sum);
            let cpo_budget = column_total(&rows, "cpo_presupuesto", ReduceOp::Sum);
            PlantSummary {
                days: rows.row_count(),
                rff_budget: column_total(&rows, "rff_presupuesto", ReduceOp::Sum),
                mean_tea: column_total(&rows, "tea_real", ReduceOp::Mean),
                weighted_tea: ratio_pct(cpo_actual, rff_actual),
                cpo_variance: variance(cpo_actual, cpo_budget),
                plant,
                rff_actual,
                cpo_actual,
                cpo_budget,
            }
        })
        .collect();
    out.sort_by(|a, b| a.plant.cmp(&b.plant));
    out
}

/// One summary per product present in `records`, optionally restricted to `[from, to]`.
pub fn summarize_downstream(
    records: &[DownstreamRecord],
    range: Option<(NaiveDate, NaiveDate)>,
) -> Vec<ProductSummary> {
    let selected: Vec<DownstreamRecord> = records
        .iter()
        .filter(|r| in_range(r.date, range))
        .cloned()
        .collect();
    let dataset = to_dataset(&selected);
    let Some(product_idx) = dataset.schema.index_of("producto") else {
        return Vec::new();
    };

    dataset
        .distinct_text("producto")
        .into_iter()
        .map(|product| {
            let rows = dataset.filter_rows(|row| {
                row.get(product_idx).and_then(Value::as_str) == Some(product.as_str())
            });
            let budget = column_total(&rows, "produccion_me", ReduceOp::Sum);
            let actual = column_total(&rows, "produccion_real", ReduceOp::Sum);
            ProductSummary {
                days: rows.row_count(),
                compliance: ratio_pct(actual, budget),
                product,
                budget,
                actual,
            }
        })
        .collect()
}
