//! Kernel mass-balance reports: already-structured JSON, one object per plant-day.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use super::Extraction;
use super::dates::parse_date_str;
use crate::error::{EtlError, EtlResult};
use crate::model::{
    CakeStock, KernelBalanceRecord, KernelMetrics, KernelOilStock, KernelStock, NutStock,
    OperationLog, Plant,
};

/// Problems come either as a list or as one free-text string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Problems {
    One(String),
    Many(Vec<String>),
}

impl Problems {
    fn joined(&self) -> Option<String> {
        let text = match self {
            Self::One(s) => s.trim().to_string(),
            Self::Many(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; "),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// One mass-balance report as delivered by the upstream reader.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BalanceReport {
    #[serde(rename = "fecha")]
    pub date: Option<String>,
    #[serde(rename = "planta")]
    pub plant: Option<String>,
    #[serde(rename = "nuez")]
    pub nut: NutStock,
    #[serde(rename = "almendra")]
    pub kernel: KernelStock,
    #[serde(rename = "ckpo")]
    pub kernel_oil: KernelOilStock,
    #[serde(rename = "torta")]
    pub cake: CakeStock,
    #[serde(rename = "metricas")]
    pub metrics: KernelMetrics,
    #[serde(rename = "operacion")]
    pub operation: OperationLog,
    #[serde(rename = "comentarios_operativos")]
    pub comments: Option<String>,
    #[serde(rename = "problemas_detectados")]
    pub problems: Option<Problems>,
    /// Set by the reader when it could not process the source document.
    pub error: Option<serde_json::Value>,
}

impl BalanceReport {
    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_null())
    }

    /// Flatten into a dataset row. Reports without a readable date or plant yield `None`.
    pub fn into_record(self) -> Option<KernelBalanceRecord> {
        let date = parse_date_str(self.date.as_deref()?)?;
        let plant = plant_code(self.plant.as_deref()?)?;
        Some(KernelBalanceRecord {
            date,
            plant,
            nut: self.nut,
            kernel: self.kernel,
            kernel_oil: self.kernel_oil,
            cake: self.cake,
            metrics: self.metrics,
            operation: self.operation,
            comments: self
                .comments
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            problems: self.problems.as_ref().and_then(Problems::joined),
        })
    }
}

/// Known plants map to their code; anything else is kept upper-cased.
fn plant_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match trimmed.parse::<Plant>() {
        Ok(plant) => plant.code().to_string(),
        Err(_) => trimmed.to_uppercase(),
    })
}

/// Parse a JSON document holding one report or an array of reports.
pub fn parse_reports(text: &str) -> EtlResult<Vec<BalanceReport>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(EtlError::from))
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

/// Read every report file. Reports flagged with an error, or without date and plant, are
/// skipped with a warning; unreadable files are hard errors.
pub fn extract_balance_reports<P: AsRef<Path>>(
    paths: &[P],
) -> EtlResult<Extraction<KernelBalanceRecord>> {
    let mut out = Extraction::default();
    for path in paths {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(EtlError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        for (idx, report) in parse_reports(&text)?.into_iter().enumerate() {
            if report.is_error() {
                warn!(file = %path.display(), report = idx, "report carries an error; skipped");
                continue;
            }
            match report.into_record() {
                Some(rec) => out.records.push(rec),
                None => {
                    warn!(file = %path.display(), report = idx, "report lacks date or plant; skipped")
                }
            }
        }
    }
    info!(reports = out.records.len(), files = paths.len(), "mass-balance reports read");
    Ok(out)
}

/// Rows of `date`, or of the latest date present when none is given.
pub fn daily_balance(
    records: &[KernelBalanceRecord],
    date: Option<NaiveDate>,
) -> Vec<KernelBalanceRecord> {
    let Some(day) = date.or_else(|| records.iter().map(|r| r.date).max()) else {
        return Vec::new();
    };
    records.iter().filter(|r| r.date == day).cloned().collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::NaiveDate;

    use super::{daily_balance, extract_balance_reports, parse_reports};

    const REPORTS: &str = r#"[
        {
            "fecha": "2025-11-29",
            "planta": "Codazzi",
            "almendra": {"inventario_final_kg": "4.200,5", "produccion_kg": 1800},
            "comentarios_operativos": "  ",
            "problemas_detectados": ["Expeller 2 detenido", "", "Baja humedad"]
        },
        {
            "fecha": "2025-11-30",
            "planta": "sinu",
            "problemas_detectados": "Sin novedad"
        },
        {"error": "could not read page 2"}
    ]"#;

    #[test]
    fn single_object_or_array() {
        assert_eq!(parse_reports(REPORTS).unwrap().len(), 3);
        let one = parse_reports(r#"{"fecha": "2025-11-30", "planta": "MLB"}"#).unwrap();
        assert_eq!(one.len(), 1);
        assert!(!one[0].is_error());
    }

    #[test]
    fn reports_flatten_and_errors_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(REPORTS.as_bytes()).unwrap();
        let out = extract_balance_reports(&[file.path()]).unwrap();
        assert_eq!(out.records.len(), 2);

        let czz = &out.records[0];
        assert_eq!(czz.plant, "CZZ");
        assert_eq!(czz.kernel.closing, Some(4200.5));
        assert_eq!(czz.kernel.production, Some(1800.0));
        assert_eq!(czz.comments, None);
        assert_eq!(czz.problems.as_deref(), Some("Expeller 2 detenido; Baja humedad"));
        assert_eq!(out.records[1].plant, "SINU");
        assert_eq!(out.records[1].problems.as_deref(), Some("Sin novedad"));
    }

    #[test]
    fn daily_lookup_defaults_to_latest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(REPORTS.as_bytes()).unwrap();
        let records = extract_balance_reports(&[file.path()]).unwrap().records;

        let latest = daily_balance(&records, None);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].date, NaiveDate::from_ymd_opt(2025, 11, 30).unwrap());
        assert_eq!(daily_balance(&records, NaiveDate::from_ymd_opt(2025, 11, 29)).len(), 1);
        assert!(daily_balance(&records, NaiveDate::from_ymd_opt(2025, 1, 1)).is_empty());
        assert!(daily_balance(&[], None).is_empty());
    }
}
