//! Dataset writer/reader.
//!
//! One file per dataset kind; the extension picks the format. Every write is a full rewrite that
//! lands in a temporary file next to the target and is then renamed over it, so an interrupted
//! run leaves the previous file intact.

pub mod csv;
pub mod parquet;

use std::fs;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{EtlError, EtlResult};
use crate::model::{DownstreamRecord, LegacyRefineryRecord, Observation, from_dataset, to_dataset};
use crate::types::{DataSet, Schema};

/// File formats supported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFormat {
    Csv,
    Parquet,
}

impl StorageFormat {
    /// Infer the format from a file extension (`csv`, `parquet`, `pq`).
    pub fn from_path(path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("parquet" | "pq") => Ok(Self::Parquet),
            _ => Err(EtlError::config(format!(
                "unsupported dataset extension for {} (expected .csv or .parquet)",
                path.display()
            ))),
        }
    }
}

/// Canonical form of a stored column name: trimmed, lower-case, spaces as `_`.
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Position of each schema field among a file's columns.
pub(crate) struct ColumnMap {
    indexes: Vec<Option<usize>>,
}

impl ColumnMap {
    /// Map `schema` onto normalized `headers`. A missing required field is a schema error.
    pub(crate) fn resolve(schema: &Schema, headers: &[String]) -> EtlResult<Self> {
        let mut indexes = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let idx = headers.iter().position(|h| *h == field.name);
            if idx.is_none() && field.required {
                return Err(EtlError::SchemaMismatch {
                    message: format!(
                        "missing required column '{}'; headers={headers:?}",
                        field.name
                    ),
                });
            }
            indexes.push(idx);
        }
        Ok(Self { indexes })
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = Option<usize>> + '_ {
        self.indexes.iter().copied()
    }
}

/// Read a stored dataset following `schema`.
pub fn read_dataset(path: impl AsRef<Path>, schema: &Schema) -> EtlResult<DataSet> {
    let path = path.as_ref();
    match StorageFormat::from_path(path)? {
        StorageFormat::Csv => {
            let mut rdr = ::csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_path(path)?;
            csv::read_csv_from_reader(&mut rdr, schema)
        }
        StorageFormat::Parquet => parquet::read_parquet_from_path(path, schema),
    }
}

/// Normalized column names of a stored dataset.
pub fn read_headers(path: impl AsRef<Path>) -> EtlResult<Vec<String>> {
    let path = path.as_ref();
    match StorageFormat::from_path(path)? {
        StorageFormat::Csv => {
            let mut rdr = ::csv::ReaderBuilder::new()
                .has_headers(true)
                .from_path(path)?;
            Ok(rdr.headers()?.iter().map(normalize_header).collect())
        }
        StorageFormat::Parquet => parquet::parquet_column_names(path),
    }
}

/// Atomically replace `path` with `dataset`, creating the parent directory if needed.
pub fn write_dataset(path: impl AsRef<Path>, dataset: &DataSet) -> EtlResult<()> {
    let path = path.as_ref();
    let format = StorageFormat::from_path(path)?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    match format {
        StorageFormat::Csv => csv::write_csv(tmp.as_file_mut(), dataset)?,
        StorageFormat::Parquet => parquet::write_parquet(tmp.as_file_mut(), dataset)?,
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| EtlError::Io(e.error))?;
    debug!(path = %path.display(), rows = dataset.row_count(), "dataset written");
    Ok(())
}

/// Write typed observations as their canonical dataset.
pub fn write_records<T: Observation>(path: impl AsRef<Path>, records: &[T]) -> EtlResult<()> {
    write_dataset(path, &to_dataset(records))
}

/// Read typed observations; the file must exist.
pub fn read_records<T: Observation>(path: impl AsRef<Path>) -> EtlResult<Vec<T>> {
    let path = path.as_ref();
    let dataset = read_dataset(path, &T::schema())?;
    let first_row = match StorageFormat::from_path(path)? {
        StorageFormat::Csv => 2,
        StorageFormat::Parquet => 1,
    };
    from_dataset(&dataset, first_row)
}

/// State of the canonical dataset before an import.
#[derive(Debug, Clone, PartialEq)]
pub enum History<T> {
    /// No file yet: first run.
    Absent,
    Loaded(Vec<T>),
    /// The file exists but cannot be read back.
    Corrupt { message: String },
}

impl<T> History<T> {
    /// Rows to merge against; absent and corrupt history contribute none.
    pub fn into_records(self) -> Vec<T> {
        match self {
            Self::Loaded(records) => records,
            Self::Absent | Self::Corrupt { .. } => Vec::new(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Load the canonical dataset at `path` without failing on a bad file.
pub fn load_history<T: Observation>(path: impl AsRef<Path>) -> History<T> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no existing dataset");
        return History::Absent;
    }
    match read_records(path) {
        Ok(records) => History::Loaded(records),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "existing dataset is unreadable");
            History::Corrupt {
                message: err.to_string(),
            }
        }
    }
}

/// A downstream file in either of its two layouts.
#[derive(Debug, Clone, PartialEq)]
pub enum DownstreamData {
    Current(Vec<DownstreamRecord>),
    Legacy(Vec<LegacyRefineryRecord>),
}

impl DownstreamData {
    pub fn len(&self) -> usize {
        match self {
            Self::Current(rows) => rows.len(),
            Self::Legacy(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read a downstream file, detecting the older `refineria` layout. `None` if it does not exist.
pub fn load_downstream(path: impl AsRef<Path>) -> EtlResult<Option<DownstreamData>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let headers = read_headers(path)?;
    let legacy = headers.iter().any(|h| h == "refineria") && !headers.iter().any(|h| h == "producto");
    let data = if legacy {
        DownstreamData::Legacy(read_records(path)?)
    } else {
        DownstreamData::Current(read_records(path)?)
    };
    Ok(Some(data))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;

    use super::{
        DownstreamData, History, StorageFormat, load_downstream, load_history, normalize_header,
        write_records,
    };
    use crate::model::{DownstreamRecord, Plant, UpstreamRecord};

    #[test]
    fn format_follows_extension() {
        assert_eq!(StorageFormat::from_path("a/upstream.csv").unwrap(), StorageFormat::Csv);
        assert_eq!(StorageFormat::from_path("x.PARQUET").unwrap(), StorageFormat::Parquet);
        assert!(StorageFormat::from_path("x.xlsx").is_err());
    }

    #[test]
    fn headers_normalize() {
        assert_eq!(normalize_header("\u{feff} RFF  Real "), "rff_real");
        assert_eq!(normalize_header("fecha"), "fecha");
    }

    #[test]
    fn history_states() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.csv");
        assert_eq!(load_history::<UpstreamRecord>(&path), History::Absent);

        let d = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let mut rec = UpstreamRecord::new(d, Plant::Mlb);
        rec.rff_actual = Some(0.0);
        write_records(&path, &[rec.clone()]).unwrap();
        assert_eq!(load_history::<UpstreamRecord>(&path), History::Loaded(vec![rec]));

        fs::write(&path, "fecha,zona\nnot-a-date,MLB\n").unwrap();
        assert!(load_history::<UpstreamRecord>(&path).is_corrupt());
    }

    #[test]
    fn legacy_downstream_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("downstream.csv");
        assert_eq!(load_downstream(&path).unwrap(), None);

        fs::write(
            &path,
            "fecha,refineria,cpo_entrada,oleina_real,oleina_presupuesto,rbd_real,rbd_presupuesto,\
             margarinas_real,margarinas_presupuesto,mermas\n\
             2024-03-01,Refinería 1,500,300,310,150,160,20,25,5\n",
        )
        .unwrap();
        match load_downstream(&path).unwrap() {
            Some(DownstreamData::Legacy(rows)) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].refinery, "Refinería 1");
                assert_eq!(rows[0].rbd_inventory, None);
            }
            other => panic!("expected legacy rows, got {other:?}"),
        }
        // The current layout does not parse a legacy file.
        assert!(load_history::<DownstreamRecord>(&path).is_corrupt());
    }
}
