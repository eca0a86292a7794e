//! Canonical observations.
//!
//! Every dataset kind is a flat table keyed by `(date, entity key)`: the plant for upstream rows,
//! the product for downstream rows, the plant code for the kernel mass balance. The
//! [`Observation`] trait is what the merge engine and the store are generic over.

mod balance;
mod downstream;
mod upstream;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, EtlResult};
use crate::types::{DataSet, Field, Schema, Value};

pub use balance::{
    CakeStock, KernelBalanceRecord, KernelMetrics, KernelOilStock, KernelStock, NutStock,
    OperationLog,
};
pub use downstream::{DownstreamRecord, LegacyRefineryRecord};
pub use upstream::{QualitySource, UpstreamRecord};

/// Which canonical file a set of observations belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Field/extraction plants, one row per (date, plant).
    Upstream,
    /// Refinery and products, one row per (date, product).
    Downstream,
    /// Older refinery layout keyed by `refineria`.
    DownstreamLegacy,
    /// Kernel mass balance, one row per (date, plant code).
    KernelBalance,
}

impl DatasetKind {
    /// File name used when settings do not override it.
    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::Upstream => "upstream.csv",
            Self::Downstream | Self::DownstreamLegacy => "downstream.csv",
            Self::KernelBalance => "balance_almendra.csv",
        }
    }

    /// Name of the entity-key column.
    pub fn key_column(self) -> &'static str {
        match self {
            Self::Upstream => "zona",
            Self::Downstream => "producto",
            Self::DownstreamLegacy => "refineria",
            Self::KernelBalance => "planta",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
            Self::DownstreamLegacy => "downstream (legacy)",
            Self::KernelBalance => "kernel balance",
        };
        f.write_str(name)
    }
}

/// A row of a canonical dataset.
pub trait Observation: Clone + fmt::Debug {
    /// Dataset this observation is stored in.
    const KIND: DatasetKind;

    /// Column layout, base columns first.
    fn schema() -> Schema;

    fn date(&self) -> NaiveDate;

    /// Entity half of the `(date, entity)` key.
    fn entity_key(&self) -> &str;

    /// Values in [`Observation::schema`] order.
    fn to_row(&self) -> Vec<Value>;

    /// Rebuild from values in [`Observation::schema`] order.
    fn from_row(cells: &mut RowCursor<'_>) -> EtlResult<Self>;
}

/// Convert typed observations into a [`DataSet`].
pub fn to_dataset<T: Observation>(records: &[T]) -> DataSet {
    DataSet::new(T::schema(), records.iter().map(Observation::to_row).collect())
}

/// Convert a [`DataSet`] whose rows follow `T::schema()` back into observations.
///
/// `first_row` is the 1-based row number used in error messages.
pub fn from_dataset<T: Observation>(dataset: &DataSet, first_row: usize) -> EtlResult<Vec<T>> {
    dataset
        .rows
        .iter()
        .enumerate()
        .map(|(idx0, row)| {
            let mut cursor = RowCursor::new(&dataset.schema, row, first_row + idx0);
            T::from_row(&mut cursor)
        })
        .collect()
}

/// Sequential typed access to one row, in schema order.
pub struct RowCursor<'a> {
    fields: &'a [Field],
    values: &'a [Value],
    row: usize,
    pos: usize,
}

impl<'a> RowCursor<'a> {
    pub fn new(schema: &'a Schema, values: &'a [Value], row: usize) -> Self {
        Self {
            fields: &schema.fields,
            values,
            row,
            pos: 0,
        }
    }

    fn advance(&mut self) -> (&'a str, &'a Value) {
        let name = self.fields.get(self.pos).map_or("?", |f| f.name.as_str());
        let value = self.values.get(self.pos).unwrap_or(&Value::Null);
        self.pos += 1;
        (name, value)
    }

    fn error(&self, column: &str, value: &Value, message: &str) -> EtlError {
        EtlError::ParseError {
            row: self.row,
            column: column.to_string(),
            raw: format!("{value:?}"),
            message: message.to_string(),
        }
    }

    /// A non-null date.
    pub fn date(&mut self) -> EtlResult<NaiveDate> {
        let (name, value) = self.advance();
        value
            .as_date()
            .ok_or_else(|| self.error(name, value, "expected a date"))
    }

    /// A non-null, non-empty string.
    pub fn text(&mut self) -> EtlResult<String> {
        let (name, value) = self.advance();
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
            _ => Err(self.error(name, value, "expected a non-empty string")),
        }
    }

    pub fn opt_text(&mut self) -> EtlResult<Option<String>> {
        let (name, value) = self.advance();
        match value {
            Value::Null => Ok(None),
            Value::Utf8(s) if s.is_empty() => Ok(None),
            Value::Utf8(s) => Ok(Some(s.clone())),
            other => Err(self.error(name, other, "expected a string")),
        }
    }

    pub fn float(&mut self) -> EtlResult<Option<f64>> {
        let (name, value) = self.advance();
        match value {
            Value::Null => Ok(None),
            Value::Float64(v) => Ok(Some(*v)),
            other => Err(self.error(name, other, "expected a number")),
        }
    }

    /// Parse a non-null string column with [`FromStr`].
    pub fn parsed<T>(&mut self) -> EtlResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let (name, value) = self.advance();
        let raw = value
            .as_str()
            .ok_or_else(|| self.error(name, value, "expected a string"))?;
        raw.parse::<T>()
            .map_err(|e| self.error(name, value, &e.to_string()))
    }
}

/// Round to `decimals` places (half away from zero).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) fn round2(value: Option<f64>) -> Option<f64> {
    value.map(|v| round_to(v, 2))
}

/// `part / whole * 100`, rounded to two decimals, when `whole` is positive.
pub fn ratio_pct(part: Option<f64>, whole: Option<f64>) -> Option<f64> {
    match (part, whole) {
        (Some(p), Some(w)) if w > 0.0 => Some(round_to(p / w * 100.0, 2)),
        _ => None,
    }
}

/// Extraction plants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Plant {
    /// A&G (Aceites & Grasas).
    AyG,
    Codazzi,
    /// María La Baja.
    Mlb,
    Sinu,
}

impl Plant {
    pub const ALL: [Plant; 4] = [Plant::AyG, Plant::Codazzi, Plant::Mlb, Plant::Sinu];

    /// Canonical name as stored in the `zona` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AyG => "A&G",
            Self::Codazzi => "Codazzi",
            Self::Mlb => "MLB",
            Self::Sinu => "Sinú",
        }
    }

    /// Short code used by the kernel mass-balance reports.
    pub fn code(self) -> &'static str {
        match self {
            Self::AyG => "A&G",
            Self::Codazzi => "CZZ",
            Self::Mlb => "MLB",
            Self::Sinu => "SINU",
        }
    }

    /// Target extraction rate used when a source carries none.
    pub fn default_tea_target(self) -> f64 {
        match self {
            Self::AyG => 23.5,
            Self::Codazzi => 21.6,
            Self::Mlb => 18.6,
            Self::Sinu => 22.0,
        }
    }
}

impl fmt::Display for Plant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                'ú' | 'Ú' => 'U',
                'í' | 'Í' => 'I',
                'á' | 'Á' => 'A',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        match folded.as_str() {
            "A&G" | "A&GC" | "AYG" | "ACEITES&GRASAS" => Ok(Self::AyG),
            "CODAZZI" | "CZZ" => Ok(Self::Codazzi),
            "MLB" | "MARIALABAJA" => Ok(Self::Mlb),
            "SINU" => Ok(Self::Sinu),
            _ => Err(format!("unknown plant '{s}'")),
        }
    }
}

impl TryFrom<String> for Plant {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Plant> for String {
    fn from(plant: Plant) -> Self {
        plant.as_str().to_string()
    }
}
