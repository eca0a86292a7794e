use chrono::NaiveDate;

use super::{DatasetKind, Observation, RowCursor, ratio_pct};
use crate::error::EtlResult;
use crate::types::{DataType, Field, Schema, Value};

/// One day of one refinery line or product.
#[derive(Debug, Clone, PartialEq)]
pub struct DownstreamRecord {
    pub date: NaiveDate,
    pub product: String,
    /// `refineria`, `fraccionamiento`, `producto` or `total`.
    pub product_type: Option<String>,
    /// Budgeted output (ME).
    pub budget: Option<f64>,
    pub actual: Option<f64>,
    /// actual / budget × 100.
    pub compliance: Option<f64>,
}

impl DownstreamRecord {
    /// Build a record and derive its compliance percentage.
    pub fn new(
        date: NaiveDate,
        product: impl Into<String>,
        product_type: Option<String>,
        budget: Option<f64>,
        actual: Option<f64>,
    ) -> Self {
        Self {
            date,
            product: product.into(),
            product_type,
            budget,
            actual,
            compliance: ratio_pct(actual, budget),
        }
    }
}

impl Observation for DownstreamRecord {
    const KIND: DatasetKind = DatasetKind::Downstream;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("fecha", DataType::Date),
            Field::new("producto", DataType::Utf8),
            Field::new("tipo", DataType::Utf8),
            Field::new("produccion_me", DataType::Float64),
            Field::new("produccion_real", DataType::Float64),
            Field::new("cumplimiento", DataType::Float64),
        ])
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn entity_key(&self) -> &str {
        &self.product
    }

    fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Date(self.date),
            Value::Utf8(self.product.clone()),
            Value::from_text(self.product_type.as_deref()),
            Value::from_f64(self.budget),
            Value::from_f64(self.actual),
            Value::from_f64(self.compliance),
        ]
    }

    fn from_row(cells: &mut RowCursor<'_>) -> EtlResult<Self> {
        Ok(Self {
            date: cells.date()?,
            product: cells.text()?,
            product_type: cells.opt_text()?,
            budget: cells.float()?,
            actual: cells.float()?,
            compliance: cells.float()?,
        })
    }
}

/// Refinery row of the older downstream layout (`refineria` instead of `producto`/`tipo`).
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRefineryRecord {
    pub date: NaiveDate,
    pub refinery: String,
    pub cpo_input: Option<f64>,
    pub olein_actual: Option<f64>,
    pub olein_budget: Option<f64>,
    pub rbd_actual: Option<f64>,
    pub rbd_budget: Option<f64>,
    pub margarine_actual: Option<f64>,
    pub margarine_budget: Option<f64>,
    /// Process losses (mermas).
    pub shrinkage: Option<f64>,
    pub rbd_inventory: Option<f64>,
    pub olein_inventory: Option<f64>,
    pub margarine_inventory: Option<f64>,
}

impl Observation for LegacyRefineryRecord {
    const KIND: DatasetKind = DatasetKind::DownstreamLegacy;

    fn schema() -> Schema {
        let mut fields = vec![
            Field::new("fecha", DataType::Date),
            Field::new("refineria", DataType::Utf8),
        ];
        for name in [
            "cpo_entrada",
            "oleina_real",
            "oleina_presupuesto",
            "rbd_real",
            "rbd_presupuesto",
            "margarinas_real",
            "margarinas_presupuesto",
            "mermas",
        ] {
            fields.push(Field::new(name, DataType::Float64));
        }
        for name in ["inventario_rbd", "inventario_oleina", "inventario_margarinas"] {
            fields.push(Field::optional(name, DataType::Float64));
        }
        Schema::new(fields)
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn entity_key(&self) -> &str {
        &self.refinery
    }

    fn to_row(&self) -> Vec<Value> {
        let mut row = vec![Value::Date(self.date), Value::Utf8(self.refinery.clone())];
        row.extend(
            [
                self.cpo_input,
                self.olein_actual,
                self.olein_budget,
                self.rbd_actual,
                self.rbd_budget,
                self.margarine_actual,
                self.margarine_budget,
                self.shrinkage,
                self.rbd_inventory,
                self.olein_inventory,
                self.margarine_inventory,
            ]
            .into_iter()
            .map(Value::from_f64),
        );
        row
    }

    fn from_row(cells: &mut RowCursor<'_>) -> EtlResult<Self> {
        Ok(Self {
            date: cells.date()?,
            refinery: cells.text()?,
            cpo_input: cells.float()?,
            olein_actual: cells.float()?,
            olein_budget: cells.float()?,
            rbd_actual: cells.float()?,
            rbd_budget: cells.float()?,
            margarine_actual: cells.float()?,
            margarine_budget: cells.float()?,
            shrinkage: cells.float()?,
            rbd_inventory: cells.float()?,
            olein_inventory: cells.float()?,
            margarine_inventory: cells.float()?,
        })
    }
}
