use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use super::{DatasetKind, Observation, Plant, RowCursor, ratio_pct, round_to};
use crate::error::EtlResult;
use crate::types::{DataType, Field, Schema, Value};

/// Where the quality columns of an upstream row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualitySource {
    /// Read from the tank-quality sheet.
    Measured,
    /// Synthesized from the extraction-rate deviation; placeholder only.
    Estimated,
}

impl QualitySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Measured => "medida",
            Self::Estimated => "estimada",
        }
    }
}

impl fmt::Display for QualitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualitySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "medida" => Ok(Self::Measured),
            "estimada" => Ok(Self::Estimated),
            other => Err(format!("unknown quality source '{other}'")),
        }
    }
}

/// One day of one extraction plant.
///
/// Masses are tonnes, rates and quality parameters are percentages. `None` means the source
/// carried no value; zero is a real zero.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRecord {
    pub date: NaiveDate,
    pub plant: Plant,
    /// Fresh fruit bunches processed (RFF).
    pub rff_actual: Option<f64>,
    pub rff_budget: Option<f64>,
    /// Crude palm oil (CPO).
    pub cpo_actual: Option<f64>,
    pub cpo_budget: Option<f64>,
    /// Palm kernel (palmiste).
    pub palm_kernel_actual: Option<f64>,
    pub palm_kernel_budget: Option<f64>,
    /// Oil extraction rate (TEA).
    pub tea_actual: Option<f64>,
    pub tea_target: Option<f64>,
    /// Kernel processed in the expeller (almendra).
    pub kernel_actual: Option<f64>,
    pub kernel_budget: Option<f64>,
    /// Crude palm kernel oil (KPO/CPKO).
    pub kernel_oil_actual: Option<f64>,
    pub kernel_oil_budget: Option<f64>,
    pub kernel_extraction: Option<f64>,
    pub acidity: Option<f64>,
    pub moisture: Option<f64>,
    pub impurities: Option<f64>,
    pub quality_source: Option<QualitySource>,
    pub cpo_inventory: Option<f64>,
    pub tanks: [Option<f64>; 4],
}

impl UpstreamRecord {
    /// A row with every measure absent.
    pub fn new(date: NaiveDate, plant: Plant) -> Self {
        Self {
            date,
            plant,
            rff_actual: None,
            rff_budget: None,
            cpo_actual: None,
            cpo_budget: None,
            palm_kernel_actual: None,
            palm_kernel_budget: None,
            tea_actual: None,
            tea_target: None,
            kernel_actual: None,
            kernel_budget: None,
            kernel_oil_actual: None,
            kernel_oil_budget: None,
            kernel_extraction: None,
            acidity: None,
            moisture: None,
            impurities: None,
            quality_source: None,
            cpo_inventory: None,
            tanks: [None; 4],
        }
    }

    /// CPO / RFF × 100 when RFF is positive.
    pub fn computed_tea(&self) -> Option<f64> {
        ratio_pct(self.cpo_actual, self.rff_actual)
    }

    /// Fill the palm-kernel estimate as a fixed share of CPO, actual and budget.
    ///
    /// The base is CPO for every source family, never RFF.
    pub fn estimate_palm_kernel(&mut self, share: f64) {
        self.palm_kernel_actual = self.cpo_actual.map(|v| round_to(v * share, 2));
        self.palm_kernel_budget = self.cpo_budget.map(|v| round_to(v * share, 2));
    }

    /// Placeholder quality derived from the extraction-rate deviation from 20 %.
    ///
    /// Only applied when no measured quality is present; tagged [`QualitySource::Estimated`].
    pub fn synthesize_quality(&mut self) {
        if self.quality_source == Some(QualitySource::Measured) {
            return;
        }
        match self.tea_actual {
            Some(tea) if tea > 0.0 => {
                let deviation = tea - 20.0;
                self.acidity = Some(round_to(2.5 + deviation * 0.1, 2));
                self.moisture = Some(round_to(0.12 + deviation * 0.005, 2));
                self.impurities = Some(round_to(0.05 + deviation * 0.002, 2));
                self.quality_source = Some(QualitySource::Estimated);
            }
            _ => {}
        }
    }
}

impl Observation for UpstreamRecord {
    const KIND: DatasetKind = DatasetKind::Upstream;

    fn schema() -> Schema {
        let mut fields = vec![
            Field::new("fecha", DataType::Date),
            Field::new("zona", DataType::Utf8),
        ];
        for name in [
            "rff_real",
            "rff_presupuesto",
            "cpo_real",
            "cpo_presupuesto",
            "palmiste_real",
            "palmiste_presupuesto",
            "tea_real",
            "tea_meta",
        ] {
            fields.push(Field::new(name, DataType::Float64));
        }
        for name in [
            "almendra_real",
            "almendra_presupuesto",
            "kpo_real",
            "kpo_presupuesto",
            "extraccion_almendra",
            "acidez",
            "humedad",
            "impurezas",
        ] {
            fields.push(Field::optional(name, DataType::Float64));
        }
        fields.push(Field::optional("calidad_fuente", DataType::Utf8));
        for name in ["inventario_cpo", "tanque_1", "tanque_2", "tanque_3", "tanque_4"] {
            fields.push(Field::optional(name, DataType::Float64));
        }
        Schema::new(fields)
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn entity_key(&self) -> &str {
        self.plant.as_str()
    }

    fn to_row(&self) -> Vec<Value> {
        let mut row = vec![
            Value::Date(self.date),
            Value::Utf8(self.plant.as_str().to_string()),
        ];
        for v in [
            self.rff_actual,
            self.rff_budget,
            self.cpo_actual,
            self.cpo_budget,
            self.palm_kernel_actual,
            self.palm_kernel_budget,
            self.tea_actual,
            self.tea_target,
            self.kernel_actual,
            self.kernel_budget,
            self.kernel_oil_actual,
            self.kernel_oil_budget,
            self.kernel_extraction,
            self.acidity,
            self.moisture,
            self.impurities,
        ] {
            row.push(Value::from_f64(v));
        }
        row.push(Value::from_text(self.quality_source.map(QualitySource::as_str)));
        row.push(Value::from_f64(self.cpo_inventory));
        row.extend(self.tanks.iter().map(|t| Value::from_f64(*t)));
        row
    }

    fn from_row(cells: &mut RowCursor<'_>) -> EtlResult<Self> {
        let date = cells.date()?;
        let plant: Plant = cells.parsed()?;
        let mut rec = Self::new(date, plant);
        rec.rff_actual = cells.float()?;
        rec.rff_budget = cells.float()?;
        rec.cpo_actual = cells.float()?;
        rec.cpo_budget = cells.float()?;
        rec.palm_kernel_actual = cells.float()?;
        rec.palm_kernel_budget = cells.float()?;
        rec.tea_actual = cells.float()?;
        rec.tea_target = cells.float()?;
        rec.kernel_actual = cells.float()?;
        rec.kernel_budget = cells.float()?;
        rec.kernel_oil_actual = cells.float()?;
        rec.kernel_oil_budget = cells.float()?;
        rec.kernel_extraction = cells.float()?;
        rec.acidity = cells.float()?;
        rec.moisture = cells.float()?;
        rec.impurities = cells.float()?;
        rec.quality_source = match cells.opt_text()? {
            Some(s) => s.parse().ok(),
            None => None,
        };
        rec.cpo_inventory = cells.float()?;
        for slot in &mut rec.tanks {
            *slot = cells.float()?;
        }
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{QualitySource, UpstreamRecord};
    use crate::model::{Observation, Plant, RowCursor};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    #[test]
    fn row_shape_matches_schema() {
        let rec = UpstreamRecord::new(day(1), Plant::Mlb);
        assert_eq!(rec.to_row().len(), UpstreamRecord::schema().fields.len());
    }

    #[test]
    fn row_conversion_keeps_absent_values_absent() {
        let mut rec = UpstreamRecord::new(day(2), Plant::Codazzi);
        rec.rff_actual = Some(100.0);
        rec.cpo_actual = Some(0.0);
        rec.quality_source = Some(QualitySource::Measured);
        rec.tanks[3] = Some(12.5);

        let schema = UpstreamRecord::schema();
        let row = rec.to_row();
        let back = UpstreamRecord::from_row(&mut RowCursor::new(&schema, &row, 1)).unwrap();
        assert_eq!(back, rec);
        assert_eq!(back.cpo_actual, Some(0.0));
        assert_eq!(back.rff_budget, None);
    }

    #[test]
    fn synthesized_quality_never_overrides_measured() {
        let mut rec = UpstreamRecord::new(day(3), Plant::Sinu);
        rec.tea_actual = Some(22.0);
        rec.synthesize_quality();
        assert_eq!(rec.quality_source, Some(QualitySource::Estimated));
        assert_eq!(rec.acidity, Some(2.7));
        assert_eq!(rec.moisture, Some(0.13));

        rec.acidity = Some(3.1);
        rec.quality_source = Some(QualitySource::Measured);
        rec.synthesize_quality();
        assert_eq!(rec.acidity, Some(3.1));
    }

    #[test]
    fn palm_kernel_is_five_percent_of_cpo() {
        let mut rec = UpstreamRecord::new(day(4), Plant::AyG);
        rec.rff_actual = Some(1000.0);
        rec.cpo_actual = Some(200.0);
        rec.estimate_palm_kernel(0.05);
        assert_eq!(rec.palm_kernel_actual, Some(10.0));
        assert_eq!(rec.palm_kernel_budget, None);
    }
}
