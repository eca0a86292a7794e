use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::{DatasetKind, Observation, RowCursor};
use crate::error::EtlResult;
use crate::extract::normalize::parse_number_text;
use crate::types::{DataType, Field, Schema, Value};

/// Accept a JSON number, a numeric string ("1.234,5") or null.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(v)) if v.is_finite() => Some(v),
        Some(Raw::Text(s)) => parse_number_text(&s),
        _ => None,
    })
}

/// Nut stock movements, kg.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NutStock {
    #[serde(rename = "inventario_inicial_kg", deserialize_with = "lenient_number")]
    pub opening: Option<f64>,
    #[serde(rename = "entrada_kg", deserialize_with = "lenient_number")]
    pub intake: Option<f64>,
    #[serde(rename = "produccion_kg", deserialize_with = "lenient_number")]
    pub production: Option<f64>,
    #[serde(rename = "consumo_kg", deserialize_with = "lenient_number")]
    pub consumption: Option<f64>,
    #[serde(rename = "inventario_final_kg", deserialize_with = "lenient_number")]
    pub closing: Option<f64>,
}

/// Kernel (almendra) stock movements, kg.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KernelStock {
    #[serde(rename = "inventario_inicial_kg", deserialize_with = "lenient_number")]
    pub opening: Option<f64>,
    #[serde(rename = "produccion_kg", deserialize_with = "lenient_number")]
    pub production: Option<f64>,
    #[serde(rename = "compra_kg", deserialize_with = "lenient_number")]
    pub purchase: Option<f64>,
    #[serde(rename = "traslado_expeller_kg", deserialize_with = "lenient_number")]
    pub to_expeller: Option<f64>,
    #[serde(rename = "despacho_kg", deserialize_with = "lenient_number")]
    pub dispatch: Option<f64>,
    #[serde(rename = "inventario_silos_kg", deserialize_with = "lenient_number")]
    pub silo_inventory: Option<f64>,
    #[serde(rename = "inventario_empacada_kg", deserialize_with = "lenient_number")]
    pub bagged_inventory: Option<f64>,
    #[serde(rename = "inventario_final_kg", deserialize_with = "lenient_number")]
    pub closing: Option<f64>,
}

/// Crude palm kernel oil stock movements, kg.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KernelOilStock {
    #[serde(rename = "inventario_inicial_kg", deserialize_with = "lenient_number")]
    pub opening: Option<f64>,
    #[serde(rename = "produccion_kg", deserialize_with = "lenient_number")]
    pub production: Option<f64>,
    #[serde(rename = "despacho_kg", deserialize_with = "lenient_number")]
    pub dispatch: Option<f64>,
    #[serde(rename = "traslado_refineria_kg", deserialize_with = "lenient_number")]
    pub to_refinery: Option<f64>,
    #[serde(rename = "inventario_final_kg", deserialize_with = "lenient_number")]
    pub closing: Option<f64>,
}

/// Kernel cake (torta) stock movements, kg.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CakeStock {
    #[serde(rename = "inventario_inicial_kg", deserialize_with = "lenient_number")]
    pub opening: Option<f64>,
    #[serde(rename = "produccion_kg", deserialize_with = "lenient_number")]
    pub production: Option<f64>,
    #[serde(rename = "despacho_kg", deserialize_with = "lenient_number")]
    pub dispatch: Option<f64>,
    #[serde(rename = "inventario_final_kg", deserialize_with = "lenient_number")]
    pub closing: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KernelMetrics {
    #[serde(rename = "tea_palmiste_pct", deserialize_with = "lenient_number")]
    pub kernel_tea_pct: Option<f64>,
    #[serde(rename = "recuperacion_almendra_pct", deserialize_with = "lenient_number")]
    pub kernel_recovery_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OperationLog {
    #[serde(rename = "horas_trabajadas", deserialize_with = "lenient_number")]
    pub hours_worked: Option<f64>,
    #[serde(rename = "expellers_trabajados", deserialize_with = "lenient_number")]
    pub expellers_worked: Option<f64>,
}

/// One day of the kernel mass balance of one plant.
///
/// Unlike the upstream dataset, masses stay in kilograms: the column names carry the unit.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelBalanceRecord {
    pub date: NaiveDate,
    /// Plant code (`CZZ`, `A&G`, `MLB`, `SINU`).
    pub plant: String,
    pub nut: NutStock,
    pub kernel: KernelStock,
    pub kernel_oil: KernelOilStock,
    pub cake: CakeStock,
    pub metrics: KernelMetrics,
    pub operation: OperationLog,
    pub comments: Option<String>,
    /// Problems joined with `"; "`.
    pub problems: Option<String>,
}

const MEASURE_COLUMNS: [&str; 26] = [
    "nuez_inventario_inicial_kg",
    "nuez_entrada_kg",
    "nuez_produccion_kg",
    "nuez_consumo_kg",
    "nuez_inventario_final_kg",
    "almendra_inventario_inicial_kg",
    "almendra_produccion_kg",
    "almendra_compra_kg",
    "almendra_traslado_expeller_kg",
    "almendra_despacho_kg",
    "almendra_inventario_silos_kg",
    "almendra_inventario_empacada_kg",
    "almendra_inventario_final_kg",
    "ckpo_inventario_inicial_kg",
    "ckpo_produccion_kg",
    "ckpo_despacho_kg",
    "ckpo_traslado_refineria_kg",
    "ckpo_inventario_final_kg",
    "torta_inventario_inicial_kg",
    "torta_produccion_kg",
    "torta_despacho_kg",
    "torta_inventario_final_kg",
    "tea_palmiste_pct",
    "recuperacion_almendra_pct",
    "horas_trabajadas",
    "expellers_trabajados",
];

impl KernelBalanceRecord {
    fn measures(&self) -> [Option<f64>; 26] {
        [
            self.nut.opening,
            self.nut.intake,
            self.nut.production,
            self.nut.consumption,
            self.nut.closing,
            self.kernel.opening,
            self.kernel.production,
            self.kernel.purchase,
            self.kernel.to_expeller,
            self.kernel.dispatch,
            self.kernel.silo_inventory,
            self.kernel.bagged_inventory,
            self.kernel.closing,
            self.kernel_oil.opening,
            self.kernel_oil.production,
            self.kernel_oil.dispatch,
            self.kernel_oil.to_refinery,
            self.kernel_oil.closing,
            self.cake.opening,
            self.cake.production,
            self.cake.dispatch,
            self.cake.closing,
            self.metrics.kernel_tea_pct,
            self.metrics.kernel_recovery_pct,
            self.operation.hours_worked,
            self.operation.expellers_worked,
        ]
    }
}

impl Observation for KernelBalanceRecord {
    const KIND: DatasetKind = DatasetKind::KernelBalance;

    fn schema() -> Schema {
        let mut fields = vec![
            Field::new("fecha", DataType::Date),
            Field::new("planta", DataType::Utf8),
        ];
        fields.extend(
            MEASURE_COLUMNS
                .iter()
                .map(|name| Field::optional(*name, DataType::Float64)),
        );
        fields.push(Field::optional("comentarios", DataType::Utf8));
        fields.push(Field::optional("problemas", DataType::Utf8));
        Schema::new(fields)
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn entity_key(&self) -> &str {
        &self.plant
    }

    fn to_row(&self) -> Vec<Value> {
        let mut row = vec![Value::Date(self.date), Value::Utf8(self.plant.clone())];
        row.extend(self.measures().into_iter().map(Value::from_f64));
        row.push(Value::from_text(self.comments.as_deref()));
        row.push(Value::from_text(self.problems.as_deref()));
        row
    }

    fn from_row(cells: &mut RowCursor<'_>) -> EtlResult<Self> {
        let date = cells.date()?;
        let plant = cells.text()?;
        let mut m = [None; 26];
        for slot in &mut m {
            *slot = cells.float()?;
        }
        Ok(Self {
            date,
            plant,
            nut: NutStock {
                opening: m[0],
                intake: m[1],
                production: m[2],
                consumption: m[3],
                closing: m[4],
            },
            kernel: KernelStock {
                opening: m[5],
                production: m[6],
                purchase: m[7],
                to_expeller: m[8],
                dispatch: m[9],
                silo_inventory: m[10],
                bagged_inventory: m[11],
                closing: m[12],
            },
            kernel_oil: KernelOilStock {
                opening: m[13],
                production: m[14],
                dispatch: m[15],
                to_refinery: m[16],
                closing: m[17],
            },
            cake: CakeStock {
                opening: m[18],
                production: m[19],
                dispatch: m[20],
                closing: m[21],
            },
            metrics: KernelMetrics {
                kernel_tea_pct: m[22],
                kernel_recovery_pct: m[23],
            },
            operation: OperationLog {
                hours_worked: m[24],
                expellers_worked: m[25],
            },
            comments: cells.opt_text()?,
            problems: cells.opt_text()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{KernelBalanceRecord, KernelStock, NutStock};
    use crate::model::{Observation, RowCursor};

    #[test]
    fn stock_sections_accept_numeric_strings() {
        let nut: NutStock = serde_json::from_str(
            r#"{"inventario_inicial_kg": "12.500,5", "consumo_kg": 300.5, "entrada_kg": null}"#,
        )
        .unwrap();
        assert_eq!(nut.opening, Some(12500.5));
        assert_eq!(nut.consumption, Some(300.5));
        assert_eq!(nut.intake, None);
        assert_eq!(nut.closing, None);
    }

    #[test]
    fn flattened_row_restores_sections() {
        let rec = KernelBalanceRecord {
            date: NaiveDate::from_ymd_opt(2025, 11, 30).unwrap(),
            plant: "CZZ".to_string(),
            nut: NutStock::default(),
            kernel: KernelStock {
                closing: Some(4_200.0),
                ..KernelStock::default()
            },
            kernel_oil: Default::default(),
            cake: Default::default(),
            metrics: Default::default(),
            operation: Default::default(),
            comments: Some("Expeller 2 en mantenimiento".to_string()),
            problems: None,
        };
        let schema = KernelBalanceRecord::schema();
        let row = rec.to_row();
        assert_eq!(row.len(), schema.fields.len());
        let back = KernelBalanceRecord::from_row(&mut RowCursor::new(&schema, &row, 1)).unwrap();
        assert_eq!(back, rec);
    }
}
