//! One layout document per source family.

use std::collections::BTreeSet;

use serde::Deserialize;

use super::cells::{Locator, MassUnit};
use crate::error::{EtlError, EtlResult};
use crate::model::Plant;

fn default_first_date_column() -> u32 {
    1
}

fn default_palm_kernel_share() -> f64 {
    0.05
}

fn default_kernel_target() -> f64 {
    41.0
}

fn default_error_floor() -> f64 {
    -1_000_000.0
}

fn check_unique_plants<'a>(
    family: &str,
    plants: impl IntoIterator<Item = &'a Plant>,
) -> EtlResult<()> {
    let mut seen = BTreeSet::new();
    for plant in plants {
        if !seen.insert(*plant) {
            return Err(EtlError::config(format!(
                "{family} layout: plant {plant} is configured twice"
            )));
        }
    }
    Ok(())
}

/// Daily tracking workbook (`UPSTREAM` + `DOWNSTREAM` sheets, dates across the header row).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeguimientoLayout {
    pub version: u32,
    pub source_pattern: String,
    pub upstream: UpstreamSheet,
    pub downstream: DownstreamSheet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSheet {
    pub sheet: String,
    #[serde(default)]
    pub label_column: u32,
    #[serde(default)]
    pub header_row: u32,
    #[serde(default = "default_first_date_column")]
    pub first_date_column: u32,
    #[serde(default = "default_palm_kernel_share")]
    pub palm_kernel_share: f64,
    #[serde(default)]
    pub mass_unit: MassUnit,
    pub plants: Vec<PlantBlock>,
    pub kernel: Option<KernelBlock>,
}

/// Row block of one plant. The TEA label row carries the inline target ("TEA% 21.6%").
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlantBlock {
    pub plant: Plant,
    /// Fallback when the TEA label carries no target.
    pub tea_target: f64,
    /// Whether the kernel block belongs to this plant.
    #[serde(default)]
    pub kernel: bool,
    pub rff_budget: Locator,
    pub rff_actual: Locator,
    pub cpo_actual: Locator,
    pub tea: Locator,
}

/// Kernel/expeller rows, read only for the plant flagged `kernel = true`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelBlock {
    pub kernel_budget: Locator,
    pub kernel_actual: Locator,
    pub kernel_oil_actual: Locator,
    pub kernel_extraction: Locator,
    /// Kernel-oil budget as a percentage of the kernel budget.
    #[serde(default = "default_kernel_target")]
    pub target_extraction: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownstreamSheet {
    pub sheet: String,
    #[serde(default)]
    pub label_column: u32,
    #[serde(default)]
    pub header_row: u32,
    #[serde(default = "default_first_date_column")]
    pub first_date_column: u32,
    pub products: Vec<ProductBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductBlock {
    pub product: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub budget: Locator,
    pub actual: Locator,
}

impl SeguimientoLayout {
    pub fn validate(&self) -> EtlResult<()> {
        check_unique_plants("seguimiento", self.upstream.plants.iter().map(|p| &p.plant))?;
        let kernel_plants: Vec<Plant> = self
            .upstream
            .plants
            .iter()
            .filter(|p| p.kernel)
            .map(|p| p.plant)
            .collect();
        if kernel_plants.len() > 1 {
            return Err(EtlError::config(format!(
                "seguimiento layout: only one plant may run the kernel process, found {kernel_plants:?}"
            )));
        }
        if !kernel_plants.is_empty() && self.upstream.kernel.is_none() {
            return Err(EtlError::config(
                "seguimiento layout: a kernel plant is configured without [upstream.kernel] rows",
            ));
        }
        let mut products = BTreeSet::new();
        for p in &self.downstream.products {
            if !products.insert(p.product.as_str()) {
                return Err(EtlError::config(format!(
                    "seguimiento layout: product '{}' is configured twice",
                    p.product
                )));
            }
        }
        Ok(())
    }

    /// The plant whose rows carry the kernel block, if any.
    pub fn kernel_plant(&self) -> Option<Plant> {
        self.upstream
            .plants
            .iter()
            .find(|p| p.kernel)
            .map(|p| p.plant)
    }
}

/// Per-plant database workbook: one dated row per day, values in kilograms.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoCpoLayout {
    pub version: u32,
    pub source_pattern: String,
    #[serde(default)]
    pub mass_unit: MassUnit,
    #[serde(default = "default_palm_kernel_share")]
    pub palm_kernel_share: f64,
    pub plants: Vec<GeoPlantSheet>,
    #[serde(default)]
    pub tanks: Vec<TankSheet>,
    pub quality: Option<QualitySheet>,
}

/// Column block of one plant. Column labels are checked against `header_row`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoPlantSheet {
    pub plant: Plant,
    pub sheet: String,
    pub header_row: u32,
    pub data_start_row: u32,
    pub tea_target: f64,
    pub date: Locator,
    pub opening_inventory: Locator,
    pub cpo: Locator,
    pub rff: Locator,
    pub extraction: Locator,
    pub closing_inventory: Locator,
}

/// Tank level columns of one plant (at most four tanks).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TankSheet {
    pub plant: Plant,
    pub sheet: String,
    pub date_column: u32,
    pub data_start_row: u32,
    pub tanks: Vec<TankColumn>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TankColumn {
    pub name: String,
    pub column: u32,
    /// Tonnes.
    pub capacity: f64,
}

/// Shared tank-quality sheet: one dated row, a column group per tank.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualitySheet {
    pub sheet: String,
    pub date_column: u32,
    pub data_start_row: u32,
    pub plants: Vec<QualityPlant>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityPlant {
    pub plant: Plant,
    pub tanks: Vec<QualityColumns>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityColumns {
    pub name: String,
    pub acidity: u32,
    pub moisture: u32,
    pub impurities: u32,
}

impl GeoCpoLayout {
    pub fn validate(&self) -> EtlResult<()> {
        check_unique_plants("geo_cpo", self.plants.iter().map(|p| &p.plant))?;
        check_unique_plants("geo_cpo tanks", self.tanks.iter().map(|t| &t.plant))?;
        if let Some(q) = &self.quality {
            check_unique_plants("geo_cpo quality", q.plants.iter().map(|p| &p.plant))?;
        }
        for t in &self.tanks {
            if t.tanks.len() > 4 {
                return Err(EtlError::config(format!(
                    "geo_cpo layout: {} has {} tanks, at most 4 are stored",
                    t.plant,
                    t.tanks.len()
                )));
            }
        }
        Ok(())
    }

    /// Configured capacity of each stored tank slot of `plant`, in tonnes.
    pub fn tank_capacities(&self, plant: Plant) -> [Option<f64>; 4] {
        let mut out = [None; 4];
        if let Some(sheet) = self.tanks.iter().find(|t| t.plant == plant) {
            for (slot, tank) in out.iter_mut().zip(&sheet.tanks) {
                *slot = Some(tank.capacity);
            }
        }
        out
    }
}

/// Kernel expeller workbook (one plant), dated rows in kilograms.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CpkoLayout {
    pub version: u32,
    pub source_pattern: String,
    pub plant: Plant,
    pub sheet: String,
    pub data_start_row: u32,
    #[serde(default)]
    pub mass_unit: MassUnit,
    /// Values below this are formula errors and read as absent.
    #[serde(default = "default_error_floor")]
    pub error_floor: f64,
    #[serde(default = "default_kernel_target")]
    pub target_extraction: f64,
    pub date: Locator,
    pub opening_inventory: Locator,
    pub kernel_oil: Locator,
    pub kernel_processed: Locator,
}

impl CpkoLayout {
    pub fn validate(&self) -> EtlResult<()> {
        if self.target_extraction <= 0.0 || self.target_extraction > 100.0 {
            return Err(EtlError::config(format!(
                "cpko layout: target_extraction {} is not a percentage",
                self.target_extraction
            )));
        }
        Ok(())
    }
}

/// Planning workbook with the daily budget (ME) per plant.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetLayout {
    pub version: u32,
    pub source_pattern: String,
    pub sheet: String,
    #[serde(default)]
    pub label_column: u32,
    #[serde(default)]
    pub header_row: u32,
    pub first_date_column: u32,
    #[serde(default)]
    pub mass_unit: MassUnit,
    /// Share of CPO used to re-derive the palm-kernel budget when a patch leaves it blank.
    #[serde(default = "default_palm_kernel_share")]
    pub palm_kernel_share: f64,
    pub plants: Vec<BudgetPlantRows>,
    pub kernel: Option<BudgetKernelRows>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetPlantRows {
    pub plant: Plant,
    pub rff: Locator,
    pub cpo: Locator,
    /// Palm-kernel row; its presence gates `palm_kernel_cpo`.
    pub palm_kernel: Locator,
    /// Palm-kernel budget value used for `palmiste_presupuesto`.
    pub palm_kernel_cpo: Locator,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetKernelRows {
    pub plant: Plant,
    pub kernel: Locator,
    pub kernel_oil: Locator,
}

impl BudgetLayout {
    pub fn validate(&self) -> EtlResult<()> {
        check_unique_plants("planeacion", self.plants.iter().map(|p| &p.plant))
    }
}

/// Consolidated monthly history CSV.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoricalLayout {
    pub version: u32,
    pub source_pattern: String,
    pub plant_column: String,
    pub kind_column: String,
    /// Rows whose kind cell contains any of these are skipped.
    #[serde(default)]
    pub skip_markers: Vec<String>,
    #[serde(default = "default_palm_kernel_share")]
    pub palm_kernel_share: f64,
    /// Per-plant threshold above which a mass is taken to be kilograms.
    #[serde(default)]
    pub kilogram_thresholds: Vec<KilogramThreshold>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KilogramThreshold {
    pub plant: Plant,
    pub above: f64,
}

impl HistoricalLayout {
    pub fn validate(&self) -> EtlResult<()> {
        check_unique_plants("historico", self.kilogram_thresholds.iter().map(|k| &k.plant))
    }

    pub fn kilogram_threshold(&self, plant: Plant) -> Option<f64> {
        self.kilogram_thresholds
            .iter()
            .find(|k| k.plant == plant)
            .map(|k| k.above)
    }
}
