//! Cell-locator configuration.
//!
//! Each source family is described by a versioned TOML document naming every row/column it reads.
//! The built-in documents under `layouts/` are compiled in; a layouts directory may override any
//! of them by file name (`seguimiento.toml`, `geo_cpo.toml`, `cpko.toml`, `planeacion.toml`,
//! `historico.toml`).

pub mod cells;
pub mod families;

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{EtlError, EtlResult};

pub use cells::{LayoutDrift, Locator, MassUnit, label_matches};
pub use families::{
    BudgetLayout, CpkoLayout, GeoCpoLayout, HistoricalLayout, SeguimientoLayout,
};

/// Highest layout document version this build understands.
pub const LAYOUT_VERSION: u32 = 1;

/// Common surface of the layout documents.
pub trait LayoutDocument: DeserializeOwned {
    /// File name in a layouts directory.
    const FILE_NAME: &'static str;
    /// Compiled-in default document.
    const BUILTIN: &'static str;

    fn version(&self) -> u32;

    /// Glob matched against file names when no source path is given.
    fn source_pattern(&self) -> &str;

    /// Structural checks beyond what deserialization enforces.
    fn validate(&self) -> EtlResult<()>;
}

macro_rules! layout_document {
    ($ty:ty, $file:literal) => {
        impl LayoutDocument for $ty {
            const FILE_NAME: &'static str = $file;
            const BUILTIN: &'static str = include_str!(concat!("../../layouts/", $file));

            fn version(&self) -> u32 {
                self.version
            }

            fn source_pattern(&self) -> &str {
                &self.source_pattern
            }

            fn validate(&self) -> EtlResult<()> {
                <$ty>::validate(self)
            }
        }
    };
}

layout_document!(SeguimientoLayout, "seguimiento.toml");
layout_document!(GeoCpoLayout, "geo_cpo.toml");
layout_document!(CpkoLayout, "cpko.toml");
layout_document!(BudgetLayout, "planeacion.toml");
layout_document!(HistoricalLayout, "historico.toml");

/// Parse and validate one layout document.
pub fn parse_layout<L: LayoutDocument>(text: &str) -> EtlResult<L> {
    let layout: L = toml::from_str(text)
        .map_err(|e| EtlError::config(format!("{}: {e}", L::FILE_NAME)))?;
    if layout.version() == 0 || layout.version() > LAYOUT_VERSION {
        return Err(EtlError::config(format!(
            "{}: unsupported layout version {} (this build reads up to {LAYOUT_VERSION})",
            L::FILE_NAME,
            layout.version()
        )));
    }
    layout.validate()?;
    Ok(layout)
}

/// Load `L` from `dir` when the directory holds an override, else the built-in document.
pub fn load_layout<L: LayoutDocument>(dir: Option<&Path>) -> EtlResult<L> {
    if let Some(dir) = dir {
        let path = dir.join(L::FILE_NAME);
        if path.is_file() {
            info!(layout = %path.display(), "loading layout override");
            let text = fs::read_to_string(&path)?;
            return parse_layout(&text);
        }
    }
    debug!(layout = L::FILE_NAME, "using built-in layout");
    parse_layout(L::BUILTIN)
}

/// Every source-family layout, resolved once per run.
#[derive(Debug, Clone)]
pub struct SourceLayouts {
    pub seguimiento: SeguimientoLayout,
    pub geo_cpo: GeoCpoLayout,
    pub cpko: CpkoLayout,
    pub budget: BudgetLayout,
    pub historical: HistoricalLayout,
}

impl SourceLayouts {
    /// The compiled-in layouts.
    pub fn builtin() -> EtlResult<Self> {
        Self::load(None)
    }

    /// Built-ins, each replaced by `dir/<file>` when present.
    pub fn load(dir: Option<&Path>) -> EtlResult<Self> {
        Ok(Self {
            seguimiento: load_layout(dir)?,
            geo_cpo: load_layout(dir)?,
            cpko: load_layout(dir)?,
            budget: load_layout(dir)?,
            historical: load_layout(dir)?,
        })
    }
}
