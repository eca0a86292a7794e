use std::fmt;

use serde::Deserialize;

/// Position of a semantic row or column inside a sheet, optionally with the marker text the
/// label cell must contain before the position is trusted.
///
/// In TOML either a bare index (`rff_actual = 5`) or a table
/// (`rff_actual = { index = 5, label = "Real" }`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    Index(u32),
    Labeled { index: u32, label: String },
}

impl Locator {
    pub fn index(&self) -> u32 {
        match self {
            Self::Index(idx) | Self::Labeled { index: idx, .. } => *idx,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Index(_) => None,
            Self::Labeled { label, .. } => Some(label.as_str()),
        }
    }
}

/// Mass unit a source family reports in. Canonical output is always tonnes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MassUnit {
    Kilograms,
    #[default]
    Tonnes,
}

impl MassUnit {
    pub fn to_tonnes(self, value: f64) -> f64 {
        match self {
            Self::Kilograms => value / 1000.0,
            Self::Tonnes => value,
        }
    }
}

/// A configured label cell that no longer carries its expected marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDrift {
    pub sheet: String,
    pub row: u32,
    pub column: u32,
    pub expected: String,
    pub found: Option<String>,
}

impl fmt::Display for LayoutDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sheet '{}' R{}C{}: expected label containing '{}', found {}",
            self.sheet,
            self.row,
            self.column,
            self.expected,
            self.found
                .as_deref()
                .map_or_else(|| "an empty cell".to_string(), |s| format!("'{s}'")),
        )
    }
}

/// Case-insensitive containment test used for every label check.
pub fn label_matches(found: &str, expected: &str) -> bool {
    found.to_lowercase().contains(&expected.to_lowercase())
}
