//! Runtime configuration (`palm-etl.toml`).
//!
//! Every key is optional:
//!
//! ```toml
//! data_dir = "data"
//! layouts_dir = "layouts"
//!
//! [outputs]
//! upstream = "upstream.parquet"
//!
//! [merge]
//! on_corrupt_history = "halt"   # or "discard"
//!
//! [validation]
//! tea_min = 15.0
//! tea_max = 35.0
//!
//! [log]
//! file = "imports.log"
//! alert_at_or_above = "critical"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{EtlError, EtlResult};
use crate::layout::SourceLayouts;
use crate::model::DatasetKind;
use crate::pipeline::ImportSeverity;
use crate::processing::ValidationRules;
use crate::store::StorageFormat;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_SETTINGS_FILE: &str = "palm-etl.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where sources are discovered and outputs are written.
    pub data_dir: PathBuf,
    /// Directory of layout overrides; built-ins are used for files it lacks.
    pub layouts_dir: Option<PathBuf>,
    pub outputs: Outputs,
    pub merge: MergeSettings,
    pub validation: ValidationSettings,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            layouts_dir: None,
            outputs: Outputs::default(),
            merge: MergeSettings::default(),
            validation: ValidationSettings::default(),
            log: LogSettings::default(),
        }
    }
}

/// Output file names, relative to `data_dir` unless absolute. The extension picks the format.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Outputs {
    pub upstream: PathBuf,
    pub downstream: PathBuf,
    pub kernel_balance: PathBuf,
    /// Monthly history rows, kept apart from the daily upstream series.
    pub historical: PathBuf,
}

impl Default for Outputs {
    fn default() -> Self {
        Self {
            upstream: PathBuf::from(DatasetKind::Upstream.default_file_name()),
            downstream: PathBuf::from(DatasetKind::Downstream.default_file_name()),
            kernel_balance: PathBuf::from(DatasetKind::KernelBalance.default_file_name()),
            historical: PathBuf::from("upstream_historico.csv"),
        }
    }
}

/// What to do when the existing dataset cannot be read back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptHistoryPolicy {
    /// Stop the import; the file is left as it is.
    #[default]
    Halt,
    /// Log a warning and let the batch become the dataset.
    Discard,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeSettings {
    pub on_corrupt_history: CorruptHistoryPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationSettings {
    pub tea_min: f64,
    pub tea_max: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            tea_min: 15.0,
            tea_max: 35.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// Append-only import log.
    pub file: Option<PathBuf>,
    pub alert_at_or_above: ImportSeverity,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            file: None,
            alert_at_or_above: ImportSeverity::Critical,
        }
    }
}

impl Settings {
    /// Parse and validate a settings document.
    pub fn parse(text: &str) -> EtlResult<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            EtlError::config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// `explicit` when given (it must exist), else [`DEFAULT_SETTINGS_FILE`] when present, else
    /// defaults.
    pub fn discover(explicit: Option<&Path>) -> EtlResult<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_SETTINGS_FILE).is_file() => Self::load(DEFAULT_SETTINGS_FILE),
            None => {
                debug!("no settings file; using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> EtlResult<()> {
        if self.validation.tea_min >= self.validation.tea_max {
            return Err(EtlError::config(format!(
                "validation.tea_min ({}) must be below validation.tea_max ({})",
                self.validation.tea_min, self.validation.tea_max
            )));
        }
        for path in [
            &self.outputs.upstream,
            &self.outputs.downstream,
            &self.outputs.kernel_balance,
            &self.outputs.historical,
        ] {
            StorageFormat::from_path(path)?;
        }
        Ok(())
    }

    /// Canonical file of a dataset kind.
    pub fn output_path(&self, kind: DatasetKind) -> PathBuf {
        let file = match kind {
            DatasetKind::Upstream => &self.outputs.upstream,
            DatasetKind::Downstream | DatasetKind::DownstreamLegacy => &self.outputs.downstream,
            DatasetKind::KernelBalance => &self.outputs.kernel_balance,
        };
        self.data_dir.join(file)
    }

    pub fn historical_output(&self) -> PathBuf {
        self.data_dir.join(&self.outputs.historical)
    }

    /// Layouts with the configured overrides applied.
    pub fn layouts(&self) -> EtlResult<SourceLayouts> {
        SourceLayouts::load(self.layouts_dir.as_deref())
    }

    pub fn validation_rules(&self, layouts: &SourceLayouts) -> ValidationRules {
        ValidationRules {
            tea_min: self.validation.tea_min,
            tea_max: self.validation.tea_max,
            ..ValidationRules::default()
        }
        .with_tank_capacities(&layouts.geo_cpo)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{CorruptHistoryPolicy, Settings};
    use crate::model::DatasetKind;
    use crate::pipeline::ImportSeverity;

    #[test]
    fn empty_document_is_all_defaults() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn shipped_settings_file_spells_out_the_defaults() {
        let shipped = Settings::parse(include_str!("../palm-etl.toml")).unwrap();
        assert_eq!(shipped, Settings::default());
    }

    #[test]
    fn keys_override_defaults() {
        let settings = Settings::parse(
            r#"
            data_dir = "/srv/palm"

            [outputs]
            upstream = "upstream.parquet"

            [merge]
            on_corrupt_history = "discard"

            [log]
            alert_at_or_above = "error"
            "#,
        )
        .unwrap();
        assert_eq!(
            settings.output_path(DatasetKind::Upstream),
            PathBuf::from("/srv/palm/upstream.parquet")
        );
        assert_eq!(
            settings.output_path(DatasetKind::Downstream),
            PathBuf::from("/srv/palm/downstream.csv")
        );
        assert_eq!(settings.merge.on_corrupt_history, CorruptHistoryPolicy::Discard);
        assert_eq!(settings.log.alert_at_or_above, ImportSeverity::Error);
        assert_eq!(settings.validation.tea_max, 35.0);
    }

    #[test]
    fn invalid_documents_are_config_errors() {
        for text in [
            "[validation]\ntea_min = 40.0",
            "[outputs]\nupstream = \"upstream.xlsx\"",
            "unknown_key = 1",
            "[merge]\non_corrupt_history = \"ignore\"",
        ] {
            let err = Settings::parse(text).unwrap_err();
            assert!(err.to_string().starts_with("config error"), "{text}: {err}");
        }
    }
}
