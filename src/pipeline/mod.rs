//! Import orchestration: source → extractor → merge or patch → store.
//!
//! Every import is one read-modify-write cycle per canonical file. Histories are loaded and
//! checked before anything is written, so an import that touches two files (the tracking
//! workbook feeds upstream and downstream) either fails before writing or writes both.

pub mod discover;
pub mod observer;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{EtlError, EtlResult};
use crate::extract::{
    Extraction, Workbook, daily_balance, extract_balance_reports, extract_budget, extract_cpko,
    extract_geo_cpo, extract_historical, extract_seguimiento,
};
use crate::layout::{LayoutDocument, LayoutDrift, SourceLayouts};
use crate::merge::{MergeStrategy, Patch, apply_patches, merge_history};
use crate::model::{
    DatasetKind, DownstreamRecord, KernelBalanceRecord, Observation, UpstreamRecord,
};
use crate::settings::{CorruptHistoryPolicy, Settings};
use crate::store::{DownstreamData, History, load_downstream, load_history, write_records};

pub use discover::latest_matching;
pub use observer::{
    CompositeObserver, FileObserver, ImportContext, ImportObserver, ImportSeverity, ImportStats,
    TracingObserver, severity_for_error,
};

/// The source families the pipeline imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFamily {
    /// Daily tracking workbook (upstream and downstream).
    Seguimiento,
    /// Per-plant CPO database with tank levels and quality.
    GeoCpo,
    /// Codazzi kernel expeller workbook; patches kernel fields.
    Cpko,
    /// Planning workbook; patches budget fields.
    Budget,
    /// Consolidated monthly history CSV.
    Historical,
    /// Kernel mass-balance JSON reports.
    Balance,
}

impl SourceFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seguimiento => "seguimiento",
            Self::GeoCpo => "geo-cpo",
            Self::Cpko => "cpko",
            Self::Budget => "budget",
            Self::Historical => "historical",
            Self::Balance => "balance",
        }
    }

    /// Discovery glob for the family; mass-balance reports are always named explicitly.
    pub fn source_pattern(self, layouts: &SourceLayouts) -> Option<&str> {
        match self {
            Self::Seguimiento => Some(layouts.seguimiento.source_pattern()),
            Self::GeoCpo => Some(layouts.geo_cpo.source_pattern()),
            Self::Cpko => Some(layouts.cpko.source_pattern()),
            Self::Budget => Some(layouts.budget.source_pattern()),
            Self::Historical => Some(layouts.historical.source_pattern()),
            Self::Balance => None,
        }
    }
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effect of one import on one canonical file.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetUpdate {
    pub kind: DatasetKind,
    pub path: PathBuf,
    /// Rows in the dataset after the import.
    pub rows: usize,
    pub inserted: usize,
    pub superseded: usize,
    pub patched: usize,
    /// Patches whose (date, key) had no row.
    pub unmatched: usize,
    /// Whether the file was rewritten.
    pub written: bool,
}

/// Outcome of one import run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub family: SourceFamily,
    pub sources: Vec<PathBuf>,
    /// Rows or patches produced by the extractor.
    pub extracted: usize,
    pub updates: Vec<DatasetUpdate>,
    pub drift: Vec<LayoutDrift>,
    pub missing_sheets: Vec<String>,
}

impl ImportReport {
    fn new(family: SourceFamily, sources: Vec<PathBuf>) -> Self {
        Self {
            family,
            sources,
            extracted: 0,
            updates: Vec::new(),
            drift: Vec::new(),
            missing_sheets: Vec::new(),
        }
    }

    fn absorb<T>(&mut self, extraction: &Extraction<T>) {
        self.extracted += extraction.records.len();
        self.drift.extend(extraction.drift.iter().cloned());
        self.missing_sheets
            .extend(extraction.missing_sheets.iter().cloned());
    }

    pub fn stats(&self) -> ImportStats {
        ImportStats {
            extracted: self.extracted,
            inserted: self.updates.iter().map(|u| u.inserted).sum(),
            superseded: self.updates.iter().map(|u| u.superseded).sum(),
            patched: self.updates.iter().map(|u| u.patched).sum(),
            drift: self.drift.len(),
            missing_sheets: self.missing_sheets.len(),
        }
    }

    pub fn context(&self) -> ImportContext {
        ImportContext {
            family: self.family,
            sources: self.sources.clone(),
        }
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} import", self.family)?;
        for source in &self.sources {
            writeln!(f, "  source: {}", source.display())?;
        }
        writeln!(f, "  extracted: {}", self.extracted)?;
        for sheet in &self.missing_sheets {
            writeln!(f, "  missing sheet: {sheet}")?;
        }
        for drift in &self.drift {
            writeln!(f, "  layout drift: {drift}")?;
        }
        for u in &self.updates {
            let action = if u.written { "written" } else { "unchanged" };
            writeln!(
                f,
                "  {} ({}): {action}, {} rows, +{} inserted, {} replaced, {} patched, {} unmatched",
                u.kind,
                u.path.display(),
                u.rows,
                u.inserted,
                u.superseded,
                u.patched,
                u.unmatched
            )?;
        }
        Ok(())
    }
}

/// Runs imports against the canonical files named by [`Settings`].
pub struct Pipeline {
    settings: Settings,
    layouts: SourceLayouts,
    observer: Option<Arc<dyn ImportObserver>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("settings", &self.settings)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl Pipeline {
    pub fn new(settings: Settings, layouts: SourceLayouts) -> Self {
        Self {
            settings,
            layouts,
            observer: None,
        }
    }

    /// Resolve layouts from the settings' overrides directory.
    pub fn from_settings(settings: Settings) -> EtlResult<Self> {
        let layouts = settings.layouts()?;
        Ok(Self::new(settings, layouts))
    }

    pub fn with_observer(mut self, observer: Arc<dyn ImportObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn layouts(&self) -> &SourceLayouts {
        &self.layouts
    }

    /// `explicit` if given (it must exist), else the newest matching file in `data_dir`.
    pub fn resolve_source(&self, family: SourceFamily, explicit: Option<&Path>) -> EtlResult<PathBuf> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(EtlError::SourceNotFound {
                    path: path.to_path_buf(),
                });
            }
            return Ok(path.to_path_buf());
        }
        let pattern = family.source_pattern(&self.layouts).ok_or_else(|| {
            EtlError::config(format!("{family} sources must be named explicitly"))
        })?;
        latest_matching(&self.settings.data_dir, pattern)
    }

    /// Import one source file of a workbook or CSV family.
    pub fn import(&self, family: SourceFamily, source: Option<&Path>) -> EtlResult<ImportReport> {
        let named: Vec<PathBuf> = source.map(Path::to_path_buf).into_iter().collect();
        self.observed(family, &named, || {
            let path = self.resolve_source(family, source)?;
            info!(%family, source = %path.display(), "importing");
            match family {
                SourceFamily::Seguimiento => self.import_seguimiento(&path),
                SourceFamily::GeoCpo => self.import_geo_cpo(&path),
                SourceFamily::Cpko => self.import_cpko(&path),
                SourceFamily::Budget => self.import_budget(&path),
                SourceFamily::Historical => self.import_historical(&path),
                SourceFamily::Balance => self.import_balance_files(std::slice::from_ref(&path)),
            }
        })
    }

    /// Import kernel mass-balance report files.
    pub fn import_balance(&self, paths: &[PathBuf]) -> EtlResult<ImportReport> {
        self.observed(SourceFamily::Balance, paths, || self.import_balance_files(paths))
    }

    fn observed<F>(&self, family: SourceFamily, named: &[PathBuf], run: F) -> EtlResult<ImportReport>
    where
        F: FnOnce() -> EtlResult<ImportReport>,
    {
        let result = run();
        if let Some(obs) = self.observer.as_ref() {
            match &result {
                Ok(report) => obs.on_success(&report.context(), report.stats()),
                Err(e) => {
                    let ctx = ImportContext {
                        family,
                        sources: named.to_vec(),
                    };
                    let sev = severity_for_error(e);
                    obs.on_failure(&ctx, sev, e);
                    if sev >= self.settings.log.alert_at_or_above {
                        obs.on_alert(&ctx, sev, e);
                    }
                }
            }
        }
        result
    }

    fn import_seguimiento(&self, path: &Path) -> EtlResult<ImportReport> {
        let book = Workbook::open(path)?;
        let out = extract_seguimiento(&book, &self.layouts.seguimiento);
        let mut report = ImportReport::new(SourceFamily::Seguimiento, vec![path.to_path_buf()]);
        report.absorb(&out.upstream);
        report.absorb(&out.downstream);

        let up_path = self.settings.output_path(DatasetKind::Upstream);
        let down_path = self.settings.output_path(DatasetKind::Downstream);
        let up_history = self.history::<UpstreamRecord>(&up_path)?;
        let down_history = self.history::<DownstreamRecord>(&down_path)?;

        let strategy = MergeStrategy::default();
        report.updates.push(commit(
            DatasetKind::Upstream,
            &up_path,
            up_history,
            out.upstream.records,
            &strategy,
        )?);
        report.updates.push(commit(
            DatasetKind::Downstream,
            &down_path,
            down_history,
            out.downstream.records,
            &strategy,
        )?);
        Ok(report)
    }

    fn import_geo_cpo(&self, path: &Path) -> EtlResult<ImportReport> {
        let book = Workbook::open(path)?;
        let out = extract_geo_cpo(&book, &self.layouts.geo_cpo);
        let mut report = ImportReport::new(SourceFamily::GeoCpo, vec![path.to_path_buf()]);
        report.absorb(&out);

        let up_path = self.settings.output_path(DatasetKind::Upstream);
        let history = self.history::<UpstreamRecord>(&up_path)?;
        report.updates.push(commit(
            DatasetKind::Upstream,
            &up_path,
            history,
            out.records,
            &MergeStrategy::default(),
        )?);
        Ok(report)
    }

    fn import_cpko(&self, path: &Path) -> EtlResult<ImportReport> {
        let book = Workbook::open(path)?;
        let out = extract_cpko(&book, &self.layouts.cpko);
        let mut report = ImportReport::new(SourceFamily::Cpko, vec![path.to_path_buf()]);
        report.absorb(&out);
        report.updates.push(self.patch_upstream(&out.records)?);
        Ok(report)
    }

    fn import_budget(&self, path: &Path) -> EtlResult<ImportReport> {
        let book = Workbook::open(path)?;
        let out = extract_budget(&book, &self.layouts.budget);
        let mut report = ImportReport::new(SourceFamily::Budget, vec![path.to_path_buf()]);
        report.absorb(&out);
        report.updates.push(self.patch_upstream(&out.records)?);
        Ok(report)
    }

    fn import_historical(&self, path: &Path) -> EtlResult<ImportReport> {
        let out = extract_historical(path, &self.layouts.historical)?;
        let mut report = ImportReport::new(SourceFamily::Historical, vec![path.to_path_buf()]);
        report.absorb(&out);

        let hist_path = self.settings.historical_output();
        let history = self.history::<UpstreamRecord>(&hist_path)?;
        report.updates.push(commit(
            DatasetKind::Upstream,
            &hist_path,
            history,
            out.records,
            &MergeStrategy::default(),
        )?);
        Ok(report)
    }

    fn import_balance_files(&self, paths: &[PathBuf]) -> EtlResult<ImportReport> {
        let out = extract_balance_reports(paths)?;
        let mut report = ImportReport::new(SourceFamily::Balance, paths.to_vec());
        report.absorb(&out);

        let path = self.settings.output_path(DatasetKind::KernelBalance);
        let history = self.history(&path)?;
        report.updates.push(commit(
            DatasetKind::KernelBalance,
            &path,
            history,
            out.records,
            &MergeStrategy::ExactKeys,
        )?);
        Ok(report)
    }

    /// Existing rows of `path` under the configured corrupt-history policy.
    fn history<T: Observation>(&self, path: &Path) -> EtlResult<Vec<T>> {
        match load_history(path) {
            History::Absent => Ok(Vec::new()),
            History::Loaded(records) => Ok(records),
            History::Corrupt { message } => match self.settings.merge.on_corrupt_history {
                CorruptHistoryPolicy::Halt => Err(EtlError::CorruptHistory {
                    path: path.to_path_buf(),
                    message,
                }),
                CorruptHistoryPolicy::Discard => {
                    warn!(
                        path = %path.display(),
                        %message,
                        "discarding unreadable dataset; the batch replaces it"
                    );
                    Ok(Vec::new())
                }
            },
        }
    }

    /// Patch existing upstream rows. Patches never create rows, so a missing or unreadable
    /// dataset is an error whatever the corrupt-history policy.
    fn patch_upstream<P: Patch<UpstreamRecord>>(&self, patches: &[P]) -> EtlResult<DatasetUpdate> {
        let path = self.settings.output_path(DatasetKind::Upstream);
        let history = match load_history::<UpstreamRecord>(&path) {
            History::Absent => return Err(EtlError::NothingToPatch { path }),
            History::Corrupt { message } => return Err(EtlError::CorruptHistory { path, message }),
            History::Loaded(records) => records,
        };

        let outcome = apply_patches(history, patches);
        if outcome.unmatched > 0 {
            warn!(
                unmatched = outcome.unmatched,
                "patches without a matching upstream row were ignored"
            );
        }
        let written = outcome.patched > 0;
        if written {
            write_records(&path, &outcome.records)?;
        }
        Ok(DatasetUpdate {
            kind: DatasetKind::Upstream,
            rows: outcome.records.len(),
            inserted: 0,
            superseded: 0,
            patched: outcome.patched,
            unmatched: outcome.unmatched,
            written,
            path,
        })
    }

    /// Stored upstream rows; empty when the file does not exist yet.
    pub fn read_upstream(&self) -> EtlResult<Vec<UpstreamRecord>> {
        let path = self.settings.output_path(DatasetKind::Upstream);
        match load_history(&path) {
            History::Absent => Ok(Vec::new()),
            History::Loaded(records) => Ok(records),
            History::Corrupt { message } => Err(EtlError::CorruptHistory { path, message }),
        }
    }

    /// Stored downstream rows in whichever layout the file uses.
    pub fn read_downstream(&self) -> EtlResult<Option<DownstreamData>> {
        load_downstream(self.settings.output_path(DatasetKind::Downstream))
    }

    /// Mass-balance rows of `date`, or of the latest stored day.
    pub fn kernel_balance_day(&self, date: Option<NaiveDate>) -> EtlResult<Vec<KernelBalanceRecord>> {
        let path = self.settings.output_path(DatasetKind::KernelBalance);
        let records = match load_history::<KernelBalanceRecord>(&path) {
            History::Absent => Vec::new(),
            History::Loaded(records) => records,
            History::Corrupt { message } => return Err(EtlError::CorruptHistory { path, message }),
        };
        Ok(daily_balance(&records, date))
    }
}

/// Merge `batch` into `history` and rewrite `path` when anything was inserted.
fn commit<T: Observation>(
    kind: DatasetKind,
    path: &Path,
    history: Vec<T>,
    batch: Vec<T>,
    strategy: &MergeStrategy,
) -> EtlResult<DatasetUpdate> {
    let merged = merge_history(history, batch, strategy);
    let written = merged.changed();
    if written {
        write_records(path, &merged.records)?;
        info!(%kind, path = %path.display(), rows = merged.records.len(), "dataset updated");
    } else {
        info!(%kind, path = %path.display(), "empty batch; dataset left unchanged");
    }
    Ok(DatasetUpdate {
        kind,
        path: path.to_path_buf(),
        rows: merged.records.len(),
        inserted: merged.stats.inserted,
        superseded: merged.stats.superseded,
        patched: 0,
        unmatched: 0,
        written,
    })
}
