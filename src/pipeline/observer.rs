use std::error::Error as StdError;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::SourceFamily;
use crate::error::EtlError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (import failed).
    Error,
    /// Critical error: unreadable source, I/O failure or a history file that no longer parses.
    Critical,
}

/// Context about an import attempt.
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub family: SourceFamily,
    /// Source file(s) handed to the import.
    pub sources: Vec<PathBuf>,
}

impl ImportContext {
    fn sources_display(&self) -> String {
        self.sources
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// What a successful import did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Rows (or patches) produced by the extractor.
    pub extracted: usize,
    /// Rows written into a canonical dataset.
    pub inserted: usize,
    /// History rows replaced by the batch.
    pub superseded: usize,
    /// Existing rows updated in place.
    pub patched: usize,
    /// Blocks skipped because of layout drift.
    pub drift: usize,
    pub missing_sheets: usize,
}

/// Observer interface for import outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait ImportObserver: Send + Sync {
    /// Called when an import succeeds.
    fn on_success(&self, _ctx: &ImportContext, _stats: ImportStats) {}

    /// Called when an import fails.
    fn on_failure(&self, _ctx: &ImportContext, _severity: ImportSeverity, _error: &EtlError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &EtlError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ImportObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn ImportObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ImportObserver for CompositeObserver {
    fn on_success(&self, ctx: &ImportContext, stats: ImportStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &ImportContext, severity: ImportSeverity, error: &EtlError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &EtlError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Reports import outcomes as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ImportObserver for TracingObserver {
    fn on_success(&self, ctx: &ImportContext, stats: ImportStats) {
        info!(
            family = %ctx.family,
            sources = %ctx.sources_display(),
            extracted = stats.extracted,
            inserted = stats.inserted,
            superseded = stats.superseded,
            patched = stats.patched,
            drift = stats.drift,
            "import finished"
        );
    }

    fn on_failure(&self, ctx: &ImportContext, severity: ImportSeverity, error: &EtlError) {
        warn!(
            family = %ctx.family,
            sources = %ctx.sources_display(),
            ?severity,
            error = %error,
            "import failed"
        );
    }

    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &EtlError) {
        error!(
            family = %ctx.family,
            sources = %ctx.sources_display(),
            ?severity,
            error = %error,
            "ALERT: import failed"
        );
    }
}

/// Appends import events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Writes are best-effort; failures to open or write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", Local::now().format("%Y-%m-%dT%H:%M:%S"));
        }
    }
}

impl ImportObserver for FileObserver {
    fn on_success(&self, ctx: &ImportContext, stats: ImportStats) {
        self.append_line(&format!(
            "ok family={} sources={} extracted={} inserted={} superseded={} patched={} drift={}",
            ctx.family,
            ctx.sources_display(),
            stats.extracted,
            stats.inserted,
            stats.superseded,
            stats.patched,
            stats.drift
        ));
    }

    fn on_failure(&self, ctx: &ImportContext, severity: ImportSeverity, error: &EtlError) {
        self.append_line(&format!(
            "fail severity={severity:?} family={} sources={} err={error}",
            ctx.family,
            ctx.sources_display()
        ));
    }

    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &EtlError) {
        self.append_line(&format!(
            "ALERT severity={severity:?} family={} sources={} err={error}",
            ctx.family,
            ctx.sources_display()
        ));
    }
}

/// Severity of a failed import.
pub fn severity_for_error(e: &EtlError) -> ImportSeverity {
    match e {
        EtlError::Io(_)
        | EtlError::SourceNotFound { .. }
        | EtlError::NoSourceMatch { .. }
        | EtlError::CorruptHistory { .. } => ImportSeverity::Critical,
        EtlError::Parquet(err) => {
            // Parquet errors often wrap I/O, but not in a structured way.
            if error_chain_contains_io(err) {
                ImportSeverity::Critical
            } else {
                ImportSeverity::Error
            }
        }
        EtlError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => ImportSeverity::Critical,
            _ => ImportSeverity::Error,
        },
        EtlError::Excel(_)
        | EtlError::Json(_)
        | EtlError::Config { .. }
        | EtlError::SchemaMismatch { .. }
        | EtlError::ParseError { .. }
        | EtlError::NothingToPatch { .. } => ImportSeverity::Error,
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}
