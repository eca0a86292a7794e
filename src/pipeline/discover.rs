//! Source auto-selection: the newest file in the data directory matching a family's pattern.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::error::{EtlError, EtlResult};

/// Most recently modified file in `dir` whose name matches `pattern`.
///
/// Office lock files (`~$name.xlsx`) are never selected.
pub fn latest_matching(dir: impl AsRef<Path>, pattern: &str) -> EtlResult<PathBuf> {
    let dir = dir.as_ref();
    let full = dir.join(pattern);
    let full = full.to_string_lossy();
    let entries = glob::glob(&full)
        .map_err(|e| EtlError::config(format!("invalid source pattern '{pattern}': {e}")))?;

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "unreadable path while scanning for sources");
                continue;
            }
        };
        let is_lock_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("~$"));
        if is_lock_file || !path.is_file() {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        if best.as_ref().is_none_or(|(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }

    match best {
        Some((_, path)) => {
            info!(source = %path.display(), pattern, "auto-selected source");
            Ok(path)
        }
        None => Err(EtlError::NoSourceMatch {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    use super::latest_matching;

    #[test]
    fn newest_match_wins_and_lock_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("SEGUIMIENTO_01.xlsx");
        let newer = dir.path().join("SEGUIMIENTO_02.xlsx");
        let lock = dir.path().join("~$SEGUIMIENTO_03.xlsx");
        let now = SystemTime::now();
        for (path, age) in [(&older, 60), (&newer, 30), (&lock, 0)] {
            let f = File::create(path).unwrap();
            f.set_modified(now - Duration::from_secs(age)).unwrap();
        }
        fs::write(dir.path().join("other.xlsx"), b"").unwrap();

        assert_eq!(latest_matching(dir.path(), "*SEGUIMIENTO*.xlsx").unwrap(), newer);
    }

    #[test]
    fn no_match_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = latest_matching(dir.path(), "*GEO_CPO*.xlsx").unwrap_err();
        assert!(err.to_string().contains("no file matching '*GEO_CPO*.xlsx'"));
    }
}
