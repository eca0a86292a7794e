//! Historical merge engine and in-place patch pass.
//!
//! A merge never edits history rows: rows the batch supersedes are dropped and the batch is
//! inserted in their place, so re-running an import is a no-op and plants (or products) outside
//! the batch scope are never touched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::model::Observation;

/// Which entity keys a date-range merge may supersede.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EntityScope {
    /// The keys present in the batch.
    #[default]
    BatchKeys,
    /// These keys, in addition to the keys present in the batch.
    Keys(BTreeSet<String>),
}

/// How a batch supersedes history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Drop history rows inside the batch's `[min date, max date]` whose key is in scope.
    DateRange(EntityScope),
    /// Drop only history rows with the exact (date, key) of a batch row.
    ExactKeys,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::DateRange(EntityScope::BatchKeys)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// History rows carried over.
    pub kept: usize,
    /// History rows dropped in favour of the batch.
    pub superseded: usize,
    /// Batch rows written.
    pub inserted: usize,
    /// Batch rows collapsed because a later row had the same (date, key).
    pub batch_duplicates: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Merged<T> {
    /// The new canonical dataset, sorted by (date, key).
    pub records: Vec<T>,
    pub stats: MergeStats,
    /// Date span of the batch; `None` for an empty batch.
    pub range: Option<(NaiveDate, NaiveDate)>,
}

impl<T> Merged<T> {
    /// Whether the merge produced anything worth writing.
    pub fn changed(&self) -> bool {
        self.stats.inserted > 0
    }
}

fn sort_records<T: Observation>(records: &mut [T]) {
    records.sort_by(|a, b| {
        a.date()
            .cmp(&b.date())
            .then_with(|| a.entity_key().cmp(b.entity_key()))
    });
}

/// Collapse rows sharing (date, key); the last one wins.
fn dedup_batch<T: Observation>(batch: Vec<T>) -> (Vec<T>, usize) {
    let total = batch.len();
    let mut by_key: BTreeMap<(NaiveDate, String), T> = BTreeMap::new();
    for rec in batch {
        by_key.insert((rec.date(), rec.entity_key().to_string()), rec);
    }
    let dups = total - by_key.len();
    (by_key.into_values().collect(), dups)
}

/// History rows a batch replaces.
enum Superseded {
    Range {
        from: NaiveDate,
        to: NaiveDate,
        keys: BTreeSet<String>,
    },
    Exact(BTreeSet<(NaiveDate, String)>),
}

impl Superseded {
    fn covers<T: Observation>(&self, rec: &T) -> bool {
        match self {
            Self::Range { from, to, keys } => {
                (*from..=*to).contains(&rec.date()) && keys.contains(rec.entity_key())
            }
            Self::Exact(keys) => keys.contains(&(rec.date(), rec.entity_key().to_string())),
        }
    }
}

/// Merge `batch` into `history` and return the new canonical dataset.
///
/// An empty batch leaves history untouched. With no history the batch, sorted, is the result.
pub fn merge_history<T: Observation>(
    history: Vec<T>,
    batch: Vec<T>,
    strategy: &MergeStrategy,
) -> Merged<T> {
    if batch.is_empty() {
        let kept = history.len();
        return Merged {
            records: history,
            stats: MergeStats {
                kept,
                ..MergeStats::default()
            },
            range: None,
        };
    }

    let (batch, batch_duplicates) = dedup_batch(batch);
    let range = batch
        .iter()
        .map(Observation::date)
        .fold(None, |acc: Option<(NaiveDate, NaiveDate)>, d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        });

    let superseded = match strategy {
        MergeStrategy::DateRange(scope) => {
            let mut keys: BTreeSet<String> =
                batch.iter().map(|r| r.entity_key().to_string()).collect();
            if let EntityScope::Keys(extra) = scope {
                keys.extend(extra.iter().cloned());
            }
            let (from, to) = range.unwrap_or_default();
            Superseded::Range { from, to, keys }
        }
        MergeStrategy::ExactKeys => Superseded::Exact(
            batch
                .iter()
                .map(|r| (r.date(), r.entity_key().to_string()))
                .collect(),
        ),
    };

    let before = history.len();
    let mut records: Vec<T> = history
        .into_iter()
        .filter(|r| !superseded.covers(r))
        .collect();
    let kept = records.len();
    let inserted = batch.len();
    records.extend(batch);
    sort_records(&mut records);

    let stats = MergeStats {
        kept,
        superseded: before - kept,
        inserted,
        batch_duplicates,
    };
    debug!(?stats, ?range, "merged batch into history");
    Merged {
        records,
        stats,
        range,
    }
}

/// A partial update for one existing row, matched by (date, key).
pub trait Patch<T> {
    fn date(&self) -> NaiveDate;
    fn entity_key(&self) -> &str;
    fn apply_to(&self, target: &mut T);
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome<T> {
    pub records: Vec<T>,
    /// Rows replaced by a patched copy.
    pub patched: usize,
    /// Patches whose (date, key) has no row.
    pub unmatched: usize,
}

/// Apply patches to matching rows. Rows are replaced wholesale by a patched copy; patches never
/// create rows. When two patches share a key the last one wins.
pub fn apply_patches<T, P>(history: Vec<T>, patches: &[P]) -> PatchOutcome<T>
where
    T: Observation,
    P: Patch<T>,
{
    let mut by_key: BTreeMap<(NaiveDate, String), &P> = BTreeMap::new();
    for patch in patches {
        by_key.insert((patch.date(), patch.entity_key().to_string()), patch);
    }

    let mut used: BTreeSet<(NaiveDate, String)> = BTreeSet::new();
    let mut patched = 0;
    let records = history
        .into_iter()
        .map(|rec| {
            let key = (rec.date(), rec.entity_key().to_string());
            match by_key.get(&key) {
                Some(patch) => {
                    let mut updated = rec;
                    patch.apply_to(&mut updated);
                    used.insert(key);
                    patched += 1;
                    updated
                }
                None => rec,
            }
        })
        .collect();

    PatchOutcome {
        records,
        patched,
        unmatched: by_key.len() - used.len(),
    }
}
