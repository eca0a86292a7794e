//! Consistency checks over canonical datasets.
//!
//! Nothing here rejects rows: issues are collected so an operator can review them, and the
//! caller decides what an error-level issue means (the CLI exits non-zero).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;

use crate::layout::GeoCpoLayout;
use crate::model::{DownstreamRecord, Observation, Plant, UpstreamRecord, ratio_pct};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// CPO above the RFF it was extracted from.
    CpoExceedsRff,
    TeaOutOfBand,
    /// Stored TEA disagrees with CPO / RFF.
    TeaInconsistent,
    DuplicateKey,
    TankOverCapacity,
    /// Stored compliance disagrees with actual / budget.
    ComplianceInconsistent,
    NegativeQuantity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub kind: IssueKind,
    pub date: NaiveDate,
    pub key: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            IssueLevel::Warning => "warning",
            IssueLevel::Error => "error",
        };
        write!(f, "[{level}] {} {}: {}", self.date, self.key, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.level == IssueLevel::Error)
    }

    pub fn count(&self, level: IssueLevel) -> usize {
        self.issues.iter().filter(|i| i.level == level).count()
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    fn push(
        &mut self,
        level: IssueLevel,
        kind: IssueKind,
        date: NaiveDate,
        key: &str,
        message: String,
    ) {
        self.issues.push(ValidationIssue {
            level,
            kind,
            date,
            key: key.to_string(),
            message,
        });
    }
}

/// Thresholds for the checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRules {
    /// TEA band, in percent; values outside are warnings.
    pub tea_min: f64,
    pub tea_max: f64,
    /// Allowed gap between a stored ratio and the recomputed one.
    pub ratio_tolerance: f64,
    /// Tank capacities in tonnes, per plant, in tank-slot order.
    pub tank_capacities: BTreeMap<Plant, Vec<f64>>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            tea_min: 15.0,
            tea_max: 35.0,
            ratio_tolerance: 0.01,
            tank_capacities: BTreeMap::new(),
        }
    }
}

impl ValidationRules {
    /// Take tank capacities from the tank sheets of a GEO layout.
    pub fn with_tank_capacities(mut self, layout: &GeoCpoLayout) -> Self {
        for sheet in &layout.tanks {
            self.tank_capacities
                .insert(sheet.plant, sheet.tanks.iter().map(|t| t.capacity).collect());
        }
        self
    }
}

fn duplicate_keys<T: Observation>(records: &[T], report: &mut ValidationReport) {
    let mut seen: BTreeSet<(NaiveDate, &str)> = BTreeSet::new();
    for rec in records {
        if !seen.insert((rec.date(), rec.entity_key())) {
            report.push(
                IssueLevel::Error,
                IssueKind::DuplicateKey,
                rec.date(),
                rec.entity_key(),
                "more than one row for this date".to_string(),
            );
        }
    }
}

fn negatives<'a>(
    fields: impl IntoIterator<Item = (&'a str, Option<f64>)>,
    date: NaiveDate,
    key: &str,
    report: &mut ValidationReport,
) {
    for (name, value) in fields {
        if let Some(v) = value.filter(|v| *v < 0.0) {
            report.push(
                IssueLevel::Error,
                IssueKind::NegativeQuantity,
                date,
                key,
                format!("{name} is negative ({v})"),
            );
        }
    }
}

pub fn validate_upstream(records: &[UpstreamRecord], rules: &ValidationRules) -> ValidationReport {
    let mut report = ValidationReport::default();
    duplicate_keys(records, &mut report);

    for rec in records {
        let key = rec.plant.as_str();
        if let (Some(cpo), Some(rff)) = (rec.cpo_actual, rec.rff_actual) {
            if cpo > rff {
                report.push(
                    IssueLevel::Error,
                    IssueKind::CpoExceedsRff,
                    rec.date,
                    key,
                    format!("CPO {cpo} t exceeds RFF {rff} t"),
                );
            }
        }
        if let Some(tea) = rec.tea_actual {
            if tea < rules.tea_min || tea > rules.tea_max {
                report.push(
                    IssueLevel::Warning,
                    IssueKind::TeaOutOfBand,
                    rec.date,
                    key,
                    format!("TEA {tea}% outside [{}, {}]", rules.tea_min, rules.tea_max),
                );
            }
            if let Some(computed) = rec.computed_tea() {
                if (tea - computed).abs() > rules.ratio_tolerance {
                    report.push(
                        IssueLevel::Warning,
                        IssueKind::TeaInconsistent,
                        rec.date,
                        key,
                        format!("stored TEA {tea}% but CPO/RFF gives {computed}%"),
                    );
                }
            }
        }
        if let Some(capacities) = rules.tank_capacities.get(&rec.plant) {
            for (slot, (level, capacity)) in rec.tanks.iter().zip(capacities).enumerate() {
                if let Some(level) = level.filter(|l| l > capacity) {
                    report.push(
                        IssueLevel::Warning,
                        IssueKind::TankOverCapacity,
                        rec.date,
                        key,
                        format!("tank {} holds {level} t, capacity {capacity} t", slot + 1),
                    );
                }
            }
        }
        negatives(
            [
                ("rff_real", rec.rff_actual),
                ("rff_presupuesto", rec.rff_budget),
                ("cpo_real", rec.cpo_actual),
                ("cpo_presupuesto", rec.cpo_budget),
                ("palmiste_real", rec.palm_kernel_actual),
                ("palmiste_presupuesto", rec.palm_kernel_budget),
                ("almendra_real", rec.kernel_actual),
                ("almendra_presupuesto", rec.kernel_budget),
                ("kpo_real", rec.kernel_oil_actual),
                ("kpo_presupuesto", rec.kernel_oil_budget),
                ("inventario_cpo", rec.cpo_inventory),
            ],
            rec.date,
            key,
            &mut report,
        );
    }
    report
}

pub fn validate_downstream(
    records: &[DownstreamRecord],
    rules: &ValidationRules,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    duplicate_keys(records, &mut report);

    for rec in records {
        if let Some(stored) = rec.compliance {
            let expected = ratio_pct(rec.actual, rec.budget);
            let consistent =
                expected.is_some_and(|e| (stored - e).abs() <= rules.ratio_tolerance);
            if !consistent {
                report.push(
                    IssueLevel::Warning,
                    IssueKind::ComplianceInconsistent,
                    rec.date,
                    &rec.product,
                    format!("stored compliance {stored}% but actual/budget gives {expected:?}"),
                );
            }
        }
        negatives(
            [("produccion_me", rec.budget), ("produccion_real", rec.actual)],
            rec.date,
            &rec.product,
            &mut report,
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::{IssueKind, IssueLevel, ValidationRules, validate_downstream, validate_upstream};
    use crate::model::{DownstreamRecord, Plant, UpstreamRecord};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn row(d: u32, rff: f64, cpo: f64) -> UpstreamRecord {
        let mut rec = UpstreamRecord::new(day(d), Plant::Mlb);
        rec.rff_actual = Some(rff);
        rec.cpo_actual = Some(cpo);
        rec.tea_actual = rec.computed_tea();
        rec
    }

    #[test]
    fn clean_rows_have_no_issues() {
        let report = validate_upstream(&[row(1, 500.0, 100.0)], &ValidationRules::default());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn cpo_above_rff_is_an_error() {
        let report = validate_upstream(&[row(1, 100.0, 120.0)], &ValidationRules::default());
        assert!(report.has_errors());
        assert_eq!(report.of_kind(IssueKind::CpoExceedsRff).count(), 1);
        // 120 % is also outside the TEA band.
        assert_eq!(report.of_kind(IssueKind::TeaOutOfBand).count(), 1);
    }

    #[test]
    fn stale_tea_duplicates_and_negatives() {
        let mut stale = row(2, 500.0, 100.0);
        stale.tea_actual = Some(25.0);
        let mut negative = row(3, 500.0, 100.0);
        negative.rff_budget = Some(-1.0);
        let rows = vec![row(1, 500.0, 100.0), row(1, 510.0, 100.0), stale, negative];

        let report = validate_upstream(&rows, &ValidationRules::default());
        assert_eq!(report.of_kind(IssueKind::TeaInconsistent).count(), 1);
        assert_eq!(report.of_kind(IssueKind::DuplicateKey).count(), 1);
        assert_eq!(report.of_kind(IssueKind::NegativeQuantity).count(), 1);
        assert_eq!(report.count(IssueLevel::Error), 2);
    }

    #[test]
    fn tanks_are_checked_against_capacity() {
        let rules = ValidationRules {
            tank_capacities: BTreeMap::from([(Plant::Mlb, vec![200.0, 500.0])]),
            ..ValidationRules::default()
        };
        let mut rec = row(1, 500.0, 100.0);
        rec.tanks = [Some(150.0), Some(520.0), None, None];
        let report = validate_upstream(&[rec], &rules);
        let issues: Vec<_> = report.of_kind(IssueKind::TankOverCapacity).collect();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.starts_with("tank 2"));
        assert!(!report.has_errors());
    }

    #[test]
    fn downstream_compliance_is_rechecked() {
        let mut off = DownstreamRecord::new(day(1), "Oleína", None, Some(200.0), Some(150.0));
        off.compliance = Some(80.0);
        let ok = DownstreamRecord::new(day(1), "RBD", None, Some(200.0), Some(150.0));
        let report = validate_downstream(&[off, ok], &ValidationRules::default());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::ComplianceInconsistent);
        assert_eq!(report.issues[0].key, "Oleína");
    }
}
