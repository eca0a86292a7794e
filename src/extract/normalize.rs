//! Value normalizer: one spreadsheet cell to an optional number.
//!
//! Absent and zero are different things here. Empty cells, error cells, booleans, dates and
//! text that does not read as a number all become `None`; a literal `0` stays `Some(0.0)`.

use calamine::Data;

/// Cell-level policy knobs.
///
/// The default keeps every finite number; only the kernel expeller workbook sets an
/// `error_floor`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizePolicy {
    /// Values strictly below this are formula garbage and read as absent.
    pub error_floor: Option<f64>,
}

/// Normalize with the default policy.
pub fn normalize(cell: &Data) -> Option<f64> {
    normalize_with(cell, &NormalizePolicy::default())
}

pub fn normalize_with(cell: &Data, policy: &NormalizePolicy) -> Option<f64> {
    let value = match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_number_text(s),
        Data::Empty
        | Data::Error(_)
        | Data::Bool(_)
        | Data::DateTime(_)
        | Data::DateTimeIso(_)
        | Data::DurationIso(_) => None,
    }?;
    if !value.is_finite() {
        return None;
    }
    match policy.error_floor {
        Some(floor) if value < floor => None,
        _ => Some(value),
    }
}

/// Parse free-form numeric text ("1.234,56", "25%", "$ 1,200").
///
/// Separator rules:
/// - both `,` and `.` present: the last one is the decimal separator, the other is grouping;
/// - only one kind, repeated: grouping;
/// - a single `,` followed by exactly three digits (and a non-zero integer part): grouping;
///   otherwise a decimal comma;
/// - a single `.` is always a decimal point.
pub fn parse_number_text(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '%' | '$' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() || cleaned.starts_with('#') {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();
    let canonical = match (commas, dots) {
        (0, 0) | (0, 1) => cleaned,
        (0, _) => cleaned.replace('.', ""),
        (1, 0) => {
            let (int_part, frac) = cleaned.split_once(',')?;
            let int_digits = int_part.trim_start_matches(['-', '+']);
            let is_grouping = frac.len() == 3
                && frac.chars().all(|c| c.is_ascii_digit())
                && !int_digits.is_empty()
                && int_digits != "0";
            if is_grouping {
                format!("{int_part}{frac}")
            } else {
                format!("{int_part}.{frac}")
            }
        }
        (_, 0) => cleaned.replace(',', ""),
        _ => {
            let last_comma = cleaned.rfind(',')?;
            let last_dot = cleaned.rfind('.')?;
            if last_comma > last_dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
    };

    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rates stored as true fractions (0.22) are rescaled to percentages (22.0).
///
/// Values in `(0, 1)` are treated as fractions, so a genuine rate below 1 % is misread. Only
/// extraction rates go through this; quality parameters never do.
pub fn scale_fraction(value: Option<f64>) -> Option<f64> {
    value.map(|v| if v > 0.0 && v < 1.0 { v * 100.0 } else { v })
}
