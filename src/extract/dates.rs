//! Date-column detection for sheets whose dates run across a header row.

use std::collections::BTreeMap;

use calamine::{Data, Range};
use chrono::{NaiveDate, NaiveDateTime};

/// Header tokens that mark aggregate columns sharing the date row.
const AGGREGATE_MARKERS: [&str; 2] = ["ACUMULADO", "ZONA"];

/// Date columns of the first row, skipping column 0 (row labels).
pub fn detect_date_columns(grid: &Range<Data>) -> BTreeMap<u32, NaiveDate> {
    detect_date_columns_in_row(grid, 0, 1)
}

/// Map column index to calendar date for every cell of `row` from `first_col` on that holds a
/// date. Date-typed cells are taken as is; text is taken only when it parses as a date and does
/// not name an aggregate column. Anything else is skipped silently. Duplicate dates are kept.
pub fn detect_date_columns_in_row(
    grid: &Range<Data>,
    row: u32,
    first_col: u32,
) -> BTreeMap<u32, NaiveDate> {
    let mut out = BTreeMap::new();
    let Some((_, last_col)) = grid.end() else {
        return out;
    };
    for col in first_col..=last_col {
        let Some(cell) = grid.get_value((row, col)) else {
            continue;
        };
        if let Data::String(s) = cell {
            let upper = s.to_uppercase();
            if AGGREGATE_MARKERS.iter().any(|m| upper.contains(m)) {
                continue;
            }
        }
        if let Some(date) = cell_date(cell) {
            out.insert(col, date);
        }
    }
    out
}

/// Calendar day held by a cell. Plain numbers are not dates.
pub fn cell_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => dt.as_datetime().map(|d| d.date()),
        Data::DateTimeIso(s) | Data::String(s) => parse_date_str(s),
        _ => None,
    }
}

/// Parse ISO dates (with or without a time part) and day-first dates.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
