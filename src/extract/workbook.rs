//! Workbook access with absolute (row, column) addressing.

use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};
use chrono::NaiveDate;
use tracing::{debug, warn};

use super::dates::cell_date;
use super::normalize::{NormalizePolicy, normalize_with};
use crate::error::{EtlError, EtlResult};
use crate::layout::{LayoutDrift, Locator, label_matches};

static EMPTY: Data = Data::Empty;

/// Every decodable sheet of a workbook, loaded up front.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<(String, Range<Data>)>,
}

impl Workbook {
    /// Open `.xlsx`, `.xlsm`, `.xls` or `.ods`. Sheets that fail to decode are skipped with a
    /// warning and later read as missing.
    pub fn open(path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(EtlError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let mut workbook = open_workbook_auto(path)?;
        let names = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            match workbook.worksheet_range(&name) {
                Ok(range) => {
                    debug!(sheet = %name, size = ?range.get_size(), "loaded sheet");
                    sheets.push((name, range));
                }
                Err(err) => warn!(sheet = %name, error = %err, "skipping undecodable sheet"),
            }
        }
        Ok(Self { sheets })
    }

    /// Build from in-memory grids.
    pub fn from_sheets(sheets: Vec<(String, Range<Data>)>) -> Self {
        Self { sheets }
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|(name, _)| name.as_str())
    }

    /// Look a sheet up by exact name, then by trimmed case-insensitive name.
    pub fn sheet(&self, name: &str) -> Option<Sheet<'_>> {
        let found = self
            .sheets
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| {
                let wanted = name.trim().to_lowercase();
                self.sheets
                    .iter()
                    .find(|(n, _)| n.trim().to_lowercase() == wanted)
            })?;
        Some(Sheet {
            name: &found.0,
            range: &found.1,
        })
    }
}

/// Borrowed view of one sheet.
#[derive(Debug, Clone, Copy)]
pub struct Sheet<'a> {
    pub name: &'a str,
    pub range: &'a Range<Data>,
}

impl<'a> Sheet<'a> {
    /// Cell at an absolute position; out-of-range reads as empty.
    pub fn cell(&self, row: u32, col: u32) -> &'a Data {
        self.range.get_value((row, col)).unwrap_or(&EMPTY)
    }

    /// Last used row index, if the sheet has any cells.
    pub fn last_row(&self) -> Option<u32> {
        self.range.end().map(|(row, _)| row)
    }

    pub fn number(&self, row: u32, col: u32, policy: &NormalizePolicy) -> Option<f64> {
        normalize_with(self.cell(row, col), policy)
    }

    pub fn date(&self, row: u32, col: u32) -> Option<NaiveDate> {
        cell_date(self.cell(row, col))
    }

    /// Trimmed text of a cell; numbers are rendered, empty cells are `None`.
    pub fn text(&self, row: u32, col: u32) -> Option<String> {
        let text = match self.cell(row, col) {
            Data::Empty => return None,
            Data::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    /// Check a row locator's label against the label column of its row.
    pub fn check_row_label(&self, label_column: u32, locator: &Locator) -> Result<(), LayoutDrift> {
        self.check_label(locator.index(), label_column, locator)
    }

    /// Check a column locator's label against the header row.
    pub fn check_column_label(&self, header_row: u32, locator: &Locator) -> Result<(), LayoutDrift> {
        self.check_label(header_row, locator.index(), locator)
    }

    fn check_label(&self, row: u32, col: u32, locator: &Locator) -> Result<(), LayoutDrift> {
        let Some(expected) = locator.label() else {
            return Ok(());
        };
        let found = self.text(row, col);
        match &found {
            Some(text) if label_matches(text, expected) => Ok(()),
            _ => Err(LayoutDrift {
                sheet: self.name.to_string(),
                row,
                column: col,
                expected: expected.to_string(),
                found,
            }),
        }
    }
}

/// Collect the drift of a set of locators; empty when every label matches.
pub(crate) fn collect_drift<'l>(
    locators: impl IntoIterator<Item = &'l Locator>,
    check: impl Fn(&Locator) -> Result<(), LayoutDrift>,
) -> Vec<LayoutDrift> {
    locators
        .into_iter()
        .filter_map(|loc| check(loc).err())
        .collect()
}

#[cfg(test)]
mod tests {
    use calamine::{Data, Range};

    use super::Workbook;
    use crate::extract::normalize::NormalizePolicy;
    use crate::layout::Locator;

    fn book() -> Workbook {
        let mut grid: Range<Data> = Range::new((0, 0), (2, 2));
        grid.set_value((1, 0), Data::String(" Ext MLB Real ".to_string()));
        grid.set_value((1, 1), Data::Float(120.5));
        Workbook::from_sheets(vec![("UPSTREAM".to_string(), grid)])
    }

    #[test]
    fn sheet_lookup_falls_back_to_case_insensitive() {
        let book = book();
        assert!(book.sheet("UPSTREAM").is_some());
        assert!(book.sheet("upstream ").is_some());
        assert!(book.sheet("DOWNSTREAM").is_none());
    }

    #[test]
    fn out_of_range_cells_read_as_empty() {
        let book = book();
        let sheet = book.sheet("UPSTREAM").unwrap();
        let policy = NormalizePolicy::default();
        assert_eq!(sheet.number(1, 1, &policy), Some(120.5));
        assert_eq!(sheet.number(40, 40, &policy), None);
        assert_eq!(sheet.text(1, 0).as_deref(), Some("Ext MLB Real"));
    }

    #[test]
    fn label_mismatch_is_reported_as_drift() {
        let book = book();
        let sheet = book.sheet("UPSTREAM").unwrap();
        let ok = Locator::Labeled {
            index: 1,
            label: "real".to_string(),
        };
        let drifted = Locator::Labeled {
            index: 2,
            label: "CPO".to_string(),
        };
        assert!(sheet.check_row_label(0, &ok).is_ok());
        assert!(sheet.check_row_label(0, &Locator::Index(2)).is_ok());
        let drift = sheet.check_row_label(0, &drifted).unwrap_err();
        assert_eq!(drift.row, 2);
        assert_eq!(drift.found, None);
    }
}
