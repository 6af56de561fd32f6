//! Workbook model and spreadsheet loading.
//!
//! Sheets are kept as plain 2-D grids of [`CellValue`]s with absolute
//! coordinates: row 0 / column 0 is always cell A1, even when the used range
//! of the source sheet starts further down or to the right.

use crate::error::{AnalysisError, Result};
use calamine::{open_workbook_auto_from_rs, Data, DataType, Range, Reader};
use chrono::NaiveDate;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Textual rendering used when building row descriptions.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Empty => Cow::Borrowed(""),
            CellValue::Text(s) => Cow::Borrowed(s.as_str()),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Cow::Owned(format!("{}", *n as i64))
            }
            CellValue::Number(n) => Cow::Owned(n.to_string()),
            CellValue::Bool(b) => Cow::Owned(b.to_string()),
            CellValue::Date(d) => Cow::Owned(d.format("%d/%m/%Y").to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

pub type Row = Vec<CellValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Row>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Returns the cell at `(row, col)`, or an empty cell outside the grid.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// Cell lookup on a bare row that tolerates short rows.
pub fn row_cell(row: &[CellValue], col: usize) -> &CellValue {
    row.get(col).unwrap_or(&EMPTY_CELL)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Workbook {
    pub sheets: Vec<RawSheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<RawSheet>) -> Self {
        Self { sheets }
    }

    /// Parses xlsx/xlsm/xlsb/xls/ods bytes. The format is sniffed from content.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| AnalysisError::UnreadableWorkbook(e.to_string()))?;

        let names: Vec<String> = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(names.len());

        for name in &names {
            match workbook.worksheet_range(name) {
                Ok(range) => sheets.push(range_to_sheet(name, &range)),
                Err(e) => warn!("Skipping sheet '{}': {}", name, e),
            }
        }

        if sheets.is_empty() {
            return Err(AnalysisError::UnreadableWorkbook(
                "workbook contains no readable sheets".to_string(),
            ));
        }

        debug!("Loaded workbook with sheets {:?}", names);
        Ok(Self { sheets })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Exact lookup, ignoring case and surrounding whitespace.
    pub fn sheet(&self, name: &str) -> Option<&RawSheet> {
        let wanted = name.trim().to_lowercase();
        self.sheets
            .iter()
            .find(|s| s.name.trim().to_lowercase() == wanted)
    }

    /// Tries each accepted name exactly, then as a substring of sheet names.
    pub fn find_sheet<S: AsRef<str>>(&self, candidates: &[S]) -> Option<&RawSheet> {
        for candidate in candidates {
            if let Some(sheet) = self.sheet(candidate.as_ref()) {
                return Some(sheet);
            }
        }

        candidates.iter().find_map(|candidate| {
            let wanted = candidate.as_ref().trim().to_lowercase();
            self.sheets
                .iter()
                .find(|s| s.name.to_lowercase().contains(&wanted))
        })
    }
}

fn range_to_sheet(name: &str, range: &Range<Data>) -> RawSheet {
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Row> = vec![Vec::new(); row_offset];
    for source_row in range.rows() {
        let mut row = vec![CellValue::Empty; col_offset];
        row.extend(source_row.iter().map(convert_cell));
        rows.push(row);
    }

    RawSheet::new(name, rows)
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(_) | Data::DateTimeIso(_) => {
            cell.as_date().map(CellValue::Date).unwrap_or(CellValue::Empty)
        }
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}
