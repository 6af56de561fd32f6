use crate::schema::{YearColumns, YearDetection};
use crate::workbook::{CellValue, Row};
use chrono::Datelike;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_SCAN_ROWS: usize = 40;
pub const FALLBACK_COLUMNS: YearColumns = YearColumns::new(3, 4);

static YEAR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("year regex is valid"));

static HEADER_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\d{1,2}[/.-]\d{1,2}[/.-])?((?:19|20)\d{2})\s*$").expect("header regex is valid")
});

#[derive(Debug, Clone, Copy)]
pub struct YearColumnLocator {
    scan_rows: usize,
    fallback: YearColumns,
}

impl Default for YearColumnLocator {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_ROWS, FALLBACK_COLUMNS)
    }
}

impl YearColumnLocator {
    pub fn new(scan_rows: usize, fallback: YearColumns) -> Self {
        Self {
            scan_rows,
            fallback,
        }
    }

    pub fn locate(&self, rows: &[Row]) -> YearColumns {
        self.detect(rows).columns
    }

    /// Finds the two most recent year headers within the scan window.
    ///
    /// Cells holding nothing but a year or a date are preferred over years
    /// embedded in longer labels such as "Bilancio al 31/12/2023", and a row
    /// carrying two distinct years is preferred over years collected across
    /// rows. Scanning stops at the second distinct year; each year keeps the
    /// first column it was seen in.
    pub fn detect(&self, rows: &[Row]) -> YearDetection {
        let window = &rows[..rows.len().min(self.scan_rows)];

        let found = [TokenKind::Header, TokenKind::Embedded]
            .into_iter()
            .find_map(|accept| {
                header_row_years(window, accept).or_else(|| scattered_years(window, accept))
            });

        let Some(mut found) = found else {
            warn!(
                "Year columns not detected in first {} rows, falling back to columns {}/{}",
                self.scan_rows, self.fallback.current_year_col, self.fallback.previous_year_col
            );
            return YearDetection {
                columns: self.fallback,
                detected: false,
                current_year: None,
                previous_year: None,
            };
        };

        found.sort_by(|a, b| b.0.cmp(&a.0));
        let (current_year, current_col) = found[0];
        let (previous_year, previous_col) = found[1];
        debug!(
            "Detected years {} (col {}) and {} (col {})",
            current_year, current_col, previous_year, previous_col
        );

        YearDetection {
            columns: YearColumns::new(current_col, previous_col),
            detected: true,
            current_year: Some(current_year),
            previous_year: Some(previous_year),
        }
    }
}

/// `Header` cells are a bare year, a date or an integral year number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TokenKind {
    Header,
    Embedded,
}

// Pushes the cell's year if new; true once two distinct years are held.
fn collect_year(found: &mut Vec<(i32, usize)>, cell: &CellValue, col: usize, accept: TokenKind) -> bool {
    if let Some((year, kind)) = year_token(cell) {
        if kind <= accept && !found.iter().any(|(y, _)| *y == year) {
            found.push((year, col));
        }
    }
    found.len() >= 2
}

fn header_row_years(rows: &[Row], accept: TokenKind) -> Option<Vec<(i32, usize)>> {
    rows.iter().find_map(|row| {
        let mut found = Vec::new();
        let complete = row
            .iter()
            .enumerate()
            .any(|(col, cell)| collect_year(&mut found, cell, col, accept));
        complete.then_some(found)
    })
}

fn scattered_years(rows: &[Row], accept: TokenKind) -> Option<Vec<(i32, usize)>> {
    let mut found = Vec::new();
    let complete = rows
        .iter()
        .flat_map(|row| row.iter().enumerate())
        .any(|(col, cell)| collect_year(&mut found, cell, col, accept));
    complete.then_some(found)
}

fn year_token(cell: &CellValue) -> Option<(i32, TokenKind)> {
    match cell {
        CellValue::Text(s) => {
            if let Some(caps) = HEADER_YEAR.captures(s) {
                return caps[1].parse().ok().map(|y| (y, TokenKind::Header));
            }
            YEAR_TOKEN
                .captures(s)
                .and_then(|caps| caps[1].parse().ok())
                .map(|y| (y, TokenKind::Embedded))
        }
        CellValue::Number(n) if n.fract() == 0.0 && (1900.0..=2099.0).contains(n) => {
            Some((*n as i32, TokenKind::Header))
        }
        CellValue::Date(d) => Some(d.year())
            .filter(|y| (1900..=2099).contains(y))
            .map(|y| (y, TokenKind::Header)),
        _ => None,
    }
}
