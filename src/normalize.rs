//! Locale-aware parsing of amounts as they appear in Italian statements.
//!
//! `"1.234,56"` is 1234.56, `"(1.234,56)"` is negative, NBSP and apostrophes
//! are grouping noise. Absence is `None`, never `0.0`.

use crate::workbook::CellValue;

const UNICODE_MINUS: char = '\u{2212}';
const NBSP: char = '\u{00A0}';
const NARROW_NBSP: char = '\u{202F}';

pub fn parse_amount(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Number(n) if n.is_finite() => Some(*n),
        CellValue::Text(s) => parse_amount_str(s),
        _ => None,
    }
}

pub fn parse_amount_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c == NBSP);
    if trimmed.is_empty() {
        return None;
    }

    let (body, negative) = match trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (inner, true),
        None => (trimmed, false),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(*c, ' ' | '\'' | NBSP | NARROW_NBSP))
        .map(|c| if c == UNICODE_MINUS { '-' } else { c })
        .filter(|c| *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(if negative { -value.abs() } else { value })
}
