//! Fuzzy label matching of statement rows.
//!
//! A row is described by the first few cells joined together, lower-cased and
//! with whitespace collapsed. A [`MetricSearchConfig`] matches when all of its
//! primary terms occur in that description and none of its exclusion terms do.

use crate::normalize::parse_amount;
use crate::schema::{MetricValue, YearColumns};
use crate::workbook::{row_cell, CellValue, Row};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DESCRIPTION_CELLS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MetricSearchConfig {
    #[schemars(description = "Lower-case terms that must all appear in the row description")]
    pub primary: Vec<String>,
    #[serde(default)]
    #[schemars(description = "Lower-case terms that disqualify a row")]
    pub exclusion: Vec<String>,
}

impl MetricSearchConfig {
    pub fn new(primary: &[&str], exclusion: &[&str]) -> Self {
        Self {
            primary: primary.iter().map(|t| normalize_label(t)).collect(),
            exclusion: exclusion.iter().map(|t| normalize_label(t)).collect(),
        }
    }

    pub fn primary(terms: &[&str]) -> Self {
        Self::new(terms, &[])
    }

    pub fn matches(&self, description: &str) -> bool {
        !self.primary.is_empty()
            && self.primary.iter().all(|t| description.contains(t.as_str()))
            && !self.exclusion.iter().any(|t| description.contains(t.as_str()))
    }
}

/// Lower-cases, trims and collapses runs of whitespace (NBSP included).
pub fn normalize_label(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{00A0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn describe_row(row: &[CellValue], cells: usize) -> String {
    let joined = row
        .iter()
        .take(cells)
        .map(|cell| cell.as_text())
        .collect::<Vec<_>>()
        .join(" ");
    normalize_label(&joined)
}

#[derive(Debug, Clone, Copy)]
pub struct LineItemMatcher {
    description_cells: usize,
}

impl Default for LineItemMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DESCRIPTION_CELLS)
    }
}

impl LineItemMatcher {
    pub fn new(description_cells: usize) -> Self {
        Self { description_cells }
    }

    /// Returns the values of the first row matched by the earliest config that
    /// yields at least one parseable year value.
    pub fn find_value(
        &self,
        rows: &[Row],
        configs: &[MetricSearchConfig],
        year_cols: YearColumns,
        metric: &str,
    ) -> MetricValue {
        let descriptions: Vec<String> = rows
            .iter()
            .map(|row| describe_row(row, self.description_cells))
            .collect();

        for (config_idx, config) in configs.iter().enumerate() {
            for (row_idx, description) in descriptions.iter().enumerate() {
                if !config.matches(description) {
                    continue;
                }

                let row = &rows[row_idx];
                let value = MetricValue::new(
                    parse_amount(row_cell(row, year_cols.current_year_col)),
                    parse_amount(row_cell(row, year_cols.previous_year_col)),
                );

                if !value.is_missing() {
                    debug!(
                        "{}: matched row {} ('{}') with config #{}",
                        metric, row_idx, description, config_idx
                    );
                    return value;
                }
            }
        }

        debug!("{}: no matching row", metric);
        MetricValue::MISSING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(cells: &[&str]) -> Row {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    const COLS: YearColumns = YearColumns::new(3, 4);

    #[test]
    fn test_total_assets_row() {
        let rows = vec![text_row(&["Totale attivo", "", "", "1.000,00", "900,00"])];
        let value = LineItemMatcher::default().find_value(
            &rows,
            &[MetricSearchConfig::primary(&["totale attivo"])],
            COLS,
            "totaleAttivo",
        );
        assert_eq!(value, MetricValue::new(Some(1000.0), Some(900.0)));
    }

    #[test]
    fn test_description_spans_cells_and_collapses_spaces() {
        let row = text_row(&["  A)", "Valore   della", "PRODUZIONE", "10", "20"]);
        assert_eq!(describe_row(&row, 6), "a) valore della produzione 10 20");
        assert_eq!(describe_row(&row, 2), "a) valore della");
    }

    #[test]
    fn test_exclusion_terms_skip_false_positives() {
        let rows = vec![
            text_row(&["Costi della produzione (valore)", "", "", "500", "400"]),
            text_row(&["Totale valore della produzione", "", "", "800", "700"]),
        ];
        let configs = [MetricSearchConfig::new(&["valore della produzione"], &["costi"])];
        let value = LineItemMatcher::default().find_value(&rows, &configs, COLS, "vp");
        assert_eq!(value.current_year, Some(800.0));
    }

    #[test]
    fn test_earlier_config_wins_over_earlier_row() {
        let rows = vec![
            text_row(&["Valore della produzione", "", "", "800", "700"]),
            text_row(&["Ricavi delle vendite e delle prestazioni", "", "", "750", "650"]),
        ];
        let configs = [
            MetricSearchConfig::primary(&["ricavi delle vendite"]),
            MetricSearchConfig::new(&["valore della produzione"], &["costi"]),
        ];
        let value = LineItemMatcher::default().find_value(&rows, &configs, COLS, "fatturato");
        assert_eq!(value, MetricValue::new(Some(750.0), Some(650.0)));
    }

    #[test]
    fn test_matching_rows_without_values_are_skipped() {
        let rows = vec![
            text_row(&["Totale attivo", "", "", "", ""]),
            text_row(&["Totale attivo", "", "", "0", "n.d."]),
        ];
        let value = LineItemMatcher::default().find_value(
            &rows,
            &[MetricSearchConfig::primary(&["totale attivo"])],
            COLS,
            "totaleAttivo",
        );
        assert_eq!(value, MetricValue::new(Some(0.0), None));
    }

    #[test]
    fn test_no_match_is_missing() {
        let rows = vec![text_row(&["Crediti", "", "", "10", "20"])];
        let value = LineItemMatcher::default().find_value(
            &rows,
            &[MetricSearchConfig::primary(&["totale attivo"])],
            COLS,
            "totaleAttivo",
        );
        assert!(value.is_missing());
        assert!(LineItemMatcher::default()
            .find_value(&rows, &[], COLS, "none")
            .is_missing());
    }

    #[test]
    fn test_short_rows_do_not_panic() {
        let rows = vec![text_row(&["Totale attivo"])];
        let value = LineItemMatcher::default().find_value(
            &rows,
            &[MetricSearchConfig::primary(&["totale attivo"])],
            COLS,
            "totaleAttivo",
        );
        assert!(value.is_missing());
    }

    #[test]
    fn test_config_terms_are_normalized() {
        let config = MetricSearchConfig::new(&["  Totale   Attivo "], &["CIRCOLANTE"]);
        assert_eq!(config.primary, vec!["totale attivo".to_string()]);
        assert!(config.matches("totale attivo"));
        assert!(!config.matches("totale attivo circolante"));
        assert!(!MetricSearchConfig::primary(&[]).matches("anything"));
    }
}
