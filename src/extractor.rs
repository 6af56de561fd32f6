use crate::catalog::{keys, MetricCatalog, MetricDefinition, SheetSource};
use crate::error::{AnalysisError, Result};
use crate::matcher::{LineItemMatcher, DEFAULT_DESCRIPTION_CELLS};
use crate::schema::{FinancialMetricsSet, MetricValue, YearColumns, YearDetection, YearSelector};
use crate::workbook::{Row, Workbook};
use crate::year_columns::{YearColumnLocator, DEFAULT_SCAN_ROWS, FALLBACK_COLUMNS};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExtractionConfig {
    #[schemars(description = "Accepted names for the balance sheet, tried in order")]
    pub balance_sheet_names: Vec<String>,
    #[schemars(description = "Accepted names for the income statement, tried in order")]
    pub income_statement_names: Vec<String>,
    #[schemars(description = "Number of leading rows scanned for year headers")]
    pub year_scan_rows: usize,
    #[schemars(description = "Number of leading cells joined into a row description")]
    pub description_cells: usize,
    #[schemars(description = "Columns used when no year headers are found")]
    pub fallback_columns: YearColumns,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            balance_sheet_names: vec![
                "Stato Patrimoniale".to_string(),
                "Balance Sheet".to_string(),
            ],
            income_statement_names: vec![
                "Conto Economico".to_string(),
                "Income Statement".to_string(),
            ],
            year_scan_rows: DEFAULT_SCAN_ROWS,
            description_cells: DEFAULT_DESCRIPTION_CELLS,
            fallback_columns: FALLBACK_COLUMNS,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.balance_sheet_names.is_empty() || self.income_statement_names.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "at least one sheet name is required for each statement".to_string(),
            ));
        }
        if self.year_scan_rows == 0 || self.description_cells == 0 {
            return Err(AnalysisError::InvalidConfig(
                "year_scan_rows and description_cells must be positive".to_string(),
            ));
        }
        if self.fallback_columns.current_year_col == self.fallback_columns.previous_year_col {
            return Err(AnalysisError::InvalidConfig(
                "fallback year columns must differ".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct MetricsExtractor {
    catalog: MetricCatalog,
    config: ExtractionConfig,
}

impl Default for MetricsExtractor {
    fn default() -> Self {
        Self::new(MetricCatalog::standard(), ExtractionConfig::default())
    }
}

// Per-sheet state resolved once before matching.
struct SheetContext<'a> {
    rows: &'a [Row],
    detection: YearDetection,
}

impl MetricsExtractor {
    pub fn new(catalog: MetricCatalog, config: ExtractionConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Resolves both statements by name; a missing sheet is fatal.
    pub fn extract_workbook(&self, workbook: &Workbook) -> Result<FinancialMetricsSet> {
        let balance = workbook
            .find_sheet(&self.config.balance_sheet_names)
            .ok_or_else(|| AnalysisError::MissingSheet {
                expected: self.config.balance_sheet_names.join(" | "),
                available: workbook.sheet_names(),
            })?;
        let income = workbook
            .find_sheet(&self.config.income_statement_names)
            .ok_or_else(|| AnalysisError::MissingSheet {
                expected: self.config.income_statement_names.join(" | "),
                available: workbook.sheet_names(),
            })?;

        info!(
            "Extracting metrics from sheets '{}' and '{}'",
            balance.name, income.name
        );
        Ok(self.extract(&balance.rows, &income.rows))
    }

    pub fn extract(&self, balance_rows: &[Row], income_rows: &[Row]) -> FinancialMetricsSet {
        let locator =
            YearColumnLocator::new(self.config.year_scan_rows, self.config.fallback_columns);
        let matcher = LineItemMatcher::new(self.config.description_cells);

        let balance = SheetContext {
            rows: balance_rows,
            detection: locator.detect(balance_rows),
        };
        let income = SheetContext {
            rows: income_rows,
            detection: locator.detect(income_rows),
        };

        let mut set = FinancialMetricsSet::new();
        for definition in &self.catalog.definitions {
            let value = self.extract_metric(&matcher, definition, &balance, &income);
            set.insert(definition.key.clone(), value);
        }

        derive_ebitda(&mut set);

        let missing = set.missing();
        if !missing.is_empty() {
            warn!("Metrics not found in statements: {}", missing.join(", "));
        }

        set.balance_sheet_years = Some(balance.detection);
        set.income_statement_years = Some(income.detection);
        set
    }

    fn extract_metric(
        &self,
        matcher: &LineItemMatcher,
        definition: &MetricDefinition,
        balance: &SheetContext<'_>,
        income: &SheetContext<'_>,
    ) -> MetricValue {
        let search = |sheet: &SheetContext<'_>| {
            matcher.find_value(
                sheet.rows,
                &definition.configs,
                sheet.detection.columns,
                &definition.key,
            )
        };

        match definition.source {
            SheetSource::IncomeStatement => search(income),
            SheetSource::BalanceSheet => search(balance),
            SheetSource::IncomeThenBalance => {
                let value = search(income);
                if value.is_missing() {
                    debug!(
                        "{} not in income statement, trying balance sheet",
                        definition.key
                    );
                    search(balance)
                } else {
                    value
                }
            }
        }
    }
}

/// Fills EBITDA from EBIT + D&A, or from production value - production costs
/// + D&A, for each year where no explicit EBITDA line was found.
fn derive_ebitda(set: &mut FinancialMetricsSet) {
    let direct = set.get(keys::EBITDA);
    let ebit = set.get(keys::RISULTATO_OPERATIVO);
    let amortization = set.get(keys::AMMORTAMENTI);
    let production_value = set.get(keys::VALORE_PRODUZIONE);
    let production_costs = set.get(keys::COSTI_PRODUZIONE);

    let derive = |year: YearSelector| -> Option<f64> {
        direct.get(year).or_else(|| {
            let amortization = amortization.get(year)?;
            let operating = ebit
                .get(year)
                .or_else(|| Some(production_value.get(year)? - production_costs.get(year)?))?;
            Some(operating + amortization)
        })
    };

    let value = MetricValue::new(derive(YearSelector::Current), derive(YearSelector::Previous));
    if value != direct {
        debug!("ebitda derived from operating result: {:?}", value);
    }
    set.insert(keys::EBITDA, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::{CellValue, RawSheet};

    fn row(label: &str, current: &str, previous: &str) -> Row {
        vec![
            label.into(),
            CellValue::Empty,
            CellValue::Empty,
            current.into(),
            previous.into(),
        ]
    }

    fn header() -> Row {
        vec![
            "Voce".into(),
            CellValue::Empty,
            CellValue::Empty,
            "31/12/2023".into(),
            "31/12/2022".into(),
        ]
    }

    fn balance_rows() -> Vec<Row> {
        vec![
            header(),
            row("C) Attivo circolante", "", ""),
            row("IV - Disponibilità liquide", "80.000", "60.000"),
            row("Totale attivo circolante", "500.000", "450.000"),
            row("Totale attivo", "1.200.000", "1.100.000"),
            row("A) Patrimonio netto", "", ""),
            row("IX - Utile (perdita) dell'esercizio", "45.000", "30.000"),
            row("Totale patrimonio netto", "400.000", "355.000"),
            row("Debiti verso banche esigibili entro l'esercizio successivo", "70.000", "90.000"),
            row("Debiti verso banche esigibili oltre l'esercizio successivo", "60.000", "80.000"),
            row("Totale debiti esigibili entro l'esercizio successivo", "300.000", "280.000"),
            row("Totale passivo e patrimonio netto", "1.200.000", "1.100.000"),
        ]
    }

    fn income_rows() -> Vec<Row> {
        vec![
            header(),
            row("A) Valore della produzione", "", ""),
            row("1) Ricavi delle vendite e delle prestazioni", "1.000.000", "900.000"),
            row("Totale valore della produzione", "1.020.000", "910.000"),
            row("B) Costi della produzione", "", ""),
            row("7) per servizi", "200.000", "180.000"),
            row("Totale costi per il personale", "250.000", "230.000"),
            row("Totale ammortamenti e svalutazioni", "40.000", "38.000"),
            row("Totale costi della produzione", "900.000", "820.000"),
            row("Differenza tra valore e costi della produzione (A - B)", "120.000", "90.000"),
            row("17) interessi e altri oneri finanziari", "(8.000)", "(9.500)"),
        ]
    }

    #[test]
    fn test_extracts_balance_and_income_metrics() {
        let set = MetricsExtractor::default().extract(&balance_rows(), &income_rows());

        assert_eq!(
            set.get(keys::FATTURATO),
            MetricValue::new(Some(1_000_000.0), Some(900_000.0))
        );
        assert_eq!(set.get(keys::TOTALE_ATTIVO).current_year, Some(1_200_000.0));
        assert_eq!(set.get(keys::PATRIMONIO_NETTO).current_year, Some(400_000.0));
        assert_eq!(set.get(keys::ATTIVO_CIRCOLANTE).current_year, Some(500_000.0));
        assert_eq!(set.get(keys::DISPONIBILITA_LIQUIDE).current_year, Some(80_000.0));
        assert_eq!(set.get(keys::DEBITI_BREVE).current_year, Some(70_000.0));
        assert_eq!(set.get(keys::DEBITI_LUNGO).current_year, Some(60_000.0));
        assert_eq!(
            set.get(keys::DEBITI_ENTRO_ESERCIZIO).current_year,
            Some(300_000.0)
        );
        assert_eq!(set.get(keys::ONERI_FINANZIARI).current_year, Some(-8_000.0));
        assert_eq!(set.get(keys::VALORE_PRODUZIONE).current_year, Some(1_020_000.0));
        assert_eq!(set.get(keys::COSTI_PRODUZIONE).current_year, Some(900_000.0));

        let detection = set.income_statement_years.as_ref().unwrap();
        assert!(detection.detected);
        assert_eq!(detection.current_year, Some(2023));
    }

    #[test]
    fn test_title_rows_do_not_shift_year_columns() {
        let titled = |title: &str, rows: Vec<Row>| {
            let mut out: Vec<Row> = vec![vec![title.into()]];
            out.extend(rows);
            out
        };
        let balance = titled("Stato patrimoniale al 31/12/2023", balance_rows());
        let income = titled("Conto economico esercizio 2023", income_rows());

        let set = MetricsExtractor::default().extract(&balance, &income);
        assert_eq!(
            set.income_statement_years.as_ref().unwrap().columns,
            YearColumns::new(3, 4)
        );
        assert_eq!(
            set.get(keys::FATTURATO),
            MetricValue::new(Some(1_000_000.0), Some(900_000.0))
        );
        assert_eq!(set.get(keys::TOTALE_ATTIVO).current_year, Some(1_200_000.0));
    }

    #[test]
    fn test_net_income_falls_back_to_balance_sheet() {
        let set = MetricsExtractor::default().extract(&balance_rows(), &income_rows());
        assert_eq!(
            set.get(keys::UTILE_PERDITA),
            MetricValue::new(Some(45_000.0), Some(30_000.0))
        );
    }

    #[test]
    fn test_net_income_prefers_income_statement() {
        let mut income = income_rows();
        income.push(row("21) Utile (perdita) dell'esercizio", "44.000", "29.000"));
        let set = MetricsExtractor::default().extract(&balance_rows(), &income);
        assert_eq!(set.get(keys::UTILE_PERDITA).current_year, Some(44_000.0));
    }

    #[test]
    fn test_ebitda_is_derived_from_operating_result() {
        let set = MetricsExtractor::default().extract(&balance_rows(), &income_rows());
        assert_eq!(
            set.get(keys::EBITDA),
            MetricValue::new(Some(160_000.0), Some(128_000.0))
        );
    }

    #[test]
    fn test_explicit_ebitda_row_wins() {
        let mut income = income_rows();
        income.push(row("EBITDA", "155.000", ""));
        let set = MetricsExtractor::default().extract(&balance_rows(), &income);
        assert_eq!(
            set.get(keys::EBITDA),
            MetricValue::new(Some(155_000.0), Some(128_000.0))
        );
    }

    #[test]
    fn test_missing_metrics_stay_null() {
        let set = MetricsExtractor::default().extract(&[], &[]);
        assert!(set.get(keys::FATTURATO).is_missing());
        assert!(set.get(keys::EBITDA).is_missing());
        assert_eq!(set.missing().len(), MetricCatalog::standard().definitions.len());
        assert!(!set.balance_sheet_years.unwrap().detected);
    }

    #[test]
    fn test_missing_sheet_is_fatal() {
        let workbook = Workbook::new(vec![RawSheet::new("Stato Patrimoniale", balance_rows())]);
        let err = MetricsExtractor::default()
            .extract_workbook(&workbook)
            .unwrap_err();
        match err {
            AnalysisError::MissingSheet { expected, available } => {
                assert!(expected.contains("Conto Economico"));
                assert_eq!(available, vec!["Stato Patrimoniale".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(ExtractionConfig::default().validate().is_ok());
        let config = ExtractionConfig {
            fallback_columns: YearColumns::new(3, 3),
            ..ExtractionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    fn format_italian(value: f64) -> String {
        let negative = value < 0.0;
        let cents = (value.abs() * 100.0).round() as u64;
        let integer = (cents / 100).to_string();
        let mut grouped = String::new();
        for (i, digit) in integer.chars().enumerate() {
            if i > 0 && (integer.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(digit);
        }
        let body = format!("{},{:02}", grouped, cents % 100);
        if negative {
            format!("({})", body)
        } else {
            body
        }
    }

    #[test]
    fn test_formatted_values_round_trip_through_extraction() {
        let known = [
            ("Totale attivo", 2_345_678.91, 1_987_654.32),
            ("Totale patrimonio netto", -12_345.67, 0.0),
            ("Totale disponibilità liquide", 0.5, 999.99),
        ];
        let mut rows = vec![header()];
        for (label, current, previous) in known {
            rows.push(row(label, &format_italian(current), &format_italian(previous)));
        }

        let set = MetricsExtractor::default().extract(&rows, &[]);
        let pairs = [
            (keys::TOTALE_ATTIVO, known[0]),
            (keys::PATRIMONIO_NETTO, known[1]),
            (keys::DISPONIBILITA_LIQUIDE, known[2]),
        ];
        for (key, (_, current, previous)) in pairs {
            let value = set.get(key);
            assert!((value.current_year.unwrap() - current).abs() < 1e-6, "{key}");
            assert!((value.previous_year.unwrap() - previous).abs() < 1e-6, "{key}");
        }
    }
}
