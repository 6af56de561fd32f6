//! # Bilancio Engine
//!
//! Extraction of Italian balance sheets and income statements from
//! heterogeneous spreadsheets, followed by a multiples-based valuation and a
//! three-year plan.
//!
//! ## Core Concepts
//!
//! - **Normalization**: locale-formatted text (`"1.234,56"`, `"(500)"`) becomes `f64` or `None`
//! - **Year Columns**: the two most recent year headers decide which columns hold current/previous values
//! - **Line Items**: ordered label configurations with exclusion terms find each metric's row
//! - **Valuation**: EBITDA x sector multiple, liquidity discount, growth/leverage adjustments, equity bridge
//! - **Plan**: constant-ratio projection over three years with KPIs and a +/-10% sensitivity table
//!
//! Gaps never fail an analysis: a metric that cannot be found is `None`, an
//! unknown sector uses the default profile, and a non-positive EBITDA takes the
//! worst leverage adjustment. Only structural problems (unreadable workbook,
//! missing statement sheet, unknown session) are errors.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bilancio_engine::*;
//!
//! let catalog = SectorCatalog::builtin()?;
//! let workbook = Workbook::from_bytes(&std::fs::read("bilancio.xlsx")?)?;
//!
//! let metrics = extract_metrics(&workbook)?;
//! let valuation = value_company(&catalog, "metalmeccanico", "piccola", &metrics);
//! println!("Fair market value: {}", valuation.fair_market_value);
//! ```

pub mod catalog;
pub mod error;
pub mod extractor;
pub mod matcher;
pub mod normalize;
pub mod plan;
pub mod ratios;
pub mod schema;
pub mod sectors;
pub mod session;
pub mod valuation;
pub mod workbook;
pub mod year_columns;

pub use catalog::{keys, MetricCatalog, MetricDefinition, SheetSource};
pub use error::{AnalysisError, Result};
pub use extractor::{ExtractionConfig, MetricsExtractor};
pub use matcher::{LineItemMatcher, MetricSearchConfig};
pub use normalize::{parse_amount, parse_amount_str};
pub use plan::*;
pub use ratios::FinancialRatios;
pub use schema::*;
pub use sectors::{LiquidityTier, SectorCatalog, SectorProfile};
pub use session::*;
pub use valuation::*;
pub use workbook::{CellValue, RawSheet, Row, Workbook};
pub use year_columns::YearColumnLocator;

/// Extracts the standard metric catalog from a workbook's statement sheets.
pub fn extract_metrics(workbook: &Workbook) -> Result<FinancialMetricsSet> {
    MetricsExtractor::default().extract_workbook(workbook)
}

/// Values a company with the default discount table and adjustment bands.
pub fn value_company(
    catalog: &SectorCatalog,
    sector_id: &str,
    company_size_tier: &str,
    metrics: &FinancialMetricsSet,
) -> ValuationResult {
    ValuationEngine::with_defaults(catalog).calculate(
        sector_id,
        company_size_tier,
        &metrics.current_year(),
        &metrics.previous_year(),
    )
}

/// Projects a three-year plan from the latest extracted year.
pub fn project_plan(metrics: &FinancialMetricsSet, growth_rate: f64) -> PlanProjection {
    let baseline = PlanBaseline::from_snapshot(&metrics.current_year());
    PlanProjector::default().project(&baseline, growth_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(label: &str, current: &str, previous: &str) -> Row {
        vec![
            label.into(),
            CellValue::Empty,
            CellValue::Empty,
            current.into(),
            previous.into(),
        ]
    }

    fn workbook() -> Workbook {
        let header = row("Descrizione", "2023", "2022");
        Workbook::new(vec![
            RawSheet::new(
                "Stato Patrimoniale",
                vec![
                    header.clone(),
                    row("Totale disponibilità liquide", "80.000", "60.000"),
                    row("Totale attivo", "1.000.000", "950.000"),
                    row("Totale patrimonio netto", "400.000", "360.000"),
                    row("Debiti verso banche entro l'esercizio", "70.000", "75.000"),
                    row("Debiti verso banche oltre l'esercizio", "60.000", "65.000"),
                ],
            ),
            RawSheet::new(
                "Conto Economico",
                vec![
                    header,
                    row("Ricavi delle vendite e delle prestazioni", "1.150.000", "1.000.000"),
                    row("Margine operativo lordo (EBITDA)", "100.000", "90.000"),
                    row("Utile (perdita) dell'esercizio", "35.000", "30.000"),
                ],
            ),
        ])
    }

    #[test]
    fn test_end_to_end_valuation() {
        let catalog = SectorCatalog::builtin().unwrap();
        let metrics = extract_metrics(&workbook()).unwrap();
        assert_eq!(metrics.get(keys::EBITDA).current_year, Some(100_000.0));

        let result = value_company(&catalog, "manifatturiero_generale", "piccola", &metrics);
        assert_eq!(result.fair_market_value, 635_392.0);
        assert!(result.conservative_value < result.fair_market_value);
        assert!(result.optimistic_value > result.fair_market_value);
    }

    #[test]
    fn test_valuation_is_deterministic() {
        let catalog = SectorCatalog::builtin().unwrap();
        let metrics = extract_metrics(&workbook()).unwrap();
        let first = value_company(&catalog, "alimentare", "media", &metrics);
        let second = value_company(&catalog, "alimentare", "media", &metrics);
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_from_extracted_metrics() {
        let metrics = extract_metrics(&workbook()).unwrap();
        let plan = project_plan(&metrics, 0.05);
        assert!(plan.anno3.ricavi > plan.anno1.ricavi);
        assert_eq!(plan.sensibilita.len(), 3);
    }
}
