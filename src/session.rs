//! Session records and the end-to-end analysis pipeline.
//!
//! Storage is an external collaborator behind [`RecordStore`]; a record is
//! written once per session id and never updated in place.

use crate::catalog::keys;
use crate::error::{AnalysisError, Result};
use crate::extractor::MetricsExtractor;
use crate::plan::{PlanBaseline, PlanProjection, PlanProjector};
use crate::ratios::FinancialRatios;
use crate::schema::FinancialMetricsSet;
use crate::sectors::SectorCatalog;
use crate::valuation::{SizeTier, ValuationEngine, ValuationResult};
use crate::workbook::Workbook;
use chrono::{DateTime, Utc};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    #[schemars(description = "ATECO classification code, e.g. 25.62.00")]
    pub ateco_code: Option<String>,
    pub region: Option<String>,
    pub macro_sector: Option<String>,
    #[schemars(description = "micro | piccola | media | grande; derived from revenue when absent")]
    pub size_tier: Option<String>,
    #[schemars(description = "Explicit sector id; takes precedence over the ATECO mapping")]
    pub sector_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub context: SessionContext,
    pub metrics: FinancialMetricsSet,
    pub ratios: FinancialRatios,
    pub valuation: ValuationResult,
    pub plan: Option<PlanProjection>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SessionRecord)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

pub trait RecordStore {
    fn load(&self, session_id: &str) -> Result<Option<SessionRecord>>;
    fn save(&mut self, record: &SessionRecord) -> Result<()>;
}

/// Keeps records as serialized JSON, the way a document store would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.records
            .get(session_id)
            .map(|json| serde_json::from_str(json).map_err(AnalysisError::from))
            .transpose()
    }

    fn save(&mut self, record: &SessionRecord) -> Result<()> {
        if self.records.contains_key(&record.session_id) {
            return Err(AnalysisError::InvalidConfig(format!(
                "session {} already has a record; re-analysis needs a new session id",
                record.session_id
            )));
        }
        let json = serde_json::to_string(record)?;
        self.records.insert(record.session_id.clone(), json);
        Ok(())
    }
}

pub struct AnalysisPipeline<'a> {
    catalog: &'a SectorCatalog,
    extractor: MetricsExtractor,
    valuation: ValuationEngine<'a>,
    projector: PlanProjector,
}

impl<'a> AnalysisPipeline<'a> {
    pub fn new(catalog: &'a SectorCatalog) -> Self {
        Self::with_components(
            catalog,
            MetricsExtractor::default(),
            ValuationEngine::with_defaults(catalog),
            PlanProjector::default(),
        )
    }

    pub fn with_components(
        catalog: &'a SectorCatalog,
        extractor: MetricsExtractor,
        valuation: ValuationEngine<'a>,
        projector: PlanProjector,
    ) -> Self {
        Self {
            catalog,
            extractor,
            valuation,
            projector,
        }
    }

    /// Explicit sector id, then ATECO mapping, then the catalog default.
    pub fn resolve_sector(&self, context: &SessionContext) -> String {
        if let Some(id) = context.sector_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return id.to_string();
        }
        if let Some(profile) = context
            .ateco_code
            .as_deref()
            .and_then(|code| self.catalog.for_ateco(code))
        {
            debug!(
                "ATECO {:?} mapped to sector '{}'",
                context.ateco_code, profile.id
            );
            return profile.id.clone();
        }
        self.catalog.default_profile().id.clone()
    }

    fn resolve_size_tier(&self, context: &SessionContext, metrics: &FinancialMetricsSet) -> String {
        if let Some(tier) = context.size_tier.as_deref() {
            return tier.to_string();
        }
        metrics
            .get(keys::FATTURATO)
            .current_year
            .map(|revenue| SizeTier::from_revenue(revenue).as_str().to_string())
            .unwrap_or_default()
    }

    /// Values already-extracted metrics.
    pub fn value(&self, context: &SessionContext, metrics: &FinancialMetricsSet) -> ValuationResult {
        let sector_id = self.resolve_sector(context);
        let size_tier = self.resolve_size_tier(context, metrics);
        self.valuation.calculate(
            &sector_id,
            &size_tier,
            &metrics.current_year(),
            &metrics.previous_year(),
        )
    }

    /// Extraction, valuation and optional plan for one workbook.
    pub fn analyze(
        &self,
        session_id: &str,
        context: SessionContext,
        workbook: &Workbook,
        plan_growth_rate: Option<f64>,
    ) -> Result<SessionRecord> {
        let metrics = self.extractor.extract_workbook(workbook)?;
        let current = metrics.current_year();
        let ratios = FinancialRatios::from_snapshots(&current, &metrics.previous_year());
        let valuation = self.value(&context, &metrics);
        let plan = plan_growth_rate
            .map(|rate| self.projector.project(&PlanBaseline::from_snapshot(&current), rate));

        info!(
            "Session {}: fair market value {:.0}",
            session_id, valuation.fair_market_value
        );

        Ok(SessionRecord {
            session_id: session_id.to_string(),
            context,
            metrics,
            ratios,
            valuation,
            plan,
            created_at: Utc::now(),
        })
    }

    /// Parses the uploaded bytes, analyzes them and persists the record.
    pub fn run<S: RecordStore>(
        &self,
        store: &mut S,
        session_id: &str,
        context: SessionContext,
        workbook_bytes: &[u8],
        plan_growth_rate: Option<f64>,
    ) -> Result<SessionRecord> {
        let workbook = Workbook::from_bytes(workbook_bytes)?;
        let record = self.analyze(session_id, context, &workbook, plan_growth_rate)?;
        store.save(&record)?;
        Ok(record)
    }

    /// Recomputes the valuation of a stored session without touching it.
    pub fn revalue<S: RecordStore>(&self, store: &S, session_id: &str) -> Result<ValuationResult> {
        let record = store
            .load(session_id)?
            .ok_or_else(|| AnalysisError::SessionNotFound(session_id.to_string()))?;
        if record.metrics.metrics.is_empty() {
            return Err(AnalysisError::MissingMetrics(session_id.to_string()));
        }
        Ok(self.value(&record.context, &record.metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MetricValue;
    use crate::workbook::{CellValue, RawSheet};

    fn catalog() -> SectorCatalog {
        SectorCatalog::builtin().unwrap()
    }

    fn sheet(name: &str, lines: &[(&str, &str, &str)]) -> RawSheet {
        let rows = lines
            .iter()
            .map(|(label, current, previous)| {
                vec![
                    (*label).into(),
                    CellValue::Empty,
                    CellValue::Empty,
                    (*current).into(),
                    (*previous).into(),
                ]
            })
            .collect();
        RawSheet::new(name, rows)
    }

    fn workbook() -> Workbook {
        Workbook::new(vec![
            sheet(
                "Stato Patrimoniale",
                &[
                    ("Voce", "2023", "2022"),
                    ("Totale attivo", "1.234.567", "1.100.000"),
                    ("Totale patrimonio netto", "433.333", "400.000"),
                    ("Debiti verso banche entro l'esercizio", "77.777", "80.000"),
                ],
            ),
            sheet(
                "Conto Economico",
                &[
                    ("Voce", "2023", "2022"),
                    ("Ricavi delle vendite", "1.102.500", "1.050.000"),
                    ("Totale costi per il personale", "333.333", "320.000"),
                    ("Totale ammortamenti e svalutazioni", "41.111", "40.000"),
                    ("Differenza tra valore e costi della produzione", "74.651,39", "70.000"),
                    ("Interessi e altri oneri finanziari", "(7.883,33)", "(8.000)"),
                    ("Utile (perdita) dell'esercizio", "39.999", "35.000"),
                ],
            ),
        ])
    }

    #[test]
    fn test_store_returns_the_computed_record_exactly() {
        let catalog = catalog();
        let pipeline = AnalysisPipeline::new(&catalog);
        let mut record = pipeline
            .analyze("sess-float", SessionContext::default(), &workbook(), Some(0.035))
            .unwrap();
        record.metrics.insert(
            keys::ONERI_DIVERSI,
            MetricValue::new(Some(115_762.499_999_999_99), Some(9.470_312_499_999_999)),
        );

        let mut store = MemoryStore::new();
        store.save(&record).unwrap();
        let stored = store.load("sess-float").unwrap().unwrap();

        assert_eq!(stored, record);
        let value = stored.metrics.get(keys::ONERI_DIVERSI);
        assert_eq!(
            value.current_year.map(f64::to_bits),
            Some(115_762.499_999_999_99_f64.to_bits())
        );
        assert_eq!(
            value.previous_year.map(f64::to_bits),
            Some(9.470_312_499_999_999_f64.to_bits())
        );
    }

    #[test]
    fn test_same_session_is_saved_once() {
        let catalog = catalog();
        let pipeline = AnalysisPipeline::new(&catalog);
        let record = pipeline
            .analyze("sess-once", SessionContext::default(), &workbook(), None)
            .unwrap();

        let mut store = MemoryStore::new();
        store.save(&record).unwrap();
        assert!(matches!(store.save(&record), Err(AnalysisError::InvalidConfig(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sector_resolution_order() {
        let catalog = catalog();
        let pipeline = AnalysisPipeline::new(&catalog);

        let explicit = SessionContext {
            sector_id: Some("software_it".to_string()),
            ateco_code: Some("41.20".to_string()),
            ..SessionContext::default()
        };
        assert_eq!(pipeline.resolve_sector(&explicit), "software_it");

        let by_ateco = SessionContext {
            ateco_code: Some("41.20".to_string()),
            ..SessionContext::default()
        };
        assert_eq!(pipeline.resolve_sector(&by_ateco), "costruzioni");

        assert_eq!(
            pipeline.resolve_sector(&SessionContext::default()),
            "manifatturiero_generale"
        );
    }

    #[test]
    fn test_size_tier_derived_from_revenue() {
        let catalog = catalog();
        let pipeline = AnalysisPipeline::new(&catalog);
        let mut metrics = FinancialMetricsSet::new();
        metrics.insert(keys::FATTURATO, MetricValue::new(Some(5_000_000.0), None));
        metrics.insert(keys::EBITDA, MetricValue::new(Some(500_000.0), None));

        let result = pipeline.value(&SessionContext::default(), &metrics);
        assert_eq!(result.calculation_details.size_tier, Some(SizeTier::Piccola));
    }

    #[test]
    fn test_revalue_unknown_session_is_an_error() {
        let catalog = catalog();
        let pipeline = AnalysisPipeline::new(&catalog);
        let store = MemoryStore::new();
        assert!(matches!(
            pipeline.revalue(&store, "missing"),
            Err(AnalysisError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = SessionRecord::schema_as_json().unwrap();
        assert!(schema_json.contains("sessionId"));
        assert!(schema_json.contains("fairMarketValue"));
        assert!(schema_json.contains("sensibilita"));
    }
}
