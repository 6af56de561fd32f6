//! Label catalog for the line items read from Italian civil-code statements.
//!
//! Configs for a metric are ordered from the most specific wording to the
//! loosest; the matcher stops at the first config that yields a value.

use crate::error::{AnalysisError, Result};
use crate::matcher::MetricSearchConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const CATALOG_VERSION: u32 = 1;

pub mod keys {
    pub const FATTURATO: &str = "fatturato";
    pub const VALORE_PRODUZIONE: &str = "valoreProduzione";
    pub const COSTI_PRODUZIONE: &str = "costiProduzione";
    pub const MATERIE_PRIME: &str = "materiePrime";
    pub const SERVIZI: &str = "servizi";
    pub const GODIMENTO: &str = "godimento";
    pub const COSTI_PERSONALE: &str = "costiPersonale";
    pub const AMMORTAMENTI: &str = "ammortamenti";
    pub const ONERI_DIVERSI: &str = "oneriDiversi";
    pub const EBITDA: &str = "ebitda";
    pub const RISULTATO_OPERATIVO: &str = "risultatoOperativo";
    pub const ONERI_FINANZIARI: &str = "oneriFinanziari";
    pub const UTILE_PERDITA: &str = "utilePerdita";
    pub const TOTALE_ATTIVO: &str = "totaleAttivo";
    pub const PATRIMONIO_NETTO: &str = "patrimonioNetto";
    pub const ATTIVO_CIRCOLANTE: &str = "attivoCircolante";
    pub const DISPONIBILITA_LIQUIDE: &str = "disponibilitaLiquide";
    pub const DEBITI_BREVE: &str = "debitiBreve";
    pub const DEBITI_LUNGO: &str = "debitiLungo";
    pub const DEBITI_ENTRO_ESERCIZIO: &str = "debitiEntroEsercizio";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SheetSource {
    IncomeStatement,
    BalanceSheet,
    /// Tried on the income statement first; some layouts only show the
    /// figure inside the equity breakdown of the balance sheet.
    IncomeThenBalance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricDefinition {
    pub key: String,
    pub source: SheetSource,
    pub configs: Vec<MetricSearchConfig>,
}

impl MetricDefinition {
    fn new(key: &str, source: SheetSource, configs: Vec<MetricSearchConfig>) -> Self {
        Self {
            key: key.to_string(),
            source,
            configs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricCatalog {
    pub version: u32,
    pub definitions: Vec<MetricDefinition>,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl MetricCatalog {
    pub fn standard() -> Self {
        use self::keys::*;
        use self::SheetSource::*;
        use crate::matcher::MetricSearchConfig as C;

        let definitions = vec![
            MetricDefinition::new(
                FATTURATO,
                IncomeStatement,
                vec![
                    C::primary(&["ricavi delle vendite"]),
                    C::primary(&["ricavi vendite"]),
                    C::new(&["valore della produzione"], &["costi"]),
                    C::primary(&["totale ricavi"]),
                ],
            ),
            MetricDefinition::new(
                VALORE_PRODUZIONE,
                IncomeStatement,
                vec![
                    C::primary(&["totale valore della produzione"]),
                    C::new(&["valore della produzione"], &["costi"]),
                ],
            ),
            MetricDefinition::new(
                COSTI_PRODUZIONE,
                IncomeStatement,
                vec![
                    C::primary(&["totale costi della produzione"]),
                    C::new(&["costi della produzione"], &["differenza"]),
                ],
            ),
            MetricDefinition::new(
                MATERIE_PRIME,
                IncomeStatement,
                vec![
                    C::new(&["per materie prime"], &["variazion"]),
                    C::new(&["materie prime"], &["variazion", "rimanenze"]),
                ],
            ),
            MetricDefinition::new(
                SERVIZI,
                IncomeStatement,
                vec![C::primary(&["per servizi"]), C::primary(&["costi per servizi"])],
            ),
            MetricDefinition::new(
                GODIMENTO,
                IncomeStatement,
                vec![
                    C::primary(&["godimento di beni di terzi"]),
                    C::primary(&["godimento beni"]),
                ],
            ),
            MetricDefinition::new(
                COSTI_PERSONALE,
                IncomeStatement,
                vec![
                    C::primary(&["totale costi per il personale"]),
                    C::primary(&["per il personale"]),
                    C::primary(&["costi del personale"]),
                ],
            ),
            MetricDefinition::new(
                AMMORTAMENTI,
                IncomeStatement,
                vec![
                    C::primary(&["totale ammortamenti e svalutazioni"]),
                    C::primary(&["ammortamenti e svalutazioni"]),
                    C::new(&["ammortament"], &["fondo"]),
                ],
            ),
            MetricDefinition::new(
                ONERI_DIVERSI,
                IncomeStatement,
                vec![
                    C::primary(&["oneri diversi di gestione"]),
                    C::primary(&["oneri diversi"]),
                ],
            ),
            MetricDefinition::new(
                EBITDA,
                IncomeStatement,
                vec![
                    C::primary(&["ebitda"]),
                    C::primary(&["margine operativo lordo"]),
                ],
            ),
            MetricDefinition::new(
                RISULTATO_OPERATIVO,
                IncomeStatement,
                vec![
                    C::primary(&["differenza tra valore e costi della produzione"]),
                    C::primary(&["risultato operativo"]),
                    C::new(&["ebit"], &["ebitda", "debit"]),
                ],
            ),
            MetricDefinition::new(
                ONERI_FINANZIARI,
                IncomeStatement,
                vec![
                    C::primary(&["interessi e altri oneri finanziari"]),
                    C::new(&["oneri finanziari"], &["proventi"]),
                ],
            ),
            MetricDefinition::new(
                UTILE_PERDITA,
                IncomeThenBalance,
                vec![
                    C::new(&["utile", "esercizio"], &["a nuovo", "prima delle imposte"]),
                    C::new(&["risultato", "esercizio"], &["a nuovo", "prima delle imposte"]),
                    C::primary(&["risultato netto"]),
                ],
            ),
            MetricDefinition::new(
                TOTALE_ATTIVO,
                BalanceSheet,
                vec![C::new(&["totale attivo"], &["circolante"])],
            ),
            MetricDefinition::new(
                PATRIMONIO_NETTO,
                BalanceSheet,
                vec![
                    C::primary(&["totale patrimonio netto"]),
                    C::new(&["patrimonio netto"], &["passivo"]),
                ],
            ),
            MetricDefinition::new(
                ATTIVO_CIRCOLANTE,
                BalanceSheet,
                vec![
                    C::primary(&["totale attivo circolante"]),
                    C::primary(&["attivo circolante"]),
                ],
            ),
            MetricDefinition::new(
                DISPONIBILITA_LIQUIDE,
                BalanceSheet,
                vec![
                    C::primary(&["totale disponibilità liquide"]),
                    C::primary(&["disponibilità liquide"]),
                    C::primary(&["disponibilita liquide"]),
                    C::primary(&["cassa e banche"]),
                ],
            ),
            MetricDefinition::new(
                DEBITI_BREVE,
                BalanceSheet,
                vec![
                    C::primary(&["debiti verso banche", "entro"]),
                    C::primary(&["debiti finanziari a breve"]),
                    C::new(&["debiti a breve"], &["fornitori"]),
                ],
            ),
            MetricDefinition::new(
                DEBITI_LUNGO,
                BalanceSheet,
                vec![
                    C::primary(&["debiti verso banche", "oltre"]),
                    C::primary(&["debiti finanziari a lungo"]),
                    C::primary(&["debiti a medio"]),
                    C::new(&["mutui"], &["crediti"]),
                ],
            ),
            MetricDefinition::new(
                DEBITI_ENTRO_ESERCIZIO,
                BalanceSheet,
                vec![
                    C::primary(&["totale debiti", "entro"]),
                    C::new(&["debiti", "esigibili entro"], &["banche", "crediti"]),
                ],
            ),
        ];

        Self {
            version: CATALOG_VERSION,
            definitions,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for definition in &self.definitions {
            if !seen.insert(definition.key.as_str()) {
                return Err(AnalysisError::InvalidCatalog(format!(
                    "duplicate metric key '{}'",
                    definition.key
                )));
            }
            if definition.configs.iter().any(|c| c.primary.is_empty()) {
                return Err(AnalysisError::InvalidCatalog(format!(
                    "metric '{}' has a search config without primary terms",
                    definition.key
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&MetricDefinition> {
        self.definitions.iter().find(|d| d.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_is_valid() {
        let catalog = MetricCatalog::standard();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.version, CATALOG_VERSION);
        assert!(catalog.definitions.len() >= 13);
        assert_eq!(
            catalog.get(keys::UTILE_PERDITA).unwrap().source,
            SheetSource::IncomeThenBalance
        );
    }

    #[test]
    fn test_revenue_fallback_excludes_costs() {
        let catalog = MetricCatalog::standard();
        let fatturato = catalog.get(keys::FATTURATO).unwrap();
        let costs_row = "b) costi della produzione, al netto del valore della produzione";
        assert!(!fatturato.configs.iter().any(|c| c.matches(costs_row)));
        assert!(fatturato.configs.iter().any(|c| c.matches("a) valore della produzione")));
    }

    #[test]
    fn test_equity_does_not_match_liabilities_total() {
        let catalog = MetricCatalog::standard();
        let equity = catalog.get(keys::PATRIMONIO_NETTO).unwrap();
        assert!(!equity
            .configs
            .iter()
            .any(|c| c.matches("totale passivo e patrimonio netto")));
    }

    #[test]
    fn test_operating_result_ignores_debt_rows() {
        let catalog = MetricCatalog::standard();
        let ebit = catalog.get(keys::RISULTATO_OPERATIVO).unwrap();
        assert!(!ebit.configs.iter().any(|c| c.matches("c.17) interessi passivi su debiti")));
        assert!(!ebit.configs.iter().any(|c| c.matches("margine operativo lordo (ebitda)")));
        assert!(ebit.configs.iter().any(|c| c.matches("risultato operativo (ebit)")));
        assert!(ebit.configs.iter().any(|c| c.matches("ebit")));
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let mut catalog = MetricCatalog::standard();
        let first = catalog.definitions[0].clone();
        catalog.definitions.push(first);
        assert!(matches!(
            catalog.validate(),
            Err(AnalysisError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn test_catalog_json_round_trip() {
        let json = serde_json::to_string(&MetricCatalog::standard()).unwrap();
        let loaded = MetricCatalog::from_json(&json).unwrap();
        assert_eq!(loaded, MetricCatalog::standard());
    }
}
