//! Three-year plan projection and revenue sensitivity.
//!
//! Revenue compounds at the growth rate; operating costs keep their year-0
//! ratio to revenue; amortization, financial charges and balance-sheet
//! magnitudes stay at their year-0 amounts.

use crate::catalog::keys;
use crate::error::{AnalysisError, Result};
use crate::ratios::{financial_debt, percent, ratio};
use crate::schema::YearSnapshot;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanLines {
    pub ricavi: f64,
    pub costi_personale: f64,
    pub materie_prime: f64,
    pub servizi: f64,
    pub godimento: f64,
    pub oneri_diversi: f64,
    pub ammortamenti: f64,
    pub oneri_finanziari: f64,
    pub utile_netto: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanYear {
    pub ricavi: f64,
    pub costi_personale: f64,
    pub materie_prime: f64,
    pub servizi: f64,
    pub godimento: f64,
    pub oneri_diversi: f64,
    pub ebitda: f64,
    pub ammortamenti: f64,
    pub ebit: f64,
    pub oneri_finanziari: f64,
    pub utile_netto: f64,
    pub margine_ebitda: f64,
    pub margine_ebit: f64,
    pub margine_netto: f64,
}

fn margin(value: f64, revenue: f64) -> f64 {
    if revenue > 0.0 {
        value / revenue * 100.0
    } else {
        0.0
    }
}

impl PlanYear {
    /// Builds a year from its cost lines, deriving EBITDA, EBIT and margins.
    pub fn from_lines(lines: PlanLines) -> Self {
        let costs = lines.costi_personale
            + lines.materie_prime
            + lines.servizi
            + lines.godimento
            + lines.oneri_diversi;
        let ebitda = lines.ricavi - costs;
        let ebit = ebitda - lines.ammortamenti;

        Self {
            ricavi: lines.ricavi,
            costi_personale: lines.costi_personale,
            materie_prime: lines.materie_prime,
            servizi: lines.servizi,
            godimento: lines.godimento,
            oneri_diversi: lines.oneri_diversi,
            ebitda,
            ammortamenti: lines.ammortamenti,
            ebit,
            oneri_finanziari: lines.oneri_finanziari,
            utile_netto: lines.utile_netto,
            margine_ebitda: margin(ebitda, lines.ricavi),
            margine_ebit: margin(ebit, lines.ricavi),
            margine_netto: margin(lines.utile_netto, lines.ricavi),
        }
    }

    /// Maps an extracted year to plan lines. Cost lines are taken as positive
    /// amounts. When EBITDA was extracted, `oneri_diversi` absorbs whatever
    /// operating cost is not itemized so that the year reproduces it.
    pub fn from_snapshot(year: &YearSnapshot) -> Self {
        let cost = |key: &str| year.get(key).map(f64::abs).unwrap_or(0.0);

        let ricavi = year
            .get(keys::FATTURATO)
            .or_else(|| year.get(keys::VALORE_PRODUZIONE))
            .unwrap_or(0.0);
        let costi_personale = cost(keys::COSTI_PERSONALE);
        let materie_prime = cost(keys::MATERIE_PRIME);
        let servizi = cost(keys::SERVIZI);
        let godimento = cost(keys::GODIMENTO);
        let itemized = costi_personale + materie_prime + servizi + godimento;

        let oneri_diversi = match year.get(keys::EBITDA) {
            Some(ebitda) => ricavi - ebitda - itemized,
            None => cost(keys::ONERI_DIVERSI),
        };

        Self::from_lines(PlanLines {
            ricavi,
            costi_personale,
            materie_prime,
            servizi,
            godimento,
            oneri_diversi,
            ammortamenti: cost(keys::AMMORTAMENTI),
            oneri_finanziari: cost(keys::ONERI_FINANZIARI),
            utile_netto: year.get(keys::UTILE_PERDITA).unwrap_or(0.0),
        })
    }

    fn pre_tax(&self) -> f64 {
        self.ebit - self.oneri_finanziari
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanBaseline {
    pub year0: PlanYear,
    /// Financial debt, held constant across the plan.
    pub debt: f64,
    pub equity: f64,
    pub total_assets: f64,
}

impl PlanBaseline {
    pub fn from_snapshot(year: &YearSnapshot) -> Self {
        Self {
            year0: PlanYear::from_snapshot(year),
            debt: financial_debt(year).unwrap_or(0.0),
            equity: year.get(keys::PATRIMONIO_NETTO).unwrap_or(0.0),
            total_assets: year.get(keys::TOTALE_ATTIVO).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Assessment {
    Sostenibile,
    Monitorare,
    Critico,
}

/// Breakpoints for the debt-sustainability assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AssessmentThresholds {
    pub sustainable_max_leverage: f64,
    pub sustainable_min_coverage: f64,
    pub critical_leverage_above: f64,
    pub critical_coverage_below: f64,
}

impl Default for AssessmentThresholds {
    fn default() -> Self {
        Self {
            sustainable_max_leverage: 3.0,
            sustainable_min_coverage: 3.0,
            critical_leverage_above: 5.0,
            critical_coverage_below: 1.5,
        }
    }
}

impl AssessmentThresholds {
    /// A missing leverage means non-positive EBITDA and is critical; a
    /// missing coverage means no financial charges and never penalizes.
    pub fn classify(&self, leverage: Option<f64>, interest_coverage: Option<f64>) -> Assessment {
        let Some(leverage) = leverage else {
            return Assessment::Critico;
        };
        let coverage = interest_coverage.unwrap_or(f64::INFINITY);

        if leverage > self.critical_leverage_above || coverage < self.critical_coverage_below {
            Assessment::Critico
        } else if leverage <= self.sustainable_max_leverage
            && coverage >= self.sustainable_min_coverage
        {
            Assessment::Sostenibile
        } else {
            Assessment::Monitorare
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PlanConfig {
    /// Revenue shift of the sensitivity scenarios (fraction).
    pub sensitivity_delta: f64,
    /// Used when year 0 has no positive pre-tax result to infer a tax rate from.
    pub default_tax_rate: f64,
    pub assessment: AssessmentThresholds,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            sensitivity_delta: 0.10,
            default_tax_rate: 0.24,
            assessment: AssessmentThresholds::default(),
        }
    }
}

impl PlanConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.sensitivity_delta) {
            return Err(AnalysisError::InvalidConfig(format!(
                "sensitivity delta {} is outside [0, 1)",
                self.sensitivity_delta
            )));
        }
        if !(0.0..1.0).contains(&self.default_tax_rate) {
            return Err(AnalysisError::InvalidConfig(format!(
                "tax rate {} is outside [0, 1)",
                self.default_tax_rate
            )));
        }
        let a = &self.assessment;
        if a.sustainable_max_leverage > a.critical_leverage_above
            || a.sustainable_min_coverage < a.critical_coverage_below
        {
            return Err(AnalysisError::InvalidConfig(
                "sustainable thresholds must be stricter than critical ones".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanKpi {
    /// Revenue CAGR from year 0 to year 3, percent.
    pub cagr: Option<f64>,
    pub avg_ebitda_margin: f64,
    /// Debt / EBITDA in year 3.
    pub leverage: Option<f64>,
    /// EBIT / financial charges in year 3.
    pub interest_coverage: Option<f64>,
    pub roe: Option<f64>,
    pub roi: Option<f64>,
    pub assessment: Assessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SensitivityScenario {
    pub scenario: String,
    pub ricavi: f64,
    pub ebitda: f64,
    pub margine_ebitda: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanProjection {
    pub anno1: PlanYear,
    pub anno2: PlanYear,
    pub anno3: PlanYear,
    pub kpi: PlanKpi,
    pub sensibilita: Vec<SensitivityScenario>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanProjector {
    config: PlanConfig,
}

impl PlanProjector {
    pub fn new(config: PlanConfig) -> Self {
        Self { config }
    }

    /// `growth_rate` is a fraction per year (0.05 = +5%).
    pub fn project(&self, baseline: &PlanBaseline, growth_rate: f64) -> PlanProjection {
        let growth_rate = if growth_rate < -1.0 {
            warn!("Growth rate {} below -100%, clamping to -1.0", growth_rate);
            -1.0
        } else {
            growth_rate
        };

        let year0 = &baseline.year0;
        let tax_rate = self.effective_tax_rate(year0);

        let anno1 = project_year(year0, year0, growth_rate, tax_rate);
        let anno2 = project_year(year0, &anno1, growth_rate, tax_rate);
        let anno3 = project_year(year0, &anno2, growth_rate, tax_rate);

        let kpi = self.kpi(baseline, [&anno1, &anno2, &anno3]);
        let sensibilita = self.sensitivity(&anno3);

        debug!(
            "Projected revenue {:.0} -> {:.0} at {:.2}% growth, assessment {:?}",
            year0.ricavi,
            anno3.ricavi,
            growth_rate * 100.0,
            kpi.assessment
        );

        PlanProjection {
            anno1,
            anno2,
            anno3,
            kpi,
            sensibilita,
        }
    }

    fn effective_tax_rate(&self, year0: &PlanYear) -> f64 {
        let pre_tax = year0.pre_tax();
        if pre_tax > 0.0 {
            (1.0 - year0.utile_netto / pre_tax).clamp(0.0, 1.0)
        } else {
            self.config.default_tax_rate
        }
    }

    fn kpi(&self, baseline: &PlanBaseline, years: [&PlanYear; 3]) -> PlanKpi {
        let year0 = &baseline.year0;
        let year3 = years[2];

        let cagr = if year0.ricavi > 0.0 && year3.ricavi > 0.0 {
            Some(((year3.ricavi / year0.ricavi).powf(1.0 / 3.0) - 1.0) * 100.0)
        } else {
            None
        };
        let avg_ebitda_margin = years.iter().map(|y| y.margine_ebitda).sum::<f64>() / 3.0;
        let leverage = ratio(Some(baseline.debt), Some(year3.ebitda));
        let interest_coverage = ratio(Some(year3.ebit), Some(year3.oneri_finanziari));
        let roe = percent(Some(year3.utile_netto), Some(baseline.equity));
        let roi = percent(Some(year3.utile_netto), Some(baseline.total_assets));

        PlanKpi {
            cagr,
            avg_ebitda_margin,
            leverage,
            interest_coverage,
            roe,
            roi,
            assessment: self.config.assessment.classify(leverage, interest_coverage),
        }
    }

    fn sensitivity(&self, year3: &PlanYear) -> Vec<SensitivityScenario> {
        let delta = self.config.sensitivity_delta;
        let label = format!("{:.0}%", delta * 100.0);

        [
            (format!("-{}", label), 1.0 - delta),
            ("baseline".to_string(), 1.0),
            (format!("+{}", label), 1.0 + delta),
        ]
        .into_iter()
        .map(|(scenario, scale)| {
            let ricavi = year3.ricavi * scale;
            let ebitda = year3.ebitda * scale;
            SensitivityScenario {
                scenario,
                ricavi,
                ebitda,
                margine_ebitda: margin(ebitda, ricavi),
            }
        })
        .collect()
    }
}

fn project_year(year0: &PlanYear, previous: &PlanYear, growth_rate: f64, tax_rate: f64) -> PlanYear {
    let ricavi = previous.ricavi * (1.0 + growth_rate);
    let scale = if year0.ricavi != 0.0 {
        ricavi / year0.ricavi
    } else {
        1.0
    };

    let ebitda = year0.ebitda * scale;
    let ebit = ebitda - year0.ammortamenti;
    let pre_tax = ebit - year0.oneri_finanziari;
    let utile_netto = year0.utile_netto + (pre_tax - year0.pre_tax()) * (1.0 - tax_rate);

    PlanYear {
        ricavi,
        costi_personale: year0.costi_personale * scale,
        materie_prime: year0.materie_prime * scale,
        servizi: year0.servizi * scale,
        godimento: year0.godimento * scale,
        oneri_diversi: year0.oneri_diversi * scale,
        ebitda,
        ammortamenti: year0.ammortamenti,
        ebit,
        oneri_finanziari: year0.oneri_finanziari,
        utile_netto,
        margine_ebitda: margin(ebitda, ricavi),
        margine_ebit: margin(ebit, ricavi),
        margine_netto: margin(utile_netto, ricavi),
    }
}
