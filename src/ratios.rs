//! Standard ratios derived from the extracted statements.
//!
//! Every ratio is optional: a missing input or a zero/non-positive
//! denominator gives `None` instead of NaN or infinity.

use crate::catalog::keys;
use crate::schema::YearSnapshot;
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialRatios {
    pub ebitda: Option<f64>,
    /// EBITDA / revenue, percent.
    pub ebitda_margin: Option<f64>,
    /// Year-over-year revenue growth, percent.
    pub revenue_growth: Option<f64>,
    pub financial_debt: Option<f64>,
    /// Financial debt minus cash. Negative values mean net cash.
    pub net_financial_position: Option<f64>,
    pub debt_to_ebitda: Option<f64>,
    pub current_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub roi: Option<f64>,
    pub equity_ratio: Option<f64>,
}

impl FinancialRatios {
    pub fn from_snapshots(current: &YearSnapshot, previous: &YearSnapshot) -> Self {
        let revenue = current.get(keys::FATTURATO);
        let ebitda = current.get(keys::EBITDA);
        let financial_debt = financial_debt(current);
        let net_financial_position = net_financial_position(current);

        for (label, denominator) in [
            ("revenue", revenue),
            ("ebitda", ebitda),
            ("total assets", current.get(keys::TOTALE_ATTIVO)),
        ] {
            if denominator.is_some_and(|d| d <= 0.0) {
                warn!("Non-positive {} {:?}: dependent ratios left undefined", label, denominator);
            }
        }

        Self {
            ebitda,
            ebitda_margin: percent(ebitda, revenue),
            revenue_growth: revenue_growth(revenue, previous.get(keys::FATTURATO)),
            financial_debt,
            net_financial_position,
            debt_to_ebitda: ratio(financial_debt, ebitda),
            current_ratio: ratio(
                current.get(keys::ATTIVO_CIRCOLANTE),
                current.get(keys::DEBITI_ENTRO_ESERCIZIO),
            ),
            roe: percent(
                current.get(keys::UTILE_PERDITA),
                current.get(keys::PATRIMONIO_NETTO),
            ),
            roi: percent(
                current.get(keys::RISULTATO_OPERATIVO),
                current.get(keys::TOTALE_ATTIVO),
            ),
            equity_ratio: percent(
                current.get(keys::PATRIMONIO_NETTO),
                current.get(keys::TOTALE_ATTIVO),
            ),
        }
    }
}

/// Short plus long-term bank debt. `None` only when neither is known.
pub fn financial_debt(year: &YearSnapshot) -> Option<f64> {
    match (year.get(keys::DEBITI_BREVE), year.get(keys::DEBITI_LUNGO)) {
        (None, None) => None,
        (short, long) => Some(short.unwrap_or(0.0) + long.unwrap_or(0.0)),
    }
}

pub fn net_financial_position(year: &YearSnapshot) -> Option<f64> {
    let cash = year.get(keys::DISPONIBILITA_LIQUIDE);
    match (financial_debt(year), cash) {
        (None, None) => None,
        (debt, cash) => Some(debt.unwrap_or(0.0) - cash.unwrap_or(0.0)),
    }
}

/// Growth in percent; undefined when the base year is missing or not positive.
pub fn revenue_growth(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    let current = current?;
    let previous = previous.filter(|p| *p > 0.0)?;
    Some((current - previous) / previous * 100.0)
}

pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let denominator = denominator.filter(|d| *d > 0.0)?;
    Some(numerator? / denominator)
}

pub fn percent(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    ratio(numerator, denominator).map(|r| r * 100.0)
}
