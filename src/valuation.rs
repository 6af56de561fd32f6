//! Multiples-based valuation.
//!
//! EV = EBITDA x sector multiple, reduced by a liquidity discount for size and
//! sector marketability, then scaled by growth and leverage adjustments.
//! Equity = adjusted EV - net financial position.

use crate::catalog::keys;
use crate::error::{AnalysisError, Result};
use crate::ratios::{financial_debt, net_financial_position, revenue_growth};
use crate::schema::YearSnapshot;
use crate::sectors::{LiquidityTier, SectorCatalog};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SizeTier {
    Micro,
    Piccola,
    Media,
    Grande,
}

impl SizeTier {
    pub const ALL: [SizeTier; 4] = [
        SizeTier::Micro,
        SizeTier::Piccola,
        SizeTier::Media,
        SizeTier::Grande,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "micro" => Some(SizeTier::Micro),
            "piccola" | "small" => Some(SizeTier::Piccola),
            "media" | "medium" => Some(SizeTier::Media),
            "grande" | "large" => Some(SizeTier::Grande),
            _ => None,
        }
    }

    /// Classification by annual revenue (EUR) using the EU SME turnover limits.
    pub fn from_revenue(revenue: f64) -> Self {
        if revenue <= 2_000_000.0 {
            SizeTier::Micro
        } else if revenue <= 10_000_000.0 {
            SizeTier::Piccola
        } else if revenue <= 50_000_000.0 {
            SizeTier::Media
        } else {
            SizeTier::Grande
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeTier::Micro => "micro",
            SizeTier::Piccola => "piccola",
            SizeTier::Media => "media",
            SizeTier::Grande => "grande",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiscountEntry {
    pub size_tier: SizeTier,
    pub liquidity_tier: LiquidityTier,
    /// Fraction of EV removed, in `[0, 1)`.
    pub discount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LiquidityDiscountTable {
    pub entries: Vec<DiscountEntry>,
}

impl Default for LiquidityDiscountTable {
    fn default() -> Self {
        use LiquidityTier::*;
        use SizeTier::*;

        let rows = [
            (Micro, [0.25, 0.30, 0.35]),
            (Piccola, [0.15, 0.20, 0.25]),
            (Media, [0.10, 0.15, 0.20]),
            (Grande, [0.05, 0.10, 0.15]),
        ];

        let entries = rows
            .iter()
            .flat_map(|(size, discounts)| {
                [Liquido, Medio, Illiquido]
                    .into_iter()
                    .zip(discounts.iter())
                    .map(move |(liquidity, discount)| DiscountEntry {
                        size_tier: *size,
                        liquidity_tier: liquidity,
                        discount: *discount,
                    })
            })
            .collect();

        Self { entries }
    }
}

impl LiquidityDiscountTable {
    pub fn lookup(&self, size: SizeTier, liquidity: LiquidityTier) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.size_tier == size && e.liquidity_tier == liquidity)
            .map(|e| e.discount)
    }

    pub fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            if !(0.0..1.0).contains(&entry.discount) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "discount {} for {:?}/{:?} is outside [0, 1)",
                    entry.discount, entry.size_tier, entry.liquidity_tier
                )));
            }
        }
        Ok(())
    }
}

/// Growth adjustment by year-over-year revenue growth (percent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GrowthFactors {
    /// Growth strictly above this earns `strong`.
    pub strong_above: f64,
    pub strong: f64,
    pub solid_from: f64,
    pub solid: f64,
    pub moderate_from: f64,
    pub moderate: f64,
    /// Growth in `[0, moderate_from)`, also used when growth is unknown.
    pub flat: f64,
    pub decline: f64,
}

impl Default for GrowthFactors {
    fn default() -> Self {
        Self {
            strong_above: 20.0,
            strong: 0.12,
            solid_from: 10.0,
            solid: 0.06,
            moderate_from: 3.0,
            moderate: 0.02,
            flat: 0.0,
            decline: -0.20,
        }
    }
}

impl GrowthFactors {
    pub fn factor(&self, growth: Option<f64>) -> f64 {
        match growth {
            None => self.flat,
            Some(g) if g > self.strong_above => self.strong,
            Some(g) if g >= self.solid_from => self.solid,
            Some(g) if g >= self.moderate_from => self.moderate,
            Some(g) if g >= 0.0 => self.flat,
            Some(_) => self.decline,
        }
    }
}

/// Leverage adjustment by financial debt / EBITDA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LeverageFactors {
    pub low_below: f64,
    pub low: f64,
    pub medium_max: f64,
    pub medium: f64,
    pub high: f64,
    pub non_positive_ebitda: f64,
}

impl Default for LeverageFactors {
    fn default() -> Self {
        Self {
            low_below: 2.0,
            low: 0.03,
            medium_max: 4.0,
            medium: -0.05,
            high: -0.15,
            non_positive_ebitda: -0.15,
        }
    }
}

impl LeverageFactors {
    /// `None` ratio means EBITDA was missing or not positive.
    pub fn factor(&self, debt_to_ebitda: Option<f64>) -> f64 {
        match debt_to_ebitda {
            None => self.non_positive_ebitda,
            Some(r) if r < self.low_below => self.low,
            Some(r) if r <= self.medium_max => self.medium,
            Some(_) => self.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ValuationConfig {
    pub growth: GrowthFactors,
    pub leverage: LeverageFactors,
    /// Applied when the size/liquidity pair is unknown.
    pub default_discount: f64,
    pub conservative_factor: f64,
    pub optimistic_factor: f64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            growth: GrowthFactors::default(),
            leverage: LeverageFactors::default(),
            default_discount: 0.225,
            conservative_factor: 0.85,
            optimistic_factor: 1.15,
        }
    }
}

impl ValuationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.default_discount) {
            return Err(AnalysisError::InvalidConfig(format!(
                "default discount {} is outside [0, 1)",
                self.default_discount
            )));
        }
        let g = &self.growth;
        if !(0.0 <= g.moderate_from && g.moderate_from <= g.solid_from && g.solid_from <= g.strong_above) {
            return Err(AnalysisError::InvalidConfig(
                "growth breakpoints must be ordered 0 <= moderate <= solid <= strong".to_string(),
            ));
        }
        if self.leverage.low_below > self.leverage.medium_max {
            return Err(AnalysisError::InvalidConfig(
                "leverage breakpoints must be ordered".to_string(),
            ));
        }
        if !(self.conservative_factor <= 1.0 && 1.0 <= self.optimistic_factor) {
            return Err(AnalysisError::InvalidConfig(
                "scenario factors must bracket 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Every intermediate number of a valuation, in calculation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalculationDetails {
    pub sector_id: String,
    pub sector_name: String,
    pub sector_defaulted: bool,
    pub ev_ebitda_multiple: f64,
    pub ebitda: Option<f64>,
    pub base_enterprise_value: f64,
    pub size_tier: Option<SizeTier>,
    pub liquidity_tier: LiquidityTier,
    pub liquidity_discount: f64,
    pub discount_defaulted: bool,
    pub enterprise_value_post_discount: f64,
    pub revenue_growth: Option<f64>,
    pub growth_factor: f64,
    pub financial_debt: f64,
    pub debt_to_ebitda: Option<f64>,
    pub leverage_factor: f64,
    pub total_adjustment: f64,
    pub adjusted_enterprise_value: f64,
    pub net_financial_position: f64,
    pub equity_value: f64,
    /// EBIT x sector EV/EBIT multiple, reported for comparison only.
    pub ev_ebit_cross_check: Option<f64>,
    pub missing_inputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValuationResult {
    pub fair_market_value: f64,
    pub conservative_value: f64,
    pub optimistic_value: f64,
    pub calculation_details: CalculationDetails,
}

pub struct ValuationEngine<'a> {
    catalog: &'a SectorCatalog,
    discounts: LiquidityDiscountTable,
    config: ValuationConfig,
}

impl<'a> ValuationEngine<'a> {
    pub fn new(
        catalog: &'a SectorCatalog,
        discounts: LiquidityDiscountTable,
        config: ValuationConfig,
    ) -> Self {
        Self {
            catalog,
            discounts,
            config,
        }
    }

    pub fn with_defaults(catalog: &'a SectorCatalog) -> Self {
        Self::new(
            catalog,
            LiquidityDiscountTable::default(),
            ValuationConfig::default(),
        )
    }

    pub fn discount_for(&self, size_tier: Option<SizeTier>, liquidity: LiquidityTier) -> (f64, bool) {
        match size_tier.and_then(|size| self.discounts.lookup(size, liquidity)) {
            Some(discount) => (discount, false),
            None => {
                warn!(
                    "No liquidity discount for size {:?} / liquidity {:?}, using {}",
                    size_tier, liquidity, self.config.default_discount
                );
                (self.config.default_discount, true)
            }
        }
    }

    /// Values the company from the latest year (`data_year_n`), using the
    /// previous year only for revenue growth. Never fails: gaps degrade to the
    /// configured defaults and are listed in `missing_inputs`.
    pub fn calculate(
        &self,
        sector_id: &str,
        company_size_tier: &str,
        data_year_n: &YearSnapshot,
        data_year_n1: &YearSnapshot,
    ) -> ValuationResult {
        let sector = self.catalog.resolve(sector_id);
        let sector_defaulted = self.catalog.get(sector_id).is_none();

        let mut missing_inputs = Vec::new();
        let mut require = |year: &YearSnapshot, key: &str, label: &str| {
            let value = year.get(key);
            if value.is_none() {
                missing_inputs.push(label.to_string());
            }
            value
        };

        let ebitda = require(data_year_n, keys::EBITDA, keys::EBITDA);
        let revenue = require(data_year_n, keys::FATTURATO, keys::FATTURATO);
        let previous_revenue = require(data_year_n1, keys::FATTURATO, "fatturatoAnnoPrecedente");
        if !missing_inputs.is_empty() {
            warn!("Valuation inputs missing: {}", missing_inputs.join(", "));
        }

        // 1-2. base enterprise value; no negative EV from negative EBITDA
        let positive_ebitda = ebitda.filter(|e| *e > 0.0);
        let base_enterprise_value = positive_ebitda.unwrap_or(0.0) * sector.ev_ebitda_multiple;

        // 3. liquidity discount
        let size_tier = SizeTier::parse(company_size_tier);
        let (liquidity_discount, discount_defaulted) =
            self.discount_for(size_tier, sector.liquidity_tier);
        let enterprise_value_post_discount = base_enterprise_value * (1.0 - liquidity_discount);

        // 4. adjustments
        let growth = revenue_growth(revenue, previous_revenue);
        let growth_factor = self.config.growth.factor(growth);

        let debt = financial_debt(data_year_n).unwrap_or(0.0);
        let debt_to_ebitda = positive_ebitda.map(|e| debt / e);
        let leverage_factor = self.config.leverage.factor(debt_to_ebitda);

        let total_adjustment = growth_factor + leverage_factor;
        let adjusted_enterprise_value = enterprise_value_post_discount * (1.0 + total_adjustment);

        // 5. equity bridge
        let nfp = net_financial_position(data_year_n).unwrap_or(0.0);
        let equity_value = adjusted_enterprise_value - nfp;

        let ev_ebit_cross_check = data_year_n
            .get(keys::RISULTATO_OPERATIVO)
            .map(|ebit| ebit * sector.ev_ebit_multiple);

        debug!(
            "EV base {:.2} -> post discount {:.2} -> adjusted {:.2} (growth {:+.2}, leverage {:+.2})",
            base_enterprise_value,
            enterprise_value_post_discount,
            adjusted_enterprise_value,
            growth_factor,
            leverage_factor
        );
        info!(
            "Valued company in sector '{}': equity value {:.0}",
            sector.id, equity_value
        );

        // band widths scale with |equity| so conservative <= fair <= optimistic
        let magnitude = equity_value.abs();
        let conservative_value =
            equity_value - magnitude * (1.0 - self.config.conservative_factor);
        let optimistic_value = equity_value + magnitude * (self.config.optimistic_factor - 1.0);

        ValuationResult {
            fair_market_value: equity_value.round(),
            conservative_value: conservative_value.round(),
            optimistic_value: optimistic_value.round(),
            calculation_details: CalculationDetails {
                sector_id: sector.id.clone(),
                sector_name: sector.name.clone(),
                sector_defaulted,
                ev_ebitda_multiple: sector.ev_ebitda_multiple,
                ebitda,
                base_enterprise_value,
                size_tier,
                liquidity_tier: sector.liquidity_tier,
                liquidity_discount,
                discount_defaulted,
                enterprise_value_post_discount,
                revenue_growth: growth,
                growth_factor,
                financial_debt: debt,
                debt_to_ebitda,
                leverage_factor,
                total_adjustment,
                adjusted_enterprise_value,
                net_financial_position: nfp,
                equity_value,
                ev_ebit_cross_check,
                missing_inputs,
            },
        }
    }
}
