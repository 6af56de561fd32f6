use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct YearColumns {
    #[schemars(description = "0-based column holding the most recent fiscal year")]
    pub current_year_col: usize,
    #[schemars(description = "0-based column holding the fiscal year before it")]
    pub previous_year_col: usize,
}

impl YearColumns {
    pub const fn new(current_year_col: usize, previous_year_col: usize) -> Self {
        Self {
            current_year_col,
            previous_year_col,
        }
    }
}

/// Outcome of a year-header scan, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct YearDetection {
    pub columns: YearColumns,
    /// False when the static fallback columns were used.
    pub detected: bool,
    pub current_year: Option<i32>,
    pub previous_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum YearSelector {
    Current,
    Previous,
}

/// Current/previous year pair for one line item. `None` means not found or
/// unparseable; zero is a real value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub current_year: Option<f64>,
    pub previous_year: Option<f64>,
}

impl MetricValue {
    pub const MISSING: MetricValue = MetricValue {
        current_year: None,
        previous_year: None,
    };

    pub const fn new(current_year: Option<f64>, previous_year: Option<f64>) -> Self {
        Self {
            current_year,
            previous_year,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.current_year.is_none() && self.previous_year.is_none()
    }

    pub fn get(&self, year: YearSelector) -> Option<f64> {
        match year {
            YearSelector::Current => self.current_year,
            YearSelector::Previous => self.previous_year,
        }
    }
}

/// Values of every metric for a single fiscal year. Absent metrics are simply
/// not present in the map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct YearSnapshot {
    values: BTreeMap<String, f64>,
}

impl YearSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.set(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for YearSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialMetricsSet {
    #[schemars(description = "Metric name (e.g. fatturato, ebitda, patrimonioNetto) to current/previous year values")]
    pub metrics: BTreeMap<String, MetricValue>,
    pub balance_sheet_years: Option<YearDetection>,
    pub income_statement_years: Option<YearDetection>,
}

impl FinancialMetricsSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetricValue) {
        self.metrics.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> MetricValue {
        self.metrics.get(key).copied().unwrap_or(MetricValue::MISSING)
    }

    pub fn year(&self, year: YearSelector) -> YearSnapshot {
        self.metrics
            .iter()
            .filter_map(|(k, v)| v.get(year).map(|value| (k.clone(), value)))
            .collect()
    }

    pub fn current_year(&self) -> YearSnapshot {
        self.year(YearSelector::Current)
    }

    pub fn previous_year(&self) -> YearSnapshot {
        self.year(YearSelector::Previous)
    }

    /// Keys whose value is missing for both years.
    pub fn missing(&self) -> Vec<&str> {
        self.metrics
            .iter()
            .filter(|(_, v)| v.is_missing())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}
