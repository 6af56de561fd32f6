//! Benchmark multiples for Italian industry sectors.
//!
//! The bundled catalog is read-only reference data. Lookups of unknown ids
//! resolve to the catalog's default profile instead of failing.

use crate::error::{AnalysisError, Result};
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const BUILTIN_CATALOG: &str = include_str!("../data/sectors.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTier {
    Liquido,
    Medio,
    Illiquido,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SectorProfile {
    pub id: String,
    pub name: String,
    pub ev_ebitda_multiple: f64,
    pub ev_ebit_multiple: f64,
    pub liquidity_tier: LiquidityTier,
    /// ATECO division or group prefixes, digits only (e.g. "25", "2562").
    #[serde(default)]
    pub ateco_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SectorCatalogFile {
    pub version: String,
    pub default_sector: String,
    pub sectors: Vec<SectorProfile>,
}

#[derive(Debug, Clone)]
pub struct SectorCatalog {
    version: String,
    default_index: usize,
    sectors: Vec<SectorProfile>,
}

impl SectorCatalog {
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: SectorCatalogFile = serde_json::from_str(json)?;
        Self::from_file(file)
    }

    pub fn from_file(file: SectorCatalogFile) -> Result<Self> {
        if file.sectors.is_empty() {
            return Err(AnalysisError::InvalidCatalog(
                "sector catalog is empty".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for sector in &file.sectors {
            if !ids.insert(sector.id.as_str()) {
                return Err(AnalysisError::InvalidCatalog(format!(
                    "duplicate sector id '{}'",
                    sector.id
                )));
            }
            let valid = |m: f64| m.is_finite() && m > 0.0;
            if !valid(sector.ev_ebitda_multiple) || !valid(sector.ev_ebit_multiple) {
                return Err(AnalysisError::InvalidCatalog(format!(
                    "sector '{}' has a non-positive multiple",
                    sector.id
                )));
            }
        }

        let default_index = file
            .sectors
            .iter()
            .position(|s| s.id == file.default_sector)
            .ok_or_else(|| {
                AnalysisError::InvalidCatalog(format!(
                    "default sector '{}' is not in the catalog",
                    file.default_sector
                ))
            })?;

        Ok(Self {
            version: file.version,
            default_index,
            sectors: file.sectors,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn sectors(&self) -> &[SectorProfile] {
        &self.sectors
    }

    pub fn default_profile(&self) -> &SectorProfile {
        &self.sectors[self.default_index]
    }

    pub fn get(&self, id: &str) -> Option<&SectorProfile> {
        let id = id.trim();
        self.sectors.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }

    /// Exact lookup with fallback to the default profile.
    pub fn resolve(&self, id: &str) -> &SectorProfile {
        match self.get(id) {
            Some(profile) => profile,
            None => {
                let fallback = self.default_profile();
                warn!(
                    "Unknown sector '{}', using default profile '{}'",
                    id, fallback.id
                );
                fallback
            }
        }
    }

    /// Longest-prefix match of an ATECO code such as "25.62.00".
    pub fn for_ateco(&self, code: &str) -> Option<&SectorProfile> {
        let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }

        self.sectors
            .iter()
            .flat_map(|s| s.ateco_prefixes.iter().map(move |p| (p, s)))
            .filter(|(prefix, _)| !prefix.is_empty() && digits.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, sector)| sector)
    }
}
