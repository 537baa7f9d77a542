//! Strategy catalog management
//!
//! This module handles:
//! - The immutable `Strategy` record and its liquidity tier
//! - An ordered catalog (arena + name index) used by the search engine
//! - Loading catalogs from a JSON file, an HTTP endpoint, or the built-in sample set

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityTier {
    High,
    Medium,
    Low,
}

impl LiquidityTier {
    /// Weight used for the portfolio liquidity score.
    pub fn weight(self) -> u32 {
        match self {
            LiquidityTier::High => 3,
            LiquidityTier::Medium => 2,
            LiquidityTier::Low => 1,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(LiquidityTier::High),
            "medium" | "med" => Some(LiquidityTier::Medium),
            "low" => Some(LiquidityTier::Low),
            _ => None,
        }
    }
}

impl fmt::Display for LiquidityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LiquidityTier::High => "High",
            LiquidityTier::Medium => "Medium",
            LiquidityTier::Low => "Low",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    #[serde(alias = "return")]
    pub expected_return: f64,
    pub risk: f64,
    #[serde(alias = "liquidity_tier", deserialize_with = "deserialize_tier")]
    pub liquidity: LiquidityTier,
}

impl Strategy {
    pub fn new(name: impl Into<String>, expected_return: f64, risk: f64, liquidity: LiquidityTier) -> Self {
        Self {
            name: name.into(),
            expected_return,
            risk,
            liquidity,
        }
    }
}

// Accept "High", "high", "HIGH", ... for the liquidity tier.
fn deserialize_tier<'de, D>(deserializer: D) -> std::result::Result<LiquidityTier, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    LiquidityTier::parse(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown liquidity tier '{}'", raw)))
}

/// Ordered, read-only set of candidate strategies.
///
/// Catalog order is the search order, so it is kept exactly as supplied.
#[derive(Debug, Clone, Default)]
pub struct StrategyCatalog {
    strategies: Vec<Strategy>,
    index: HashMap<String, usize>,
}

impl StrategyCatalog {
    pub fn new(strategies: Vec<Strategy>) -> Result<Self> {
        let mut index = HashMap::with_capacity(strategies.len());
        for (i, s) in strategies.iter().enumerate() {
            if s.name.trim().is_empty() {
                return Err(Error::Catalog(format!("strategy at position {} has an empty name", i)));
            }
            if !s.expected_return.is_finite() || !s.risk.is_finite() {
                return Err(Error::Catalog(format!(
                    "strategy '{}' has a non-finite return or risk",
                    s.name
                )));
            }
            // Forward pruning relies on risk never decreasing as strategies are added.
            if s.risk < 0.0 {
                return Err(Error::Catalog(format!("strategy '{}' has negative risk {}", s.name, s.risk)));
            }
            if index.insert(s.name.clone(), i).is_some() {
                return Err(Error::Catalog(format!("duplicate strategy name '{}'", s.name)));
            }
        }
        Ok(Self { strategies, index })
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Strategy> {
        self.strategies.iter()
    }

    pub fn as_slice(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn get(&self, idx: usize) -> Option<&Strategy> {
        self.strategies.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownStrategy(name.to_string()))
    }

    pub fn by_name(&self, name: &str) -> Result<&Strategy> {
        let idx = self.index_of(name)?;
        Ok(&self.strategies[idx])
    }

    pub fn total_return(&self) -> f64 {
        self.strategies.iter().map(|s| s.expected_return).sum()
    }
}

impl<'a> IntoIterator for &'a StrategyCatalog {
    type Item = &'a Strategy;
    type IntoIter = std::slice::Iter<'a, Strategy>;

    fn into_iter(self) -> Self::IntoIter {
        self.strategies.iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogMetadata {
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Full {
        #[serde(default)]
        metadata: Option<CatalogMetadata>,
        strategies: Vec<Strategy>,
    },
    Bare(Vec<Strategy>),
}

/// Parse a catalog document: either `{ "metadata": ..., "strategies": [...] }`
/// or a bare array of strategies.
pub fn parse_catalog(contents: &str) -> Result<StrategyCatalog> {
    let doc: CatalogDocument = serde_json::from_str(contents)?;
    let strategies = match doc {
        CatalogDocument::Full { metadata, strategies } => {
            if let Some(meta) = metadata {
                debug!(
                    generated_at = ?meta.generated_at,
                    source = meta.source.as_deref().unwrap_or("unknown"),
                    "catalog metadata"
                );
            }
            strategies
        }
        CatalogDocument::Bare(strategies) => strategies,
    };
    StrategyCatalog::new(strategies)
}

pub fn load_catalog_from_file(path: impl AsRef<Path>) -> Result<StrategyCatalog> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::Catalog(format!("Failed to read catalog file '{}': {}", path.display(), e))
    })?;
    let catalog = parse_catalog(&contents)?;
    info!("Loaded {} strategies from {}", catalog.len(), path.display());
    Ok(catalog)
}

/// Fetch a catalog document over HTTP.
pub async fn fetch_catalog(url: &str) -> Result<StrategyCatalog> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Http(e.to_string()))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    let status = resp.status();
    let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

    if !status.is_success() {
        return Err(Error::Http(format!(
            "catalog request to {} failed [CODE: {}]: {}",
            url, status, text
        )));
    }

    let catalog = parse_catalog(&text)?;
    info!("Fetched {} strategies from {}", catalog.len(), url);
    Ok(catalog)
}

static SAMPLE_CATALOG: Lazy<StrategyCatalog> = Lazy::new(|| {
    use LiquidityTier::*;
    let strategies = vec![
        Strategy::new("CONSERVATIVE", 0.06, 0.2, High),
        Strategy::new("MODERATE", 0.09, 0.4, Medium),
        Strategy::new("AGGRESSIVE", 0.15, 0.7, Low),
        Strategy::new("TECH FOCUS", 0.12, 0.6, Medium),
        Strategy::new("DIVERSIFIED", 0.08, 0.3, High),
        Strategy::new("GROWTH", 0.11, 0.5, Medium),
        Strategy::new("VALUE", 0.07, 0.25, High),
        Strategy::new("INCOME", 0.05, 0.15, High),
        Strategy::new("BLUE CHIP", 0.085, 0.35, High),
    ];
    let index = strategies
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.clone(), i))
        .collect();
    StrategyCatalog { strategies, index }
});

/// The built-in demo catalog (nine strategies).
pub fn sample_catalog() -> &'static StrategyCatalog {
    &SAMPLE_CATALOG
}
