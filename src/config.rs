//! Configuration loader: merges `csp_portfolio.toml` with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::engine::SearchOptions;
use crate::error::{Error, Result};
use crate::params::{ConstraintParams, LiquidityPolicy, LiquidityThresholds};

pub const DEFAULT_CONFIG_FILE: &str = "csp_portfolio.toml";
pub const CONFIG_PATH_ENV: &str = "CSP_PORTFOLIO_CONFIG";

// ── Sections ──────────────────────────────────────────────────────────

/// Portfolio thresholds. Defaults match the neutral-market preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintsConfig {
    #[serde(default = "default_max_risk")]
    pub max_portfolio_risk: f64,

    #[serde(default = "default_min_return")]
    pub min_portfolio_return: f64,

    #[serde(default = "default_max_count")]
    pub max_strategy_count: usize,

    #[serde(default = "default_policy")]
    pub liquidity_policy: LiquidityPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Stop after this many solutions (unset = all).
    #[serde(default)]
    pub max_solutions: Option<usize>,

    /// Portfolios to display. `0` shows every solution.
    #[serde(default = "default_top_n")]
    pub top_n: Option<usize>,

    /// Split the first branch across the rayon pool.
    #[serde(default)]
    pub parallel: bool,

    /// Cancel the search after this many milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub url: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub constraints: ConstraintsConfig,

    #[serde(default)]
    pub thresholds: LiquidityThresholds,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

fn default_max_risk() -> f64 {
    0.6
}
fn default_min_return() -> f64 {
    0.10
}
fn default_max_count() -> usize {
    4
}
fn default_policy() -> LiquidityPolicy {
    LiquidityPolicy::Balanced
}
fn default_top_n() -> Option<usize> {
    Some(3)
}

impl Default for ConstraintsConfig {
    fn default() -> Self {
        Self {
            max_portfolio_risk: default_max_risk(),
            min_portfolio_return: default_min_return(),
            max_strategy_count: default_max_count(),
            liquidity_policy: default_policy(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_solutions: None,
            top_n: default_top_n(),
            parallel: false,
            timeout_ms: None,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply `CSP_*` overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CSP_MAX_RISK") {
            self.constraints.max_portfolio_risk = parse_env("CSP_MAX_RISK", &v)?;
        }
        if let Some(v) = lookup("CSP_MIN_RETURN") {
            self.constraints.min_portfolio_return = parse_env("CSP_MIN_RETURN", &v)?;
        }
        if let Some(v) = lookup("CSP_MAX_COUNT") {
            self.constraints.max_strategy_count = parse_env("CSP_MAX_COUNT", &v)?;
        }
        if let Some(v) = lookup("CSP_POLICY") {
            self.constraints.liquidity_policy = v
                .parse()
                .map_err(|e| Error::Config(format!("CSP_POLICY: {}", e)))?;
        }
        Ok(())
    }

    /// Validated parameters for one search.
    pub fn constraint_params(&self) -> Result<ConstraintParams> {
        let c = &self.constraints;
        let params = ConstraintParams::new(
            c.max_portfolio_risk,
            c.min_portfolio_return,
            c.max_strategy_count,
            c.liquidity_policy,
        )
        .with_thresholds(self.thresholds);
        params.validate()?;
        Ok(params)
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            max_solutions: self.search.max_solutions,
            top_n: self.search.top_n.filter(|n| *n > 0),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}='{}': {}", key, raw, e)))
}

// ── Loader ────────────────────────────────────────────────────────────

/// Load configuration: explicit path, then `$CSP_PORTFOLIO_CONFIG`, then
/// `csp_portfolio.toml` if present, then defaults. Env overrides apply last.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .or_else(|| {
            let p = PathBuf::from(DEFAULT_CONFIG_FILE);
            p.exists().then_some(p)
        });

    let mut config = match path {
        Some(p) => {
            let contents = std::fs::read_to_string(&p)
                .map_err(|e| Error::Config(format!("Failed to read {}: {}", p.display(), e)))?;
            debug!("Loaded config from {}", p.display());
            AppConfig::from_toml_str(&contents)?
        }
        None => {
            debug!("No config file, using defaults");
            AppConfig::default()
        }
    };

    config.apply_overrides(|k| std::env::var(k).ok())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_neutral_preset() {
        let cfg = AppConfig::default();
        let params = cfg.constraint_params().unwrap();
        assert_eq!(params, crate::params::MarketState::Neutral.preset());
        assert_eq!(cfg.search.top_n, Some(3));
    }

    #[test]
    fn test_parse_full_file() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [constraints]
            max_portfolio_risk = 0.8
            min_portfolio_return = 0.05
            max_strategy_count = 3
            liquidity_policy = "Conservative"

            [thresholds]
            conservative = 0.75

            [search]
            max_solutions = 100
            top_n = 5
            parallel = true

            [catalog]
            path = "strategies.json"
            "#,
        )
        .unwrap();

        let params = cfg.constraint_params().unwrap();
        assert_eq!(params.max_strategy_count, 3);
        assert_eq!(params.liquidity_policy, LiquidityPolicy::Conservative);
        assert_eq!(params.liquidity_ratio(), 0.75);
        assert_eq!(params.thresholds.balanced, 0.4);
        assert_eq!(cfg.search_options().max_solutions, Some(100));
        assert!(cfg.search.parallel);
        assert_eq!(cfg.catalog.path, Some(PathBuf::from("strategies.json")));
    }

    #[test]
    fn test_top_n_zero_means_all() {
        let cfg = AppConfig::from_toml_str("[search]\ntop_n = 0\n").unwrap();
        assert_eq!(cfg.search_options().top_n, None);

        let cfg = AppConfig::from_toml_str("[search]\nparallel = true\n").unwrap();
        assert_eq!(cfg.search_options().top_n, Some(3));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg = AppConfig::from_toml_str("[constraints]\nmax_strategy_count = 2\n").unwrap();
        assert_eq!(cfg.constraints.max_strategy_count, 2);
        assert_eq!(cfg.constraints.max_portfolio_risk, 0.6);
        assert_eq!(cfg.constraints.liquidity_policy, LiquidityPolicy::Balanced);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(AppConfig::from_toml_str("[constraints"), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("CSP_MAX_RISK", "0.9"), ("CSP_POLICY", "aggressive")].into();
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.constraints.max_portfolio_risk, 0.9);
        assert_eq!(cfg.constraints.liquidity_policy, LiquidityPolicy::Aggressive);
    }

    #[test]
    fn test_bad_env_override() {
        let mut cfg = AppConfig::default();
        let res = cfg.apply_overrides(|k| (k == "CSP_MAX_COUNT").then(|| "many".to_string()));
        assert!(matches!(res, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let cfg = AppConfig::from_toml_str("[constraints]\nmax_strategy_count = 0\n").unwrap();
        assert!(matches!(cfg.constraint_params(), Err(Error::Validation(_))));
    }
}
