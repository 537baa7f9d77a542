use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityPolicy {
    Conservative, // >= 70% High-tier strategies
    Balanced,     // >= 40%
    Aggressive,   // >= 20%
}

impl FromStr for LiquidityPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(LiquidityPolicy::Conservative),
            "balanced" | "moderate" => Ok(LiquidityPolicy::Balanced),
            "aggressive" => Ok(LiquidityPolicy::Aggressive),
            other => Err(Error::Validation(format!("unknown liquidity policy '{}'", other))),
        }
    }
}

impl fmt::Display for LiquidityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LiquidityPolicy::Conservative => "Conservative",
            LiquidityPolicy::Balanced => "Balanced",
            LiquidityPolicy::Aggressive => "Aggressive",
        };
        f.write_str(label)
    }
}

/// Minimum share of High-tier strategies required by each liquidity policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidityThresholds {
    #[serde(default = "default_conservative_ratio")]
    pub conservative: f64,
    #[serde(default = "default_balanced_ratio")]
    pub balanced: f64,
    #[serde(default = "default_aggressive_ratio")]
    pub aggressive: f64,
}

pub const DEFAULT_CONSERVATIVE_RATIO: f64 = 0.7;
pub const DEFAULT_BALANCED_RATIO: f64 = 0.4;
pub const DEFAULT_AGGRESSIVE_RATIO: f64 = 0.2;

fn default_conservative_ratio() -> f64 {
    DEFAULT_CONSERVATIVE_RATIO
}
fn default_balanced_ratio() -> f64 {
    DEFAULT_BALANCED_RATIO
}
fn default_aggressive_ratio() -> f64 {
    DEFAULT_AGGRESSIVE_RATIO
}

impl Default for LiquidityThresholds {
    fn default() -> Self {
        Self {
            conservative: DEFAULT_CONSERVATIVE_RATIO,
            balanced: DEFAULT_BALANCED_RATIO,
            aggressive: DEFAULT_AGGRESSIVE_RATIO,
        }
    }
}

impl LiquidityThresholds {
    pub fn ratio(&self, policy: LiquidityPolicy) -> f64 {
        match policy {
            LiquidityPolicy::Conservative => self.conservative,
            LiquidityPolicy::Balanced => self.balanced,
            LiquidityPolicy::Aggressive => self.aggressive,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (label, v) in [
            ("conservative", self.conservative),
            ("balanced", self.balanced),
            ("aggressive", self.aggressive),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(Error::Validation(format!(
                    "{} liquidity ratio must be within [0, 1], got {}",
                    label, v
                )));
            }
        }
        Ok(())
    }
}

/// Thresholds for one search request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintParams {
    pub max_portfolio_risk: f64,
    pub min_portfolio_return: f64,
    pub max_strategy_count: usize,
    pub liquidity_policy: LiquidityPolicy,
    #[serde(default)]
    pub thresholds: LiquidityThresholds,
}

impl ConstraintParams {
    pub fn new(
        max_portfolio_risk: f64,
        min_portfolio_return: f64,
        max_strategy_count: usize,
        liquidity_policy: LiquidityPolicy,
    ) -> Self {
        Self {
            max_portfolio_risk,
            min_portfolio_return,
            max_strategy_count,
            liquidity_policy,
            thresholds: LiquidityThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: LiquidityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Share of High-tier strategies the active policy demands.
    pub fn liquidity_ratio(&self) -> f64 {
        self.thresholds.ratio(self.liquidity_policy)
    }

    /// Reject malformed parameters before any search starts.
    pub fn validate(&self) -> Result<()> {
        if !self.max_portfolio_risk.is_finite() || self.max_portfolio_risk < 0.0 {
            return Err(Error::Validation(format!(
                "max_portfolio_risk must be a non-negative number, got {}",
                self.max_portfolio_risk
            )));
        }
        if !self.min_portfolio_return.is_finite() || self.min_portfolio_return < 0.0 {
            return Err(Error::Validation(format!(
                "min_portfolio_return must be a non-negative number, got {}",
                self.min_portfolio_return
            )));
        }
        if self.max_strategy_count < 1 {
            return Err(Error::Validation("max_strategy_count must be at least 1".into()));
        }
        self.thresholds.validate()
    }
}

/// Market regime supplied by an external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketState {
    Bearish,
    Neutral,
    Bullish,
}

impl MarketState {
    /// Map a classifier state index (0 = Bearish, 1 = Neutral, 2 = Bullish).
    pub fn from_index(idx: usize) -> Result<Self> {
        match idx {
            0 => Ok(MarketState::Bearish),
            1 => Ok(MarketState::Neutral),
            2 => Ok(MarketState::Bullish),
            other => Err(Error::Validation(format!("unknown market state index {}", other))),
        }
    }

    /// Constraint preset used when the market is in this state.
    pub fn preset(self) -> ConstraintParams {
        match self {
            MarketState::Bearish => ConstraintParams::new(0.40, 0.06, 3, LiquidityPolicy::Conservative),
            MarketState::Neutral => ConstraintParams::new(0.60, 0.10, 4, LiquidityPolicy::Balanced),
            MarketState::Bullish => ConstraintParams::new(0.90, 0.12, 5, LiquidityPolicy::Aggressive),
        }
    }
}

impl FromStr for MarketState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if let Ok(idx) = s.parse::<usize>() {
            return Self::from_index(idx);
        }
        match s.as_str() {
            "bearish" | "bear" => Ok(MarketState::Bearish),
            "neutral" => Ok(MarketState::Neutral),
            "bullish" | "bull" => Ok(MarketState::Bullish),
            other => Err(Error::Validation(format!("unknown market state '{}'", other))),
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MarketState::Bearish => "BEARISH",
            MarketState::Neutral => "NEUTRAL",
            MarketState::Bullish => "BULLISH",
        };
        f.write_str(label)
    }
}
