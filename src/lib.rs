//! Constraint-satisfaction portfolio selection.
//!
//! Enumerates every subset of a strategy catalog that satisfies portfolio
//! risk, return, count and liquidity-mix constraints, then ranks the
//! feasible portfolios by risk-adjusted return.

pub mod config;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod params;
pub mod portfolio;
pub mod report;
pub mod strategy;

pub use constraints::{Constraint, ConstraintModel, Selection};
pub use engine::{search, search_parallel, CancelToken, SearchOptions, SearchOutcome, Truncation};
pub use error::{Error, Result};
pub use params::{ConstraintParams, LiquidityPolicy, LiquidityThresholds, MarketState};
pub use portfolio::Portfolio;
pub use strategy::{LiquidityTier, Strategy, StrategyCatalog};
