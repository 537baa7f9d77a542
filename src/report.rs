//! Run reports for the command-line front end (plain text or JSON).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;

use crate::constraints::StrategyScreen;
use crate::engine::{SearchOutcome, Truncation};
use crate::error::Result;
use crate::params::{ConstraintParams, MarketState};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub market_state: Option<MarketState>,
    pub params: ConstraintParams,
    pub catalog_size: usize,
    pub elapsed_ms: u64,
    pub outcome: SearchOutcome,
}

impl RunReport {
    pub fn new(
        outcome: SearchOutcome,
        params: ConstraintParams,
        market_state: Option<MarketState>,
        catalog_size: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            market_state,
            params,
            catalog_size,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            outcome,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let p = &self.params;

        let _ = writeln!(out, "CONSTRAINTS APPLIED:");
        let _ = writeln!(out, "  Max Portfolio Risk: {:.1}%", p.max_portfolio_risk * 100.0);
        let _ = writeln!(out, "  Min Portfolio Return: {:.1}%", p.min_portfolio_return * 100.0);
        let _ = writeln!(out, "  Max Strategies: {}", p.max_strategy_count);
        let _ = writeln!(out, "  Liquidity Mix: {}", p.liquidity_policy);
        if let Some(state) = self.market_state {
            let _ = writeln!(out, "  Market State: {}", state);
        }
        let _ = writeln!(out);

        if self.outcome.portfolios.is_empty() {
            let _ = writeln!(out, "NO FEASIBLE PORTFOLIO");
        } else {
            let _ = writeln!(out, "TOP PORTFOLIOS:");
            for (i, portfolio) in self.outcome.portfolios.iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", i + 1, portfolio.strategies.join(", "));
                let _ = writeln!(out, "     Return: {:.2}%", portfolio.total_return * 100.0);
                let _ = writeln!(out, "     Risk: {:.2}%", portfolio.total_risk * 100.0);
                let _ = writeln!(out, "     Liquidity: {}", portfolio.liquidity_score);
                let _ = writeln!(out, "     Score: {:.4}", portfolio.score);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "SEARCH SUMMARY:");
        let _ = writeln!(out, "  Strategies: {}", self.catalog_size);
        let _ = writeln!(out, "  Solutions Found: {}", self.outcome.total_solutions);
        let _ = writeln!(out, "  Nodes Visited: {}", self.outcome.stats.nodes_visited);
        let _ = writeln!(out, "  Branches Pruned: {}", self.outcome.stats.pruned_branches);
        let _ = writeln!(out, "  Execution Time: {}ms", self.elapsed_ms);
        match self.outcome.truncation {
            Some(Truncation::SolutionCap) => {
                let _ = writeln!(out, "  Truncated: solution cap reached");
            }
            Some(Truncation::Cancelled) => {
                let _ = writeln!(out, "  Truncated: search cancelled, results are partial");
            }
            None => {}
        }
        out
    }
}

pub fn render_screening(screens: &[StrategyScreen]) -> String {
    let mut out = String::from("CONSTRAINT SCREENING:\n");
    for s in screens {
        let status = if s.satisfied() { "SATISFIED" } else { "VIOLATED" };
        let mut failed = Vec::new();
        if !s.risk_ok {
            failed.push("risk");
        }
        if !s.return_ok {
            failed.push("return");
        }
        if !s.liquidity_ok {
            failed.push("liquidity");
        }
        if failed.is_empty() {
            let _ = writeln!(out, "  {}: {}", s.name, status);
        } else {
            let _ = writeln!(out, "  {}: {} ({})", s.name, status, failed.join(", "));
        }
    }
    out
}
