use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::constraints::Aggregates;
use crate::strategy::StrategyCatalog;

/// A satisfying selection with its derived aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Included strategy names, catalog order.
    pub strategies: Vec<String>,
    pub total_return: f64,
    pub total_risk: f64,
    pub liquidity_score: u32,
    /// Risk-adjusted return: `total_return - total_risk`.
    pub score: f64,
}

impl Portfolio {
    /// Build from an include vector and the aggregates accumulated for it.
    pub(crate) fn from_parts(catalog: &StrategyCatalog, included: &[bool], agg: &Aggregates) -> Self {
        let strategies = catalog
            .iter()
            .zip(included)
            .filter(|(_, inc)| **inc)
            .map(|(s, _)| s.name.clone())
            .collect();
        Self {
            strategies,
            total_return: agg.total_return,
            total_risk: agg.total_risk,
            liquidity_score: agg.liquidity_score,
            score: agg.total_return - agg.total_risk,
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.iter().any(|s| s == name)
    }

    fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Ranking order: higher score first, then fewer strategies, then names.
pub fn compare(a: &Portfolio, b: &Portfolio) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.len().cmp(&b.len()))
        .then_with(|| a.sorted_names().cmp(&b.sorted_names()))
}

/// Sort portfolios best-first. Sorting an already ranked list leaves it unchanged.
pub fn rank(portfolios: &mut [Portfolio]) {
    portfolios.sort_by(compare);
}

/// Rank and keep the best `top_n` (all when `None`).
pub fn top_n(mut portfolios: Vec<Portfolio>, top_n: Option<usize>) -> Vec<Portfolio> {
    rank(&mut portfolios);
    if let Some(n) = top_n {
        portfolios.truncate(n);
    }
    portfolios
}
