//! Portfolio-level constraint predicates.
//!
//! A selection is a flat include/exclude vector indexed by catalog position.
//! Four predicate families exist and they are closed: risk, return, count and
//! liquidity mix. Risk and count only ever get worse as strategies are added,
//! so a committed partial selection that already breaks them can be pruned.

use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};
use crate::params::{ConstraintParams, LiquidityPolicy};
use crate::strategy::{LiquidityTier, Strategy, StrategyCatalog};

/// Complete include/exclude assignment, indexed by catalog position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection(Vec<bool>);

impl Selection {
    /// `included` must have exactly one slot per catalog strategy.
    pub fn new(catalog: &StrategyCatalog, included: Vec<bool>) -> Result<Self> {
        if included.len() != catalog.len() {
            return Err(Error::Validation(format!(
                "selection has {} slots for a catalog of {} strategies",
                included.len(),
                catalog.len()
            )));
        }
        Ok(Self(included))
    }

    pub fn empty(catalog: &StrategyCatalog) -> Self {
        Self(vec![false; catalog.len()])
    }

    /// Build a selection from strategy names. Unknown names are lookup errors.
    pub fn from_names<S: AsRef<str>>(catalog: &StrategyCatalog, names: &[S]) -> Result<Self> {
        let mut included = vec![false; catalog.len()];
        for name in names {
            included[catalog.index_of(name.as_ref())?] = true;
        }
        Ok(Self(included))
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|b| **b).count()
    }

    /// Included strategies in catalog order.
    pub fn included<'a>(&'a self, catalog: &'a StrategyCatalog) -> impl Iterator<Item = &'a Strategy> + 'a {
        catalog
            .iter()
            .zip(self.0.iter())
            .filter_map(|(s, inc)| inc.then_some(s))
    }

    pub fn names(&self, catalog: &StrategyCatalog) -> Vec<String> {
        self.included(catalog).map(|s| s.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Included,
    Excluded,
    Undecided,
}

/// Selection under construction during search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSelection(Vec<Assignment>);

impl PartialSelection {
    pub fn undecided(len: usize) -> Self {
        Self(vec![Assignment::Undecided; len])
    }

    pub fn assign(&mut self, idx: usize, value: Assignment) {
        self.0[idx] = value;
    }

    pub fn get(&self, idx: usize) -> Assignment {
        self.0[idx]
    }

    pub fn is_complete(&self) -> bool {
        self.0.iter().all(|a| *a != Assignment::Undecided)
    }

    /// Complete selection if every position has been decided.
    pub fn to_selection(&self) -> Option<Selection> {
        if !self.is_complete() {
            return None;
        }
        Some(Selection(self.0.iter().map(|a| *a == Assignment::Included).collect()))
    }

    fn committed<'a>(&'a self, catalog: &'a StrategyCatalog) -> impl Iterator<Item = &'a Strategy> + 'a {
        catalog
            .iter()
            .zip(self.0.iter())
            .filter_map(|(s, a)| (*a == Assignment::Included).then_some(s))
    }
}

/// Aggregates over the included strategies of a selection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aggregates {
    pub total_risk: f64,
    pub total_return: f64,
    pub count: usize,
    pub high_count: usize,
    pub liquidity_score: u32,
}

impl Aggregates {
    /// Add one strategy. Sums accumulate in the order strategies are pushed.
    pub fn push(&mut self, s: &Strategy) {
        self.total_risk += s.risk;
        self.total_return += s.expected_return;
        self.count += 1;
        if s.liquidity == LiquidityTier::High {
            self.high_count += 1;
        }
        self.liquidity_score += s.liquidity.weight();
    }

    pub fn of<'a>(strategies: impl IntoIterator<Item = &'a Strategy>) -> Self {
        let mut agg = Self::default();
        for s in strategies {
            agg.push(s);
        }
        agg
    }
}

/// `h >= ratio * n`, vacuously true for an empty selection.
pub fn liquidity_mix_holds(high_count: usize, count: usize, ratio: f64) -> bool {
    if count == 0 {
        return true;
    }
    high_count as f64 >= ratio * count as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Constraint {
    Risk,
    Return,
    Count,
    LiquidityMix,
}

impl Constraint {
    pub const ALL: [Constraint; 4] = [
        Constraint::Risk,
        Constraint::Return,
        Constraint::Count,
        Constraint::LiquidityMix,
    ];

    /// True when adding strategies can never repair a violation.
    pub fn is_monotonic(self) -> bool {
        matches!(self, Constraint::Risk | Constraint::Count)
    }

    pub fn holds_for(self, agg: &Aggregates, params: &ConstraintParams) -> bool {
        match self {
            Constraint::Risk => agg.total_risk <= params.max_portfolio_risk,
            Constraint::Return => agg.total_return >= params.min_portfolio_return,
            Constraint::Count => agg.count >= 1 && agg.count <= params.max_strategy_count,
            Constraint::LiquidityMix => {
                liquidity_mix_holds(agg.high_count, agg.count, params.liquidity_ratio())
            }
        }
    }

    pub fn holds(self, catalog: &StrategyCatalog, selection: &Selection, params: &ConstraintParams) -> bool {
        self.holds_for(&Aggregates::of(selection.included(catalog)), params)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Constraint::Risk => "risk",
            Constraint::Return => "return",
            Constraint::Count => "count",
            Constraint::LiquidityMix => "liquidity-mix",
        };
        f.write_str(label)
    }
}

/// The four predicates bound to one set of parameters.
#[derive(Debug, Clone)]
pub struct ConstraintModel {
    params: ConstraintParams,
    constraints: [Constraint; 4],
}

impl ConstraintModel {
    pub fn new(params: ConstraintParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            constraints: Constraint::ALL,
        })
    }

    pub fn satisfied_by(&self, catalog: &StrategyCatalog, selection: &Selection) -> bool {
        self.satisfied_by_aggregates(&Aggregates::of(selection.included(catalog)))
    }

    pub fn satisfied_by_aggregates(&self, agg: &Aggregates) -> bool {
        self.constraints.iter().all(|c| c.holds_for(agg, &self.params))
    }

    pub fn violations(&self, catalog: &StrategyCatalog, selection: &Selection) -> Vec<Constraint> {
        let agg = Aggregates::of(selection.included(catalog));
        self.constraints
            .iter()
            .copied()
            .filter(|c| !c.holds_for(&agg, &self.params))
            .collect()
    }

    /// True once the committed part of `partial` breaks a monotonic bound.
    pub fn prunes(&self, catalog: &StrategyCatalog, partial: &PartialSelection) -> bool {
        self.exceeds_bounds(&Aggregates::of(partial.committed(catalog)))
    }

    pub fn exceeds_bounds(&self, agg: &Aggregates) -> bool {
        agg.total_risk > self.params.max_portfolio_risk || agg.count > self.params.max_strategy_count
    }
}

/// Single-strategy screening result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyScreen {
    pub name: String,
    pub risk_ok: bool,
    pub return_ok: bool,
    pub liquidity_ok: bool,
}

impl StrategyScreen {
    pub fn satisfied(&self) -> bool {
        self.risk_ok && self.return_ok && self.liquidity_ok
    }
}

/// Check one strategy on its own against the thresholds.
///
/// Liquidity here is a tier filter, not the portfolio mix ratio:
/// Conservative wants High, Balanced accepts High or Medium, Aggressive accepts all.
pub fn screen_strategy(strategy: &Strategy, params: &ConstraintParams) -> StrategyScreen {
    let liquidity_ok = match params.liquidity_policy {
        LiquidityPolicy::Conservative => strategy.liquidity == LiquidityTier::High,
        LiquidityPolicy::Balanced => {
            matches!(strategy.liquidity, LiquidityTier::High | LiquidityTier::Medium)
        }
        LiquidityPolicy::Aggressive => true,
    };
    StrategyScreen {
        name: strategy.name.clone(),
        risk_ok: strategy.risk <= params.max_portfolio_risk,
        return_ok: strategy.expected_return >= params.min_portfolio_return,
        liquidity_ok,
    }
}

pub fn screen_catalog(catalog: &StrategyCatalog, params: &ConstraintParams) -> Result<Vec<StrategyScreen>> {
    params.validate()?;
    Ok(catalog.iter().map(|s| screen_strategy(s, params)).collect())
}

/// Look up `names` and report which predicates the resulting selection breaks.
pub fn check_named(
    catalog: &StrategyCatalog,
    params: &ConstraintParams,
    names: &[&str],
) -> Result<Vec<Constraint>> {
    let model = ConstraintModel::new(*params)?;
    let selection = Selection::from_names(catalog, names)?;
    Ok(model.violations(catalog, &selection))
}
