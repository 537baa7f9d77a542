//! Backtracking search over the include/exclude hypercube.
//!
//! Strategies are decided one at a time in catalog order, Included branch
//! first. Risk and count bounds are checked before descending into an
//! Included branch; return and liquidity mix are only checked on complete
//! assignments. The engine keeps no state between calls.

use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::constraints::{Aggregates, ConstraintModel};
use crate::error::{Error, Result};
use crate::params::ConstraintParams;
use crate::portfolio::{self, Portfolio};
use crate::strategy::StrategyCatalog;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchOptions {
    /// Stop after this many solutions. `None` enumerates everything.
    pub max_solutions: Option<usize>,
    /// Portfolios kept after ranking. `None` keeps all.
    pub top_n: Option<usize>,
}

impl SearchOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_max_solutions(mut self, cap: usize) -> Self {
        self.max_solutions = Some(cap);
        self
    }

    pub fn with_top_n(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_solutions == Some(0) {
            return Err(Error::Validation("max_solutions must be at least 1 when set".into()));
        }
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a caller and running searches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    SolutionCap,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub nodes_visited: u64,
    pub pruned_branches: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Ranked best-first, cut to `top_n`.
    pub portfolios: Vec<Portfolio>,
    /// Every solution found, before `top_n`.
    pub total_solutions: usize,
    pub truncation: Option<Truncation>,
    pub stats: SearchStats,
}

impl SearchOutcome {
    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.total_solutions == 0
    }
}

struct Frame {
    depth: usize,
    agg: Aggregates,
    /// Decision for position `depth - 1`.
    take: bool,
}

struct Search<'a> {
    catalog: &'a StrategyCatalog,
    model: &'a ConstraintModel,
    cancel: &'a CancelToken,
    cap: Option<usize>,
    included: Vec<bool>,
    found: Vec<Portfolio>,
    stats: SearchStats,
    truncation: Option<Truncation>,
}

impl<'a> Search<'a> {
    fn new(
        catalog: &'a StrategyCatalog,
        model: &'a ConstraintModel,
        cancel: &'a CancelToken,
        cap: Option<usize>,
    ) -> Self {
        Self {
            catalog,
            model,
            cancel,
            cap,
            included: vec![false; catalog.len()],
            found: Vec::new(),
            stats: SearchStats::default(),
            truncation: None,
        }
    }

    /// Depth-first walk from `root`, with an explicit stack so deep catalogs
    /// cannot exhaust the thread stack. Positions before `root` must already
    /// be set in `self.included`.
    fn explore(&mut self, root: usize, agg: Aggregates) {
        let catalog = self.catalog;
        let mut stack = vec![Frame { depth: root, agg, take: false }];

        while let Some(Frame { depth, agg, take }) = stack.pop() {
            if self.cancel.is_cancelled() {
                self.truncation = Some(Truncation::Cancelled);
                return;
            }
            self.stats.nodes_visited += 1;
            if depth > root {
                self.included[depth - 1] = take;
            }

            let Some(strategy) = catalog.get(depth) else {
                if self.complete(&agg).is_break() {
                    return;
                }
                continue;
            };

            // Excluded is pushed first so Included pops first.
            stack.push(Frame { depth: depth + 1, agg, take: false });
            let mut with = agg;
            with.push(strategy);
            if self.model.exceeds_bounds(&with) {
                self.stats.pruned_branches += 1;
            } else {
                stack.push(Frame { depth: depth + 1, agg: with, take: true });
            }
        }
    }

    fn complete(&mut self, agg: &Aggregates) -> ControlFlow<()> {
        if !self.model.satisfied_by_aggregates(agg) {
            return ControlFlow::Continue(());
        }
        self.found.push(Portfolio::from_parts(self.catalog, &self.included, agg));
        trace!(solutions = self.found.len(), "solution found");
        if self.cap.is_some_and(|cap| self.found.len() >= cap) {
            self.truncation = Some(Truncation::SolutionCap);
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

fn finish(found: Vec<Portfolio>, truncation: Option<Truncation>, stats: SearchStats, options: &SearchOptions) -> SearchOutcome {
    let total_solutions = found.len();
    let portfolios = portfolio::top_n(found, options.top_n);

    info!(
        solutions = total_solutions,
        kept = portfolios.len(),
        nodes = stats.nodes_visited,
        pruned = stats.pruned_branches,
        truncation = ?truncation,
        "search complete"
    );

    SearchOutcome {
        portfolios,
        total_solutions,
        truncation,
        stats,
    }
}

/// Enumerate every selection of `catalog` that satisfies `params`, ranked.
///
/// An empty catalog or infeasible thresholds give an empty outcome, not an
/// error. Only malformed parameters are rejected.
pub fn search(
    catalog: &StrategyCatalog,
    params: &ConstraintParams,
    options: &SearchOptions,
    cancel: &CancelToken,
) -> Result<SearchOutcome> {
    options.validate()?;
    let model = ConstraintModel::new(*params)?;

    debug!(
        strategies = catalog.len(),
        max_risk = params.max_portfolio_risk,
        min_return = params.min_portfolio_return,
        max_count = params.max_strategy_count,
        policy = %params.liquidity_policy,
        "starting search"
    );

    let mut s = Search::new(catalog, &model, cancel, options.max_solutions);
    s.explore(0, Aggregates::default());
    Ok(finish(s.found, s.truncation, s.stats, options))
}

/// Same result as [`search`], with the two branches of the first strategy
/// explored on the rayon pool.
///
/// Included-branch solutions come before Excluded-branch ones, matching the
/// sequential order, so a solution cap keeps the same set. Stats can differ
/// when a cap stops the sequential search early.
pub fn search_parallel(
    catalog: &StrategyCatalog,
    params: &ConstraintParams,
    options: &SearchOptions,
    cancel: &CancelToken,
) -> Result<SearchOutcome> {
    options.validate()?;
    let model = ConstraintModel::new(*params)?;

    let Some(first) = catalog.get(0) else {
        return search(catalog, params, options, cancel);
    };

    debug!(strategies = catalog.len(), "starting split search");

    let cap = options.max_solutions;
    let mut with = Aggregates::default();
    with.push(first);
    let first_pruned = model.exceeds_bounds(&with);

    let (inc, exc) = rayon::join(
        || {
            let mut s = Search::new(catalog, &model, cancel, cap);
            if !first_pruned {
                s.included[0] = true;
                s.explore(1, with);
            }
            s
        },
        || {
            let mut s = Search::new(catalog, &model, cancel, cap);
            s.explore(1, Aggregates::default());
            s
        },
    );

    let cancelled = inc.truncation == Some(Truncation::Cancelled)
        || exc.truncation == Some(Truncation::Cancelled);
    let stats = SearchStats {
        nodes_visited: 1 + inc.stats.nodes_visited + exc.stats.nodes_visited,
        pruned_branches: u64::from(first_pruned) + inc.stats.pruned_branches + exc.stats.pruned_branches,
    };

    let mut found = inc.found;
    found.extend(exc.found);

    let truncation = match cap {
        Some(cap) if found.len() >= cap => {
            found.truncate(cap);
            Some(Truncation::SolutionCap)
        }
        _ if cancelled => Some(Truncation::Cancelled),
        _ => None,
    };

    Ok(finish(found, truncation, stats, options))
}
