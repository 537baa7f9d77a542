use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use csp_portfolio::constraints::{liquidity_mix_holds, Constraint};
use csp_portfolio::strategy::sample_catalog;
use csp_portfolio::{
    portfolio, search, search_parallel, CancelToken, ConstraintModel, ConstraintParams, LiquidityPolicy,
    LiquidityTier, SearchOptions, Selection, Strategy, StrategyCatalog, Truncation,
};
use proptest::prelude::*;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

type NameSet = BTreeSet<String>;

/// Every satisfying subset by checking all 2^k selections.
fn brute_force(catalog: &StrategyCatalog, params: &ConstraintParams) -> BTreeSet<NameSet> {
    let model = ConstraintModel::new(*params).unwrap();
    let k = catalog.len();
    let mut out = BTreeSet::new();
    for mask in 0u32..(1u32 << k) {
        let sel = Selection::new(catalog, (0..k).map(|i| mask & (1 << i) != 0).collect()).unwrap();
        if model.satisfied_by(catalog, &sel) {
            out.insert(sel.names(catalog).into_iter().collect());
        }
    }
    out
}

fn engine_sets(catalog: &StrategyCatalog, params: &ConstraintParams) -> BTreeSet<NameSet> {
    let out = search(catalog, params, &SearchOptions::all(), &CancelToken::new()).unwrap();
    assert_eq!(out.portfolios.len(), out.total_solutions);
    out.portfolios
        .iter()
        .map(|p| p.strategies.iter().cloned().collect())
        .collect()
}

/// Re-derive every predicate from the raw strategy fields.
fn assert_sound(catalog: &StrategyCatalog, params: &ConstraintParams, names: &[String]) {
    let mut risk = 0.0;
    let mut ret = 0.0;
    let mut high = 0usize;
    for s in catalog.iter().filter(|s| names.contains(&s.name)) {
        risk += s.risk;
        ret += s.expected_return;
        if s.liquidity == LiquidityTier::High {
            high += 1;
        }
    }
    let n = names.len();
    assert!(n >= 1 && n <= params.max_strategy_count, "count {} out of range", n);
    assert!(risk <= params.max_portfolio_risk, "risk {} > {}", risk, params.max_portfolio_risk);
    assert!(ret >= params.min_portfolio_return, "return {} < {}", ret, params.min_portfolio_return);
    assert!(high as f64 >= params.liquidity_ratio() * n as f64);
}

fn catalog_from(specs: &[(f64, f64, u8)]) -> StrategyCatalog {
    let strategies = specs
        .iter()
        .enumerate()
        .map(|(i, (ret, risk, tier))| {
            let tier = match tier % 3 {
                0 => LiquidityTier::High,
                1 => LiquidityTier::Medium,
                _ => LiquidityTier::Low,
            };
            Strategy::new(format!("S{:02}", i), *ret, *risk, tier)
        })
        .collect();
    StrategyCatalog::new(strategies).unwrap()
}

fn policy_from(p: u8) -> LiquidityPolicy {
    match p % 3 {
        0 => LiquidityPolicy::Conservative,
        1 => LiquidityPolicy::Balanced,
        _ => LiquidityPolicy::Aggressive,
    }
}

#[test]
fn test_sample_catalog_complete_for_every_policy() {
    let catalog = sample_catalog();
    for policy in [LiquidityPolicy::Conservative, LiquidityPolicy::Balanced, LiquidityPolicy::Aggressive] {
        for max_count in 1..=5 {
            let params = ConstraintParams::new(0.9, 0.08, max_count, policy);
            assert_eq!(engine_sets(catalog, &params), brute_force(catalog, &params));
        }
    }
}

#[test]
fn test_sample_catalog_solutions_are_sound() {
    let catalog = sample_catalog();
    let params = ConstraintParams::new(1.2, 0.15, 5, LiquidityPolicy::Conservative);
    let out = search(catalog, &params, &SearchOptions::all(), &CancelToken::new()).unwrap();
    assert!(out.total_solutions > 0);
    for p in &out.portfolios {
        assert_sound(catalog, &params, &p.strategies);
        assert!((p.score - (p.total_return - p.total_risk)).abs() < 1e-12);
    }
}

#[test]
fn test_identical_inputs_give_identical_output() {
    let params = ConstraintParams::new(0.8, 0.1, 4, LiquidityPolicy::Balanced);
    let a = search(sample_catalog(), &params, &SearchOptions::all(), &CancelToken::new()).unwrap();
    let b = search(sample_catalog(), &params, &SearchOptions::all(), &CancelToken::new()).unwrap();
    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
}

#[test]
fn test_oversized_strategy_never_appears() {
    let mut strategies: Vec<Strategy> = sample_catalog().iter().cloned().collect();
    let params = ConstraintParams::new(0.6, 0.05, 3, LiquidityPolicy::Aggressive);
    let base = StrategyCatalog::new(strategies.clone()).unwrap();

    strategies.insert(3, Strategy::new("LEVERAGED", 0.5, 0.61, LiquidityTier::High));
    let with_big = StrategyCatalog::new(strategies).unwrap();

    let out = search(&with_big, &params, &SearchOptions::all(), &CancelToken::new()).unwrap();
    assert!(out.portfolios.iter().all(|p| !p.contains("LEVERAGED")));
    let sets = engine_sets(&with_big, &params);
    assert_eq!(sets, engine_sets(&base, &params));
}

#[test]
fn test_min_return_above_catalog_total_is_empty() {
    let catalog = sample_catalog();
    for policy in [LiquidityPolicy::Conservative, LiquidityPolicy::Aggressive] {
        let params = ConstraintParams::new(10.0, catalog.total_return() + 1e-9, 9, policy);
        let out = search(catalog, &params, &SearchOptions::all(), &CancelToken::new()).unwrap();
        assert_eq!(out.total_solutions, 0);
        assert!(out.portfolios.is_empty());
        assert!(!out.is_truncated());
    }
}

#[test]
fn test_ranked_output_is_stable_under_rerank() {
    let params = ConstraintParams::new(1.0, 0.05, 4, LiquidityPolicy::Aggressive);
    let out = search(sample_catalog(), &params, &SearchOptions::all(), &CancelToken::new()).unwrap();
    let mut again = out.portfolios.clone();
    portfolio::rank(&mut again);
    assert_eq!(again, out.portfolios);
}

/// Cancels `token` once the engine has reported `after` solutions.
struct CancelAfter {
    token: CancelToken,
    after: usize,
    seen: AtomicUsize,
}

impl<S: tracing::Subscriber> Layer<S> for CancelAfter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target() != "csp_portfolio::engine" || *meta.level() != tracing::Level::TRACE {
            return;
        }
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.token.cancel();
        }
    }
}

#[test]
fn test_cancel_mid_search_returns_partial() {
    // 14 zero-risk strategies, every non-empty subset is feasible.
    let specs: Vec<(f64, f64, u8)> = (0..14).map(|_| (0.01, 0.0, 0)).collect();
    let catalog = catalog_from(&specs);
    let params = ConstraintParams::new(1.0, 0.0, 14, LiquidityPolicy::Aggressive);
    let cancel = CancelToken::new();
    let subscriber = tracing_subscriber::registry().with(CancelAfter {
        token: cancel.clone(),
        after: 5,
        seen: AtomicUsize::new(0),
    });

    let out = tracing::subscriber::with_default(subscriber, || {
        search(&catalog, &params, &SearchOptions::all(), &cancel).unwrap()
    });

    assert!(cancel.is_cancelled());
    assert_eq!(out.truncation, Some(Truncation::Cancelled));
    assert_eq!(out.total_solutions, 5);
    assert_eq!(out.portfolios.len(), 5);
    for p in &out.portfolios {
        assert_sound(&catalog, &params, &p.strategies);
    }
    // Include-first order: the first solution takes every strategy.
    assert!(out.portfolios.iter().any(|p| p.len() == 14));
}

#[test]
fn test_liquidity_predicate_on_boundary_pair() {
    let catalog = StrategyCatalog::new(vec![
        Strategy::new("Conservative", 0.06, 0.2, LiquidityTier::High),
        Strategy::new("Moderate", 0.09, 0.4, LiquidityTier::Medium),
        Strategy::new("Aggressive", 0.15, 0.7, LiquidityTier::Low),
    ])
    .unwrap();
    let params = ConstraintParams::new(0.6, 0.10, 2, LiquidityPolicy::Balanced);
    let pair = Selection::from_names(&catalog, &["Conservative", "Moderate"]).unwrap();

    assert!(liquidity_mix_holds(1, 2, 0.4));
    assert!(Constraint::LiquidityMix.holds(&catalog, &pair, &params));
    assert!(!Constraint::Risk.holds(&catalog, &pair, &params));
    assert!(engine_sets(&catalog, &params).is_empty());
    assert!(brute_force(&catalog, &params).is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn property_engine_matches_brute_force(
        specs in prop::collection::vec((0.0f64..0.2, 0.0f64..0.6, 0u8..3), 0..=10),
        max_risk in 0.0f64..2.0,
        min_return in 0.0f64..0.5,
        max_count in 1usize..6,
        policy in 0u8..3,
    ) {
        let catalog = catalog_from(&specs);
        let params = ConstraintParams::new(max_risk, min_return, max_count, policy_from(policy));

        let engine = engine_sets(&catalog, &params);
        prop_assert_eq!(&engine, &brute_force(&catalog, &params));
        for names in &engine {
            let names: Vec<String> = names.iter().cloned().collect();
            assert_sound(&catalog, &params, &names);
        }
    }

    #[test]
    fn property_parallel_split_matches_sequential(
        specs in prop::collection::vec((0.0f64..0.2, 0.0f64..0.6, 0u8..3), 0..=10),
        max_risk in 0.0f64..2.0,
        max_count in 1usize..6,
        cap in prop::option::of(1usize..20),
    ) {
        let catalog = catalog_from(&specs);
        let params = ConstraintParams::new(max_risk, 0.0, max_count, LiquidityPolicy::Aggressive);
        let options = SearchOptions { max_solutions: cap, top_n: None };

        let seq = search(&catalog, &params, &options, &CancelToken::new()).unwrap();
        let par = search_parallel(&catalog, &params, &options, &CancelToken::new()).unwrap();
        prop_assert_eq!(seq.portfolios, par.portfolios);
        prop_assert_eq!(seq.total_solutions, par.total_solutions);
        prop_assert_eq!(seq.truncation, par.truncation);
    }
}
