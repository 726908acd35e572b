//! Property tests for query evaluation.
//!
//! Generates random boolean expressions and payloads, then checks the engine against
//! a reference evaluator, the optimizer against the unoptimized query, and the
//! fast-yielding mode against the strict one.

use proptest::prelude::*;
use std::collections::HashSet;
use std::rc::Rc;

use sift_query::{EvaluationMode, Filter, OptimizerOptions, QueryEngine};

#[derive(Debug, Clone)]
enum Expr {
    Less(i64),
    Even,
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn render(&self) -> String {
        match self {
            Expr::Less(k) => format!("n<{}", k),
            Expr::Even => "even:true".to_string(),
            Expr::Not(inner) => format!("-({})", inner.render()),
            Expr::And(a, b) => format!("({} and {})", a.render(), b.render()),
            Expr::Or(a, b) => format!("({} or {})", a.render(), b.render()),
        }
    }

    /// Reference implementation
    fn eval(&self, n: i64) -> bool {
        match self {
            Expr::Less(k) => n < *k,
            Expr::Even => n % 2 == 0,
            Expr::Not(inner) => !inner.eval(n),
            Expr::And(a, b) => a.eval(n) && b.eval(n),
            Expr::Or(a, b) => a.eval(n) || b.eval(n),
        }
    }
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![(-20i64..20).prop_map(Expr::Less), Just(Expr::Even)];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Expr::Not(Box::new(e))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::And(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Expr::Or(Box::new(a), Box::new(b))),
        ]
    })
}

fn engine() -> QueryEngine<i64> {
    let mut engine = QueryEngine::new();
    engine.add_filter(Filter::new("n", |n: &i64| *n));
    engine.add_filter(Filter::new("even", |n: &i64| n % 2 == 0));
    engine
}

/// Engine whose nested queries `{a}` and `{b}` resolve to the given lists.
fn set_engine(a: Vec<i64>, b: Vec<i64>) -> QueryEngine<i64> {
    let (a, b) = (Rc::new(a), Rc::new(b));
    let mut engine = engine();
    engine.set_nested_query_handler(move |query: &str, _filter: &str| match query {
        "a" => a.as_ref().clone(),
        "b" => b.as_ref().clone(),
        _ => Vec::new(),
    });
    engine
}

proptest! {
    #[test]
    fn strict_results_match_reference(
        expr in arb_expr(),
        payload in prop::collection::vec(-25i64..25, 0..30),
    ) {
        let query = engine().parse(&expr.render());
        prop_assert!(query.errors().is_empty(), "{:?}", query.errors());

        let expected: Vec<i64> = payload.iter().copied().filter(|n| expr.eval(*n)).collect();
        let actual: Vec<i64> = query.apply(payload.clone()).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn optimization_preserves_results(
        expr in arb_expr(),
        propagate_not in any::<bool>(),
        swap_not_to_right in any::<bool>(),
    ) {
        let engine = engine();
        let text = expr.render();
        let expected: Vec<i64> = engine.parse(&text).apply(-25..25).collect();

        let mut query = engine.parse(&text);
        query.optimize(OptimizerOptions { propagate_not, swap_not_to_right });
        prop_assert!(query.errors().is_empty(), "{:?}", query.errors());
        prop_assert!(query.graph().validate().is_empty());

        let actual: Vec<i64> = query.apply(-25..25).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn double_negation_collapses_to_operand(expr in arb_expr()) {
        let engine = engine();
        let text = expr.render();

        let mut plain = engine.parse(&text);
        plain.optimize(OptimizerOptions::default());
        let mut doubled = engine.parse(&format!("not not ({})", text));
        doubled.optimize(OptimizerOptions::default());

        prop_assert!(doubled.errors().is_empty(), "{:?}", doubled.errors());
        prop_assert_eq!(doubled.graph().to_string(), plain.graph().to_string());
    }

    #[test]
    fn fast_where_is_aligned_with_payload(
        expr in arb_expr(),
        payload in prop::collection::vec(-25i64..25, 0..30),
    ) {
        let query = engine().parse_with_mode(&expr.render(), EvaluationMode::FastYielding);
        let aligned: Vec<Option<i64>> = query.apply_aligned(payload.clone()).collect();

        prop_assert_eq!(aligned.len(), payload.len());
        for (slot, n) in aligned.iter().zip(&payload) {
            prop_assert_eq!(*slot, expr.eval(*n).then_some(*n));
        }
    }

    #[test]
    fn fast_set_operations_match_strict(
        a in prop::collection::vec(0i64..10, 0..12),
        b in prop::collection::vec(0i64..10, 0..12),
        union in any::<bool>(),
    ) {
        let engine = set_engine(a.clone(), b.clone());
        let text = if union { "{a} or {b}" } else { "{a} {b}" };

        let strict: Vec<i64> = engine.parse(text).apply(Vec::new()).collect();
        let fast: Vec<Option<i64>> = engine
            .parse_with_mode(text, EvaluationMode::FastYielding)
            .apply_aligned(Vec::new())
            .collect();

        // One slot per element pulled from either side.
        prop_assert_eq!(fast.len(), a.len() + b.len());

        let strict_set: HashSet<i64> = strict.iter().copied().collect();
        prop_assert_eq!(strict_set.len(), strict.len());

        let yielded: Vec<i64> = fast.into_iter().flatten().collect();
        let fast_set: HashSet<i64> = yielded.iter().copied().collect();
        prop_assert_eq!(fast_set.len(), yielded.len());
        prop_assert_eq!(fast_set, strict_set.clone());

        let (a, b): (HashSet<i64>, HashSet<i64>) = (a.into_iter().collect(), b.into_iter().collect());
        let expected: HashSet<i64> = if union {
            a.union(&b).copied().collect()
        } else {
            a.intersection(&b).copied().collect()
        };
        prop_assert_eq!(strict_set, expected);
    }
}
