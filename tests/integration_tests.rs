// tests/integration_tests.rs

use std::{cell::Cell, rc::Rc};

use sift_query::{
    EngineError, EvaluationMode, Filter, FilterArgs, ParseResult, QueryEngine, QueryErrorKind,
    StringComparison, ValidationOptions, Value, ValueType,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Asset {
    id: u32,
    name: &'static str,
    kind: &'static str,
    size: i64,
    visible: bool,
}

fn assets() -> Vec<Asset> {
    vec![
        Asset { id: 1, name: "big rock", kind: "prefab", size: 40, visible: true },
        Asset { id: 2, name: "pebble", kind: "prefab", size: 2, visible: false },
        Asset { id: 3, name: "oak tree", kind: "model", size: 25, visible: true },
        Asset { id: 4, name: "rock texture", kind: "texture", size: 8, visible: true },
    ]
}

fn engine() -> QueryEngine<Asset> {
    let mut engine = QueryEngine::new();
    engine.add_filter(Filter::new("id", |a: &Asset| a.id));
    engine.add_filter(Filter::new("name", |a: &Asset| a.name.to_string()));
    engine.add_filter(
        Filter::new("kind", |a: &Asset| a.kind.to_string())
            .nested_transformer(|a: &Asset| Some(a.kind.to_string())),
    );
    engine.add_filter(Filter::new("size", |a: &Asset| a.size));
    engine.add_filter(Filter::new("visible", |a: &Asset| a.visible));
    engine.set_search_data_callback(|a: &Asset| [a.name, a.kind]);
    engine.set_nested_query_handler(|query: &str, _filter: &str| {
        self::engine().parse(query).apply(assets()).collect::<Vec<_>>()
    });
    engine
}

fn ids(engine: &QueryEngine<Asset>, input: &str) -> Vec<u32> {
    let query = engine.parse(input);
    assert!(
        query.errors().is_empty(),
        "unexpected errors for {:?}: {:?}",
        input,
        query.errors()
    );
    query.apply(assets()).map(|a| a.id).collect()
}

fn aligned_ids(engine: &QueryEngine<Asset>, input: &str) -> Vec<Option<u32>> {
    let query = engine.parse_with_mode(input, EvaluationMode::FastYielding);
    assert!(query.errors().is_empty(), "{:?}", query.errors());
    query
        .apply_aligned(assets())
        .map(|a| a.map(|a| a.id))
        .collect()
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn test_word_search() {
    let engine = engine();
    assert_eq!(ids(&engine, "rock"), vec![1, 4]);
    assert_eq!(ids(&engine, "ROCK"), vec![1, 4]);
    assert_eq!(ids(&engine, "prefab"), vec![1, 2]);
}

#[test]
fn test_phrase_and_exact_search() {
    let engine = engine();
    assert_eq!(ids(&engine, "\"oak tree\""), vec![3]);
    assert_eq!(ids(&engine, "!pebble"), vec![2]);
    assert_eq!(ids(&engine, "!peb"), Vec::<u32>::new());
    assert_eq!(ids(&engine, "!\"rock texture\""), vec![4]);
}

#[test]
fn test_custom_word_matcher() {
    let mut engine = engine();
    engine.set_search_word_matcher(|word, candidate| candidate.starts_with(word));
    assert_eq!(ids(&engine, "roc"), vec![4]);
    // Exact words keep their equality semantics.
    assert_eq!(ids(&engine, "!model"), vec![3]);
}

#[test]
fn test_search_without_callback() {
    let mut engine: QueryEngine<Asset> = QueryEngine::new();
    engine.add_filter(Filter::new("size", |a: &Asset| a.size));
    let query = engine.parse("rock");
    assert_eq!(query.errors().len(), 1);
    assert_eq!(query.errors()[0].kind, QueryErrorKind::Semantic);
    assert!(query.errors()[0].reason.contains("No search data callback"));
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_numeric_filters() {
    let engine = engine();
    assert_eq!(ids(&engine, "size>=25"), vec![1, 3]);
    assert_eq!(ids(&engine, "size<8"), vec![2]);
    assert_eq!(ids(&engine, "size<=8"), vec![2, 4]);
    assert_eq!(ids(&engine, "size!=40"), vec![2, 3, 4]);
    assert_eq!(ids(&engine, "size:25"), vec![3]);
}

#[test]
fn test_mixed_numeric_types() {
    let engine = engine();
    assert_eq!(ids(&engine, "size=40.0"), vec![1]);
    assert_eq!(ids(&engine, "size<2.5"), vec![2]);
}

#[test]
fn test_string_and_boolean_filters() {
    let engine = engine();
    assert_eq!(ids(&engine, "name:rock"), vec![1, 4]);
    assert_eq!(ids(&engine, "name=pebble"), vec![2]);
    assert_eq!(ids(&engine, "kind=PREFAB"), vec![1, 2]);
    assert_eq!(ids(&engine, "visible:false"), vec![2]);
    assert_eq!(ids(&engine, "name<c"), vec![1]);
}

#[test]
fn test_ordinal_string_comparison() {
    let mut engine = engine();
    engine.set_string_comparison(StringComparison::Ordinal);
    assert_eq!(ids(&engine, "kind=PREFAB"), Vec::<u32>::new());
    assert_eq!(ids(&engine, "kind=prefab"), vec![1, 2]);
}

#[test]
fn test_filter_string_comparison_override() {
    let mut engine = engine();
    engine.set_string_comparison(StringComparison::Ordinal);
    engine.add_filter(
        Filter::new("label", |a: &Asset| a.name.to_string())
            .string_comparison(StringComparison::IgnoreCase),
    );
    assert_eq!(ids(&engine, "label:ROCK"), vec![1, 4]);
}

#[test]
fn test_unparseable_value_is_an_error() {
    let engine = engine();
    let query = engine.parse("size>=abc");
    assert!(!query.is_valid());
    assert_eq!(query.errors().len(), 1);
    assert_eq!(query.errors()[0].kind, QueryErrorKind::Semantic);
    assert_eq!(
        query.errors()[0].reason,
        "Could not parse 'abc' as a value for filter 'size' (integer)"
    );
}

#[test]
fn test_combinators() {
    let engine = engine();
    assert_eq!(ids(&engine, "rock or tree"), vec![1, 3, 4]);
    assert_eq!(ids(&engine, "rock size>10"), vec![1]);
    assert_eq!(ids(&engine, "-rock"), vec![2, 3]);
    assert_eq!(ids(&engine, "not (rock or tree)"), vec![2]);
    assert_eq!(ids(&engine, "prefab -visible:true or model"), vec![2, 3]);
}

#[test]
fn test_parametrized_filter() {
    let mut engine = engine();
    engine.add_filter(Filter::with_parameter("bit", |a: &Asset, bit: u32| {
        (a.size >> bit) & 1 == 1
    }));
    assert_eq!(ids(&engine, "bit(3):true"), vec![1, 3, 4]);
    assert_eq!(ids(&engine, "bit(1):true"), vec![2]);
    // Without a parameter the getter has nothing to read.
    assert_eq!(ids(&engine, "bit:true"), Vec::<u32>::new());

    let query = engine.parse("size(2)>1");
    assert_eq!(
        query.errors()[0].reason,
        "Filter 'size' does not take a parameter"
    );

    let query = engine.parse("bit(x):true");
    assert!(query.errors()[0].reason.contains("Could not parse parameter 'x'"));
}

#[test]
fn test_pattern_filter() {
    let mut engine = engine();
    let filter = Filter::pattern(r"len_(\d+)", ValueType::Boolean, |a: &Asset, args: &FilterArgs| {
        let len: usize = args.captures.first()?.parse().ok()?;
        Some(Value::Boolean(a.name.len() == len))
    })
    .expect("valid pattern");
    assert!(engine.add_filter(filter));

    assert_eq!(ids(&engine, "len_8:true"), vec![1, 3]);
    assert_eq!(ids(&engine, "len_6=true"), vec![2]);
    assert!(!engine.parse("len_x:true").is_valid());
}

#[test]
fn test_resolver_filter() {
    let mut engine = engine();
    engine.add_filter(Filter::resolver(
        "near",
        ValueType::Integer,
        |a: &Asset, _args: &FilterArgs, operator: &str, value: &Value| match (operator, value) {
            (":", Value::Integer(n)) => (a.size - n).abs() <= 5,
            _ => false,
        },
    ));
    assert_eq!(ids(&engine, "near:38"), vec![1]);
    assert_eq!(ids(&engine, "near:5"), vec![2, 4]);
    assert_eq!(ids(&engine, "near>5"), Vec::<u32>::new());
}

#[test]
fn test_optional_filter() {
    let mut engine = engine();
    engine.add_filter(Filter::optional("texture_size", |a: &Asset| {
        (a.kind == "texture").then_some(a.size)
    }));
    assert_eq!(ids(&engine, "texture_size>1"), vec![4]);
    assert_eq!(ids(&engine, "-texture_size>1"), vec![1, 2, 3]);
}

#[test]
fn test_custom_type_parser() {
    let mut engine = engine();
    engine.add_type_parser(ValueType::Integer, |text| {
        match text.strip_suffix('k').and_then(|n| n.parse::<i64>().ok()) {
            Some(n) => ParseResult::success(Value::Integer(n * 1000)),
            None => ParseResult::failure(),
        }
    });
    assert_eq!(ids(&engine, "size<1k"), vec![1, 2, 3, 4]);
    assert_eq!(ids(&engine, "size>10"), vec![1, 3]);
}

#[test]
fn test_filter_type_parser() {
    let mut engine = engine();
    engine.add_filter(
        Filter::new("weight", |a: &Asset| a.size).type_parser(|text| match text {
            "heavy" => ParseResult::success(Value::Integer(30)),
            _ => ParseResult::failure(),
        }),
    );
    assert_eq!(ids(&engine, "weight>=heavy"), vec![1]);
    assert_eq!(ids(&engine, "weight>=20"), vec![1, 3]);
}

#[test]
fn test_default_filter() {
    let mut engine = engine();
    engine.set_validation_options(ValidationOptions {
        validate_filters: false,
        ..ValidationOptions::default()
    });
    engine.set_default_filter(|a: &Asset, name: &str, operator: &str, value: &str| {
        name == "tag" && operator == ":" && a.name.contains(value)
    });
    assert_eq!(ids(&engine, "tag:ee"), vec![3]);
    assert_eq!(ids(&engine, "tag=ee"), Vec::<u32>::new());
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_custom_operator() {
    let mut engine = engine();
    assert!(engine.add_operator("^=").unwrap());
    engine
        .add_operator_handler("^=", ValueType::String, ValueType::String, |l, r, cmp| {
            match (l.as_str(), r.as_str()) {
                (Some(l), Some(r)) => {
                    l.len() >= r.len() && cmp.equals(&l[..r.len()], r)
                }
                _ => false,
            }
        })
        .unwrap();
    engine
        .add_typed_operator_handler::<i64, i64, _>("^=", |l, r| r != 0 && l % r == 0)
        .unwrap();

    assert_eq!(ids(&engine, "name^=ROCK"), vec![4]);
    assert_eq!(ids(&engine, "size^=4"), vec![1, 4]);
}

#[test]
fn test_operator_registration_errors() {
    let mut engine = engine();
    assert!(matches!(
        engine.add_operator("a b"),
        Err(EngineError::InvalidOperatorToken(_))
    ));
    assert!(matches!(
        engine.add_operator("x"),
        Err(EngineError::InvalidOperatorToken(_))
    ));
    assert!(matches!(
        engine.add_operator(""),
        Err(EngineError::InvalidOperatorToken(_))
    ));
    assert!(!engine.add_operator(">=").unwrap());
    assert!(matches!(
        engine.add_operator_handler("??", ValueType::Any, ValueType::Any, |_, _, _| true),
        Err(EngineError::UnknownOperator(_))
    ));
}

#[test]
fn test_missing_handler_is_an_error() {
    let mut engine = engine();
    engine.add_operator("~").unwrap();
    let query = engine.parse("size~3");
    assert_eq!(query.errors().len(), 1);
    assert!(query.errors()[0].reason.contains("operator '~'"));
}

#[test]
fn test_fallback_handler() {
    let mut engine = engine();
    engine.add_operator("?").unwrap();
    engine
        .add_operator_handler("?", ValueType::Any, ValueType::Any, |l, r, _| {
            l.to_string().len() == r.to_string().len()
        })
        .unwrap();
    assert_eq!(ids(&engine, "size?10"), vec![1, 3]);
}

#[test]
fn test_handler_against_any_right_hand_side() {
    let mut engine = engine();
    engine.add_operator("~").unwrap();
    engine
        .add_operator_handler("~", ValueType::Integer, ValueType::Any, |l, r, _| {
            match (l.as_float(), r.as_str()) {
                (Some(size), Some(text)) => size >= text.len() as f64 * 10.0,
                _ => false,
            }
        })
        .unwrap();

    let query = engine.parse("size~abc");
    assert!(query.errors().is_empty(), "{:?}", query.errors());
    assert_eq!(ids(&engine, "size~abc"), vec![1]);
    assert_eq!(ids(&engine, "size~ab"), vec![1, 3]);
}

// ============================================================================
// Nested Queries
// ============================================================================

#[test]
fn test_nested_query_root() {
    let engine = engine();
    assert_eq!(ids(&engine, "{size>10}"), vec![1, 3]);
}

#[test]
fn test_set_operations() {
    let engine = engine();
    assert_eq!(ids(&engine, "{size>10} {rock}"), vec![1]);
    assert_eq!(ids(&engine, "{size>10} or {rock}"), vec![1, 3, 4]);
    assert_eq!(ids(&engine, "{rock} or {rock}"), vec![1, 4]);
}

#[test]
fn test_filter_with_nested_query() {
    let engine = engine();
    assert_eq!(ids(&engine, "kind:{size>30}"), vec![1, 2]);
    assert_eq!(ids(&engine, "kind:{tree} or kind:{pebble}"), vec![1, 2, 3]);
    assert_eq!(ids(&engine, "kind:{nothing}"), Vec::<u32>::new());
}

#[test]
fn test_nested_query_receives_filter_name() {
    let seen: Rc<std::cell::RefCell<Vec<(String, String)>>> = Rc::default();
    let mut engine = engine();
    let log = Rc::clone(&seen);
    engine.set_nested_query_handler(move |query: &str, filter: &str| {
        log.borrow_mut().push((query.to_string(), filter.to_string()));
        assets()
    });

    let _ = ids(&engine, "kind:{ a b }");
    let _ = ids(&engine, "{c}");
    assert_eq!(
        seen.borrow().first(),
        Some(&("a b".to_string(), "kind".to_string()))
    );
    assert_eq!(
        seen.borrow().last(),
        Some(&("c".to_string(), String::new()))
    );
}

#[test]
fn test_nested_filter_without_transformer() {
    let engine = engine();
    let query = engine.parse("size:{rock}");
    assert_eq!(query.errors().len(), 1);
    assert_eq!(
        query.errors()[0].reason,
        "Filter 'size' has no nested query transformer"
    );
}

#[test]
fn test_nested_queries_are_lazy() {
    let calls = Rc::new(Cell::new(0));
    let mut engine = engine();
    let counter = Rc::clone(&calls);
    engine.set_nested_query_handler(move |_query: &str, _filter: &str| {
        counter.set(counter.get() + 1);
        assets()
    });

    let query = engine.parse("{a} or {b}");
    let mut results = query.apply(assets());
    assert_eq!(calls.get(), 0);
    assert!(results.next().is_some());
    assert!(calls.get() >= 1);
}

// ============================================================================
// Aggregators
// ============================================================================

#[test]
fn test_builtin_aggregators() {
    let engine = engine();
    assert_eq!(ids(&engine, "first{rock}"), vec![1]);
    assert_eq!(ids(&engine, "last{rock}"), vec![4]);
    assert_eq!(ids(&engine, "first{nothing}"), Vec::<u32>::new());
    assert_eq!(ids(&engine, "kind:last{size>20}"), vec![3]);
}

#[test]
fn test_ordering_aggregators() {
    let mut engine = engine();
    assert!(engine.add_ordering_aggregators(|a: &Asset| Some(Value::Integer(a.size))));
    assert_eq!(ids(&engine, "max{visible:true}"), vec![1]);
    assert_eq!(ids(&engine, "min{visible:true}"), vec![4]);
    assert_eq!(ids(&engine, "max{rock} or min{prefab}"), vec![1, 2]);
    assert!(!engine.add_ordering_aggregators(|a: &Asset| Some(Value::Integer(a.size))));
}

#[test]
fn test_custom_aggregator() {
    let mut engine = engine();
    assert!(engine.add_nested_query_aggregator("top2", |items: Vec<Asset>| {
        items.into_iter().take(2).collect()
    }));
    assert!(!engine.add_nested_query_aggregator("first", |items: Vec<Asset>| items));
    assert_eq!(ids(&engine, "top2{size>1}"), vec![1, 2]);
}

// ============================================================================
// Evaluation Modes
// ============================================================================

#[test]
fn test_fast_yielding_where() {
    let engine = engine();
    assert_eq!(
        aligned_ids(&engine, "rock"),
        vec![Some(1), None, None, Some(4)]
    );
}

#[test]
fn test_fast_yielding_union() {
    let engine = engine();
    // Left yields 1, 3; right yields 1, 4; sides alternate.
    assert_eq!(
        aligned_ids(&engine, "{size>10} or {rock}"),
        vec![Some(1), None, Some(3), Some(4)]
    );
}

#[test]
fn test_fast_yielding_intersection() {
    let engine = engine();
    assert_eq!(
        aligned_ids(&engine, "{size>10} {rock}"),
        vec![None, Some(1), None, None]
    );
}

#[test]
fn test_apply_drops_placeholders() {
    let engine = engine();
    let query = engine.parse_with_mode("rock", EvaluationMode::FastYielding);
    let ids: Vec<u32> = query.apply(assets()).map(|a| a.id).collect();
    assert_eq!(ids, vec![1, 4]);
}

// ============================================================================
// Query Behavior
// ============================================================================

#[test]
fn test_empty_query_returns_payload() {
    let engine = engine();
    let mut query = engine.parse("");
    assert_eq!(query.apply(assets()).count(), 4);
    query.set_return_payload_if_empty(false);
    assert_eq!(query.apply(assets()).count(), 0);
}

#[test]
fn test_invalid_query_returns_payload() {
    let engine = engine();
    let mut query = engine.parse("size>=abc");
    assert!(query.return_payload_if_empty());
    assert_eq!(query.apply(assets()).count(), 4);
    query.set_return_payload_if_empty(false);
    assert_eq!(query.apply(assets()).count(), 0);
    assert!(!query.test(&assets()[0]));
}

#[test]
fn test_single_element() {
    let engine = engine();
    let query = engine.parse("size>10");
    let all = assets();
    assert!(query.test(&all[0]));
    assert!(!query.test(&all[1]));

    let nested = engine.parse("{rock}");
    assert!(nested.test(&all[3]));
    assert!(!nested.test(&all[2]));
}

#[test]
fn test_query_outlives_engine() {
    let query = {
        let engine = engine();
        engine.parse("rock")
    };
    assert_eq!(query.apply(assets()).count(), 2);
}

#[test]
fn test_registrations_after_parse_do_not_change_query() {
    let mut engine = engine();
    let query = engine.parse("weight>1");
    assert!(!query.is_valid());
    engine.add_filter(Filter::new("weight", |a: &Asset| a.size));
    assert!(!query.is_valid());
    assert!(engine.parse("weight>1").is_valid());
}

#[test]
fn test_duplicate_filter_is_rejected() {
    let mut engine = engine();
    assert!(!engine.add_filter(Filter::new("SIZE", |a: &Asset| a.size * 2)));
    assert_eq!(ids(&engine, "size>30"), vec![1]);
}
