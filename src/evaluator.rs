use std::{collections::HashSet, hash::Hash, iter, rc::Rc};

use log::debug;

use crate::{
    ast::{FilterExpression, NodeId, QueryGraph, QueryNodeKind, QueryToken, SearchExpression},
    error::QueryError,
    filter::{Filter, FilterArgs, FilterSource},
    nested::{AggregatorFn, NestedQueryHandler},
    operator::FilterOperator,
    registry::{FilterMatch, Registry},
    value::{Value, ValueType},
};

/// Compiled boolean sub-tree.
pub type Predicate<T> = Rc<dyn Fn(&T) -> bool>;

/// Result stream of an enumerable node. `None` is the fast-yielding placeholder; strict
/// streams never contain it.
pub type Results<'a, T> = Box<dyn Iterator<Item = Option<T>> + 'a>;

fn predicate<T, F>(f: F) -> Predicate<T>
where
    F: Fn(&T) -> bool + 'static,
{
    Rc::new(f)
}

fn never<T>() -> Predicate<T> {
    predicate(|_| false)
}

/// How set operations and `Where` treat non-matching elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// Set semantics: non-matches are dropped, results are deduplicated.
    #[default]
    Strict,

    /// Position-preserving: every input element yields exactly one output, `None`
    /// where it does not take part in the result.
    FastYielding,
}

/// An enumerable node compiled against a registry snapshot.
pub enum CompiledNode<T> {
    /// Filters the payload.
    Where(Predicate<T>),
    Intersection(Box<CompiledNode<T>>, Box<CompiledNode<T>>),
    Union(Box<CompiledNode<T>>, Box<CompiledNode<T>>),
    /// Resolved by the nested query handler each time it is enumerated.
    Nested {
        query: String,
        filter: String,
        handler: NestedQueryHandler<T>,
    },
    Aggregate {
        aggregator: AggregatorFn<T>,
        source: Box<CompiledNode<T>>,
    },
    /// Stand-in for a node that failed to compile. Yields nothing.
    Empty,
}

impl<T: Clone + Eq + Hash + 'static> CompiledNode<T> {
    /// Lazily evaluates the node. Only `Where` reads `payload`; nested queries are
    /// resolved on the first pull.
    pub fn enumerate<'a>(
        &self,
        payload: Box<dyn Iterator<Item = T> + 'a>,
        mode: EvaluationMode,
    ) -> Results<'a, T> {
        match self {
            CompiledNode::Where(predicate) => {
                let predicate = Rc::clone(predicate);
                match mode {
                    EvaluationMode::Strict => {
                        Box::new(payload.filter(move |e| predicate(e)).map(Some))
                    }
                    EvaluationMode::FastYielding => {
                        Box::new(payload.map(move |e| predicate(&e).then_some(e)))
                    }
                }
            }
            CompiledNode::Intersection(left, right) => {
                let left = left.enumerate(Box::new(iter::empty()), mode);
                let right = right.enumerate(Box::new(iter::empty()), mode);
                match mode {
                    EvaluationMode::Strict => Box::new(StrictIntersection::new(left, right)),
                    EvaluationMode::FastYielding => {
                        Box::new(FastSetOperation::new(SetOperation::Intersection, left, right))
                    }
                }
            }
            CompiledNode::Union(left, right) => {
                let left = left.enumerate(Box::new(iter::empty()), mode);
                let right = right.enumerate(Box::new(iter::empty()), mode);
                match mode {
                    EvaluationMode::Strict => Box::new(StrictUnion::new(left, right)),
                    EvaluationMode::FastYielding => {
                        Box::new(FastSetOperation::new(SetOperation::Union, left, right))
                    }
                }
            }
            CompiledNode::Nested {
                query,
                filter,
                handler,
            } => {
                let handler = Rc::clone(handler);
                let query = query.clone();
                let filter = filter.clone();
                Box::new(
                    iter::once(())
                        .flat_map(move |_| handler(&query, &filter))
                        .map(Some),
                )
            }
            CompiledNode::Aggregate { aggregator, source } => {
                let aggregator = Rc::clone(aggregator);
                let items = source.enumerate(Box::new(iter::empty()), mode);
                let mut items = Some(items);
                Box::new(
                    iter::once(())
                        .flat_map(move |_| {
                            let collected: Vec<T> =
                                items.take().into_iter().flatten().flatten().collect();
                            aggregator(collected)
                        })
                        .map(Some),
                )
            }
            CompiledNode::Empty => Box::new(iter::empty()),
        }
    }

    /// Elements of the node under strict semantics.
    pub fn results(&self) -> impl Iterator<Item = T> {
        self.enumerate(Box::new(iter::empty()), EvaluationMode::Strict)
            .flatten()
    }
}

/// Left elements also present on the right, deduplicated, in left order.
struct StrictIntersection<'a, T> {
    left: Results<'a, T>,
    right: Option<Results<'a, T>>,
    right_set: HashSet<T>,
    emitted: HashSet<T>,
}

impl<'a, T: Clone + Eq + Hash + 'a> StrictIntersection<'a, T> {
    fn new(left: Results<'a, T>, right: Results<'a, T>) -> Self {
        StrictIntersection {
            left: Box::new(left.fuse()),
            right: Some(right),
            right_set: HashSet::new(),
            emitted: HashSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> Iterator for StrictIntersection<'_, T> {
    type Item = Option<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(right) = self.right.take() {
            self.right_set.extend(right.flatten());
        }
        for item in self.left.by_ref().flatten() {
            if self.right_set.contains(&item) && self.emitted.insert(item.clone()) {
                return Some(Some(item));
            }
        }
        None
    }
}

/// Left elements then new right elements, deduplicated.
struct StrictUnion<'a, T> {
    left: Results<'a, T>,
    right: Results<'a, T>,
    emitted: HashSet<T>,
}

impl<'a, T: 'a> StrictUnion<'a, T> {
    fn new(left: Results<'a, T>, right: Results<'a, T>) -> Self {
        StrictUnion {
            left: Box::new(left.fuse()),
            right,
            emitted: HashSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> Iterator for StrictUnion<'_, T> {
    type Item = Option<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let emitted = &mut self.emitted;
        self.left
            .by_ref()
            .chain(self.right.by_ref())
            .flatten()
            .find(|item| emitted.insert(item.clone()))
            .map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOperation {
    Intersection,
    Union,
}

/// Position-preserving set operation: pulls from both sides in turn and yields one
/// output per input, `None` when the input does not (yet) belong to the result.
///
/// An intersection element is yielded when its second side shows up. Repeats of an
/// element already yielded produce `None`.
struct FastSetOperation<'a, T> {
    operation: SetOperation,
    sides: [Results<'a, T>; 2],
    exhausted: [bool; 2],
    seen: [HashSet<T>; 2],
    emitted: HashSet<T>,
    turn: usize,
}

impl<'a, T> FastSetOperation<'a, T> {
    fn new(operation: SetOperation, left: Results<'a, T>, right: Results<'a, T>) -> Self {
        FastSetOperation {
            operation,
            sides: [left, right],
            exhausted: [false, false],
            seen: [HashSet::new(), HashSet::new()],
            emitted: HashSet::new(),
            turn: 0,
        }
    }
}

impl<T: Clone + Eq + Hash> Iterator for FastSetOperation<'_, T> {
    type Item = Option<T>;

    fn next(&mut self) -> Option<Self::Item> {
        for _ in 0..2 {
            let side = self.turn;
            self.turn = 1 - self.turn;
            if self.exhausted[side] {
                continue;
            }
            let Some(item) = self.sides[side].next() else {
                self.exhausted[side] = true;
                continue;
            };
            let Some(element) = item else {
                return Some(None);
            };
            let yielded = match self.operation {
                SetOperation::Union => self.emitted.insert(element.clone()),
                SetOperation::Intersection => {
                    self.seen[side].insert(element.clone());
                    self.seen[1 - side].contains(&element) && self.emitted.insert(element.clone())
                }
            };
            return Some(yielded.then_some(element));
        }
        None
    }
}

/// Compiles the evaluation graph. Node-local failures are appended to `errors` and
/// compiled as stubs that never match.
pub fn compile<T: Clone + Eq + Hash + 'static>(
    graph: &QueryGraph,
    registry: &Registry<T>,
    errors: &mut Vec<QueryError>,
) -> Option<CompiledNode<T>> {
    let root = graph.root()?;
    let before = errors.len();
    let compiled = Compiler {
        registry,
        errors: &mut *errors,
    }
    .enumerable(graph, root);
    debug!(
        "compiled {} with {} error(s)",
        graph,
        errors.len() - before
    );
    Some(compiled)
}

struct Compiler<'a, T> {
    registry: &'a Registry<T>,
    errors: &'a mut Vec<QueryError>,
}

impl<T: Clone + Eq + Hash + 'static> Compiler<'_, T> {
    fn error(&mut self, token: &QueryToken, reason: impl Into<String>) {
        self.errors.push(QueryError::semantic_at(token, reason));
    }

    fn internal(&mut self, token: &QueryToken, reason: impl Into<String>) {
        self.errors
            .push(QueryError::internal(token.position, token.length, reason));
    }

    // ========================================
    // Sequences
    // ========================================

    fn enumerable(&mut self, graph: &QueryGraph, id: NodeId) -> CompiledNode<T> {
        let registry = self.registry;
        let node = graph.node(id);
        match (&node.kind, node.children.as_slice()) {
            (QueryNodeKind::Where, [child]) => CompiledNode::Where(self.predicate(graph, *child)),
            (QueryNodeKind::Intersection, [left, right]) => CompiledNode::Intersection(
                Box::new(self.enumerable(graph, *left)),
                Box::new(self.enumerable(graph, *right)),
            ),
            (QueryNodeKind::Union, [left, right]) => CompiledNode::Union(
                Box::new(self.enumerable(graph, *left)),
                Box::new(self.enumerable(graph, *right)),
            ),
            (QueryNodeKind::NestedQuery(nested), []) => match &registry.nested_handler {
                Some(handler) => CompiledNode::Nested {
                    query: nested.query.clone(),
                    filter: nested.filter.clone().unwrap_or_default(),
                    handler: Rc::clone(handler),
                },
                None => {
                    self.error(&node.token, "No nested query handler registered");
                    CompiledNode::Empty
                }
            },
            (QueryNodeKind::Aggregator(name), [child]) => {
                match registry.aggregators.get(name) {
                    Some(aggregator) => CompiledNode::Aggregate {
                        aggregator: Rc::clone(aggregator),
                        source: Box::new(self.enumerable(graph, *child)),
                    },
                    None => {
                        self.error(&node.token, format!("Unknown aggregator '{}'", name));
                        CompiledNode::Empty
                    }
                }
            }
            (kind, _) => {
                self.internal(
                    &node.token,
                    format!("{} node cannot be enumerated here", kind.name()),
                );
                CompiledNode::Empty
            }
        }
    }

    // ========================================
    // Predicates
    // ========================================

    fn predicate(&mut self, graph: &QueryGraph, id: NodeId) -> Predicate<T> {
        let node = graph.node(id);
        match (&node.kind, node.children.as_slice()) {
            (QueryNodeKind::And, [left, right]) => {
                let left = self.predicate(graph, *left);
                let right = self.predicate(graph, *right);
                predicate(move |e| left(e) && right(e))
            }
            (QueryNodeKind::Or, [left, right]) => {
                let left = self.predicate(graph, *left);
                let right = self.predicate(graph, *right);
                predicate(move |e| left(e) || right(e))
            }
            (QueryNodeKind::Not, [operand]) => {
                let operand = self.predicate(graph, *operand);
                predicate(move |e| !operand(e))
            }
            (QueryNodeKind::Filter(expression), []) => self.filter(expression, &node.token),
            (QueryNodeKind::FilterWithNestedQuery(expression), [child]) => {
                self.nested_filter(graph, expression, *child, &node.token)
            }
            (QueryNodeKind::Search(search), []) => self.search(search, &node.token),
            (kind, _) if kind.is_set_operand() => {
                self.error(
                    &node.token,
                    "A nested query cannot be used as a condition here",
                );
                never()
            }
            (kind, _) => {
                self.internal(
                    &node.token,
                    format!("{} node cannot be compiled as a predicate", kind.name()),
                );
                never()
            }
        }
    }

    fn filter(&mut self, expression: &FilterExpression, token: &QueryToken) -> Predicate<T> {
        let registry = self.registry;
        let Some(found) = registry.find_filter(&expression.name) else {
            return match &registry.default_filter {
                Some(default) => {
                    let default = Rc::clone(default);
                    let expression = expression.clone();
                    predicate(move |e| {
                        default(e, &expression.name, &expression.operator, &expression.value)
                    })
                }
                None => never(),
            };
        };
        let filter = found.filter;
        let Some(args) = self.filter_args(&found, expression, token) else {
            return never();
        };
        let operator = registry.operators.get(&expression.operator);

        let Some((rhs, value)) = self.coerce_value(filter, operator, &expression.value) else {
            self.error(
                token,
                format!(
                    "Could not parse '{}' as a value for filter '{}' ({})",
                    expression.value,
                    expression.name,
                    filter.value_type()
                ),
            );
            return never();
        };

        match filter.source() {
            FilterSource::Resolver(resolver) => {
                let resolver = Rc::clone(resolver);
                let operator = expression.operator.clone();
                predicate(move |e| resolver(e, &args, &operator, &value))
            }
            FilterSource::Getter(getter) => {
                let Some(handler) = self.handler(operator, filter, rhs, token, expression) else {
                    return never();
                };
                let getter = Rc::clone(getter);
                let comparison = filter
                    .string_comparison_override()
                    .unwrap_or(registry.string_comparison);
                predicate(move |e| {
                    getter(e, &args).is_some_and(|lhs| handler(&lhs, &value, comparison))
                })
            }
        }
    }

    fn nested_filter(
        &mut self,
        graph: &QueryGraph,
        expression: &FilterExpression,
        child: NodeId,
        token: &QueryToken,
    ) -> Predicate<T> {
        let registry = self.registry;
        let Some(found) = registry.find_filter(&expression.name) else {
            return never();
        };
        let filter = found.filter;
        let Some(transformer) = filter.nested() else {
            self.error(
                token,
                format!(
                    "Filter '{}' has no nested query transformer",
                    expression.name
                ),
            );
            return never();
        };
        let Some(args) = self.filter_args(&found, expression, token) else {
            return never();
        };
        let source = Rc::new(self.enumerable(graph, child));
        let transform = Rc::clone(&transformer.transform);

        match filter.source() {
            FilterSource::Resolver(resolver) => {
                let resolver = Rc::clone(resolver);
                let operator = expression.operator.clone();
                predicate(move |e| {
                    source.results().any(|result| {
                        transform(&result).is_some_and(|rhs| resolver(e, &args, &operator, &rhs))
                    })
                })
            }
            FilterSource::Getter(getter) => {
                let operator = registry.operators.get(&expression.operator);
                let Some(handler) = operator
                    .and_then(|op| op.resolve(filter.value_type(), transformer.value_type))
                    .cloned()
                else {
                    self.error(
                        token,
                        format!(
                            "No handler for operator '{}' between {} and {}",
                            expression.operator,
                            filter.value_type(),
                            transformer.value_type
                        ),
                    );
                    return never();
                };
                let getter = Rc::clone(getter);
                let comparison = filter
                    .string_comparison_override()
                    .unwrap_or(registry.string_comparison);
                predicate(move |e| {
                    let Some(lhs) = getter(e, &args) else {
                        return false;
                    };
                    source.results().any(|result| {
                        transform(&result).is_some_and(|rhs| handler(&lhs, &rhs, comparison))
                    })
                })
            }
        }
    }

    fn search(&mut self, search: &SearchExpression, token: &QueryToken) -> Predicate<T> {
        let registry = self.registry;
        let Some(data) = &registry.search_data else {
            self.error(token, "No search data callback registered");
            return never();
        };
        let data = Rc::clone(data);
        let matcher = registry.word_matcher.clone();
        let comparison = registry.string_comparison;
        let text = search.text.clone();
        let exact = search.exact;

        predicate(move |e| {
            data(e, &|candidate: &str| {
                if exact {
                    comparison.equals(candidate, &text)
                } else if let Some(matcher) = &matcher {
                    matcher(&text, candidate)
                } else {
                    comparison.contains(candidate, &text)
                }
            })
        })
    }

    // ========================================
    // Values
    // ========================================

    fn filter_args(
        &mut self,
        found: &FilterMatch<'_, T>,
        expression: &FilterExpression,
        token: &QueryToken,
    ) -> Option<FilterArgs> {
        let param = match (&expression.param, found.filter.parameter_spec()) {
            (None, _) => None,
            (Some(_), None) => {
                self.error(
                    token,
                    format!("Filter '{}' does not take a parameter", expression.name),
                );
                return None;
            }
            (Some(text), Some(spec)) => {
                let parsed = match &spec.transformer {
                    Some(transformer) => transformer(text),
                    None => self.registry.parse_value(spec.value_type, text),
                };
                let Some(param) = parsed.into_value() else {
                    self.error(
                        token,
                        format!(
                            "Could not parse parameter '{}' of filter '{}' as {}",
                            text, expression.name, spec.value_type
                        ),
                    );
                    return None;
                };
                Some(param)
            }
        };
        Some(FilterArgs {
            name: expression.name.clone(),
            param,
            captures: found.captures.clone(),
        })
    }

    /// Coerces raw value text: the filter's own parser, then every right-hand type the
    /// operator handles against the filter's type, then the filter's type. Returns the
    /// right-hand type the value was parsed as, which may be `Any`.
    fn coerce_value(
        &self,
        filter: &Filter<T>,
        operator: Option<&FilterOperator>,
        text: &str,
    ) -> Option<(ValueType, Value)> {
        if let Some(parser) = filter.custom_type_parser()
            && let Some(value) = parser(text).into_value()
        {
            return Some((value.value_type(), value));
        }
        if let Some(operator) = operator {
            for rhs in operator.rhs_types(filter.value_type()) {
                if let Some(value) = self.registry.parse_value(rhs, text).into_value() {
                    return Some((rhs, value));
                }
            }
        }
        let value = self
            .registry
            .parse_value(filter.value_type(), text)
            .into_value()?;
        Some((filter.value_type(), value))
    }

    fn handler(
        &mut self,
        operator: Option<&FilterOperator>,
        filter: &Filter<T>,
        rhs: ValueType,
        token: &QueryToken,
        expression: &FilterExpression,
    ) -> Option<crate::operator::OperatorHandler> {
        let Some(operator) = operator else {
            self.error(token, format!("Unknown operator '{}'", expression.operator));
            return None;
        };
        let handler = operator
            .resolve(filter.value_type(), rhs)
            .cloned();
        if handler.is_none() {
            self.error(
                token,
                format!(
                    "No handler for operator '{}' between {} and {}",
                    expression.operator,
                    filter.value_type(),
                    rhs
                ),
            );
        }
        handler
    }
}
