use std::{hash::Hash, iter, rc::Rc};

use log::debug;

use crate::{
    ast::{QueryGraph, QueryToken},
    error::QueryError,
    evaluator::{self, CompiledNode, EvaluationMode},
    optimizer::{self, OptimizerOptions},
    parser::ParseOutput,
    registry::Registry,
};

/// A parsed and compiled query.
///
/// Holds a snapshot of the engine's registries taken when it was parsed, so it keeps
/// working unchanged if the engine is reconfigured afterwards.
///
/// # Examples
///
/// ```
/// use sift_query::{Filter, QueryEngine};
///
/// let mut engine = QueryEngine::new();
/// engine.add_filter(Filter::new("n", |n: &i64| *n));
///
/// let query = engine.parse("n>=3 n<5");
/// assert!(query.is_valid());
/// assert_eq!(query.apply(1..=6).collect::<Vec<_>>(), vec![3, 4]);
/// assert!(query.test(&4));
/// ```
pub struct Query<T> {
    text: String,
    registry: Rc<Registry<T>>,
    query_graph: QueryGraph,
    graph: QueryGraph,
    errors: Vec<QueryError>,
    tokens: Vec<QueryToken>,
    toggles: Vec<String>,
    comments: Vec<String>,
    mode: EvaluationMode,
    return_payload_if_empty: bool,
    root: Option<CompiledNode<T>>,
}

impl<T: Clone + Eq + Hash + 'static> Query<T> {
    pub(crate) fn new(
        text: &str,
        registry: Rc<Registry<T>>,
        output: ParseOutput,
        tokens: Vec<QueryToken>,
        mode: EvaluationMode,
    ) -> Self {
        let mut query = Query {
            text: text.to_string(),
            registry,
            query_graph: output.query_graph,
            graph: output.graph,
            errors: output.errors,
            tokens,
            toggles: output.toggles,
            comments: output.comments,
            mode,
            return_payload_if_empty: true,
            root: None,
        };
        query.compile();
        debug!(
            "parsed {:?} into {} ({} error(s))",
            query.text,
            query.graph,
            query.errors.len()
        );
        query
    }

    fn compile(&mut self) {
        self.root = None;
        if self.errors.is_empty() {
            self.root = evaluator::compile(&self.graph, &self.registry, &mut self.errors);
        }
    }

    /// No errors and a non-empty graph.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && !self.graph.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn errors(&self) -> &[QueryError] {
        &self.errors
    }

    /// Located lexemes, in text order. Group contents are inlined.
    pub fn tokens(&self) -> &[QueryToken] {
        &self.tokens
    }

    /// The evaluation graph.
    pub fn graph(&self) -> &QueryGraph {
        &self.graph
    }

    /// The syntactic graph, with groups, comments, toggles and skipped filters.
    pub fn query_graph(&self) -> &QueryGraph {
        &self.query_graph
    }

    /// Names of the `+name` toggles, in text order.
    pub fn toggles(&self) -> &[String] {
        &self.toggles
    }

    pub fn has_toggle(&self, name: &str) -> bool {
        self.toggles.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn return_payload_if_empty(&self) -> bool {
        self.return_payload_if_empty
    }

    /// What `apply` returns for an empty or invalid query: the payload unchanged
    /// (`true`, the default) or nothing.
    pub fn set_return_payload_if_empty(&mut self, value: bool) {
        self.return_payload_if_empty = value;
    }

    fn compiled(&self) -> Option<&CompiledNode<T>> {
        self.root.as_ref().filter(|_| self.is_valid())
    }

    /// Matching elements of `payload`. Fast-yielding placeholders are dropped.
    pub fn apply<'a, I>(&self, payload: I) -> impl Iterator<Item = T> + use<'a, T, I>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'a,
    {
        self.apply_aligned(payload).flatten()
    }

    /// Like [`Query::apply`], but keeps the `None` placeholders produced in
    /// fast-yielding mode so results stay aligned with the inputs.
    pub fn apply_aligned<'a, I>(&self, payload: I) -> Box<dyn Iterator<Item = Option<T>> + 'a>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'a,
    {
        match self.compiled() {
            Some(root) => root.enumerate(Box::new(payload.into_iter()), self.mode),
            None if self.return_payload_if_empty => Box::new(payload.into_iter().map(Some)),
            None => Box::new(iter::empty()),
        }
    }

    /// Whether `element` is in the query's result.
    pub fn test(&self, element: &T) -> bool {
        match self.compiled() {
            Some(CompiledNode::Where(predicate)) => predicate(element),
            Some(root) => root.results().any(|e| &e == element),
            None => self.return_payload_if_empty,
        }
    }

    /// Rewrites the evaluation graph and recompiles it. Rewrite failures are added to
    /// the query's errors.
    pub fn optimize(&mut self, options: OptimizerOptions) {
        if self.graph.is_empty() || !self.errors.is_empty() {
            return;
        }
        let errors = optimizer::optimize(&mut self.graph, options);
        self.errors.extend(errors);
        self.compile();
        debug!("optimized {:?} into {}", self.text, self.graph);
    }
}
