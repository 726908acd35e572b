use crate::{
    ast::{NestedQueryExpression, NodeId, QueryGraph, QueryNodeKind, QueryToken},
    error::QueryError,
    lexer::{Lexeme, LexemeKind, NestedLexeme},
    registry::Registry,
};

/// Output of [`Parser::parse`].
#[derive(Debug, Default)]
pub struct ParseOutput {
    /// Mirrors the text: groups, comments, toggles and skipped filters included.
    pub query_graph: QueryGraph,

    /// What gets compiled. Empty after a lexical or syntax error.
    pub graph: QueryGraph,

    pub errors: Vec<QueryError>,
    pub toggles: Vec<String>,
    pub comments: Vec<String>,
}

/// Turns the flat lexeme list into the query graph, validating filter nodes against
/// the registry as they are created.
pub struct Parser<'a, T> {
    text: &'a str,
    registry: &'a Registry<T>,
    graph: QueryGraph,
    errors: Vec<QueryError>,
    toggles: Vec<String>,
    comments: Vec<String>,
}

impl<'a, T: Clone + 'static> Parser<'a, T> {
    pub fn new(text: &'a str, registry: &'a Registry<T>) -> Self {
        Parser {
            text,
            registry,
            graph: QueryGraph::new(),
            errors: Vec::new(),
            toggles: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub fn parse(mut self, lexemes: &[Lexeme]) -> ParseOutput {
        let root = self.parse_sequence(lexemes);
        self.graph.set_root(root);

        let graph = if !self.errors.iter().any(QueryError::is_fatal) {
            evaluation_graph(&self.graph, &mut self.errors)
        } else {
            QueryGraph::new()
        };

        ParseOutput {
            query_graph: self.graph,
            graph,
            errors: self.errors,
            toggles: self.toggles,
            comments: self.comments,
        }
    }

    /// Builds one expression from a lexeme run (the whole query or a group body).
    fn parse_sequence(&mut self, lexemes: &[Lexeme]) -> Option<NodeId> {
        let nodes: Vec<NodeId> = lexemes
            .iter()
            .filter_map(|lexeme| self.parse_lexeme(lexeme))
            .collect();

        let nodes = self.insert_implicit_and(nodes);
        let nodes = self.combine_not(nodes);
        let nodes = self.combine_binary(nodes, QueryNodeKind::And);
        let nodes = self.combine_binary(nodes, QueryNodeKind::Or);

        if let Some(extra) = nodes.get(1) {
            let token = self.graph.node(*extra).token.clone();
            self.errors
                .push(QueryError::syntax_at(&token, "Unexpected expression"));
        }
        nodes.first().copied()
    }

    fn parse_lexeme(&mut self, lexeme: &Lexeme) -> Option<NodeId> {
        let token = lexeme.token.clone();
        let id = match &lexeme.kind {
            LexemeKind::Group(inner) => {
                let child = self.parse_sequence(inner)?;
                let group = self.graph.add_node(QueryNodeKind::Group, token);
                self.graph.add_child(group, child);
                group
            }
            LexemeKind::And => self.graph.add_node(QueryNodeKind::And, token),
            LexemeKind::Or => self.graph.add_node(QueryNodeKind::Or, token),
            LexemeKind::Not => self.graph.add_node(QueryNodeKind::Not, token),
            LexemeKind::Nested(nested) => {
                let (head, aggregator) = self.add_nested(nested, None);
                if !self.check_nested_handler(head, nested) {
                    self.check_aggregator(aggregator, nested);
                }
                head
            }
            LexemeKind::Filter {
                expression,
                nested: Some(nested),
            } => {
                let id = self
                    .graph
                    .add_node(QueryNodeKind::FilterWithNestedQuery(expression.clone()), token);
                let (child, aggregator) = self.add_nested(nested, Some(&expression.name));
                self.graph.add_child(id, child);
                if !self.check_nested_handler(id, nested) {
                    self.check_filter(id);
                    self.check_aggregator(aggregator, nested);
                }
                id
            }
            LexemeKind::Filter {
                expression,
                nested: None,
            } => {
                let id = self
                    .graph
                    .add_node(QueryNodeKind::Filter(expression.clone()), token);
                self.check_filter(id);
                id
            }
            LexemeKind::Toggle(name) => {
                self.toggles.push(name.clone());
                let id = self
                    .graph
                    .add_node(QueryNodeKind::Toggle(name.clone()), token);
                self.graph.node_mut(id).skipped = true;
                id
            }
            LexemeKind::Comment(text) => {
                self.comments.push(text.clone());
                let id = self
                    .graph
                    .add_node(QueryNodeKind::Comment(text.clone()), token);
                self.graph.node_mut(id).skipped = true;
                id
            }
            LexemeKind::Word(search) => self
                .graph
                .add_node(QueryNodeKind::Search(search.clone()), token),
        };
        Some(id)
    }

    /// Adds the nodes of a nested query; returns the head and the aggregator node if
    /// there is one.
    fn add_nested(&mut self, nested: &NestedLexeme, filter: Option<&str>) -> (NodeId, Option<NodeId>) {
        let query = self.graph.add_node(
            QueryNodeKind::NestedQuery(NestedQueryExpression {
                query: nested.query.clone(),
                filter: filter.map(str::to_string),
            }),
            nested.token.clone(),
        );
        match &nested.aggregator {
            Some(name) => {
                let aggregator = self
                    .graph
                    .add_node(QueryNodeKind::Aggregator(name.clone()), nested.token.clone());
                self.graph.add_child(aggregator, query);
                (aggregator, Some(aggregator))
            }
            None => (query, None),
        }
    }

    /// Reports a missing nested query handler at `id`. Returns `true` if it did.
    fn check_nested_handler(&mut self, id: NodeId, nested: &NestedLexeme) -> bool {
        if self.registry.has_nested_handler() {
            return false;
        }
        let token = self.graph.node(id).token.clone();
        self.errors.push(QueryError::semantic_at(
            &token,
            format!(
                "No nested query handler registered to resolve '{{{}}}'",
                nested.query
            ),
        ));
        true
    }

    fn check_aggregator(&mut self, aggregator: Option<NodeId>, nested: &NestedLexeme) {
        let (Some(id), Some(name)) = (aggregator, &nested.aggregator) else {
            return;
        };
        if !self.registry.aggregators.contains(name) {
            let token = self.graph.node(id).token.clone();
            self.errors.push(QueryError::semantic_at(
                &token,
                format!("Unknown aggregator '{}'", name),
            ));
        }
    }

    /// Checks a filter node against the registry and the validation options. Reports
    /// at most one error; relaxed validation marks the node skipped instead.
    fn check_filter(&mut self, id: NodeId) {
        let node = self.graph.node(id);
        let (expression, nested) = match &node.kind {
            QueryNodeKind::Filter(expression) => (expression, false),
            QueryNodeKind::FilterWithNestedQuery(expression) => (expression, true),
            _ => return,
        };
        let options = self.registry.validation();
        let token = node.token.clone();

        let Some(found) = self.registry.find_filter(&expression.name) else {
            if options.skip_unknown_filters {
                self.graph.node_mut(id).skipped = true;
            } else if options.validate_filters {
                self.errors.push(QueryError::semantic_at(
                    &token,
                    format!("Unknown filter '{}'", expression.name),
                ));
            }
            return;
        };

        if !nested && expression.is_incomplete() {
            if options.skip_incomplete_filters {
                self.graph.node_mut(id).skipped = true;
            } else if options.validate_filters {
                self.errors.push(QueryError::semantic_at(
                    &token,
                    format!("Filter '{}' is missing a value", expression.name),
                ));
            }
            return;
        }

        if !found.filter.accepts_operator(&expression.operator) {
            self.errors.push(QueryError::semantic_at(
                &token,
                format!(
                    "Operator '{}' is not supported by filter '{}'",
                    expression.operator, expression.name
                ),
            ));
        }
    }

    fn is_uncombined(&self, id: NodeId) -> bool {
        self.graph.node(id).is_uncombined_combinator()
    }

    /// Splices an `And` between adjacent operands written without a combinator.
    fn insert_implicit_and(&mut self, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::with_capacity(nodes.len() * 2);
        for id in nodes {
            if let Some(&previous) = out.last() {
                let right = self.graph.node(id);
                let right_is_binary = right.is_uncombined_combinator() && right.kind.is_binary_combinator();
                if !self.is_uncombined(previous) && !right_is_binary {
                    let start = self.graph.node(previous).token.end();
                    let end = self.graph.node(id).token.position;
                    let gap = QueryToken::from_range(self.text, start, end);
                    out.push(self.graph.add_node(QueryNodeKind::And, gap));
                }
            }
            out.push(id);
        }
        out
    }

    /// Each uncombined `Not` absorbs its right neighbour, right to left so that
    /// `not not a` nests.
    fn combine_not(&mut self, mut nodes: Vec<NodeId>) -> Vec<NodeId> {
        let mut i = nodes.len();
        while i > 0 {
            i -= 1;
            let id = nodes[i];
            if self.graph.kind(id) != &QueryNodeKind::Not || !self.is_uncombined(id) {
                continue;
            }
            match nodes.get(i + 1).copied() {
                Some(operand) if !self.is_uncombined(operand) => {
                    self.graph.add_child(id, operand);
                    nodes.remove(i + 1);
                }
                _ => {
                    let token = self.graph.node(id).token.clone();
                    self.errors
                        .push(QueryError::syntax_at(&token, "Missing operand after 'not'"));
                    nodes.remove(i);
                }
            }
        }
        nodes
    }

    /// Each uncombined `kind` node absorbs its neighbours, left to right.
    fn combine_binary(&mut self, mut nodes: Vec<NodeId>, kind: QueryNodeKind) -> Vec<NodeId> {
        let keyword = kind.name().to_lowercase();
        let mut i = 0;
        while i < nodes.len() {
            let id = nodes[i];
            if self.graph.kind(id) != &kind || !self.is_uncombined(id) {
                i += 1;
                continue;
            }

            let left = i
                .checked_sub(1)
                .map(|j| nodes[j])
                .filter(|n| !self.is_uncombined(*n));
            let right = nodes.get(i + 1).copied().filter(|n| !self.is_uncombined(*n));
            let token = self.graph.node(id).token.clone();

            if left.is_none() {
                self.errors.push(QueryError::syntax_at(
                    &token,
                    format!("Missing left operand for '{}'", keyword),
                ));
            }
            if right.is_none() {
                self.errors.push(QueryError::syntax_at(
                    &token,
                    format!("Missing right operand for '{}'", keyword),
                ));
            }

            match (left, right) {
                (Some(left), Some(right)) => {
                    self.graph.add_child(id, left);
                    self.graph.add_child(id, right);
                    // The combined node now sits at i - 1; keep scanning after it.
                    nodes[i - 1] = id;
                    nodes.drain(i..=i + 1);
                }
                _ => {
                    nodes.remove(i);
                }
            }
        }
        nodes
    }
}

/// Derives the evaluation graph from a query graph: groups flattened, skipped nodes
/// pruned, set operations promoted, the root wrapped in `Where` when it is a boolean
/// predicate, then arity checked.
pub fn evaluation_graph(query_graph: &QueryGraph, errors: &mut Vec<QueryError>) -> QueryGraph {
    let mut graph = QueryGraph::new();
    let root = query_graph
        .root()
        .and_then(|root| lower(query_graph, root, &mut graph));
    graph.set_root(root);

    let Some(root) = root else {
        return graph;
    };
    promote_set_operations(&mut graph, root, errors);

    if !graph.kind(root).is_enumerable() {
        let token = graph.node(root).token.clone();
        let wrapper = graph.add_node(QueryNodeKind::Where, token);
        graph.add_child(wrapper, root);
        graph.set_root(Some(wrapper));
    }

    errors.extend(graph.validate());
    graph
}

/// Copies `id` into `graph` without groups, comments, toggles or skipped nodes. A
/// combinator left without operands disappears; a binary one left with a single
/// operand is replaced by it.
fn lower(source: &QueryGraph, id: NodeId, graph: &mut QueryGraph) -> Option<NodeId> {
    let node = source.node(id);
    if node.skipped {
        return None;
    }
    match &node.kind {
        QueryNodeKind::Group => node
            .children
            .first()
            .and_then(|child| lower(source, *child, graph)),
        QueryNodeKind::Comment(_) | QueryNodeKind::Toggle(_) => None,
        kind => {
            let children: Vec<NodeId> = node
                .children
                .iter()
                .filter_map(|child| lower(source, *child, graph))
                .collect();
            if kind.is_combinator() {
                match children.as_slice() {
                    [] => return None,
                    [only] if kind.is_binary_combinator() => return Some(*only),
                    _ => {}
                }
            }
            let copy = graph.add_node(kind.clone(), node.token.clone());
            for child in children {
                graph.add_child(copy, child);
            }
            Some(copy)
        }
    }
}

/// `And`/`Or` over set operands only become `Intersection`/`Union`.
fn promote_set_operations(graph: &mut QueryGraph, id: NodeId, errors: &mut Vec<QueryError>) {
    for child in graph.children(id).to_vec() {
        promote_set_operations(graph, child, errors);
    }

    let promoted = match graph.kind(id) {
        QueryNodeKind::And => QueryNodeKind::Intersection,
        QueryNodeKind::Or => QueryNodeKind::Union,
        _ => return,
    };
    let children = graph.children(id);
    let set_operands = children
        .iter()
        .filter(|child| graph.kind(**child).is_set_operand())
        .count();

    if set_operands == children.len() {
        graph.node_mut(id).kind = promoted;
    } else if set_operands > 0 {
        let token = graph.node(id).token.clone();
        errors.push(QueryError::semantic_at(
            &token,
            "Cannot mix nested query operations with regular operations",
        ));
    }
}
