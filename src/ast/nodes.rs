use std::fmt;

use crate::ast::{FilterExpression, NestedQueryExpression, QueryToken, SearchExpression};

/// Index of a node inside its [`crate::ast::QueryGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a query node, with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNodeKind {
    // Boolean combinators
    /// Conjunction (`a and b`, or two adjacent terms)
    And,
    /// Disjunction (`a or b`)
    Or,
    /// Negation (`not a`, `-a`)
    Not,

    // Predicates
    /// `name[(param)] op value`
    Filter(FilterExpression),
    /// `name[(param)] op {nested}`; its single child is the nested query or aggregator
    FilterWithNestedQuery(FilterExpression),
    /// Bare word or quoted phrase matched against the element's search strings
    Search(SearchExpression),

    // Sequences
    /// `{query}` resolved by the nested query handler
    NestedQuery(NestedQueryExpression),
    /// Filters the payload through its boolean sub-tree
    Where,
    /// Set union of two sequences
    Union,
    /// Set intersection of two sequences
    Intersection,
    /// `name{query}`: reduces its nested query's sequence
    Aggregator(String),

    // Syntax only
    /// Parenthesized sub-expression; only present in the query graph
    Group,
    /// `// text`
    Comment(String),
    /// `+name`
    Toggle(String),
}

impl QueryNodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            QueryNodeKind::And => "And",
            QueryNodeKind::Or => "Or",
            QueryNodeKind::Not => "Not",
            QueryNodeKind::Filter(_) => "Filter",
            QueryNodeKind::FilterWithNestedQuery(_) => "FilterWithNestedQuery",
            QueryNodeKind::Search(_) => "Search",
            QueryNodeKind::NestedQuery(_) => "NestedQuery",
            QueryNodeKind::Where => "Where",
            QueryNodeKind::Union => "Union",
            QueryNodeKind::Intersection => "Intersection",
            QueryNodeKind::Aggregator(_) => "Aggregator",
            QueryNodeKind::Group => "Group",
            QueryNodeKind::Comment(_) => "Comment",
            QueryNodeKind::Toggle(_) => "Toggle",
        }
    }

    /// Number of children the node must have once combined.
    pub fn arity(&self) -> usize {
        match self {
            QueryNodeKind::And
            | QueryNodeKind::Or
            | QueryNodeKind::Union
            | QueryNodeKind::Intersection => 2,
            QueryNodeKind::Not
            | QueryNodeKind::Where
            | QueryNodeKind::Group
            | QueryNodeKind::Aggregator(_)
            | QueryNodeKind::FilterWithNestedQuery(_) => 1,
            QueryNodeKind::Filter(_)
            | QueryNodeKind::Search(_)
            | QueryNodeKind::NestedQuery(_)
            | QueryNodeKind::Comment(_)
            | QueryNodeKind::Toggle(_) => 0,
        }
    }

    /// `And`, `Or` or `Not`.
    pub fn is_combinator(&self) -> bool {
        matches!(
            self,
            QueryNodeKind::And | QueryNodeKind::Or | QueryNodeKind::Not
        )
    }

    pub fn is_binary_combinator(&self) -> bool {
        matches!(self, QueryNodeKind::And | QueryNodeKind::Or)
    }

    /// Nodes the evaluation engine can enumerate at the root.
    pub fn is_enumerable(&self) -> bool {
        matches!(
            self,
            QueryNodeKind::Where
                | QueryNodeKind::Intersection
                | QueryNodeKind::Union
                | QueryNodeKind::NestedQuery(_)
                | QueryNodeKind::Aggregator(_)
        )
    }

    /// Operands that take part in set algebra (`{a} and {b}`).
    pub fn is_set_operand(&self) -> bool {
        matches!(
            self,
            QueryNodeKind::Intersection
                | QueryNodeKind::Union
                | QueryNodeKind::NestedQuery(_)
                | QueryNodeKind::Aggregator(_)
        )
    }
}

/// A node in the query graph arena.
#[derive(Debug, Clone)]
pub struct QueryNode {
    pub kind: QueryNodeKind,

    /// Owned children, in order.
    pub children: Vec<NodeId>,

    /// Unique owner, `None` for the root and for detached nodes.
    pub parent: Option<NodeId>,

    /// Set when validation is relaxed and the node must be pruned before evaluation.
    pub skipped: bool,

    /// Originating text.
    pub token: QueryToken,
}

impl QueryNode {
    pub fn new(kind: QueryNodeKind, token: QueryToken) -> Self {
        QueryNode {
            kind,
            children: Vec::new(),
            parent: None,
            skipped: false,
            token,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// A combinator leaf that has not yet absorbed its operands.
    pub fn is_uncombined_combinator(&self) -> bool {
        self.kind.is_combinator() && self.children.is_empty()
    }
}
