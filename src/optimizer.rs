//! Rewrites over an evaluation graph.
//!
//! Passes run in a fixed order: negation propagation and not-to-right swapping when
//! enabled, then double-negation collapse, which always runs.

use log::trace;

use crate::{
    ast::{NodeId, QueryGraph, QueryNodeKind},
    error::QueryError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizerOptions {
    /// Push `Not` below `And`/`Or` with De Morgan's laws.
    pub propagate_not: bool,

    /// Put negated operands of `And`/`Or` on the right, so the positive branch is
    /// evaluated first.
    pub swap_not_to_right: bool,
}

/// Optimizes `graph` in place. Rewrite failures (a node missing from its recorded
/// parent) are returned; the graph is left as far as the rewrites got.
pub fn optimize(graph: &mut QueryGraph, options: OptimizerOptions) -> Vec<QueryError> {
    let mut errors = Vec::new();
    let Some(root) = graph.root() else {
        return errors;
    };

    if options.propagate_not
        && let Err(e) = propagate_not(graph, root)
    {
        errors.push(e);
    }
    if options.swap_not_to_right
        && let Some(root) = graph.root()
    {
        swap_not_to_right(graph, root);
    }
    if let Some(root) = graph.root()
        && let Err(e) = collapse_double_not(graph, root)
    {
        errors.push(e);
    }
    errors
}

/// `Not(And(a, b))` becomes `Or(Not(a), Not(b))` and `Not(Or(a, b))` becomes
/// `And(Not(a), Not(b))`, then the new operands are visited.
fn propagate_not(graph: &mut QueryGraph, id: NodeId) -> Result<(), QueryError> {
    let mut current = id;
    if graph.kind(id) == &QueryNodeKind::Not
        && let [inner] = *graph.children(id)
    {
        let dual = match graph.kind(inner) {
            QueryNodeKind::And => Some(QueryNodeKind::Or),
            QueryNodeKind::Or => Some(QueryNodeKind::And),
            _ => None,
        };
        if let Some(dual) = dual
            && let [a, b] = *graph.children(inner)
        {
            trace!("de morgan: {} over {} at {}", graph.kind(inner).name(), dual.name(), id);
            let not_token = graph.node(id).token.clone();
            let inner_token = graph.node(inner).token.clone();
            graph.detach(inner);

            let replacement = graph.add_node(dual, inner_token);
            for operand in [a, b] {
                let not = graph.add_node(QueryNodeKind::Not, not_token.clone());
                graph.add_child(not, operand);
                graph.add_child(replacement, not);
            }
            graph.replace(id, replacement)?;
            current = replacement;
        }
    }

    for child in graph.children(current).to_vec() {
        propagate_not(graph, child)?;
    }
    Ok(())
}

fn swap_not_to_right(graph: &mut QueryGraph, id: NodeId) {
    if graph.kind(id).is_binary_combinator()
        && let [left, right] = *graph.children(id)
        && graph.kind(left) == &QueryNodeKind::Not
        && graph.kind(right) != &QueryNodeKind::Not
    {
        trace!("swapping negated operand of {} to the right", id);
        graph.swap_children(id);
    }
    for child in graph.children(id).to_vec() {
        swap_not_to_right(graph, child);
    }
}

/// `Not(Not(x))` becomes `x`, repeatedly.
fn collapse_double_not(graph: &mut QueryGraph, id: NodeId) -> Result<(), QueryError> {
    let mut current = id;
    while graph.kind(current) == &QueryNodeKind::Not
        && let [inner] = *graph.children(current)
        && graph.kind(inner) == &QueryNodeKind::Not
        && let [operand] = *graph.children(inner)
    {
        trace!("collapsing double negation at {}", current);
        graph.replace(current, operand)?;
        current = operand;
    }

    for child in graph.children(current).to_vec() {
        collapse_double_not(graph, child)?;
    }
    Ok(())
}
