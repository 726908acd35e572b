use std::fmt;

use crate::{
    ast::{NodeId, QueryNode, QueryNodeKind, QueryToken},
    error::QueryError,
};

/// Arena-backed query tree.
///
/// Nodes refer to each other by [`NodeId`]; the parent link is an index, never a
/// reference, so rewrites are plain vector mutations. Nodes replaced during rewrites
/// stay in the arena but are unreachable from the root.
#[derive(Debug, Clone, Default)]
pub struct QueryGraph {
    nodes: Vec<QueryNode>,
    root: Option<NodeId>,
}

impl QueryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a detached node and returns its id.
    pub fn add_node(&mut self, kind: QueryNodeKind, token: QueryToken) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(QueryNode::new(kind, token));
        id
    }

    pub fn node(&self, id: NodeId) -> &QueryNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut QueryNode {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&QueryNode> {
        self.nodes.get(id.0)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: Option<NodeId>) {
        if let Some(id) = root {
            self.nodes[id.0].parent = None;
        }
        self.root = root;
    }

    /// True if the graph has no root (an empty query).
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of nodes reachable from the root.
    pub fn len(&self) -> usize {
        self.root.map(|root| self.preorder(root).len()).unwrap_or(0)
    }

    pub fn kind(&self, id: NodeId) -> &QueryNodeKind {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Appends `child` to `parent`, recording the back-reference.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Puts `replacement` in the slot `old` occupies (its parent's child list, or the
    /// root). `old` is left detached.
    ///
    /// Fails with an internal error if `old` is absent from its recorded parent.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) -> Result<(), QueryError> {
        if old == replacement {
            return Ok(());
        }

        // The replacement may currently be owned by `old` (collapsing a wrapper).
        if let Some(owner) = self.nodes[replacement.0].parent
            && owner != old
        {
            self.remove_child(owner, replacement)?;
        }

        match self.nodes[old.0].parent {
            Some(parent) => {
                let slot = self.child_slot(parent, old)?;
                self.nodes[parent.0].children[slot] = replacement;
                self.nodes[replacement.0].parent = Some(parent);
            }
            None if self.root == Some(old) => {
                self.root = Some(replacement);
                self.nodes[replacement.0].parent = None;
            }
            None => {
                let token = &self.nodes[old.0].token;
                return Err(QueryError::internal(
                    token.position,
                    token.length,
                    format!(
                        "cannot replace detached node {} ({})",
                        old,
                        self.nodes[old.0].kind.name()
                    ),
                ));
            }
        }

        self.detach(old);
        Ok(())
    }

    /// Removes `child` from `parent`'s child list.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), QueryError> {
        let slot = self.child_slot(parent, child)?;
        self.nodes[parent.0].children.remove(slot);
        self.nodes[child.0].parent = None;
        Ok(())
    }

    /// Swaps the two children of a binary node. No-op for other arities.
    pub fn swap_children(&mut self, id: NodeId) {
        let children = &mut self.nodes[id.0].children;
        if children.len() == 2 {
            children.swap(0, 1);
        }
    }

    /// Clears a node's links. Its former children keep their own parent links only if
    /// they were re-parented elsewhere.
    pub fn detach(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            if self.nodes[child.0].parent == Some(id) {
                self.nodes[child.0].parent = None;
            }
        }
        self.nodes[id.0].parent = None;
    }

    fn child_slot(&self, parent: NodeId, child: NodeId) -> Result<usize, QueryError> {
        self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or_else(|| {
                let token = &self.nodes[child.0].token;
                QueryError::internal(
                    token.position,
                    token.length,
                    format!(
                        "node {} ({}) is not a child of its recorded parent {}",
                        child,
                        self.nodes[child.0].kind.name(),
                        parent
                    ),
                )
            })
    }

    /// Node ids reachable from `start`, parents before children.
    pub fn preorder(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    /// Reachable nodes from the root in preorder.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &QueryNode)> + '_ {
        self.root
            .map(|root| self.preorder(root))
            .unwrap_or_default()
            .into_iter()
            .map(|id| (id, &self.nodes[id.0]))
    }

    /// Deepest reachable node whose token covers the byte offset `position`.
    pub fn node_at(&self, position: usize) -> Option<NodeId> {
        let mut current = self.root.filter(|root| self.covers(*root, position))?;
        'descend: loop {
            for child in &self.nodes[current.0].children {
                if self.covers(*child, position) {
                    current = *child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }

    fn covers(&self, id: NodeId, position: usize) -> bool {
        let node = &self.nodes[id.0];
        if node.token.contains(position) {
            return true;
        }
        // Synthesized combinators only span the gap between their operands.
        node.children.iter().any(|child| self.covers(*child, position))
    }

    /// Checks arity and parent links of every reachable node.
    pub fn validate(&self) -> Vec<QueryError> {
        let mut errors = Vec::new();
        for (id, node) in self.iter() {
            let expected = node.kind.arity();
            if node.children.len() != expected {
                errors.push(QueryError::syntax_at(
                    &node.token,
                    format!(
                        "{} node expects {} operand(s) but has {}",
                        node.kind.name(),
                        expected,
                        node.children.len()
                    ),
                ));
            }
            for child in &node.children {
                if self.nodes[child.0].parent != Some(id) {
                    errors.push(QueryError::internal(
                        node.token.position,
                        node.token.length,
                        format!("child {} of {} has a stale parent link", child, id),
                    ));
                }
            }
        }
        errors
    }

    fn fmt_node(&self, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = &self.nodes[id.0];
        match &node.kind {
            QueryNodeKind::Filter(filter) => {
                write!(f, "Filter({}", filter.name)?;
                if let Some(param) = &filter.param {
                    write!(f, "({})", param)?;
                }
                if filter.quoted {
                    write!(f, "{}{:?})", filter.operator, filter.value)
                } else {
                    write!(f, "{}{})", filter.operator, filter.value)
                }
            }
            QueryNodeKind::FilterWithNestedQuery(filter) => {
                write!(f, "FilterWithNestedQuery({}", filter.name)?;
                if let Some(param) = &filter.param {
                    write!(f, "({})", param)?;
                }
                write!(f, "{}", filter.operator)?;
                for child in &node.children {
                    write!(f, " ")?;
                    self.fmt_node(*child, f)?;
                }
                write!(f, ")")
            }
            QueryNodeKind::Search(search) => {
                let bang = if search.exact { "!" } else { "" };
                write!(f, "Search({}{:?})", bang, search.text)
            }
            QueryNodeKind::NestedQuery(nested) => write!(f, "NestedQuery{{{}}}", nested.query),
            QueryNodeKind::Aggregator(name) => {
                write!(f, "Aggregator({}", name)?;
                for child in &node.children {
                    write!(f, " ")?;
                    self.fmt_node(*child, f)?;
                }
                write!(f, ")")
            }
            QueryNodeKind::Comment(text) => write!(f, "Comment({:?})", text),
            QueryNodeKind::Toggle(name) => write!(f, "Toggle(+{})", name),
            kind => {
                write!(f, "{}(", kind.name())?;
                for (i, child) in node.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.fmt_node(*child, f)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// S-expression rendering of the reachable tree, ignoring tokens.
///
/// Two graphs with the same rendering are structurally identical.
impl fmt::Display for QueryGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => self.fmt_node(root, f),
            None => write!(f, "<empty>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SearchExpression;

    fn search(graph: &mut QueryGraph, text: &str) -> NodeId {
        graph.add_node(
            QueryNodeKind::Search(SearchExpression {
                text: text.to_string(),
                exact: false,
                phrase: false,
            }),
            QueryToken::new(text, 0),
        )
    }

    #[test]
    fn replace_root_and_child_slots() {
        let mut graph = QueryGraph::new();
        let a = search(&mut graph, "a");
        let b = search(&mut graph, "b");
        let and = graph.add_node(QueryNodeKind::And, QueryToken::default());
        graph.add_child(and, a);
        graph.add_child(and, b);
        graph.set_root(Some(and));

        let c = search(&mut graph, "c");
        graph.replace(b, c).unwrap();
        assert_eq!(graph.children(and), &[a, c]);
        assert_eq!(graph.parent(c), Some(and));
        assert_eq!(graph.parent(b), None);

        graph.replace(and, a).unwrap();
        assert_eq!(graph.root(), Some(a));
        assert_eq!(graph.parent(a), None);
        assert_eq!(graph.to_string(), "Search(\"a\")");
    }

    #[test]
    fn stale_parent_is_reported_not_panicking() {
        let mut graph = QueryGraph::new();
        let a = search(&mut graph, "a");
        let not = graph.add_node(QueryNodeKind::Not, QueryToken::default());
        graph.set_root(Some(not));
        // Corrupt the back-reference on purpose.
        graph.node_mut(a).parent = Some(not);

        let b = search(&mut graph, "b");
        let err = graph.replace(a, b).unwrap_err();
        assert_eq!(err.kind, crate::error::QueryErrorKind::Internal);
    }

    #[test]
    fn validate_reports_arity() {
        let mut graph = QueryGraph::new();
        let a = search(&mut graph, "a");
        let and = graph.add_node(QueryNodeKind::And, QueryToken::default());
        graph.add_child(and, a);
        graph.set_root(Some(and));
        let errors = graph.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].reason.contains("expects 2"));
    }
}
