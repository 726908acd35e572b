//! # Sift Query Language - Query Graph
//!
//! This module defines the tree a filter expression is parsed into.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Located slices of the query text
//! - **[expressions]** - Payloads of filter, search, and nested-query nodes
//! - **[nodes]** - The closed set of node kinds and the arena node record
//! - **[graph]** - The arena owning the nodes, with the rewrite primitives used by the
//!   parser and the optimizer
//!
//! ## Quick Start
//!
//! ```text
//! type:prefab size>=10 or -stale
//! ```
//!
//! parses to
//!
//! ```text
//! Where(Or(And(Filter(type:prefab), Filter(size>=10)), Not(Search("stale"))))
//! ```
//!
//! ## Two Graphs per Query
//!
//! - The **query graph** mirrors the text: parenthesized groups, comments, toggles and
//!   skipped filters are still present. Editors use it for cursor mapping.
//! - The **evaluation graph** is what gets compiled: groups are flattened, skipped nodes
//!   pruned, set operations promoted and the root wrapped in `Where` when it is a
//!   boolean predicate.
//!
//! ## Node Arity
//!
//! | kind | children |
//! |------|----------|
//! | `And`, `Or`, `Union`, `Intersection` | 2 |
//! | `Not`, `Where`, `Group`, `Aggregator`, `FilterWithNestedQuery` | 1 |
//! | `Filter`, `Search`, `NestedQuery`, `Comment`, `Toggle` | 0 |
pub mod tokens;
pub mod expressions;
pub mod nodes;
pub mod graph;

pub use tokens::QueryToken;
pub use expressions::{FilterExpression, NestedQueryExpression, SearchExpression};
pub use nodes::{NodeId, QueryNode, QueryNodeKind};
pub use graph::QueryGraph;
