pub mod ast;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod lexer;
pub mod nested;
pub mod operator;
pub mod optimizer;
pub mod parser;
pub mod query;
pub mod registry;
pub mod value;

#[cfg(feature = "cli")]
pub mod cli;

pub use ast::{NodeId, QueryGraph, QueryNode, QueryNodeKind, QueryToken};
pub use engine::QueryEngine;
pub use error::{EngineError, QueryError, QueryErrorKind};
pub use evaluator::EvaluationMode;
pub use filter::{Filter, FilterArgs, FilterToken};
pub use lexer::Tokenizer;
pub use operator::{DefaultOperator, StringComparison};
pub use optimizer::OptimizerOptions;
pub use query::Query;
pub use registry::ValidationOptions;
pub use value::{CustomValue, FilterType, ParseResult, Value, ValueType};
