//! Run sift queries against JSON input

use std::rc::Rc;

use super::{CliError, build_engine, records_from_json};
use crate::{EvaluationMode, OptimizerOptions, QueryEngine, ValidationOptions};

/// Options for the check command
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// The filter expression to run
    pub query: String,
    /// JSON input string
    pub input: Option<String>,
    /// Pretty-print the output
    pub pretty: bool,
    /// Only validate syntax, don't execute
    pub syntax_only: bool,
    /// Evaluate in fast-yielding mode and print `null` for each non-match
    pub aligned: bool,
    /// Apply De Morgan and not-to-right rewrites before evaluating
    pub optimize: bool,
    /// Field that `max{...}` and `min{...}` order by
    pub order_by: Option<String>,
}

/// Result of a check operation
#[derive(Debug)]
pub enum CheckResult {
    /// Syntax validation passed; carries the rendered evaluation graph
    SyntaxValid(String),
    /// Query ran successfully; the matching records as a JSON array
    Success(serde_json::Value),
}

/// Execute a sift check operation
pub fn execute_check(options: &CheckOptions) -> Result<CheckResult, CliError> {
    let mode = if options.aligned {
        EvaluationMode::FastYielding
    } else {
        EvaluationMode::Strict
    };

    if options.syntax_only {
        // Without input there are no fields to validate against.
        let mut engine = QueryEngine::<super::Record>::new();
        engine.set_validation_options(ValidationOptions {
            validate_filters: false,
            ..ValidationOptions::default()
        });
        let query = engine.parse_with_mode(&options.query, mode);
        let fatal: Vec<_> = query
            .errors()
            .iter()
            .filter(|e| e.is_fatal())
            .cloned()
            .collect();
        if !fatal.is_empty() {
            return Err(CliError::Query(fatal));
        }
        return Ok(CheckResult::SyntaxValid(query.query_graph().to_string()));
    }

    let json_str = options.input.as_ref().ok_or(CliError::NoInput)?;
    let json_value: serde_json::Value = serde_json::from_str(json_str)?;
    let records = Rc::new(records_from_json(json_value));

    let engine = build_engine(&records, options.order_by.as_deref());
    let mut query = engine.parse_with_mode(&options.query, mode);
    if options.optimize {
        query.optimize(OptimizerOptions {
            propagate_not: true,
            swap_not_to_right: true,
        });
    }
    if !query.errors().is_empty() {
        return Err(CliError::Query(query.errors().to_vec()));
    }

    let output = query
        .apply_aligned(records.iter().cloned())
        .map(|record| match record {
            Some(record) => record.value.as_ref().clone(),
            None => serde_json::Value::Null,
        })
        .collect();
    Ok(CheckResult::Success(serde_json::Value::Array(output)))
}
