//! CLI support for sift-query
//!
//! Runs filter expressions over JSON records. Exposed as a library module so other
//! tools can embed the same behavior the `sift` binary has.

mod check;
mod convert;
mod docs;

pub use check::{CheckOptions, CheckResult, execute_check};
pub use convert::{Record, build_engine, records_from_json};
pub use docs::{DocCategory, get_doc_category, get_docs_overview};

use std::io;

use crate::QueryError;

/// Errors that can occur during CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The query has errors
    #[error("{}", format_query_errors(.0))]
    Query(Vec<QueryError>),

    /// JSON parsing error
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// No input provided
    #[error("No input provided. Use --input or pipe JSON to stdin.")]
    NoInput,

    /// Unknown documentation category
    #[error("Unknown category: '{0}'\nRun 'sift docs' to see available categories.")]
    UnknownCategory(String),
}

fn format_query_errors(errors: &[QueryError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
