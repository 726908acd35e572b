//! Documentation content for sift CLI

use super::CliError;

/// Available documentation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocCategory {
    Syntax,
    Operators,
    Nested,
    Options,
}

impl DocCategory {
    /// Parse category name from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "syntax" => Some(Self::Syntax),
            "operators" | "ops" => Some(Self::Operators),
            "nested" | "nested_queries" | "aggregators" => Some(Self::Nested),
            "options" | "modes" => Some(Self::Options),
            _ => None,
        }
    }
}

/// Get the docs overview (category listing)
pub fn get_docs_overview() -> &'static str {
    r#"SIFT DOCUMENTATION

Sift filters JSON records with search-box style expressions: bare words, quoted
phrases, typed field filters, boolean combinators, and nested sub-queries.

DOCUMENTATION CATEGORIES

  syntax            Words, phrases, filters, combinators, groups, toggles, comments
  operators         Built-in operators and how values are typed
  nested            Nested queries, set operations, and aggregators
  options           Evaluation modes, optimization, and CLI flags

QUICK REFERENCE

  rock              Records with a string field containing "rock"
  "big rock"        Phrase search
  !rock             A string field equal to "rock"
  size>=10          Field filter
  a or b            Either side
  -a / not a        Negation
  (a or b) c        Grouping
  {size>10}         Nested query over the same records
  name:{size>10}    Field compared against nested matches

Run 'sift doc <category>' for detailed documentation.
"#
}

/// Get documentation for a specific category
pub fn get_doc_category(name: &str) -> Result<&'static str, CliError> {
    match DocCategory::from_name(name) {
        Some(DocCategory::Syntax) => Ok(SYNTAX_DOC),
        Some(DocCategory::Operators) => Ok(OPERATORS_DOC),
        Some(DocCategory::Nested) => Ok(NESTED_DOC),
        Some(DocCategory::Options) => Ok(OPTIONS_DOC),
        None => Err(CliError::UnknownCategory(name.to_string())),
    }
}

const SYNTAX_DOC: &str = r#"SYNTAX - Words, Filters, and Combinators

SEARCH WORDS
  word
    Matches records where any string field contains the word (case-insensitive).

    Example:
      Input:  [{"name": "big rock"}, {"name": "pebble"}]
      Query:  rock
      Output: [{"name": "big rock"}]

  "a phrase"
    Quoted text is searched as a single term, spaces included.

  !word  !"a phrase"
    Exact search: a string field must equal the text.

FILTERS
  name operator value
    Compares the field `name` of each record with `value`. No spaces around the
    operator.

    Example:
      Input:  [{"size": 4}, {"size": 40}]
      Query:  size>=10
      Output: [{"size": 40}]

  name:"quoted value"
    Quote values that contain spaces or parentheses.

  #index=0
    Every record also has an `#index` filter holding its position in the input.

    Constraints:
      - Unknown field names are errors
      - A filter without a value (`size>=`) is an error
      - Values that do not parse as the field's type are errors

COMBINATORS
  a b           Both (an implicit `and`)
  a and b       Both
  a or b        Either
  -a            Not a (no space after `-`)
  not a         Not a

  Precedence: `not` binds tightest, then `and`, then `or`.

    Example:
      Query:  a or b c
      Means:  a or (b and c)

    Constraints:
      - Keywords are case-insensitive
      - A keyword without an operand is a syntax error

GROUPS
  (a or b) c
    Parentheses override precedence. Empty groups are ignored; an unmatched
    parenthesis is a syntax error.

TOGGLES AND COMMENTS
  +name         Collected as a toggle, never evaluated
  // text       Comment until the end of the line
"#;

const OPERATORS_DOC: &str = r#"OPERATORS - Comparison and Value Types

BUILT-IN OPERATORS
  :     Contains for strings, equal for everything else
  =     Equal
  !=    Not equal
  <     Less than
  >     Greater than
  <=    Less than or equal
  >=    Greater than or equal

  Examples:
    name:rock
    name="big rock"
    size!=0
    ratio<0.5

  Constraints:
    - String comparisons ignore case
    - The longest operator wins: `a>=1` is `>=`, not `>` followed by `=1`

VALUE TYPES
  Each field is typed from the JSON values it holds across all records:

    all booleans          boolean   (true / false)
    all integers          integer
    integers and floats   float
    anything else         string    (numbers and booleans compared as text)

  Numbers of different kinds compare exactly:

    Input:  [{"size": 3}]
    Query:  size=3.0
    Output: [{"size": 3}]

  Constraints:
    - Records missing a field never match filters on it
    - `size>=abc` on a numeric field is an error, not an empty result
"#;

const NESTED_DOC: &str = r#"NESTED - Sub-queries, Set Operations, and Aggregators

NESTED QUERIES
  {expression}
    Runs `expression` over the same records and yields its matches.

    Example:
      Input:  [{"size": 1}, {"size": 20}]
      Query:  {size>10}
      Output: [{"size": 20}]

SET OPERATIONS
  {a} {b}       Intersection of both result sets
  {a} or {b}    Union of both result sets

    Constraints:
      - Results are deduplicated
      - Nested queries cannot be mixed with plain filters in the same
        combinator: `{a} size>1` is an error

FILTERS OVER NESTED QUERIES
  field:{expression}
    Matches records whose `field` equals the `field` of any record matched by
    `expression`.

    Example:
      Input:  [{"kind": "rock", "size": 40}, {"kind": "rock", "size": 2},
               {"kind": "tree", "size": 1}]
      Query:  kind:{size>10}
      Output: [{"kind": "rock", "size": 40}, {"kind": "rock", "size": 2}]

AGGREGATORS
  first{expression}    First match only
  last{expression}     Last match only
  max{expression}      Match with the largest --order-by field
  min{expression}      Match with the smallest --order-by field

    Constraints:
      - Unknown aggregator names are errors
      - max and min exist only when --order-by is given
"#;

const OPTIONS_DOC: &str = r#"OPTIONS - Modes and Flags

EVALUATION MODES
  strict (default)
    Output holds each match once.

  --aligned
    Fast-yielding mode: one output slot per input record, `null` where the record
    did not match. Set operations emit one slot per element pulled from either
    side.

    Example:
      Input:    [{"size": 1}, {"size": 20}]
      Command:  sift check --aligned 'size>10'
      Output:   [null, {"size": 20}]

OPTIMIZATION
  --optimize
    Pushes negations inside `and`/`or` (De Morgan), moves negated operands to the
    right, and removes double negations before evaluating. Results do not change.

ORDERING
  --order-by FIELD
    Registers the max{} and min{} aggregators keyed on FIELD.

SYNTAX CHECK
  --syntax-only
    Parses without input and prints the query graph. Only syntax errors are
    reported.

LOGGING
  RUST_LOG=debug sift check ...
    Prints parse summaries; `trace` adds optimizer rewrites.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_aliases() {
        assert_eq!(DocCategory::from_name("ops"), Some(DocCategory::Operators));
        assert_eq!(DocCategory::from_name("Nested-Queries"), Some(DocCategory::Nested));
        assert!(get_doc_category("nope").is_err());
    }
}
