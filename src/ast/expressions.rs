/// Payload of a `Filter` or `FilterWithNestedQuery` node.
///
/// # Examples
/// ```text
/// size>=10              // name: "size", operator: ">=", value: "10"
/// dist(origin)<5        // param: Some("origin")
/// name="big rock"       // quoted: true, value: "big rock"
/// owner:{team:core}     // FilterWithNestedQuery, value: "{team:core}"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression {
    /// Filter name as written in the query.
    pub name: String,

    /// Raw parameter text between the parentheses, if any.
    pub param: Option<String>,

    /// Operator token.
    pub operator: String,

    /// Raw value text, without surrounding quotes. Empty for incomplete filters.
    pub value: String,

    /// The value was written as a quoted phrase.
    pub quoted: bool,
}

impl FilterExpression {
    /// A filter written without a value (`size>=`).
    pub fn is_incomplete(&self) -> bool {
        self.value.is_empty() && !self.quoted
    }
}

/// Payload of a `Search` node: a bare word or a quoted phrase.
///
/// # Examples
/// ```text
/// rock        // text: "rock"
/// "big rock"  // text: "big rock", phrase: true
/// !rock       // exact: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchExpression {
    pub text: String,

    /// Prefixed with `!`: the search string must equal the text instead of containing it.
    pub exact: bool,

    /// Written between double quotes.
    pub phrase: bool,
}

/// Payload of a `NestedQuery` node.
///
/// # Examples
/// ```text
/// {type:rock}             // query: "type:rock", filter: None
/// owner:{team:core}       // query: "team:core", filter: Some("owner")
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedQueryExpression {
    /// Text between the braces, passed verbatim to the nested query handler.
    pub query: String,

    /// Name of the enclosing filter when the nested query is a filter value.
    pub filter: Option<String>,
}
