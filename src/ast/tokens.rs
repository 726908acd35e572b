/// A located slice of the original query string.
///
/// Positions and lengths are byte offsets into the text given to
/// [`crate::QueryEngine::parse`]. Tokens are kept on every node for error reporting and
/// cursor-to-node mapping.
///
/// # Examples
/// ```
/// use sift_query::ast::QueryToken;
///
/// let token = QueryToken::new("size>=10", 5);
/// assert_eq!(token.length, 8);
/// assert_eq!(token.end(), 13);
/// assert!(token.contains(12));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct QueryToken {
    pub text: String,
    pub position: usize,
    pub length: usize,
}

impl QueryToken {
    pub fn new(text: impl Into<String>, position: usize) -> Self {
        let text = text.into();
        let length = text.len();
        QueryToken {
            text,
            position,
            length,
        }
    }

    /// Token for `source[start..end]`.
    pub fn from_range(source: &str, start: usize, end: usize) -> Self {
        QueryToken {
            text: source.get(start..end).unwrap_or_default().to_string(),
            position: start,
            length: end.saturating_sub(start),
        }
    }

    pub fn end(&self) -> usize {
        self.position + self.length
    }

    /// True if the byte offset `position` falls inside the token.
    ///
    /// The end offset counts as inside so a cursor placed right after a word still
    /// maps to it.
    pub fn contains(&self, position: usize) -> bool {
        position >= self.position && position <= self.end()
    }
}
