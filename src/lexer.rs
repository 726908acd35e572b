use crate::{
    ast::{FilterExpression, QueryToken, SearchExpression},
    error::QueryError,
    operator::OperatorTable,
};

/// A recognized piece of query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub kind: LexemeKind,
    pub token: QueryToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexemeKind {
    /// `( ... )`, already tokenized
    Group(Vec<Lexeme>),
    And,
    Or,
    Not,
    /// `{query}` or `aggregator{query}`
    Nested(NestedLexeme),
    /// `name[(param)] op value`; `nested` is set when the value is a nested query
    Filter {
        expression: FilterExpression,
        nested: Option<NestedLexeme>,
    },
    /// `+name`
    Toggle(String),
    /// `// text`
    Comment(String),
    /// `word`, `"phrase"`, `!word`
    Word(SearchExpression),
}

/// A brace-delimited nested query and its optional aggregator prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedLexeme {
    pub aggregator: Option<String>,
    pub query: String,
    pub token: QueryToken,
}

/// Splits query text into lexemes.
///
/// At each position the rules are tried in a fixed order and the first match wins:
/// whitespace, group, combinator, nested query, filter, toggle, comment, word. The
/// operator alphabet comes from the registered operators, longest token first, so
/// `>=` is never read as `>` followed by a value starting with `=`.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    operators: Vec<String>,
}

impl Tokenizer {
    pub fn new(operators: &OperatorTable) -> Self {
        let mut tokenizer = Tokenizer {
            operators: Vec::new(),
        };
        tokenizer.set_operators(operators);
        tokenizer
    }

    /// Rebuilds the operator alphabet. Called whenever an operator is registered.
    pub fn set_operators(&mut self, operators: &OperatorTable) {
        self.operators = operators
            .tokens_longest_first()
            .into_iter()
            .map(str::to_string)
            .collect();
    }

    pub fn operators(&self) -> &[String] {
        &self.operators
    }

    /// Tokenizes `text`. Lexical and syntax errors stop the scan and are returned.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Lexeme>, QueryError> {
        Scanner {
            text,
            position: 0,
            end: text.len(),
            operators: &self.operators,
        }
        .scan()
    }
}

struct Scanner<'a> {
    text: &'a str,
    position: usize,
    end: usize,
    operators: &'a [String],
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '.'
}

fn is_word_char(ch: char) -> bool {
    !ch.is_whitespace() && !matches!(ch, '(' | ')' | '"' | '{' | '}')
}

impl<'a> Scanner<'a> {
    fn char_at(&self, position: usize) -> Option<char> {
        if position >= self.end {
            return None;
        }
        self.text[position..self.end].chars().next()
    }

    fn current_char(&self) -> Option<char> {
        self.char_at(self.position)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.position..self.end]
    }

    fn token(&self, start: usize, end: usize) -> QueryToken {
        QueryToken::from_range(self.text, start, end)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.position += ch.len_utf8();
        }
    }

    /// End of the run of characters satisfying `pred`, starting at `start`.
    fn take_while(&self, start: usize, pred: impl Fn(char) -> bool) -> usize {
        let mut position = start;
        while let Some(ch) = self.char_at(position) {
            if !pred(ch) {
                break;
            }
            position += ch.len_utf8();
        }
        position
    }

    /// Position of the quote closing the one at `open`.
    fn closing_quote(&self, open: usize) -> Option<usize> {
        self.text[open + 1..self.end].find('"').map(|i| open + 1 + i)
    }

    /// Position of the delimiter closing the one at `open`. Quoted text is skipped,
    /// and a `(` scan steps over balanced braces. A quote left open inside the
    /// delimiters is an error at the quote.
    fn closing_delimiter(
        &self,
        open: usize,
        open_ch: char,
        close_ch: char,
    ) -> Result<Option<usize>, QueryError> {
        let mut depth = 0usize;
        let mut position = open;
        while let Some(ch) = self.char_at(position) {
            match ch {
                '"' => {
                    position = self.closing_quote(position).ok_or_else(|| {
                        QueryError::syntax(
                            position,
                            self.end - position,
                            "Unterminated quoted phrase",
                        )
                    })?;
                }
                '{' if open_ch == '(' => match self.closing_delimiter(position, '{', '}')? {
                    Some(close) => position = close,
                    None => return Ok(None),
                },
                c if c == open_ch => depth += 1,
                c if c == close_ch => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some(position));
                    }
                }
                _ => {}
            }
            position += self.char_at(position).map_or(1, char::len_utf8);
        }
        Ok(None)
    }

    fn scan(mut self) -> Result<Vec<Lexeme>, QueryError> {
        let mut lexemes = Vec::new();

        loop {
            self.skip_whitespace();
            let Some(ch) = self.current_char() else {
                break;
            };
            let start = self.position;

            if let Some(group) = self.match_group()? {
                if let Some(group) = group {
                    lexemes.push(group);
                }
                continue;
            }
            if let Some(kind) = self.match_combinator() {
                lexemes.push(Lexeme {
                    kind,
                    token: self.token(start, self.position),
                });
                continue;
            }
            if let Some(nested) = self.match_nested()? {
                lexemes.push(Lexeme {
                    token: nested.token.clone(),
                    kind: LexemeKind::Nested(nested),
                });
                continue;
            }
            if let Some(kind) = self
                .match_filter()?
                .or_else(|| self.match_toggle())
                .or_else(|| self.match_comment())
            {
                lexemes.push(Lexeme {
                    kind,
                    token: self.token(start, self.position),
                });
                continue;
            }
            if let Some(kind) = self.match_word()? {
                lexemes.push(Lexeme {
                    kind,
                    token: self.token(start, self.position),
                });
                continue;
            }

            return Err(QueryError::lex(
                start,
                ch.len_utf8(),
                format!("Unexpected character '{}'", ch),
            ));
        }

        Ok(lexemes)
    }

    /// `Some(None)` is an empty group, which is dropped.
    fn match_group(&mut self) -> Result<Option<Option<Lexeme>>, QueryError> {
        let start = self.position;
        match self.current_char() {
            Some(')') => Err(QueryError::syntax(start, 1, "Unexpected ')'")),
            Some('(') => {
                let close = self
                    .closing_delimiter(start, '(', ')')?
                    .ok_or_else(|| QueryError::syntax(start, 1, "Unbalanced '(': missing ')'"))?;
                let inner = Scanner {
                    text: self.text,
                    position: start + 1,
                    end: close,
                    operators: self.operators,
                }
                .scan()?;
                self.position = close + 1;
                if inner.is_empty() {
                    return Ok(Some(None));
                }
                Ok(Some(Some(Lexeme {
                    kind: LexemeKind::Group(inner),
                    token: self.token(start, close + 1),
                })))
            }
            _ => Ok(None),
        }
    }

    fn match_combinator(&mut self) -> Option<LexemeKind> {
        if self.current_char() == Some('-') {
            let next = self.char_at(self.position + 1)?;
            if next.is_whitespace() {
                return None;
            }
            self.position += 1;
            return Some(LexemeKind::Not);
        }

        let end = self.take_while(self.position, |c| c.is_ascii_alphabetic());
        let word = &self.text[self.position..end];
        let kind = if word.eq_ignore_ascii_case("and") {
            LexemeKind::And
        } else if word.eq_ignore_ascii_case("or") {
            LexemeKind::Or
        } else if word.eq_ignore_ascii_case("not") {
            LexemeKind::Not
        } else {
            return None;
        };

        // Keywords must stand alone: `order:5` and `android` are not combinators.
        match self.char_at(end) {
            None => {}
            Some(c) if c.is_whitespace() || matches!(c, '(' | '"' | '{') => {}
            Some(_) => return None,
        }
        self.position = end;
        Some(kind)
    }

    /// `{query}` or `name{query}` starting at `start`.
    fn nested_at(&self, start: usize) -> Result<Option<NestedLexeme>, QueryError> {
        let name_end = self.take_while(start, |c| c.is_alphanumeric() || c == '_');
        if self.char_at(name_end) != Some('{') {
            return Ok(None);
        }
        let close = self
            .closing_delimiter(name_end, '{', '}')?
            .ok_or_else(|| QueryError::syntax(name_end, 1, "Unbalanced '{': missing '}'"))?;
        let aggregator = (name_end > start).then(|| self.text[start..name_end].to_string());
        Ok(Some(NestedLexeme {
            aggregator,
            query: self.text[name_end + 1..close].trim().to_string(),
            token: self.token(start, close + 1),
        }))
    }

    fn match_nested(&mut self) -> Result<Option<NestedLexeme>, QueryError> {
        let nested = self.nested_at(self.position)?;
        if let Some(nested) = &nested {
            self.position = nested.token.end();
        }
        Ok(nested)
    }

    fn match_filter(&mut self) -> Result<Option<LexemeKind>, QueryError> {
        let start = self.position;
        let first = match self.current_char() {
            Some(c) if c.is_alphabetic() || c == '_' || c == '#' => c,
            _ => return Ok(None),
        };
        let name_end = self.take_while(start + first.len_utf8(), is_name_char);
        let name = &self.text[start..name_end];

        let mut cursor = name_end;
        let mut param = None;
        if self.char_at(cursor) == Some('(') {
            let Some(close) = self.text[cursor + 1..self.end]
                .find([')', '('])
                .map(|i| cursor + 1 + i)
                .filter(|close| self.char_at(*close) == Some(')'))
            else {
                return Ok(None);
            };
            param = Some(self.text[cursor + 1..close].trim().to_string());
            cursor = close + 1;
        }

        let after_name = &self.text[cursor..self.end];
        let Some(operator) = self
            .operators
            .iter()
            .find(|op| after_name.starts_with(op.as_str()))
        else {
            return Ok(None);
        };
        cursor += operator.len();

        let mut expression = FilterExpression {
            name: name.to_string(),
            param,
            operator: operator.clone(),
            value: String::new(),
            quoted: false,
        };
        let mut nested = None;

        match self.char_at(cursor) {
            Some('"') => {
                let close = self.closing_quote(cursor).ok_or_else(|| {
                    QueryError::syntax(cursor, self.end - cursor, "Unterminated quoted value")
                })?;
                expression.value = self.text[cursor + 1..close].to_string();
                expression.quoted = true;
                cursor = close + 1;
            }
            _ => {
                if let Some(value) = self.nested_at(cursor)? {
                    expression.value = value.token.text.clone();
                    cursor = value.token.end();
                    nested = Some(value);
                } else {
                    let value_end = self.take_while(cursor, |c| {
                        !c.is_whitespace() && !matches!(c, '(' | ')')
                    });
                    expression.value = self.text[cursor..value_end].to_string();
                    cursor = value_end;
                }
            }
        }

        self.position = cursor;
        Ok(Some(LexemeKind::Filter { expression, nested }))
    }

    fn match_toggle(&mut self) -> Option<LexemeKind> {
        if self.current_char() != Some('+') {
            return None;
        }
        let end = self.take_while(self.position + 1, |c| is_name_char(c) || c == '-');
        if end == self.position + 1 {
            return None;
        }
        let name = self.text[self.position + 1..end].to_string();
        self.position = end;
        Some(LexemeKind::Toggle(name))
    }

    fn match_comment(&mut self) -> Option<LexemeKind> {
        if !self.rest().starts_with("//") {
            return None;
        }
        let end = self.rest().find('\n').map_or(self.end, |i| self.position + i);
        let text = self.text[self.position + 2..end].trim().to_string();
        self.position = end;
        Some(LexemeKind::Comment(text))
    }

    fn match_word(&mut self) -> Result<Option<LexemeKind>, QueryError> {
        let start = self.position;
        let bang = self.current_char() == Some('!');
        let body = if bang { start + 1 } else { start };

        if self.char_at(body) == Some('"') {
            let close = self.closing_quote(body).ok_or_else(|| {
                QueryError::syntax(body, self.end - body, "Unterminated quoted phrase")
            })?;
            self.position = close + 1;
            return Ok(Some(LexemeKind::Word(SearchExpression {
                text: self.text[body + 1..close].to_string(),
                exact: bang,
                phrase: true,
            })));
        }

        let end = self.take_while(body, is_word_char);
        if end == start {
            return Ok(None);
        }
        self.position = end;
        // A lone `!` is searched for literally.
        let (text, exact) = if bang && end > body {
            (&self.text[body..end], true)
        } else {
            (&self.text[start..end], false)
        };
        Ok(Some(LexemeKind::Word(SearchExpression {
            text: text.to_string(),
            exact,
            phrase: false,
        })))
    }
}

#[cfg(test)]
fn kinds(text: &str) -> Vec<LexemeKind> {
    Tokenizer::new(&OperatorTable::with_defaults())
        .tokenize(text)
        .unwrap()
        .into_iter()
        .map(|l| l.kind)
        .collect()
}

#[test]
fn test_keywords() {
    assert_eq!(
        kinds("a AND b or not c"),
        vec![
            LexemeKind::Word(SearchExpression {
                text: "a".to_string(),
                exact: false,
                phrase: false
            }),
            LexemeKind::And,
            LexemeKind::Word(SearchExpression {
                text: "b".to_string(),
                exact: false,
                phrase: false
            }),
            LexemeKind::Or,
            LexemeKind::Not,
            LexemeKind::Word(SearchExpression {
                text: "c".to_string(),
                exact: false,
                phrase: false
            }),
        ]
    );
}

#[test]
fn test_longest_operator_wins() {
    let lexemes = kinds("size>=10");
    let [LexemeKind::Filter { expression, nested: None }] = lexemes.as_slice() else {
        panic!("expected one filter, got {:?}", lexemes);
    };
    assert_eq!(expression.operator, ">=");
    assert_eq!(expression.value, "10");
}
