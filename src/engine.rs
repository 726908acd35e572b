use std::{hash::Hash, rc::Rc};

use log::warn;

use crate::{
    ast::QueryToken,
    error::EngineError,
    evaluator::EvaluationMode,
    filter::Filter,
    lexer::{Lexeme, LexemeKind, Tokenizer},
    nested::{self, AggregatorFn, NestedQueryHandler},
    operator::{self, FilterOperator, StringComparison},
    parser::{ParseOutput, Parser},
    query::Query,
    registry::{DefaultFilterFn, Registry, SearchDataFn, ValidationOptions, WordMatcherFn},
    value::{FilterType, ParseResult, Value, ValueType},
};

/// Parses filter expressions into [`Query`] objects over elements of type `T`.
///
/// The engine owns the registries (filters, operators, type parsers, callbacks) and
/// the tokenizer. Configure it once, then call [`QueryEngine::parse`] for each query
/// text.
///
/// # Examples
///
/// ```
/// use sift_query::{Filter, QueryEngine};
///
/// #[derive(Clone, PartialEq, Eq, Hash)]
/// struct Asset {
///     name: String,
///     size: i64,
/// }
///
/// let mut engine = QueryEngine::new();
/// engine.add_filter(Filter::new("size", |a: &Asset| a.size));
/// engine.set_search_data_callback(|a: &Asset| vec![a.name.clone()]);
///
/// let assets = vec![
///     Asset { name: "big rock".into(), size: 40 },
///     Asset { name: "pebble".into(), size: 2 },
/// ];
///
/// let query = engine.parse("rock size>=10");
/// let names: Vec<String> = query.apply(assets).map(|a| a.name).collect();
/// assert_eq!(names, vec!["big rock"]);
/// ```
pub struct QueryEngine<T> {
    registry: Registry<T>,
    tokenizer: Tokenizer,
}

impl<T: Clone + Eq + Hash + 'static> QueryEngine<T> {
    /// Engine with the default operators and the `first`/`last` aggregators.
    pub fn new() -> Self {
        let registry = Registry::new();
        let tokenizer = Tokenizer::new(registry.operators());
        QueryEngine {
            registry,
            tokenizer,
        }
    }

    pub fn registry(&self) -> &Registry<T> {
        &self.registry
    }

    /// Parses `text` with strict set semantics.
    pub fn parse(&self, text: &str) -> Query<T> {
        self.parse_with_mode(text, EvaluationMode::Strict)
    }

    pub fn parse_with_mode(&self, text: &str, mode: EvaluationMode) -> Query<T> {
        let registry = Rc::new(self.registry.clone());
        let (output, tokens) = match self.tokenizer.tokenize(text) {
            Ok(lexemes) => {
                let tokens = flatten_tokens(&lexemes);
                (Parser::new(text, &registry).parse(&lexemes), tokens)
            }
            Err(error) => (
                ParseOutput {
                    errors: vec![error],
                    ..ParseOutput::default()
                },
                Vec::new(),
            ),
        };
        Query::new(text, registry, output, tokens, mode)
    }

    // ========================================
    // Filters
    // ========================================

    /// Registers `filter`. Returns `false` (and logs a warning) if its token is taken.
    pub fn add_filter(&mut self, filter: Filter<T>) -> bool {
        let token = filter.token().to_string();
        let added = self.registry.add_filter(filter);
        if !added {
            warn!("filter '{}' is already registered", token);
        }
        added
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter<T>> {
        self.registry.filters()
    }

    /// Handles filter names that are not registered, when validation lets them
    /// through. Called with `(element, name, operator, raw value)`.
    pub fn set_default_filter<F>(&mut self, filter: F)
    where
        F: Fn(&T, &str, &str, &str) -> bool + 'static,
    {
        let filter: DefaultFilterFn<T> = Rc::new(filter);
        self.registry.default_filter = Some(filter);
    }

    pub fn set_validation_options(&mut self, options: ValidationOptions) {
        self.registry.validation = options;
    }

    pub fn validation_options(&self) -> ValidationOptions {
        self.registry.validation
    }

    /// String comparison used by default string handlers and search words.
    pub fn set_string_comparison(&mut self, comparison: StringComparison) {
        self.registry.string_comparison = comparison;
    }

    // ========================================
    // Operators & Types
    // ========================================

    /// Registers an operator without handlers. Returns `Ok(false)` if the token is
    /// already registered.
    pub fn add_operator(&mut self, token: &str) -> Result<bool, EngineError> {
        let valid = !token.is_empty()
            && !token
                .chars()
                .any(|c| c.is_whitespace() || c.is_alphanumeric() || matches!(c, '"' | '(' | ')' | '{' | '}'));
        if !valid {
            return Err(EngineError::InvalidOperatorToken(token.to_string()));
        }
        if !self.registry.operators.insert(FilterOperator::new(token)) {
            warn!("operator '{}' is already registered", token);
            return Ok(false);
        }
        self.tokenizer.set_operators(&self.registry.operators);
        Ok(true)
    }

    /// Adds a handler for `operator` between `lhs` and `rhs` values. `(Any, Any)`
    /// installs the fallback used when no exact pair matches.
    pub fn add_operator_handler<F>(
        &mut self,
        operator: &str,
        lhs: ValueType,
        rhs: ValueType,
        handler: F,
    ) -> Result<(), EngineError>
    where
        F: Fn(&Value, &Value, StringComparison) -> bool + 'static,
    {
        let op = self
            .registry
            .operators
            .get_mut(operator)
            .ok_or_else(|| EngineError::UnknownOperator(operator.to_string()))?;
        op.add_handler(lhs, rhs, operator::handler(handler));
        Ok(())
    }

    /// Typed form of [`QueryEngine::add_operator_handler`]; the key comes from `L`
    /// and `R`.
    pub fn add_typed_operator_handler<L, R, F>(&mut self, operator: &str, handler: F) -> Result<(), EngineError>
    where
        L: FilterType,
        R: FilterType,
        F: Fn(L, R) -> bool + 'static,
    {
        self.add_operator_handler(operator, L::VALUE_TYPE, R::VALUE_TYPE, move |l, r, _| {
            match (L::from_value(l), R::from_value(r)) {
                (Some(l), Some(r)) => handler(l, r),
                _ => false,
            }
        })
    }

    /// Parser for raw values of `value_type`, tried before the built-in one.
    pub fn add_type_parser<F>(&mut self, value_type: ValueType, parser: F)
    where
        F: Fn(&str) -> ParseResult<Value> + 'static,
    {
        self.registry.set_type_parser(value_type, Rc::new(parser));
    }

    // ========================================
    // Search & Nested Queries
    // ========================================

    /// Strings that bare words and phrases are matched against.
    pub fn set_search_data_callback<F, I, S>(&mut self, callback: F)
    where
        F: Fn(&T) -> I + 'static,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let search: SearchDataFn<T> = Rc::new(move |element: &T, matches: &dyn Fn(&str) -> bool| {
            callback(element).into_iter().any(|s| matches(s.as_ref()))
        });
        self.registry.search_data = Some(search);
    }

    /// Replaces substring matching of bare words. Called with `(word, search string)`.
    /// `!word` still requires equality.
    pub fn set_search_word_matcher<F>(&mut self, matcher: F)
    where
        F: Fn(&str, &str) -> bool + 'static,
    {
        let matcher: WordMatcherFn = Rc::new(matcher);
        self.registry.word_matcher = Some(matcher);
    }

    /// Resolves `{query}` blocks. Called with the text between the braces and the
    /// name of the enclosing filter (empty outside a filter), once per evaluation.
    pub fn set_nested_query_handler<F, I>(&mut self, handler: F)
    where
        F: Fn(&str, &str) -> I + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let handler: NestedQueryHandler<T> =
            Rc::new(move |query: &str, filter: &str| -> Box<dyn Iterator<Item = T>> {
                Box::new(handler(query, filter).into_iter())
            });
        self.registry.nested_handler = Some(handler);
    }

    /// Registers `name{...}`. Returns `false` (and logs a warning) if the name is
    /// taken.
    pub fn add_nested_query_aggregator<F>(&mut self, name: &str, aggregator: F) -> bool
    where
        F: Fn(Vec<T>) -> Vec<T> + 'static,
    {
        let aggregator: AggregatorFn<T> = Rc::new(aggregator);
        self.insert_aggregator(name, aggregator)
    }

    /// Registers `max{...}` and `min{...}` ordering elements by `key`.
    pub fn add_ordering_aggregators<K>(&mut self, key: K) -> bool
    where
        K: Fn(&T) -> Option<Value> + 'static,
    {
        let (max, min) = nested::ordering_aggregators(key);
        let added_max = self.insert_aggregator("max", max);
        let added_min = self.insert_aggregator("min", min);
        added_max && added_min
    }

    fn insert_aggregator(&mut self, name: &str, aggregator: AggregatorFn<T>) -> bool {
        let added = self.registry.aggregators.insert(name, aggregator);
        if !added {
            warn!("aggregator '{}' is already registered", name);
        }
        added
    }
}

impl<T: Clone + Eq + Hash + 'static> Default for QueryEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexeme tokens in text order, group contents inlined.
fn flatten_tokens(lexemes: &[Lexeme]) -> Vec<QueryToken> {
    let mut tokens = Vec::new();
    for lexeme in lexemes {
        match &lexeme.kind {
            LexemeKind::Group(inner) => tokens.extend(flatten_tokens(inner)),
            _ => tokens.push(lexeme.token.clone()),
        }
    }
    tokens
}

