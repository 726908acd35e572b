//! Everything a query needs from its engine at parse and compile time.
//!
//! [`crate::QueryEngine`] owns a mutable [`Registry`]; every parsed [`crate::Query`]
//! holds an `Rc` snapshot taken when it was parsed, so registering more filters later
//! never changes an existing query.

use std::{collections::HashMap, rc::Rc};

use crate::{
    filter::{Filter, FilterToken, TypeParserFn},
    nested::{AggregatorTable, NestedQueryHandler},
    operator::{OperatorTable, StringComparison},
    value::{ParseResult, Value, ValueType},
};

/// Erased search callback: calls the matcher on each search string of the element and
/// reports whether any matched.
pub type SearchDataFn<T> = Rc<dyn Fn(&T, &dyn Fn(&str) -> bool) -> bool>;

/// Custom matcher for bare search words: `(word, search string) -> matches`.
pub type WordMatcherFn = Rc<dyn Fn(&str, &str) -> bool>;

/// Handles filters that are not registered: `(element, name, operator, value)`.
pub type DefaultFilterFn<T> = Rc<dyn Fn(&T, &str, &str, &str) -> bool>;

/// How strictly filter nodes are checked while building the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Report unknown and incomplete filters as semantic errors.
    pub validate_filters: bool,

    /// Prune unknown filters from evaluation instead of reporting them.
    pub skip_unknown_filters: bool,

    /// Prune filters written without a value instead of reporting them.
    pub skip_incomplete_filters: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        ValidationOptions {
            validate_filters: true,
            skip_unknown_filters: false,
            skip_incomplete_filters: false,
        }
    }
}

/// A filter found for a name written in a query.
pub struct FilterMatch<'a, T> {
    pub filter: &'a Filter<T>,
    /// Capture groups when the filter is a pattern family.
    pub captures: Vec<String>,
}

pub struct Registry<T> {
    filters: Vec<Filter<T>>,
    exact: HashMap<String, usize>,
    patterns: Vec<usize>,
    pub(crate) operators: OperatorTable,
    type_parsers: HashMap<ValueType, TypeParserFn>,
    pub(crate) aggregators: AggregatorTable<T>,
    pub(crate) search_data: Option<SearchDataFn<T>>,
    pub(crate) word_matcher: Option<WordMatcherFn>,
    pub(crate) nested_handler: Option<NestedQueryHandler<T>>,
    pub(crate) default_filter: Option<DefaultFilterFn<T>>,
    pub(crate) validation: ValidationOptions,
    pub(crate) string_comparison: StringComparison,
}

impl<T: Clone + 'static> Registry<T> {
    pub fn new() -> Self {
        Registry {
            filters: Vec::new(),
            exact: HashMap::new(),
            patterns: Vec::new(),
            operators: OperatorTable::with_defaults(),
            type_parsers: HashMap::new(),
            aggregators: AggregatorTable::new(),
            search_data: None,
            word_matcher: None,
            nested_handler: None,
            default_filter: None,
            validation: ValidationOptions::default(),
            string_comparison: StringComparison::default(),
        }
    }

    /// Adds `filter`; returns `false` and leaves the registry untouched if its token
    /// is already registered.
    pub fn add_filter(&mut self, filter: Filter<T>) -> bool {
        let index = self.filters.len();
        match filter.token() {
            FilterToken::Exact(token) => {
                let key = token.to_lowercase();
                if self.exact.contains_key(&key) {
                    return false;
                }
                self.exact.insert(key, index);
            }
            FilterToken::Pattern(regex) => {
                let taken = self.patterns.iter().any(|i| {
                    matches!(self.filters[*i].token(), FilterToken::Pattern(other) if other.as_str() == regex.as_str())
                });
                if taken {
                    return false;
                }
                self.patterns.push(index);
            }
        }
        self.filters.push(filter);
        true
    }

    /// Looks `name` up: exact tokens first, then pattern families in registration
    /// order.
    pub fn find_filter(&self, name: &str) -> Option<FilterMatch<'_, T>> {
        if let Some(index) = self.exact.get(&name.to_lowercase()) {
            return Some(FilterMatch {
                filter: &self.filters[*index],
                captures: Vec::new(),
            });
        }
        self.patterns.iter().find_map(|index| {
            let filter = &self.filters[*index];
            filter
                .token()
                .matches(name)
                .map(|captures| FilterMatch { filter, captures })
        })
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter<T>> {
        self.filters.iter()
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub fn set_type_parser(&mut self, value_type: ValueType, parser: TypeParserFn) {
        self.type_parsers.insert(value_type, parser);
    }

    /// Parses `text` as `value_type`: registered parser first, then the built-in one.
    pub fn parse_value(&self, value_type: ValueType, text: &str) -> ParseResult<Value> {
        if let Some(parser) = self.type_parsers.get(&value_type) {
            let parsed = parser(text);
            if parsed.is_success() {
                return parsed;
            }
        }
        value_type.parse_default(text)
    }

    pub fn has_nested_handler(&self) -> bool {
        self.nested_handler.is_some()
    }

    pub fn validation(&self) -> ValidationOptions {
        self.validation
    }

    pub fn string_comparison(&self) -> StringComparison {
        self.string_comparison
    }
}

impl<T: Clone + 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Registry {
            filters: self.filters.clone(),
            exact: self.exact.clone(),
            patterns: self.patterns.clone(),
            operators: self.operators.clone(),
            type_parsers: self.type_parsers.clone(),
            aggregators: self.aggregators.clone(),
            search_data: self.search_data.clone(),
            word_matcher: self.word_matcher.clone(),
            nested_handler: self.nested_handler.clone(),
            default_filter: self.default_filter.clone(),
            validation: self.validation,
            string_comparison: self.string_comparison,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Item {
        size: i64,
    }

    #[test]
    fn exact_before_pattern() {
        let mut registry: Registry<Item> = Registry::new();
        assert!(registry.add_filter(Filter::new("size", |i: &Item| i.size)));
        assert!(
            registry.add_filter(
                Filter::pattern(r"s(\w+)", ValueType::String, |_, _| None).unwrap()
            )
        );

        let found = registry.find_filter("SIZE").unwrap();
        assert_eq!(found.filter.value_type(), ValueType::Integer);
        assert!(found.captures.is_empty());

        let found = registry.find_filter("shape").unwrap();
        assert_eq!(found.captures, vec!["hape".to_string()]);
        assert!(registry.find_filter("weight").is_none());
    }

    #[test]
    fn duplicate_tokens_are_rejected() {
        let mut registry: Registry<Item> = Registry::new();
        assert!(registry.add_filter(Filter::new("size", |i: &Item| i.size)));
        assert!(!registry.add_filter(Filter::new("Size", |i: &Item| i.size * 2)));
        assert_eq!(registry.filters().count(), 1);
    }

    #[test]
    fn registered_parser_wins_over_builtin() {
        let mut registry: Registry<Item> = Registry::new();
        registry.set_type_parser(
            ValueType::Integer,
            Rc::new(|text: &str| match text {
                "lots" => ParseResult::success(Value::Integer(1000)),
                _ => ParseResult::failure(),
            }),
        );
        assert_eq!(
            registry.parse_value(ValueType::Integer, "lots").into_value(),
            Some(Value::Integer(1000))
        );
        assert_eq!(
            registry.parse_value(ValueType::Integer, "12").into_value(),
            Some(Value::Integer(12))
        );
    }
}
