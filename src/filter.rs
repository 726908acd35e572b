//! Filter definitions: a named, typed accessor bound to the engine's element type.

use std::{fmt, rc::Rc};

use regex::Regex;

use crate::{
    error::EngineError,
    operator::StringComparison,
    value::{FilterType, ParseResult, Value, ValueType},
};

/// Arguments handed to a filter getter or resolver for one filter node.
#[derive(Debug, Clone, Default)]
pub struct FilterArgs {
    /// Filter name as written in the query.
    pub name: String,

    /// Parsed parameter (`name(param)`), if the filter takes one and it was given.
    pub param: Option<Value>,

    /// Capture groups of a pattern filter token, in order. Empty for exact tokens.
    pub captures: Vec<String>,
}

pub type GetterFn<T> = Rc<dyn Fn(&T, &FilterArgs) -> Option<Value>>;
pub type ResolverFn<T> = Rc<dyn Fn(&T, &FilterArgs, &str, &Value) -> bool>;
pub type TypeParserFn = Rc<dyn Fn(&str) -> ParseResult<Value>>;
pub type TransformerFn<T> = Rc<dyn Fn(&T) -> Option<Value>>;

fn getter_fn<T, F>(getter: F) -> GetterFn<T>
where
    F: Fn(&T, &FilterArgs) -> Option<Value> + 'static,
{
    Rc::new(getter)
}

fn transformer_fn<T, F>(transform: F) -> TransformerFn<T>
where
    F: Fn(&T) -> Option<Value> + 'static,
{
    Rc::new(transform)
}

/// How a filter is identified in query text.
#[derive(Debug, Clone)]
pub enum FilterToken {
    /// Exact (case-insensitive) name.
    Exact(String),
    /// A family of names matching a regular expression, e.g. `#(\w+)`.
    Pattern(Regex),
}

impl FilterToken {
    pub fn matches(&self, name: &str) -> Option<Vec<String>> {
        match self {
            FilterToken::Exact(token) => token.eq_ignore_ascii_case(name).then(Vec::new),
            FilterToken::Pattern(regex) => {
                let captures = regex.captures(name)?;
                let whole = captures.get(0)?;
                if whole.start() != 0 || whole.end() != name.len() {
                    return None;
                }
                Some(
                    captures
                        .iter()
                        .skip(1)
                        .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                        .collect(),
                )
            }
        }
    }
}

impl fmt::Display for FilterToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterToken::Exact(token) => f.write_str(token),
            FilterToken::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// Where a filter gets its answer from.
#[derive(Clone)]
pub enum FilterSource<T> {
    /// Reads a value from the element; the operator compares it.
    Getter(GetterFn<T>),
    /// Decides the match itself from the element, operator token and parsed value.
    Resolver(ResolverFn<T>),
}

/// Parameter accepted by a filter (`dist(origin)<5`).
#[derive(Clone)]
pub struct FilterParameter {
    pub value_type: ValueType,
    /// Overrides the type parser for the parameter text.
    pub transformer: Option<TypeParserFn>,
}

/// Bridges nested query results to the filter's right-hand side (`owner:{team:core}`).
#[derive(Clone)]
pub struct NestedTransformer<T> {
    pub value_type: ValueType,
    pub transform: TransformerFn<T>,
}

/// A named, typed filter over elements of type `T`.
///
/// # Examples
///
/// ```
/// use sift_query::Filter;
///
/// struct Asset { name: String, size: i64 }
///
/// let size = Filter::new("size", |a: &Asset| a.size);
/// let name = Filter::new("name", |a: &Asset| a.name.clone())
///     .operators([":", "="]);
/// ```
#[derive(Clone)]
pub struct Filter<T> {
    token: FilterToken,
    value_type: ValueType,
    parameter: Option<FilterParameter>,
    operators: Option<Vec<String>>,
    source: FilterSource<T>,
    string_comparison: Option<StringComparison>,
    type_parser: Option<TypeParserFn>,
    nested: Option<NestedTransformer<T>>,
}

impl<T: 'static> Filter<T> {
    fn from_parts(token: FilterToken, value_type: ValueType, source: FilterSource<T>) -> Self {
        Filter {
            token,
            value_type,
            parameter: None,
            operators: None,
            source,
            string_comparison: None,
            type_parser: None,
            nested: None,
        }
    }

    /// Filter reading a typed value from each element.
    pub fn new<V, F>(token: impl Into<String>, getter: F) -> Self
    where
        V: FilterType,
        F: Fn(&T) -> V + 'static,
    {
        Self::from_parts(
            FilterToken::Exact(token.into()),
            V::VALUE_TYPE,
            FilterSource::Getter(getter_fn(move |element, _| Some(getter(element).into_value()))),
        )
    }

    /// Filter whose value may be absent; elements without a value never match.
    pub fn optional<V, F>(token: impl Into<String>, getter: F) -> Self
    where
        V: FilterType,
        F: Fn(&T) -> Option<V> + 'static,
    {
        Self::from_parts(
            FilterToken::Exact(token.into()),
            V::VALUE_TYPE,
            FilterSource::Getter(getter_fn(move |element, _| {
                getter(element).map(FilterType::into_value)
            })),
        )
    }

    /// Filter taking a parameter: `name(param) op value`.
    ///
    /// Nodes written without a parameter, or whose parameter does not convert to `P`,
    /// never match.
    pub fn with_parameter<P, V, F>(token: impl Into<String>, getter: F) -> Self
    where
        P: FilterType,
        V: FilterType,
        F: Fn(&T, P) -> V + 'static,
    {
        let mut filter = Self::from_parts(
            FilterToken::Exact(token.into()),
            V::VALUE_TYPE,
            FilterSource::Getter(getter_fn(move |element, args| {
                let param = P::from_value(args.param.as_ref()?)?;
                Some(getter(element, param).into_value())
            })),
        );
        filter.parameter = Some(FilterParameter {
            value_type: P::VALUE_TYPE,
            transformer: None,
        });
        filter
    }

    /// Family of filters whose names match `pattern` (anchored on both ends).
    ///
    /// The getter receives the written name and the capture groups.
    pub fn pattern<F>(pattern: &str, value_type: ValueType, getter: F) -> Result<Self, EngineError>
    where
        F: Fn(&T, &FilterArgs) -> Option<Value> + 'static,
    {
        let regex = Regex::new(pattern)?;
        Ok(Self::from_parts(
            FilterToken::Pattern(regex),
            value_type,
            FilterSource::Getter(Rc::new(getter)),
        ))
    }

    /// Filter that performs the comparison itself.
    ///
    /// The raw value is coerced to `value_type`; the resolver gets the element, the
    /// node arguments, the operator token and the coerced value.
    pub fn resolver<F>(token: impl Into<String>, value_type: ValueType, resolver: F) -> Self
    where
        F: Fn(&T, &FilterArgs, &str, &Value) -> bool + 'static,
    {
        Self::from_parts(
            FilterToken::Exact(token.into()),
            value_type,
            FilterSource::Resolver(Rc::new(resolver)),
        )
    }

    /// Erased getter with an explicit value type.
    pub fn dynamic<F>(token: impl Into<String>, value_type: ValueType, getter: F) -> Self
    where
        F: Fn(&T, &FilterArgs) -> Option<Value> + 'static,
    {
        Self::from_parts(
            FilterToken::Exact(token.into()),
            value_type,
            FilterSource::Getter(Rc::new(getter)),
        )
    }

    /// Restricts the operators this filter accepts.
    pub fn operators<I, S>(mut self, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operators = Some(operators.into_iter().map(Into::into).collect());
        self
    }

    /// Declares an erased parameter for pattern, resolver and dynamic filters.
    pub fn parameter(mut self, value_type: ValueType) -> Self {
        let transformer = self.parameter.take().and_then(|p| p.transformer);
        self.parameter = Some(FilterParameter {
            value_type,
            transformer,
        });
        self
    }

    /// Custom conversion of the parameter text.
    pub fn parameter_transformer<F>(mut self, transformer: F) -> Self
    where
        F: Fn(&str) -> ParseResult<Value> + 'static,
    {
        let value_type = self
            .parameter
            .as_ref()
            .map(|p| p.value_type)
            .unwrap_or(ValueType::Any);
        self.parameter = Some(FilterParameter {
            value_type,
            transformer: Some(Rc::new(transformer)),
        });
        self
    }

    /// Overrides the engine's string comparison for this filter.
    pub fn string_comparison(mut self, comparison: StringComparison) -> Self {
        self.string_comparison = Some(comparison);
        self
    }

    /// Parser tried before any other when coercing this filter's values.
    pub fn type_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> ParseResult<Value> + 'static,
    {
        self.type_parser = Some(Rc::new(parser));
        self
    }

    /// Enables `name op {nested}`: each nested result is mapped through `transform`.
    pub fn nested_transformer<V, F>(mut self, transform: F) -> Self
    where
        V: FilterType,
        F: Fn(&T) -> Option<V> + 'static,
    {
        self.nested = Some(NestedTransformer {
            value_type: V::VALUE_TYPE,
            transform: transformer_fn(move |element| transform(element).map(FilterType::into_value)),
        });
        self
    }

    /// Erased form of [`Filter::nested_transformer`].
    pub fn dynamic_nested_transformer<F>(mut self, value_type: ValueType, transform: F) -> Self
    where
        F: Fn(&T) -> Option<Value> + 'static,
    {
        self.nested = Some(NestedTransformer {
            value_type,
            transform: Rc::new(transform),
        });
        self
    }
}

impl<T> Filter<T> {
    pub fn token(&self) -> &FilterToken {
        &self.token
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn parameter_spec(&self) -> Option<&FilterParameter> {
        self.parameter.as_ref()
    }

    pub fn source(&self) -> &FilterSource<T> {
        &self.source
    }

    pub fn string_comparison_override(&self) -> Option<StringComparison> {
        self.string_comparison
    }

    pub fn custom_type_parser(&self) -> Option<&TypeParserFn> {
        self.type_parser.as_ref()
    }

    pub fn nested(&self) -> Option<&NestedTransformer<T>> {
        self.nested.as_ref()
    }

    /// True if `operator` is allowed (no whitelist allows everything).
    pub fn accepts_operator(&self, operator: &str) -> bool {
        self.operators
            .as_ref()
            .is_none_or(|ops| ops.iter().any(|op| op == operator))
    }

    pub fn operator_whitelist(&self) -> Option<&[String]> {
        self.operators.as_deref()
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("token", &self.token.to_string())
            .field("value_type", &self.value_type)
            .field("parameter", &self.parameter.as_ref().map(|p| p.value_type))
            .field("operators", &self.operators)
            .field(
                "resolver",
                &matches!(self.source, FilterSource::Resolver(_)),
            )
            .field("nested", &self.nested.as_ref().map(|n| n.value_type))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        size: i64,
    }

    #[test]
    fn pattern_tokens_match_whole_name() {
        let filter: Filter<Item> =
            Filter::pattern(r"#(\w+)", ValueType::Integer, |_, _| None).unwrap();
        assert_eq!(filter.token().matches("#width"), Some(vec!["width".to_string()]));
        assert_eq!(filter.token().matches("x#width"), None);
        assert!(Filter::<Item>::pattern("(", ValueType::Any, |_, _| None).is_err());
    }

    #[test]
    fn exact_tokens_ignore_case() {
        let filter = Filter::new("size", |i: &Item| i.size);
        assert!(filter.token().matches("SIZE").is_some());
        assert_eq!(filter.value_type(), ValueType::Integer);
        assert!(filter.accepts_operator(">="));

        let restricted = filter.operators(["="]);
        assert!(!restricted.accepts_operator(">="));
    }

    #[test]
    fn parametrized_getter_needs_parameter() {
        let filter = Filter::with_parameter("scaled", |i: &Item, factor: i64| i.size * factor);
        let FilterSource::Getter(getter) = filter.source() else {
            panic!("expected getter");
        };
        let item = Item { size: 3 };
        assert_eq!(getter(&item, &FilterArgs::default()), None);
        let args = FilterArgs {
            param: Some(Value::Integer(2)),
            ..FilterArgs::default()
        };
        assert_eq!(getter(&item, &args), Some(Value::Integer(6)));
    }
}
