//! Filter operators and their per-type-pair handler tables.

use std::{cmp::Ordering, collections::HashMap, fmt, rc::Rc};

use crate::value::{Value, ValueType};

/// How string operands are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringComparison {
    /// Byte-wise comparison.
    Ordinal,
    /// Case-insensitive comparison (Unicode lowercase folding).
    #[default]
    IgnoreCase,
}

impl StringComparison {
    pub fn equals(self, a: &str, b: &str) -> bool {
        match self {
            StringComparison::Ordinal => a == b,
            StringComparison::IgnoreCase => {
                a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
            }
        }
    }

    pub fn contains(self, haystack: &str, needle: &str) -> bool {
        match self {
            StringComparison::Ordinal => haystack.contains(needle),
            StringComparison::IgnoreCase => {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
        }
    }

    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            StringComparison::Ordinal => a.cmp(b),
            StringComparison::IgnoreCase => a.to_lowercase().cmp(&b.to_lowercase()),
        }
    }
}

/// Erased operator handler: `(lhs, rhs, string comparison) -> matches`.
pub type OperatorHandler = Rc<dyn Fn(&Value, &Value, StringComparison) -> bool>;

/// Boxes a closure as an [`OperatorHandler`].
pub fn handler<F>(f: F) -> OperatorHandler
where
    F: Fn(&Value, &Value, StringComparison) -> bool + 'static,
{
    Rc::new(f)
}

/// A named binary relation with one handler per `(lhs, rhs)` type pair.
///
/// Handlers keyed `(Any, Any)` form the fallback consulted when no exact pair exists.
#[derive(Clone)]
pub struct FilterOperator {
    token: String,
    handlers: Vec<((ValueType, ValueType), OperatorHandler)>,
    fallback: Option<OperatorHandler>,
}

impl FilterOperator {
    pub fn new(token: impl Into<String>) -> Self {
        FilterOperator {
            token: token.into(),
            handlers: Vec::new(),
            fallback: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Stores `handler` for `(lhs, rhs)`, replacing an existing one.
    pub fn add_handler(&mut self, lhs: ValueType, rhs: ValueType, handler: OperatorHandler) {
        if lhs == ValueType::Any && rhs == ValueType::Any {
            self.fallback = Some(handler);
            return;
        }
        match self.handlers.iter_mut().find(|(key, _)| *key == (lhs, rhs)) {
            Some((_, existing)) => *existing = handler,
            None => self.handlers.push(((lhs, rhs), handler)),
        }
    }

    /// Exact `(lhs, rhs)` handler, if any.
    pub fn exact_handler(&self, lhs: ValueType, rhs: ValueType) -> Option<&OperatorHandler> {
        self.handlers
            .iter()
            .find(|(key, _)| *key == (lhs, rhs))
            .map(|(_, handler)| handler)
    }

    pub fn fallback_handler(&self) -> Option<&OperatorHandler> {
        self.fallback.as_ref()
    }

    /// Exact handler, else the `(Any, Any)` fallback.
    pub fn resolve(&self, lhs: ValueType, rhs: ValueType) -> Option<&OperatorHandler> {
        self.exact_handler(lhs, rhs).or(self.fallback.as_ref())
    }

    /// Right-hand types this operator can compare against `lhs`: concrete types in
    /// registration order, then `Any` if an erased handler exists.
    pub fn rhs_types(&self, lhs: ValueType) -> Vec<ValueType> {
        let mut types: Vec<ValueType> = self
            .handlers
            .iter()
            .filter(|((l, r), _)| *l == lhs && *r != ValueType::Any)
            .map(|((_, r), _)| *r)
            .collect();
        let erased = self.exact_handler(lhs, ValueType::Any).is_some() || self.fallback.is_some();
        if erased {
            types.push(ValueType::Any);
        }
        types
    }
}

impl fmt::Debug for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterOperator")
            .field("token", &self.token)
            .field(
                "handlers",
                &self.handlers.iter().map(|(key, _)| *key).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Registered operators, in registration order.
#[derive(Debug, Clone, Default)]
pub struct OperatorTable {
    operators: Vec<FilterOperator>,
    index: HashMap<String, usize>,
}

impl OperatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the default operators and their handlers.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for op in DefaultOperator::ALL {
            let mut operator = FilterOperator::new(op.token());
            op.install_handlers(&mut operator);
            table.insert(operator);
        }
        table
    }

    /// Adds `operator`; returns `false` if the token is already taken.
    pub fn insert(&mut self, operator: FilterOperator) -> bool {
        if self.index.contains_key(operator.token()) {
            return false;
        }
        self.index
            .insert(operator.token().to_string(), self.operators.len());
        self.operators.push(operator);
        true
    }

    pub fn get(&self, token: &str) -> Option<&FilterOperator> {
        self.index.get(token).map(|i| &self.operators[*i])
    }

    pub fn get_mut(&mut self, token: &str) -> Option<&mut FilterOperator> {
        self.index.get(token).map(|i| &mut self.operators[*i])
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Operator tokens, longest first, ties in byte order. The tokenizer tries them in
    /// this order.
    pub fn tokens_longest_first(&self) -> Vec<&str> {
        let mut tokens: Vec<&str> = self.operators.iter().map(|op| op.token()).collect();
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        tokens
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterOperator> {
        self.operators.iter()
    }
}

/// The operators every engine starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOperator {
    /// Contains for strings, equality for everything else (`:`)
    Contains,
    /// Equal (`=`)
    Equal,
    /// Not equal (`!=`)
    NotEqual,
    /// Less than (`<`)
    LessThan,
    /// Greater than (`>`)
    GreaterThan,
    /// Less than or equal (`<=`)
    LessEqual,
    /// Greater than or equal (`>=`)
    GreaterEqual,
}

const NUMERIC_TYPES: [ValueType; 3] = [ValueType::Integer, ValueType::Float, ValueType::Decimal];

impl DefaultOperator {
    pub const ALL: [DefaultOperator; 7] = [
        DefaultOperator::Contains,
        DefaultOperator::Equal,
        DefaultOperator::NotEqual,
        DefaultOperator::LessThan,
        DefaultOperator::GreaterThan,
        DefaultOperator::LessEqual,
        DefaultOperator::GreaterEqual,
    ];

    pub fn token(self) -> &'static str {
        match self {
            DefaultOperator::Contains => ":",
            DefaultOperator::Equal => "=",
            DefaultOperator::NotEqual => "!=",
            DefaultOperator::LessThan => "<",
            DefaultOperator::GreaterThan => ">",
            DefaultOperator::LessEqual => "<=",
            DefaultOperator::GreaterEqual => ">=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            DefaultOperator::Contains | DefaultOperator::Equal => ordering == Ordering::Equal,
            DefaultOperator::NotEqual => ordering != Ordering::Equal,
            DefaultOperator::LessThan => ordering == Ordering::Less,
            DefaultOperator::GreaterThan => ordering == Ordering::Greater,
            DefaultOperator::LessEqual => ordering != Ordering::Greater,
            DefaultOperator::GreaterEqual => ordering != Ordering::Less,
        }
    }

    fn install_handlers(self, operator: &mut FilterOperator) {
        // Numbers: each type against itself first, so a plain "5" stays an integer.
        for lhs in NUMERIC_TYPES {
            let rhs_order = std::iter::once(lhs).chain(NUMERIC_TYPES.into_iter().filter(|t| *t != lhs));
            for rhs in rhs_order {
                operator.add_handler(
                    lhs,
                    rhs,
                    handler(move |l, r, _| {
                        l.compare_numbers(r).is_some_and(|ord| self.accepts(ord))
                    }),
                );
            }
        }

        operator.add_handler(
            ValueType::String,
            ValueType::String,
            handler(move |l, r, cmp| {
                let (Some(l), Some(r)) = (l.as_str(), r.as_str()) else {
                    return false;
                };
                match self {
                    DefaultOperator::Contains => cmp.contains(l, r),
                    DefaultOperator::Equal => cmp.equals(l, r),
                    DefaultOperator::NotEqual => !cmp.equals(l, r),
                    _ => self.accepts(cmp.compare(l, r)),
                }
            }),
        );

        if matches!(
            self,
            DefaultOperator::Contains | DefaultOperator::Equal | DefaultOperator::NotEqual
        ) {
            operator.add_handler(
                ValueType::Boolean,
                ValueType::Boolean,
                handler(move |l, r, _| match (l.as_bool(), r.as_bool()) {
                    (Some(l), Some(r)) => self.accepts(l.cmp(&r)),
                    _ => false,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(table: &OperatorTable, op: &str, l: Value, r: Value) -> bool {
        let handler = table
            .get(op)
            .and_then(|o| o.resolve(l.value_type(), r.value_type()))
            .expect("handler");
        handler(&l, &r, StringComparison::IgnoreCase)
    }

    #[test]
    fn default_numeric_handlers() {
        let table = OperatorTable::with_defaults();
        assert!(run(&table, ">=", Value::Integer(5), Value::Integer(5)));
        assert!(!run(&table, ">", Value::Integer(5), Value::Integer(5)));
        assert!(run(&table, "<", Value::Integer(5), Value::Float(5.5)));
        assert!(run(&table, ":", Value::Float(2.0), Value::Integer(2)));
        assert!(run(&table, "!=", Value::Integer(1), Value::Integer(2)));
    }

    #[test]
    fn default_string_handlers() {
        let table = OperatorTable::with_defaults();
        assert!(run(&table, ":", "Big Rock".into(), "rock".into()));
        assert!(run(&table, "=", "ROCK".into(), "rock".into()));
        assert!(!run(&table, "=", "rocks".into(), "rock".into()));
        assert!(run(&table, "<", "apple".into(), "Banana".into()));
    }

    #[test]
    fn rhs_types_put_own_type_first_and_erased_last() {
        let mut table = OperatorTable::with_defaults();
        assert_eq!(
            table.get("=").unwrap().rhs_types(ValueType::Float),
            vec![ValueType::Float, ValueType::Integer, ValueType::Decimal]
        );

        table
            .get_mut("=")
            .unwrap()
            .add_handler(ValueType::Any, ValueType::Any, handler(|_, _, _| true));
        let types = table.get("=").unwrap().rhs_types(ValueType::Boolean);
        assert_eq!(types, vec![ValueType::Boolean, ValueType::Any]);
    }

    #[test]
    fn tokens_sorted_longest_first() {
        let table = OperatorTable::with_defaults();
        let tokens = table.tokens_longest_first();
        assert_eq!(&tokens[..3], &["!=", "<=", ">="]);
    }
}
