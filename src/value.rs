use std::{any::Any, cmp::Ordering, fmt, rc::Rc, str::FromStr};

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

/// A typed filter value: what a filter getter returns for an element, and what a raw
/// filter value is coerced into.
///
/// The set of built-in types is closed. Embedder-specific types travel as
/// [`Value::Custom`], tagged with a type name so handlers can downcast safely.
///
/// # Type Preservation
///
/// Integers, floats and decimals stay distinct; comparisons between them go through
/// [`Decimal`] so `0.1 + 0.2`-style float noise does not leak into `=`.
///
/// # Examples
///
/// ```
/// use sift_query::{Value, ValueType};
///
/// let size = Value::Integer(42);
/// assert_eq!(size.value_type(), ValueType::Integer);
///
/// let name = Value::from("rock");
/// assert_eq!(name.as_str(), Some("rock"));
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),

    /// Integer number (preserved separately from floats)
    Integer(i64),

    /// Floating-point number
    Float(f64),

    /// Exact decimal number
    Decimal(Decimal),

    /// UTF-8 string
    String(String),

    /// Embedder-defined value
    Custom(CustomValue),
}

/// Type key used by filters, type parsers, and operator handler tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    Decimal,
    String,

    /// Embedder-defined type, identified by name.
    Custom(&'static str),

    /// Erased type. Handlers keyed `(Any, Any)` are an operator's fallback; the `Any`
    /// parser accepts every raw value as a string.
    Any,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Decimal => "decimal",
            ValueType::String => "string",
            ValueType::Custom(name) => name,
            ValueType::Any => "any",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Integer | ValueType::Float | ValueType::Decimal
        )
    }

    /// Parses `text` with the built-in parser for this type.
    ///
    /// Custom types have no built-in parser and always fail here; register one with
    /// [`crate::QueryEngine::add_type_parser`].
    pub fn parse_default(&self, text: &str) -> ParseResult<Value> {
        let trimmed = text.trim();
        let parsed = match self {
            ValueType::Boolean => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Some(Value::Boolean(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Some(Value::Boolean(false))
                } else {
                    None
                }
            }
            ValueType::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
            ValueType::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float),
            ValueType::Decimal => Decimal::from_str(trimmed).ok().map(Value::Decimal),
            ValueType::String | ValueType::Any => Some(Value::String(text.to_string())),
            ValueType::Custom(_) => None,
        };
        ParseResult::from(parsed)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An embedder value carried through the engine behind an `Rc<dyn Any>`.
#[derive(Clone)]
pub struct CustomValue {
    type_name: &'static str,
    data: Rc<dyn Any>,
}

impl CustomValue {
    pub fn new<V: Any>(type_name: &'static str, data: V) -> Self {
        CustomValue {
            type_name,
            data: Rc::new(data),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<V: Any>(&self) -> Option<&V> {
        self.data.downcast_ref::<V>()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue({})", self.type_name)
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && Rc::ptr_eq(&self.data, &other.data)
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Decimal(_) => ValueType::Decimal,
            Value::String(_) => ValueType::String,
            Value::Custom(custom) => ValueType::Custom(custom.type_name),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Exact decimal view of a numeric value.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(n) => Decimal::from_i64(*n),
            Value::Float(n) => Decimal::from_f64(*n),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Orders two numeric values, whatever their numeric types.
    ///
    /// Mixed comparisons go through [`Decimal`]; values out of decimal range fall back
    /// to `f64`.
    pub fn compare_numbers(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (a, b) => {
                if let Some(ad) = a.as_decimal()
                    && let Some(bd) = b.as_decimal()
                {
                    return Some(ad.cmp(&bd));
                }
                a.as_float()?.partial_cmp(&b.as_float()?)
            }
        }
    }

    /// Converts a JSON scalar. Arrays, objects and null have no filter value.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Integer(i)),
                None => n.as_f64().map(Value::Float),
            },
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }

    /// Converts back to JSON. Custom values have no JSON form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Decimal(d) => serde_json::Value::String(d.to_string()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Custom(_) => serde_json::Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Custom(a), Value::Custom(b)) => a == b,
            (a, b) => a.compare_numbers(b) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => f.write_str(s),
            Value::Custom(c) => write!(f, "<{}>", c.type_name),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

/// Outcome of coercing raw query text into a typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult<T> {
    value: Option<T>,
}

impl<T> ParseResult<T> {
    pub fn success(value: T) -> Self {
        ParseResult { value: Some(value) }
    }

    pub fn failure() -> Self {
        ParseResult { value: None }
    }

    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

impl<T> From<Option<T>> for ParseResult<T> {
    fn from(value: Option<T>) -> Self {
        ParseResult { value }
    }
}

/// Rust types usable as filter values in the typed registration API.
///
/// Implemented for the built-in scalar types. Embedders can implement it for their own
/// types by mapping to [`ValueType::Custom`] and [`Value::Custom`].
pub trait FilterType: Sized + 'static {
    const VALUE_TYPE: ValueType;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FilterType for bool {
    const VALUE_TYPE: ValueType = ValueType::Boolean;

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FilterType for String {
    const VALUE_TYPE: ValueType = ValueType::String;

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FilterType for f64 {
    const VALUE_TYPE: ValueType = ValueType::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }
}

impl FilterType for f32 {
    const VALUE_TYPE: ValueType = ValueType::Float;

    fn into_value(self) -> Value {
        Value::Float(self as f64)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_float().map(|f| f as f32)
    }
}

impl FilterType for Decimal {
    const VALUE_TYPE: ValueType = ValueType::Decimal;

    fn into_value(self) -> Value {
        Value::Decimal(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_decimal()
    }
}

macro_rules! integer_filter_type {
    ($($ty:ty),*) => {
        $(
            impl FilterType for $ty {
                const VALUE_TYPE: ValueType = ValueType::Integer;

                fn into_value(self) -> Value {
                    Value::Integer(self as i64)
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::Integer(n) => <$ty>::try_from(*n).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

integer_filter_type!(i8, i16, i32, i64, u8, u16, u32, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parsers() {
        assert_eq!(
            ValueType::Integer.parse_default("42").into_value(),
            Some(Value::Integer(42))
        );
        assert!(!ValueType::Integer.parse_default("abc").is_success());
        assert!(!ValueType::Float.parse_default("NaN").is_success());
        assert_eq!(
            ValueType::Boolean.parse_default("TRUE").into_value(),
            Some(Value::Boolean(true))
        );
        assert!(ValueType::Any.parse_default("anything").is_success());
        assert!(!ValueType::Custom("color").parse_default("red").is_success());
    }

    #[test]
    fn mixed_numbers_compare_exactly() {
        let a = Value::Integer(3);
        let b = Value::Float(3.0);
        assert_eq!(a, b);
        assert_eq!(
            Value::Integer(1).compare_numbers(&Value::Decimal(Decimal::new(15, 1))),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Integer(2).compare_numbers(&Value::Float(2.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn custom_values_downcast() {
        #[derive(Debug, PartialEq)]
        struct Color(u8, u8, u8);

        let value = Value::Custom(CustomValue::new("color", Color(1, 2, 3)));
        assert_eq!(value.value_type(), ValueType::Custom("color"));
        match &value {
            Value::Custom(c) => assert_eq!(c.downcast_ref::<Color>(), Some(&Color(1, 2, 3))),
            _ => unreachable!(),
        }
    }
}
