//! JSON records as query elements

use std::{
    hash::{Hash, Hasher},
    rc::Rc,
};

use log::debug;

use crate::{Filter, QueryEngine, Value, ValueType};

/// One JSON document in the input, identified by its position.
///
/// Equality and hashing use the position only, so two identical documents are still
/// distinct elements.
#[derive(Debug, Clone)]
pub struct Record {
    pub index: usize,
    pub value: Rc<serde_json::Value>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl Record {
    /// Scalar value of a top-level field.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.value.get(key)
    }

    /// String fields (or the record itself if it is a string), for bare-word search.
    pub fn search_strings(&self) -> Vec<String> {
        match self.value.as_ref() {
            serde_json::Value::String(s) => vec![s.clone()],
            serde_json::Value::Object(map) => map
                .values()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A top-level array becomes one record per element; anything else is a single record.
pub fn records_from_json(value: serde_json::Value) -> Vec<Record> {
    let values = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| Record {
            index,
            value: Rc::new(value),
        })
        .collect()
}

/// Type shared by every scalar a field holds across `records`.
///
/// Fields mixing types, or holding no scalars at all, are treated as strings.
fn field_type(records: &[Record], key: &str) -> ValueType {
    let mut seen: Option<ValueType> = None;
    for value in records.iter().filter_map(|r| r.field(key)).filter_map(Value::from_json) {
        let value_type = value.value_type();
        seen = match seen {
            None => Some(value_type),
            Some(t) if t == value_type => Some(t),
            Some(t) if t.is_numeric() && value_type.is_numeric() => Some(ValueType::Float),
            Some(_) => return ValueType::String,
        };
    }
    seen.unwrap_or(ValueType::String)
}

fn field_value(record: &Record, key: &str, value_type: ValueType) -> Option<Value> {
    let value = Value::from_json(record.field(key)?)?;
    match value_type {
        ValueType::String => Some(Value::String(value.to_string())),
        _ => Some(value),
    }
}

/// Engine over `records`.
///
/// Registers one filter per top-level object key, typed from the values it holds, with
/// a nested transformer reading the same key. `{...}` blocks run against the same
/// records. When `order_by` names a field, `max{...}` and `min{...}` order by it.
pub fn build_engine(records: &Rc<Vec<Record>>, order_by: Option<&str>) -> QueryEngine<Record> {
    let mut engine = QueryEngine::new();

    let mut keys: Vec<String> = Vec::new();
    for record in records.iter() {
        if let Some(map) = record.value.as_object() {
            for key in map.keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
    }

    for key in keys {
        let value_type = field_type(records, &key);
        debug!("field '{}' registered as {}", key, value_type);
        let getter_key = key.clone();
        let nested_key = key.clone();
        engine.add_filter(
            Filter::dynamic(key.clone(), value_type, move |record: &Record, _| {
                field_value(record, &getter_key, value_type)
            })
            .dynamic_nested_transformer(value_type, move |record: &Record| {
                field_value(record, &nested_key, value_type)
            }),
        );
    }
    engine.add_filter(Filter::new("#index", |record: &Record| record.index));

    engine.set_search_data_callback(Record::search_strings);

    let nested_records = Rc::clone(records);
    let nested_order = order_by.map(str::to_string);
    engine.set_nested_query_handler(move |query: &str, _filter: &str| {
        let inner = build_engine(&nested_records, nested_order.as_deref());
        inner
            .parse(query)
            .apply(nested_records.iter().cloned())
            .collect::<Vec<_>>()
    });

    if let Some(key) = order_by {
        let key = key.to_string();
        engine.add_ordering_aggregators(move |record: &Record| {
            record.field(&key).and_then(Value::from_json)
        });
    }

    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_types_are_inferred() {
        let records = records_from_json(json!([
            {"name": "a", "size": 1, "ratio": 1, "flag": true, "mixed": 1},
            {"name": "b", "size": 2, "ratio": 0.5, "flag": false, "mixed": "x"},
        ]));
        assert_eq!(field_type(&records, "name"), ValueType::String);
        assert_eq!(field_type(&records, "size"), ValueType::Integer);
        assert_eq!(field_type(&records, "ratio"), ValueType::Float);
        assert_eq!(field_type(&records, "flag"), ValueType::Boolean);
        assert_eq!(field_type(&records, "mixed"), ValueType::String);
        assert_eq!(field_type(&records, "missing"), ValueType::String);
    }

    #[test]
    fn records_are_distinct_by_position() {
        let records = records_from_json(json!([{"a": 1}, {"a": 1}]));
        assert_eq!(records.len(), 2);
        assert_ne!(records[0], records[1]);

        let single = records_from_json(json!({"a": 1}));
        assert_eq!(single.len(), 1);
    }
}
