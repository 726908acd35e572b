//! Nested queries (`{...}`) and the aggregators that reduce their results.

use std::{cmp::Ordering, collections::HashMap, rc::Rc};

use crate::value::Value;

/// Embedder callback resolving a nested query: `(query text, filter token)` to the
/// matching elements. The filter token is empty for nested queries that are not a
/// filter value.
pub type NestedQueryHandler<T> = Rc<dyn Fn(&str, &str) -> Box<dyn Iterator<Item = T>>>;

/// Whole-sequence reducer applied to a nested query's results.
pub type AggregatorFn<T> = Rc<dyn Fn(Vec<T>) -> Vec<T>>;

/// Named aggregators. `first` and `last` are always present.
#[derive(Clone)]
pub struct AggregatorTable<T> {
    aggregators: HashMap<String, AggregatorFn<T>>,
}

impl<T: 'static> AggregatorTable<T> {
    pub fn new() -> Self {
        let mut table = AggregatorTable {
            aggregators: HashMap::new(),
        };
        table.insert("first", Rc::new(|items: Vec<T>| items.into_iter().take(1).collect()));
        table.insert("last", Rc::new(|mut items: Vec<T>| match items.pop() {
            Some(last) => vec![last],
            None => Vec::new(),
        }));
        table
    }

    /// Registers `aggregator`; returns `false` if the name is taken.
    pub fn insert(&mut self, name: &str, aggregator: AggregatorFn<T>) -> bool {
        let key = name.to_lowercase();
        if self.aggregators.contains_key(&key) {
            return false;
        }
        self.aggregators.insert(key, aggregator);
        true
    }

    pub fn get(&self, name: &str) -> Option<&AggregatorFn<T>> {
        self.aggregators.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl<T: 'static> Default for AggregatorTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// `max`/`min` aggregators ordering elements by `key`.
///
/// Elements whose key is absent or not comparable are ignored. Ties keep the first
/// element seen.
pub fn ordering_aggregators<T, K>(key: K) -> (AggregatorFn<T>, AggregatorFn<T>)
where
    T: 'static,
    K: Fn(&T) -> Option<Value> + 'static,
{
    let key = Rc::new(key);
    let max_key = Rc::clone(&key);
    let max: AggregatorFn<T> = Rc::new(move |items| extremum(items, &*max_key, Ordering::Greater));
    let min: AggregatorFn<T> = Rc::new(move |items| extremum(items, &*key, Ordering::Less));
    (max, min)
}

fn extremum<T>(items: Vec<T>, key: &dyn Fn(&T) -> Option<Value>, wanted: Ordering) -> Vec<T> {
    let mut best: Option<(Value, T)> = None;
    for item in items {
        let Some(k) = key(&item) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((best_key, _)) => compare_keys(&k, best_key) == Some(wanted),
        };
        if better {
            best = Some((k, item));
        }
    }
    best.map(|(_, item)| vec![item]).unwrap_or_default()
}

fn compare_keys(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (a, b) => a.compare_numbers(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_first_and_last() {
        let table: AggregatorTable<i32> = AggregatorTable::new();
        assert_eq!(table.get("first").unwrap()(vec![3, 1, 2]), vec![3]);
        assert_eq!(table.get("LAST").unwrap()(vec![3, 1, 2]), vec![2]);
        assert_eq!(table.get("last").unwrap()(vec![]), Vec::<i32>::new());
        assert!(!table.contains("max"));
    }

    #[test]
    fn ordering_aggregators_use_key() {
        let (max, min) = ordering_aggregators(|n: &i32| Some(Value::Integer(*n as i64)));
        assert_eq!(max(vec![3, 7, 1, 7]), vec![7]);
        assert_eq!(min(vec![3, 7, 1]), vec![1]);
        assert_eq!(max(vec![]), Vec::<i32>::new());
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut table: AggregatorTable<i32> = AggregatorTable::new();
        assert!(!table.insert("First", Rc::new(|items: Vec<i32>| items)));
        assert!(table.insert("all", Rc::new(|items: Vec<i32>| items)));
    }
}
