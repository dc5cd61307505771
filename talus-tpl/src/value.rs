//! Runtime values and variable bindings

use std::{
    cell::RefCell,
    cmp::Ordering,
    fmt::{Display, Write},
    rc::Rc,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A value a template can print, iterate over or test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty() && s != "0",
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used by comparisons and numeric filters
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Map key a value stands for when used as a subscript
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Looks up a list index or map key; anything missing is `Null`
    pub fn subscript(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::List(list), Value::Int(index)) => usize::try_from(*index)
                .ok()
                .and_then(|index| list.get(index))
                .cloned()
                .unwrap_or_default(),
            (Value::List(list), Value::String(index)) => index
                .parse::<usize>()
                .ok()
                .and_then(|index| list.get(index))
                .cloned()
                .unwrap_or_default(),
            (Value::Map(map), key) => map.get(&key.key()).cloned().unwrap_or_default(),
            _ => Value::Null,
        }
    }

    /// Stores `value` under the chain of `keys`, creating maps where needed
    pub fn assign(&mut self, keys: &[Value], value: Value) {
        let (key, rest) = match keys.split_first() {
            Some(split) => split,
            None => {
                *self = value;
                return;
            }
        };
        if let (Value::List(list), Value::Int(index)) = (&mut *self, key) {
            if let Ok(index) = usize::try_from(*index) {
                if index == list.len() {
                    list.push(Value::Null);
                }
                if let Some(slot) = list.get_mut(index) {
                    slot.assign(rest, value);
                    return;
                }
            }
        }
        let map = match std::mem::take(self) {
            Value::Map(map) => map,
            Value::List(list) => list
                .into_iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
            _ => IndexMap::new(),
        };
        *self = Value::Map(map);
        if let Value::Map(map) = self {
            map.entry(key.key()).or_default().assign(rest, value);
        }
    }

    /// Loose equality: numbers compare by value, everything else by rendering
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(_), _) | (_, Value::Bool(_)) | (Value::Null, _) | (_, Value::Null) => {
                self.is_truthy() == other.is_truthy()
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => self.to_string() == other.to_string(),
            },
        }
    }

    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (self, other) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            },
        }
    }

    /// Applies `f` to every string, descending into lists and maps
    pub fn try_map_strings<E>(self, f: &mut impl FnMut(Value) -> Result<Value, E>) -> Result<Value, E> {
        Ok(match self {
            Value::String(_) => f(self)?,
            Value::List(list) => Value::List(
                list.into_iter()
                    .map(|item| item.try_map_strings(f))
                    .collect::<Result<_, E>>()?,
            ),
            Value::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(key, item)| Ok((key, item.try_map_strings(f)?)))
                    .collect::<Result<_, E>>()?,
            ),
            other => other,
        })
    }
}

fn write_joined<'a>(f: &mut std::fmt::Formatter<'_>, items: impl Iterator<Item = &'a Value>) -> std::fmt::Result {
    let mut glue = "";
    for item in items {
        f.write_str(glue)?;
        write!(f, "{}", item)?;
        glue = ", ";
    }
    Ok(())
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => f.write_char('1'),
            Value::Bool(false) => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::List(list) => write_joined(f, list.iter()),
            Value::Map(map) => write_joined(f, map.values()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or(Value::Float(value as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(value: IndexMap<String, Value>) -> Self {
        Value::Map(value)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// How a variable is held by a context or a block row
///
/// A shared binding aliases storage owned by the caller: the template reads the
/// value as it is when rendering, not when binding.
#[derive(Debug, Clone)]
pub enum Binding {
    Owned(Value),
    Shared(Rc<RefCell<Value>>),
}

impl Binding {
    pub fn get(&self) -> Value {
        match self {
            Binding::Owned(value) => value.clone(),
            Binding::Shared(cell) => cell.borrow().clone(),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Binding::Shared(_))
    }

    /// Assigns through the binding; shared storage is written in place
    pub fn assign(&mut self, keys: &[Value], value: Value) {
        match self {
            Binding::Owned(owned) => owned.assign(keys, value),
            Binding::Shared(cell) => cell.borrow_mut().assign(keys, value),
        }
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Owned(value)
    }
}

impl From<Rc<RefCell<Value>>> for Binding {
    fn from(cell: Rc<RefCell<Value>>) -> Self {
        Binding::Shared(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_like_text() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), "a, b");
    }

    #[test]
    fn subscripts() {
        let value: Value = [("list", Value::from(vec![1, 2])), ("name", Value::from("x"))]
            .into_iter()
            .collect();
        assert_eq!(value.subscript(&"name".into()), Value::from("x"));
        assert_eq!(value.subscript(&"list".into()).subscript(&1.into()), Value::Int(2));
        assert_eq!(value.subscript(&"missing".into()), Value::Null);
        assert_eq!(Value::from(vec![1]).subscript(&(-1).into()), Value::Null);
    }

    #[test]
    fn assigns_nested_keys() {
        let mut value = Value::Null;
        value.assign(&["a".into(), "b".into()], 1.into());
        assert_eq!(value.subscript(&"a".into()).subscript(&"b".into()), Value::Int(1));

        let mut list = Value::from(vec![1, 2]);
        list.assign(&[2.into()], 3.into());
        assert_eq!(list, Value::from(vec![1, 2, 3]));
        list.assign(&["x".into()], 4.into());
        assert_eq!(list.subscript(&"0".into()), Value::Int(1));
        assert_eq!(list.subscript(&"x".into()), Value::Int(4));
    }

    #[test]
    fn compares_loosely() {
        assert!(Value::from("3").loose_eq(&Value::Int(3)));
        assert!(Value::Null.loose_eq(&Value::from("")));
        assert!(!Value::from("a").loose_eq(&Value::from("b")));
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::from("b").compare(&Value::from("a")), Some(Ordering::Greater));
    }

    #[test]
    fn shared_bindings_read_through() {
        let cell = Rc::new(RefCell::new(Value::from("before")));
        let binding = Binding::from(cell.clone());
        *cell.borrow_mut() = Value::from("after");
        assert_eq!(binding.get(), Value::from("after"));
    }

    #[test]
    fn deserializes_from_json() {
        let value: Value = serde_json::from_str("{\"a\": [1, 2.5, \"x\", null, true]}").unwrap();
        assert_eq!(
            value.subscript(&"a".into()),
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::from("x"),
                Value::Null,
                Value::Bool(true)
            ])
        );
    }
}
