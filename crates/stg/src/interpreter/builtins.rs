//! Built-in functions and property access over attribute values.

use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;

use crate::parser::ast::Builtin;
use crate::types::{Scalar, Value};

/// Why a property read produced null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PropertyError {
    /// Argument is a description such as `Str.name` or `User.email`.
    NoSuchProperty(String),
    IndexOutOfRange { index: usize, len: usize },
}

/// Apply a built-in function. Text functions (`strlen`, `trim`) receive
/// the already-rendered text of their argument.
pub(crate) fn apply(func: Builtin, value: Value) -> Value {
    match func {
        Builtin::First => first(value),
        Builtin::Last => last(value),
        Builtin::Rest => rest(value),
        Builtin::Trunc => trunc(value),
        Builtin::Strip => strip(value),
        Builtin::Length => Value::from(length(&value)),
        Builtin::Strlen => match value {
            Value::Null => Value::from(0),
            other => Value::from(other.as_str().map_or(0, |s| s.graphemes(true).count())),
        },
        Builtin::Trim => match value {
            Value::Scalar(Scalar::Str(s)) => Value::from(s.trim()),
            other => other,
        },
        Builtin::Reverse => match value {
            Value::Sequence(mut items) => {
                items.reverse();
                Value::Sequence(items)
            }
            Value::Map(_) => Value::Sequence(owned_elements(&value).into_iter().rev().collect()),
            other => other,
        },
    }
}

fn owned_elements(value: &Value) -> Vec<Value> {
    value.elements().map(Cow::into_owned).collect()
}

fn first(value: Value) -> Value {
    match value {
        Value::Sequence(items) => items.into_iter().next().unwrap_or_default(),
        Value::Map(_) => owned_elements(&value).into_iter().next().unwrap_or_default(),
        other => other,
    }
}

fn last(value: Value) -> Value {
    match value {
        Value::Sequence(mut items) => items.pop().unwrap_or_default(),
        Value::Map(_) => owned_elements(&value).pop().unwrap_or_default(),
        other => other,
    }
}

/// Everything but the first element; null when that leaves nothing.
fn rest(value: Value) -> Value {
    let items = match value {
        Value::Sequence(items) => items,
        Value::Map(_) => owned_elements(&value),
        _ => return Value::Null,
    };
    if items.len() <= 1 {
        Value::Null
    } else {
        Value::Sequence(items.into_iter().skip(1).collect())
    }
}

/// Everything but the last element; null when that leaves nothing.
fn trunc(value: Value) -> Value {
    let mut items = match value {
        Value::Sequence(items) => items,
        Value::Map(_) => owned_elements(&value),
        _ => return Value::Null,
    };
    if items.len() <= 1 {
        Value::Null
    } else {
        items.pop();
        Value::Sequence(items)
    }
}

fn strip(value: Value) -> Value {
    match value {
        Value::Sequence(items) => Value::Sequence(items.into_iter().filter(|v| !v.is_null()).collect()),
        other => other,
    }
}

/// Number of elements, counting nulls. Null has length 0 and any single
/// value has length 1.
pub(crate) fn length(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Sequence(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::Scalar(_) | Value::Instance(_) => 1,
    }
}

/// Build a list literal: one level of sequences is flattened and nulls are
/// dropped.
pub(crate) fn list(items: Vec<Value>) -> Value {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Null => {}
            Value::Sequence(inner) => out.extend(inner.into_iter().filter(|v| !v.is_null())),
            other => out.push(other),
        }
    }
    Value::Sequence(out)
}

/// Read `name` from `target`.
///
/// Reading from null is silently null. Missing map keys and unset instance
/// attributes are null too; every other miss is an error, including names
/// an instance's template does not declare.
pub(crate) fn property(target: &Value, name: &str) -> Result<Value, PropertyError> {
    match target {
        Value::Null => Ok(Value::Null),
        Value::Map(map) => Ok(match map.get(name) {
            Some(value) => value.clone(),
            None if name == "keys" => Value::Sequence(owned_elements(target)),
            None if name == "values" => Value::Sequence(map.values().cloned().collect()),
            None => Value::Null,
        }),
        Value::Sequence(items) => sequence_property(items, name),
        Value::Instance(instance) => {
            if !instance.template().formals().accepts(name) {
                return Err(PropertyError::NoSuchProperty(format!(
                    "{}.{name}",
                    instance.name()
                )));
            }
            Ok(instance.attributes().get(name).clone())
        }
        Value::Scalar(Scalar::Object(model)) => model
            .property(name)
            .ok_or_else(|| PropertyError::NoSuchProperty(format!("{}.{name}", model.type_name()))),
        Value::Scalar(scalar) => Err(PropertyError::NoSuchProperty(format!(
            "{:?}.{name}",
            scalar.kind()
        ))),
    }
}

fn sequence_property(items: &[Value], name: &str) -> Result<Value, PropertyError> {
    if let Ok(index) = name.parse::<usize>() {
        return items
            .get(index)
            .cloned()
            .ok_or(PropertyError::IndexOutOfRange {
                index,
                len: items.len(),
            });
    }
    let sequence = Value::Sequence(items.to_vec());
    match name {
        "first" => Ok(first(sequence)),
        "last" => Ok(last(sequence)),
        "rest" => Ok(rest(sequence)),
        "size" | "length" => Ok(Value::from(items.len())),
        _ => Err(PropertyError::NoSuchProperty(format!("Sequence.{name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Value {
        Value::from(vec!["Ter", "Tom", "Sumana"])
    }

    #[test]
    fn rest_and_trunc_of_short_sequences_are_null() {
        assert!(apply(Builtin::Rest, Value::from(vec!["a"])).is_null());
        assert!(apply(Builtin::Trunc, Value::from("a")).is_null());
        let rest = apply(Builtin::Rest, names());
        assert_eq!(rest.as_sequence().map(<[Value]>::len), Some(2));
    }

    #[test]
    fn first_and_last() {
        assert_eq!(apply(Builtin::First, names()).as_str(), Some("Ter"));
        assert_eq!(apply(Builtin::Last, names()).as_str(), Some("Sumana"));
        assert_eq!(apply(Builtin::First, Value::from("x")).as_str(), Some("x"));
        assert!(apply(Builtin::First, Value::Sequence(Vec::new())).is_null());
    }

    #[test]
    fn length_counts_nulls() {
        let value = Value::Sequence(vec![Value::from("a"), Value::Null]);
        assert_eq!(apply(Builtin::Length, value).as_int(), Some(2));
        assert_eq!(apply(Builtin::Length, Value::Null).as_int(), Some(0));
    }

    #[test]
    fn strlen_counts_graphemes() {
        assert_eq!(apply(Builtin::Strlen, Value::from("e\u{301}a")).as_int(), Some(2));
    }

    #[test]
    fn list_flattens_one_level() {
        let value = list(vec![Value::from("a"), Value::Null, names()]);
        assert_eq!(value.as_sequence().map(<[Value]>::len), Some(4));
    }

    #[test]
    fn sequence_index_out_of_range() {
        assert_eq!(
            property(&names(), "7").err(),
            Some(PropertyError::IndexOutOfRange { index: 7, len: 3 })
        );
        let second = property(&names(), "1").unwrap();
        assert_eq!(second.as_str(), Some("Tom"));
    }

    #[test]
    fn property_of_null_is_null() {
        assert!(matches!(property(&Value::Null, "anything"), Ok(Value::Null)));
    }
}
