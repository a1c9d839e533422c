//! Per-instance attribute storage with automatic list promotion.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::mem;

use crate::types::Value;

static NULL: Value = Value::Null;

/// Mapping from attribute name to value for one template instance.
///
/// The store distinguishes an attribute that was never set from one that was
/// set to [`Value::Null`]; default parameter values only apply to the former.
///
/// # Example
///
/// ```
/// use stg::{AttributeStore, Value};
///
/// let mut store = AttributeStore::new();
/// store.append("name", "Ter");
/// store.append("name", "Tom");
/// assert_eq!(store.get("name").as_sequence().map(<[Value]>::len), Some(2));
/// assert!(store.get("missing").is_null());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttributeStore {
    values: HashMap<String, Value>,
}

impl AttributeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value of `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Add a value to `name` using multiplicity rules.
    ///
    /// The first append stores the value as-is. A later append promotes the
    /// slot to a sequence holding the previous contents followed by the new
    /// value; sequences on either side contribute their elements rather than
    /// nesting. Sequences passed in are copied into the store, so a caller's
    /// list is never modified by later appends.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        match self.values.entry(name.into()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get_mut();
                let mut items = match mem::take(current) {
                    Value::Sequence(items) => items,
                    other => vec![other],
                };
                match value {
                    Value::Sequence(more) => items.extend(more),
                    other => items.push(other),
                }
                *current = Value::Sequence(items);
            }
        }
    }

    /// Read `name`. Unknown names read as null.
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    /// Read `name`, or `None` if it was never set.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Whether `name` was set, even to null.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Names of all set attributes, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
