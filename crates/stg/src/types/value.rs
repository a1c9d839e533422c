use std::borrow::Cow;
use std::collections::btree_map::Keys;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Display, Formatter};
use std::slice::Iter;
use std::sync::Arc;

use serde::de::{Deserialize, Deserializer, Error as DeError, MapAccess, SeqAccess, Visitor};

use crate::group::TemplateInstance;

/// A host object whose properties templates can read with `<obj.prop>`.
///
/// This is the reflection seam for opaque values: the interpreter never
/// inspects host objects directly, it asks for properties by name.
///
/// # Example
///
/// ```
/// use stg::{Model, Value};
///
/// #[derive(Debug)]
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl Model for User {
///     fn type_name(&self) -> &str {
///         "User"
///     }
///
///     fn property(&self, name: &str) -> Option<Value> {
///         match name {
///             "id" => Some(self.id.into()),
///             "name" => Some(self.name.as_str().into()),
///             _ => None,
///         }
///     }
/// }
///
/// let user = Value::object(User { id: 1, name: "parrt".into() });
/// assert!(user.is_truthy());
/// ```
pub trait Model: Debug + Send + Sync {
    /// Name used to key attribute renderers and in diagnostics.
    fn type_name(&self) -> &str;

    /// Look up a property. `None` means the object has no such property.
    fn property(&self, name: &str) -> Option<Value>;

    /// Default text when the object itself is written.
    fn render(&self) -> String {
        self.type_name().to_string()
    }
}

/// A single, non-aggregate attribute value.
#[derive(Debug, Clone)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// An opaque host object, accessed through [`Model`].
    Object(Arc<dyn Model>),
}

impl Scalar {
    /// The semantic type used to select an attribute renderer.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Int(_) => ScalarKind::Int,
            Scalar::Float(_) => ScalarKind::Float,
            Scalar::Str(_) => ScalarKind::Str,
            Scalar::Object(model) => ScalarKind::Object(model.type_name().to_string()),
        }
    }

    /// Get this scalar as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(n) => write!(f, "{n}"),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Object(model) => f.write_str(&model.render()),
        }
    }
}

/// Key under which attribute renderers are registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Str,
    /// A host object, by its [`Model::type_name`].
    Object(String),
}

/// An attribute value.
///
/// Values are a closed sum: every consumer matches all five shapes.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent or explicitly null. Renders as empty text.
    #[default]
    Null,
    Scalar(Scalar),
    Sequence(Vec<Value>),
    /// Ordered by key so rendering is deterministic.
    Map(BTreeMap<String, Value>),
    /// A nested template instance, rendered lazily when written.
    Instance(Box<TemplateInstance>),
}

impl Value {
    /// Wrap a host object.
    pub fn object(model: impl Model + 'static) -> Value {
        Value::Scalar(Scalar::Object(Arc::new(model)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by `<if(...)>`: null, `false`, and empty
    /// sequences or maps are false. Everything else, including the empty
    /// string, is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Scalar(Scalar::Bool(b)) => *b,
            Value::Scalar(_) => true,
            Value::Sequence(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Instance(_) => true,
        }
    }

    /// Get this value as a string slice, if it is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => s.as_str(),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Scalar(Scalar::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&TemplateInstance> {
        match self {
            Value::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    /// The elements this value contributes when iterated.
    ///
    /// Null yields nothing, a sequence yields its items, a map yields its
    /// keys, and any other value yields itself once.
    pub fn elements(&self) -> Elements<'_> {
        match self {
            Value::Null => Elements::One(None),
            Value::Sequence(items) => Elements::Items(items.iter()),
            Value::Map(map) => Elements::Keys(map.keys()),
            Value::Scalar(_) | Value::Instance(_) => Elements::One(Some(self)),
        }
    }

    /// Whether iterating this value can produce more than one element.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Value::Sequence(_) | Value::Map(_))
    }
}

/// Iterator returned by [`Value::elements`].
pub enum Elements<'a> {
    One(Option<&'a Value>),
    Items(Iter<'a, Value>),
    Keys(Keys<'a, String, Value>),
}

impl<'a> Iterator for Elements<'a> {
    type Item = Cow<'a, Value>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Elements::One(value) => value.take().map(Cow::Borrowed),
            Elements::Items(items) => items.next().map(Cow::Borrowed),
            Elements::Keys(keys) => keys
                .next()
                .map(|key| Cow::Owned(Value::Scalar(Scalar::Str(key.clone())))),
        }
    }
}

// From implementations for common types

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Scalar(Scalar::Bool(b))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Scalar(Scalar::Int(i64::from(n)))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Scalar(Scalar::Int(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Scalar(Scalar::Int(i64::from(n)))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Value::Scalar(Scalar::Float(n as f64)), Value::from)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Scalar(Scalar::Float(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(Scalar::Str(s))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(Scalar::Str(s.to_string()))
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }
}

/// Copies the elements; the caller's slice is never touched afterwards.
impl<T: Clone + Into<Value>> From<&[T]> for Value {
    fn from(items: &[T]) -> Self {
        Value::Sequence(items.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Clone + Into<Value>> From<&Vec<T>> for Value {
    fn from(items: &Vec<T>) -> Self {
        Value::from(items.as_slice())
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(map: BTreeMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Value {
    fn from(map: HashMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<TemplateInstance> for Value {
    fn from(instance: TemplateInstance) -> Self {
        Value::Instance(Box::new(instance))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean, null, list, or map")
    }

    fn visit_bool<E: DeError>(self, v: bool) -> Result<Value, E> {
        Ok(v.into())
    }

    fn visit_i64<E: DeError>(self, v: i64) -> Result<Value, E> {
        Ok(v.into())
    }

    fn visit_u64<E: DeError>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v).map_or(Value::Scalar(Scalar::Float(v as f64)), Value::from))
    }

    fn visit_f64<E: DeError>(self, v: f64) -> Result<Value, E> {
        Ok(v.into())
    }

    fn visit_str<E: DeError>(self, v: &str) -> Result<Value, E> {
        Ok(v.into())
    }

    fn visit_string<E: DeError>(self, v: String) -> Result<Value, E> {
        Ok(v.into())
    }

    fn visit_none<E: DeError>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E: DeError>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }
}
