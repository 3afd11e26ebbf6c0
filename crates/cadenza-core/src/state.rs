//! Recursive patch state tree.
//!
//! A [`PatcherState`] maps string keys to typed [`Value`]s. Nested states are shared
//! (`Arc`) and copied on write, so snapshotting a preset is cheap and the last holder
//! frees the tree.

use std::any::Any;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// A typed state value.
#[derive(Clone)]
pub enum Value {
    Number(f64),
    Integer(i64),
    Index(u64),
    Boolean(bool),
    String(String),
    List(Vec<f64>),
    /// Non-owning reference to host data. Never serialized.
    External(Weak<dyn Any + Send + Sync>),
    SubState(Arc<PatcherState>),
    SubStateArray(Vec<PatcherState>),
    /// Name of a DataRef.
    DataRef(String),
    MultiDataRef(Vec<String>),
    /// Non-owning reference to a signal buffer. Never serialized.
    Signal(Weak<[f32]>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Integer(_) => "integer",
            Value::Index(_) => "index",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::External(_) => "external",
            Value::SubState(_) => "substate",
            Value::SubStateArray(_) => "substate array",
            Value::DataRef(_) => "dataref",
            Value::MultiDataRef(_) => "multi dataref",
            Value::Signal(_) => "signal",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Value::Number(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<u64> {
        match *self {
            Value::Index(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match *self {
            Value::Boolean(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[f64]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sub_state(&self) -> Option<&PatcherState> {
        match self {
            Value::SubState(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sub_state_array(&self) -> Option<&[PatcherState]> {
        match self {
            Value::SubStateArray(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the value can be written to a serialized preset.
    pub fn is_serializable(&self) -> bool {
        !matches!(
            self,
            Value::External(_) | Value::DataRef(_) | Value::MultiDataRef(_) | Value::Signal(_)
        )
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Index(a), Value::Index(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::External(a), Value::External(b)) => a.ptr_eq(b),
            (Value::SubState(a), Value::SubState(b)) => a == b,
            (Value::SubStateArray(a), Value::SubStateArray(b)) => a == b,
            (Value::DataRef(a), Value::DataRef(b)) => a == b,
            (Value::MultiDataRef(a), Value::MultiDataRef(b)) => a == b,
            (Value::Signal(a), Value::Signal(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "Number({v})"),
            Value::Integer(v) => write!(f, "Integer({v})"),
            Value::Index(v) => write!(f, "Index({v})"),
            Value::Boolean(v) => write!(f, "Boolean({v})"),
            Value::String(v) => write!(f, "String({v:?})"),
            Value::List(v) => write!(f, "List({v:?})"),
            Value::External(w) => write!(f, "External(alive: {})", w.strong_count() > 0),
            Value::SubState(s) => f.debug_tuple("SubState").field(s).finish(),
            Value::SubStateArray(a) => f.debug_tuple("SubStateArray").field(a).finish(),
            Value::DataRef(v) => write!(f, "DataRef({v:?})"),
            Value::MultiDataRef(v) => write!(f, "MultiDataRef({v:?})"),
            Value::Signal(w) => write!(f, "Signal(alive: {})", w.strong_count() > 0),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Index(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Index(v as u64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::List(v)
    }
}

impl From<&[f64]> for Value {
    fn from(v: &[f64]) -> Self {
        Value::List(v.to_vec())
    }
}

impl From<PatcherState> for Value {
    fn from(v: PatcherState) -> Self {
        Value::SubState(Arc::new(v))
    }
}

impl From<Arc<PatcherState>> for Value {
    fn from(v: Arc<PatcherState>) -> Self {
        Value::SubState(v)
    }
}

impl From<Vec<PatcherState>> for Value {
    fn from(v: Vec<PatcherState>) -> Self {
        Value::SubStateArray(v)
    }
}

/// Keyed state of a patch (or of one of its sub-patches).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatcherState {
    values: BTreeMap<String, Value>,
}

/// A snapshot of a patch's state.
pub type Preset = PatcherState;

macro_rules! typed_getter {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $accessor:ident) => {
        $(#[$doc])*
        pub fn $name(&self, key: &str) -> Option<$ty> {
            let value = self.values.get(key)?;
            let typed = value.$accessor();
            debug_assert!(
                typed.is_some(),
                "state key '{}' holds a {}, not a {}",
                key,
                value.type_name(),
                stringify!($name)
            );
            typed
        }
    };
}

impl PatcherState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    typed_getter!(number, f64, as_number);
    typed_getter!(integer, i64, as_integer);
    typed_getter!(index, u64, as_index);
    typed_getter!(boolean, bool, as_boolean);
    typed_getter!(string, &str, as_str);
    typed_getter!(list, &[f64], as_list);

    pub fn sub_state(&self, key: &str) -> Option<&PatcherState> {
        let value = self.values.get(key)?;
        let sub = value.as_sub_state();
        debug_assert!(sub.is_some(), "state key '{}' holds a {}", key, value.type_name());
        sub
    }

    /// Nested state for `key`, created (or replacing a non-state value) if needed.
    /// A shared nested state is cloned before mutation.
    pub fn sub_state_mut(&mut self, key: &str) -> &mut PatcherState {
        let slot = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| Value::SubState(Arc::default()));
        if !matches!(slot, Value::SubState(_)) {
            *slot = Value::SubState(Arc::default());
        }
        match slot {
            Value::SubState(sub) => Arc::make_mut(sub),
            _ => unreachable!("slot was just set to a sub-state"),
        }
    }

    pub fn sub_state_array(&self, key: &str) -> Option<&[PatcherState]> {
        let value = self.values.get(key)?;
        let array = value.as_sub_state_array();
        debug_assert!(array.is_some(), "state key '{}' holds a {}", key, value.type_name());
        array
    }

    pub fn sub_state_at(&self, key: &str, index: usize) -> Option<&PatcherState> {
        self.sub_state_array(key)?.get(index)
    }

    /// Element `index` of the sub-state array at `key`, growing the array as needed.
    pub fn sub_state_at_mut(&mut self, key: &str, index: usize) -> &mut PatcherState {
        let slot = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| Value::SubStateArray(Vec::new()));
        if !matches!(slot, Value::SubStateArray(_)) {
            *slot = Value::SubStateArray(Vec::new());
        }
        match slot {
            Value::SubStateArray(array) => {
                if array.len() <= index {
                    array.resize_with(index + 1, PatcherState::default);
                }
                &mut array[index]
            }
            _ => unreachable!("slot was just set to a sub-state array"),
        }
    }
}

impl<'a> IntoIterator for &'a PatcherState {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for PatcherState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
