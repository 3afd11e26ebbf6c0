//! JSON serialization of presets.
//!
//! Layout:
//!
//! - number → JSON number, integer / index → JSON integer, boolean → JSON boolean
//! - string → JSON string, list → array of numbers
//! - sub-state → object, sub-state array → array of objects
//! - the root object carries the reserved key `__presetid`
//!
//! References (DataRef names, signals, external handles) are not part of a preset.

use std::sync::Arc;

use serde_json::{Map, Number};

use crate::error::{Error, Result};
use crate::state::{PatcherState, Preset, Value};

/// Reserved root key identifying the preset format.
pub const PRESET_ID_KEY: &str = "__presetid";

/// Value written under [`PRESET_ID_KEY`].
pub const PRESET_ID: &str = "cadenza";

/// Convert a preset to a JSON object.
///
/// JSON carries no element type for an empty array, so an empty sub-state array and an
/// empty list both become `[]` and read back as an empty [`Value::List`].
pub fn preset_to_json(preset: &Preset) -> serde_json::Value {
    let mut root = state_to_map(preset);
    root.insert(
        PRESET_ID_KEY.to_string(),
        serde_json::Value::String(PRESET_ID.to_string()),
    );
    serde_json::Value::Object(root)
}

/// Serialize a preset to a JSON string.
pub fn preset_to_string(preset: &Preset) -> Result<String> {
    Ok(serde_json::to_string(&preset_to_json(preset))?)
}

/// Build a preset from a JSON object. The reserved id key is dropped.
pub fn preset_from_json(json: &serde_json::Value) -> Result<Preset> {
    let serde_json::Value::Object(map) = json else {
        return Err(Error::PresetNotObject);
    };
    let mut preset = map_to_state(map)?;
    preset.remove(PRESET_ID_KEY);
    Ok(preset)
}

/// Parse a preset from a JSON string.
pub fn preset_from_str(json: &str) -> Result<Preset> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    preset_from_json(&value)
}

fn state_to_map(state: &PatcherState) -> Map<String, serde_json::Value> {
    let mut map = Map::new();
    for (key, value) in state {
        match value_to_json(value) {
            Some(json) => {
                map.insert(key.clone(), json);
            }
            None if value.is_serializable() => {
                tracing::warn!("Skipping non-finite number in preset key {}", key);
            }
            None => {
                debug_assert!(
                    false,
                    "state key '{key}' holds a {} which cannot be stored in a preset",
                    value.type_name()
                );
            }
        }
    }
    map
}

fn number(v: f64) -> Option<serde_json::Value> {
    Number::from_f64(v).map(serde_json::Value::Number)
}

fn value_to_json(value: &Value) -> Option<serde_json::Value> {
    Some(match value {
        Value::Number(v) => number(*v)?,
        Value::Integer(v) => serde_json::Value::from(*v),
        Value::Index(v) => serde_json::Value::from(*v),
        Value::Boolean(v) => serde_json::Value::Bool(*v),
        Value::String(v) => serde_json::Value::String(v.clone()),
        Value::List(values) => serde_json::Value::Array(
            values
                .iter()
                .map(|v| number(*v))
                .collect::<Option<Vec<_>>>()?,
        ),
        Value::SubState(sub) => serde_json::Value::Object(state_to_map(sub)),
        Value::SubStateArray(array) => serde_json::Value::Array(
            array
                .iter()
                .map(|s| serde_json::Value::Object(state_to_map(s)))
                .collect(),
        ),
        Value::External(_) | Value::DataRef(_) | Value::MultiDataRef(_) | Value::Signal(_) => {
            return None
        }
    })
}

fn map_to_state(map: &Map<String, serde_json::Value>) -> Result<PatcherState> {
    let mut state = PatcherState::new();
    for (key, json) in map {
        if let Some(value) = json_to_value(key, json)? {
            state.set(key.as_str(), value);
        }
    }
    Ok(state)
}

fn json_to_value(key: &str, json: &serde_json::Value) -> Result<Option<Value>> {
    let unsupported = || Error::UnsupportedPresetValue {
        key: key.to_string(),
    };
    Ok(Some(match json {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Bool(v) => Value::Boolean(*v),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(u) = n.as_u64() {
                Value::Index(u)
            } else {
                Value::Number(n.as_f64().ok_or_else(unsupported)?)
            }
        }
        serde_json::Value::String(v) => Value::String(v.clone()),
        serde_json::Value::Array(items) if items.iter().all(|v| v.is_object()) && !items.is_empty() => {
            let array = items
                .iter()
                .map(|item| match item {
                    serde_json::Value::Object(map) => map_to_state(map),
                    _ => Err(unsupported()),
                })
                .collect::<Result<Vec<_>>>()?;
            Value::SubStateArray(array)
        }
        serde_json::Value::Array(items) => Value::List(
            items
                .iter()
                .map(|v| v.as_f64().ok_or_else(unsupported))
                .collect::<Result<Vec<_>>>()?,
        ),
        serde_json::Value::Object(map) => Value::SubState(Arc::new(map_to_state(map)?)),
    }))
}
