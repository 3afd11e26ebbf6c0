//! Parameter metadata and scaling between normalized (0.0-1.0) and real values.
//!
//! # Example
//!
//! ```
//! use cadenza_core::ParameterInfo;
//!
//! // Cutoff: 20 Hz to 20 kHz, more resolution at the low end
//! let cutoff = ParameterInfo::number(20.0, 20000.0, 1000.0).with_exponent(3.0);
//!
//! let hz = cutoff.denormalize(0.5);
//! let back = cutoff.normalize(hz);
//! assert!((back - 0.5).abs() < 1e-9);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::event::ParameterIndex;
use crate::patcher::Patcher;

/// Kind of value a parameter carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    #[default]
    Number,
    Bang,
    List,
    Signal,
}

/// Descriptor of a single patch parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterInfo {
    pub kind: ParameterType,
    pub min: f64,
    pub max: f64,
    pub initial: f64,
    /// Curve of the normalized mapping. `1.0` is linear; larger values give more
    /// resolution at the low end.
    pub exponent: f64,
    /// Number of discrete positions, `0` for continuous.
    pub steps: u32,
    pub visible: bool,
    pub transmittable: bool,
    pub saveable: bool,
    /// Labels for an enumerated parameter, indexed by value.
    pub enum_values: Vec<String>,
    pub unit: Option<String>,
}

impl Default for ParameterInfo {
    fn default() -> Self {
        Self {
            kind: ParameterType::Number,
            min: 0.0,
            max: 1.0,
            initial: 0.0,
            exponent: 1.0,
            steps: 0,
            visible: true,
            transmittable: true,
            saveable: true,
            enum_values: Vec::new(),
            unit: None,
        }
    }
}

impl ParameterInfo {
    /// A continuous number parameter.
    pub fn number(min: f64, max: f64, initial: f64) -> Self {
        debug_assert!(max >= min, "max must not be less than min");
        Self {
            min,
            max,
            initial: initial.clamp(min, max.max(min)),
            ..Self::default()
        }
    }

    /// An enumerated parameter with one step per label.
    pub fn enumeration<S: Into<String>>(labels: impl IntoIterator<Item = S>, initial: usize) -> Self {
        let enum_values: Vec<String> = labels.into_iter().map(Into::into).collect();
        let max = enum_values.len().saturating_sub(1) as f64;
        Self {
            min: 0.0,
            max,
            initial: (initial as f64).min(max),
            steps: enum_values.len() as u32,
            enum_values,
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: ParameterType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_exponent(mut self, exponent: f64) -> Self {
        self.exponent = exponent;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn not_saveable(mut self) -> Self {
        self.saveable = false;
        self
    }

    pub fn not_transmittable(mut self) -> Self {
        self.transmittable = false;
        self
    }

    #[inline]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    #[inline]
    fn curve(&self) -> f64 {
        if self.exponent > 0.0 && self.exponent.is_finite() {
            self.exponent
        } else {
            1.0
        }
    }

    #[inline]
    fn quantize_normalized(&self, normalized: f64) -> f64 {
        if self.steps > 1 {
            let last = (self.steps - 1) as f64;
            (normalized * last).round() / last
        } else {
            normalized
        }
    }

    /// Clamp (and snap to steps) a real value.
    #[inline]
    pub fn constrain(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        let value = value.clamp(self.min, self.max.max(self.min));
        if self.steps > 1 {
            self.denormalize(self.normalize(value))
        } else {
            value
        }
    }

    /// Convert a real value to normalized (0.0-1.0).
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.span();
        if span <= 0.0 || value.is_nan() {
            return 0.0;
        }
        let linear = ((value - self.min) / span).clamp(0.0, 1.0);
        let shaped = match self.curve() {
            c if c == 1.0 => linear,
            c => linear.powf(1.0 / c),
        };
        self.quantize_normalized(shaped)
    }

    /// Convert a normalized value (0.0-1.0) to a real value.
    #[inline]
    pub fn denormalize(&self, normalized: f64) -> f64 {
        if normalized.is_nan() {
            return self.min;
        }
        let normalized = self.quantize_normalized(normalized.clamp(0.0, 1.0));
        let shaped = match self.curve() {
            c if c == 1.0 => normalized,
            c => normalized.powf(c),
        };
        self.min + shaped * self.span()
    }

    /// Label for an enumerated value.
    pub fn enum_label(&self, value: f64) -> Option<&str> {
        if value.is_nan() || value < 0.0 {
            return None;
        }
        self.enum_values.get(value.round() as usize).map(String::as_str)
    }

    /// Value for an enumerated label.
    pub fn enum_index(&self, label: &str) -> Option<f64> {
        self.enum_values
            .iter()
            .position(|v| v == label)
            .map(|i| i as f64)
    }
}

/// One row of a [`ParameterTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterEntry {
    pub id: String,
    pub name: String,
    pub info: ParameterInfo,
}

/// Immutable snapshot of a patch's parameters, rebuilt whenever a patch is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    entries: Vec<ParameterEntry>,
}

impl ParameterTable {
    pub fn new(entries: Vec<ParameterEntry>) -> Self {
        Self { entries }
    }

    pub fn from_patcher(patcher: &dyn Patcher) -> Self {
        let entries = (0..patcher.num_parameters())
            .map(|index| ParameterEntry {
                id: patcher.parameter_id(index).to_string(),
                name: patcher.parameter_name(index).to_string(),
                info: patcher.parameter_info(index),
            })
            .collect();
        Self { entries }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: ParameterIndex) -> Option<&ParameterEntry> {
        self.entries.get(index)
    }

    pub fn info(&self, index: ParameterIndex) -> Option<&ParameterInfo> {
        self.entries.get(index).map(|e| &e.info)
    }

    pub fn id(&self, index: ParameterIndex) -> Option<&str> {
        self.entries.get(index).map(|e| e.id.as_str())
    }

    pub fn name(&self, index: ParameterIndex) -> Option<&str> {
        self.entries.get(index).map(|e| e.name.as_str())
    }

    pub fn index_of(&self, id: &str) -> Option<ParameterIndex> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterEntry> {
        self.entries.iter()
    }

    pub fn initial_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|e| e.info.initial)
    }
}
