//! Owned plugin descriptor records.
//!
//! Records are copied out of the native descriptor tables during enumeration
//! so they stay valid after the library is closed.

use serde::{Deserialize, Serialize};

use crate::identifier::{PluginIdentifier, PluginType};

/// A plugin's unique ID: numeric for LADSPA, a string for Vamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniqueId {
    /// LADSPA `UniqueID`.
    Numeric(u64),
    /// Vamp plugin identifier.
    Text(String),
}

impl std::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Data flow direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// Whether a port carries a sample stream or a single control value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Audio,
    Control,
}

/// Display and range hints attached to a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortHints {
    pub toggled: bool,
    pub integer: bool,
    pub logarithmic: bool,
    /// Bounds and default are fractions of the sample rate.
    pub sample_rate: bool,
}

/// How a port's default value is derived from its range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "value")]
pub enum DefaultPolicy {
    None,
    Minimum,
    Low,
    Middle,
    High,
    Maximum,
    Zero,
    One,
    Hundred,
    FourForty,
    /// An explicit value supplied by the plugin.
    Explicit(f32),
}

/// One port (or Vamp parameter) of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub index: usize,
    pub name: String,
    pub direction: PortDirection,
    pub kind: PortKind,
    pub hints: PortHints,
    pub lower_bound: Option<f32>,
    pub upper_bound: Option<f32>,
    pub default_policy: DefaultPolicy,
    /// Default supplied by the semantic index; clamped into range on use.
    pub default_override: Option<f32>,
}

impl PortDescriptor {
    /// Whether this is a control input, i.e. a user-adjustable parameter.
    pub fn is_parameter(&self) -> bool {
        self.kind == PortKind::Control && self.direction == PortDirection::Input
    }

    /// Lowest legal value at `sample_rate`.
    pub fn minimum(&self, sample_rate: f32) -> f32 {
        self.scale(self.raw_minimum(), sample_rate)
    }

    /// Highest legal value at `sample_rate`.
    pub fn maximum(&self, sample_rate: f32) -> f32 {
        self.scale(self.raw_maximum(), sample_rate)
    }

    /// Default value at `sample_rate`.
    pub fn default_value(&self, sample_rate: f32) -> f32 {
        let minimum = self.raw_minimum();
        let maximum = self.raw_maximum();

        if let Some(value) = self.default_override {
            let scaled_min = self.scale(minimum, sample_rate);
            let scaled_max = self.scale(maximum, sample_rate);
            return value.max(scaled_min).min(scaled_max);
        }

        let interpolate = |low_weight: f32| {
            if self.hints.logarithmic && minimum > 0.0 && maximum > 0.0 {
                10f32.powf(minimum.log10() * low_weight + maximum.log10() * (1.0 - low_weight))
            } else {
                minimum * low_weight + maximum * (1.0 - low_weight)
            }
        };

        let value = match self.default_policy {
            DefaultPolicy::None | DefaultPolicy::Minimum => minimum,
            DefaultPolicy::Low => interpolate(0.75),
            DefaultPolicy::Middle => interpolate(0.5),
            DefaultPolicy::High => interpolate(0.25),
            DefaultPolicy::Maximum => maximum,
            DefaultPolicy::Zero => 0.0,
            DefaultPolicy::One => 1.0,
            DefaultPolicy::Hundred => 100.0,
            DefaultPolicy::FourForty => 440.0,
            DefaultPolicy::Explicit(value) => value,
        };

        self.scale(value, sample_rate)
    }

    /// Step between legal values, or 0 for a continuous range.
    pub fn quantization(&self, sample_rate: f32) -> f32 {
        if self.hints.toggled {
            self.maximum(sample_rate).round() - self.minimum(sample_rate).round()
        } else if self.hints.integer {
            1.0
        } else {
            0.0
        }
    }

    fn raw_minimum(&self) -> f32 {
        match (self.lower_bound, self.upper_bound) {
            (Some(lower), _) => lower,
            (None, Some(upper)) => 0f32.min(upper - 1.0),
            (None, None) => 0.0,
        }
    }

    fn raw_maximum(&self) -> f32 {
        match self.upper_bound {
            Some(upper) => upper,
            None => self.lower_bound.unwrap_or(0.0) + 1.0,
        }
    }

    fn scale(&self, value: f32, sample_rate: f32) -> f32 {
        if self.hints.sample_rate {
            value * sample_rate
        } else {
            value
        }
    }
}

/// Everything known about one discovered plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptorRecord {
    pub identifier: PluginIdentifier,
    pub unique_id: UniqueId,
    pub label: String,
    pub name: String,
    pub maker: String,
    pub copyright: String,
    /// Free-text description (Vamp only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Plugin version (Vamp only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    pub ports: Vec<PortDescriptor>,
    /// Category path such as `Effects > Delay`; empty when unknown.
    pub category: String,
}

impl PluginDescriptorRecord {
    /// The ABI of the plugin.
    pub fn plugin_type(&self) -> PluginType {
        self.identifier.plugin_type()
    }

    /// Number of user-adjustable parameters.
    pub fn parameter_count(&self) -> usize {
        self.ports.iter().filter(|p| p.is_parameter()).count()
    }

    /// Number of audio input ports.
    pub fn audio_input_count(&self) -> usize {
        self.ports
            .iter()
            .filter(|p| p.kind == PortKind::Audio && p.direction == PortDirection::Input)
            .count()
    }

    /// Number of audio output ports.
    pub fn audio_output_count(&self) -> usize {
        self.ports
            .iter()
            .filter(|p| p.kind == PortKind::Audio && p.direction == PortDirection::Output)
            .count()
    }

    /// Names of control outputs, leaving out latency reporting ports.
    pub fn control_output_names(&self) -> Vec<&str> {
        self.ports
            .iter()
            .filter(|p| p.kind == PortKind::Control && p.direction == PortDirection::Output)
            .map(|p| p.name.as_str())
            .filter(|name| *name != "latency" && *name != "_latency")
            .collect()
    }
}
