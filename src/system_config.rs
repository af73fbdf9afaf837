//! # Circuit Description
//!
//! JSON model of the breadboard a sketch runs against: a flat component list
//! plus the wires joining component pins.
//!
//! ## Format
//!
//! ```json
//! {
//!   "components": [
//!     { "id": "uno", "type": "arduino", "pinPositions": { "D13": {}, "GND": {} } },
//!     { "id": "r1", "type": "resistor", "pinPositions": { "pin1": {}, "pin2": {} },
//!       "properties": { "resistance": 220 } },
//!     { "id": "led1", "type": "led", "pinPositions": { "anode": {}, "cathode": {} } },
//!     { "id": "gnd", "type": "ground", "pinPositions": { "GND": {} } }
//!   ],
//!   "wires": [
//!     { "start": { "componentId": "uno", "pinName": "D13" },
//!       "end": { "componentId": "r1", "pinName": "pin1" } }
//!   ]
//! }
//! ```
//!
//! `pinPositions` carries editor geometry; the simulator only reads its keys,
//! in document order, to enumerate pin names.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::SimResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitDescription {
    #[serde(default, deserialize_with = "null_as_default")]
    pub components: Vec<ComponentConfig>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub wires: Vec<WireConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    pub id: String,
    #[serde(rename = "type", default)]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_positions: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireConfig {
    pub start: PinReference,
    pub end: PinReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinReference {
    pub component_id: String,
    pub pin_name: String,
}

impl PinReference {
    pub fn new(component_id: impl Into<String>, pin_name: impl Into<String>) -> Self {
        PinReference {
            component_id: component_id.into(),
            pin_name: pin_name.into(),
        }
    }
}

impl ComponentConfig {
    pub fn new(id: impl Into<String>, component_type: impl Into<String>) -> Self {
        ComponentConfig {
            id: id.into(),
            component_type: component_type.into(),
            pin_positions: None,
            properties: Map::new(),
        }
    }

    /// Declare pin names in order; geometry is left empty.
    pub fn with_pins(mut self, pins: &[&str]) -> Self {
        let positions = pins
            .iter()
            .map(|p| (p.to_string(), Value::Object(Map::new())))
            .collect();
        self.pin_positions = Some(positions);
        self
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

impl CircuitDescription {
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn wire(mut self, from: (&str, &str), to: (&str, &str)) -> Self {
        self.wires.push(WireConfig {
            start: PinReference::new(from.0, from.1),
            end: PinReference::new(to.0, to.1),
        });
        self
    }

    pub fn component(mut self, component: ComponentConfig) -> Self {
        self.components.push(component);
        self
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
