use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::system_config::{CircuitDescription, ComponentConfig, WireConfig};

/// Default pin names for components whose description omits `pinPositions`.
pub const DEFAULT_TWO_PINS: [&str; 2] = ["pin1", "pin2"];

/// What a component is, as far as the simulator cares.
///
/// Classification is by case-insensitive substring of the editor's type
/// string, so `"Arduino Uno"` and `"arduino"` are both controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    Ground,
    Resistor,
    Led,
    Button,
    Controller,
    Other(String),
}

impl ComponentKind {
    pub fn classify(type_name: &str) -> Self {
        let lower = type_name.to_lowercase();
        if lower.contains("ground") {
            ComponentKind::Ground
        } else if lower.contains("resistor") {
            ComponentKind::Resistor
        } else if lower.contains("button") {
            ComponentKind::Button
        } else if lower.contains("led") {
            ComponentKind::Led
        } else if lower.contains("arduino") || lower.contains("controller") {
            ComponentKind::Controller
        } else {
            ComponentKind::Other(type_name.to_string())
        }
    }
}

/// A circuit component with its kind resolved.
#[derive(Debug, Clone)]
pub struct Component {
    pub id: String,
    pub kind: ComponentKind,
    pin_names: Vec<String>,
    properties: Map<String, Value>,
}

impl Component {
    pub fn from_config(config: &ComponentConfig) -> Self {
        let pin_names = config
            .pin_positions
            .as_ref()
            .map(|positions| positions.keys().cloned().collect())
            .unwrap_or_default();
        Component {
            id: config.id.clone(),
            kind: ComponentKind::classify(&config.component_type),
            pin_names,
            properties: config.properties.clone(),
        }
    }

    /// Declared pin names, or the `pin1`/`pin2` pair when none are declared.
    pub fn pins(&self) -> Vec<String> {
        if self.pin_names.is_empty() {
            DEFAULT_TWO_PINS.iter().map(|p| p.to_string()).collect()
        } else {
            self.pin_names.clone()
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Declared resistance in ohms; missing or unparsable values count as 0.
    pub fn resistance(&self) -> f64 {
        self.property("resistance").map(number_of).unwrap_or(0.0)
    }

    pub fn is_pressed(&self) -> bool {
        self.property("pressed").map(truthy).unwrap_or(false)
    }

    /// First pin whose name mentions "cathode", else the literal `cathode`.
    pub fn cathode_pin(&self) -> String {
        self.pin_names
            .iter()
            .find(|p| p.to_lowercase().contains("cathode"))
            .cloned()
            .unwrap_or_else(|| "cathode".to_string())
    }

    /// Shallow-merge a property patch over the current properties.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            self.properties.insert(key.clone(), value.clone());
        }
    }
}

/// Lenient numeric coercion: numbers as-is, numeric strings parsed, booleans as
/// 0/1, everything else 0.
pub fn number_of(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Loose truthiness used for flags such as `pressed`.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Indexed, mutable view of a circuit description owned by one session.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    components: Vec<Component>,
    index: HashMap<String, usize>,
    wires: Vec<WireConfig>,
}

impl Circuit {
    pub fn new(description: &CircuitDescription) -> Self {
        let components: Vec<Component> = description
            .components
            .iter()
            .map(Component::from_config)
            .collect();
        // Later duplicates shadow earlier ones on lookup.
        let index = components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Circuit {
            components,
            index,
            wires: description.wires.clone(),
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn wires(&self) -> &[WireConfig] {
        &self.wires
    }

    pub fn get(&self, id: &str) -> Option<&Component> {
        self.index.get(id).map(|&i| &self.components[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Component> {
        match self.index.get(id) {
            Some(&i) => self.components.get_mut(i),
            None => None,
        }
    }

    /// Id of the first controller board in the description.
    pub fn controller_id(&self) -> Option<&str> {
        self.components
            .iter()
            .find(|c| c.kind == ComponentKind::Controller)
            .map(|c| c.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
