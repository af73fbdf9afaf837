//! Shared circuit builders and stream helpers for the integration tests.
//!
//! Each test file pulls this in with `mod mocks;`, so not every helper is
//! used everywhere.

#![allow(dead_code)]

use rusty_circuit::event::{EventBody, LogRecord, SessionMessage, SessionOutput};
use rusty_circuit::system_config::{CircuitDescription, ComponentConfig};
use rusty_circuit::SessionKey;
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub const BLINK_SKETCH: &str = "\
int led = 13;

void setup() {
  pinMode(led, OUTPUT);
}

void loop() {
  digitalWrite(led, HIGH);
  delay(500);
  digitalWrite(led, LOW);
  delay(500);
}
";

pub const BUTTON_SKETCH: &str = "\
#define BUTTON 2
const int LED = 13;

void setup() {
  pinMode(BUTTON, INPUT_PULLUP);
  pinMode(LED, OUTPUT);
}

void loop() {
  if (digitalRead(BUTTON) == LOW) {
    digitalWrite(LED, HIGH);
  } else {
    digitalWrite(LED, LOW);
  }
  delay(100);
}
";

pub fn controller() -> ComponentConfig {
    ComponentConfig::new("uno", "Arduino Uno").with_pins(&["TX0", "TX1", "D2", "D9", "D13", "5V", "GND"])
}

pub fn ground(id: &str) -> ComponentConfig {
    ComponentConfig::new(id, "ground").with_pins(&["GND"])
}

pub fn resistor(id: &str, ohms: f64) -> ComponentConfig {
    ComponentConfig::new(id, "resistor")
        .with_pins(&["pin1", "pin2"])
        .with_property("resistance", json!(ohms))
}

pub fn led(id: &str) -> ComponentConfig {
    ComponentConfig::new(id, "led").with_pins(&["anode", "cathode"])
}

pub fn button(id: &str, pressed: bool) -> ComponentConfig {
    ComponentConfig::new(id, "button")
        .with_pins(&["pin1", "pin2"])
        .with_property("pressed", json!(pressed))
}

/// D13 → resistor → LED → ground.
pub fn blink_circuit(ohms: f64) -> CircuitDescription {
    CircuitDescription::default()
        .component(controller())
        .component(resistor("r1", ohms))
        .component(led("led1"))
        .component(ground("gnd"))
        .wire(("uno", "D13"), ("r1", "pin1"))
        .wire(("r1", "pin2"), ("led1", "anode"))
        .wire(("led1", "cathode"), ("gnd", "GND"))
}

/// The blink circuit plus a button between D2 and ground.
pub fn button_circuit(pressed: bool) -> CircuitDescription {
    blink_circuit(220.0)
        .component(button("b1", pressed))
        .component(ground("gnd2"))
        .wire(("uno", "D2"), ("b1", "pin1"))
        .wire(("b1", "pin2"), ("gnd2", "GND"))
}

/// A button between D2 and the controller's 5V rail.
pub fn supply_button_circuit(pressed: bool) -> CircuitDescription {
    CircuitDescription::default()
        .component(controller())
        .component(button("b1", pressed))
        .wire(("uno", "D2"), ("b1", "pin1"))
        .wire(("b1", "pin2"), ("uno", "5V"))
}

/// A button whose first pin shares D2's net with the 5V rail and whose
/// second pin goes to ground.
pub fn supply_and_ground_button_circuit(pressed: bool) -> CircuitDescription {
    CircuitDescription::default()
        .component(controller())
        .component(button("b1", pressed))
        .component(ground("gnd"))
        .wire(("uno", "D2"), ("b1", "pin1"))
        .wire(("b1", "pin1"), ("uno", "5V"))
        .wire(("b1", "pin2"), ("gnd", "GND"))
}

/// Two pressed buttons on D2, one to ground and one to 5V.
pub fn split_buttons_circuit() -> CircuitDescription {
    CircuitDescription::default()
        .component(controller())
        .component(button("b1", true))
        .component(button("b2", true))
        .component(ground("gnd"))
        .wire(("uno", "D2"), ("b1", "pin1"))
        .wire(("b1", "pin2"), ("gnd", "GND"))
        .wire(("uno", "D2"), ("b2", "pin1"))
        .wire(("b2", "pin2"), ("uno", "5V"))
}

/// Everything currently queued on a session stream.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SessionMessage>) -> Vec<SessionMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

pub fn records_of<'a>(
    messages: &'a [SessionMessage],
    key: &'a SessionKey,
) -> impl Iterator<Item = &'a LogRecord> + 'a {
    messages
        .iter()
        .filter(move |m| &m.session == key)
        .filter_map(|m| match &m.output {
            SessionOutput::Record(record) => Some(record),
            _ => None,
        })
}

pub fn events_of<'a>(
    messages: &'a [SessionMessage],
    key: &'a SessionKey,
) -> Vec<&'a EventBody> {
    records_of(messages, key)
        .filter_map(|record| record.as_event().map(|event| &event.body))
        .collect()
}

/// The raw log of one session as grading input.
pub fn raw_log(messages: &[SessionMessage], key: &SessionKey) -> Value {
    Value::Array(
        records_of(messages, key)
            .filter_map(|record| serde_json::to_value(record).ok())
            .collect(),
    )
}

pub fn dw(pin: &str, value: u8) -> Value {
    json!({"kind": "event", "name": "digitalWrite", "pin": pin, "value": value, "timestampMs": 0})
}

pub fn delay(ms: u64) -> Value {
    json!({"kind": "event", "name": "delay", "ms": ms, "timestampMs": 0})
}

pub fn marker(phase: &str) -> Value {
    json!({"kind": "event", "name": "loop", "phase": phase, "timestampMs": 0})
}
