//! Raw event log → canonical events.
//!
//! Input is untrusted JSON, so everything here works on [`serde_json::Value`]
//! and skips what it does not understand instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::component::{number_of, truthy};
use crate::config::NormalizerConfig;

static NULL: Value = Value::Null;

/// Comparison-ready projection of a structured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum CanonicalEvent {
    #[serde(rename = "led")]
    Led { id: String, on: bool, b: f64 },
    #[serde(rename = "dw")]
    DigitalWrite { pin: String, v: u8 },
    #[serde(rename = "del")]
    Delay { ms: f64 },
    #[serde(rename = "btn")]
    Button { id: String, p: bool },
}

/// Grouping key of a non-delay canonical event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signature {
    /// Brightness in hundredths.
    Led { id: String, on: bool, centi: i64 },
    DigitalWrite { pin: String, value: u8 },
    Button { id: String, pressed: bool },
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Led { id, on, centi } => write!(
                f,
                "led:{}:{}:{}",
                id,
                if *on { "on" } else { "off" },
                *centi as f64 / 100.0
            ),
            Signature::DigitalWrite { pin, value } => write!(f, "dw:{}:{}", pin, value),
            Signature::Button { id, pressed } => write!(
                f,
                "btn:{}:{}",
                id,
                if *pressed { "pressed" } else { "released" }
            ),
        }
    }
}

impl CanonicalEvent {
    /// Group key; `None` for delays, which are compared as a total.
    pub fn signature(&self) -> Option<Signature> {
        match self {
            CanonicalEvent::Led { id, on, b } => Some(Signature::Led {
                id: id.clone(),
                on: *on,
                centi: (b * 100.0).round() as i64,
            }),
            CanonicalEvent::DigitalWrite { pin, v } => Some(Signature::DigitalWrite {
                pin: pin.clone(),
                value: *v,
            }),
            CanonicalEvent::Button { id, p } => Some(Signature::Button {
                id: id.clone(),
                pressed: *p,
            }),
            CanonicalEvent::Delay { .. } => None,
        }
    }

    pub fn delay_ms(&self) -> Option<f64> {
        match self {
            CanonicalEvent::Delay { ms } => Some(*ms),
            _ => None,
        }
    }

    /// Identity used for cycle detection, delays included.
    fn cycle_key(&self) -> String {
        match self.signature() {
            Some(signature) => signature.to_string(),
            None => format!("del:{}", self.delay_ms().unwrap_or(0.0)),
        }
    }

    /// Canonical form of one log entry, if it is a structured, non-marker
    /// event. Entries already in canonical form (`{"t": ...}`) are accepted.
    pub fn from_value(item: &Value) -> Option<Self> {
        let object = item.as_object()?;

        if let Some(tag) = object.get("t").and_then(Value::as_str) {
            let field = |key: &str| object.get(key).unwrap_or(&NULL);
            return match tag {
                "led" => Some(CanonicalEvent::Led {
                    id: text_of(field("id")),
                    on: truthy(field("on")),
                    b: round2(number_of(field("b"))),
                }),
                "dw" => Some(CanonicalEvent::DigitalWrite {
                    pin: text_of(field("pin")),
                    v: truthy(field("v")) as u8,
                }),
                "del" => Some(CanonicalEvent::Delay {
                    ms: number_of(field("ms")),
                }),
                "btn" => Some(CanonicalEvent::Button {
                    id: text_of(field("id")),
                    p: truthy(field("p")),
                }),
                _ => None,
            };
        }

        if !is_raw_event(item) {
            return None;
        }
        let field = |key: &str| object.get(key).unwrap_or(&NULL);
        match object.get("name").and_then(Value::as_str)? {
            "led" => Some(CanonicalEvent::Led {
                id: text_of(field("id")),
                on: truthy(field("on")),
                b: round2(number_of(field("brightness"))),
            }),
            "digitalWrite" => Some(CanonicalEvent::DigitalWrite {
                pin: text_of(field("pin")),
                v: truthy(field("value")) as u8,
            }),
            "delay" => Some(CanonicalEvent::Delay {
                ms: number_of(field("ms")),
            }),
            "button" => Some(CanonicalEvent::Button {
                id: text_of(field("id")),
                p: truthy(field("pressed")),
            }),
            _ => None,
        }
    }
}

/// Structured events carry `kind: "event"`; older logs used `type`.
fn is_raw_event(item: &Value) -> bool {
    ["kind", "type"]
        .iter()
        .any(|key| item.get(key).and_then(Value::as_str) == Some("event"))
}

fn is_loop_marker(item: &Value, phase: &str) -> bool {
    is_raw_event(item)
        && item.get("name").and_then(Value::as_str) == Some("loop")
        && item.get("phase").and_then(Value::as_str) == Some(phase)
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn items(raw: &Value) -> &[Value] {
    match raw {
        Value::Array(items) => items,
        _ => &[],
    }
}

/// Map every entry to canonical form, dropping logs, markers and junk.
pub fn canonicalize(items: &[Value]) -> Vec<CanonicalEvent> {
    items.iter().filter_map(CanonicalEvent::from_value).collect()
}

/// The entries strictly between the first loop start and the first loop
/// end after it.
pub fn marked_iteration(items: &[Value]) -> Option<&[Value]> {
    let start = items.iter().position(|item| is_loop_marker(item, "start"))?;
    let end = items[start + 1..]
        .iter()
        .position(|item| is_loop_marker(item, "end"))?;
    Some(&items[start + 1..start + 1 + end])
}

pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Normalizer { config }
    }

    /// Canonical events of a reference log. Loop markers, when present, pick
    /// the iteration; no further guessing is applied.
    pub fn expected(&self, raw: &Value) -> Vec<CanonicalEvent> {
        let items = items(raw);
        canonicalize(marked_iteration(items).unwrap_or(items))
    }

    /// Canonical events of one representative iteration of a submitted log.
    ///
    /// Tries, in order: explicit loop markers, a repeating fixed-length
    /// window, the first occurrence of each distinct event, and finally the
    /// whole stream.
    pub fn representative(&self, raw: &Value) -> Vec<CanonicalEvent> {
        let items = items(raw);
        if let Some(iteration) = marked_iteration(items) {
            return canonicalize(iteration);
        }

        let events = canonicalize(items);
        if let Some(period) = self.detect_period(&events) {
            return events[..period].to_vec();
        }
        if let Some(distinct) = self.distinct_cycle(&events) {
            return distinct;
        }
        events
    }

    fn detect_period(&self, events: &[CanonicalEvent]) -> Option<usize> {
        if events.len() < self.config.min_events_for_period {
            return None;
        }
        let keys: Vec<String> = events.iter().map(CanonicalEvent::cycle_key).collect();
        self.config
            .period_candidates
            .iter()
            .copied()
            .find(|&p| p > 0 && keys.len() >= 2 * p && keys[..p] == keys[p..2 * p])
    }

    fn distinct_cycle(&self, events: &[CanonicalEvent]) -> Option<Vec<CanonicalEvent>> {
        let mut seen = HashSet::new();
        let distinct: Vec<CanonicalEvent> = events
            .iter()
            .filter(|event| seen.insert(event.cycle_key()))
            .cloned()
            .collect();

        let count = distinct.len();
        let in_window = count >= self.config.distinct_min && count <= self.config.distinct_max;
        if in_window && events.len() >= 2 * count {
            Some(distinct)
        } else {
            None
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::new(NormalizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dw(pin: &str, value: u8) -> Value {
        json!({"kind": "event", "name": "digitalWrite", "pin": pin, "value": value, "timestampMs": 0})
    }

    fn delay(ms: u64) -> Value {
        json!({"kind": "event", "name": "delay", "ms": ms, "timestampMs": 0})
    }

    fn marker(phase: &str) -> Value {
        json!({"kind": "event", "name": "loop", "phase": phase, "timestampMs": 0})
    }

    #[test]
    fn test_raw_event_mapping() {
        let led = json!({"kind": "event", "name": "led", "id": "l1", "on": true, "brightness": 0.4545, "timestampMs": 3});
        assert_eq!(
            CanonicalEvent::from_value(&led),
            Some(CanonicalEvent::Led {
                id: "l1".to_string(),
                on: true,
                b: 0.45
            })
        );
        let button = json!({"type": "event", "name": "button", "id": "b1", "pressed": true});
        assert_eq!(
            CanonicalEvent::from_value(&button),
            Some(CanonicalEvent::Button {
                id: "b1".to_string(),
                p: true
            })
        );
        assert_eq!(CanonicalEvent::from_value(&marker("start")), None);
        assert_eq!(
            CanonicalEvent::from_value(&json!({"kind": "log", "message": "hi"})),
            None
        );
        assert_eq!(CanonicalEvent::from_value(&json!(42)), None);
    }

    #[test]
    fn test_canonical_entries_pass_through() {
        let item = json!({"t": "dw", "pin": "D13", "v": 1});
        assert_eq!(
            CanonicalEvent::from_value(&item),
            Some(CanonicalEvent::DigitalWrite {
                pin: "D13".to_string(),
                v: 1
            })
        );
        let out = serde_json::to_value(CanonicalEvent::Delay { ms: 500.0 }).unwrap();
        assert_eq!(out, json!({"t": "del", "ms": 500.0}));
    }

    #[test]
    fn test_marked_iteration_is_sliced() {
        let mut raw = vec![dw("D1", 1), dw("D1", 0), marker("start")];
        for i in 3..9 {
            raw.push(dw(&format!("D{}", i), 1));
        }
        raw.push(marker("end"));
        raw.push(dw("D99", 1));

        let events = Normalizer::default().representative(&Value::Array(raw.clone()));
        assert_eq!(events, canonicalize(&raw[3..9]));
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn test_start_without_end_falls_through() {
        let raw = json!([marker("start"), dw("D13", 1), delay(100)]);
        assert_eq!(Normalizer::default().representative(&raw).len(), 2);
    }

    #[test]
    fn test_repeating_cycle_is_detected() {
        let cycle = [
            dw("D13", 1),
            delay(100),
            dw("D12", 1),
            delay(100),
            dw("D13", 0),
            dw("D12", 0),
        ];
        let raw: Vec<Value> = cycle.iter().chain(cycle.iter()).cloned().collect();
        let events = Normalizer::default().representative(&Value::Array(raw.clone()));
        assert_eq!(events, canonicalize(&raw[..6]));
    }

    #[test]
    fn test_distinct_signatures_fallback() {
        // Eight events, four distinct, no fixed period.
        let raw = json!([
            dw("D1", 1),
            dw("D2", 1),
            dw("D1", 1),
            dw("D3", 1),
            dw("D4", 1),
            dw("D2", 1),
            dw("D4", 1),
            dw("D3", 1)
        ]);
        let events = Normalizer::default().representative(&raw);
        let pins: Vec<String> = events
            .iter()
            .map(|e| match e {
                CanonicalEvent::DigitalWrite { pin, .. } => pin.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(pins, vec!["D1", "D2", "D3", "D4"]);
    }

    #[test]
    fn test_short_stream_is_kept_whole() {
        let raw = json!([dw("D13", 1), delay(500), dw("D13", 0)]);
        assert_eq!(Normalizer::default().representative(&raw).len(), 3);
    }

    #[test]
    fn test_non_array_is_empty() {
        assert!(Normalizer::default().representative(&json!({"oops": 1})).is_empty());
        assert!(Normalizer::default().expected(&Value::Null).is_empty());
    }
}
