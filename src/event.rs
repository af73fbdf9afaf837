//! Event definitions for the simulation engine.
//!
//! Everything a session reports flows through an [`EventSink`] as a
//! [`SessionMessage`]: structured events (consumed by visualization and by
//! grading), free-text log lines, intensity maps for the circuit view and the
//! session lifecycle notifications.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::types::SessionKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    Start,
    End,
}

/// Payload of a structured event, tagged by `name` on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum EventBody {
    Loop { phase: LoopPhase },
    DigitalWrite { pin: String, value: u8 },
    Delay { ms: u64 },
    Led { id: String, on: bool, brightness: f64 },
    Button { id: String, pressed: bool },
}

/// A structured event stamped with elapsed session time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub body: EventBody,
    #[serde(rename = "timestampMs")]
    pub timestamp_ms: u64,
}

impl Event {
    pub fn new(body: EventBody, timestamp_ms: u64) -> Self {
        Event { body, timestamp_ms }
    }
}

/// One entry of a session's raw output stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LogRecord {
    Event(Event),
    Log { message: String },
}

impl LogRecord {
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            LogRecord::Event(event) => Some(event),
            LogRecord::Log { .. } => None,
        }
    }
}

/// Component id → LED intensity in `[0, 1]`.
pub type IntensityMap = BTreeMap<String, f64>;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum SessionOutput {
    Started,
    Record(LogRecord),
    Circuit(IntensityMap),
    Finished,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionMessage {
    pub session: SessionKey,
    #[serde(flatten)]
    pub output: SessionOutput,
}

/// Sending half of a session's output stream.
///
/// A dropped observer is not an error; sends into a closed channel are
/// silently discarded.
#[derive(Clone, Debug)]
pub struct EventSink {
    session: SessionKey,
    tx: mpsc::UnboundedSender<SessionMessage>,
}

impl EventSink {
    pub fn new(session: SessionKey, tx: mpsc::UnboundedSender<SessionMessage>) -> Self {
        EventSink { session, tx }
    }

    /// A sink paired with its own receiver.
    pub fn channel(session: SessionKey) -> (Self, mpsc::UnboundedReceiver<SessionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink::new(session, tx), rx)
    }

    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    pub fn send(&self, output: SessionOutput) {
        let _ = self.tx.send(SessionMessage {
            session: self.session.clone(),
            output,
        });
    }

    pub fn event(&self, body: EventBody, timestamp_ms: u64) {
        self.send(SessionOutput::Record(LogRecord::Event(Event::new(
            body,
            timestamp_ms,
        ))));
    }

    pub fn log(&self, message: impl Into<String>) {
        self.send(SessionOutput::Record(LogRecord::Log {
            message: message.into(),
        }));
    }

    pub fn circuit(&self, intensities: IntensityMap) {
        self.send(SessionOutput::Circuit(intensities));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let record = LogRecord::Event(Event::new(
            EventBody::DigitalWrite {
                pin: "D13".to_string(),
                value: 1,
            },
            40,
        ));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"kind": "event", "name": "digitalWrite", "pin": "D13", "value": 1, "timestampMs": 40})
        );

        let back: LogRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_loop_marker_format() {
        let record = LogRecord::Event(Event::new(
            EventBody::Loop {
                phase: LoopPhase::End,
            },
            7,
        ));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["name"], "loop");
        assert_eq!(value["phase"], "end");
    }

    #[test]
    fn test_log_record_format() {
        let record = LogRecord::Log {
            message: "hello".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"kind": "log", "message": "hello"})
        );
        assert!(record.as_event().is_none());
    }

    #[test]
    fn test_sink_tags_session_and_survives_closed_receiver() {
        let (sink, mut rx) = EventSink::channel("s1".into());
        sink.log("one");
        let message = rx.try_recv().unwrap();
        assert_eq!(message.session.as_str(), "s1");

        drop(rx);
        sink.log("nobody listening");
    }
}
