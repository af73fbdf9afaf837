//! Concurrent sessions on a paused clock.

mod mocks;

use mocks::*;
use rusty_circuit::event::{EventBody, LogRecord, LoopPhase, SessionOutput};
use rusty_circuit::scheduler::{SessionState, Simulator};
use rusty_circuit::{EngineConfig, SessionKey};
use serde_json::{json, Map};
use tokio::time::{self, Duration};

fn key(name: &str) -> SessionKey {
    SessionKey::from(name)
}

fn pressed(value: bool) -> Map<String, serde_json::Value> {
    let mut patch = Map::new();
    patch.insert("pressed".into(), json!(value));
    patch
}

fn led_writes(events: &[&EventBody]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|body| match body {
            EventBody::DigitalWrite { pin, value } if pin == "D13" => Some(*value),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod scheduler_integration_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sessions_are_isolated() {
        let (sim, mut rx) = Simulator::new(EngineConfig::default());
        sim.start(key("pressed"), &button_circuit(true), BUTTON_SKETCH)
            .unwrap();
        sim.start(key("released"), &button_circuit(false), BUTTON_SKETCH)
            .unwrap();

        time::sleep(Duration::from_millis(450)).await;
        sim.stop_all().await;
        assert!(sim.active_sessions().is_empty());

        let messages = drain(&mut rx);
        let a = led_writes(&events_of(&messages, &key("pressed")));
        let b = led_writes(&events_of(&messages, &key("released")));
        assert!(a.len() >= 4, "pressed session wrote {:?}", a);
        assert!(b.len() >= 4, "released session wrote {:?}", b);
        assert!(a.iter().all(|&v| v == 1));
        assert!(b.iter().all(|&v| v == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_component_reaches_next_read() {
        let (sim, mut rx) = Simulator::new(EngineConfig::default());
        let k = key("s");
        sim.start(k.clone(), &button_circuit(false), BUTTON_SKETCH)
            .unwrap();

        time::sleep(Duration::from_millis(250)).await;
        assert!(sim.update_component(&k, "b1", pressed(true)));
        time::sleep(Duration::from_millis(250)).await;
        sim.stop(&k).await;

        let messages = drain(&mut rx);
        let events = events_of(&messages, &k);
        let press = events
            .iter()
            .position(|body| matches!(body, EventBody::Button { id, pressed: true } if id == "b1"))
            .expect("button event");

        assert!(led_writes(&events[..press]).iter().all(|&v| v == 0));
        let after = led_writes(&events[press..]);
        assert!(!after.is_empty());
        assert!(after.iter().all(|&v| v == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_does_not_leak_across_sessions() {
        let (sim, mut rx) = Simulator::new(EngineConfig::default());
        sim.start(key("a"), &button_circuit(false), BUTTON_SKETCH)
            .unwrap();
        sim.start(key("b"), &button_circuit(false), BUTTON_SKETCH)
            .unwrap();

        time::sleep(Duration::from_millis(50)).await;
        assert!(sim.update_component(&key("a"), "b1", pressed(true)));
        time::sleep(Duration::from_millis(300)).await;
        sim.stop_all().await;

        let messages = drain(&mut rx);
        assert!(led_writes(&events_of(&messages, &key("a"))).contains(&1));
        assert!(led_writes(&events_of(&messages, &key("b"))).iter().all(|&v| v == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_markers_bracket_each_iteration() {
        let (sim, mut rx) = Simulator::new(EngineConfig::default());
        let k = key("blink");
        sim.start(k.clone(), &blink_circuit(220.0), BLINK_SKETCH)
            .unwrap();
        time::sleep(Duration::from_millis(2500)).await;
        sim.stop(&k).await;

        let messages = drain(&mut rx);
        let events = events_of(&messages, &k);
        let count = |wanted: LoopPhase| {
            events
                .iter()
                .filter(|b| matches!(b, EventBody::Loop { phase } if *phase == wanted))
                .count()
        };
        let starts = count(LoopPhase::Start);
        let ends = count(LoopPhase::End);
        assert_eq!(starts, 3);
        // The third iteration was cut short by stop.
        assert_eq!(ends, 2);

        let timestamps: Vec<u64> = records_of(&messages, &k)
            .filter_map(|r| r.as_event())
            .filter(|e| matches!(e.body, EventBody::Delay { .. }))
            .map(|e| e.timestamp_ms)
            .collect();
        assert_eq!(&timestamps[..4], &[0, 500, 1000, 1500]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_publishes_cleared_view_and_finish() {
        let (sim, mut rx) = Simulator::new(EngineConfig::default());
        let k = key("v");
        sim.start(k.clone(), &blink_circuit(220.0), BLINK_SKETCH)
            .unwrap();
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sim.state(&k), SessionState::Running);
        sim.stop(&k).await;
        assert_eq!(sim.state(&k), SessionState::Idle);

        let outputs: Vec<SessionOutput> = drain(&mut rx).into_iter().map(|m| m.output).collect();
        assert_eq!(outputs.first(), Some(&SessionOutput::Started));
        let n = outputs.len();
        assert_eq!(outputs[n - 1], SessionOutput::Finished);
        assert!(matches!(&outputs[n - 2], SessionOutput::Circuit(map) if map.is_empty()));
        assert!(outputs
            .iter()
            .any(|o| matches!(o, SessionOutput::Circuit(map) if map.get("led1").is_some_and(|v| *v > 0.8))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_sketch_can_still_be_stopped() {
        let (sim, _rx) = Simulator::new(EngineConfig::default());
        let k = key("spin");
        let sketch = "void setup() {}\nvoid loop() {\n  while (true) {\n    digitalWrite(13, HIGH);\n  }\n}\n";
        sim.start(k.clone(), &blink_circuit(220.0), sketch).unwrap();
        tokio::task::yield_now().await;
        sim.stop(&k).await;
        assert_eq!(sim.state(&k), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let (sim, mut rx) = Simulator::new(EngineConfig::default());
        let k = key("again");
        for _ in 0..2 {
            sim.start(k.clone(), &blink_circuit(220.0), BLINK_SKETCH)
                .unwrap();
            time::sleep(Duration::from_millis(10)).await;
            sim.stop(&k).await;
        }
        let outputs: Vec<SessionOutput> = drain(&mut rx).into_iter().map(|m| m.output).collect();
        let started = outputs.iter().filter(|o| **o == SessionOutput::Started).count();
        let finished = outputs.iter().filter(|o| **o == SessionOutput::Finished).count();
        assert_eq!((started, finished), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_error_is_logged_and_session_ends() {
        let (sim, mut rx) = Simulator::new(EngineConfig::default());
        let k = key("broken");
        let sketch = "void setup() {\n  int x = 1 / 0;\n}\nvoid loop() { delay(10); }\n";
        sim.start(k.clone(), &blink_circuit(220.0), sketch).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sim.state(&k), SessionState::Idle);

        let messages = drain(&mut rx);
        let logs: Vec<&str> = records_of(&messages, &k)
            .filter_map(|r| match r {
                LogRecord::Log { message } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(logs, vec!["setup() error: integer division by zero"]);
        assert!(events_of(&messages, &k).is_empty());
    }
}
