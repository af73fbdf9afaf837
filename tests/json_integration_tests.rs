//! JSON-Based Integration Tests
//!
//! These tests load the circuit, engine and expected-behavior fixtures from
//! `configs/` and the sketches from `sketches/`, then run complete sessions.

mod mocks;

use mocks::*;
use rusty_circuit::event::{LogRecord, SessionOutput};
use rusty_circuit::grading::{grade, GradeRequest};
use rusty_circuit::sketch::{is_sketch, transpile};
use rusty_circuit::system_config::CircuitDescription;
use rusty_circuit::{EngineConfig, SessionKey, SimError, Simulator};
use serde_json::{json, Map, Value};
use std::fs;
use tokio::time::{self, Duration};

fn fixture(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("missing fixture {}: {}", path, e))
}

#[cfg(test)]
mod json_fixture_tests {
    use super::*;

    #[test]
    fn test_circuit_fixtures_load() {
        let blink = CircuitDescription::from_json_file("configs/blink_circuit.json").unwrap();
        assert_eq!(blink.components.len(), 4);
        assert_eq!(blink.wires.len(), 3);

        let button = CircuitDescription::from_json_file("configs/button_circuit.json").unwrap();
        assert_eq!(button.components.len(), 5);
        assert_eq!(button.wires.len(), 5);
    }

    #[test]
    fn test_engine_config_fixture() {
        let config = EngineConfig::from_json_file("configs/engine.json").unwrap();
        assert_eq!(config.limits.max_components, 200);
        assert_eq!(config.limits.max_sketch_bytes, 65536);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.normalizer.min_events_for_period, 12);
    }

    #[test]
    fn test_invalid_files() {
        assert!(matches!(
            CircuitDescription::from_json_file("configs/non_existent.json"),
            Err(SimError::Io(_))
        ));
        assert!(matches!(
            CircuitDescription::from_json_str("{\"components\": json}"),
            Err(SimError::Json(_))
        ));
    }

    #[test]
    fn test_sketch_fixtures_transpile() {
        for path in ["sketches/blink.ino", "sketches/button.ino"] {
            let source = fixture(path);
            assert!(is_sketch(&source), "{} should look like a sketch", path);
            let script = transpile(&source);
            assert!(script.contains("fn setup()"), "{}", script);
            assert!(script.contains("fn loop()"), "{}", script);
            assert!(rusty_circuit::sketch::compile(&source).is_ok(), "{}", script);
        }
    }
}

#[cfg(test)]
mod json_session_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_blink_fixture_matches_expected_behavior() {
        let circuit = CircuitDescription::from_json_file("configs/blink_circuit.json").unwrap();
        let config = EngineConfig::from_json_file("configs/engine.json").unwrap();
        let expected: Value = serde_json::from_str(&fixture("configs/blink_expected.json")).unwrap();

        let (sim, mut rx) = Simulator::new(config.clone());
        let key = SessionKey::from("fixture");
        sim.start(key.clone(), &circuit, &fixture("sketches/blink.ino"))
            .unwrap();
        time::sleep(Duration::from_millis(3200)).await;
        sim.stop(&key).await;

        let submitted = raw_log(&drain(&mut rx), &key);
        let response = grade(
            &GradeRequest {
                expected_canonical: expected,
                submitted_raw: submitted,
            },
            &config,
        );
        assert!(response.pass, "{:?}", response.reason);
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_fixture_reacts_and_prints() {
        let circuit = CircuitDescription::from_json_file("configs/button_circuit.json").unwrap();
        let (sim, mut rx) = Simulator::new(EngineConfig::default());
        let key = SessionKey::from("button");
        sim.start(key.clone(), &circuit, &fixture("sketches/button.ino"))
            .unwrap();

        time::sleep(Duration::from_millis(120)).await;
        let mut patch = Map::new();
        patch.insert("pressed".into(), json!(true));
        assert!(sim.update_component(&key, "b1", patch));
        time::sleep(Duration::from_millis(120)).await;
        sim.stop(&key).await;

        let messages = drain(&mut rx);
        let logs: Vec<String> = records_of(&messages, &key)
            .filter_map(|r| match r {
                LogRecord::Log { message } => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(logs, vec!["pressed\n".to_string()]);

        let brightest = messages
            .iter()
            .filter_map(|m| match &m.output {
                SessionOutput::Circuit(map) => map.get("led1").copied(),
                _ => None,
            })
            .fold(0.0, f64::max);
        assert_eq!(brightest, 0.5);
    }

    #[tokio::test]
    async fn test_config_limits_apply_to_fixtures() {
        let circuit = CircuitDescription::from_json_file("configs/blink_circuit.json").unwrap();
        let mut config = EngineConfig::from_json_file("configs/engine.json").unwrap();
        config.limits.max_components = 3;

        let (sim, mut rx) = Simulator::new(config);
        let key = SessionKey::from("big");
        let result = sim.start(key.clone(), &circuit, &fixture("sketches/blink.ino"));
        assert!(matches!(result, Err(SimError::CircuitTooLarge { count: 4, max: 3 })));

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0].output,
            SessionOutput::Record(LogRecord::Log { message }) if message.contains("limit is 3")
        ));
    }
}
