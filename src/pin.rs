use std::collections::HashMap;
use tokio::time::{Duration, Instant};

use crate::types::PinNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinValue {
    Low,
    High,
}

impl PinValue {
    pub fn to_str(&self) -> &'static str {
        match self {
            PinValue::Low => "Low",
            PinValue::High => "High",
        }
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            PinValue::High
        } else {
            PinValue::Low
        }
    }

    /// Logic level as the integer a sketch sees from `digitalRead`.
    pub fn as_level(&self) -> i64 {
        match self {
            PinValue::Low => 0,
            PinValue::High => 1,
        }
    }
}

impl std::fmt::Display for PinValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// Board label of a controller pin number: 0→`TX0`, 1→`TX1`, n→`D{n}`.
pub fn resolve_pin_label(pin: PinNumber) -> String {
    match pin {
        0 => "TX0".to_string(),
        1 => "TX1".to_string(),
        n => format!("D{}", n),
    }
}

/// Per-session controller pin state.
///
/// Modes are stored exactly as written and never gate reads or writes.
#[derive(Debug, Clone)]
pub struct PinState {
    started: Instant,
    modes: HashMap<PinNumber, i64>,
    digital: HashMap<PinNumber, PinValue>,
    pwm: HashMap<PinNumber, u8>,
    analog_inputs: HashMap<PinNumber, f64>,
}

impl PinState {
    pub fn new() -> Self {
        PinState {
            started: Instant::now(),
            modes: HashMap::new(),
            digital: HashMap::new(),
            pwm: HashMap::new(),
            analog_inputs: HashMap::new(),
        }
    }

    pub fn set_mode(&mut self, pin: PinNumber, mode: i64) {
        self.modes.insert(pin, mode);
    }

    pub fn mode(&self, pin: PinNumber) -> Option<i64> {
        self.modes.get(&pin).copied()
    }

    pub fn write(&mut self, pin: PinNumber, value: PinValue) {
        self.digital.insert(pin, value);
    }

    pub fn last_written(&self, pin: PinNumber) -> Option<PinValue> {
        self.digital.get(&pin).copied()
    }

    /// Store a PWM duty, clamped to 0..=255.
    pub fn set_duty(&mut self, pin: PinNumber, duty: f64) -> u8 {
        let duty = if duty.is_nan() {
            0
        } else {
            duty.clamp(0.0, 255.0) as u8
        };
        self.pwm.insert(pin, duty);
        duty
    }

    pub fn duty(&self, pin: PinNumber) -> Option<u8> {
        self.pwm.get(&pin).copied()
    }

    pub fn set_analog_input(&mut self, pin: PinNumber, value: f64) {
        self.analog_inputs.insert(pin, value);
    }

    pub fn analog_input(&self, pin: PinNumber) -> f64 {
        self.analog_inputs.get(&pin).copied().unwrap_or(0.0)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn millis(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Forget every written value; the session clock keeps running.
    pub fn clear(&mut self) {
        self.modes.clear();
        self.digital.clear();
        self.pwm.clear();
        self.analog_inputs.clear();
    }
}

impl Default for PinState {
    fn default() -> Self {
        PinState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_labels() {
        assert_eq!(resolve_pin_label(0), "TX0");
        assert_eq!(resolve_pin_label(1), "TX1");
        assert_eq!(resolve_pin_label(2), "D2");
        assert_eq!(resolve_pin_label(13), "D13");
    }

    #[test]
    fn test_pin_value_conversions() {
        assert_eq!(PinValue::from_bool(true), PinValue::High);
        assert_eq!(PinValue::Low.as_level(), 0);
        assert_eq!(format!("{}", PinValue::High), "High");
    }

    #[test]
    fn test_duty_is_clamped() {
        let mut state = PinState::new();
        assert_eq!(state.set_duty(9, 300.0), 255);
        assert_eq!(state.set_duty(9, -4.0), 0);
        assert_eq!(state.set_duty(9, f64::NAN), 0);
        assert_eq!(state.set_duty(9, 128.7), 128);
        assert_eq!(state.duty(9), Some(128));
    }

    #[test]
    fn test_modes_are_stored_verbatim() {
        let mut state = PinState::new();
        state.set_mode(4, 42);
        assert_eq!(state.mode(4), Some(42));
        assert_eq!(state.mode(5), None);

        state.write(4, PinValue::High);
        assert_eq!(state.last_written(4), Some(PinValue::High));
        assert_eq!(state.last_written(5), None);
    }

    #[test]
    fn test_analog_input_defaults_to_zero() {
        let mut state = PinState::new();
        assert_eq!(state.analog_input(0), 0.0);
        state.set_analog_input(0, 512.0);
        assert_eq!(state.analog_input(0), 512.0);
        state.clear();
        assert_eq!(state.analog_input(0), 0.0);
    }
}
