//! # Board
//!
//! The per-session pin state machine behind every capability a sketch can
//! call. Writes are resolved to a controller net, flooded through the netlist
//! and turned into LED intensities; reads look for pressed buttons bridging
//! the pin's net to a supply rail or to ground.

use serde_json::{Map, Value};

use crate::component::{Circuit, ComponentKind};
use crate::connection::{Net, Netlist};
use crate::event::{EventBody, EventSink, IntensityMap, LoopPhase};
use crate::pin::{resolve_pin_label, PinState, PinValue};
use crate::system_config::CircuitDescription;
use crate::types::{NodeId, PinNumber};

/// Brightness for a series resistance: `clamp(1 / (1 + R/1000), 0, 1)`.
pub fn brightness_factor(resistance: f64) -> f64 {
    let factor = 1.0 / (1.0 + resistance / 1000.0);
    if factor.is_nan() {
        0.0
    } else {
        factor.clamp(0.0, 1.0)
    }
}

/// Duty above which an `analogWrite` counts as driving the pin high.
pub const PWM_HIGH_THRESHOLD: f64 = 127.0;

pub struct Board {
    circuit: Circuit,
    netlist: Netlist,
    pins: PinState,
    intensities: IntensityMap,
    sink: EventSink,
}

impl Board {
    pub fn new(description: &CircuitDescription, sink: EventSink) -> Self {
        let circuit = Circuit::new(description);
        let netlist = Netlist::build(&circuit);
        Board {
            circuit,
            netlist,
            pins: PinState::new(),
            intensities: IntensityMap::new(),
            sink,
        }
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn netlist(&self) -> &Netlist {
        &self.netlist
    }

    pub fn pins(&self) -> &PinState {
        &self.pins
    }

    pub fn intensities(&self) -> &IntensityMap {
        &self.intensities
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn millis(&self) -> u64 {
        self.pins.millis()
    }

    pub fn pin_mode(&mut self, pin: PinNumber, mode: i64) {
        self.pins.set_mode(pin, mode);
    }

    pub fn digital_write(&mut self, pin: PinNumber, high: bool) {
        let value = PinValue::from_bool(high);
        self.pins.write(pin, value);
        self.drive_net(pin, high);
        self.sink.event(
            EventBody::DigitalWrite {
                pin: resolve_pin_label(pin),
                value: value.as_level() as u8,
            },
            self.millis(),
        );
    }

    /// PWM is a binary gate: duty above half drives the net high, and the LED
    /// intensity comes from the resistor factor alone.
    pub fn analog_write(&mut self, pin: PinNumber, value: f64) {
        let level = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 255.0)
        };
        self.pins.set_duty(pin, level);
        self.drive_net(pin, level > PWM_HIGH_THRESHOLD);
    }

    /// Read a controller pin.
    ///
    /// A pressed button whose far side reaches a supply rail reads HIGH, one
    /// reaching ground reads LOW (supply wins when both do). Otherwise the pin
    /// floats HIGH like an input with a pull-up; the last written value is
    /// never consulted.
    pub fn digital_read(&self, pin: PinNumber) -> PinValue {
        let Some(start) = self.controller_node(pin) else {
            return PinValue::High;
        };
        let net = self.netlist.flood(&start);

        let mut grounded = false;
        let mut supplied = false;
        for id in net.component_ids() {
            let Some(component) = self.circuit.get(id) else {
                continue;
            };
            if component.kind != ComponentKind::Button || !component.is_pressed() {
                continue;
            }
            for pin_name in component.pins() {
                let side = self.netlist.flood(&NodeId::new(id, pin_name));
                grounded |= side.has_ground(&self.circuit);
                supplied |= side.has_vcc();
            }
        }

        if supplied {
            PinValue::High
        } else if grounded {
            PinValue::Low
        } else {
            PinValue::High
        }
    }

    pub fn analog_read(&self, pin: PinNumber) -> f64 {
        self.pins.analog_input(pin)
    }

    pub fn set_analog_input(&mut self, pin: PinNumber, value: f64) {
        self.pins.set_analog_input(pin, value);
    }

    pub fn announce_delay(&self, ms: u64) {
        self.sink.event(EventBody::Delay { ms }, self.millis());
    }

    pub fn mark_loop(&self, phase: LoopPhase) {
        self.sink.event(EventBody::Loop { phase }, self.millis());
    }

    pub fn print(&self, text: impl Into<String>) {
        self.sink.log(text);
    }

    /// Merge a property patch into a live component. Unknown ids are ignored.
    /// Returns whether the component exists.
    pub fn update_component(&mut self, id: &str, patch: &Map<String, Value>) -> bool {
        let Some(component) = self.circuit.get_mut(id) else {
            return false;
        };
        component.apply_patch(patch);

        if component.kind == ComponentKind::Button {
            if let Some(pressed) = patch.get("pressed") {
                let pressed = crate::component::truthy(pressed);
                self.sink.event(
                    EventBody::Button {
                        id: id.to_string(),
                        pressed,
                    },
                    self.millis(),
                );
            }
        }
        true
    }

    /// Clear visual state and tell observers. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.intensities.clear();
        self.pins.clear();
        self.sink.circuit(IntensityMap::new());
    }

    fn controller_node(&self, pin: PinNumber) -> Option<NodeId> {
        self.circuit
            .controller_id()
            .map(|controller| NodeId::new(controller, resolve_pin_label(pin)))
    }

    /// Recompute every LED touching the net driven by `pin`.
    fn drive_net(&mut self, pin: PinNumber, high: bool) {
        let Some(start) = self.controller_node(pin) else {
            return;
        };
        let net = self.netlist.flood(&start);
        let factor = brightness_factor(self.max_resistance(&net));

        let mut affected = Vec::new();
        for id in net.component_ids() {
            let Some(component) = self.circuit.get(id) else {
                continue;
            };
            if component.kind != ComponentKind::Led {
                continue;
            }
            let cathode = self
                .netlist
                .flood(&NodeId::new(id, component.cathode_pin()));
            let lit = high && cathode.has_ground(&self.circuit);
            let intensity = if lit { factor } else { 0.0 };
            affected.push((id.to_string(), intensity));
        }

        for (id, intensity) in &affected {
            self.intensities.insert(id.clone(), *intensity);
            self.sink.event(
                EventBody::Led {
                    id: id.clone(),
                    on: *intensity > 0.0,
                    brightness: *intensity,
                },
                self.millis(),
            );
        }
        self.sink.circuit(self.intensities.clone());
    }

    /// Largest declared resistance among resistors in the driving net.
    fn max_resistance(&self, net: &Net) -> f64 {
        net.component_ids()
            .into_iter()
            .filter_map(|id| self.circuit.get(id))
            .filter(|c| c.kind == ComponentKind::Resistor)
            .map(|c| c.resistance())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LogRecord, SessionOutput};
    use crate::system_config::ComponentConfig;
    use serde_json::json;

    fn led_circuit(resistance: Option<f64>) -> CircuitDescription {
        let mut description = CircuitDescription::default()
            .component(ComponentConfig::new("uno", "arduino").with_pins(&["D13", "GND"]))
            .component(ComponentConfig::new("led1", "led").with_pins(&["anode", "cathode"]))
            .component(ComponentConfig::new("gnd", "ground").with_pins(&["GND"]))
            .wire(("led1", "cathode"), ("gnd", "GND"));
        match resistance {
            Some(r) => {
                description = description
                    .component(
                        ComponentConfig::new("r1", "resistor")
                            .with_pins(&["a", "b"])
                            .with_property("resistance", json!(r)),
                    )
                    .wire(("uno", "D13"), ("r1", "a"))
                    .wire(("r1", "b"), ("led1", "anode"));
            }
            None => {
                description = description.wire(("uno", "D13"), ("led1", "anode"));
            }
        }
        description
    }

    fn board(description: &CircuitDescription) -> Board {
        let (sink, _rx) = EventSink::channel("test".into());
        Board::new(description, sink)
    }

    #[test]
    fn test_brightness_factor() {
        assert_eq!(brightness_factor(0.0), 1.0);
        assert_eq!(brightness_factor(1000.0), 0.5);
        assert!(brightness_factor(-2000.0) <= 1.0);
    }

    #[test]
    fn test_drive_high_through_resistor() {
        let mut board = board(&led_circuit(Some(1000.0)));
        board.digital_write(13, true);
        assert_eq!(board.intensities()["led1"], 0.5);

        board.digital_write(13, false);
        assert_eq!(board.intensities()["led1"], 0.0);
    }

    #[test]
    fn test_drive_high_without_resistor() {
        let mut board = board(&led_circuit(None));
        board.digital_write(13, true);
        assert_eq!(board.intensities()["led1"], 1.0);
    }

    #[test]
    fn test_events_emitted_on_write() {
        let (sink, mut rx) = EventSink::channel("test".into());
        let mut board = Board::new(&led_circuit(Some(0.0)), sink);
        board.digital_write(13, true);

        let mut names = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let SessionOutput::Record(LogRecord::Event(event)) = message.output {
                names.push(event.body);
            }
        }
        assert_eq!(
            names,
            vec![
                EventBody::Led {
                    id: "led1".to_string(),
                    on: true,
                    brightness: 1.0
                },
                EventBody::DigitalWrite {
                    pin: "D13".to_string(),
                    value: 1
                },
            ]
        );
    }

    #[test]
    fn test_analog_write_is_binary_gate() {
        let mut board = board(&led_circuit(Some(1000.0)));
        board.analog_write(13, 200.0);
        assert_eq!(board.intensities()["led1"], 0.5);
        assert_eq!(board.pins().duty(13), Some(200));

        board.analog_write(13, 127.0);
        assert_eq!(board.intensities()["led1"], 0.0);
    }

    #[test]
    fn test_read_defaults_high_even_after_low_write() {
        let mut board = board(&led_circuit(None));
        board.digital_write(13, false);
        assert_eq!(board.digital_read(13), PinValue::High);
        assert_eq!(board.digital_read(7), PinValue::High);
    }

    #[test]
    fn test_no_controller_is_tolerated() {
        let description = CircuitDescription::default()
            .component(ComponentConfig::new("led1", "led"));
        let mut board = board(&description);
        board.digital_write(3, true);
        assert!(board.intensities().is_empty());
        assert_eq!(board.digital_read(3), PinValue::High);
    }

    #[test]
    fn test_update_unknown_component_is_noop() {
        let mut board = board(&led_circuit(None));
        assert!(!board.update_component("ghost", &Map::new()));
    }

    #[test]
    fn test_dispose_clears_intensities() {
        let mut board = board(&led_circuit(None));
        board.digital_write(13, true);
        board.dispose();
        assert!(board.intensities().is_empty());
        board.dispose();
        assert!(board.intensities().is_empty());
    }
}
