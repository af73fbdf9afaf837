use async_trait::async_trait;

use crate::error::ScriptError;
use crate::types::PinNumber;

/// The `hw` object a running sketch talks to.
///
/// Every call except `delay` completes synchronously. `delay` is the only
/// suspension point and is where an implementation may apply queued external
/// changes or notice that it has been stopped.
#[async_trait]
pub trait Hardware: Send {
    fn pin_mode(&mut self, pin: PinNumber, mode: i64);

    fn digital_write(&mut self, pin: PinNumber, high: bool);

    /// Logic level, `0` or `1`.
    fn digital_read(&mut self, pin: PinNumber) -> i64;

    fn analog_write(&mut self, pin: PinNumber, value: f64);

    fn analog_read(&mut self, pin: PinNumber) -> f64;

    fn millis(&self) -> u64;

    /// Best-effort text output; never graded.
    fn print(&mut self, text: &str);

    /// Suspend for `ms` milliseconds. Returns [`ScriptError::Halted`] when the
    /// owner stopped while waiting.
    async fn delay(&mut self, ms: u64) -> Result<(), ScriptError>;

    fn is_halted(&self) -> bool;
}
