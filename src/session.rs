//! One isolated simulation session.
//!
//! A session is a single tokio task that owns its [`Board`], the compiled
//! sketch and the receiving end of its command queue. Nothing else touches
//! that state: external changes arrive as [`SessionCommand`]s and are applied
//! by the task itself, at a `delay`, before a read, or between iterations.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::board::Board;
use crate::error::ScriptError;
use crate::event::{LoopPhase, SessionOutput};
use crate::sketch::{Hardware, Interpreter};
use crate::types::{PinNumber, SessionKey};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    UpdateComponent {
        id: String,
        patch: Map<String, Value>,
    },
    SetAnalogInput {
        pin: PinNumber,
        value: f64,
    },
}

/// How a session task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionExit {
    Stopped,
    SetupFailed(ScriptError),
}

/// The `hw` object of a running session.
pub struct SessionHardware {
    board: Board,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    cancel: CancellationToken,
}

impl SessionHardware {
    pub fn new(
        board: Board,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        cancel: CancellationToken,
    ) -> Self {
        SessionHardware {
            board,
            commands,
            cancel,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    /// Drain the command queue without waiting.
    pub fn apply_pending(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::UpdateComponent { id, patch } => {
                if !self.board.update_component(&id, &patch) {
                    debug!("update for unknown component {} ignored", id);
                }
            }
            SessionCommand::SetAnalogInput { pin, value } => {
                self.board.set_analog_input(pin, value);
            }
        }
    }
}

#[async_trait]
impl Hardware for SessionHardware {
    fn pin_mode(&mut self, pin: PinNumber, mode: i64) {
        self.board.pin_mode(pin, mode);
    }

    fn digital_write(&mut self, pin: PinNumber, high: bool) {
        self.board.digital_write(pin, high);
    }

    fn digital_read(&mut self, pin: PinNumber) -> i64 {
        self.apply_pending();
        self.board.digital_read(pin).as_level()
    }

    fn analog_write(&mut self, pin: PinNumber, value: f64) {
        self.board.analog_write(pin, value);
    }

    fn analog_read(&mut self, pin: PinNumber) -> f64 {
        self.apply_pending();
        self.board.analog_read(pin)
    }

    fn millis(&self) -> u64 {
        self.board.millis()
    }

    fn print(&mut self, text: &str) {
        self.board.print(text);
    }

    async fn delay(&mut self, ms: u64) -> Result<(), ScriptError> {
        self.board.announce_delay(ms);
        let deadline = Instant::now() + Duration::from_millis(ms);
        let mut open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ScriptError::Halted),
                _ = time::sleep_until(deadline) => return Ok(()),
                command = self.commands.recv(), if open => match command {
                    Some(command) => self.apply(command),
                    None => open = false,
                },
            }
        }
    }

    fn is_halted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A compiled sketch bound to its hardware, ready to run.
pub struct Session {
    key: SessionKey,
    interpreter: Interpreter,
    hardware: SessionHardware,
    running: Arc<AtomicBool>,
}

impl Session {
    pub fn new(
        key: SessionKey,
        interpreter: Interpreter,
        hardware: SessionHardware,
        running: Arc<AtomicBool>,
    ) -> Self {
        Session {
            key,
            interpreter,
            hardware,
            running,
        }
    }

    /// Run `setup` once, then `loop` until cancelled. Always tears the board
    /// down and reports `Finished` before returning.
    pub async fn run(mut self) -> SessionExit {
        let exit = match self.setup().await {
            Ok(()) => {
                self.running.store(true, Ordering::SeqCst);
                info!("session {} running", self.key);
                self.cycle().await;
                SessionExit::Stopped
            }
            Err(ScriptError::Halted) => SessionExit::Stopped,
            Err(e) => {
                warn!("session {} setup failed: {}", self.key, e);
                self.hardware.board().print(format!("setup() error: {}", e));
                SessionExit::SetupFailed(e)
            }
        };

        self.running.store(false, Ordering::SeqCst);
        self.hardware.board_mut().dispose();
        self.hardware.board().sink().send(SessionOutput::Finished);
        info!("session {} finished", self.key);
        exit
    }

    async fn setup(&mut self) -> Result<(), ScriptError> {
        self.interpreter.init_globals(&mut self.hardware).await?;
        self.interpreter.call("setup", &mut self.hardware).await
    }

    async fn cycle(&mut self) {
        loop {
            if self.hardware.is_halted() {
                return;
            }
            self.hardware.apply_pending();

            self.hardware.board().mark_loop(LoopPhase::Start);
            match self.interpreter.call("loop", &mut self.hardware).await {
                Err(ScriptError::Halted) => return,
                Err(e) => {
                    debug!("session {} loop error: {}", self.key, e);
                    self.hardware.board().print(format!("loop() error: {}", e));
                }
                Ok(()) => {}
            }
            self.hardware.board().mark_loop(LoopPhase::End);

            // Re-enter through the runtime rather than recursing.
            tokio::task::yield_now().await;
        }
    }
}
