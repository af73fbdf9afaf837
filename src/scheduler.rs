//! # Scheduler
//!
//! Registry of running sessions keyed by [`SessionKey`]. Each entry owns the
//! command queue, cancellation token and task handle of one session; session
//! state itself lives inside the task (see [`crate::session`]).

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::board::Board;
use crate::config::EngineConfig;
use crate::error::{SimError, SimResult};
use crate::event::{EventSink, SessionMessage, SessionOutput};
use crate::session::{Session, SessionCommand, SessionExit, SessionHardware};
use crate::sketch::{compile, Interpreter};
use crate::system_config::CircuitDescription;
use crate::types::{PinNumber, SessionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Spawned, still running `setup`.
    Starting,
    Running,
}

struct SessionHandle {
    generation: u64,
    commands: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    task: JoinHandle<SessionExit>,
}

struct Inner {
    config: EngineConfig,
    sessions: Mutex<HashMap<SessionKey, SessionHandle>>,
    next_generation: AtomicU64,
    output: mpsc::UnboundedSender<SessionMessage>,
}

/// Runs many isolated sessions concurrently. Cheap to clone.
#[derive(Clone)]
pub struct Simulator {
    inner: Arc<Inner>,
}

impl Simulator {
    /// A simulator plus the stream every session reports into.
    pub fn new(config: EngineConfig) -> (Self, mpsc::UnboundedReceiver<SessionMessage>) {
        let (output, rx) = mpsc::unbounded_channel();
        let simulator = Simulator {
            inner: Arc::new(Inner {
                config,
                sessions: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                output,
            }),
        };
        (simulator, rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start a session. A no-op when `key` is already active.
    ///
    /// Oversized circuits or sketches are rejected and a sketch that fails to
    /// compile is reported on the session's stream; in every rejected case
    /// the session stays Idle.
    pub fn start(
        &self,
        key: SessionKey,
        circuit: &CircuitDescription,
        sketch: &str,
    ) -> SimResult<()> {
        if self.inner.sessions.lock().contains_key(&key) {
            debug!("session {} already active", key);
            return Ok(());
        }

        let sink = EventSink::new(key.clone(), self.inner.output.clone());
        let limits = &self.inner.config.limits;

        if circuit.components.len() > limits.max_components {
            let err = SimError::CircuitTooLarge {
                count: circuit.components.len(),
                max: limits.max_components,
            };
            warn!("session {} rejected: {}", key, err);
            sink.log(err.to_string());
            return Err(err);
        }
        if sketch.len() > limits.max_sketch_bytes {
            let err = SimError::SketchTooLarge {
                size: sketch.len(),
                max: limits.max_sketch_bytes,
            };
            warn!("session {} rejected: {}", key, err);
            sink.log(err.to_string());
            return Err(err);
        }

        // Compiling and building the board happen outside the registry lock.
        let program = match compile(sketch) {
            Ok(program) => program,
            Err(e) => {
                warn!("session {} failed to compile: {}", key, e);
                sink.log(format!("User code error: {}", e));
                sink.send(SessionOutput::Finished);
                return Err(e.into());
            }
        };
        let board = Board::new(circuit, sink.clone());

        let mut sessions = self.inner.sessions.lock();
        if sessions.contains_key(&key) {
            debug!("session {} already active", key);
            return Ok(());
        }

        let (commands, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(false));
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        sink.send(SessionOutput::Started);
        let hardware = SessionHardware::new(board, rx, cancel.clone());
        let session = Session::new(
            key.clone(),
            Interpreter::new(program),
            hardware,
            running.clone(),
        );

        let registry = Arc::downgrade(&self.inner);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let exit = session.run().await;
            forget(&registry, &task_key, generation);
            exit
        });

        info!("session {} started", key);
        sessions.insert(
            key,
            SessionHandle {
                generation,
                commands,
                cancel,
                running,
                task,
            },
        );
        Ok(())
    }

    /// Stop a session and wait for its teardown. Idempotent.
    pub async fn stop(&self, key: &SessionKey) {
        let handle = self.inner.sessions.lock().remove(key);
        let Some(handle) = handle else {
            debug!("stop for idle session {}", key);
            return;
        };
        handle.cancel.cancel();
        match handle.task.await {
            Ok(_) => info!("session {} stopped", key),
            Err(e) => error!("session {} task failed: {}", key, e),
        }
    }

    /// Stop every active session.
    pub async fn stop_all(&self) {
        let keys: Vec<SessionKey> = self.inner.sessions.lock().keys().cloned().collect();
        for key in keys {
            self.stop(&key).await;
        }
    }

    /// Queue a property patch for a component of a live session. Returns
    /// false when the session is not active.
    pub fn update_component(
        &self,
        key: &SessionKey,
        component_id: &str,
        patch: Map<String, Value>,
    ) -> bool {
        self.send(
            key,
            SessionCommand::UpdateComponent {
                id: component_id.to_string(),
                patch,
            },
        )
    }

    /// Queue an external analog reading for a live session.
    pub fn set_analog_input(&self, key: &SessionKey, pin: PinNumber, value: f64) -> bool {
        self.send(key, SessionCommand::SetAnalogInput { pin, value })
    }

    pub fn state(&self, key: &SessionKey) -> SessionState {
        match self.inner.sessions.lock().get(key) {
            None => SessionState::Idle,
            Some(handle) if handle.running.load(Ordering::SeqCst) => SessionState::Running,
            Some(_) => SessionState::Starting,
        }
    }

    pub fn active_sessions(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.inner.sessions.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn send(&self, key: &SessionKey, command: SessionCommand) -> bool {
        match self.inner.sessions.lock().get(key) {
            Some(handle) => handle.commands.send(command).is_ok(),
            None => false,
        }
    }
}

/// Drop the registry entry of a task that ended on its own, unless the key
/// has since been taken by a newer session.
fn forget(registry: &Weak<Inner>, key: &SessionKey, generation: u64) {
    let Some(inner) = registry.upgrade() else {
        return;
    };
    let mut sessions = inner.sessions.lock();
    if sessions
        .get(key)
        .is_some_and(|handle| handle.generation == generation)
    {
        sessions.remove(key);
    }
}
