//! # Rusty Circuit Library
//!
//! A breadboard circuit simulator that runs learner sketches against a
//! JSON-described circuit and grades the behavior they produce.
//!
//! This library provides:
//! - Netlist construction and connectivity queries over a circuit description
//! - A per-session pin state machine deriving LED brightness and button reads
//! - A sketch transpiler plus a small interpreter for the resulting host script
//! - A scheduler running many isolated sessions concurrently on tokio
//! - Event normalization and order-insensitive grading of event logs

pub mod board;
pub mod component;
pub mod config;
pub mod connection;
pub mod console;
pub mod error;
pub mod event;
pub mod grading;
pub mod pin;
pub mod scheduler;
pub mod session;
pub mod sketch;
pub mod system_config;
pub mod types;

// Re-export commonly used items for easier importing
pub use board::Board;
pub use component::{Circuit, Component, ComponentKind};
pub use config::EngineConfig;
pub use connection::{Net, Netlist};
pub use error::{ScriptError, SimError, SimResult, StoreError};
pub use event::{Event, EventBody, LogRecord, SessionMessage, SessionOutput};
pub use grading::{grade, GradeRequest, GradeResponse, Grader};
pub use pin::{PinState, PinValue};
pub use scheduler::{SessionState, Simulator};
pub use system_config::{CircuitDescription, ComponentConfig};
pub use types::{NodeId, PinNumber, SessionKey};

/// Install a stderr `tracing` subscriber. `RUST_LOG` takes precedence over
/// `level`. Calling it twice is harmless.
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
