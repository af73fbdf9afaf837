use thiserror::Error;

/// Failures raised while compiling or running a sketch.
///
/// None of these ever escape a session task: the scheduler turns them into
/// log records on the session's output stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("{0} is not defined")]
    UndefinedVariable(String),

    #[error("hw.{0} is not a capability")]
    UnknownCapability(String),

    #[error("hw.{name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("hw.delay must be awaited")]
    NotAwaited,

    #[error("{0} is not callable")]
    NotCallable(String),

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("type error: {0}")]
    Type(String),

    /// The session was stopped while the sketch was running.
    #[error("session halted")]
    Halted,
}

/// Errors surfaced by the simulation engine itself.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("circuit has {count} components, the limit is {max}")]
    CircuitTooLarge { count: usize, max: usize },

    #[error("sketch is {size} bytes, the limit is {max}")]
    SketchTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("script error: {0}")]
    Script(#[from] ScriptError),
}

/// Errors from the grading audit store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),
}

pub type SimResult<T> = Result<T, SimError>;
