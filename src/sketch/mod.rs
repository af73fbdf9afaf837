//! # Sketches
//!
//! Learner code arrives as an Arduino-style sketch. [`transpile`] rewrites it
//! into a small host script, [`parser`] compiles that script and
//! [`interpreter`] runs it against a [`Hardware`] implementation.
//!
//! The host script supports:
//!
//! ```text
//! let name = expr, other;            // untyped, mutable bindings
//! fn setup() { ... }  fn loop() { ... }
//! if / else, while, do-while, for (init; cond; step), blocks
//! break; continue; return;
//! = += -= *= /= %=   ++ -- (pre/post)   ?:   || &&   | ^ &
//! == != < <= > >=   + - * / %   unary ! - +
//! hw.<capability>(args)   await hw.delay(ms)
//! ```
//!
//! Integers follow C arithmetic and any float operand promotes the
//! expression. Only `await hw.delay(..)` suspends.

pub mod capability;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod transpile;

pub use capability::Hardware;
pub use interpreter::{Interpreter, Value};
pub use parser::Program;
pub use transpile::{is_sketch, transpile};

use crate::error::ScriptError;

/// Transpile and parse a sketch (or host script) in one step.
pub fn compile(source: &str) -> Result<Program, ScriptError> {
    let script = transpile(source);
    tracing::debug!("host script:\n{}", script);
    Program::parse(&script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_sketch() {
        let program = compile("void setup() {}\nvoid loop() { delay(10); }").unwrap();
        assert!(program.function("setup").is_some());
        assert!(program.function("loop").is_some());
    }

    #[test]
    fn test_unusable_sketch_reports_syntax_error() {
        let err = compile("class Foo { };").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { .. }));
    }
}
