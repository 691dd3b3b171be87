//! Embedded snippet language: lexer, parser and resource-bounded evaluator.
//!
//! The sandbox evaluates submissions with this interpreter rather than a
//! host-language `eval`, which makes the isolation boundary structural: the
//! language has no filesystem, network, process or reflection surface to
//! escape through. See [`eval::run_program`] for the single entry point.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use eval::{run_program, ExecLimits};
pub use value::Value;
