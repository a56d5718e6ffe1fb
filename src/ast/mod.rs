//! Abstract Syntax Tree types for shell input.
//!
//! Architecture:
//!   Input → Lexer → Parser → AST → Expander → Executor

pub mod types;

pub use types::*;
