// Interaction script parser

pub mod ast;
pub mod command;
pub mod lexer;
pub mod pipeline;

// Public API re-exports
pub use ast::{Command, Literal, Script};
pub use pipeline::parse_script;
