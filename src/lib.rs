//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be
//! evolved independently:
//! - `tokenizer` performs lexical analysis and produces a flat token
//!   stream with source positions.
//! - `parser` owns all syntactic knowledge and returns the AST arena.
//! - `codegen` lowers the program into NASM x86-64 assembly.
//! - `error` centralises the `file:line:col` diagnostic format shared
//!   by the other modules.

pub mod error;
pub mod parser;
pub mod tokenizer;

mod codegen;

pub use error::{CompileError, CompileResult};

/// Compile source text into an x86-64 NASM listing targeting Linux.
/// `file` is the label used in diagnostics, conventionally the source
/// file's name.
pub fn generate_assembly(source: &str, file: &str) -> CompileResult<String> {
  let tokens = tokenizer::Tokenizer::new(source, file).tokenize()?;
  let ast = parser::parse(tokens, file)?;
  codegen::generate(&ast, file)
}
