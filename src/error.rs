//! Shared error utilities used across the compilation pipeline.
//!
//! Every stage reports through the same single-line shape,
//! `file:line:col: kind: message`, so diagnostics from the tokenizer,
//! the parser and the lowering pass look identical to downstream
//! tooling. Lowering errors reuse the `parse_error` kind: by that
//! point the source text is gone and only token positions survive.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{file}:{line}:{col}: lex_error: {message}"))]
  Lex {
    file: String,
    line: u32,
    col: u32,
    message: String,
  },
  #[snafu(display("{file}:{line}:{col}: parse_error: {message}"))]
  Parse {
    file: String,
    line: u32,
    col: u32,
    message: String,
  },
}

impl CompileError {
  /// Construct a tokenizer error anchored at a source position.
  pub fn lex(file: impl Into<String>, line: u32, col: u32, message: impl Into<String>) -> Self {
    Self::Lex {
      file: file.into(),
      line,
      col,
      message: message.into(),
    }
  }

  /// Construct a parser (or lowering) error anchored at a source position.
  pub fn parse(file: impl Into<String>, line: u32, col: u32, message: impl Into<String>) -> Self {
    Self::Parse {
      file: file.into(),
      line,
      col,
      message: message.into(),
    }
  }
}
