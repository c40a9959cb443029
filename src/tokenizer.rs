//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about semantics beyond recognising
//! keywords, operators and numeric literals. Compound assignment
//! operators are matched before their single-character prefixes, and
//! every token records the 1-based line/column of its first character
//! so later stages can anchor diagnostics.

use crate::error::{CompileError, CompileResult};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Exit,
  IntLit,
  Semi,
  OpenParen,
  CloseParen,
  Ident,
  Let,
  Eq,
  Plus,
  Star,
  Minus,
  FSlash,
  PlusEq,
  StarEq,
  MinusEq,
  FSlashEq,
  OpenCurly,
  CloseCurly,
  If,
  Else,
}

impl TokenKind {
  /// Binary-operator precedence table: additive below multiplicative.
  /// `None` for anything that cannot continue an expression.
  pub fn bin_prec(self) -> Option<u8> {
    match self {
      TokenKind::Plus | TokenKind::Minus => Some(0),
      TokenKind::Star | TokenKind::FSlash => Some(1),
      _ => None,
    }
  }
}

/// A lexed token. `value` carries the text of identifiers and integer
/// literals; every other kind is payload-free.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub line: u32,
  pub col: u32,
  pub value: Option<String>,
}

impl Token {
  pub fn new(kind: TokenKind, line: u32, col: u32, value: Option<String>) -> Self {
    Self {
      kind,
      line,
      col,
      value,
    }
  }
}

/// Cursor over the source text with line/column accounting.
pub struct Tokenizer<'a> {
  src: &'a str,
  file: &'a str,
  index: usize,
  line: u32,
  col: u32,
}

impl<'a> Tokenizer<'a> {
  /// `file` is a label used only in diagnostics.
  pub fn new(source: &'a str, file: &'a str) -> Self {
    Self {
      src: source,
      file,
      index: 0,
      line: 1,
      col: 1,
    }
  }

  /// Lex the whole input into a flat token vector; empty on empty input.
  pub fn tokenize(mut self) -> CompileResult<Vec<Token>> {
    let mut tokens = Vec::new();

    while let Some(c) = self.peek(0) {
      let (line, col) = (self.line, self.col);

      if c.is_ascii_alphabetic() {
        let mut buf = String::new();
        buf.push(self.consume() as char);
        while matches!(self.peek(0), Some(c) if c.is_ascii_alphanumeric()) {
          buf.push(self.consume() as char);
        }
        let kind = match buf.as_str() {
          "exit" => TokenKind::Exit,
          "let" => TokenKind::Let,
          "if" => TokenKind::If,
          "else" => TokenKind::Else,
          _ => TokenKind::Ident,
        };
        let value = (kind == TokenKind::Ident).then_some(buf);
        tokens.push(Token::new(kind, line, col, value));
        continue;
      }

      if c.is_ascii_digit() {
        let mut buf = String::new();
        buf.push(self.consume() as char);
        while matches!(self.peek(0), Some(c) if c.is_ascii_digit()) {
          buf.push(self.consume() as char);
        }
        tokens.push(Token::new(TokenKind::IntLit, line, col, Some(buf)));
        continue;
      }

      if c == b'/' && self.peek(1) == Some(b'/') {
        while matches!(self.peek(0), Some(c) if c != b'\n') {
          self.consume();
        }
        continue;
      }

      if c == b'/' && self.peek(1) == Some(b'*') {
        self.consume();
        self.consume();
        // does not nest; an unterminated comment simply runs to EOF
        while let Some(c) = self.peek(0) {
          if c == b'*' && self.peek(1) == Some(b'/') {
            self.consume();
            self.consume();
            break;
          }
          self.consume();
        }
        continue;
      }

      if c.is_ascii_whitespace() {
        self.consume();
        continue;
      }

      let compound = self.peek(1) == Some(b'=');
      let kind = match c {
        b'+' if compound => TokenKind::PlusEq,
        b'-' if compound => TokenKind::MinusEq,
        b'*' if compound => TokenKind::StarEq,
        b'/' if compound => TokenKind::FSlashEq,
        b'+' => TokenKind::Plus,
        b'-' => TokenKind::Minus,
        b'*' => TokenKind::Star,
        b'/' => TokenKind::FSlash,
        b'(' => TokenKind::OpenParen,
        b')' => TokenKind::CloseParen,
        b'{' => TokenKind::OpenCurly,
        b'}' => TokenKind::CloseCurly,
        b';' => TokenKind::Semi,
        b'=' => TokenKind::Eq,
        _ => {
          let offending = self.src[self.index..].chars().next().unwrap_or('\0');
          return Err(CompileError::lex(
            self.file,
            line,
            col,
            format!("Unexpected character '{offending}'"),
          ));
        }
      };
      self.consume();
      if matches!(
        kind,
        TokenKind::PlusEq | TokenKind::MinusEq | TokenKind::StarEq | TokenKind::FSlashEq
      ) {
        self.consume();
      }
      tokens.push(Token::new(kind, line, col, None));
    }

    Ok(tokens)
  }

  fn peek(&self, offset: usize) -> Option<u8> {
    self.src.as_bytes().get(self.index + offset).copied()
  }

  fn consume(&mut self) -> u8 {
    let c = self.src.as_bytes()[self.index];
    self.index += 1;
    if c == b'\n' {
      self.line += 1;
      self.col = 1;
    } else {
      self.col += 1;
    }
    c
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(source: &str) -> Vec<TokenKind> {
    Tokenizer::new(source, "test.l")
      .tokenize()
      .unwrap()
      .into_iter()
      .map(|token| token.kind)
      .collect()
  }

  #[test]
  fn lexes_a_let_statement() {
    let tokens = Tokenizer::new("let x = 5;", "test.l").tokenize().unwrap();
    let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
      kinds,
      [
        TokenKind::Let,
        TokenKind::Ident,
        TokenKind::Eq,
        TokenKind::IntLit,
        TokenKind::Semi,
      ]
    );
    assert_eq!(tokens[1].value.as_deref(), Some("x"));
    assert_eq!(tokens[3].value.as_deref(), Some("5"));
    assert!(tokens[0].value.is_none());
  }

  #[test]
  fn keywords_are_matched_after_the_full_identifier() {
    assert_eq!(kinds("exit"), [TokenKind::Exit]);
    assert_eq!(kinds("exits"), [TokenKind::Ident]);
    assert_eq!(kinds("iff"), [TokenKind::Ident]);
    assert_eq!(kinds("else"), [TokenKind::Else]);
  }

  #[test]
  fn compound_operators_win_over_their_prefixes() {
    assert_eq!(
      kinds("+ += - -= * *= / /= ="),
      [
        TokenKind::Plus,
        TokenKind::PlusEq,
        TokenKind::Minus,
        TokenKind::MinusEq,
        TokenKind::Star,
        TokenKind::StarEq,
        TokenKind::FSlash,
        TokenKind::FSlashEq,
        TokenKind::Eq,
      ]
    );
  }

  #[test]
  fn positions_are_one_based_and_track_newlines() {
    let tokens = Tokenizer::new("let x = 5;\n  exit(x);", "test.l")
      .tokenize()
      .unwrap();
    let x = &tokens[1];
    assert_eq!((x.line, x.col), (1, 5));
    let exit = tokens.iter().find(|t| t.kind == TokenKind::Exit).unwrap();
    assert_eq!((exit.line, exit.col), (2, 3));
  }

  #[test]
  fn comments_are_skipped() {
    assert_eq!(
      kinds("exit(1); // trailing\n/* block\nspanning lines */ exit(2);"),
      [
        TokenKind::Exit,
        TokenKind::OpenParen,
        TokenKind::IntLit,
        TokenKind::CloseParen,
        TokenKind::Semi,
        TokenKind::Exit,
        TokenKind::OpenParen,
        TokenKind::IntLit,
        TokenKind::CloseParen,
        TokenKind::Semi,
      ]
    );
  }

  #[test]
  fn unterminated_block_comment_is_tolerated_at_eof() {
    assert_eq!(kinds("exit /* never closed"), [TokenKind::Exit]);
  }

  #[test]
  fn empty_input_yields_no_tokens() {
    assert!(kinds("").is_empty());
  }

  #[test]
  fn unexpected_character_is_a_lex_error() {
    let err = Tokenizer::new("exit(0)@;", "test.l").tokenize().unwrap_err();
    assert_eq!(
      err.to_string(),
      "test.l:1:8: lex_error: Unexpected character '@'"
    );
  }
}
