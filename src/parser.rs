//! Recursive-descent parser producing the statement AST.
//!
//! Expressions descend through a single precedence-climbing routine;
//! statements are dispatched on one to three tokens of lookahead. All
//! nodes live in a flat arena owned by the [`Ast`] value the parse
//! returns: children are referenced by copyable indices, nothing is
//! freed individually, and the whole region is dropped as one unit
//! once code generation is done with it.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind};

/// Arithmetic operators carried by a binary expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
}

/// Assignment statement flavours, `x = e` and the compound forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
  Assign,
  AddAssign,
  SubAssign,
  MulAssign,
  DivAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfPredId(usize);

/// Leaf level of the expression grammar. Identifier and literal terms
/// keep their token so positions survive into lowering.
#[derive(Debug, Clone)]
pub enum Term {
  IntLit(Token),
  Ident(Token),
  Paren(ExprId),
}

#[derive(Debug, Clone)]
pub enum Expr {
  Term(Term),
  Bin { op: BinOp, lhs: ExprId, rhs: ExprId },
}

#[derive(Debug, Clone)]
pub enum Stmt {
  Exit(ExprId),
  Let { name: Token, value: ExprId },
  Set { target: Token, op: SetOp, value: ExprId },
  Scope(ScopeId),
  If {
    cond: ExprId,
    body: ScopeId,
    pred: Option<IfPredId>,
  },
}

/// Trailing clause of an `if`: either another conditional arm or the
/// final `else`. Recursive so `else if … else if … else` chains nest.
#[derive(Debug, Clone)]
pub enum IfPred {
  ElseIf {
    cond: ExprId,
    body: ScopeId,
    pred: Option<IfPredId>,
  },
  Else(ScopeId),
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
  pub stmts: Vec<StmtId>,
}

// Node vectors only ever grow during a parse; reserving up front keeps
// allocation off the hot path for any realistic source file.
const ARENA_RESERVE: usize = 1 << 16;

/// Flat arena owning every node of one compilation, plus the ordered
/// list of top-level statements.
#[derive(Debug)]
pub struct Ast {
  exprs: Vec<Expr>,
  stmts: Vec<Stmt>,
  scopes: Vec<Scope>,
  preds: Vec<IfPred>,
  root: Vec<StmtId>,
}

impl Ast {
  fn new() -> Self {
    Self {
      exprs: Vec::with_capacity(ARENA_RESERVE),
      stmts: Vec::with_capacity(ARENA_RESERVE / 4),
      scopes: Vec::with_capacity(ARENA_RESERVE / 16),
      preds: Vec::with_capacity(ARENA_RESERVE / 16),
      root: Vec::new(),
    }
  }

  pub fn root(&self) -> &[StmtId] {
    &self.root
  }

  pub fn expr(&self, id: ExprId) -> &Expr {
    &self.exprs[id.0]
  }

  pub fn stmt(&self, id: StmtId) -> &Stmt {
    &self.stmts[id.0]
  }

  pub fn scope(&self, id: ScopeId) -> &Scope {
    &self.scopes[id.0]
  }

  pub fn pred(&self, id: IfPredId) -> &IfPred {
    &self.preds[id.0]
  }

  fn alloc_expr(&mut self, expr: Expr) -> ExprId {
    self.exprs.push(expr);
    ExprId(self.exprs.len() - 1)
  }

  fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
    self.stmts.push(stmt);
    StmtId(self.stmts.len() - 1)
  }

  fn alloc_scope(&mut self, scope: Scope) -> ScopeId {
    self.scopes.push(scope);
    ScopeId(self.scopes.len() - 1)
  }

  fn alloc_pred(&mut self, pred: IfPred) -> IfPredId {
    self.preds.push(pred);
    IfPredId(self.preds.len() - 1)
  }
}

/// Parse a token stream into an owned AST arena. Any position where no
/// statement form matches is a fatal `Invalid statement`.
pub fn parse(tokens: Vec<Token>, file: &str) -> CompileResult<Ast> {
  let mut parser = Parser {
    tokens,
    file,
    index: 0,
    ast: Ast::new(),
  };

  while parser.peek(0).is_some() {
    match parser.parse_stmt()? {
      Some(stmt) => parser.ast.root.push(stmt),
      None => return Err(parser.error("Invalid statement")),
    }
  }

  Ok(parser.ast)
}

struct Parser<'a> {
  tokens: Vec<Token>,
  file: &'a str,
  index: usize,
  ast: Ast,
}

impl Parser<'_> {
  // ----- Statement parsing -----

  /// One statement, or `None` when the next token cannot start one
  /// (the scope loop uses that to stop at `}`).
  fn parse_stmt(&mut self) -> CompileResult<Option<StmtId>> {
    let Some(first) = self.peek_kind(0) else {
      return Ok(None);
    };

    match first {
      TokenKind::Exit if self.peek_kind(1) == Some(TokenKind::OpenParen) => {
        self.consume();
        self.consume();
        let expr = self
          .parse_expr(0)?
          .ok_or_else(|| self.error("Invalid expression"))?;
        self.expect(TokenKind::CloseParen, "Expected ')'")?;
        self.expect(TokenKind::Semi, "Expected ';'")?;
        Ok(Some(self.ast.alloc_stmt(Stmt::Exit(expr))))
      }
      TokenKind::Let
        if self.peek_kind(1) == Some(TokenKind::Ident)
          && self.peek_kind(2) == Some(TokenKind::Eq) =>
      {
        self.consume();
        let name = self.consume();
        self.consume();
        let value = self
          .parse_expr(0)?
          .ok_or_else(|| self.error_at_line(name.line, "Invalid expression"))?;
        self.expect_at_line(TokenKind::Semi, name.line, "Expected ';'")?;
        Ok(Some(self.ast.alloc_stmt(Stmt::Let { name, value })))
      }
      TokenKind::Ident if self.peek(1).is_some() => {
        let target = self.consume();
        let op = match self.peek_kind(0) {
          Some(TokenKind::Eq) => SetOp::Assign,
          Some(TokenKind::PlusEq) => SetOp::AddAssign,
          Some(TokenKind::MinusEq) => SetOp::SubAssign,
          Some(TokenKind::StarEq) => SetOp::MulAssign,
          Some(TokenKind::FSlashEq) => SetOp::DivAssign,
          _ => return Err(self.error("Invalid set statement")),
        };
        self.consume();
        let value = self
          .parse_expr(0)?
          .ok_or_else(|| self.error_at_line(target.line, "Invalid expression"))?;
        self.expect(TokenKind::Semi, "Expected ';'")?;
        Ok(Some(self.ast.alloc_stmt(Stmt::Set { target, op, value })))
      }
      TokenKind::OpenCurly => {
        let scope = self
          .parse_scope()?
          .ok_or_else(|| self.error("Invalid scope"))?;
        Ok(Some(self.ast.alloc_stmt(Stmt::Scope(scope))))
      }
      TokenKind::If => {
        let if_tok = self.consume();
        self.expect_at_line(TokenKind::OpenParen, if_tok.line, "Expected '('")?;
        let cond = self
          .parse_expr(0)?
          .ok_or_else(|| self.error_at_line(if_tok.line, "Invalid expression"))?;
        self.expect_at_line(TokenKind::CloseParen, if_tok.line, "Expected ')'")?;
        let body = self
          .parse_scope()?
          .ok_or_else(|| self.error("Invalid scope"))?;
        let pred = self.parse_if_pred()?;
        Ok(Some(self.ast.alloc_stmt(Stmt::If { cond, body, pred })))
      }
      _ => Ok(None),
    }
  }

  /// `{ Stmt* }`, or `None` when the cursor is not on `{`.
  fn parse_scope(&mut self) -> CompileResult<Option<ScopeId>> {
    if self.try_consume(TokenKind::OpenCurly).is_none() {
      return Ok(None);
    }
    let mut stmts = Vec::new();
    while let Some(stmt) = self.parse_stmt()? {
      stmts.push(stmt);
    }
    self.expect(TokenKind::CloseCurly, "Expected '}'")?;
    Ok(Some(self.ast.alloc_scope(Scope { stmts })))
  }

  /// Trailing `else if` / `else` chain of an `if` statement.
  fn parse_if_pred(&mut self) -> CompileResult<Option<IfPredId>> {
    if self.try_consume(TokenKind::Else).is_none() {
      return Ok(None);
    }

    if self.try_consume(TokenKind::If).is_some() {
      self.expect(TokenKind::OpenParen, "Expected '('")?;
      let cond = self
        .parse_expr(0)?
        .ok_or_else(|| self.error("Expected expression"))?;
      self.expect(TokenKind::CloseParen, "Expected ')'")?;
      let body = self
        .parse_scope()?
        .ok_or_else(|| self.error("Invalid scope"))?;
      let pred = self.parse_if_pred()?;
      return Ok(Some(self.ast.alloc_pred(IfPred::ElseIf { cond, body, pred })));
    }

    let body = self
      .parse_scope()?
      .ok_or_else(|| self.error("Invalid scope"))?;
    Ok(Some(self.ast.alloc_pred(IfPred::Else(body))))
  }

  // ----- Expression parsing -----

  /// Precedence climbing: `min_prec` gates which operators may extend
  /// the left-hand side, and the `prec + 1` on the recursive call makes
  /// every operator left-associative.
  fn parse_expr(&mut self, min_prec: u8) -> CompileResult<Option<ExprId>> {
    let Some(mut lhs) = self.parse_term()? else {
      return Ok(None);
    };

    loop {
      let Some(prec) = self.peek_kind(0).and_then(TokenKind::bin_prec) else {
        break;
      };
      if prec < min_prec {
        break;
      }
      let op_tok = self.consume();
      let op = match op_tok.kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::FSlash => BinOp::Div,
        _ => unreachable!("bin_prec only admits arithmetic operators"),
      };
      let rhs = self
        .parse_expr(prec + 1)?
        .ok_or_else(|| self.error_at_line(op_tok.line, "Unable to parse expression"))?;
      lhs = self.ast.alloc_expr(Expr::Bin { op, lhs, rhs });
    }

    Ok(Some(lhs))
  }

  /// Integer literal, identifier, or parenthesised expression.
  fn parse_term(&mut self) -> CompileResult<Option<ExprId>> {
    if let Some(int_lit) = self.try_consume(TokenKind::IntLit) {
      return Ok(Some(self.ast.alloc_expr(Expr::Term(Term::IntLit(int_lit)))));
    }
    if let Some(ident) = self.try_consume(TokenKind::Ident) {
      return Ok(Some(self.ast.alloc_expr(Expr::Term(Term::Ident(ident)))));
    }
    if let Some(open_paren) = self.try_consume(TokenKind::OpenParen) {
      let inner = self
        .parse_expr(0)?
        .ok_or_else(|| self.error_at_line(open_paren.line, "Expected expr"))?;
      self.expect_at_line(TokenKind::CloseParen, open_paren.line, "Expected ')'")?;
      return Ok(Some(self.ast.alloc_expr(Expr::Term(Term::Paren(inner)))));
    }
    Ok(None)
  }

  // ----- Token cursor -----

  fn peek(&self, offset: usize) -> Option<&Token> {
    self.tokens.get(self.index + offset)
  }

  fn peek_kind(&self, offset: usize) -> Option<TokenKind> {
    self.peek(offset).map(|token| token.kind)
  }

  fn consume(&mut self) -> Token {
    let token = self.tokens[self.index].clone();
    self.index += 1;
    token
  }

  fn try_consume(&mut self, kind: TokenKind) -> Option<Token> {
    if self.peek_kind(0) == Some(kind) {
      return Some(self.consume());
    }
    None
  }

  fn expect(&mut self, kind: TokenKind, message: &str) -> CompileResult<Token> {
    self
      .try_consume(kind)
      .ok_or_else(|| self.error(message))
  }

  fn expect_at_line(&mut self, kind: TokenKind, line: u32, message: &str) -> CompileResult<Token> {
    self
      .try_consume(kind)
      .ok_or_else(|| self.error_at_line(line, message))
  }

  // ----- Diagnostics -----

  /// Position of the previously consumed token; the column points one
  /// past its first character so the caret lands where the missing
  /// input was expected.
  fn prev_pos(&self) -> (u32, u32) {
    match self.index.checked_sub(1).and_then(|i| self.tokens.get(i)) {
      Some(token) => (token.line, token.col),
      None => (1, 0),
    }
  }

  fn error(&self, message: impl Into<String>) -> CompileError {
    let (line, col) = self.prev_pos();
    CompileError::parse(self.file, line, col + 1, message)
  }

  fn error_at_line(&self, line: u32, message: impl Into<String>) -> CompileError {
    let (_, col) = self.prev_pos();
    CompileError::parse(self.file, line, col + 1, message)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tokenizer::Tokenizer;

  fn parse_source(source: &str) -> CompileResult<Ast> {
    let tokens = Tokenizer::new(source, "test.l").tokenize()?;
    parse(tokens, "test.l")
  }

  fn single_expr(ast: &Ast) -> ExprId {
    assert_eq!(ast.root().len(), 1);
    match ast.stmt(ast.root()[0]) {
      Stmt::Exit(expr) => *expr,
      other => panic!("expected exit statement, got {other:?}"),
    }
  }

  fn bin_parts(ast: &Ast, expr: ExprId) -> (BinOp, ExprId, ExprId) {
    match ast.expr(expr) {
      Expr::Bin { op, lhs, rhs } => (*op, *lhs, *rhs),
      other => panic!("expected binary expression, got {other:?}"),
    }
  }

  fn int_value(ast: &Ast, expr: ExprId) -> &str {
    match ast.expr(expr) {
      Expr::Term(Term::IntLit(token)) => token.value.as_deref().unwrap(),
      other => panic!("expected integer literal, got {other:?}"),
    }
  }

  #[test]
  fn multiplication_binds_tighter_than_addition() {
    let ast = parse_source("exit(2 + 3 * 4);").unwrap();
    let (op, lhs, rhs) = bin_parts(&ast, single_expr(&ast));
    assert_eq!(op, BinOp::Add);
    assert_eq!(int_value(&ast, lhs), "2");
    let (op, lhs, rhs) = bin_parts(&ast, rhs);
    assert_eq!(op, BinOp::Mul);
    assert_eq!(int_value(&ast, lhs), "3");
    assert_eq!(int_value(&ast, rhs), "4");
  }

  #[test]
  fn same_precedence_operators_associate_left() {
    let ast = parse_source("exit(10 - 4 - 3);").unwrap();
    let (op, lhs, rhs) = bin_parts(&ast, single_expr(&ast));
    assert_eq!(op, BinOp::Sub);
    assert_eq!(int_value(&ast, rhs), "3");
    let (op, lhs, rhs) = bin_parts(&ast, lhs);
    assert_eq!(op, BinOp::Sub);
    assert_eq!(int_value(&ast, lhs), "10");
    assert_eq!(int_value(&ast, rhs), "4");
  }

  #[test]
  fn parentheses_override_precedence() {
    let ast = parse_source("exit((2 + 3) * 4);").unwrap();
    let (op, lhs, rhs) = bin_parts(&ast, single_expr(&ast));
    assert_eq!(op, BinOp::Mul);
    assert_eq!(int_value(&ast, rhs), "4");
    let Expr::Term(Term::Paren(inner)) = ast.expr(lhs) else {
      panic!("expected parenthesised lhs");
    };
    let (op, ..) = bin_parts(&ast, *inner);
    assert_eq!(op, BinOp::Add);
  }

  #[test]
  fn program_keeps_top_level_statement_order() {
    let ast = parse_source("let x = 1; x += 2; { exit(x); } exit(0);").unwrap();
    assert_eq!(ast.root().len(), 4);
    assert!(matches!(ast.stmt(ast.root()[0]), Stmt::Let { .. }));
    assert!(matches!(
      ast.stmt(ast.root()[1]),
      Stmt::Set {
        op: SetOp::AddAssign,
        ..
      }
    ));
    assert!(matches!(ast.stmt(ast.root()[2]), Stmt::Scope(_)));
    assert!(matches!(ast.stmt(ast.root()[3]), Stmt::Exit(_)));
  }

  #[test]
  fn if_chain_nests_through_the_predicate() {
    let ast = parse_source(
      "let x = 1; if (x) { exit(1); } else if (x - 1) { exit(2); } else { exit(3); }",
    )
    .unwrap();
    let Stmt::If { pred: Some(pred), .. } = ast.stmt(ast.root()[1]) else {
      panic!("expected if with predicate");
    };
    let IfPred::ElseIf { pred: Some(tail), .. } = ast.pred(*pred) else {
      panic!("expected else-if arm first");
    };
    assert!(matches!(ast.pred(*tail), IfPred::Else(_)));
  }

  #[test]
  fn plain_if_has_no_predicate() {
    let ast = parse_source("let x = 1; if (x) { exit(1); }").unwrap();
    assert!(matches!(
      ast.stmt(ast.root()[1]),
      Stmt::If { pred: None, .. }
    ));
  }

  #[test]
  fn empty_input_parses_to_an_empty_program() {
    let ast = parse_source("").unwrap();
    assert!(ast.root().is_empty());
  }

  #[test]
  fn statement_that_matches_nothing_is_fatal() {
    let err = parse_source("exit 0;").unwrap_err();
    assert!(err.to_string().contains("parse_error: Invalid statement"));
  }

  #[test]
  fn missing_close_paren_reports_the_open_paren_line() {
    let err = parse_source("let x = (1 + 2;").unwrap_err();
    assert_eq!(err.to_string(), "test.l:1:15: parse_error: Expected ')'");
  }

  #[test]
  fn missing_semicolon_points_past_the_last_token() {
    let err = parse_source("exit(0)").unwrap_err();
    assert_eq!(err.to_string(), "test.l:1:8: parse_error: Expected ';'");
  }

  #[test]
  fn set_without_an_operator_is_rejected() {
    let err = parse_source("x x;").unwrap_err();
    assert!(err.to_string().contains("Invalid set statement"));
  }

  #[test]
  fn unclosed_scope_is_rejected() {
    let err = parse_source("{ exit(0);").unwrap_err();
    assert!(err.to_string().contains("Expected '}'"));
  }
}
