//! Code generation: lower the parsed AST into NASM x86-64 assembly.
//!
//! The emitter is a stack machine: every expression leaves exactly one
//! 8-byte value on the process stack, and named variables are pinned to
//! the stack slot their initialiser pushed. `stack_size` mirrors the
//! runtime stack depth in words, so a live variable's slot is always
//! `[rsp + (stack_size - stack_slot - 1) * 8]`. Scopes reclaim their
//! locals with a single `add rsp` on exit.
//!
//! Undeclared-identifier and duplicate-declaration errors surface here
//! but are reported in the parser's diagnostic format, anchored at the
//! token the AST carried through for exactly that purpose.

use crate::error::{CompileError, CompileResult};
use crate::parser::{Ast, BinOp, Expr, ExprId, IfPred, IfPredId, ScopeId, SetOp, Stmt, StmtId, Term};
use crate::tokenizer::Token;

/// Emit a full NASM listing for a parsed program.
pub fn generate(ast: &Ast, file: &str) -> CompileResult<String> {
  Generator::new(ast, file).gen_program()
}

struct Var {
  name: String,
  stack_slot: usize,
}

struct Generator<'a> {
  ast: &'a Ast,
  file: &'a str,
  output: String,
  stack_size: usize,
  vars: Vec<Var>,
  scopes: Vec<usize>,
  label_count: usize,
}

impl<'a> Generator<'a> {
  fn new(ast: &'a Ast, file: &'a str) -> Self {
    Self {
      ast,
      file,
      output: String::new(),
      stack_size: 0,
      vars: Vec::new(),
      scopes: Vec::new(),
      label_count: 0,
    }
  }

  fn gen_program(mut self) -> CompileResult<String> {
    self.output.push_str("bits 64\n\nglobal _start\nsection .text\n\n_start:\n");

    let ast = self.ast;
    for &stmt in ast.root() {
      self.gen_stmt(stmt)?;
    }

    // programs without an explicit exit still terminate cleanly
    self.output.push_str("    mov rax, 60\n");
    self.output.push_str("    mov rdi, 0\n");
    self.output.push_str("    syscall\n");
    Ok(self.output)
  }

  // ----- Statements -----

  fn gen_stmt(&mut self, stmt: StmtId) -> CompileResult<()> {
    let ast = self.ast;
    match ast.stmt(stmt) {
      Stmt::Exit(expr) => {
        self.gen_expr(*expr)?;
        self.pop("rdi");
        self.output.push_str("    mov rax, 60\n");
        self.output.push_str("    syscall\n");
        Ok(())
      }
      Stmt::Let { name, value } => {
        let ident = self.token_text(name)?;
        if self.lookup(ident).is_some() {
          return Err(CompileError::parse(
            self.file,
            name.line,
            name.col,
            format!("Identifier already used: {ident}"),
          ));
        }
        self.vars.push(Var {
          name: ident.to_string(),
          stack_slot: self.stack_size,
        });
        self.gen_expr(*value)
      }
      Stmt::Set { target, op, value } => self.gen_set(target, *op, *value),
      Stmt::Scope(scope) => self.gen_scope(*scope),
      Stmt::If { cond, body, pred } => self.gen_if(*cond, *body, *pred),
    }
  }

  fn gen_set(&mut self, target: &Token, op: SetOp, value: ExprId) -> CompileResult<()> {
    let name = self.token_text(target)?;
    let Some(slot) = self.lookup(name) else {
      return Err(CompileError::parse(
        self.file,
        target.line,
        target.col,
        format!("Undeclared identifier used '{name}'"),
      ));
    };

    self.gen_expr(value)?;
    match op {
      SetOp::Assign => {
        self.pop("rax");
        let offset = self.slot_offset(slot);
        self.output.push_str(&format!("    mov QWORD [rsp + {offset}], rax\n"));
      }
      SetOp::AddAssign => {
        self.pop("rax");
        let offset = self.slot_offset(slot);
        self.output.push_str(&format!("    add QWORD [rsp + {offset}], rax\n"));
      }
      SetOp::SubAssign => {
        self.pop("rax");
        let offset = self.slot_offset(slot);
        self.output.push_str(&format!("    sub QWORD [rsp + {offset}], rax\n"));
      }
      SetOp::MulAssign => {
        self.pop("rbx");
        let offset = self.slot_offset(slot);
        self.output.push_str(&format!("    mov rax, QWORD [rsp + {offset}]\n"));
        self.output.push_str("    mul rbx\n");
        self.output.push_str(&format!("    mov QWORD [rsp + {offset}], rax\n"));
      }
      SetOp::DivAssign => {
        self.pop("rbx");
        let offset = self.slot_offset(slot);
        self.output.push_str(&format!("    mov rax, QWORD [rsp + {offset}]\n"));
        self.output.push_str("    xor rdx, rdx\n");
        self.output.push_str("    div rbx\n");
        self.output.push_str(&format!("    mov QWORD [rsp + {offset}], rax\n"));
      }
    }
    Ok(())
  }

  fn gen_scope(&mut self, scope: ScopeId) -> CompileResult<()> {
    let ast = self.ast;
    self.begin_scope();
    for &stmt in &ast.scope(scope).stmts {
      self.gen_stmt(stmt)?;
    }
    self.end_scope();
    Ok(())
  }

  fn gen_if(&mut self, cond: ExprId, body: ScopeId, pred: Option<IfPredId>) -> CompileResult<()> {
    self.gen_expr(cond)?;
    self.pop("rax");
    let false_label = self.create_label();
    self.output.push_str("    test rax, rax\n");
    self.output.push_str(&format!("    jz {false_label}\n"));
    self.gen_scope(body)?;

    match pred {
      Some(pred) => {
        let end_label = self.create_label();
        self.output.push_str(&format!("    jmp {end_label}\n"));
        self.output.push_str(&format!("{false_label}:\n"));
        self.gen_if_pred(pred, &end_label)?;
        self.output.push_str(&format!("{end_label}:\n"));
      }
      None => {
        self.output.push_str(&format!("{false_label}:\n"));
      }
    }
    Ok(())
  }

  /// Lower one arm of the else-chain. Every conditional arm jumps to
  /// the shared `end_label` once its scope has run.
  fn gen_if_pred(&mut self, pred: IfPredId, end_label: &str) -> CompileResult<()> {
    let ast = self.ast;
    match ast.pred(pred) {
      IfPred::ElseIf { cond, body, pred } => {
        self.gen_expr(*cond)?;
        self.pop("rax");
        let false_label = self.create_label();
        self.output.push_str("    test rax, rax\n");
        self.output.push_str(&format!("    jz {false_label}\n"));
        self.gen_scope(*body)?;
        match pred {
          Some(pred) => {
            self.output.push_str(&format!("    jmp {end_label}\n"));
            self.output.push_str(&format!("{false_label}:\n"));
            self.gen_if_pred(*pred, end_label)?;
          }
          None => {
            self.output.push_str(&format!("{false_label}:\n"));
          }
        }
        Ok(())
      }
      IfPred::Else(scope) => self.gen_scope(*scope),
    }
  }

  // ----- Expressions -----

  fn gen_expr(&mut self, expr: ExprId) -> CompileResult<()> {
    let ast = self.ast;
    match ast.expr(expr) {
      Expr::Term(term) => self.gen_term(term),
      Expr::Bin { op, lhs, rhs } => self.gen_bin_expr(*op, *lhs, *rhs),
    }
  }

  fn gen_term(&mut self, term: &Term) -> CompileResult<()> {
    match term {
      Term::IntLit(token) => {
        let value = self.token_text(token)?;
        self.output.push_str(&format!("    mov rax, {value}\n"));
        self.push("rax");
        Ok(())
      }
      Term::Ident(token) => {
        let name = self.token_text(token)?;
        let Some(slot) = self.lookup(name) else {
          return Err(CompileError::parse(
            self.file,
            token.line,
            token.col,
            format!("Undeclared identifier used '{name}'"),
          ));
        };
        let offset = self.slot_offset(slot);
        self.push(&format!("QWORD [rsp + {offset}]"));
        Ok(())
      }
      Term::Paren(inner) => self.gen_expr(*inner),
    }
  }

  /// Right-hand side is evaluated first so the operator sees its left
  /// operand in `rax`, which orients `sub` and `div` as `lhs OP rhs`.
  fn gen_bin_expr(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> CompileResult<()> {
    self.gen_expr(rhs)?;
    self.gen_expr(lhs)?;
    self.pop("rax");
    self.pop("rbx");
    match op {
      BinOp::Add => self.output.push_str("    add rax, rbx\n"),
      BinOp::Sub => self.output.push_str("    sub rax, rbx\n"),
      BinOp::Mul => self.output.push_str("    mul rbx\n"),
      BinOp::Div => {
        self.output.push_str("    xor rdx, rdx\n");
        self.output.push_str("    div rbx\n");
      }
    }
    self.push("rax");
    Ok(())
  }

  // ----- Stack bookkeeping -----

  fn push(&mut self, operand: &str) {
    self.output.push_str(&format!("    push {operand}\n"));
    self.stack_size += 1;
  }

  fn pop(&mut self, reg: &str) {
    self.output.push_str(&format!("    pop {reg}\n"));
    self.stack_size -= 1;
  }

  fn slot_offset(&self, stack_slot: usize) -> usize {
    debug_assert!(stack_slot < self.stack_size, "slot above the tracked stack top");
    (self.stack_size - stack_slot - 1) * 8
  }

  fn lookup(&self, name: &str) -> Option<usize> {
    self
      .vars
      .iter()
      .find(|var| var.name == name)
      .map(|var| var.stack_slot)
  }

  fn begin_scope(&mut self) {
    self.scopes.push(self.vars.len());
  }

  fn end_scope(&mut self) {
    let Some(mark) = self.scopes.pop() else {
      return;
    };
    let count = self.vars.len() - mark;
    if count > 0 {
      self.output.push_str(&format!("    add rsp, {}\n", count * 8));
    }
    self.stack_size -= count;
    self.vars.truncate(mark);
  }

  fn create_label(&mut self) -> String {
    let label = format!("label{}", self.label_count);
    self.label_count += 1;
    label
  }

  fn token_text<'t>(&self, token: &'t Token) -> CompileResult<&'t str> {
    token.value.as_deref().ok_or_else(|| {
      CompileError::parse(
        self.file,
        token.line,
        token.col,
        "internal error: token is missing its payload",
      )
    })
  }
}
