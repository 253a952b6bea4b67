//! Single-pass compiler for the Grace language.
//!
//! The [`Compiler`] is a recursive-descent parser that emits bytecode
//! directly into the [`Vm`]'s per-function tables as it parses; there is no
//! AST.  It keeps one token of lookahead (`current`) plus the token just
//! consumed (`previous`).
//!
//! # Scopes
//!
//! Locals are a flat name → `(is_final, slot)` map per function.  Slots are
//! assigned in declaration order; parameters occupy the first `arity` slots.
//! Blocks that declare locals (`if`/`while`/`for` bodies) emit one
//! `PopLocal` per new name on every exit path, including `break`.
//!
//! # Jump patching
//!
//! A forward jump reserves two `Int` constants (target constant index and
//! target op index, both relative to the current function's segment), emits
//! the jump opcode, and overwrites the reserved constants once the target
//! position is known.  Two indices are required because opcodes consume a
//! variable number of operand constants, so the op index alone does not
//! determine the constant cursor.
//!
//! # Diagnostics
//!
//! Errors set a panic flag that suppresses further reports until
//! `synchronize` skips to the next `;` or statement keyword.  Every error
//! also sets `had_error`, which prevents the program from running.

use std::collections::HashMap;
use std::fmt;
use std::num::IntErrorKind;
use std::time::Instant;

use crate::bytecode::{hash_name, Op};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use crate::value::Value;
use crate::vm::Vm;

// ─────────────────────────────────────────────────────────────────────────────
// Options and diagnostics
// ─────────────────────────────────────────────────────────────────────────────

/// Flags carried from the CLI into the compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompilerOptions {
    /// Print compile timing and enable advisory warnings.
    pub verbose: bool,
    /// Treat warnings as errors.
    pub warnings_as_errors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A compile-time diagnostic, carrying everything needed to render the
/// caret display without re-reading the source.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file_name: String,
    pub line: u32,
    pub col: u32,
    pub len: usize,
    pub source_line: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        writeln!(f, "[line {}] {}: {}", self.line, label, self.message)?;
        writeln!(f, "    --> {}:{}:{}", self.file_name, self.line, self.col)?;
        writeln!(f, "     |")?;
        writeln!(f, "{:>4} | {}", self.line, self.source_line)?;
        let pad = " ".repeat(self.col.saturating_sub(1) as usize);
        let carets = "^".repeat(self.len.max(1));
        write!(f, "     | {pad}{carets}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compiler internals
// ─────────────────────────────────────────────────────────────────────────────

/// A compiler-side local variable.
#[derive(Debug, Clone, Copy)]
struct Local {
    is_final: bool,
    slot: i64,
}

/// What the compiler is currently inside of.  Contexts nest: entering a loop
/// preserves the surrounding function context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    TopLevel,
    Function,
    Loop,
}

/// An emitted jump whose target constants await patching.
struct PendingJump {
    const_slot: usize,
    op_slot: usize,
}

/// Per-loop bookkeeping: `break` jumps to patch at loop end, and the number
/// of locals alive at body entry (so `break` can pop the rest).
struct LoopCtx {
    break_jumps: Vec<PendingJump>,
    scope_base: usize,
}

/// A `for` range bound: a literal or a local slot.
enum RangeOperand {
    Literal(Value),
    Local(i64),
}

/// How an `if` branch body ended.
enum BranchEnd {
    End,
    Else,
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Compile Grace source into a ready-to-run [`Vm`].
///
/// On failure every collected diagnostic is returned; warnings alone do not
/// fail the build unless [`CompilerOptions::warnings_as_errors`] is set.
/// Warnings on a successful build are printed to stderr here.
pub fn compile(
    source: &str,
    file_name: &str,
    options: CompilerOptions,
) -> Result<Vm, Vec<Diagnostic>> {
    let started = Instant::now();
    let mut compiler = Compiler::new(source, file_name, options);

    compiler.advance();
    while !compiler.match_token(TokenKind::EndOfFile) {
        let before = compiler.current_token_span();
        compiler.declaration();
        // Guarantee forward progress even when error recovery stops on the
        // offending token.
        if compiler.current_token_span() == before && !compiler.check(TokenKind::EndOfFile) {
            compiler.advance();
        }
    }

    if compiler.had_error {
        return Err(compiler.diagnostics);
    }
    for warning in &compiler.diagnostics {
        eprintln!("{warning}");
    }
    if options.verbose {
        println!(
            "Compilation succeeded in {} \u{03bc}s.",
            started.elapsed().as_micros()
        );
    }
    Ok(compiler.vm)
}

// ─────────────────────────────────────────────────────────────────────────────
// Compiler
// ─────────────────────────────────────────────────────────────────────────────

struct Compiler<'src> {
    lexer: Lexer<'src>,
    vm: Vm,
    current: Token,
    previous: Token,
    file_name: String,
    options: CompilerOptions,
    locals: HashMap<String, Local>,
    /// Insertion-ordered local names, for block cleanup.
    local_order: Vec<String>,
    contexts: Vec<Context>,
    loops: Vec<LoopCtx>,
    function_had_return: bool,
    diagnostics: Vec<Diagnostic>,
    panic_mode: bool,
    had_error: bool,
}

impl<'src> Compiler<'src> {
    fn new(source: &'src str, file_name: &str, options: CompilerOptions) -> Self {
        let mut vm = Vm::new(file_name);
        vm.set_source(source);
        let placeholder = Token::new(TokenKind::EndOfFile, "", Span::default());
        Self {
            lexer: Lexer::new(source),
            vm,
            current: placeholder.clone(),
            previous: placeholder,
            file_name: file_name.to_string(),
            options,
            locals: HashMap::new(),
            local_order: Vec::new(),
            contexts: vec![Context::TopLevel],
            loops: Vec::new(),
            function_had_return: false,
            diagnostics: Vec::new(),
            panic_mode: false,
            had_error: false,
        }
    }

    // ── Token plumbing ───────────────────────────────────────────────────────

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token());
        if self.current.kind == TokenKind::Error {
            let message = self.current.lexeme.clone();
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message.to_string());
    }

    fn current_token_span(&self) -> (usize, usize) {
        (self.current.span.start, self.current.span.end)
    }

    // ── Diagnostics ──────────────────────────────────────────────────────────

    fn error_at_current(&mut self, message: String) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    fn error_at_previous(&mut self, message: String) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at(&mut self, token: &Token, message: String) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let message = match token.kind {
            TokenKind::EndOfFile => format!("at end: {message}"),
            // Error tokens already carry the lexer's message.
            TokenKind::Error => message,
            _ => format!("at '{}': {message}", token.lexeme),
        };
        self.push_diagnostic(Severity::Error, token, message);
    }

    fn warning_at_previous(&mut self, message: String) {
        if self.options.warnings_as_errors {
            self.had_error = true;
        }
        let token = self.previous.clone();
        self.push_diagnostic(Severity::Warning, &token, message);
    }

    fn push_diagnostic(&mut self, severity: Severity, token: &Token, message: String) {
        let line = token.span.line;
        self.diagnostics.push(Diagnostic {
            severity,
            message,
            file_name: self.file_name.clone(),
            line,
            col: token.span.col,
            len: token.span.len(),
            source_line: self.lexer.code_at_line(line).to_string(),
        });
    }

    /// Skip to the next statement boundary after an error.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::EndOfFile {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Func
                | TokenKind::Final
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::PrintLn
                | TokenKind::Return
                | TokenKind::Var
                | TokenKind::End => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ── Context helpers ──────────────────────────────────────────────────────

    fn in_function(&self) -> bool {
        self.contexts.contains(&Context::Function)
    }

    fn in_loop(&self) -> bool {
        self.contexts.contains(&Context::Loop)
    }

    // ── Emission helpers ─────────────────────────────────────────────────────

    fn emit_op(&mut self, op: Op) {
        self.vm.push_op(op, self.previous.span.line);
    }

    fn emit_constant(&mut self, value: Value) {
        self.vm.push_constant(value);
    }

    fn emit_load_constant(&mut self, value: Value) {
        self.emit_constant(value);
        self.emit_op(Op::LoadConstant);
    }

    /// Current `(constant, op)` counts in the function being compiled —
    /// the target coordinates a jump lands on.
    fn mark_position(&self) -> (usize, usize) {
        (self.vm.num_constants(), self.vm.num_ops())
    }

    /// Reserve two target constants and emit a forward jump through them.
    fn reserve_jump(&mut self, op: Op) -> PendingJump {
        self.emit_constant(Value::Int(0));
        let const_slot = self.vm.num_constants() - 1;
        self.emit_constant(Value::Int(0));
        let op_slot = self.vm.num_constants() - 1;
        self.emit_op(op);
        PendingJump { const_slot, op_slot }
    }

    /// Point a pending jump at the current position.
    fn patch_jump(&mut self, jump: PendingJump) {
        let (const_idx, op_idx) = self.mark_position();
        self.vm
            .set_constant(jump.const_slot, Value::Int(const_idx as i64));
        self.vm.set_constant(jump.op_slot, Value::Int(op_idx as i64));
    }

    /// Emit an unconditional backward jump to a recorded position.
    fn emit_loop_jump(&mut self, target: (usize, usize)) {
        self.emit_constant(Value::Int(target.0 as i64));
        self.emit_constant(Value::Int(target.1 as i64));
        self.emit_op(Op::Jump);
    }

    /// Emit `PopLocal` for (and forget) every local declared after
    /// `scope_base`.
    fn close_scope(&mut self, scope_base: usize) {
        while self.local_order.len() > scope_base {
            let name = self.local_order.pop().expect("local order entry");
            self.locals.remove(&name);
            self.emit_op(Op::PopLocal);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Declarations
    // ─────────────────────────────────────────────────────────────────────────

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Func) {
            self.func_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else if self.match_token(TokenKind::Final) {
            self.final_declaration();
        } else if self.match_token(TokenKind::Break) {
            self.break_statement();
        } else if self.match_token(TokenKind::Assert) {
            self.assert_statement();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        // Grammar slot reserved for a future extension.
        self.error_at_previous("Classes are not yet supported".to_string());
    }

    fn func_declaration(&mut self) {
        if self.in_function() {
            self.error_at_previous("Functions are only allowed at top level".to_string());
            return;
        }
        self.contexts.push(Context::Function);
        self.function_body();
        self.locals.clear();
        self.local_order.clear();
        self.contexts.pop();
    }

    fn function_body(&mut self) {
        self.consume(TokenKind::Identifier, "Expected function name");
        let name = self.previous.lexeme.clone();
        let decl_line = self.previous.span.line;

        self.consume(TokenKind::LeftParen, "Expected '(' after function name");
        let mut arity: i64 = 0;
        while !self.match_token(TokenKind::RightParen) {
            if arity > 0 {
                self.consume(TokenKind::Comma, "Expected ',' after function parameter");
            }
            let is_final = self.match_token(TokenKind::Final);
            let message = if is_final {
                "Expected identifier after `final`"
            } else {
                "Expected parameter name"
            };
            self.consume(TokenKind::Identifier, message);
            if self.panic_mode {
                return;
            }
            let param = self.previous.lexeme.clone();
            if self.locals.contains_key(&param) {
                self.error_at_previous(
                    "Function parameters with the same name already defined".to_string(),
                );
                return;
            }
            let slot = self.locals.len() as i64;
            self.locals.insert(param.clone(), Local { is_final, slot });
            self.local_order.push(param);
            arity += 1;
        }
        self.consume(TokenKind::Colon, "Expected ':' after function signature");

        if name == "main" && arity > 1 {
            self.error_at_previous("`main` may take at most one argument".to_string());
            return;
        }
        if !self.vm.begin_function(&name, arity, decl_line) {
            self.error_at_previous("Duplicate function definitions".to_string());
            return;
        }

        self.function_had_return = false;
        while !self.match_token(TokenKind::End) {
            if self.check(TokenKind::EndOfFile) {
                self.error_at_current("Expected `end` after function".to_string());
                return;
            }
            self.declaration();
        }

        if name == "main" {
            // Without this, falling off main would run into the next linked
            // function's segment.
            self.emit_op(Op::Exit);
        } else if !self.function_had_return {
            self.emit_load_constant(Value::Null);
            self.emit_op(Op::Return);
        }
    }

    fn var_declaration(&mut self) {
        if !self.in_function() {
            self.error_at_previous("Only functions and classes are allowed at top level".to_string());
            return;
        }
        self.consume(TokenKind::Identifier, "Expected identifier after `var`");
        let name = self.previous.lexeme.clone();
        if self.locals.contains_key(&name) {
            self.error_at_previous("A local variable with the same name already exists".to_string());
            return;
        }

        let slot = self.locals.len() as i64;
        self.locals.insert(name.clone(), Local { is_final: false, slot });
        self.local_order.push(name);
        self.emit_op(Op::DeclareLocal);

        if self.match_token(TokenKind::Equal) {
            self.expression(false);
            self.emit_constant(Value::Int(slot));
            self.emit_op(Op::AssignLocal);
        }
        self.consume(TokenKind::Semicolon, "Expected ';' after `var` declaration");
    }

    fn final_declaration(&mut self) {
        if !self.in_function() {
            self.error_at_previous("Only functions and classes are allowed at top level".to_string());
            return;
        }
        self.consume(TokenKind::Identifier, "Expected identifier after `final`");
        let name = self.previous.lexeme.clone();
        if self.locals.contains_key(&name) {
            self.error_at_previous("A local variable with the same name already exists".to_string());
            return;
        }

        let slot = self.locals.len() as i64;
        self.locals.insert(name.clone(), Local { is_final: true, slot });
        self.local_order.push(name);
        self.emit_op(Op::DeclareLocal);

        self.consume(TokenKind::Equal, "Must assign to `final` upon declaration");
        self.expression(false);
        self.emit_constant(Value::Int(slot));
        self.emit_op(Op::AssignLocal);
        self.consume(TokenKind::Semicolon, "Expected ';' after `final` declaration");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    fn statement(&mut self) {
        if !self.in_function() {
            self.error_at_current("Only functions and classes are allowed at top level".to_string());
            self.advance();
            return;
        }

        if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Print) {
            self.print_statement(false);
        } else if self.match_token(TokenKind::PrintLn) {
            self.print_statement(true);
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else {
            self.expression_statement();
        }
    }

    fn expression_statement(&mut self) {
        let leaves_value = self.expression(true);
        if leaves_value {
            self.emit_op(Op::Pop);
        }
        self.consume(TokenKind::Semicolon, "Expected ';' after expression");
    }

    fn print_statement(&mut self, newline: bool) {
        let keyword = if newline { "println" } else { "print" };
        self.consume(
            TokenKind::LeftParen,
            &format!("Expected '(' after '{keyword}'"),
        );
        if self.match_token(TokenKind::RightParen) {
            self.emit_op(if newline {
                Op::PrintEmptyLine
            } else {
                Op::PrintTab
            });
        } else {
            self.expression(false);
            self.emit_op(if newline { Op::PrintLn } else { Op::Print });
            self.emit_op(Op::Pop);
            self.consume(TokenKind::RightParen, "Expected ')' after expression");
        }
        self.consume(TokenKind::Semicolon, "Expected ';' after expression");
    }

    fn return_statement(&mut self) {
        if !self.in_function() {
            self.error_at_previous("`return` only allowed inside functions".to_string());
            return;
        }
        if self.vm.current_function_name() == "main" {
            self.error_at_previous("Cannot return from main function".to_string());
            return;
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit_load_constant(Value::Null);
            self.emit_op(Op::Return);
        } else {
            self.expression(false);
            self.emit_op(Op::Return);
            self.consume(TokenKind::Semicolon, "Expected ';' after expression");
        }
        self.function_had_return = true;
    }

    fn if_statement(&mut self) {
        self.expression(false);
        self.consume(TokenKind::Colon, "Expected ':' after condition");

        let mut false_jump = Some(self.reserve_jump(Op::JumpIfFalse));
        let mut end_jumps: Vec<PendingJump> = Vec::new();
        let mut saw_else = false;

        loop {
            let scope_base = self.local_order.len();
            let terminator = loop {
                if self.check(TokenKind::EndOfFile) {
                    self.error_at_current("Unterminated `if` statement".to_string());
                    return;
                }
                if self.match_token(TokenKind::End) {
                    break BranchEnd::End;
                }
                if self.match_token(TokenKind::Else) {
                    break BranchEnd::Else;
                }
                self.declaration();
            };
            self.close_scope(scope_base);

            match terminator {
                BranchEnd::End => {
                    if let Some(jump) = false_jump.take() {
                        self.patch_jump(jump);
                    }
                    for jump in end_jumps {
                        self.patch_jump(jump);
                    }
                    return;
                }
                BranchEnd::Else => {
                    if saw_else {
                        self.error_at_previous("Only one `else` branch is allowed".to_string());
                        return;
                    }
                    // The branch just compiled skips the rest of the chain.
                    end_jumps.push(self.reserve_jump(Op::Jump));
                    if let Some(jump) = false_jump.take() {
                        self.patch_jump(jump);
                    }
                    if self.match_token(TokenKind::If) {
                        self.expression(false);
                        self.consume(TokenKind::Colon, "Expected ':' after condition");
                        false_jump = Some(self.reserve_jump(Op::JumpIfFalse));
                    } else {
                        self.consume(TokenKind::Colon, "Expected ':' after `else`");
                        saw_else = true;
                    }
                }
            }
        }
    }

    fn while_statement(&mut self) {
        let loop_start = self.mark_position();
        self.contexts.push(Context::Loop);

        self.expression(false);
        self.consume(TokenKind::Colon, "Expected ':' after condition");
        let exit_jump = self.reserve_jump(Op::JumpIfFalse);

        let scope_base = self.local_order.len();
        self.loops.push(LoopCtx {
            break_jumps: Vec::new(),
            scope_base,
        });

        loop {
            if self.check(TokenKind::EndOfFile) {
                self.error_at_current("Unterminated `while` statement".to_string());
                self.loops.pop();
                self.contexts.pop();
                return;
            }
            if self.match_token(TokenKind::End) {
                break;
            }
            self.declaration();
        }

        self.close_scope(scope_base);
        self.emit_loop_jump(loop_start);
        self.patch_jump(exit_jump);
        let ctx = self.loops.pop().expect("loop context");
        for jump in ctx.break_jumps {
            self.patch_jump(jump);
        }
        self.contexts.pop();
    }

    fn for_statement(&mut self) {
        self.contexts.push(Context::Loop);
        self.consume(TokenKind::Identifier, "Expected identifier after `for`");
        let name = self.previous.lexeme.clone();

        let (slot, declared_new) = match self.locals.get(&name).copied() {
            Some(local) if local.is_final => {
                self.error_at_previous(format!("Cannot reassign to final '{name}'"));
                self.contexts.pop();
                return;
            }
            Some(local) => {
                if self.options.verbose {
                    self.warning_at_previous(format!(
                        "Reusing existing local '{name}' as `for` loop variable"
                    ));
                }
                (local.slot, false)
            }
            None => {
                let slot = self.locals.len() as i64;
                self.locals.insert(name.clone(), Local { is_final: false, slot });
                self.local_order.push(name.clone());
                self.emit_op(Op::DeclareLocal);
                (slot, true)
            }
        };

        self.consume(TokenKind::In, "Expected `in` after `for` loop variable");
        let start = self.range_operand();
        self.consume(TokenKind::DotDot, "Expected `..` after range start");
        let stop = self.range_operand();
        let step = if self.match_token(TokenKind::By) {
            self.range_operand()
        } else {
            RangeOperand::Literal(Value::Int(1))
        };
        self.consume(TokenKind::Colon, "Expected ':' after `for` clause");

        // Bind the loop variable to START.
        self.emit_range_operand(&start);
        self.emit_constant(Value::Int(slot));
        self.emit_op(Op::AssignLocal);

        // Test: exit as soon as x >= STOP, regardless of step sign.
        let loop_start = self.mark_position();
        self.emit_constant(Value::Int(slot));
        self.emit_op(Op::LoadLocal);
        self.emit_range_operand(&stop);
        self.emit_op(Op::GreaterEqual);
        self.emit_op(Op::Not);
        let exit_jump = self.reserve_jump(Op::JumpIfFalse);

        let scope_base = self.local_order.len();
        self.loops.push(LoopCtx {
            break_jumps: Vec::new(),
            scope_base,
        });

        loop {
            if self.check(TokenKind::EndOfFile) {
                self.error_at_current("Unterminated `for` statement".to_string());
                self.loops.pop();
                self.contexts.pop();
                return;
            }
            if self.match_token(TokenKind::End) {
                break;
            }
            self.declaration();
        }

        self.close_scope(scope_base);

        // x = x + STEP, then back to the test.
        self.emit_constant(Value::Int(slot));
        self.emit_op(Op::LoadLocal);
        self.emit_range_operand(&step);
        self.emit_op(Op::Add);
        self.emit_constant(Value::Int(slot));
        self.emit_op(Op::AssignLocal);
        self.emit_loop_jump(loop_start);

        self.patch_jump(exit_jump);
        let ctx = self.loops.pop().expect("loop context");
        for jump in ctx.break_jumps {
            self.patch_jump(jump);
        }

        if declared_new {
            self.emit_op(Op::PopLocal);
            self.locals.remove(&name);
            self.local_order.pop();
        }
        self.contexts.pop();
    }

    /// Parse a `for` range bound: an integer literal, float literal, or an
    /// identifier naming a local.
    fn range_operand(&mut self) -> RangeOperand {
        if self.match_token(TokenKind::Integer) {
            match self.parse_int_literal() {
                Some(value) => RangeOperand::Literal(value),
                None => RangeOperand::Literal(Value::Int(0)),
            }
        } else if self.match_token(TokenKind::Double) {
            match self.parse_float_literal() {
                Some(value) => RangeOperand::Literal(value),
                None => RangeOperand::Literal(Value::Int(0)),
            }
        } else if self.match_token(TokenKind::Identifier) {
            let name = self.previous.lexeme.clone();
            match self.locals.get(&name) {
                Some(local) => RangeOperand::Local(local.slot),
                None => {
                    self.error_at_previous(format!("Cannot find variable '{name}' in this scope"));
                    RangeOperand::Literal(Value::Int(0))
                }
            }
        } else {
            self.error_at_current(
                "Expected number literal or identifier in `for` range".to_string(),
            );
            RangeOperand::Literal(Value::Int(0))
        }
    }

    fn emit_range_operand(&mut self, operand: &RangeOperand) {
        match operand {
            RangeOperand::Literal(value) => self.emit_load_constant(value.clone()),
            RangeOperand::Local(slot) => {
                self.emit_constant(Value::Int(*slot));
                self.emit_op(Op::LoadLocal);
            }
        }
    }

    fn break_statement(&mut self) {
        if !self.in_loop() {
            self.error_at_previous("`break` only allowed inside loops".to_string());
            return;
        }
        // Clean up body locals on this exit path; the map keeps the names,
        // the enclosing blocks still close normally.
        let scope_base = self.loops.last().expect("loop context").scope_base;
        for _ in scope_base..self.local_order.len() {
            self.emit_op(Op::PopLocal);
        }
        let jump = self.reserve_jump(Op::Jump);
        self.loops
            .last_mut()
            .expect("loop context")
            .break_jumps
            .push(jump);
        self.consume(TokenKind::Semicolon, "Expected ';' after `break`");
    }

    fn assert_statement(&mut self) {
        if !self.in_function() {
            self.error_at_previous("Only functions and classes are allowed at top level".to_string());
            return;
        }
        self.consume(TokenKind::LeftParen, "Expected '(' after 'assert'");
        self.expression(false);
        if self.match_token(TokenKind::Comma) {
            self.consume(TokenKind::String, "Expected message string after ','");
            let message = match unquote_string(&self.previous.lexeme) {
                Ok(message) => message,
                Err(error) => {
                    self.error_at_previous(error.to_string());
                    String::new()
                }
            };
            self.emit_constant(Value::string(message));
            self.emit_op(Op::AssertWithMessage);
        } else {
            self.emit_op(Op::Assert);
        }
        self.consume(TokenKind::RightParen, "Expected ')' after expression");
        self.consume(TokenKind::Semicolon, "Expected ';' after expression");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Compile one expression.  Returns whether a value was left on the
    /// stack (assignments consume theirs).
    fn expression(&mut self, can_assign: bool) -> bool {
        if starts_no_expression(self.current.kind) {
            self.error_at_current(
                "Expected identifier or literal at start of expression".to_string(),
            );
            self.advance();
            return false;
        }
        if self.current.kind != TokenKind::InstanceOf {
            if let Some(keyword) = self.current.kind.keyword_text() {
                self.error_at_current(format!(
                    "'{keyword}' is a keyword and not valid in this context"
                ));
                self.advance();
                return false;
            }
        }

        if !self.check(TokenKind::Identifier) {
            return self.logic_or(can_assign, false);
        }

        let mut leaves_value = self.call(can_assign);

        if self.check(TokenKind::Equal) {
            if self.previous.kind != TokenKind::Identifier {
                self.error_at_current("Only identifiers can be assigned to".to_string());
                return false;
            }
            let name = self.previous.lexeme.clone();
            let Some(local) = self.locals.get(&name).copied() else {
                // Unknown variable was already reported by `call`.
                return false;
            };
            if local.is_final {
                self.error_at_previous(format!("Cannot reassign to final '{name}'"));
                return false;
            }
            self.advance();
            if !can_assign {
                self.error_at_current("Assignment is not valid in the current context".to_string());
                return false;
            }
            self.expression(false);
            self.emit_constant(Value::Int(local.slot));
            self.emit_op(Op::AssignLocal);
            return false;
        }

        // Continue the binary-operator ladder from the operand already
        // compiled.
        loop {
            match self.current.kind {
                TokenKind::Or => {
                    self.logic_or(false, true);
                    leaves_value = true;
                }
                TokenKind::And => {
                    self.logic_and(false, true);
                    leaves_value = true;
                }
                TokenKind::EqualEqual | TokenKind::BangEqual => {
                    self.equality(false, true);
                    leaves_value = true;
                }
                TokenKind::LessThan
                | TokenKind::LessEqual
                | TokenKind::GreaterThan
                | TokenKind::GreaterEqual => {
                    self.comparison(false, true);
                    leaves_value = true;
                }
                TokenKind::Plus | TokenKind::Minus => {
                    self.term(false, true);
                    leaves_value = true;
                }
                TokenKind::Star | TokenKind::StarStar | TokenKind::Slash | TokenKind::Mod => {
                    self.factor(false, true);
                    leaves_value = true;
                }
                TokenKind::Semicolon
                | TokenKind::RightParen
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::EndOfFile => break,
                _ => {
                    self.error_at_current("Invalid token found in expression".to_string());
                    self.advance();
                    return leaves_value;
                }
            }
        }
        leaves_value
    }

    fn logic_or(&mut self, can_assign: bool, skip_first: bool) -> bool {
        let mut leaves_value = if skip_first {
            true
        } else {
            self.logic_and(can_assign, false)
        };
        while self.match_token(TokenKind::Or) {
            self.logic_and(false, false);
            self.emit_op(Op::Or);
            leaves_value = true;
        }
        leaves_value
    }

    fn logic_and(&mut self, can_assign: bool, skip_first: bool) -> bool {
        let mut leaves_value = if skip_first {
            true
        } else {
            self.equality(can_assign, false)
        };
        while self.match_token(TokenKind::And) {
            self.equality(false, false);
            self.emit_op(Op::And);
            leaves_value = true;
        }
        leaves_value
    }

    fn equality(&mut self, can_assign: bool, skip_first: bool) -> bool {
        let mut leaves_value = if skip_first {
            true
        } else {
            self.comparison(can_assign, false)
        };
        if self.match_token(TokenKind::EqualEqual) {
            self.comparison(false, false);
            self.emit_op(Op::Equal);
            leaves_value = true;
        } else if self.match_token(TokenKind::BangEqual) {
            self.comparison(false, false);
            self.emit_op(Op::NotEqual);
            leaves_value = true;
        }
        leaves_value
    }

    fn comparison(&mut self, can_assign: bool, skip_first: bool) -> bool {
        let mut leaves_value = if skip_first {
            true
        } else {
            self.term(can_assign, false)
        };
        if self.match_token(TokenKind::GreaterThan) {
            self.term(false, false);
            self.emit_op(Op::Greater);
            leaves_value = true;
        } else if self.match_token(TokenKind::GreaterEqual) {
            self.term(false, false);
            self.emit_op(Op::GreaterEqual);
            leaves_value = true;
        } else if self.match_token(TokenKind::LessThan) {
            self.term(false, false);
            self.emit_op(Op::Less);
            leaves_value = true;
        } else if self.match_token(TokenKind::LessEqual) {
            self.term(false, false);
            self.emit_op(Op::LessEqual);
            leaves_value = true;
        }
        leaves_value
    }

    fn term(&mut self, can_assign: bool, skip_first: bool) -> bool {
        let mut leaves_value = if skip_first {
            true
        } else {
            self.factor(can_assign, false)
        };
        loop {
            if self.match_token(TokenKind::Minus) {
                self.factor(false, false);
                self.emit_op(Op::Subtract);
                leaves_value = true;
            } else if self.match_token(TokenKind::Plus) {
                self.factor(false, false);
                self.emit_op(Op::Add);
                leaves_value = true;
            } else {
                break;
            }
        }
        leaves_value
    }

    fn factor(&mut self, can_assign: bool, skip_first: bool) -> bool {
        let mut leaves_value = if skip_first {
            true
        } else {
            self.unary(can_assign)
        };
        loop {
            if self.match_token(TokenKind::StarStar) {
                self.unary(false);
                self.emit_op(Op::Pow);
                leaves_value = true;
            } else if self.match_token(TokenKind::Star) {
                self.unary(false);
                self.emit_op(Op::Multiply);
                leaves_value = true;
            } else if self.match_token(TokenKind::Slash) {
                self.unary(false);
                self.emit_op(Op::Divide);
                leaves_value = true;
            } else if self.match_token(TokenKind::Mod) {
                self.unary(false);
                self.emit_op(Op::Mod);
                leaves_value = true;
            } else {
                break;
            }
        }
        leaves_value
    }

    fn unary(&mut self, can_assign: bool) -> bool {
        if self.match_token(TokenKind::Bang) {
            self.unary(can_assign);
            self.emit_op(Op::Not);
            true
        } else if self.match_token(TokenKind::Minus) {
            self.unary(can_assign);
            self.emit_op(Op::Negate);
            true
        } else {
            self.call(can_assign)
        }
    }

    /// Identifier handling: function/native calls, or a plain local
    /// reference.  Everything else falls through to [`Compiler::primary`].
    fn call(&mut self, can_assign: bool) -> bool {
        if !self.check(TokenKind::Identifier) {
            let leaves_value = self.primary(can_assign);
            if self.check(TokenKind::LeftParen) {
                self.error_at_current("'(' only allowed after functions".to_string());
            }
            return leaves_value;
        }

        self.advance();
        let name = self.previous.lexeme.clone();

        if self.match_token(TokenKind::LeftParen) {
            let mut num_args: i64 = 0;
            if !self.match_token(TokenKind::RightParen) {
                loop {
                    self.expression(false);
                    num_args += 1;
                    if self.match_token(TokenKind::RightParen) {
                        break;
                    }
                    self.consume(TokenKind::Comma, "Expected ',' after function call argument");
                    if self.panic_mode {
                        return true;
                    }
                }
            }
            if let Some((index, _)) = self.vm.native_index(&name) {
                self.emit_constant(Value::Int(index as i64));
                self.emit_constant(Value::Int(num_args));
                self.emit_op(Op::NativeCall);
            } else {
                let hash = hash_name(&name);
                self.vm.intern_call_name(&name, hash);
                self.emit_constant(Value::Int(hash));
                self.emit_constant(Value::Int(num_args));
                self.emit_op(Op::Call);
            }
            return true;
        }

        // Not a call: the identifier must name a local.  Loading is skipped
        // when an assignment follows; `expression` emits the store instead.
        if !self.locals.contains_key(&name) {
            self.error_at_previous(format!("Cannot find variable '{name}' in this scope"));
            return true;
        }
        if !self.check(TokenKind::Equal) {
            let slot = self.locals[&name].slot;
            self.emit_constant(Value::Int(slot));
            self.emit_op(Op::LoadLocal);
        }
        true
    }

    fn primary(&mut self, can_assign: bool) -> bool {
        if self.match_token(TokenKind::True) {
            self.emit_load_constant(Value::Bool(true));
        } else if self.match_token(TokenKind::False) {
            self.emit_load_constant(Value::Bool(false));
        } else if self.match_token(TokenKind::Integer) {
            if let Some(value) = self.parse_int_literal() {
                self.emit_load_constant(value);
            }
        } else if self.match_token(TokenKind::Double) {
            if let Some(value) = self.parse_float_literal() {
                self.emit_load_constant(value);
            }
        } else if self.match_token(TokenKind::String) {
            match unquote_string(&self.previous.lexeme) {
                Ok(text) => self.emit_load_constant(Value::string(text)),
                Err(error) => self.error_at_previous(error.to_string()),
            }
        } else if self.match_token(TokenKind::Char) {
            match unquote_char(&self.previous.lexeme) {
                Ok(c) => self.emit_load_constant(Value::Char(c)),
                Err(error) => self.error_at_previous(error.to_string()),
            }
        } else if self.match_token(TokenKind::Null) {
            self.emit_load_constant(Value::Null);
        } else if self.match_token(TokenKind::LeftParen) {
            let leaves_value = self.expression(can_assign);
            self.consume(TokenKind::RightParen, "Expected ')'");
            return leaves_value;
        } else if self.match_token(TokenKind::InstanceOf) {
            self.instance_of();
        } else if self.current.kind.is_type_ident() {
            self.cast();
        } else {
            self.error_at_current("Expected expression".to_string());
            self.advance();
            return false;
        }
        true
    }

    fn instance_of(&mut self) {
        self.consume(TokenKind::LeftParen, "Expected '(' after 'instanceof'");
        self.expression(false);
        self.consume(TokenKind::Comma, "Expected ',' after expression");

        let tag = match self.current.kind {
            TokenKind::BoolIdent => 0,
            TokenKind::CharIdent => 1,
            TokenKind::FloatIdent => 2,
            TokenKind::IntIdent => 3,
            TokenKind::Null => 4,
            TokenKind::StringIdent => 5,
            _ => {
                self.error_at_current(
                    "Expected type as second argument for `instanceof`".to_string(),
                );
                return;
            }
        };
        self.emit_constant(Value::Int(tag));
        self.emit_op(Op::CheckType);
        self.advance();
        self.consume(TokenKind::RightParen, "Expected ')'");
    }

    fn cast(&mut self) {
        let type_kind = self.current.kind;
        self.advance();
        self.consume(TokenKind::LeftParen, "Expected '(' after type ident");
        self.expression(false);
        let op = match type_kind {
            TokenKind::IntIdent => Op::CastAsInt,
            TokenKind::FloatIdent => Op::CastAsFloat,
            TokenKind::BoolIdent => Op::CastAsBool,
            TokenKind::StringIdent => Op::CastAsString,
            TokenKind::CharIdent => Op::CastAsChar,
            _ => unreachable!("cast called on a non-type token"),
        };
        self.emit_op(op);
        self.consume(TokenKind::RightParen, "Expected ')' after expression");
    }

    // ── Literal parsing ──────────────────────────────────────────────────────

    fn parse_int_literal(&mut self) -> Option<Value> {
        match self.previous.lexeme.parse::<i64>() {
            Ok(value) => Some(Value::Int(value)),
            Err(error) => {
                let message = if matches!(
                    error.kind(),
                    IntErrorKind::PosOverflow | IntErrorKind::NegOverflow
                ) {
                    "Int literal out of range"
                } else {
                    "Token could not be parsed as an Int"
                };
                self.error_at_previous(message.to_string());
                None
            }
        }
    }

    fn parse_float_literal(&mut self) -> Option<Value> {
        match self.previous.lexeme.parse::<f64>() {
            Ok(value) => Some(Value::Float(value)),
            Err(_) => {
                self.error_at_previous("Token could not be parsed as a Float".to_string());
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Free helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Tokens that can never begin an expression (binary operators and
/// terminators).  Unary `-` and `!` are valid starters and stay out.
fn starts_no_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Colon
            | TokenKind::Semicolon
            | TokenKind::RightParen
            | TokenKind::Comma
            | TokenKind::Dot
            | TokenKind::DotDot
            | TokenKind::Plus
            | TokenKind::Slash
            | TokenKind::Star
            | TokenKind::StarStar
            | TokenKind::Mod
            | TokenKind::BangEqual
            | TokenKind::Equal
            | TokenKind::EqualEqual
            | TokenKind::LessThan
            | TokenKind::GreaterThan
            | TokenKind::LessEqual
            | TokenKind::GreaterEqual
    )
}

fn escape_char(c: char) -> Option<char> {
    match c {
        't' => Some('\t'),
        'b' => Some('\u{0008}'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        'f' => Some('\u{000C}'),
        '\'' => Some('\''),
        '"' => Some('"'),
        '\\' => Some('\\'),
        _ => None,
    }
}

/// Strip quotes from a string lexeme and process its escapes.
fn unquote_string(lexeme: &str) -> Result<String, &'static str> {
    let content = &lexeme[1..lexeme.len() - 1];
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            None => return Err("Expected escape character"),
            Some(escaped) => match escape_char(escaped) {
                Some(replacement) => result.push(replacement),
                None => return Err("Unrecognised escape character"),
            },
        }
    }
    Ok(result)
}

/// Strip quotes from a char lexeme, honoring the escape table.
fn unquote_char(lexeme: &str) -> Result<char, &'static str> {
    let content = &lexeme[1..lexeme.len() - 1];
    let chars: Vec<char> = content.chars().collect();
    match chars.as_slice() {
        ['\\', escaped] => {
            escape_char(*escaped).ok_or("Unrecognised escape character")
        }
        ['\\'] => Err("Expected escape character after backslash"),
        [c] => Ok(*c),
        _ => Err("`char` must contain a single character or escape character"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(src: &str) -> Vm {
        match compile(src, "test.gr", CompilerOptions::default()) {
            Ok(vm) => vm,
            Err(diagnostics) => panic!("unexpected compile errors: {diagnostics:#?}"),
        }
    }

    fn compile_err(src: &str) -> Vec<Diagnostic> {
        compile(src, "test.gr", CompilerOptions::default())
            .err()
            .expect("expected compile errors")
    }

    fn has_message(diagnostics: &[Diagnostic], needle: &str) -> bool {
        diagnostics.iter().any(|d| d.message.contains(needle))
    }

    /// The number of constants an op consumes from the constant stream.
    fn operand_count(op: Op) -> usize {
        match op {
            Op::LoadConstant
            | Op::LoadLocal
            | Op::AssignLocal
            | Op::Dup
            | Op::CheckType
            | Op::AssertWithMessage
            | Op::CreateList
            | Op::CreateRepeatingList => 1,
            Op::Jump | Op::JumpIfFalse | Op::Call | Op::NativeCall => 2,
            _ => 0,
        }
    }

    /// Walk a function's ops against its constant list: every constant must
    /// be consumed exactly once, in order, and every jump target must fall
    /// within the function's own segment.
    fn verify_stream_alignment(vm: &Vm) {
        for function in vm.functions().iter() {
            let mut const_cursor = 0usize;
            for (op, _) in &function.op_list {
                if matches!(op, Op::Jump | Op::JumpIfFalse) {
                    let targets = &function.const_list[const_cursor..const_cursor + 2];
                    for (target, limit) in targets
                        .iter()
                        .zip([function.const_list.len(), function.op_list.len()])
                    {
                        match target {
                            Value::Int(n) => {
                                assert!(
                                    *n >= 0 && *n as usize <= limit,
                                    "jump target {n} escapes segment of `{}`",
                                    function.name
                                );
                            }
                            other => panic!("jump operand is not an Int: {other:?}"),
                        }
                    }
                }
                const_cursor += operand_count(*op);
                assert!(
                    const_cursor <= function.const_list.len(),
                    "`{}` consumes more constants than it has",
                    function.name
                );
            }
            assert_eq!(
                const_cursor,
                function.const_list.len(),
                "`{}` leaves unconsumed constants",
                function.name
            );
        }
    }

    #[test]
    fn test_compile_minimal_main() {
        let vm = compile_ok("func main():\nend");
        verify_stream_alignment(&vm);
    }

    #[test]
    fn test_compile_arithmetic_statement() {
        let vm = compile_ok("func main():\n  println(1 + 2 * 3);\nend");
        verify_stream_alignment(&vm);
    }

    #[test]
    fn test_compile_var_and_assignment() {
        let vm = compile_ok("func main():\n  var x = 1;\n  x = x + 1;\nend");
        verify_stream_alignment(&vm);
    }

    #[test]
    fn test_compile_if_else_chain() {
        let vm = compile_ok(
            "func main():\n  var x = 1;\n  if x == 1:\n    println(1);\n  else if x == 2:\n    println(2);\n  else:\n    println(3);\n  end\nend",
        );
        verify_stream_alignment(&vm);
    }

    #[test]
    fn test_compile_while_with_break() {
        let vm = compile_ok(
            "func main():\n  var x = 0;\n  while true:\n    var y = x;\n    if y > 3:\n      break;\n    end\n    x = x + 1;\n  end\nend",
        );
        verify_stream_alignment(&vm);
    }

    #[test]
    fn test_compile_for_loop() {
        let vm = compile_ok(
            "func main():\n  var x = 0;\n  for i in 0..5:\n    x = x + i;\n  end\nend",
        );
        verify_stream_alignment(&vm);
    }

    #[test]
    fn test_compile_for_loop_with_step_and_float_bounds() {
        let vm = compile_ok("func main():\n  for i in 0.5..9.5 by 2:\n    println(i);\n  end\nend");
        verify_stream_alignment(&vm);
    }

    #[test]
    fn test_compile_functions_and_calls() {
        let vm = compile_ok(
            "func add(a, b):\n  return a + b;\nend\nfunc main():\n  println(add(1, 2));\nend",
        );
        verify_stream_alignment(&vm);
    }

    #[test]
    fn test_compile_casts_and_instanceof() {
        let vm = compile_ok(
            "func main():\n  var x = Int(\"42\");\n  assert(instanceof(x, Int), \"int\");\n  println(String(x));\nend",
        );
        verify_stream_alignment(&vm);
    }

    #[test]
    fn test_reassign_final_is_an_error() {
        let diagnostics = compile_err("func main():\n  final x = 1;\n  x = 2;\nend");
        assert!(has_message(&diagnostics, "Cannot reassign to final 'x'"));
    }

    #[test]
    fn test_final_requires_initializer() {
        let diagnostics = compile_err("func main():\n  final x;\nend");
        assert!(has_message(&diagnostics, "Must assign to `final` upon declaration"));
    }

    #[test]
    fn test_top_level_statement_rejected() {
        let diagnostics = compile_err("println(1);");
        assert!(has_message(
            &diagnostics,
            "Only functions and classes are allowed at top level"
        ));
    }

    #[test]
    fn test_duplicate_local_rejected() {
        let diagnostics = compile_err("func main():\n  var x = 1;\n  var x = 2;\nend");
        assert!(has_message(
            &diagnostics,
            "A local variable with the same name already exists"
        ));
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let diagnostics = compile_err("func f():\nend\nfunc f():\nend\nfunc main():\nend");
        assert!(has_message(&diagnostics, "Duplicate function definitions"));
    }

    #[test]
    fn test_return_from_main_rejected() {
        let diagnostics = compile_err("func main():\n  return;\nend");
        assert!(has_message(&diagnostics, "Cannot return from main function"));
    }

    #[test]
    fn test_chained_assignment_rejected() {
        let diagnostics =
            compile_err("func main():\n  var x = 1;\n  var y = 2;\n  x = y = 3;\nend");
        assert!(has_message(
            &diagnostics,
            "Assignment is not valid in the current context"
        ));
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        let diagnostics = compile_err("func main():\n  break;\nend");
        assert!(has_message(&diagnostics, "`break` only allowed inside loops"));
    }

    #[test]
    fn test_nested_function_rejected() {
        let diagnostics = compile_err("func main():\n  func inner():\n  end\nend");
        assert!(has_message(&diagnostics, "Functions are only allowed at top level"));
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let diagnostics = compile_err("func main():\n  println(nope);\nend");
        assert!(has_message(&diagnostics, "Cannot find variable 'nope' in this scope"));
    }

    #[test]
    fn test_unterminated_if_rejected() {
        let diagnostics = compile_err("func main():\n  if true:\n    println(1);\n");
        assert!(has_message(&diagnostics, "Unterminated `if` statement"));
    }

    #[test]
    fn test_final_for_variable_rejected() {
        let diagnostics =
            compile_err("func main():\n  final i = 0;\n  for i in 0..3:\n  end\nend");
        assert!(has_message(&diagnostics, "Cannot reassign to final 'i'"));
    }

    #[test]
    fn test_second_else_rejected() {
        let diagnostics = compile_err(
            "func main():\n  if true:\n  else:\n    println(1);\n  else:\n    println(2);\n  end\nend",
        );
        assert!(has_message(&diagnostics, "Only one `else` branch is allowed"));
    }

    #[test]
    fn test_int_literal_out_of_range() {
        let diagnostics = compile_err("func main():\n  println(99999999999999999999);\nend");
        assert!(has_message(&diagnostics, "Int literal out of range"));
    }

    #[test]
    fn test_keyword_in_expression_rejected() {
        let diagnostics = compile_err("func main():\n  println(var);\nend");
        assert!(has_message(&diagnostics, "keyword and not valid in this context"));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(unquote_string("\"a\\tb\"").unwrap(), "a\tb");
        assert_eq!(unquote_string("\"say \\\"hi\\\"\"").unwrap(), "say \"hi\"");
        assert!(unquote_string("\"bad \\q\"").is_err());
        assert_eq!(unquote_char("'\\n'").unwrap(), '\n');
        assert_eq!(unquote_char("'x'").unwrap(), 'x');
        assert!(unquote_char("'xy'").is_err());
    }

    #[test]
    fn test_warning_on_reused_for_variable() {
        let options = CompilerOptions {
            verbose: true,
            warnings_as_errors: true,
        };
        let result = compile(
            "func main():\n  var i = 0;\n  for i in 0..3:\n  end\nend",
            "test.gr",
            options,
        );
        let diagnostics = result.err().expect("warnings promoted to errors");
        assert!(diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("Reusing existing local")));
    }
}
