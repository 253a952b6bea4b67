//! The Grace virtual machine.
//!
//! The VM is a **stack-based interpreter** over the linked global op and
//! constant arrays.  During compilation it owns the per-function tables the
//! compiler emits into; [`Vm::combine_functions`] then concatenates them
//! (`main` first, remaining functions in declaration order) while recording
//! each function's `op_start`/`const_start`.
//!
//! # Execution model
//!
//! - `op_cur`/`const_cur` are absolute cursors into the linked arrays; every
//!   opcode that carries operands consumes them from `const_cur` in emission
//!   order.
//! - `op_offsets`/`const_offsets` hold the executing function's segment
//!   starts; jump targets are relative to the top entries.
//! - Call frames are linked through the operand stack: `Call` pushes the
//!   return cursors as two `Int` values under the callee's frame, `Return`
//!   pops them to restore the caller.
//! - The call-stack record `(caller, callee, line)` exists purely for error
//!   traces.
//!
//! # Errors
//!
//! Any runtime error aborts the loop, clears the locals array (releasing
//! object references), prints the call-stack trace to stderr, and returns
//! [`InterpretResult::RuntimeError`] (or `RuntimeAssertionFailed` for a
//! failed `assert`).  `SHOW_FULL_CALLSTACK` in the environment disables the
//! 15-frame trace truncation.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use crate::bytecode::{hash_name, Function, FunctionTable, Op};
use crate::natives::{self, NativeFunction};
use crate::value::Value;

/// How many call-stack records an error trace shows before truncating.
const CALLSTACK_DISPLAY_LIMIT: usize = 15;

// ─────────────────────────────────────────────────────────────────────────────
// Results and error kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of executing a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    RuntimeOk,
    RuntimeError,
    RuntimeAssertionFailed,
}

/// The runtime error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    AssertionFailed,
    FunctionNotFound,
    IncorrectArgCount,
    IndexOutOfRange,
    InvalidArgument,
    InvalidIterator,
    InvalidCast,
    InvalidOperand,
    InvalidType,
    ThrownException,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeErrorKind::AssertionFailed => "AssertionFailed",
            RuntimeErrorKind::FunctionNotFound => "FunctionNotFound",
            RuntimeErrorKind::IncorrectArgCount => "IncorrectArgCount",
            RuntimeErrorKind::IndexOutOfRange => "IndexOutOfRange",
            RuntimeErrorKind::InvalidArgument => "InvalidArgument",
            RuntimeErrorKind::InvalidIterator => "InvalidIterator",
            RuntimeErrorKind::InvalidCast => "InvalidCast",
            RuntimeErrorKind::InvalidOperand => "InvalidOperand",
            RuntimeErrorKind::InvalidType => "InvalidType",
            RuntimeErrorKind::ThrownException => "ThrownException",
        };
        write!(f, "{name}")
    }
}

/// An in-flight runtime error, caught at the top of [`Vm::run`].
struct RuntimeError {
    kind: RuntimeErrorKind,
    message: String,
    line: u32,
}

type ExecResult<T> = Result<T, RuntimeError>;

// ─────────────────────────────────────────────────────────────────────────────
// Vm
// ─────────────────────────────────────────────────────────────────────────────

/// A call-stack record: `(caller_hash, callee_hash, call_site_line)`.
type CallRecord = (i64, i64, u32);

/// The Grace virtual machine.
pub struct Vm {
    /// Compiled functions (per-function tables until linking).
    functions: FunctionTable,
    /// The function currently receiving emitted ops (compile time).
    current_function: i64,
    /// Names seen at call sites, so `FunctionNotFound` can name the callee.
    call_names: HashMap<i64, String>,
    /// Linked global op array.
    ops: Vec<(Op, u32)>,
    /// Linked global constant array.
    consts: Vec<Value>,
    /// Registered native functions; `NativeCall` indexes into this.
    natives: Vec<NativeFunction>,
    /// Source file name (for traces) and its hash (the synthetic caller of
    /// `main`).
    file_name: String,
    file_hash: i64,
    /// Source text by line, for quoting in error traces.
    source_lines: Vec<String>,
    /// Where `print` output goes.  Swappable for tests.
    out: Box<dyn Write>,
}

impl Vm {
    pub fn new(file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let file_hash = hash_name(&file_name);
        Self {
            functions: FunctionTable::new(),
            current_function: 0,
            call_names: HashMap::new(),
            ops: Vec::new(),
            consts: Vec::new(),
            natives: natives::register_all(),
            file_name,
            file_hash,
            source_lines: Vec::new(),
            out: Box::new(std::io::stdout()),
        }
    }

    /// Redirect program output (tests capture stdout this way).
    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    /// Store the program source for line quoting in error traces.
    pub fn set_source(&mut self, source: &str) {
        self.source_lines = source.lines().map(str::to_string).collect();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Compile-time interface (used by the compiler)
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a new function; subsequent [`Vm::push_op`]/[`Vm::push_constant`]
    /// calls emit into it.  Returns `false` when the name is already taken.
    pub fn begin_function(&mut self, name: &str, arity: i64, line: u32) -> bool {
        let hash = hash_name(name);
        if !self.functions.insert(Function::new(name, hash, arity, line)) {
            return false;
        }
        self.current_function = hash;
        true
    }

    /// The name of the function currently being compiled.
    pub fn current_function_name(&self) -> &str {
        self.functions
            .name_of(self.current_function)
            .unwrap_or("")
    }

    pub fn push_op(&mut self, op: Op, line: u32) {
        if let Some(f) = self.functions.get_mut(self.current_function) {
            f.op_list.push((op, line));
        }
    }

    pub fn push_constant(&mut self, value: Value) {
        if let Some(f) = self.functions.get_mut(self.current_function) {
            f.const_list.push(value);
        }
    }

    /// Number of ops emitted so far in the current function.
    pub fn num_ops(&self) -> usize {
        self.functions
            .get(self.current_function)
            .map_or(0, |f| f.op_list.len())
    }

    /// Number of constants emitted so far in the current function.
    pub fn num_constants(&self) -> usize {
        self.functions
            .get(self.current_function)
            .map_or(0, |f| f.const_list.len())
    }

    /// Overwrite a previously reserved constant (jump patching).
    pub fn set_constant(&mut self, index: usize, value: Value) {
        if let Some(f) = self.functions.get_mut(self.current_function) {
            f.const_list[index] = value;
        }
    }

    /// Remember the name behind a call-site hash for error messages.
    pub fn intern_call_name(&mut self, name: &str, hash: i64) {
        self.call_names.entry(hash).or_insert_with(|| name.to_string());
    }

    /// The compiled function table (inspection and tests).
    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Look up a native function by name, returning its table index and
    /// arity.
    pub fn native_index(&self, name: &str) -> Option<(usize, i64)> {
        self.natives
            .iter()
            .position(|n| n.name == name)
            .map(|i| (i, self.natives[i].arity))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Link step
    // ─────────────────────────────────────────────────────────────────────────

    /// Concatenate every function's op/const lists into the global arrays:
    /// `main` first, then the rest in declaration order, recording each
    /// function's segment offsets.  Fails when no `main` exists.
    pub fn combine_functions(&mut self) -> Result<(), String> {
        let main_hash = hash_name("main");
        if self.functions.get(main_hash).is_none() {
            return Err("could not find `main` function".to_string());
        }

        let mut order = vec![main_hash];
        order.extend(self.functions.hashes().into_iter().filter(|h| *h != main_hash));

        for hash in order {
            let function = self.functions.get_mut(hash).expect("function vanished");
            function.op_start = self.ops.len();
            function.const_start = self.consts.len();
            self.ops.append(&mut function.op_list);
            self.consts.append(&mut function.const_list);
        }
        Ok(())
    }

    /// Dump the compiled ops per function to stderr (verbose mode).
    ///
    /// Only meaningful before [`Vm::combine_functions`] moves the lists.
    pub fn dump_ops(&self) {
        for function in self.functions.iter() {
            eprintln!("<function `{}`>", function.name);
            for (op, _) in &function.op_list {
                eprintln!("\t{op:?}");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Link and run the program.  `program_args` are handed to `main` as a
    /// `List` of `String`s when it declares a parameter.
    pub fn run(&mut self, program_args: &[String]) -> InterpretResult {
        if let Err(message) = self.combine_functions() {
            eprintln!("ERROR: {message}. Stopping execution.");
            return InterpretResult::RuntimeError;
        }

        let main_hash = hash_name("main");
        let main = self.functions.get(main_hash).expect("main exists after linking");
        let main_arity = main.arity;

        let mut state = ExecState {
            op_cur: 0,
            const_cur: 0,
            op_offsets: vec![0],
            const_offsets: vec![0],
            locals_offsets: vec![0],
            value_stack: Vec::with_capacity(256),
            locals: Vec::with_capacity(64),
            call_stack: vec![(self.file_hash, main_hash, 1)],
            current_func: main_hash,
        };

        if main_arity == 1 {
            let args = program_args.iter().map(Value::string).collect();
            state.locals.push(Value::list(args));
        }

        match self.execute(&mut state) {
            Ok(()) => InterpretResult::RuntimeOk,
            Err(error) => {
                state.locals.clear();
                self.report_runtime_error(&error, &state.call_stack);
                if error.kind == RuntimeErrorKind::AssertionFailed {
                    InterpretResult::RuntimeAssertionFailed
                } else {
                    InterpretResult::RuntimeError
                }
            }
        }
    }

    fn execute(&mut self, state: &mut ExecState) -> ExecResult<()> {
        while state.op_cur < self.ops.len() {
            let (op, line) = self.ops[state.op_cur];
            state.op_cur += 1;

            match op {
                // ── Arithmetic / logic ───────────────────────────────────────
                Op::Add => self.binary_op(state, line, Value::add)?,
                Op::Subtract => self.binary_op(state, line, Value::subtract)?,
                Op::Multiply => self.binary_op(state, line, Value::multiply)?,
                Op::Divide => self.binary_op(state, line, Value::divide)?,
                Op::Mod => self.binary_op(state, line, Value::modulo)?,
                Op::Pow => self.binary_op(state, line, Value::power)?,
                Op::And => self.binary_op(state, line, Value::logical_and)?,
                Op::Or => self.binary_op(state, line, Value::logical_or)?,
                Op::Less => self.binary_op(state, line, Value::less)?,
                Op::LessEqual => self.binary_op(state, line, Value::less_equal)?,
                Op::Greater => self.binary_op(state, line, Value::greater)?,
                Op::GreaterEqual => self.binary_op(state, line, Value::greater_equal)?,
                Op::Equal => {
                    let (a, b) = state.pop_two();
                    state.value_stack.push(Value::Bool(a.equals(&b)));
                }
                Op::NotEqual => {
                    let (a, b) = state.pop_two();
                    state.value_stack.push(Value::Bool(!a.equals(&b)));
                }

                // ── Unary ────────────────────────────────────────────────────
                Op::Negate => {
                    let v = state.pop();
                    match v.negate() {
                        Ok(result) => state.value_stack.push(result),
                        Err(message) => {
                            return Err(RuntimeError {
                                kind: RuntimeErrorKind::InvalidOperand,
                                message,
                                line,
                            })
                        }
                    }
                }
                Op::Not => {
                    let v = state.pop();
                    state.value_stack.push(v.not());
                }

                // ── Stack / locals ───────────────────────────────────────────
                Op::LoadConstant => {
                    let v = self.consts[state.const_cur].clone();
                    state.const_cur += 1;
                    state.value_stack.push(v);
                }
                Op::LoadLocal => {
                    let slot = self.read_int_operand(state);
                    let base = *state.locals_offsets.last().expect("locals offset");
                    let v = state.locals[base + slot as usize].clone();
                    state.value_stack.push(v);
                }
                Op::AssignLocal => {
                    let slot = self.read_int_operand(state);
                    let base = *state.locals_offsets.last().expect("locals offset");
                    let v = state.pop();
                    let index = base + slot as usize;
                    if index < state.locals.len() {
                        state.locals[index] = v;
                    } else {
                        // Slots are declared in order, so this is only ever
                        // one past the end.
                        state.locals.push(v);
                    }
                }
                Op::Pop => {
                    state.pop();
                }
                Op::PopLocal => {
                    state.locals.pop();
                }
                Op::DeclareLocal => {
                    state.locals.push(Value::Null);
                }
                Op::Dup => {
                    let count = self.read_int_operand(state);
                    let v = state.value_stack.last().expect("value to duplicate").clone();
                    for _ in 0..count {
                        state.value_stack.push(v.clone());
                    }
                }

                // ── Control flow ─────────────────────────────────────────────
                Op::Jump => {
                    let (const_idx, op_idx) = self.read_jump_operands(state);
                    state.jump_to(const_idx, op_idx);
                }
                Op::JumpIfFalse => {
                    let (const_idx, op_idx) = self.read_jump_operands(state);
                    let condition = state.pop();
                    if !condition.is_truthy() {
                        state.jump_to(const_idx, op_idx);
                    }
                }
                Op::Return => {
                    let return_value = state.pop();
                    state.call_stack.pop();
                    let saved_const = state.pop_saved_cursor();
                    let saved_op = state.pop_saved_cursor();
                    state.const_cur = saved_const;
                    state.op_cur = saved_op;
                    state.value_stack.push(return_value);
                    let base = state.locals_offsets.pop().expect("locals offset");
                    state.locals.truncate(base);
                    state.op_offsets.pop();
                    state.const_offsets.pop();
                    state.current_func = state
                        .call_stack
                        .last()
                        .map(|(_, callee, _)| *callee)
                        .unwrap_or(state.current_func);
                }
                Op::Exit => {
                    state.op_cur = self.ops.len();
                }

                // ── Calls ────────────────────────────────────────────────────
                Op::Call => {
                    let name_hash = self.read_int_operand(state);
                    let num_args = self.read_int_operand(state);
                    self.call_function(state, name_hash, num_args, line)?;
                }
                Op::NativeCall => {
                    let index = self.read_int_operand(state) as usize;
                    let num_args = self.read_int_operand(state);
                    self.call_native(state, index, num_args, line)?;
                }

                // ── Casts / type checks ──────────────────────────────────────
                Op::CastAsInt => self.cast_op(state, line, Value::cast_int)?,
                Op::CastAsFloat => self.cast_op(state, line, Value::cast_float)?,
                Op::CastAsBool => {
                    let v = state.pop();
                    state.value_stack.push(v.cast_bool());
                }
                Op::CastAsString => {
                    let v = state.pop();
                    state.value_stack.push(v.cast_string());
                }
                Op::CastAsChar => self.cast_op(state, line, Value::cast_char)?,
                Op::CastAsList => {
                    let v = state.pop();
                    state.value_stack.push(v.cast_list());
                }
                Op::CheckType => {
                    let tag = self.read_int_operand(state);
                    let v = state.pop();
                    state.value_stack.push(Value::Bool(v.matches_type_tag(tag)));
                }

                // ── I/O ──────────────────────────────────────────────────────
                Op::Print => {
                    let v = state.value_stack.last().expect("value to print");
                    let _ = write!(self.out, "{v}");
                    let _ = self.out.flush();
                }
                Op::PrintLn => {
                    let v = state.value_stack.last().expect("value to print");
                    let _ = writeln!(self.out, "{v}");
                }
                Op::PrintEmptyLine => {
                    let _ = writeln!(self.out);
                }
                Op::PrintTab => {
                    let _ = write!(self.out, "\t");
                    let _ = self.out.flush();
                }

                // ── Containers ───────────────────────────────────────────────
                Op::CreateList => {
                    let count = self.read_int_operand(state) as usize;
                    let at = state.value_stack.len() - count;
                    let items = state.value_stack.split_off(at);
                    state.value_stack.push(Value::list(items));
                }
                Op::CreateEmptyList => {
                    state.value_stack.push(Value::list(Vec::new()));
                }
                Op::CreateRepeatingList => {
                    let count = self.read_int_operand(state) as usize;
                    let v = state.pop();
                    state.value_stack.push(Value::list(vec![v; count]));
                }

                // ── Assertions ───────────────────────────────────────────────
                Op::Assert => {
                    let condition = state.pop();
                    if !condition.is_truthy() {
                        return Err(RuntimeError {
                            kind: RuntimeErrorKind::AssertionFailed,
                            message: "assertion failed".to_string(),
                            line,
                        });
                    }
                }
                Op::AssertWithMessage => {
                    let message = self.consts[state.const_cur].clone();
                    state.const_cur += 1;
                    let condition = state.pop();
                    if !condition.is_truthy() {
                        return Err(RuntimeError {
                            kind: RuntimeErrorKind::AssertionFailed,
                            message: message.to_string(),
                            line,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Opcode helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn binary_op(
        &self,
        state: &mut ExecState,
        line: u32,
        op: fn(&Value, &Value) -> Result<Value, String>,
    ) -> ExecResult<()> {
        let (a, b) = state.pop_two();
        match op(&a, &b) {
            Ok(result) => {
                state.value_stack.push(result);
                Ok(())
            }
            Err(message) => Err(RuntimeError {
                kind: RuntimeErrorKind::InvalidOperand,
                message,
                line,
            }),
        }
    }

    fn cast_op(
        &self,
        state: &mut ExecState,
        line: u32,
        cast: fn(&Value) -> Result<Value, String>,
    ) -> ExecResult<()> {
        let v = state.pop();
        match cast(&v) {
            Ok(result) => {
                state.value_stack.push(result);
                Ok(())
            }
            Err(message) => Err(RuntimeError {
                kind: RuntimeErrorKind::InvalidCast,
                message,
                line,
            }),
        }
    }

    fn read_int_operand(&self, state: &mut ExecState) -> i64 {
        let v = &self.consts[state.const_cur];
        state.const_cur += 1;
        match v {
            Value::Int(n) => *n,
            other => panic!("opcode operand must be an Int, got {other:?}"),
        }
    }

    fn read_jump_operands(&self, state: &mut ExecState) -> (usize, usize) {
        let const_idx = self.read_int_operand(state) as usize;
        let op_idx = self.read_int_operand(state) as usize;
        (const_idx, op_idx)
    }

    fn call_function(
        &self,
        state: &mut ExecState,
        name_hash: i64,
        num_args: i64,
        line: u32,
    ) -> ExecResult<()> {
        let Some(callee) = self.functions.get(name_hash) else {
            let name = self
                .call_names
                .get(&name_hash)
                .map(String::as_str)
                .unwrap_or("<unknown>");
            return Err(RuntimeError {
                kind: RuntimeErrorKind::FunctionNotFound,
                message: format!("cannot find function '{name}'"),
                line,
            });
        };
        if num_args != callee.arity {
            return Err(RuntimeError {
                kind: RuntimeErrorKind::IncorrectArgCount,
                message: format!(
                    "'{}' expects {} arguments but got {}",
                    callee.name, callee.arity, num_args
                ),
                line,
            });
        }
        let (op_start, const_start) = (callee.op_start, callee.const_start);

        // New frame: locals base, argument slots filled right-to-left so the
        // leftmost argument lands in slot 0.
        let base = state.locals.len();
        state.locals_offsets.push(base);
        state
            .locals
            .resize(base + num_args as usize, Value::Null);
        for i in 0..num_args as usize {
            let v = state.pop();
            state.locals[base + num_args as usize - 1 - i] = v;
        }

        // Return address, then the trace record.
        state.value_stack.push(Value::Int(state.op_cur as i64));
        state.value_stack.push(Value::Int(state.const_cur as i64));
        state.call_stack.push((state.current_func, name_hash, line));

        state.op_cur = op_start;
        state.const_cur = const_start;
        state.op_offsets.push(op_start);
        state.const_offsets.push(const_start);
        state.current_func = name_hash;
        Ok(())
    }

    fn call_native(
        &self,
        state: &mut ExecState,
        index: usize,
        num_args: i64,
        line: u32,
    ) -> ExecResult<()> {
        let native = &self.natives[index];
        if num_args != native.arity {
            return Err(RuntimeError {
                kind: RuntimeErrorKind::IncorrectArgCount,
                message: format!(
                    "'{}' expects {} arguments but got {}",
                    native.name, native.arity, num_args
                ),
                line,
            });
        }
        let at = state.value_stack.len() - num_args as usize;
        let args = state.value_stack.split_off(at);
        match (native.func)(&args) {
            Ok(result) => {
                state.value_stack.push(result);
                Ok(())
            }
            Err(e) => Err(RuntimeError {
                kind: e.kind,
                message: e.message,
                line,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Error reporting
    // ─────────────────────────────────────────────────────────────────────────

    fn function_display_name(&self, hash: i64) -> &str {
        if hash == self.file_hash {
            &self.file_name
        } else {
            self.functions
                .name_of(hash)
                .or_else(|| self.call_names.get(&hash).map(String::as_str))
                .unwrap_or("<unknown>")
        }
    }

    fn source_line(&self, line: u32) -> &str {
        if line == 0 {
            return "";
        }
        self.source_lines
            .get(line as usize - 1)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Print the call-stack trace and error diagnostic to stderr.
    fn report_runtime_error(&self, error: &RuntimeError, call_stack: &[CallRecord]) {
        let full = std::env::var_os("SHOW_FULL_CALLSTACK").is_some_and(|v| !v.is_empty());

        eprintln!("Call stack (most recent call last):");
        let mut records: &[CallRecord] = call_stack;
        if !full && records.len() > CALLSTACK_DISPLAY_LIMIT {
            let omitted = records.len() - CALLSTACK_DISPLAY_LIMIT;
            eprintln!("... ({omitted} calls omitted, set SHOW_FULL_CALLSTACK to see them)");
            records = &records[records.len() - CALLSTACK_DISPLAY_LIMIT..];
        }
        for (caller, _, line) in records {
            eprintln!("line {}, in {}:", line, self.function_display_name(*caller));
            eprintln!("   {}", self.source_line(*line));
        }
        if let Some((_, callee, _)) = call_stack.last() {
            eprintln!("line {}, in {}:", error.line, self.function_display_name(*callee));
            eprintln!("   {}", self.source_line(error.line));
        }
        eprintln!(
            "ERROR: [line {}] {}: {}. Stopping execution.",
            error.line, error.kind, error.message
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution state
// ─────────────────────────────────────────────────────────────────────────────

/// All mutable interpreter state for one [`Vm::run`].
struct ExecState {
    op_cur: usize,
    const_cur: usize,
    op_offsets: Vec<usize>,
    const_offsets: Vec<usize>,
    locals_offsets: Vec<usize>,
    value_stack: Vec<Value>,
    locals: Vec<Value>,
    call_stack: Vec<CallRecord>,
    current_func: i64,
}

impl ExecState {
    fn pop(&mut self) -> Value {
        self.value_stack.pop().expect("value stack underflow")
    }

    fn pop_two(&mut self) -> (Value, Value) {
        let b = self.pop();
        let a = self.pop();
        (a, b)
    }

    /// Pop a cursor saved by `Call` as an `Int`.
    fn pop_saved_cursor(&mut self) -> usize {
        match self.pop() {
            Value::Int(n) => n as usize,
            other => panic!("saved cursor must be an Int, got {other:?}"),
        }
    }

    fn jump_to(&mut self, const_idx: usize, op_idx: usize) {
        self.op_cur = op_idx + self.op_offsets.last().expect("op offset");
        self.const_cur = const_idx + self.const_offsets.last().expect("const offset");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_main_vm() -> Vm {
        let mut vm = Vm::new("test.gr");
        vm.begin_function("main", 0, 1);
        vm.push_op(Op::Exit, 1);
        vm
    }

    #[test]
    fn test_link_requires_main() {
        let mut vm = Vm::new("test.gr");
        vm.begin_function("helper", 0, 1);
        assert!(vm.combine_functions().is_err());
    }

    #[test]
    fn test_link_puts_main_first() {
        let mut vm = Vm::new("test.gr");
        vm.begin_function("helper", 0, 1);
        vm.push_op(Op::PrintEmptyLine, 1);
        vm.push_op(Op::PrintEmptyLine, 1);
        vm.begin_function("main", 0, 3);
        vm.push_op(Op::Exit, 3);
        vm.combine_functions().unwrap();

        let main = vm.functions.get(hash_name("main")).unwrap();
        assert_eq!(main.op_start, 0);
        let helper = vm.functions.get(hash_name("helper")).unwrap();
        assert_eq!(helper.op_start, 1);
        assert_eq!(vm.ops.len(), 3);
    }

    #[test]
    fn test_segment_bounds_after_linking() {
        let mut vm = Vm::new("test.gr");
        vm.begin_function("a", 0, 1);
        vm.push_op(Op::PrintEmptyLine, 1);
        vm.push_constant(Value::Int(1));
        vm.begin_function("main", 0, 2);
        vm.push_op(Op::Exit, 2);
        vm.combine_functions().unwrap();

        // op_start + op_list length stays within the global arrays.
        for f in vm.functions.iter() {
            assert!(f.op_start <= vm.ops.len());
            assert!(f.const_start <= vm.consts.len());
        }
    }

    #[test]
    fn test_run_empty_main() {
        let mut vm = empty_main_vm();
        assert_eq!(vm.run(&[]), InterpretResult::RuntimeOk);
    }

    #[test]
    fn test_missing_main_is_runtime_error() {
        let mut vm = Vm::new("test.gr");
        vm.begin_function("not_main", 0, 1);
        assert_eq!(vm.run(&[]), InterpretResult::RuntimeError);
    }

    #[test]
    fn test_duplicate_function_rejected_by_begin() {
        let mut vm = Vm::new("test.gr");
        assert!(vm.begin_function("f", 0, 1));
        assert!(!vm.begin_function("f", 2, 4));
    }

    #[test]
    fn test_native_lookup() {
        let vm = Vm::new("test.gr");
        let (index, arity) = vm.native_index("__native_sqrt").unwrap();
        assert_eq!(index, 0);
        assert_eq!(arity, 1);
        assert!(vm.native_index("no_such_native").is_none());
    }

    #[test]
    fn test_add_and_print() {
        let mut vm = Vm::new("test.gr");
        vm.begin_function("main", 0, 1);
        vm.push_constant(Value::Int(2));
        vm.push_op(Op::LoadConstant, 1);
        vm.push_constant(Value::Int(3));
        vm.push_op(Op::LoadConstant, 1);
        vm.push_op(Op::Add, 1);
        vm.push_op(Op::PrintLn, 1);
        vm.push_op(Op::Pop, 1);
        vm.push_op(Op::Exit, 1);

        let buf = crate::test_support::SharedBuf::default();
        vm.set_output(Box::new(buf.clone()));
        assert_eq!(vm.run(&[]), InterpretResult::RuntimeOk);
        assert_eq!(buf.contents(), "5\n");
    }

    #[test]
    fn test_invalid_operand_stops_execution() {
        let mut vm = Vm::new("test.gr");
        vm.begin_function("main", 0, 1);
        vm.push_constant(Value::string("a"));
        vm.push_op(Op::LoadConstant, 1);
        vm.push_constant(Value::Int(1));
        vm.push_op(Op::LoadConstant, 1);
        vm.push_op(Op::Add, 1);
        vm.push_op(Op::Exit, 1);
        assert_eq!(vm.run(&[]), InterpretResult::RuntimeError);
    }

    #[test]
    fn test_failed_assert_result() {
        let mut vm = Vm::new("test.gr");
        vm.begin_function("main", 0, 1);
        vm.push_constant(Value::Bool(false));
        vm.push_op(Op::LoadConstant, 1);
        vm.push_op(Op::Assert, 1);
        vm.push_op(Op::Exit, 1);
        assert_eq!(vm.run(&[]), InterpretResult::RuntimeAssertionFailed);
    }

    #[test]
    fn test_jump_skips_ops() {
        // main: Jump over a PrintLn of 1, print 2 instead.
        let mut vm = Vm::new("test.gr");
        vm.begin_function("main", 0, 1);
        vm.push_constant(Value::Int(3)); // const_idx target
        vm.push_constant(Value::Int(4)); // op_idx target
        vm.push_op(Op::Jump, 1);
        vm.push_constant(Value::Int(1));
        vm.push_op(Op::LoadConstant, 1); // skipped
        vm.push_op(Op::PrintLn, 1); // skipped
        vm.push_op(Op::Pop, 1); // skipped
        // target: op 4, const 3
        vm.push_constant(Value::Int(2));
        vm.push_op(Op::LoadConstant, 1);
        vm.push_op(Op::PrintLn, 1);
        vm.push_op(Op::Pop, 1);
        vm.push_op(Op::Exit, 1);

        let buf = crate::test_support::SharedBuf::default();
        vm.set_output(Box::new(buf.clone()));
        assert_eq!(vm.run(&[]), InterpretResult::RuntimeOk);
        assert_eq!(buf.contents(), "2\n");
    }
}
