//! Bytecode representation for the Grace virtual machine.
//!
//! A compiled Grace function is a pair of flat lists: `(Op, line)` tuples and
//! a constant list of [`Value`]s.  Opcodes with operands do not encode them
//! inline; instead each operand is appended to the constant list at
//! compile time and consumed from a running cursor at execution time, in
//! emission order.  Jump targets are therefore plain constants that the
//! compiler can overwrite once the destination is known.
//!
//! After compilation the VM concatenates every function's lists into two
//! global arrays ([link step](crate::vm::Vm::combine_functions)), recording
//! each function's `op_start`/`const_start` so jumps can be resolved
//! relative to the executing function's segment.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::value::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Op
// ─────────────────────────────────────────────────────────────────────────────

/// Every instruction the Grace VM can execute.
///
/// Operand constants are listed in brackets and are consumed left-to-right
/// from the constant stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // ── Arithmetic / logic (pop 2, push 1) ───────────────────────────────────
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Pow,
    And,
    Or,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // ── Unary (pop 1, push 1) ────────────────────────────────────────────────
    Negate,
    Not,

    // ── Stack / locals ───────────────────────────────────────────────────────
    /// Push the next constant onto the value stack.
    LoadConstant,
    /// `[slot: i64]` — push the local in `slot`.
    LoadLocal,
    /// Discard the top of the value stack.
    Pop,
    /// Remove the most recently declared local.
    PopLocal,
    /// Reserve the next local slot, initialised to null.
    DeclareLocal,
    /// `[slot: i64]` — pop a value and store it in `slot`.
    AssignLocal,
    /// `[count: i64]` — duplicate the top of the stack `count` times.
    Dup,

    // ── Control flow ─────────────────────────────────────────────────────────
    /// `[const_idx: i64, op_idx: i64]` — unconditional jump, indices relative
    /// to the current function's segment.
    Jump,
    /// `[const_idx: i64, op_idx: i64]` — pop a value, jump when it is falsy.
    JumpIfFalse,
    /// Pop the return value, restore the caller, push the return value back.
    Return,
    /// Terminate execution immediately with success.
    Exit,

    // ── Calls ────────────────────────────────────────────────────────────────
    /// `[name_hash: i64, num_args: i64]` — call a Grace function.
    Call,
    /// `[index: i64, num_args: i64]` — call a registered native function.
    NativeCall,

    // ── Casts / type checks ──────────────────────────────────────────────────
    CastAsInt,
    CastAsFloat,
    CastAsBool,
    CastAsString,
    CastAsChar,
    CastAsList,
    /// `[tag: i64]` — pop a value, push whether it matches the type tag.
    CheckType,

    // ── I/O ──────────────────────────────────────────────────────────────────
    /// Print the top of the stack without popping it.
    Print,
    /// As `Print`, with a trailing newline.
    PrintLn,
    PrintEmptyLine,
    PrintTab,

    // ── Containers ───────────────────────────────────────────────────────────
    /// `[n: i64]` — pop `n` values, push a list of them in evaluation order.
    CreateList,
    CreateEmptyList,
    /// `[n: i64]` — pop a value, push a list containing it `n` times.
    CreateRepeatingList,

    // ── Assertions ───────────────────────────────────────────────────────────
    /// Pop a value; fail with `AssertionFailed` when it is falsy.
    Assert,
    /// `[message: String]` — as `Assert`, with a custom message.
    AssertWithMessage,
}

// ─────────────────────────────────────────────────────────────────────────────
// Function
// ─────────────────────────────────────────────────────────────────────────────

/// A compiled Grace function: its per-function op and constant lists plus
/// the global offsets assigned at link time.
#[derive(Debug)]
pub struct Function {
    /// Source-level name.
    pub name: String,
    /// Hash of `name`; the key used by `Call`.
    pub name_hash: i64,
    /// Number of declared parameters.
    pub arity: i64,
    /// Line of the `func` declaration.
    pub line: u32,
    /// Emitted `(op, line)` pairs.
    pub op_list: Vec<(Op, u32)>,
    /// Emitted operand constants, consumed in order at execution.
    pub const_list: Vec<Value>,
    /// Offset of this function's first op in the linked global array.
    pub op_start: usize,
    /// Offset of this function's first constant in the linked global array.
    pub const_start: usize,
}

impl Function {
    pub fn new(name: impl Into<String>, name_hash: i64, arity: i64, line: u32) -> Self {
        Self {
            name: name.into(),
            name_hash,
            arity,
            line,
            op_list: Vec::new(),
            const_list: Vec::new(),
            op_start: 0,
            const_start: 0,
        }
    }
}

/// Hash a function name the way the compiler and VM agree on.
pub fn hash_name(name: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish() as i64
}

// ─────────────────────────────────────────────────────────────────────────────
// FunctionTable
// ─────────────────────────────────────────────────────────────────────────────

/// All compiled functions, keyed by name hash, in declaration order.
///
/// Name hashes must be unique across the table; inserting a duplicate fails
/// so the compiler can report a duplicate-definition error.
#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: HashMap<i64, Function>,
    order: Vec<i64>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new function.  Returns `false` when a function with the same
    /// name hash already exists.
    pub fn insert(&mut self, function: Function) -> bool {
        let hash = function.name_hash;
        if self.functions.contains_key(&hash) {
            return false;
        }
        self.order.push(hash);
        self.functions.insert(hash, function);
        true
    }

    pub fn get(&self, hash: i64) -> Option<&Function> {
        self.functions.get(&hash)
    }

    pub fn get_mut(&mut self, hash: i64) -> Option<&mut Function> {
        self.functions.get_mut(&hash)
    }

    /// The name behind a hash, for call-stack rendering.
    pub fn name_of(&self, hash: i64) -> Option<&str> {
        self.functions.get(&hash).map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate functions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.order.iter().map(|h| &self.functions[h])
    }

    /// Hashes in declaration order (for the link step, which needs mutable
    /// access while iterating).
    pub fn hashes(&self) -> Vec<i64> {
        self.order.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_name_is_stable_and_distinguishes() {
        assert_eq!(hash_name("main"), hash_name("main"));
        assert_ne!(hash_name("main"), hash_name("fib"));
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let mut table = FunctionTable::new();
        let hash = hash_name("main");
        assert!(table.insert(Function::new("main", hash, 0, 1)));
        assert!(!table.insert(Function::new("main", hash, 0, 5)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_iteration_preserves_declaration_order() {
        let mut table = FunctionTable::new();
        for name in ["main", "alpha", "beta"] {
            table.insert(Function::new(name, hash_name(name), 0, 1));
        }
        let names: Vec<_> = table.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["main", "alpha", "beta"]);
    }

    #[test]
    fn test_name_lookup() {
        let mut table = FunctionTable::new();
        let hash = hash_name("fib");
        table.insert(Function::new("fib", hash, 1, 3));
        assert_eq!(table.name_of(hash), Some("fib"));
        assert_eq!(table.name_of(hash ^ 1), None);
        assert_eq!(table.get(hash).unwrap().arity, 1);
    }
}
