//! The Grace language compiler and runtime library.
//!
//! Grace is a small dynamically typed scripting language.  This crate
//! provides the complete pipeline:
//!
//! 1. **Tokens** (`token`) — token kinds and source spans.
//! 2. **Lexer** (`lexer`) — on-demand scanner with line-indexed source
//!    retrieval.
//! 3. **Values** (`value`) — runtime `Value` union, operator dispatch, and
//!    reference-counted heap objects.
//! 4. **Bytecode** (`bytecode`) — `Op` definitions, function records, and
//!    the function table.
//! 5. **Compiler** (`compiler`) — single-pass recursive-descent compiler
//!    that emits straight into the VM's tables.
//! 6. **Natives** (`natives`) — Rust functions callable from Grace.
//! 7. **VM** (`vm`) — links the per-function tables and interprets the
//!    result, starting at `main`.
//!
//! # Entry point
//!
//! The simplest way to run a Grace program from Rust is:
//!
//! ```rust,ignore
//! use grace::{run_source, compiler::CompilerOptions};
//! run_source(source, "program.gr", CompilerOptions::default(), &[])?;
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod bytecode;
pub mod compiler;
pub mod lexer;
pub mod natives;
pub mod token;
pub mod value;
pub mod vm;

use crate::compiler::CompilerOptions;
use crate::vm::{InterpretResult, Vm};

// ─────────────────────────────────────────────────────────────────────────────
// Unified error type
// ─────────────────────────────────────────────────────────────────────────────

/// The unified error type for the Grace pipeline.
///
/// Compile errors carry the rendered diagnostics; runtime failures carry no
/// payload because the VM has already written its call-stack trace to
/// stderr.
#[derive(Debug, thiserror::Error)]
pub enum GraceError {
    /// One or more compile-time errors, already rendered for display.
    #[error("{0}")]
    Compile(String),

    /// The VM stopped on a runtime error.
    #[error("runtime error")]
    Runtime,

    /// An `assert` failed at runtime.
    #[error("assertion failed")]
    AssertionFailed,

    /// An I/O error (reading the source file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for Grace operations.
pub type GraceResult<T> = Result<T, GraceError>;

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Compile Grace source into a ready-to-run [`Vm`].
pub fn compile_source(
    source: &str,
    file_name: &str,
    options: CompilerOptions,
) -> GraceResult<Vm> {
    compiler::compile(source, file_name, options).map_err(|diagnostics| {
        let rendered: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
        GraceError::Compile(rendered.join("\n"))
    })
}

/// Full pipeline: compile, link, and execute.
///
/// `program_args` are forwarded to the program's `main` when it declares a
/// parameter.
pub fn run_source(
    source: &str,
    file_name: &str,
    options: CompilerOptions,
    program_args: &[String],
) -> GraceResult<()> {
    let mut vm = compile_source(source, file_name, options)?;
    if options.verbose {
        vm.dump_ops();
    }
    match vm.run(program_args) {
        InterpretResult::RuntimeOk => Ok(()),
        InterpretResult::RuntimeError => Err(GraceError::Runtime),
        InterpretResult::RuntimeAssertionFailed => Err(GraceError::AssertionFailed),
    }
}

/// Read a file and run it through [`run_source`].
pub fn run_file(
    path: &str,
    options: CompilerOptions,
    program_args: &[String],
) -> GraceResult<()> {
    let source = std::fs::read_to_string(path)?;
    run_source(&source, path, options, program_args)
}

// ─────────────────────────────────────────────────────────────────────────────
// Test support
// ─────────────────────────────────────────────────────────────────────────────


// ─────────────────────────────────────────────────────────────────────────────
// End-to-end tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SharedBuf;

    fn run_capture_args(src: &str, args: &[&str]) -> (InterpretResult, String) {
        let mut vm = compile_source(src, "test.gr", CompilerOptions::default())
            .expect("program should compile");
        let buf = SharedBuf::default();
        vm.set_output(Box::new(buf.clone()));
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let result = vm.run(&args);
        (result, buf.contents())
    }

    fn run_capture(src: &str) -> (InterpretResult, String) {
        run_capture_args(src, &[])
    }

    #[test]
    fn test_arithmetic_precedence() {
        let (result, out) = run_capture("func main():\n  println(1 + 2 * 3);\nend");
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "7\n");
    }

    #[test]
    fn test_for_loop_accumulates() {
        let (result, out) = run_capture(
            "func main():\n  var x = 0;\n  for i in 0..5:\n    x = x + i;\n  end\n  println(x);\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "10\n");
    }

    #[test]
    fn test_recursive_fib() {
        let (result, out) = run_capture(
            "func fib(n):\n  if n < 2:\n    return n;\n  end\n  return fib(n-1) + fib(n-2);\nend\nfunc main():\n  println(fib(10));\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "55\n");
    }

    #[test]
    fn test_reassigning_final_fails_to_compile() {
        let err = compile_source(
            "func main():\n  final x = 1;\n  x = 2;\nend",
            "test.gr",
            CompilerOptions::default(),
        )
        .err()
        .expect("compile should fail");
        assert!(err.to_string().contains("Cannot reassign to final 'x'"));
    }

    #[test]
    fn test_adding_int_to_string_is_a_runtime_error() {
        let (result, out) = run_capture("func main():\n  println(\"a\" + 1);\nend");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert_eq!(out, "");
    }

    #[test]
    fn test_instanceof_assertion_passes() {
        let (result, out) = run_capture(
            "func main():\n  assert(instanceof(3.14, Float), \"type check\");\n  println(\"ok\");\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "ok\n");
    }

    #[test]
    fn test_while_loop_with_break() {
        let (result, out) = run_capture(
            "func main():\n  var x = 0;\n  while true:\n    if x > 2:\n      break;\n    end\n    x = x + 1;\n  end\n  println(x);\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "3\n");
    }

    #[test]
    fn test_if_else_chain() {
        let src = "func pick(x):\n  if x == 1:\n    return \"one\";\n  else if x == 2:\n    return \"two\";\n  else:\n    return \"many\";\n  end\nend\nfunc main():\n  println(pick(1));\n  println(pick(2));\n  println(pick(9));\nend";
        let (result, out) = run_capture(src);
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "one\ntwo\nmany\n");
    }

    #[test]
    fn test_for_loop_with_step() {
        let (result, out) = run_capture(
            "func main():\n  var total = 0;\n  for i in 0..10 by 3:\n    total = total + i;\n  end\n  println(total);\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        // 0 + 3 + 6 + 9
        assert_eq!(out, "18\n");
    }

    #[test]
    fn test_for_loop_start_at_stop_runs_zero_times() {
        let (result, out) = run_capture(
            "func main():\n  for i in 5..0:\n    println(i);\n  end\n  println(\"done\");\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "done\n");
    }

    #[test]
    fn test_logic_and_comparisons() {
        let (result, out) = run_capture(
            "func main():\n  println(1 < 2 and 3 >= 3);\n  println(!true or 2 == 2.0);\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        // Int 2 and Float 2.0 are different kinds, so `==` is false.
        assert_eq!(out, "true\nfalse\n");
    }

    #[test]
    fn test_string_and_char_handling() {
        let (result, out) = run_capture(
            "func main():\n  println(\"foo\" + \"bar\");\n  println('x');\n  println(Char(65));\n  println(String(12) + \"!\");\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "foobar\nx\nA\n12!\n");
    }

    #[test]
    fn test_float_printing() {
        let (result, out) = run_capture("func main():\n  println(3.0);\n  println(2.5);\nend");
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "3.0\n2.5\n");
    }

    #[test]
    fn test_casts_round_trip() {
        let (result, out) = run_capture(
            "func main():\n  println(Int(\"42\") + 1);\n  println(Float(2) / 4);\n  println(Bool(0));\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "43\n0.5\nfalse\n");
    }

    #[test]
    fn test_native_sqrt() {
        let (result, out) = run_capture("func main():\n  println(__native_sqrt(9));\nend");
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "3.0\n");
    }

    #[test]
    fn test_native_list_functions() {
        // No list literal exists in the grammar; the `main` args list is the
        // natural way to get one.
        let src = "func main(args):\n  __native_append_list(args, \"extra\");\n  println(__native_list_length(args));\n  __native_set_list_at_index(args, 0, \"changed\");\n  println(__native_get_list_at_index(args, 0));\n  println(args);\nend";
        let (result, out) = run_capture_args(src, &["one"]);
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "2\nchanged\n[changed, extra]\n");
    }

    #[test]
    fn test_program_args_reach_main() {
        let src = "func main(args):\n  println(__native_list_length(args));\n  println(__native_get_list_at_index(args, 0));\nend";
        let (result, out) = run_capture_args(src, &["alpha", "beta"]);
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "2\nalpha\n");
    }

    #[test]
    fn test_unknown_function_is_runtime_error() {
        let (result, _) = run_capture("func main():\n  missing();\nend");
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn test_wrong_arity_is_runtime_error() {
        let (result, _) = run_capture(
            "func f(a):\n  return a;\nend\nfunc main():\n  f(1, 2);\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn test_division_by_zero_is_runtime_error() {
        let (result, _) = run_capture("func main():\n  println(1 / 0);\nend");
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn test_failed_assert_maps_to_assertion_result() {
        let (result, _) = run_capture("func main():\n  assert(false, \"nope\");\nend");
        assert_eq!(result, InterpretResult::RuntimeAssertionFailed);

        let err = run_source(
            "func main():\n  assert(false);\nend",
            "test.gr",
            CompilerOptions::default(),
            &[],
        )
        .err()
        .expect("assert should fail");
        assert!(matches!(err, GraceError::AssertionFailed));
    }

    #[test]
    fn test_functions_with_implicit_return() {
        let src = "func greet(name):\n  println(\"hi \" + name);\nend\nfunc main():\n  greet(\"there\");\n  println(\"after\");\nend";
        let (result, out) = run_capture(src);
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "hi there\nafter\n");
    }

    #[test]
    fn test_print_without_newline_and_empty_forms() {
        let (result, out) = run_capture(
            "func main():\n  print(1);\n  print(2);\n  println();\n  print();\n  println(3);\nend",
        );
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "12\n\t3\n");
    }

    #[test]
    fn test_pow_operator() {
        let (result, out) = run_capture("func main():\n  println(2 ** 10);\n  println(2 ** -1);\nend");
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "1024\n0.5\n");
    }

    #[test]
    fn test_mod_operator() {
        let (result, out) = run_capture("func main():\n  println(7 % 3);\n  println(7.5 % 2);\nend");
        assert_eq!(result, InterpretResult::RuntimeOk);
        assert_eq!(out, "1\n1.5\n");
    }
}
