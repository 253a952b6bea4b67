//! Command line front end for the Grace interpreter.

use std::env;
use std::process::ExitCode;

use grace::compiler::CompilerOptions;
use grace::{run_file, GraceError};

fn print_usage() {
    eprintln!("grace {}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: grace [options] <file.gr> [args...]");
    eprintln!();
    eprintln!("Arguments after the file are passed to the program's `main`.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -h, --help            Show this help message");
    eprintln!("  -V, --version         Show version information");
    eprintln!("  -v, --verbose         Print compile timing, bytecode, and warnings");
    eprintln!("  -we, --warnings-error Treat warnings as errors");
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut options = CompilerOptions::default();
    let mut file: Option<String> = None;
    let mut program_args: Vec<String> = Vec::new();

    for arg in args {
        if file.is_some() {
            // Everything after the script belongs to the script.
            program_args.push(arg);
            continue;
        }
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "-V" | "--version" => {
                println!("grace {}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            "-v" | "--verbose" => options.verbose = true,
            "-we" | "--warnings-error" => options.warnings_as_errors = true,
            _ if arg.starts_with('-') => {
                eprintln!("ERROR: unknown option '{arg}'");
                print_usage();
                return ExitCode::FAILURE;
            }
            _ => file = Some(arg),
        }
    }

    let Some(file) = file else {
        print_usage();
        return ExitCode::FAILURE;
    };

    if !file.ends_with(".gr") {
        eprintln!("ERROR: provided file was not a `.gr` file.");
        return ExitCode::FAILURE;
    }

    match run_file(&file, options, &program_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(GraceError::Compile(diagnostics)) => {
            eprintln!("{diagnostics}");
            eprintln!("Terminating process due to compilation errors.");
            ExitCode::FAILURE
        }
        // The VM already printed its call-stack trace.
        Err(GraceError::Runtime) | Err(GraceError::AssertionFailed) => ExitCode::FAILURE,
        Err(GraceError::Io(error)) => {
            eprintln!("ERROR: could not read '{file}': {error}");
            ExitCode::FAILURE
        }
    }
}
