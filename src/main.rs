// File: src/main.rs
//
// Main entry point: command-line parsing and dispatch for the two
// subcommands the compiler/VM pipeline supports, `run` and `repl`.

mod ast;
mod builtins;
mod bytecode;
mod compiler;
mod errors;
mod lexer;
mod object;
mod parser;
mod repl;
mod symbol_table;
mod token;
mod vm;

use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(ClapParser)]
#[command(
    name = "monkeyvm",
    about = "A bytecode compiler and stack VM for a small dynamically-typed expression language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Compile and run a script file
    Run {
        /// Path to the source file
        file: PathBuf,
    },

    /// Launch the interactive REPL
    Repl,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file } => run_file(&file),
        Commands::Repl => match repl::Repl::new() {
            Ok(mut repl) => match repl.run() {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("{} {err}", "REPL error:".to_string());
                    ExitCode::FAILURE
                }
            },
            Err(err) => {
                eprintln!("failed to start REPL: {err}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run_file(path: &PathBuf) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("failed to read {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let tokens = lexer::tokenize(&source);
    let program = match parser::Parser::new(tokens).parse_program() {
        Ok(program) => program,
        Err(err) => {
            errors::report("parse error", &err);
            return ExitCode::FAILURE;
        }
    };

    let mut compiler = compiler::Compiler::new();
    if let Err(err) = compiler.compile(&program) {
        errors::report("compile error", &err);
        return ExitCode::FAILURE;
    }

    let bytecode = compiler.bytecode();
    let mut machine = vm::Vm::new(bytecode);
    if let Err(err) = machine.run() {
        errors::report("runtime error", &err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
