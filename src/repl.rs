// File: src/repl.rs
//
// Interactive REPL (Read-Eval-Print Loop) driving the lexer -> parser ->
// compiler -> VM pipeline. Each input is compiled with the symbol table,
// constant pool, and globals left over from the previous one, so `let`
// bindings and function definitions persist across lines. Provides:
// - Multi-line input support for unclosed braces/brackets/parens
// - Command history with up/down arrow navigation
// - Special commands (:help, :clear, :quit, :vars, :reset)

use crate::compiler::Compiler;
use crate::errors::{self, CompileError, VmError};
use crate::lexer;
use crate::object::Object;
use crate::parser::{ParseError, Parser};
use crate::symbol_table::SymbolTable;
use crate::vm::Vm;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// REPL session carrying over compiler and VM state between inputs.
pub struct Repl {
    symbol_table: SymbolTable,
    constants: Vec<Object>,
    globals: Vec<Object>,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        let symbol_table = Compiler::new().into_symbol_table();
        Ok(Repl {
            symbol_table,
            constants: Vec::new(),
            globals: vec![Object::Null; crate::vm::GLOBALS_SIZE],
            editor,
        })
    }

    fn show_banner(&self) {
        println!("{}", "╔══════════════════════════════════════════════════════╗".bright_cyan());
        println!("{}", "║              monkeyvm REPL - Interactive Shell       ║".bright_cyan());
        println!("{}", "╚══════════════════════════════════════════════════════╝".bright_cyan());
        println!();
        println!(
            "  {} Use {}{}{}{}",
            "Welcome!".bright_green(),
            ":".bright_blue(),
            "help".bright_yellow(),
            " for commands or ".bright_blue(),
            ":quit".bright_yellow()
        );
        println!("  {} Multi-line input: end with unclosed braces", "Tip:".bright_magenta());
        println!();
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        let mut buffer = String::new();

        loop {
            let prompt =
                if buffer.is_empty() { "monkey> ".bright_green().to_string() } else { "....... ".bright_blue().to_string() };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if is_input_complete(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (Ctrl+C to interrupt, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "\nGoodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns true to continue the REPL, false to quit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":vars" | ":v" => {
                println!("{}", "(bound names are not introspectable from the REPL yet)".dimmed());
                true
            }
            ":reset" | ":r" => {
                self.symbol_table = Compiler::new().into_symbol_table();
                self.constants.clear();
                self.globals = vec![Object::Null; crate::vm::GLOBALS_SIZE];
                println!("{}", "environment reset".bright_green());
                true
            }
            _ => {
                println!(
                    "{} unknown command: {}. Type {}{}{}",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":".bright_blue(),
                    "help".bright_yellow(),
                    " for available commands.".bright_blue()
                );
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "REPL Commands:".bright_cyan().bold());
        println!();
        println!("  {}{}  Display this help message", ":help".bright_yellow(), " or :h     ".dimmed());
        println!("  {}{}  Exit the REPL", ":quit".bright_yellow(), " or :q     ".dimmed());
        println!("  {}{}  Clear the screen", ":clear".bright_yellow(), " or :c    ".dimmed());
        println!("  {}{}  List bound names", ":vars".bright_yellow(), " or :v    ".dimmed());
        println!("  {}{}  Reset environment", ":reset".bright_yellow(), " or :r   ".dimmed());
        println!();
        println!("{}", "Multi-line Input:".bright_cyan().bold());
        println!();
        println!("  Leave braces, brackets, or parentheses unclosed to continue");
        println!("  on the next line. Close them to execute the statement.");
        println!();
    }

    fn eval_input(&mut self, input: &str) {
        if input.trim().is_empty() {
            return;
        }

        let tokens = lexer::tokenize(input);
        let program = match Parser::new(tokens).parse_program() {
            Ok(program) => program,
            Err(err) => return self.print_parse_error(&err),
        };

        let symbol_table = std::mem::take(&mut self.symbol_table);
        let constants = std::mem::take(&mut self.constants);
        let mut compiler = Compiler::new_with_state(symbol_table, constants);

        if let Err(err) = compiler.compile(&program) {
            self.symbol_table = compiler.into_symbol_table();
            return self.print_compile_error(&err);
        }

        let (symbol_table, bytecode) = compiler.finish();
        self.symbol_table = symbol_table;
        self.constants = bytecode.constants.clone();

        let globals = std::mem::take(&mut self.globals);
        let mut vm = Vm::new_with_globals(bytecode, globals);
        match vm.run() {
            Ok(()) => {
                let result = vm.last_popped_stack_elem();
                self.globals = vm.take_globals();
                self.print_value(&result);
            }
            Err(err) => {
                self.globals = vm.take_globals();
                self.print_vm_error(&err);
            }
        }
    }

    fn print_value(&self, value: &Object) {
        match value {
            Object::Null => {}
            other => println!("{} {}", "=>".bright_blue(), other.inspect().bright_white()),
        }
    }

    fn print_parse_error(&self, err: &ParseError) {
        errors::report("parse error", err);
    }

    fn print_compile_error(&self, err: &CompileError) {
        errors::report("compile error", err);
    }

    fn print_vm_error(&self, err: &VmError) {
        errors::report("runtime error", err);
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new().expect("failed to create REPL")
    }
}

/// True if every brace, bracket, and paren opened in `input` is closed,
/// accounting for string literals so delimiters inside them don't count.
fn is_input_complete(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return true;
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for ch in trimmed.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' | '(' if !in_string => depth += 1,
            '}' | ']' | ')' if !in_string => depth -= 1,
            _ => {}
        }
    }

    !in_string && depth <= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_unclosed_braces() {
        assert!(!is_input_complete("let f = fn(x) {"));
        assert!(is_input_complete("let f = fn(x) { x }"));
    }

    #[test]
    fn ignores_delimiters_inside_strings() {
        assert!(is_input_complete(r#"let s = "{[(";"#));
    }
}
