// File: src/errors.rs
//
// The two error taxonomies: compile errors (first error
// aborts compilation) and runtime errors (execution halts). Both are
// rendered as a colored, bolded header plus the message, no separate
// logging crate.

use colored::Colorize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    UndefinedVariable(String),
    UnknownOperator(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UndefinedVariable(name) => write!(f, "undefined variable {name}"),
            CompileError::UnknownOperator(op) => write!(f, "unknown operator: {op}"),
        }
    }
}

impl std::error::Error for CompileError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    StackOverflow,
    FrameOverflow,
    WrongNumberOfArguments { want: usize, got: usize },
    UnsupportedBinaryOperation { left: &'static str, right: &'static str },
    UnsupportedNegation(&'static str),
    UnusableHashKey(&'static str),
    IndexNotSupported(&'static str),
    CallingNonFunction,
    UnknownOpcode(u8),
    DivisionByZero,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::StackOverflow => write!(f, "stack overflow"),
            VmError::FrameOverflow => write!(f, "frame overflow"),
            VmError::WrongNumberOfArguments { want, got } => {
                write!(f, "wrong number of arguments: want={want}, got={got}")
            }
            VmError::UnsupportedBinaryOperation { left, right } => {
                write!(f, "unsupported types for binary operation: {left} {right}")
            }
            VmError::UnsupportedNegation(t) => write!(f, "unsupported type for negation: {t}"),
            VmError::UnusableHashKey(t) => write!(f, "unusable as hash key: {t}"),
            VmError::IndexNotSupported(t) => write!(f, "index operator not supported: {t}"),
            VmError::CallingNonFunction => write!(f, "calling non-function"),
            VmError::UnknownOpcode(op) => write!(f, "unknown opcode: {op}"),
            VmError::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl std::error::Error for VmError {}

/// Prints an error the way the CLI/REPL report every failure: a red bold
/// kind header followed by the message, no trailing punctuation added.
pub fn report(kind: &str, err: &dyn fmt::Display) {
    eprintln!("{}: {}", kind.red().bold(), err.to_string().bold());
}
