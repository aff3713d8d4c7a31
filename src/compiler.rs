// File: src/compiler.rs
//
// Walks the syntax tree and emits bytecode per scope, patching forward
// jumps and tracking constants. Node-by-node semantics below
// follow a fixed ordering, including the asymmetric `<`
// compilation and the let-before-value symbol definition that enables
// self-recursive `let f = fn(n) { f(n - 1) }` bindings.

use crate::ast::{self, Expr, Program, Statement};
use crate::bytecode::{make, Op};
use crate::builtins::BUILTINS;
use crate::errors::CompileError;
use crate::object::{CompiledFunction, Object};
use crate::symbol_table::{Symbol, SymbolScope, SymbolTable};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EmittedInstruction {
    op: Op,
    position: usize,
}

#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Vec<u8>,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constants: Vec<Object>,
}

pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (i, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(i, builtin.name);
        }

        Compiler { constants: Vec::new(), symbol_table, scopes: vec![CompilationScope::default()] }
    }

    /// Resumes compilation against an existing global symbol table and
    /// constant pool, as the REPL does between successive inputs so that
    /// earlier `let` bindings stay resolvable.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Object>) -> Self {
        Compiler { constants, symbol_table, scopes: vec![CompilationScope::default()] }
    }

    pub fn into_symbol_table(self) -> SymbolTable {
        self.symbol_table
    }

    pub fn bytecode(mut self) -> Bytecode {
        let instructions = self.scopes.pop().unwrap().instructions;
        Bytecode { instructions, constants: self.constants }
    }

    /// Consumes the compiler and returns both the resulting symbol table
    /// and bytecode, for callers that need both without cloning either.
    pub fn finish(mut self) -> (SymbolTable, Bytecode) {
        let instructions = self.scopes.pop().unwrap().instructions;
        let bytecode = Bytecode { instructions, constants: self.constants };
        (self.symbol_table, bytecode)
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit(Op::Pop, &[]);
            }
            Statement::Let { name, value } => {
                let symbol = self.symbol_table.define(name);
                match value {
                    Expr::FunctionLiteral { params, body } => {
                        self.compile_function_literal(params, body, Some(name))?;
                    }
                    other => self.compile_expr(other)?,
                }
                match symbol.scope {
                    SymbolScope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
                    _ => self.emit(Op::SetLocal, &[symbol.index]),
                };
            }
            Statement::Return(value) => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                }
                self.emit(Op::ReturnValue, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &ast::Block) -> Result<(), CompileError> {
        for stmt in block {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::IntegerLiteral(i) => {
                let idx = self.add_constant(Object::Integer(*i));
                self.emit(Op::Constant, &[idx]);
            }
            Expr::StringLiteral(s) => {
                let idx = self.add_constant(Object::Str(Rc::new(s.clone())));
                self.emit(Op::Constant, &[idx]);
            }
            Expr::Boolean(true) => {
                self.emit(Op::True, &[]);
            }
            Expr::Boolean(false) => {
                self.emit(Op::False, &[]);
            }
            Expr::Ident(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
            }
            Expr::ArrayLiteral(elements) => {
                for el in elements {
                    self.compile_expr(el)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }
            Expr::HashLiteral(pairs) => {
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by(|a, b| ast::sort_key(&a.0).cmp(&ast::sort_key(&b.0)));
                for (key, value) in &sorted {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Op::Hash, &[sorted.len() * 2]);
            }
            Expr::Index { left, index } => {
                self.compile_expr(left)?;
                self.compile_expr(index)?;
                self.emit(Op::Index, &[]);
            }
            Expr::Prefix { op, right } => {
                self.compile_expr(right)?;
                match op.as_str() {
                    "-" => self.emit(Op::Minus, &[]),
                    "!" => self.emit(Op::Bang, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
            }
            Expr::Infix { op, left, right } => {
                if op == "<" {
                    self.compile_expr(right)?;
                    self.compile_expr(left)?;
                    self.emit(Op::GreaterThan, &[]);
                    return Ok(());
                }

                self.compile_expr(left)?;
                self.compile_expr(right)?;
                match op.as_str() {
                    "+" => self.emit(Op::Add, &[]),
                    "-" => self.emit(Op::Sub, &[]),
                    "*" => self.emit(Op::Mul, &[]),
                    "/" => self.emit(Op::Div, &[]),
                    "==" => self.emit(Op::Equal, &[]),
                    "!=" => self.emit(Op::NotEqual, &[]),
                    ">" => self.emit(Op::GreaterThan, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
            }
            Expr::If { cond, cons, alt } => {
                self.compile_expr(cond)?;

                let jump_not_truthy_pos = self.emit(Op::JumpNotTruthy, &[9999]);

                self.compile_block(cons)?;
                if self.last_instruction_is(Op::Pop) {
                    self.remove_last_pop();
                }

                let jump_pos = self.emit(Op::Jump, &[9999]);

                let after_cons_pos = self.current_instructions().len();
                self.change_operand(jump_not_truthy_pos, after_cons_pos);

                match alt {
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                    Some(alt_block) => {
                        self.compile_block(alt_block)?;
                        if self.last_instruction_is(Op::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alt_pos = self.current_instructions().len();
                self.change_operand(jump_pos, after_alt_pos);
            }
            Expr::FunctionLiteral { params, body } => {
                self.compile_function_literal(params, body, None)?;
            }
            Expr::Call { func, args } => {
                self.compile_expr(func)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Op::Call, &[args.len()]);
            }
        }
        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        params: &[String],
        body: &ast::Block,
        bound_name: Option<&str>,
    ) -> Result<(), CompileError> {
        self.enter_scope();

        if let Some(name) = bound_name {
            self.symbol_table.define_function_name(name);
        }

        for param in params {
            self.symbol_table.define(param);
        }

        self.compile_block(body)?;

        if self.last_instruction_is(Op::Pop) {
            self.replace_last_pop_with_return_value();
        }
        if !self.last_instruction_is(Op::ReturnValue) {
            self.emit(Op::Return, &[]);
        }

        let free_symbols = self.symbol_table.free_symbols.clone();
        let num_locals = self.symbol_table.num_definitions();
        let instructions = self.leave_scope();

        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let compiled_fn = Rc::new(CompiledFunction {
            instructions,
            num_locals,
            num_parameters: params.len(),
        });
        let const_idx = self.add_constant(Object::CompiledFunction(compiled_fn));
        self.emit(Op::Closure, &[const_idx, free_symbols.len()]);

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => {
                self.emit(Op::GetGlobal, &[symbol.index]);
            }
            SymbolScope::Local => {
                self.emit(Op::GetLocal, &[symbol.index]);
            }
            SymbolScope::Builtin => {
                self.emit(Op::GetBuiltin, &[symbol.index]);
            }
            SymbolScope::Free => {
                self.emit(Op::GetFree, &[symbol.index]);
            }
            SymbolScope::Function => {
                self.emit(Op::CurrentClosure, &[]);
            }
        };
    }

    fn add_constant(&mut self, obj: Object) -> usize {
        self.constants.push(obj);
        self.constants.len() - 1
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().unwrap()
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().unwrap()
    }

    fn current_instructions(&self) -> &[u8] {
        &self.current_scope().instructions
    }

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.current_instructions().len();
        let scope = self.current_scope_mut();
        scope.instructions.extend_from_slice(&instruction);
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { op, position });
        position
    }

    fn last_instruction_is(&self, op: Op) -> bool {
        matches!(self.current_scope().last_instruction, Some(e) if e.op == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: Vec<u8>) {
        let scope = self.current_scope_mut();
        scope.instructions[position..position + new_instruction.len()].copy_from_slice(&new_instruction);
    }

    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = crate::bytecode::Op::from_byte(self.current_instructions()[position])
            .expect("change_operand on unknown opcode");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(position, new_instruction);
    }

    fn replace_last_pop_with_return_value(&mut self) {
        let last_position = self.current_scope().last_instruction.unwrap().position;
        let new_instruction = make(Op::ReturnValue, &[]);
        self.replace_instruction(last_position, new_instruction);
        self.current_scope_mut().last_instruction.as_mut().unwrap().op = Op::ReturnValue;
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> Vec<u8> {
        let scope = self.scopes.pop().unwrap();
        let current = std::mem::take(&mut self.symbol_table);
        self.symbol_table = current.into_outer();
        scope.instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;
    use crate::bytecode::disassemble;

    fn compile_source(src: &str) -> Bytecode {
        let tokens = tokenize(src);
        let program = Parser::new(tokens).parse_program().expect("parse error");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile error");
        compiler.bytecode()
    }

    fn concat(chunks: &[Vec<u8>]) -> Vec<u8> {
        chunks.concat()
    }

    #[test]
    fn integer_arithmetic() {
        let bc = compile_source("1 + 2");
        assert_eq!(bc.constants, vec![Object::Integer(1), Object::Integer(2)]);
        let expected =
            concat(&[make(Op::Constant, &[0]), make(Op::Constant, &[1]), make(Op::Add, &[]), make(Op::Pop, &[])]);
        assert_eq!(disassemble(&bc.instructions), disassemble(&expected));
    }

    #[test]
    fn less_than_swaps_operands() {
        let bc = compile_source("1 < 2");
        assert_eq!(bc.constants, vec![Object::Integer(2), Object::Integer(1)]);
        let expected = concat(&[
            make(Op::Constant, &[0]),
            make(Op::Constant, &[1]),
            make(Op::GreaterThan, &[]),
            make(Op::Pop, &[]),
        ]);
        assert_eq!(disassemble(&bc.instructions), disassemble(&expected));
    }

    #[test]
    fn conditionals_patch_jumps() {
        let bc = compile_source("if (true) { 10 }; 3333;");
        let expected = concat(&[
            make(Op::True, &[]),
            make(Op::JumpNotTruthy, &[10]),
            make(Op::Constant, &[0]),
            make(Op::Jump, &[11]),
            make(Op::Null, &[]),
            make(Op::Pop, &[]),
            make(Op::Constant, &[1]),
            make(Op::Pop, &[]),
        ]);
        assert_eq!(disassemble(&bc.instructions), disassemble(&expected));
    }

    #[test]
    fn global_let_statements() {
        let bc = compile_source("let one = 1; let two = 2;");
        let expected = concat(&[
            make(Op::Constant, &[0]),
            make(Op::SetGlobal, &[0]),
            make(Op::Constant, &[1]),
            make(Op::SetGlobal, &[1]),
        ]);
        assert_eq!(disassemble(&bc.instructions), disassemble(&expected));
    }

    #[test]
    fn functions_with_locals_end_in_return_value() {
        let bc = compile_source("fn(a, b, c) { a; b; c }");
        match &bc.constants[0] {
            Object::CompiledFunction(f) => {
                assert_eq!(f.num_parameters, 3);
                assert_eq!(f.num_locals, 3);
                let expected = concat(&[
                    make(Op::GetLocal, &[0]),
                    make(Op::Pop, &[]),
                    make(Op::GetLocal, &[1]),
                    make(Op::Pop, &[]),
                    make(Op::GetLocal, &[2]),
                    make(Op::ReturnValue, &[]),
                ]);
                assert_eq!(disassemble(&f.instructions), disassemble(&expected));
            }
            other => panic!("expected compiled function, got {other:?}"),
        }
    }

    #[test]
    fn closures_capture_transitively() {
        let bc = compile_source("fn(a) { fn(b) { a + b } }");
        // Outermost constant is the inner function.
        let inner = match &bc.constants[0] {
            Object::CompiledFunction(f) => f.clone(),
            other => panic!("expected compiled function, got {other:?}"),
        };
        let expected_inner = concat(&[
            make(Op::GetFree, &[0]),
            make(Op::GetLocal, &[0]),
            make(Op::Add, &[]),
            make(Op::ReturnValue, &[]),
        ]);
        assert_eq!(disassemble(&inner.instructions), disassemble(&expected_inner));

        let outer = match &bc.constants[1] {
            Object::CompiledFunction(f) => f.clone(),
            other => panic!("expected compiled function, got {other:?}"),
        };
        let expected_outer = concat(&[
            make(Op::GetLocal, &[0]),
            make(Op::Closure, &[0, 1]),
            make(Op::ReturnValue, &[]),
        ]);
        assert_eq!(disassemble(&outer.instructions), disassemble(&expected_outer));
    }

    #[test]
    fn undefined_variable_is_a_compile_error() {
        let tokens = tokenize("foobar;");
        let program = Parser::new(tokens).parse_program().unwrap();
        let mut compiler = Compiler::new();
        let err = compiler.compile(&program).unwrap_err();
        assert_eq!(err, CompileError::UndefinedVariable("foobar".to_string()));
    }

    #[test]
    fn hash_literal_keys_compile_in_sorted_order() {
        let bc = compile_source("{2: \"b\", 1: \"a\"}");
        match &bc.constants[..] {
            [Object::Integer(1), Object::Str(a), Object::Integer(2), Object::Str(b)] => {
                assert_eq!(a.as_str(), "a");
                assert_eq!(b.as_str(), "b");
            }
            other => panic!("unexpected constant order: {other:?}"),
        }
    }
}
