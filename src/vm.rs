// File: src/vm.rs
//
// Stack-based virtual machine executing the bytecode the compiler
// produces. Every opcode dispatches in a single flat `match`;
// calls push a `Frame` onto a frame stack so locals live on the shared
// value stack at `base_pointer + index`.

use crate::builtins::BUILTINS;
use crate::bytecode::{read_u16, read_u8, Op};
use crate::compiler::Bytecode;
use crate::errors::VmError;
use crate::object::{BuiltinFn, Closure, CompiledFunction, HashPair, Object};
use std::collections::HashMap;
use std::rc::Rc;

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

struct Frame {
    closure: Rc<Closure>,
    ip: i64,
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame { closure, ip: -1, base_pointer }
    }

    fn instructions_len(&self) -> i64 {
        self.closure.function.instructions.len() as i64
    }
}

pub struct Vm {
    constants: Vec<Object>,
    stack: Vec<Object>,
    sp: usize,
    globals: Vec<Object>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals(bytecode, vec![Object::Null; GLOBALS_SIZE])
    }

    /// Reuses a globals store across REPL inputs so `let` bindings from
    /// one line are visible to the next.
    pub fn new_with_globals(bytecode: Bytecode, globals: Vec<Object>) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure { function: main_fn, free: Vec::new() });
        let main_frame = Frame::new(main_closure, 0);

        Vm { constants: bytecode.constants, stack: vec![Object::Null; STACK_SIZE], sp: 0, globals, frames: vec![main_frame] }
    }

    pub fn take_globals(self) -> Vec<Object> {
        self.globals
    }

    /// The value left behind by the trailing `OpPop` of the last
    /// top-level statement — what the REPL prints back to the user.
    pub fn last_popped_stack_elem(&self) -> Object {
        self.stack[self.sp].clone()
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), VmError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(VmError::FrameOverflow);
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("frame stack is never empty")
    }

    fn push(&mut self, obj: Object) -> Result<(), VmError> {
        if self.sp >= STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.stack[self.sp] = obj;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Object {
        let obj = self.stack[self.sp - 1].clone();
        self.sp -= 1;
        obj
    }

    pub fn run(&mut self) -> Result<(), VmError> {
        while self.current_frame().ip < self.current_frame().instructions_len() - 1 {
            self.current_frame_mut().ip += 1;
            let ip = self.current_frame().ip as usize;
            let closure = Rc::clone(&self.current_frame().closure);
            let ins = &closure.function.instructions;
            let op = Op::from_byte(ins[ip]).ok_or(VmError::UnknownOpcode(ins[ip]))?;

            match op {
                Op::Constant => {
                    let idx = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    self.push(self.constants[idx].clone())?;
                }
                Op::Add | Op::Sub | Op::Mul | Op::Div => self.execute_binary_op(op)?,
                Op::True => self.push(Object::Boolean(true))?,
                Op::False => self.push(Object::Boolean(false))?,
                Op::Null => self.push(Object::Null)?,
                Op::Pop => {
                    self.pop();
                }
                Op::Equal | Op::NotEqual | Op::GreaterThan => self.execute_comparison(op)?,
                Op::Bang => self.execute_bang()?,
                Op::Minus => self.execute_minus()?,
                Op::Jump => {
                    let pos = read_u16(&ins[ip + 1..]) as i64;
                    self.current_frame_mut().ip = pos - 1;
                }
                Op::JumpNotTruthy => {
                    let pos = read_u16(&ins[ip + 1..]) as i64;
                    self.current_frame_mut().ip += 2;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = pos - 1;
                    }
                }
                Op::SetGlobal => {
                    let idx = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let val = self.pop();
                    self.globals[idx] = val;
                }
                Op::GetGlobal => {
                    let idx = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    self.push(self.globals[idx].clone())?;
                }
                Op::SetLocal => {
                    let idx = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let base = self.current_frame().base_pointer;
                    let val = self.pop();
                    self.stack[base + idx] = val;
                }
                Op::GetLocal => {
                    let idx = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let base = self.current_frame().base_pointer;
                    self.push(self.stack[base + idx].clone())?;
                }
                Op::GetBuiltin => {
                    let idx = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    self.push(Object::Builtin(BUILTINS[idx].func))?;
                }
                Op::GetFree => {
                    let idx = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    self.push(closure.free[idx].clone())?;
                }
                Op::CurrentClosure => {
                    self.push(Object::Closure(Rc::clone(&closure)))?;
                }
                Op::Array => {
                    let n = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let arr = self.build_array(n);
                    self.sp -= n;
                    self.push(arr)?;
                }
                Op::Hash => {
                    let n = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let h = self.build_hash(n)?;
                    self.sp -= n;
                    self.push(h)?;
                }
                Op::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    let result = self.execute_index(left, index)?;
                    self.push(result)?;
                }
                Op::Call => {
                    let num_args = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    self.execute_call(num_args)?;
                }
                Op::ReturnValue => {
                    let return_value = self.pop();
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                Op::Return => {
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(Object::Null)?;
                }
                Op::Closure => {
                    let const_idx = read_u16(&ins[ip + 1..]) as usize;
                    let num_free = read_u8(&ins[ip + 3..]) as usize;
                    self.current_frame_mut().ip += 3;
                    self.push_closure(const_idx, num_free)?;
                }
            }
        }
        Ok(())
    }

    fn execute_binary_op(&mut self, op: Op) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let result = match op {
                    Op::Add => l.wrapping_add(*r),
                    Op::Sub => l.wrapping_sub(*r),
                    Op::Mul => l.wrapping_mul(*r),
                    Op::Div => {
                        if *r == 0 {
                            return Err(VmError::DivisionByZero);
                        }
                        l.wrapping_div(*r)
                    }
                    _ => unreachable!("execute_binary_op called with non-arithmetic op"),
                };
                self.push(Object::Integer(result))
            }
            (Object::Str(l), Object::Str(r)) if op == Op::Add => {
                let mut combined = String::with_capacity(l.len() + r.len());
                combined.push_str(l);
                combined.push_str(r);
                self.push(Object::Str(Rc::new(combined)))
            }
            _ => Err(VmError::UnsupportedBinaryOperation { left: left.type_name(), right: right.type_name() }),
        }
    }

    fn execute_comparison(&mut self, op: Op) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();

        if let (Object::Integer(l), Object::Integer(r)) = (&left, &right) {
            let result = match op {
                Op::Equal => l == r,
                Op::NotEqual => l != r,
                Op::GreaterThan => l > r,
                _ => unreachable!("execute_comparison called with non-comparison op"),
            };
            return self.push(Object::Boolean(result));
        }

        match op {
            Op::Equal => self.push(Object::Boolean(left.identity_eq(&right))),
            Op::NotEqual => self.push(Object::Boolean(!left.identity_eq(&right))),
            Op::GreaterThan => {
                Err(VmError::UnsupportedBinaryOperation { left: left.type_name(), right: right.type_name() })
            }
            _ => unreachable!("execute_comparison called with non-comparison op"),
        }
    }

    fn execute_bang(&mut self) -> Result<(), VmError> {
        let operand = self.pop();
        let result = match operand {
            Object::Boolean(b) => !b,
            Object::Null => true,
            _ => false,
        };
        self.push(Object::Boolean(result))
    }

    fn execute_minus(&mut self) -> Result<(), VmError> {
        let operand = self.pop();
        match operand {
            Object::Integer(i) => self.push(Object::Integer(i.wrapping_neg())),
            other => Err(VmError::UnsupportedNegation(other.type_name())),
        }
    }

    fn build_array(&self, n: usize) -> Object {
        Object::Array(Rc::new(self.stack[self.sp - n..self.sp].to_vec()))
    }

    fn build_hash(&self, n: usize) -> Result<Object, VmError> {
        let mut pairs = HashMap::with_capacity(n / 2);
        let mut i = self.sp - n;
        while i < self.sp {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();
            let hash_key = key.hash_key().map_err(VmError::UnusableHashKey)?;
            pairs.insert(hash_key, HashPair { key, value });
            i += 2;
        }
        Ok(Object::Hash(Rc::new(pairs)))
    }

    fn execute_index(&self, left: Object, index: Object) -> Result<Object, VmError> {
        match (&left, &index) {
            (Object::Array(arr), Object::Integer(i)) => {
                if *i < 0 || *i as usize >= arr.len() {
                    Ok(Object::Null)
                } else {
                    Ok(arr[*i as usize].clone())
                }
            }
            (Object::Hash(pairs), _) => {
                let key = index.hash_key().map_err(VmError::UnusableHashKey)?;
                Ok(pairs.get(&key).map(|p| p.value.clone()).unwrap_or(Object::Null))
            }
            _ => Err(VmError::IndexNotSupported(left.type_name())),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), VmError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Object::Closure(cl) => self.call_closure(cl, num_args),
            Object::Builtin(f) => self.call_builtin(f, num_args),
            _ => Err(VmError::CallingNonFunction),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<(), VmError> {
        if num_args != closure.function.num_parameters {
            return Err(VmError::WrongNumberOfArguments { want: closure.function.num_parameters, got: num_args });
        }
        let base_pointer = self.sp - num_args;
        let num_locals = closure.function.num_locals;
        self.push_frame(Frame::new(closure, base_pointer))?;
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    fn call_builtin(&mut self, f: BuiltinFn, num_args: usize) -> Result<(), VmError> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = f(&args);
        self.sp -= num_args + 1;
        self.push(result)
    }

    fn push_closure(&mut self, const_idx: usize, num_free: usize) -> Result<(), VmError> {
        let function = match &self.constants[const_idx] {
            Object::CompiledFunction(f) => Rc::clone(f),
            other => unreachable!("OpClosure constant is not a compiled function: {other:?}"),
        };
        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;
        self.push(Object::Closure(Rc::new(Closure { function, free })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn run(input: &str) -> Object {
        let tokens = tokenize(input);
        let program = Parser::new(tokens).parse_program().expect("parse error");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile error");
        let bytecode = compiler.bytecode();
        let mut vm = Vm::new(bytecode);
        vm.run().expect("vm error");
        vm.last_popped_stack_elem()
    }

    fn run_err(input: &str) -> VmError {
        let tokens = tokenize(input);
        let program = Parser::new(tokens).parse_program().expect("parse error");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile error");
        let bytecode = compiler.bytecode();
        let mut vm = Vm::new(bytecode);
        vm.run().expect_err("expected a vm error")
    }

    #[test]
    fn integer_arithmetic_and_comparisons() {
        assert_eq!(run("1 + 2 * 3"), Object::Integer(7));
        assert_eq!(run("(5 + 10 * 2 + 15 / 3) * 2 + -10"), Object::Integer(50));
        assert_eq!(run("1 < 2"), Object::Boolean(true));
        assert_eq!(run("1 == 1"), Object::Boolean(true));
        assert_eq!(run("!true"), Object::Boolean(false));
    }

    #[test]
    fn conditionals_produce_null_with_no_alternative() {
        assert_eq!(run("if (false) { 10 }"), Object::Null);
        assert_eq!(run("if (1 > 2) { 10 } else { 20 }"), Object::Integer(20));
    }

    #[test]
    fn global_let_bindings() {
        assert_eq!(run("let one = 1; let two = one + one; one + two"), Object::Integer(3));
    }

    #[test]
    fn string_concatenation() {
        match run(r#""mon" + "key""#) {
            Object::Str(s) => assert_eq!(s.as_str(), "monkey"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn arrays_and_builtins() {
        assert_eq!(run("[1, 2, 3][1]"), Object::Integer(2));
        assert_eq!(run(r#"len("hello")"#), Object::Integer(5));
        assert_eq!(run("first(push([1, 2], 3))"), Object::Integer(1));
        assert_eq!(run("len(rest([1, 2, 3]))"), Object::Integer(2));
    }

    #[test]
    fn hash_indexing() {
        assert_eq!(run(r#"let h = {"a": 1, "b": 2}; h["b"]"#), Object::Integer(2));
        assert_eq!(run(r#"{"a": 1}["missing"]"#), Object::Null);
    }

    #[test]
    fn closures_capture_enclosing_bindings() {
        let input = "let newAdder = fn(a) { fn(b) { a + b } }; let addTwo = newAdder(2); addTwo(3);";
        assert_eq!(run(input), Object::Integer(5));
    }

    #[test]
    fn recursive_closures_via_current_closure() {
        let input = "let countDown = fn(x) { if (x == 0) { 0 } else { countDown(x - 1) } }; countDown(5);";
        assert_eq!(run(input), Object::Integer(0));
    }

    #[test]
    fn wrong_arity_is_a_runtime_error() {
        let err = run_err("let f = fn(a, b) { a + b }; f(1);");
        assert_eq!(err, VmError::WrongNumberOfArguments { want: 2, got: 1 });
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        assert_eq!(run_err("1 / 0;"), VmError::DivisionByZero);
    }

    #[test]
    fn calling_a_non_function_is_a_runtime_error() {
        assert_eq!(run_err("let x = 5; x();"), VmError::CallingNonFunction);
    }
}
