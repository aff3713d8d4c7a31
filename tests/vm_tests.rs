// End-to-end compile-and-run scenarios, mirroring the concrete
// input -> value cases the bytecode pipeline is built around: arithmetic,
// conditionals, bindings, strings, arrays, hashes, closures, recursion,
// and the builtin functions, each taken all the way from source text
// through the lexer, parser, compiler, and VM to a final popped value.

use monkeyvm::compiler::Compiler;
use monkeyvm::errors::VmError;
use monkeyvm::lexer::tokenize;
use monkeyvm::object::Object;
use monkeyvm::parser::Parser;
use monkeyvm::vm::Vm;
use pretty_assertions::assert_eq;

fn eval(input: &str) -> Object {
    let tokens = tokenize(input);
    let program = Parser::new(tokens).parse_program().unwrap_or_else(|e| panic!("parse error: {e}"));
    let mut compiler = Compiler::new();
    compiler.compile(&program).unwrap_or_else(|e| panic!("compile error: {e}"));
    let mut vm = Vm::new(compiler.bytecode());
    vm.run().unwrap_or_else(|e| panic!("vm error: {e}"));
    vm.last_popped_stack_elem()
}

fn eval_err(input: &str) -> VmError {
    let tokens = tokenize(input);
    let program = Parser::new(tokens).parse_program().unwrap_or_else(|e| panic!("parse error: {e}"));
    let mut compiler = Compiler::new();
    compiler.compile(&program).unwrap_or_else(|e| panic!("compile error: {e}"));
    let mut vm = Vm::new(compiler.bytecode());
    vm.run().expect_err("expected a runtime error")
}

#[test]
fn arithmetic_and_boolean_expressions() {
    assert_eq!(eval("1 + 2 * 3"), Object::Integer(7));
    assert_eq!(eval("(5 + 10 * 2 + 15 / 3) * 2 + -10"), Object::Integer(50));
    assert_eq!(eval("true == (1 < 2)"), Object::Boolean(true));
    assert_eq!(eval("!(if (false) { 5 })"), Object::Boolean(true));
}

#[test]
fn conditionals_without_alternative_yield_null() {
    assert_eq!(eval("if (1 > 2) { 10 }"), Object::Null);
    assert_eq!(eval("if (1 > 2) { 10 } else { 20 }"), Object::Integer(20));
}

#[test]
fn global_let_bindings() {
    assert_eq!(eval("let one = 1; let two = 2; one + two"), Object::Integer(3));
    assert_eq!(eval("let a = 5; let b = a + 1; b"), Object::Integer(6));
}

#[test]
fn string_literals_concatenate() {
    match eval(r#""mon" + "key" + "!""#) {
        Object::Str(s) => assert_eq!(s.as_str(), "monkey!"),
        other => panic!("expected a string, got {other:?}"),
    }
}

#[test]
fn arrays_index_and_builtins() {
    assert_eq!(eval("[1, 2, 3][1]"), Object::Integer(2));
    assert_eq!(eval("[1, 2, 3][99]"), Object::Null);
    assert_eq!(eval(r#"len([1, 2, 3, 4])"#), Object::Integer(4));
    assert_eq!(eval(r#"let a = [1, 2, 3]; len(rest(a))"#), Object::Integer(2));
    assert_eq!(eval("first(push([], 1))"), Object::Integer(1));
    assert_eq!(eval("last(push(push([], 1), 2))"), Object::Integer(2));
}

#[test]
fn hash_literals_index_by_key() {
    assert_eq!(eval(r#"let h = {"one": 1, "two": 2}; h["one"] + h["two"]"#), Object::Integer(3));
    assert_eq!(eval(r#"{}["missing"]"#), Object::Null);
    assert_eq!(eval("let h = {5: 50}; h[2 + 3]"), Object::Integer(50));
}

#[test]
fn closures_capture_enclosing_bindings() {
    let input = "\
        let newAdder = fn(a, b) {\
            fn(c) { a + b + c };\
        };\
        let adder = newAdder(1, 2);\
        adder(8);";
    assert_eq!(eval(input), Object::Integer(11));
}

#[test]
fn transitively_nested_closures() {
    let input = "\
        let newAdderOuter = fn(a, b) {\
            fn(c) {\
                fn(d) { a + b + c + d };\
            };\
        };\
        let newAdderInner = newAdderOuter(1, 2);\
        let adder = newAdderInner(3);\
        adder(8);";
    assert_eq!(eval(input), Object::Integer(14));
}

#[test]
fn recursive_function_via_current_closure() {
    let input = "\
        let countDown = fn(x) {\
            if (x == 0) { return 0; } else { countDown(x - 1); }\
        };\
        countDown(1);";
    assert_eq!(eval(input), Object::Integer(0));

    let wrapped = "\
        let wrapper = fn() {\
            let countDown = fn(x) {\
                if (x == 0) { return 0; } else { countDown(x - 1); }\
            };\
            countDown(1);\
        };\
        wrapper();";
    assert_eq!(eval(wrapped), Object::Integer(0));
}

#[test]
fn mutually_recursive_closures_share_no_state() {
    let input = "\
        let one = fn() { 1; };\
        let closures = [one(), one()];\
        closures[0] + closures[1];";
    assert_eq!(eval(input), Object::Integer(2));
}

#[test]
fn string_identity_is_reference_not_structural() {
    assert_eq!(eval(r#"let a = "x"; let b = "x"; a == b"#), Object::Boolean(false));
    assert_eq!(eval(r#"let a = "x"; let b = a; a == b"#), Object::Boolean(true));
}

#[test]
fn array_identity_is_reference_not_structural() {
    assert_eq!(eval("let a = [1]; let b = [1]; a == b"), Object::Boolean(false));
}

#[test]
fn wrong_number_of_arguments_is_a_runtime_error() {
    assert_eq!(
        eval_err("let f = fn(a, b) { a + b }; f(1);"),
        VmError::WrongNumberOfArguments { want: 2, got: 1 }
    );
    assert_eq!(eval_err("fn() { 1; }(1);"), VmError::WrongNumberOfArguments { want: 0, got: 1 });
}

#[test]
fn division_by_zero_halts_the_vm() {
    assert_eq!(eval_err("10 / 0;"), VmError::DivisionByZero);
}

#[test]
fn calling_a_non_function_halts_the_vm() {
    assert_eq!(eval_err("let x = 5; x();"), VmError::CallingNonFunction);
}

#[test]
fn builtins_report_in_band_errors_not_vm_halts() {
    // Builtin type/arity errors surface as an `Object::Error` value on the
    // stack, never as a VmError — the VM keeps running.
    assert_eq!(eval("len(1)"), Object::Error("argument to `len` not supported, got INTEGER".to_string()));
    assert_eq!(eval("len(\"a\", \"b\")"), Object::Error("wrong number of arguments. got=2, want=1".to_string()));
}

#[test]
fn puts_returns_null_and_prints_its_arguments() {
    assert_eq!(eval(r#"puts("hello")"#), Object::Null);
}

#[test]
fn closures_over_closures_remain_independent_instances() {
    let input = "\
        let makeCounter = fn() {\
            let count = 0;\
            fn() { count }\
        };\
        let a = makeCounter();\
        let b = makeCounter();\
        a()";
    assert_eq!(eval(input), Object::Integer(0));
}
