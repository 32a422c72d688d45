// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the code generator.

use super::*;
use crate::ast::Rule;

fn compile_source(source: &str) -> (VirtualMachine, Result<Program>) {
    let mut vm = VirtualMachine::new(4096).unwrap();
    let program = compile(source, &mut vm);
    (vm, program)
}

fn compile_ok(source: &str) -> (VirtualMachine, Program) {
    let (vm, program) = compile_source(source);
    (vm, program.unwrap())
}

fn compile_err(source: &str) -> Error {
    compile_source(source).1.unwrap_err()
}

fn run(source: &str) -> Word {
    let (mut vm, program) = compile_ok(source);
    vm.run_from(program.entry, false).unwrap()
}

// ==================== Expressions ====================

#[test]
fn test_return_constant() {
    assert_eq!(run("int main() { return 42; }"), 42);
}

#[test]
fn test_precedence() {
    assert_eq!(run("int main() { return 2 + 3 * 4; }"), 14);
    assert_eq!(run("int main() { return (2 + 3) * 4; }"), 20);
    assert_eq!(run("int main() { return 20 - 6 - 4; }"), 10);
    assert_eq!(run("int main() { return 100 / 10 / 5; }"), 2);
}

#[test]
fn test_comparisons_yield_zero_or_one() {
    assert_eq!(run("int main() { return 3 < 5; }"), 1);
    assert_eq!(run("int main() { return 3 >= 5; }"), 0);
    assert_eq!(run("int main() { return 4 == 4; }"), 1);
    assert_eq!(run("int main() { return 4 != 4; }"), 0);
}

#[test]
fn test_bitwise_operators() {
    assert_eq!(run("int main() { return 12 & 10; }"), 8);
    assert_eq!(run("int main() { return 12 | 3; }"), 15);
    assert_eq!(run("int main() { return 6 ^ 3; }"), 5);
    assert_eq!(run("int main() { return ~0; }"), -1);
}

#[test]
fn test_unary_operators() {
    assert_eq!(run("int main() { return -7 + 2; }"), -5);
    assert_eq!(run("int main() { return +7; }"), 7);
    assert_eq!(run("int main() { return !0; }"), 1);
    assert_eq!(run("int main() { return !5; }"), 0);
    assert_eq!(run("int main() { return sizeof(int); }"), 1);
}

#[test]
fn test_logical_operators_normalize() {
    assert_eq!(run("int main() { return 7 && 3; }"), 1);
    assert_eq!(run("int main() { return 0 && 3; }"), 0);
    assert_eq!(run("int main() { return 0 || 9; }"), 1);
    assert_eq!(run("int main() { return 0 || 0; }"), 0);
}

#[test]
fn test_short_circuit_skips_right_operand() {
    // Evaluating the right operand would divide by zero
    assert_eq!(run("int main() { return 0 && 1 / 0; }"), 0);
    assert_eq!(run("int main() { return 1 || 1 / 0; }"), 1);
}

#[test]
fn test_char_and_hex_literals() {
    assert_eq!(run("int main() { return 'a'; }"), 97);
    assert_eq!(run("int main() { return 0x1F; }"), 31);
}

// ==================== Statements ====================

#[test]
fn test_if_else() {
    let source = "int main() { int x; x = 5; if (x > 3) return 1; else return 2; }";
    assert_eq!(run(source), 1);
    let source = "int main() { int x; x = 1; if (x > 3) return 1; else return 2; }";
    assert_eq!(run(source), 2);
}

#[test]
fn test_if_without_else() {
    assert_eq!(run("int main() { int x; x = 0; if (1) x = 4; return x; }"), 4);
    assert_eq!(run("int main() { int x; x = 0; if (0) x = 4; return x; }"), 0);
}

#[test]
fn test_while_loop() {
    let source = "
        int main() {
            int i, sum;
            i = 1;
            sum = 0;
            while (i <= 10) {
                sum = sum + i;
                i = i + 1;
            }
            return sum;
        }";
    assert_eq!(run(source), 55);
}

#[test]
fn test_local_initializers() {
    assert_eq!(run("int main() { int a = 3, b = a * 2; return a + b; }"), 9);
}

#[test]
fn test_nested_block_shadows() {
    let source = "
        int main() {
            int x = 1;
            { int x = 2; x = x + 10; }
            return x;
        }";
    assert_eq!(run(source), 1);
}

#[test]
fn test_empty_statement_and_comments() {
    let source = "
        // leading comment
        int main() {
            ; /* nothing */ ;
            return 3;
        }";
    assert_eq!(run(source), 3);
}

// ==================== Functions ====================

#[test]
fn test_function_call_with_arguments() {
    let source = "
        int sub(int a, int b) { return a - b; }
        int main() { return sub(10, 3); }";
    assert_eq!(run(source), 7);
}

#[test]
fn test_recursive_factorial() {
    let source = "
        int fact(int n) {
            if (n < 2) return 1;
            return n * fact(n - 1);
        }
        int main() { return fact(10); }";
    assert_eq!(run(source), 3_628_800);
}

#[test]
fn test_prototype_allows_mutual_recursion() {
    let source = "
        int is_odd(int n);
        int is_even(int n) { if (n == 0) return 1; return is_odd(n - 1); }
        int is_odd(int n) { if (n == 0) return 0; return is_even(n - 1); }
        int main() { return is_even(10) * 10 + is_odd(7); }";
    assert_eq!(run(source), 11);
}

#[test]
fn test_void_parameter_list() {
    assert_eq!(run("int five(void) { return 5; } int main(void) { return five(); }"), 5);
}

#[test]
fn test_call_as_statement() {
    let source = "
        int counter;
        int bump(int by) { counter = counter + by; return counter; }
        int main() { bump(2); bump(3); return counter; }";
    assert_eq!(run(source), 5);
}

#[test]
fn test_address_and_dereference() {
    let source = "
        int main() {
            int x = 9;
            int p = &x;
            return *p;
        }";
    assert_eq!(run(source), 9);
}

// ==================== Globals and enums ====================

#[test]
fn test_enum_constants() {
    let source = "
        enum color { RED, GREEN = 5, BLUE };
        int main() { return RED + GREEN * 10 + BLUE * 100; }";
    assert_eq!(run(source), 650);
}

#[test]
fn test_anonymous_enum_with_negative_value() {
    assert_eq!(run("enum { LOW = -2, NEXT }; int main() { return NEXT; }"), -1);
}

#[test]
fn test_global_initializers_run_before_main() {
    let source = "
        int a = 4, b = 6;
        int c = a * b;
        int main() { return c + 1; }";
    assert_eq!(run(source), 25);
}

#[test]
fn test_uninitialized_global_is_zero() {
    assert_eq!(run("int g; int main() { return g; }"), 0);
}

// ==================== Errors ====================

#[test]
fn test_duplicate_declaration() {
    assert!(matches!(
        compile_err("int x; int x; int main() { return 0; }"),
        Error::DuplicateDeclaration { ref name, .. } if name == "x"
    ));
    assert!(matches!(
        compile_err("int main() { int a; int a; return 0; }"),
        Error::DuplicateDeclaration { .. }
    ));
}

#[test]
fn test_undefined_name() {
    let err = compile_err("int main() {\n  return missing;\n}");
    assert_eq!(
        err,
        Error::UndefinedName {
            name: "missing".into(),
            position: Position { line: 2, column: 10 },
        }
    );
}

#[test]
fn test_argument_count_mismatch() {
    assert!(matches!(
        compile_err("int f(int a) { return a; } int main() { return f(1, 2); }"),
        Error::ArgumentCount { expected: 1, found: 2, .. }
    ));
    assert!(matches!(
        compile_err("int main() { return malloc(); }"),
        Error::ArgumentCount { expected: 1, found: 0, .. }
    ));
}

#[test]
fn test_prototype_without_body() {
    assert!(matches!(
        compile_err("int f(int a); int main() { return f(1); }"),
        Error::UndefinedName { ref name, .. } if name == "f"
    ));
}

#[test]
fn test_prototype_arity_must_match_definition() {
    assert!(matches!(
        compile_err("int f(int a); int f(int a, int b) { return a; } int main() { return 0; }"),
        Error::ArgumentCount { expected: 1, found: 2, .. }
    ));
}

#[test]
fn test_missing_main() {
    assert!(matches!(
        compile_err("int helper() { return 1; }"),
        Error::UndefinedName { ref name, .. } if name == "main"
    ));
    assert!(matches!(
        compile_err("int main;"),
        Error::UndefinedName { ref name, .. } if name == "main"
    ));
}

#[test]
fn test_main_with_parameters() {
    assert!(matches!(
        compile_err("int main(int argc) { return argc; }"),
        Error::ArgumentCount { expected: 0, found: 1, .. }
    ));
}

#[test]
fn test_unexpected_symbol() {
    let err = compile_err("int main() { return 1 }");
    assert!(matches!(
        err,
        Error::UnexpectedSymbol { ref found, ref expected, .. }
            if found == "}" && expected == "`;`"
    ));
}

#[test]
fn test_assignment_to_constant_rejected() {
    assert!(matches!(
        compile_err("enum { K }; int main() { K = 1; return 0; }"),
        Error::UnexpectedSymbol { ref found, .. } if found == "K"
    ));
}

#[test]
fn test_unexpected_end_of_input() {
    assert!(matches!(
        compile_err("int main() { return 1;"),
        Error::UnexpectedSymbol { ref found, .. } if found == "<eof>"
    ));
}

// ==================== Program output ====================

#[test]
fn test_startup_chain_shape() {
    let (vm, program) = compile_ok("int main() { return 0; }");
    let listing = vm.disassemble();
    assert_eq!(program.entry, 0);
    assert_eq!(listing[0].1.opcode, OpCode::Jmp);

    // The chain ends in CALL main; EXIT
    let tail: Vec<_> = listing.iter().rev().take(2).map(|(_, i)| i.opcode).collect();
    assert_eq!(tail, vec![OpCode::Exit, OpCode::Call]);
}

#[test]
fn test_no_placeholders_left() {
    let (vm, _) = compile_ok(
        "int f(int n); int g = 2; int main() { return f(g); } int f(int n) { return n; }",
    );
    for (_, instruction) in vm.disassemble() {
        assert_ne!(instruction.opcode, OpCode::Plac);
    }
}

#[test]
fn test_function_prologue() {
    let (vm, program) = compile_ok("int main() { int a, b; { int c; } return 0; }");
    let main = program.symbols.iter().find(|s| s.name == "main").unwrap();
    let listing = vm.disassemble();
    let (_, prologue) = listing
        .iter()
        .find(|(address, _)| *address as Word == main.value)
        .unwrap();
    assert_eq!(prologue.opcode, OpCode::Ent);
    assert_eq!(prologue.operand, Some(3));
}

#[test]
fn test_symbol_listing() {
    let (_, program) = compile_ok("int g; int add(int a, int b) { int t; return a + b; } int main() { return 0; }");

    let builtins: Vec<_> = program
        .symbols
        .iter()
        .filter(|s| s.level == BUILTIN_LEVEL)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(
        builtins,
        vec!["open", "read", "close", "printf", "malloc", "free", "memset", "memcmp"]
    );

    let g = program.symbols.iter().find(|s| s.name == "g").unwrap();
    assert_eq!(g.level, GLOBAL_LEVEL);
    assert_eq!(g.class, SymbolClass::Variable);

    let a = program.symbols.iter().find(|s| s.name == "a").unwrap();
    let b = program.symbols.iter().find(|s| s.name == "b").unwrap();
    let t = program.symbols.iter().find(|s| s.name == "t").unwrap();
    assert_eq!((a.value, b.value, t.value), (-3, -2, 1));
    assert!(a.is_local());

    let add = program.symbols.iter().find(|s| s.name == "add").unwrap();
    assert_eq!(add.params, Some(2));
    assert!(add.defined);
}

#[test]
fn test_syntax_tree_shape() {
    let (_, program) = compile_ok("int x; int main() { return x + 1; }");
    let tree = &program.tree;
    assert_eq!(tree.rule(), Some(Rule::Program));

    let declarations: Vec<_> = tree.children().iter().filter_map(|node| node.rule()).collect();
    assert_eq!(declarations, vec![Rule::GlobalDeclaration, Rule::FunctionDeclaration]);

    assert_eq!(
        tree.terminals(),
        vec!["int", "x", ";", "int", "main", "(", ")", "{", "return", "x", "+", "1", ";", "}"]
    );
}

#[test]
fn test_syntax_tree_collapses_single_operands() {
    let (_, program) = compile_ok("int main() { return 7; }");
    let json = serde_json::to_value(&program.tree).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "program": [{
                "function_declaration": [
                    "int", "main",
                    {"parameters": ["(", ")"]},
                    {"block": ["{", {"return_statement": ["return", "7", ";"]}, "}"]}
                ]
            }]
        })
    );
}

#[test]
fn test_compile_into_too_small_text_segment() {
    let mut vm = VirtualMachine::new(64).unwrap();
    let source = "int main() { return 1 + 1 + 1 + 1 + 1 + 1 + 1 + 1 + 1 + 1; }";
    assert!(matches!(
        compile(source, &mut vm),
        Err(Error::SegmentFull { segment: crate::vm::Segment::Text })
    ));
}
