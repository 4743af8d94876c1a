//! Parser tests for FineLang syntax

use crate::ast::*;
use crate::parser::parse_source;

/// Helper to parse and expect success
fn parse_ok(source: &str) -> Program {
    parse_source(source).expect("Parse should succeed")
}

/// Helper to check if parsing fails
fn parse_fails(source: &str) -> bool {
    parse_source(source).is_err()
}

/// Helper returning the single expression of an expression statement
fn expr_of(source: &str) -> Expr {
    let prog = parse_ok(source);
    assert_eq!(prog.stmts.len(), 1);
    match prog.stmts.into_iter().next().map(|s| s.node) {
        Some(Stmt::Expr(e)) => e.node,
        other => panic!("Expected expression statement, got {other:?}"),
    }
}

// ============================================
// Expressions
// ============================================

#[test]
fn test_parse_number_and_string() {
    assert!(matches!(expr_of("42"), Expr::Number(n) if n == 42.0));
    assert!(matches!(expr_of("\"hi\""), Expr::Str(s) if s == "hi"));
    assert!(matches!(expr_of("true"), Expr::Bool(true)));
}

#[test]
fn test_parse_precedence() {
    // 3 + 4 * 2 => 3 + (4 * 2)
    let Expr::Binary { left, op, right } = expr_of("3 + 4 * 2") else {
        panic!("Expected Binary");
    };
    assert_eq!(op, BinOp::Add);
    assert!(matches!(left.node, Expr::Number(n) if n == 3.0));
    assert!(matches!(right.node, Expr::Binary { op: BinOp::Mul, .. }));
}

#[test]
fn test_parse_left_associative() {
    // 10 - 4 - 3 => (10 - 4) - 3
    let Expr::Binary { left, op, .. } = expr_of("10 - 4 - 3") else {
        panic!("Expected Binary");
    };
    assert_eq!(op, BinOp::Sub);
    assert!(matches!(left.node, Expr::Binary { op: BinOp::Sub, .. }));
}

#[test]
fn test_parse_comparison_binds_loosest() {
    let Expr::Binary { op, .. } = expr_of("a + 1 < b * 2") else {
        panic!("Expected Binary");
    };
    assert_eq!(op, BinOp::Lt);
}

#[test]
fn test_parse_floor_div_and_matmul() {
    assert!(matches!(expr_of("a // b"), Expr::Binary { op: BinOp::FloorDiv, .. }));
    assert!(matches!(expr_of("a @ b"), Expr::Binary { op: BinOp::MatMul, .. }));
}

#[test]
fn test_parse_unary() {
    assert!(matches!(expr_of("-x"), Expr::Unary { op: UnOp::Neg, .. }));
    assert!(matches!(expr_of("!x"), Expr::Unary { op: UnOp::Not, .. }));
}

#[test]
fn test_parse_call_and_builtin_name() {
    let Expr::Call { func, args } = expr_of("print(1, 2)") else {
        panic!("Expected Call");
    };
    assert_eq!(func, "print");
    assert_eq!(args.len(), 2);
}

#[test]
fn test_parse_postfix_chain() {
    // a.b[0].c(1)
    let Expr::MethodCall {
        receiver, method, ..
    } = expr_of("a.b[0].c(1)")
    else {
        panic!("Expected MethodCall");
    };
    assert_eq!(method, "c");
    assert!(matches!(receiver.node, Expr::Index { .. }));
}

#[test]
fn test_parse_arrow_method_call() {
    assert!(matches!(
        expr_of("xs->append(3)"),
        Expr::MethodCall { method, .. } if method == "append"
    ));
}

#[test]
fn test_parse_new_and_super() {
    assert!(matches!(expr_of("new Point(1, 2)"), Expr::New { class, args } if class == "Point" && args.len() == 2));
    assert!(matches!(expr_of("super.speak()"), Expr::SuperCall { method, .. } if method == "speak"));
}

#[test]
fn test_parse_dict_literal() {
    let Expr::Dict(entries) = expr_of(r#"{name: "fine", "v": 1}"#) else {
        panic!("Expected Dict");
    };
    let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["name", "v"]);
}

#[test]
fn test_parse_matrix_literal() {
    let Expr::Matrix { rows, cols, cells } = expr_of("[[1, 2], [3, -4]]") else {
        panic!("Expected Matrix");
    };
    assert_eq!((rows, cols), (2, 2));
    assert_eq!(cells.len(), 4);
    assert!(matches!(cells[1].node, Expr::Number(n) if n == 2.0));
    assert!(matches!(cells[3].node, Expr::Unary { op: UnOp::Neg, .. }));
}

#[test]
fn test_parse_ragged_nested_array_stays_array() {
    assert!(matches!(expr_of("[[1, 2], [3]]"), Expr::Array(_)));
    assert!(matches!(expr_of("[[], []]"), Expr::Array(_)));
    assert!(matches!(expr_of("[]"), Expr::Array(v) if v.is_empty()));
}

// ============================================
// Statements
// ============================================

#[test]
fn test_parse_let_and_assign() {
    let prog = parse_ok("let x = 1\nx = x + 1");
    assert!(matches!(&prog.stmts[0].node, Stmt::Let { name, .. } if name == "x"));
    assert!(matches!(&prog.stmts[1].node, Stmt::Assign { name, .. } if name == "x"));
}

#[test]
fn test_parse_field_assign() {
    let prog = parse_ok("this.x = 5");
    assert!(matches!(&prog.stmts[0].node, Stmt::FieldAssign { field, .. } if field == "x"));
}

#[test]
fn test_parse_invalid_assignment_target() {
    assert!(parse_fails("1 = 2"));
    assert!(parse_fails("f() = 2"));
}

#[test]
fn test_parse_statements_without_separators() {
    let prog = parse_ok("let i = 0 while i < 3 { print(i) i = i + 1 }");
    assert_eq!(prog.stmts.len(), 2);
    let Stmt::While { body, .. } = &prog.stmts[1].node else {
        panic!("Expected While");
    };
    assert_eq!(body.len(), 2);
}

#[test]
fn test_parse_semicolons_optional() {
    let prog = parse_ok("let x = 3 + 4 * 2; print(x);");
    assert_eq!(prog.stmts.len(), 2);
}

#[test]
fn test_parse_fn_def() {
    let prog = parse_ok("fn add(a, b) {\n  return a + b\n}");
    let Stmt::FnDef(def) = &prog.stmts[0].node else {
        panic!("Expected FnDef");
    };
    assert_eq!(def.name, "add");
    assert_eq!(def.params, vec!["a", "b"]);
    assert!(matches!(def.body[0].node, Stmt::Return(Some(_))));
    assert_eq!(def.body[0].line, 2);
}

#[test]
fn test_parse_bare_return() {
    let prog = parse_ok("fn f() { return }");
    let Stmt::FnDef(def) = &prog.stmts[0].node else {
        panic!("Expected FnDef");
    };
    assert!(matches!(def.body[0].node, Stmt::Return(None)));
}

#[test]
fn test_parse_if_else_if_chain() {
    let prog = parse_ok("if a { 1 } else if b { 2 } else { 3 }");
    let Stmt::If { else_branch, .. } = &prog.stmts[0].node else {
        panic!("Expected If");
    };
    let else_branch = else_branch.as_ref().unwrap();
    assert!(matches!(&else_branch[0].node, Stmt::If { else_branch: Some(_), .. }));
}

#[test]
fn test_parse_for_forms() {
    let prog = parse_ok("for x in xs { print(x) }\nfor (y in ys) { }\nparallel for z in zs { }");
    assert!(matches!(&prog.stmts[0].node, Stmt::For { var, parallel: false, .. } if var == "x"));
    assert!(matches!(&prog.stmts[1].node, Stmt::For { var, .. } if var == "y"));
    assert!(matches!(&prog.stmts[2].node, Stmt::For { parallel: true, .. }));
}

#[test]
fn test_parse_class_with_inheritance() {
    let prog = parse_ok(
        "class Dog extends Animal {\n  let name\n  let breed\n  fn constructor(n) { this.name = n }\n  fn speak() { return \"woof\" }\n}",
    );
    let Stmt::ClassDef(class) = &prog.stmts[0].node else {
        panic!("Expected ClassDef");
    };
    assert_eq!(class.name, "Dog");
    assert_eq!(class.parent.as_deref(), Some("Animal"));
    assert_eq!(class.fields, vec!["name", "breed"]);
    assert_eq!(class.methods.len(), 2);
}

#[test]
fn test_parse_class_body_rejects_statements() {
    assert!(parse_fails("class A { print(1) }"));
}

#[test]
fn test_parse_try_catch_forms() {
    let prog = parse_ok(
        "try { f() } catch ValueError as e { print(e) } finally { g() }\ntry { f() } catch e { }\ntry { f() } catch { }",
    );
    let Stmt::Try { catch, finally, .. } = &prog.stmts[0].node else {
        panic!("Expected Try");
    };
    let catch = catch.as_ref().unwrap();
    assert_eq!(catch.kind.as_deref(), Some("ValueError"));
    assert_eq!(catch.var.as_deref(), Some("e"));
    assert!(finally.is_some());

    let Stmt::Try { catch, .. } = &prog.stmts[1].node else {
        panic!("Expected Try");
    };
    let catch = catch.as_ref().unwrap();
    assert_eq!(catch.kind, None);
    assert_eq!(catch.var.as_deref(), Some("e"));

    let Stmt::Try { catch, .. } = &prog.stmts[2].node else {
        panic!("Expected Try");
    };
    assert!(catch.as_ref().is_some_and(|c| c.var.is_none() && c.kind.is_none()));
}

#[test]
fn test_parse_try_requires_handler() {
    assert!(parse_fails("try { f() }"));
}

#[test]
fn test_parse_throw_and_assert() {
    let prog = parse_ok("throw \"boom\"\nassert x > 0, \"x must be positive\"\nassert y");
    assert!(matches!(&prog.stmts[0].node, Stmt::Throw(_)));
    assert!(matches!(&prog.stmts[1].node, Stmt::Assert { message: Some(_), .. }));
    assert!(matches!(&prog.stmts[2].node, Stmt::Assert { message: None, .. }));
}

#[test]
fn test_parse_imports() {
    let prog = parse_ok("import math as m\nfrom util import a, b\nimport \"./lib/helpers\"");
    assert!(matches!(&prog.stmts[0].node, Stmt::Import { module, alias: Some(a) } if module == "math" && a == "m"));
    assert!(matches!(&prog.stmts[1].node, Stmt::FromImport { names, .. } if names == &["a", "b"]));
    assert!(matches!(&prog.stmts[2].node, Stmt::Import { module, alias: None } if module == "./lib/helpers"));
}

#[test]
fn test_parse_export() {
    let prog = parse_ok("export fn f() { }\nexport let x = 1");
    assert!(matches!(&prog.stmts[0].node, Stmt::Export(inner) if matches!(inner.node, Stmt::FnDef(_))));
    assert!(matches!(&prog.stmts[1].node, Stmt::Export(inner) if matches!(inner.node, Stmt::Let { .. })));
    assert!(parse_fails("export 1"));
}

#[test]
fn test_parse_line_numbers() {
    let prog = parse_ok("let a = 1\n\nlet b = 2\n# comment\nprint(a)");
    let lines: Vec<_> = prog.stmts.iter().map(|s| s.line).collect();
    assert_eq!(lines, vec![1, 3, 5]);
}

// ============================================
// Errors
// ============================================

#[test]
fn test_parse_error_span_points_at_token() {
    let err = parse_source("let x = )").unwrap_err();
    assert_eq!(err.span().map(|s| s.start), Some(8));
    assert!(err.message().contains("expected expression"));
}

#[test]
fn test_struct_is_reserved() {
    let err = parse_source("print(1)\nstruct Point { }").unwrap_err();
    assert_eq!(err.message(), "'struct' is reserved; use 'class'");
    assert_eq!(err.span().map(|s| s.start), Some(9));
    assert!(parse_fails("let struct = 1"));
}

#[test]
fn test_parse_unclosed_block() {
    let err = parse_source("while x { print(x)").unwrap_err();
    assert!(err.message().contains("end of input"));
}

// ============================================
// Deep nesting
// ============================================

/// Dropping a deep tree recurses once per level
fn drop_deep<T>(value: T) {
    stacker::grow(64 * 1024 * 1024, move || drop(value));
}

#[test]
fn test_parse_deeply_nested_parens() {
    let depth = 10_000;
    let source = format!("print({}1{})", "(".repeat(depth), ")".repeat(depth));
    let Expr::Call { func, args } = expr_of(&source) else {
        panic!("Expected call");
    };
    assert_eq!(func, "print");
    assert!(matches!(args[0].node, Expr::Number(n) if n == 1.0));
}

#[test]
fn test_parse_long_unary_minus_chain() {
    let depth = 10_000;
    let expr = expr_of(&format!("{}1", "-".repeat(depth)));
    let mut count = 0;
    let mut node = &expr;
    while let Expr::Unary { op: UnOp::Neg, expr: inner } = node {
        count += 1;
        node = &inner.node;
    }
    assert_eq!(count, depth);
    assert!(matches!(node, Expr::Number(n) if *n == 1.0));
    drop_deep(expr);
}

#[test]
fn test_parse_deeply_nested_blocks() {
    let depth = 2_000;
    let source = format!("{}print(1){}", "if true { ".repeat(depth), "}".repeat(depth));
    let prog = parse_ok(&source);
    assert_eq!(prog.stmts.len(), 1);
    drop_deep(prog);
}

#[test]
fn test_deep_nesting_still_reports_errors() {
    let depth = 10_000;
    let source = format!("print({}1{})", "(".repeat(depth), ")".repeat(depth - 1));
    assert!(parse_fails(&source));
}
