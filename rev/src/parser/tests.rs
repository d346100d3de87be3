//! Parser tests for Rev surface syntax

use crate::ast::{BinOp, ExprKind, Program, Stmt, TypeExpr, UnOp};
use crate::lexer::tokenize;
use crate::parser::parse;

/// Helper to parse a Rev program
fn parse_program(source: &str) -> crate::Result<Program> {
    let tokens = tokenize(source)?;
    parse(source, tokens)
}

/// Helper to parse and expect success
fn parse_ok(source: &str) -> Program {
    parse_program(source).expect("Parse should succeed")
}

/// Helper to check if parsing fails
fn parse_fails(source: &str) -> bool {
    parse_program(source).is_err()
}

/// Helper to parse a single expression statement
fn parse_expr_kind(source: &str) -> ExprKind {
    let prog = parse_ok(source);
    assert_eq!(prog.stmts.len(), 1);
    match &prog.stmts[0].node {
        Stmt::Expr(e) => e.kind.clone(),
        other => panic!("Expected expression statement, got {other:?}"),
    }
}

/// Helper to parse the annotation of a single `var` declaration
fn parse_annotation(source: &str) -> TypeExpr {
    let prog = parse_ok(source);
    match &prog.stmts[0].node {
        Stmt::VarDecl { ty: Some(ty), .. } => ty.node.clone(),
        other => panic!("Expected annotated VarDecl, got {other:?}"),
    }
}

// ============================================
// Literals and Statements
// ============================================

#[test]
fn test_parse_empty_program() {
    assert!(parse_ok("").stmts.is_empty());
    assert!(parse_ok("\n\n;\n").stmts.is_empty());
}

#[test]
fn test_parse_literals() {
    assert_eq!(parse_expr_kind("42"), ExprKind::IntLit(42));
    assert_eq!(parse_expr_kind("2.5"), ExprKind::FloatLit(2.5));
    assert_eq!(parse_expr_kind("true"), ExprKind::BoolLit(true));
    assert_eq!(parse_expr_kind("null"), ExprKind::Null);
    assert_eq!(parse_expr_kind(r#""hi""#), ExprKind::StringLit("hi".to_string()));
}

#[test]
fn test_parse_var_and_const() {
    let prog = parse_ok("var a = 1\nconst b: float = 2");
    assert_eq!(prog.stmts.len(), 2);
    match &prog.stmts[0].node {
        Stmt::VarDecl { name, mutable, ty, .. } => {
            assert_eq!(name.node, "a");
            assert!(*mutable);
            assert!(ty.is_none());
        }
        other => panic!("Expected VarDecl, got {other:?}"),
    }
    match &prog.stmts[1].node {
        Stmt::VarDecl { mutable, ty, .. } => {
            assert!(!*mutable);
            assert_eq!(ty.as_ref().map(|t| t.node.clone()), Some(TypeExpr::Float));
        }
        other => panic!("Expected VarDecl, got {other:?}"),
    }
}

#[test]
fn test_parse_semicolon_separated_statements() {
    let prog = parse_ok("var a: int? = null; var b = a");
    assert_eq!(prog.stmts.len(), 2);
}

#[test]
fn test_parse_assignment() {
    let prog = parse_ok("x = x + 1");
    assert!(matches!(&prog.stmts[0].node, Stmt::Assign { target, .. } if target.node == "x"));
}

#[test]
fn test_parse_missing_separator_fails() {
    assert!(parse_fails("var a = 1 var b = 2"));
}

#[test]
fn test_parse_statement_spans() {
    let prog = parse_ok("var a = 1\nprint(a)");
    assert_eq!(prog.stmts[0].span.start, 0);
    assert_eq!(prog.stmts[0].span.end, 9);
    assert_eq!(prog.stmts[1].span.start, 10);
}

// ============================================
// Operators and Precedence
// ============================================

#[test]
fn test_parse_precedence_mul_over_add() {
    match parse_expr_kind("1 + 2 * 3") {
        ExprKind::Binary { op: BinOp::Add, right, .. } => {
            assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
        }
        other => panic!("Expected Add, got {other:?}"),
    }
}

#[test]
fn test_parse_left_associative_subtraction() {
    match parse_expr_kind("10 - 3 - 2") {
        ExprKind::Binary { op: BinOp::Sub, left, .. } => {
            assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::Sub, .. }));
        }
        other => panic!("Expected Sub, got {other:?}"),
    }
}

#[test]
fn test_parse_and_binds_tighter_than_or() {
    match parse_expr_kind("a or b and c") {
        ExprKind::Binary { op: BinOp::Or, right, .. } => {
            assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::And, .. }));
        }
        other => panic!("Expected Or, got {other:?}"),
    }
}

#[test]
fn test_parse_comparison_under_equality() {
    match parse_expr_kind("a < b == true") {
        ExprKind::Binary { op: BinOp::Eq, left, .. } => {
            assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::Lt, .. }));
        }
        other => panic!("Expected Eq, got {other:?}"),
    }
}

#[test]
fn test_parse_unary_operators() {
    assert!(matches!(parse_expr_kind("-x"), ExprKind::Unary { op: UnOp::Neg, .. }));
    assert!(matches!(parse_expr_kind("!done"), ExprKind::Unary { op: UnOp::Not, .. }));
}

#[test]
fn test_parse_grouping() {
    match parse_expr_kind("(1 + 2) * 3") {
        ExprKind::Binary { op: BinOp::Mul, left, .. } => {
            assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::Add, .. }));
        }
        other => panic!("Expected Mul, got {other:?}"),
    }
}

#[test]
fn test_parse_is_binds_below_and() {
    match parse_expr_kind("a is int and a > 0") {
        ExprKind::Binary { op: BinOp::And, left, .. } => {
            assert!(matches!(left.kind, ExprKind::Is { .. }));
        }
        other => panic!("Expected And, got {other:?}"),
    }
}

// ============================================
// Calls, Tags, Try and Catch
// ============================================

#[test]
fn test_parse_call_with_args() {
    match parse_expr_kind("add(1, 2)") {
        ExprKind::Call { callee, args } => {
            assert_eq!(callee.as_var(), Some("add"));
            assert_eq!(args.len(), 2);
        }
        other => panic!("Expected Call, got {other:?}"),
    }
}

#[test]
fn test_parse_call_args_span_lines() {
    let prog = parse_ok("add(\n  1,\n  2\n)\nprint(3)");
    assert_eq!(prog.stmts.len(), 2);
}

#[test]
fn test_parse_curried_call() {
    match parse_expr_kind("make(1)(2)") {
        ExprKind::Call { callee, .. } => assert!(matches!(callee.kind, ExprKind::Call { .. })),
        other => panic!("Expected Call, got {other:?}"),
    }
}

#[test]
fn test_parse_error_tag() {
    assert_eq!(
        parse_expr_kind("DivError.ZeroDiv"),
        ExprKind::ErrorTag {
            set: "DivError".to_string(),
            tag: "ZeroDiv".to_string()
        }
    );
}

#[test]
fn test_parse_try() {
    match parse_expr_kind("try div(4, 2)") {
        ExprKind::Try(inner) => assert!(matches!(inner.kind, ExprKind::Call { .. })),
        other => panic!("Expected Try, got {other:?}"),
    }
}

#[test]
fn test_parse_catch_without_binding() {
    match parse_expr_kind("div(4, 0) catch -1") {
        ExprKind::Catch { binding, handler, .. } => {
            assert!(binding.is_none());
            assert!(matches!(handler.kind, ExprKind::Unary { op: UnOp::Neg, .. }));
        }
        other => panic!("Expected Catch, got {other:?}"),
    }
}

#[test]
fn test_parse_catch_with_binding() {
    match parse_expr_kind("div(4, 0) catch |e| 0") {
        ExprKind::Catch { binding, .. } => {
            assert_eq!(binding.map(|b| b.node), Some("e".to_string()));
        }
        other => panic!("Expected Catch, got {other:?}"),
    }
}

#[test]
fn test_parse_conversions() {
    assert!(matches!(
        parse_expr_kind("int(2.5)"),
        ExprKind::Convert { target: TypeExpr::Int, .. }
    ));
    assert!(matches!(
        parse_expr_kind("string(1)"),
        ExprKind::Convert { target: TypeExpr::String, .. }
    ));
    assert!(parse_fails("int(1, 2)"));
    assert!(parse_fails("var x = int"));
}

// ============================================
// Control Flow
// ============================================

#[test]
fn test_parse_if_else_chain() {
    let prog = parse_ok("if a { 1 } else if b { 2 } else { 3 }");
    match &prog.stmts[0].node {
        Stmt::If { else_branch: Some(else_branch), .. } => {
            assert!(matches!(else_branch.node, Stmt::If { .. }));
        }
        other => panic!("Expected If with else, got {other:?}"),
    }
}

#[test]
fn test_parse_else_on_next_line() {
    let prog = parse_ok("if a {\n  print(1)\n}\nelse {\n  print(2)\n}");
    assert_eq!(prog.stmts.len(), 1);
    assert!(matches!(&prog.stmts[0].node, Stmt::If { else_branch: Some(_), .. }));
}

#[test]
fn test_parse_if_expression() {
    let prog = parse_ok("var m = if a > b { a } else { b }");
    match &prog.stmts[0].node {
        Stmt::VarDecl { init, .. } => assert!(matches!(init.kind, ExprKind::If { .. })),
        other => panic!("Expected VarDecl, got {other:?}"),
    }
}

#[test]
fn test_parse_if_expression_requires_else() {
    assert!(parse_fails("var m = if a { 1 }"));
}

#[test]
fn test_parse_while_and_for() {
    let prog = parse_ok("while i < 10 { i = i + 1 }\nfor j in 0..n + 1 { print(j) }");
    assert!(matches!(&prog.stmts[0].node, Stmt::While { .. }));
    match &prog.stmts[1].node {
        Stmt::For { var, end, .. } => {
            assert_eq!(var.node, "j");
            assert!(matches!(end.kind, ExprKind::Binary { op: BinOp::Add, .. }));
        }
        other => panic!("Expected For, got {other:?}"),
    }
}

#[test]
fn test_parse_break_continue_return() {
    let prog = parse_ok("fn f(): void {\n  while true { break; continue }\n  return\n}");
    match &prog.stmts[0].node {
        Stmt::FnDecl(f) => {
            assert_eq!(f.body.stmts.len(), 2);
            assert!(matches!(f.body.stmts[1].node, Stmt::Return(None)));
        }
        other => panic!("Expected FnDecl, got {other:?}"),
    }
}

#[test]
fn test_parse_return_before_brace_has_no_value() {
    let prog = parse_ok("fn f(): void { return }");
    match &prog.stmts[0].node {
        Stmt::FnDecl(f) => assert!(matches!(f.body.stmts[0].node, Stmt::Return(None))),
        other => panic!("Expected FnDecl, got {other:?}"),
    }
}

#[test]
fn test_parse_unclosed_block_fails() {
    assert!(parse_fails("if a { print(1)"));
}

// ============================================
// Declarations
// ============================================

#[test]
fn test_parse_fn_decl() {
    let prog = parse_ok("fn add(a: int, b: int): int {\n  return a + b\n}");
    match &prog.stmts[0].node {
        Stmt::FnDecl(f) => {
            assert_eq!(f.name.node, "add");
            assert_eq!(f.params.len(), 2);
            assert_eq!(f.ret_ty.node, TypeExpr::Int);
        }
        other => panic!("Expected FnDecl, got {other:?}"),
    }
}

#[test]
fn test_parse_fn_requires_return_type() {
    assert!(parse_fails("fn f(a: int) { return a }"));
    assert!(parse_fails("fn f(a) : int { return a }"));
}

#[test]
fn test_parse_div_example() {
    let source = "fn div(a: int, b: int): DivError!int { if b == 0 { return DivError.ZeroDiv } return a / b }";
    let prog = parse_ok(source);
    match &prog.stmts[0].node {
        Stmt::FnDecl(f) => {
            assert_eq!(
                f.ret_ty.node,
                TypeExpr::ErrorUnion {
                    set: "DivError".to_string(),
                    ok: Box::new(TypeExpr::Int)
                }
            );
            assert_eq!(f.body.stmts.len(), 2);
        }
        other => panic!("Expected FnDecl, got {other:?}"),
    }
}

#[test]
fn test_parse_error_decl() {
    let prog = parse_ok("error DivError {\n  ZeroDiv,\n  Overflow,\n}");
    match &prog.stmts[0].node {
        Stmt::ErrorDecl(decl) => {
            assert_eq!(decl.name.node, "DivError");
            let tags: Vec<_> = decl.tags.iter().map(|t| t.node.as_str()).collect();
            assert_eq!(tags, vec!["ZeroDiv", "Overflow"]);
        }
        other => panic!("Expected ErrorDecl, got {other:?}"),
    }
}

#[test]
fn test_parse_lambda_argument() {
    match parse_expr_kind("apply(fn(x: int): int { return x * 2 }, 3)") {
        ExprKind::Call { args, .. } => assert!(matches!(args[0].kind, ExprKind::Lambda { .. })),
        other => panic!("Expected Call, got {other:?}"),
    }
}

#[test]
fn test_parse_multiline_lambda_in_call() {
    let prog = parse_ok("apply(fn(x: int): int {\n  var y = x\n  return y\n}, 3)");
    assert_eq!(prog.stmts.len(), 1);
}

// ============================================
// Type Annotations
// ============================================

#[test]
fn test_parse_nullable_type() {
    assert_eq!(
        parse_annotation("var a: int? = null"),
        TypeExpr::Nullable(Box::new(TypeExpr::Int))
    );
}

#[test]
fn test_parse_union_type() {
    assert_eq!(
        parse_annotation("var a: int|string = 5"),
        TypeExpr::Union(vec![TypeExpr::Int, TypeExpr::String])
    );
}

#[test]
fn test_parse_nullable_union_needs_parens() {
    assert_eq!(
        parse_annotation("var a: (int|string)? = null"),
        TypeExpr::Nullable(Box::new(TypeExpr::Union(vec![TypeExpr::Int, TypeExpr::String])))
    );
    assert_eq!(
        parse_annotation("var a: int|string? = null"),
        TypeExpr::Union(vec![
            TypeExpr::Int,
            TypeExpr::Nullable(Box::new(TypeExpr::String))
        ])
    );
}

#[test]
fn test_parse_error_union_with_nullable_ok() {
    assert_eq!(
        parse_annotation("var a: E!int? = null"),
        TypeExpr::ErrorUnion {
            set: "E".to_string(),
            ok: Box::new(TypeExpr::Nullable(Box::new(TypeExpr::Int)))
        }
    );
}

#[test]
fn test_parse_function_type() {
    assert_eq!(
        parse_annotation("var f: fn(int, float): bool = g"),
        TypeExpr::Function {
            params: vec![TypeExpr::Int, TypeExpr::Float],
            ret: Box::new(TypeExpr::Bool)
        }
    );
}

#[test]
fn test_parse_is_with_type() {
    match parse_expr_kind("a is string") {
        ExprKind::Is { ty, .. } => assert_eq!(ty.node, TypeExpr::String),
        other => panic!("Expected Is, got {other:?}"),
    }
}

// ============================================
// Node Ids
// ============================================

#[test]
fn test_parse_node_ids_are_unique() {
    let prog = parse_ok("var a = 1 + 2\nprint(a)");
    let mut ids = Vec::new();
    for stmt in &prog.stmts {
        match &stmt.node {
            Stmt::VarDecl { init, .. } => {
                ids.push(init.id);
                if let ExprKind::Binary { left, right, .. } = &init.kind {
                    ids.push(left.id);
                    ids.push(right.id);
                }
            }
            Stmt::Expr(e) => ids.push(e.id),
            _ => {}
        }
    }
    let mut deduped = ids.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(ids.len(), deduped.len());
}

#[test]
fn test_parse_with_first_id() {
    use crate::parser::Parser;
    let source = "1 + 2";
    let tokens = tokenize(source).unwrap();
    let mut parser = Parser::new(source, &tokens).with_first_id(100);
    let prog = parser.parse_program().unwrap();
    assert_eq!(parser.next_id(), 103);
    match &prog.stmts[0].node {
        Stmt::Expr(e) => assert!(e.id.0 >= 100),
        other => panic!("Expected Expr, got {other:?}"),
    }
}

#[test]
fn test_parse_reports_every_bad_statement() {
    let source = "var = 1\nvar x = 2\nvar = 3";
    let err = parse_program(source).unwrap_err();
    let lines: Vec<usize> = err
        .errors()
        .iter()
        .filter_map(|e| e.span())
        .map(|span| source[..span.start].matches('\n').count() + 1)
        .collect();
    assert_eq!(lines, vec![1, 3]);
}

#[test]
fn test_parse_recovery_skips_whole_block() {
    let source = "fn f(): int {\n    var = 1\n    return 2\n}\nvar y = 2 +\nvar z = 3";
    let err = parse_program(source).unwrap_err();
    assert_eq!(err.errors().len(), 2);
    assert!(err.to_string().lines().count() >= 2);
}

#[test]
fn test_parse_single_error_is_not_wrapped() {
    let err = parse_program("var a = 1\nvar = 2").unwrap_err();
    assert!(matches!(err, crate::CompileError::Parser { .. }));
}
