use crate::ast::{Arg, BinaryOp, Clause, ComprehensionBody, Expr, Literal, Param, Stmt, UnaryOp, parse_expr, parse_file};

fn stmts(src: &str) -> Vec<Stmt> {
    parse_file("test.star", src).unwrap().stmts
}

fn ident_name(e: &Expr) -> &str {
    match e {
        Expr::Ident(id) => &id.name,
        other => panic!("expected identifier, got {other:?}"),
    }
}

#[test]
fn precedence_of_arithmetic() {
    // 1 + 2 * 3  =>  1 + (2 * 3)
    let e = parse_expr("1 + 2 * 3").unwrap();
    let Expr::Binary { op: BinaryOp::Plus, y, .. } = e else {
        panic!("expected +, got {e:?}");
    };
    assert!(matches!(*y, Expr::Binary { op: BinaryOp::Star, .. }));
}

#[test]
fn not_binds_looser_than_comparison() {
    let e = parse_expr("not a == b").unwrap();
    let Expr::Unary { op: UnaryOp::Not, x, .. } = e else {
        panic!("expected not");
    };
    assert!(matches!(*x, Expr::Binary { op: BinaryOp::Eq, .. }));
}

#[test]
fn not_in_is_one_operator() {
    let e = parse_expr("x not in y").unwrap();
    assert!(matches!(e, Expr::Binary { op: BinaryOp::NotIn, .. }));
}

#[test]
fn comparisons_do_not_associate() {
    let err = parse_expr("a < b < c").unwrap_err();
    assert!(err.message.contains("does not associate"), "{err}");
}

#[test]
fn conditional_requires_else() {
    let err = parse_expr("a if b").unwrap_err();
    assert_eq!(err.message, "conditional expression without else clause");
    assert!(matches!(parse_expr("a if b else c").unwrap(), Expr::CondExpr { .. }));
}

#[test]
fn parens_and_tuples() {
    assert!(matches!(parse_expr("()").unwrap(), Expr::Tuple { ref elems, .. } if elems.is_empty()));
    assert!(matches!(parse_expr("(1)").unwrap(), Expr::Paren { .. }));
    let e = parse_expr("(1,)").unwrap();
    assert!(matches!(e.unparen(), Expr::Tuple { elems, .. } if elems.len() == 1));
    assert!(matches!(parse_expr("1, 2").unwrap(), Expr::Tuple { ref elems, .. } if elems.len() == 2));
}

#[test]
fn call_arguments() {
    let e = parse_expr("f(a, *b, c=1, **d)").unwrap();
    let Expr::Call { args, .. } = e else { panic!() };
    assert!(matches!(args[0], Arg::Positional(_)));
    assert!(matches!(args[1], Arg::Star { .. }));
    assert!(matches!(&args[2], Arg::Named { name, .. } if name == "c"));
    assert!(matches!(args[3], Arg::StarStar { .. }));
}

#[test]
fn slices_and_indexing() {
    assert!(matches!(parse_expr("x[1]").unwrap(), Expr::Index { .. }));
    let Expr::Slice { lo, hi, step, .. } = parse_expr("x[::2]").unwrap() else {
        panic!()
    };
    assert!(lo.is_none() && hi.is_none() && step.is_some());
    let Expr::Slice { lo, hi, step, .. } = parse_expr("x[a:]").unwrap() else {
        panic!()
    };
    assert!(lo.is_some() && hi.is_none() && step.is_none());
}

#[test]
fn comprehensions() {
    let Expr::Comprehension(c) = parse_expr("[x for x in y if x for z in x]").unwrap() else {
        panic!()
    };
    assert!(!c.is_dict());
    assert_eq!(c.clauses.len(), 3);
    assert!(matches!(c.clauses[1], Clause::If { .. }));

    let Expr::Comprehension(c) = parse_expr("{k: v for k, v in items}").unwrap() else {
        panic!()
    };
    assert!(c.is_dict());
    assert!(matches!(c.body, ComprehensionBody::Entry(_)));
    assert!(matches!(&c.clauses[0], Clause::For { vars: Expr::Tuple { .. }, .. }));
}

#[test]
fn lambda_params() {
    let Expr::Lambda(l) = parse_expr("lambda x, y=1, *args, **kw: x").unwrap() else {
        panic!()
    };
    assert_eq!(l.params.len(), 4);
    assert!(matches!(l.params[0], Param::Required(_)));
    assert!(matches!(l.params[1], Param::Optional { .. }));
    assert!(matches!(l.params[2], Param::Star { name: Some(_), .. }));
    assert!(matches!(l.params[3], Param::StarStar { .. }));
}

#[test]
fn def_with_bare_star() {
    let s = stmts("def f(a, *, b):\n    return a + b\n");
    let Stmt::Def(def) = &s[0] else { panic!() };
    assert_eq!(def.name.name, "f");
    assert!(matches!(def.params[1], Param::Star { name: None, .. }));
    assert!(matches!(def.body[0], Stmt::Return { result: Some(_), .. }));
}

#[test]
fn elif_chains_nest() {
    let s = stmts("if a:\n  x = 1\nelif b:\n  x = 2\nelse:\n  x = 3\n");
    assert_eq!(s.len(), 1);
    let Stmt::If { otherwise, .. } = &s[0] else { panic!() };
    let Stmt::If { otherwise: inner, .. } = &otherwise[0] else {
        panic!("elif should lower to nested if")
    };
    assert!(matches!(inner[0], Stmt::Assign { op: None, .. }));
}

#[test]
fn augmented_assignment() {
    let s = stmts("x += 1\ny //= 2\n");
    assert!(matches!(s[0], Stmt::Assign { op: Some(BinaryOp::Plus), .. }));
    assert!(matches!(s[1], Stmt::Assign { op: Some(BinaryOp::SlashSlash), .. }));
}

#[test]
fn semicolons_split_statements() {
    let s = stmts("a = 1; b = 2; pass\n");
    assert_eq!(s.len(), 3);
}

#[test]
fn load_statement() {
    let s = stmts(r#"load("lib.star", "a", c = "b")"#);
    let Stmt::Load(load) = &s[0] else { panic!() };
    assert_eq!(load.module, "lib.star");
    let from: Vec<_> = load.from.iter().map(|i| i.name.as_str()).collect();
    let to: Vec<_> = load.to.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(from, ["a", "b"]);
    assert_eq!(to, ["a", "c"]);

    let err = parse_file("t", r#"load("lib.star")"#).unwrap_err();
    assert!(err.message.contains("at least 1 symbol"));
}

#[test]
fn for_loop_vars() {
    let s = stmts("for a, b in pairs:\n  pass\n");
    let Stmt::For { vars, iterable, .. } = &s[0] else { panic!() };
    assert!(matches!(vars, Expr::Tuple { elems, .. } if elems.len() == 2));
    assert_eq!(ident_name(iterable), "pairs");
}

#[test]
fn positions_are_one_based() {
    let s = stmts("\n  \nx = foo.bar\n");
    let Stmt::Assign { rhs, .. } = &s[0] else { panic!() };
    assert_eq!(rhs.pos().line, 3);
    assert_eq!(rhs.pos().column, 5);
}

#[test]
fn literals() {
    assert!(matches!(parse_expr("0x10").unwrap(), Expr::Literal { value: Literal::Int(16), .. }));
    assert!(matches!(parse_expr("b'ab'").unwrap(), Expr::Literal { value: Literal::Bytes(_), .. }));
    assert!(matches!(parse_expr("-1").unwrap(), Expr::Unary { op: UnaryOp::Minus, .. }));
}

#[test]
fn unexpected_token() {
    let err = parse_file("t", "x = )\n").unwrap_err();
    assert!(err.message.starts_with("got )"), "{err}");
    assert_eq!(err.position.line, 1);
}

#[test]
fn missing_indented_block() {
    let err = parse_file("t", "def f():\nreturn\n").unwrap_err();
    assert!(err.message.contains("indented block"), "{err}");
}
