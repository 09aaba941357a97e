use proptest::prelude::*;

use crate::ast::{Expr, File, Stmt, parse_file};
use crate::options::FileOptions;
use crate::resolve::{FunctionId, Resolution, ResolveErrors, Scope, resolve_file, resolve_repl_chunk};

const PREDECLARED: &[&str] = &["f", "a", "b", "c", "d"];
const UNIVERSAL: &[&str] = &["len", "None", "True", "False", "print"];

fn resolve_with(src: &str, options: FileOptions) -> (File, Result<Resolution, ResolveErrors>) {
    let file = parse_file("test.star", src).unwrap();
    let res = resolve_file(
        &file,
        options,
        &|name: &str| PREDECLARED.contains(&name),
        &|name: &str| UNIVERSAL.contains(&name),
    );
    (file, res)
}

fn resolve(src: &str) -> (File, Resolution) {
    let (file, res) = resolve_with(src, FileOptions::default());
    match res {
        Ok(r) => (file, r),
        Err(e) => panic!("unexpected resolve errors:\n{e}"),
    }
}

fn errors(src: &str) -> Vec<String> {
    let (_, res) = resolve_with(src, FileOptions::default());
    res.expect_err("expected resolve errors").0.into_iter().map(|e| e.msg).collect()
}

fn def_body(stmt: &Stmt) -> &[Stmt] {
    match stmt {
        Stmt::Def(def) => &def.body,
        other => panic!("expected def, got {other:?}"),
    }
}

fn returned_ident(stmt: &Stmt) -> &crate::ast::Ident {
    match stmt {
        Stmt::Return {
            result: Some(Expr::Ident(id)),
            ..
        } => id,
        other => panic!("expected `return name`, got {other:?}"),
    }
}

#[test]
fn nested_read_makes_cell_and_free() {
    let src = "\
def outer():
    x = 1
    def inner():
        return x
    return inner
";
    let (file, res) = resolve(src);
    let outer = res.function(FunctionId(0));
    let inner = res.function(FunctionId(1));
    assert_eq!(outer.name, "outer");

    let x = outer.locals[0];
    assert_eq!(res.binding(x).name, "x");
    assert_eq!(res.binding(x).scope, Scope::Cell);
    assert_eq!(inner.freevars, vec![x]);

    let use_in_inner = returned_ident(&def_body(&def_body(&file.stmts[0])[1])[0]);
    let b = res.binding_of(use_in_inner);
    assert_eq!(b.scope, Scope::Free);
    assert_eq!(b.index, 0);
}

#[test]
fn capture_through_intermediate_function() {
    let src = "\
def f():
    v = 1
    def g():
        def h():
            return v
        return h
    return g
";
    let (_, res) = resolve(src);
    let (f, g, h) = (
        res.function(FunctionId(0)),
        res.function(FunctionId(1)),
        res.function(FunctionId(2)),
    );
    assert_eq!(res.binding(f.locals[0]).scope, Scope::Cell);
    assert_eq!(g.freevars, vec![f.locals[0]]);
    assert_eq!(h.freevars.len(), 1);
    assert_eq!(res.binding(h.freevars[0]).scope, Scope::Free);
}

#[test]
fn star_args_then_keyword_is_valid() {
    resolve("f(a, *b, c=1)");
    resolve("f(a, *b, c=1, **d)");
}

#[test]
fn call_argument_order_errors() {
    assert_eq!(errors("f(c=1, a)"), ["positional argument may not follow named"]);
    assert_eq!(errors("f(*a, b)"), ["positional argument may not follow *args"]);
    assert_eq!(errors("f(**a, *b)"), ["*args may not follow **kwargs"]);
    assert_eq!(errors("f(**a, **b)"), ["multiple **kwargs not allowed"]);
    assert_eq!(errors("f(c=1, c=2)"), [r#"keyword argument "c" is repeated"#]);
}

#[test]
fn too_many_positional_arguments() {
    let args = vec!["1"; 256].join(", ");
    let errs = errors(&format!("f({args})"));
    assert_eq!(errs, ["256 positional arguments in call, limit is 255"]);
}

#[test]
fn undefined_name_with_hint() {
    assert_eq!(
        errors("foo_bar = 1\nx = foo_baz\n"),
        ["undefined: foo_baz (did you mean foo_bar?)"]
    );
    assert_eq!(errors("x = zzz\n"), ["undefined: zzz"]);
}

#[test]
fn toplevel_reassignment() {
    assert_eq!(errors("x = 1\nx = 2\n"), ["cannot reassign global x declared at 1:1"]);
    let (_, res) = resolve_with(
        "x = 1\nx = 2\n",
        FileOptions {
            allow_global_reassign: true,
            ..Default::default()
        },
    );
    assert_eq!(res.unwrap().module_globals.len(), 1);
}

#[test]
fn toplevel_control_flow() {
    assert_eq!(errors("if a:\n  pass\n"), ["if statement not within a function"]);
    assert_eq!(errors("for x in a:\n  pass\n"), ["for loop not within a function"]);
    assert_eq!(errors("while a:\n  pass\n"), ["while loop not within a function"]);
    assert_eq!(errors("return 1\n"), ["return statement not within a function"]);
    let (_, res) = resolve_with(
        "for x in a:\n  if x:\n    break\n",
        FileOptions {
            allow_global_reassign: true,
            ..Default::default()
        },
    );
    assert!(res.is_ok());
}

#[test]
fn branch_outside_loop() {
    assert_eq!(errors("def g():\n  break\n"), ["break not in a loop"]);
    assert_eq!(
        errors("def g():\n  for x in a:\n    def h():\n      continue\n"),
        ["continue not in a loop"]
    );
    resolve("def g():\n  pass\n");
}

#[test]
fn load_placement_and_rebinding() {
    assert_eq!(errors("def g():\n  load('m', 'x')\n"), ["load statement within a function"]);
    assert_eq!(
        errors("load('m', '_x')\n"),
        ["load: names with leading underscores are not exported: _x"]
    );
    assert_eq!(errors("load('m', 'x')\nload('m', 'x')\n"), ["cannot reassign top-level x"]);

    let (_, res) = resolve("load('m', 'x')\ny = x\n");
    assert_eq!(res.module_locals.len(), 1);
    assert_eq!(res.binding(res.module_locals[0]).scope, Scope::Local);
}

#[test]
fn parameters() {
    let (_, res) = resolve("def g(p, *args, k, **kw):\n  return p\n");
    let g = res.function(FunctionId(0));
    let names: Vec<_> = g.locals.iter().map(|&b| res.binding(b).name.as_str()).collect();
    assert_eq!(names, ["p", "k", "args", "kw"]);
    assert_eq!(g.num_params, 4);
    assert_eq!(g.num_kwonly, 1);
    assert!(g.has_varargs && g.has_kwargs);

    let (_, res) = resolve("def g(p, *, k=1):\n  return p\n");
    let g = res.function(FunctionId(0));
    assert_eq!(g.num_params, 2);
    assert!(!g.has_varargs);

    assert_eq!(errors("def g(x, x):\n  pass\n"), ["duplicate parameter: x"]);
    assert_eq!(
        errors("def g(x=1, y):\n  pass\n"),
        ["required parameter may not follow optional"]
    );
    assert_eq!(
        errors("def g(x, *):\n  pass\n"),
        ["bare * must be followed by keyword-only parameters"]
    );
    assert_eq!(
        errors("def g(*a, *b):\n  pass\n"),
        ["multiple * parameters not allowed"]
    );
    assert_eq!(
        errors("def g(**kw, x):\n  pass\n"),
        ["required parameter may not follow **kw"]
    );
}

#[test]
fn defaults_resolve_in_enclosing_scope() {
    let src = "\
def g(x = a):
    return x
";
    let (file, res) = resolve(src);
    let Stmt::Def(def) = &file.stmts[0] else { unreachable!() };
    let crate::ast::Param::Optional { default: Expr::Ident(id), .. } = &def.params[0] else {
        unreachable!()
    };
    assert_eq!(res.binding_of(id).scope, Scope::Predeclared);
}

#[test]
fn assignment_targets() {
    assert_eq!(errors("f() = 1\n"), ["can't assign to function call"]);
    assert_eq!(
        errors("def g():\n  x, y = 1, 2\n  x, y += 1\n"),
        ["can't use tuple expression in augmented assignment"]
    );
    resolve("def g(o):\n  o.x = 1\n  o[0] += 1\n  [p, (q, r)] = o\n");
}

#[test]
fn comprehension_variables_do_not_alias_outer_locals() {
    let src = "\
def g():
    x = 1
    y = [x for x in [1, 2]]
    return x
";
    let (file, res) = resolve(src);
    let g = res.function(FunctionId(0));
    // x, the comprehension's own x, then y
    assert_eq!(g.locals.len(), 3);
    assert_eq!(res.binding(g.locals[1]).name, "x");
    assert_ne!(g.locals[0], g.locals[1]);
    let ret = returned_ident(&def_body(&file.stmts[0])[2]);
    assert_eq!(ret.binding.get(), Some(g.locals[0]));
}

#[test]
fn first_comprehension_operand_reads_outer_scope() {
    let (file, res) = resolve("x = [1]\ny = [x for x in x]\n");
    let Stmt::Assign {
        rhs: Expr::Comprehension(comp),
        ..
    } = &file.stmts[1]
    else {
        unreachable!()
    };
    let crate::ast::Clause::For {
        iterable: Expr::Ident(it),
        ..
    } = &comp.clauses[0]
    else {
        unreachable!()
    };
    assert_eq!(res.binding_of(it).scope, Scope::Global);
    assert_eq!(res.module_locals.len(), 1);
}

#[test]
fn forward_reference_to_global() {
    let (file, res) = resolve("def g():\n  return later\nlater = 1\n");
    let id = returned_ident(&def_body(&file.stmts[0])[0]);
    assert_eq!(res.binding_of(id).scope, Scope::Global);
}

#[test]
fn lambda_captures() {
    let (_, res) = resolve("def g(n):\n  return lambda: n\n");
    let g = res.function(FunctionId(0));
    let lam = res.function(FunctionId(1));
    assert_eq!(lam.name, "lambda");
    assert_eq!(res.binding(g.locals[0]).scope, Scope::Cell);
    assert_eq!(lam.freevars.len(), 1);
}

#[test]
fn repl_chunk_sees_previous_globals() {
    let file = parse_file("<stdin>", "y = x + 1\n").unwrap();
    let res = resolve_repl_chunk(
        &file,
        FileOptions::default().repl(),
        &|name: &str| name == "x",
        &|_: &str| false,
        &|_: &str| false,
    )
    .unwrap();
    let names: Vec<_> = res.global_names().collect();
    assert_eq!(names, ["x", "y"]);
}

#[test]
fn errors_are_collected_in_position_order() {
    let errs = errors("def g():\n  break\nx = nope\nreturn\n");
    assert_eq!(
        errs,
        [
            "break not in a loop",
            "undefined: nope",
            "return statement not within a function"
        ]
    );
}

fn nested_source(depth: usize, def_level: usize) -> String {
    let mut src = String::new();
    for level in 0..depth {
        let indent = "    ".repeat(level);
        src.push_str(&format!("{indent}def f{level}():\n"));
        if level == def_level {
            src.push_str(&format!("{indent}    v = {level}\n"));
        }
    }
    src.push_str(&format!("{}return v\n", "    ".repeat(depth)));
    src
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn capture_chain_adds_one_freevar_per_crossed_function(
        (depth, def_level) in (1usize..7).prop_flat_map(|d| (Just(d), 0..d))
    ) {
        let (_, res) = resolve(&nested_source(depth, def_level));
        let definer = res.function(FunctionId(def_level as u32));
        let v = definer.locals[0];
        let expected = if def_level + 1 < depth { Scope::Cell } else { Scope::Local };
        prop_assert_eq!(res.binding(v).scope, expected);
        for level in 0..depth {
            let f = res.function(FunctionId(level as u32));
            let want = usize::from(level > def_level);
            prop_assert_eq!(f.freevars.len(), want, "function f{}", level);
        }
    }
}
