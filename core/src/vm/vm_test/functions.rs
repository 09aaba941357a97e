use super::*;

#[test]
fn test_def_and_call() {
    let src = "def f(x):\n    return x + 1\n\nresult = f(41)\n";
    assert_eq!(global(src, "result"), "42");
}

#[test]
fn test_closure_observes_later_assignment() {
    let src = "\
def outer():
    x = 1
    def inner():
        return x
    x = 2
    return inner()

result = outer()
";
    assert_eq!(global(src, "result"), "2");
}

#[test]
fn test_closures_share_one_cell() {
    let src = "\
def counter():
    n = [0]
    def bump():
        n[0] += 1
        return n[0]
    def peek():
        return n[0]
    return bump, peek

bump, peek = counter()
a = bump()
b = bump()
seen = peek()
";
    let globals = exec(src);
    assert_eq!(globals["a"].repr(), "1");
    assert_eq!(globals["b"].repr(), "2");
    assert_eq!(globals["seen"].repr(), "2");
}

#[test]
fn test_parameter_kinds_bind() {
    let src = "\
def f(a, b=2, *c, d, **e):
    return [a, b, c, d, e]

r1 = f(1, d=4)
r2 = f(1, 3, 5, 6, d=4, z=7)
r3 = f(d=0, a=9)
";
    let globals = exec(src);
    assert_eq!(globals["r1"].repr(), "[1, 2, (), 4, {}]");
    assert_eq!(globals["r2"].repr(), "[1, 3, (5, 6), 4, {\"z\": 7}]");
    assert_eq!(globals["r3"].repr(), "[9, 2, (), 0, {}]");
}

#[test]
fn test_missing_keyword_only_argument() {
    let err = exec_err("def f(a, b=2, *c, d, **e):\n    pass\n\nf(1)\n");
    assert_eq!(
        runtime_error(&err),
        RuntimeError::MissingArguments {
            name: "f".to_string(),
            params: vec!["d".to_string()],
        }
    );
    assert!(err.to_string().contains("missing 1 argument (d)"), "{err}");
}

#[test]
fn test_argument_binding_errors() {
    let cases = [
        ("def f():\n    pass\n\nf(1)\n", "accepts no arguments (1 given)"),
        ("def f(a):\n    pass\n\nf(1, 2)\n", "function f accepts 1 positional argument (2 given)"),
        ("def f(a, b=1):\n    pass\n\nf(1, 2, 3)\n", "function f accepts at most 2 positional arguments (3 given)"),
        ("def f(*, a):\n    return a\n\nf(1)\n", "function f accepts 0 positional arguments (1 given)"),
        ("def f(a):\n    pass\n\nf(1, a=2)\n", "got multiple values for parameter a"),
        ("def f(alpha):\n    pass\n\nf(alpah=1)\n", "unexpected keyword argument alpah (did you mean alpha?)"),
        ("def f(a, b):\n    pass\n\nf()\n", "missing 2 arguments (a, b)"),
    ];
    for (src, want) in cases {
        let err = exec_err(src);
        assert!(err.to_string().contains(want), "{src}: got {err}, want {want}");
    }
}

#[test]
fn test_star_args_and_kwargs_are_spread() {
    let src = "\
def f(a, b, c=0, **kw):
    return (a, b, c, kw)

args = [1, 2]
kwargs = {'c': 3, 'd': 4}
result = f(*args, **kwargs)
";
    assert_eq!(global(src, "result"), "(1, 2, 3, {\"d\": 4})");
}

#[test]
fn test_defaults_are_evaluated_once() {
    let src = "\
def f(xs=[]):
    xs.append(1)
    return len(xs)

a = f()
b = f()
";
    let globals = exec(src);
    assert_eq!(globals["a"].repr(), "1");
    assert_eq!(globals["b"].repr(), "2");
}

#[test]
fn test_lambda() {
    let src = "add = lambda x, y=10: x + y\nresult = [add(1), add(1, 2)]\n";
    assert_eq!(global(src, "result"), "[11, 3]");
}

#[test]
fn test_recursion_rejected_by_default() {
    let src = "\
def fact(n):
    if n <= 1:
        return 1
    return n * fact(n - 1)

result = fact(5)
";
    let err = exec_err(src);
    assert_eq!(runtime_error(&err), RuntimeError::Recursion("fact".to_string()));

    let options = FileOptions {
        allow_recursion: true,
        ..FileOptions::default()
    };
    let globals = exec_with(options, src).expect("recursion allowed");
    assert_eq!(globals["result"].repr(), "120");
}

#[test]
fn test_call_from_host() {
    let globals = exec("def greet(name, punct='!'):\n    return 'hello ' + name + punct\n");
    let mut thread = Thread::default();
    let result = call(
        &mut thread,
        &globals["greet"],
        vec![Value::str("world")],
        vec![("punct".into(), Value::str("?"))],
    )
    .expect("call");
    assert_eq!(result.as_str(), Some("hello world?"));
    assert_eq!(thread.call_stack_depth(), 0);
}

#[test]
fn test_backtrace_lists_every_frame() {
    let src = "\
def inner(x):
    return x // 0

def outer():
    return inner(1)

outer()
";
    let err = exec_err(src);
    let eval = err.downcast_ref::<EvalError>().expect("EvalError");
    let names: Vec<&str> = eval.callstack.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["<toplevel>", "outer", "inner"]);
    let trace = eval.backtrace();
    assert!(trace.contains("test.star:2:"), "{trace}");
    assert!(trace.ends_with("Error: integer division by zero"), "{trace}");
}
