use super::*;

#[test]
fn test_toplevel_for_is_rejected() {
    let err = exec_err("for x in [1]:\n    pass\n");
    assert!(err.to_string().contains("for loop not within a function"), "{err}");
}

#[test]
fn test_toplevel_control_flow_with_global_reassign() {
    let options = FileOptions {
        allow_global_reassign: true,
        ..FileOptions::default()
    };
    let src = "\
total = 0
for x in range(5):
    if x == 3:
        continue
    total += x
";
    let globals = exec_with(options, src).expect("exec");
    assert_eq!(globals["total"].repr(), "7");
}

#[test]
fn test_nested_loops_break_and_continue() {
    let src = "\
def f():
    out = []
    for i in range(4):
        if i == 1:
            continue
        for j in range(4):
            if j > i:
                break
            out.append((i, j))
        if i == 2:
            break
    return out

result = f()
";
    assert_eq!(global(src, "result"), "[(0, 0), (2, 0), (2, 1), (2, 2)]");
}

#[test]
fn test_while_loop() {
    let src = "\
def collatz(n):
    steps = 0
    while n != 1:
        n = n // 2 if n % 2 == 0 else 3 * n + 1
        steps += 1
    return steps

result = collatz(27)
";
    assert_eq!(global(src, "result"), "111");
}

#[test]
fn test_return_inside_loop_pops_iterator() {
    let src = "\
def first_even(xs):
    for x in xs:
        if x % 2 == 0:
            return x
    return None

xs = [1, 3, 4, 5]
result = first_even(xs)
xs.append(6)
";
    let globals = exec(src);
    assert_eq!(globals["result"].repr(), "4");
    assert_eq!(globals["xs"].repr(), "[1, 3, 4, 5, 6]");
}

#[test]
fn test_mutation_during_iteration_fails() {
    let err = exec_err("def f(xs):\n    for x in xs:\n        xs.append(x)\n\nf([1])\n");
    assert!(err.to_string().contains("cannot append to list during iteration"), "{err}");
}

#[test]
fn test_short_circuit_evaluation() {
    let src = "\
calls = []
def t(v):
    calls.append(v)
    return v

a = t(0) and t(1)
b = t(2) or t(3)
c = t(None) or t('x')
";
    let globals = exec(src);
    assert_eq!(globals["a"].repr(), "0");
    assert_eq!(globals["b"].repr(), "2");
    assert_eq!(globals["c"].repr(), "\"x\"");
    assert_eq!(globals["calls"].repr(), "[0, 2, None, \"x\"]");
}

#[test]
fn test_comprehension_scopes_its_variables() {
    let src = "\
x = 'outer'
doubled = [x * 2 for x in range(3)]
pairs = {k: v for k, v in [('a', 1), ('b', 2)] if v > 1}
nested = [(i, j) for i in range(3) if i for j in range(i)]
";
    let globals = exec(src);
    assert_eq!(globals["doubled"].repr(), "[0, 2, 4]");
    assert_eq!(globals["x"].repr(), "\"outer\"");
    assert_eq!(globals["pairs"].repr(), "{\"b\": 2}");
    assert_eq!(globals["nested"].repr(), "[(1, 0), (2, 0), (2, 1)]");
}

#[test]
fn test_unpacking_assignment() {
    let src = "\
def f():
    a, (b, c) = 1, [2, 3]
    [d, e] = 'x-z'.split('-')
    return a, b, c, d, e

result = f()
";
    assert_eq!(global(src, "result"), "(1, 2, 3, \"x\", \"z\")");

    let err = exec_err("a, b = [1, 2, 3]\n");
    assert_eq!(runtime_error(&err), RuntimeError::TooManyValues { got: 3, want: 2 });
    let err = exec_err("a, b = 1\n");
    assert_eq!(runtime_error(&err), RuntimeError::NotUnpackable("int"));
}

#[test]
fn test_augmented_assignment_targets() {
    let src = "\
def f():
    d = {'n': 1}
    d['n'] += 41
    xs = [1]
    ys = xs
    xs += [2]
    s = {'a': 1}
    s |= {'b': 2}
    return d, ys, s

result = f()
";
    assert_eq!(global(src, "result"), "({\"n\": 42}, [1, 2], {\"a\": 1, \"b\": 2})");
}

#[test]
fn test_unbound_local() {
    let src = "\
def f(flag):
    if flag:
        y = 1
    return y

f(False)
";
    let err = exec_err(src);
    assert_eq!(runtime_error(&err), RuntimeError::UnboundLocal("y".to_string()));
}
