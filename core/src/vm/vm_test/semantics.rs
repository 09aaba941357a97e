use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::*;

#[test]
fn test_frozen_globals_reject_mutation() {
    let globals = exec("xs = []\nd = {}\ndef add(x):\n    xs.append(x)\ndef put(k):\n    d[k] = 1\n");
    let mut thread = Thread::default();

    let err = call(&mut thread, &globals["add"], vec![Value::Int(1)], vec![]).unwrap_err();
    assert!(err.to_string().contains("cannot append to frozen list"), "{err}");

    let err = call(&mut thread, &globals["put"], vec![Value::str("k")], vec![]).unwrap_err();
    assert!(err.to_string().contains("frozen dict"), "{err}");
}

#[test]
fn test_global_reassignment_rejected() {
    let err = exec_err("x = 1\nx = 2\n");
    assert!(err.to_string().contains("x"), "{err}");

    let options = FileOptions {
        allow_global_reassign: true,
        ..FileOptions::default()
    };
    let globals = exec_with(options, "x = 1\nx = 2\n").expect("exec");
    assert_eq!(globals["x"].repr(), "2");
}

#[test]
fn test_arithmetic_and_comparison() {
    let src = "\
ints = [7 // 2, -7 // 2, 7 % 3, -7 % 3, 2 * 3 + 1, 1 << 4, 0xff & 0x0f, 6 ^ 3]
floats = [7 / 2, 1.5 * 2, 2.0 // 0.5]
cmp = [1 < 2, 'a' < 'b', [1, 2] < [1, 3], (1, 'a') == (1, 'a'), 1 == 1.0]
strs = ['ab' * 2, 'x' + 'y', 'hello'[1], 'hello'[-1], 'hello'[1:4], 'hello'[::-1]]
";
    let globals = exec(src);
    assert_eq!(globals["ints"].repr(), "[3, -4, 1, 2, 7, 16, 15, 5]");
    assert_eq!(globals["floats"].repr(), "[3.5, 3.0, 4.0]");
    assert_eq!(globals["cmp"].repr(), "[True, True, True, True, True]");
    assert_eq!(globals["strs"].repr(), "[\"abab\", \"xy\", \"e\", \"o\", \"ell\", \"olleh\"]");
}

#[test]
fn test_sequence_repetition() {
    let src = "\
lists = [[1, 2] * 2, 2 * [0], [1] * 0, [1] * -1 == []]
tuples = [2 * (1,), ('a', 'b') * 1, () * 5]
bs = [b'ab' * 2]
";
    let globals = exec(src);
    assert_eq!(globals["lists"].repr(), "[[1, 2, 1, 2], [0, 0], [], True]");
    assert_eq!(globals["tuples"].repr(), "[(1, 1), (\"a\", \"b\"), ()]");
    assert_eq!(globals["bs"].repr(), "[b\"abab\"]");
}

#[test]
fn test_int_float_comparison_is_exact() {
    let src = "\
big = [9007199254740993 == 9007199254740992.0, 9007199254740993 > 9007199254740992.0, 9007199254740992 == 9007199254740992.0]
small = [1 < 1.5, 2 > 1.5, -1 < -0.5, -1 > -1.5, 1.0 == 1, 0.5 < 1]
edge = [9223372036854775807 < 1e19, -9223372036854775807 > -1e19]
";
    let globals = exec(src);
    assert_eq!(globals["big"].repr(), "[False, True, True]");
    assert_eq!(globals["small"].repr(), "[True, True, True, True, True, True]");
    assert_eq!(globals["edge"].repr(), "[True, True]");
}

#[test]
fn test_operator_errors() {
    let cases = [
        ("x = 1 + 'a'\n", "unknown binary op: int + string"),
        ("x = 1 // 0\n", "integer division by zero"),
        ("x = [1][5]\n", "index 5 out of range"),
        ("x = {}['k']\n", "key \"k\" not in dict"),
        ("x = {[]: 1}\n", "unhashable type: list"),
        ("x = 1 < 'a'\n", "unsupported comparison"),
        ("x = None()\n", "invalid call of non-function (NoneType)"),
        ("x = 9223372036854775807 + 1\n", "integer overflow"),
    ];
    for (src, want) in cases {
        let err = exec_err(src);
        assert!(err.to_string().contains(want), "{src}: got {err}, want {want}");
    }
}

#[test]
fn test_attribute_errors_suggest_names() {
    let err = exec_err("x = [].apend(1)\n");
    assert!(err.to_string().contains("list has no .apend field or method (did you mean append?)"), "{err}");
}

#[test]
fn test_dict_preserves_insertion_order() {
    let src = "\
def build():
    d = {'b': 1, 'a': 2}
    d['c'] = 3
    d['b'] = 4
    d.pop('a')
    return d

d = build()
keys = list(d.keys())
";
    let globals = exec(src);
    assert_eq!(globals["keys"].repr(), "[\"b\", \"c\"]");
    assert_eq!(globals["d"].repr(), "{\"b\": 4, \"c\": 3}");
}

#[test]
fn test_print_hook_receives_output() {
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = out.clone();
    let mut thread = Thread::default();
    thread.set_print(move |msg| sink.borrow_mut().push(msg.to_string()));
    exec_file(&mut thread, "p.star", "print('a', 1, [2])\nprint('b', sep='-')\n", StringDict::new()).expect("exec");
    assert_eq!(*out.borrow(), ["a 1 [2]", "b"]);
}

#[test]
fn test_load_binds_requested_names() {
    let mut thread = Thread::default();
    thread.set_load(|thread, module| {
        assert_eq!(module, "lib.star");
        exec_file(thread, module, "def twice(x):\n    return 2 * x\nk = 21\n", StringDict::new())
    });
    let src = "load('lib.star', 'k', double = 'twice')\nresult = double(k)\n";
    let globals = exec_file(&mut thread, "main.star", src, StringDict::new()).expect("exec");
    assert_eq!(globals["result"].repr(), "42");
    assert!(!globals.contains_key("k"));
}

#[test]
fn test_load_errors() {
    let err = exec_err("load('lib.star', 'x')\n");
    assert_eq!(runtime_error(&err), RuntimeError::LoadUnsupported);

    let mut thread = Thread::default();
    thread.set_load(|_, _| {
        let mut dict = StringDict::new();
        dict.insert("value".to_string(), Value::Int(1));
        Ok(dict)
    });
    let err = exec_file(&mut thread, "main.star", "load('lib.star', 'valeu')\n", StringDict::new()).unwrap_err();
    assert!(
        err.to_string().contains("load: name valeu not found in module lib.star (did you mean value?)"),
        "{err}"
    );

    thread.set_load(|_, module| Err(anyhow::anyhow!("no such file: {module}")));
    let err = exec_file(&mut thread, "main.star", "load('gone.star', 'x')\n", StringDict::new()).unwrap_err();
    assert!(err.to_string().contains("cannot load gone.star: no such file: gone.star"), "{err}");
}

#[test]
fn test_cancellation_stops_execution() {
    let mut thread = Thread::default();
    thread.cancel("shutting down");
    let err = exec_file(&mut thread, "c.star", "x = 1\n", StringDict::new()).unwrap_err();
    assert_eq!(runtime_error(&err), RuntimeError::Cancelled("shutting down".to_string()));
    assert!(err.to_string().contains("Starling computation cancelled: shutting down"), "{err}");
}

#[test]
fn test_cancellation_from_another_thread() {
    let mut thread = Thread::default();
    let handle = thread.cancel_handle();
    let worker = std::thread::spawn(move || handle.cancel("timeout"));
    worker.join().expect("join");
    let err = exec_file(&mut thread, "c.star", "def f():\n    pass\nf()\n", StringDict::new()).unwrap_err();
    assert_eq!(runtime_error(&err), RuntimeError::Cancelled("timeout".to_string()));
}

const SPIN: &str = "\
def spin():
    n = 0
    while True:
        n += 1

spin()
";

#[test]
fn test_max_steps_cancels_by_default() {
    let options = FileOptions {
        max_steps: 1000,
        ..FileOptions::default()
    };
    let mut thread = Thread::new(options);
    let err = exec_file(&mut thread, "s.star", SPIN, StringDict::new()).unwrap_err();
    assert_eq!(runtime_error(&err), RuntimeError::Cancelled("too many steps".to_string()));
    assert!(thread.steps() >= 1000);
}

#[test]
fn test_max_steps_hook_decides() {
    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let mut thread = Thread::default();
    thread.set_max_steps(500);
    thread.set_on_max_steps(move |thread| {
        flag.store(true, Ordering::SeqCst);
        if thread.steps() >= 600 {
            thread.cancel("budget exhausted");
        }
    });
    let err = exec_file(&mut thread, "s.star", SPIN, StringDict::new()).unwrap_err();
    assert!(called.load(Ordering::SeqCst));
    assert_eq!(runtime_error(&err), RuntimeError::Cancelled("budget exhausted".to_string()));
    assert!(thread.steps() >= 600);
}

#[test]
fn test_repl_chunk_reports_last_expression() {
    let mut thread = Thread::default();
    let mut globals = StringDict::new();
    exec_repl_chunk(&mut thread, "xs = [1, 2, 3]\n", &mut globals).expect("chunk 1");
    let value = exec_repl_chunk(&mut thread, "sum = 0\nfor x in xs:\n    sum += x\nsum\n", &mut globals)
        .expect("chunk 2");
    assert_eq!(value.map(|v| v.repr()), Some("6".to_string()));
}
