use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn starling(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_starling"));
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write file");
}

#[test]
fn test_run_file_prints() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "hello.star", "def greet(name):\n    return 'hello, ' + name\n\nprint(greet('world'))\n");

    starling(dir.path())
        .arg("hello.star")
        .assert()
        .success()
        .stdout("hello, world\n");
}

#[test]
fn test_runtime_error_prints_backtrace() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "bad.star", "def f(x):\n    return x // 0\n\nf(1)\n");

    starling(dir.path())
        .arg("bad.star")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Traceback (most recent call last):"))
        .stderr(predicate::str::contains("bad.star:2:"))
        .stderr(predicate::str::contains("integer division by zero"));
}

#[test]
fn test_static_error_exits_with_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "bad.star", "x = y\n");

    starling(dir.path())
        .arg("bad.star")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("bad.star:1:5: undefined: y"));
}

#[test]
fn test_recursion_flag() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(
        dir.path(),
        "fact.star",
        "def fact(n):\n    return 1 if n <= 1 else n * fact(n - 1)\n\nprint(fact(10))\n",
    );

    starling(dir.path())
        .arg("fact.star")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("called recursively"));

    starling(dir.path())
        .args(["fact.star", "--recursion"])
        .assert()
        .success()
        .stdout("3628800\n");

    starling(dir.path())
        .arg("fact.star")
        .env("STARLING_RECURSION", "1")
        .assert()
        .success()
        .stdout("3628800\n");
}

#[test]
fn test_config_file_allows_toplevel_loops() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "loop.star", "total = 0\nfor i in range(4):\n    total += i\nprint(total)\n");
    write_file(dir.path(), "starling.toml", "allow_global_reassign = true\n");

    starling(dir.path())
        .arg("loop.star")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("for loop not within a function"));

    starling(dir.path())
        .args(["--config", "starling.toml", "loop.star"])
        .assert()
        .success()
        .stdout("6\n");
}

#[test]
fn test_max_steps_cancels() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "spin.star", "def spin():\n    while True:\n        pass\n\nspin()\n");

    starling(dir.path())
        .args(["--max-steps", "10000", "spin.star"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cancelled: too many steps"));
}

#[test]
fn test_load_relative_to_main_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("pkg")).expect("mkdir");
    write_file(dir.path(), "pkg/lib.star", "def double(x):\n    return 2 * x\n");
    write_file(dir.path(), "pkg/main.star", "load('lib.star', 'double')\nprint(double(21))\n");

    starling(dir.path())
        .arg("pkg/main.star")
        .assert()
        .success()
        .stdout("42\n");
}

#[test]
fn test_compile_then_run_encoded_program() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "a.star", "xs = [i * i for i in range(4)]\nprint(xs)\n");

    starling(dir.path()).args(["compile", "a.star"]).assert().success();
    assert!(dir.path().join("a.slb").exists());

    starling(dir.path())
        .args(["compile", "a.star", "-o", "out/b.slb"])
        .assert()
        .success();
    assert!(dir.path().join("out/b.slb").exists());

    starling(dir.path())
        .arg("a.slb")
        .assert()
        .success()
        .stdout("[0, 1, 4, 9]\n");
}

#[test]
fn test_corrupt_encoded_program_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "junk.slb", "not a program");

    starling(dir.path())
        .arg("junk.slb")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to decode"));
}

#[test]
fn test_disasm_lists_functions() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "d.star", "def add(a, b):\n    return a + b\n\nx = add(1, 2)\n");

    starling(dir.path())
        .args(["disasm", "d.star"])
        .assert()
        .success()
        .stdout(predicate::str::contains("function <toplevel>"))
        .stdout(predicate::str::contains("function add"))
        .stdout(predicate::str::contains("RETURN"));
}

#[test]
fn test_rejects_parent_dir_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    starling(dir.path())
        .arg("../x.star")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Parent directory components"));
}
