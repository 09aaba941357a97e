use criterion::{Criterion, criterion_group, criterion_main};
use starling_core::eval::compile_source;
use starling_core::vm::{decode_program, encode_program};
use starling_core::{FileOptions, StringDict, Thread, exec_file};
use std::hint::black_box;
use std::sync::Arc;

const FIB: &str = "\
def fib(n):
    a, b = 0, 1
    for _ in range(n):
        a, b = b, a + b
    return a

def table(n):
    return {str(i): [fib(j) for j in range(i)] for i in range(n)}

result = table(30)
";

const CALLS: &str = "\
def add(x, y=1, *rest, scale=1, **extra):
    return (x + y) * scale

def run(n):
    total = 0
    for i in range(n):
        total += add(i, scale=2)
        total += add(i, 2, 3, scale=1, tag='t')
    return total

result = run(2000)
";

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_fib", |b| {
        b.iter(|| {
            let program = compile_source("fib.star", FIB, FileOptions::default(), &|_| false).unwrap();
            black_box(program);
        })
    });

    let program = compile_source("fib.star", FIB, FileOptions::default(), &|_| false).unwrap();
    let bytes = encode_program(&program).unwrap();
    c.bench_function("decode_fib", |b| {
        b.iter(|| black_box(decode_program(&bytes).unwrap()))
    });
}

fn bench_exec(c: &mut Criterion) {
    c.bench_function("exec_fib_table", |b| {
        b.iter(|| {
            let globals = exec_file(&mut Thread::default(), "fib.star", FIB, StringDict::new()).unwrap();
            black_box(globals);
        })
    });

    c.bench_function("exec_calls", |b| {
        b.iter(|| {
            let globals = exec_file(&mut Thread::default(), "calls.star", CALLS, StringDict::new()).unwrap();
            black_box(globals);
        })
    });

    // Execution only: the program is compiled once.
    let program = Arc::new(compile_source("calls.star", CALLS, FileOptions::default(), &|_| false).unwrap());
    c.bench_function("init_calls_precompiled", |b| {
        b.iter(|| {
            let (globals, result) = program.init(&mut Thread::default(), StringDict::new());
            result.unwrap();
            black_box(globals);
        })
    });
}

criterion_group!(benches, bench_compile, bench_exec);
criterion_main!(benches);
