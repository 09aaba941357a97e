pub(super) use crate::{
    eval::{exec_file, exec_repl_chunk},
    options::FileOptions,
    val::{StringDict, Value},
    vm::{EvalError, RuntimeError, Thread, call},
};

pub(super) fn exec_with(options: FileOptions, src: &str) -> anyhow::Result<StringDict> {
    let mut thread = Thread::new(options);
    exec_file(&mut thread, "test.star", src, StringDict::new())
}

pub(super) fn exec(src: &str) -> StringDict {
    exec_with(FileOptions::default(), src).unwrap_or_else(|e| panic!("{e:#}"))
}

/// `repr` of the global `name` after running `src`.
pub(super) fn global(src: &str, name: &str) -> String {
    exec(src)[name].repr()
}

pub(super) fn exec_err(src: &str) -> anyhow::Error {
    match exec_with(FileOptions::default(), src) {
        Ok(_) => panic!("expected an error from:\n{src}"),
        Err(e) => e,
    }
}

/// The VM error kind behind a runtime failure.
pub(super) fn runtime_error(err: &anyhow::Error) -> RuntimeError {
    let eval = err.downcast_ref::<EvalError>().expect("EvalError");
    eval.cause()
        .downcast_ref::<RuntimeError>()
        .cloned()
        .unwrap_or_else(|| panic!("not a RuntimeError: {eval}"))
}

mod control_flow;
mod functions;
mod semantics;
