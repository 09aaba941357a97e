//! Source text in, globals out: the stages wired together for embedders.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::ast::{File, parse_file};
use crate::options::FileOptions;
use crate::resolve::{NamePredicate, ResolveErrors, resolve_file, resolve_repl_chunk};
use crate::universe;
use crate::val::{StringDict, Value};
use crate::vm::{Module, Program, Thread, compile_chunk, compile_file};

/// Filename reported for interactive chunks.
pub const REPL_FILENAME: &str = "<stdin>";

/// Resolves a parsed file against the universe and the embedder's
/// predeclared names, then compiles it.
pub fn resolve_and_compile(
    file: &File,
    options: FileOptions,
    is_predeclared: NamePredicate<'_>,
) -> Result<Program, ResolveErrors> {
    let resolution = resolve_file(file, options, is_predeclared, &universe::is_universal)?;
    Ok(compile_file(file, &resolution, options))
}

fn in_file(filename: &str, errors: &ResolveErrors) -> anyhow::Error {
    let lines: Vec<String> = errors.0.iter().map(|e| format!("{filename}:{e}")).collect();
    anyhow!(lines.join("\n"))
}

/// Parses, resolves and compiles `src`. Errors are prefixed with `filename`.
pub fn compile_source(
    filename: &str,
    src: &str,
    options: FileOptions,
    is_predeclared: NamePredicate<'_>,
) -> Result<Program> {
    let file = parse_file(filename, src).map_err(|e| anyhow!("{filename}:{e}"))?;
    let program = resolve_and_compile(&file, options, is_predeclared).map_err(|e| in_file(filename, &e))?;
    debug!(filename, functions = program.functions.len(), "compiled");
    Ok(program)
}

/// Executes a whole file on `thread` and returns its frozen globals.
///
/// The dialect comes from [`Thread::options`].
pub fn exec_file(thread: &mut Thread, filename: &str, src: &str, predeclared: StringDict) -> Result<StringDict> {
    let program = compile_source(filename, src, thread.options(), &|name| predeclared.contains_key(name))?;
    let (globals, result) = Arc::new(program).init(thread, predeclared);
    result?;
    globals.freeze();
    Ok(globals)
}

/// Executes one interactive chunk against the persistent `globals`.
///
/// Names already in `globals` resolve as module globals. Every global the
/// chunk binds is copied back into `globals`, even when execution fails part
/// way. Returns the value of a trailing expression statement, unless it is
/// `None`.
pub fn exec_repl_chunk(thread: &mut Thread, src: &str, globals: &mut StringDict) -> Result<Option<Value>> {
    let options = thread.options().repl();
    let file = parse_file(REPL_FILENAME, src).map_err(|e| anyhow!("{REPL_FILENAME}:{e}"))?;
    let resolution = resolve_repl_chunk(
        &file,
        options,
        &|name| globals.contains_key(name),
        &|_| false,
        &universe::is_universal,
    )
    .map_err(|e| in_file(REPL_FILENAME, &e))?;
    let program = compile_chunk(&file, &resolution, options);

    let module = Module::new(Arc::new(program), StringDict::new());
    module.seed_globals(globals);
    let result = module.run(thread);
    for (name, value) in module.globals().iter() {
        globals.insert(name.clone(), value.clone());
    }

    let value = result?;
    Ok((!value.is_none()).then_some(value))
}
