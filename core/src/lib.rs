//! Starling: a deterministic, sandboxed configuration language.
//!
//! The pipeline is `token` -> `ast` -> `resolve` -> `vm::compile_file` -> `vm::call`.
//! `eval` wires the stages together for embedders.

pub mod ast;
pub mod eval;
pub mod options;
pub mod resolve;
pub mod token;
pub mod universe;
pub mod util;
pub mod val;
pub mod vm;

pub use eval::{exec_file, exec_repl_chunk, resolve_and_compile};
pub use options::FileOptions;
pub use val::{StringDict, Value};
pub use vm::{EvalError, Program, Thread};
