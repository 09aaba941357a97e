//! Bytecode compiler.
//!
//! Each function body is lowered to a graph of basic blocks, which is then
//! linearized with fall-through edges preferred, jump operands patched and
//! the maximum operand stack depth computed.

mod builder;
mod const_eval;
mod driver;
mod expr;
mod stmt;

pub use driver::{TOPLEVEL_NAME, compile_chunk, compile_file};
