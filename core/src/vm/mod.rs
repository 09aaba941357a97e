//! Bytecode compiler and virtual machine.
//!
//! [`compile_file`] turns a resolved syntax tree into a [`Program`]; a
//! [`Module`] holds the runtime state of one program, and [`call`] runs any
//! callable value on a [`Thread`].

mod call;
mod compiler;
mod encode;
mod error;
mod function;
mod interp;
mod module;
pub mod opcode;
pub mod program;
mod thread;

pub use call::call;
pub use compiler::{TOPLEVEL_NAME, compile_chunk, compile_file};
pub use encode::{decode_program, encode_program};
pub(crate) use error::did_you_mean;
pub use error::{CallFrame, EvalError, RuntimeError};
pub use function::Function;
pub use module::Module;
pub use opcode::{BYTECODE_VERSION, Opcode};
pub use program::{Constant, Funcode, NameBinding, Program, decode_insn};
pub use thread::{CancelHandle, LoadHook, PrintHook, StepLimitHook, Thread};

#[cfg(test)]
mod vm_test;
