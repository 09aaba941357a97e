//! Binding model shared by the resolver and the compiler.
//!
//! Each distinct variable gets exactly one [`Binding`], stored in an arena and
//! addressed by [`BindingId`]. The resolver may later promote a `Local` to a
//! `Cell` when a nested function captures it; the index never changes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::Position;

/// Index of a [`Binding`] in [`Resolution::bindings`](super::Resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub u32);

/// Index of a [`FunctionInfo`] in [`Resolution::functions`](super::Resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Name is not defined anywhere; the resolver reported an error.
    Undefined,
    /// Local to the current function or module toplevel.
    Local,
    /// Local captured by a nested function; lives in a heap cell.
    Cell,
    /// Cell belonging to an enclosing function.
    Free,
    /// Module global.
    Global,
    /// Supplied by the embedder for this module.
    Predeclared,
    /// Builtin available to every module.
    Universal,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Undefined => "undefined",
            Scope::Local => "local",
            Scope::Cell => "cell",
            Scope::Free => "free",
            Scope::Global => "global",
            Scope::Predeclared => "predeclared",
            Scope::Universal => "universal",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub scope: Scope,
    /// Slot in the locals, freevars or globals table, depending on `scope`.
    /// Meaningless for predeclared, universal and undefined names.
    pub index: usize,
    pub name: String,
    /// Position of the first binding occurrence, if the name is bound in this file.
    pub first: Option<Position>,
}

/// Static facts about one `def` or `lambda`.
#[derive(Debug, Clone, Default)]
pub struct FunctionInfo {
    pub pos: Position,
    pub name: String,
    /// Parameter count including `*args` and `**kwargs`, excluding a bare `*`.
    pub num_params: usize,
    pub num_kwonly: usize,
    pub has_varargs: bool,
    pub has_kwargs: bool,
    /// Parameters first (`*args`, `**kwargs` last), then other locals.
    pub locals: Vec<BindingId>,
    /// Bindings of the enclosing function captured by this one, in freevar index order.
    pub freevars: Vec<BindingId>,
}
