//! Static name resolution.
//!
//! The resolver walks a parsed [`File`](crate::ast::File) once, assigning every
//! identifier a [`Binding`] and every `def`/`lambda` a [`FunctionInfo`]. Uses
//! inside functions are resolved lazily: local uses when the function body
//! ends, everything else in a second pass once the whole file has been seen,
//! which is when captured locals are promoted to cells.

mod binding;
mod resolver;

use std::fmt;

pub use binding::*;
pub use resolver::{NamePredicate, resolve_file, resolve_repl_chunk};

use crate::ast::Ident;
use crate::token::Position;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{pos}: {msg}")]
pub struct ResolveError {
    pub pos: Position,
    pub msg: String,
}

/// Every error found in one file, sorted by position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ResolveErrors(pub Vec<ResolveError>);

impl fmt::Display for ResolveErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// Output of a successful resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub bindings: Vec<Binding>,
    pub functions: Vec<FunctionInfo>,
    /// Locals of the module toplevel: load-bound names and comprehension variables.
    pub module_locals: Vec<BindingId>,
    pub module_globals: Vec<BindingId>,
}

impl Resolution {
    #[inline]
    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0 as usize]
    }

    #[inline]
    pub fn function(&self, id: FunctionId) -> &FunctionInfo {
        &self.functions[id.0 as usize]
    }

    /// Binding of a resolved identifier.
    ///
    /// Panics if the identifier was never visited by the resolver.
    pub fn binding_of(&self, id: &Ident) -> &Binding {
        let bid = id
            .binding
            .get()
            .unwrap_or_else(|| panic!("internal compiler error: unresolved identifier {}", id.name));
        self.binding(bid)
    }

    /// Names of the module globals, in index order.
    pub fn global_names(&self) -> impl Iterator<Item = &str> {
        self.module_globals.iter().map(|&b| self.binding(b).name.as_str())
    }
}

#[cfg(test)]
mod resolver_test;
