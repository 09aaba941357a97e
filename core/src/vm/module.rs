use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;

use super::function::Function;
use super::program::Program;
use super::thread::Thread;
use super::call::call;
use crate::val::{StringDict, Value};

/// Runtime state of one executing [`Program`]: its globals, the predeclared
/// environment and the materialized constant pool. Shared by every function
/// created from the program.
pub struct Module {
    program: Arc<Program>,
    predeclared: StringDict,
    globals: RwLock<Vec<Option<Value>>>,
    constants: Vec<Value>,
}

impl Module {
    pub fn new(program: Arc<Program>, predeclared: StringDict) -> Arc<Self> {
        let constants = program.constants.iter().map(|c| c.to_value()).collect();
        let globals = RwLock::new(vec![None; program.globals.len()]);
        Arc::new(Self {
            program,
            predeclared,
            globals,
            constants,
        })
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn predeclared(&self) -> &StringDict {
        &self.predeclared
    }

    pub(crate) fn constant(&self, i: usize) -> &Value {
        &self.constants[i]
    }

    pub(crate) fn global(&self, i: usize) -> Option<Value> {
        self.globals.read().unwrap_or_else(PoisonError::into_inner)[i].clone()
    }

    pub(crate) fn set_global(&self, i: usize, v: Value) {
        self.globals.write().unwrap_or_else(PoisonError::into_inner)[i] = Some(v);
    }

    /// Sets every program global whose name appears in `values`.
    pub fn seed_globals(&self, values: &StringDict) {
        let mut globals = self.globals.write().unwrap_or_else(PoisonError::into_inner);
        for (slot, binding) in globals.iter_mut().zip(&self.program.globals) {
            if let Some(v) = values.get(&binding.name) {
                *slot = Some(v.clone());
            }
        }
    }

    /// Snapshot of the globals that are bound, in declaration order.
    pub fn globals(&self) -> StringDict {
        let globals = self.globals.read().unwrap_or_else(PoisonError::into_inner);
        self.program
            .globals
            .iter()
            .zip(globals.iter())
            .filter_map(|(b, v)| v.clone().map(|v| (b.name.clone(), v)))
            .collect()
    }

    /// Runs the toplevel code of the program in this module.
    pub fn run(self: &Arc<Self>, thread: &mut Thread) -> Result<Value> {
        let toplevel = Function::new(self.program.toplevel.clone(), self.clone(), Vec::new(), Vec::new());
        call(thread, &Value::Function(Arc::new(toplevel)), Vec::new(), Vec::new())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("filename", &self.program.filename)
            .field("globals", &self.program.globals.len())
            .finish_non_exhaustive()
    }
}

impl Program {
    /// Executes the toplevel statements with a fresh module. The globals are
    /// returned even when execution fails part way.
    pub fn init(self: &Arc<Self>, thread: &mut Thread, predeclared: StringDict) -> (StringDict, Result<()>) {
        let module = Module::new(self.clone(), predeclared);
        let result = module.run(thread).map(drop);
        (module.globals(), result)
    }
}
