use std::fmt;
use std::sync::Arc;

use super::module::Module;
use super::program::Funcode;
use crate::token::Position;
use crate::val::{CellBox, Value};

/// A closure: compiled code bound to its module, default values and captured cells.
pub struct Function {
    funcode: Arc<Funcode>,
    module: Arc<Module>,
    defaults: Vec<Value>,
    freevars: Vec<Arc<CellBox>>,
}

impl Function {
    pub(crate) fn new(funcode: Arc<Funcode>, module: Arc<Module>, defaults: Vec<Value>, freevars: Vec<Arc<CellBox>>) -> Self {
        debug_assert_eq!(freevars.len(), funcode.freevars.len());
        Self {
            funcode,
            module,
            defaults,
            freevars,
        }
    }

    pub fn name(&self) -> &str {
        &self.funcode.name
    }

    pub fn doc(&self) -> &str {
        &self.funcode.doc
    }

    pub fn position(&self) -> Position {
        self.funcode.pos
    }

    pub fn funcode(&self) -> &Arc<Funcode> {
        &self.funcode
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub(crate) fn defaults(&self) -> &[Value] {
        &self.defaults
    }

    pub(crate) fn freevar(&self, i: usize) -> &Arc<CellBox> {
        &self.freevars[i]
    }

    /// Name of the `i`th parameter.
    pub fn param(&self, i: usize) -> Option<&str> {
        (i < self.funcode.num_params).then(|| self.funcode.locals[i].name.as_str())
    }

    pub fn freeze(&self) {
        self.defaults.iter().for_each(Value::freeze);
        self.freevars.iter().for_each(|c| c.freeze());
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.funcode.name)
            .field("pos", &self.funcode.pos)
            .finish_non_exhaustive()
    }
}
