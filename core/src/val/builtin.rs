use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::Value;
use crate::vm::Thread;

/// Keyword arguments in call order.
pub type Kwargs = [(Arc<str>, Value)];

/// Native implementation of a builtin function or method.
///
/// The `&Builtin` argument gives access to the bound receiver for methods.
pub type BuiltinFn = fn(&mut Thread, &Builtin, &[Value], &Kwargs) -> Result<Value>;

#[derive(Clone)]
pub struct Builtin {
    name: &'static str,
    func: BuiltinFn,
    receiver: Option<Value>,
}

impl Builtin {
    pub fn new(name: &'static str, func: BuiltinFn) -> Self {
        Self {
            name,
            func,
            receiver: None,
        }
    }

    /// A method value: `func` bound to `receiver`.
    pub fn method(name: &'static str, func: BuiltinFn, receiver: Value) -> Self {
        Self {
            name,
            func,
            receiver: Some(receiver),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.receiver.as_ref()
    }

    pub fn call(&self, thread: &mut Thread, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
        (self.func)(thread, self, args, kwargs)
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("receiver", &self.receiver.as_ref().map(Value::type_name))
            .finish()
    }
}

impl From<Builtin> for Value {
    fn from(b: Builtin) -> Self {
        Value::Builtin(Arc::new(b))
    }
}
