use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::debug;

use super::error::CallFrame;
use crate::options::FileOptions;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{StringDict, Value};

/// Receives the output of the `print` builtin.
pub type PrintHook = Box<dyn FnMut(&str)>;

/// Resolves a module name in a `load` statement to its exported globals.
pub type LoadHook = Box<dyn FnMut(&mut Thread, &str) -> Result<StringDict>>;

/// Called when the step budget is exhausted.
pub type StepLimitHook = Arc<dyn Fn(&Thread) + Send + Sync>;

/// One entry of the live call stack.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) callable: Value,
    /// Program counter of the current instruction, for backtraces.
    pub(crate) pc: u32,
}

impl Frame {
    fn to_call_frame(&self) -> CallFrame {
        match &self.callable {
            Value::Function(f) => CallFrame {
                name: f.name().to_string(),
                pos: Some((f.module().program().filename.clone(), f.funcode().position(self.pc))),
            },
            Value::Builtin(b) => CallFrame {
                name: b.name().to_string(),
                pos: None,
            },
            Value::Object(o) => CallFrame {
                name: o.as_callable().map(|c| c.name().to_string()).unwrap_or_else(|| o.type_name().to_string()),
                pos: None,
            },
            other => CallFrame {
                name: other.type_name().to_string(),
                pos: None,
            },
        }
    }
}

/// Settable from any OS thread; the VM polls it once per instruction.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<OnceCell<String>>);

impl CancelHandle {
    /// Requests cancellation. Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(%reason, "cancellation requested");
        let _ = self.0.set(reason);
    }

    pub fn reason(&self) -> Option<&str> {
        self.0.get().map(String::as_str)
    }
}

/// Execution state of one logical thread: call stack, step accounting,
/// cancellation and the embedder's hooks.
///
/// A `Thread` runs one computation at a time; it is not shared.
pub struct Thread {
    pub name: String,
    options: FileOptions,
    pub(crate) stack: Vec<Frame>,
    pub(crate) steps: u64,
    pub(crate) max_steps: u64,
    cancel: CancelHandle,
    print: PrintHook,
    load: Option<LoadHook>,
    on_max_steps: Option<StepLimitHook>,
    locals: FastHashMap<String, Box<dyn Any>>,
}

impl Default for Thread {
    fn default() -> Self {
        Self::new(FileOptions::default())
    }
}

impl Thread {
    pub fn new(options: FileOptions) -> Self {
        Self {
            name: String::new(),
            options,
            stack: Vec::new(),
            steps: 0,
            max_steps: if options.max_steps == 0 { u64::MAX } else { options.max_steps },
            cancel: CancelHandle::default(),
            print: Box::new(|msg| eprintln!("{msg}")),
            load: None,
            on_max_steps: None,
            locals: fast_hash_map_new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn options(&self) -> FileOptions {
        self.options
    }

    pub fn set_print(&mut self, hook: impl FnMut(&str) + 'static) {
        self.print = Box::new(hook);
    }

    pub fn set_load(&mut self, hook: impl FnMut(&mut Thread, &str) -> Result<StringDict> + 'static) {
        self.load = Some(Box::new(hook));
    }

    pub fn set_on_max_steps(&mut self, hook: impl Fn(&Thread) + Send + Sync + 'static) {
        self.on_max_steps = Some(Arc::new(hook));
    }

    /// Zero removes the limit.
    pub fn set_max_steps(&mut self, max: u64) {
        self.max_steps = if max == 0 { u64::MAX } else { max };
    }

    /// Number of instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    pub(crate) fn cancel_reason(&self) -> Option<&str> {
        self.cancel.reason()
    }

    /// Called by the interpreter once the step budget is used up.
    pub(crate) fn step_limit_reached(&self) {
        match &self.on_max_steps {
            Some(hook) => hook(self),
            None => self.cancel("too many steps"),
        }
    }

    pub(crate) fn print(&mut self, msg: &str) {
        (self.print)(msg);
    }

    /// Runs the load hook for `module`. The hook is detached while it runs
    /// so that it may itself execute code on this thread.
    pub(crate) fn load(&mut self, module: &str) -> Option<Result<StringDict>> {
        let mut hook = self.load.take()?;
        debug!(module, "load");
        let result = hook(self, module);
        self.load.get_or_insert(hook);
        Some(result)
    }

    pub fn set_local(&mut self, key: impl Into<String>, value: Box<dyn Any>) {
        self.locals.insert(key.into(), value);
    }

    pub fn local(&self, key: &str) -> Option<&dyn Any> {
        self.locals.get(key).map(|b| b.as_ref())
    }

    /// Snapshot of the live call stack, outermost first.
    pub fn call_stack(&self) -> Vec<CallFrame> {
        self.stack.iter().map(Frame::to_call_frame).collect()
    }

    /// Depth of the live call stack.
    pub fn call_stack_depth(&self) -> usize {
        self.stack.len()
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("depth", &self.stack.len())
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}
