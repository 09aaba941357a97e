use std::fmt;

use crate::token::Position;

fn at_most_prefix(b: &bool) -> &'static str {
    if *b { "at most " } else { "" }
}

fn plural(n: &usize) -> &'static str {
    if *n == 1 { "" } else { "s" }
}

fn count(names: &[String]) -> usize {
    names.len()
}

fn plural_of(names: &[String]) -> &'static str {
    plural(&names.len())
}

fn joined(names: &[String]) -> String {
    names.join(", ")
}

fn lowest(len: &usize) -> i64 {
    -(*len as i64)
}

fn highest(len: &usize) -> i64 {
    *len as i64 - 1
}

/// Failure kinds raised by the VM and the builtin value operations.
///
/// These travel inside `anyhow::Error`; callers that care about the kind
/// downcast to this type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("local variable {0} referenced before assignment")]
    UnboundLocal(String),
    #[error("global variable {0} referenced before assignment")]
    UnboundGlobal(String),
    #[error("function {name} accepts no arguments ({given} given)")]
    NoArguments { name: String, given: usize },
    #[error("function {name} accepts {}{want} positional argument{} ({given} given)", at_most_prefix(.at_most), plural(.want))]
    TooManyPositional {
        name: String,
        want: usize,
        given: usize,
        at_most: bool,
    },
    #[error("function {name} got multiple values for parameter {param}")]
    DuplicateArgument { name: String, param: String },
    #[error("function {name} got an unexpected keyword argument {keyword}{hint}")]
    UnexpectedKeyword {
        name: String,
        keyword: String,
        hint: String,
    },
    #[error("function {name} missing {} argument{} ({})", count(.params), plural_of(.params), joined(.params))]
    MissingArguments { name: String, params: Vec<String> },
    #[error("too many values to unpack (got {got}, want {want})")]
    TooManyValues { got: usize, want: usize },
    #[error("too few values to unpack (got {got}, want {want})")]
    TooFewValues { got: usize, want: usize },
    #[error("function {0} called recursively")]
    Recursion(String),
    #[error("{0} value is not iterable")]
    NotIterable(&'static str),
    #[error("invalid call of non-function ({0})")]
    NotCallable(&'static str),
    #[error("unknown binary op: {x} {op} {y}")]
    BinaryOp {
        op: &'static str,
        x: &'static str,
        y: &'static str,
    },
    #[error("unknown unary op: {op}{x}")]
    UnaryOp { op: &'static str, x: &'static str },
    #[error("unsupported comparison: {x} {op} {y}")]
    Comparison {
        op: &'static str,
        x: &'static str,
        y: &'static str,
    },
    #[error("comparison exceeded maximum recursion depth")]
    ComparisonDepth,
    #[error("{type_name} value does not support {capability}")]
    Unsupported {
        type_name: &'static str,
        capability: &'static str,
    },
    #[error("{type_name} has no .{name} field or method{hint}")]
    NoAttr {
        type_name: &'static str,
        name: String,
        hint: String,
    },
    #[error("cannot {verb} frozen {type_name}")]
    Frozen { verb: &'static str, type_name: &'static str },
    #[error("cannot {verb} {type_name} during iteration")]
    Iterating { verb: &'static str, type_name: &'static str },
    #[error("unhashable type: {0}")]
    Unhashable(&'static str),
    #[error("key {0} not in dict")]
    KeyNotFound(String),
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("index {index} out of range [{}:{}]", lowest(.len), highest(.len))]
    IndexOutOfRange { index: i64, len: usize },
    #[error("index {index} out of range: empty {type_name}")]
    IndexOfEmpty { index: i64, type_name: &'static str },
    #[error("integer overflow")]
    Overflow,
    #[error("{0} by zero")]
    DivisionByZero(&'static str),
    #[error("argument after ** must be a mapping, not {0}")]
    KwargsNotMapping(&'static str),
    #[error("keywords must be strings, not {0}")]
    KeywordNotString(&'static str),
    #[error("argument after * must be iterable, not {0}")]
    ArgsNotIterable(&'static str),
    #[error("got {0} in sequence assignment")]
    NotUnpackable(&'static str),
    #[error("Starling computation cancelled: {0}")]
    Cancelled(String),
    #[error("load not implemented by this application")]
    LoadUnsupported,
    #[error("cannot load {module}: {message}")]
    Load { module: String, message: String },
    #[error("load: name {name} not found in module {module}{hint}")]
    LoadName {
        name: String,
        module: String,
        hint: String,
    },
}

/// Formats an optional spelling suggestion as ` (did you mean x?)`.
pub(crate) fn did_you_mean(suggestion: Option<&str>) -> String {
    suggestion.map(|s| format!(" (did you mean {s}?)")).unwrap_or_default()
}

/// One entry of a Starling call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub name: String,
    /// `None` for builtins.
    pub pos: Option<(String, Position)>,
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pos {
            Some((file, pos)) => write!(f, "{file}:{pos}: in {}", self.name),
            None => write!(f, "<builtin>: in {}", self.name),
        }
    }
}

/// An error annotated with the Starling call stack at the point of failure.
///
/// The innermost frame is last. The original error is kept as [`cause`](Self::cause)
/// so embedders can still downcast it.
#[derive(Debug)]
pub struct EvalError {
    pub msg: String,
    pub callstack: Vec<CallFrame>,
    cause: anyhow::Error,
}

impl EvalError {
    pub fn new(cause: anyhow::Error, callstack: Vec<CallFrame>) -> Self {
        Self {
            msg: cause.to_string(),
            callstack,
            cause,
        }
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Multi-line rendering: the call stack, outermost first, then the message.
    pub fn backtrace(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in &self.callstack {
            out.push_str("  ");
            out.push_str(&frame.to_string());
            out.push('\n');
        }
        match self.callstack.last() {
            Some(CallFrame { name, pos: None }) => out.push_str(&format!("Error in {name}: {}", self.msg)),
            _ => out.push_str(&format!("Error: {}", self.msg)),
        }
        out
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.source()
    }
}
