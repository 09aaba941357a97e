//! Runtime values.
//!
//! [`Value`] is a cheap-to-clone handle: scalars are stored inline and
//! everything else behind an `Arc`. Mutable containers ([`List`], [`Dict`])
//! carry their own frozen flag and live-iterator count so that mutation of
//! frozen or in-iteration containers is rejected at every entry point.

mod access;
mod args;
mod builtin;
mod containers;
mod iter;
mod methods;
mod object;
mod ops;

use std::fmt::{self, Write as _};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use indexmap::IndexMap;

pub(crate) use args::{int_arg, str_arg};
pub use args::{check_no_kwargs, unpack_args, unpack_positional};
pub use builtin::{Builtin, BuiltinFn, Kwargs};
pub use containers::{CellBox, Dict, HashKey, List};
pub use iter::ValueIter;
pub(crate) use methods::update_dict;
pub use object::{Callable, Comparable, HasAttrs, HasSetField, HasSetIndex, HostObject, Indexable, Iterable};
pub use ops::{CompareOp, compare, equals};

use crate::vm::Function;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    List(Arc<List>),
    Tuple(Arc<[Value]>),
    Dict(Arc<Dict>),
    Range(Range),
    Function(Arc<Function>),
    Builtin(Arc<Builtin>),
    Object(Arc<dyn HostObject>),
    /// Heap cell of a captured local; only ever seen by the VM.
    Cell(Arc<CellBox>),
    /// Default-value marker for keyword-only parameters without a default.
    Mandatory,
}

/// Immutable arithmetic progression produced by `range()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let n = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };
        n as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `i`th element; `i` must be in bounds.
    pub fn at(&self, i: usize) -> i64 {
        self.start + (i as i64) * self.step
    }

    pub fn contains(&self, x: i64) -> bool {
        let in_bounds = if self.step > 0 {
            self.start <= x && x < self.stop
        } else {
            self.stop < x && x <= self.start
        };
        in_bounds && (x as i128 - self.start as i128) % self.step as i128 == 0
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    pub fn new_list(elems: Vec<Value>) -> Value {
        Value::List(Arc::new(List::new(elems)))
    }

    pub fn new_tuple(elems: Vec<Value>) -> Value {
        Value::Tuple(Arc::from(elems))
    }

    pub fn new_dict() -> Value {
        Value::Dict(Arc::new(Dict::default()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Object(o) => o.type_name(),
            Value::Cell(_) => "cell",
            Value::Mandatory => "mandatory",
        }
    }

    /// Truth value, as used by `if`, `and`, `or` and `not`.
    pub fn truth(&self) -> bool {
        match self {
            Value::None | Value::Mandatory => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => d.len() > 0,
            Value::Range(r) => !r.is_empty(),
            Value::Object(o) => o.truth(),
            Value::Function(_) | Value::Builtin(_) | Value::Cell(_) => true,
        }
    }

    /// Makes this value and everything reachable from it immutable.
    /// One-way and idempotent.
    pub fn freeze(&self) {
        match self {
            Value::List(l) => l.freeze(),
            Value::Dict(d) => d.freeze(),
            Value::Tuple(t) => t.iter().for_each(Value::freeze),
            Value::Function(f) => f.freeze(),
            Value::Builtin(b) => {
                if let Some(recv) = b.receiver() {
                    recv.freeze();
                }
            }
            Value::Object(o) => o.freeze(),
            Value::Cell(c) => c.freeze(),
            _ => {}
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Python-style `repr`: strings are quoted, containers show their elements.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, &mut Vec::new());
        out
    }

    /// `path` holds the containers currently being printed, so cycles
    /// render as `[...]` / `{...}` instead of recursing forever.
    fn write_repr(&self, out: &mut String, path: &mut Vec<usize>) {
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(itoa::Buffer::new().format(*i)),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => quote_into(out, s),
            Value::Bytes(b) => quote_bytes_into(out, b),
            Value::List(l) => {
                let id = Arc::as_ptr(l) as usize;
                if path.contains(&id) {
                    out.push_str("[...]");
                    return;
                }
                path.push(id);
                out.push('[');
                write_elems(out, &l.to_vec(), path);
                out.push(']');
                path.pop();
            }
            Value::Tuple(t) => {
                out.push('(');
                write_elems(out, t, path);
                if t.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(d) => {
                let id = Arc::as_ptr(d) as usize;
                if path.contains(&id) {
                    out.push_str("{...}");
                    return;
                }
                path.push(id);
                out.push('{');
                for (i, (k, v)) in d.items().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_repr(out, path);
                    out.push_str(": ");
                    v.write_repr(out, path);
                }
                out.push('}');
                path.pop();
            }
            Value::Range(r) => {
                if r.step == 1 {
                    let _ = write!(out, "range({}, {})", r.start, r.stop);
                } else {
                    let _ = write!(out, "range({}, {}, {})", r.start, r.stop, r.step);
                }
            }
            Value::Function(f) => {
                let _ = write!(out, "<function {}>", f.name());
            }
            Value::Builtin(b) => match b.receiver() {
                Some(recv) => {
                    let _ = write!(out, "<built-in method {} of {} value>", b.name(), recv.type_name());
                }
                None => {
                    let _ = write!(out, "<built-in function {}>", b.name());
                }
            },
            Value::Object(o) => out.push_str(&o.repr()),
            Value::Cell(_) => out.push_str("<cell>"),
            Value::Mandatory => out.push_str("<mandatory>"),
        }
    }
}

fn write_elems(out: &mut String, elems: &[Value], path: &mut Vec<usize>) {
    for (i, v) in elems.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        v.write_repr(out, path);
    }
}

/// `str()` conversion: strings print bare, everything else as `repr`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => f.write_str(&other.repr()),
        }
    }
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "+inf" } else { "-inf" }.to_string();
    }
    let mut buf = ryu::Buffer::new();
    let s = buf.format_finite(f);
    match s.find('e') {
        Some(i) if !s[i + 1..].starts_with('-') => format!("{}e+{}", &s[..i], &s[i + 1..]),
        _ => s.to_string(),
    }
}

fn quote_into(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x100 && c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn quote_bytes_into(out: &mut String, b: &[u8]) {
    out.push_str("b\"");
    for &byte in b {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
    out.push('"');
}

pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    quote_into(&mut out, s);
    out
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(elems: Vec<Value>) -> Self {
        Value::new_list(elems)
    }
}

/// Name-to-value mapping for module globals, predeclared environments and
/// `load` results. Preserves insertion order.
#[derive(Debug, Clone, Default)]
pub struct StringDict(IndexMap<String, Value>);

impl StringDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freezes every value in the dictionary.
    pub fn freeze(&self) {
        self.0.values().for_each(Value::freeze);
    }

    pub fn sorted_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl Deref for StringDict {
    type Target = IndexMap<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StringDict {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StringDict {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod val_test;
