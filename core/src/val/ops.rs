use std::cmp::Ordering;
use std::fmt::Write as _;
use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Rem, Shl, Shr, Sub};
use std::sync::Arc;

use anyhow::{Result, bail};

use super::{Dict, Value, format_float};
use crate::vm::RuntimeError;

/// Containers nested deeper than this cannot be compared.
pub const MAX_COMPARE_DEPTH: usize = 1000;

/// Repetition results larger than this many elements are rejected.
const MAX_REPEAT: usize = 1 << 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn eval(self, ord: Option<Ordering>) -> bool {
        match (self, ord) {
            (CompareOp::Ne, None) => true,
            (_, None) => false,
            (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
            (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
            (CompareOp::Lt, Some(o)) => o == Ordering::Less,
            (CompareOp::Le, Some(o)) => o != Ordering::Greater,
            (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
            (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        }
    }
}

fn err_op(x: &Value, op: &'static str, y: &Value) -> Result<Value> {
    Err(RuntimeError::BinaryOp {
        op,
        x: x.type_name(),
        y: y.type_name(),
    }
    .into())
}

/// Exact int/float ordering; `i as f64` would round above 2^53.
fn cmp_int_float(i: i64, f: f64) -> Option<Ordering> {
    const TWO_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return None;
    }
    if f >= TWO_63 {
        return Some(Ordering::Less);
    }
    if f < -TWO_63 {
        return Some(Ordering::Greater);
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0.partial_cmp(&(f - whole)),
        ord => Some(ord),
    }
}

pub fn equals(x: &Value, y: &Value) -> Result<bool> {
    compare(CompareOp::Eq, x, y)
}

pub fn compare(op: CompareOp, x: &Value, y: &Value) -> Result<bool> {
    compare_depth(op, x, y, MAX_COMPARE_DEPTH)
}

pub(crate) fn compare_depth(op: CompareOp, x: &Value, y: &Value, depth: usize) -> Result<bool> {
    if depth == 0 {
        bail!(RuntimeError::ComparisonDepth);
    }
    let is_eq = matches!(op, CompareOp::Eq | CompareOp::Ne);
    let ord = match (x, y) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
        (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).map(Ordering::reverse),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::None, Value::None) if is_eq => Some(Ordering::Equal),
        (Value::List(a), Value::List(b)) => {
            if is_eq && Arc::ptr_eq(a, b) {
                return Ok(op == CompareOp::Eq);
            }
            return compare_seq(op, &a.to_vec(), &b.to_vec(), depth);
        }
        (Value::Tuple(a), Value::Tuple(b)) => return compare_seq(op, a, b, depth),
        (Value::Dict(a), Value::Dict(b)) if is_eq => {
            let same = Arc::ptr_eq(a, b) || dicts_equal(a, b, depth)?;
            return Ok(same == (op == CompareOp::Eq));
        }
        (Value::Range(a), Value::Range(b)) if is_eq => {
            let (n, m) = (a.len(), b.len());
            let same = n == m && (n == 0 || (a.start == b.start && (n == 1 || a.step == b.step)));
            return Ok(same == (op == CompareOp::Eq));
        }
        (Value::Function(a), Value::Function(b)) if is_eq => {
            return Ok(Arc::ptr_eq(a, b) == (op == CompareOp::Eq));
        }
        (Value::Builtin(a), Value::Builtin(b)) if is_eq => {
            let same = Arc::ptr_eq(a, b) || (a.name() == b.name() && same_receiver(a.receiver(), b.receiver()));
            return Ok(same == (op == CompareOp::Eq));
        }
        (Value::Object(a), Value::Object(b)) if a.type_name() == b.type_name() => {
            if let Some(cmp) = a.as_comparable() {
                return cmp.compare_same_type(op, b.as_ref(), depth - 1);
            }
            if is_eq {
                let same = std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b));
                return Ok(same == (op == CompareOp::Eq));
            }
            return Err(unsupported_comparison(op, x, y));
        }
        _ if is_eq => return Ok(op == CompareOp::Ne),
        _ => return Err(unsupported_comparison(op, x, y)),
    };
    Ok(op.eval(ord))
}

fn unsupported_comparison(op: CompareOp, x: &Value, y: &Value) -> anyhow::Error {
    RuntimeError::Comparison {
        op: op.as_str(),
        x: x.type_name(),
        y: y.type_name(),
    }
    .into()
}

fn same_receiver(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_object(b),
        _ => false,
    }
}

fn compare_seq(op: CompareOp, xs: &[Value], ys: &[Value], depth: usize) -> Result<bool> {
    if matches!(op, CompareOp::Eq | CompareOp::Ne) && xs.len() != ys.len() {
        return Ok(op == CompareOp::Ne);
    }
    for (x, y) in xs.iter().zip(ys) {
        if !compare_depth(CompareOp::Eq, x, y, depth - 1)? {
            return match op {
                CompareOp::Eq => Ok(false),
                CompareOp::Ne => Ok(true),
                _ => compare_depth(op, x, y, depth - 1),
            };
        }
    }
    Ok(op.eval(Some(xs.len().cmp(&ys.len()))))
}

fn dicts_equal(a: &Dict, b: &Dict, depth: usize) -> Result<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (k, v) in a.items() {
        match b.get(&k)? {
            Some(w) if compare_depth(CompareOp::Eq, &v, &w, depth - 1)? => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

impl Value {
    /// Reference identity for heap values, value equality for scalars.
    pub(crate) fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Arc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn int_result(r: Option<i64>) -> Result<Value> {
    r.map(Value::Int).ok_or_else(|| RuntimeError::Overflow.into())
}

/// Validated repetition count; non-positive counts repeat zero times.
fn repeat_count(len: usize, n: i64) -> Result<usize> {
    if n <= 0 || len == 0 {
        return Ok(0);
    }
    match len.checked_mul(n as usize) {
        Some(total) if total <= MAX_REPEAT => Ok(n as usize),
        _ => bail!("excessive repeat ({len} * {n} elements)"),
    }
}

fn repeat<T: Clone>(elems: &[T], n: i64) -> Result<Vec<T>> {
    let n = repeat_count(elems.len(), n)?;
    let mut out = Vec::with_capacity(elems.len() * n);
    for _ in 0..n {
        out.extend_from_slice(elems);
    }
    Ok(out)
}

impl Add for &Value {
    type Output = Result<Value>;

    fn add(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => int_result(a.checked_add(*b)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::Str(a), Value::Str(b)) => {
                if a.is_empty() {
                    return Ok(Value::Str(b.clone()));
                }
                if b.is_empty() {
                    return Ok(Value::Str(a.clone()));
                }
                Ok(Value::from(format!("{a}{b}")))
            }
            (Value::Bytes(a), Value::Bytes(b)) => Ok(Value::Bytes([&a[..], &b[..]].concat().into())),
            (Value::List(a), Value::List(b)) => {
                let mut elems = a.to_vec();
                elems.extend(b.to_vec());
                Ok(Value::new_list(elems))
            }
            (Value::Tuple(a), Value::Tuple(b)) => Ok(Value::Tuple([&a[..], &b[..]].concat().into())),
            _ => err_op(self, "+", other),
        }
    }
}

impl Sub for &Value {
    type Output = Result<Value>;

    fn sub(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => int_result(a.checked_sub(*b)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 - b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - *b as f64)),
            _ => err_op(self, "-", other),
        }
    }
}

impl Mul for &Value {
    type Output = Result<Value>;

    fn mul(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => int_result(a.checked_mul(*b)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 * b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a * *b as f64)),
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                Ok(Value::from(s.repeat(repeat_count(s.len(), *n)?)))
            }
            (Value::Bytes(b), Value::Int(n)) | (Value::Int(n), Value::Bytes(b)) => Ok(Value::Bytes(repeat(&b[..], *n)?.into())),
            (Value::List(l), Value::Int(n)) | (Value::Int(n), Value::List(l)) => Ok(Value::new_list(repeat(&l.to_vec(), *n)?)),
            (Value::Tuple(t), Value::Int(n)) | (Value::Int(n), Value::Tuple(t)) => Ok(Value::new_tuple(repeat(&t[..], *n)?)),
            _ => err_op(self, "*", other),
        }
    }
}

fn float_operands(x: &Value, y: &Value) -> Option<(f64, f64)> {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => Some((*a as f64, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Some((*a, *b)),
        (Value::Int(a), Value::Float(b)) => Some((*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Some((*a, *b as f64)),
        _ => None,
    }
}

impl Div for &Value {
    type Output = Result<Value>;

    /// Always produces a float.
    fn div(self, other: Self) -> Self::Output {
        let Some((a, b)) = float_operands(self, other) else {
            return err_op(self, "/", other);
        };
        if b == 0.0 {
            bail!(RuntimeError::DivisionByZero("floating-point division"));
        }
        Ok(Value::Float(a / b))
    }
}

impl Rem for &Value {
    type Output = Result<Value>;

    fn rem(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    bail!(RuntimeError::DivisionByZero("integer modulo"));
                }
                let r = a.checked_rem(*b).unwrap_or(0);
                Ok(Value::Int(if r != 0 && (r < 0) != (*b < 0) { r + b } else { r }))
            }
            (Value::Str(fmt), args) => percent_format(fmt, args),
            _ => {
                let Some((a, b)) = float_operands(self, other) else {
                    return err_op(self, "%", other);
                };
                if b == 0.0 {
                    bail!(RuntimeError::DivisionByZero("floating-point modulo"));
                }
                let r = a % b;
                Ok(Value::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
            }
        }
    }
}

impl BitAnd for &Value {
    type Output = Result<Value>;

    fn bitand(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a & b)),
            _ => err_op(self, "&", other),
        }
    }
}

impl BitOr for &Value {
    type Output = Result<Value>;

    /// Integer or, or dict union (right operand wins).
    fn bitor(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a | b)),
            (Value::Dict(a), Value::Dict(b)) => {
                let merged = a.copy();
                for (k, v) in b.items() {
                    merged.insert(k, v)?;
                }
                Ok(Value::Dict(Arc::new(merged)))
            }
            _ => err_op(self, "|", other),
        }
    }
}

impl BitXor for &Value {
    type Output = Result<Value>;

    fn bitxor(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a ^ b)),
            _ => err_op(self, "^", other),
        }
    }
}

impl Shl for &Value {
    type Output = Result<Value>;

    fn shl(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b < 0 {
                    bail!("negative shift count: {b}");
                }
                if *a == 0 {
                    return Ok(Value::Int(0));
                }
                if *b >= 64 {
                    bail!(RuntimeError::Overflow);
                }
                let r = a << b;
                if r >> b != *a {
                    bail!(RuntimeError::Overflow);
                }
                Ok(Value::Int(r))
            }
            _ => err_op(self, "<<", other),
        }
    }
}

impl Shr for &Value {
    type Output = Result<Value>;

    fn shr(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b < 0 {
                    bail!("negative shift count: {b}");
                }
                Ok(Value::Int(if *b >= 64 { if *a < 0 { -1 } else { 0 } } else { a >> b }))
            }
            _ => err_op(self, ">>", other),
        }
    }
}

impl Value {
    /// `x // y`: floored division.
    pub fn floor_div(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    bail!(RuntimeError::DivisionByZero("integer division"));
                }
                let Some(q) = a.checked_div(*b) else {
                    bail!(RuntimeError::Overflow);
                };
                Ok(Value::Int(if (a % b != 0) && ((*a < 0) != (*b < 0)) { q - 1 } else { q }))
            }
            _ => {
                let Some((a, b)) = float_operands(self, other) else {
                    return err_op(self, "//", other);
                };
                if b == 0.0 {
                    bail!(RuntimeError::DivisionByZero("floating-point division"));
                }
                Ok(Value::Float((a / b).floor()))
            }
        }
    }

    /// `x in self`.
    pub fn contains(&self, x: &Value) -> Result<bool> {
        match self {
            Value::List(l) => any_equal(&l.to_vec(), x),
            Value::Tuple(t) => any_equal(t, x),
            Value::Dict(d) => d.contains_key(x),
            Value::Str(s) => match x {
                Value::Str(needle) => Ok(s.contains(&**needle)),
                other => bail!("'in <string>' requires string as left operand, not {}", other.type_name()),
            },
            Value::Bytes(b) => match x {
                Value::Bytes(needle) => Ok(needle.is_empty() || b.windows(needle.len()).any(|w| w == &needle[..])),
                Value::Int(i) if (0..256).contains(i) => Ok(b.contains(&(*i as u8))),
                other => bail!("'in bytes' requires bytes or int as left operand, not {}", other.type_name()),
            },
            Value::Range(r) => match x {
                Value::Int(i) => Ok(r.contains(*i)),
                Value::Float(f) if f.fract() == 0.0 => Ok(r.contains(*f as i64)),
                _ => Ok(false),
            },
            _ => Err(RuntimeError::BinaryOp {
                op: "in",
                x: x.type_name(),
                y: self.type_name(),
            }
            .into()),
        }
    }

    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Int(i) => int_result(i.checked_neg()),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(RuntimeError::UnaryOp { op: "-", x: other.type_name() }.into()),
        }
    }

    pub fn pos(&self) -> Result<Value> {
        match self {
            Value::Int(_) | Value::Float(_) => Ok(self.clone()),
            other => Err(RuntimeError::UnaryOp { op: "+", x: other.type_name() }.into()),
        }
    }

    pub fn invert(&self) -> Result<Value> {
        match self {
            Value::Int(i) => Ok(Value::Int(!i)),
            other => Err(RuntimeError::UnaryOp { op: "~", x: other.type_name() }.into()),
        }
    }

    /// In-place `+=`: lists are extended (the alias sees the change), every
    /// other type falls back to `+`.
    pub fn inplace_add(&self, other: &Value) -> Result<Value> {
        if let Value::List(l) = self {
            let extra: Vec<Value> = match other {
                Value::List(r) => r.to_vec(),
                _ => match other.iterate() {
                    Ok(iter) => iter.collect(),
                    Err(_) => return self + other,
                },
            };
            l.mutate("apply += to", |elems| elems.extend(extra))?;
            return Ok(self.clone());
        }
        self + other
    }

    /// In-place `|=`: dicts are updated, every other type falls back to `|`.
    pub fn inplace_pipe(&self, other: &Value) -> Result<Value> {
        if let (Value::Dict(d), Value::Dict(r)) = (self, other) {
            d.check_mutable("apply |= to")?;
            for (k, v) in r.items() {
                d.insert(k, v)?;
            }
            return Ok(self.clone());
        }
        self | other
    }
}

fn any_equal(elems: &[Value], x: &Value) -> Result<bool> {
    for e in elems {
        if equals(e, x)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `format % args` with `%s %r %d %i %x %X %o %e %f %g %%`.
fn percent_format(format: &str, args: &Value) -> Result<Value> {
    let args: Vec<Value> = match args {
        Value::Tuple(t) => t.to_vec(),
        other => vec![other.clone()],
    };
    let mut args = args.into_iter();
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(directive) = chars.next() else {
            bail!("incomplete format");
        };
        if directive == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.next() else {
            bail!("not enough arguments for format string");
        };
        match directive {
            's' => {
                let _ = write!(out, "{arg}");
            }
            'r' => out.push_str(&arg.repr()),
            'd' | 'i' | 'x' | 'X' | 'o' => {
                let n = match arg {
                    Value::Int(i) => i,
                    Value::Float(f) => f.trunc() as i64,
                    other => bail!("%{directive} format requires integer: {}", other.type_name()),
                };
                let _ = match directive {
                    'x' => write!(out, "{}{:x}", if n < 0 { "-" } else { "" }, n.unsigned_abs()),
                    'X' => write!(out, "{}{:X}", if n < 0 { "-" } else { "" }, n.unsigned_abs()),
                    'o' => write!(out, "{}{:o}", if n < 0 { "-" } else { "" }, n.unsigned_abs()),
                    _ => write!(out, "{n}"),
                };
            }
            'e' | 'f' | 'g' => {
                let f = match arg {
                    Value::Int(i) => i as f64,
                    Value::Float(f) => f,
                    other => bail!("%{directive} format requires float: {}", other.type_name()),
                };
                match directive {
                    'f' => {
                        let _ = write!(out, "{f:.6}");
                    }
                    'e' => out.push_str(&exponent_format(f)),
                    _ => out.push_str(&format_float(f)),
                }
            }
            other => bail!("unsupported format character {other:?}"),
        }
    }
    if args.next().is_some() {
        bail!("too many arguments for format string");
    }
    Ok(Value::from(out))
}

/// `1.500000e+02` style, with at least two exponent digits.
fn exponent_format(f: f64) -> String {
    let s = format!("{f:.6e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}
