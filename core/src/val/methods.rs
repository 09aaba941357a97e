//! Builtin methods of list, dict and string values.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};

use super::access::checked_index;
use super::args::{int_arg, opt_int_arg, str_arg};
use super::{Builtin, BuiltinFn, Dict, Kwargs, List, Value, equals, unpack_args};
use crate::vm::{RuntimeError, Thread};

const LIST_METHODS: &[(&str, BuiltinFn)] = &[
    ("append", list_append),
    ("clear", list_clear),
    ("extend", list_extend),
    ("index", list_index),
    ("insert", list_insert),
    ("pop", list_pop),
    ("remove", list_remove),
];

const DICT_METHODS: &[(&str, BuiltinFn)] = &[
    ("clear", dict_clear),
    ("get", dict_get),
    ("items", dict_items),
    ("keys", dict_keys),
    ("pop", dict_pop),
    ("setdefault", dict_setdefault),
    ("update", dict_update),
    ("values", dict_values),
];

const STR_METHODS: &[(&str, BuiltinFn)] = &[
    ("count", str_count),
    ("endswith", str_endswith),
    ("find", str_find),
    ("format", str_format),
    ("join", str_join),
    ("lower", str_lower),
    ("lstrip", str_lstrip),
    ("replace", str_replace),
    ("rstrip", str_rstrip),
    ("split", str_split),
    ("startswith", str_startswith),
    ("strip", str_strip),
    ("upper", str_upper),
];

fn table(v: &Value) -> &'static [(&'static str, BuiltinFn)] {
    match v {
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Str(_) => STR_METHODS,
        _ => &[],
    }
}

/// The method `name` of `recv`, bound to it.
pub(super) fn bind(recv: &Value, name: &str) -> Option<Builtin> {
    table(recv)
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(n, f)| Builtin::method(n, f, recv.clone()))
}

pub(super) fn names(recv: &Value) -> Vec<&'static str> {
    table(recv).iter().map(|(n, _)| *n).collect()
}

fn recv_list(b: &Builtin) -> Result<&Arc<List>> {
    match b.receiver() {
        Some(Value::List(l)) => Ok(l),
        _ => bail!("{}: receiver is not a list", b.name()),
    }
}

fn recv_dict(b: &Builtin) -> Result<&Arc<Dict>> {
    match b.receiver() {
        Some(Value::Dict(d)) => Ok(d),
        _ => bail!("{}: receiver is not a dict", b.name()),
    }
}

fn recv_str(b: &Builtin) -> Result<&str> {
    match b.receiver() {
        Some(Value::Str(s)) => Ok(s),
        _ => bail!("{}: receiver is not a string", b.name()),
    }
}

fn no_args(b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<()> {
    unpack_args::<0>(b.name(), args, kwargs, []).map(drop)
}

fn list_append(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [x] = unpack_args(b.name(), args, kwargs, ["x"])?;
    recv_list(b)?.append(x.cloned().unwrap_or_default())?;
    Ok(Value::None)
}

fn list_clear(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_args(b, args, kwargs)?;
    recv_list(b)?.mutate("clear", Vec::clear)?;
    Ok(Value::None)
}

fn list_extend(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [iterable] = unpack_args(b.name(), args, kwargs, ["iterable"])?;
    let list = recv_list(b)?;
    let extra = match iterable {
        Some(Value::List(l)) => l.to_vec(),
        Some(v) => v.iterate()?.collect(),
        None => Vec::new(),
    };
    list.extend(extra)?;
    Ok(Value::None)
}

fn list_index(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [x, start, end] = unpack_args(b.name(), args, kwargs, ["x", "start?", "end?"])?;
    let x = x.cloned().unwrap_or_default();
    let elems = recv_list(b)?.to_vec();
    let (start, end) = clamp_range(
        elems.len(),
        opt_int_arg(b.name(), "start", start)?,
        opt_int_arg(b.name(), "end", end)?,
    );
    for (i, e) in elems.iter().enumerate().take(end).skip(start) {
        if equals(e, &x)? {
            return Ok(Value::Int(i as i64));
        }
    }
    bail!("index: value not in list")
}

fn list_insert(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [index, x] = unpack_args(b.name(), args, kwargs, ["index", "x"])?;
    let list = recv_list(b)?;
    let index = int_arg(b.name(), "index", index.unwrap_or(&Value::None))?;
    let x = x.cloned().unwrap_or_default();
    list.mutate("insert into", |elems| {
        let len = elems.len() as i64;
        let i = if index < 0 { index + len } else { index };
        elems.insert(i.clamp(0, len) as usize, x);
    })?;
    Ok(Value::None)
}

fn list_pop(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [index] = unpack_args(b.name(), args, kwargs, ["index?"])?;
    let list = recv_list(b)?;
    let index = opt_int_arg(b.name(), "index", index)?.unwrap_or(-1);
    list.check_mutable("pop from")?;
    let i = checked_index(index, list.len(), "list")?;
    list.mutate("pop from", |elems| elems.remove(i))
}

fn list_remove(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [x] = unpack_args(b.name(), args, kwargs, ["x"])?;
    let x = x.cloned().unwrap_or_default();
    let list = recv_list(b)?;
    list.check_mutable("remove from")?;
    for (i, e) in list.to_vec().iter().enumerate() {
        if equals(e, &x)? {
            list.mutate("remove from", |elems| elems.remove(i))?;
            return Ok(Value::None);
        }
    }
    bail!("remove: element not found")
}

fn dict_clear(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_args(b, args, kwargs)?;
    recv_dict(b)?.clear()?;
    Ok(Value::None)
}

fn dict_get(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [key, default] = unpack_args(b.name(), args, kwargs, ["key", "default?"])?;
    let key = key.cloned().unwrap_or_default();
    Ok(recv_dict(b)?.get(&key)?.or_else(|| default.cloned()).unwrap_or_default())
}

fn dict_items(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_args(b, args, kwargs)?;
    let items = recv_dict(b)?
        .items()
        .into_iter()
        .map(|(k, v)| Value::new_tuple(vec![k, v]))
        .collect();
    Ok(Value::new_list(items))
}

fn dict_keys(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_args(b, args, kwargs)?;
    Ok(Value::new_list(recv_dict(b)?.keys()))
}

fn dict_values(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_args(b, args, kwargs)?;
    Ok(Value::new_list(recv_dict(b)?.values()))
}

fn dict_pop(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [key, default] = unpack_args(b.name(), args, kwargs, ["key", "default?"])?;
    let key = key.cloned().unwrap_or_default();
    match recv_dict(b)?.remove(&key)? {
        Some(v) => Ok(v),
        None => default
            .cloned()
            .ok_or_else(|| RuntimeError::KeyNotFound(key.repr()).into()),
    }
}

fn dict_setdefault(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [key, default] = unpack_args(b.name(), args, kwargs, ["key", "default?"])?;
    let key = key.cloned().unwrap_or_default();
    let dict = recv_dict(b)?;
    if let Some(v) = dict.get(&key)? {
        return Ok(v);
    }
    let v = default.cloned().unwrap_or_default();
    dict.insert(key, v.clone())?;
    Ok(v)
}

fn dict_update(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    if args.len() > 1 {
        bail!("update: got {} arguments, want at most 1", args.len());
    }
    let dict = recv_dict(b)?;
    dict.check_mutable("update")?;
    update_dict(dict, args.first(), kwargs)?;
    Ok(Value::None)
}

/// Shared by `dict.update` and the `dict()` builtin.
pub(crate) fn update_dict(dict: &Dict, pairs: Option<&Value>, kwargs: &Kwargs) -> Result<()> {
    match pairs {
        None => {}
        Some(Value::Dict(src)) => {
            for (k, v) in src.items() {
                dict.insert(k, v)?;
            }
        }
        Some(seq) => {
            let items: Vec<Value> = seq
                .iterate()
                .map_err(|_| anyhow!("got {}, want iterable", seq.type_name()))?
                .collect();
            for (i, item) in items.into_iter().enumerate() {
                let pair: Vec<Value> = item
                    .iterate()
                    .map_err(|_| anyhow!("dictionary update sequence element #{i} is not iterable ({})", item.type_name()))?
                    .collect();
                let [k, v] = <[Value; 2]>::try_from(pair)
                    .map_err(|p| anyhow!("dictionary update sequence element #{i} has length {}, want 2", p.len()))?;
                dict.insert(k, v)?;
            }
        }
    }
    for (k, v) in kwargs {
        dict.insert(Value::Str(k.clone()), v.clone())?;
    }
    Ok(())
}

/// Char-index bounds for `find`/`index`-style optional start and end.
fn clamp_range(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let n = len as i64;
    let norm = |i: i64| if i < 0 { (i + n).max(0) } else { i.min(n) };
    let start = start.map(norm).unwrap_or(0) as usize;
    let end = end.map(norm).unwrap_or(n) as usize;
    (start, end.max(start))
}

fn str_count(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [sub] = unpack_args(b.name(), args, kwargs, ["sub"])?;
    let s = recv_str(b)?;
    let sub = str_arg(b.name(), "sub", sub.unwrap_or(&Value::None))?;
    let n = if sub.is_empty() { s.chars().count() + 1 } else { s.matches(sub).count() };
    Ok(Value::Int(n as i64))
}

/// `prefix` may be a string or a tuple of strings.
fn affix_matches(fn_name: &str, x: &Value, test: impl Fn(&str) -> bool) -> Result<bool> {
    match x {
        Value::Str(s) => Ok(test(s)),
        Value::Tuple(t) => {
            for v in t.iter() {
                if test(str_arg(fn_name, "prefix", v)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => bail!("{fn_name}: got {}, want string or tuple of strings", other.type_name()),
    }
}

fn str_startswith(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [prefix] = unpack_args(b.name(), args, kwargs, ["prefix"])?;
    let s = recv_str(b)?;
    let ok = affix_matches(b.name(), prefix.unwrap_or(&Value::None), |p| s.starts_with(p))?;
    Ok(Value::Bool(ok))
}

fn str_endswith(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [suffix] = unpack_args(b.name(), args, kwargs, ["suffix"])?;
    let s = recv_str(b)?;
    let ok = affix_matches(b.name(), suffix.unwrap_or(&Value::None), |p| s.ends_with(p))?;
    Ok(Value::Bool(ok))
}

fn str_find(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [sub, start, end] = unpack_args(b.name(), args, kwargs, ["sub", "start?", "end?"])?;
    let s = recv_str(b)?;
    let sub = str_arg(b.name(), "sub", sub.unwrap_or(&Value::None))?;
    let chars: Vec<char> = s.chars().collect();
    let (start, end) = clamp_range(
        chars.len(),
        opt_int_arg(b.name(), "start", start)?,
        opt_int_arg(b.name(), "end", end)?,
    );
    let window: String = chars[start..end].iter().collect();
    let found = window
        .find(sub)
        .map(|byte| (start + window[..byte].chars().count()) as i64);
    Ok(Value::Int(found.unwrap_or(-1)))
}

fn str_format(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let s = recv_str(b)?;
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut auto_index = 0usize;
    let mut manual = false;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => bail!("format: unmatched '{{' in format"),
                    }
                }
                if field.contains(':') {
                    bail!("format: format spec features not supported in replacement fields");
                }
                let (name, conv) = match field.split_once('!') {
                    Some((name, conv)) => (name, Some(conv)),
                    None => (field.as_str(), None),
                };
                let arg = if name.is_empty() {
                    if manual {
                        bail!("format: cannot switch from manual field specification to automatic field numbering");
                    }
                    auto_index += 1;
                    args.get(auto_index - 1)
                        .ok_or_else(|| anyhow!("format: index {} out of range", auto_index - 1))?
                } else if let Ok(i) = name.parse::<usize>() {
                    if auto_index > 0 {
                        bail!("format: cannot switch from automatic field numbering to manual field specification");
                    }
                    manual = true;
                    args.get(i).ok_or_else(|| anyhow!("format: index {i} out of range"))?
                } else {
                    kwargs
                        .iter()
                        .find(|(k, _)| &**k == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| anyhow!("format: keyword {name} not found"))?
                };
                let _ = match conv {
                    None | Some("s") => write!(out, "{arg}"),
                    Some("r") => write!(out, "{}", arg.repr()),
                    Some(other) => bail!("format: unknown conversion {other:?}"),
                };
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => bail!("format: single '}}' in format"),
            c => out.push(c),
        }
    }
    Ok(Value::from(out))
}

fn str_join(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [iterable] = unpack_args(b.name(), args, kwargs, ["iterable"])?;
    let sep = recv_str(b)?;
    let iterable = iterable.unwrap_or(&Value::None);
    let mut out = String::new();
    for (i, v) in iterable.iterate()?.enumerate() {
        let Value::Str(part) = &v else {
            bail!("join: in {}, want string, got {}", iterable.type_name(), v.type_name());
        };
        if i > 0 {
            out.push_str(sep);
        }
        out.push_str(part);
    }
    Ok(Value::from(out))
}

fn str_lower(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_args(b, args, kwargs)?;
    Ok(Value::from(recv_str(b)?.to_lowercase()))
}

fn str_upper(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_args(b, args, kwargs)?;
    Ok(Value::from(recv_str(b)?.to_uppercase()))
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
    Both,
}

fn strip(b: &Builtin, args: &[Value], kwargs: &Kwargs, side: Side) -> Result<Value> {
    let [cutset] = unpack_args(b.name(), args, kwargs, ["chars?"])?;
    let s = recv_str(b)?;
    let out = match cutset {
        None | Some(Value::None) => match side {
            Side::Left => s.trim_start(),
            Side::Right => s.trim_end(),
            Side::Both => s.trim(),
        },
        Some(v) => {
            let cut = str_arg(b.name(), "chars", v)?;
            let pred = |c: char| cut.contains(c);
            match side {
                Side::Left => s.trim_start_matches(pred),
                Side::Right => s.trim_end_matches(pred),
                Side::Both => s.trim_matches(pred),
            }
        }
    };
    Ok(Value::str(out))
}

fn str_strip(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    strip(b, args, kwargs, Side::Both)
}

fn str_lstrip(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    strip(b, args, kwargs, Side::Left)
}

fn str_rstrip(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    strip(b, args, kwargs, Side::Right)
}

fn str_replace(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [old, new, count] = unpack_args(b.name(), args, kwargs, ["old", "new", "count?"])?;
    let s = recv_str(b)?;
    let old = str_arg(b.name(), "old", old.unwrap_or(&Value::None))?;
    let new = str_arg(b.name(), "new", new.unwrap_or(&Value::None))?;
    let out = match opt_int_arg(b.name(), "count", count)? {
        Some(n) if n >= 0 => s.replacen(old, new, n as usize),
        _ => s.replace(old, new),
    };
    Ok(Value::from(out))
}

fn str_split(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [sep, maxsplit] = unpack_args(b.name(), args, kwargs, ["sep?", "maxsplit?"])?;
    let s = recv_str(b)?;
    let limit = match opt_int_arg(b.name(), "maxsplit", maxsplit)? {
        Some(n) if n >= 0 => Some(n as usize),
        _ => None,
    };
    let parts: Vec<Value> = match sep {
        None | Some(Value::None) => split_whitespace(s, limit),
        Some(v) => {
            let sep = str_arg(b.name(), "sep", v)?;
            if sep.is_empty() {
                bail!("split: empty separator");
            }
            match limit {
                Some(n) => s.splitn(n + 1, sep).map(Value::str).collect(),
                None => s.split(sep).map(Value::str).collect(),
            }
        }
    };
    Ok(Value::new_list(parts))
}

/// Whitespace split: runs of whitespace separate fields and the remainder
/// after `limit` splits keeps its internal spacing.
fn split_whitespace(s: &str, limit: Option<usize>) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if limit.is_some_and(|n| parts.len() == n) {
            parts.push(Value::str(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(Value::str(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(Value::str(rest));
                break;
            }
        }
    }
    parts
}
