//! Builtins available to every module without a `load`.

use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use once_cell::sync::Lazy;

use crate::val::{
    Builtin, BuiltinFn, CompareOp, Dict, Kwargs, Range, StringDict, Value, check_no_kwargs, compare, int_arg,
    str_arg, unpack_args, unpack_positional, update_dict,
};
use crate::vm::{RuntimeError, Thread, call};

const FUNCTIONS: &[(&str, BuiltinFn)] = &[
    ("abs", abs),
    ("all", all),
    ("any", any),
    ("bool", bool_),
    ("dict", dict),
    ("dir", dir),
    ("enumerate", enumerate),
    ("fail", fail),
    ("float", float),
    ("getattr", getattr),
    ("hasattr", hasattr),
    ("int", int),
    ("len", len),
    ("list", list),
    ("max", max),
    ("min", min),
    ("print", print),
    ("range", range),
    ("repr", repr),
    ("reversed", reversed),
    ("sorted", sorted),
    ("str", str_),
    ("tuple", tuple),
    ("type", type_),
    ("zip", zip),
];

static UNIVERSE: Lazy<StringDict> = Lazy::new(|| {
    let mut dict = StringDict::new();
    dict.insert("None".to_string(), Value::None);
    dict.insert("True".to_string(), Value::Bool(true));
    dict.insert("False".to_string(), Value::Bool(false));
    for &(name, func) in FUNCTIONS {
        dict.insert(name.to_string(), Builtin::new(name, func).into());
    }
    dict.freeze();
    dict
});

/// The value of the universal name `name`.
pub fn lookup(name: &str) -> Option<Value> {
    UNIVERSE.get(name).cloned()
}

pub fn is_universal(name: &str) -> bool {
    UNIVERSE.contains_key(name)
}

/// Every universal name, sorted.
pub fn names() -> Vec<&'static str> {
    UNIVERSE.sorted_keys()
}

fn one_arg<'a>(name: &str, args: &'a [Value], kwargs: &Kwargs) -> Result<&'a Value> {
    Ok(&unpack_positional(name, args, kwargs, 1, 1)?[0])
}

fn collect(name: &str, v: &Value) -> Result<Vec<Value>> {
    v.iterate()
        .map(|it| it.collect())
        .map_err(|_| anyhow!("{name}: got {}, want iterable", v.type_name()))
}

fn abs(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    match one_arg("abs", args, kwargs)? {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::Overflow.into()),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => bail!("abs: got {}, want int or float", other.type_name()),
    }
}

fn all(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let x = one_arg("all", args, kwargs)?;
    Ok(Value::Bool(collect("all", x)?.iter().all(Value::truth)))
}

fn any(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let x = one_arg("any", args, kwargs)?;
    Ok(Value::Bool(collect("any", x)?.iter().any(Value::truth)))
}

fn bool_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let args = unpack_positional("bool", args, kwargs, 0, 1)?;
    Ok(Value::Bool(args.first().is_some_and(Value::truth)))
}

fn dict(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    if args.len() > 1 {
        bail!("dict: got {} arguments, want at most 1", args.len());
    }
    let dict = Dict::new();
    update_dict(&dict, args.first(), kwargs).map_err(|e| anyhow!("dict: {e}"))?;
    Ok(Value::Dict(Arc::new(dict)))
}

fn dir(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let x = one_arg("dir", args, kwargs)?;
    let mut names = x.attr_names();
    names.sort();
    Ok(Value::new_list(names.into_iter().map(Value::from).collect()))
}

fn enumerate(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [iterable, start] = unpack_args("enumerate", args, kwargs, ["iterable", "start?"])?;
    let iterable = iterable.expect("required");
    let start = match start {
        Some(v) => int_arg("enumerate", "start", v)?,
        None => 0,
    };
    let pairs = collect("enumerate", iterable)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| Value::new_tuple(vec![Value::Int(start + i as i64), v]))
        .collect();
    Ok(Value::new_list(pairs))
}

fn join_args(name: &str, args: &[Value], kwargs: &Kwargs) -> Result<String> {
    let mut sep = " ".to_string();
    for (k, v) in kwargs {
        match &**k {
            "sep" => sep = str_arg(name, "sep", v)?.to_string(),
            other => bail!("{name}: unexpected keyword argument {other}"),
        }
    }
    Ok(args.iter().map(Value::to_string).collect::<Vec<_>>().join(&sep))
}

fn fail(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let msg = join_args("fail", args, kwargs)?;
    bail!("fail: {msg}")
}

fn float(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let args = unpack_positional("float", args, kwargs, 0, 1)?;
    let f = match args.first() {
        None => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Int(i)) => *i as f64,
        Some(Value::Float(f)) => *f,
        Some(Value::Str(s)) => parse_float(s).ok_or_else(|| anyhow!("float: invalid float literal: {s}"))?,
        Some(other) => bail!("float: got {}, want number or string", other.type_name()),
    };
    Ok(Value::Float(f))
}

fn parse_float(s: &str) -> Option<f64> {
    let t = s.trim();
    let (sign, body) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    match body.to_ascii_lowercase().as_str() {
        "inf" | "infinity" => Some(sign * f64::INFINITY),
        "nan" => Some(f64::NAN),
        _ if body.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) => {
            body.parse::<f64>().ok().map(|f| sign * f)
        }
        _ => None,
    }
}

fn getattr(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    check_no_kwargs("getattr", kwargs)?;
    let (x, name, default) = match args {
        [x, name] => (x, name, None),
        [x, name, default] => (x, name, Some(default)),
        _ => bail!("getattr: got {} arguments, want 2 or 3", args.len()),
    };
    let name = str_arg("getattr", "name", name)?;
    match (x.get_attr(name), default) {
        (Ok(v), _) => Ok(v),
        (Err(_), Some(default)) => Ok(default.clone()),
        (Err(err), None) => Err(err),
    }
}

fn hasattr(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let args = unpack_positional("hasattr", args, kwargs, 2, 2)?;
    let name = str_arg("hasattr", "name", &args[1])?;
    let found = match args[0].attr(name) {
        Ok(v) => v.is_some(),
        Err(_) => args[0].attr_names().iter().any(|n| n == name),
    };
    Ok(Value::Bool(found))
}

fn int(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [x, base] = unpack_args("int", args, kwargs, ["x?", "base?"])?;
    let Some(x) = x else {
        return Ok(Value::Int(0));
    };
    if let Some(base) = base {
        let Value::Str(s) = x else {
            bail!("int: can't convert non-string with explicit base");
        };
        let base = int_arg("int", "base", base)?;
        return parse_int(s, base).map(Value::Int);
    }
    match x {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => {
            if !f.is_finite() {
                bail!("int: cannot convert float {} to integer", x.repr());
            }
            let t = f.trunc();
            if t < i64::MIN as f64 || t >= i64::MAX as f64 {
                bail!(RuntimeError::Overflow);
            }
            Ok(Value::Int(t as i64))
        }
        Value::Str(s) => parse_int(s, 10).map(Value::Int),
        other => bail!("int: got {}, want number or string", other.type_name()),
    }
}

/// Parses `s` in `base` (2..=36, or 0 to infer it from a `0x`/`0o`/`0b` prefix).
fn parse_int(s: &str, base: i64) -> Result<i64> {
    let invalid = || anyhow!("int: invalid literal with base {base}: {s}");
    let t = s.trim();
    let (neg, digits) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let lower = digits.to_ascii_lowercase();
    let prefixed = [("0x", 16), ("0o", 8), ("0b", 2)]
        .into_iter()
        .find(|(p, _)| lower.starts_with(*p));
    let (radix, body) = match (base, prefixed) {
        (0, Some((p, r))) => (r, &digits[p.len()..]),
        (0, None) => (10, digits),
        (b, Some((p, r))) if b == i64::from(r) => (r, &digits[p.len()..]),
        (2..=36, _) => (base as u32, digits),
        _ => bail!("int: base must be an integer >= 2 && <= 36"),
    };
    if body.is_empty() || body.starts_with(['+', '-']) {
        return Err(invalid());
    }
    let magnitude = u64::from_str_radix(body, radix).map_err(|_| invalid())?;
    if neg {
        0i64.checked_sub_unsigned(magnitude).ok_or_else(|| RuntimeError::Overflow.into())
    } else {
        i64::try_from(magnitude).map_err(|_| RuntimeError::Overflow.into())
    }
}

fn len(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let x = one_arg("len", args, kwargs)?;
    match x.len() {
        Some(n) => Ok(Value::Int(n as i64)),
        None => bail!("len: value of type {} has no len", x.type_name()),
    }
}

fn list(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let args = unpack_positional("list", args, kwargs, 0, 1)?;
    let elems = match args.first() {
        Some(x) => collect("list", x)?,
        None => Vec::new(),
    };
    Ok(Value::new_list(elems))
}

/// Shared by `min` and `max`: picks the element `better` prefers, comparing
/// `key(x)` when a key function is given.
fn extremum(thread: &mut Thread, name: &str, args: &[Value], kwargs: &Kwargs, want: CompareOp) -> Result<Value> {
    let mut key = None;
    for (k, v) in kwargs {
        match &**k {
            "key" if !v.is_none() => key = Some(v.clone()),
            "key" => {}
            other => bail!("{name}: unexpected keyword argument {other}"),
        }
    }
    let elems = match args {
        [] => bail!("{name}: got 0 arguments, want at least 1"),
        [iterable] => collect(name, iterable)?,
        many => many.to_vec(),
    };
    let mut best: Option<(Value, Value)> = None;
    for x in elems {
        let k = match &key {
            Some(f) => call(thread, f, vec![x.clone()], Vec::new())?,
            None => x.clone(),
        };
        best = match best {
            Some((bx, bk)) if !compare(want, &k, &bk)? => Some((bx, bk)),
            _ => Some((x, k)),
        };
    }
    best.map(|(x, _)| x)
        .ok_or_else(|| anyhow!("{name}: argument is an empty sequence"))
}

fn max(thread: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    extremum(thread, "max", args, kwargs, CompareOp::Gt)
}

fn min(thread: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    extremum(thread, "min", args, kwargs, CompareOp::Lt)
}

fn print(thread: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let msg = join_args("print", args, kwargs)?;
    thread.print(&msg);
    Ok(Value::None)
}

fn range(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let args = unpack_positional("range", args, kwargs, 1, 3)?;
    let ints = args
        .iter()
        .map(|v| int_arg("range", "argument", v))
        .collect::<Result<Vec<_>>>()?;
    let (start, stop, step) = match ints[..] {
        [stop] => (0, stop, 1),
        [start, stop] => (start, stop, 1),
        [start, stop, step] => (start, stop, step),
        _ => unreachable!("arity checked above"),
    };
    if step == 0 {
        bail!("range: step argument must not be zero");
    }
    Ok(Value::Range(Range { start, stop, step }))
}

fn repr(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    Ok(Value::from(one_arg("repr", args, kwargs)?.repr()))
}

fn reversed(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let mut elems = collect("reversed", one_arg("reversed", args, kwargs)?)?;
    elems.reverse();
    Ok(Value::new_list(elems))
}

fn sorted(thread: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let [iterable, key, reverse] = unpack_args("sorted", args, kwargs, ["iterable", "key?", "reverse?"])?;
    let elems = collect("sorted", iterable.expect("required"))?;
    let reverse = reverse.is_some_and(Value::truth);

    let mut keyed = Vec::with_capacity(elems.len());
    for x in elems {
        let k = match key {
            Some(f) if !f.is_none() => call(thread, f, vec![x.clone()], Vec::new())?,
            _ => x.clone(),
        };
        keyed.push((k, x));
    }

    // sort_by cannot fail, so the first comparison error is kept aside.
    let mut error = None;
    keyed.sort_by(|(a, _), (b, _)| {
        if error.is_some() {
            return Ordering::Equal;
        }
        match compare(CompareOp::Lt, a, b) {
            Ok(true) => Ordering::Less,
            Ok(false) => match compare(CompareOp::Lt, b, a) {
                Ok(true) => Ordering::Greater,
                Ok(false) => Ordering::Equal,
                Err(e) => {
                    error = Some(e);
                    Ordering::Equal
                }
            },
            Err(e) => {
                error = Some(e);
                Ordering::Equal
            }
        }
    });
    if let Some(e) = error {
        return Err(e.context("sorted"));
    }
    if reverse {
        keyed.reverse();
    }
    Ok(Value::new_list(keyed.into_iter().map(|(_, x)| x).collect()))
}

fn str_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let x = one_arg("str", args, kwargs)?;
    Ok(match x {
        Value::Str(_) => x.clone(),
        other => Value::from(other.to_string()),
    })
}

fn tuple(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let args = unpack_positional("tuple", args, kwargs, 0, 1)?;
    match args.first() {
        Some(t @ Value::Tuple(_)) => Ok(t.clone()),
        Some(x) => Ok(Value::new_tuple(collect("tuple", x)?)),
        None => Ok(Value::new_tuple(Vec::new())),
    }
}

fn type_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    Ok(Value::str(one_arg("type", args, kwargs)?.type_name()))
}

fn zip(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    check_no_kwargs("zip", kwargs)?;
    let columns = args.iter().map(|x| collect("zip", x)).collect::<Result<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let out = (0..rows)
        .map(|i| Value::new_tuple(columns.iter().map(|c| c[i].clone()).collect()))
        .collect();
    Ok(Value::new_list(out))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::exec_file;

    fn eval(expr: &str) -> Result<String> {
        let src = format!("result = {expr}\n");
        let globals = exec_file(&mut Thread::default(), "u.star", &src, StringDict::new())?;
        Ok(globals["result"].repr())
    }

    fn check(expr: &str, want: &str) {
        match eval(expr) {
            Ok(got) => assert_eq!(got, want, "{expr}"),
            Err(e) => panic!("{expr}: {e:#}"),
        }
    }

    #[test]
    fn universe_is_frozen_and_complete() {
        assert!(is_universal("len"));
        assert!(is_universal("None"));
        assert!(!is_universal("load"));
        assert!(lookup("nope").is_none());
        let names = names();
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
        assert!(names.contains(&"sorted"));
    }

    #[test]
    fn conversions() {
        check(
            "[int('42'), int('-0x1f', 0), int('ff', 16), int('0b101', 2), int(3.9), int(True)]",
            "[42, -31, 255, 5, 3, 1]",
        );
        check("[float('1.5'), float(2), float('-inf')]", "[1.5, 2.0, -inf]");
        check("[str(1), str('s'), repr('s'), bool([]), bool(1)]", "[\"1\", \"s\", \"\\\"s\\\"\", False, True]");
        check("[list(range(3)), tuple([1]), dict([('a', 1)], b=2)]", "[[0, 1, 2], (1,), {\"a\": 1, \"b\": 2}]");
        check("int('-9223372036854775808')", "-9223372036854775808");
    }

    #[test]
    fn conversion_errors() {
        for (expr, want) in [
            ("int('12a')", "invalid literal with base 10"),
            ("int('9223372036854775808')", "integer overflow"),
            ("int('1', 99)", "base must be an integer"),
            ("float('x')", "invalid float literal"),
            ("len(1)", "has no len"),
        ] {
            let err = eval(expr).unwrap_err();
            assert!(err.to_string().contains(want), "{expr}: {err}");
        }
    }

    #[test]
    fn sequences() {
        check("[len('héllo'), len([1, 2]), len({})]", "[5, 2, 0]");
        check("enumerate(['a', 'b'], 1)", "[(1, \"a\"), (2, \"b\")]");
        check("zip([1, 2, 3], 'ab'.split('x') + ['c'])", "[(1, \"ab\"), (2, \"c\")]");
        check("reversed(range(3))", "[2, 1, 0]");
        check("[all([1, True]), all([]), any([0, None]), any([0, 'x'])]", "[True, True, False, True]");
        check("range(1, 10, 3)", "range(1, 10, 3)");
        check("list(range(5, 0, -2))", "[5, 3, 1]");
    }

    #[test]
    fn sorted_and_extrema() {
        check("sorted([3, 1, 2])", "[1, 2, 3]");
        check("sorted(['bb', 'a', 'ccc'], key=len, reverse=True)", "[\"ccc\", \"bb\", \"a\"]");
        check("[min(3, 1, 2), max([3, 1, 2]), max('a', 'b'), min(['xx', 'y'], key=len)]", "[1, 3, \"b\", \"y\"]");
        assert!(eval("sorted([1, 'a'])").is_err());
        let err = eval("max([])").unwrap_err();
        assert!(err.to_string().contains("empty sequence"), "{err}");
    }

    #[test]
    fn attributes() {
        check("[hasattr([], 'append'), hasattr([], 'nope'), hasattr('', 'join')]", "[True, False, True]");
        check("getattr({}, 'missing', 7)", "7");
        check("'keys' in dir({})", "True");
        check("type(getattr([], 'append'))", "\"builtin_function_or_method\"");
        check(
            "[type(None), type(1), type(1.0), type(''), type(()), type(len)]",
            "[\"NoneType\", \"int\", \"float\", \"string\", \"tuple\", \"builtin_function_or_method\"]",
        );
    }

    #[test]
    fn fail_reports_its_arguments() {
        let err = eval("fail('bad', 42)").unwrap_err();
        assert!(err.to_string().contains("fail: bad 42"), "{err}");
    }

    #[test]
    fn abs_overflows_at_min_int() {
        check("[abs(-3), abs(2.5)]", "[3, 2.5]");
        let err = eval("abs(-9223372036854775807 - 1)").unwrap_err();
        assert!(err.to_string().contains("integer overflow"), "{err}");
    }
}
