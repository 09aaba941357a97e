//! Argument unpacking for builtins.

use anyhow::{Result, bail};

use super::{Kwargs, Value};

/// Binds a builtin's arguments to named slots.
///
/// Positional arguments fill `params` in order, then keyword arguments are
/// matched by name. A trailing `?` marks a parameter optional; every other
/// slot is guaranteed to be `Some` on success.
pub fn unpack_args<'a, const N: usize>(
    fn_name: &str,
    args: &'a [Value],
    kwargs: &'a Kwargs,
    params: [&str; N],
) -> Result<[Option<&'a Value>; N]> {
    if args.len() > N {
        bail!("{fn_name}: got {} arguments, want at most {N}", args.len());
    }
    let mut out: [Option<&'a Value>; N] = [None; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = Some(arg);
    }
    'kw: for (name, value) in kwargs {
        for (i, param) in params.iter().enumerate() {
            if param.trim_end_matches('?') == &**name {
                if out[i].is_some() {
                    bail!("{fn_name}: got multiple values for keyword argument {name}");
                }
                out[i] = Some(value);
                continue 'kw;
            }
        }
        bail!("{fn_name}: unexpected keyword argument {name}");
    }
    for (slot, param) in out.iter().zip(params) {
        if slot.is_none() && !param.ends_with('?') {
            bail!("{fn_name}: missing argument for {param}");
        }
    }
    Ok(out)
}

/// Checks a positional-only call with between `min` and `max` arguments.
pub fn unpack_positional<'a>(
    fn_name: &str,
    args: &'a [Value],
    kwargs: &Kwargs,
    min: usize,
    max: usize,
) -> Result<&'a [Value]> {
    check_no_kwargs(fn_name, kwargs)?;
    if args.len() < min {
        bail!("{fn_name}: got {} arguments, want at least {min}", args.len());
    }
    if args.len() > max {
        bail!("{fn_name}: got {} arguments, want at most {max}", args.len());
    }
    Ok(args)
}

pub fn check_no_kwargs(fn_name: &str, kwargs: &Kwargs) -> Result<()> {
    match kwargs.first() {
        Some((name, _)) => bail!("{fn_name}: unexpected keyword argument {name}"),
        None => Ok(()),
    }
}

pub(crate) fn int_arg(fn_name: &str, param: &str, v: &Value) -> Result<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        other => bail!("{fn_name}: for parameter {param}: got {}, want int", other.type_name()),
    }
}

pub(crate) fn str_arg<'a>(fn_name: &str, param: &str, v: &'a Value) -> Result<&'a str> {
    match v {
        Value::Str(s) => Ok(s),
        other => bail!("{fn_name}: for parameter {param}: got {}, want string", other.type_name()),
    }
}

/// `None` and an absent argument are equivalent for optional int parameters.
pub(crate) fn opt_int_arg(fn_name: &str, param: &str, v: Option<&Value>) -> Result<Option<i64>> {
    match v {
        None | Some(Value::None) => Ok(None),
        Some(v) => int_arg(fn_name, param, v).map(Some),
    }
}
